//! Shared types, config, and error definitions for the board.

pub mod config;
pub mod error;
pub mod relay;
pub mod settings;
pub mod time;
pub mod types;

pub use config::BoardConfig;
pub use error::Error;
pub use settings::DisplaySettings;
pub use types::*;

/// Convenience Result alias.
pub type Result<T> = std::result::Result<T, Error>;
