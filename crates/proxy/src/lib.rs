//! HTTP proxy in front of the MET and Entur APIs.
//!
//! Accepts simplified queries, builds the upstream request with the
//! identifying header each API requires, and relays status and body.
//! No retries, timeouts or rate limiting are applied here.

pub mod entur;
pub mod met;
pub mod response;
pub mod server;

pub use server::{router, serve, ProxyState};
