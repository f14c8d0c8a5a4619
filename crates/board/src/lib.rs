//! Board runtime crate.
//!
//! Keeps the weather and departures panels populated: fetch clients against
//! the proxy, the shared poll/cache/backoff controller, the key-value store
//! it persists to, and the panel-fit row heuristic.

pub mod client;
pub mod fit;
pub mod poll;
pub mod schedule;
pub mod store;
pub mod view;

pub use client::{DepartureSource, ProxyClient, WeatherSource};
pub use fit::{fit_rows, FitAction, FitGeometry, FitScheduler, FitTrigger, ListMetrics};
pub use poll::{
    BackoffTable, Panel, PanelHandle, PanelState, PanelStatus, PollController, PollOutcome,
    PollPolicy, SnapshotSource,
};
pub use schedule::{ScheduledTask, TaskContext};
pub use store::{FileStore, KeyValueStore, MemoryStore};
pub use view::{departure_rows, updated_label, weather_rows, DepartureRow, WeatherRow};
