//! Domain types shared across the board.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Weather ───────────────────────────────────────────────────────────

/// One timestamped observation from the weather forecast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastEntry {
    pub time: DateTime<Utc>,
    /// Air temperature in °C.
    #[serde(default)]
    pub air_temperature: Option<f64>,
    /// Wind speed in m/s.
    #[serde(default)]
    pub wind_speed: Option<f64>,
    /// Precipitation over the next hour in mm.
    #[serde(default)]
    pub precipitation_amount: Option<f64>,
    /// MET symbol code for the next hour (e.g. "partlycloudy_day").
    #[serde(default)]
    pub symbol_code: Option<String>,
}

/// Ordered forecast series for the configured location.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ForecastSnapshot {
    #[serde(default)]
    pub entries: Vec<ForecastEntry>,
}

impl ForecastSnapshot {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ── Departures ────────────────────────────────────────────────────────

/// Line descriptor attached to an estimated call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LineInfo {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub public_code: Option<String>,
    /// Entur transport mode ("rail", "bus", ...).
    #[serde(default)]
    pub transport_mode: Option<String>,
}

/// A single estimated call at the stop place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimatedCall {
    #[serde(default)]
    pub realtime: bool,
    #[serde(default)]
    pub aimed_departure_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub expected_departure_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default)]
    pub line: Option<LineInfo>,
}

/// Ordered estimated calls for one stop place.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DepartureSnapshot {
    #[serde(default)]
    pub stop_id: String,
    #[serde(default)]
    pub stop_name: Option<String>,
    #[serde(default)]
    pub calls: Vec<EstimatedCall>,
}

impl DepartureSnapshot {
    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}

// ── Upstream relay ────────────────────────────────────────────────────

/// An upstream reply the proxy relays to its caller.
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamResponse {
    pub status: u16,
    /// Upstream `Cache-Control`, if it sent one.
    pub cache_control: Option<String>,
    pub body: serde_json::Value,
}

impl UpstreamResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

// ── Cache ─────────────────────────────────────────────────────────────

/// Last-good snapshot persisted for failure fallback.
///
/// Serialized as `{"ts": <epoch millis>, "data": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheRecord<T> {
    pub ts: i64,
    pub data: T,
}

impl<T> CacheRecord<T> {
    pub fn new(fetched_at: DateTime<Utc>, data: T) -> Self {
        Self {
            ts: fetched_at.timestamp_millis(),
            data,
        }
    }

    /// Fetch time of the cached snapshot, if the stored millis are in range.
    pub fn fetched_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.ts)
    }

    /// Age of the record relative to `now`. Never negative.
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        match self.fetched_at() {
            Some(at) if at <= now => now - at,
            _ => chrono::Duration::zero(),
        }
    }
}
