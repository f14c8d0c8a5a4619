//! MET Norway locationforecast client.
//!
//! Fetches the `compact` forecast from `api.met.no` with the identifying
//! `User-Agent` MET requires, and converts the response into the shared
//! `ForecastSnapshot` format.

use chrono::{DateTime, Utc};
use common::error::format_error_chain;
use common::relay::read_upstream;
use common::{Error, ForecastEntry, ForecastSnapshot, UpstreamResponse};
use serde::Deserialize;
use tracing::debug;

const COMPACT_PATH: &str = "/weatherapi/locationforecast/2.0/compact";

/// Upstream MET client with connection pooling and User-Agent header.
///
/// No request timeout is set; a hung upstream call stalls only the caller.
#[derive(Debug, Clone)]
pub struct MetClient {
    client: reqwest::Client,
    base_url: String,
}

// ── MET response types ────────────────────────────────────────────────

/// Response from `/weatherapi/locationforecast/2.0/compact`.
#[derive(Debug, Deserialize)]
pub struct LocationForecastResponse {
    pub properties: ForecastProperties,
}

#[derive(Debug, Deserialize)]
pub struct ForecastProperties {
    #[serde(default)]
    pub timeseries: Vec<TimeStep>,
}

#[derive(Debug, Deserialize)]
pub struct TimeStep {
    pub time: DateTime<Utc>,
    #[serde(default)]
    pub data: TimeStepData,
}

#[derive(Debug, Default, Deserialize)]
pub struct TimeStepData {
    #[serde(default)]
    pub instant: Option<InstantData>,
    #[serde(default)]
    pub next_1_hours: Option<NextHours>,
}

#[derive(Debug, Deserialize)]
pub struct InstantData {
    #[serde(default)]
    pub details: InstantDetails,
}

#[derive(Debug, Default, Deserialize)]
pub struct InstantDetails {
    #[serde(default)]
    pub air_temperature: Option<f64>,
    #[serde(default)]
    pub wind_speed: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct NextHours {
    #[serde(default)]
    pub summary: Option<Summary>,
    #[serde(default)]
    pub details: Option<PeriodDetails>,
}

#[derive(Debug, Deserialize)]
pub struct Summary {
    #[serde(default)]
    pub symbol_code: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PeriodDetails {
    #[serde(default)]
    pub precipitation_amount: Option<f64>,
}

impl TimeStep {
    fn into_entry(self) -> ForecastEntry {
        let details = self.data.instant.map(|i| i.details).unwrap_or_default();
        let (symbol_code, precipitation_amount) = match self.data.next_1_hours {
            Some(next) => (
                next.summary.and_then(|s| s.symbol_code),
                next.details.and_then(|d| d.precipitation_amount),
            ),
            None => (None, None),
        };

        ForecastEntry {
            time: self.time,
            air_temperature: details.air_temperature,
            wind_speed: details.wind_speed,
            precipitation_amount,
            symbol_code,
        }
    }
}

impl LocationForecastResponse {
    pub fn into_snapshot(self) -> ForecastSnapshot {
        ForecastSnapshot {
            entries: self
                .properties
                .timeseries
                .into_iter()
                .map(TimeStep::into_entry)
                .collect(),
        }
    }
}

/// Parse a relayed locationforecast body into a snapshot.
pub fn parse_forecast(body: serde_json::Value) -> Result<ForecastSnapshot, Error> {
    let parsed: LocationForecastResponse = serde_json::from_value(body)?;
    Ok(parsed.into_snapshot())
}

// ── Implementation ────────────────────────────────────────────────────

impl MetClient {
    /// Build a client for `base_url` (e.g. `https://api.met.no`).
    pub fn new(base_url: &str, user_agent: &str) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .pool_max_idle_per_host(4)
            .build()
            .map_err(|e| Error::Config(format!("failed to build MET HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim().trim_end_matches('/').to_string(),
        })
    }

    pub fn compact_url(&self) -> String {
        format!("{}{}", self.base_url, COMPACT_PATH)
    }

    /// Fetch the compact forecast for a coordinate, returning the raw reply.
    ///
    /// Upstream non-2xx statuses are not errors here; they are relayed.
    pub async fn fetch_compact(&self, lat: f64, lon: f64) -> Result<UpstreamResponse, Error> {
        let url = self.compact_url();
        debug!("Fetching MET compact forecast: {} lat={} lon={}", url, lat, lon);

        let resp = self
            .client
            .get(&url)
            .query(&[("lat", lat.to_string()), ("lon", lon.to_string())])
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| {
                Error::Http(format!(
                    "MET request failed for ({lat},{lon}): {}",
                    format_error_chain(&e)
                ))
            })?;

        read_upstream(resp, "MET").await
    }
}
