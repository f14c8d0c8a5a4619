//! Board-side fetch clients. They talk to the proxy, never to upstream.

use common::error::{format_error_chain, summarize_response_body};
use common::relay::read_upstream;
use common::{DepartureSnapshot, Error, ForecastSnapshot, UpstreamResponse};
use entur_client::{parse_departures, DeparturesQuery};
use met_client::parse_forecast;
use serde_json::json;
use tracing::debug;

use crate::poll::SnapshotSource;

/// HTTP client for the board proxy's `/api/met` and `/api/entur` routes.
///
/// No request timeout is set; a hung request holds its panel until it
/// resolves.
#[derive(Debug, Clone)]
pub struct ProxyClient {
    client: reqwest::Client,
    base_url: String,
}

impl ProxyClient {
    pub fn new(base_url: &str) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::Config(format!("failed to build proxy HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn fetch_weather(&self, lat: f64, lon: f64) -> Result<ForecastSnapshot, Error> {
        let url = format!("{}/api/met", self.base_url);
        debug!("GET {} lat={} lon={}", url, lat, lon);

        let resp = self
            .client
            .get(&url)
            .query(&[("lat", lat.to_string()), ("lon", lon.to_string())])
            .send()
            .await
            .map_err(|e| Error::Http(format!("weather fetch failed: {}", format_error_chain(&e))))?;

        let upstream = ensure_success(read_upstream(resp, "weather proxy").await?)?;
        parse_forecast(upstream.body)
    }

    /// POST the lookup to the departures route. `client_name` is forwarded
    /// for the proxy to use when it has none configured.
    pub async fn fetch_departures(
        &self,
        query: &DeparturesQuery,
        client_name: Option<&str>,
    ) -> Result<DepartureSnapshot, Error> {
        let url = format!("{}/api/entur", self.base_url);
        let mut body = json!({
            "stopPlaceId": query.stop_place_id,
            "timeRangeSec": query.time_range_secs,
            "num": query.num_departures,
        });
        if let Some(name) = client_name {
            body["clientName"] = json!(name);
        }
        debug!("POST {} stop={}", url, query.stop_place_id);

        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                Error::Http(format!("departures fetch failed: {}", format_error_chain(&e)))
            })?;

        let upstream = ensure_success(read_upstream(resp, "departures proxy").await?)?;
        parse_departures(upstream.body)
    }
}

fn ensure_success(upstream: UpstreamResponse) -> Result<UpstreamResponse, Error> {
    if upstream.is_success() {
        return Ok(upstream);
    }
    let message = match upstream.body.get("error").and_then(|v| v.as_str()) {
        Some(msg) => msg.to_string(),
        None => summarize_response_body(&upstream.body.to_string()),
    };
    Err(Error::Upstream {
        status: upstream.status,
        message,
    })
}

/// Weather panel source for a fixed coordinate.
#[derive(Debug, Clone)]
pub struct WeatherSource {
    client: ProxyClient,
    lat: f64,
    lon: f64,
}

impl WeatherSource {
    pub fn new(client: ProxyClient, lat: f64, lon: f64) -> Self {
        Self { client, lat, lon }
    }
}

impl SnapshotSource for WeatherSource {
    type Snapshot = ForecastSnapshot;

    async fn fetch(&self) -> Result<ForecastSnapshot, Error> {
        self.client.fetch_weather(self.lat, self.lon).await
    }
}

/// Departures panel source for one stop place.
#[derive(Debug, Clone)]
pub struct DepartureSource {
    client: ProxyClient,
    query: DeparturesQuery,
    client_name: Option<String>,
}

impl DepartureSource {
    pub fn new(client: ProxyClient, query: DeparturesQuery, client_name: Option<String>) -> Self {
        Self {
            client,
            query,
            client_name,
        }
    }
}

impl SnapshotSource for DepartureSource {
    type Snapshot = DepartureSnapshot;

    async fn fetch(&self) -> Result<DepartureSnapshot, Error> {
        self.client
            .fetch_departures(&self.query, self.client_name.as_deref())
            .await
    }
}
