//! `/api/entur` — departures proxy.
//!
//! Accepts the lookup either as a GET query string or as a POST JSON body
//! with the same field names.

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::HeaderValue;
use axum::response::Response;
use common::config::ENTUR_CLIENT_PLACEHOLDER;
use common::Error;
use entur_client::{DeparturesQuery, DEFAULT_NUM_DEPARTURES, DEFAULT_TIME_RANGE_SECS};
use tracing::{info, warn};

use crate::response::{error_response, preflight, relay};
use crate::server::ProxyState;

/// Used when Entur sends no `Cache-Control` of its own.
pub const DEFAULT_CACHE_CONTROL: &str = "public, s-maxage=30, stale-while-revalidate=30";

/// A validated departures lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnturRequest {
    pub query: DeparturesQuery,
    /// Caller-supplied client name; used only when none is configured.
    pub client_name: Option<String>,
}

/// Raw, unvalidated request fields.
#[derive(Debug, Default)]
pub struct EnturParams {
    pub stop_place_id: Option<String>,
    pub time_range_sec: Option<String>,
    pub num: Option<String>,
    pub client_name: Option<String>,
}

impl EnturParams {
    pub fn from_query(params: &HashMap<String, String>) -> Self {
        Self {
            stop_place_id: params.get("stopPlaceId").cloned(),
            time_range_sec: params.get("timeRangeSec").cloned(),
            num: params.get("num").cloned(),
            client_name: params.get("clientName").cloned(),
        }
    }

    /// Read fields from a JSON object body. Anything that is not an object
    /// yields empty params, which then fails validation.
    pub fn from_json(body: &[u8]) -> Self {
        let value: serde_json::Value = match serde_json::from_slice(body) {
            Ok(v) => v,
            Err(_) => return Self::default(),
        };
        let field = |name: &str| -> Option<String> {
            match value.get(name)? {
                serde_json::Value::String(s) => Some(s.clone()),
                serde_json::Value::Number(n) => Some(n.to_string()),
                serde_json::Value::Null => None,
                other => Some(other.to_string()),
            }
        };
        Self {
            stop_place_id: field("stopPlaceId"),
            time_range_sec: field("timeRangeSec"),
            num: field("num"),
            client_name: field("clientName"),
        }
    }

    pub fn validate(self) -> Result<EnturRequest, Error> {
        let stop_place_id = non_blank(self.stop_place_id)
            .ok_or_else(|| Error::InvalidRequest("Missing or invalid stopPlaceId".into()))?;
        let time_range_secs = parse_positive(self.time_range_sec, "timeRangeSec")?
            .unwrap_or(DEFAULT_TIME_RANGE_SECS);
        let num_departures = parse_positive(self.num, "num")?.unwrap_or(DEFAULT_NUM_DEPARTURES);
        let client_name = non_blank(self.client_name);
        if let Some(name) = &client_name {
            if HeaderValue::from_str(name).is_err() {
                return Err(Error::InvalidRequest("Invalid clientName".into()));
            }
        }

        Ok(EnturRequest {
            query: DeparturesQuery {
                stop_place_id,
                time_range_secs,
                num_departures,
            },
            client_name,
        })
    }
}

fn non_blank(raw: Option<String>) -> Option<String> {
    raw.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Optional positive integer; blank counts as absent.
fn parse_positive(raw: Option<String>, name: &str) -> Result<Option<u32>, Error> {
    let Some(raw) = non_blank(raw) else {
        return Ok(None);
    };
    match raw.parse::<u32>() {
        Ok(v) if v > 0 => Ok(Some(v)),
        _ => Err(Error::InvalidRequest(format!("Invalid {name}"))),
    }
}

/// `ET-Client-Name` to send: configured value, else the caller's, else the
/// placeholder Entur will treat as an anonymous client.
pub fn resolve_client_name<'a>(configured: Option<&'a str>, requested: Option<&'a str>) -> &'a str {
    configured.or(requested).unwrap_or(ENTUR_CLIENT_PLACEHOLDER)
}

async fn forward(state: &ProxyState, params: EnturParams) -> Response {
    let request = match params.validate() {
        Ok(r) => r,
        Err(e) => {
            info!("Rejected Entur request: {}", e);
            return error_response(&e);
        }
    };

    let client_name = resolve_client_name(
        state.entur_client_name.as_deref(),
        request.client_name.as_deref(),
    );

    match state.entur.fetch_departures(&request.query, client_name).await {
        Ok(upstream) => {
            if !upstream.is_success() {
                warn!(
                    "Entur returned {} for {}",
                    upstream.status, request.query.stop_place_id
                );
            }
            relay(upstream, DEFAULT_CACHE_CONTROL)
        }
        Err(e) => {
            warn!(
                "Entur proxy failed for {}: {}",
                request.query.stop_place_id, e
            );
            error_response(&e)
        }
    }
}

pub async fn handle_get(
    State(state): State<Arc<ProxyState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    forward(&state, EnturParams::from_query(&params)).await
}

pub async fn handle_post(State(state): State<Arc<ProxyState>>, body: Bytes) -> Response {
    forward(&state, EnturParams::from_json(&body)).await
}

pub async fn handle_preflight() -> Response {
    preflight("GET, POST, OPTIONS")
}
