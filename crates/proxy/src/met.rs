//! `/api/met` — weather forecast proxy.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::Response;
use common::Error;
use tracing::{info, warn};

use crate::response::{error_response, preflight, relay};
use crate::server::ProxyState;

/// Edge caching allowed when MET sends no `Cache-Control` of its own.
pub const DEFAULT_CACHE_CONTROL: &str = "public, s-maxage=300, stale-while-revalidate=60";

const INVALID_COORDINATES: &str = "Invalid coordinates";

fn parse_coordinate(raw: Option<&String>) -> Option<f64> {
    let trimmed = raw?.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Validate `lat`/`lon`: both present, non-blank, finite numbers.
pub fn parse_coordinates(params: &HashMap<String, String>) -> Result<(f64, f64), Error> {
    match (
        parse_coordinate(params.get("lat")),
        parse_coordinate(params.get("lon")),
    ) {
        (Some(lat), Some(lon)) => Ok((lat, lon)),
        _ => Err(Error::InvalidRequest(INVALID_COORDINATES.into())),
    }
}

pub async fn handle(
    State(state): State<Arc<ProxyState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let (lat, lon) = match parse_coordinates(&params) {
        Ok(coords) => coords,
        Err(e) => {
            info!("Rejected MET request: {} (params={:?})", e, params);
            return error_response(&e);
        }
    };

    match state.met.fetch_compact(lat, lon).await {
        Ok(upstream) => {
            if !upstream.is_success() {
                warn!("MET returned {} for ({},{})", upstream.status, lat, lon);
            }
            relay(upstream, DEFAULT_CACHE_CONTROL)
        }
        Err(e) => {
            warn!("MET proxy failed for ({},{}): {}", lat, lon, e);
            error_response(&e)
        }
    }
}

pub async fn handle_preflight() -> Response {
    preflight("GET, OPTIONS")
}
