//! Reading upstream replies for verbatim relay.

use reqwest::header::CACHE_CONTROL;
use tracing::debug;

use crate::error::{format_error_chain, summarize_response_body};
use crate::{Error, UpstreamResponse};

/// Collect status, `Cache-Control` and JSON body from an upstream reply.
///
/// Non-2xx replies are returned as-is so the proxy can relay them; only a
/// body that is not JSON (or cannot be read) is an error.
pub async fn read_upstream(
    resp: reqwest::Response,
    source: &str,
) -> Result<UpstreamResponse, Error> {
    let status = resp.status().as_u16();
    let cache_control = resp
        .headers()
        .get(CACHE_CONTROL)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    let bytes = resp.bytes().await.map_err(|e| {
        Error::Http(format!("{source} body read failed: {}", format_error_chain(&e)))
    })?;

    let body: serde_json::Value = serde_json::from_slice(&bytes).map_err(|e| {
        Error::Http(format!(
            "{source} returned non-JSON body (status={status}): {e}: {}",
            summarize_response_body(&String::from_utf8_lossy(&bytes))
        ))
    })?;

    debug!(
        "{} replied status={} cache_control={:?} bytes={}",
        source,
        status,
        cache_control,
        bytes.len()
    );

    Ok(UpstreamResponse {
        status,
        cache_control,
        body,
    })
}
