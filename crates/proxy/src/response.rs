//! Response helpers shared by both endpoints.

use axum::http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
    CACHE_CONTROL,
};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use common::{Error, UpstreamResponse};
use serde_json::json;

/// JSON response with the permissive CORS origin every reply carries.
pub fn json_response(status: StatusCode, body: serde_json::Value) -> Response {
    let mut resp = (status, Json(body)).into_response();
    resp.headers_mut()
        .insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    resp
}

/// Structured `{"error": ...}` reply for a failed request.
pub fn error_response(err: &Error) -> Response {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let message = match err {
        Error::InvalidRequest(msg) | Error::Http(msg) | Error::Other(msg) => msg.clone(),
        other => other.to_string(),
    };
    json_response(status, json!({ "error": message }))
}

/// Relay an upstream reply verbatim, falling back to `default_cache_control`.
pub fn relay(upstream: UpstreamResponse, default_cache_control: &'static str) -> Response {
    let status = StatusCode::from_u16(upstream.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut resp = json_response(status, upstream.body);

    let cache_control = upstream
        .cache_control
        .as_deref()
        .and_then(|v| HeaderValue::from_str(v).ok())
        .unwrap_or_else(|| HeaderValue::from_static(default_cache_control));
    resp.headers_mut().insert(CACHE_CONTROL, cache_control);
    resp
}

/// 405 for any method an endpoint does not accept.
pub async fn method_not_allowed() -> Response {
    json_response(
        StatusCode::METHOD_NOT_ALLOWED,
        json!({ "error": "Method Not Allowed" }),
    )
}

/// CORS preflight reply advertising `methods`.
pub fn preflight(methods: &'static str) -> Response {
    let mut resp = StatusCode::OK.into_response();
    let headers = resp.headers_mut();
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(ACCESS_CONTROL_ALLOW_METHODS, HeaderValue::from_static(methods));
    headers.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type"),
    );
    resp
}
