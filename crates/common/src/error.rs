//! Unified error type for the board and its proxy.

use std::error::Error as StdError;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Upstream API error (status={status}): {message}")]
    Upstream { status: u16, message: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// HTTP status the proxy answers with when this error reaches a handler.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::InvalidRequest(_) => 400,
            _ => 500,
        }
    }
}

/// Render an error with its whole source chain.
///
/// Transport errors from reqwest hide the DNS/TLS/socket cause in
/// `source()`; this keeps it visible in logs and proxy error bodies.
pub fn format_error_chain(err: &dyn StdError) -> String {
    let mut message = err.to_string();
    let mut source = err.source();

    while let Some(cause) = source {
        let cause_msg = cause.to_string();
        if !cause_msg.is_empty() && !message.contains(&cause_msg) {
            message.push_str(": ");
            message.push_str(&cause_msg);
        }
        source = cause.source();
    }

    message
}

/// Compact an upstream body for error messages.
pub fn summarize_response_body(raw: &str) -> String {
    const MAX_CHARS: usize = 500;
    let compact = raw.replace(['\n', '\r'], " ");
    match compact.char_indices().nth(MAX_CHARS) {
        Some((idx, _)) => format!("{}…", &compact[..idx]),
        None => compact,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_request_maps_to_400() {
        let err = Error::InvalidRequest("Invalid coordinates".into());
        assert_eq!(err.status_code(), 400);
        assert_eq!(err.to_string(), "Invalid request: Invalid coordinates");
    }

    #[test]
    fn test_summarize_response_body_truncates() {
        let body = "x".repeat(600);
        let summary = summarize_response_body(&body);
        assert_eq!(summary.chars().count(), 501);
        assert!(summary.ends_with('…'));
        assert_eq!(summarize_response_body("a\nb"), "a b");
    }

    #[test]
    fn test_transport_errors_map_to_500() {
        assert_eq!(Error::Http("connection refused".into()).status_code(), 500);
        assert_eq!(
            Error::Upstream {
                status: 503,
                message: "down".into()
            }
            .status_code(),
            500
        );
    }
}
