//! Board configuration types.

use serde::{Deserialize, Serialize};

/// Fallback sent as MET `User-Agent` when none is configured.
pub const MET_USER_AGENT_PLACEHOLDER: &str = "lysaker-board/0.1 (missing MET_USER_AGENT)";

/// Fallback sent as Entur `ET-Client-Name` when none is configured.
pub const ENTUR_CLIENT_PLACEHOLDER: &str = "lysaker-board (missing ENTUR_CLIENT)";

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardConfig {
    /// Proxy server settings.
    #[serde(default)]
    pub proxy: ProxyConfig,

    /// Location and stop the board displays.
    #[serde(default)]
    pub location: LocationConfig,

    /// Board runtime settings (proxy URL, cache file).
    #[serde(default)]
    pub board: BoardRuntimeConfig,

    /// Polling intervals and backoff.
    #[serde(default)]
    pub timing: TimingConfig,

    /// Panel geometry used for row fitting in watch mode.
    #[serde(default)]
    pub layout: LayoutConfig,
}

/// Settings for the HTTP proxy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Socket address the proxy listens on.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// MET requires an identifying User-Agent (app name + contact).
    #[serde(default)]
    pub met_user_agent: String,

    /// Entur requires an `ET-Client-Name` header (e.g. "company-app").
    #[serde(default)]
    pub entur_client: String,

    /// MET API root.
    #[serde(default = "default_met_base_url")]
    pub met_base_url: String,

    /// Entur API root.
    #[serde(default = "default_entur_base_url")]
    pub entur_base_url: String,
}

/// What the board displays.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationConfig {
    /// Latitude for the weather forecast.
    #[serde(default = "default_lat")]
    pub lat: f64,
    /// Longitude for the weather forecast.
    #[serde(default = "default_lon")]
    pub lon: f64,
    /// NSR stop place id (e.g. "NSR:StopPlace:58856").
    #[serde(default = "default_stop_place_id")]
    pub stop_place_id: String,
    /// Departure window requested from Entur (seconds).
    #[serde(default = "default_time_range_secs")]
    pub time_range_secs: u32,
    /// Number of departures requested from Entur.
    #[serde(default = "default_num_departures")]
    pub num_departures: u32,
}

/// Board runtime settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardRuntimeConfig {
    /// Base URL of the proxy the fetch clients call.
    #[serde(default = "default_proxy_url")]
    pub proxy_url: String,
    /// JSON file holding cache records and display settings.
    #[serde(default = "default_cache_path")]
    pub cache_path: String,
    /// Client name passed to the departures proxy.
    #[serde(default = "default_client_name")]
    pub client_name: String,
}

/// Timing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Weather refresh interval after a success.
    #[serde(default = "default_weather_interval")]
    pub weather_interval_secs: u64,

    /// Departures refresh interval after a success.
    #[serde(default = "default_departures_interval")]
    pub departures_interval_secs: u64,

    /// Retry delays indexed by consecutive failures; the last one repeats.
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: Vec<u64>,

    /// Heartbeat log interval in watch mode.
    #[serde(default = "default_heartbeat")]
    pub heartbeat_secs: u64,
}

/// Panel geometry in pixels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutConfig {
    #[serde(default = "default_container_height")]
    pub container_height: f64,
    #[serde(default = "default_header_height")]
    pub header_height: f64,
    #[serde(default = "default_padding")]
    pub padding_top: f64,
    #[serde(default = "default_padding")]
    pub padding_bottom: f64,
    #[serde(default = "default_row_height")]
    pub row_height: f64,
    #[serde(default = "default_gap")]
    pub gap: f64,
}

// ── Defaults ──────────────────────────────────────────────────────────

fn default_bind_addr() -> String {
    "0.0.0.0:3000".into()
}
fn default_met_base_url() -> String {
    "https://api.met.no".into()
}
fn default_entur_base_url() -> String {
    "https://api.entur.io".into()
}

fn default_lat() -> f64 {
    59.9142
}
fn default_lon() -> f64 {
    10.75
}
fn default_stop_place_id() -> String {
    "NSR:StopPlace:58856".into()
}
fn default_time_range_secs() -> u32 {
    3 * 3600
}
fn default_num_departures() -> u32 {
    60
}

fn default_proxy_url() -> String {
    "http://127.0.0.1:3000".into()
}
fn default_cache_path() -> String {
    ".board-cache.json".into()
}
fn default_client_name() -> String {
    "lysaker-info".into()
}

fn default_weather_interval() -> u64 {
    300
}
fn default_departures_interval() -> u64 {
    60
}
fn default_backoff_ms() -> Vec<u64> {
    vec![5_000, 15_000, 30_000]
}
fn default_heartbeat() -> u64 {
    30
}

fn default_container_height() -> f64 {
    600.0
}
fn default_header_height() -> f64 {
    64.0
}
fn default_padding() -> f64 {
    16.0
}
fn default_row_height() -> f64 {
    84.0
}
fn default_gap() -> f64 {
    12.0
}

impl ProxyConfig {
    /// Configured MET User-Agent, or the placeholder when blank.
    pub fn met_user_agent_or_placeholder(&self) -> &str {
        let trimmed = self.met_user_agent.trim();
        if trimmed.is_empty() {
            MET_USER_AGENT_PLACEHOLDER
        } else {
            trimmed
        }
    }

    /// Configured Entur client name, if any.
    pub fn entur_client_name(&self) -> Option<&str> {
        let trimmed = self.entur_client.trim();
        (!trimmed.is_empty()).then_some(trimmed)
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            met_user_agent: String::new(),
            entur_client: String::new(),
            met_base_url: default_met_base_url(),
            entur_base_url: default_entur_base_url(),
        }
    }
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            lat: default_lat(),
            lon: default_lon(),
            stop_place_id: default_stop_place_id(),
            time_range_secs: default_time_range_secs(),
            num_departures: default_num_departures(),
        }
    }
}

impl Default for BoardRuntimeConfig {
    fn default() -> Self {
        Self {
            proxy_url: default_proxy_url(),
            cache_path: default_cache_path(),
            client_name: default_client_name(),
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            weather_interval_secs: default_weather_interval(),
            departures_interval_secs: default_departures_interval(),
            backoff_ms: default_backoff_ms(),
            heartbeat_secs: default_heartbeat(),
        }
    }
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            container_height: default_container_height(),
            header_height: default_header_height(),
            padding_top: default_padding(),
            padding_bottom: default_padding(),
            row_height: default_row_height(),
            gap: default_gap(),
        }
    }
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            proxy: ProxyConfig::default(),
            location: LocationConfig::default(),
            board: BoardRuntimeConfig::default(),
            timing: TimingConfig::default(),
            layout: LayoutConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_fills_defaults() {
        let parsed: BoardConfig = serde_json::from_value(serde_json::json!({
            "location": {"stop_place_id": "NSR:StopPlace:337"},
            "timing": {"departures_interval_secs": 30}
        }))
        .expect("config should deserialize");

        assert_eq!(parsed.location.stop_place_id, "NSR:StopPlace:337");
        assert!((parsed.location.lat - 59.9142).abs() < 1e-9);
        assert_eq!(parsed.timing.departures_interval_secs, 30);
        assert_eq!(parsed.timing.weather_interval_secs, 300);
        assert_eq!(parsed.timing.backoff_ms, vec![5_000, 15_000, 30_000]);
        assert_eq!(parsed.proxy.bind_addr, "0.0.0.0:3000");
        assert_eq!(parsed.layout.row_height, 84.0);
    }

    #[test]
    fn test_identity_placeholders() {
        let mut proxy = ProxyConfig::default();
        assert_eq!(proxy.met_user_agent_or_placeholder(), MET_USER_AGENT_PLACEHOLDER);
        assert_eq!(proxy.entur_client_name(), None);

        proxy.met_user_agent = "lysaker-board/1.0 ops@example.com".into();
        proxy.entur_client = "  acme-lysaker ".into();
        assert_eq!(
            proxy.met_user_agent_or_placeholder(),
            "lysaker-board/1.0 ops@example.com"
        );
        assert_eq!(proxy.entur_client_name(), Some("acme-lysaker"));
    }
}
