//! Configuration loader: merges `.env`, `board.toml`, and environment variables.

use common::config::BoardConfig;
use common::Error;
use std::path::Path;

const CONFIG_FILE: &str = "board.toml";

fn parse_f64(raw: &str, env_name: &str) -> Result<f64, Error> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| Error::Config(format!("{env_name} must be a finite number")))
}

fn non_blank(raw: String) -> Option<String> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn validate_config(config: &BoardConfig) -> Result<(), Error> {
    let mut issues: Vec<String> = Vec::new();

    if config.proxy.bind_addr.parse::<std::net::SocketAddr>().is_err() {
        issues.push(format!(
            "proxy.bind_addr must be a socket address (got {:?})",
            config.proxy.bind_addr
        ));
    }
    for (name, url) in [
        ("proxy.met_base_url", &config.proxy.met_base_url),
        ("proxy.entur_base_url", &config.proxy.entur_base_url),
        ("board.proxy_url", &config.board.proxy_url),
    ] {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            issues.push(format!("{name} must be an http(s) URL"));
        }
    }

    if !(-90.0..=90.0).contains(&config.location.lat) {
        issues.push("location.lat must be in [-90,90]".into());
    }
    if !(-180.0..=180.0).contains(&config.location.lon) {
        issues.push("location.lon must be in [-180,180]".into());
    }
    if config.location.stop_place_id.trim().is_empty() {
        issues.push("location.stop_place_id must not be empty".into());
    }
    if config.location.time_range_secs == 0 {
        issues.push("location.time_range_secs must be > 0".into());
    }
    if config.location.num_departures == 0 {
        issues.push("location.num_departures must be > 0".into());
    }

    if config.board.cache_path.trim().is_empty() {
        issues.push("board.cache_path must not be empty".into());
    }

    if config.timing.weather_interval_secs == 0 {
        issues.push("timing.weather_interval_secs must be > 0".into());
    }
    if config.timing.departures_interval_secs == 0 {
        issues.push("timing.departures_interval_secs must be > 0".into());
    }
    if config.timing.backoff_ms.is_empty() {
        issues.push("timing.backoff_ms must contain at least one delay".into());
    }
    if config.timing.backoff_ms.contains(&0) {
        issues.push("timing.backoff_ms delays must be > 0".into());
    }
    if config.timing.heartbeat_secs == 0 {
        issues.push("timing.heartbeat_secs must be > 0".into());
    }

    if config.layout.container_height < 0.0 {
        issues.push("layout.container_height must be >= 0".into());
    }
    if config.layout.gap < 0.0 {
        issues.push("layout.gap must be >= 0".into());
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "Invalid config:\n - {}",
            issues.join("\n - ")
        )))
    }
}

/// Load board configuration from environment and optional config file.
pub fn load_config() -> Result<BoardConfig, Error> {
    // 1. Load .env file from project root or parent directories.
    if let Err(e) = dotenvy::dotenv() {
        tracing::debug!("No .env file loaded: {}", e);
    }

    // 2. Start with defaults.
    let mut config = BoardConfig::default();

    // 3. Try loading board.toml if it exists.
    let config_path = Path::new(CONFIG_FILE);
    if config_path.exists() {
        let contents = std::fs::read_to_string(config_path)
            .map_err(|e| Error::Config(format!("Failed to read {CONFIG_FILE}: {}", e)))?;
        config = toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("Failed to parse {CONFIG_FILE}: {}", e)))?;
    }

    // 4. Override with environment variables (highest priority).
    if let Ok(ua) = std::env::var("MET_USER_AGENT") {
        config.proxy.met_user_agent = ua.trim().to_string();
    }
    if let Ok(client) = std::env::var("ENTUR_CLIENT") {
        config.proxy.entur_client = client.trim().to_string();
    }
    if let Some(addr) = std::env::var("BIND_ADDR").ok().and_then(non_blank) {
        config.proxy.bind_addr = addr;
    }
    if let Some(url) = std::env::var("MET_API_BASE_URL").ok().and_then(non_blank) {
        config.proxy.met_base_url = url;
    }
    if let Some(url) = std::env::var("ENTUR_API_BASE_URL").ok().and_then(non_blank) {
        config.proxy.entur_base_url = url;
    }
    if let Some(url) = std::env::var("BOARD_PROXY_URL").ok().and_then(non_blank) {
        config.board.proxy_url = url;
    }
    if let Some(path) = std::env::var("BOARD_CACHE_PATH").ok().and_then(non_blank) {
        config.board.cache_path = path;
    }
    if let Ok(raw) = std::env::var("BOARD_LAT") {
        config.location.lat = parse_f64(&raw, "BOARD_LAT")?;
    }
    if let Ok(raw) = std::env::var("BOARD_LON") {
        config.location.lon = parse_f64(&raw, "BOARD_LON")?;
    }
    if let Some(id) = std::env::var("BOARD_STOPPLACE_ID").ok().and_then(non_blank) {
        config.location.stop_place_id = id;
    }

    validate_config(&config)?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults_validate() {
        validate_config(&BoardConfig::default()).expect("defaults should be valid");
    }

    #[test]
    fn test_validation_collects_every_issue() {
        let mut config = BoardConfig::default();
        config.location.lat = 123.0;
        config.location.stop_place_id = "  ".into();
        config.timing.backoff_ms.clear();
        config.board.proxy_url = "localhost:3000".into();

        let err = validate_config(&config).expect_err("should be invalid");
        let msg = err.to_string();
        assert!(msg.contains("location.lat"));
        assert!(msg.contains("location.stop_place_id"));
        assert!(msg.contains("timing.backoff_ms"));
        assert!(msg.contains("board.proxy_url"));
    }

    #[test]
    fn test_parse_helpers() {
        assert_eq!(parse_f64(" 59.9 ", "BOARD_LAT").expect("number"), 59.9);
        assert!(parse_f64("abc", "BOARD_LAT").is_err());
        assert!(parse_f64("inf", "BOARD_LAT").is_err());
        assert_eq!(non_blank("  x ".into()).as_deref(), Some("x"));
        assert_eq!(non_blank("   ".into()), None);
    }

    #[test]
    fn test_board_toml_sections_parse() {
        let config: BoardConfig = toml::from_str(
            r#"
            [proxy]
            bind_addr = "127.0.0.1:8080"
            entur_client = "acme-lysaker"

            [location]
            stop_place_id = "NSR:StopPlace:337"

            [timing]
            backoff_ms = [1000, 2000]
            "#,
        )
        .expect("toml should parse");

        assert_eq!(config.proxy.bind_addr, "127.0.0.1:8080");
        assert_eq!(config.proxy.entur_client_name(), Some("acme-lysaker"));
        assert_eq!(config.location.stop_place_id, "NSR:StopPlace:337");
        assert_eq!(config.timing.backoff_ms, vec![1000, 2000]);
        assert_eq!(config.timing.departures_interval_secs, 60);
        validate_config(&config).expect("valid");
    }
}
