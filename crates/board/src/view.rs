//! Row views derived from panel snapshots.

use chrono::{DateTime, TimeZone, Utc};
use common::settings::Language;
use common::time::format_clock;
use common::{DepartureSnapshot, EstimatedCall, ForecastSnapshot};

const PLACEHOLDER: &str = "—";

/// One rendered departure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepartureRow {
    pub line_code: String,
    pub destination: String,
    /// Timetabled time; only shown struck through when delayed.
    pub aimed: Option<String>,
    pub expected: Option<String>,
    pub delayed: bool,
    pub minutes_until: Option<i64>,
}

/// One rendered forecast step.
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherRow {
    pub time: String,
    pub temperature: Option<i64>,
    pub wind: i64,
    pub symbol: String,
    pub precipitation: Option<f64>,
}

/// Half rounds toward positive infinity.
fn round_half_up(x: f64) -> i64 {
    (x + 0.5).floor() as i64
}

fn is_rail(call: &EstimatedCall) -> bool {
    call.line
        .as_ref()
        .and_then(|l| l.transport_mode.as_deref())
        .is_some_and(|mode| mode.eq_ignore_ascii_case("rail"))
}

/// Rail departures only, at most `limit` rows.
pub fn departure_rows<Tz: TimeZone>(
    snapshot: &DepartureSnapshot,
    now: DateTime<Utc>,
    tz: &Tz,
    clock24: bool,
    limit: usize,
) -> Vec<DepartureRow> {
    let clock = |t: DateTime<Utc>| format_clock(&t.with_timezone(tz), clock24);

    snapshot
        .calls
        .iter()
        .filter(|c| is_rail(c))
        .take(limit)
        .map(|call| {
            let aimed = call.aimed_departure_time;
            let expected = call.expected_departure_time.or(aimed);
            let delayed = matches!((aimed, expected), (Some(a), Some(e)) if a != e);
            let line_code = call
                .line
                .as_ref()
                .and_then(|l| l.public_code.clone().or_else(|| l.name.clone()))
                .filter(|code| !code.is_empty())
                .unwrap_or_else(|| PLACEHOLDER.to_string());

            DepartureRow {
                line_code,
                destination: call
                    .destination
                    .clone()
                    .filter(|d| !d.is_empty())
                    .unwrap_or_else(|| PLACEHOLDER.to_string()),
                aimed: aimed.map(clock),
                expected: expected.map(clock),
                delayed,
                minutes_until: expected
                    .map(|e| round_half_up((e - now).num_milliseconds() as f64 / 60_000.0)),
            }
        })
        .collect()
}

/// The first `limit` forecast steps.
pub fn weather_rows<Tz: TimeZone>(
    snapshot: &ForecastSnapshot,
    tz: &Tz,
    clock24: bool,
    limit: usize,
) -> Vec<WeatherRow> {
    snapshot
        .entries
        .iter()
        .take(limit)
        .map(|entry| WeatherRow {
            time: format_clock(&entry.time.with_timezone(tz), clock24),
            temperature: entry.air_temperature.map(round_half_up),
            wind: round_half_up(entry.wind_speed.unwrap_or(0.0)),
            symbol: entry
                .symbol_code
                .as_deref()
                .unwrap_or_default()
                .replace('_', " "),
            precipitation: entry.precipitation_amount,
        })
        .collect()
}

/// `"Updated 13:05"`, with `" (cache)"` when showing the persisted record.
/// Empty before the first update.
pub fn updated_label<Tz: TimeZone>(
    last_updated: Option<DateTime<Utc>>,
    cached: bool,
    tz: &Tz,
    clock24: bool,
    language: Language,
) -> String {
    let Some(at) = last_updated else {
        return String::new();
    };
    let word = match language {
        Language::No => "Oppdatert",
        Language::En => "Updated",
    };
    let suffix = if cached { " (cache)" } else { "" };
    format!("{} {}{}", word, format_clock(&at.with_timezone(tz), clock24), suffix)
}
