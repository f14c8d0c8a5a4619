//! Persisted display settings.

use chrono::Timelike;
use serde::{Deserialize, Serialize};

use crate::time::{is_within_window, minutes_of_day, parse_hhmm};

/// Storage key the settings record lives under.
pub const SETTINGS_KEY: &str = "settings";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Theme {
    Dark,
    Light,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    No,
    En,
}

/// User-facing display settings.
///
/// Every field has a default so a partial record merges over defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplaySettings {
    #[serde(default = "default_theme")]
    pub theme: Theme,
    #[serde(default = "default_language")]
    pub language: Language,
    #[serde(default = "default_true")]
    pub show_weather: bool,
    #[serde(default)]
    pub large_type: bool,
    #[serde(default = "default_type_scale")]
    pub type_scale: f64,
    #[serde(default = "default_true")]
    pub clock24: bool,
    #[serde(default)]
    pub animated_icons: bool,
    /// Overrides the configured stop place when non-blank.
    #[serde(default)]
    pub stop_place_id: String,
    #[serde(default)]
    pub night_mode_enabled: bool,
    #[serde(default = "default_night_start")]
    pub night_start: String,
    #[serde(default = "default_night_end")]
    pub night_end: String,
}

fn default_theme() -> Theme {
    Theme::Dark
}
fn default_language() -> Language {
    Language::No
}
fn default_true() -> bool {
    true
}
fn default_type_scale() -> f64 {
    1.0
}
fn default_night_start() -> String {
    "00:00".into()
}
fn default_night_end() -> String {
    "05:00".into()
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            theme: default_theme(),
            language: default_language(),
            show_weather: true,
            large_type: false,
            type_scale: default_type_scale(),
            clock24: true,
            animated_icons: false,
            stop_place_id: String::new(),
            night_mode_enabled: false,
            night_start: default_night_start(),
            night_end: default_night_end(),
        }
    }
}

impl DisplaySettings {
    /// Stop place to poll: the trimmed override, or `fallback` when blank.
    pub fn effective_stop_id<'a>(&'a self, fallback: &'a str) -> &'a str {
        let trimmed = self.stop_place_id.trim();
        if trimmed.is_empty() {
            fallback
        } else {
            trimmed
        }
    }

    /// Whether the screensaver replaces the panels at `now`.
    pub fn screensaver_active<T: Timelike>(&self, now: &T) -> bool {
        if !self.night_mode_enabled {
            return false;
        }
        is_within_window(
            minutes_of_day(now),
            parse_hhmm(&self.night_start),
            parse_hhmm(&self.night_end),
        )
    }
}
