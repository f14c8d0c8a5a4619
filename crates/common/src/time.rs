//! Clock formatting and time-of-day windows.

use chrono::Timelike;

const MINUTES_PER_DAY: u32 = 24 * 60;

/// Format a time of day as `"HH:MM"` (24h) or `"hh:MM AM"` / `"hh:MM PM"` (12h).
///
/// Midnight and noon render as 12 in 12h mode.
pub fn format_clock<T: Timelike>(time: &T, clock24: bool) -> String {
    let h = time.hour();
    let m = time.minute();

    if clock24 {
        return format!("{h:02}:{m:02}");
    }

    let suffix = if h >= 12 { "PM" } else { "AM" };
    let h12 = match h % 12 {
        0 => 12,
        other => other,
    };
    format!("{h12:02}:{m:02} {suffix}")
}

/// Minutes since midnight for a time of day.
pub fn minutes_of_day<T: Timelike>(time: &T) -> u32 {
    time.hour() * 60 + time.minute()
}

/// Parse `"HH:MM"` into minutes since midnight.
///
/// Lenient: missing or non-numeric parts count as zero, so `""` and
/// `"7"` parse as 00:00 and 07:00. Results wrap into a single day.
pub fn parse_hhmm(raw: &str) -> u32 {
    let mut parts = raw.trim().splitn(2, ':');
    let h = parts
        .next()
        .and_then(|p| p.trim().parse::<u32>().ok())
        .unwrap_or(0);
    let m = parts
        .next()
        .and_then(|p| p.trim().parse::<u32>().ok())
        .unwrap_or(0);
    (h.saturating_mul(60).saturating_add(m)) % MINUTES_PER_DAY
}

/// Whether `now` (minutes since midnight) lies in `[start, end)`.
///
/// An empty window (`start == end`) never matches. When `start > end`
/// the window wraps past midnight.
pub fn is_within_window(now: u32, start: u32, end: u32) -> bool {
    if start == end {
        return false;
    }
    if start < end {
        return now >= start && now < end;
    }
    now >= start || now < end
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).expect("valid time")
    }

    #[test]
    fn test_format_clock_24h() {
        assert_eq!(format_clock(&t(13, 5), true), "13:05");
        assert_eq!(format_clock(&t(0, 0), true), "00:00");
    }

    #[test]
    fn test_format_clock_12h() {
        assert_eq!(format_clock(&t(13, 5), false), "01:05 PM");
        assert_eq!(format_clock(&t(0, 0), false), "12:00 AM");
        assert_eq!(format_clock(&t(12, 30), false), "12:30 PM");
        assert_eq!(format_clock(&t(9, 41), false), "09:41 AM");
    }

    #[test]
    fn test_parse_hhmm_is_lenient() {
        assert_eq!(parse_hhmm("05:30"), 330);
        assert_eq!(parse_hhmm("7"), 420);
        assert_eq!(parse_hhmm(""), 0);
        assert_eq!(parse_hhmm("xx:15"), 15);
    }

    #[test]
    fn test_window_plain_range() {
        let (start, end) = (parse_hhmm("00:00"), parse_hhmm("05:00"));
        assert!(is_within_window(parse_hhmm("02:00"), start, end));
        assert!(!is_within_window(parse_hhmm("05:00"), start, end));
    }

    #[test]
    fn test_window_wraps_midnight() {
        let (start, end) = (parse_hhmm("23:00"), parse_hhmm("05:00"));
        assert!(is_within_window(parse_hhmm("02:00"), start, end));
        assert!(is_within_window(parse_hhmm("23:30"), start, end));
        assert!(!is_within_window(parse_hhmm("12:00"), start, end));
    }

    #[test]
    fn test_empty_window_never_matches() {
        let at = parse_hhmm("04:00");
        assert!(!is_within_window(at, at, at));
    }
}
