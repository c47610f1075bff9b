//! Duration parsing and formatting shared by configuration and exclusion windows.
//!
//! Compact duration strings use the units `ms`, `s`, `m`, `h` and `d` and may be
//! concatenated, e.g. `"1h30m"`. Bare digits are read as milliseconds.
use regex::Regex;
use serde::{Deserialize, Deserializer};
use std::sync::OnceLock;

const MILLIS_PER_SECOND: u64 = 1_000;
const MILLIS_PER_MINUTE: u64 = 60 * MILLIS_PER_SECOND;
const MILLIS_PER_HOUR: u64 = 60 * MILLIS_PER_MINUTE;
const MILLIS_PER_DAY: u64 = 24 * MILLIS_PER_HOUR;

fn whole_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(?:\d+(?:ms|s|m|h|d))+$").unwrap_or_else(|_| unreachable!("static pattern"))
    })
}

fn part_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(\d+)(ms|s|m|h|d)").unwrap_or_else(|_| unreachable!("static pattern"))
    })
}

/// Parse a compact duration string into milliseconds.
///
/// Returns `None` for empty input, unknown units, or overflow.
#[must_use]
pub fn parse_duration_millis(input: &str) -> Option<u64> {
    let compact: String = input
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_lowercase();
    if compact.is_empty() {
        return None;
    }
    if compact.chars().all(|c| c.is_ascii_digit()) {
        return compact.parse().ok();
    }
    if !whole_pattern().is_match(&compact) {
        return None;
    }

    let mut total: u64 = 0;
    for caps in part_pattern().captures_iter(&compact) {
        let value: u64 = caps[1].parse().ok()?;
        let unit = match &caps[2] {
            "ms" => 1,
            "s" => MILLIS_PER_SECOND,
            "m" => MILLIS_PER_MINUTE,
            "h" => MILLIS_PER_HOUR,
            "d" => MILLIS_PER_DAY,
            _ => return None,
        };
        total = total.checked_add(value.checked_mul(unit)?)?;
    }
    Some(total)
}

/// Render milliseconds as a short human string such as `"1h 30m"`.
#[must_use]
pub fn format_duration(millis: u64) -> String {
    let days = millis / MILLIS_PER_DAY;
    let hours = (millis % MILLIS_PER_DAY) / MILLIS_PER_HOUR;
    let minutes = (millis % MILLIS_PER_HOUR) / MILLIS_PER_MINUTE;
    let seconds = (millis % MILLIS_PER_MINUTE) / MILLIS_PER_SECOND;

    let mut parts = Vec::new();
    if days > 0 {
        parts.push(format!("{days}d"));
    }
    if hours > 0 {
        parts.push(format!("{hours}h"));
    }
    if minutes > 0 {
        parts.push(format!("{minutes}m"));
    }
    if seconds > 0 || parts.is_empty() {
        parts.push(format!("{seconds}s"));
    }
    parts.join(" ")
}

/// Whether a window opened at `start` and lasting `duration` has elapsed by `now`.
#[must_use]
pub const fn is_window_elapsed(start: u64, duration: u64, now: u64) -> bool {
    now.saturating_sub(start) >= duration
}

/// Milliseconds left in a window, zero once it has elapsed.
#[must_use]
pub const fn remaining_millis(start: u64, duration: u64, now: u64) -> u64 {
    duration.saturating_sub(now.saturating_sub(start))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DurationRepr {
    Millis(u64),
    Text(String),
}

/// Serde helper accepting either integer milliseconds or a compact duration string.
///
/// # Errors
///
/// Returns a deserialization error when the string form cannot be parsed.
pub fn deserialize_millis<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    match DurationRepr::deserialize(deserializer)? {
        DurationRepr::Millis(value) => Ok(value),
        DurationRepr::Text(text) => parse_duration_millis(&text).ok_or_else(|| {
            serde::de::Error::custom(format!("invalid duration string '{text}'"))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_compound_durations() {
        assert_eq!(parse_duration_millis("30m"), Some(30 * MILLIS_PER_MINUTE));
        assert_eq!(
            parse_duration_millis("1h30m"),
            Some(MILLIS_PER_HOUR + 30 * MILLIS_PER_MINUTE)
        );
        assert_eq!(parse_duration_millis("45S"), Some(45_000));
        assert_eq!(parse_duration_millis("2d"), Some(2 * MILLIS_PER_DAY));
        assert_eq!(parse_duration_millis("250ms"), Some(250));
        assert_eq!(parse_duration_millis("1500"), Some(1500));
        assert_eq!(parse_duration_millis(" 1h 5s "), Some(MILLIS_PER_HOUR + 5_000));
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(parse_duration_millis(""), None);
        assert_eq!(parse_duration_millis("m"), None);
        assert_eq!(parse_duration_millis("5w"), None);
        assert_eq!(parse_duration_millis("ten minutes"), None);
        assert_eq!(parse_duration_millis("99999999999999999999d"), None);
    }

    #[test]
    fn formats_largest_units_first() {
        assert_eq!(format_duration(0), "0s");
        assert_eq!(format_duration(45_000), "45s");
        assert_eq!(format_duration(MILLIS_PER_HOUR + 30 * MILLIS_PER_MINUTE), "1h 30m");
        assert_eq!(format_duration(MILLIS_PER_DAY + 5_000), "1d 5s");
    }

    #[test]
    fn window_math_saturates() {
        assert!(!is_window_elapsed(1_000, 500, 1_499));
        assert!(is_window_elapsed(1_000, 500, 1_500));
        assert!(is_window_elapsed(1_000, 0, 1_000));
        assert_eq!(remaining_millis(1_000, 500, 1_200), 300);
        assert_eq!(remaining_millis(1_000, 500, 9_000), 0);
        assert_eq!(remaining_millis(1_000, 500, 0), 500);
    }

    #[test]
    fn deserializes_both_forms() {
        #[derive(Deserialize)]
        struct WindowDoc {
            #[serde(deserialize_with = "deserialize_millis")]
            window: u64,
        }
        let numeric: WindowDoc = serde_json::from_str(r#"{"window": 1200}"#).unwrap();
        assert_eq!(numeric.window, 1200);
        let text: WindowDoc = serde_json::from_str(r#"{"window": "2m"}"#).unwrap();
        assert_eq!(text.window, 2 * MILLIS_PER_MINUTE);
        assert!(serde_json::from_str::<WindowDoc>(r#"{"window": "soon"}"#).is_err());
    }
}
