use chrono::{DateTime, Local, NaiveDateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Deserialize any JSON value into `Option<T>`, mapping type mismatches and nulls to
/// `None` instead of failing the surrounding record.
pub(crate) fn deserialize_lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

/// Like [`deserialize_lenient`] for strings, with `""` treated as absent.
pub(crate) fn deserialize_non_empty<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let s: Option<String> = deserialize_lenient(deserializer)?;
    Ok(s.filter(|s| !s.is_empty()))
}

/// Like [`deserialize_lenient`], falling back to `T::default()`.
pub(crate) fn deserialize_or_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    Ok(deserialize_lenient(deserializer)?.unwrap_or_default())
}

/// A JSON array whose unreadable elements are skipped; anything but an array is empty.
pub(crate) fn deserialize_lenient_seq<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let items: Vec<Value> = deserialize_or_default(deserializer)?;
    Ok(items
        .into_iter()
        .filter_map(|v| serde_json::from_value(v).ok())
        .collect())
}

/// Round to one decimal place.
pub fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

/// Credit counts arrive as JSON numbers; show whole values without a fraction.
pub fn format_number(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        format!("{v}")
    }
}

pub fn format_optional_number(v: Option<f64>) -> String {
    v.map(format_number).unwrap_or_else(|| "?".to_string())
}

pub fn format_signed_number(v: f64) -> String {
    if v > 0.0 {
        format!("+{}", format_number(v))
    } else {
        format_number(v)
    }
}

pub fn format_signed_points(v: f64) -> String {
    if v > 0.0 {
        format!("+{v:.1}")
    } else {
        format!("{v:.1}")
    }
}

/// Parse a history timestamp into local wall-clock time.
///
/// Accepts RFC 3339 and the offset-less ISO form older history files used.
pub fn parse_local_timestamp(s: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Local).naive_local());
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f").ok()
}

/// `MM/DD HH:MM:SS`, or the first 19 characters when the timestamp is unparseable.
pub fn short_timestamp(s: &str) -> String {
    match parse_local_timestamp(s) {
        Some(dt) => dt.format("%m/%d %H:%M:%S").to_string(),
        None => s.chars().take(19).collect(),
    }
}

/// Parse a quota reset time; offset-less values are UTC.
pub fn parse_reset_time(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|n| n.and_utc())
}

/// Countdown until `reset`, e.g. `2d 3h 4m`, `3h 4m`, `4m`.
pub fn format_time_remaining(reset: &str, now: DateTime<Utc>) -> String {
    let Some(reset_at) = parse_reset_time(reset) else {
        return reset.to_string();
    };
    let secs = (reset_at - now).num_seconds();
    if secs <= 0 {
        return "resetting...".to_string();
    }
    let mut hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    if hours >= 24 {
        let days = hours / 24;
        hours %= 24;
        format!("{days}d {hours}h {minutes}m")
    } else if hours > 0 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m")
    }
}

/// Reset time as `HH:MM` UTC for the quota table.
pub fn reset_clock(reset: &str) -> String {
    match parse_reset_time(reset) {
        Some(dt) => dt.format("%H:%M").to_string(),
        None => reset.chars().take(16).collect(),
    }
}

/// Truncate to at most `max` characters without splitting a code point.
pub fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}
