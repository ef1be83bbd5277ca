//! Timestamp layouts accepted from collectors.

use chrono::{DateTime, NaiveDate, NaiveDateTime};

/// Naive layouts tried in order after the offset-aware forms.
const NAIVE_LAYOUTS: [&str; 5] = [
    "%Y-%m-%dT%H:%M:%SZ",
    "%Y-%m-%dT%H:%M:%S%.fZ",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
];

/// Parse a collector timestamp into naive UTC.
///
/// Returns `None` for empty, `unknown`, or anything no layout accepts; the
/// caller decides where such events go.
pub fn parse(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("unknown") {
        return None;
    }

    for layout in NAIVE_LAYOUTS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, layout) {
            return Some(dt);
        }
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_utc());
    }
    if let Ok(dt) = DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%z") {
        return Some(dt.naive_utc());
    }

    // Date-only entries (historical incidents) land at midnight.
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Absolute difference in seconds, if both sides parse.
pub fn delta_secs(a: &str, b: &str) -> Option<f64> {
    let a = parse(a)?;
    let b = parse(b)?;
    Some((b - a).num_milliseconds().abs() as f64 / 1000.0)
}
