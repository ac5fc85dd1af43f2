//! Timestamp handling.
//!
//! The network assigns send times in nanoseconds since the epoch. Values can
//! arrive on the wire as JSON numbers or as decimal strings (64-bit values do
//! not survive every JSON serializer intact), and conversion to milliseconds
//! must floor rather than round so the rendered instant never drifts forward.

use chrono::{DateTime, SecondsFormat};

const NANOS_PER_MILLI: i64 = 1_000_000;

/// Floor-divide a nanosecond epoch timestamp down to milliseconds.
pub fn ns_to_millis(ns: i64) -> i64 {
    ns.div_euclid(NANOS_PER_MILLI)
}

/// Render a nanosecond epoch timestamp as an ISO-8601 string (millisecond
/// precision, UTC). Out-of-range values degrade to `None`.
pub fn ns_to_iso(ns: i64) -> Option<String> {
    DateTime::from_timestamp_millis(ns_to_millis(ns))
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
}

/// Current wall-clock time as an ISO-8601 string.
pub fn now_iso() -> String {
    chrono::Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Current wall-clock time in milliseconds since the epoch.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Parse a wire timestamp that may be a JSON number or a decimal string.
/// Anything else degrades to `None`; a bad timestamp must never fail a whole
/// message.
pub fn parse_ns(value: &serde_json::Value) -> Option<i64> {
    match value {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn millis_conversion_floors() {
        assert_eq!(ns_to_millis(1_999_999), 1);
        assert_eq!(ns_to_millis(2_000_000), 2);
        // Floor, not truncation toward zero.
        assert_eq!(ns_to_millis(-1), -1);
    }

    #[test]
    fn iso_round_trip_matches_floored_millis() {
        let ns: i64 = 1_700_000_000_123_456_789;
        let iso = ns_to_iso(ns).unwrap();
        let parsed = DateTime::parse_from_rfc3339(&iso).unwrap();
        assert_eq!(parsed.timestamp_millis(), ns_to_millis(ns));
        assert_eq!(parsed.timestamp_millis(), 1_700_000_000_123);
    }

    #[test]
    fn parse_ns_accepts_number_and_string() {
        assert_eq!(parse_ns(&json!(42_000_000i64)), Some(42_000_000));
        assert_eq!(parse_ns(&json!("1700000000123456789")), Some(1_700_000_000_123_456_789));
    }

    #[test]
    fn parse_ns_degrades_on_garbage() {
        assert_eq!(parse_ns(&json!("not-a-number")), None);
        assert_eq!(parse_ns(&json!(null)), None);
        assert_eq!(parse_ns(&json!({"ns": 1})), None);
        assert_eq!(parse_ns(&json!(1.5)), None);
    }
}
