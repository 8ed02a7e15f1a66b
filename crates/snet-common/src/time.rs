//! ---
//! snet_section: "01-core-functionality"
//! snet_subsection: "module"
//! snet_type: "source"
//! snet_scope: "code"
//! snet_description: "Shared primitives and utilities for the SensorNet runtime."
//! snet_version: "v0.0.0-prealpha"
//! snet_owner: "tbd"
//! ---
use chrono::{DateTime, TimeZone, Utc};

/// Wall-clock instant used for readings and retention checks.
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Parse a wire timestamp: integer epoch milliseconds or RFC 3339 text.
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(millis) = trimmed.parse::<i64>() {
        return Utc.timestamp_millis_opt(millis).single();
    }
    DateTime::parse_from_rfc3339(trimmed)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

/// Epoch milliseconds, the form timestamps take on the wire.
pub fn to_epoch_millis(ts: &DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_epoch_millis_and_rfc3339() {
        let millis = parse_timestamp("1700000000123").expect("millis");
        assert_eq!(to_epoch_millis(&millis), 1_700_000_000_123);

        let rfc = parse_timestamp("2024-01-01T00:00:00Z").expect("rfc3339");
        assert_eq!(rfc.timestamp(), 1_704_067_200);
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_timestamp("").is_none());
        assert!(parse_timestamp("yesterday").is_none());
    }
}
