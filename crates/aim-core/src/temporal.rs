//! # Temporal Types — UTC Timestamps
//!
//! `Timestamp` is a UTC instant truncated to whole seconds. It is used for
//! the issue time carried inside every secret token (which has one-second
//! resolution on the wire) and for the time a validation run completed.
//!
//! Record-level `created_at`/`updated_at` values are deliberately *not*
//! converted to this type: the two implementations under comparison may
//! write different but equally valid textual forms, and the verifier must
//! report the text it was given, not a normalized version of it.

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// A UTC timestamp, truncated to seconds precision.
///
/// Serializes as an RFC 3339 string with a `Z` suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Current UTC time, truncated to seconds.
    pub fn now() -> Self {
        Self(truncate_to_seconds(Utc::now()))
    }

    /// Create a timestamp from a `chrono::DateTime<Utc>`, truncating sub-seconds.
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self(truncate_to_seconds(dt))
    }

    /// Parse an RFC 3339 string with any offset, converting to UTC.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidTimestamp`] if the string is not RFC 3339.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        let dt = DateTime::parse_from_rfc3339(s).map_err(|e| CoreError::InvalidTimestamp {
            input: s.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self(truncate_to_seconds(dt.with_timezone(&Utc))))
    }

    /// Create a timestamp from Unix epoch seconds.
    ///
    /// Token headers carry an unsigned 64-bit value, so callers may hand in
    /// anything; out-of-range values are rejected rather than wrapped.
    pub fn from_epoch_secs(secs: u64) -> Result<Self, CoreError> {
        let signed = i64::try_from(secs).map_err(|_| CoreError::InvalidTimestamp {
            input: secs.to_string(),
            reason: "exceeds i64 range".to_string(),
        })?;
        let dt = DateTime::from_timestamp(signed, 0).ok_or_else(|| CoreError::InvalidTimestamp {
            input: secs.to_string(),
            reason: "outside the representable calendar range".to_string(),
        })?;
        Ok(Self(dt))
    }

    /// Access the inner `DateTime<Utc>`.
    pub fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// Unix epoch seconds.
    pub fn epoch_secs(&self) -> i64 {
        self.0.timestamp()
    }

    /// Render as ISO8601 with Z suffix (e.g., `2024-01-15T10:30:00Z`).
    pub fn to_iso8601(&self) -> String {
        self.0.format("%Y-%m-%dT%H:%M:%SZ").to_string()
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_iso8601())
    }
}

fn truncate_to_seconds(dt: DateTime<Utc>) -> DateTime<Utc> {
    dt.with_nanosecond(0).unwrap_or(dt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_now_has_no_subseconds() {
        let ts = Timestamp::now();
        assert_eq!(ts.as_datetime().nanosecond(), 0);
    }

    #[test]
    fn test_from_utc_truncates() {
        let dt = Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap();
        let ts = Timestamp::from_utc(dt.with_nanosecond(987_654_321).unwrap());
        assert_eq!(ts.to_iso8601(), "2024-01-15T10:30:00Z");
    }

    #[test]
    fn test_parse_converts_offset() {
        let ts = Timestamp::parse("1985-10-26T01:20:00-07:00").unwrap();
        assert_eq!(ts.to_iso8601(), "1985-10-26T08:20:00Z");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Timestamp::parse("").is_err());
        assert!(Timestamp::parse("2024-01-15").is_err());
        assert!(Timestamp::parse("2024-01-15 10:30:00").is_err());
    }

    #[test]
    fn test_fernet_reference_epoch() {
        // Issue time of the published Fernet reference token.
        let ts = Timestamp::from_epoch_secs(499_162_800).unwrap();
        assert_eq!(ts.to_iso8601(), "1985-10-26T08:20:00Z");
    }

    #[test]
    fn test_epoch_roundtrip() {
        let ts = Timestamp::parse("2024-01-15T10:30:00Z").unwrap();
        let back = Timestamp::from_epoch_secs(ts.epoch_secs() as u64).unwrap();
        assert_eq!(ts, back);
    }

    #[test]
    fn test_epoch_overflow_rejected() {
        assert!(Timestamp::from_epoch_secs(u64::MAX).is_err());
    }

    #[test]
    fn test_display_matches_iso8601() {
        let ts = Timestamp::parse("2024-06-30T23:59:59Z").unwrap();
        assert_eq!(format!("{ts}"), ts.to_iso8601());
    }

    #[test]
    fn test_serde_roundtrip() {
        let ts = Timestamp::parse("2024-01-15T10:30:00Z").unwrap();
        let json = serde_json::to_string(&ts).unwrap();
        let parsed: Timestamp = serde_json::from_str(&json).unwrap();
        assert_eq!(ts, parsed);
    }

    proptest::proptest! {
        #[test]
        fn prop_epoch_and_text_agree(secs in 0u64..253_402_300_800) {
            let ts = Timestamp::from_epoch_secs(secs).unwrap();
            proptest::prop_assert_eq!(ts.epoch_secs(), secs as i64);
            proptest::prop_assert_eq!(Timestamp::parse(&ts.to_iso8601()).unwrap(), ts);
        }
    }
}
