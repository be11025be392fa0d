//! Common types and utilities shared across domain models

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Generates an identifier for a record created locally
pub fn new_record_id() -> String {
    Uuid::new_v4().to_string()
}

/// Timestamp in milliseconds since Unix epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Creates a timestamp for the current moment
    ///
    /// If system time is somehow before UNIX_EPOCH, falls back to 0
    /// instead of panicking.
    pub fn now() -> Self {
        Self(
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_else(|_| std::time::Duration::from_secs(0))
                .as_millis() as i64,
        )
    }

    /// Creates a timestamp from milliseconds since Unix epoch
    pub fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Returns the timestamp as milliseconds since Unix epoch
    pub fn as_millis(&self) -> i64 {
        self.0
    }

    /// Returns the timestamp as seconds since Unix epoch
    pub fn as_seconds(&self) -> i64 {
        self.0 / 1000
    }

    /// Formats the timestamp as RFC 3339 with millisecond precision (UTC)
    ///
    /// This is the representation used for pull checkpoints on the wire.
    pub fn to_rfc3339(&self) -> String {
        DateTime::<Utc>::from_timestamp_millis(self.0)
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
            .to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    /// Milliseconds elapsed from `earlier` to `self`, clamped at zero
    pub fn millis_since(&self, earlier: Timestamp) -> u64 {
        (self.0 - earlier.0).max(0) as u64
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(value: DateTime<Utc>) -> Self {
        Self(value.timestamp_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_record_ids_are_unique() {
        let a = new_record_id();
        let b = new_record_id();
        assert_ne!(a, b);
        assert_eq!(a.len(), 36);
    }

    #[test]
    fn test_timestamp_now() {
        let t1 = Timestamp::now();
        std::thread::sleep(std::time::Duration::from_millis(10));
        let t2 = Timestamp::now();
        assert!(t2 > t1);
    }

    #[test]
    fn test_timestamp_from_millis() {
        let t = Timestamp::from_millis(1234567890123);
        assert_eq!(t.as_millis(), 1234567890123);
        assert_eq!(t.as_seconds(), 1234567890);
    }

    #[test]
    fn test_timestamp_display() {
        let t = Timestamp::from_millis(1234567890123);
        assert_eq!(t.to_string(), "1234567890123");
    }

    #[test]
    fn test_rfc3339_format() {
        let t = Timestamp::from_millis(1_700_000_000_123);
        assert_eq!(t.to_rfc3339(), "2023-11-14T22:13:20.123Z");
    }

    #[test]
    fn test_millis_since_clamps_negative() {
        let early = Timestamp::from_millis(1000);
        let late = Timestamp::from_millis(1500);
        assert_eq!(late.millis_since(early), 500);
        assert_eq!(early.millis_since(late), 0);
    }
}
