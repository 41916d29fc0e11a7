//! Timestamp utilities

use chrono::{DateTime, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Whole seconds since the Unix epoch (wire `timestamp` format)
pub fn epoch_seconds(at: DateTime<Utc>) -> i64 {
    at.timestamp()
}

/// Floor-convert milliseconds to whole seconds
pub fn millis_to_whole_seconds(millis: u64) -> u64 {
    millis / 1000
}
