//! Timestamp utilities

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::time::Duration;

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Timestamp `window` before `reference`
///
/// Saturates at the minimum representable timestamp instead of panicking on
/// absurd retention windows.
pub fn cutoff(reference: DateTime<Utc>, window: Duration) -> DateTime<Utc> {
    let window = ChronoDuration::from_std(window).unwrap_or(ChronoDuration::MAX);
    reference
        .checked_sub_signed(window)
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Format a timestamp for log lines (`2024-01-31 18:04:05`)
pub fn log_stamp(timestamp: DateTime<Utc>) -> String {
    timestamp.format("%Y-%m-%d %H:%M:%S").to_string()
}
