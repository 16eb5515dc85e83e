//! Time utilities
//!
//! Wall-clock timestamps that never panic on a misconfigured system clock.

use std::time::{SystemTime, UNIX_EPOCH};
use tracing::warn;

/// Current Unix timestamp as Duration
///
/// Returns zero duration if system time is before epoch.
pub fn current_timestamp_duration() -> std::time::Duration {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| {
            warn!("System time is before UNIX epoch, using zero duration");
            std::time::Duration::from_secs(0)
        })
}

/// Current Unix timestamp (seconds since epoch)
pub fn current_timestamp() -> u64 {
    current_timestamp_duration().as_secs()
}

/// Current Unix timestamp (milliseconds since epoch)
pub fn current_timestamp_millis() -> u64 {
    current_timestamp_duration().as_millis() as u64
}
