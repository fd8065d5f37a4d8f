//! Wall-clock timestamps
//!
//! Ages are computed against wall-clock milliseconds because record files carry
//! their timestamps across process restarts. A clock that moved backwards yields
//! a negative age, which the classifier treats as "may be deleted".

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch
#[inline(always)]
pub fn timestamp_millis() -> i64 {
    system_time_millis(SystemTime::now())
}

/// Convert a `SystemTime` to milliseconds since the Unix epoch
///
/// Times before the epoch map to negative values.
#[inline]
pub fn system_time_millis(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(elapsed) => clamp_millis(elapsed),
        Err(before) => -clamp_millis(before.duration()),
    }
}

/// Age of a timestamp relative to now, in milliseconds
#[inline(always)]
pub fn age_millis(since: i64) -> i64 {
    timestamp_millis().saturating_sub(since)
}

#[inline(always)]
fn clamp_millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}
