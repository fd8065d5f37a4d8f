//! Core configuration types
//!
//! All thresholds are plain `i64` so that negative values can carry their
//! "disabled" meaning the same way on disk and in memory.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::traits::CacheOperationError;

const SECOND: i64 = 1000;
const MINUTE: i64 = 60 * SECOND;
const HOUR: i64 = 60 * MINUTE;
const DAY: i64 = 24 * HOUR;

/// Eviction thresholds of one cache instance
///
/// Times are milliseconds. Sizes are bytes for the disk tier and abstract units
/// (see `ValueLifecycle::size`) for the memory tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Thresholds {
    /// Elapsed time since the last pass after which any access triggers a new one
    pub clean_time_delay: i64,
    /// Modifications since the last pass after which a new one is triggered
    pub clean_modification_count: i64,
    /// Age beyond which an item is evicted unconditionally; negative disables
    pub max_age: i64,
    /// Total size budget; negative means unlimited
    pub max_size: i64,
    /// Minimum age before an item may be evicted at all; negative makes every item eligible
    pub expiration_time: i64,
}

impl Thresholds {
    /// Defaults for the persistent tier
    pub const fn disk_defaults() -> Self {
        Self {
            clean_time_delay: 10 * MINUTE,
            clean_modification_count: 1000,
            max_age: 7 * DAY,
            max_size: 10 * 1024 * 1024,
            expiration_time: 12 * HOUR,
        }
    }

    /// Defaults for the volatile tier
    pub const fn memory_defaults() -> Self {
        Self {
            clean_time_delay: 3 * MINUTE,
            clean_modification_count: 100,
            max_age: HOUR,
            max_size: 256,
            expiration_time: MINUTE,
        }
    }
}

/// Fault injection for exercising callers against a misbehaving disk
///
/// Every record load and commit waits `timeout` and then, with probability
/// `clean_probability`, deletes the file it just touched.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DebugConfig {
    pub timeout: Duration,
    pub clean_probability: f32,
}

impl DebugConfig {
    pub const DEBUG_TIMEOUT: Duration = Duration::from_millis(250);
    pub const DEBUG_CLEAN_PROBABILITY: f32 = 0.1;

    /// No delays, no simulated deletions
    pub const fn disabled() -> Self {
        Self {
            timeout: Duration::ZERO,
            clean_probability: 0.0,
        }
    }

    /// Settings used when a cache is opened in debug mode
    pub const fn enabled() -> Self {
        Self {
            timeout: Self::DEBUG_TIMEOUT,
            clean_probability: Self::DEBUG_CLEAN_PROBABILITY,
        }
    }

    pub fn for_mode(debug_mode: bool) -> Self {
        if debug_mode {
            Self::enabled()
        } else {
            Self::disabled()
        }
    }

    /// Reject probabilities outside `[0, 1]`
    pub fn validate_probability(probability: f32) -> Result<f32, CacheOperationError> {
        if (0.0..=1.0).contains(&probability) {
            Ok(probability)
        } else {
            Err(CacheOperationError::invalid_argument(format!(
                "probability value should be in [0.0; 1.0], got {}",
                probability
            )))
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self::disabled()
    }
}
