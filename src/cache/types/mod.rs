//! Generic cache types module
//!
//! Wall-clock helpers and the tier-independent eviction machinery: the cleanable
//! item classifier and the size-budget planner.

pub mod atomic;
pub mod eviction;

pub use atomic::{age_millis, system_time_millis, timestamp_millis};
