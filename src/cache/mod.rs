//! Cache system module
//!
//! Two independent tiers sharing one eviction planner and one style of throttled
//! background cleaning.

pub mod config;
pub mod tier;
pub mod traits;
pub mod types;
pub mod worker;
