//! Cache configuration
//!
//! Eviction thresholds owned by each cache instance and the debug knobs of the
//! disk tier.

pub mod types;

pub use types::{DebugConfig, Thresholds};
