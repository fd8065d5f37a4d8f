//! Core types for background cache cleaning
//!
//! A cache hands the scheduler a weak handle to something implementing
//! [`CleaningTask`]; the scheduler owns the worker thread and the throttling
//! counters but never keeps the cache alive.

use std::time::Instant;

use crate::cache::traits::CacheResult;
use crate::cache::types::eviction::EvictionReport;

/// One full cleaning pass over a cache instance
pub trait CleaningTask: Send + Sync + 'static {
    /// Score every item, evict what is due and trim to the size budget
    fn clean_cache(&self) -> CacheResult<EvictionReport>;
}

/// Message sent from a caller thread to the cleaning worker
#[derive(Debug, Clone, Copy)]
pub(crate) struct CleanRequest {
    pub requested_at: Instant,
}

impl CleanRequest {
    #[inline]
    pub fn now() -> Self {
        Self {
            requested_at: Instant::now(),
        }
    }
}
