//! Eviction candidate data structures
//!
//! A candidate wraps one source (a record file, a scratch file, a memory holder)
//! together with the age and size observed when it was loaded, and answers the two
//! questions the planner asks: may it be deleted at all, and must it be deleted
//! regardless of the size budget.

use crate::cache::config::Thresholds;
use crate::cache::traits::CacheOperationError;

/// Item the planner can score and delete
pub trait Cleanable {
    /// Milliseconds since last access or modification; negative if clocks disagree
    fn age(&self) -> i64;

    /// Bytes on disk, or abstract units for memory values
    fn size(&self) -> u64;

    /// Whether the item is old enough to be considered at all
    fn can_delete(&self) -> bool;

    /// Whether the item must go regardless of size pressure
    fn should_delete(&self) -> bool;

    /// Remove the item from its owning store
    fn delete(&self);
}

/// Source-specific delete action
pub trait Evictable {
    fn evict(&self);
}

/// Candidate scored against a snapshot of the owning cache's thresholds
#[derive(Debug, Clone)]
pub struct CleanableItem<S> {
    source: S,
    age: i64,
    size: u64,
    expiration_time: i64,
    max_age: i64,
    released: bool,
}

impl<S> CleanableItem<S> {
    /// Create candidate from a source observed at `age` with `size`
    #[inline]
    pub fn new(source: S, age: i64, size: u64, thresholds: &Thresholds) -> Self {
        Self {
            source,
            age,
            size,
            expiration_time: thresholds.expiration_time,
            max_age: thresholds.max_age,
            released: false,
        }
    }

    /// Mark the underlying value as already released by someone else
    ///
    /// Released items are always due for deletion once they are eligible.
    #[inline]
    pub fn with_released(mut self, released: bool) -> Self {
        self.released = released;
        self
    }

    #[inline]
    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn into_source(self) -> S {
        self.source
    }
}

impl<S: Evictable> Cleanable for CleanableItem<S> {
    #[inline]
    fn age(&self) -> i64 {
        self.age
    }

    #[inline]
    fn size(&self) -> u64 {
        self.size
    }

    #[inline]
    fn can_delete(&self) -> bool {
        self.age < 0 || self.age > self.expiration_time
    }

    #[inline]
    fn should_delete(&self) -> bool {
        self.released || (self.max_age >= 0 && self.age > self.max_age)
    }

    fn delete(&self) {
        self.source.evict();
    }
}

/// Turns sources into candidates
///
/// A source that fails to load is handed back to `discard` and takes no further
/// part in the pass. Corrupt state must never block cleaning.
pub trait ItemLoader<S> {
    type Item: Cleanable;

    fn load(&self, source: &S) -> Result<Self::Item, CacheOperationError>;

    fn discard(&self, source: &S);
}
