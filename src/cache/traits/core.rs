//! Core cache traits
//!
//! These are the seams where callers inject behaviour: key identity for both tiers,
//! key/value codecs for the disk tier and value accounting for the memory tier.

use std::io::{Read, Write};

use super::types_and_enums::CacheOperationError;

/// Key identity strategy
///
/// Buckets on disk and slots in the memory map are derived from `hash_code`, so two
/// keys that are `equals` must produce the same hash code. The hash code must also be
/// stable across process runs for the disk tier to find its own records again.
pub trait KeyManager<K>: Send + Sync {
    /// Hash code of the key
    fn hash_code(&self, key: &K) -> u32;

    /// Whether two keys address the same cache slot
    fn equals(&self, first: &K, second: &K) -> bool;
}

/// Streaming codec for keys, metadata and payload values
pub trait Serializer<T>: Send + Sync {
    /// Write `value` to `writer`
    fn save(&self, writer: &mut dyn Write, value: &T) -> Result<(), CacheOperationError>;

    /// Read a value from `reader`
    fn load(&self, reader: &mut dyn Read) -> Result<T, CacheOperationError>;
}

/// Accounting and release hooks for memory tier values
pub trait ValueLifecycle<V>: Send + Sync {
    /// Size of the value in the cache's abstract unit
    fn size(&self, _value: &V) -> u64 {
        1
    }

    /// Called exactly once when a holder drops its value
    fn release(&self, value: V) {
        drop(value);
    }
}
