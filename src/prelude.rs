//! Stashbox prelude - convenient imports for users

pub use crate::builder::{DiskCacheBuilder, MemoryCacheBuilder};

pub use crate::cache::config::{DebugConfig, Thresholds};
pub use crate::cache::tier::disk::{DiskCache, Entry, MetaData, Property};
pub use crate::cache::tier::memory::{Access, MemoryCache, ScopeToken, ValueRef};

pub use crate::cache::traits::{
    BincodeSerializer, CacheOperationError, CacheResult, DefaultKeyManager, JsonSerializer,
    KeyManager, Serializer, UnitLifecycle, ValueLifecycle,
};
pub use crate::cache::types::eviction::EvictionReport;
