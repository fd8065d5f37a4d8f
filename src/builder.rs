//! Builders for both cache tiers

use std::hash::Hash;
use std::path::PathBuf;
use std::sync::Arc;

use crate::cache::config::{DebugConfig, Thresholds};
use crate::cache::tier::disk::DiskCache;
use crate::cache::tier::memory::MemoryCache;
use crate::cache::traits::{
    BincodeSerializer, CacheResult, DefaultKeyManager, KeyManager, Serializer, UnitLifecycle,
    ValueLifecycle,
};

/// Builder for [`DiskCache`]
pub struct DiskCacheBuilder<K> {
    directory: PathBuf,
    key_manager: Arc<dyn KeyManager<K>>,
    key_serializer: Arc<dyn Serializer<K>>,
    debug: DebugConfig,
    defaults: Thresholds,
}

impl<K> DiskCacheBuilder<K>
where
    K: Hash + Eq + bincode::Encode + bincode::Decode<()> + Send + Sync + 'static,
{
    /// Builder using `Hash`/`Eq` key identity and bincode key records
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self::with_parts(
            directory,
            Arc::new(DefaultKeyManager::<K>::new()),
            Arc::new(BincodeSerializer::<K>::new()),
        )
    }
}

impl<K: Send + Sync + 'static> DiskCacheBuilder<K> {
    pub fn with_parts(
        directory: impl Into<PathBuf>,
        key_manager: Arc<dyn KeyManager<K>>,
        key_serializer: Arc<dyn Serializer<K>>,
    ) -> Self {
        Self {
            directory: directory.into(),
            key_manager,
            key_serializer,
            debug: DebugConfig::disabled(),
            defaults: Thresholds::disk_defaults(),
        }
    }

    /// Switch the fault injection defaults on or off
    pub fn debug_mode(mut self, debug_mode: bool) -> Self {
        self.debug = DebugConfig::for_mode(debug_mode);
        self
    }

    pub fn debug(mut self, debug: DebugConfig) -> Self {
        self.debug = debug;
        self
    }

    /// Thresholds used where `properties.meta` has no value
    pub fn defaults(mut self, defaults: Thresholds) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn build(self) -> CacheResult<DiskCache<K>> {
        DiskCache::open(
            self.directory,
            self.key_manager,
            self.key_serializer,
            self.debug,
            self.defaults,
        )
    }
}

/// Builder for [`MemoryCache`]
pub struct MemoryCacheBuilder<K, V> {
    key_manager: Arc<dyn KeyManager<K>>,
    lifecycle: Arc<dyn ValueLifecycle<V>>,
    thresholds: Thresholds,
}

impl<K, V> MemoryCacheBuilder<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::with_key_manager(Arc::new(DefaultKeyManager::<K>::new()))
    }
}

impl<K, V> Default for MemoryCacheBuilder<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> MemoryCacheBuilder<K, V>
where
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    pub fn with_key_manager(key_manager: Arc<dyn KeyManager<K>>) -> Self {
        Self {
            key_manager,
            lifecycle: Arc::new(UnitLifecycle),
            thresholds: Thresholds::memory_defaults(),
        }
    }

    /// Sizing and release hooks for cached values
    pub fn value_lifecycle(mut self, lifecycle: Arc<dyn ValueLifecycle<V>>) -> Self {
        self.lifecycle = lifecycle;
        self
    }

    pub fn thresholds(mut self, thresholds: Thresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn build(self) -> MemoryCache<K, V> {
        MemoryCache::with_parts(self.key_manager, self.lifecycle, self.thresholds)
    }
}
