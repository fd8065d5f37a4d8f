//! Persistent disk tier
//!
//! Layout under the cache directory:
//!
//! ```text
//! <cacheDir>/meta-data/<8-hex-hash>/<record>   entry records, one bucket per key hash
//! <cacheDir>/storage/<scratch>                 payload files and other scratch space
//! <cacheDir>/properties.meta                   persisted thresholds
//! ```
//!
//! Every operation is synchronous on the caller's thread except the cleaning pass,
//! which runs on the cache's background cleaner.

pub mod api;
pub(crate) mod cleaner;
pub mod metadata;
pub mod properties;
pub mod serialization;
pub mod storage;
pub mod utilities;

use std::fs::{self, File};
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::{Duration, SystemTime};

use crossbeam_utils::atomic::AtomicCell;

pub use metadata::MetaData;
pub use properties::{Property, PropertyManager};
pub use serialization::EntryRecord;
pub use storage::Entry;

use utilities::{calculate_size, create_temp_file, delete_content, delete_quietly, delete_recursively};

use crate::cache::config::{DebugConfig, Thresholds};
use crate::cache::traits::{CacheOperationError, CacheResult, KeyManager, Serializer};
use crate::cache::types::eviction::EvictionReport;
use crate::cache::worker::{BackgroundCleaner, CleaningTask};

const SUBDIRECTORY_META_DATA: &str = "meta-data";
const SUBDIRECTORY_STORAGE: &str = "storage";

/// State shared by a cache handle, its entries and its cleaner
pub struct DiskCacheCore<K> {
    cache_directory: PathBuf,
    meta_data_directory: PathBuf,
    storage_directory: PathBuf,
    key_manager: Arc<dyn KeyManager<K>>,
    key_serializer: Arc<dyn Serializer<K>>,
    debug_timeout: AtomicCell<Duration>,
    debug_clean_probability: AtomicCell<f32>,
    properties: PropertyManager,
    cleaner: BackgroundCleaner,
}

impl<K> DiskCacheCore<K> {
    #[inline]
    pub fn cache_directory(&self) -> &Path {
        &self.cache_directory
    }

    #[inline]
    pub fn meta_data_directory(&self) -> &Path {
        &self.meta_data_directory
    }

    #[inline]
    pub fn storage_directory(&self) -> &Path {
        &self.storage_directory
    }

    fn key_manager(&self) -> &dyn KeyManager<K> {
        self.key_manager.as_ref()
    }

    fn key_serializer(&self) -> &dyn Serializer<K> {
        self.key_serializer.as_ref()
    }

    fn bucket_directory(&self, key: &K) -> PathBuf {
        self.meta_data_directory
            .join(format!("{:08X}", self.key_manager.hash_code(key)))
    }

    fn thresholds(&self) -> Thresholds {
        self.properties.thresholds()
    }

    /// Feed the cleaner's throttling counters
    fn notify_access(&self, is_modification: bool) {
        let thresholds = self.thresholds();
        self.cleaner.access(
            is_modification,
            thresholds.clean_time_delay,
            thresholds.clean_modification_count,
        );
    }

    fn debug_pause(&self) {
        let timeout = self.debug_timeout.load();
        if !timeout.is_zero() {
            thread::sleep(timeout);
        }
    }

    /// In debug mode, delete `path` at random to mimic an external cleaner
    fn simulate_clean(&self, path: &Path) {
        let probability = self.debug_clean_probability.load();
        if probability > 0.0 && rand::random::<f32>() < probability {
            log::debug!("clean simulation, force deleting {:?}", path);
            delete_quietly(path);
        }
    }

    fn load_record(&self, path: &Path) -> CacheResult<EntryRecord<K>> {
        let record = EntryRecord::load(path, self.key_serializer())?;
        self.simulate_clean(path);
        self.debug_pause();
        Ok(record)
    }

    fn owns(&self, path: &Path) -> bool {
        path != self.storage_directory
            && path.starts_with(&self.storage_directory)
            && !path
                .components()
                .any(|component| component == Component::ParentDir)
    }

    fn ensure_owned(&self, path: &Path) -> CacheResult<()> {
        if self.owns(path) {
            Ok(())
        } else {
            Err(CacheOperationError::invalid_argument(format!(
                "cache doesn't own file {:?}",
                path
            )))
        }
    }
}

impl<K: Send + Sync + 'static> CleaningTask for DiskCacheCore<K> {
    fn clean_cache(&self) -> CacheResult<EvictionReport> {
        cleaner::clean_cache(self)
    }
}

/// Handle on a disk cache directory
///
/// Cloning is cheap; all clones share one core, one set of thresholds and one
/// background cleaner.
pub struct DiskCache<K> {
    core: Arc<DiskCacheCore<K>>,
}

impl<K> Clone for DiskCache<K> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

impl<K: Send + Sync + 'static> DiskCache<K> {
    /// Open (creating if needed) the cache rooted at `cache_directory`
    ///
    /// `defaults` are used for every threshold not present in `properties.meta`.
    pub fn open(
        cache_directory: impl Into<PathBuf>,
        key_manager: Arc<dyn KeyManager<K>>,
        key_serializer: Arc<dyn Serializer<K>>,
        debug: DebugConfig,
        defaults: Thresholds,
    ) -> CacheResult<Self> {
        let cache_directory = cache_directory.into();
        let clean_probability = DebugConfig::validate_probability(debug.clean_probability)?;
        fs::create_dir_all(&cache_directory).map_err(|e| {
            CacheOperationError::initialization_failed(format!(
                "cannot create cache directory {:?}: {}",
                cache_directory, e
            ))
        })?;

        let meta_data_directory = cache_directory.join(SUBDIRECTORY_META_DATA);
        let storage_directory = cache_directory.join(SUBDIRECTORY_STORAGE);
        let properties =
            PropertyManager::new(&cache_directory, storage_directory.clone(), defaults);

        let core = Arc::new_cyclic(|weak: &Weak<DiskCacheCore<K>>| {
            let task: Weak<dyn CleaningTask> = weak.clone();
            DiskCacheCore {
                cache_directory: cache_directory.clone(),
                meta_data_directory,
                storage_directory,
                key_manager,
                key_serializer,
                debug_timeout: AtomicCell::new(debug.timeout),
                debug_clean_probability: AtomicCell::new(clean_probability),
                properties,
                cleaner: BackgroundCleaner::new("disk-cache", task),
            }
        });

        log::info!("opened disk cache at {:?}", cache_directory);
        Ok(Self { core })
    }

    /// Root directory of the cache; not where payloads go, see `storage_directory`
    #[inline]
    pub fn cache_directory(&self) -> &Path {
        self.core.cache_directory()
    }

    /// Scratch space owned by the cache
    ///
    /// Callers may create and modify files here at their own risk; anything not
    /// referenced by a record is subject to cleaning.
    #[inline]
    pub fn storage_directory(&self) -> &Path {
        self.core.storage_directory()
    }

    pub fn debug_timeout(&self) -> Duration {
        self.core.debug_timeout.load()
    }

    pub fn set_debug_timeout(&self, timeout: Duration) {
        self.core.debug_timeout.store(timeout);
    }

    pub fn debug_clean_probability(&self) -> f32 {
        self.core.debug_clean_probability.load()
    }

    pub fn set_debug_clean_probability(&self, probability: f32) -> CacheResult<()> {
        let probability = DebugConfig::validate_probability(probability)?;
        self.core.debug_clean_probability.store(probability);
        Ok(())
    }

    pub fn thresholds(&self) -> Thresholds {
        self.core.thresholds()
    }

    pub fn clean_time_delay(&self) -> i64 {
        self.core.properties.get(Property::CleanTimeDelay)
    }

    pub fn set_clean_time_delay(&self, clean_time_delay: i64) -> CacheResult<()> {
        self.core
            .properties
            .set(Property::CleanTimeDelay, clean_time_delay)
    }

    pub fn clean_modification_count(&self) -> i64 {
        self.core.properties.get(Property::CleanModificationCount)
    }

    pub fn set_clean_modification_count(&self, clean_modification_count: i64) -> CacheResult<()> {
        self.core
            .properties
            .set(Property::CleanModificationCount, clean_modification_count)
    }

    pub fn max_age(&self) -> i64 {
        self.core.properties.get(Property::MaxAge)
    }

    /// Items older than this are deleted by the next pass; negative disables
    pub fn set_max_age(&self, max_age: i64) -> CacheResult<()> {
        self.core.properties.set(Property::MaxAge, max_age)
    }

    pub fn max_size(&self) -> i64 {
        self.core.properties.get(Property::MaxSize)
    }

    /// Size budget in bytes; negative disables
    ///
    /// The cache may stay above budget when too few items are old enough to go.
    pub fn set_max_size(&self, max_size: i64) -> CacheResult<()> {
        self.core.properties.set(Property::MaxSize, max_size)
    }

    pub fn expiration_time(&self) -> i64 {
        self.core.properties.get(Property::ExpirationTime)
    }

    /// Items younger than this are protected from cleaning; negative disables
    pub fn set_expiration_time(&self, expiration_time: i64) -> CacheResult<()> {
        self.core
            .properties
            .set(Property::ExpirationTime, expiration_time)
    }

    /// Start a background cleaning pass unless one is running
    pub fn clean(&self) {
        self.core.cleaner.clean();
    }

    #[inline]
    pub fn is_cleaning(&self) -> bool {
        self.core.cleaner.is_cleaning()
    }

    /// Poll until the background pass finishes or `timeout` elapses
    pub fn wait_until_idle(&self, timeout: Duration) -> bool {
        self.core.cleaner.wait_until_idle(timeout)
    }

    /// Delete everything under the cache directory, thresholds included
    pub fn erase(&self) -> CacheResult<()> {
        delete_content(&self.core.cache_directory)?;
        self.core.properties.reload();
        log::debug!("erased disk cache {:?}", self.core.cache_directory);
        Ok(())
    }

    /// Recursive size in bytes of the cache directory
    pub fn size(&self) -> u64 {
        self.core.notify_access(false);
        calculate_size(&self.core.cache_directory)
    }

    /// New empty file in scratch space
    pub fn create_file(&self) -> CacheResult<PathBuf> {
        self.create_scratch(false, "", "")
    }

    pub fn create_file_with(&self, prefix: &str, suffix: &str) -> CacheResult<PathBuf> {
        self.create_scratch(false, prefix, suffix)
    }

    /// New empty directory in scratch space
    pub fn create_directory(&self) -> CacheResult<PathBuf> {
        self.create_scratch(true, "", "")
    }

    pub fn create_directory_with(&self, prefix: &str, suffix: &str) -> CacheResult<PathBuf> {
        self.create_scratch(true, prefix, suffix)
    }

    fn create_scratch(&self, directory: bool, prefix: &str, suffix: &str) -> CacheResult<PathBuf> {
        self.core.notify_access(true);
        Ok(create_temp_file(
            directory,
            prefix,
            suffix,
            &self.core.storage_directory,
        )?)
    }

    /// Whether `path` lies inside scratch space
    #[inline]
    pub fn owns_file(&self, path: &Path) -> bool {
        self.core.owns(path)
    }

    /// Whether the scratch file `path` exists
    pub fn contains_file(&self, path: &Path) -> CacheResult<bool> {
        self.core.ensure_owned(path)?;
        self.core.notify_access(false);

        let exists = path.exists();
        self.core.simulate_clean(path);
        Ok(exists)
    }

    /// Set the modification time of a scratch file to now
    ///
    /// Counts as a modification since the caller likely changed the content.
    pub fn touch_file(&self, path: &Path) -> CacheResult<()> {
        self.core.ensure_owned(path)?;
        self.core.notify_access(true);

        File::open(path)?.set_modified(SystemTime::now())?;
        self.core.simulate_clean(path);
        Ok(())
    }

    /// Delete a scratch file or directory
    pub fn remove_file(&self, path: &Path) -> CacheResult<()> {
        self.core.ensure_owned(path)?;
        self.core.notify_access(true);
        delete_recursively(path)?;
        Ok(())
    }
}

impl<K> std::fmt::Debug for DiskCache<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiskCache")
            .field("cache_directory", &self.core.cache_directory)
            .field("cleaner", &self.core.cleaner)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::traits::{BincodeSerializer, DefaultKeyManager};
    use tempfile::TempDir;

    fn open_with(dir: &Path, debug: DebugConfig) -> CacheResult<DiskCache<String>> {
        DiskCache::open(
            dir,
            Arc::new(DefaultKeyManager::<String>::new()),
            Arc::new(BincodeSerializer::<String>::new()),
            debug,
            Thresholds::disk_defaults(),
        )
    }

    #[test]
    fn test_open_rejects_bad_probability() {
        let dir = TempDir::new().expect("temp dir");
        let debug = DebugConfig {
            clean_probability: 2.0,
            ..DebugConfig::disabled()
        };
        assert!(matches!(
            open_with(dir.path(), debug),
            Err(CacheOperationError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_debug_settings_are_adjustable() {
        let dir = TempDir::new().expect("temp dir");
        let cache = open_with(dir.path(), DebugConfig::enabled()).expect("open");
        assert_eq!(cache.debug_timeout(), DebugConfig::DEBUG_TIMEOUT);
        assert_eq!(cache.debug_clean_probability(), DebugConfig::DEBUG_CLEAN_PROBABILITY);

        cache.set_debug_timeout(Duration::ZERO);
        assert!(cache.set_debug_clean_probability(-0.5).is_err());
        assert_eq!(cache.debug_clean_probability(), DebugConfig::DEBUG_CLEAN_PROBABILITY);
        cache.set_debug_clean_probability(0.0).expect("probability");
        assert_eq!(cache.debug_clean_probability(), 0.0);
    }

    #[test]
    fn test_simulated_cleaning_deletes_committed_record() {
        let dir = TempDir::new().expect("temp dir");
        let cache = open_with(dir.path(), DebugConfig::disabled()).expect("open");
        cache.set_debug_clean_probability(1.0).expect("probability");

        let mut entry = cache.create("doomed".to_string());
        entry.commit().expect("commit");
        assert!(!entry.exists());
        assert!(cache.search(&"doomed".to_string()).is_none());
    }

    #[test]
    fn test_threshold_setters_round_trip() {
        let dir = TempDir::new().expect("temp dir");
        let cache = open_with(dir.path(), DebugConfig::disabled()).expect("open");

        cache.set_clean_time_delay(5).expect("set");
        cache.set_clean_modification_count(6).expect("set");
        cache.set_max_age(7).expect("set");
        cache.set_max_size(8).expect("set");
        cache.set_expiration_time(9).expect("set");

        let reopened = open_with(dir.path(), DebugConfig::disabled()).expect("open");
        assert_eq!(
            reopened.thresholds(),
            Thresholds {
                clean_time_delay: 5,
                clean_modification_count: 6,
                max_age: 7,
                max_size: 8,
                expiration_time: 9,
            }
        );
    }

    #[test]
    fn test_scratch_space_ownership() {
        let dir = TempDir::new().expect("temp dir");
        let cache = open_with(dir.path(), DebugConfig::disabled()).expect("open");

        let file = cache.create_file_with("img-", ".png").expect("file");
        let directory = cache.create_directory().expect("directory");
        assert!(cache.contains_file(&file).expect("contains"));
        assert!(directory.is_dir());
        cache.touch_file(&file).expect("touch");

        let outside = dir.path().join("properties.meta");
        assert!(matches!(
            cache.contains_file(&outside),
            Err(CacheOperationError::InvalidArgument(_))
        ));
        assert!(cache.touch_file(&outside).is_err());
        assert!(cache.remove_file(cache.storage_directory()).is_err());
        let escaping = cache.storage_directory().join("..").join("meta-data");
        assert!(cache.remove_file(&escaping).is_err());

        cache.remove_file(&file).expect("remove");
        assert!(!cache.contains_file(&file).expect("contains"));
    }

    #[test]
    fn test_erase_and_size() {
        let dir = TempDir::new().expect("temp dir");
        let cache = open_with(dir.path(), DebugConfig::disabled()).expect("open");

        let file = cache.create_file().expect("file");
        fs::write(&file, [1u8; 64]).expect("write");
        let mut entry = cache.create("k".to_string());
        entry.commit().expect("commit");
        let record_size = calculate_size(entry.record_path().expect("record"));
        assert_eq!(cache.size(), 64 + record_size);

        cache.erase().expect("erase");
        assert_eq!(cache.size(), 0);
        assert!(dir.path().is_dir());
        assert!(cache.search(&"k".to_string()).is_none());
    }
}
