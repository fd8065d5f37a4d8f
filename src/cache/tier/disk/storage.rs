//! Entry lifecycle for the disk tier
//!
//! Records live in `meta-data/<8-hex-hash>/<record>`; each record file is written
//! once to a temp file in `storage` and then renamed into its bucket, so readers
//! only ever see complete records.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::metadata::MetaData;
use super::serialization::EntryRecord;
use super::utilities::{create_temp_file, delete_quietly, delete_recursively, unique_name};
use super::{DiskCache, DiskCacheCore};
use crate::cache::traits::CacheResult;
use crate::cache::types::timestamp_millis;

/// Handle on one disk entry
///
/// An entry is either fresh (never committed, no record file) or backed by exactly
/// one installed record file. Changes stay in memory until [`Entry::commit`].
pub struct Entry<K> {
    owner: Arc<DiskCacheCore<K>>,
    record: EntryRecord<K>,
    entry_file: Option<PathBuf>,
}

impl<K: Send + Sync + 'static> Entry<K> {
    fn new(owner: Arc<DiskCacheCore<K>>, key: K) -> Self {
        let now = timestamp_millis();
        Self {
            owner,
            record: EntryRecord {
                key,
                create_time: now,
                access_time: now,
                metadata: MetaData::new(),
                file: None,
            },
            entry_file: None,
        }
    }

    fn load(owner: Arc<DiskCacheCore<K>>, entry_file: PathBuf) -> CacheResult<Self> {
        let record = owner.load_record(&entry_file)?;
        Ok(Self {
            owner,
            record,
            entry_file: Some(entry_file),
        })
    }

    #[inline]
    pub fn key(&self) -> &K {
        &self.record.key
    }

    #[inline]
    pub fn create_time(&self) -> i64 {
        self.record.create_time
    }

    #[inline]
    pub fn access_time(&self) -> i64 {
        self.record.access_time
    }

    pub fn set_access_time(&mut self, access_time: i64) {
        self.record.access_time = access_time;
    }

    /// Set the access time to now
    pub fn access(&mut self) {
        self.record.access_time = timestamp_millis();
    }

    #[inline]
    pub fn metadata(&self) -> &MetaData {
        &self.record.metadata
    }

    #[inline]
    pub fn metadata_mut(&mut self) -> &mut MetaData {
        &mut self.record.metadata
    }

    pub fn set_metadata(&mut self, metadata: MetaData) {
        self.record.metadata = metadata;
    }

    /// Payload file attached to this entry
    ///
    /// The payload is managed by the caller; removing the record leaves it alone.
    #[inline]
    pub fn file(&self) -> Option<&Path> {
        self.record.file.as_deref()
    }

    pub fn set_file(&mut self, file: Option<PathBuf>) {
        self.record.file = file;
    }

    /// Path of the installed record file, if the entry was loaded or committed
    #[inline]
    pub fn record_path(&self) -> Option<&Path> {
        self.entry_file.as_deref()
    }

    /// Whether the installed record file is still on disk
    pub fn exists(&self) -> bool {
        self.entry_file.as_deref().is_some_and(Path::exists)
    }

    /// Write the entry and atomically install it in its bucket
    ///
    /// A fresh entry gets a new uniquely named record file; a loaded or previously
    /// committed entry replaces its own record file in place.
    pub fn commit(&mut self) -> CacheResult<()> {
        self.owner.notify_access(true);

        let temp_file = create_temp_file(false, "entry-", "-temp", self.owner.storage_directory())?;

        let result = self.install(&temp_file);
        if let Err(e) = &result {
            log::debug!("cannot commit entry: {}", e);
            delete_quietly(&temp_file);
        }
        result
    }

    fn install(&mut self, temp_file: &Path) -> CacheResult<()> {
        self.owner.debug_pause();
        self.record.save(temp_file, self.owner.key_serializer())?;

        let bucket = self.owner.bucket_directory(&self.record.key);
        fs::create_dir_all(&bucket)?;

        // fresh names are claimed by the rename itself, never by an empty file
        let target = match &self.entry_file {
            Some(entry_file) => entry_file.clone(),
            None => bucket.join(unique_name("", "")),
        };

        fs::rename(temp_file, &target)?;
        self.owner.simulate_clean(&target);
        self.entry_file = Some(target);
        Ok(())
    }

    /// Delete the installed record file; a missing file counts as removed
    pub fn remove(&mut self) -> CacheResult<()> {
        self.owner.notify_access(true);

        if let Some(entry_file) = self.entry_file.take() {
            if let Err(e) = delete_recursively(&entry_file) {
                self.entry_file = Some(entry_file);
                return Err(e.into());
            }
        }
        Ok(())
    }
}

impl<K: std::fmt::Debug> std::fmt::Debug for Entry<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Entry")
            .field("record", &self.record)
            .field("entry_file", &self.entry_file)
            .finish()
    }
}

impl<K: Send + Sync + 'static> DiskCache<K> {
    /// Fresh uncommitted entry; touches nothing on disk
    pub fn create(&self, key: K) -> Entry<K> {
        self.core.notify_access(false);
        Entry::new(Arc::clone(&self.core), key)
    }

    /// First entry in the key's bucket whose key is equal to `key`
    ///
    /// Bucket files are scanned in name order. Records that fail to load are
    /// deleted and skipped.
    pub fn search(&self, key: &K) -> Option<Entry<K>> {
        self.core.notify_access(false);

        let bucket = self.core.bucket_directory(key);
        let mut files: Vec<PathBuf> = match fs::read_dir(&bucket) {
            Ok(entries) => entries
                .filter_map(Result::ok)
                .map(|entry| entry.path())
                .collect(),
            Err(_) => return None,
        };
        files.sort();

        for file in files {
            let entry = match Entry::load(Arc::clone(&self.core), file.clone()) {
                Ok(entry) => entry,
                Err(e) => {
                    log::debug!("dropping unreadable record {:?}: {}", file, e);
                    delete_quietly(&file);
                    continue;
                }
            };
            if self.core.key_manager().equals(key, entry.key()) {
                return Some(entry);
            }
        }
        None
    }

    /// `search` falling back to `create`
    pub fn entry(&self, key: K) -> Entry<K> {
        match self.search(&key) {
            Some(entry) => entry,
            None => self.create(key),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::config::DebugConfig;
    use crate::cache::tier::disk::utilities::list_files;
    use crate::cache::traits::{BincodeSerializer, DefaultKeyManager, KeyManager};
    use tempfile::TempDir;

    fn open(dir: &Path) -> DiskCache<String> {
        DiskCache::open(
            dir,
            Arc::new(DefaultKeyManager::<String>::new()),
            Arc::new(BincodeSerializer::<String>::new()),
            DebugConfig::disabled(),
            crate::cache::config::Thresholds::disk_defaults(),
        )
        .expect("open")
    }

    /// Every key lands in the same bucket
    struct CollidingKeys;

    impl KeyManager<String> for CollidingKeys {
        fn hash_code(&self, _key: &String) -> u32 {
            0xCAFE
        }

        fn equals(&self, first: &String, second: &String) -> bool {
            first == second
        }
    }

    fn colliding(dir: &Path) -> DiskCache<String> {
        DiskCache::open(
            dir,
            Arc::new(CollidingKeys),
            Arc::new(BincodeSerializer::<String>::new()),
            DebugConfig::disabled(),
            crate::cache::config::Thresholds::disk_defaults(),
        )
        .expect("open")
    }

    #[test]
    fn test_fresh_entry_touches_nothing() {
        let dir = TempDir::new().expect("temp dir");
        let cache = open(dir.path());
        let entry = cache.create("k".to_string());
        assert!(!entry.exists());
        assert!(entry.record_path().is_none());
        assert!(entry.metadata().is_empty());
        assert!(!dir.path().join("meta-data").exists());
    }

    #[test]
    fn test_commit_then_search_returns_committed_state() {
        let dir = TempDir::new().expect("temp dir");
        let cache = open(dir.path());

        let mut entry = cache.create("alpha".to_string());
        entry.metadata_mut().put_value("etag", "1").expect("metadata");
        entry.set_file(Some(dir.path().join("storage").join("payload")));
        entry.commit().expect("commit");
        assert!(entry.exists());

        let found = cache.search(&"alpha".to_string()).expect("found");
        assert_eq!(found.key(), "alpha");
        assert_eq!(found.metadata(), entry.metadata());
        assert_eq!(found.file(), entry.file());
        assert_eq!(found.create_time(), entry.create_time());
        assert_eq!(found.record_path(), entry.record_path());

        assert!(cache.search(&"beta".to_string()).is_none());
    }

    #[test]
    fn test_bucket_is_named_by_hash() {
        let dir = TempDir::new().expect("temp dir");
        let cache = colliding(dir.path());

        let mut entry = cache.create("k".to_string());
        entry.commit().expect("commit");
        let record = entry.record_path().expect("record");
        assert_eq!(
            record.parent(),
            Some(dir.path().join("meta-data").join("0000CAFE").as_path())
        );
    }

    #[test]
    fn test_recommit_reuses_record_file() {
        let dir = TempDir::new().expect("temp dir");
        let cache = open(dir.path());

        let mut entry = cache.create("alpha".to_string());
        entry.commit().expect("commit");
        let first_path = entry.record_path().expect("record").to_path_buf();

        let mut loaded = cache.search(&"alpha".to_string()).expect("found");
        loaded.metadata_mut().put_value("v", 2).expect("metadata");
        loaded.commit().expect("recommit");
        assert_eq!(loaded.record_path(), Some(first_path.as_path()));

        let bucket = first_path.parent().expect("bucket");
        assert_eq!(fs::read_dir(bucket).expect("read").count(), 1);
        // no temp files left behind in scratch space
        assert_eq!(
            fs::read_dir(dir.path().join("storage")).expect("read").count(),
            0
        );
    }

    #[test]
    fn test_colliding_keys_resolve_by_equality() {
        let dir = TempDir::new().expect("temp dir");
        let cache = colliding(dir.path());

        for key in ["first", "second", "third"] {
            let mut entry = cache.create(key.to_string());
            entry.metadata_mut().put_value("key", key).expect("metadata");
            entry.commit().expect("commit");
        }

        // every key must find its own record whatever order the bucket sorts in
        for key in ["first", "second", "third"] {
            let found = cache.search(&key.to_string()).expect("found");
            assert_eq!(found.key(), key);
            assert_eq!(found.metadata().get_value::<String>("key").as_deref(), Some(key));
        }
        assert!(cache.search(&"fourth".to_string()).is_none());

        let bucket = dir.path().join("meta-data").join("0000CAFE");
        assert_eq!(fs::read_dir(bucket).expect("read").count(), 3);
    }

    #[test]
    fn test_corrupt_records_are_deleted_during_search() {
        let dir = TempDir::new().expect("temp dir");
        let cache = open(dir.path());

        let mut entry = cache.create("alpha".to_string());
        entry.commit().expect("commit");
        let bucket = entry.record_path().and_then(Path::parent).expect("bucket").to_path_buf();

        // sorts before the real record
        let garbage = bucket.join("00000000-garbage");
        fs::write(&garbage, b"not a record").expect("write");

        let found = cache.search(&"alpha".to_string()).expect("found");
        assert_eq!(found.key(), "alpha");
        assert!(!garbage.exists());
    }

    #[test]
    fn test_first_commit_installs_exactly_one_record() {
        let dir = TempDir::new().expect("temp dir");
        let cache = colliding(dir.path());

        let mut entry = cache.create("alpha".to_string());
        entry.commit().expect("commit");

        let bucket = dir.path().join("meta-data").join("0000CAFE");
        let files = list_files(&bucket, false);
        assert_eq!(files.len(), 1);
        assert_eq!(entry.record_path(), Some(files[0].as_path()));
        assert!(fs::metadata(&files[0]).expect("stat").len() > 0);
    }

    #[test]
    fn test_failed_commit_leaves_nothing_behind() {
        let dir = TempDir::new().expect("temp dir");
        let cache = colliding(dir.path());

        // a plain file where the bucket directory should be
        let meta_data = dir.path().join("meta-data");
        fs::create_dir_all(&meta_data).expect("mkdir");
        fs::write(meta_data.join("0000CAFE"), b"in the way").expect("write");

        let mut entry = cache.create("alpha".to_string());
        assert!(entry.commit().is_err());
        assert!(entry.record_path().is_none());
        assert!(!entry.exists());

        assert!(
            !list_files(cache.storage_directory(), true)
                .iter()
                .any(|file| file.to_string_lossy().ends_with("-temp"))
        );
        assert_eq!(list_files(&meta_data, true), vec![meta_data.join("0000CAFE")]);
        assert!(cache.search(&"alpha".to_string()).is_none());
    }

    #[test]
    fn test_record_with_huge_key_length_is_dropped() {
        let dir = TempDir::new().expect("temp dir");
        let cache = colliding(dir.path());
        let bucket = dir.path().join("meta-data").join("0000CAFE");
        fs::create_dir_all(&bucket).expect("mkdir");

        // a 9 byte key frame whose varint claims a string of 2^40 bytes
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&9u64.to_be_bytes());
        bytes.push(0xFD);
        bytes.extend_from_slice(&(1u64 << 40).to_le_bytes());
        bytes.resize(81, 0);
        let record = bucket.join("00000000-forged");
        fs::write(&record, &bytes).expect("write");

        let serializer = BincodeSerializer::<String>::new();
        assert!(EntryRecord::<String>::load(&record, &serializer).is_err());

        assert!(cache.search(&"alpha".to_string()).is_none());
        assert!(!record.exists());
    }

    #[test]
    fn test_remove_is_idempotent() {
        let dir = TempDir::new().expect("temp dir");
        let cache = open(dir.path());

        let mut entry = cache.entry("alpha".to_string());
        entry.commit().expect("commit");
        let record = entry.record_path().expect("record").to_path_buf();

        fs::remove_file(&record).expect("external delete");
        entry.remove().expect("remove missing");
        assert!(!entry.exists());
        entry.remove().expect("remove again");
        assert!(cache.search(&"alpha".to_string()).is_none());
    }

    #[test]
    fn test_entry_prefers_existing_record() {
        let dir = TempDir::new().expect("temp dir");
        let cache = open(dir.path());

        let mut entry = cache.entry("alpha".to_string());
        assert!(!entry.exists());
        entry.set_access_time(42);
        entry.commit().expect("commit");

        let again = cache.entry("alpha".to_string());
        assert!(again.exists());
        assert_eq!(again.access_time(), 42);
    }
}
