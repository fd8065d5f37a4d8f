//! Key/value operations on top of entries
//!
//! A value is written to its own payload file in scratch space and then attached to
//! the key's entry. The payload and the record have independent lifetimes; these
//! helpers keep them in step for the common cases.

use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use super::DiskCache;
use super::metadata::MetaData;
use super::utilities::{delete_quietly, delete_recursively};
use crate::cache::traits::{CacheResult, Serializer};

impl<K: Send + Sync + 'static> DiskCache<K> {
    pub fn contains(&self, key: &K) -> bool {
        self.search(key).is_some()
    }

    /// Delete the key's payload, then its record
    ///
    /// Returns `false` when there was nothing to remove. Payload files outside
    /// scratch space are left alone.
    pub fn remove(&self, key: &K) -> CacheResult<bool> {
        let Some(mut entry) = self.search(key) else {
            return Ok(false);
        };

        if let Some(payload) = entry.file().map(Path::to_path_buf) {
            if self.owns_file(&payload) {
                delete_recursively(&payload)?;
            }
        }
        entry.remove()?;
        Ok(true)
    }

    /// Metadata of the key's entry, bumping its access time
    pub fn get_metadata(&self, key: &K) -> CacheResult<Option<MetaData>> {
        let Some(mut entry) = self.search(key) else {
            return Ok(None);
        };
        entry.access();
        entry.commit()?;
        Ok(Some(entry.metadata().clone()))
    }

    /// Replace the metadata of the key's entry, creating the entry if needed
    pub fn put_metadata(&self, key: K, metadata: MetaData) -> CacheResult<()> {
        let mut entry = self.entry(key);
        entry.set_metadata(metadata);
        entry.access();
        entry.commit()
    }

    /// Load the key's payload with `serializer`
    ///
    /// A hit bumps the entry's access time. An entry without a payload, or whose
    /// payload has already been cleaned away, is a miss.
    pub fn get<V>(&self, key: &K, serializer: &dyn Serializer<V>) -> CacheResult<Option<V>> {
        let Some(mut entry) = self.search(key) else {
            return Ok(None);
        };
        let Some(payload) = entry.file().map(Path::to_path_buf) else {
            return Ok(None);
        };

        entry.access();
        entry.commit()?;

        let file = match File::open(&payload) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                log::debug!("payload {:?} of a cached entry is gone", payload);
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        serializer.load(&mut BufReader::new(file)).map(Some)
    }

    pub fn put<V>(&self, key: K, value: &V, serializer: &dyn Serializer<V>) -> CacheResult<()> {
        self.put_with_metadata(key, value, None, serializer)
    }

    /// Store `value` under `key`, replacing metadata when `metadata` is given
    ///
    /// The previous payload is deleted only after the new record is installed.
    pub fn put_with_metadata<V>(
        &self,
        key: K,
        value: &V,
        metadata: Option<MetaData>,
        serializer: &dyn Serializer<V>,
    ) -> CacheResult<()> {
        let payload = self.write_payload(value, serializer)?;

        let mut entry = self.entry(key);
        let previous = entry.file().map(Path::to_path_buf);
        entry.set_file(Some(payload.clone()));
        if let Some(metadata) = metadata {
            entry.set_metadata(metadata);
        }
        entry.access();

        if let Err(e) = entry.commit() {
            delete_quietly(&payload);
            return Err(e);
        }

        if let Some(previous) = previous {
            if previous != payload && self.owns_file(&previous) {
                delete_quietly(&previous);
            }
        }
        Ok(())
    }

    fn write_payload<V>(&self, value: &V, serializer: &dyn Serializer<V>) -> CacheResult<PathBuf> {
        let payload = self.create_file_with("value-", "")?;

        let result = (|| -> CacheResult<()> {
            let mut out = BufWriter::new(File::create(&payload)?);
            serializer.save(&mut out, value)?;
            out.flush()?;
            out.get_ref().sync_all()?;
            Ok(())
        })();

        match result {
            Ok(()) => Ok(payload),
            Err(e) => {
                delete_quietly(&payload);
                Err(e)
            }
        }
    }
}
