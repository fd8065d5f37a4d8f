//! Cleaning pass of the disk tier
//!
//! Record files are scored by their access time and sized together with their
//! payload. Whatever else sits in `storage` and is not referenced by a surviving
//! record is scored by modification time. Records come first in both lists.

use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use super::DiskCacheCore;
use super::utilities::{calculate_size, delete_quietly, list_files};
use crate::cache::config::Thresholds;
use crate::cache::traits::{CacheOperationError, CacheResult};
use crate::cache::types::eviction::{
    CleanableItem, EvictionReport, Evictable, ItemLoader, classify, clean_partition,
};
use crate::cache::types::{system_time_millis, timestamp_millis};

/// A deletable file of the disk tier
#[derive(Debug, Clone)]
pub(crate) enum DiskSource {
    /// Installed entry record; deleting it leaves the payload for a later pass
    Record { path: PathBuf, payload: Option<PathBuf> },
    /// Anything in scratch space not referenced by a record
    Scratch { path: PathBuf },
}

impl Evictable for DiskSource {
    fn evict(&self) {
        match self {
            DiskSource::Record { path, .. } => {
                log::trace!("evicting record {:?}", path);
                delete_quietly(path);
            }
            DiskSource::Scratch { path } => {
                log::trace!("evicting scratch file {:?}", path);
                delete_quietly(path);
            }
        }
    }
}

type DiskItem = CleanableItem<DiskSource>;

struct RecordLoader<'a, K> {
    core: &'a DiskCacheCore<K>,
    thresholds: Thresholds,
    now: i64,
}

impl<K: Send + Sync + 'static> ItemLoader<PathBuf> for RecordLoader<'_, K> {
    type Item = DiskItem;

    fn load(&self, path: &PathBuf) -> Result<DiskItem, CacheOperationError> {
        let record = self.core.load_record(path)?;
        let size = calculate_size(path) + record.file.as_deref().map_or(0, calculate_size);
        let source = DiskSource::Record {
            path: path.clone(),
            payload: record.file,
        };
        Ok(CleanableItem::new(
            source,
            self.now - record.access_time,
            size,
            &self.thresholds,
        ))
    }

    fn discard(&self, path: &PathBuf) {
        delete_quietly(path);
    }
}

struct ScratchLoader {
    thresholds: Thresholds,
    now: i64,
}

impl ItemLoader<PathBuf> for ScratchLoader {
    type Item = DiskItem;

    fn load(&self, path: &PathBuf) -> Result<DiskItem, CacheOperationError> {
        let modified = fs::symlink_metadata(path)?.modified()?;
        Ok(CleanableItem::new(
            DiskSource::Scratch { path: path.clone() },
            self.now - system_time_millis(modified),
            calculate_size(path),
            &self.thresholds,
        ))
    }

    fn discard(&self, path: &PathBuf) {
        delete_quietly(path);
    }
}

fn referenced_payloads(items: &[DiskItem]) -> impl Iterator<Item = PathBuf> + '_ {
    items.iter().filter_map(|item| match item.source() {
        DiskSource::Record {
            payload: Some(payload),
            ..
        } => Some(payload.clone()),
        _ => None,
    })
}

/// Run one full pass over `core`
pub(crate) fn clean_cache<K: Send + Sync + 'static>(
    core: &DiskCacheCore<K>,
) -> CacheResult<EvictionReport> {
    let started = Instant::now();
    let thresholds = core.thresholds();
    let now = timestamp_millis();
    log::debug!("cleaning disk cache {:?}", core.cache_directory());

    let record_files = list_files(core.meta_data_directory(), true);
    let records = classify(
        &RecordLoader {
            core,
            thresholds,
            now,
        },
        record_files,
    );

    let referenced: HashSet<PathBuf> = referenced_payloads(&records.expired)
        .chain(referenced_payloads(&records.protected))
        .collect();
    let scratch_files = list_files(core.storage_directory(), true)
        .into_iter()
        .filter(|path| !referenced.contains(path));
    let scratch = classify(&ScratchLoader { thresholds, now }, scratch_files);

    let report = clean_partition(records.merge(scratch), thresholds.max_size);
    log::debug!(
        "done cleaning disk cache in {:.3} sec: {} deleted, {} bytes remaining",
        started.elapsed().as_secs_f32(),
        report.deleted_items,
        report.remaining_size
    );
    Ok(report)
}
