//! Cleaning pass of the memory tier

use std::time::Instant;

use super::MemoryCacheCore;
use super::holders::HolderRef;
use crate::cache::config::Thresholds;
use crate::cache::traits::{CacheOperationError, CacheResult};
use crate::cache::types::eviction::{CleanableItem, EvictionReport, ItemLoader, clean_sources};
use crate::cache::types::timestamp_millis;

struct HolderLoader {
    thresholds: Thresholds,
    now: i64,
}

impl<V> ItemLoader<HolderRef<V>> for HolderLoader {
    type Item = CleanableItem<HolderRef<V>>;

    fn load(&self, holder: &HolderRef<V>) -> Result<Self::Item, CacheOperationError> {
        Ok(CleanableItem::new(
            holder.clone(),
            self.now - holder.access_time(),
            holder.size(),
            &self.thresholds,
        )
        .with_released(holder.is_cleared()))
    }

    fn discard(&self, _holder: &HolderRef<V>) {}
}

/// Run one pass over a snapshot of `core`'s holders
pub(crate) fn clean_cache<K, V>(core: &MemoryCacheCore<K, V>) -> CacheResult<EvictionReport> {
    let started = Instant::now();
    let (holders, thresholds) = {
        let state = core.lock_state();
        let holders: Vec<HolderRef<V>> = state.map.holders().cloned().collect();
        (holders, state.thresholds)
    };
    log::debug!("cleaning memory cache, {} values", holders.len());

    let loader = HolderLoader {
        thresholds,
        now: timestamp_millis(),
    };
    let report = clean_sources(&loader, holders.iter().cloned(), thresholds.max_size);

    let pruned = {
        let mut state = core.lock_state();
        let mut pruned = 0usize;
        for holder in holders.iter().filter(|holder| holder.is_cleared()) {
            if state.map.remove_holder(holder) {
                pruned += 1;
            }
            state.associations.remove(holder);
        }
        pruned
    };

    log::debug!(
        "done cleaning memory cache in {:.3} sec: {} deleted, {} pruned, {} units remaining",
        started.elapsed().as_secs_f32(),
        report.deleted_items,
        pruned,
        report.remaining_size
    );
    Ok(report)
}
