//! Volatile memory tier
//!
//! Values live in holders keyed by the injected `KeyManager`. Each holder is
//! associated with the scopes that stored or fetched it; erasing a scope releases
//! only the values no other scope still refers to.
//!
//! All shared state of one cache sits behind a single mutex. The cleaning pass
//! works on a snapshot of the holders and takes the lock again only to prune the
//! holders it cleared.

pub mod association;
pub(crate) mod cleaner;
pub mod holders;

use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

pub use association::AssociationSet;
pub use holders::ValueRef;

use holders::{HolderRef, KeyIndex};

use crate::cache::config::Thresholds;
use crate::cache::traits::{
    CacheResult, DefaultKeyManager, KeyManager, UnitLifecycle, ValueLifecycle,
};
use crate::cache::types::eviction::EvictionReport;
use crate::cache::worker::{BackgroundCleaner, CleaningTask};

/// Opaque owner of memory cache associations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeToken(u64);

impl ScopeToken {
    /// Scope used by the cache's own `get`/`put`/`remove`
    pub const MAIN: ScopeToken = ScopeToken(0);
}

pub(crate) struct MemoryState<K, V> {
    pub(crate) map: KeyIndex<K, V>,
    pub(crate) associations: AssociationSet<HolderRef<V>, ScopeToken>,
    pub(crate) thresholds: Thresholds,
}

impl<K, V> MemoryState<K, V> {
    /// Clear `holder` and forget it everywhere
    fn drop_holder(&mut self, holder: &HolderRef<V>) {
        holder.clear();
        self.map.remove_holder(holder);
        self.associations.remove(holder);
    }
}

/// State shared by a cache, its access objects and its cleaner
pub struct MemoryCacheCore<K, V> {
    lifecycle: Arc<dyn ValueLifecycle<V>>,
    state: Mutex<MemoryState<K, V>>,
    next_scope: AtomicU64,
    cleaner: BackgroundCleaner,
}

impl<K, V> MemoryCacheCore<K, V> {
    pub(crate) fn lock_state(&self) -> MutexGuard<'_, MemoryState<K, V>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify_access(&self, state: &MemoryState<K, V>, is_modification: bool) {
        self.cleaner.access(
            is_modification,
            state.thresholds.clean_time_delay,
            state.thresholds.clean_modification_count,
        );
    }
}

impl<K, V> CleaningTask for MemoryCacheCore<K, V>
where
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    fn clean_cache(&self) -> CacheResult<EvictionReport> {
        cleaner::clean_cache(self)
    }
}

/// View of a memory cache bound to one scope
///
/// Values fetched or stored through an access object stay associated with its
/// scope until the scope is erased, the value is replaced, or the cleaner evicts it.
pub struct Access<K, V> {
    core: Arc<MemoryCacheCore<K, V>>,
    token: ScopeToken,
}

impl<K, V> Access<K, V>
where
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    #[inline]
    pub fn token(&self) -> ScopeToken {
        self.token
    }

    /// Look up `key`, associating a hit with this scope
    ///
    /// A value that was cleared from outside is a miss; its holder is dropped.
    pub fn get(&self, key: &K) -> Option<ValueRef<V>> {
        let mut state = self.core.lock_state();
        self.core.notify_access(&state, false);

        let holder = state.map.get(key)?.clone();
        if holder.is_cleared() {
            log::trace!("dropping cleared holder on lookup");
            state.drop_holder(&holder);
            return None;
        }
        holder.touch();
        state.associations.associate(&holder, self.token);
        Some(ValueRef::new(holder))
    }

    /// Store `value` under `key` for this scope
    ///
    /// Any previous value for the key is cleared and loses all its associations,
    /// including those of other scopes.
    pub fn put(&self, key: K, value: V) {
        let mut state = self.core.lock_state();
        self.core.notify_access(&state, true);

        let bucket = state.map.bucket_of(&key);
        let holder = HolderRef::new(bucket, value, Arc::clone(&self.core.lifecycle));
        if let Some(previous) = state.map.insert(key, holder.clone()) {
            previous.clear();
            state.associations.remove(&previous);
        }
        state.associations.add(holder.clone());
        state.associations.associate(&holder, self.token);
    }

    /// Store `value`, or remove the key when `value` is `None`
    pub fn put_option(&self, key: K, value: Option<V>) {
        match value {
            Some(value) => self.put(key, value),
            None => {
                self.remove(&key);
            }
        }
    }

    /// Clear and forget the value under `key`, whichever scope stored it
    pub fn remove(&self, key: &K) -> bool {
        let mut state = self.core.lock_state();
        self.core.notify_access(&state, true);

        let Some(holder) = state.map.remove(key) else {
            return false;
        };
        holder.clear();
        state.associations.remove(&holder);
        true
    }

    /// Release this scope's claims
    ///
    /// Values still associated with another scope remain cached.
    pub fn erase(&self) {
        let mut state = self.core.lock_state();
        self.core.notify_access(&state, true);

        let holders = state.associations.associated(&self.token);
        let mut cleared = 0usize;
        for holder in holders {
            state.associations.disassociate(&holder, &self.token);
            if !state.associations.has_associations(&holder) {
                state.drop_holder(&holder);
                cleared += 1;
            }
        }
        log::debug!("erased scope {:?}, {} values cleared", self.token, cleared);
    }

    /// Total size of the values associated with this scope
    pub fn size(&self) -> u64 {
        let state = self.core.lock_state();
        self.core.notify_access(&state, false);

        state
            .associations
            .associated(&self.token)
            .iter()
            .map(|holder| holder.size())
            .sum()
    }

    /// Start a background cleaning pass of the whole cache
    pub fn clean(&self) {
        self.core.cleaner.clean();
    }
}

impl<K, V> Clone for Access<K, V> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
            token: self.token,
        }
    }
}

impl<K, V> std::fmt::Debug for Access<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Access").field("token", &self.token).finish()
    }
}

/// In-memory cache with scoped ownership
pub struct MemoryCache<K, V> {
    core: Arc<MemoryCacheCore<K, V>>,
}

impl<K, V> Clone for MemoryCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

impl<K, V> MemoryCache<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// Cache with `Hash`/`Eq` key identity, unit sized values and memory defaults
    pub fn new() -> Self {
        Self::with_parts(
            Arc::new(DefaultKeyManager::<K>::new()),
            Arc::new(UnitLifecycle),
            Thresholds::memory_defaults(),
        )
    }
}

impl<K, V> Default for MemoryCache<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> MemoryCache<K, V>
where
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    pub fn with_parts(
        key_manager: Arc<dyn KeyManager<K>>,
        lifecycle: Arc<dyn ValueLifecycle<V>>,
        thresholds: Thresholds,
    ) -> Self {
        let core = Arc::new_cyclic(|weak: &Weak<MemoryCacheCore<K, V>>| {
            let task: Weak<dyn CleaningTask> = weak.clone();
            MemoryCacheCore {
                lifecycle,
                state: Mutex::new(MemoryState {
                    map: KeyIndex::new(key_manager),
                    associations: AssociationSet::new(),
                    thresholds,
                }),
                next_scope: AtomicU64::new(1),
                cleaner: BackgroundCleaner::new("memory-cache", task),
            }
        });
        Self { core }
    }

    /// Access object for the main scope
    pub fn access(&self) -> Access<K, V> {
        self.access_for(ScopeToken::MAIN)
    }

    /// Access object for a freshly minted scope
    pub fn scope(&self) -> Access<K, V> {
        let token = ScopeToken(self.core.next_scope.fetch_add(1, Ordering::Relaxed));
        self.access_for(token)
    }

    pub fn access_for(&self, token: ScopeToken) -> Access<K, V> {
        Access {
            core: Arc::clone(&self.core),
            token,
        }
    }

    pub fn get(&self, key: &K) -> Option<ValueRef<V>> {
        self.access().get(key)
    }

    pub fn put(&self, key: K, value: V) {
        self.access().put(key, value);
    }

    pub fn remove(&self, key: &K) -> bool {
        self.access().remove(key)
    }

    /// Clear every value regardless of scope
    pub fn erase(&self) {
        let mut state = self.core.lock_state();
        self.core.notify_access(&state, true);

        for holder in state.map.holders() {
            holder.clear();
        }
        state.map.clear();
        state.associations.clear();
        log::debug!("erased memory cache");
    }

    /// Total size of all cached values
    pub fn size(&self) -> u64 {
        let state = self.core.lock_state();
        self.core.notify_access(&state, false);
        state.map.holders().map(|holder| holder.size()).sum()
    }

    /// Number of keys currently mapped, cleared holders included
    pub fn len(&self) -> usize {
        self.core.lock_state().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clean(&self) {
        self.core.cleaner.clean();
    }

    #[inline]
    pub fn is_cleaning(&self) -> bool {
        self.core.cleaner.is_cleaning()
    }

    pub fn wait_until_idle(&self, timeout: Duration) -> bool {
        self.core.cleaner.wait_until_idle(timeout)
    }

    pub fn thresholds(&self) -> Thresholds {
        self.core.lock_state().thresholds
    }

    pub fn set_thresholds(&self, thresholds: Thresholds) {
        self.core.lock_state().thresholds = thresholds;
    }

    pub fn clean_time_delay(&self) -> i64 {
        self.thresholds().clean_time_delay
    }

    pub fn set_clean_time_delay(&self, clean_time_delay: i64) {
        self.core.lock_state().thresholds.clean_time_delay = clean_time_delay;
    }

    pub fn clean_modification_count(&self) -> i64 {
        self.thresholds().clean_modification_count
    }

    pub fn set_clean_modification_count(&self, clean_modification_count: i64) {
        self.core.lock_state().thresholds.clean_modification_count = clean_modification_count;
    }

    pub fn max_age(&self) -> i64 {
        self.thresholds().max_age
    }

    pub fn set_max_age(&self, max_age: i64) {
        self.core.lock_state().thresholds.max_age = max_age;
    }

    pub fn max_size(&self) -> i64 {
        self.thresholds().max_size
    }

    pub fn set_max_size(&self, max_size: i64) {
        self.core.lock_state().thresholds.max_size = max_size;
    }

    pub fn expiration_time(&self) -> i64 {
        self.thresholds().expiration_time
    }

    pub fn set_expiration_time(&self, expiration_time: i64) {
        self.core.lock_state().thresholds.expiration_time = expiration_time;
    }
}

impl<K, V> std::fmt::Debug for MemoryCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCache")
            .field("cleaner", &self.core.cleaner)
            .finish()
    }
}
