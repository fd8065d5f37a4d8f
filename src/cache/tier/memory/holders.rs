//! Key and value holders of the memory tier
//!
//! A [`ValueHolder`] can be cleared in place: the value is released and its size
//! drops to zero while every structure still referring to the holder keeps a valid
//! (now empty) handle. Holders are compared by identity, never by value.

use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use std::collections::HashMap;

use crate::cache::traits::{KeyManager, ValueLifecycle};
use crate::cache::types::timestamp_millis;
use crate::cache::types::eviction::Evictable;

struct Slot<V> {
    value: Option<V>,
    access_time: i64,
}

pub(crate) struct ValueHolder<V> {
    /// Hash bucket of the key this holder was stored under
    bucket: u32,
    slot: Mutex<Slot<V>>,
    lifecycle: Arc<dyn ValueLifecycle<V>>,
}

impl<V> ValueHolder<V> {
    fn lock_slot(&self) -> MutexGuard<'_, Slot<V>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn access_time(&self) -> i64 {
        self.lock_slot().access_time
    }

    pub fn touch(&self) {
        self.lock_slot().access_time = timestamp_millis();
    }

    /// Size of the held value, 0 once cleared
    pub fn size(&self) -> u64 {
        let slot = self.lock_slot();
        slot.value
            .as_ref()
            .map_or(0, |value| self.lifecycle.size(value))
    }

    pub fn is_cleared(&self) -> bool {
        self.lock_slot().value.is_none()
    }

    /// Release the value; later calls are no-ops
    pub fn clear(&self) {
        let value = self.lock_slot().value.take();
        if let Some(value) = value {
            self.lifecycle.release(value);
        }
    }
}

impl<V: Clone> ValueHolder<V> {
    /// Copy of the value, bumping the access time
    pub fn get(&self) -> Option<V> {
        let mut slot = self.lock_slot();
        slot.access_time = timestamp_millis();
        slot.value.clone()
    }
}

/// Shared handle on a holder with identity semantics
pub(crate) struct HolderRef<V>(Arc<ValueHolder<V>>);

impl<V> HolderRef<V> {
    pub fn new(bucket: u32, value: V, lifecycle: Arc<dyn ValueLifecycle<V>>) -> Self {
        Self(Arc::new(ValueHolder {
            bucket,
            slot: Mutex::new(Slot {
                value: Some(value),
                access_time: timestamp_millis(),
            }),
            lifecycle,
        }))
    }

    #[inline]
    pub fn bucket(&self) -> u32 {
        self.0.bucket
    }
}

impl<V> std::ops::Deref for HolderRef<V> {
    type Target = ValueHolder<V>;

    fn deref(&self) -> &ValueHolder<V> {
        &self.0
    }
}

impl<V> Clone for HolderRef<V> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<V> PartialEq for HolderRef<V> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl<V> Eq for HolderRef<V> {}

impl<V> Hash for HolderRef<V> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::ptr::hash(Arc::as_ptr(&self.0), state);
    }
}

impl<V> Evictable for HolderRef<V> {
    fn evict(&self) {
        self.clear();
    }
}

/// Reference to a cached value handed out by `get`
///
/// The value may be cleared at any time by the cache or through another
/// reference; `get` then returns `None`.
pub struct ValueRef<V> {
    holder: HolderRef<V>,
}

impl<V> ValueRef<V> {
    pub(crate) fn new(holder: HolderRef<V>) -> Self {
        Self { holder }
    }

    /// Release the value for every user of this cache entry
    pub fn clear(&self) {
        self.holder.clear();
    }

    pub fn is_cleared(&self) -> bool {
        self.holder.is_cleared()
    }

    pub fn size(&self) -> u64 {
        self.holder.size()
    }

    pub fn access_time(&self) -> i64 {
        self.holder.access_time()
    }

    /// Whether both references point at the same cache entry
    pub fn same_entry(&self, other: &ValueRef<V>) -> bool {
        self.holder == other.holder
    }
}

impl<V: Clone> ValueRef<V> {
    pub fn get(&self) -> Option<V> {
        self.holder.get()
    }
}

impl<V> Clone for ValueRef<V> {
    fn clone(&self) -> Self {
        Self {
            holder: self.holder.clone(),
        }
    }
}

impl<V> std::fmt::Debug for ValueRef<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValueRef")
            .field("cleared", &self.is_cleared())
            .field("access_time", &self.access_time())
            .finish()
    }
}

/// Key to holder map using the injected hash and equality
///
/// Keys are grouped by `KeyManager::hash_code`; within a group they are told apart
/// with `KeyManager::equals`.
pub(crate) struct KeyIndex<K, V> {
    key_manager: Arc<dyn KeyManager<K>>,
    buckets: HashMap<u32, Vec<(K, HolderRef<V>)>>,
    len: usize,
}

impl<K, V> KeyIndex<K, V> {
    pub fn new(key_manager: Arc<dyn KeyManager<K>>) -> Self {
        Self {
            key_manager,
            buckets: HashMap::new(),
            len: 0,
        }
    }

    #[inline]
    pub fn bucket_of(&self, key: &K) -> u32 {
        self.key_manager.hash_code(key)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn get(&self, key: &K) -> Option<&HolderRef<V>> {
        self.buckets
            .get(&self.bucket_of(key))?
            .iter()
            .find(|(stored, _)| self.key_manager.equals(stored, key))
            .map(|(_, holder)| holder)
    }

    /// Insert `holder` under `key`, returning the holder it replaced
    pub fn insert(&mut self, key: K, holder: HolderRef<V>) -> Option<HolderRef<V>> {
        let bucket = self.bucket_of(&key);
        let entries = self.buckets.entry(bucket).or_default();
        if let Some(slot) = entries
            .iter_mut()
            .find(|(stored, _)| self.key_manager.equals(stored, &key))
        {
            return Some(std::mem::replace(&mut slot.1, holder));
        }
        entries.push((key, holder));
        self.len += 1;
        None
    }

    pub fn remove(&mut self, key: &K) -> Option<HolderRef<V>> {
        let bucket = self.bucket_of(key);
        let key_manager = Arc::clone(&self.key_manager);
        self.take_from_bucket(bucket, |(stored, _)| key_manager.equals(stored, key))
    }

    /// Remove `holder` itself, leaving any newer holder for the same key alone
    pub fn remove_holder(&mut self, holder: &HolderRef<V>) -> bool {
        self.take_from_bucket(holder.bucket(), |(_, stored)| stored == holder)
            .is_some()
    }

    fn take_from_bucket<F>(&mut self, bucket: u32, matches: F) -> Option<HolderRef<V>>
    where
        F: Fn(&(K, HolderRef<V>)) -> bool,
    {
        let entries = self.buckets.get_mut(&bucket)?;
        let position = entries.iter().position(matches)?;
        let (_, holder) = entries.swap_remove(position);
        if entries.is_empty() {
            self.buckets.remove(&bucket);
        }
        self.len -= 1;
        Some(holder)
    }

    pub fn holders(&self) -> impl Iterator<Item = &HolderRef<V>> {
        self.buckets
            .values()
            .flat_map(|entries| entries.iter().map(|(_, holder)| holder))
    }

    pub fn clear(&mut self) {
        self.buckets.clear();
        self.len = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::traits::{DefaultKeyManager, UnitLifecycle};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingLifecycle {
        released: AtomicUsize,
    }

    impl ValueLifecycle<String> for CountingLifecycle {
        fn size(&self, value: &String) -> u64 {
            value.len() as u64
        }

        fn release(&self, _value: String) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_clear_releases_once() {
        let lifecycle = Arc::new(CountingLifecycle {
            released: AtomicUsize::new(0),
        });
        let holder = HolderRef::new(0, "hello".to_string(), lifecycle.clone());
        assert_eq!(holder.size(), 5);

        holder.clear();
        holder.clear();
        assert!(holder.is_cleared());
        assert_eq!(holder.size(), 0);
        assert_eq!(holder.get(), None);
        assert_eq!(lifecycle.released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_holders_compare_by_identity() {
        let lifecycle: Arc<dyn ValueLifecycle<u32>> = Arc::new(UnitLifecycle);
        let first = HolderRef::new(0, 1, lifecycle.clone());
        let twin = HolderRef::new(0, 1, lifecycle);
        assert!(first == first.clone());
        assert!(first != twin);
    }

    /// Hashes every key to one bucket but compares case-insensitively
    struct CaseInsensitive;

    impl KeyManager<String> for CaseInsensitive {
        fn hash_code(&self, _key: &String) -> u32 {
            1
        }

        fn equals(&self, first: &String, second: &String) -> bool {
            first.eq_ignore_ascii_case(second)
        }
    }

    #[test]
    fn test_index_uses_injected_equality() {
        let lifecycle: Arc<dyn ValueLifecycle<u32>> = Arc::new(UnitLifecycle);
        let mut index = KeyIndex::new(Arc::new(CaseInsensitive));

        let a = HolderRef::new(1, 1, lifecycle.clone());
        let b = HolderRef::new(1, 2, lifecycle.clone());
        assert!(index.insert("Key".to_string(), a.clone()).is_none());
        assert!(index.insert("other".to_string(), b).is_none());

        assert!(index.get(&"KEY".to_string()) == Some(&a));
        let replacement = HolderRef::new(1, 3, lifecycle);
        assert!(index.insert("key".to_string(), replacement.clone()) == Some(a.clone()));
        assert_eq!(index.len(), 2);

        // the old holder is gone, so removing it by identity is a no-op
        assert!(!index.remove_holder(&a));
        assert!(index.remove_holder(&replacement));
        assert!(index.get(&"key".to_string()).is_none());
        assert!(index.remove(&"OTHER".to_string()).is_some());
        assert_eq!(index.len(), 0);
    }

    #[test]
    fn test_default_manager_separates_keys() {
        let lifecycle: Arc<dyn ValueLifecycle<u32>> = Arc::new(UnitLifecycle);
        let mut index = KeyIndex::new(Arc::new(DefaultKeyManager::<u64>::new()));
        for key in 0..100u64 {
            let bucket = index.bucket_of(&key);
            index.insert(key, HolderRef::new(bucket, key as u32, lifecycle.clone()));
        }
        assert_eq!(index.len(), 100);
        assert_eq!(index.holders().count(), 100);
        assert_eq!(index.get(&42).and_then(|holder| holder.get()), Some(42));
    }
}
