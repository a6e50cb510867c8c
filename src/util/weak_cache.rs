use dashmap::DashMap;
use std::sync::{Arc, Weak};

struct CacheEntry<K, V> {
    weak: Weak<K>,
    value: V,
}

/// A concurrent map for values that are derived from an `Arc<K>`, keyed by the identity (address) of that Arc.
/// Entries don't keep their key alive: once every strong reference to the key is gone, the entry is pruned
/// the next time the map would have to grow. Holding the [`Weak`] in the entry also keeps the allocation (and as
/// such the address) reserved, so a dead key can never alias a freshly allocated one.
pub struct WeakKeyCache<K, V> {
    inner: DashMap<usize, CacheEntry<K, V>>,
}

impl<K, V: Clone> WeakKeyCache<K, V> {
    pub fn new() -> Self {
        Self {
            inner: DashMap::new(),
        }
    }

    #[inline]
    fn key_of(key: &Arc<K>) -> usize {
        Arc::as_ptr(key) as usize
    }

    pub fn get(&self, key: &Arc<K>) -> Option<V> {
        self.inner
            .get(&Self::key_of(key))
            .filter(|entry| entry.weak.strong_count() > 0)
            .map(|entry| entry.value.clone())
    }

    /// Returns the cached value for `key` or computes it. Two threads may race to compute the value for the
    /// same key, in which case the value that has been inserted first wins and the other one is dropped.
    pub fn get_or_insert_with<F>(&self, key: &Arc<K>, compute: F) -> V
    where
        F: FnOnce(&Arc<K>) -> V,
    {
        if let Some(value) = self.get(key) {
            return value;
        }

        let value = compute(key);
        self.try_prune();

        self.inner
            .entry(Self::key_of(key))
            .or_insert_with(|| CacheEntry {
                weak: Arc::downgrade(key),
                value,
            })
            .value
            .clone()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    #[inline]
    fn try_prune(&self) {
        // Would have to allocate after the next insert.
        if self.inner.capacity() == self.inner.len() {
            self.inner.retain(|_, entry| entry.weak.strong_count() > 0);
        }
    }
}

impl<K, V: Clone> Default for WeakKeyCache<K, V> {
    fn default() -> Self {
        Self::new()
    }
}
