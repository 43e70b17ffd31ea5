//! LruDict: thread-safe LRU dictionary with deferred eviction callbacks

use std::hash::Hash;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::dispatch::{CallbackResult, Dispatcher, SharedCallback};
use crate::error::{Error, Result};
use crate::lru::LruTable;
use crate::staging::StagingQueue;
use crate::stats::{CacheStats, Stats};

/// Traversal order for [`LruDict::snapshot`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Order {
    /// Most recently used first
    #[default]
    MruFirst,
    /// Least recently used first
    LruFirst,
}

/// Owned point-in-time copy of cache contents.
///
/// Produced by [`LruDict::keys`], [`LruDict::values`], [`LruDict::items`] and
/// [`LruDict::snapshot`]; later cache mutations do not show up in it.
#[derive(Debug, Clone)]
pub struct Snapshot<T> {
    inner: std::vec::IntoIter<T>,
}

impl<T> Iterator for Snapshot<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<T> DoubleEndedIterator for Snapshot<T> {
    fn next_back(&mut self) -> Option<T> {
        self.inner.next_back()
    }
}

impl<T> ExactSizeIterator for Snapshot<T> {}

/// State guarded by the cache mutex
struct Inner<K, V> {
    table: LruTable<K, V>,
    capacity: usize,
    callback: Option<SharedCallback<K, V>>,
    staging: StagingQueue<K, V>,
}

impl<K, V> Inner<K, V>
where
    K: Hash + Eq + Clone,
{
    /// Insert or update, evicting from the tail if a new key overflows capacity
    fn insert(&mut self, key: K, value: V, stats: &CacheStats) -> Option<V> {
        let old = self.table.insert(key, value);
        if old.is_none() {
            stats.record_insert();
            self.evict_overflow(stats);
        }
        old
    }

    /// Evict the LRU entry and stage it. The pair is staged even without a
    /// callback; it must not be dropped while the guard is held.
    fn evict_one(&mut self, stats: &CacheStats) -> bool {
        let Some((key, value)) = self.table.pop_back() else {
            return false;
        };
        stats.record_eviction();
        trace!(len = self.table.len(), capacity = self.capacity, "evicted LRU entry");
        self.staging.push(self.callback.clone(), key, value);
        true
    }

    fn evict_overflow(&mut self, stats: &CacheStats) {
        while self.table.len() > self.capacity {
            if !self.evict_one(stats) {
                break;
            }
        }
    }
}

/// Fixed-capacity key/value cache evicting the least recently used entry.
///
/// Every operation takes the cache guard once, works on the key index and
/// recency list together, and releases it. Evicted pairs are delivered to the
/// eviction callback only after the guard is released, so a callback may
/// freely call back into the cache.
pub struct LruDict<K, V> {
    /// Key index, recency list, capacity and callback
    inner: Mutex<Inner<K, V>>,

    /// Delivers staged evictions outside the guard
    dispatcher: Dispatcher<K, V>,

    /// Cache statistics
    stats: CacheStats,
}

impl<K, V> LruDict<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    /// Create a new cache holding at most `capacity` entries
    ///
    /// # Returns
    /// * `Err(Error::InvalidCapacity)` - if `capacity` is 0
    pub fn new(capacity: usize) -> Result<Self> {
        Self::builder(capacity).build()
    }

    /// Create a new cache that reports evictions to `callback`
    ///
    /// # Arguments
    /// * `capacity` - Maximum number of entries
    /// * `callback` - Called with each evicted `(key, value)` pair
    pub fn with_callback<F>(capacity: usize, callback: F) -> Result<Self>
    where
        F: Fn(K, V) -> CallbackResult + Send + Sync + 'static,
    {
        Self::builder(capacity).on_evict(callback).build()
    }

    /// Start configuring a cache
    pub fn builder(capacity: usize) -> LruDictBuilder<K, V> {
        LruDictBuilder {
            capacity,
            callback: None,
        }
    }

    /// Get a value, marking the key as most recently used
    ///
    /// # Returns
    /// * `Err(Error::NotFound)` - if the key is absent (counted as a miss)
    pub fn get(&self, key: &K) -> Result<V> {
        let mut inner = self.inner.lock();
        match inner.table.get(key) {
            Some(value) => {
                self.stats.record_hit();
                Ok(value.clone())
            }
            None => {
                self.stats.record_miss();
                Err(Error::NotFound)
            }
        }
    }

    /// Get a value, or `default` if the key is absent. Counts hits and misses like [`get`](Self::get).
    pub fn get_or(&self, key: &K, default: V) -> V {
        self.get(key).unwrap_or(default)
    }

    /// Read a value without changing recency order or statistics
    pub fn peek(&self, key: &K) -> Option<V> {
        self.inner.lock().table.peek(key).cloned()
    }

    /// Check membership without changing recency order or statistics
    pub fn contains_key(&self, key: &K) -> bool {
        self.inner.lock().table.contains(key)
    }

    /// Insert or update a key, making it the most recently used
    ///
    /// Inserting a new key into a full cache evicts the least recently used entry.
    ///
    /// # Returns
    /// * `Some(previous)` - if the key was already present
    pub fn put(&self, key: K, value: V) -> Option<V> {
        self.mutate(|inner, stats| inner.insert(key, value, stats))
    }

    /// Remove a key. Explicit removal never triggers the eviction callback.
    ///
    /// # Returns
    /// * `Err(Error::NotFound)` - if the key is absent
    pub fn delete(&self, key: &K) -> Result<V> {
        let removed = self.inner.lock().table.remove(key);
        removed.map(|(_, value)| value).ok_or(Error::NotFound)
    }

    /// Return the value for `key`, inserting `default` first if it is absent
    pub fn set_default(&self, key: K, default: V) -> V {
        let (value, unused) = self.mutate(|inner, stats| {
            if let Some(value) = inner.table.get(&key) {
                stats.record_hit();
                return (value.clone(), Some((key, default)));
            }
            stats.record_miss();
            inner.insert(key, default.clone(), stats);
            (default, None)
        });
        drop(unused);
        value
    }

    /// Remove a key and return its value. Counts a hit or a miss.
    ///
    /// # Returns
    /// * `Err(Error::NotFound)` - if the key is absent
    pub fn pop(&self, key: &K) -> Result<V> {
        let removed = self.inner.lock().table.remove(key);
        match removed {
            Some((_, value)) => {
                self.stats.record_hit();
                Ok(value)
            }
            None => {
                self.stats.record_miss();
                Err(Error::NotFound)
            }
        }
    }

    /// Remove a key and return its value, or `default` if it is absent
    pub fn pop_or(&self, key: &K, default: V) -> V {
        self.pop(key).unwrap_or(default)
    }

    /// Remove and return the least (`least_recent = true`) or most recently used pair
    ///
    /// # Returns
    /// * `Err(Error::Empty)` - if the cache has no entries
    pub fn pop_item(&self, least_recent: bool) -> Result<(K, V)> {
        let mut inner = self.inner.lock();
        let popped = if least_recent {
            inner.table.pop_back()
        } else {
            inner.table.pop_front()
        };
        popped.ok_or(Error::Empty)
    }

    /// Remove and return the least recently used pair
    pub fn pop_lru(&self) -> Result<(K, V)> {
        self.pop_item(true)
    }

    /// Remove and return the most recently used pair
    pub fn pop_mru(&self) -> Result<(K, V)> {
        self.pop_item(false)
    }

    /// Most recently used pair, without changing order
    pub fn peek_first(&self) -> Option<(K, V)> {
        self.inner
            .lock()
            .table
            .front()
            .map(|(k, v)| (k.clone(), v.clone()))
    }

    /// Least recently used pair, without changing order
    pub fn peek_last(&self) -> Option<(K, V)> {
        self.inner
            .lock()
            .table
            .back()
            .map(|(k, v)| (k.clone(), v.clone()))
    }

    /// Keys, most recently used first
    pub fn keys(&self) -> Snapshot<K> {
        self.collect(Order::MruFirst, |k, _| k.clone())
    }

    /// Values, most recently used first
    pub fn values(&self) -> Snapshot<V> {
        self.collect(Order::MruFirst, |_, v| v.clone())
    }

    /// `(key, value)` pairs, most recently used first
    pub fn items(&self) -> Snapshot<(K, V)> {
        self.snapshot(Order::MruFirst)
    }

    /// `(key, value)` pairs in the requested order
    pub fn snapshot(&self, order: Order) -> Snapshot<(K, V)> {
        self.collect(order, |k, v| (k.clone(), v.clone()))
    }

    /// Put every pair in order, under one lock acquisition
    pub fn update<I>(&self, entries: I)
    where
        I: IntoIterator<Item = (K, V)>,
    {
        // Drain the caller's iterator before locking; it may touch the cache.
        let entries: Vec<(K, V)> = entries.into_iter().collect();
        let replaced: Vec<V> = self.mutate(|inner, stats| {
            entries
                .into_iter()
                .filter_map(|(key, value)| inner.insert(key, value, stats))
                .collect()
        });
        drop(replaced);
    }

    /// Change capacity, evicting least recently used entries that no longer fit
    ///
    /// # Returns
    /// * `Err(Error::InvalidCapacity)` - if `new_capacity` is 0; nothing changes
    pub fn resize(&self, new_capacity: usize) -> Result<()> {
        if new_capacity == 0 {
            return Err(Error::InvalidCapacity(new_capacity));
        }
        self.mutate(|inner, stats| {
            trace!(from = inner.capacity, to = new_capacity, "resizing cache");
            inner.capacity = new_capacity;
            inner.evict_overflow(stats);
        });
        Ok(())
    }

    /// Maximum number of entries
    pub fn capacity(&self) -> usize {
        self.inner.lock().capacity
    }

    /// Current number of entries
    pub fn len(&self) -> usize {
        self.inner.lock().table.len()
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.inner.lock().table.is_empty()
    }

    /// Drop every entry and reset statistics.
    ///
    /// Cleared entries are not evictions; the callback is not invoked.
    pub fn clear(&self) {
        let cleared = {
            let mut inner = self.inner.lock();
            debug!(len = inner.table.len(), "clearing cache");
            let fresh = LruTable::with_capacity(inner.capacity);
            self.stats.reset();
            std::mem::replace(&mut inner.table, fresh)
        };
        drop(cleared);
    }

    /// Get cache statistics
    pub fn stats(&self) -> Stats {
        let _inner = self.inner.lock();
        self.stats.snapshot()
    }

    /// Report future evictions to `callback`, replacing any previous one
    pub fn set_callback<F>(&self, callback: F)
    where
        F: Fn(K, V) -> CallbackResult + Send + Sync + 'static,
    {
        self.set_listener(Some(Arc::new(callback)));
    }

    /// Stop reporting evictions
    pub fn remove_callback(&self) {
        self.set_listener(None);
    }

    /// Install or remove a shared eviction observer
    pub fn set_listener(&self, listener: Option<SharedCallback<K, V>>) {
        let previous = std::mem::replace(&mut self.inner.lock().callback, listener);
        drop(previous);
    }

    /// Run a mutation under the guard, then deliver whatever it evicted
    fn mutate<R>(&self, op: impl FnOnce(&mut Inner<K, V>, &CacheStats) -> R) -> R {
        let (result, staged) = {
            let mut inner = self.inner.lock();
            let result = op(&mut inner, &self.stats);
            (result, inner.staging.take())
        };
        self.dispatcher.dispatch(staged, &self.stats);
        result
    }

    fn collect<T>(&self, order: Order, map: impl Fn(&K, &V) -> T) -> Snapshot<T> {
        let inner = self.inner.lock();
        let items: Vec<T> = match order {
            Order::MruFirst => inner.table.iter().map(|(k, v)| map(k, v)).collect(),
            Order::LruFirst => inner.table.iter().rev().map(|(k, v)| map(k, v)).collect(),
        };
        Snapshot {
            inner: items.into_iter(),
        }
    }

    #[cfg(test)]
    fn check_invariants(&self) {
        let inner = self.inner.lock();
        inner.table.check_invariants();
        assert!(inner.table.len() <= inner.capacity);
        assert!(inner.capacity > 0);
    }
}

/// Configuration for an [`LruDict`]
pub struct LruDictBuilder<K, V> {
    capacity: usize,
    callback: Option<SharedCallback<K, V>>,
}

impl<K, V> LruDictBuilder<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    /// Set the maximum number of entries
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Report evictions to a closure
    pub fn on_evict<F>(self, callback: F) -> Self
    where
        F: Fn(K, V) -> CallbackResult + Send + Sync + 'static,
    {
        self.listener(Arc::new(callback))
    }

    /// Report evictions to a shared observer
    pub fn listener(mut self, listener: SharedCallback<K, V>) -> Self {
        self.callback = Some(listener);
        self
    }

    /// Build the cache
    ///
    /// # Returns
    /// * `Err(Error::InvalidCapacity)` - if capacity is 0
    pub fn build(self) -> Result<LruDict<K, V>> {
        if self.capacity == 0 {
            return Err(Error::InvalidCapacity(self.capacity));
        }

        Ok(LruDict {
            inner: Mutex::new(Inner {
                table: LruTable::with_capacity(self.capacity),
                capacity: self.capacity,
                callback: self.callback,
                staging: StagingQueue::new(),
            }),
            dispatcher: Dispatcher::new(),
            stats: CacheStats::new(),
        })
    }
}
