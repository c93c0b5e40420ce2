//! Bounded memoization cache.
//!
//! `BoundedCache` wraps an LRU map behind a mutex so it can be shared between
//! query threads. Eviction is least-recently-used under a fixed entry bound;
//! callers must only rely on the bound itself, never on which entries survive.

use crate::error::{GeoCacheError, Result};
use lru::LruCache;
use parking_lot::Mutex;
use rustc_hash::FxHasher;
use std::fmt;
use std::hash::{BuildHasherDefault, Hash};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};

type FxBuildHasher = BuildHasherDefault<FxHasher>;

/// Point-in-time cache statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
    /// `None` for unbounded caches
    pub capacity: Option<usize>,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct CacheCounters {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CacheCounters {
    fn new() -> Self {
        Self {
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }
}

/// Fixed-capacity LRU cache with optional hit/miss counters.
///
/// All operations take `&self`; the map is guarded by a `parking_lot::Mutex`
/// so a `put` is visible to every later `get` on the same key, and concurrent
/// `put`s to one key resolve to whichever ran last.
pub struct BoundedCache<K: Hash + Eq, V> {
    entries: Mutex<LruCache<K, V, FxBuildHasher>>,
    record_stats: bool,
    counters: CacheCounters,
}

fn new_lru<K: Hash + Eq, V>(capacity: Option<NonZeroUsize>) -> LruCache<K, V, FxBuildHasher> {
    match capacity {
        Some(cap) => LruCache::with_hasher(cap, FxBuildHasher::default()),
        None => LruCache::unbounded_with_hasher(FxBuildHasher::default()),
    }
}

fn checked_capacity(capacity: usize) -> Result<NonZeroUsize> {
    NonZeroUsize::new(capacity).ok_or_else(|| {
        GeoCacheError::InvalidConfiguration("cache capacity must be greater than zero".into())
    })
}

impl<K: Hash + Eq, V> BoundedCache<K, V> {
    /// Create a cache holding at most `capacity` entries.
    ///
    /// Fails with `InvalidConfiguration` when `capacity` is zero.
    pub fn new(capacity: usize, record_stats: bool) -> Result<Self> {
        let capacity = checked_capacity(capacity)?;
        Ok(Self::with_lru(new_lru(Some(capacity)), record_stats))
    }

    /// Create a cache without an entry bound.
    pub fn unbounded(record_stats: bool) -> Self {
        Self::with_lru(new_lru(None), record_stats)
    }

    /// Create a cache from an optional capacity; `None` means unbounded.
    pub fn with_capacity(capacity: Option<usize>, record_stats: bool) -> Result<Self> {
        match capacity {
            Some(capacity) => Self::new(capacity, record_stats),
            None => Ok(Self::unbounded(record_stats)),
        }
    }

    fn with_lru(lru: LruCache<K, V, FxBuildHasher>, record_stats: bool) -> Self {
        Self {
            entries: Mutex::new(lru),
            record_stats,
            counters: CacheCounters::new(),
        }
    }

    /// Store `value` under `key`, overwriting any previous value.
    ///
    /// When the cache is full the least recently used entry is evicted.
    pub fn put(&self, key: K, value: V) {
        self.entries.lock().put(key, value);
    }

    /// Remove and return the value for `key`.
    pub fn remove(&self, key: &K) -> Option<V> {
        self.entries.lock().pop(key)
    }

    /// Check for `key` without touching recency or statistics.
    pub fn contains(&self, key: &K) -> bool {
        self.entries.lock().contains(key)
    }

    pub fn size(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Configured entry bound, `None` when unbounded.
    pub fn capacity(&self) -> Option<usize> {
        let entries = self.entries.lock();
        if entries.cap().get() == usize::MAX {
            None
        } else {
            Some(entries.cap().get())
        }
    }

    pub fn records_stats(&self) -> bool {
        self.record_stats
    }

    /// Number of hits since construction or the last reset. Always zero when
    /// statistics are not recorded.
    pub fn hit_count(&self) -> u64 {
        self.counters.hits.load(Ordering::Relaxed)
    }

    /// Number of misses since construction or the last reset. Always zero
    /// when statistics are not recorded.
    pub fn miss_count(&self) -> u64 {
        self.counters.misses.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hit_count(),
            misses: self.miss_count(),
            entries: self.size(),
            capacity: self.capacity(),
        }
    }

    /// Drop all entries, keeping capacity and counters.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Discard every entry and counter and start over with `new_capacity`.
    ///
    /// This is a full reset rather than an in-place shrink.
    pub fn resize(&self, new_capacity: usize) -> Result<()> {
        let capacity = checked_capacity(new_capacity)?;
        let mut entries = self.entries.lock();
        *entries = new_lru(Some(capacity));
        self.counters.reset();
        log::debug!("cache reset with capacity {}", new_capacity);
        Ok(())
    }

    /// Replace the whole content in one step. Entries are given from least to
    /// most recently used.
    pub(crate) fn replace_with(
        &self,
        capacity: Option<usize>,
        items: impl IntoIterator<Item = (K, V)>,
    ) -> Result<()> {
        let capacity = capacity.map(checked_capacity).transpose()?;
        let mut fresh = new_lru(capacity);
        for (key, value) in items {
            fresh.put(key, value);
        }
        let mut entries = self.entries.lock();
        *entries = fresh;
        self.counters.reset();
        Ok(())
    }

    fn record(&self, hit: bool) {
        if !self.record_stats {
            return;
        }
        if hit {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.counters.misses.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl<K: Hash + Eq, V: Clone> BoundedCache<K, V> {
    /// Look up `key`, promoting it to most recently used. A miss is `None`.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut entries = self.entries.lock();
        let value = entries.get(key).cloned();
        self.record(value.is_some());
        value
    }

    /// Look up `key` without promoting it or touching statistics.
    pub fn peek(&self, key: &K) -> Option<V> {
        self.entries.lock().peek(key).cloned()
    }
}

impl<K: Hash + Eq + Clone, V: Clone> BoundedCache<K, V> {
    /// Copy of all entries, least recently used first.
    pub fn entries(&self) -> Vec<(K, V)> {
        self.entries
            .lock()
            .iter()
            .rev()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

impl<K: Hash + Eq, V> fmt::Debug for BoundedCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundedCache")
            .field("size", &self.size())
            .field("capacity", &self.capacity())
            .field("record_stats", &self.record_stats)
            .finish()
    }
}
