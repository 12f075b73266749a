//! Kernel value cache
//!
//! Pairwise evaluation over one feature set tends to revisit the same entries.
//! `KernelCache` keeps the most recently used K(i, j) values in an LRU map.
//! It is only valid for symmetric kernels (left and right features are the
//! same object), so keys are normalised to i <= j.

use lru::LruCache;
use std::num::NonZeroUsize;

/// Cache key normalised so that `lo <= hi`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct PairKey {
    lo: usize,
    hi: usize,
}

impl PairKey {
    fn new(i: usize, j: usize) -> Self {
        Self {
            lo: i.min(j),
            hi: i.max(j),
        }
    }
}

/// LRU cache of symmetric kernel values
pub struct KernelCache {
    entries: LruCache<PairKey, f64>,
    stats: CacheStats,
}

impl KernelCache {
    /// Cache holding at most `capacity` values (at least one)
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(capacity),
            stats: CacheStats {
                capacity: capacity.get(),
                ..CacheStats::default()
            },
        }
    }

    pub fn lookup(&mut self, i: usize, j: usize) -> Option<f64> {
        let found = self.entries.get(&PairKey::new(i, j)).copied();
        if found.is_some() {
            self.stats.hits += 1;
        } else {
            self.stats.misses += 1;
        }
        found
    }

    pub fn insert(&mut self, i: usize, j: usize, value: f64) {
        self.entries.put(PairKey::new(i, j), value);
    }

    /// Drop every cached value and zero the counters
    pub fn reset(&mut self) {
        self.entries.clear();
        self.stats = CacheStats {
            capacity: self.stats.capacity,
            ..CacheStats::default()
        };
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            size: self.entries.len(),
            ..self.stats.clone()
        }
    }
}

/// Cache counters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub capacity: usize,
    pub size: usize,
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
