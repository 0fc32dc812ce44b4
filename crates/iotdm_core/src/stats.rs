//! Cache statistics.
//!
//! Every cache table keeps its own atomic counters. They can be read while
//! lookups are in progress and are monotonically increasing until the
//! table is reset.
//!
//! # Usage
//!
//! ```rust
//! use iotdm_core::{TransactionManager, TreeConfig};
//! use iotdm_store::InMemoryStore;
//! use std::sync::Arc;
//!
//! let tm = TransactionManager::new(Arc::new(InMemoryStore::new()), TreeConfig::default()).unwrap();
//! let stats = tm.cache_stats();
//! assert_eq!(stats.resources.hits, 0);
//! ```

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for one cache table.
#[derive(Debug, Default)]
pub struct CacheCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    loads: AtomicU64,
    load_failures: AtomicU64,
    evictions: AtomicU64,
}

impl CacheCounters {
    /// Creates zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_load(&self) {
        self.loads.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_load_failure(&self) {
        self.load_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a snapshot of the counters.
    pub fn snapshot(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            loads: self.loads.load(Ordering::Relaxed),
            load_failures: self.load_failures.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time snapshot of one table's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CacheStatsSnapshot {
    /// Lookups answered from the cache.
    pub hits: u64,
    /// Lookups that had to consult the loader.
    pub misses: u64,
    /// Loader invocations that produced a value.
    pub loads: u64,
    /// Loader invocations that failed or found nothing.
    pub load_failures: u64,
    /// Entries pushed out by capacity.
    pub evictions: u64,
}

impl CacheStatsSnapshot {
    /// Fraction of lookups served from the cache, or 0 with no lookups.
    #[must_use]
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Snapshot of every cache table.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct TreeCacheStats {
    /// Resource table.
    pub resources: CacheStatsSnapshot,
    /// CSE table.
    pub cses: CacheStatsSnapshot,
    /// Child map table.
    pub children: CacheStatsSnapshot,
    /// All per-CSE AE-ID tables, summed.
    pub ae_ids: CacheStatsSnapshot,
    /// Resources currently cached.
    pub resource_entries: usize,
    /// Child maps currently cached.
    pub child_entries: usize,
}

impl std::ops::Add for CacheStatsSnapshot {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            hits: self.hits + rhs.hits,
            misses: self.misses + rhs.misses,
            loads: self.loads + rhs.loads,
            load_failures: self.load_failures + rhs.load_failures,
            evictions: self.evictions + rhs.evictions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_counters_are_zero() {
        let counters = CacheCounters::new();
        assert_eq!(counters.snapshot(), CacheStatsSnapshot::default());
        assert_eq!(counters.snapshot().hit_ratio(), 0.0);
    }

    #[test]
    fn record_and_ratio() {
        let counters = CacheCounters::new();
        counters.record_hit();
        counters.record_hit();
        counters.record_hit();
        counters.record_miss();
        counters.record_load();

        let snap = counters.snapshot();
        assert_eq!(snap.hits, 3);
        assert_eq!(snap.misses, 1);
        assert_eq!(snap.loads, 1);
        assert!((snap.hit_ratio() - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn snapshots_add() {
        let a = CacheStatsSnapshot {
            hits: 1,
            evictions: 2,
            ..Default::default()
        };
        let b = CacheStatsSnapshot {
            hits: 4,
            load_failures: 1,
            ..Default::default()
        };
        let sum = a + b;
        assert_eq!(sum.hits, 5);
        assert_eq!(sum.evictions, 2);
        assert_eq!(sum.load_failures, 1);
    }

    #[test]
    fn concurrent_updates() {
        use std::sync::Arc;
        use std::thread;

        let counters = Arc::new(CacheCounters::new());
        let mut handles = vec![];

        for _ in 0..8 {
            let c = Arc::clone(&counters);
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    c.record_hit();
                    c.record_miss();
                }
            }));
        }

        for h in handles {
            h.join().unwrap();
        }

        let snap = counters.snapshot();
        assert_eq!(snap.hits, 800);
        assert_eq!(snap.misses, 800);
    }
}
