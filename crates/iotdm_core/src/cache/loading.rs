//! Bounded load-through cache with single-flight loading.

use crate::stats::{CacheCounters, CacheStatsSnapshot};
use lru::LruCache;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{error, trace};

/// A bounded LRU cache that fetches missing entries through a loader.
///
/// Every entry weighs 1, so capacity is an entry count. Concurrent misses
/// on the same key are coalesced: the first caller runs the loader while the
/// others wait on a per-key gate and then read the loaded value.
///
/// A loader returning `Ok(None)` or `Err(_)` leaves the key uncached, so the
/// next lookup consults the loader again.
///
/// A `put` or `invalidate` that lands while a load of the same key is in
/// flight wins: the loaded value is still returned to its caller but is not
/// memoized, since it may predate the write that caused the invalidation.
pub struct LoadingCache<K, V> {
    name: &'static str,
    entries: Mutex<LruCache<K, V>>,
    flights: Mutex<HashMap<K, Arc<Flight>>>,
    counters: CacheCounters,
}

/// One in-flight load. `generation` moves whenever the key is written or
/// invalidated while the flight is registered.
#[derive(Default)]
struct Flight {
    gate: Mutex<()>,
    generation: AtomicU64,
}

impl<K, V> LoadingCache<K, V>
where
    K: Hash + Eq + Clone + fmt::Debug,
    V: Clone,
{
    /// Creates a cache holding at most `capacity` entries (minimum 1).
    #[must_use]
    pub fn new(name: &'static str, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            name,
            entries: Mutex::new(LruCache::new(capacity)),
            flights: Mutex::new(HashMap::new()),
            counters: CacheCounters::new(),
        }
    }

    /// Table name used in logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns the cached value without loading.
    pub fn get_if_present(&self, key: &K) -> Option<V> {
        let found = self.entries.lock().get(key).cloned();
        match found {
            Some(value) => {
                self.counters.record_hit();
                Some(value)
            }
            None => None,
        }
    }

    /// Returns the cached value, running `loader` once on a miss.
    ///
    /// Loader errors are logged and reported as `None`.
    pub fn get_or_load<F, E>(&self, key: &K, loader: F) -> Option<V>
    where
        F: FnOnce(&K) -> Result<Option<V>, E>,
        E: fmt::Display,
    {
        if let Some(value) = self.get_if_present(key) {
            return Some(value);
        }
        self.counters.record_miss();

        let flight = self.join_flight(key);
        let loaded = {
            let _gate = flight.gate.lock();
            // Another caller may have finished the load while we waited.
            let ready = self.entries.lock().get(key).cloned();
            match ready {
                Some(value) => Some(value),
                None => self.load(key, &flight, loader),
            }
        };
        self.leave_flight(key, &flight);
        loaded
    }

    fn load<F, E>(&self, key: &K, flight: &Flight, loader: F) -> Option<V>
    where
        F: FnOnce(&K) -> Result<Option<V>, E>,
        E: fmt::Display,
    {
        let started = flight.generation.load(Ordering::Acquire);
        match loader(key) {
            Ok(Some(value)) => {
                self.counters.record_load();
                let mut entries = self.entries.lock();
                if flight.generation.load(Ordering::Acquire) == started {
                    self.push(&mut entries, key.clone(), value.clone());
                } else {
                    trace!(cache = self.name, key = ?key, "key changed during load, not memoized");
                }
                Some(value)
            }
            Ok(None) => {
                trace!(cache = self.name, key = ?key, "no entry in store");
                None
            }
            Err(e) => {
                self.counters.record_load_failure();
                error!(cache = self.name, key = ?key, error = %e, "cache load failed");
                None
            }
        }
    }

    fn join_flight(&self, key: &K) -> Arc<Flight> {
        Arc::clone(self.flights.lock().entry(key.clone()).or_default())
    }

    /// Unregisters the flight once its last user leaves. Clones are only
    /// taken under the `flights` lock, so the count is stable here.
    fn leave_flight(&self, key: &K, flight: &Arc<Flight>) {
        let mut flights = self.flights.lock();
        let last = flights
            .get(key)
            .is_some_and(|f| Arc::ptr_eq(f, flight) && Arc::strong_count(f) == 2);
        if last {
            flights.remove(key);
        }
    }

    /// Marks an in-flight load of `key` as stale. Callers hold `entries`.
    fn bump_flight(&self, key: &K) {
        if let Some(flight) = self.flights.lock().get(key) {
            flight.generation.fetch_add(1, Ordering::AcqRel);
        }
    }

    fn push(&self, entries: &mut LruCache<K, V>, key: K, value: V) {
        if let Some((old_key, _)) = entries.push(key.clone(), value) {
            if old_key != key {
                self.counters.record_eviction();
            }
        }
    }

    /// Inserts or replaces a value.
    pub fn put(&self, key: K, value: V) {
        let mut entries = self.entries.lock();
        self.bump_flight(&key);
        self.push(&mut entries, key, value);
    }

    /// Removes a value. Returns the removed value, if any.
    ///
    /// A load of `key` already in flight will not memoize its result.
    pub fn invalidate(&self, key: &K) -> Option<V> {
        let mut entries = self.entries.lock();
        self.bump_flight(key);
        entries.pop(key)
    }

    /// Removes every value.
    pub fn invalidate_all(&self) {
        let mut entries = self.entries.lock();
        for flight in self.flights.lock().values() {
            flight.generation.fetch_add(1, Ordering::AcqRel);
        }
        entries.clear();
    }

    /// Returns true if `key` is cached.
    #[must_use]
    pub fn contains(&self, key: &K) -> bool {
        self.entries.lock().contains(key)
    }

    /// Number of cached values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Maximum number of cached values.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.entries.lock().cap().get()
    }

    /// Returns a snapshot of this table's counters.
    pub fn stats(&self) -> CacheStatsSnapshot {
        self.counters.snapshot()
    }
}

impl<K: Hash + Eq, V> fmt::Debug for LoadingCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadingCache")
            .field("name", &self.name)
            .field("len", &self.entries.lock().len())
            .finish_non_exhaustive()
    }
}
