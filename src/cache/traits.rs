//! Cache store contract shared by the unbounded and LRU variants

use serde::Serialize;
use std::time::Duration;

/// Result of a cache probe.
///
/// A stale entry is removed from the store when observed, but its value is
/// handed back so callers can still fall back to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheLookup<V> {
    Fresh(V),
    Stale(V),
    Miss,
}

impl<V> CacheLookup<V> {
    pub fn fresh(self) -> Option<V> {
        match self {
            CacheLookup::Fresh(value) => Some(value),
            _ => None,
        }
    }

    /// Any value, fresh or stale
    pub fn into_value(self) -> Option<V> {
        match self {
            CacheLookup::Fresh(value) | CacheLookup::Stale(value) => Some(value),
            CacheLookup::Miss => None,
        }
    }

    pub fn is_fresh(&self) -> bool {
        matches!(self, CacheLookup::Fresh(_))
    }
}

/// Counters accumulated over the lifetime of a store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Entries dropped to make room (LRU only)
    pub evictions: u64,
    /// Entries removed because their TTL passed
    pub expirations: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            return 0.0;
        }
        self.hits as f64 / total as f64
    }
}

/// Key/value cache with per-entry TTL.
///
/// Methods are synchronous: implementations guard their state with a
/// `parking_lot::Mutex` held only for the duration of the call.
pub trait CacheStore<V>: Send + Sync
where
    V: Clone + Send + Sync + 'static,
{
    /// Probe a key, removing it if it has expired
    fn lookup(&self, key: &str) -> CacheLookup<V>;

    /// Fresh value for `key`, if any
    fn get(&self, key: &str) -> Option<V> {
        self.lookup(key).fresh()
    }

    /// Store `value`; `ttl: None` never expires by time
    fn set(&self, key: &str, value: V, ttl: Option<Duration>);

    /// Store `value` with the store's default TTL
    fn insert(&self, key: &str, value: V) {
        self.set(key, value, self.default_ttl());
    }

    fn default_ttl(&self) -> Option<Duration>;

    /// Remove one key; returns whether it was present
    fn invalidate(&self, key: &str) -> bool;

    /// Remove every key starting with `prefix`; returns how many were removed
    fn invalidate_prefix(&self, prefix: &str) -> usize;

    fn invalidate_all(&self);

    /// Whether a fresh value exists for `key`
    fn has(&self, key: &str) -> bool;

    /// Entries currently held, including expired ones not yet removed
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn stats(&self) -> CacheStats;

    fn store_name(&self) -> &'static str;
}
