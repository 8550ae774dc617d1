//! Bounded cache with least-recently-used eviction and lazy TTL expiry.
//!
//! Recency is tracked with a monotonically increasing access tick per key and
//! a `BTreeMap` from tick to key, so the least-recently-used key is always the
//! first entry of that map.

use super::entry::CacheEntry;
use super::traits::{CacheLookup, CacheStats, CacheStore};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug)]
struct LruSlot<V> {
    entry: CacheEntry<V>,
    last_access: u64,
}

#[derive(Debug)]
struct LruState<V> {
    entries: HashMap<String, LruSlot<V>>,
    access_order: BTreeMap<u64, String>,
    tick: u64,
    stats: CacheStats,
}

impl<V> LruState<V> {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn touch(&mut self, key: &str) {
        let tick = self.next_tick();
        if let Some(slot) = self.entries.get_mut(key) {
            self.access_order.remove(&slot.last_access);
            slot.last_access = tick;
            self.access_order.insert(tick, key.to_string());
        }
    }

    fn remove(&mut self, key: &str) -> Option<CacheEntry<V>> {
        let slot = self.entries.remove(key)?;
        self.access_order.remove(&slot.last_access);
        Some(slot.entry)
    }

    fn evict_least_recent(&mut self) -> Option<String> {
        let (_, key) = self.access_order.pop_first()?;
        self.entries.remove(&key);
        self.stats.evictions += 1;
        Some(key)
    }
}

/// LRU cache holding at most `max_size` entries
#[derive(Debug)]
pub struct LruCacheStore<V> {
    state: Mutex<LruState<V>>,
    max_size: usize,
    default_ttl: Option<Duration>,
}

impl<V> LruCacheStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// `max_size` below 1 is raised to 1
    pub fn new(max_size: usize, default_ttl: Option<Duration>) -> Self {
        let max_size = max_size.max(1);
        info!(
            max_size = max_size,
            default_ttl_ms = default_ttl.map(|ttl| ttl.as_millis() as u64),
            "🗄️ LRU cache store initialized"
        );

        Self {
            state: Mutex::new(LruState {
                entries: HashMap::with_capacity(max_size),
                access_order: BTreeMap::new(),
                tick: 0,
                stats: CacheStats::default(),
            }),
            max_size,
            default_ttl,
        }
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Keys from least to most recently used
    pub fn keys_by_recency(&self) -> Vec<String> {
        self.state.lock().access_order.values().cloned().collect()
    }
}

impl<V> CacheStore<V> for LruCacheStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn lookup(&self, key: &str) -> CacheLookup<V> {
        let mut state = self.state.lock();
        let expired = match state.entries.get(key).map(|slot| slot.entry.is_expired()) {
            None => {
                state.stats.misses += 1;
                return CacheLookup::Miss;
            }
            Some(expired) => expired,
        };

        if expired {
            state.stats.misses += 1;
            state.stats.expirations += 1;
            return match state.remove(key) {
                Some(entry) => CacheLookup::Stale(entry.value),
                None => CacheLookup::Miss,
            };
        }

        state.stats.hits += 1;
        state.touch(key);
        match state.entries.get(key) {
            Some(slot) => CacheLookup::Fresh(slot.entry.value.clone()),
            None => CacheLookup::Miss,
        }
    }

    fn set(&self, key: &str, value: V, ttl: Option<Duration>) {
        let mut state = self.state.lock();

        if !state.entries.contains_key(key) && state.entries.len() >= self.max_size {
            if let Some(evicted) = state.evict_least_recent() {
                debug!(evicted_key = %evicted, "Evicted least recently used cache entry");
            }
        }

        let tick = state.next_tick();
        let previous = state.entries.insert(
            key.to_string(),
            LruSlot {
                entry: CacheEntry::new(value, ttl),
                last_access: tick,
            },
        );
        if let Some(previous) = previous {
            state.access_order.remove(&previous.last_access);
        }
        state.access_order.insert(tick, key.to_string());
    }

    fn default_ttl(&self) -> Option<Duration> {
        self.default_ttl
    }

    fn invalidate(&self, key: &str) -> bool {
        self.state.lock().remove(key).is_some()
    }

    fn invalidate_prefix(&self, prefix: &str) -> usize {
        let mut state = self.state.lock();
        let doomed: Vec<String> = state
            .entries
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect();
        for key in &doomed {
            state.remove(key);
        }
        doomed.len()
    }

    fn invalidate_all(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.access_order.clear();
    }

    fn has(&self, key: &str) -> bool {
        let mut state = self.state.lock();
        match state.entries.get(key).map(|slot| slot.entry.is_expired()) {
            Some(false) => true,
            Some(true) => {
                state.remove(key);
                state.stats.expirations += 1;
                false
            }
            None => false,
        }
    }

    fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    fn stats(&self) -> CacheStats {
        self.state.lock().stats
    }

    fn store_name(&self) -> &'static str {
        "lru"
    }
}
