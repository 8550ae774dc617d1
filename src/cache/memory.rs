//! Unbounded cache with a periodic expiry sweep.
//!
//! The sweep runs as a tokio task that holds only a weak reference to the
//! store's state, so it never keeps a dropped store alive. It is started on
//! construction when a runtime is available and aborted by [`MemoryCacheStore::stop`]
//! or on drop.

use super::entry::CacheEntry;
use super::traits::{CacheLookup, CacheStats, CacheStore};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug)]
struct MemoryState<V> {
    entries: HashMap<String, CacheEntry<V>>,
    stats: CacheStats,
}

#[derive(Debug)]
struct Shared<V> {
    state: Mutex<MemoryState<V>>,
}

impl<V> Shared<V> {
    fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut state = self.state.lock();
        let before = state.entries.len();
        state.entries.retain(|_, entry| !entry.is_expired_at(now));
        let removed = before - state.entries.len();
        state.stats.expirations += removed as u64;
        removed
    }
}

/// Unbounded in-memory cache
#[derive(Debug)]
pub struct MemoryCacheStore<V> {
    shared: Arc<Shared<V>>,
    default_ttl: Option<Duration>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl<V> MemoryCacheStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Create a store and start its sweep task on the current runtime, if any
    pub fn new(default_ttl: Option<Duration>, cleanup_interval: Duration) -> Self {
        let shared = Arc::new(Shared {
            state: Mutex::new(MemoryState {
                entries: HashMap::new(),
                stats: CacheStats::default(),
            }),
        });

        let sweeper = match tokio::runtime::Handle::try_current() {
            Ok(handle) => Some(handle.spawn(Self::sweep_loop(
                Arc::downgrade(&shared),
                cleanup_interval.max(MIN_SWEEP_INTERVAL),
            ))),
            Err(_) => {
                debug!("No tokio runtime available, expiry sweep disabled");
                None
            }
        };

        info!(
            default_ttl_ms = default_ttl.map(|ttl| ttl.as_millis() as u64),
            cleanup_interval_ms = cleanup_interval.as_millis() as u64,
            sweeping = sweeper.is_some(),
            "🗄️ Memory cache store initialized"
        );

        Self {
            shared,
            default_ttl,
            sweeper: Mutex::new(sweeper),
        }
    }

    /// Store without a sweep task; expired entries are only removed on read
    pub fn without_sweeper(default_ttl: Option<Duration>) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(MemoryState {
                    entries: HashMap::new(),
                    stats: CacheStats::default(),
                }),
            }),
            default_ttl,
            sweeper: Mutex::new(None),
        }
    }

    async fn sweep_loop(shared: Weak<Shared<V>>, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let Some(shared) = shared.upgrade() else {
                break;
            };
            let removed = shared.purge_expired();
            if removed > 0 {
                debug!(removed = removed, "🧹 Swept expired cache entries");
            }
        }
    }

    /// Remove every expired entry now
    pub fn purge_expired(&self) -> usize {
        self.shared.purge_expired()
    }

    /// Stop the sweep task; the store keeps working with lazy expiry only
    pub fn stop(&self) {
        if let Some(handle) = self.sweeper.lock().take() {
            handle.abort();
            debug!("Memory cache sweep stopped");
        }
    }

    pub fn is_sweeping(&self) -> bool {
        self.sweeper
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl<V> Drop for MemoryCacheStore<V> {
    fn drop(&mut self) {
        if let Some(handle) = self.sweeper.get_mut().take() {
            handle.abort();
        }
    }
}

impl<V> CacheStore<V> for MemoryCacheStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn lookup(&self, key: &str) -> CacheLookup<V> {
        let mut state = self.shared.state.lock();
        let expired = match state.entries.get(key).map(CacheEntry::is_expired) {
            None => {
                state.stats.misses += 1;
                return CacheLookup::Miss;
            }
            Some(expired) => expired,
        };

        if expired {
            state.stats.misses += 1;
            state.stats.expirations += 1;
            match state.entries.remove(key) {
                Some(entry) => CacheLookup::Stale(entry.value),
                None => CacheLookup::Miss,
            }
        } else {
            state.stats.hits += 1;
            match state.entries.get(key) {
                Some(entry) => CacheLookup::Fresh(entry.value.clone()),
                None => CacheLookup::Miss,
            }
        }
    }

    fn set(&self, key: &str, value: V, ttl: Option<Duration>) {
        self.shared
            .state
            .lock()
            .entries
            .insert(key.to_string(), CacheEntry::new(value, ttl));
    }

    fn default_ttl(&self) -> Option<Duration> {
        self.default_ttl
    }

    fn invalidate(&self, key: &str) -> bool {
        self.shared.state.lock().entries.remove(key).is_some()
    }

    fn invalidate_prefix(&self, prefix: &str) -> usize {
        let mut state = self.shared.state.lock();
        let before = state.entries.len();
        state.entries.retain(|key, _| !key.starts_with(prefix));
        before - state.entries.len()
    }

    fn invalidate_all(&self) {
        self.shared.state.lock().entries.clear();
    }

    fn has(&self, key: &str) -> bool {
        let mut state = self.shared.state.lock();
        match state.entries.get(key).map(CacheEntry::is_expired) {
            Some(false) => true,
            Some(true) => {
                state.entries.remove(key);
                state.stats.expirations += 1;
                false
            }
            None => false,
        }
    }

    fn len(&self) -> usize {
        self.shared.state.lock().entries.len()
    }

    fn stats(&self) -> CacheStats {
        self.shared.state.lock().stats
    }

    fn store_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_ttl_presence_and_absence() {
        let store = MemoryCacheStore::new(None, Duration::from_secs(60));
        store.set("k", "v".to_string(), Some(Duration::from_millis(100)));

        tokio::time::advance(Duration::from_millis(50)).await;
        assert_eq!(store.get("k"), Some("v".to_string()));

        tokio::time::advance(Duration::from_millis(100)).await;
        assert_eq!(store.get("k"), None);
        assert!(!store.has("k"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_lookup_hands_back_stale_value_once() {
        let store = MemoryCacheStore::new(None, Duration::from_secs(60));
        store.set("k", 7, Some(Duration::from_millis(10)));

        tokio::time::advance(Duration::from_millis(20)).await;
        assert_eq!(store.lookup("k"), CacheLookup::Stale(7));
        assert_eq!(store.lookup("k"), CacheLookup::Miss);
        assert_eq!(store.stats().expirations, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_removes_expired_entries_without_reads() {
        let store = MemoryCacheStore::new(None, Duration::from_millis(50));
        store.set("short", 1, Some(Duration::from_millis(100)));
        store.set("forever", 2, None);
        assert!(store.is_sweeping());

        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(store.len(), 1);
        assert_eq!(store.stats().expirations, 1);
        assert_eq!(store.get("forever"), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_halts_sweep() {
        let store = MemoryCacheStore::new(None, Duration::from_millis(50));
        store.stop();
        tokio::task::yield_now().await;
        assert!(!store.is_sweeping());

        store.set("short", 1, Some(Duration::from_millis(10)));
        tokio::time::sleep(Duration::from_millis(200)).await;

        // Still held until observed
        assert_eq!(store.len(), 1);
        assert_eq!(store.purge_expired(), 1);
    }

    #[test]
    fn test_store_without_runtime_still_works() {
        let store = MemoryCacheStore::new(Some(Duration::from_secs(60)), Duration::from_secs(1));
        assert!(!store.is_sweeping());

        store.insert("a", 1);
        store.insert("b", 2);
        assert!(store.has("a"));
        assert!(store.invalidate("a"));
        assert!(!store.invalidate("a"));

        store.invalidate_all();
        assert!(store.is_empty());
    }

    #[test]
    fn test_invalidate_prefix() {
        let store = MemoryCacheStore::without_sweeper(None);
        store.insert("page:user:1", 1);
        store.insert("page:user:2", 2);
        store.insert("entity:user:1", 3);

        assert_eq!(store.invalidate_prefix("page:"), 2);
        assert_eq!(store.len(), 1);
    }
}
