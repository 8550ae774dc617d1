//! # Cache Tier
//!
//! In-memory key/value stores with per-entry TTL, shared through the
//! [`CacheStore`] trait:
//!
//! - [`MemoryCacheStore`]: unbounded, with a periodic background sweep
//! - [`LruCacheStore`]: bounded, least-recently-used eviction, lazy expiry
//!
//! [`store_from_config`] picks the variant from a [`CacheConfig`].

pub mod entry;
pub mod lru;
pub mod memory;
pub mod traits;

pub use entry::CacheEntry;
pub use lru::LruCacheStore;
pub use memory::MemoryCacheStore;
pub use traits::{CacheLookup, CacheStats, CacheStore};

use crate::config::CacheConfig;
use std::sync::Arc;

/// Build the store described by `config`: LRU when `max_size` is set,
/// otherwise the unbounded store with a sweep task.
pub fn store_from_config<V>(config: &CacheConfig) -> Arc<dyn CacheStore<V>>
where
    V: Clone + Send + Sync + 'static,
{
    match config.max_size {
        Some(max_size) => Arc::new(LruCacheStore::new(max_size, config.default_ttl())),
        None => Arc::new(MemoryCacheStore::new(
            config.default_ttl(),
            config.cleanup_interval(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_store_from_config_selects_variant() {
        let bounded = store_from_config::<u32>(&CacheConfig::default());
        assert_eq!(bounded.store_name(), "lru");
        assert_eq!(bounded.default_ttl(), Some(Duration::from_secs(300)));

        let unbounded = store_from_config::<u32>(&CacheConfig {
            max_size: None,
            ..CacheConfig::default()
        });
        assert_eq!(unbounded.store_name(), "memory");
    }
}
