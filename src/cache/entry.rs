//! Timestamped cache value with optional expiry

use std::time::Duration;
use tokio::time::Instant;

/// A cached value and the instants that bound its freshness.
///
/// Uses the tokio clock so tests can pause and advance time.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub cached_at: Instant,
    /// `None` = never expires by TTL
    pub expires_at: Option<Instant>,
}

impl<V> CacheEntry<V> {
    pub fn new(value: V, ttl: Option<Duration>) -> Self {
        let cached_at = Instant::now();
        Self {
            value,
            cached_at,
            expires_at: ttl.map(|ttl| cached_at + ttl),
        }
    }

    /// Expired strictly after `expires_at`
    pub fn is_expired_at(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|expires_at| now > expires_at)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    pub fn age(&self) -> Duration {
        self.cached_at.elapsed()
    }
}
