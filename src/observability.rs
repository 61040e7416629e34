//! Observability hooks and cache statistics.
//!
//! Implement [`CacheMetrics`] to feed cache events into your monitoring system:
//!
//! ```ignore
//! use revalidate_kit::observability::CacheMetrics;
//! use std::time::Duration;
//!
//! struct PrometheusMetrics;
//!
//! impl CacheMetrics for PrometheusMetrics {
//!     fn record_hit(&self, _key: &str, _duration: Duration) {
//!         // counter!("cache_hits").inc();
//!     }
//!     // ... implement other methods
//! }
//!
//! // let cache = Cache::new().with_metrics(Box::new(PrometheusMetrics));
//! ```
//!
//! Every hook has a default body that logs through the `log` crate, so
//! [`LoggingMetrics`] is just the trait with nothing overridden. The cache
//! defaults to [`NoOpMetrics`].
//!
//! # Hooks
//!
//! | Hook | Fired when |
//! |------|------------|
//! | `record_hit` | fresh entry served |
//! | `record_stale` | stale or revalidating entry served |
//! | `record_miss` | caller waited on a fetch (miss, invalid, expired) |
//! | `record_bypass` | `NoStore` read |
//! | `record_revalidation` | a fetch that writes to the store settled |
//! | `record_invalidation` | an invalidation touched an entry |
//! | `record_error` | a read failed |

use crate::entry::EntryState;
use std::time::Duration;

/// Trait for cache metrics collection.
pub trait CacheMetrics: Send + Sync {
    /// Record a fresh hit.
    fn record_hit(&self, key: &str, duration: Duration) {
        debug!("Cache HIT: {} took {:?}", key, duration);
    }

    /// Record a stale hit (served while a refresh runs or is started).
    fn record_stale(&self, key: &str, duration: Duration) {
        debug!("Cache STALE: {} took {:?}", key, duration);
    }

    /// Record a miss the caller had to wait on.
    fn record_miss(&self, key: &str, duration: Duration) {
        debug!("Cache MISS: {} took {:?}", key, duration);
    }

    /// Record a read that bypassed the cache.
    fn record_bypass(&self, key: &str, duration: Duration) {
        debug!("Cache BYPASS: {} took {:?}", key, duration);
    }

    /// Record a settled store-writing fetch.
    fn record_revalidation(&self, key: &str, success: bool, duration: Duration) {
        if success {
            debug!("Cache REVALIDATE: {} took {:?}", key, duration);
        } else {
            warn!("Cache REVALIDATE FAILED: {} after {:?}", key, duration);
        }
    }

    /// Record an invalidation that touched an entry.
    fn record_invalidation(&self, key: &str, state: Option<EntryState>) {
        match state {
            Some(state) => debug!("Cache INVALIDATE: {} -> {}", key, state),
            None => debug!("Cache INVALIDATE: {} -> purged", key),
        }
    }

    /// Record an error.
    fn record_error(&self, key: &str, error: &str) {
        warn!("Cache ERROR for {}: {}", key, error);
    }
}

/// Default metrics implementation (no-op).
#[derive(Clone, Default)]
pub struct NoOpMetrics;

impl CacheMetrics for NoOpMetrics {
    fn record_hit(&self, _key: &str, _duration: Duration) {}
    fn record_stale(&self, _key: &str, _duration: Duration) {}
    fn record_miss(&self, _key: &str, _duration: Duration) {}
    fn record_bypass(&self, _key: &str, _duration: Duration) {}
    fn record_revalidation(&self, _key: &str, _success: bool, _duration: Duration) {}
    fn record_invalidation(&self, _key: &str, _state: Option<EntryState>) {}
    fn record_error(&self, _key: &str, _error: &str) {}
}

/// Metrics that only log, using the trait's default hooks.
#[derive(Clone, Default)]
pub struct LoggingMetrics;

impl CacheMetrics for LoggingMetrics {}

/// Point-in-time cache statistics.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub total_entries: usize,
    pub fresh_entries: usize,
    pub stale_entries: usize,
    pub revalidating_entries: usize,
    pub invalid_entries: usize,
    /// Entries past their hard TTL that no read or sweep has removed yet.
    pub expired_entries: usize,
    pub total_tags: usize,
    pub total_bytes: usize,
    pub in_flight: usize,
}
