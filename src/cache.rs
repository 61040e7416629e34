//! Cache facade - main entry point for reads.

use crate::config::CacheConfig;
use crate::coordinator::{FetchCoordinator, FetchMode, Retry, WritePlan};
use crate::entry::EntryState;
use crate::error::{Error, Result};
use crate::fetch::Fetcher;
use crate::observability::{CacheMetrics, CacheStats, NoOpMetrics};
use crate::policy::{self, CachePolicy, Decision};
use crate::serialization::deserialize_from_cache;
use crate::store::{EntryStore, InMemoryStore, Update};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Per-read overrides.
///
/// Anything left unset falls back to the cache's [`CacheConfig`].
///
/// # Example
///
/// ```
/// use revalidate_kit::{CachePolicy, FetchOptions};
/// use std::time::Duration;
///
/// let options = FetchOptions::new(CachePolicy::Revalidate { seconds: 60.0 })
///     .with_tags(["posts", "home"])
///     .with_expire(Duration::from_secs(3600))
///     .with_retry(2);
/// assert_eq!(options.tags.len(), 2);
/// ```
#[derive(Clone, Debug, Default)]
pub struct FetchOptions {
    /// Policy for this read. `None` uses `CacheConfig::default_policy`.
    pub policy: Option<CachePolicy>,

    /// Tags stored with the entry, for [`Cache::revalidate_tag`].
    pub tags: Vec<String>,

    /// Hard TTL for the stored entry.
    ///
    /// # Precedence
    ///
    /// - **If `Some(duration)`**: used as is. It must not be shorter than the
    ///   revalidate window, or the read fails with `PolicyError`.
    /// - **If `None`**: falls back to `CacheConfig::default_expire_secs`, with
    ///   the same check against the revalidate window.
    pub expire: Option<Duration>,

    /// Extra fetch attempts. `None` uses `CacheConfig::retry_count`.
    pub retry_count: Option<u32>,
}

impl FetchOptions {
    pub fn new(policy: CachePolicy) -> Self {
        FetchOptions {
            policy: Some(policy),
            ..Default::default()
        }
    }

    pub fn with_policy(mut self, policy: CachePolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn with_tags<I, T>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn with_expire(mut self, expire: Duration) -> Self {
        self.expire = Some(expire);
        self
    }

    pub fn with_retry(mut self, count: u32) -> Self {
        self.retry_count = Some(count);
        self
    }
}

/// Tag-aware response cache with revalidation policies.
///
/// `Cache` is `Clone`; clones share the same store, in-flight registry and
/// metrics, so one instance can be handed to every request handler.
///
/// # Example
///
/// ```
/// use revalidate_kit::{Cache, CachePolicy};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> revalidate_kit::Result<()> {
/// let cache = Cache::new();
///
/// let posts: Vec<String> = cache
///     .get_tagged(
///         "/api/posts",
///         || async { Ok::<_, String>(vec!["hello".to_string()]) },
///         CachePolicy::Revalidate { seconds: 60.0 },
///         &["posts"],
///     )
///     .await?;
/// assert_eq!(posts, vec!["hello".to_string()]);
///
/// // Webhook fired: next read serves the old value and refreshes it.
/// assert_eq!(cache.revalidate_tag("posts"), 1);
/// # Ok(())
/// # }
/// ```
pub struct Cache<S: EntryStore = InMemoryStore> {
    pub(crate) store: Arc<S>,
    pub(crate) coordinator: FetchCoordinator<S>,
    pub(crate) metrics: Arc<dyn CacheMetrics>,
    config: CacheConfig,
}

impl<S: EntryStore> Clone for Cache<S> {
    fn clone(&self) -> Self {
        Cache {
            store: Arc::clone(&self.store),
            coordinator: self.coordinator.clone(),
            metrics: Arc::clone(&self.metrics),
            config: self.config.clone(),
        }
    }
}

impl Cache<InMemoryStore> {
    /// Cache backed by a fresh [`InMemoryStore`].
    pub fn new() -> Self {
        Cache::with_store(InMemoryStore::new())
    }
}

impl Default for Cache<InMemoryStore> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: EntryStore> Cache<S> {
    /// Cache backed by a custom store.
    pub fn with_store(store: S) -> Self {
        let store = Arc::new(store);
        let metrics: Arc<dyn CacheMetrics> = Arc::new(NoOpMetrics);
        Cache {
            coordinator: FetchCoordinator::new(Arc::clone(&store), Arc::clone(&metrics)),
            store,
            metrics,
            config: CacheConfig::default(),
        }
    }

    /// Set custom metrics handler.
    pub fn with_metrics(mut self, metrics: Box<dyn CacheMetrics>) -> Self {
        self.metrics = Arc::from(metrics);
        self.coordinator = FetchCoordinator::new(Arc::clone(&self.store), Arc::clone(&self.metrics));
        self
    }

    /// Replace the cache-wide defaults.
    pub fn with_config(mut self, config: CacheConfig) -> Self {
        self.config = config;
        self
    }

    /// Read `key` under `policy`, fetching on a miss.
    ///
    /// # Errors
    ///
    /// See [`get_with_options`](Self::get_with_options).
    pub async fn get<T, F>(&self, key: &str, fetcher: F, policy: CachePolicy) -> Result<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: Fetcher<T>,
    {
        self.get_with_options(key, fetcher, FetchOptions::new(policy))
            .await
    }

    /// Read `key` under `policy`, storing a fetched value with `tags`.
    ///
    /// # Errors
    ///
    /// See [`get_with_options`](Self::get_with_options).
    pub async fn get_tagged<T, F>(
        &self,
        key: &str,
        fetcher: F,
        policy: CachePolicy,
        tags: &[&str],
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: Fetcher<T>,
    {
        let options = FetchOptions::new(policy).with_tags(tags.iter().copied());
        self.get_with_options(key, fetcher, options).await
    }

    /// Read `key` with per-read overrides.
    ///
    /// Fresh, stale and revalidating entries are served without waiting. A stale
    /// entry also starts one background refresh. Misses, invalidated and expired
    /// entries wait on a single shared fetch per key. `NoStore` reads wait on
    /// that same shared fetch and store nothing.
    ///
    /// # Errors
    ///
    /// Returns `Err` in these cases:
    /// - `Error::ValidationError`: empty key
    /// - `Error::PolicyError`: invalid policy, tags or expiry (raised before any
    ///   fetch). The configured default expiry is checked against the read's
    ///   policy as well.
    /// - `Error::FetchError`: the fetcher failed on every attempt, or panicked
    /// - `Error::SerializationError`: the fetched value could not be encoded
    /// - `Error::DeserializationError`: a value fetched for this key by a
    ///   concurrent caller has a different type
    ///
    /// A cached value that fails to decode is purged and refetched instead of
    /// surfacing as an error.
    pub async fn get_with_options<T, F>(
        &self,
        key: &str,
        fetcher: F,
        options: FetchOptions,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: Fetcher<T>,
    {
        let timer = Instant::now();

        if key.is_empty() {
            return Err(Error::ValidationError("cache key cannot be empty".to_string()));
        }

        let policy = options.policy.unwrap_or(self.config.default_policy);
        policy.validate()?;
        let retry = Retry {
            count: options.retry_count.unwrap_or(self.config.retry_count),
            backoff: self.config.retry_backoff(),
        };

        if !policy.is_cacheable() {
            debug!("» {} bypasses the cache (policy: {})", key, policy);
            let plan = WritePlan {
                policy,
                tags: HashSet::new(),
                expire: None,
                retry,
            };
            let result = self
                .coordinator
                .resolve(key, fetcher, plan, FetchMode::Bypass)
                .await
                .and_then(|bytes| deserialize_from_cache(&bytes));
            match &result {
                Ok(_) => self.metrics.record_bypass(key, timer.elapsed()),
                Err(e) => self.metrics.record_error(key, &e.to_string()),
            }
            return result;
        }

        policy::validate_tags(&options.tags)?;
        let expire = options.expire.or_else(|| self.config.default_expire());
        policy::validate_expire(&policy, expire)?;
        let plan = WritePlan {
            policy,
            tags: options.tags.into_iter().collect(),
            expire,
            retry,
        };

        let entry = self.store.read(key);
        let decision = policy::decide(&policy, entry.as_ref(), Instant::now());
        debug!("» {} -> {} (policy: {})", key, decision, policy);

        let result = match (decision, entry) {
            (Decision::Hit | Decision::StaleHit | Decision::Pending, Some(entry)) => {
                match deserialize_from_cache::<T>(&entry.value) {
                    Ok(value) => {
                        if decision == Decision::Hit {
                            self.metrics.record_hit(key, timer.elapsed());
                        } else {
                            if decision == Decision::StaleHit {
                                self.start_refresh(key, fetcher, plan);
                            }
                            self.metrics.record_stale(key, timer.elapsed());
                        }
                        return Ok(value);
                    }
                    Err(e) if e.is_decode_error() => {
                        warn!("✗ Cached value for {} failed to decode, refetching: {}", key, e);
                        self.remove_written_at(key, entry.created_at);
                        self.load(key, fetcher, plan).await
                    }
                    Err(e) => Err(e),
                }
            }
            (Decision::Expired, Some(_)) => {
                if self.remove_if_expired(key) {
                    debug!("✗ {} passed its hard TTL, removed", key);
                }
                self.load(key, fetcher, plan).await
            }
            _ => self.load(key, fetcher, plan).await,
        };

        match &result {
            Ok(_) => self.metrics.record_miss(key, timer.elapsed()),
            Err(e) => self.metrics.record_error(key, &e.to_string()),
        }
        result
    }

    async fn load<T, F>(&self, key: &str, fetcher: F, plan: WritePlan) -> Result<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: Fetcher<T>,
    {
        let bytes = self
            .coordinator
            .resolve(key, fetcher, plan, FetchMode::Load)
            .await?;
        deserialize_from_cache(&bytes)
    }

    /// Move a stale entry to `Revalidating` and start its refresh.
    ///
    /// Only the reader that wins the transition starts a fetch.
    fn start_refresh<T, F>(&self, key: &str, fetcher: F, plan: WritePlan)
    where
        T: Serialize + Send + 'static,
        F: Fetcher<T>,
    {
        let now = Instant::now();
        let mut claimed = false;
        self.store.update(key, &mut |entry| {
            if let Some(entry) = entry {
                if !entry.is_expired(now) && entry.effective_state(now) == EntryState::Stale {
                    entry.state = EntryState::Revalidating;
                    claimed = true;
                }
            }
            Update::Keep
        });

        if claimed {
            debug!("↻ Background refresh started for {}", key);
            // The refresh runs on its own task; the handle is not needed.
            let _ = self
                .coordinator
                .resolve(key, fetcher, plan, FetchMode::Refresh);
        }
    }

    /// Remove the entry at `key` only if it is past its hard TTL.
    pub(crate) fn remove_if_expired(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut removed = false;
        self.store.update(key, &mut |entry| match entry {
            Some(entry) if entry.is_expired(now) => {
                removed = true;
                Update::Remove
            }
            _ => Update::Keep,
        });
        removed
    }

    /// Remove the entry at `key` only if it is still the one written at `created_at`.
    fn remove_written_at(&self, key: &str, created_at: Instant) {
        self.store.update(key, &mut |entry| match entry {
            Some(entry) if entry.created_at == created_at => Update::Remove,
            _ => Update::Keep,
        });
    }

    /// State of the entry at `key` as a read would see it now.
    pub fn state(&self, key: &str) -> Option<EntryState> {
        let now = Instant::now();
        self.store.read(key).map(|entry| entry.effective_state(now))
    }

    /// Whether a fetch for `key` is in flight.
    pub fn is_fetching(&self, key: &str) -> bool {
        self.coordinator.is_fetching(key)
    }

    pub fn in_flight_count(&self) -> usize {
        self.coordinator.in_flight_count()
    }

    /// Keys whose entries carry `tag`.
    pub fn keys_for_tag(&self, tag: &str) -> HashSet<String> {
        self.store.keys_for_tag(tag)
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Snapshot of cache statistics.
    pub fn stats(&self) -> CacheStats {
        let now = Instant::now();
        let mut stats = CacheStats {
            total_tags: self.store.tag_count(),
            in_flight: self.coordinator.in_flight_count(),
            ..Default::default()
        };

        self.store.scan(&mut |entry| {
            stats.total_entries += 1;
            stats.total_bytes += entry.value.len();
            if entry.is_expired(now) {
                stats.expired_entries += 1;
            }
            match entry.effective_state(now) {
                EntryState::Fresh => stats.fresh_entries += 1,
                EntryState::Stale => stats.stale_entries += 1,
                EntryState::Revalidating => stats.revalidating_entries += 1,
                EntryState::Invalid => stats.invalid_entries += 1,
            }
        });

        stats
    }

    /// Log a one-line summary of [`stats`](Self::stats).
    pub fn log_stats(&self) {
        let stats = self.stats();
        info!(
            "Cache stats: {} entries ({} fresh, {} stale, {} revalidating, {} invalid, {} expired), {} tags, {} bytes, {} in flight",
            stats.total_entries,
            stats.fresh_entries,
            stats.stale_entries,
            stats.revalidating_entries,
            stats.invalid_entries,
            stats.expired_entries,
            stats.total_tags,
            stats.total_bytes,
            stats.in_flight
        );
    }

    /// Get reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::ScriptedFetcher;
    use crate::serialization::serialize_for_cache;
    use serde::Deserialize;

    const SWR: CachePolicy = CachePolicy::Revalidate { seconds: 60.0 };

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    struct Page {
        title: String,
        views: u32,
    }

    #[tokio::test(start_paused = true)]
    async fn test_miss_then_hit() {
        let cache = Cache::new();
        let fetcher = ScriptedFetcher::always(1u32);

        let first: u32 = cache.get("k", fetcher.clone(), SWR).await.unwrap();
        let second: u32 = cache.get("k", fetcher.clone(), SWR).await.unwrap();

        assert_eq!((first, second), (1, 1));
        assert_eq!(fetcher.calls(), 1);
        assert_eq!(cache.state("k"), Some(EntryState::Fresh));
    }

    #[tokio::test(start_paused = true)]
    async fn test_struct_values() {
        let cache = Cache::new();
        let page = Page {
            title: "Hello".to_string(),
            views: 3,
        };
        let fetcher = ScriptedFetcher::always(page.clone());

        let read: Page = cache
            .get("/hello", fetcher, CachePolicy::ForceCache)
            .await
            .unwrap();
        assert_eq!(read, page);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_hit_serves_old_and_refreshes_once() {
        let cache = Cache::new();
        let fetcher = ScriptedFetcher::new(vec![Ok(1u32), Ok(2u32)])
            .with_delay(Duration::from_millis(10));

        cache.get::<u32, _>("k", fetcher.clone(), SWR).await.unwrap();
        tokio::time::advance(Duration::from_secs(61)).await;

        let a: u32 = cache.get("k", fetcher.clone(), SWR).await.unwrap();
        let b: u32 = cache.get("k", fetcher.clone(), SWR).await.unwrap();
        assert_eq!((a, b), (1, 1));
        assert_eq!(cache.state("k"), Some(EntryState::Revalidating));

        while cache.is_fetching("k") {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        let c: u32 = cache.get("k", fetcher.clone(), SWR).await.unwrap();
        assert_eq!(c, 2);
        assert_eq!(fetcher.calls(), 2);
        assert_eq!(cache.state("k"), Some(EntryState::Fresh));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_store_never_writes() {
        let cache = Cache::new();
        let fetcher = ScriptedFetcher::always(5u32);

        for _ in 0..3 {
            let v: u32 = cache
                .get_tagged("k", fetcher.clone(), CachePolicy::NoStore, &["ignored"])
                .await
                .unwrap();
            assert_eq!(v, 5);
        }

        assert_eq!(fetcher.calls(), 3);
        assert!(cache.is_empty());
        assert!(cache.keys_for_tag("ignored").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_revalidate_serves_stale_and_refreshes() {
        let cache = Cache::new();
        let fetcher = ScriptedFetcher::new(vec![Ok(1u32), Ok(2u32)])
            .with_delay(Duration::from_millis(100));
        let policy = CachePolicy::Revalidate { seconds: 0.0 };

        let a: u32 = cache.get("k", fetcher.clone(), policy).await.unwrap();
        assert_eq!(cache.state("k"), Some(EntryState::Stale));

        let before = Instant::now();
        let b: u32 = cache.get("k", fetcher.clone(), policy).await.unwrap();
        assert_eq!(before.elapsed(), Duration::ZERO);
        assert_eq!((a, b), (1, 1));
        assert_eq!(cache.state("k"), Some(EntryState::Revalidating));

        while cache.is_fetching("k") {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(fetcher.calls(), 2);
        let c: u32 = cache.get("k", fetcher.clone(), policy).await.unwrap();
        assert_eq!(c, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_no_store_reads_share_one_fetch() {
        let cache = Cache::new();
        let fetcher = ScriptedFetcher::always(5u32).with_delay(Duration::from_millis(100));

        let reads = (0..4).map(|_| cache.get::<u32, _>("k", fetcher.clone(), CachePolicy::NoStore));
        for v in futures::future::join_all(reads).await {
            assert_eq!(v.unwrap(), 5);
        }

        assert_eq!(fetcher.calls(), 1);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_store_and_cached_read_share_one_fetch() {
        let cache = Cache::new();
        let fetcher = ScriptedFetcher::always(5u32).with_delay(Duration::from_millis(100));

        let (cached, live) = futures::join!(
            cache.get::<u32, _>("k", fetcher.clone(), CachePolicy::ForceCache),
            cache.get::<u32, _>("k", fetcher.clone(), CachePolicy::NoStore),
        );

        assert_eq!((cached.unwrap(), live.unwrap()), (5, 5));
        assert_eq!(fetcher.calls(), 1);
        assert_eq!(cache.state("k"), Some(EntryState::Fresh));
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_during_refresh_leaves_hard_miss() {
        let cache = Cache::new();
        let fetcher = ScriptedFetcher::new(vec![Ok(1u32), Ok(2u32), Ok(3u32)])
            .with_delay(Duration::from_millis(100));

        cache.get::<u32, _>("k", fetcher.clone(), SWR).await.unwrap();
        tokio::time::advance(Duration::from_secs(61)).await;
        let stale: u32 = cache.get("k", fetcher.clone(), SWR).await.unwrap();
        assert_eq!(stale, 1);
        assert!(cache.is_fetching("k"));

        assert!(cache.purge("k"));
        while cache.is_fetching("k") {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(cache.state("k"), None);

        let next: u32 = cache.get("k", fetcher.clone(), SWR).await.unwrap();
        assert_eq!(next, 3);
        assert_eq!(fetcher.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_retry_count_from_config() {
        let config = CacheConfig::from_json(r#"{ "retry_count": 4294967295 }"#).unwrap();
        let cache = Cache::new().with_config(config);
        let fetcher = ScriptedFetcher::always(1u32);

        let live: u32 = cache
            .get("k", fetcher.clone(), CachePolicy::NoStore)
            .await
            .unwrap();
        let cached: u32 = cache
            .get("k", fetcher.clone(), CachePolicy::ForceCache)
            .await
            .unwrap();

        assert_eq!((live, cached), (1, 1));
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test]
    async fn test_default_expire_checked_against_read_policy() {
        let config = CacheConfig::default().with_default_expire(Duration::from_secs(10));
        let cache = Cache::new().with_config(config);
        let fetcher = ScriptedFetcher::always(1u32);

        let result = cache.get::<u32, _>("k", fetcher.clone(), SWR).await;
        assert!(matches!(result, Err(Error::PolicyError(_))));

        let short = CachePolicy::Revalidate { seconds: 5.0 };
        assert_eq!(cache.get::<u32, _>("k", fetcher.clone(), short).await.unwrap(), 1);
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_validation_errors_come_before_fetch() {
        let cache = Cache::new();
        let fetcher = ScriptedFetcher::always(1u32);

        let result = cache.get::<u32, _>("", fetcher.clone(), SWR).await;
        assert!(matches!(result, Err(Error::ValidationError(_))));

        let bad = CachePolicy::Revalidate { seconds: -1.0 };
        let result = cache.get::<u32, _>("k", fetcher.clone(), bad).await;
        assert!(matches!(result, Err(Error::PolicyError(_))));

        let result = cache
            .get_tagged::<u32, _>("k", fetcher.clone(), SWR, &[""])
            .await;
        assert!(matches!(result, Err(Error::PolicyError(_))));

        let options = FetchOptions::new(SWR).with_expire(Duration::from_secs(10));
        let result = cache
            .get_with_options::<u32, _>("k", fetcher.clone(), options)
            .await;
        assert!(matches!(result, Err(Error::PolicyError(_))));

        assert_eq!(fetcher.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_config_defaults_apply() {
        let config = CacheConfig::default()
            .with_default_policy(CachePolicy::NoStore)
            .with_retry(1)
            .with_retry_backoff(Duration::from_millis(10));
        let cache = Cache::new().with_config(config);
        let fetcher = ScriptedFetcher::new(vec![Err("flaky".to_string()), Ok(9u32)]);

        let v: u32 = cache
            .get_with_options("k", fetcher.clone(), FetchOptions::default())
            .await
            .unwrap();

        assert_eq!(v, 9);
        assert_eq!(fetcher.calls(), 2);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_corrupted_entry_is_refetched() {
        let cache = Cache::new();
        let fetcher = ScriptedFetcher::always(7u32);

        cache.store().write(crate::entry::CacheEntry::new(
            "k",
            b"garbage".to_vec(),
            HashSet::new(),
            None,
            None,
            Instant::now(),
        ));

        let v: u32 = cache.get("k", fetcher.clone(), SWR).await.unwrap();
        assert_eq!(v, 7);
        assert_eq!(fetcher.calls(), 1);

        let stored = cache.store().read("k").unwrap();
        assert_eq!(deserialize_from_cache::<u32>(&stored.value).unwrap(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wrong_type_is_refetched() {
        let cache = Cache::new();
        let bytes = serialize_for_cache(&7u32).unwrap();
        cache.store().write(crate::entry::CacheEntry::new(
            "k",
            bytes,
            HashSet::new(),
            None,
            None,
            Instant::now(),
        ));

        let page = Page {
            title: "t".to_string(),
            views: 1,
        };
        let fetcher = ScriptedFetcher::always(page.clone());

        let read: Page = cache.get("k", fetcher.clone(), SWR).await.unwrap();
        assert_eq!(read, page);
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stats() {
        let cache = Cache::new();
        cache
            .get_tagged::<u32, _>("a", ScriptedFetcher::always(1), SWR, &["t1", "t2"])
            .await
            .unwrap();
        cache
            .get_tagged::<u32, _>("b", ScriptedFetcher::always(2), CachePolicy::ForceCache, &["t1"])
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(61)).await;

        let stats = cache.stats();
        assert_eq!(stats.total_entries, 2);
        assert_eq!(stats.fresh_entries, 1);
        assert_eq!(stats.stale_entries, 1);
        assert_eq!(stats.total_tags, 2);
        assert_eq!(stats.in_flight, 0);
        assert!(stats.total_bytes > 0);
        cache.log_stats();
    }
}
