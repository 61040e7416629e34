//! Single-flight fetch coordination.
//!
//! The coordinator guarantees that at most one fetcher runs per key at any time.
//! The first caller for a key registers an in-flight fetch and spawns it on the
//! tokio runtime; every later caller for that key attaches to the same shared
//! result until it settles.
//!
//! ```text
//! caller A ──┐                     ┌──▶ value / error
//! caller B ──┼──▶ registry[key] ───┼──▶ value / error
//! caller C ──┘    (one task)       └──▶ value / error
//! ```
//!
//! The fetch runs on its own task, so a caller that stops waiting (timeout,
//! dropped future) never cancels it. When it settles, the task writes the store,
//! then clears the registry entry, and only then wakes the waiters.
//!
//! `NoStore` reads go through the same registry in [`FetchMode::Bypass`]: they
//! share a fetch with any other caller for the key but never write the store.
//! A cached read that joins a bypass fetch stores the result under its own plan.

use crate::entry::{CacheEntry, EntryState};
use crate::error::{Error, Result};
use crate::fetch::Fetcher;
use crate::observability::CacheMetrics;
use crate::policy::CachePolicy;
use crate::serialization::serialize_for_cache;
use crate::store::{EntryStore, Update};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use serde::Serialize;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;

/// Handle to an in-flight fetch. Resolves to the stored payload bytes.
pub type InflightFetch = Shared<BoxFuture<'static, Result<Vec<u8>>>>;

/// Retry settings for one fetch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Retry {
    /// Extra attempts after the first failure.
    pub count: u32,
    /// Base delay; attempt `n` waits `backoff * 2^(n-1)`.
    pub backoff: Duration,
}

impl Default for Retry {
    fn default() -> Self {
        Retry {
            count: 0,
            backoff: Duration::from_millis(crate::config::DEFAULT_RETRY_BACKOFF_MS),
        }
    }
}

/// How the fetched value is stored once it arrives.
#[derive(Clone, Debug)]
pub struct WritePlan {
    pub policy: CachePolicy,
    pub tags: HashSet<String>,
    pub expire: Option<Duration>,
    pub retry: Retry,
}

/// Why a fetch is being requested.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FetchMode {
    /// The caller found nothing usable. If a usable entry shows up before the
    /// fetch is registered, it is served instead of fetching again.
    Load,
    /// Background refresh of an entry that is already `Revalidating`.
    Refresh,
    /// `NoStore` read: join or start a fetch, never write the result.
    Bypass,
}

/// Registry slot for one key.
struct Inflight {
    fetch: InflightFetch,
    /// Whether the fetch writes its result back to the store.
    stores: bool,
}

/// Per-key single-flight executor that writes results back to the store.
pub struct FetchCoordinator<S: EntryStore> {
    store: Arc<S>,
    metrics: Arc<dyn CacheMetrics>,
    inflight: Arc<DashMap<String, Inflight>>,
}

impl<S: EntryStore> Clone for FetchCoordinator<S> {
    fn clone(&self) -> Self {
        FetchCoordinator {
            store: Arc::clone(&self.store),
            metrics: Arc::clone(&self.metrics),
            inflight: Arc::clone(&self.inflight),
        }
    }
}

/// Clears the registry entry for a key when the fetch task ends, panics included.
struct InflightGuard {
    inflight: Arc<DashMap<String, Inflight>>,
    key: String,
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        self.inflight.remove(&self.key);
    }
}

impl<S: EntryStore> FetchCoordinator<S> {
    pub fn new(store: Arc<S>, metrics: Arc<dyn CacheMetrics>) -> Self {
        FetchCoordinator {
            store,
            metrics,
            inflight: Arc::new(DashMap::new()),
        }
    }

    /// Whether a fetch for `key` is currently in flight.
    pub fn is_fetching(&self, key: &str) -> bool {
        self.inflight.contains_key(key)
    }

    /// Number of keys with a fetch in flight.
    pub fn in_flight_count(&self) -> usize {
        self.inflight.len()
    }

    /// Join the in-flight fetch for `key`, or start one.
    ///
    /// Must be called from within a tokio runtime. The returned handle may be
    /// dropped without cancelling the fetch.
    pub fn resolve<T, F>(&self, key: &str, fetcher: F, plan: WritePlan, mode: FetchMode) -> InflightFetch
    where
        T: Serialize + Send + 'static,
        F: Fetcher<T>,
    {
        match self.inflight.entry(key.to_string()) {
            Entry::Occupied(occupied) => {
                let inflight = occupied.get();
                if inflight.stores || mode == FetchMode::Bypass {
                    debug!("» Joining in-flight fetch for {}", key);
                    return inflight.fetch.clone();
                }
                debug!("» Joining no-store fetch for {}, storing its result", key);
                self.store_when_settled(key, inflight.fetch.clone(), plan)
            }
            Entry::Vacant(vacant) => {
                if mode == FetchMode::Load {
                    if let Some(bytes) = self.usable_payload(key) {
                        debug!("» {} was stored while waiting, skipping fetch", key);
                        return futures::future::ready(Ok(bytes)).boxed().shared();
                    }
                }

                // Captured before the task can run, so a removal right after
                // registration is still seen by the write-back.
                let generation = self.store.read(key).map(|entry| entry.generation);
                let (armed_tx, armed_rx) = oneshot::channel::<()>();
                let work = self
                    .clone()
                    .run(key.to_string(), fetcher, plan, mode, generation, armed_rx);
                let shared = share(key, tokio::spawn(work));

                vacant.insert(Inflight {
                    fetch: shared.clone(),
                    stores: mode != FetchMode::Bypass,
                });
                // The task may only clear the registry once its own entry is in place.
                let _ = armed_tx.send(());

                debug!("» Started fetch for {} ({:?})", key, mode);
                shared
            }
        }
    }

    /// Write the outcome of someone else's no-store fetch under `plan`.
    fn store_when_settled(&self, key: &str, fetch: InflightFetch, plan: WritePlan) -> InflightFetch {
        let coordinator = self.clone();
        let task_key = key.to_string();
        let generation = self.store.read(key).map(|entry| entry.generation);

        let handle = tokio::spawn(async move {
            let joined = Instant::now();
            let result = fetch.await;
            match &result {
                Ok(bytes) => coordinator.write_back(&task_key, bytes.clone(), &plan, generation),
                Err(e) => coordinator.revert(&task_key, e),
            }
            coordinator
                .metrics
                .record_revalidation(&task_key, result.is_ok(), joined.elapsed());
            result
        });
        share(key, handle)
    }

    async fn run<T, F>(
        self,
        key: String,
        fetcher: F,
        plan: WritePlan,
        mode: FetchMode,
        generation: Option<u64>,
        armed: oneshot::Receiver<()>,
    ) -> Result<Vec<u8>>
    where
        T: Serialize + Send + 'static,
        F: Fetcher<T>,
    {
        let _ = armed.await;
        let guard = InflightGuard {
            inflight: Arc::clone(&self.inflight),
            key: key.clone(),
        };

        let started = Instant::now();

        let result = match fetch_with_retry(&key, &fetcher, plan.retry).await {
            Ok(value) => serialize_for_cache(&value),
            Err(e) => Err(e),
        };

        if mode != FetchMode::Bypass {
            match &result {
                Ok(bytes) => self.write_back(&key, bytes.clone(), &plan, generation),
                Err(e) => self.revert(&key, e),
            }
            self.metrics
                .record_revalidation(&key, result.is_ok(), started.elapsed());
        }

        drop(guard);
        result
    }

    /// Store a fetched payload.
    ///
    /// If the entry was invalidated after this fetch started, the new value
    /// is stored as `Stale` so the invalidation still takes effect. If it was
    /// removed, nothing is stored.
    fn write_back(&self, key: &str, bytes: Vec<u8>, plan: &WritePlan, started_generation: Option<u64>) {
        let now = Instant::now();
        let mut fresh = Some(CacheEntry::new(
            key,
            bytes,
            plan.tags.clone(),
            plan.policy.fresh_for(),
            plan.expire,
            now,
        ));
        let mut stored_state = None;

        self.store.update(key, &mut |existing| {
            let Some(mut entry) = fresh.take() else {
                return Update::Keep;
            };
            match existing {
                Some(existing) => {
                    entry.generation = existing.generation;
                    if started_generation.is_some_and(|g| g != existing.generation) {
                        entry.state = EntryState::Stale;
                    }
                }
                None if started_generation.is_some() => return Update::Keep,
                None => {}
            }
            stored_state = Some(entry.state);
            Update::Replace(entry)
        });

        let Some(stored_state) = stored_state else {
            debug!("✗ {} was removed during its fetch, result not stored", key);
            return;
        };
        debug!(
            "✓ Stored {} ({} tags, {}, policy: {})",
            key,
            plan.tags.len(),
            stored_state,
            plan.policy
        );
    }

    /// A failed refresh keeps the old value and goes back to `Stale`.
    fn revert(&self, key: &str, error: &Error) {
        let mut reverted = false;
        self.store.update(key, &mut |existing| {
            if let Some(entry) = existing {
                if entry.state == EntryState::Revalidating {
                    entry.state = EntryState::Stale;
                    reverted = true;
                }
            }
            Update::Keep
        });

        if reverted {
            warn!("✗ Refresh of {} failed, still serving stale value: {}", key, error);
        } else {
            warn!("✗ Fetch of {} failed: {}", key, error);
        }
    }

    fn usable_payload(&self, key: &str) -> Option<Vec<u8>> {
        let now = Instant::now();
        self.store
            .read(key)
            .filter(|entry| !entry.is_expired(now) && entry.state != EntryState::Invalid)
            .map(|entry| entry.value)
    }
}

/// Register a spawned fetch as a shareable handle.
fn share(key: &str, handle: tokio::task::JoinHandle<Result<Vec<u8>>>) -> InflightFetch {
    let key = key.to_string();
    async move {
        handle.await.unwrap_or_else(|e| {
            Err(Error::FetchError(format!(
                "fetch task for {} did not complete: {}",
                key, e
            )))
        })
    }
    .boxed()
    .shared()
}

/// Run `fetcher` with exponential backoff, turning panics into `FetchError`s.
async fn fetch_with_retry<T, F>(key: &str, fetcher: &F, retry: Retry) -> Result<T>
where
    F: Fetcher<T>,
{
    let max_attempts = retry.count.saturating_add(1);
    let mut attempts = 0;

    loop {
        attempts += 1;

        let result = AssertUnwindSafe(async { fetcher.fetch().await })
            .catch_unwind()
            .await
            .unwrap_or_else(|_| Err(Error::FetchError(format!("fetcher for {} panicked", key))));

        match result {
            Ok(value) => return Ok(value),
            Err(e) if attempts >= max_attempts => return Err(e),
            Err(e) => {
                debug!(
                    "Fetch for {} failed (attempt {}/{}): {}, retrying...",
                    key, attempts, max_attempts, e
                );
                let delay = retry
                    .backoff
                    .saturating_mul(2_u32.saturating_pow(attempts - 1));
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::ScriptedFetcher;
    use crate::observability::NoOpMetrics;
    use crate::serialization::deserialize_from_cache;
    use crate::store::InMemoryStore;

    fn coordinator() -> (Arc<InMemoryStore>, FetchCoordinator<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        let coordinator = FetchCoordinator::new(Arc::clone(&store), Arc::new(NoOpMetrics));
        (store, coordinator)
    }

    fn plan(tags: &[&str]) -> WritePlan {
        WritePlan {
            policy: CachePolicy::ForceCache,
            tags: tags.iter().map(|t| t.to_string()).collect(),
            expire: None,
            retry: Retry::default(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_resolves_share_one_fetch() {
        let (_store, coordinator) = coordinator();
        let fetcher = ScriptedFetcher::always(7u32).with_delay(Duration::from_millis(50));

        let handles: Vec<_> = (0..8)
            .map(|_| coordinator.resolve("k", fetcher.clone(), plan(&[]), FetchMode::Load))
            .collect();
        assert!(coordinator.is_fetching("k"));

        for result in futures::future::join_all(handles).await {
            let bytes = result.expect("fetch ok");
            assert_eq!(deserialize_from_cache::<u32>(&bytes).unwrap(), 7);
        }

        assert_eq!(fetcher.calls(), 1);
        assert!(!coordinator.is_fetching("k"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolve_writes_entry_and_tags() {
        let (store, coordinator) = coordinator();
        let fetcher = ScriptedFetcher::always("page".to_string());

        coordinator
            .resolve("/blog", fetcher, plan(&["posts"]), FetchMode::Load)
            .await
            .expect("fetch ok");

        let entry = store.read("/blog").expect("stored");
        assert_eq!(entry.state, EntryState::Fresh);
        assert!(store.keys_for_tag("posts").contains("/blog"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_reaches_all_waiters_and_keeps_store() {
        let (store, coordinator) = coordinator();
        let fetcher: ScriptedFetcher<u32> =
            ScriptedFetcher::new(vec![Err("upstream 503".to_string())])
                .with_delay(Duration::from_millis(10));

        let a = coordinator.resolve("k", fetcher.clone(), plan(&[]), FetchMode::Load);
        let b = coordinator.resolve("k", fetcher.clone(), plan(&[]), FetchMode::Load);
        let (a, b) = futures::join!(a, b);

        assert_eq!(a.unwrap_err(), Error::FetchError("upstream 503".to_string()));
        assert_eq!(b.unwrap_err(), Error::FetchError("upstream 503".to_string()));
        assert_eq!(fetcher.calls(), 1);
        assert!(store.read("k").is_none());
        assert!(!coordinator.is_fetching("k"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_refresh_reverts_to_stale() {
        let (store, coordinator) = coordinator();
        let mut entry = CacheEntry::new("k", vec![1], HashSet::new(), None, None, Instant::now());
        entry.state = EntryState::Revalidating;
        store.write(entry);

        let fetcher: ScriptedFetcher<u32> = ScriptedFetcher::new(vec![Err("boom".to_string())]);
        let result = coordinator
            .resolve("k", fetcher, plan(&[]), FetchMode::Refresh)
            .await;

        assert!(result.is_err());
        let entry = store.read("k").expect("value kept");
        assert_eq!(entry.state, EntryState::Stale);
        assert_eq!(entry.value, vec![1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidation_during_fetch_lands_stale() {
        let (store, coordinator) = coordinator();
        let mut entry = CacheEntry::new("k", vec![1], HashSet::new(), None, None, Instant::now());
        entry.state = EntryState::Revalidating;
        store.write(entry);

        let fetcher = ScriptedFetcher::always(2u32).with_delay(Duration::from_millis(100));
        let handle = coordinator.resolve("k", fetcher, plan(&[]), FetchMode::Refresh);

        // Invalidate mid-flight.
        tokio::time::sleep(Duration::from_millis(10)).await;
        store.update("k", &mut |entry| {
            if let Some(entry) = entry {
                entry.mark_stale();
            }
            Update::Keep
        });

        handle.await.expect("fetch ok");
        let entry = store.read("k").expect("stored");
        assert_eq!(entry.state, EntryState::Stale);
        assert_eq!(deserialize_from_cache::<u32>(&entry.value).unwrap(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_reuses_entry_stored_meanwhile() {
        let (store, coordinator) = coordinator();
        let bytes = serialize_for_cache(&5u32).unwrap();
        store.write(CacheEntry::new("k", bytes, HashSet::new(), None, None, Instant::now()));

        let fetcher = ScriptedFetcher::always(9u32);
        let bytes = coordinator
            .resolve("k", fetcher.clone(), plan(&[]), FetchMode::Load)
            .await
            .expect("served");

        assert_eq!(deserialize_from_cache::<u32>(&bytes).unwrap(), 5);
        assert_eq!(fetcher.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_caller_does_not_cancel_fetch() {
        let (store, coordinator) = coordinator();
        let fetcher = ScriptedFetcher::always(3u32).with_delay(Duration::from_millis(100));

        let handle = coordinator.resolve("k", fetcher.clone(), plan(&[]), FetchMode::Load);
        let timed_out = tokio::time::timeout(Duration::from_millis(10), handle).await;
        assert!(timed_out.is_err());

        while coordinator.is_fetching("k") {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(store.read("k").is_some());
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_with_backoff() {
        let (_store, coordinator) = coordinator();
        let fetcher = ScriptedFetcher::new(vec![
            Err("flaky".to_string()),
            Err("flaky".to_string()),
            Ok(1u32),
        ]);
        let retry = Retry {
            count: 2,
            backoff: Duration::from_millis(100),
        };

        let plan = WritePlan {
            retry,
            ..plan(&[])
        };

        let start = Instant::now();
        let bytes = coordinator
            .resolve("k", fetcher.clone(), plan, FetchMode::Bypass)
            .await
            .expect("third attempt succeeds");

        assert_eq!(deserialize_from_cache::<u32>(&bytes).unwrap(), 1);
        assert_eq!(fetcher.calls(), 3);
        // 100ms + 200ms of backoff
        assert!(start.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unbounded_retry_count_does_not_overflow() {
        let (_store, coordinator) = coordinator();
        let fetcher = ScriptedFetcher::always(4u32);
        let plan = WritePlan {
            retry: Retry {
                count: u32::MAX,
                backoff: Duration::from_millis(1),
            },
            ..plan(&[])
        };

        let bytes = coordinator
            .resolve("k", fetcher.clone(), plan, FetchMode::Bypass)
            .await
            .expect("first attempt succeeds");

        assert_eq!(deserialize_from_cache::<u32>(&bytes).unwrap(), 4);
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bypass_resolves_share_one_fetch_and_store_nothing() {
        let (store, coordinator) = coordinator();
        let fetcher = ScriptedFetcher::always(6u32).with_delay(Duration::from_millis(100));

        let handles: Vec<_> = (0..4)
            .map(|_| coordinator.resolve("k", fetcher.clone(), plan(&["t"]), FetchMode::Bypass))
            .collect();
        for result in futures::future::join_all(handles).await {
            assert_eq!(deserialize_from_cache::<u32>(&result.expect("fetch ok")).unwrap(), 6);
        }

        assert_eq!(fetcher.calls(), 1);
        assert!(store.read("k").is_none());
        assert!(store.keys_for_tag("t").is_empty());
        assert!(!coordinator.is_fetching("k"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_bypass_joins_cached_fetch() {
        let (store, coordinator) = coordinator();
        let fetcher = ScriptedFetcher::always(8u32).with_delay(Duration::from_millis(100));

        let cached = coordinator.resolve("k", fetcher.clone(), plan(&[]), FetchMode::Load);
        let bypass = coordinator.resolve("k", fetcher.clone(), plan(&[]), FetchMode::Bypass);
        let (cached, bypass) = futures::join!(cached, bypass);

        assert_eq!(cached.expect("fetch ok"), bypass.expect("fetch ok"));
        assert_eq!(fetcher.calls(), 1);
        assert!(store.read("k").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cached_read_joining_bypass_fetch_stores_result() {
        let (store, coordinator) = coordinator();
        let fetcher = ScriptedFetcher::always(8u32).with_delay(Duration::from_millis(100));

        let bypass = coordinator.resolve("k", fetcher.clone(), plan(&[]), FetchMode::Bypass);
        let cached = coordinator.resolve("k", fetcher.clone(), plan(&["posts"]), FetchMode::Load);
        let (bypass, cached) = futures::join!(bypass, cached);

        assert_eq!(bypass.expect("fetch ok"), cached.expect("fetch ok"));
        assert_eq!(fetcher.calls(), 1);
        let entry = store.read("k").expect("stored by the cached reader");
        assert_eq!(entry.state, EntryState::Fresh);
        assert!(store.keys_for_tag("posts").contains("k"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_joining_bypass_fetch_settles_entry() {
        let (store, coordinator) = coordinator();
        let fetcher: ScriptedFetcher<u32> =
            ScriptedFetcher::new(vec![Err("down".to_string())]).with_delay(Duration::from_millis(100));

        let bypass = coordinator.resolve("k", fetcher.clone(), plan(&[]), FetchMode::Bypass);

        let mut entry = CacheEntry::new("k", vec![1], HashSet::new(), None, None, Instant::now());
        entry.state = EntryState::Revalidating;
        store.write(entry);
        let refresh = coordinator.resolve("k", fetcher.clone(), plan(&[]), FetchMode::Refresh);

        let (bypass, refresh) = futures::join!(bypass, refresh);
        assert!(bypass.is_err());
        assert!(refresh.is_err());
        assert_eq!(fetcher.calls(), 1);
        assert_eq!(store.read("k").expect("value kept").state, EntryState::Stale);
    }

    #[tokio::test(start_paused = true)]
    async fn test_removal_during_refresh_is_not_undone() {
        let (store, coordinator) = coordinator();
        let mut entry = CacheEntry::new("k", vec![1], HashSet::new(), None, None, Instant::now());
        entry.state = EntryState::Revalidating;
        store.write(entry);

        let fetcher = ScriptedFetcher::always(2u32).with_delay(Duration::from_millis(100));
        let handle = coordinator.resolve("k", fetcher, plan(&["posts"]), FetchMode::Refresh);
        store.delete("k");

        let bytes = handle.await.expect("fetch ok");
        assert_eq!(deserialize_from_cache::<u32>(&bytes).unwrap(), 2);
        assert!(store.read("k").is_none());
        assert!(store.keys_for_tag("posts").is_empty());
    }

    #[tokio::test]
    async fn test_panicking_fetcher_is_fetch_error() {
        let (_store, coordinator) = coordinator();
        let fetcher = || async {
            if true {
                panic!("fetcher exploded");
            }
            Ok::<u32, String>(0)
        };

        let result = coordinator
            .resolve("k", fetcher, plan(&[]), FetchMode::Load)
            .await;

        assert!(matches!(result, Err(Error::FetchError(_))));
        assert!(!coordinator.is_fetching("k"));
    }
}
