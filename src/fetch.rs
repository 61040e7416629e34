//! Fetcher trait for producing values on a miss or refresh.
//!
//! The `Fetcher` trait decouples the cache from wherever values come from:
//! an HTTP client, a database, a renderer. Any async closure returning
//! `Result<T, E>` with a displayable error is a fetcher:
//!
//! ```ignore
//! let client = reqwest::Client::new();
//! let posts: Vec<Post> = cache
//!     .get("GET /api/posts", move || {
//!         let client = client.clone();
//!         async move { client.get(URL).send().await?.json().await }
//!     }, CachePolicy::Revalidate { seconds: 60.0 })
//!     .await?;
//! ```
//!
//! Fetchers are `Fn`, not `FnOnce`: one may run several times (retries, later
//! background refreshes), and it runs on a spawned task, so it must be
//! `Send + Sync + 'static`.
//!
//! # Error Handling
//!
//! Errors are stringified into `Error::FetchError` so a single failure can be
//! cloned to every caller waiting on the same fetch.

use crate::error::{Error, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Trait for value producers.
pub trait Fetcher<T>: Send + Sync + 'static {
    /// Produce a fresh value.
    ///
    /// # Errors
    /// Returns `Error::FetchError` if the source is unavailable or fails.
    fn fetch(&self) -> BoxFuture<'static, Result<T>>;
}

impl<T, F, Fut, E> Fetcher<T> for F
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
    E: std::fmt::Display,
    T: Send + 'static,
{
    fn fetch(&self) -> BoxFuture<'static, Result<T>> {
        let fut = (self)();
        async move { fut.await.map_err(|e| Error::FetchError(e.to_string())) }.boxed()
    }
}

// ============================================================================
// Scripted Test Fetcher
// ============================================================================

/// Fetcher that replays a fixed script of responses and counts its calls.
///
/// Meant for tests and demos: control exactly what each fetch returns, and
/// assert how many fetches the cache actually issued.
///
/// - Responses are consumed in order; the last one repeats forever.
/// - Clones share the script and the call counter.
///
/// ```
/// use revalidate_kit::fetch::{Fetcher, ScriptedFetcher};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let fetcher = ScriptedFetcher::new(vec![Ok("v1"), Err("boom".to_string()), Ok("v2")]);
///
/// assert_eq!(fetcher.fetch().await.unwrap(), "v1");
/// assert!(fetcher.fetch().await.is_err());
/// assert_eq!(fetcher.fetch().await.unwrap(), "v2");
/// assert_eq!(fetcher.fetch().await.unwrap(), "v2");
/// assert_eq!(fetcher.calls(), 4);
/// # }
/// ```
#[derive(Clone)]
pub struct ScriptedFetcher<T> {
    script: Arc<Mutex<VecDeque<std::result::Result<T, String>>>>,
    calls: Arc<AtomicUsize>,
    delay: Option<Duration>,
}

impl<T: Clone + Send + 'static> ScriptedFetcher<T> {
    /// Create a fetcher from a list of responses.
    pub fn new(responses: Vec<std::result::Result<T, String>>) -> Self {
        ScriptedFetcher {
            script: Arc::new(Mutex::new(responses.into())),
            calls: Arc::new(AtomicUsize::new(0)),
            delay: None,
        }
    }

    /// Fetcher that always succeeds with `value`.
    pub fn always(value: T) -> Self {
        Self::new(vec![Ok(value)])
    }

    /// Sleep this long (on the tokio clock) before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Append a response to the script.
    pub fn push(&self, response: std::result::Result<T, String>) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(response);
        }
    }

    /// Number of fetches issued so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_response(&self) -> Result<T> {
        let mut script = self
            .script
            .lock()
            .map_err(|_| Error::FetchError("fetch script poisoned".to_string()))?;

        let response = if script.len() > 1 {
            script.pop_front()
        } else {
            script.front().cloned()
        };

        match response {
            Some(Ok(value)) => Ok(value),
            Some(Err(msg)) => Err(Error::FetchError(msg)),
            None => Err(Error::FetchError("fetch script is empty".to_string())),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Fetcher<T> for ScriptedFetcher<T> {
    fn fetch(&self) -> BoxFuture<'static, Result<T>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let response = self.next_response();
        let delay = self.delay;

        async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            response
        }
        .boxed()
    }
}
