//! # revalidate-kit
//!
//! A tag-based response cache with revalidation policies, in the style of
//! fetch caches with incremental static regeneration.
//!
//! ## Features
//!
//! - **Three policies:** `NoStore`, `ForceCache` and `Revalidate { seconds }`
//! - **Stale-while-revalidate:** stale entries are served at once while one
//!   background refresh runs
//! - **Single-flight:** concurrent misses for a key share one fetch
//! - **On-demand invalidation:** by tag, by path, by key
//! - **Any serde type:** values are stored as versioned postcard envelopes
//! - **Pluggable:** custom stores via [`EntryStore`], metrics via
//!   [`CacheMetrics`](observability::CacheMetrics)
//!
//! ## Quick Start
//!
//! ```
//! use revalidate_kit::{Cache, CachePolicy, EntryState};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> revalidate_kit::Result<()> {
//! // 1. Create the cache (Clone it into every handler)
//! let cache = Cache::new();
//!
//! // 2. Read through it with a fetcher, a policy and tags
//! let html: String = cache
//!     .get_tagged(
//!         "/blog",
//!         || async { Ok::<_, String>("<h1>Blog</h1>".to_string()) },
//!         CachePolicy::Revalidate { seconds: 60.0 },
//!         &["posts"],
//!     )
//!     .await?;
//! assert_eq!(html, "<h1>Blog</h1>");
//!
//! // 3. Invalidate on demand, e.g. from a CMS webhook
//! cache.revalidate_tag("posts");
//! assert_eq!(cache.state("/blog"), Some(EntryState::Stale));
//! # Ok(())
//! # }
//! ```
//!
//! ## Runtime
//!
//! Fetches run on spawned tokio tasks, so reads that may fetch must be awaited
//! inside a tokio runtime. Time is read from `tokio::time::Instant`; tests can
//! pause and advance the clock.

#[macro_use]
extern crate log;

pub mod cache;
pub mod config;
pub mod coordinator;
pub mod entry;
pub mod error;
pub mod fetch;
pub mod invalidation;
pub mod key;
pub mod observability;
pub mod policy;
pub mod serialization;
pub mod store;

// Re-exports for convenience
pub use cache::{Cache, FetchOptions};
pub use config::CacheConfig;
pub use entry::{CacheEntry, EntryState};
pub use error::{Error, Result};
pub use fetch::Fetcher;
pub use invalidation::PathScope;
pub use policy::{CachePolicy, Decision};
pub use store::{EntryStore, InMemoryStore};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
