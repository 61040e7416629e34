//! Cache policies and the revalidation decision engine.
//!
//! # Overview
//!
//! Every read carries one of three policies:
//!
//! ```
//! use revalidate_kit::policy::CachePolicy;
//!
//! // 1. NoStore - never cache, always fetch
//! let _p = CachePolicy::NoStore;
//!
//! // 2. ForceCache - cache until explicitly invalidated (default)
//! let _p = CachePolicy::ForceCache;
//!
//! // 3. Revalidate - fresh for N seconds, then stale-while-revalidate
//! let _p = CachePolicy::Revalidate { seconds: 60.0 };
//! ```
//!
//! # Decision Table
//!
//! | Entry state | Decision | Caller | Background |
//! |-------------|----------|--------|------------|
//! | any, `NoStore` | `Bypass` | waits on fetch | - |
//! | absent | `Miss` | waits on fetch | - |
//! | `Fresh` | `Hit` | served | - |
//! | `Stale` | `StaleHit` | served | one refresh |
//! | `Revalidating` | `Pending` | served | already running |
//! | `Invalid` | `Miss` | waits on fetch | - |
//! | past hard TTL | `Expired` | waits on fetch | - |

use crate::entry::{CacheEntry, EntryState};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use tokio::time::Instant;

/// Longest accepted tag, in bytes.
pub const MAX_TAG_LEN: usize = 256;

/// Most tags a single entry may carry.
pub const MAX_TAGS_PER_ENTRY: usize = 128;

/// Caching policy for a single read.
///
/// Serializes as a tagged union so it can live in JSON config:
///
/// ```
/// use revalidate_kit::policy::CachePolicy;
///
/// let p: CachePolicy = serde_json::from_str(r#"{"kind":"revalidate","seconds":60}"#).unwrap();
/// assert_eq!(p, CachePolicy::Revalidate { seconds: 60.0 });
///
/// let p: CachePolicy = serde_json::from_str(r#"{"kind":"no-store"}"#).unwrap();
/// assert_eq!(p, CachePolicy::NoStore);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum CachePolicy {
    /// **NoStore**: never cache; every read waits on a fetch.
    ///
    /// Overrides any tags or expiry passed alongside it.
    NoStore,

    /// **ForceCache**: once fetched, fresh until explicitly invalidated.
    #[default]
    ForceCache,

    /// **Revalidate**: fresh while `now < created_at + seconds`, then stale.
    ///
    /// `seconds == 0` stores the value already stale: the first read waits on
    /// the fetch, later reads are served and refreshed in the background.
    Revalidate { seconds: f64 },
}

impl CachePolicy {
    /// Revalidate policy from a duration.
    pub fn revalidate_after(window: Duration) -> Self {
        CachePolicy::Revalidate {
            seconds: window.as_secs_f64(),
        }
    }

    /// Fail fast on configurations no entry could satisfy.
    ///
    /// # Errors
    ///
    /// Returns `Error::PolicyError` for negative, NaN, infinite or
    /// unrepresentably large seconds.
    pub fn validate(&self) -> Result<()> {
        match self {
            CachePolicy::Revalidate { seconds } if !seconds.is_finite() => Err(
                Error::PolicyError(format!("revalidate seconds must be finite, got {}", seconds)),
            ),
            CachePolicy::Revalidate { seconds } if *seconds < 0.0 => Err(Error::PolicyError(
                format!("revalidate seconds must not be negative, got {}", seconds),
            )),
            CachePolicy::Revalidate { seconds } if Duration::try_from_secs_f64(*seconds).is_err() => {
                Err(Error::PolicyError(format!("revalidate seconds out of range: {}", seconds)))
            }
            _ => Ok(()),
        }
    }

    /// Whether reads under this policy ever touch the store.
    pub fn is_cacheable(&self) -> bool {
        match self {
            CachePolicy::NoStore => false,
            CachePolicy::ForceCache => true,
            CachePolicy::Revalidate { .. } => true,
        }
    }

    /// Freshness window for new entries. `None` means fresh until invalidated.
    pub fn fresh_for(&self) -> Option<Duration> {
        match self {
            CachePolicy::Revalidate { seconds } => {
                Duration::try_from_secs_f64(*seconds).ok()
            }
            _ => None,
        }
    }
}

impl std::fmt::Display for CachePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CachePolicy::NoStore => write!(f, "no-store"),
            CachePolicy::ForceCache => write!(f, "force-cache"),
            CachePolicy::Revalidate { seconds } => write!(f, "revalidate={}", seconds),
        }
    }
}

impl FromStr for CachePolicy {
    type Err = Error;

    /// Parse `no-store`, `force-cache` or `revalidate=<seconds>`.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        match s {
            "no-store" => Ok(CachePolicy::NoStore),
            "force-cache" => Ok(CachePolicy::ForceCache),
            _ => {
                let seconds = s
                    .strip_prefix("revalidate=")
                    .ok_or_else(|| Error::PolicyError(format!("unknown cache policy: {}", s)))?
                    .parse::<f64>()
                    .map_err(|e| Error::PolicyError(format!("bad revalidate seconds: {}", e)))?;
                let policy = CachePolicy::Revalidate { seconds };
                policy.validate()?;
                Ok(policy)
            }
        }
    }
}

/// Check a tag set before anything is fetched.
///
/// # Errors
///
/// Returns `Error::PolicyError` for empty or oversized tags, or too many of them.
pub fn validate_tags(tags: &[String]) -> Result<()> {
    if tags.len() > MAX_TAGS_PER_ENTRY {
        return Err(Error::PolicyError(format!(
            "at most {} tags per entry, got {}",
            MAX_TAGS_PER_ENTRY,
            tags.len()
        )));
    }

    for tag in tags {
        if tag.is_empty() {
            return Err(Error::PolicyError("tags must not be empty".to_string()));
        }
        if tag.len() > MAX_TAG_LEN {
            return Err(Error::PolicyError(format!(
                "tag exceeds {} bytes: {}...",
                MAX_TAG_LEN,
                tag.chars().take(32).collect::<String>()
            )));
        }
    }

    Ok(())
}

/// Check that a hard expiry does not cut the revalidation window short.
///
/// # Errors
///
/// Returns `Error::PolicyError` when `expire` is shorter than the freshness window.
pub fn validate_expire(policy: &CachePolicy, expire: Option<Duration>) -> Result<()> {
    match (policy.fresh_for(), expire) {
        (Some(fresh), Some(exp)) if exp < fresh => Err(Error::PolicyError(format!(
            "expire ({:?}) must not be shorter than the revalidate window ({:?})",
            exp, fresh
        ))),
        _ => Ok(()),
    }
}

/// What a read should do with the entry it found.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    /// Policy forbids caching: run the fetcher, store nothing.
    Bypass,
    /// No usable entry: wait for the coordinator.
    Miss,
    /// Serve the cached value, nothing else to do.
    Hit,
    /// Serve the cached value and start a background refresh.
    StaleHit,
    /// Serve the cached value; a refresh is already running.
    Pending,
    /// Entry outlived its hard TTL: remove it, then treat as a miss.
    Expired,
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Decision::Bypass => write!(f, "BYPASS"),
            Decision::Miss => write!(f, "MISS"),
            Decision::Hit => write!(f, "HIT"),
            Decision::StaleHit => write!(f, "STALE"),
            Decision::Pending => write!(f, "PENDING"),
            Decision::Expired => write!(f, "EXPIRED"),
        }
    }
}

/// Decide how a read under `policy` treats `entry` at `now`.
pub fn decide(policy: &CachePolicy, entry: Option<&CacheEntry>, now: Instant) -> Decision {
    if !policy.is_cacheable() {
        return Decision::Bypass;
    }

    let Some(entry) = entry else {
        return Decision::Miss;
    };

    if entry.is_expired(now) {
        return Decision::Expired;
    }

    match entry.effective_state(now) {
        EntryState::Fresh => Decision::Hit,
        EntryState::Stale => Decision::StaleHit,
        EntryState::Revalidating => Decision::Pending,
        EntryState::Invalid => Decision::Miss,
    }
}
