//! Cached entry model and lifecycle states.

use std::collections::HashSet;
use std::time::Duration;
use tokio::time::Instant;

/// Lifecycle state of a cached entry.
///
/// ```text
/// Fresh ──(now >= stale_at / revalidate_tag)──▶ Stale ──(read)──▶ Revalidating
///   ▲                                                                  │
///   └──────────────────────────(refresh ok)────────────────────────────┘
///                       (refresh failed) ──▶ Stale
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntryState {
    /// Servable without any refresh.
    Fresh,
    /// Servable, but the next read starts a background refresh.
    Stale,
    /// A background refresh is in flight; the old value is still served.
    Revalidating,
    /// Explicitly invalidated; the next read refetches synchronously.
    Invalid,
}

impl std::fmt::Display for EntryState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntryState::Fresh => write!(f, "Fresh"),
            EntryState::Stale => write!(f, "Stale"),
            EntryState::Revalidating => write!(f, "Revalidating"),
            EntryState::Invalid => write!(f, "Invalid"),
        }
    }
}

/// A cached value together with its tags, timestamps and state.
///
/// `value` holds an enveloped payload produced by
/// [`serialize_for_cache`](crate::serialization::serialize_for_cache).
#[derive(Clone, Debug)]
pub struct CacheEntry {
    pub key: String,
    pub value: Vec<u8>,
    pub tags: HashSet<String>,
    pub created_at: Instant,
    /// `None` means the entry never goes stale on its own.
    pub stale_at: Option<Instant>,
    /// Hard TTL. Past this point the entry is removed instead of served.
    pub expires_at: Option<Instant>,
    pub state: EntryState,
    /// Bumped every time an invalidation marks this entry.
    pub generation: u64,
}

impl CacheEntry {
    /// Build a fresh entry.
    ///
    /// `fresh_for` is the revalidation window (`None` = fresh until invalidated),
    /// `expire` the optional hard TTL. When both are set the stale point never
    /// lies past the expiry point.
    pub fn new(
        key: impl Into<String>,
        value: Vec<u8>,
        tags: HashSet<String>,
        fresh_for: Option<Duration>,
        expire: Option<Duration>,
        now: Instant,
    ) -> Self {
        let expires_at = expire.and_then(|d| now.checked_add(d));
        let stale_at = match (fresh_for.and_then(|d| now.checked_add(d)), expires_at) {
            (Some(stale), Some(exp)) => Some(stale.min(exp)),
            (None, Some(exp)) => Some(exp),
            (stale, None) => stale,
        };

        CacheEntry {
            key: key.into(),
            value,
            tags,
            created_at: now,
            stale_at,
            expires_at,
            state: EntryState::Fresh,
            generation: 0,
        }
    }

    /// State as observed at `now`: a `Fresh` entry past its stale point reads as `Stale`.
    pub fn effective_state(&self, now: Instant) -> EntryState {
        match self.state {
            EntryState::Fresh if self.stale_at.is_some_and(|s| now >= s) => EntryState::Stale,
            state => state,
        }
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|exp| now > exp)
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    /// Mark the entry stale after an invalidation.
    ///
    /// `Revalidating` and `Invalid` entries keep their state; the generation
    /// bump makes an in-flight refresh land as `Stale`.
    pub fn mark_stale(&mut self) {
        self.generation += 1;
        if self.state == EntryState::Fresh {
            self.state = EntryState::Stale;
        }
    }

    /// Flag the entry so the next read refetches synchronously.
    pub fn mark_invalid(&mut self) {
        self.generation += 1;
        self.state = EntryState::Invalid;
    }
}
