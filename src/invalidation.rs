//! On-demand invalidation: tags, paths, single keys and sweeps.
//!
//! | Operation | Effect on matching entries | Next read |
//! |-----------|----------------------------|-----------|
//! | `revalidate_tag` | `Fresh → Stale` | served stale, refreshed in background |
//! | `revalidate_path` | `Fresh → Stale` | served stale, refreshed in background |
//! | `invalidate` | `→ Invalid` | waits on a refetch |
//! | `purge` | removed with its tags | miss |
//!
//! Every per-key change runs inside the store's exclusive section for that
//! key, so a concurrent read sees the entry either before or after it.

use crate::cache::Cache;
use crate::entry::EntryState;
use crate::key::CacheKeyBuilder;
use crate::store::{EntryStore, Update};

/// Which keys [`Cache::revalidate_path`] marks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PathScope {
    /// Only the entry whose key is exactly the path.
    #[default]
    Page,
    /// The path and every key nested under it.
    Layout,
}

impl<S: EntryStore> Cache<S> {
    /// Mark every entry tagged `tag` as stale.
    ///
    /// Entries that are already stale, revalidating or invalid keep their
    /// state, but a refresh already in flight for them will land as stale.
    /// Calling this twice is the same as calling it once.
    ///
    /// Returns the number of entries touched.
    pub fn revalidate_tag(&self, tag: &str) -> usize {
        let keys = self.store.keys_for_tag(tag);
        let mut touched = 0;

        for key in &keys {
            if let Some(state) = self.mark_stale_if(key, |entry| entry.has_tag(tag)) {
                self.metrics.record_invalidation(key, Some(state));
                touched += 1;
            }
        }

        info!("✓ revalidate_tag({}): {} entries", tag, touched);
        touched
    }

    /// Mark the entry at `path` as stale, plus everything nested under it for
    /// [`PathScope::Layout`].
    ///
    /// Keys are matched as paths, so `/blog` covers `/blog/a` but not
    /// `/blogroll`. Returns the number of entries touched.
    pub fn revalidate_path(&self, path: &str, scope: PathScope) -> usize {
        let path = CacheKeyBuilder::path(path);
        let matches = |key: &str| match scope {
            PathScope::Page => CacheKeyBuilder::is_path(key, &path),
            PathScope::Layout => CacheKeyBuilder::is_under_path(key, &path),
        };

        let mut touched = 0;
        for key in self.store.keys().into_iter().filter(|key| matches(key)) {
            if let Some(state) = self.mark_stale_if(&key, |_| true) {
                self.metrics.record_invalidation(&key, Some(state));
                touched += 1;
            }
        }

        info!("✓ revalidate_path({}, {:?}): {} entries", path, scope, touched);
        touched
    }

    /// Flag the entry at `key` so the next read refetches synchronously.
    ///
    /// Returns `false` if there was no entry.
    pub fn invalidate(&self, key: &str) -> bool {
        let mut found = false;
        self.store.update(key, &mut |entry| {
            if let Some(entry) = entry {
                entry.mark_invalid();
                found = true;
            }
            Update::Keep
        });

        if found {
            self.metrics
                .record_invalidation(key, Some(EntryState::Invalid));
            info!("✓ invalidate({})", key);
        }
        found
    }

    /// Remove the entry at `key` together with its tag associations.
    ///
    /// A fetch already in flight for `key` still stores its result afterwards.
    /// Returns `false` if there was no entry.
    pub fn purge(&self, key: &str) -> bool {
        let removed = self.store.delete(key).is_some();
        if removed {
            self.metrics.record_invalidation(key, None);
            info!("✓ purge({})", key);
        }
        removed
    }

    /// Remove every entry past its hard TTL. Returns the number removed.
    pub fn purge_expired(&self) -> usize {
        let removed = self
            .store
            .keys()
            .into_iter()
            .filter(|key| self.remove_if_expired(key))
            .inspect(|key| self.metrics.record_invalidation(key, None))
            .count();

        if removed > 0 {
            info!("✓ purge_expired: {} entries", removed);
        }
        removed
    }

    /// Remove every entry.
    pub fn clear(&self) {
        let count = self.store.len();
        self.store.clear_all();
        info!("✓ Cache cleared ({} entries)", count);
    }

    /// Mark `key` stale if its current entry passes `check`.
    ///
    /// The check runs under the key's lock, so an entry replaced since the
    /// key was looked up is judged by its new contents.
    fn mark_stale_if(
        &self,
        key: &str,
        check: impl Fn(&crate::entry::CacheEntry) -> bool,
    ) -> Option<EntryState> {
        let mut marked = None;
        self.store.update(key, &mut |entry| {
            if let Some(entry) = entry {
                if check(entry) {
                    entry.mark_stale();
                    marked = Some(entry.state);
                }
            }
            Update::Keep
        });
        marked
    }
}
