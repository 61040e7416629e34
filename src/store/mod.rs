//! Entry store implementations.

use crate::entry::CacheEntry;
use std::collections::HashSet;

pub mod inmemory;
pub mod tags;

pub use inmemory::InMemoryStore;
pub use tags::TagIndex;

/// Outcome of a read-modify-write on one key.
#[derive(Debug)]
pub enum Update {
    /// Keep the entry (in-place edits made by the closure stay).
    Keep,
    /// Store this entry under the key.
    Replace(CacheEntry),
    /// Delete the entry and all its tag associations.
    Remove,
}

/// Trait for entry store implementations.
///
/// Pure map semantics: no policy logic lives here. What a store must
/// guarantee is that an entry and its tag associations change together:
/// every mutation goes through [`update`](EntryStore::update), which runs under
/// an exclusive per-key section and re-indexes tags before releasing it.
///
/// **IMPORTANT:** The closure passed to `update` runs while the key is locked.
/// It must not call back into the store.
pub trait EntryStore: Send + Sync + 'static {
    /// Snapshot of the entry at `key`.
    fn read(&self, key: &str) -> Option<CacheEntry>;

    /// Exclusive read-modify-write of the entry at `key`.
    ///
    /// The closure sees `None` when the key is vacant. Tag edits made in place
    /// under [`Update::Keep`] are indexed as well.
    fn update(&self, key: &str, f: &mut dyn FnMut(Option<&mut CacheEntry>) -> Update);

    /// Keys whose entries currently list `tag`.
    fn keys_for_tag(&self, tag: &str) -> HashSet<String>;

    /// Visit every entry. Entries written during the scan may or may not be seen.
    fn scan(&self, f: &mut dyn FnMut(&CacheEntry));

    /// Number of stored entries.
    fn len(&self) -> usize;

    /// Number of distinct tags in use.
    fn tag_count(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Store `entry` under its own key, replacing whatever was there.
    fn write(&self, entry: CacheEntry) {
        let key = entry.key.clone();
        let mut slot = Some(entry);
        self.update(&key, &mut |_| match slot.take() {
            Some(entry) => Update::Replace(entry),
            None => Update::Keep,
        });
    }

    /// Remove the entry at `key`, returning it.
    fn delete(&self, key: &str) -> Option<CacheEntry> {
        let mut removed = None;
        self.update(key, &mut |entry| match entry {
            Some(entry) => {
                removed = Some(entry.clone());
                Update::Remove
            }
            None => Update::Keep,
        });
        removed
    }

    /// All keys currently stored.
    fn keys(&self) -> Vec<String> {
        let mut keys = Vec::with_capacity(self.len());
        self.scan(&mut |entry| keys.push(entry.key.clone()));
        keys
    }

    /// Remove every entry, one key at a time.
    fn clear_all(&self) {
        for key in self.keys() {
            self.update(&key, &mut |_| Update::Remove);
        }
    }
}
