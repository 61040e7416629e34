//! In-memory entry store (default, thread-safe).
//!
//! Uses DashMap for concurrent access with per-key sharding. An entry and its
//! tag associations are updated while the entry's shard is write-locked, so
//! readers never see one without the other.

use super::{EntryStore, TagIndex, Update};
use crate::entry::CacheEntry;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;

/// Thread-safe in-memory entry store.
///
/// Cloning is cheap and shares the underlying maps.
///
/// # Example
///
/// ```
/// use revalidate_kit::entry::CacheEntry;
/// use revalidate_kit::store::{EntryStore, InMemoryStore};
/// use tokio::time::Instant;
///
/// let store = InMemoryStore::new();
/// let tags = ["posts".to_string()].into_iter().collect();
/// store.write(CacheEntry::new("/blog", b"page".to_vec(), tags, None, None, Instant::now()));
///
/// assert!(store.read("/blog").is_some());
/// assert!(store.keys_for_tag("posts").contains("/blog"));
/// ```
#[derive(Clone, Default)]
pub struct InMemoryStore {
    entries: Arc<DashMap<String, CacheEntry>>,
    tags: Arc<TagIndex>,
}

impl InMemoryStore {
    /// Create a new in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Tags the index currently links to `key`.
    pub fn tags_for_key(&self, key: &str) -> HashSet<String> {
        self.tags.tags_for_key(key)
    }
}

impl EntryStore for InMemoryStore {
    fn read(&self, key: &str) -> Option<CacheEntry> {
        self.entries.get(key).map(|entry| entry.clone())
    }

    fn update(&self, key: &str, f: &mut dyn FnMut(Option<&mut CacheEntry>) -> Update) {
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let before = occupied.get().tags.clone();
                match f(Some(occupied.get_mut())) {
                    Update::Keep => {
                        if occupied.get().tags != before {
                            self.tags.replace_tags(key, &occupied.get().tags);
                            debug!("✓ InMemory RETAG {}", key);
                        }
                    }
                    Update::Replace(mut entry) => {
                        entry.key = key.to_string();
                        if entry.tags != before {
                            self.tags.replace_tags(key, &entry.tags);
                        }
                        occupied.insert(entry);
                        debug!("✓ InMemory SET {}", key);
                    }
                    Update::Remove => {
                        self.tags.remove_all_tags(key);
                        occupied.remove();
                        debug!("✓ InMemory DELETE {}", key);
                    }
                }
            }
            Entry::Vacant(vacant) => {
                if let Update::Replace(mut entry) = f(None) {
                    entry.key = key.to_string();
                    self.tags.add_tags(key, &entry.tags);
                    vacant.insert(entry);
                    debug!("✓ InMemory SET {}", key);
                }
            }
        }
    }

    fn keys_for_tag(&self, tag: &str) -> HashSet<String> {
        self.tags.keys_for_tag(tag)
    }

    fn scan(&self, f: &mut dyn FnMut(&CacheEntry)) {
        for entry in self.entries.iter() {
            f(entry.value());
        }
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn tag_count(&self) -> usize {
        self.tags.tag_count()
    }
}
