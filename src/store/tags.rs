//! Reverse index from tag to cache keys.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::HashSet;

/// Tag → keys index, plus the forward key → tags map needed to unlink a key.
///
/// The index does no locking of its own beyond `DashMap` shards. Callers
/// mutate a key's associations only from inside that key's exclusive section
/// in the entry store, which keeps both directions consistent with the entries.
#[derive(Default)]
pub struct TagIndex {
    by_tag: DashMap<String, HashSet<String>>,
    by_key: DashMap<String, HashSet<String>>,
}

impl TagIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Associate `key` with every tag in `tags`.
    pub fn add_tags<'a>(&self, key: &str, tags: impl IntoIterator<Item = &'a String>) {
        let mut added = 0usize;
        for tag in tags {
            self.by_tag
                .entry(tag.clone())
                .or_default()
                .insert(key.to_string());
            self.by_key
                .entry(key.to_string())
                .or_default()
                .insert(tag.clone());
            added += 1;
        }

        if added > 0 {
            trace!("TagIndex ADD {} ({} tags)", key, added);
        }
    }

    /// Drop every association of `key`.
    pub fn remove_all_tags(&self, key: &str) {
        let Some((_, tags)) = self.by_key.remove(key) else {
            return;
        };

        for tag in &tags {
            self.unlink(tag, key);
        }
        trace!("TagIndex REMOVE {} ({} tags)", key, tags.len());
    }

    /// Swap `key`'s tag set. Old links are gone before new ones appear.
    pub fn replace_tags<'a>(&self, key: &str, tags: impl IntoIterator<Item = &'a String>) {
        self.remove_all_tags(key);
        self.add_tags(key, tags);
    }

    /// Snapshot of the keys currently carrying `tag`.
    pub fn keys_for_tag(&self, tag: &str) -> HashSet<String> {
        self.by_tag
            .get(tag)
            .map(|keys| keys.clone())
            .unwrap_or_default()
    }

    /// Snapshot of the tags currently linked to `key`.
    pub fn tags_for_key(&self, key: &str) -> HashSet<String> {
        self.by_key
            .get(key)
            .map(|tags| tags.clone())
            .unwrap_or_default()
    }

    /// Number of distinct tags with at least one key.
    pub fn tag_count(&self) -> usize {
        self.by_tag.len()
    }

    fn unlink(&self, tag: &str, key: &str) {
        if let Entry::Occupied(mut keys) = self.by_tag.entry(tag.to_string()) {
            keys.get_mut().remove(key);
            if keys.get().is_empty() {
                keys.remove();
            }
        }
    }
}
