use std::sync::Arc;
use crate::core::types::{Entry, EntryId};

/// Transient (key, id) tuple produced by cursors.
///
/// `entry` is a cache filled by whoever looked the record up. It may be stale
/// after a write; anything that needs the current record content re-fetches
/// it from the partition by id.
#[derive(Debug, Clone)]
pub struct IndexEntry<K> {
    pub key: K,
    pub id: EntryId,
    pub entry: Option<Arc<Entry>>,
}

impl<K> IndexEntry<K> {
    pub fn new(key: K, id: EntryId) -> Self {
        IndexEntry { key, id, entry: None }
    }

    pub fn with_entry(mut self, entry: Arc<Entry>) -> Self {
        self.entry = Some(entry);
        self
    }

    pub fn set_entry(&mut self, entry: Arc<Entry>) {
        self.entry = Some(entry);
    }

    pub fn clear_entry(&mut self) {
        self.entry = None;
    }

    pub fn map_key<T>(self, f: impl FnOnce(K) -> T) -> IndexEntry<T> {
        IndexEntry {
            key: f(self.key),
            id: self.id,
            entry: self.entry,
        }
    }
}

// The cached record never takes part in equality
impl<K: PartialEq> PartialEq for IndexEntry<K> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.id == other.id
    }
}

impl<K: Eq> Eq for IndexEntry<K> {}
