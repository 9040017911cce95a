use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Debug;
use std::ops::Bound::{Included, Unbounded};
use std::sync::Arc;
use parking_lot::RwLock;
use roaring::RoaringTreemap;
use tracing::trace;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::EntryId;
use crate::index::cursor::IndexCursor;

/// Forward (key -> ids) and reverse (id -> keys) tables of one index.
/// Both sides always hold exactly the same set of tuples.
#[derive(Debug, Clone)]
pub struct IndexTables<K> {
    pub(crate) forward: BTreeMap<K, BTreeSet<EntryId>>,
    pub(crate) reverse: BTreeMap<EntryId, BTreeSet<K>>,
    pub(crate) count: u64,
}

impl<K: Ord + Clone + Debug> IndexTables<K> {
    pub fn new() -> Self {
        IndexTables {
            forward: BTreeMap::new(),
            reverse: BTreeMap::new(),
            count: 0,
        }
    }

    fn has_forward(&self, key: &K, id: EntryId) -> bool {
        self.forward.get(key).is_some_and(|ids| ids.contains(&id))
    }

    fn has_reverse(&self, key: &K, id: EntryId) -> bool {
        self.reverse.get(&id).is_some_and(|keys| keys.contains(key))
    }

    /// Inserts the tuple; `Ok(false)` when it was already present.
    pub fn add(&mut self, key: K, id: EntryId) -> Result<bool> {
        match (self.has_forward(&key, id), self.has_reverse(&key, id)) {
            (true, true) => Ok(false),
            (false, false) => {
                self.forward.entry(key.clone()).or_default().insert(id);
                self.reverse.entry(id).or_default().insert(key);
                self.count += 1;
                Ok(true)
            }
            _ => Err(mismatch(&key, id)),
        }
    }

    /// Removes the tuple; `Ok(false)` when it was not present.
    pub fn drop(&mut self, key: &K, id: EntryId) -> Result<bool> {
        match (self.has_forward(key, id), self.has_reverse(key, id)) {
            (false, false) => Ok(false),
            (true, true) => {
                if let Some(ids) = self.forward.get_mut(key) {
                    ids.remove(&id);
                    if ids.is_empty() {
                        self.forward.remove(key);
                    }
                }
                if let Some(keys) = self.reverse.get_mut(&id) {
                    keys.remove(key);
                    if keys.is_empty() {
                        self.reverse.remove(&id);
                    }
                }
                self.count -= 1;
                Ok(true)
            }
            _ => Err(mismatch(key, id)),
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn count_value(&self, key: &K) -> u64 {
        self.forward.get(key).map(|ids| ids.len() as u64).unwrap_or(0)
    }

    pub fn key_count(&self) -> usize {
        self.forward.len()
    }
}

impl<K: Ord + Clone + Debug> Default for IndexTables<K> {
    fn default() -> Self {
        Self::new()
    }
}

fn mismatch<K: Debug>(key: &K, id: EntryId) -> Error {
    Error::new(
        ErrorKind::InvariantViolation,
        format!("Forward and reverse tables disagree on tuple ({:?}, {})", key, id),
    )
}

/// One tuple change applied through [`Index::apply`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexChange<K> {
    Add(K, EntryId),
    Drop(K, EntryId),
}

impl<K: Clone> IndexChange<K> {
    pub fn inverse(&self) -> IndexChange<K> {
        match self {
            IndexChange::Add(key, id) => IndexChange::Drop(key.clone(), *id),
            IndexChange::Drop(key, id) => IndexChange::Add(key.clone(), *id),
        }
    }
}

/// Ordered bidirectional index from keys to entry ids.
///
/// Tables sit behind an `Arc` and are copied on write, so a cursor keeps
/// iterating the snapshot it was opened on while writers move ahead.
pub struct Index<K> {
    name: String,
    ordered: bool,
    tables: RwLock<Arc<IndexTables<K>>>,
}

impl<K: Ord + Clone + Debug> Index<K> {
    pub fn new(name: &str, ordered: bool) -> Self {
        Index {
            name: name.to_string(),
            ordered,
            tables: RwLock::new(Arc::new(IndexTables::new())),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_ordered(&self) -> bool {
        self.ordered
    }

    pub fn snapshot(&self) -> Arc<IndexTables<K>> {
        self.tables.read().clone()
    }

    pub fn forward(&self, key: &K) -> RoaringTreemap {
        let tables = self.tables.read();
        tables
            .forward
            .get(key)
            .map(|ids| ids.iter().map(|id| id.0).collect())
            .unwrap_or_default()
    }

    pub fn has(&self, key: &K, id: EntryId) -> bool {
        self.tables.read().has_forward(key, id)
    }

    /// Smallest key held by `id`; see [`Index::reverse_values`] for all of them.
    pub fn reverse(&self, id: EntryId) -> Option<K> {
        let tables = self.tables.read();
        tables.reverse.get(&id).and_then(|keys| keys.first().cloned())
    }

    pub fn reverse_values(&self, id: EntryId) -> Vec<K> {
        let tables = self.tables.read();
        tables
            .reverse
            .get(&id)
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn count(&self) -> u64 {
        self.tables.read().count()
    }

    pub fn count_value(&self, key: &K) -> u64 {
        self.tables.read().count_value(key)
    }

    pub fn key_count(&self) -> usize {
        self.tables.read().key_count()
    }

    /// Number of tuples whose key is greater than or equal to `key`.
    pub fn greater_than_count(&self, key: &K) -> Result<u64> {
        self.check_ordered("greater_than_count")?;
        let tables = self.tables.read();
        Ok(tables
            .forward
            .range((Included(key), Unbounded))
            .map(|(_, ids)| ids.len() as u64)
            .sum())
    }

    /// Number of tuples whose key is less than or equal to `key`.
    pub fn less_than_count(&self, key: &K) -> Result<u64> {
        self.check_ordered("less_than_count")?;
        let tables = self.tables.read();
        Ok(tables
            .forward
            .range((Unbounded, Included(key)))
            .map(|(_, ids)| ids.len() as u64)
            .sum())
    }

    /// True when `id` holds at least one key greater than or equal to `key`.
    pub fn reverse_greater_or_eq(&self, id: EntryId, key: &K) -> Result<bool> {
        self.check_ordered("reverse_greater_or_eq")?;
        let tables = self.tables.read();
        Ok(tables
            .reverse
            .get(&id)
            .is_some_and(|keys| keys.range((Included(key), Unbounded)).next().is_some()))
    }

    /// True when `id` holds at least one key less than or equal to `key`.
    pub fn reverse_less_or_eq(&self, id: EntryId, key: &K) -> Result<bool> {
        self.check_ordered("reverse_less_or_eq")?;
        let tables = self.tables.read();
        Ok(tables
            .reverse
            .get(&id)
            .is_some_and(|keys| keys.range((Unbounded, Included(key))).next().is_some()))
    }

    pub fn add(&self, key: K, id: EntryId) -> Result<()> {
        self.apply(&[IndexChange::Add(key, id)]).map(|_| ())
    }

    pub fn drop(&self, key: &K, id: EntryId) -> Result<()> {
        self.apply(&[IndexChange::Drop(key.clone(), id)]).map(|_| ())
    }

    /// Applies a batch in one critical section. Returns the inverse of every
    /// change that had an effect; on error nothing of the batch remains.
    pub fn apply(&self, changes: &[IndexChange<K>]) -> Result<Vec<IndexChange<K>>> {
        let mut guard = self.tables.write();
        let tables = Arc::make_mut(&mut *guard);
        let mut undo = Vec::with_capacity(changes.len());

        for change in changes {
            let applied = match change {
                IndexChange::Add(key, id) => tables.add(key.clone(), *id),
                IndexChange::Drop(key, id) => tables.drop(key, *id),
            };
            match applied {
                Ok(true) => undo.push(change.inverse()),
                Ok(false) => {
                    trace!(index = %self.name, ?change, "tuple already in requested state, ignored");
                }
                Err(e) => {
                    for inverse in undo.iter().rev() {
                        let _ = match inverse {
                            IndexChange::Add(key, id) => tables.add(key.clone(), *id),
                            IndexChange::Drop(key, id) => tables.drop(key, *id),
                        };
                    }
                    return Err(Error::new(e.kind, format!("index '{}': {}", self.name, e.context)));
                }
            }
        }

        Ok(undo)
    }

    /// Removes every tuple referencing `id` and returns the removed keys.
    pub fn drop_id(&self, id: EntryId) -> Result<Vec<K>> {
        let keys = self.reverse_values(id);
        let changes: Vec<_> = keys.iter().map(|k| IndexChange::Drop(k.clone(), id)).collect();
        self.apply(&changes)?;
        Ok(keys)
    }

    pub fn forward_cursor(&self) -> IndexCursor<K> {
        IndexCursor::forward(self.snapshot())
    }

    pub fn reverse_cursor(&self) -> IndexCursor<K> {
        IndexCursor::reverse(self.snapshot())
    }

    /// Forward cursor for value-range positioning; needs an ordering.
    pub fn range_cursor(&self) -> Result<IndexCursor<K>> {
        self.check_ordered("range_cursor")?;
        Ok(self.forward_cursor())
    }

    fn check_ordered(&self, operation: &str) -> Result<()> {
        if self.ordered {
            Ok(())
        } else {
            Err(Error::new(
                ErrorKind::UnsupportedOrdering,
                format!("{}: index '{}' has no ordering", operation, self.name),
            ))
        }
    }
}
