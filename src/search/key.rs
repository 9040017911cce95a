use std::fmt::Debug;
use std::ops::Bound::{Excluded, Included, Unbounded};
use std::sync::Arc;
use crate::core::error::{Error, Result};
use crate::core::types::EntryId;
use crate::cursor::{check_open, Cursor};
use crate::index::entry::IndexEntry;
use crate::index::index::IndexTables;
use crate::search::SearchKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Position {
    BeforeFirst,
    AfterLast,
    On(EntryId),
    Before(EntryId),
    After(EntryId),
}

/// Walks the ids stored under one key of an index snapshot, in id order.
///
/// Elements carry `label` as their key: the assertion value for equality
/// cursors, `None` for presence and scope cursors.
pub struct KeyCursor<K> {
    tables: Arc<IndexTables<K>>,
    key: K,
    label: SearchKey,
    position: Position,
    closed: bool,
}

impl<K: Ord + Clone + Debug> KeyCursor<K> {
    pub fn new(tables: Arc<IndexTables<K>>, key: K, label: SearchKey) -> Self {
        KeyCursor {
            tables,
            key,
            label,
            position: Position::BeforeFirst,
            closed: false,
        }
    }

    fn step(&self, forward: bool) -> Option<EntryId> {
        let ids = self.tables.forward.get(&self.key)?;
        let found = match (self.position, forward) {
            (Position::BeforeFirst, true) => ids.first(),
            (Position::AfterLast, false) => ids.last(),
            (Position::BeforeFirst, false) | (Position::AfterLast, true) => None,
            (Position::On(id) | Position::After(id), true) => ids.range((Excluded(id), Unbounded)).next(),
            (Position::Before(id), true) => ids.range((Included(id), Unbounded)).next(),
            (Position::On(id) | Position::Before(id), false) => ids.range((Unbounded, Excluded(id))).next_back(),
            (Position::After(id), false) => ids.range((Unbounded, Included(id))).next_back(),
        };
        found.copied()
    }

    /// Where a seek lands when the element's key differs from ours.
    fn outside(&self, key: &SearchKey) -> Option<Position> {
        match (&self.label, key) {
            (Some(label), Some(key)) if key < label => Some(Position::BeforeFirst),
            (Some(label), Some(key)) if key > label => Some(Position::AfterLast),
            _ => None,
        }
    }

    fn seek_before(&mut self, id: EntryId, key: &SearchKey) {
        self.position = self.outside(key).unwrap_or(Position::Before(id));
    }

    fn seek_after(&mut self, id: EntryId, key: &SearchKey) {
        self.position = self.outside(key).unwrap_or(Position::After(id));
    }
}

impl<K: Ord + Clone + Debug> Cursor for KeyCursor<K> {
    type Key = SearchKey;

    fn before(&mut self, element: &IndexEntry<SearchKey>) -> Result<()> {
        check_open(self.closed, "before()")?;
        self.seek_before(element.id, &element.key);
        Ok(())
    }

    fn after(&mut self, element: &IndexEntry<SearchKey>) -> Result<()> {
        check_open(self.closed, "after()")?;
        self.seek_after(element.id, &element.key);
        Ok(())
    }

    fn before_value(&mut self, id: Option<EntryId>, key: &SearchKey) -> Result<()> {
        check_open(self.closed, "before_value()")?;
        self.seek_before(id.unwrap_or(EntryId::MIN), key);
        Ok(())
    }

    fn after_value(&mut self, id: Option<EntryId>, key: &SearchKey) -> Result<()> {
        check_open(self.closed, "after_value()")?;
        self.seek_after(id.unwrap_or(EntryId::MAX), key);
        Ok(())
    }

    fn before_first(&mut self) -> Result<()> {
        check_open(self.closed, "before_first()")?;
        self.position = Position::BeforeFirst;
        Ok(())
    }

    fn after_last(&mut self) -> Result<()> {
        check_open(self.closed, "after_last()")?;
        self.position = Position::AfterLast;
        Ok(())
    }

    fn next(&mut self) -> Result<bool> {
        check_open(self.closed, "next()")?;
        match self.step(true) {
            Some(id) => {
                self.position = Position::On(id);
                Ok(true)
            }
            None => {
                self.position = Position::AfterLast;
                Ok(false)
            }
        }
    }

    fn previous(&mut self) -> Result<bool> {
        check_open(self.closed, "previous()")?;
        match self.step(false) {
            Some(id) => {
                self.position = Position::On(id);
                Ok(true)
            }
            None => {
                self.position = Position::BeforeFirst;
                Ok(false)
            }
        }
    }

    fn get(&self) -> Result<IndexEntry<SearchKey>> {
        check_open(self.closed, "get()")?;
        match self.position {
            Position::On(id) => Ok(IndexEntry::new(self.label.clone(), id)),
            _ => Err(Error::invalid_position("get()")),
        }
    }

    fn available(&self) -> bool {
        !self.closed && matches!(self.position, Position::On(_))
    }

    fn close(&mut self) {
        self.closed = true;
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}
