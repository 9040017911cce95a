use std::collections::BTreeMap;
use std::ops::Bound::{Excluded, Included, Unbounded};
use std::sync::Arc;
use crate::core::error::{Error, Result};
use crate::core::types::{Entry, EntryId, Value};
use crate::cursor::{check_open, Cursor};
use crate::index::entry::IndexEntry;

/// Primary record table, id -> entry.
pub type MasterTable = BTreeMap<EntryId, Arc<Entry>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Position {
    BeforeFirst,
    AfterLast,
    On(EntryId),
    Before(EntryId),
    After(EntryId),
}

/// Full scan over every stored entry in id order.
///
/// Yields `IndexEntry { key: None, id, entry: Some(..) }`, so the record is
/// already cached for whatever evaluates it next.
pub struct MasterCursor {
    table: Arc<MasterTable>,
    position: Position,
    current: Option<Arc<Entry>>,
    closed: bool,
}

impl MasterCursor {
    pub fn new(table: Arc<MasterTable>) -> Self {
        MasterCursor {
            table,
            position: Position::BeforeFirst,
            current: None,
            closed: false,
        }
    }

    fn land(&mut self, found: Option<(&EntryId, &Arc<Entry>)>, past: Position) -> bool {
        match found {
            Some((id, entry)) => {
                let id = *id;
                let entry = entry.clone();
                self.position = Position::On(id);
                self.current = Some(entry);
                true
            }
            None => {
                self.position = past;
                self.current = None;
                false
            }
        }
    }

    fn seek_before(&mut self, id: EntryId) {
        self.position = Position::Before(id);
        self.current = None;
    }

    fn seek_after(&mut self, id: EntryId) {
        self.position = Position::After(id);
        self.current = None;
    }
}

impl Cursor for MasterCursor {
    type Key = Option<Value>;

    fn before(&mut self, element: &IndexEntry<Self::Key>) -> Result<()> {
        check_open(self.closed, "before()")?;
        self.seek_before(element.id);
        Ok(())
    }

    fn after(&mut self, element: &IndexEntry<Self::Key>) -> Result<()> {
        check_open(self.closed, "after()")?;
        self.seek_after(element.id);
        Ok(())
    }

    fn before_value(&mut self, id: Option<EntryId>, _key: &Self::Key) -> Result<()> {
        check_open(self.closed, "before_value()")?;
        self.seek_before(id.unwrap_or(EntryId::MIN));
        Ok(())
    }

    fn after_value(&mut self, id: Option<EntryId>, _key: &Self::Key) -> Result<()> {
        check_open(self.closed, "after_value()")?;
        self.seek_after(id.unwrap_or(EntryId::MAX));
        Ok(())
    }

    fn before_first(&mut self) -> Result<()> {
        check_open(self.closed, "before_first()")?;
        self.position = Position::BeforeFirst;
        self.current = None;
        Ok(())
    }

    fn after_last(&mut self) -> Result<()> {
        check_open(self.closed, "after_last()")?;
        self.position = Position::AfterLast;
        self.current = None;
        Ok(())
    }

    fn next(&mut self) -> Result<bool> {
        check_open(self.closed, "next()")?;
        let table = self.table.clone();
        let found = match self.position {
            Position::BeforeFirst => table.iter().next(),
            Position::AfterLast => None,
            Position::On(id) | Position::After(id) => table.range((Excluded(id), Unbounded)).next(),
            Position::Before(id) => table.range((Included(id), Unbounded)).next(),
        };
        Ok(self.land(found, Position::AfterLast))
    }

    fn previous(&mut self) -> Result<bool> {
        check_open(self.closed, "previous()")?;
        let table = self.table.clone();
        let found = match self.position {
            Position::AfterLast => table.iter().next_back(),
            Position::BeforeFirst => None,
            Position::On(id) | Position::Before(id) => table.range((Unbounded, Excluded(id))).next_back(),
            Position::After(id) => table.range((Unbounded, Included(id))).next_back(),
        };
        Ok(self.land(found, Position::BeforeFirst))
    }

    fn get(&self) -> Result<IndexEntry<Self::Key>> {
        check_open(self.closed, "get()")?;
        match (&self.position, &self.current) {
            (Position::On(id), Some(entry)) => Ok(IndexEntry::new(None, *id).with_entry(entry.clone())),
            _ => Err(Error::invalid_position("get()")),
        }
    }

    fn available(&self) -> bool {
        !self.closed && matches!(self.position, Position::On(_))
    }

    fn close(&mut self) {
        self.closed = true;
        self.current = None;
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Dn;
    use crate::cursor::{collect_ids, collect_ids_reverse};

    fn table(ids: &[u64]) -> Arc<MasterTable> {
        let mut table = MasterTable::new();
        for &n in ids {
            let mut entry = Entry::new(Dn::parse(&format!("cn=e{},dc=test", n)).unwrap());
            entry.id = EntryId(n);
            table.insert(EntryId(n), Arc::new(entry));
        }
        Arc::new(table)
    }

    #[test]
    fn scans_in_id_order_both_ways() {
        let mut cursor = MasterCursor::new(table(&[3, 1, 2]));
        assert_eq!(collect_ids(&mut cursor).unwrap(), vec![EntryId(1), EntryId(2), EntryId(3)]);
        assert_eq!(collect_ids_reverse(&mut cursor).unwrap(), vec![EntryId(3), EntryId(2), EntryId(1)]);
    }

    #[test]
    fn yields_cached_records() {
        let mut cursor = MasterCursor::new(table(&[7]));
        assert!(cursor.first().unwrap());
        let element = cursor.get().unwrap();
        assert_eq!(element.key, None);
        assert_eq!(element.entry.unwrap().id, EntryId(7));
    }

    #[test]
    fn seeks_by_id() {
        let mut cursor = MasterCursor::new(table(&[1, 4, 9]));
        cursor.before(&IndexEntry::new(None, EntryId(4))).unwrap();
        assert!(cursor.next().unwrap());
        assert_eq!(cursor.get().unwrap().id, EntryId(4));

        cursor.after(&IndexEntry::new(None, EntryId(4))).unwrap();
        assert!(cursor.previous().unwrap());
        assert_eq!(cursor.get().unwrap().id, EntryId(4));

        cursor.after(&IndexEntry::new(None, EntryId(5))).unwrap();
        assert!(cursor.next().unwrap());
        assert_eq!(cursor.get().unwrap().id, EntryId(9));
        assert!(!cursor.next().unwrap());
        assert!(!cursor.available());
    }
}
