use std::sync::Arc;
use tracing::debug;
use crate::core::error::{Error, Result};
use crate::core::partition::Partition;
use crate::core::types::{Entry, EntryId};
use crate::cursor::{check_open, Cursor};
use crate::index::entry::IndexEntry;
use crate::search::{SearchCursor, SearchKey};

/// Search result set: a cursor whose elements always carry the current
/// record, plus an entry iterator.
///
/// Records are re-fetched by id, so ids whose entry was deleted since the
/// cursor was built are skipped. Forward iteration stops after `size_limit`
/// entries and reports it through [`SearchResults::limit_reached`].
pub struct SearchResults<'a> {
    partition: &'a Partition,
    cursor: SearchCursor<'a>,
    size_limit: Option<usize>,
    returned: usize,
    limit_reached: bool,
    current: Option<IndexEntry<SearchKey>>,
    failed: bool,
}

impl<'a> SearchResults<'a> {
    pub fn new(partition: &'a Partition, cursor: SearchCursor<'a>, size_limit: Option<usize>) -> Self {
        SearchResults {
            partition,
            cursor,
            size_limit,
            returned: 0,
            limit_reached: false,
            current: None,
            failed: false,
        }
    }

    /// True once forward iteration stopped at the size limit.
    pub fn limit_reached(&self) -> bool {
        self.limit_reached
    }

    /// Entries returned by forward iteration since the last reset.
    pub fn returned(&self) -> usize {
        self.returned
    }

    /// The record at the current position.
    pub fn entry(&self) -> Result<Arc<Entry>> {
        self.current
            .as_ref()
            .and_then(|element| element.entry.clone())
            .ok_or_else(|| Error::invalid_position("entry()"))
    }

    fn reset(&mut self) {
        self.current = None;
        self.returned = 0;
        self.limit_reached = false;
    }

    fn advance(&mut self, forward: bool) -> Result<bool> {
        self.current = None;
        if forward && self.size_limit.is_some_and(|limit| self.returned >= limit) {
            if !self.limit_reached {
                debug!(limit = self.returned, "size limit reached");
            }
            self.limit_reached = true;
            return Ok(false);
        }

        loop {
            let moved = if forward { self.cursor.next()? } else { self.cursor.previous()? };
            if !moved {
                return Ok(false);
            }
            let mut element = self.cursor.get()?;
            let Some(entry) = self.partition.get_entry(element.id) else {
                continue;
            };
            element.set_entry(entry);
            if forward {
                self.returned += 1;
            }
            self.current = Some(element);
            return Ok(true);
        }
    }
}

impl Cursor for SearchResults<'_> {
    type Key = SearchKey;

    fn before(&mut self, element: &IndexEntry<SearchKey>) -> Result<()> {
        check_open(self.cursor.is_closed(), "before()")?;
        self.current = None;
        self.cursor.before(element)
    }

    fn after(&mut self, element: &IndexEntry<SearchKey>) -> Result<()> {
        check_open(self.cursor.is_closed(), "after()")?;
        self.current = None;
        self.cursor.after(element)
    }

    fn before_value(&mut self, id: Option<EntryId>, key: &SearchKey) -> Result<()> {
        check_open(self.cursor.is_closed(), "before_value()")?;
        self.current = None;
        self.cursor.before_value(id, key)
    }

    fn after_value(&mut self, id: Option<EntryId>, key: &SearchKey) -> Result<()> {
        check_open(self.cursor.is_closed(), "after_value()")?;
        self.current = None;
        self.cursor.after_value(id, key)
    }

    fn before_first(&mut self) -> Result<()> {
        check_open(self.cursor.is_closed(), "before_first()")?;
        self.reset();
        self.cursor.before_first()
    }

    fn after_last(&mut self) -> Result<()> {
        check_open(self.cursor.is_closed(), "after_last()")?;
        self.reset();
        self.cursor.after_last()
    }

    fn next(&mut self) -> Result<bool> {
        check_open(self.cursor.is_closed(), "next()")?;
        self.advance(true)
    }

    fn previous(&mut self) -> Result<bool> {
        check_open(self.cursor.is_closed(), "previous()")?;
        self.advance(false)
    }

    fn get(&self) -> Result<IndexEntry<SearchKey>> {
        check_open(self.cursor.is_closed(), "get()")?;
        self.current.clone().ok_or_else(|| Error::invalid_position("get()"))
    }

    fn available(&self) -> bool {
        !self.cursor.is_closed() && self.current.is_some()
    }

    fn close(&mut self) {
        self.current = None;
        self.cursor.close();
    }

    fn is_closed(&self) -> bool {
        self.cursor.is_closed()
    }
}

impl Iterator for SearchResults<'_> {
    type Item = Result<Arc<Entry>>;

    /// Continues forward from the current position; an error ends the iteration.
    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match Cursor::next(self).and_then(|found| if found { self.entry().map(Some) } else { Ok(None) }) {
            Ok(entry) => entry.map(Ok),
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::PartitionConfig;
    use crate::core::types::Dn;
    use crate::cursor::collect_ids;

    fn partition() -> Partition {
        let p = Partition::new(PartitionConfig::new("o=test")).unwrap();
        p.add(Entry::new(Dn::parse("o=test").unwrap())).unwrap();
        for n in 0..5 {
            p.add(Entry::new(Dn::parse(&format!("cn=u{},o=test", n)).unwrap())).unwrap();
        }
        p
    }

    #[test]
    fn size_limit_stops_forward_iteration() {
        let p = partition();
        let mut results = SearchResults::new(&p, Box::new(p.master_cursor()), Some(3));
        let entries: Vec<_> = results.by_ref().collect::<Result<_>>().unwrap();
        assert_eq!(entries.len(), 3);
        assert!(results.limit_reached());

        // a reset starts counting again
        assert_eq!(collect_ids(&mut results).unwrap().len(), 3);
    }

    #[test]
    fn deleted_entries_are_skipped() {
        let p = partition();
        let mut results = SearchResults::new(&p, Box::new(p.master_cursor()), None);
        let victim = p.entry_id(&Dn::parse("cn=u2,o=test").unwrap()).unwrap();
        p.delete(victim).unwrap();

        // the cursor still walks the snapshot taken before the delete
        let ids = collect_ids(&mut results).unwrap();
        assert_eq!(ids.len(), 5);
        assert!(!ids.contains(&victim));
        assert!(!results.limit_reached());
    }

    #[test]
    fn elements_carry_current_records() {
        let p = partition();
        let id = p.entry_id(&Dn::parse("cn=u0,o=test").unwrap()).unwrap();
        let mut results = SearchResults::new(&p, Box::new(p.master_cursor()), None);
        p.modify(id, &[crate::core::types::Modification::add("description", ["fresh"])])
            .unwrap();

        while Cursor::next(&mut results).unwrap() {
            if results.get().unwrap().id == id {
                assert!(results.entry().unwrap().has_attribute(&"description".into()));
            }
        }
    }
}
