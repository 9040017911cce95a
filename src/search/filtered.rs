use crate::core::error::{Error, Result};
use crate::core::master::MasterCursor;
use crate::core::types::EntryId;
use crate::cursor::{check_open, Cursor};
use crate::index::entry::IndexEntry;
use crate::search::evaluator::Evaluator;
use crate::search::SearchKey;

/// Full scan of the master table keeping the entries an evaluator accepts.
///
/// Used for leaves without a usable index and for NOT. Seeks position the
/// underlying scan by id; seeking by value fails with `UnsupportedOperation`.
pub struct FilteredCursor<'a> {
    master: MasterCursor,
    evaluator: Evaluator<'a>,
    current: Option<IndexEntry<SearchKey>>,
    negated: bool,
    closed: bool,
}

impl<'a> FilteredCursor<'a> {
    pub fn new(master: MasterCursor, evaluator: Evaluator<'a>) -> Self {
        FilteredCursor {
            master,
            evaluator,
            current: None,
            negated: false,
            closed: false,
        }
    }

    /// Keeps the entries the evaluator rejects instead.
    pub fn negated(master: MasterCursor, evaluator: Evaluator<'a>) -> Self {
        FilteredCursor {
            negated: true,
            ..Self::new(master, evaluator)
        }
    }

    fn accept(&self, element: &mut IndexEntry<SearchKey>) -> Result<bool> {
        Ok(self.evaluator.evaluate(element)? != self.negated)
    }

    fn advance(&mut self, forward: bool) -> Result<bool> {
        self.current = None;
        loop {
            let moved = if forward { self.master.next()? } else { self.master.previous()? };
            if !moved {
                return Ok(false);
            }
            let mut element = self.master.get()?;
            if self.accept(&mut element)? {
                self.current = Some(element);
                return Ok(true);
            }
        }
    }
}

/// Full scans run in id order, so only id seeks have a position to land on.
fn refuse_value_seek(key: &SearchKey, operation: &str) -> Result<()> {
    match key {
        Some(_) => Err(Error::unsupported(&format!("FilteredCursor::{} by value", operation))),
        None => Ok(()),
    }
}

impl Cursor for FilteredCursor<'_> {
    type Key = SearchKey;

    fn before(&mut self, element: &IndexEntry<SearchKey>) -> Result<()> {
        check_open(self.closed, "before()")?;
        self.current = None;
        self.master.before(element)
    }

    fn after(&mut self, element: &IndexEntry<SearchKey>) -> Result<()> {
        check_open(self.closed, "after()")?;
        self.current = None;
        self.master.after(element)
    }

    fn before_value(&mut self, id: Option<EntryId>, key: &SearchKey) -> Result<()> {
        check_open(self.closed, "before_value()")?;
        refuse_value_seek(key, "before_value()")?;
        self.current = None;
        self.master.before_value(id, key)
    }

    fn after_value(&mut self, id: Option<EntryId>, key: &SearchKey) -> Result<()> {
        check_open(self.closed, "after_value()")?;
        refuse_value_seek(key, "after_value()")?;
        self.current = None;
        self.master.after_value(id, key)
    }

    fn before_first(&mut self) -> Result<()> {
        check_open(self.closed, "before_first()")?;
        self.current = None;
        self.master.before_first()
    }

    fn after_last(&mut self) -> Result<()> {
        check_open(self.closed, "after_last()")?;
        self.current = None;
        self.master.after_last()
    }

    fn next(&mut self) -> Result<bool> {
        check_open(self.closed, "next()")?;
        self.advance(true)
    }

    fn previous(&mut self) -> Result<bool> {
        check_open(self.closed, "previous()")?;
        self.advance(false)
    }

    fn get(&self) -> Result<IndexEntry<SearchKey>> {
        check_open(self.closed, "get()")?;
        self.current.clone().ok_or_else(|| Error::invalid_position("get()"))
    }

    fn available(&self) -> bool {
        !self.closed && self.current.is_some()
    }

    fn close(&mut self) {
        self.master.close();
        self.current = None;
        self.closed = true;
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}
