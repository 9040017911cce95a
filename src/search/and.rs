use crate::core::error::{Error, Result};
use crate::core::types::EntryId;
use crate::cursor::{check_open, Cursor};
use crate::index::entry::IndexEntry;
use crate::search::evaluator::Evaluator;
use crate::search::{SearchCursor, SearchKey};

/// Intersection: walks the driver (the cheapest child) and keeps the
/// candidates every other child's evaluator accepts. Results come in the
/// driver's order, in both directions.
pub struct AndCursor<'a> {
    driver: SearchCursor<'a>,
    others: Vec<Evaluator<'a>>,
    current: Option<IndexEntry<SearchKey>>,
    closed: bool,
}

impl<'a> AndCursor<'a> {
    /// `others` should come cheapest first so rejections happen early.
    pub fn new(driver: SearchCursor<'a>, others: Vec<Evaluator<'a>>) -> Self {
        AndCursor {
            driver,
            others,
            current: None,
            closed: false,
        }
    }

    fn matches(&self, candidate: &mut IndexEntry<SearchKey>) -> Result<bool> {
        for evaluator in &self.others {
            if !evaluator.evaluate(candidate)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn advance(&mut self, forward: bool) -> Result<bool> {
        self.current = None;
        loop {
            let moved = if forward { self.driver.next()? } else { self.driver.previous()? };
            if !moved {
                return Ok(false);
            }
            let mut candidate = self.driver.get()?;
            if self.matches(&mut candidate)? {
                self.current = Some(candidate);
                return Ok(true);
            }
        }
    }
}

impl Cursor for AndCursor<'_> {
    type Key = SearchKey;

    fn before(&mut self, _element: &IndexEntry<SearchKey>) -> Result<()> {
        check_open(self.closed, "before()")?;
        Err(Error::unsupported("AndCursor::before()"))
    }

    fn after(&mut self, _element: &IndexEntry<SearchKey>) -> Result<()> {
        check_open(self.closed, "after()")?;
        Err(Error::unsupported("AndCursor::after()"))
    }

    fn before_value(&mut self, _id: Option<EntryId>, _key: &SearchKey) -> Result<()> {
        check_open(self.closed, "before_value()")?;
        Err(Error::unsupported("AndCursor::before_value()"))
    }

    fn after_value(&mut self, _id: Option<EntryId>, _key: &SearchKey) -> Result<()> {
        check_open(self.closed, "after_value()")?;
        Err(Error::unsupported("AndCursor::after_value()"))
    }

    fn before_first(&mut self) -> Result<()> {
        check_open(self.closed, "before_first()")?;
        self.current = None;
        self.driver.before_first()
    }

    fn after_last(&mut self) -> Result<()> {
        check_open(self.closed, "after_last()")?;
        self.current = None;
        self.driver.after_last()
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
        self.driver.close();
        self.current = None;
        self.closed = true;
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}
