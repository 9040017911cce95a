use std::marker::PhantomData;
use crate::core::error::{Error, Result};
use crate::core::types::EntryId;
use crate::cursor::{check_open, Cursor};
use crate::index::entry::IndexEntry;

/// Cursor over nothing.
pub struct EmptyCursor<K> {
    closed: bool,
    _key: PhantomData<K>,
}

impl<K> EmptyCursor<K> {
    pub fn new() -> Self {
        EmptyCursor { closed: false, _key: PhantomData }
    }
}

impl<K> Default for EmptyCursor<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Clone> Cursor for EmptyCursor<K> {
    type Key = K;

    fn before(&mut self, _element: &IndexEntry<K>) -> Result<()> {
        check_open(self.closed, "before()")
    }

    fn after(&mut self, _element: &IndexEntry<K>) -> Result<()> {
        check_open(self.closed, "after()")
    }

    fn before_value(&mut self, _id: Option<EntryId>, _key: &K) -> Result<()> {
        check_open(self.closed, "before_value()")
    }

    fn after_value(&mut self, _id: Option<EntryId>, _key: &K) -> Result<()> {
        check_open(self.closed, "after_value()")
    }

    fn before_first(&mut self) -> Result<()> {
        check_open(self.closed, "before_first()")
    }

    fn after_last(&mut self) -> Result<()> {
        check_open(self.closed, "after_last()")
    }

    fn next(&mut self) -> Result<bool> {
        check_open(self.closed, "next()")?;
        Ok(false)
    }

    fn previous(&mut self) -> Result<bool> {
        check_open(self.closed, "previous()")?;
        Ok(false)
    }

    fn get(&self) -> Result<IndexEntry<K>> {
        check_open(self.closed, "get()")?;
        Err(Error::invalid_position("get()"))
    }

    fn available(&self) -> bool {
        false
    }

    fn close(&mut self) {
        self.closed = true;
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SinglePosition {
    BeforeFirst,
    On,
    AfterLast,
}

/// Cursor over exactly one element; seeks compare by id.
pub struct SingletonCursor<K> {
    element: IndexEntry<K>,
    position: SinglePosition,
    closed: bool,
}

impl<K: Clone> SingletonCursor<K> {
    pub fn new(element: IndexEntry<K>) -> Self {
        SingletonCursor {
            element,
            position: SinglePosition::BeforeFirst,
            closed: false,
        }
    }

    fn seek_before(&mut self, id: EntryId) {
        self.position = if id > self.element.id {
            SinglePosition::AfterLast
        } else {
            SinglePosition::BeforeFirst
        };
    }

    fn seek_after(&mut self, id: EntryId) {
        self.position = if id < self.element.id {
            SinglePosition::BeforeFirst
        } else {
            SinglePosition::AfterLast
        };
    }
}

impl<K: Clone> Cursor for SingletonCursor<K> {
    type Key = K;

    fn before(&mut self, element: &IndexEntry<K>) -> Result<()> {
        check_open(self.closed, "before()")?;
        self.seek_before(element.id);
        Ok(())
    }

    fn after(&mut self, element: &IndexEntry<K>) -> Result<()> {
        check_open(self.closed, "after()")?;
        self.seek_after(element.id);
        Ok(())
    }

    fn before_value(&mut self, id: Option<EntryId>, _key: &K) -> Result<()> {
        check_open(self.closed, "before_value()")?;
        self.seek_before(id.unwrap_or(EntryId::MIN));
        Ok(())
    }

    fn after_value(&mut self, id: Option<EntryId>, _key: &K) -> Result<()> {
        check_open(self.closed, "after_value()")?;
        self.seek_after(id.unwrap_or(EntryId::MAX));
        Ok(())
    }

    fn before_first(&mut self) -> Result<()> {
        check_open(self.closed, "before_first()")?;
        self.position = SinglePosition::BeforeFirst;
        Ok(())
    }

    fn after_last(&mut self) -> Result<()> {
        check_open(self.closed, "after_last()")?;
        self.position = SinglePosition::AfterLast;
        Ok(())
    }

    fn next(&mut self) -> Result<bool> {
        check_open(self.closed, "next()")?;
        if self.position == SinglePosition::BeforeFirst {
            self.position = SinglePosition::On;
            Ok(true)
        } else {
            self.position = SinglePosition::AfterLast;
            Ok(false)
        }
    }

    fn previous(&mut self) -> Result<bool> {
        check_open(self.closed, "previous()")?;
        if self.position == SinglePosition::AfterLast {
            self.position = SinglePosition::On;
            Ok(true)
        } else {
            self.position = SinglePosition::BeforeFirst;
            Ok(false)
        }
    }

    fn get(&self) -> Result<IndexEntry<K>> {
        check_open(self.closed, "get()")?;
        if self.position == SinglePosition::On {
            Ok(self.element.clone())
        } else {
            Err(Error::invalid_position("get()"))
        }
    }

    fn available(&self) -> bool {
        !self.closed && self.position == SinglePosition::On
    }

    fn close(&mut self) {
        self.closed = true;
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}
