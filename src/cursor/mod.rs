pub mod single;

use crate::core::error::{Error, Result};
use crate::core::types::EntryId;
use crate::index::entry::IndexEntry;

pub use single::{EmptyCursor, SingletonCursor};

/// Bidirectional, position-aware cursor over `(key, id)` tuples.
///
/// A cursor sits before the first element, after the last one, on an
/// element, or is closed. Every operation on a closed cursor fails with
/// `Closed`; `get` fails with `InvalidPosition` unless `available()`.
pub trait Cursor {
    type Key: Clone;

    /// Positions just before `element` in the cursor's ordering.
    fn before(&mut self, element: &IndexEntry<Self::Key>) -> Result<()>;

    /// Positions just after `element` in the cursor's ordering.
    fn after(&mut self, element: &IndexEntry<Self::Key>) -> Result<()>;

    /// Positions before the first tuple with this key; `id` breaks ties.
    fn before_value(&mut self, id: Option<EntryId>, key: &Self::Key) -> Result<()>;

    /// Positions after the last tuple with this key; `id` breaks ties.
    fn after_value(&mut self, id: Option<EntryId>, key: &Self::Key) -> Result<()>;

    fn before_first(&mut self) -> Result<()>;

    fn after_last(&mut self) -> Result<()>;

    fn first(&mut self) -> Result<bool> {
        self.before_first()?;
        self.next()
    }

    fn last(&mut self) -> Result<bool> {
        self.after_last()?;
        self.previous()
    }

    fn next(&mut self) -> Result<bool>;

    fn previous(&mut self) -> Result<bool>;

    fn get(&self) -> Result<IndexEntry<Self::Key>>;

    fn available(&self) -> bool;

    fn close(&mut self);

    fn is_closed(&self) -> bool;
}

impl<C: Cursor + ?Sized> Cursor for Box<C> {
    type Key = C::Key;

    fn before(&mut self, element: &IndexEntry<Self::Key>) -> Result<()> {
        (**self).before(element)
    }

    fn after(&mut self, element: &IndexEntry<Self::Key>) -> Result<()> {
        (**self).after(element)
    }

    fn before_value(&mut self, id: Option<EntryId>, key: &Self::Key) -> Result<()> {
        (**self).before_value(id, key)
    }

    fn after_value(&mut self, id: Option<EntryId>, key: &Self::Key) -> Result<()> {
        (**self).after_value(id, key)
    }

    fn before_first(&mut self) -> Result<()> {
        (**self).before_first()
    }

    fn after_last(&mut self) -> Result<()> {
        (**self).after_last()
    }

    fn first(&mut self) -> Result<bool> {
        (**self).first()
    }

    fn last(&mut self) -> Result<bool> {
        (**self).last()
    }

    fn next(&mut self) -> Result<bool> {
        (**self).next()
    }

    fn previous(&mut self) -> Result<bool> {
        (**self).previous()
    }

    fn get(&self) -> Result<IndexEntry<Self::Key>> {
        (**self).get()
    }

    fn available(&self) -> bool {
        (**self).available()
    }

    fn close(&mut self) {
        (**self).close()
    }

    fn is_closed(&self) -> bool {
        (**self).is_closed()
    }
}

pub(crate) fn check_open(closed: bool, operation: &str) -> Result<()> {
    if closed {
        Err(Error::closed(operation))
    } else {
        Ok(())
    }
}

/// Ids in ascending cursor order, starting from before-first.
pub fn collect_ids<C: Cursor + ?Sized>(cursor: &mut C) -> Result<Vec<EntryId>> {
    cursor.before_first()?;
    let mut ids = Vec::new();
    while cursor.next()? {
        ids.push(cursor.get()?.id);
    }
    Ok(ids)
}

/// Ids in descending cursor order, starting from after-last.
pub fn collect_ids_reverse<C: Cursor + ?Sized>(cursor: &mut C) -> Result<Vec<EntryId>> {
    cursor.after_last()?;
    let mut ids = Vec::new();
    while cursor.previous()? {
        ids.push(cursor.get()?.id);
    }
    Ok(ids)
}
