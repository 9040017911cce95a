use crate::core::error::{Error, ErrorKind, Result};
use crate::core::partition::Partition;
use crate::core::types::{EntryId, Value};
use crate::cursor::{check_open, Cursor};
use crate::index::cursor::IndexCursor;
use crate::index::entry::IndexEntry;
use crate::query::ast::{AssertionFilter, Filter};
use crate::search::evaluator::Evaluator;
use crate::search::filtered::FilteredCursor;
use crate::search::SearchKey;

/// Exactly one source of candidates is active for an ordering cursor.
pub enum Backing<'a> {
    /// Ordered user index, walked in value order starting at the bound.
    Indexed(IndexCursor<Value>),
    /// Filtered full scan when the attribute has no ordered index.
    FullScan(FilteredCursor<'a>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    GreaterEq,
    LessEq,
}

/// Cursor for `attr>=value` or `attr<=value`, both bounds inclusive.
///
/// With an index, elements come in `(value, id)` order and each entry is
/// returned once, under the first of its values inside the range (for `>=`)
/// or its smallest value (for `<=`). Seeking below a `>=` bound lands before
/// the first element; seeking above a `<=` bound lands after the last one.
///
/// Without an index the cursor is a filtered scan in id order: it accepts
/// id seeks but refuses seeks by value.
pub struct RangeCursor<'a> {
    backing: Backing<'a>,
    side: Side,
    bound: Value,
    closed: bool,
}

impl<'a> RangeCursor<'a> {
    pub fn greater_eq(partition: &'a Partition, assertion: &AssertionFilter) -> Result<Self> {
        Self::new(partition, assertion, Side::GreaterEq)
    }

    pub fn less_eq(partition: &'a Partition, assertion: &AssertionFilter) -> Result<Self> {
        Self::new(partition, assertion, Side::LessEq)
    }

    fn new(partition: &'a Partition, assertion: &AssertionFilter, side: Side) -> Result<Self> {
        if !partition.schema().has_ordering(&assertion.attribute) {
            return Err(Error::new(
                ErrorKind::NoSuchIndex,
                format!("Attribute '{}' has no ordering rule for range matching", assertion.attribute),
            ));
        }

        let backing = match partition
            .find_user_index(&assertion.attribute)
            .filter(|index| index.is_ordered())
        {
            Some(index) => {
                let mut cursor = index.range_cursor()?;
                Self::start(&mut cursor, side, &assertion.value)?;
                Backing::Indexed(cursor)
            }
            None => {
                let filter = match side {
                    Side::GreaterEq => Filter::GreaterEq(assertion.clone()),
                    Side::LessEq => Filter::LessEq(assertion.clone()),
                };
                let evaluator = Evaluator::new(partition, &filter)?;
                Backing::FullScan(FilteredCursor::new(partition.master_cursor(), evaluator))
            }
        };

        Ok(RangeCursor {
            backing,
            side,
            bound: assertion.value.clone(),
            closed: false,
        })
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn is_indexed(&self) -> bool {
        matches!(self.backing, Backing::Indexed(_))
    }

    fn within(&self, key: &Value) -> bool {
        match self.side {
            Side::GreaterEq => *key >= self.bound,
            Side::LessEq => *key <= self.bound,
        }
    }

    /// Before the first in-range tuple.
    fn start(cursor: &mut IndexCursor<Value>, side: Side, bound: &Value) -> Result<()> {
        match side {
            Side::GreaterEq => cursor.before_value(None, bound),
            Side::LessEq => cursor.before_first(),
        }
    }

    /// After the last in-range tuple.
    fn end(cursor: &mut IndexCursor<Value>, side: Side, bound: &Value) -> Result<()> {
        match side {
            Side::GreaterEq => cursor.after_last(),
            Side::LessEq => cursor.after_value(None, bound),
        }
    }

    /// True when `key` is the value `id` is reported under.
    fn canonical(cursor: &IndexCursor<Value>, side: Side, bound: &Value, key: &Value, id: EntryId) -> bool {
        let Some(keys) = cursor.tables().reverse.get(&id) else {
            return false;
        };
        let first = match side {
            Side::GreaterEq => keys.range(bound..).next(),
            Side::LessEq => keys.first(),
        };
        first == Some(key)
    }

    /// Moves the indexed cursor one step, leaving the range resets it to the
    /// nearest edge.
    fn step(&mut self, forward: bool) -> Result<bool> {
        let side = self.side;
        let Backing::Indexed(cursor) = &mut self.backing else {
            return Err(Error::unsupported("step() on a full scan"));
        };
        loop {
            let moved = if forward { cursor.next()? } else { cursor.previous()? };
            if !moved {
                return Ok(false);
            }
            let element = cursor.get()?;
            let inside = match side {
                Side::GreaterEq => element.key >= self.bound,
                Side::LessEq => element.key <= self.bound,
            };
            if !inside {
                // outside on the near side: the range lies ahead
                if matches!((side, forward), (Side::GreaterEq, true) | (Side::LessEq, false)) {
                    if forward {
                        Self::start(cursor, side, &self.bound)?;
                    } else {
                        Self::end(cursor, side, &self.bound)?;
                    }
                    continue;
                }
                if forward {
                    Self::end(cursor, side, &self.bound)?;
                } else {
                    Self::start(cursor, side, &self.bound)?;
                }
                return Ok(false);
            }
            if Self::canonical(cursor, side, &self.bound, &element.key, element.id) {
                return Ok(true);
            }
        }
    }

    /// Moves to the near edge when `key` is out of range; before or after
    /// makes no difference there.
    fn outside(&mut self, key: &Value) -> Result<bool> {
        if self.within(key) {
            return Ok(false);
        }
        let side = self.side;
        if let Backing::Indexed(cursor) = &mut self.backing {
            match side {
                Side::GreaterEq => Self::start(cursor, side, &self.bound)?,
                Side::LessEq => Self::end(cursor, side, &self.bound)?,
            }
        }
        Ok(true)
    }

    fn indexed_key(key: &SearchKey, operation: &str) -> Result<Value> {
        key.clone().ok_or_else(|| {
            Error::new(
                ErrorKind::InvalidInput,
                format!("{}: value-ordered cursor needs a value to seek to", operation),
            )
        })
    }
}

impl Cursor for RangeCursor<'_> {
    type Key = SearchKey;

    fn before(&mut self, element: &IndexEntry<SearchKey>) -> Result<()> {
        check_open(self.closed, "before()")?;
        if let Backing::FullScan(scan) = &mut self.backing {
            return scan.before(element);
        }
        let key = Self::indexed_key(&element.key, "before()")?;
        if self.outside(&key)? {
            return Ok(());
        }
        if let Backing::Indexed(cursor) = &mut self.backing {
            cursor.before(&IndexEntry::new(key, element.id))?;
        }
        Ok(())
    }

    fn after(&mut self, element: &IndexEntry<SearchKey>) -> Result<()> {
        check_open(self.closed, "after()")?;
        if let Backing::FullScan(scan) = &mut self.backing {
            return scan.after(element);
        }
        let key = Self::indexed_key(&element.key, "after()")?;
        if self.outside(&key)? {
            return Ok(());
        }
        if let Backing::Indexed(cursor) = &mut self.backing {
            cursor.after(&IndexEntry::new(key, element.id))?;
        }
        Ok(())
    }

    fn before_value(&mut self, id: Option<EntryId>, key: &SearchKey) -> Result<()> {
        check_open(self.closed, "before_value()")?;
        if let Backing::FullScan(scan) = &mut self.backing {
            return scan.before_value(id, key);
        }
        let key = Self::indexed_key(key, "before_value()")?;
        if self.outside(&key)? {
            return Ok(());
        }
        if let Backing::Indexed(cursor) = &mut self.backing {
            cursor.before_value(id, &key)?;
        }
        Ok(())
    }

    fn after_value(&mut self, id: Option<EntryId>, key: &SearchKey) -> Result<()> {
        check_open(self.closed, "after_value()")?;
        if let Backing::FullScan(scan) = &mut self.backing {
            return scan.after_value(id, key);
        }
        let key = Self::indexed_key(key, "after_value()")?;
        if self.outside(&key)? {
            return Ok(());
        }
        if let Backing::Indexed(cursor) = &mut self.backing {
            cursor.after_value(id, &key)?;
        }
        Ok(())
    }

    fn before_first(&mut self) -> Result<()> {
        check_open(self.closed, "before_first()")?;
        match &mut self.backing {
            Backing::Indexed(cursor) => Self::start(cursor, self.side, &self.bound),
            Backing::FullScan(scan) => scan.before_first(),
        }
    }

    fn after_last(&mut self) -> Result<()> {
        check_open(self.closed, "after_last()")?;
        match &mut self.backing {
            Backing::Indexed(cursor) => Self::end(cursor, self.side, &self.bound),
            Backing::FullScan(scan) => scan.after_last(),
        }
    }

    fn next(&mut self) -> Result<bool> {
        check_open(self.closed, "next()")?;
        match self.backing {
            Backing::Indexed(_) => self.step(true),
            Backing::FullScan(ref mut scan) => scan.next(),
        }
    }

    fn previous(&mut self) -> Result<bool> {
        check_open(self.closed, "previous()")?;
        match self.backing {
            Backing::Indexed(_) => self.step(false),
            Backing::FullScan(ref mut scan) => scan.previous(),
        }
    }

    fn get(&self) -> Result<IndexEntry<SearchKey>> {
        check_open(self.closed, "get()")?;
        match &self.backing {
            Backing::Indexed(cursor) => Ok(cursor.get()?.map_key(Some)),
            Backing::FullScan(scan) => scan.get(),
        }
    }

    fn available(&self) -> bool {
        !self.closed
            && match &self.backing {
                Backing::Indexed(cursor) => cursor.available(),
                Backing::FullScan(scan) => scan.available(),
            }
    }

    fn close(&mut self) {
        match &mut self.backing {
            Backing::Indexed(cursor) => cursor.close(),
            Backing::FullScan(scan) => scan.close(),
        }
        self.closed = true;
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::PartitionConfig;
    use crate::core::types::{AttributeId, Dn, Entry};
    use crate::cursor::{collect_ids, collect_ids_reverse};
    use crate::schema::schema::Syntax;

    fn partition(indexed: bool) -> (Partition, Vec<EntryId>) {
        let mut config = PartitionConfig::new("o=test").with_attribute_type("uidNumber", Syntax::Integer, true);
        if indexed {
            config = config.with_index("uidNumber");
        }
        let p = Partition::new(config).unwrap();
        p.add(Entry::new(Dn::parse("o=test").unwrap())).unwrap();
        let ids = [1i64, 3, 5, 7]
            .iter()
            .map(|n| {
                p.add(Entry::new(Dn::parse(&format!("cn=u{},o=test", n)).unwrap()).with_attribute("uidNumber", [*n]))
                    .unwrap()
            })
            .collect();
        (p, ids)
    }

    fn assertion(value: i64) -> AssertionFilter {
        AssertionFilter {
            attribute: AttributeId::new("uidNumber"),
            value: Value::from(value),
            count: None,
        }
    }

    #[test]
    fn greater_eq_respects_bound() {
        let (p, ids) = partition(true);
        let mut cursor = RangeCursor::greater_eq(&p, &assertion(4)).unwrap();
        assert!(cursor.is_indexed());
        assert_eq!(collect_ids(&mut cursor).unwrap(), vec![ids[2], ids[3]]);
        assert_eq!(collect_ids_reverse(&mut cursor).unwrap(), vec![ids[3], ids[2]]);

        // walking back past the bound resets to before-first
        cursor.before_first().unwrap();
        assert!(cursor.next().unwrap());
        assert!(!cursor.previous().unwrap());
        assert!(cursor.next().unwrap());
        assert_eq!(cursor.get().unwrap().key, Some(Value::from(5i64)));
    }

    #[test]
    fn seek_below_bound_is_before_first() {
        let (p, ids) = partition(true);
        let mut cursor = RangeCursor::greater_eq(&p, &assertion(4)).unwrap();
        cursor.before_value(None, &Some(Value::from(2i64))).unwrap();
        assert!(cursor.next().unwrap());
        assert_eq!(cursor.get().unwrap().id, ids[2]);

        cursor.after_value(None, &Some(Value::from(2i64))).unwrap();
        assert!(!cursor.previous().unwrap());

        cursor.after_value(None, &Some(Value::from(5i64))).unwrap();
        assert!(cursor.next().unwrap());
        assert_eq!(cursor.get().unwrap().id, ids[3]);
    }

    #[test]
    fn less_eq_respects_bound() {
        let (p, ids) = partition(true);
        let mut cursor = RangeCursor::less_eq(&p, &assertion(4)).unwrap();
        assert_eq!(collect_ids(&mut cursor).unwrap(), vec![ids[0], ids[1]]);
        assert_eq!(collect_ids_reverse(&mut cursor).unwrap(), vec![ids[1], ids[0]]);

        cursor.before_value(None, &Some(Value::from(6i64))).unwrap();
        assert!(!cursor.next().unwrap());
    }

    #[test]
    fn multi_valued_entries_appear_once() {
        let (p, ids) = partition(true);
        p.modify(ids[0], &[crate::core::types::Modification::add("uidNumber", [8i64, 9])])
            .unwrap();
        let mut ge = RangeCursor::greater_eq(&p, &assertion(4)).unwrap();
        assert_eq!(collect_ids(&mut ge).unwrap(), vec![ids[2], ids[3], ids[0]]);
        let mut le = RangeCursor::less_eq(&p, &assertion(8)).unwrap();
        assert_eq!(collect_ids(&mut le).unwrap(), vec![ids[0], ids[1], ids[2], ids[3]]);
    }

    #[test]
    fn fresh_cursors_start_inside_the_range() {
        let (p, ids) = partition(true);
        let mut ge = RangeCursor::greater_eq(&p, &assertion(4)).unwrap();
        assert!(ge.next().unwrap());
        assert_eq!(ge.get().unwrap().id, ids[2]);
        assert!(ge.next().unwrap());
        assert_eq!(ge.get().unwrap().id, ids[3]);
        assert!(!ge.next().unwrap());

        let mut le = RangeCursor::less_eq(&p, &assertion(4)).unwrap();
        assert!(le.next().unwrap());
        assert_eq!(le.get().unwrap().id, ids[0]);
        assert!(le.next().unwrap());
        assert_eq!(le.get().unwrap().id, ids[1]);
        assert!(!le.next().unwrap());

        // walking backwards from after-last enters the range from above
        let mut le = RangeCursor::less_eq(&p, &assertion(4)).unwrap();
        le.after_last().unwrap();
        assert!(le.previous().unwrap());
        assert_eq!(le.get().unwrap().id, ids[1]);
    }

    #[test]
    fn falls_back_to_full_scan() {
        let (p, ids) = partition(false);
        let mut cursor = RangeCursor::greater_eq(&p, &assertion(4)).unwrap();
        assert!(!cursor.is_indexed());
        assert!(cursor.next().unwrap());
        assert_eq!(cursor.get().unwrap().id, ids[2]);
        assert_eq!(collect_ids(&mut cursor).unwrap(), vec![ids[2], ids[3]]);

        // the scan runs in id order: id seeks work, value seeks do not
        cursor.after_value(Some(ids[2]), &None).unwrap();
        assert!(cursor.next().unwrap());
        assert_eq!(cursor.get().unwrap().id, ids[3]);
        let err = cursor.after_value(None, &Some(Value::from(5i64))).unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnsupportedOperation);
    }

    #[test]
    fn unordered_attribute_is_refused() {
        let p = Partition::new(
            PartitionConfig::new("o=test").with_attribute_type("description", Syntax::CaseExactString, false),
        )
        .unwrap();
        let filter = AssertionFilter {
            attribute: AttributeId::new("description"),
            value: Value::from("x"),
            count: None,
        };
        assert_eq!(
            RangeCursor::greater_eq(&p, &filter).err().map(|e| e.kind),
            Some(ErrorKind::NoSuchIndex)
        );
    }
}
