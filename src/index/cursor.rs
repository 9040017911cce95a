use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Debug;
use std::ops::Bound::{Excluded, Included, Unbounded};
use std::sync::Arc;
use crate::core::error::{Error, Result};
use crate::core::types::EntryId;
use crate::cursor::{check_open, Cursor};
use crate::index::entry::IndexEntry;
use crate::index::index::IndexTables;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward, // ordered by (key, id)
    Reverse, // ordered by (id, key)
}

#[derive(Debug, Clone, Copy)]
enum Seek {
    Ge,
    Gt,
    Lt,
    Le,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Position<K> {
    BeforeFirst,
    AfterLast,
    On(K, EntryId),
    // Gaps left behind by seeks; the tuple need not exist
    Before(K, EntryId),
    After(K, EntryId),
}

/// Cursor over one index snapshot, in forward or reverse tuple order.
#[derive(Debug)]
pub struct IndexCursor<K> {
    tables: Arc<IndexTables<K>>,
    direction: Direction,
    position: Position<K>,
    closed: bool,
}

impl<K: Ord + Clone + Debug> IndexCursor<K> {
    pub fn forward(tables: Arc<IndexTables<K>>) -> Self {
        Self::new(tables, Direction::Forward)
    }

    pub fn reverse(tables: Arc<IndexTables<K>>) -> Self {
        Self::new(tables, Direction::Reverse)
    }

    fn new(tables: Arc<IndexTables<K>>, direction: Direction) -> Self {
        IndexCursor {
            tables,
            direction,
            position: Position::BeforeFirst,
            closed: false,
        }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// The snapshot this cursor walks.
    pub fn tables(&self) -> &Arc<IndexTables<K>> {
        &self.tables
    }

    fn seek(&self, seek: Seek, key: &K, id: EntryId) -> Option<(K, EntryId)> {
        match self.direction {
            Direction::Forward => seek_tuple(&self.tables.forward, seek, key, &id),
            Direction::Reverse => {
                seek_tuple(&self.tables.reverse, seek, &id, key).map(|(id, key)| (key, id))
            }
        }
    }

    fn first_tuple(&self) -> Option<(K, EntryId)> {
        match self.direction {
            Direction::Forward => edge_tuple(self.tables.forward.iter(), BTreeSet::first),
            Direction::Reverse => edge_tuple(self.tables.reverse.iter(), BTreeSet::first)
                .map(|(id, key)| (key, id)),
        }
    }

    fn last_tuple(&self) -> Option<(K, EntryId)> {
        match self.direction {
            Direction::Forward => edge_tuple(self.tables.forward.iter().rev(), BTreeSet::last),
            Direction::Reverse => edge_tuple(self.tables.reverse.iter().rev(), BTreeSet::last)
                .map(|(id, key)| (key, id)),
        }
    }

    fn land(&mut self, found: Option<(K, EntryId)>, otherwise: Position<K>) -> bool {
        match found {
            Some((key, id)) => {
                self.position = Position::On(key, id);
                true
            }
            None => {
                self.position = otherwise;
                false
            }
        }
    }
}

/// First (or last) tuple of the first non-empty set walked by `iter`.
fn edge_tuple<'a, A, B, I>(mut iter: I, pick: fn(&BTreeSet<B>) -> Option<&B>) -> Option<(A, B)>
where
    A: Clone + 'a,
    B: Clone + 'a,
    I: Iterator<Item = (&'a A, &'a BTreeSet<B>)>,
{
    iter.find_map(|(a, set)| pick(set).map(|b| (a.clone(), b.clone())))
}

/// Neighbour of `(a, b)` in a two-level ordered map.
fn seek_tuple<A, B>(map: &BTreeMap<A, BTreeSet<B>>, seek: Seek, a: &A, b: &B) -> Option<(A, B)>
where
    A: Ord + Clone,
    B: Ord + Clone,
{
    match seek {
        Seek::Ge | Seek::Gt => {
            if let Some(set) = map.get(a) {
                let lower = match seek {
                    Seek::Ge => Included(b),
                    _ => Excluded(b),
                };
                if let Some(found) = set.range((lower, Unbounded)).next() {
                    return Some((a.clone(), found.clone()));
                }
            }
            edge_tuple(map.range((Excluded(a), Unbounded)), BTreeSet::first)
        }
        Seek::Lt | Seek::Le => {
            if let Some(set) = map.get(a) {
                let upper = match seek {
                    Seek::Le => Included(b),
                    _ => Excluded(b),
                };
                if let Some(found) = set.range((Unbounded, upper)).next_back() {
                    return Some((a.clone(), found.clone()));
                }
            }
            edge_tuple(map.range((Unbounded, Excluded(a))).rev(), BTreeSet::last)
        }
    }
}

impl<K: Ord + Clone + Debug> Cursor for IndexCursor<K> {
    type Key = K;

    fn before(&mut self, element: &IndexEntry<K>) -> Result<()> {
        check_open(self.closed, "before()")?;
        self.position = Position::Before(element.key.clone(), element.id);
        Ok(())
    }

    fn after(&mut self, element: &IndexEntry<K>) -> Result<()> {
        check_open(self.closed, "after()")?;
        self.position = Position::After(element.key.clone(), element.id);
        Ok(())
    }

    fn before_value(&mut self, id: Option<EntryId>, key: &K) -> Result<()> {
        check_open(self.closed, "before_value()")?;
        self.position = match self.direction {
            Direction::Forward => Position::Before(key.clone(), id.unwrap_or(EntryId::MIN)),
            // Reverse order leads with the id, so a missing id means "before everything"
            Direction::Reverse => match id {
                Some(id) => Position::Before(key.clone(), id),
                None => Position::BeforeFirst,
            },
        };
        Ok(())
    }

    fn after_value(&mut self, id: Option<EntryId>, key: &K) -> Result<()> {
        check_open(self.closed, "after_value()")?;
        self.position = match self.direction {
            Direction::Forward => Position::After(key.clone(), id.unwrap_or(EntryId::MAX)),
            Direction::Reverse => match id {
                Some(id) => Position::After(key.clone(), id),
                None => Position::AfterLast,
            },
        };
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
        let found = match &self.position {
            Position::BeforeFirst => self.first_tuple(),
            Position::AfterLast => None,
            Position::On(key, id) | Position::After(key, id) => self.seek(Seek::Gt, key, *id),
            Position::Before(key, id) => self.seek(Seek::Ge, key, *id),
        };
        Ok(self.land(found, Position::AfterLast))
    }

    fn previous(&mut self) -> Result<bool> {
        check_open(self.closed, "previous()")?;
        let found = match &self.position {
            Position::AfterLast => self.last_tuple(),
            Position::BeforeFirst => None,
            Position::On(key, id) | Position::Before(key, id) => self.seek(Seek::Lt, key, *id),
            Position::After(key, id) => self.seek(Seek::Le, key, *id),
        };
        Ok(self.land(found, Position::BeforeFirst))
    }

    fn get(&self) -> Result<IndexEntry<K>> {
        check_open(self.closed, "get()")?;
        match &self.position {
            Position::On(key, id) => Ok(IndexEntry::new(key.clone(), *id)),
            _ => Err(Error::invalid_position("get()")),
        }
    }

    fn available(&self) -> bool {
        !self.closed && matches!(self.position, Position::On(..))
    }

    fn close(&mut self) {
        self.closed = true;
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;
    use crate::core::types::Value;
    use crate::cursor::{collect_ids, collect_ids_reverse};
    use crate::index::index::Index;

    fn index() -> Index<Value> {
        let index = Index::new("age", true);
        for (v, n) in [(1, 10), (3, 20), (5, 30), (5, 35), (7, 40)] {
            index.add(Value::Integer(v), EntryId(n)).unwrap();
        }
        index
    }

    fn ids(ns: &[u64]) -> Vec<EntryId> {
        ns.iter().map(|n| EntryId(*n)).collect()
    }

    #[test]
    fn forward_order_is_key_then_id() {
        let mut cursor = index().forward_cursor();
        assert_eq!(collect_ids(&mut cursor).unwrap(), ids(&[10, 20, 30, 35, 40]));
        assert_eq!(collect_ids_reverse(&mut cursor).unwrap(), ids(&[40, 35, 30, 20, 10]));
    }

    #[test]
    fn reverse_order_is_id_then_key() {
        let index = index();
        index.add(Value::Integer(0), EntryId(40)).unwrap();
        let mut cursor = index.reverse_cursor();
        let mut seen = Vec::new();
        while cursor.next().unwrap() {
            let e = cursor.get().unwrap();
            seen.push((e.id.0, e.key));
        }
        assert_eq!(seen[4], (40, Value::Integer(0)));
        assert_eq!(seen[5], (40, Value::Integer(7)));
    }

    #[test]
    fn before_value_lands_on_first_match_or_successor() {
        let mut cursor = index().forward_cursor();
        cursor.before_value(None, &Value::Integer(5)).unwrap();
        assert!(!cursor.available());
        assert!(cursor.next().unwrap());
        assert_eq!(cursor.get().unwrap().id, EntryId(30));

        cursor.before_value(None, &Value::Integer(4)).unwrap();
        assert!(cursor.next().unwrap());
        assert_eq!(cursor.get().unwrap().key, Value::Integer(5));

        cursor.before_value(None, &Value::Integer(4)).unwrap();
        assert!(cursor.previous().unwrap());
        assert_eq!(cursor.get().unwrap().key, Value::Integer(3));
    }

    #[test]
    fn after_value_skips_every_tuple_of_the_key() {
        let mut cursor = index().forward_cursor();
        cursor.after_value(None, &Value::Integer(5)).unwrap();
        assert!(cursor.next().unwrap());
        assert_eq!(cursor.get().unwrap().id, EntryId(40));

        cursor.after_value(None, &Value::Integer(5)).unwrap();
        assert!(cursor.previous().unwrap());
        assert_eq!(cursor.get().unwrap().id, EntryId(35));
    }

    #[test]
    fn id_breaks_ties_within_a_key() {
        let mut cursor = index().forward_cursor();
        cursor.before(&IndexEntry::new(Value::Integer(5), EntryId(35))).unwrap();
        assert!(cursor.next().unwrap());
        assert_eq!(cursor.get().unwrap().id, EntryId(35));

        cursor.after(&IndexEntry::new(Value::Integer(5), EntryId(30))).unwrap();
        assert!(cursor.next().unwrap());
        assert_eq!(cursor.get().unwrap().id, EntryId(35));
    }

    #[test]
    fn runs_off_both_ends() {
        let mut cursor = index().forward_cursor();
        assert!(cursor.last().unwrap());
        assert!(!cursor.next().unwrap());
        assert!(!cursor.available());
        assert!(cursor.previous().unwrap());
        assert_eq!(cursor.get().unwrap().id, EntryId(40));

        assert!(cursor.first().unwrap());
        assert!(!cursor.previous().unwrap());
        assert_eq!(cursor.get().unwrap_err().kind, ErrorKind::InvalidPosition);
    }

    #[test]
    fn snapshot_survives_later_writes() {
        let index = index();
        let mut cursor = index.forward_cursor();
        index.add(Value::Integer(2), EntryId(15)).unwrap();
        index.drop(&Value::Integer(7), EntryId(40)).unwrap();
        assert_eq!(collect_ids(&mut cursor).unwrap(), ids(&[10, 20, 30, 35, 40]));

        let mut fresh = index.forward_cursor();
        assert_eq!(collect_ids(&mut fresh).unwrap(), ids(&[10, 15, 20, 30, 35]));
    }

    #[test]
    fn closed_cursor_fails() {
        let mut cursor = index().forward_cursor();
        cursor.close();
        assert!(cursor.is_closed());
        assert_eq!(cursor.next().unwrap_err().kind, ErrorKind::Closed);
        assert_eq!(cursor.get().unwrap_err().kind, ErrorKind::Closed);
        assert!(!cursor.available());
    }
}
