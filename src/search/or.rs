use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::EntryId;
use crate::cursor::{check_open, Cursor};
use crate::index::entry::IndexEntry;
use crate::search::evaluator::Evaluator;
use crate::search::{SearchCursor, SearchKey};

/// Union: walks the children one after another.
///
/// An id belongs to the first child that matches it, so a candidate from
/// child `i` is skipped when any child before `i` also accepts it. Every
/// distinct id comes out exactly once, in both directions.
pub struct OrCursor<'a> {
    cursors: Vec<SearchCursor<'a>>,
    evaluators: Vec<Evaluator<'a>>,
    index: usize,
    current: Option<IndexEntry<SearchKey>>,
    closed: bool,
}

impl<'a> OrCursor<'a> {
    /// `cursors[i]` and `evaluators[i]` describe the same child.
    pub fn new(cursors: Vec<SearchCursor<'a>>, evaluators: Vec<Evaluator<'a>>) -> Result<Self> {
        if cursors.len() != evaluators.len() {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                format!("{} OR cursors for {} evaluators", cursors.len(), evaluators.len()),
            ));
        }
        Ok(OrCursor {
            cursors,
            evaluators,
            index: 0,
            current: None,
            closed: false,
        })
    }

    /// True when a child before `index` already covers the candidate.
    fn seen_earlier(&self, index: usize, candidate: &mut IndexEntry<SearchKey>) -> Result<bool> {
        for evaluator in &self.evaluators[..index] {
            if evaluator.evaluate(candidate)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn advance(&mut self, forward: bool) -> Result<bool> {
        self.current = None;
        if self.cursors.is_empty() {
            return Ok(false);
        }
        loop {
            let cursor = &mut self.cursors[self.index];
            let moved = if forward { cursor.next()? } else { cursor.previous()? };
            if moved {
                let mut candidate = cursor.get()?;
                if !self.seen_earlier(self.index, &mut candidate)? {
                    self.current = Some(candidate);
                    return Ok(true);
                }
                continue;
            }

            if forward && self.index + 1 < self.cursors.len() {
                self.index += 1;
                self.cursors[self.index].before_first()?;
            } else if !forward && self.index > 0 {
                self.index -= 1;
                self.cursors[self.index].after_last()?;
            } else {
                return Ok(false);
            }
        }
    }
}

impl Cursor for OrCursor<'_> {
    type Key = SearchKey;

    fn before(&mut self, _element: &IndexEntry<SearchKey>) -> Result<()> {
        check_open(self.closed, "before()")?;
        Err(Error::unsupported("OrCursor::before()"))
    }

    fn after(&mut self, _element: &IndexEntry<SearchKey>) -> Result<()> {
        check_open(self.closed, "after()")?;
        Err(Error::unsupported("OrCursor::after()"))
    }

    fn before_value(&mut self, _id: Option<EntryId>, _key: &SearchKey) -> Result<()> {
        check_open(self.closed, "before_value()")?;
        Err(Error::unsupported("OrCursor::before_value()"))
    }

    fn after_value(&mut self, _id: Option<EntryId>, _key: &SearchKey) -> Result<()> {
        check_open(self.closed, "after_value()")?;
        Err(Error::unsupported("OrCursor::after_value()"))
    }

    fn before_first(&mut self) -> Result<()> {
        check_open(self.closed, "before_first()")?;
        self.current = None;
        self.index = 0;
        if let Some(first) = self.cursors.first_mut() {
            first.before_first()?;
        }
        Ok(())
    }

    fn after_last(&mut self) -> Result<()> {
        check_open(self.closed, "after_last()")?;
        self.current = None;
        self.index = self.cursors.len().saturating_sub(1);
        if let Some(last) = self.cursors.last_mut() {
            last.after_last()?;
        }
        Ok(())
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
        for cursor in &mut self.cursors {
            cursor.close();
        }
        self.current = None;
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
    use crate::core::partition::Partition;
    use crate::core::types::{Dn, Entry};
    use crate::cursor::{collect_ids, collect_ids_reverse};
    use crate::query::ast::Filter;
    use crate::search::filtered::FilteredCursor;

    fn child<'a>(p: &'a Partition, filter: &Filter) -> (SearchCursor<'a>, Evaluator<'a>) {
        let cursor: SearchCursor<'a> =
            Box::new(FilteredCursor::new(p.master_cursor(), Evaluator::new(p, filter).unwrap()));
        (cursor, Evaluator::new(p, filter).unwrap())
    }

    #[test]
    fn overlapping_children_yield_each_id_once() {
        let p = Partition::new(PartitionConfig::new("o=test")).unwrap();
        p.add(Entry::new(Dn::parse("o=test").unwrap())).unwrap();
        let a = p
            .add(Entry::new(Dn::parse("cn=a,o=test").unwrap()).with_attribute("mail", ["m"]))
            .unwrap();
        let b = p
            .add(
                Entry::new(Dn::parse("cn=b,o=test").unwrap())
                    .with_attribute("mail", ["m"])
                    .with_attribute("sn", ["s"]),
            )
            .unwrap();
        let c = p
            .add(Entry::new(Dn::parse("cn=c,o=test").unwrap()).with_attribute("sn", ["s"]))
            .unwrap();

        let (mail_cursor, mail_eval) = child(&p, &Filter::presence("mail"));
        let (sn_cursor, sn_eval) = child(&p, &Filter::presence("sn"));
        let mut or = OrCursor::new(vec![mail_cursor, sn_cursor], vec![mail_eval, sn_eval]).unwrap();

        assert_eq!(collect_ids(&mut or).unwrap(), vec![a, b, c]);
        assert_eq!(collect_ids_reverse(&mut or).unwrap(), vec![c, b, a]);
    }

    #[test]
    fn empty_union() {
        let mut or = OrCursor::new(Vec::new(), Vec::new()).unwrap();
        assert!(!or.first().unwrap());
        assert!(!or.last().unwrap());
    }
}
