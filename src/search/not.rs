use crate::core::error::Result;
use crate::core::partition::Partition;
use crate::core::types::EntryId;
use crate::cursor::Cursor;
use crate::index::entry::IndexEntry;
use crate::query::ast::Filter;
use crate::search::evaluator::Evaluator;
use crate::search::filtered::FilteredCursor;
use crate::search::SearchKey;

/// Negation has no index of its own: every id is scanned and kept when the
/// child rejects it.
pub struct NotCursor<'a> {
    scan: FilteredCursor<'a>,
}

impl<'a> NotCursor<'a> {
    pub fn new(partition: &'a Partition, child: &Filter) -> Result<Self> {
        let evaluator = Evaluator::new(partition, child)?;
        Ok(NotCursor {
            scan: FilteredCursor::negated(partition.master_cursor(), evaluator),
        })
    }
}

impl Cursor for NotCursor<'_> {
    type Key = SearchKey;

    fn before(&mut self, element: &IndexEntry<SearchKey>) -> Result<()> {
        self.scan.before(element)
    }

    fn after(&mut self, element: &IndexEntry<SearchKey>) -> Result<()> {
        self.scan.after(element)
    }

    fn before_value(&mut self, id: Option<EntryId>, key: &SearchKey) -> Result<()> {
        self.scan.before_value(id, key)
    }

    fn after_value(&mut self, id: Option<EntryId>, key: &SearchKey) -> Result<()> {
        self.scan.after_value(id, key)
    }

    fn before_first(&mut self) -> Result<()> {
        self.scan.before_first()
    }

    fn after_last(&mut self) -> Result<()> {
        self.scan.after_last()
    }

    fn next(&mut self) -> Result<bool> {
        self.scan.next()
    }

    fn previous(&mut self) -> Result<bool> {
        self.scan.previous()
    }

    fn get(&self) -> Result<IndexEntry<SearchKey>> {
        self.scan.get()
    }

    fn available(&self) -> bool {
        self.scan.available()
    }

    fn close(&mut self) {
        self.scan.close()
    }

    fn is_closed(&self) -> bool {
        self.scan.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::PartitionConfig;
    use crate::core::types::{Dn, Entry};
    use crate::cursor::{collect_ids, collect_ids_reverse};

    #[test]
    fn complements_the_child() {
        let p = Partition::new(PartitionConfig::new("o=test").with_index("sn")).unwrap();
        let root = p.add(Entry::new(Dn::parse("o=test").unwrap())).unwrap();
        let a = p
            .add(Entry::new(Dn::parse("cn=a,o=test").unwrap()).with_attribute("sn", ["x"]))
            .unwrap();
        let b = p
            .add(Entry::new(Dn::parse("cn=b,o=test").unwrap()).with_attribute("sn", ["y"]))
            .unwrap();

        let child = Filter::equality("sn", "x").normalized(p.schema()).unwrap();
        let mut not = NotCursor::new(&p, &child).unwrap();
        assert_eq!(collect_ids(&mut not).unwrap(), vec![root, b]);
        assert_eq!(collect_ids_reverse(&mut not).unwrap(), vec![b, root]);
        assert!(!collect_ids(&mut not).unwrap().contains(&a));
    }
}
