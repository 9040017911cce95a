use std::sync::Arc;
use crate::core::error::{Error, Result};
use crate::core::partition::Partition;
use crate::core::types::EntryId;
use crate::cursor::{check_open, Cursor};
use crate::index::entry::IndexEntry;
use crate::index::index::IndexTables;
use crate::query::types::SearchScope;
use crate::search::key::KeyCursor;
use crate::search::SearchKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Part {
    Structural,
    Aliased,
}

/// Ids below a base: the children (one-level) or the whole subtree
/// including the base (subtree), followed by alias targets when aliases are
/// dereferenced while searching. Alias entries are skipped in that mode.
///
/// Only walks forward and backward; seeks are not supported.
pub struct ScopeCursor {
    structural: KeyCursor<EntryId>,
    aliased: Option<KeyCursor<EntryId>>,
    hidden: Option<Arc<IndexTables<String>>>,
    part: Part,
    closed: bool,
}

impl ScopeCursor {
    /// `scope` must be one-level or subtree; base scope is a single id.
    pub fn new(partition: &Partition, base: EntryId, scope: SearchScope, deref: bool) -> Result<Self> {
        let system = partition.system();
        let (structural, aliased) = match scope {
            SearchScope::OneLevel => (&system.one_level, &system.one_alias),
            SearchScope::Subtree => (&system.sub_level, &system.sub_alias),
            SearchScope::Base => return Err(Error::unsupported("Base scope")),
        };

        Ok(ScopeCursor {
            structural: KeyCursor::new(structural.snapshot(), base, None),
            aliased: deref.then(|| KeyCursor::new(aliased.snapshot(), base, None)),
            hidden: deref.then(|| system.alias.snapshot()),
            part: Part::Structural,
            closed: false,
        })
    }

    fn is_hidden(&self, id: EntryId) -> bool {
        self.hidden.as_ref().is_some_and(|aliases| aliases.reverse.contains_key(&id))
    }

    fn current(&self) -> Option<&KeyCursor<EntryId>> {
        match self.part {
            Part::Structural => Some(&self.structural),
            Part::Aliased => self.aliased.as_ref(),
        }
    }

    fn current_mut(&mut self) -> Option<&mut KeyCursor<EntryId>> {
        match self.part {
            Part::Structural => Some(&mut self.structural),
            Part::Aliased => self.aliased.as_mut(),
        }
    }
}

impl Cursor for ScopeCursor {
    type Key = SearchKey;

    fn before(&mut self, _element: &IndexEntry<SearchKey>) -> Result<()> {
        check_open(self.closed, "before()")?;
        Err(Error::unsupported("ScopeCursor::before()"))
    }

    fn after(&mut self, _element: &IndexEntry<SearchKey>) -> Result<()> {
        check_open(self.closed, "after()")?;
        Err(Error::unsupported("ScopeCursor::after()"))
    }

    fn before_value(&mut self, _id: Option<EntryId>, _key: &SearchKey) -> Result<()> {
        check_open(self.closed, "before_value()")?;
        Err(Error::unsupported("ScopeCursor::before_value()"))
    }

    fn after_value(&mut self, _id: Option<EntryId>, _key: &SearchKey) -> Result<()> {
        check_open(self.closed, "after_value()")?;
        Err(Error::unsupported("ScopeCursor::after_value()"))
    }

    fn before_first(&mut self) -> Result<()> {
        check_open(self.closed, "before_first()")?;
        self.structural.before_first()?;
        if let Some(aliased) = self.aliased.as_mut() {
            aliased.before_first()?;
        }
        self.part = Part::Structural;
        Ok(())
    }

    fn after_last(&mut self) -> Result<()> {
        check_open(self.closed, "after_last()")?;
        self.structural.after_last()?;
        self.part = match self.aliased.as_mut() {
            Some(aliased) => {
                aliased.after_last()?;
                Part::Aliased
            }
            None => Part::Structural,
        };
        Ok(())
    }

    fn next(&mut self) -> Result<bool> {
        check_open(self.closed, "next()")?;
        loop {
            let Some(cursor) = self.current_mut() else {
                return Ok(false);
            };
            if cursor.next()? {
                let id = cursor.get()?.id;
                if self.is_hidden(id) {
                    continue;
                }
                return Ok(true);
            }
            match (self.part, self.aliased.as_mut()) {
                (Part::Structural, Some(aliased)) => {
                    aliased.before_first()?;
                    self.part = Part::Aliased;
                }
                _ => return Ok(false),
            }
        }
    }

    fn previous(&mut self) -> Result<bool> {
        check_open(self.closed, "previous()")?;
        loop {
            let Some(cursor) = self.current_mut() else {
                return Ok(false);
            };
            if cursor.previous()? {
                let id = cursor.get()?.id;
                if self.is_hidden(id) {
                    continue;
                }
                return Ok(true);
            }
            match self.part {
                Part::Aliased => {
                    self.structural.after_last()?;
                    self.part = Part::Structural;
                }
                Part::Structural => return Ok(false),
            }
        }
    }

    fn get(&self) -> Result<IndexEntry<SearchKey>> {
        check_open(self.closed, "get()")?;
        match self.current() {
            Some(cursor) => cursor.get(),
            None => Err(Error::invalid_position("get()")),
        }
    }

    fn available(&self) -> bool {
        !self.closed && self.current().is_some_and(|cursor| cursor.available())
    }

    fn close(&mut self) {
        self.structural.close();
        if let Some(aliased) = self.aliased.as_mut() {
            aliased.close();
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
    use crate::core::error::ErrorKind;
    use crate::core::types::{Dn, Entry};
    use crate::cursor::{collect_ids, collect_ids_reverse};

    fn add(p: &Partition, dn: &str) -> EntryId {
        p.add(Entry::new(Dn::parse(dn).unwrap())).unwrap()
    }

    fn add_alias(p: &Partition, dn: &str, target: &str) -> EntryId {
        p.add(
            Entry::new(Dn::parse(dn).unwrap())
                .with_attribute("objectClass", ["alias", "extensibleObject"])
                .with_attribute("aliasedObjectName", [target]),
        )
        .unwrap()
    }

    #[test]
    fn structural_scopes() {
        let p = Partition::new(PartitionConfig::new("o=test")).unwrap();
        let root = add(&p, "o=test");
        let people = add(&p, "ou=people,o=test");
        let alice = add(&p, "cn=alice,ou=people,o=test");
        let groups = add(&p, "ou=groups,o=test");

        let mut one = ScopeCursor::new(&p, root, SearchScope::OneLevel, false).unwrap();
        assert_eq!(collect_ids(&mut one).unwrap(), vec![people, groups]);

        let mut sub = ScopeCursor::new(&p, root, SearchScope::Subtree, false).unwrap();
        assert_eq!(collect_ids(&mut sub).unwrap(), vec![root, people, alice, groups]);
        assert_eq!(collect_ids_reverse(&mut sub).unwrap(), vec![groups, alice, people, root]);
    }

    #[test]
    fn deref_swaps_aliases_for_targets() {
        let p = Partition::new(PartitionConfig::new("o=test")).unwrap();
        let root = add(&p, "o=test");
        let people = add(&p, "ou=people,o=test");
        let alice = add(&p, "cn=alice,ou=people,o=test");
        let groups = add(&p, "ou=groups,o=test");
        let link = add_alias(&p, "cn=link,ou=groups,o=test", "cn=alice,ou=people,o=test");

        let mut plain = ScopeCursor::new(&p, groups, SearchScope::OneLevel, false).unwrap();
        assert_eq!(collect_ids(&mut plain).unwrap(), vec![link]);

        let mut deref = ScopeCursor::new(&p, groups, SearchScope::OneLevel, true).unwrap();
        assert_eq!(collect_ids(&mut deref).unwrap(), vec![alice]);
        assert_eq!(collect_ids_reverse(&mut deref).unwrap(), vec![alice]);

        let mut sub = ScopeCursor::new(&p, groups, SearchScope::Subtree, true).unwrap();
        assert_eq!(collect_ids(&mut sub).unwrap(), vec![groups, alice]);
        assert!(!collect_ids(&mut sub).unwrap().contains(&people));
    }

    #[test]
    fn fresh_cursor_walks_without_reset() {
        let p = Partition::new(PartitionConfig::new("o=test")).unwrap();
        let root = add(&p, "o=test");
        let people = add(&p, "ou=people,o=test");
        let alice = add(&p, "cn=alice,ou=people,o=test");
        add_alias(&p, "cn=link,o=test", "cn=alice,ou=people,o=test");

        let mut one = ScopeCursor::new(&p, root, SearchScope::OneLevel, true).unwrap();
        let mut found = Vec::new();
        while one.next().unwrap() {
            found.push(one.get().unwrap().id);
        }
        assert_eq!(found, vec![people, alice]);
    }

    #[test]
    fn seeks_are_unsupported() {
        let p = Partition::new(PartitionConfig::new("o=test")).unwrap();
        let root = add(&p, "o=test");
        let mut cursor = ScopeCursor::new(&p, root, SearchScope::Subtree, false).unwrap();
        let err = cursor.before_value(Some(root), &None).unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnsupportedOperation);
        cursor.close();
        assert_eq!(cursor.next().unwrap_err().kind, ErrorKind::Closed);
    }
}
