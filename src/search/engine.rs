use tracing::{debug, trace};
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::partition::Partition;
use crate::core::types::{Dn, EntryId};
use crate::cursor::{EmptyCursor, SingletonCursor};
use crate::index::entry::IndexEntry;
use crate::query::ast::Filter;
use crate::query::optimizer::Optimizer;
use crate::query::types::{QueryValidator, SearchRequest, SearchScope, MAX_SCAN_COUNT};
use crate::search::and::AndCursor;
use crate::search::evaluator::Evaluator;
use crate::search::filtered::FilteredCursor;
use crate::search::key::KeyCursor;
use crate::search::not::NotCursor;
use crate::search::or::OrCursor;
use crate::search::ordering::RangeCursor;
use crate::search::results::SearchResults;
use crate::search::scope::ScopeCursor;
use crate::search::substring::SubstringCursor;
use crate::search::SearchCursor;

/// Turns filters into cursors over one partition.
pub struct SearchEngine<'a> {
    partition: &'a Partition,
    optimizer: Optimizer<'a>,
    validator: QueryValidator,
}

impl<'a> SearchEngine<'a> {
    pub fn new(partition: &'a Partition) -> Self {
        SearchEngine {
            partition,
            optimizer: Optimizer::new(partition),
            validator: QueryValidator::new(partition.config().validation.clone()),
        }
    }

    pub fn partition(&self) -> &'a Partition {
        self.partition
    }

    /// Stores scan-count estimates in every node of `filter`.
    pub fn annotate(&self, filter: &mut Filter) -> u64 {
        self.optimizer.annotate(filter)
    }

    pub fn evaluator(&self, filter: &Filter) -> Result<Evaluator<'a>> {
        Evaluator::new(self.partition, filter)
    }

    /// Builds the cursor for a normalized, annotated filter. Missing
    /// estimates count as `MAX_SCAN_COUNT`.
    pub fn build(&self, filter: &Filter) -> Result<SearchCursor<'a>> {
        let partition = self.partition;
        let cursor: SearchCursor<'a> = match filter {
            Filter::Scope(scope) => match scope.scope {
                SearchScope::Base => match partition.get_entry(scope.base) {
                    Some(entry) => Box::new(SingletonCursor::new(IndexEntry::new(None, scope.base).with_entry(entry))),
                    None => Box::new(EmptyCursor::new()),
                },
                _ => Box::new(ScopeCursor::new(
                    partition,
                    scope.base,
                    scope.scope,
                    scope.deref.derefs_in_search(),
                )?),
            },
            Filter::Presence(p) if partition.has_user_index(&p.attribute) => Box::new(KeyCursor::new(
                partition.presence_index().snapshot(),
                p.attribute.clone(),
                None,
            )),
            Filter::Equality(a) | Filter::Approximate(a) => match partition.find_user_index(&a.attribute) {
                Some(index) => Box::new(KeyCursor::new(index.snapshot(), a.value.clone(), Some(a.value.clone()))),
                None => self.full_scan(filter)?,
            },
            Filter::GreaterEq(a) => Box::new(RangeCursor::greater_eq(partition, a)?),
            Filter::LessEq(a) => Box::new(RangeCursor::less_eq(partition, a)?),
            Filter::Substring(s) => Box::new(SubstringCursor::new(partition, s)?),
            Filter::Presence(_) | Filter::Extensible(_) => self.full_scan(filter)?,
            Filter::And(branch) => {
                if branch.children.is_empty() {
                    // an empty AND is true for every entry
                    return Ok(Box::new(partition.master_cursor()));
                }
                let mut children: Vec<&Filter> = branch.children.iter().collect();
                children.sort_by_key(|child| estimate(child));
                let driver = children.remove(0);
                debug!(driver = %driver, count = estimate(driver), "selected AND driver");

                let others = children
                    .into_iter()
                    .map(|child| self.evaluator(child))
                    .collect::<Result<Vec<_>>>()?;
                Box::new(AndCursor::new(self.build(driver)?, others))
            }
            Filter::Or(branch) => {
                if branch.children.is_empty() {
                    return Ok(Box::new(EmptyCursor::new()));
                }
                let cursors = branch
                    .children
                    .iter()
                    .map(|child| self.build(child))
                    .collect::<Result<Vec<_>>>()?;
                let evaluators = branch
                    .children
                    .iter()
                    .map(|child| self.evaluator(child))
                    .collect::<Result<Vec<_>>>()?;
                Box::new(OrCursor::new(cursors, evaluators)?)
            }
            Filter::Not(not) => Box::new(NotCursor::new(partition, &not.child)?),
        };
        trace!(%filter, "built cursor");
        Ok(cursor)
    }

    fn full_scan(&self, filter: &Filter) -> Result<SearchCursor<'a>> {
        Ok(Box::new(FilteredCursor::new(
            self.partition.master_cursor(),
            self.evaluator(filter)?,
        )))
    }

    /// Runs a complete search: validation, base resolution, normalization,
    /// annotation and cursor construction.
    pub fn search(&self, request: &SearchRequest) -> Result<SearchResults<'a>> {
        self.validator.validate(&request.filter)?;

        let base = self.resolve_base(&request.base, request.deref.derefs_base())?;
        let filter = request.filter.normalized(self.partition.schema())?;
        debug!(base = %request.base, scope = %request.scope, filter = %filter, "search");

        let cursor: SearchCursor<'a> = match request.scope {
            SearchScope::Base => {
                let entry = self.partition.lookup(base)?;
                if self.evaluator(&filter)?.evaluate_entry(&entry)? {
                    Box::new(SingletonCursor::new(IndexEntry::new(None, base).with_entry(entry)))
                } else {
                    Box::new(EmptyCursor::new())
                }
            }
            scope => {
                let mut root = Filter::and(vec![Filter::scope(base, scope, request.deref), filter]);
                self.annotate(&mut root);
                self.build(&root)?
            }
        };

        Ok(SearchResults::new(self.partition, cursor, request.size_limit))
    }

    fn resolve_base(&self, dn: &Dn, deref: bool) -> Result<EntryId> {
        let id = self
            .partition
            .entry_id(dn)
            .ok_or_else(|| Error::new(ErrorKind::NotFound, format!("Search base '{}' does not exist", dn)))?;
        if !deref {
            return Ok(id);
        }

        let entry = self.partition.lookup(id)?;
        let Some(target) = entry.alias_target() else {
            return Ok(id);
        };
        if !entry.is_alias() {
            return Ok(id);
        }
        let target = Dn::parse(target)?;
        debug!(alias = %dn, target = %target, "dereferenced search base");
        self.partition.entry_id(&target).ok_or_else(|| {
            Error::new(
                ErrorKind::NotFound,
                format!("Alias '{}' points to missing entry '{}'", dn, target),
            )
        })
    }
}

fn estimate(filter: &Filter) -> u64 {
    filter.count().unwrap_or(MAX_SCAN_COUNT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::PartitionConfig;
    use crate::core::types::Entry;
    use crate::cursor::{collect_ids, collect_ids_reverse};
    use crate::query::parser::parse_filter;
    use crate::query::types::AliasDerefMode;
    use crate::schema::schema::Syntax;

    fn partition() -> Partition {
        let config = PartitionConfig::new("o=test")
            .with_index("ou")
            .with_index("uidNumber")
            .with_attribute_type("uidNumber", Syntax::Integer, true);
        let p = Partition::new(config).unwrap();
        p.add(Entry::new(Dn::parse("o=test").unwrap())).unwrap();
        p.add(Entry::new(Dn::parse("ou=people,o=test").unwrap())).unwrap();
        for n in 0..8i64 {
            p.add(
                Entry::new(Dn::parse(&format!("cn=user{},ou=people,o=test", n)).unwrap())
                    .with_attribute("objectClass", ["person"])
                    .with_attribute("uidNumber", [n * 10]),
            )
            .unwrap();
        }
        p
    }

    fn ids(p: &Partition, filter: &str) -> Vec<EntryId> {
        let engine = SearchEngine::new(p);
        let mut filter = parse_filter(filter).unwrap().normalized(p.schema()).unwrap();
        engine.annotate(&mut filter);
        let mut cursor = engine.build(&filter).unwrap();
        let forward = collect_ids(&mut cursor).unwrap();
        let mut backward = collect_ids_reverse(&mut cursor).unwrap();
        backward.reverse();
        assert_eq!(forward.len(), backward.len());
        forward
    }

    fn uid(p: &Partition, n: i64) -> EntryId {
        p.entry_id(&Dn::parse(&format!("cn=user{},ou=people,o=test", n)).unwrap()).unwrap()
    }

    #[test]
    fn builds_leaf_cursors() {
        let p = partition();
        assert_eq!(ids(&p, "(uidNumber>=55)"), vec![uid(&p, 6), uid(&p, 7)]);
        assert_eq!(ids(&p, "(uidNumber<=10)"), vec![uid(&p, 0), uid(&p, 1)]);
        assert_eq!(ids(&p, "(cn=USER3)"), vec![uid(&p, 3)]);
        assert_eq!(ids(&p, "(objectClass=person)").len(), 8);
        assert_eq!(ids(&p, "(ou=*)").len(), 1);
        assert_eq!(ids(&p, "(cn=user*)").len(), 8);
    }

    #[test]
    fn builds_composites() {
        let p = partition();
        assert_eq!(
            ids(&p, "(&(objectClass=person)(uidNumber>=30)(uidNumber<=40))"),
            vec![uid(&p, 3), uid(&p, 4)]
        );
        let mut or = ids(&p, "(|(cn=user1)(uidNumber<=20)(cn=user7))");
        or.sort();
        assert_eq!(or, vec![uid(&p, 0), uid(&p, 1), uid(&p, 2), uid(&p, 7)]);
        assert_eq!(ids(&p, "(&(objectClass=person)(!(uidNumber>=10)))"), vec![uid(&p, 0)]);
        assert_eq!(ids(&p, "(!(objectClass=person))").len(), 2);
    }

    #[test]
    fn empty_composites() {
        let p = partition();
        let engine = SearchEngine::new(&p);
        let mut all = engine.build(&Filter::and(Vec::new())).unwrap();
        assert_eq!(collect_ids(&mut all).unwrap().len(), 10);
        let mut none = engine.build(&Filter::or(Vec::new())).unwrap();
        assert!(collect_ids(&mut none).unwrap().is_empty());
    }

    #[test]
    fn search_scopes() {
        let p = partition();
        let engine = SearchEngine::new(&p);
        let people = Dn::parse("ou=people,o=test").unwrap();
        let filter = parse_filter("(uidNumber>=60)").unwrap();

        let sub = SearchRequest::new(Dn::parse("o=test").unwrap(), SearchScope::Subtree, filter.clone());
        assert_eq!(engine.search(&sub).unwrap().count(), 2);

        let base = SearchRequest::new(people.clone(), SearchScope::Base, Filter::presence("ou"));
        let found: Vec<_> = engine.search(&base).unwrap().collect::<Result<_>>().unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].dn, people);

        let missing = SearchRequest::new(Dn::parse("ou=nobody,o=test").unwrap(), SearchScope::OneLevel, filter);
        assert_eq!(engine.search(&missing).err().map(|e| e.kind), Some(ErrorKind::NotFound));
    }

    #[test]
    fn search_dereferences_alias_base() {
        let p = partition();
        p.add(
            Entry::new(Dn::parse("cn=staff,o=test").unwrap())
                .with_attribute("objectClass", ["alias"])
                .with_attribute("aliasedObjectName", ["ou=people,o=test"]),
        )
        .unwrap();
        let engine = SearchEngine::new(&p);
        let request = SearchRequest::new(
            Dn::parse("cn=staff,o=test").unwrap(),
            SearchScope::OneLevel,
            Filter::presence("objectClass"),
        );
        assert_eq!(engine.search(&request).unwrap().count(), 0);
        let request = request.with_deref(AliasDerefMode::FindingBase);
        assert_eq!(engine.search(&request).unwrap().count(), 8);
    }
}
