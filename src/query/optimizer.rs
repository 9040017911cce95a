use tracing::trace;
use crate::core::partition::Partition;
use crate::core::types::AttributeId;
use crate::query::ast::Filter;
use crate::query::types::{SearchScope, MAX_SCAN_COUNT};

/// Greedy scan-count annotator.
///
/// Walks the filter tree post-order and stores in every node an estimate of
/// how many candidates a cursor built for it would produce. The cursor
/// builder later drives each AND with its cheapest child.
pub struct Optimizer<'a> {
    partition: &'a Partition,
}

impl<'a> Optimizer<'a> {
    pub fn new(partition: &'a Partition) -> Self {
        Optimizer { partition }
    }

    /// Annotates `filter` in place and returns the root estimate.
    pub fn annotate(&self, filter: &mut Filter) -> u64 {
        let count = match filter {
            Filter::Scope(scope) => match scope.scope {
                SearchScope::Base => 1,
                SearchScope::OneLevel => {
                    let mut count = self.partition.child_count(scope.base);
                    if scope.deref.derefs_in_search() {
                        count = count.saturating_add(self.partition.system().one_alias.count_value(&scope.base));
                    }
                    count
                }
                SearchScope::Subtree => self.partition.count(),
            },
            Filter::Equality(a) | Filter::Approximate(a) => match self.partition.find_user_index(&a.attribute) {
                Some(index) => index.count_value(&a.value),
                None => MAX_SCAN_COUNT,
            },
            Filter::GreaterEq(a) => match self.partition.find_user_index(&a.attribute) {
                Some(index) => index.greater_than_count(&a.value).unwrap_or(MAX_SCAN_COUNT),
                None => MAX_SCAN_COUNT,
            },
            Filter::LessEq(a) => match self.partition.find_user_index(&a.attribute) {
                Some(index) => index.less_than_count(&a.value).unwrap_or(MAX_SCAN_COUNT),
                None => MAX_SCAN_COUNT,
            },
            Filter::Presence(p) => self.full_index_count(&p.attribute),
            Filter::Substring(s) => self.full_index_count(&s.attribute),
            Filter::Extensible(e) => match &e.attribute {
                Some(attribute) => self.full_index_count(attribute),
                None => MAX_SCAN_COUNT,
            },
            Filter::And(branch) => branch
                .children
                .iter_mut()
                .map(|child| self.annotate(child))
                .min()
                .unwrap_or(MAX_SCAN_COUNT),
            Filter::Or(branch) => branch
                .children
                .iter_mut()
                .map(|child| self.annotate(child))
                .fold(0u64, u64::saturating_add),
            Filter::Not(not) => {
                self.annotate(&mut not.child);
                MAX_SCAN_COUNT
            }
        };

        let count = count.min(MAX_SCAN_COUNT);
        trace!(%filter, count, "annotated");
        filter.set_count(count);
        count
    }

    fn full_index_count(&self, attribute: &AttributeId) -> u64 {
        self.partition
            .find_user_index(attribute)
            .map(|index| index.count())
            .unwrap_or(MAX_SCAN_COUNT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::PartitionConfig;
    use crate::core::types::{Dn, Entry};
    use crate::query::types::AliasDerefMode;
    use crate::schema::schema::Syntax;

    fn partition() -> Partition {
        let config = PartitionConfig::new("o=test")
            .with_index("cn")
            .with_index("uidNumber")
            .with_attribute_type("uidNumber", Syntax::Integer, true);
        let p = Partition::new(config).unwrap();
        p.add(Entry::new(Dn::parse("o=test").unwrap())).unwrap();
        for n in 0..5i64 {
            p.add(
                Entry::new(Dn::parse(&format!("cn=user{},o=test", n)).unwrap())
                    .with_attribute("uidNumber", [n])
                    .with_attribute("description", ["x"]),
            )
            .unwrap();
        }
        p
    }

    #[test]
    fn leaf_estimates() {
        let p = partition();
        let optimizer = Optimizer::new(&p);

        assert_eq!(optimizer.annotate(&mut Filter::equality("cn", "user1")), 1);
        assert_eq!(optimizer.annotate(&mut Filter::greater_eq("uidNumber", 3i64)), 2);
        assert_eq!(optimizer.annotate(&mut Filter::less_eq("uidNumber", 3i64)), 4);
        assert_eq!(optimizer.annotate(&mut Filter::presence("cn")), 5);
        assert_eq!(optimizer.annotate(&mut Filter::equality("description", "x")), MAX_SCAN_COUNT);
        assert_eq!(optimizer.annotate(&mut Filter::extensible(None, Some("caseIgnoreMatch"), "x")), MAX_SCAN_COUNT);
    }

    #[test]
    fn scope_estimates() {
        let p = partition();
        let optimizer = Optimizer::new(&p);
        let base = p.entry_id(p.suffix()).unwrap();

        assert_eq!(optimizer.annotate(&mut Filter::scope(base, SearchScope::Base, AliasDerefMode::Never)), 1);
        assert_eq!(optimizer.annotate(&mut Filter::scope(base, SearchScope::OneLevel, AliasDerefMode::Never)), 5);
        assert_eq!(optimizer.annotate(&mut Filter::scope(base, SearchScope::Subtree, AliasDerefMode::Never)), 6);
    }

    #[test]
    fn composite_estimates_saturate() {
        let p = partition();
        let optimizer = Optimizer::new(&p);

        let mut and = Filter::and(vec![Filter::equality("description", "x"), Filter::equality("cn", "user2")]);
        assert_eq!(optimizer.annotate(&mut and), 1);

        let mut or = Filter::or(vec![Filter::equality("description", "x"), Filter::equality("cn", "user2")]);
        assert_eq!(optimizer.annotate(&mut or), MAX_SCAN_COUNT);

        let mut not = Filter::not(Filter::equality("cn", "user2"));
        assert_eq!(optimizer.annotate(&mut not), MAX_SCAN_COUNT);
        let Filter::Not(inner) = &not else { unreachable!() };
        assert_eq!(inner.child.count(), Some(1));
    }
}
