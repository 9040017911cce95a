use std::sync::Arc;
use regex::Regex;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::partition::Partition;
use crate::core::types::{AttributeId, Entry, EntryId, Value};
use crate::index::entry::IndexEntry;
use crate::index::index::Index;
use crate::query::ast::{Filter, SubstringFilter};
use crate::query::types::SearchScope;
use crate::search::SearchKey;

enum Kind<'a> {
    Scope { base: EntryId, scope: SearchScope, deref: bool },
    Presence { attribute: AttributeId, indexed: bool },
    Equality { attribute: AttributeId, value: Value, index: Option<Arc<Index<Value>>> },
    GreaterEq { attribute: AttributeId, value: Value, index: Option<Arc<Index<Value>>> },
    LessEq { attribute: AttributeId, value: Value, index: Option<Arc<Index<Value>>> },
    Substring { attribute: AttributeId, pattern: Regex, index: Option<Arc<Index<Value>>> },
    Extensible { attribute: Option<AttributeId>, rule: Option<String>, value: Value, dn_attributes: bool },
    And(Vec<Evaluator<'a>>),
    Or(Vec<Evaluator<'a>>),
    Not(Box<Evaluator<'a>>),
}

/// Membership test for one filter node.
///
/// `evaluate_id`, `evaluate_entry` and `evaluate` always agree. Leaves on an
/// indexed attribute answer from the index; everything else re-fetches the
/// record by id, so a stale cached record is never trusted.
pub struct Evaluator<'a> {
    partition: &'a Partition,
    kind: Kind<'a>,
}

impl<'a> Evaluator<'a> {
    /// Builds the evaluator for a normalized filter.
    pub fn new(partition: &'a Partition, filter: &Filter) -> Result<Self> {
        let kind = match filter {
            Filter::Scope(s) => Kind::Scope {
                base: s.base,
                scope: s.scope,
                deref: s.deref.derefs_in_search(),
            },
            Filter::Presence(p) => Kind::Presence {
                attribute: p.attribute.clone(),
                indexed: partition.has_user_index(&p.attribute),
            },
            // approximate match is plain equality
            Filter::Equality(a) | Filter::Approximate(a) => Kind::Equality {
                attribute: a.attribute.clone(),
                value: a.value.clone(),
                index: partition.find_user_index(&a.attribute),
            },
            Filter::GreaterEq(a) => Kind::GreaterEq {
                attribute: a.attribute.clone(),
                value: a.value.clone(),
                index: ordered_index(partition, &a.attribute)?,
            },
            Filter::LessEq(a) => Kind::LessEq {
                attribute: a.attribute.clone(),
                value: a.value.clone(),
                index: ordered_index(partition, &a.attribute)?,
            },
            Filter::Substring(s) => Kind::Substring {
                attribute: s.attribute.clone(),
                pattern: substring_pattern(s)?,
                index: partition.find_user_index(&s.attribute),
            },
            Filter::Extensible(e) => {
                if let Some(rule) = &e.rule {
                    if !partition.schema().supports_rule(rule) {
                        return Err(Error::new(
                            ErrorKind::InvalidInput,
                            format!("Unsupported matching rule '{}'", rule),
                        ));
                    }
                }
                Kind::Extensible {
                    attribute: e.attribute.clone(),
                    rule: e.rule.clone(),
                    value: e.value.clone(),
                    dn_attributes: e.dn_attributes,
                }
            }
            Filter::And(b) => Kind::And(Self::children(partition, &b.children)?),
            Filter::Or(b) => Kind::Or(Self::children(partition, &b.children)?),
            Filter::Not(n) => Kind::Not(Box::new(Evaluator::new(partition, &n.child)?)),
        };
        Ok(Evaluator { partition, kind })
    }

    fn children(partition: &'a Partition, filters: &[Filter]) -> Result<Vec<Evaluator<'a>>> {
        filters.iter().map(|f| Evaluator::new(partition, f)).collect()
    }

    /// True when the answer comes from indices alone.
    fn index_only(&self) -> bool {
        match &self.kind {
            Kind::Scope { .. } => true,
            Kind::Presence { indexed, .. } => *indexed,
            Kind::Equality { index, .. }
            | Kind::GreaterEq { index, .. }
            | Kind::LessEq { index, .. }
            | Kind::Substring { index, .. } => index.is_some(),
            Kind::Extensible { .. } => false,
            Kind::And(children) | Kind::Or(children) => children.iter().all(Evaluator::index_only),
            Kind::Not(child) => child.index_only(),
        }
    }

    pub fn evaluate_id(&self, id: EntryId) -> Result<bool> {
        match &self.kind {
            Kind::Scope { base, scope, deref } => Ok(self.in_scope(*base, *scope, *deref, id)),
            Kind::Presence { attribute, indexed: true } => Ok(self.partition.presence_index().has(attribute, id)),
            Kind::Equality { value, index: Some(index), .. } => Ok(index.has(value, id)),
            Kind::GreaterEq { value, index: Some(index), .. } => index.reverse_greater_or_eq(id, value),
            Kind::LessEq { value, index: Some(index), .. } => index.reverse_less_or_eq(id, value),
            Kind::Substring { pattern, index: Some(index), .. } => Ok(index
                .reverse_values(id)
                .iter()
                .any(|v| pattern.is_match(&v.to_string()))),
            Kind::And(children) => {
                for child in children {
                    if !child.evaluate_id(id)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Kind::Or(children) => {
                for child in children {
                    if child.evaluate_id(id)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Kind::Not(child) => Ok(!child.evaluate_id(id)?),
            _ => match self.partition.get_entry(id) {
                Some(entry) => self.evaluate_entry(&entry),
                None => Ok(false),
            },
        }
    }

    /// Evaluates an element, refreshing its cached record when the record is needed.
    pub fn evaluate(&self, element: &mut IndexEntry<SearchKey>) -> Result<bool> {
        if self.index_only() {
            return self.evaluate_id(element.id);
        }
        match &self.kind {
            Kind::And(children) => {
                for child in children {
                    if !child.evaluate(element)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Kind::Or(children) => {
                for child in children {
                    if child.evaluate(element)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Kind::Not(child) => Ok(!child.evaluate(element)?),
            _ => match self.partition.get_entry(element.id) {
                Some(entry) => {
                    element.set_entry(entry.clone());
                    self.evaluate_entry(&entry)
                }
                None => {
                    element.clear_entry();
                    Ok(false)
                }
            },
        }
    }

    pub fn evaluate_entry(&self, entry: &Entry) -> Result<bool> {
        let schema = self.partition.schema();
        let normalized = |attribute: &AttributeId| -> Result<Vec<Value>> {
            entry
                .get(attribute)
                .unwrap_or(&[])
                .iter()
                .map(|v| schema.normalize(attribute, v))
                .collect()
        };

        match &self.kind {
            Kind::Scope { base, scope, deref } => Ok(self.in_scope(*base, *scope, *deref, entry.id)),
            Kind::Presence { attribute, .. } => Ok(entry.has_attribute(attribute)),
            Kind::Equality { attribute, value, .. } => Ok(normalized(attribute)?.iter().any(|v| v == value)),
            Kind::GreaterEq { attribute, value, .. } => Ok(normalized(attribute)?.iter().any(|v| v >= value)),
            Kind::LessEq { attribute, value, .. } => Ok(normalized(attribute)?.iter().any(|v| v <= value)),
            Kind::Substring { attribute, pattern, .. } => Ok(normalized(attribute)?
                .iter()
                .any(|v| pattern.is_match(&v.to_string()))),
            Kind::Extensible { attribute, rule, value, dn_attributes } => {
                self.extensible(entry, attribute.as_ref(), rule.as_deref(), value, *dn_attributes)
            }
            Kind::And(children) => {
                for child in children {
                    if !child.evaluate_entry(entry)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Kind::Or(children) => {
                for child in children {
                    if child.evaluate_entry(entry)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Kind::Not(child) => Ok(!child.evaluate_entry(entry)?),
        }
    }

    fn extensible(
        &self,
        entry: &Entry,
        attribute: Option<&AttributeId>,
        rule: Option<&str>,
        assertion: &Value,
        dn_attributes: bool,
    ) -> Result<bool> {
        let schema = self.partition.schema();
        let mut candidates: Vec<(&AttributeId, Value)> = entry
            .attributes
            .iter()
            .filter(|(a, _)| attribute.is_none_or(|wanted| *a == wanted))
            .flat_map(|(a, values)| values.iter().map(move |v| (a, v.clone())))
            .collect();
        if dn_attributes {
            for rdn in entry.dn.rdns() {
                if attribute.is_none_or(|wanted| rdn.attribute == *wanted) {
                    candidates.push((&rdn.attribute, Value::from(rdn.value.as_str())));
                }
            }
        }

        for (a, value) in candidates {
            if schema.extensible_match(a, rule, assertion, &value)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn in_scope(&self, base: EntryId, scope: SearchScope, deref: bool, id: EntryId) -> bool {
        let system = self.partition.system();
        match scope {
            SearchScope::Base => id == base,
            SearchScope::OneLevel | SearchScope::Subtree => {
                if deref && system.alias.reverse(id).is_some() {
                    return false;
                }
                let (structural, aliased) = match scope {
                    SearchScope::OneLevel => (&system.one_level, &system.one_alias),
                    _ => (&system.sub_level, &system.sub_alias),
                };
                structural.has(&base, id) || (deref && aliased.has(&base, id))
            }
        }
    }
}

/// Ordering leaves need an ordering rule; the index is used when present.
fn ordered_index(partition: &Partition, attribute: &AttributeId) -> Result<Option<Arc<Index<Value>>>> {
    if !partition.schema().has_ordering(attribute) {
        return Err(Error::new(
            ErrorKind::NoSuchIndex,
            format!("Attribute '{}' has no ordering rule for range matching", attribute),
        ));
    }
    Ok(partition.find_user_index(attribute).filter(|index| index.is_ordered()))
}

/// Anchored regex equivalent to a (normalized) substring assertion.
pub fn substring_pattern(filter: &SubstringFilter) -> Result<Regex> {
    let mut pattern = String::from("(?s)^");
    if let Some(initial) = &filter.initial {
        pattern.push_str(&regex::escape(initial));
    }
    pattern.push_str(".*");
    for part in &filter.any {
        pattern.push_str(&regex::escape(part));
        pattern.push_str(".*");
    }
    if let Some(terminal) = &filter.terminal {
        pattern.push_str(&regex::escape(terminal));
    }
    pattern.push('$');
    Ok(Regex::new(&pattern)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::PartitionConfig;
    use crate::core::types::Dn;
    use crate::schema::schema::Syntax;

    fn partition() -> (Partition, EntryId, EntryId) {
        let config = PartitionConfig::new("o=test")
            .with_index("uidNumber")
            .with_attribute_type("uidNumber", Syntax::Integer, true)
            .with_attribute_type("description", Syntax::CaseExactString, false);
        let p = Partition::new(config).unwrap();
        p.add(Entry::new(Dn::parse("o=test").unwrap())).unwrap();
        let a = p
            .add(
                Entry::new(Dn::parse("cn=Alice Smith,o=test").unwrap())
                    .with_attribute("uidNumber", [5i64, 9])
                    .with_attribute("mail", ["alice@example.com"]),
            )
            .unwrap();
        let b = p
            .add(Entry::new(Dn::parse("cn=Bob,o=test").unwrap()).with_attribute("uidNumber", [2i64]))
            .unwrap();
        (p, a, b)
    }

    fn check(p: &Partition, filter: Filter, id: EntryId) -> bool {
        let filter = filter.normalized(p.schema()).unwrap();
        let evaluator = Evaluator::new(p, &filter).unwrap();
        let by_id = evaluator.evaluate_id(id).unwrap();
        let entry = p.lookup(id).unwrap();
        assert_eq!(by_id, evaluator.evaluate_entry(&entry).unwrap(), "{}", filter);
        let mut element = IndexEntry::new(None, id);
        assert_eq!(by_id, evaluator.evaluate(&mut element).unwrap(), "{}", filter);
        by_id
    }

    #[test]
    fn leaves_agree_across_entry_points() {
        let (p, a, b) = partition();
        assert!(check(&p, Filter::equality("cn", "ALICE  smith"), a));
        assert!(check(&p, Filter::greater_eq("uidNumber", 6i64), a));
        assert!(!check(&p, Filter::greater_eq("uidNumber", 6i64), b));
        assert!(check(&p, Filter::less_eq("uidNumber", 5i64), a));
        assert!(check(&p, Filter::presence("mail"), a));
        assert!(!check(&p, Filter::presence("mail"), b));
        assert!(check(&p, Filter::substring("mail", Some("alice"), &[], Some(".com")), a));
        assert!(check(&p, Filter::approximate("cn", "bob"), b));
        assert!(check(&p, Filter::extensible(Some("cn"), Some("caseExactMatch"), "Bob"), b));
        assert!(!check(&p, Filter::extensible(Some("cn"), Some("caseExactMatch"), "bob"), b));
    }

    #[test]
    fn composites_agree() {
        let (p, a, b) = partition();
        let filter = Filter::and(vec![
            Filter::presence("uidNumber"),
            Filter::not(Filter::or(vec![Filter::presence("mail"), Filter::equality("cn", "nobody")])),
        ]);
        assert!(!check(&p, filter.clone(), a));
        assert!(check(&p, filter, b));
    }

    #[test]
    fn scope_uses_structure() {
        let (p, a, _) = partition();
        let base = p.entry_id(p.suffix()).unwrap();
        use crate::query::types::AliasDerefMode::Never;
        assert!(check(&p, Filter::scope(base, SearchScope::OneLevel, Never), a));
        assert!(check(&p, Filter::scope(base, SearchScope::Subtree, Never), base));
        assert!(!check(&p, Filter::scope(base, SearchScope::OneLevel, Never), base));
        assert!(!check(&p, Filter::scope(a, SearchScope::Base, Never), base));
    }

    #[test]
    fn ordering_without_rule_is_refused() {
        let (p, _, _) = partition();
        let filter = Filter::greater_eq("description", "x");
        assert_eq!(Evaluator::new(&p, &filter).err().map(|e| e.kind), Some(ErrorKind::NoSuchIndex));
    }

    #[test]
    fn substring_patterns() {
        let Filter::Substring(s) = Filter::substring("cn", Some("a.b"), &["c"], None) else { unreachable!() };
        let re = substring_pattern(&s).unwrap();
        assert!(re.is_match("a.bxxcyy"));
        assert!(!re.is_match("aXbxxc"));
    }
}
