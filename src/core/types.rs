use serde::{Serialize, Deserialize};
use std::collections::BTreeMap;
use std::fmt;
use crate::core::error::{Error, ErrorKind, Result};

/// Identifier of a stored entry. Assigned monotonically by the partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntryId(pub u64);

impl EntryId {
    pub const MIN: EntryId = EntryId(u64::MIN);
    pub const MAX: EntryId = EntryId(u64::MAX);

    pub fn new(id: u64) -> Self {
        EntryId(id)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl From<u64> for EntryId {
    fn from(id: u64) -> Self {
        EntryId(id)
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Resolved attribute identifier (lower-cased attribute name or OID).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AttributeId(String);

impl AttributeId {
    pub fn new(name: &str) -> Self {
        AttributeId(name.trim().to_ascii_lowercase())
    }

    pub fn object_class() -> Self {
        AttributeId::new("objectclass")
    }

    pub fn aliased_object_name() -> Self {
        AttributeId::new("aliasedobjectname")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for AttributeId {
    fn from(name: &str) -> Self {
        AttributeId::new(name)
    }
}

impl fmt::Display for AttributeId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Attribute value. The derived ordering is the index ordering; normalizers
/// must map all values of one attribute onto a single variant.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Value {
    Integer(i64),
    Text(String),
    Binary(Vec<u8>),
}

impl Value {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<Vec<u8>> for Value {
    fn from(bytes: Vec<u8>) -> Self {
        Value::Binary(bytes)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Integer(n) => write!(f, "{}", n),
            Value::Text(s) => f.write_str(s),
            Value::Binary(bytes) => {
                f.write_str("#")?;
                for b in bytes {
                    write!(f, "{:02x}", b)?;
                }
                Ok(())
            }
        }
    }
}

/// Relative distinguished name: a single `type=value` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rdn {
    pub attribute: AttributeId,
    pub value: String,
}

impl Rdn {
    pub fn new(attribute: &str, value: &str) -> Self {
        Rdn {
            attribute: AttributeId::new(attribute),
            value: value.trim().to_string(),
        }
    }

    pub fn parse(input: &str) -> Result<Self> {
        let (attribute, value) = input.split_once('=').ok_or_else(|| {
            Error::new(ErrorKind::InvalidInput, format!("RDN '{}' has no '='", input))
        })?;
        if attribute.trim().is_empty() || value.trim().is_empty() {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                format!("RDN '{}' has an empty type or value", input),
            ));
        }
        Ok(Rdn::new(attribute, &unescape_dn_value(value)))
    }

    /// Lower-cased type, case-folded value with inner whitespace collapsed.
    pub fn normalized(&self) -> String {
        let value = self.value
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();
        format!("{}={}", self.attribute, escape_dn_value(&value))
    }
}

impl fmt::Display for Rdn {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}={}", self.attribute, escape_dn_value(&self.value))
    }
}

/// Distinguished name, leaf RDN first. The empty DN is the root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dn {
    rdns: Vec<Rdn>,
}

impl Dn {
    pub fn root() -> Self {
        Dn { rdns: Vec::new() }
    }

    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        if input.is_empty() {
            return Ok(Dn::root());
        }

        let mut rdns = Vec::new();
        let mut current = String::new();
        let mut escaped = false;
        for c in input.chars() {
            if escaped {
                current.push('\\');
                current.push(c);
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == ',' {
                rdns.push(Rdn::parse(&current)?);
                current.clear();
            } else {
                current.push(c);
            }
        }
        if escaped {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                format!("DN '{}' ends with a dangling escape", input),
            ));
        }
        rdns.push(Rdn::parse(&current)?);

        Ok(Dn { rdns })
    }

    pub fn rdn(&self) -> Option<&Rdn> {
        self.rdns.first()
    }

    pub fn rdns(&self) -> &[Rdn] {
        &self.rdns
    }

    pub fn len(&self) -> usize {
        self.rdns.len()
    }

    pub fn is_root(&self) -> bool {
        self.rdns.is_empty()
    }

    pub fn parent(&self) -> Option<Dn> {
        if self.rdns.is_empty() {
            None
        } else {
            Some(Dn { rdns: self.rdns[1..].to_vec() })
        }
    }

    pub fn child(&self, rdn: Rdn) -> Dn {
        let mut rdns = Vec::with_capacity(self.rdns.len() + 1);
        rdns.push(rdn);
        rdns.extend(self.rdns.iter().cloned());
        Dn { rdns }
    }

    /// Replaces the trailing `old_base` part of this DN with `new_base`.
    pub fn rebase(&self, old_base: &Dn, new_base: &Dn) -> Option<Dn> {
        if !self.is_descendant_or_self(old_base) {
            return None;
        }
        let keep = self.rdns.len() - old_base.rdns.len();
        let mut rdns = self.rdns[..keep].to_vec();
        rdns.extend(new_base.rdns.iter().cloned());
        Some(Dn { rdns })
    }

    pub fn normalized(&self) -> String {
        self.rdns
            .iter()
            .map(Rdn::normalized)
            .collect::<Vec<_>>()
            .join(",")
    }

    /// True when `ancestor` is a strict ancestor of this DN.
    pub fn is_descendant_of(&self, ancestor: &Dn) -> bool {
        self.rdns.len() > ancestor.rdns.len() && self.is_descendant_or_self(ancestor)
    }

    pub fn is_descendant_or_self(&self, ancestor: &Dn) -> bool {
        if self.rdns.len() < ancestor.rdns.len() {
            return false;
        }
        let offset = self.rdns.len() - ancestor.rdns.len();
        self.rdns[offset..]
            .iter()
            .zip(ancestor.rdns.iter())
            .all(|(a, b)| a.normalized() == b.normalized())
    }
}

impl fmt::Display for Dn {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let parts: Vec<String> = self.rdns.iter().map(|r| r.to_string()).collect();
        f.write_str(&parts.join(","))
    }
}

fn unescape_dn_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn escape_dn_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, ',' | '\\' | '=' | '+') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Stored directory entry plus its structural metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub id: EntryId,
    pub dn: Dn,
    pub parent: Option<EntryId>,
    pub attributes: BTreeMap<AttributeId, Vec<Value>>,
}

impl Entry {
    /// Creates a detached entry; the partition assigns `id` and `parent` on add.
    pub fn new(dn: Dn) -> Self {
        Entry {
            id: EntryId::MIN,
            dn,
            parent: None,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute<I, V>(mut self, attribute: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let attribute = AttributeId::new(attribute);
        for value in values {
            self.add_value(attribute.clone(), value.into());
        }
        self
    }

    pub fn add_value(&mut self, attribute: AttributeId, value: Value) {
        let values = self.attributes.entry(attribute).or_default();
        if !values.contains(&value) {
            values.push(value);
        }
    }

    pub fn get(&self, attribute: &AttributeId) -> Option<&[Value]> {
        self.attributes
            .get(attribute)
            .map(|v| v.as_slice())
            .filter(|v| !v.is_empty())
    }

    pub fn has_attribute(&self, attribute: &AttributeId) -> bool {
        self.get(attribute).is_some()
    }

    pub fn is_alias(&self) -> bool {
        let has_alias_class = self
            .get(&AttributeId::object_class())
            .map(|classes| {
                classes
                    .iter()
                    .any(|c| c.as_text().is_some_and(|s| s.eq_ignore_ascii_case("alias")))
            })
            .unwrap_or(false);
        has_alias_class && self.alias_target().is_some()
    }

    pub fn alias_target(&self) -> Option<&str> {
        self.get(&AttributeId::aliased_object_name())
            .and_then(|values| values.first())
            .and_then(Value::as_text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModificationOp {
    Add,
    Remove,
    Replace,
}

/// One attribute change of a modify operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Modification {
    pub op: ModificationOp,
    pub attribute: AttributeId,
    pub values: Vec<Value>,
}

impl Modification {
    pub fn add<V: Into<Value>>(attribute: &str, values: impl IntoIterator<Item = V>) -> Self {
        Self::build(ModificationOp::Add, attribute, values)
    }

    /// Removes the listed values, or the whole attribute when `values` is empty.
    pub fn remove<V: Into<Value>>(attribute: &str, values: impl IntoIterator<Item = V>) -> Self {
        Self::build(ModificationOp::Remove, attribute, values)
    }

    pub fn replace<V: Into<Value>>(attribute: &str, values: impl IntoIterator<Item = V>) -> Self {
        Self::build(ModificationOp::Replace, attribute, values)
    }

    fn build<V: Into<Value>>(
        op: ModificationOp,
        attribute: &str,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Modification {
            op,
            attribute: AttributeId::new(attribute),
            values: values.into_iter().map(Into::into).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dn_parse_and_normalize() {
        let dn = Dn::parse("CN=John  Smith, ou=People,dc=Example").unwrap();
        assert_eq!(dn.len(), 3);
        assert_eq!(dn.normalized(), "cn=john smith,ou=people,dc=example");
        assert_eq!(dn.parent().unwrap().normalized(), "ou=people,dc=example");
    }

    #[test]
    fn dn_escaped_comma_stays_in_value() {
        let dn = Dn::parse("cn=Smith\\, John,dc=example").unwrap();
        assert_eq!(dn.len(), 2);
        assert_eq!(dn.rdn().unwrap().value, "Smith, John");
        assert_eq!(dn.normalized(), "cn=smith\\, john,dc=example");
    }

    #[test]
    fn dn_descendants_and_rebase() {
        let base = Dn::parse("ou=people,dc=example").unwrap();
        let child = Dn::parse("cn=a,ou=People,dc=example").unwrap();
        assert!(child.is_descendant_of(&base));
        assert!(!base.is_descendant_of(&base));
        assert!(base.is_descendant_or_self(&base));

        let new_base = Dn::parse("ou=staff,dc=example").unwrap();
        let moved = child.rebase(&base, &new_base).unwrap();
        assert_eq!(moved.normalized(), "cn=a,ou=staff,dc=example");
    }

    #[test]
    fn rdn_without_equals_is_rejected() {
        let err = Dn::parse("dc=example,broken").unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidInput);
    }

    #[test]
    fn alias_detection_requires_class_and_target() {
        let dn = Dn::parse("cn=alias,dc=example").unwrap();
        let alias = Entry::new(dn.clone())
            .with_attribute("objectClass", ["top", "alias"])
            .with_attribute("aliasedObjectName", ["cn=target,dc=example"]);
        assert!(alias.is_alias());

        let not_alias = Entry::new(dn).with_attribute("objectClass", ["alias"]);
        assert!(!not_alias.is_alias());
    }
}
