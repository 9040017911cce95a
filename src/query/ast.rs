use std::fmt;
use serde::{Serialize, Deserialize};
use crate::core::error::Result;
use crate::core::types::{AttributeId, EntryId, Value};
use crate::query::types::{AliasDerefMode, SearchScope};
use crate::schema::schema::Schema;

/// Filter tree. Every node carries the scan-count estimate written by the
/// optimizer (`None` until annotated).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Filter {
    Scope(ScopeFilter),
    Presence(PresenceFilter),
    Equality(AssertionFilter),
    GreaterEq(AssertionFilter),
    LessEq(AssertionFilter),
    Substring(SubstringFilter),
    Approximate(AssertionFilter),   // Matched as equality
    Extensible(ExtensibleFilter),
    And(BranchFilter),
    Or(BranchFilter),
    Not(NotFilter),
}

/// Structural restriction to a base entry and scope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScopeFilter {
    pub base: EntryId,
    pub scope: SearchScope,
    pub deref: AliasDerefMode,
    pub count: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceFilter {
    pub attribute: AttributeId,
    pub count: Option<u64>,
}

/// `attribute <op> value` for equality, ordering and approximate match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssertionFilter {
    pub attribute: AttributeId,
    pub value: Value,
    pub count: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubstringFilter {
    pub attribute: AttributeId,
    pub initial: Option<String>,
    pub any: Vec<String>,
    pub terminal: Option<String>,
    pub count: Option<u64>,
}

/// `[attribute][:dn][:rule]:=value`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtensibleFilter {
    pub attribute: Option<AttributeId>,
    pub rule: Option<String>,
    pub value: Value,
    pub dn_attributes: bool,
    pub count: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchFilter {
    pub children: Vec<Filter>,
    pub count: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotFilter {
    pub child: Box<Filter>,
    pub count: Option<u64>,
}

impl AssertionFilter {
    fn new(attribute: &str, value: Value) -> Self {
        AssertionFilter {
            attribute: AttributeId::new(attribute),
            value,
            count: None,
        }
    }
}

impl Filter {
    pub fn scope(base: EntryId, scope: SearchScope, deref: AliasDerefMode) -> Self {
        Filter::Scope(ScopeFilter { base, scope, deref, count: None })
    }

    pub fn presence(attribute: &str) -> Self {
        Filter::Presence(PresenceFilter {
            attribute: AttributeId::new(attribute),
            count: None,
        })
    }

    pub fn equality(attribute: &str, value: impl Into<Value>) -> Self {
        Filter::Equality(AssertionFilter::new(attribute, value.into()))
    }

    pub fn greater_eq(attribute: &str, value: impl Into<Value>) -> Self {
        Filter::GreaterEq(AssertionFilter::new(attribute, value.into()))
    }

    pub fn less_eq(attribute: &str, value: impl Into<Value>) -> Self {
        Filter::LessEq(AssertionFilter::new(attribute, value.into()))
    }

    pub fn approximate(attribute: &str, value: impl Into<Value>) -> Self {
        Filter::Approximate(AssertionFilter::new(attribute, value.into()))
    }

    pub fn substring(attribute: &str, initial: Option<&str>, any: &[&str], terminal: Option<&str>) -> Self {
        Filter::Substring(SubstringFilter {
            attribute: AttributeId::new(attribute),
            initial: initial.map(str::to_string),
            any: any.iter().map(|s| s.to_string()).collect(),
            terminal: terminal.map(str::to_string),
            count: None,
        })
    }

    pub fn extensible(attribute: Option<&str>, rule: Option<&str>, value: impl Into<Value>) -> Self {
        Filter::Extensible(ExtensibleFilter {
            attribute: attribute.map(AttributeId::new),
            rule: rule.map(str::to_string),
            value: value.into(),
            dn_attributes: false,
            count: None,
        })
    }

    pub fn and(children: Vec<Filter>) -> Self {
        Filter::And(BranchFilter { children, count: None })
    }

    pub fn or(children: Vec<Filter>) -> Self {
        Filter::Or(BranchFilter { children, count: None })
    }

    pub fn not(child: Filter) -> Self {
        Filter::Not(NotFilter {
            child: Box::new(child),
            count: None,
        })
    }

    /// Scan-count estimate, once annotated.
    pub fn count(&self) -> Option<u64> {
        match self {
            Filter::Scope(f) => f.count,
            Filter::Presence(f) => f.count,
            Filter::Equality(f) | Filter::GreaterEq(f) | Filter::LessEq(f) | Filter::Approximate(f) => f.count,
            Filter::Substring(f) => f.count,
            Filter::Extensible(f) => f.count,
            Filter::And(f) | Filter::Or(f) => f.count,
            Filter::Not(f) => f.count,
        }
    }

    pub fn set_count(&mut self, count: u64) {
        let slot = match self {
            Filter::Scope(f) => &mut f.count,
            Filter::Presence(f) => &mut f.count,
            Filter::Equality(f) | Filter::GreaterEq(f) | Filter::LessEq(f) | Filter::Approximate(f) => &mut f.count,
            Filter::Substring(f) => &mut f.count,
            Filter::Extensible(f) => &mut f.count,
            Filter::And(f) | Filter::Or(f) => &mut f.count,
            Filter::Not(f) => &mut f.count,
        };
        *slot = Some(count);
    }

    pub fn is_leaf(&self) -> bool {
        !matches!(self, Filter::And(_) | Filter::Or(_) | Filter::Not(_))
    }

    pub fn depth(&self) -> usize {
        match self {
            Filter::And(f) | Filter::Or(f) => 1 + f.children.iter().map(Filter::depth).max().unwrap_or(0),
            Filter::Not(f) => 1 + f.child.depth(),
            _ => 1,
        }
    }

    /// Copy with every assertion value normalized through the schema, so
    /// it compares directly against index keys.
    pub fn normalized(&self, schema: &dyn Schema) -> Result<Filter> {
        let mut filter = self.clone();
        filter.normalize_in_place(schema)?;
        Ok(filter)
    }

    fn normalize_in_place(&mut self, schema: &dyn Schema) -> Result<()> {
        match self {
            Filter::Equality(f) | Filter::GreaterEq(f) | Filter::LessEq(f) | Filter::Approximate(f) => {
                f.value = schema.normalize(&f.attribute, &f.value)?;
            }
            Filter::Substring(f) => {
                let attribute = f.attribute.clone();
                let normalize = |part: &mut String| -> Result<()> {
                    *part = schema.normalize(&attribute, &Value::from(part.as_str()))?.to_string();
                    Ok(())
                };
                if let Some(initial) = f.initial.as_mut() {
                    normalize(initial)?;
                }
                for part in f.any.iter_mut() {
                    normalize(part)?;
                }
                if let Some(terminal) = f.terminal.as_mut() {
                    normalize(terminal)?;
                }
            }
            Filter::And(f) | Filter::Or(f) => {
                for child in f.children.iter_mut() {
                    child.normalize_in_place(schema)?;
                }
            }
            Filter::Not(f) => f.child.normalize_in_place(schema)?,
            // extensible rules normalize on their own
            Filter::Scope(_) | Filter::Presence(_) | Filter::Extensible(_) => {}
        }
        Ok(())
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Filter::Scope(s) => write!(f, "(#scope={},{},{:?})", s.scope, s.base, s.deref),
            Filter::Presence(p) => write!(f, "({}=*)", p.attribute),
            Filter::Equality(a) => write!(f, "({}={})", a.attribute, escape_value(&a.value)),
            Filter::GreaterEq(a) => write!(f, "({}>={})", a.attribute, escape_value(&a.value)),
            Filter::LessEq(a) => write!(f, "({}<={})", a.attribute, escape_value(&a.value)),
            Filter::Approximate(a) => write!(f, "({}~={})", a.attribute, escape_value(&a.value)),
            Filter::Substring(s) => {
                write!(f, "({}=", s.attribute)?;
                if let Some(initial) = &s.initial {
                    f.write_str(&escape_str(initial))?;
                }
                f.write_str("*")?;
                for part in &s.any {
                    write!(f, "{}*", escape_str(part))?;
                }
                if let Some(terminal) = &s.terminal {
                    f.write_str(&escape_str(terminal))?;
                }
                f.write_str(")")
            }
            Filter::Extensible(e) => {
                f.write_str("(")?;
                if let Some(attribute) = &e.attribute {
                    write!(f, "{}", attribute)?;
                }
                if e.dn_attributes {
                    f.write_str(":dn")?;
                }
                if let Some(rule) = &e.rule {
                    write!(f, ":{}", rule)?;
                }
                write!(f, ":={})", escape_value(&e.value))
            }
            Filter::And(b) => write_branch(f, '&', &b.children),
            Filter::Or(b) => write_branch(f, '|', &b.children),
            Filter::Not(n) => write!(f, "(!{})", n.child),
        }
    }
}

fn write_branch(f: &mut fmt::Formatter, op: char, children: &[Filter]) -> fmt::Result {
    write!(f, "({}", op)?;
    for child in children {
        write!(f, "{}", child)?;
    }
    f.write_str(")")
}

/// RFC 4515 value escaping.
pub fn escape_str(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '*' => out.push_str("\\2a"),
            '(' => out.push_str("\\28"),
            ')' => out.push_str("\\29"),
            '\\' => out.push_str("\\5c"),
            '\0' => out.push_str("\\00"),
            _ => out.push(c),
        }
    }
    out
}

fn escape_value(value: &Value) -> String {
    match value {
        Value::Integer(n) => n.to_string(),
        Value::Text(s) => escape_str(s),
        Value::Binary(bytes) => bytes.iter().map(|b| format!("\\{:02x}", b)).collect(),
    }
}
