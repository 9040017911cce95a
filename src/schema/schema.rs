use std::cmp::Ordering;
use std::collections::HashMap;
use serde::{Serialize, Deserialize};
use crate::core::config::AttributeTypeConfig;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::{AttributeId, Dn, Value};

/// Attribute syntax, deciding how values are normalized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Syntax {
    CaseIgnoreString,
    CaseExactString,
    Integer,
    Binary,
    DistinguishedName,
}

/// Schema capability consumed by the partition, evaluators and optimizer.
///
/// `normalize` must map every value of an attribute onto one `Value` variant
/// whose natural order is the attribute's ordering rule.
pub trait Schema: Send + Sync {
    fn normalize(&self, attribute: &AttributeId, value: &Value) -> Result<Value>;

    fn has_ordering(&self, attribute: &AttributeId) -> bool;

    fn supports_rule(&self, rule: &str) -> bool;

    /// Applies an extensible matching rule; `None` uses the attribute's equality.
    fn extensible_match(
        &self,
        attribute: &AttributeId,
        rule: Option<&str>,
        assertion: &Value,
        value: &Value,
    ) -> Result<bool>;

    fn compare(&self, attribute: &AttributeId, a: &Value, b: &Value) -> Result<Ordering> {
        if !self.has_ordering(attribute) {
            return Err(Error::new(
                ErrorKind::UnsupportedOrdering,
                format!("Attribute '{}' has no ordering rule", attribute),
            ));
        }
        let a = self.normalize(attribute, a)?;
        let b = self.normalize(attribute, b)?;
        Ok(a.cmp(&b))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeType {
    pub syntax: Syntax,
    pub ordered: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MatchingRule {
    CaseIgnore,
    CaseExact,
    Integer,
    CaseIgnoreOrdering,
    IntegerOrdering,
}

impl MatchingRule {
    fn resolve(rule: &str) -> Option<Self> {
        match rule.to_ascii_lowercase().as_str() {
            "caseignorematch" | "2.5.13.2" => Some(MatchingRule::CaseIgnore),
            "caseexactmatch" | "2.5.13.5" => Some(MatchingRule::CaseExact),
            "integermatch" | "2.5.13.14" => Some(MatchingRule::Integer),
            "caseignoreorderingmatch" | "2.5.13.3" => Some(MatchingRule::CaseIgnoreOrdering),
            "integerorderingmatch" | "2.5.13.15" => Some(MatchingRule::IntegerOrdering),
            _ => None,
        }
    }
}

/// Registry-backed schema. Unknown attributes are case-ignore strings with ordering.
#[derive(Debug, Clone)]
pub struct AttributeSchema {
    types: HashMap<AttributeId, AttributeType>,
    default_type: AttributeType,
}

impl AttributeSchema {
    pub fn new() -> Self {
        let mut schema = AttributeSchema {
            types: HashMap::new(),
            default_type: AttributeType {
                syntax: Syntax::CaseIgnoreString,
                ordered: true,
            },
        };
        schema.define("objectClass", Syntax::CaseIgnoreString, false);
        schema.define("aliasedObjectName", Syntax::DistinguishedName, false);
        schema
    }

    pub fn from_config(types: &[AttributeTypeConfig]) -> Self {
        let mut schema = AttributeSchema::new();
        for t in types {
            schema.define(&t.name, t.syntax, t.ordered);
        }
        schema
    }

    pub fn define(&mut self, name: &str, syntax: Syntax, ordered: bool) {
        self.types.insert(AttributeId::new(name), AttributeType { syntax, ordered });
    }

    pub fn with_attribute(mut self, name: &str, syntax: Syntax, ordered: bool) -> Self {
        self.define(name, syntax, ordered);
        self
    }

    pub fn attribute_type(&self, attribute: &AttributeId) -> AttributeType {
        self.types.get(attribute).copied().unwrap_or(self.default_type)
    }

    fn normalize_with(syntax: Syntax, attribute: &AttributeId, value: &Value) -> Result<Value> {
        match syntax {
            Syntax::CaseIgnoreString => Ok(Value::Text(fold_text(&text_of(attribute, value)?).to_lowercase())),
            Syntax::CaseExactString => Ok(Value::Text(fold_text(&text_of(attribute, value)?))),
            Syntax::Integer => match value {
                Value::Integer(n) => Ok(Value::Integer(*n)),
                Value::Text(s) => s.trim().parse::<i64>().map(Value::Integer).map_err(|_| {
                    Error::new(
                        ErrorKind::InvalidInput,
                        format!("'{}' is not a valid integer for '{}'", s, attribute),
                    )
                }),
                Value::Binary(_) => Err(Error::new(
                    ErrorKind::InvalidInput,
                    format!("Binary value given for integer attribute '{}'", attribute),
                )),
            },
            Syntax::Binary => match value {
                Value::Binary(bytes) => Ok(Value::Binary(bytes.clone())),
                Value::Text(s) => Ok(Value::Binary(s.as_bytes().to_vec())),
                Value::Integer(n) => Ok(Value::Binary(n.to_string().into_bytes())),
            },
            Syntax::DistinguishedName => {
                let dn = Dn::parse(&text_of(attribute, value)?)?;
                Ok(Value::Text(dn.normalized()))
            }
        }
    }
}

impl Default for AttributeSchema {
    fn default() -> Self {
        Self::new()
    }
}

impl Schema for AttributeSchema {
    fn normalize(&self, attribute: &AttributeId, value: &Value) -> Result<Value> {
        Self::normalize_with(self.attribute_type(attribute).syntax, attribute, value)
    }

    fn has_ordering(&self, attribute: &AttributeId) -> bool {
        self.attribute_type(attribute).ordered
    }

    fn supports_rule(&self, rule: &str) -> bool {
        MatchingRule::resolve(rule).is_some()
    }

    fn extensible_match(
        &self,
        attribute: &AttributeId,
        rule: Option<&str>,
        assertion: &Value,
        value: &Value,
    ) -> Result<bool> {
        let Some(rule) = rule else {
            return Ok(self.normalize(attribute, assertion)? == self.normalize(attribute, value)?);
        };
        let rule = MatchingRule::resolve(rule).ok_or_else(|| {
            Error::new(ErrorKind::InvalidInput, format!("Unknown matching rule '{}'", rule))
        })?;

        // Values the rule cannot interpret simply do not match
        let normalize = |syntax: Syntax, v: &Value| Self::normalize_with(syntax, attribute, v).ok();
        let matched = match rule {
            MatchingRule::CaseIgnore => {
                let (a, v) = (normalize(Syntax::CaseIgnoreString, assertion), normalize(Syntax::CaseIgnoreString, value));
                a.is_some() && a == v
            }
            MatchingRule::CaseExact => {
                let (a, v) = (normalize(Syntax::CaseExactString, assertion), normalize(Syntax::CaseExactString, value));
                a.is_some() && a == v
            }
            MatchingRule::Integer => {
                let (a, v) = (normalize(Syntax::Integer, assertion), normalize(Syntax::Integer, value));
                a.is_some() && a == v
            }
            MatchingRule::CaseIgnoreOrdering => {
                match (normalize(Syntax::CaseIgnoreString, assertion), normalize(Syntax::CaseIgnoreString, value)) {
                    (Some(a), Some(v)) => v < a,
                    _ => false,
                }
            }
            MatchingRule::IntegerOrdering => {
                match (normalize(Syntax::Integer, assertion), normalize(Syntax::Integer, value)) {
                    (Some(a), Some(v)) => v < a,
                    _ => false,
                }
            }
        };
        Ok(matched)
    }
}

fn text_of(attribute: &AttributeId, value: &Value) -> Result<String> {
    match value {
        Value::Text(s) => Ok(s.clone()),
        Value::Integer(n) => Ok(n.to_string()),
        Value::Binary(bytes) => String::from_utf8(bytes.clone()).map_err(|_| {
            Error::new(
                ErrorKind::InvalidInput,
                format!("Binary value for '{}' is not valid UTF-8", attribute),
            )
        }),
    }
}

fn fold_text(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
