use std::fmt;
use serde::{Deserialize, Serialize};
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::Dn;
use crate::query::ast::Filter;

/// Upper bound of every scan-count estimate; arithmetic saturates here.
pub const MAX_SCAN_COUNT: u64 = i64::MAX as u64;

/// Search scope relative to the base entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SearchScope {
    Base,      // The base entry only
    OneLevel,  // Direct children of the base
    Subtree,   // The base and all of its descendants
}

impl fmt::Display for SearchScope {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            SearchScope::Base => "base",
            SearchScope::OneLevel => "one",
            SearchScope::Subtree => "sub",
        };
        f.write_str(s)
    }
}

/// When aliases are followed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AliasDerefMode {
    #[default]
    Never,
    InSearching,
    FindingBase,
    Always,
}

impl AliasDerefMode {
    pub fn derefs_base(&self) -> bool {
        matches!(self, AliasDerefMode::FindingBase | AliasDerefMode::Always)
    }

    pub fn derefs_in_search(&self) -> bool {
        matches!(self, AliasDerefMode::InSearching | AliasDerefMode::Always)
    }
}

/// Search request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub base: Dn,
    pub scope: SearchScope,
    pub deref: AliasDerefMode,
    pub filter: Filter,
    pub size_limit: Option<usize>,
}

impl SearchRequest {
    pub fn new(base: Dn, scope: SearchScope, filter: Filter) -> Self {
        SearchRequest {
            base,
            scope,
            deref: AliasDerefMode::Never,
            filter,
            size_limit: None,
        }
    }

    pub fn with_deref(mut self, deref: AliasDerefMode) -> Self {
        self.deref = deref;
        self
    }

    pub fn with_size_limit(mut self, limit: usize) -> Self {
        self.size_limit = Some(limit);
        self
    }
}

/// Query validation configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    pub max_filter_depth: usize,
    pub max_children: usize,
    pub max_substring_parts: usize,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        ValidationConfig {
            max_filter_depth: 32,
            max_children: 1024,
            max_substring_parts: 16,
        }
    }
}

/// Query validator
#[derive(Debug, Clone)]
pub struct QueryValidator {
    config: ValidationConfig,
}

impl QueryValidator {
    pub fn new(config: ValidationConfig) -> Self {
        QueryValidator { config }
    }

    /// Validate filter structure and constraints
    pub fn validate(&self, filter: &Filter) -> Result<()> {
        self.validate_node(filter, 1)
    }

    fn validate_node(&self, filter: &Filter, depth: usize) -> Result<()> {
        if depth > self.config.max_filter_depth {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                format!("Filter depth {} exceeds maximum {}", depth, self.config.max_filter_depth),
            ));
        }

        match filter {
            Filter::And(branch) | Filter::Or(branch) => {
                if branch.children.is_empty() {
                    return Err(Error::new(
                        ErrorKind::InvalidInput,
                        "AND/OR filter needs at least one child".to_string(),
                    ));
                }
                if branch.children.len() > self.config.max_children {
                    return Err(Error::new(
                        ErrorKind::InvalidInput,
                        format!(
                            "Filter has {} children, max is {}",
                            branch.children.len(),
                            self.config.max_children
                        ),
                    ));
                }
                for child in &branch.children {
                    self.validate_node(child, depth + 1)?;
                }
            }
            Filter::Not(not) => self.validate_node(&not.child, depth + 1)?,
            Filter::Substring(substring) => {
                let parts = substring.any.len()
                    + usize::from(substring.initial.is_some())
                    + usize::from(substring.terminal.is_some());
                if parts == 0 || parts > self.config.max_substring_parts {
                    return Err(Error::new(
                        ErrorKind::InvalidInput,
                        format!(
                            "Substring filter on '{}' has {} parts, allowed 1..={}",
                            substring.attribute, parts, self.config.max_substring_parts
                        ),
                    ));
                }
            }
            Filter::Extensible(ext) => {
                if ext.attribute.is_none() && ext.rule.is_none() {
                    return Err(Error::new(
                        ErrorKind::InvalidInput,
                        "Extensible filter needs an attribute or a matching rule".to_string(),
                    ));
                }
            }
            Filter::Scope(_)
            | Filter::Presence(_)
            | Filter::Equality(_)
            | Filter::GreaterEq(_)
            | Filter::LessEq(_)
            | Filter::Approximate(_) => {}
        }

        Ok(())
    }
}
