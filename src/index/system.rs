use serde::{Serialize, Deserialize};
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::EntryId;
use crate::index::index::Index;

pub const ENTRY_NAME_INDEX: &str = "ndn";
pub const ONE_LEVEL_INDEX: &str = "onelevel";
pub const SUB_LEVEL_INDEX: &str = "sublevel";
pub const ALIAS_INDEX: &str = "alias";
pub const ONE_ALIAS_INDEX: &str = "onealias";
pub const SUB_ALIAS_INDEX: &str = "subalias";
pub const PRESENCE_INDEX: &str = "presence";

/// Structural indices every partition maintains.
pub struct SystemIndices {
    /// normalized DN -> entry id
    pub entry_name: Index<String>,
    /// parent id -> child ids
    pub one_level: Index<EntryId>,
    /// ancestor id -> descendant ids, each entry also under itself
    pub sub_level: Index<EntryId>,
    /// normalized target DN -> alias ids
    pub alias: Index<String>,
    /// alias parent id -> target ids of non-sibling targets
    pub one_alias: Index<EntryId>,
    /// alias ancestor id -> target ids outside that ancestor's subtree
    pub sub_alias: Index<EntryId>,
}

/// Borrowed handle on one system index, looked up by name.
pub enum SystemIndex<'a> {
    EntryName(&'a Index<String>),
    OneLevel(&'a Index<EntryId>),
    SubLevel(&'a Index<EntryId>),
    Alias(&'a Index<String>),
    OneAlias(&'a Index<EntryId>),
    SubAlias(&'a Index<EntryId>),
}

impl SystemIndex<'_> {
    pub fn count(&self) -> u64 {
        match self {
            SystemIndex::EntryName(i) | SystemIndex::Alias(i) => i.count(),
            SystemIndex::OneLevel(i) | SystemIndex::SubLevel(i) => i.count(),
            SystemIndex::OneAlias(i) | SystemIndex::SubAlias(i) => i.count(),
        }
    }
}

impl SystemIndices {
    pub fn new() -> Self {
        SystemIndices {
            entry_name: Index::new(ENTRY_NAME_INDEX, true),
            one_level: Index::new(ONE_LEVEL_INDEX, true),
            sub_level: Index::new(SUB_LEVEL_INDEX, true),
            alias: Index::new(ALIAS_INDEX, true),
            one_alias: Index::new(ONE_ALIAS_INDEX, true),
            sub_alias: Index::new(SUB_ALIAS_INDEX, true),
        }
    }

    pub fn get(&self, name: &str) -> Result<SystemIndex<'_>> {
        match name {
            ENTRY_NAME_INDEX => Ok(SystemIndex::EntryName(&self.entry_name)),
            ONE_LEVEL_INDEX => Ok(SystemIndex::OneLevel(&self.one_level)),
            SUB_LEVEL_INDEX => Ok(SystemIndex::SubLevel(&self.sub_level)),
            ALIAS_INDEX => Ok(SystemIndex::Alias(&self.alias)),
            ONE_ALIAS_INDEX => Ok(SystemIndex::OneAlias(&self.one_alias)),
            SUB_ALIAS_INDEX => Ok(SystemIndex::SubAlias(&self.sub_alias)),
            _ => Err(Error::new(
                ErrorKind::NoSuchIndex,
                format!("No system index named '{}'", name),
            )),
        }
    }

    pub fn stats(&self) -> Vec<IndexStats> {
        vec![
            IndexStats::of(&self.entry_name),
            IndexStats::of(&self.one_level),
            IndexStats::of(&self.sub_level),
            IndexStats::of(&self.alias),
            IndexStats::of(&self.one_alias),
            IndexStats::of(&self.sub_alias),
        ]
    }
}

impl Default for SystemIndices {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    pub name: String,
    pub tuples: u64,
    pub distinct_keys: usize,
}

impl IndexStats {
    pub fn of<K: Ord + Clone + std::fmt::Debug>(index: &Index<K>) -> Self {
        IndexStats {
            name: index.name().to_string(),
            tuples: index.count(),
            distinct_keys: index.key_count(),
        }
    }
}
