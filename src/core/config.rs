use serde::{Serialize, Deserialize};
use crate::core::error::Result;
use crate::query::types::ValidationConfig;
use crate::schema::schema::Syntax;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PartitionConfig {
    pub suffix: String,                          // DN of the partition's root entry
    pub indexed_attributes: Vec<String>,         // User indices created at open
    pub attribute_types: Vec<AttributeTypeConfig>,
    pub validation: ValidationConfig,
}

/// Attribute type declaration for the built-in schema
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributeTypeConfig {
    pub name: String,
    pub syntax: Syntax,
    #[serde(default = "default_ordered")]
    pub ordered: bool,
}

fn default_ordered() -> bool {
    true
}

impl PartitionConfig {
    pub fn new(suffix: &str) -> Self {
        PartitionConfig {
            suffix: suffix.to_string(),
            ..Default::default()
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_index(mut self, attribute: &str) -> Self {
        self.indexed_attributes.push(attribute.to_string());
        self
    }

    pub fn with_attribute_type(mut self, name: &str, syntax: Syntax, ordered: bool) -> Self {
        self.attribute_types.push(AttributeTypeConfig {
            name: name.to_string(),
            syntax,
            ordered,
        });
        self
    }
}

impl Default for PartitionConfig {
    fn default() -> Self {
        PartitionConfig {
            suffix: "dc=example,dc=com".to_string(),
            indexed_attributes: vec!["objectClass".to_string()],
            attribute_types: Vec::new(),
            validation: ValidationConfig::default(),
        }
    }
}
