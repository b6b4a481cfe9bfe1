//! Index configuration consulted by the optimizer.
//!
//! The optimizer only needs to know which index families exist and what the logical
//! fields are called in the search engine. Everything else about ingestion lives elsewhere.

use std::sync::OnceLock;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct IndexOptions: u32 {
        /// Element and attribute names are indexed.
        const INDEX_QNAMES = 1;
        /// Node paths are indexed as token streams, enabling proximity queries.
        const INDEX_PATHS = 1 << 1;
        /// Element, attribute and document text values are indexed.
        const INDEX_FULLTEXT = 1 << 2;
    }
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self::INDEX_QNAMES
    }
}

/// Logical index fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexField {
    Uri,
    ElementName,
    AttributeName,
    Path,
    ElementText,
    AttributeText,
    XmlText,
}

impl IndexField {
    pub fn default_name(self) -> &'static str {
        match self {
            Self::Uri => "uri",
            Self::ElementName => "elt_name",
            Self::AttributeName => "att_name",
            Self::Path => "path",
            Self::ElementText => "elt_text",
            Self::AttributeText => "att_text",
            Self::XmlText => "xml_text",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldNames {
    pub uri: String,
    pub element_name: String,
    pub attribute_name: String,
    pub path: String,
    pub element_text: String,
    pub attribute_text: String,
    pub xml_text: String,
}

impl Default for FieldNames {
    fn default() -> Self {
        Self {
            uri: IndexField::Uri.default_name().to_string(),
            element_name: IndexField::ElementName.default_name().to_string(),
            attribute_name: IndexField::AttributeName.default_name().to_string(),
            path: IndexField::Path.default_name().to_string(),
            element_text: IndexField::ElementText.default_name().to_string(),
            attribute_text: IndexField::AttributeText.default_name().to_string(),
            xml_text: IndexField::XmlText.default_name().to_string(),
        }
    }
}

impl FieldNames {
    fn slot(&mut self, field: IndexField) -> &mut String {
        match field {
            IndexField::Uri => &mut self.uri,
            IndexField::ElementName => &mut self.element_name,
            IndexField::AttributeName => &mut self.attribute_name,
            IndexField::Path => &mut self.path,
            IndexField::ElementText => &mut self.element_text,
            IndexField::AttributeText => &mut self.attribute_text,
            IndexField::XmlText => &mut self.xml_text,
        }
    }
}

/// How `contains()` is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ContainsPolicy {
    /// Never lowered; containment is always re-checked exactly by the execution engine.
    #[default]
    Verify,
    /// Lowered to a full-text term search. Token matching may over- or under-approximate
    /// substring containment, so callers opting in accept that imprecision.
    Approximate,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub options: IndexOptions,
    pub fields: FieldNames,
    pub contains_policy: ContainsPolicy,
}

static DEFAULT_INDEX_CONFIG: OnceLock<IndexConfig> = OnceLock::new();

impl IndexConfig {
    pub fn builder() -> IndexConfigBuilder {
        IndexConfigBuilder::new()
    }

    /// Lazily initialized default configuration (name indexes only).
    pub fn shared_default() -> &'static IndexConfig {
        DEFAULT_INDEX_CONFIG.get_or_init(IndexConfig::default)
    }

    pub fn has(&self, options: IndexOptions) -> bool {
        self.options.contains(options)
    }

    pub fn field(&self, field: IndexField) -> &str {
        match field {
            IndexField::Uri => &self.fields.uri,
            IndexField::ElementName => &self.fields.element_name,
            IndexField::AttributeName => &self.fields.attribute_name,
            IndexField::Path => &self.fields.path,
            IndexField::ElementText => &self.fields.element_text,
            IndexField::AttributeText => &self.fields.attribute_text,
            IndexField::XmlText => &self.fields.xml_text,
        }
    }

    /// Approximate `contains()` lowering needs both the opt-in and a text index.
    pub fn lowers_contains(&self) -> bool {
        self.contains_policy == ContainsPolicy::Approximate && self.has(IndexOptions::INDEX_FULLTEXT)
    }
}

/// Builder for [`IndexConfig`].
pub struct IndexConfigBuilder {
    config: IndexConfig,
}

impl Default for IndexConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl IndexConfigBuilder {
    pub fn new() -> Self {
        Self { config: IndexConfig::default() }
    }

    /// Replace the enabled index options wholesale.
    pub fn with_options(mut self, options: IndexOptions) -> Self {
        self.config.options = options;
        self
    }

    pub fn enable(mut self, options: IndexOptions) -> Self {
        self.config.options.insert(options);
        self
    }

    pub fn disable(mut self, options: IndexOptions) -> Self {
        self.config.options.remove(options);
        self
    }

    pub fn with_field_name(mut self, field: IndexField, name: impl Into<String>) -> Self {
        *self.config.fields.slot(field) = name.into();
        self
    }

    pub fn with_contains_policy(mut self, policy: ContainsPolicy) -> Self {
        self.config.contains_policy = policy;
        self
    }

    pub fn build(self) -> IndexConfig {
        self.config
    }
}
