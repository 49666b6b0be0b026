//! Node type definitions and the search settings the indexer reads from them.
//!
//! Definitions are loaded from a TOML file with one `[[node_types]]` table per
//! type:
//!
//! ```toml
//! [[node_types]]
//! name = "Acme:Page"
//! search.fulltext.is_root = true
//!
//! [[node_types]]
//! name = "Acme:Text"
//! properties.text.search.fulltext_extractor = "html"
//! properties.draft_notes.search.indexing = false
//! ```

use crate::error::{ConfigError, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

/// A single node type as far as indexing is concerned.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NodeTypeDefinition {
    pub name: String,
    #[serde(default)]
    pub search: SearchSettings,
    #[serde(default)]
    pub properties: BTreeMap<String, PropertyDefinition>,
}

impl NodeTypeDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Mark this type as a fulltext aggregation boundary.
    pub fn fulltext_root(mut self) -> Self {
        self.search.fulltext.is_root = true;
        self
    }

    /// Route a property into a fulltext bucket.
    pub fn with_fulltext_property(
        mut self,
        property: impl Into<String>,
        extractor: FulltextExtractor,
    ) -> Self {
        self.properties.entry(property.into()).or_default().search.fulltext_extractor =
            Some(extractor);
        self
    }

    /// Keep a property out of the stored index properties.
    pub fn without_indexing(mut self, property: impl Into<String>) -> Self {
        self.properties.entry(property.into()).or_default().search.indexing = false;
        self
    }
}

/// The `search` section of a node type.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchSettings {
    #[serde(default)]
    pub fulltext: FulltextSettings,
}

/// The `search.fulltext` section of a node type.
#[derive(Debug, Clone, Deserialize)]
pub struct FulltextSettings {
    /// Descendant fulltext aggregates into the nearest node of a root type.
    #[serde(default)]
    pub is_root: bool,
    /// When false, nodes of this type contribute no fulltext at all.
    #[serde(default = "default_true")]
    pub enable: bool,
}

impl Default for FulltextSettings {
    fn default() -> Self {
        Self {
            is_root: false,
            enable: true,
        }
    }
}

/// Per-property configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PropertyDefinition {
    #[serde(default)]
    pub search: PropertySearchSettings,
}

/// The `search` section of a property.
#[derive(Debug, Clone, Deserialize)]
pub struct PropertySearchSettings {
    /// Store the property value in the index entry.
    #[serde(default = "default_true")]
    pub indexing: bool,
    /// Bucket the property value is extracted into, if any.
    #[serde(default)]
    pub fulltext_extractor: Option<FulltextExtractor>,
}

impl Default for PropertySearchSettings {
    fn default() -> Self {
        Self {
            indexing: true,
            fulltext_extractor: None,
        }
    }
}

/// Where a property value goes in the fulltext buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FulltextExtractor {
    H1,
    H2,
    H3,
    H4,
    H5,
    H6,
    Text,
    /// Split markup into heading buckets and body text.
    Html,
}

impl FulltextExtractor {
    /// Bucket name for plain extractors; `None` for [`FulltextExtractor::Html`].
    pub fn bucket(&self) -> Option<&'static str> {
        match self {
            FulltextExtractor::H1 => Some("h1"),
            FulltextExtractor::H2 => Some("h2"),
            FulltextExtractor::H3 => Some("h3"),
            FulltextExtractor::H4 => Some("h4"),
            FulltextExtractor::H5 => Some("h5"),
            FulltextExtractor::H6 => Some("h6"),
            FulltextExtractor::Text => Some("text"),
            FulltextExtractor::Html => None,
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct NodeTypeFile {
    #[serde(default)]
    node_types: Vec<NodeTypeDefinition>,
}

/// All registered node types, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct NodeTypeRegistry {
    types: HashMap<String, NodeTypeDefinition>,
}

impl NodeTypeRegistry {
    pub fn from_definitions(definitions: Vec<NodeTypeDefinition>) -> Result<Self> {
        let mut types = HashMap::with_capacity(definitions.len());
        for definition in definitions {
            if definition.name.is_empty() {
                return Err(ConfigError::Invalid("node type without a name".into()).into());
            }
            if types.contains_key(&definition.name) {
                return Err(ConfigError::Invalid(format!(
                    "node type {:?} is defined more than once",
                    definition.name
                ))
                .into());
            }
            types.insert(definition.name.clone(), definition);
        }
        Ok(Self { types })
    }

    pub fn from_toml_str(source: &str) -> Result<Self> {
        let file: NodeTypeFile =
            toml::from_str(source).map_err(|e| ConfigError::Load(e.to_string()))?;
        Self::from_definitions(file.node_types)
    }

    /// Read node type definitions from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path).map_err(|e| {
            ConfigError::Load(format!("failed to read {}: {e}", path.display()))
        })?;
        let registry = Self::from_toml_str(&source)?;
        tracing::debug!(
            path = %path.display(),
            count = registry.types.len(),
            "loaded node type definitions"
        );
        Ok(registry)
    }

    pub fn get(&self, name: &str) -> Option<&NodeTypeDefinition> {
        self.types.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &NodeTypeDefinition> {
        self.types.values()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

/// Names of every node type configured as a fulltext root.
///
/// Built once from the registry when the engine is assembled and never
/// mutated afterwards; a changed registry requires building a new engine.
#[derive(Debug, Clone, Default)]
pub struct FulltextRootTypes {
    names: HashSet<String>,
}

impl FulltextRootTypes {
    pub fn from_registry(registry: &NodeTypeRegistry) -> Self {
        let names: HashSet<String> = registry
            .iter()
            .filter(|definition| definition.search.fulltext.is_root)
            .map(|definition| definition.name.clone())
            .collect();
        tracing::debug!(count = names.len(), "collected fulltext root node types");
        Self { names }
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.names.contains(type_name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    const NODE_TYPES: &str = indoc! {r#"
        [[node_types]]
        name = "Acme:Page"
        search.fulltext.is_root = true

        [[node_types]]
        name = "Acme:Text"
        properties.title.search.fulltext_extractor = "h2"
        properties.text.search.fulltext_extractor = "html"
        properties.draft_notes.search.indexing = false

        [[node_types]]
        name = "Acme:Image"
        search.fulltext.enable = false
    "#};

    #[test]
    fn test_parse_node_types() {
        let registry = NodeTypeRegistry::from_toml_str(NODE_TYPES).unwrap();
        assert_eq!(registry.len(), 3);

        let page = registry.get("Acme:Page").unwrap();
        assert!(page.search.fulltext.is_root);
        assert!(page.search.fulltext.enable);

        let text = registry.get("Acme:Text").unwrap();
        assert!(!text.search.fulltext.is_root);
        assert_eq!(
            text.properties["title"].search.fulltext_extractor,
            Some(FulltextExtractor::H2)
        );
        assert_eq!(
            text.properties["text"].search.fulltext_extractor,
            Some(FulltextExtractor::Html)
        );
        assert!(text.properties["title"].search.indexing);
        assert!(!text.properties["draft_notes"].search.indexing);

        assert!(!registry.get("Acme:Image").unwrap().search.fulltext.enable);
    }

    #[test]
    fn test_fulltext_roots_from_registry() {
        let registry = NodeTypeRegistry::from_toml_str(NODE_TYPES).unwrap();
        let roots = FulltextRootTypes::from_registry(&registry);

        assert_eq!(roots.len(), 1);
        assert!(roots.contains("Acme:Page"));
        assert!(!roots.contains("Acme:Text"));
        assert!(!roots.contains("Acme:Unknown"));
    }

    #[test]
    fn test_duplicate_node_type_rejected() {
        let result = NodeTypeRegistry::from_definitions(vec![
            NodeTypeDefinition::new("Acme:Page"),
            NodeTypeDefinition::new("Acme:Page").fulltext_root(),
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node_types.toml");
        std::fs::write(&path, NODE_TYPES).unwrap();

        let registry = NodeTypeRegistry::load(&path).unwrap();
        assert_eq!(registry.len(), 3);

        assert!(NodeTypeRegistry::load(&dir.path().join("missing.toml")).is_err());
    }
}
