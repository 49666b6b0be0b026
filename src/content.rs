//! Read-only view of the content tree the indexer projects from.
//!
//! The tree itself is owned elsewhere. The indexer only needs to look nodes up
//! by identity inside a workspace/dimension context and to step from a node to
//! its parent.

pub mod memory;

use crate::dimensions::{DimensionCombination, dimensions_hash};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

pub use memory::MemoryContentRepository;

/// One variant of a content node as seen through a context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Identity shared by every variant of the node across workspaces.
    pub identity: String,
    /// Persistence identity of this variant; keys its index entry.
    pub variant_identity: String,
    pub node_type: String,
    /// Workspace that owns this variant.
    pub workspace: String,
    #[serde(default)]
    pub dimensions: DimensionCombination,
    #[serde(default)]
    pub removed: bool,
    #[serde(default)]
    pub properties: BTreeMap<String, serde_json::Value>,
}

impl Node {
    pub fn new(
        identity: impl Into<String>,
        variant_identity: impl Into<String>,
        node_type: impl Into<String>,
        workspace: impl Into<String>,
    ) -> Self {
        Self {
            identity: identity.into(),
            variant_identity: variant_identity.into(),
            node_type: node_type.into(),
            workspace: workspace.into(),
            dimensions: DimensionCombination::new(),
            removed: false,
            properties: BTreeMap::new(),
        }
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    pub fn with_dimensions(mut self, dimensions: DimensionCombination) -> Self {
        self.dimensions = dimensions;
        self
    }

    pub fn mark_removed(mut self) -> Self {
        self.removed = true;
        self
    }

    pub fn dimensions_hash(&self) -> String {
        dimensions_hash(&self.dimensions)
    }
}

/// Nodes visible from one workspace and dimension combination.
pub trait NodeView: Send + Sync {
    /// Find the node with the given identity, or `None` if it does not exist
    /// in this context.
    fn node_by_identifier(&self, identity: &str) -> Option<Node>;

    /// Parent of `node` in this context, `None` at the tree root.
    fn parent(&self, node: &Node) -> Option<Node>;
}

/// Creates node views for a workspace and an optional dimension combination.
pub trait ContextFactory: Send + Sync {
    fn create(
        &self,
        workspace: &str,
        dimensions: Option<&DimensionCombination>,
    ) -> Arc<dyn NodeView>;
}
