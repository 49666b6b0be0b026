//! In-memory content repository.
//!
//! Workspaces may have a base workspace; a view looks a node up in its own
//! workspace first and then walks the base chain, so a user workspace sees
//! every unchanged node of `live`.

use crate::content::{ContextFactory, Node, NodeView};
use crate::dimensions::DimensionCombination;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};

#[derive(Debug, Clone)]
struct StoredNode {
    node: Node,
    parent: Option<String>,
}

#[derive(Debug, Default)]
struct RepositoryState {
    nodes: Vec<StoredNode>,
    base_workspaces: HashMap<String, String>,
}

impl RepositoryState {
    /// The workspace followed by its base workspaces, nearest first.
    fn workspace_chain(&self, workspace: &str) -> Vec<String> {
        let mut chain = vec![workspace.to_string()];
        let mut seen: HashSet<&str> = HashSet::from([workspace]);
        let mut current = workspace;
        while let Some(base) = self.base_workspaces.get(current) {
            if !seen.insert(base.as_str()) {
                break;
            }
            chain.push(base.clone());
            current = base.as_str();
        }
        chain
    }
}

/// Content tree held in memory, shared by every view created from it.
#[derive(Debug, Clone, Default)]
pub struct MemoryContentRepository {
    state: Arc<RwLock<RepositoryState>>,
}

impl MemoryContentRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `workspace`, optionally based on another workspace.
    pub fn add_workspace(&self, workspace: &str, base: Option<&str>) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        match base {
            Some(base) => {
                state
                    .base_workspaces
                    .insert(workspace.to_string(), base.to_string());
            }
            None => {
                state.base_workspaces.remove(workspace);
            }
        }
    }

    /// Insert a node variant, replacing any stored variant with the same
    /// variant identity.
    pub fn insert(&self, node: Node, parent: Option<&str>) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let stored = StoredNode {
            node,
            parent: parent.map(str::to_string),
        };
        match state
            .nodes
            .iter_mut()
            .find(|existing| existing.node.variant_identity == stored.node.variant_identity)
        {
            Some(existing) => *existing = stored,
            None => state.nodes.push(stored),
        }
    }

    /// Apply `change` to a stored variant and return the updated node.
    pub fn update(&self, variant_identity: &str, change: impl FnOnce(&mut Node)) -> Option<Node> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let stored = state
            .nodes
            .iter_mut()
            .find(|stored| stored.node.variant_identity == variant_identity)?;
        change(&mut stored.node);
        Some(stored.node.clone())
    }

    /// Point a stored variant at a new parent identity.
    pub fn set_parent(&self, variant_identity: &str, parent: Option<&str>) -> bool {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        match state
            .nodes
            .iter_mut()
            .find(|stored| stored.node.variant_identity == variant_identity)
        {
            Some(stored) => {
                stored.parent = parent.map(str::to_string);
                true
            }
            None => false,
        }
    }

    pub fn remove(&self, variant_identity: &str) -> Option<Node> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let position = state
            .nodes
            .iter()
            .position(|stored| stored.node.variant_identity == variant_identity)?;
        Some(state.nodes.remove(position).node)
    }

    pub fn view(
        &self,
        workspace: &str,
        dimensions: Option<&DimensionCombination>,
    ) -> MemoryNodeView {
        let chain = self
            .state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .workspace_chain(workspace);
        MemoryNodeView {
            state: Arc::clone(&self.state),
            workspace_chain: chain,
            dimensions: dimensions.cloned(),
        }
    }
}

impl ContextFactory for MemoryContentRepository {
    fn create(
        &self,
        workspace: &str,
        dimensions: Option<&DimensionCombination>,
    ) -> Arc<dyn NodeView> {
        Arc::new(self.view(workspace, dimensions))
    }
}

/// Nodes of one workspace chain, optionally narrowed to one dimension
/// combination.
#[derive(Debug, Clone)]
pub struct MemoryNodeView {
    state: Arc<RwLock<RepositoryState>>,
    workspace_chain: Vec<String>,
    dimensions: Option<DimensionCombination>,
}

impl MemoryNodeView {
    fn matches_dimensions(&self, node: &Node) -> bool {
        match &self.dimensions {
            Some(dimensions) => &node.dimensions == dimensions,
            None => true,
        }
    }

    fn find(&self, state: &RepositoryState, identity: &str) -> Option<Node> {
        self.workspace_chain.iter().find_map(|workspace| {
            state
                .nodes
                .iter()
                .find(|stored| {
                    stored.node.identity == identity
                        && &stored.node.workspace == workspace
                        && self.matches_dimensions(&stored.node)
                })
                .map(|stored| stored.node.clone())
        })
    }
}

impl NodeView for MemoryNodeView {
    fn node_by_identifier(&self, identity: &str) -> Option<Node> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        self.find(&state, identity)
    }

    fn parent(&self, node: &Node) -> Option<Node> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        let parent_identity = state
            .nodes
            .iter()
            .find(|stored| stored.node.variant_identity == node.variant_identity)?
            .parent
            .clone()?;
        self.find(&state, &parent_identity)
    }
}
