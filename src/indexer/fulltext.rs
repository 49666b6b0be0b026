//! Finds the fulltext root a node's text aggregates into.

use crate::content::{Node, NodeView};
use crate::error::{Result, TreeError};
use crate::node_types::FulltextRootTypes;
use std::sync::Arc;

/// Walks parent links to the nearest ancestor of a fulltext root type.
pub struct FulltextRootResolver {
    root_types: Arc<FulltextRootTypes>,
    max_depth: usize,
}

impl FulltextRootResolver {
    pub fn new(root_types: Arc<FulltextRootTypes>, max_depth: usize) -> Self {
        Self {
            root_types,
            max_depth,
        }
    }

    /// Nearest strict ancestor of `node` whose type is a fulltext root.
    ///
    /// Roots do not aggregate into anything, so a node of a root type
    /// resolves to `None`, as does a node without a root above it. Visiting
    /// more than `max_depth` ancestors means the parent links loop, and fails
    /// with [`TreeError::MalformedTree`].
    pub fn resolve(&self, view: &dyn NodeView, node: &Node) -> Result<Option<Node>> {
        if self.root_types.contains(&node.node_type) {
            return Ok(None);
        }

        let mut visited = 0;
        let mut current = view.parent(node);
        while let Some(ancestor) = current {
            visited += 1;
            if visited > self.max_depth {
                return Err(TreeError::MalformedTree {
                    identity: node.identity.clone(),
                    max_depth: self.max_depth,
                }
                .into());
            }
            if self.root_types.contains(&ancestor.node_type) {
                return Ok(Some(ancestor));
            }
            current = view.parent(&ancestor);
        }

        Ok(None)
    }
}
