//! Keeps a flat search index in sync with a hierarchical, multi-workspace,
//! multi-dimension content tree.
//!
//! Each node variant becomes one index entry carrying the set of workspaces
//! that currently see it. Text of descendants is aggregated into their nearest
//! fulltext root, and a node can be re-indexed under every configured
//! dimension combination at once.

pub mod config;
pub mod content;
pub mod dimensions;
pub mod error;
pub mod index;
pub mod indexer;
pub mod node_types;
pub mod telemetry;

use std::sync::Arc;

pub use config::IndexerConfig;
pub use content::{ContextFactory, MemoryContentRepository, Node, NodeView};
pub use dimensions::{DimensionAxis, DimensionCombination, DimensionPresetSource};
pub use error::{Error, Result};
pub use index::{IndexClient, IndexEntry, MemoryIndex, SqliteIndex};
pub use indexer::{IndexStats, IndexerDeps, NodeIndexer, WorkspaceMarker, WorkspaceMembership};
pub use node_types::NodeTypeRegistry;

/// Build an indexer backed by the configured SQLite index.
///
/// Node types come from `node_types_path` when set; without it every node is
/// stored with all properties and no fulltext roots exist.
pub async fn initialize_indexer(
    config: &IndexerConfig,
    contexts: Arc<dyn ContextFactory>,
) -> Result<NodeIndexer> {
    let node_types = match &config.node_types_path {
        Some(path) => NodeTypeRegistry::load(path)?,
        None => NodeTypeRegistry::from_definitions(Vec::new())?,
    };
    let dimensions = config.preset_source()?;
    let index = SqliteIndex::connect(&config.index.database_url).await?;

    tracing::info!(
        database_url = %config.index.database_url,
        node_types = node_types.len(),
        dimensions = config.dimensions.len(),
        "node indexer initialized"
    );

    let deps = IndexerDeps::from_registry(
        Arc::new(index),
        contexts,
        Arc::new(node_types),
        Arc::new(dimensions),
    );
    Ok(NodeIndexer::new(deps, config.indexer.clone()))
}
