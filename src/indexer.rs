//! Node projection pipeline: reconcile membership, extract, aggregate, store.

pub mod extractor;
pub mod fulltext;
pub mod membership;

use crate::config::IndexerSettings;
use crate::content::{ContextFactory, Node, NodeView};
use crate::dimensions::{DimensionCombination, DimensionPresetSource, calculate_dimension_combinations};
use crate::error::Result;
use crate::index::{IndexClient, IndexEntry};
use crate::node_types::{FulltextRootTypes, NodeTypeRegistry};
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

pub use extractor::{ConfiguredExtractor, ExtractedNode, PropertyExtractor};
pub use fulltext::FulltextRootResolver;
pub use membership::{MembershipMerger, ReconcilePlan, WorkspaceMarker, WorkspaceMembership};

/// Collaborators the indexer is assembled from.
#[derive(Clone)]
pub struct IndexerDeps {
    pub index: Arc<dyn IndexClient>,
    pub contexts: Arc<dyn ContextFactory>,
    pub extractor: Arc<dyn PropertyExtractor>,
    pub dimensions: Arc<dyn DimensionPresetSource>,
    pub fulltext_roots: Arc<FulltextRootTypes>,
}

impl IndexerDeps {
    /// Derive extraction and fulltext roots from a node type registry.
    pub fn from_registry(
        index: Arc<dyn IndexClient>,
        contexts: Arc<dyn ContextFactory>,
        node_types: Arc<NodeTypeRegistry>,
        dimensions: Arc<dyn DimensionPresetSource>,
    ) -> Self {
        let fulltext_roots = Arc::new(FulltextRootTypes::from_registry(&node_types));
        Self {
            index,
            contexts,
            extractor: Arc::new(ConfiguredExtractor::new(node_types)),
            dimensions,
            fulltext_roots,
        }
    }
}

/// Statistics from a batch of indexing calls.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexStats {
    pub indexed: usize,
    pub removed: usize,
    /// Nodes not present in a requested context.
    pub skipped: usize,
    /// Nodes whose tree was malformed.
    pub failed: usize,
}

enum Outcome {
    Indexed,
    Removed,
    Skipped,
}

/// Keeps the search index in sync with content nodes.
///
/// Saves and removals of the same node variant are serialized internally, so
/// callers may index concurrently. The fulltext root is resolved on every
/// call, so a re-parented node is picked up without a [`flush`].
///
/// [`flush`]: NodeIndexer::flush
pub struct NodeIndexer {
    deps: IndexerDeps,
    resolver: FulltextRootResolver,
    settings: IndexerSettings,
    variant_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl NodeIndexer {
    pub fn new(deps: IndexerDeps, settings: IndexerSettings) -> Self {
        let resolver =
            FulltextRootResolver::new(deps.fulltext_roots.clone(), settings.max_tree_depth);
        Self {
            deps,
            resolver,
            settings,
            variant_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn index(&self) -> &Arc<dyn IndexClient> {
        &self.deps.index
    }

    /// Project one node variant into the index for a workspace.
    ///
    /// `target_workspace` defaults to the node's own workspace. A removed
    /// node only deletes its entry. Otherwise the workspace marker is moved
    /// off every other entry of the same dimension variant, the node's
    /// fulltext is handed to its fulltext root, and the entry is written with
    /// the marker added to whatever membership it already had.
    pub async fn index_node(
        &self,
        view: &dyn NodeView,
        node: &Node,
        target_workspace: Option<&str>,
    ) -> Result<()> {
        let lock = self.variant_lock(node).await;
        let _guard = lock.lock().await;

        if node.removed {
            self.deps.index.delete(&node.variant_identity).await?;
            tracing::debug!(
                variant_identity = %node.variant_identity,
                "removed node variant from index"
            );
            return Ok(());
        }

        let workspace = target_workspace.unwrap_or(node.workspace.as_str());
        let marker = WorkspaceMarker::new(workspace)?;

        let extracted = self.deps.extractor.extract(node);

        // Resolve before writing anything so a malformed tree leaves the index
        // untouched.
        let fulltext_root = if extracted.fulltext.is_empty() {
            None
        } else {
            self.resolver
                .resolve(view, node)?
                .map(|root| root.variant_identity)
        };

        let index = self.deps.index.as_ref();
        let plan = MembershipMerger::reconcile(index, node, &marker).await?;
        MembershipMerger::apply(index, &plan).await?;

        match &fulltext_root {
            Some(root) => {
                index
                    .append_fulltext(root, &node.variant_identity, &extracted.fulltext)
                    .await?
            }
            None => index.withdraw_fulltext(&node.variant_identity).await?,
        }

        let existing = index
            .find_one_by_variant_identity(&node.variant_identity)
            .await?;
        let mut entry = IndexEntry::for_node(node);
        entry.workspace_membership =
            MembershipMerger::carry_forward(existing.as_ref(), node, &marker);
        entry.properties = extracted.properties;
        index.upsert(&entry).await?;

        tracing::debug!(
            variant_identity = %node.variant_identity,
            workspace,
            membership = %entry.workspace_membership.encode(),
            fulltext_root = fulltext_root.as_deref().unwrap_or("-"),
            deleted = plan.to_delete.len(),
            narrowed = plan.to_update.len(),
            "indexed node"
        );

        Ok(())
    }

    /// Delete the entry of a node variant regardless of its removed flag.
    pub async fn remove_node(&self, node: &Node) -> Result<()> {
        let lock = self.variant_lock(node).await;
        let _guard = lock.lock().await;

        self.deps.index.delete(&node.variant_identity).await?;
        tracing::debug!(variant_identity = %node.variant_identity, "removed node from index");
        Ok(())
    }

    /// Every dimension combination nodes are materialized under.
    pub fn calculate_dimension_combinations(&self) -> Vec<DimensionCombination> {
        calculate_dimension_combinations(&self.deps.dimensions.all_presets())
    }

    /// Index `node_identity` in `workspace` under every dimension combination.
    ///
    /// Combinations where the node does not exist are skipped. Each
    /// combination is a separate variant, so they are indexed concurrently.
    pub async fn reindex_across_dimensions(
        &self,
        node_identity: &str,
        workspace: &str,
    ) -> Result<IndexStats> {
        let combinations = self.calculate_dimension_combinations();
        let views: Vec<Arc<dyn NodeView>> = if combinations.is_empty() {
            vec![self.deps.contexts.create(workspace, None)]
        } else {
            combinations
                .iter()
                .map(|combination| self.deps.contexts.create(workspace, Some(combination)))
                .collect()
        };

        let outcomes: Vec<Result<Outcome>> = futures::stream::iter(views)
            .map(|view| async move {
                match view.node_by_identifier(node_identity) {
                    Some(node) => self.index_in_view(view.as_ref(), &node, Some(workspace)).await,
                    None => Ok(Outcome::Skipped),
                }
            })
            .buffer_unordered(self.settings.reindex_concurrency.max(1))
            .collect()
            .await;

        let mut stats = IndexStats::default();
        for outcome in outcomes {
            self.record(&mut stats, node_identity, outcome)?;
        }

        tracing::debug!(
            node_identity,
            workspace,
            combinations = combinations.len(),
            indexed = stats.indexed,
            skipped = stats.skipped,
            "re-indexed node across dimensions"
        );
        Ok(stats)
    }

    /// Index a batch of nodes seen through one view.
    ///
    /// A node with malformed ancestry is logged and counted as failed; the
    /// rest of the batch continues. Backend errors abort the batch.
    pub async fn index_nodes(
        &self,
        view: &dyn NodeView,
        nodes: &[Node],
        target_workspace: Option<&str>,
    ) -> Result<IndexStats> {
        let mut stats = IndexStats::default();
        for node in nodes {
            let outcome = self.index_in_view(view, node, target_workspace).await;
            self.record(&mut stats, &node.identity, outcome)?;
        }

        tracing::info!(
            indexed = stats.indexed,
            removed = stats.removed,
            failed = stats.failed,
            total = nodes.len(),
            "node batch indexing complete"
        );
        Ok(stats)
    }

    /// Release per-variant locks no call is holding. Index contents are
    /// untouched.
    pub async fn flush(&self) {
        let mut locks = self.variant_locks.lock().await;
        let before = locks.len();
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);

        tracing::trace!(
            released = before - locks.len(),
            held = locks.len(),
            "flushed indexer locks"
        );
    }

    async fn index_in_view(
        &self,
        view: &dyn NodeView,
        node: &Node,
        target_workspace: Option<&str>,
    ) -> Result<Outcome> {
        self.index_node(view, node, target_workspace).await?;
        Ok(if node.removed {
            Outcome::Removed
        } else {
            Outcome::Indexed
        })
    }

    fn record(
        &self,
        stats: &mut IndexStats,
        node_identity: &str,
        outcome: Result<Outcome>,
    ) -> Result<()> {
        match outcome {
            Ok(Outcome::Indexed) => stats.indexed += 1,
            Ok(Outcome::Removed) => stats.removed += 1,
            Ok(Outcome::Skipped) => stats.skipped += 1,
            Err(error) if error.is_node_local() => {
                tracing::warn!(node_identity, %error, "failed to index node");
                stats.failed += 1;
            }
            Err(error) => return Err(error),
        }
        Ok(())
    }

    async fn variant_lock(&self, node: &Node) -> Arc<Mutex<()>> {
        let key = format!("{}:{}", node.identity, node.dimensions_hash());
        let mut locks = self.variant_locks.lock().await;
        Arc::clone(locks.entry(key).or_default())
    }
}
