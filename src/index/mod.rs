//! Index storage: the flat records the engine keeps in sync with the tree.
//!
//! Two backends are provided: [`memory::MemoryIndex`] for embedding and
//! tests, and [`sqlite::SqliteIndex`] which persists entries with `sqlx`.

pub mod memory;
pub mod sqlite;

use crate::content::Node;
use crate::error::Result;
use crate::indexer::membership::WorkspaceMembership;
use async_trait::async_trait;
use std::collections::BTreeMap;

pub use memory::MemoryIndex;
pub use sqlite::SqliteIndex;

/// Extracted fulltext of one node, keyed by bucket (`h1`..`h6`, `text`).
pub type FulltextFragments = BTreeMap<String, String>;

/// Stored record for one node variant.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub variant_identity: String,
    pub node_identity: String,
    pub dimensions_hash: String,
    pub node_type: String,
    /// Workspace that owned the variant when it was last written.
    pub owner_workspace: String,
    pub properties: serde_json::Map<String, serde_json::Value>,
    pub workspace_membership: WorkspaceMembership,
}

impl IndexEntry {
    /// Empty entry for `node` with no properties and no membership.
    pub fn for_node(node: &Node) -> Self {
        Self {
            variant_identity: node.variant_identity.clone(),
            node_identity: node.identity.clone(),
            dimensions_hash: node.dimensions_hash(),
            node_type: node.node_type.clone(),
            owner_workspace: node.workspace.clone(),
            properties: serde_json::Map::new(),
            workspace_membership: WorkspaceMembership::new(),
        }
    }
}

/// Fulltext aggregated into one entry, one contribution per source variant.
///
/// Keying by source keeps the buffer stable when a descendant is indexed
/// again: its new fragments replace the old ones.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FulltextBuffer {
    contributions: BTreeMap<String, FulltextFragments>,
}

impl FulltextBuffer {
    pub fn insert(&mut self, source: impl Into<String>, fragments: FulltextFragments) {
        self.contributions.insert(source.into(), fragments);
    }

    /// Append text to one bucket of a source's contribution.
    pub fn push_fragment(&mut self, source: &str, bucket: &str, text: &str) {
        let contribution = self.contributions.entry(source.to_string()).or_default();
        let content = contribution.entry(bucket.to_string()).or_default();
        if !content.is_empty() {
            content.push(' ');
        }
        content.push_str(text);
    }

    pub fn contribution(&self, source: &str) -> Option<&FulltextFragments> {
        self.contributions.get(source)
    }

    pub fn sources(&self) -> impl Iterator<Item = &str> {
        self.contributions.keys().map(String::as_str)
    }

    /// All text of one bucket across contributions.
    pub fn bucket(&self, bucket: &str) -> String {
        self.contributions
            .values()
            .filter_map(|fragments| fragments.get(bucket))
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// All text in the buffer.
    pub fn text(&self) -> String {
        self.contributions
            .values()
            .flat_map(|fragments| fragments.values())
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.contributions
            .values()
            .flat_map(|fragments| fragments.values())
            .any(|content| content.contains(needle))
    }

    pub fn is_empty(&self) -> bool {
        self.contributions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.contributions.len()
    }
}

/// Storage backend the engine writes to.
///
/// Calls are expected to be bounded; the engine does not retry or time them
/// out.
#[async_trait]
pub trait IndexClient: Send + Sync {
    /// Every entry of every variant of a node.
    async fn find_by_node_identity(&self, node_identity: &str) -> Result<Vec<IndexEntry>>;

    async fn find_one_by_variant_identity(
        &self,
        variant_identity: &str,
    ) -> Result<Option<IndexEntry>>;

    /// Insert or replace an entry. The fulltext buffer of the entry is left
    /// untouched.
    async fn upsert(&self, entry: &IndexEntry) -> Result<()>;

    /// Delete an entry together with its fulltext buffer and whatever it
    /// contributed to other buffers.
    async fn delete(&self, variant_identity: &str) -> Result<()>;

    /// Record `fragments` as the contribution of `source` to the buffer of
    /// `target`. A variant contributes to at most one buffer, so any earlier
    /// contribution of `source` is replaced.
    async fn append_fulltext(
        &self,
        target: &str,
        source: &str,
        fragments: &FulltextFragments,
    ) -> Result<()>;

    /// Drop every contribution of `source`.
    async fn withdraw_fulltext(&self, source: &str) -> Result<()>;

    /// Accumulated fulltext buffer of an entry.
    async fn fulltext(&self, variant_identity: &str) -> Result<FulltextBuffer>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_joins_contributions() {
        let mut buffer = FulltextBuffer::default();
        buffer.insert(
            "paragraph",
            FulltextFragments::from([("text".to_string(), "hello world".to_string())]),
        );
        buffer.push_fragment("headline", "h1", "Welcome");
        buffer.push_fragment("headline", "h1", "home");

        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.bucket("h1"), "Welcome home");
        assert_eq!(buffer.text(), "Welcome home hello world");
        assert!(buffer.contains("hello world"));
        assert!(!buffer.contains("goodbye"));
        assert_eq!(buffer.sources().collect::<Vec<_>>(), ["headline", "paragraph"]);
    }

    #[test]
    fn test_entry_for_node_copies_identity() {
        let node = Node::new("node-1", "variant-1", "Acme:Text", "live");
        let entry = IndexEntry::for_node(&node);

        assert_eq!(entry.node_identity, "node-1");
        assert_eq!(entry.variant_identity, "variant-1");
        assert_eq!(entry.owner_workspace, "live");
        assert_eq!(entry.dimensions_hash, node.dimensions_hash());
        assert!(entry.workspace_membership.is_empty());
    }
}
