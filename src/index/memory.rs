//! Index backend held entirely in memory.

use crate::error::{IndexError, Result};
use crate::index::{FulltextBuffer, FulltextFragments, IndexClient, IndexEntry};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct MemoryState {
    entries: BTreeMap<String, IndexEntry>,
    fulltext: BTreeMap<String, FulltextBuffer>,
}

impl MemoryState {
    fn withdraw(&mut self, source: &str) {
        for buffer in self.fulltext.values_mut() {
            buffer.contributions.remove(source);
        }
        self.fulltext.retain(|_, buffer| !buffer.is_empty());
    }
}

/// In-memory index; clones share the same storage.
#[derive(Debug, Clone, Default)]
pub struct MemoryIndex {
    state: Arc<RwLock<MemoryState>>,
    closed: Arc<AtomicBool>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every following call with [`IndexError::Unavailable`].
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.entries.is_empty()
    }

    /// Snapshot of all entries ordered by variant identity.
    pub async fn entries(&self) -> Vec<IndexEntry> {
        self.state.read().await.entries.values().cloned().collect()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(IndexError::Unavailable("memory index is closed".into()).into());
        }
        Ok(())
    }
}

#[async_trait]
impl IndexClient for MemoryIndex {
    async fn find_by_node_identity(&self, node_identity: &str) -> Result<Vec<IndexEntry>> {
        self.ensure_open()?;
        let state = self.state.read().await;
        Ok(state
            .entries
            .values()
            .filter(|entry| entry.node_identity == node_identity)
            .cloned()
            .collect())
    }

    async fn find_one_by_variant_identity(
        &self,
        variant_identity: &str,
    ) -> Result<Option<IndexEntry>> {
        self.ensure_open()?;
        Ok(self.state.read().await.entries.get(variant_identity).cloned())
    }

    async fn upsert(&self, entry: &IndexEntry) -> Result<()> {
        self.ensure_open()?;
        self.state
            .write()
            .await
            .entries
            .insert(entry.variant_identity.clone(), entry.clone());
        Ok(())
    }

    async fn delete(&self, variant_identity: &str) -> Result<()> {
        self.ensure_open()?;
        let mut state = self.state.write().await;
        state.entries.remove(variant_identity);
        state.fulltext.remove(variant_identity);
        state.withdraw(variant_identity);
        Ok(())
    }

    async fn append_fulltext(
        &self,
        target: &str,
        source: &str,
        fragments: &FulltextFragments,
    ) -> Result<()> {
        self.ensure_open()?;
        let mut state = self.state.write().await;
        state.withdraw(source);
        state
            .fulltext
            .entry(target.to_string())
            .or_default()
            .insert(source, fragments.clone());
        Ok(())
    }

    async fn withdraw_fulltext(&self, source: &str) -> Result<()> {
        self.ensure_open()?;
        self.state.write().await.withdraw(source);
        Ok(())
    }

    async fn fulltext(&self, variant_identity: &str) -> Result<FulltextBuffer> {
        self.ensure_open()?;
        Ok(self
            .state
            .read()
            .await
            .fulltext
            .get(variant_identity)
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::Node;

    fn fragments(text: &str) -> FulltextFragments {
        FulltextFragments::from([("text".to_string(), text.to_string())])
    }

    #[tokio::test]
    async fn test_upsert_replaces_entry_by_variant() {
        let index = MemoryIndex::new();
        let node = Node::new("node-1", "v1", "Acme:Text", "live");
        let mut entry = IndexEntry::for_node(&node);
        index.upsert(&entry).await.unwrap();

        entry.node_type = "Acme:Headline".into();
        index.upsert(&entry).await.unwrap();

        assert_eq!(index.len().await, 1);
        let stored = index.find_one_by_variant_identity("v1").await.unwrap().unwrap();
        assert_eq!(stored.node_type, "Acme:Headline");
        assert_eq!(index.find_by_node_identity("node-1").await.unwrap().len(), 1);
        assert!(index.find_by_node_identity("node-2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_contributions_move_with_their_source() {
        let index = MemoryIndex::new();
        index.append_fulltext("root-a", "paragraph", &fragments("first")).await.unwrap();
        index.append_fulltext("root-a", "paragraph", &fragments("second")).await.unwrap();

        let buffer = index.fulltext("root-a").await.unwrap();
        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.text(), "second");

        index.append_fulltext("root-b", "paragraph", &fragments("third")).await.unwrap();
        assert!(index.fulltext("root-a").await.unwrap().is_empty());
        assert_eq!(index.fulltext("root-b").await.unwrap().text(), "third");

        index.withdraw_fulltext("paragraph").await.unwrap();
        assert!(index.fulltext("root-b").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_drops_buffer_and_contributions() {
        let index = MemoryIndex::new();
        let root = IndexEntry::for_node(&Node::new("root", "root-v", "Acme:Page", "live"));
        index.upsert(&root).await.unwrap();
        index.append_fulltext("root-v", "paragraph", &fragments("hello")).await.unwrap();
        index.append_fulltext("other-root", "root-v", &fragments("nested")).await.unwrap();

        index.delete("root-v").await.unwrap();
        assert!(index.is_empty().await);
        assert!(index.fulltext("root-v").await.unwrap().is_empty());
        assert!(index.fulltext("other-root").await.unwrap().is_empty());

        index.delete("root-v").await.unwrap();
    }

    #[tokio::test]
    async fn test_closed_index_reports_unavailable() {
        let index = MemoryIndex::new();
        index.close();

        let error = index.find_by_node_identity("node-1").await.unwrap_err();
        assert!(error.to_string().contains("unavailable"));
        assert!(index.delete("v1").await.is_err());
    }
}
