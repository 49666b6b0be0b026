//! Workspace membership of index entries.
//!
//! Every entry records the workspaces it is visible in. Backends that only
//! store scalar text keep the set as delimited markers (`#live#, #user-anna#`);
//! membership checks always compare whole markers, so `de` never matches
//! `de-extended`.

use crate::content::Node;
use crate::error::{Result, TreeError};
use crate::index::{IndexClient, IndexEntry};
use std::fmt;

/// Character wrapped around a workspace name in the encoded field.
pub const MARKER_DELIMITER: char = '#';
/// Separator between markers in the encoded field.
pub const MARKER_SEPARATOR: &str = ", ";

/// A validated workspace name as stored in a membership set.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkspaceMarker(String);

impl WorkspaceMarker {
    pub fn new(workspace: &str) -> Result<Self> {
        let reason = if workspace.is_empty() {
            Some("name is empty")
        } else if workspace.contains(MARKER_DELIMITER) {
            Some("name contains the marker delimiter")
        } else if workspace.contains(',') {
            Some("name contains the marker separator")
        } else if workspace.trim() != workspace {
            Some("name has surrounding whitespace")
        } else {
            None
        };

        match reason {
            Some(reason) => Err(TreeError::InvalidWorkspaceName {
                name: workspace.to_string(),
                reason,
            }
            .into()),
            None => Ok(Self(workspace.to_string())),
        }
    }

    pub fn workspace(&self) -> &str {
        &self.0
    }

    /// Parse one encoded marker such as `#live#`.
    fn parse_token(token: &str) -> Result<Self> {
        token
            .strip_prefix(MARKER_DELIMITER)
            .and_then(|rest| rest.strip_suffix(MARKER_DELIMITER))
            .ok_or_else(|| {
                TreeError::InvalidWorkspaceName {
                    name: token.to_string(),
                    reason: "marker is not delimited",
                }
                .into()
            })
            .and_then(Self::new)
    }
}

impl fmt::Display for WorkspaceMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{MARKER_DELIMITER}{}{MARKER_DELIMITER}", self.0)
    }
}

/// Ordered, duplicate-free set of workspace markers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkspaceMembership {
    markers: Vec<WorkspaceMarker>,
}

impl WorkspaceMembership {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, marker: &WorkspaceMarker) -> bool {
        self.markers.contains(marker)
    }

    /// Add `marker` at the end unless it is already present.
    pub fn insert(&mut self, marker: WorkspaceMarker) -> bool {
        if self.contains(&marker) {
            return false;
        }
        self.markers.push(marker);
        true
    }

    pub fn remove(&mut self, marker: &WorkspaceMarker) -> bool {
        let before = self.markers.len();
        self.markers.retain(|existing| existing != marker);
        self.markers.len() != before
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn workspaces(&self) -> impl Iterator<Item = &str> {
        self.markers.iter().map(WorkspaceMarker::workspace)
    }

    /// Render the set as a delimited text field.
    pub fn encode(&self) -> String {
        self.markers
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(MARKER_SEPARATOR)
    }

    /// Parse a delimited text field. Empty tokens (left behind by older
    /// writers that removed markers by string replacement) are ignored.
    pub fn decode(field: &str) -> Result<Self> {
        let mut membership = Self::new();
        for token in field.split(',').map(str::trim).filter(|token| !token.is_empty()) {
            membership.insert(WorkspaceMarker::parse_token(token)?);
        }
        Ok(membership)
    }
}

impl FromIterator<WorkspaceMarker> for WorkspaceMembership {
    fn from_iter<I: IntoIterator<Item = WorkspaceMarker>>(iter: I) -> Self {
        let mut membership = Self::new();
        for marker in iter {
            membership.insert(marker);
        }
        membership
    }
}

/// Index mutations needed before a node is written for a workspace.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcilePlan {
    /// Variant identities whose membership drained to empty.
    pub to_delete: Vec<String>,
    /// Entries rewritten with the marker removed.
    pub to_update: Vec<IndexEntry>,
}

impl ReconcilePlan {
    pub fn is_empty(&self) -> bool {
        self.to_delete.is_empty() && self.to_update.is_empty()
    }
}

/// Moves workspace markers between the entries of one node.
pub struct MembershipMerger;

impl MembershipMerger {
    /// Plan the removal of `marker` from every other entry of `node`'s
    /// identity that belongs to the same dimension variant.
    ///
    /// A workspace sees exactly one variant of a node per dimension
    /// combination, so before the marker is written to the current variant it
    /// has to leave every other entry. Entries left without any workspace are
    /// orphans and get deleted.
    pub async fn reconcile(
        index: &dyn IndexClient,
        node: &Node,
        marker: &WorkspaceMarker,
    ) -> Result<ReconcilePlan> {
        let dimensions_hash = node.dimensions_hash();
        let mut plan = ReconcilePlan::default();

        for mut entry in index.find_by_node_identity(&node.identity).await? {
            if entry.variant_identity == node.variant_identity
                || entry.dimensions_hash != dimensions_hash
            {
                continue;
            }
            if !entry.workspace_membership.remove(marker) {
                continue;
            }

            if entry.workspace_membership.is_empty() {
                plan.to_delete.push(entry.variant_identity);
            } else {
                plan.to_update.push(entry);
            }
        }

        Ok(plan)
    }

    pub async fn apply(index: &dyn IndexClient, plan: &ReconcilePlan) -> Result<()> {
        for variant_identity in &plan.to_delete {
            index.delete(variant_identity).await?;
            tracing::debug!(%variant_identity, "deleted orphaned index entry");
        }
        for entry in &plan.to_update {
            index.upsert(entry).await?;
            tracing::trace!(
                variant_identity = %entry.variant_identity,
                membership = %entry.workspace_membership.encode(),
                "narrowed workspace membership"
            );
        }
        Ok(())
    }

    /// Membership for the entry about to be written for `node`.
    ///
    /// Workspaces already recorded on the existing entry are kept and
    /// `marker` is added. If the variant changed its owning workspace since
    /// it was last written, the previous owner no longer holds it and its
    /// marker is dropped.
    pub fn carry_forward(
        existing: Option<&IndexEntry>,
        node: &Node,
        marker: &WorkspaceMarker,
    ) -> WorkspaceMembership {
        let mut membership = match existing {
            Some(entry) => {
                let mut membership = entry.workspace_membership.clone();
                if entry.owner_workspace != node.workspace {
                    if let Ok(previous_owner) = WorkspaceMarker::new(&entry.owner_workspace) {
                        membership.remove(&previous_owner);
                    }
                }
                membership
            }
            None => WorkspaceMembership::new(),
        };
        membership.insert(marker.clone());
        membership
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::memory::MemoryIndex;

    fn marker(workspace: &str) -> WorkspaceMarker {
        WorkspaceMarker::new(workspace).unwrap()
    }

    fn entry(variant: &str, workspaces: &[&str]) -> IndexEntry {
        let node = Node::new("node-1", variant, "Acme:Text", "live");
        let mut entry = IndexEntry::for_node(&node);
        entry.workspace_membership = workspaces.iter().map(|ws| marker(ws)).collect();
        entry
    }

    #[test]
    fn test_membership_is_exact_token() {
        let membership: WorkspaceMembership = [marker("de-extended")].into_iter().collect();
        assert!(!membership.contains(&marker("de")));
        assert!(membership.contains(&marker("de-extended")));

        let decoded = WorkspaceMembership::decode("#de-extended#").unwrap();
        assert!(!decoded.contains(&marker("de")));
        assert!(!decoded.contains(&marker("extended")));
    }

    #[test]
    fn test_encode_decode_field() {
        let mut membership = WorkspaceMembership::new();
        assert!(membership.insert(marker("live")));
        assert!(membership.insert(marker("user-anna")));
        assert!(!membership.insert(marker("live")));

        assert_eq!(membership.encode(), "#live#, #user-anna#");
        assert_eq!(WorkspaceMembership::decode(&membership.encode()).unwrap(), membership);
    }

    #[test]
    fn test_decode_tolerates_empty_tokens() {
        let decoded = WorkspaceMembership::decode(", #live#, , #user-anna#, ").unwrap();
        assert_eq!(decoded.workspaces().collect::<Vec<_>>(), ["live", "user-anna"]);
        assert!(WorkspaceMembership::decode("").unwrap().is_empty());
        assert!(WorkspaceMembership::decode("live").is_err());
        assert!(WorkspaceMembership::decode("##").is_err());
    }

    #[test]
    fn test_invalid_workspace_names() {
        assert!(WorkspaceMarker::new("").is_err());
        assert!(WorkspaceMarker::new("a#b").is_err());
        assert!(WorkspaceMarker::new("a,b").is_err());
        assert!(WorkspaceMarker::new(" live").is_err());
        assert_eq!(marker("live").to_string(), "#live#");
    }

    #[test]
    fn test_carry_forward_unions_marker() {
        let node = Node::new("node-1", "v1", "Acme:Text", "live");
        let existing = entry("v1", &["live"]);

        let membership = MembershipMerger::carry_forward(Some(&existing), &node, &marker("user-anna"));
        assert_eq!(membership.workspaces().collect::<Vec<_>>(), ["live", "user-anna"]);

        let fresh = MembershipMerger::carry_forward(None, &node, &marker("live"));
        assert_eq!(fresh.workspaces().collect::<Vec<_>>(), ["live"]);
    }

    #[test]
    fn test_carry_forward_drops_previous_owner() {
        let existing = entry("v1", &["live"]);
        let moved = Node::new("node-1", "v1", "Acme:Text", "user-anna");

        let membership = MembershipMerger::carry_forward(Some(&existing), &moved, &marker("user-anna"));
        assert_eq!(membership.workspaces().collect::<Vec<_>>(), ["user-anna"]);
    }

    #[tokio::test]
    async fn test_reconcile_plans_updates_and_orphans() {
        let index = MemoryIndex::new();
        index.upsert(&entry("v1", &["live", "user-anna"])).await.unwrap();
        index.upsert(&entry("v2", &["user-anna"])).await.unwrap();
        index.upsert(&entry("v3", &["user-bob"])).await.unwrap();

        let node = Node::new("node-1", "v4", "Acme:Text", "user-anna");
        let plan = MembershipMerger::reconcile(&index, &node, &marker("user-anna"))
            .await
            .unwrap();

        assert_eq!(plan.to_delete, vec!["v2".to_string()]);
        assert_eq!(plan.to_update.len(), 1);
        assert_eq!(plan.to_update[0].variant_identity, "v1");
        assert_eq!(plan.to_update[0].workspace_membership.encode(), "#live#");

        MembershipMerger::apply(&index, &plan).await.unwrap();
        assert!(index.find_one_by_variant_identity("v2").await.unwrap().is_none());
        let v1 = index.find_one_by_variant_identity("v1").await.unwrap().unwrap();
        assert_eq!(v1.workspace_membership.encode(), "#live#");
        let v3 = index.find_one_by_variant_identity("v3").await.unwrap().unwrap();
        assert_eq!(v3.workspace_membership.encode(), "#user-bob#");
    }

    #[tokio::test]
    async fn test_reconcile_ignores_other_dimension_variants() {
        let index = MemoryIndex::new();
        let english = Node::new("node-1", "v-en", "Acme:Text", "live").with_dimensions(
            [("language".to_string(), vec!["en".to_string()])].into(),
        );
        let mut english_entry = IndexEntry::for_node(&english);
        english_entry.workspace_membership.insert(marker("live"));
        index.upsert(&english_entry).await.unwrap();

        let german = Node::new("node-1", "v-de", "Acme:Text", "live").with_dimensions(
            [("language".to_string(), vec!["de".to_string()])].into(),
        );
        let plan = MembershipMerger::reconcile(&index, &german, &marker("live"))
            .await
            .unwrap();
        assert!(plan.is_empty());
    }

    #[tokio::test]
    async fn test_reconcile_skips_own_variant() {
        let index = MemoryIndex::new();
        index.upsert(&entry("v1", &["live"])).await.unwrap();

        let node = Node::new("node-1", "v1", "Acme:Text", "live");
        let plan = MembershipMerger::reconcile(&index, &node, &marker("live"))
            .await
            .unwrap();
        assert!(plan.is_empty());
    }
}
