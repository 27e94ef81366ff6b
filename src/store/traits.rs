use crate::model::{Branch, Id, QueryParams, Timestamp};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// One row returned by the graph store driver. Entities expose their
/// properties by name plus the store-side element identifier.
#[derive(Debug, Clone, Default)]
pub struct QueryRow {
    values: HashMap<String, Value>,
    pub element_id: Option<String>,
}

impl QueryRow {
    pub fn new(element_id: Option<String>) -> Self {
        Self {
            values: HashMap::new(),
            element_id,
        }
    }

    pub fn insert(&mut self, property: &str, value: Value) {
        self.values.insert(property.to_string(), value);
    }

    pub fn get(&self, property: &str) -> Option<&Value> {
        self.values.get(property)
    }
}

/// Raw driver interface: a parameterized query template, executed and
/// returned in full. No cursor or streaming semantics.
#[async_trait::async_trait]
pub trait GraphStore: Send + Sync {
    async fn execute(&self, query: &str, params: &QueryParams) -> Result<Vec<QueryRow>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeStatus {
    Active,
    Deleted,
}

/// Conflict marker written by merge-conflict resolution: a dropped edge
/// loses on rebase no matter what its interval says.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeConflict {
    Drop,
}

/// The visibility tuple every versioned edge carries. `to = None` means
/// the edge is still active; a closed edge is only visible when the query
/// window intersects `[from, to]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub element_id: Id,
    pub branch: String,
    pub from: Timestamp,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<Timestamp>,
    pub status: EdgeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conflict: Option<EdgeConflict>,
}

#[async_trait::async_trait]
pub trait BranchStore: Send + Sync {
    async fn get_branch(&self, name: &str) -> Result<Option<Branch>>;
    async fn list_branches(&self) -> Result<Vec<Branch>>;
    async fn upsert_branch(&self, branch: Branch) -> Result<()>;
    async fn delete_branch(&self, name: &str) -> Result<bool>;
}

/// Edge batches produced by rebase classification.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RebaseActions {
    /// Edges whose interval stays valid: `from` advances to the rebase
    /// point and `to` reopens
    pub extend: Vec<Id>,
    /// Edges superseded by the fresh view of the origin
    pub delete: Vec<Id>,
}

/// Peer tuple returned by the bulk relationship lookup used during delete
/// resolution. Rows are normalized so `source_id` is always the queried
/// node: implementations synthesize a reversed copy for edges stored in
/// the opposite direction.
#[derive(Debug, Clone, PartialEq)]
pub struct PeerRelationship {
    pub rel_identifier: String,
    pub source_id: Id,
    pub source_kind: String,
    pub peer_id: Id,
    pub peer_kind: String,
}

#[async_trait::async_trait]
pub trait EdgeStore: Send + Sync {
    /// Every versioned edge tagged with the given branch name.
    async fn list_edges_for_branch(&self, branch: &str) -> Result<Vec<EdgeRecord>>;

    /// Apply both rebase batches. The whole set must be applied atomically
    /// from the caller's perspective: readers never observe a state where
    /// only part of the classification landed.
    async fn apply_rebase(
        &self,
        branch: &str,
        actions: &RebaseActions,
        at: &Timestamp,
    ) -> Result<()>;

    /// Bulk peer lookup across both edge directions, restricted to the
    /// given relationship identifiers.
    async fn get_peer_relationships(
        &self,
        branch: &str,
        node_id: &Id,
        identifiers: &[String],
        at: &Timestamp,
    ) -> Result<Vec<PeerRelationship>>;

    /// Visibility-aware point lookup of an attribute value, following the
    /// branch's branch/time scoping rules.
    async fn resolve_attribute(
        &self,
        branch: &Branch,
        at: &Timestamp,
        node_id: &Id,
        attribute: &str,
    ) -> Result<Option<Value>>;
}

pub trait Store: GraphStore + BranchStore + EdgeStore {}
impl<T: GraphStore + BranchStore + EdgeStore> Store for T {}
