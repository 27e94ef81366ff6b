use crate::config::GLOBAL_BRANCH_NAME;
use crate::model::{generate_id, Branch, Id, QueryParams, Timestamp};
use crate::store::traits::{
    BranchStore, EdgeConflict, EdgeRecord, EdgeStatus, EdgeStore, GraphStore,
    PeerRelationship, QueryRow, RebaseActions,
};
use anyhow::{anyhow, Result};
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// A node as the graph store sees it: identity plus kind.
#[derive(Debug, Clone)]
pub struct StoredNode {
    pub id: Id,
    pub kind: String,
}

/// A relationship instance between two nodes, tagged with the branch it
/// was created on.
#[derive(Debug, Clone)]
pub struct StoredRelationship {
    pub identifier: String,
    pub source_id: Id,
    pub source_kind: String,
    pub peer_id: Id,
    pub peer_kind: String,
    pub branch: String,
}

/// One versioned attribute-value edge.
#[derive(Debug, Clone)]
pub struct AttributeEdge {
    pub edge: EdgeRecord,
    pub node_id: Id,
    pub attribute: String,
    pub value: Value,
}

/// In-memory store implementing the full `Store` surface with real edge
/// visibility semantics. This is the crate's test vehicle and serves
/// embedders that do not run a graph server; it intentionally has no
/// query-language frontend.
#[derive(Debug, Default)]
pub struct MemoryStore {
    branches: RwLock<HashMap<String, Branch>>,
    nodes: RwLock<HashMap<Id, StoredNode>>,
    relationships: RwLock<Vec<StoredRelationship>>,
    attribute_edges: RwLock<Vec<AttributeEdge>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_node(&self, id: &str, kind: &str) {
        self.nodes.write().await.insert(
            id.to_string(),
            StoredNode {
                id: id.to_string(),
                kind: kind.to_string(),
            },
        );
    }

    pub async fn add_relationship(
        &self,
        identifier: &str,
        source_id: &str,
        source_kind: &str,
        peer_id: &str,
        peer_kind: &str,
        branch: &str,
    ) {
        self.relationships.write().await.push(StoredRelationship {
            identifier: identifier.to_string(),
            source_id: source_id.to_string(),
            source_kind: source_kind.to_string(),
            peer_id: peer_id.to_string(),
            peer_kind: peer_kind.to_string(),
            branch: branch.to_string(),
        });
    }

    /// Write an attribute value the way a graph mutation would: the open
    /// edge on the same branch is closed at `at` and a fresh open edge
    /// starts there. Returns the new edge's element id.
    pub async fn set_attribute(
        &self,
        node_id: &str,
        attribute: &str,
        value: Value,
        branch: &str,
        at: &Timestamp,
    ) -> Id {
        let mut edges = self.attribute_edges.write().await;
        for entry in edges.iter_mut() {
            if entry.node_id == node_id
                && entry.attribute == attribute
                && entry.edge.branch == branch
                && entry.edge.to.is_none()
            {
                entry.edge.to = Some(*at);
            }
        }
        let element_id = generate_id();
        edges.push(AttributeEdge {
            edge: EdgeRecord {
                element_id: element_id.clone(),
                branch: branch.to_string(),
                from: *at,
                to: None,
                status: EdgeStatus::Active,
                conflict: None,
            },
            node_id: node_id.to_string(),
            attribute: attribute.to_string(),
            value,
        });
        element_id
    }

    /// Flag an existing edge as a dropped conflict loser.
    pub async fn mark_conflict_drop(&self, element_id: &str) {
        let mut edges = self.attribute_edges.write().await;
        for entry in edges.iter_mut() {
            if entry.edge.element_id == element_id {
                entry.edge.conflict = Some(EdgeConflict::Drop);
            }
        }
    }

    pub async fn edge_count(&self) -> usize {
        self.attribute_edges.read().await.len()
    }
}

#[async_trait::async_trait]
impl GraphStore for MemoryStore {
    async fn execute(&self, query: &str, _params: &QueryParams) -> Result<Vec<QueryRow>> {
        Err(anyhow!(
            "the in-memory store has no query-language frontend (query: {})",
            query.lines().next().unwrap_or_default()
        ))
    }
}

#[async_trait::async_trait]
impl BranchStore for MemoryStore {
    async fn get_branch(&self, name: &str) -> Result<Option<Branch>> {
        Ok(self.branches.read().await.get(name).cloned())
    }

    async fn list_branches(&self) -> Result<Vec<Branch>> {
        Ok(self.branches.read().await.values().cloned().collect())
    }

    async fn upsert_branch(&self, branch: Branch) -> Result<()> {
        self.branches
            .write()
            .await
            .insert(branch.name.clone(), branch);
        Ok(())
    }

    async fn delete_branch(&self, name: &str) -> Result<bool> {
        Ok(self.branches.write().await.remove(name).is_some())
    }
}

#[async_trait::async_trait]
impl EdgeStore for MemoryStore {
    async fn list_edges_for_branch(&self, branch: &str) -> Result<Vec<EdgeRecord>> {
        Ok(self
            .attribute_edges
            .read()
            .await
            .iter()
            .filter(|e| e.edge.branch == branch)
            .map(|e| e.edge.clone())
            .collect())
    }

    async fn apply_rebase(
        &self,
        branch: &str,
        actions: &RebaseActions,
        at: &Timestamp,
    ) -> Result<()> {
        // single write lock: both batches land or neither is visible
        let mut edges = self.attribute_edges.write().await;
        for entry in edges.iter_mut() {
            if entry.edge.branch != branch {
                continue;
            }
            if actions.extend.contains(&entry.edge.element_id) {
                entry.edge.from = *at;
                entry.edge.to = None;
            }
        }
        edges.retain(|e| e.edge.branch != branch || !actions.delete.contains(&e.edge.element_id));
        Ok(())
    }

    async fn get_peer_relationships(
        &self,
        branch: &str,
        node_id: &Id,
        identifiers: &[String],
        _at: &Timestamp,
    ) -> Result<Vec<PeerRelationship>> {
        // edges on the origin are visible from its forks
        let origin = self
            .branches
            .read()
            .await
            .get(branch)
            .map(|b| b.origin_branch.clone());
        let relationships = self.relationships.read().await;
        let mut rows = Vec::new();
        for rel in relationships.iter() {
            if !identifiers.contains(&rel.identifier) {
                continue;
            }
            let visible = rel.branch == branch
                || rel.branch == GLOBAL_BRANCH_NAME
                || origin.as_deref() == Some(rel.branch.as_str());
            if !visible {
                continue;
            }
            if &rel.source_id == node_id {
                rows.push(PeerRelationship {
                    rel_identifier: rel.identifier.clone(),
                    source_id: rel.source_id.clone(),
                    source_kind: rel.source_kind.clone(),
                    peer_id: rel.peer_id.clone(),
                    peer_kind: rel.peer_kind.clone(),
                });
            } else if &rel.peer_id == node_id {
                // reversed copy so the caller always sees itself as source
                rows.push(PeerRelationship {
                    rel_identifier: rel.identifier.clone(),
                    source_id: rel.peer_id.clone(),
                    source_kind: rel.peer_kind.clone(),
                    peer_id: rel.source_id.clone(),
                    peer_kind: rel.source_kind.clone(),
                });
            }
        }
        Ok(rows)
    }

    async fn resolve_attribute(
        &self,
        branch: &Branch,
        at: &Timestamp,
        node_id: &Id,
        attribute: &str,
    ) -> Result<Option<Value>> {
        let scope = branch.get_branches_and_times_to_query(at);
        let edges = self.attribute_edges.read().await;

        let mut best: Option<(&AttributeEdge, bool)> = None;
        for entry in edges.iter() {
            if &entry.node_id != node_id || entry.attribute != attribute {
                continue;
            }
            for (branches, time) in &scope {
                if !branches.contains(&entry.edge.branch) {
                    continue;
                }
                let visible = entry.edge.from <= *time
                    && entry.edge.to.map(|to| to >= *time).unwrap_or(true);
                if !visible {
                    continue;
                }
                let own_branch = entry.edge.branch == branch.name && !branch.is_default;
                let wins = match &best {
                    None => true,
                    // the branch's own edits shadow the origin's; within
                    // one branch the latest value wins
                    Some((current, current_own)) => match (own_branch, *current_own) {
                        (true, false) => true,
                        (false, true) => false,
                        _ => entry.edge.from > current.edge.from,
                    },
                };
                if wins {
                    best = Some((entry, own_branch));
                }
            }
        }
        Ok(best.map(|(entry, _)| entry.value.clone()))
    }
}
