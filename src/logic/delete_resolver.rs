use crate::logic::schema_branch::{SchemaBranch, SchemaBranchError};
use crate::model::{Id, RelationshipDeleteBehavior, Timestamp};
use crate::store::traits::Store;
use anyhow::Result;
use itertools::Itertools;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use thiserror::Error;

/// Why a relationship matters when deleting a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeleteRelationshipType {
    /// Deleting the source also deletes the peer
    Cascade,
    /// Deleting the source leaves the peer with a broken mandatory
    /// relationship
    Dependent,
}

/// A node requested for deletion, or discovered while resolving one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteTarget {
    pub id: Id,
    pub kind: String,
}

impl DeleteTarget {
    pub fn new(id: &str, kind: &str) -> Self {
        Self {
            id: id.to_string(),
            kind: kind.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependentNodeViolation {
    pub kind: String,
    pub id: Id,
    pub relationship: String,
}

impl std::fmt::Display for DependentNodeViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "node {} '{}' depends on a node scheduled for deletion through its mandatory relationship '{}'",
            self.kind, self.id, self.relationship
        )
    }
}

fn format_dependents(violations: &[DependentNodeViolation]) -> String {
    violations.iter().map(ToString::to_string).join("; ")
}

/// Raised once per resolution pass with every violation it found: deleting
/// the requested nodes would orphan all of these.
#[derive(Debug, Error)]
#[error("cannot delete: {} node(s) would be left with broken mandatory relationships: {}", .violations.len(), format_dependents(.violations))]
pub struct DeleteDependencyError {
    pub violations: Vec<DependentNodeViolation>,
}

/// Per-delete index of the relationships that matter:
/// `{node kind → {relationship type → {identifier → peer kind}}}`.
/// Transient; rebuilt from the schema for every delete validation.
#[derive(Debug, Default)]
pub struct NodeDeleteIndex {
    map: HashMap<String, HashMap<DeleteRelationshipType, HashMap<String, String>>>,
}

impl NodeDeleteIndex {
    /// Build the index for a set of seed kinds.
    ///
    /// Cascade entries close over the whole reachable graph (a work queue,
    /// never recursion, so depth stays bounded). Dependent entries are
    /// collected from every kind in the schema: any mandatory relationship
    /// pointing at a kind scheduled for deletion analysis makes its owner
    /// a dependent.
    pub fn build(
        schema: &SchemaBranch,
        seed_kinds: &[String],
    ) -> Result<Self, SchemaBranchError> {
        let mut index = NodeDeleteIndex::default();

        let mut queue: VecDeque<String> = seed_kinds.iter().cloned().collect();
        let mut analyzed: BTreeSet<String> = seed_kinds.iter().cloned().collect();
        while let Some(kind) = queue.pop_front() {
            let object = schema.get_shared(&kind)?;
            for rel in object.relationships() {
                if rel.on_delete != Some(RelationshipDeleteBehavior::Cascade) {
                    continue;
                }
                let Some(identifier) = rel.identifier.clone() else {
                    continue;
                };
                index.add(&kind, DeleteRelationshipType::Cascade, &identifier, &rel.peer);
                if schema.has(&rel.peer) && analyzed.insert(rel.peer.clone()) {
                    queue.push_back(rel.peer.clone());
                }
            }
        }

        for kind in schema.kinds() {
            let object = schema.get_shared(&kind)?;
            for rel in object.relationships() {
                if rel.optional || !analyzed.contains(&rel.peer) {
                    continue;
                }
                let Some(identifier) = rel.identifier.clone() else {
                    continue;
                };
                index.add(&rel.peer, DeleteRelationshipType::Dependent, &identifier, &kind);
            }
        }

        Ok(index)
    }

    fn add(&mut self, kind: &str, rel_type: DeleteRelationshipType, identifier: &str, peer: &str) {
        self.map
            .entry(kind.to_string())
            .or_default()
            .entry(rel_type)
            .or_default()
            .insert(identifier.to_string(), peer.to_string());
    }

    /// Every relationship identifier the index knows about, sorted.
    pub fn identifiers(&self) -> Vec<String> {
        let mut identifiers: Vec<String> = self
            .map
            .values()
            .flat_map(|by_type| by_type.values())
            .flat_map(|by_identifier| by_identifier.keys().cloned())
            .collect();
        identifiers.sort();
        identifiers.dedup();
        identifiers
    }

    /// How an edge with this identifier matters when deleting `kind`.
    pub fn relationship_types(
        &self,
        kind: &str,
        identifier: &str,
    ) -> Vec<DeleteRelationshipType> {
        let mut types = Vec::new();
        if let Some(by_type) = self.map.get(kind) {
            for rel_type in [
                DeleteRelationshipType::Cascade,
                DeleteRelationshipType::Dependent,
            ] {
                if by_type
                    .get(&rel_type)
                    .map(|m| m.contains_key(identifier))
                    .unwrap_or(false)
                {
                    types.push(rel_type);
                }
            }
        }
        types
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

pub struct DeleteDependencyResolver;

impl DeleteDependencyResolver {
    /// Compute the full set of node ids that must be deleted together.
    ///
    /// Explicit work-queue closure over the graph: each popped node joins
    /// the delete set, its peers are fetched in one bulk query across both
    /// edge directions, cascade peers are scheduled, dependent peers are
    /// recorded. After the closure settles, any dependent still outside
    /// the delete set fails the whole request with a composite error.
    pub async fn compute<S: Store>(
        store: &S,
        schema: &SchemaBranch,
        branch: &str,
        at: &Timestamp,
        initial: &[DeleteTarget],
    ) -> Result<HashSet<Id>> {
        let seed_kinds: Vec<String> = initial
            .iter()
            .map(|t| t.kind.clone())
            .unique()
            .collect();
        let index = NodeDeleteIndex::build(schema, &seed_kinds)?;
        let identifiers = index.identifiers();

        let mut to_check: VecDeque<DeleteTarget> = initial.iter().cloned().collect();
        let mut scheduled: HashSet<Id> = initial.iter().map(|t| t.id.clone()).collect();
        let mut to_delete: HashSet<Id> = HashSet::new();
        let mut dependents: HashMap<Id, DependentNodeViolation> = HashMap::new();

        while let Some(target) = to_check.pop_front() {
            to_delete.insert(target.id.clone());
            if identifiers.is_empty() {
                continue;
            }

            let rows = store
                .get_peer_relationships(branch, &target.id, &identifiers, at)
                .await?;
            for row in rows {
                if row.source_id != target.id {
                    continue;
                }
                let types = index.relationship_types(&target.kind, &row.rel_identifier);
                if types.contains(&DeleteRelationshipType::Cascade)
                    && !scheduled.contains(&row.peer_id)
                {
                    scheduled.insert(row.peer_id.clone());
                    to_check.push_back(DeleteTarget::new(&row.peer_id, &row.peer_kind));
                }
                if types.contains(&DeleteRelationshipType::Dependent) {
                    dependents
                        .entry(row.peer_id.clone())
                        .or_insert_with(|| DependentNodeViolation {
                            kind: row.peer_kind.clone(),
                            id: row.peer_id.clone(),
                            relationship: row.rel_identifier.clone(),
                        });
                }
            }
        }

        let mut violations: Vec<DependentNodeViolation> = dependents
            .into_values()
            .filter(|violation| !to_delete.contains(&violation.id))
            .collect();
        if !violations.is_empty() {
            violations.sort_by(|a, b| a.id.cmp(&b.id));
            return Err(DeleteDependencyError { violations }.into());
        }

        log::debug!(
            "delete closure on '{}' resolved {} node(s) from {} requested",
            branch,
            to_delete.len(),
            initial.len()
        );
        Ok(to_delete)
    }
}
