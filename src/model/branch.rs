use crate::config::GLOBAL_BRANCH_NAME;
use crate::logic::schema_branch::SchemaBranch;
use crate::model::Timestamp;
use crate::registry::Registry;
use crate::store::traits::{BranchStore, RebaseActions, Store};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use thiserror::Error;

/// Set of branch names one branch/time entry applies to.
pub type BranchSet = BTreeSet<String>;

/// Characters that are never allowed anywhere in a branch name.
const FORBIDDEN_CHARS: [char; 8] = ['\\', '~', '^', ':', '?', '*', '[', ' '];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid branch name '{value}': {reason}")]
pub struct BranchNameError {
    pub value: String,
    pub reason: String,
}

impl BranchNameError {
    fn new(value: &str, reason: &str) -> Self {
        Self {
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BranchStatus {
    /// Branch is actively being worked on
    Open,
    /// Branch has been merged or abandoned and accepts no further changes
    Closed,
}

impl Default for BranchStatus {
    fn default() -> Self {
        BranchStatus::Open
    }
}

/// Digest of the schema currently loaded on a branch, with the time it
/// last changed. Used to answer "did this schema actually change" without
/// walking every kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaHash {
    pub main: String,
    pub changed_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Branch {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub status: BranchStatus,
    /// Branch this one was forked from; a default branch is its own origin
    pub origin_branch: String,
    /// Fork point; advanced by rebase
    pub branched_from: Timestamp,
    pub created_at: Timestamp,
    pub is_default: bool,
    pub is_global: bool,
    /// When set, origin data changed after the fork point stays hidden
    /// from this branch until it is rebased
    pub is_isolated: bool,
    pub sync_with_git: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_hash: Option<SchemaHash>,
}

impl Branch {
    /// Create a regular branch forked from `origin_branch` right now.
    pub fn new(
        name: &str,
        origin_branch: &str,
        description: Option<String>,
        is_isolated: bool,
    ) -> Result<Self, BranchNameError> {
        Self::validate_name(name)?;
        let now = Timestamp::now();
        Ok(Self {
            name: name.to_string(),
            description,
            status: BranchStatus::Open,
            origin_branch: origin_branch.to_string(),
            branched_from: now,
            created_at: now,
            is_default: false,
            is_global: false,
            is_isolated,
            sync_with_git: false,
            schema_hash: None,
        })
    }

    /// The default branch is its own origin and is never isolated.
    pub fn new_default(name: &str) -> Result<Self, BranchNameError> {
        Self::validate_name(name)?;
        let now = Timestamp::now();
        Ok(Self {
            name: name.to_string(),
            description: Some("Default branch".to_string()),
            status: BranchStatus::Open,
            origin_branch: name.to_string(),
            branched_from: now,
            created_at: now,
            is_default: true,
            is_global: false,
            is_isolated: false,
            sync_with_git: true,
            schema_hash: None,
        })
    }

    /// The global branch carries branch-agnostic data only.
    pub fn new_global() -> Self {
        let now = Timestamp::now();
        Self {
            name: GLOBAL_BRANCH_NAME.to_string(),
            description: Some("Global branch".to_string()),
            status: BranchStatus::Open,
            origin_branch: GLOBAL_BRANCH_NAME.to_string(),
            branched_from: now,
            created_at: now,
            is_default: false,
            is_global: true,
            is_isolated: false,
            sync_with_git: false,
            schema_hash: None,
        }
    }

    /// Validate a branch name against the restricted character set.
    ///
    /// The rules follow git ref-name conventions: no traversal-like
    /// patterns, no ref-syntax metacharacters, nothing a shell or a path
    /// joiner could misread. The configured global branch name is the one
    /// exception.
    pub fn validate_name(value: &str) -> Result<(), BranchNameError> {
        if value == GLOBAL_BRANCH_NAME {
            return Ok(());
        }
        if value.is_empty() {
            return Err(BranchNameError::new(value, "name cannot be empty"));
        }
        if value.starts_with('/') {
            return Err(BranchNameError::new(value, "name cannot start with '/'"));
        }
        for pattern in ["/.", "..", "//", "@{"] {
            if value.contains(pattern) {
                return Err(BranchNameError::new(
                    value,
                    &format!("name cannot contain '{pattern}'"),
                ));
            }
        }
        if let Some(c) = value
            .chars()
            .find(|c| c.is_ascii_control() || FORBIDDEN_CHARS.contains(c))
        {
            return Err(BranchNameError::new(
                value,
                &format!("character {c:?} is not allowed"),
            ));
        }
        if value.ends_with(".lock") {
            return Err(BranchNameError::new(value, "name cannot end with '.lock'"));
        }
        if value.ends_with('/') || value.ends_with('.') {
            return Err(BranchNameError::new(
                value,
                "name cannot end with '/' or '.'",
            ));
        }
        Ok(())
    }

    /// Origin branch, if this branch has one that is not itself.
    pub async fn get_origin_branch<S: BranchStore>(
        &self,
        registry: &Registry,
        store: &S,
    ) -> Result<Option<Branch>> {
        if self.is_default || self.origin_branch == self.name {
            return Ok(None);
        }
        let origin = registry.get_branch(&self.origin_branch, store).await?;
        Ok(Some(origin))
    }

    /// Branch names whose edges can be visible from this branch.
    ///
    /// Only a two-level hierarchy (origin + self) is supported; nothing
    /// else may assume deeper ancestry chains.
    pub fn get_branches_in_scope(&self) -> Vec<String> {
        if self.is_default {
            return vec![self.name.clone()];
        }
        vec![self.origin_branch.clone(), self.name.clone()]
    }

    /// For each set of branch names, the time at which those branches must
    /// be read to answer a query at `at`.
    ///
    /// An isolated branch freezes origin-inherited data at the fork point:
    /// the origin entry maps to `branched_from` whenever the query time is
    /// past it, while the branch's own edits stay visible up to `at`.
    pub fn get_branches_and_times_to_query(
        &self,
        at: &Timestamp,
    ) -> HashMap<BranchSet, Timestamp> {
        let mut scope = HashMap::new();
        if self.is_default {
            scope.insert(BranchSet::from([self.name.clone()]), *at);
            return scope;
        }

        let origin_time = if self.is_isolated && *at > self.branched_from {
            self.branched_from
        } else {
            *at
        };
        scope.insert(BranchSet::from([self.origin_branch.clone()]), origin_time);
        scope.insert(BranchSet::from([self.name.clone()]), *at);
        scope
    }

    /// Same scoping, with the global branch name added to every entry so
    /// branch-agnostic edges are always matched.
    pub fn get_branches_and_times_to_query_global(
        &self,
        at: &Timestamp,
        include_isolation: bool,
    ) -> HashMap<BranchSet, Timestamp> {
        let mut scope = HashMap::new();
        if self.is_default {
            scope.insert(
                BranchSet::from([GLOBAL_BRANCH_NAME.to_string(), self.name.clone()]),
                *at,
            );
            return scope;
        }

        let origin_time =
            if include_isolation && self.is_isolated && *at > self.branched_from {
                self.branched_from
            } else {
                *at
            };
        scope.insert(
            BranchSet::from([GLOBAL_BRANCH_NAME.to_string(), self.origin_branch.clone()]),
            origin_time,
        );
        scope.insert(
            BranchSet::from([GLOBAL_BRANCH_NAME.to_string(), self.name.clone()]),
            *at,
        );
        scope
    }

    /// Per-branch start/end times for a diff window.
    ///
    /// The start is clamped so it never precedes this branch's creation,
    /// and the origin's window never starts before the fork point.
    pub fn get_branches_and_times_for_range(
        &self,
        start: &Timestamp,
        end: &Timestamp,
    ) -> (HashMap<String, Timestamp>, HashMap<String, Timestamp>) {
        let mut start_times = HashMap::new();
        let mut end_times = HashMap::new();

        let own_start = if *start < self.created_at {
            self.created_at
        } else {
            *start
        };
        start_times.insert(self.name.clone(), own_start);
        end_times.insert(self.name.clone(), *end);

        if !self.is_default {
            let origin_start = if *start < self.branched_from {
                self.branched_from
            } else {
                *start
            };
            start_times.insert(self.origin_branch.clone(), origin_start);
            end_times.insert(self.origin_branch.clone(), *end);
        }

        (start_times, end_times)
    }

    /// Recompute the schema digest; returns true when it changed.
    pub fn update_schema_hash(&mut self, schema: &SchemaBranch, at: &Timestamp) -> bool {
        let main = schema.get_hash();
        let changed = self
            .schema_hash
            .as_ref()
            .map(|existing| existing.main != main)
            .unwrap_or(true);
        if changed {
            self.schema_hash = Some(SchemaHash {
                main,
                changed_at: *at,
            });
        }
        changed
    }

    /// Advance the fork point to `at`, reconciling this branch's own edges
    /// against the fresh view of the origin.
    ///
    /// The registry entry is refreshed only after the store write
    /// succeeded, so a partial failure never leaves a dirty registry.
    pub async fn rebase<S: Store>(
        &mut self,
        at: &Timestamp,
        registry: &Registry,
        store: &S,
    ) -> Result<RebaseActions> {
        let actions = crate::logic::rebase::rebase_graph(store, &self.name, at).await?;
        self.branched_from = *at;
        store.upsert_branch(self.clone()).await?;
        registry.set_branch(self.clone()).await;
        log::info!(
            "branch '{}' rebased at {}: {} edges extended, {} removed",
            self.name,
            at,
            actions.extend.len(),
            actions.delete.len()
        );
        Ok(actions)
    }
}
