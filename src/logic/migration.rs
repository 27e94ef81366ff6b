use crate::logic::schema_branch::{SchemaBranch, SchemaBranchError};
use crate::model::diff::SchemaDiff;
use crate::model::{Id, SchemaObject};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinSet;

#[derive(Debug, Error)]
pub enum MigrationDispatchError {
    #[error("cannot determine the previous version of '{kind}': a migration needs the pre-change definition to migrate from")]
    PreviousSchemaMissing { kind: String },
    #[error(transparent)]
    Lookup(#[from] SchemaBranchError),
}

/// One unit of migration work, shipped to an external runner.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationDescriptor {
    pub branch: String,
    pub migration_name: String,
    /// kind plus the element the migration targets, e.g.
    /// `TestWidget/attributes/name`
    pub schema_path: String,
    /// Absent when the kind itself was removed
    pub new_schema: Option<SchemaObject>,
    pub previous_schema: SchemaObject,
}

/// One constraint check, shipped to an external runner.
#[derive(Debug, Clone, Serialize)]
pub struct ValidatorDescriptor {
    pub branch: String,
    pub constraint_name: String,
    pub schema_path: String,
    pub new_schema: SchemaObject,
    pub previous_schema: Option<SchemaObject>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MigrationResult {
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintViolation {
    pub path: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidatorResult {
    pub passed: bool,
    pub violations: Vec<ConstraintViolation>,
    pub errors: Vec<String>,
}

/// Outcome of one dispatched validator. Schema-level violations and
/// execution-level failures are kept apart: a validator that reports
/// failure without a single violation did not do its job.
#[derive(Debug, Clone, Serialize)]
pub struct ValidatorOutcome {
    pub constraint_name: String,
    pub schema_path: String,
    pub violations: Vec<ConstraintViolation>,
    pub execution_errors: Vec<String>,
}

/// External execution boundary: runners typically forward the descriptor
/// over a task queue and relay the worker's structured answer.
#[async_trait::async_trait]
pub trait MigrationRunner: Send + Sync + 'static {
    async fn run_migration(&self, descriptor: &MigrationDescriptor) -> Result<MigrationResult>;
    async fn run_validator(&self, descriptor: &ValidatorDescriptor) -> Result<ValidatorResult>;
}

/// Aggregate result of applying one schema diff.
#[derive(Debug, Default)]
pub struct SchemaApplyReport {
    pub migration_errors: Vec<String>,
    pub validator_outcomes: Vec<ValidatorOutcome>,
}

impl SchemaApplyReport {
    pub fn is_success(&self) -> bool {
        self.migration_errors.is_empty()
            && self
                .validator_outcomes
                .iter()
                .all(|o| o.violations.is_empty() && o.execution_errors.is_empty())
    }
}

/// Resolve the previous version of a kind: by stable id when the new side
/// still carries one, by name on the previous branch otherwise. A
/// migration with no prior state is a logic error, not a recoverable
/// condition.
fn resolve_previous(
    kind: &str,
    new_object: Option<&SchemaObject>,
    previous: &SchemaBranch,
) -> Result<SchemaObject, MigrationDispatchError> {
    if let Some(id) = new_object.and_then(|obj| obj.id().cloned()) {
        let by_id: HashMap<Id, String> = previous
            .get_all_kind_id_map()
            .into_iter()
            .filter_map(|(kind, id)| id.map(|id| (id, kind)))
            .collect();
        if let Some(previous_kind) = by_id.get(&id) {
            return Ok(previous.get(previous_kind)?);
        }
    }
    if previous.has(kind) {
        return Ok(previous.get(kind)?);
    }
    Err(MigrationDispatchError::PreviousSchemaMissing {
        kind: kind.to_string(),
    })
}

fn names_of<'a>(items: impl Iterator<Item = &'a String>) -> HashSet<&'a String> {
    items.collect()
}

/// Decide which migrations a schema diff requires. The rule map is closed:
/// kind removal, kind rename, attribute add/remove, relationship removal.
pub fn determine_migrations(
    branch_name: &str,
    diff: &SchemaDiff,
    new: &SchemaBranch,
    previous: &SchemaBranch,
) -> Result<Vec<MigrationDescriptor>, MigrationDispatchError> {
    let mut descriptors = Vec::new();

    for kind in diff.removed.keys() {
        let previous_schema = resolve_previous(kind, None, previous)?;
        descriptors.push(MigrationDescriptor {
            branch: branch_name.to_string(),
            migration_name: "node.remove".to_string(),
            schema_path: kind.clone(),
            new_schema: None,
            previous_schema,
        });
    }

    for (kind, field_diff) in &diff.changed {
        let new_schema = new.get(kind)?;
        let previous_schema = resolve_previous(kind, Some(&new_schema), previous)?;

        if field_diff.changed.contains_key("name") || field_diff.changed.contains_key("namespace") {
            descriptors.push(MigrationDescriptor {
                branch: branch_name.to_string(),
                migration_name: "node.kind.update".to_string(),
                schema_path: kind.clone(),
                new_schema: Some(new_schema.clone()),
                previous_schema: previous_schema.clone(),
            });
        }

        // element-level changes come from the objects themselves: the
        // field diff only records that the collections differ
        let new_attrs: Vec<String> =
            new_schema.attributes().iter().map(|a| a.name.clone()).collect();
        let prev_attrs: Vec<String> = previous_schema
            .attributes()
            .iter()
            .map(|a| a.name.clone())
            .collect();
        let new_attr_set = names_of(new_attrs.iter());
        let prev_attr_set = names_of(prev_attrs.iter());

        for added in new_attr_set.difference(&prev_attr_set) {
            descriptors.push(MigrationDescriptor {
                branch: branch_name.to_string(),
                migration_name: "node.attribute.add".to_string(),
                schema_path: format!("{kind}/attributes/{added}"),
                new_schema: Some(new_schema.clone()),
                previous_schema: previous_schema.clone(),
            });
        }
        for removed in prev_attr_set.difference(&new_attr_set) {
            descriptors.push(MigrationDescriptor {
                branch: branch_name.to_string(),
                migration_name: "node.attribute.remove".to_string(),
                schema_path: format!("{kind}/attributes/{removed}"),
                new_schema: Some(new_schema.clone()),
                previous_schema: previous_schema.clone(),
            });
        }

        let new_rels: Vec<String> = new_schema
            .relationships()
            .iter()
            .map(|r| r.name.clone())
            .collect();
        let prev_rels: Vec<String> = previous_schema
            .relationships()
            .iter()
            .map(|r| r.name.clone())
            .collect();
        let new_rel_set = names_of(new_rels.iter());
        for removed in names_of(prev_rels.iter()).difference(&new_rel_set) {
            descriptors.push(MigrationDescriptor {
                branch: branch_name.to_string(),
                migration_name: "node.relationship.remove".to_string(),
                schema_path: format!("{kind}/relationships/{removed}"),
                new_schema: Some(new_schema.clone()),
                previous_schema: previous_schema.clone(),
            });
        }
    }

    Ok(descriptors)
}

/// Decide which constraint validators must confirm existing data still
/// fits the tightened schema.
pub fn determine_constraint_validators(
    branch_name: &str,
    diff: &SchemaDiff,
    new: &SchemaBranch,
    previous: &SchemaBranch,
) -> Result<Vec<ValidatorDescriptor>, MigrationDispatchError> {
    let mut descriptors = Vec::new();

    for kind in diff.changed.keys() {
        let new_schema = new.get(kind)?;
        let previous_schema = resolve_previous(kind, Some(&new_schema), previous)?;

        for attr in new_schema.attributes() {
            let Some(prev_attr) = previous_schema
                .attributes()
                .iter()
                .find(|a| a.name == attr.name)
            else {
                continue;
            };
            let path = format!("{kind}/attributes/{}", attr.name);
            if attr.unique && !prev_attr.unique {
                descriptors.push(ValidatorDescriptor {
                    branch: branch_name.to_string(),
                    constraint_name: "attribute.unique.update".to_string(),
                    schema_path: path.clone(),
                    new_schema: new_schema.clone(),
                    previous_schema: Some(previous_schema.clone()),
                });
            }
            if attr.regex != prev_attr.regex && attr.regex.is_some() {
                descriptors.push(ValidatorDescriptor {
                    branch: branch_name.to_string(),
                    constraint_name: "attribute.regex.update".to_string(),
                    schema_path: path.clone(),
                    new_schema: new_schema.clone(),
                    previous_schema: Some(previous_schema.clone()),
                });
            }
            if !attr.optional && prev_attr.optional {
                descriptors.push(ValidatorDescriptor {
                    branch: branch_name.to_string(),
                    constraint_name: "attribute.optional.update".to_string(),
                    schema_path: path,
                    new_schema: new_schema.clone(),
                    previous_schema: Some(previous_schema.clone()),
                });
            }
        }

        for rel in new_schema.relationships() {
            let Some(prev_rel) = previous_schema
                .relationships()
                .iter()
                .find(|r| r.name == rel.name)
            else {
                continue;
            };
            let path = format!("{kind}/relationships/{}", rel.name);
            let tightened_min = rel.min_count > prev_rel.min_count;
            let tightened_max =
                rel.max_count != 0 && (prev_rel.max_count == 0 || rel.max_count < prev_rel.max_count);
            if tightened_min || tightened_max {
                descriptors.push(ValidatorDescriptor {
                    branch: branch_name.to_string(),
                    constraint_name: "relationship.count.update".to_string(),
                    schema_path: path.clone(),
                    new_schema: new_schema.clone(),
                    previous_schema: Some(previous_schema.clone()),
                });
            }
            if rel.peer != prev_rel.peer {
                descriptors.push(ValidatorDescriptor {
                    branch: branch_name.to_string(),
                    constraint_name: "relationship.peer.update".to_string(),
                    schema_path: path,
                    new_schema: new_schema.clone(),
                    previous_schema: Some(previous_schema.clone()),
                });
            }
        }
    }

    Ok(descriptors)
}

/// Fan out every migration as an independent task and join them all.
/// One failing migration never prevents its siblings from running; the
/// error strings are aggregated for the caller to act on.
pub async fn dispatch_migrations(
    runner: Arc<dyn MigrationRunner>,
    descriptors: Vec<MigrationDescriptor>,
) -> Vec<String> {
    let mut tasks: JoinSet<Vec<String>> = JoinSet::new();
    for descriptor in descriptors {
        let runner = Arc::clone(&runner);
        tasks.spawn(async move {
            match runner.run_migration(&descriptor).await {
                Ok(result) => result.errors,
                Err(err) => vec![format!(
                    "migration '{}' on '{}' failed to execute: {err}",
                    descriptor.migration_name, descriptor.schema_path
                )],
            }
        });
    }

    let mut errors = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(task_errors) => errors.extend(task_errors),
            Err(err) => errors.push(format!("migration task aborted: {err}")),
        }
    }
    errors
}

/// Fan out every validator; same barrier semantics as migrations.
pub async fn dispatch_validators(
    runner: Arc<dyn MigrationRunner>,
    descriptors: Vec<ValidatorDescriptor>,
) -> Vec<ValidatorOutcome> {
    let mut tasks: JoinSet<ValidatorOutcome> = JoinSet::new();
    for descriptor in descriptors {
        let runner = Arc::clone(&runner);
        tasks.spawn(async move {
            let mut outcome = ValidatorOutcome {
                constraint_name: descriptor.constraint_name.clone(),
                schema_path: descriptor.schema_path.clone(),
                violations: Vec::new(),
                execution_errors: Vec::new(),
            };
            match runner.run_validator(&descriptor).await {
                Ok(result) => {
                    outcome.execution_errors.extend(result.errors.clone());
                    outcome.violations.extend(result.violations.clone());
                    if !result.passed && result.violations.is_empty() && result.errors.is_empty() {
                        outcome.execution_errors.push(format!(
                            "validator '{}' reported failure without any violation",
                            descriptor.constraint_name
                        ));
                    }
                }
                Err(err) => outcome.execution_errors.push(format!(
                    "validator '{}' on '{}' failed to execute: {err}",
                    descriptor.constraint_name, descriptor.schema_path
                )),
            }
            outcome
        });
    }

    let mut outcomes = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(outcome) => outcomes.push(outcome),
            Err(err) => outcomes.push(ValidatorOutcome {
                constraint_name: "unknown".to_string(),
                schema_path: "unknown".to_string(),
                violations: Vec::new(),
                execution_errors: vec![format!("validator task aborted: {err}")],
            }),
        }
    }
    outcomes
}

/// Full apply path for one schema diff: compute what must run, dispatch
/// everything concurrently, and merge the results.
pub async fn apply_schema_diff(
    branch_name: &str,
    diff: &SchemaDiff,
    new: &SchemaBranch,
    previous: &SchemaBranch,
    runner: Arc<dyn MigrationRunner>,
) -> Result<SchemaApplyReport, MigrationDispatchError> {
    let migrations = determine_migrations(branch_name, diff, new, previous)?;
    let validators = determine_constraint_validators(branch_name, diff, new, previous)?;
    log::info!(
        "schema diff on '{}': dispatching {} migrations and {} validators",
        branch_name,
        migrations.len(),
        validators.len()
    );

    let (migration_errors, validator_outcomes) = tokio::join!(
        dispatch_migrations(Arc::clone(&runner), migrations),
        dispatch_validators(runner, validators),
    );

    Ok(SchemaApplyReport {
        migration_errors,
        validator_outcomes,
    })
}
