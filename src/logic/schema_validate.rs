use crate::logic::schema_branch::SchemaBranch;
use crate::model::{
    RelationshipCardinality, RelationshipKind, SchemaObject,
};
use itertools::Itertools;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use thiserror::Error;

/// One author-facing problem found during schema validation. Always names
/// the offending kind, the field/path inside it, and what is wrong.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaViolation {
    pub kind: String,
    pub path: String,
    pub message: String,
}

impl SchemaViolation {
    pub fn new(kind: &str, path: &str, message: &str) -> Self {
        Self {
            kind: kind.to_string(),
            path: path.to_string(),
            message: message.to_string(),
        }
    }
}

impl std::fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}: {}", self.kind, self.path, self.message)
    }
}

fn format_violations(violations: &[SchemaViolation]) -> String {
    violations.iter().map(ToString::to_string).join("; ")
}

/// All violations found in one pass, raised together so authors see the
/// full picture instead of fixing one error at a time.
#[derive(Debug, Error)]
#[error("schema validation failed with {} violation(s): {}", .violations.len(), format_violations(.violations))]
pub struct SchemaValidationError {
    pub violations: Vec<SchemaViolation>,
}

/// Validate the branch's data model. Runs every check and aggregates the
/// violations; the scan never aborts early.
pub fn validate(branch: &SchemaBranch) -> Result<(), SchemaValidationError> {
    let mut violations: Vec<SchemaViolation> = Vec::new();

    let node_names: HashSet<String> = branch.node_names().into_iter().collect();
    for generic_name in branch.generic_names() {
        if node_names.contains(&generic_name) {
            violations.push(SchemaViolation::new(
                &generic_name,
                "-",
                "kind is defined as both a node and a generic",
            ));
        }
    }

    let mut objects: Vec<(String, Arc<SchemaObject>)> = Vec::new();
    for kind in branch.kinds() {
        match branch.get_shared(&kind) {
            Ok(object) => objects.push((kind, object)),
            Err(err) => violations.push(SchemaViolation::new(&kind, "-", &err.to_string())),
        }
    }
    let kind_set: HashSet<&str> = objects.iter().map(|(kind, _)| kind.as_str()).collect();

    validate_names(&objects, &mut violations);
    validate_inheritance(branch, &objects, &mut violations);
    validate_peers(&kind_set, &objects, &mut violations);
    validate_counts(&objects, &mut violations);
    validate_paths(&objects, &mut violations);
    validate_mutual_mandatory_relationships(&kind_set, &objects, &mut violations);
    validate_parent_component_dag(&objects, &mut violations);

    if violations.is_empty() {
        Ok(())
    } else {
        Err(SchemaValidationError { violations })
    }
}

/// No attribute may shadow a relationship (or vice versa) on one kind.
fn validate_names(
    objects: &[(String, Arc<SchemaObject>)],
    violations: &mut Vec<SchemaViolation>,
) {
    for (kind, object) in objects {
        let attr_names: HashSet<&str> =
            object.attributes().iter().map(|a| a.name.as_str()).collect();
        for rel in object.relationships() {
            if attr_names.contains(rel.name.as_str()) {
                violations.push(SchemaViolation::new(
                    kind,
                    &format!("relationships/{}", rel.name),
                    "name collides with an attribute of the same kind",
                ));
            }
        }

        let mut seen_attrs: HashSet<&str> = HashSet::new();
        for attr in object.attributes() {
            if !seen_attrs.insert(attr.name.as_str()) {
                violations.push(SchemaViolation::new(
                    kind,
                    &format!("attributes/{}", attr.name),
                    "duplicate attribute name",
                ));
            }
        }
        let mut seen_rels: HashSet<&str> = HashSet::new();
        for rel in object.relationships() {
            if !seen_rels.insert(rel.name.as_str()) {
                violations.push(SchemaViolation::new(
                    kind,
                    &format!("relationships/{}", rel.name),
                    "duplicate relationship name",
                ));
            }
        }
    }
}

fn validate_inheritance(
    branch: &SchemaBranch,
    objects: &[(String, Arc<SchemaObject>)],
    violations: &mut Vec<SchemaViolation>,
) {
    for (kind, object) in objects {
        let SchemaObject::Node(node) = object.as_ref() else {
            continue;
        };
        for target in &node.inherit_from {
            if !branch.has(target) {
                violations.push(SchemaViolation::new(
                    kind,
                    "inherit_from",
                    &format!("'{target}' is not defined"),
                ));
            } else if branch.get_generic(target).is_err() {
                violations.push(SchemaViolation::new(
                    kind,
                    "inherit_from",
                    &format!("'{target}' must be a generic"),
                ));
            }
        }
    }
}

fn validate_peers(
    kind_set: &HashSet<&str>,
    objects: &[(String, Arc<SchemaObject>)],
    violations: &mut Vec<SchemaViolation>,
) {
    for (kind, object) in objects {
        for rel in object.relationships() {
            if !kind_set.contains(rel.peer.as_str()) {
                violations.push(SchemaViolation::new(
                    kind,
                    &format!("relationships/{}/peer", rel.name),
                    &format!("peer kind '{}' is not defined", rel.peer),
                ));
            }
        }
    }
}

fn validate_counts(
    objects: &[(String, Arc<SchemaObject>)],
    violations: &mut Vec<SchemaViolation>,
) {
    for (kind, object) in objects {
        for rel in object.relationships() {
            let path = format!("relationships/{}", rel.name);
            if rel.cardinality == RelationshipCardinality::One && rel.max_count != 1 {
                violations.push(SchemaViolation::new(
                    kind,
                    &path,
                    &format!(
                        "cardinality one requires max_count 1, found {}",
                        rel.max_count
                    ),
                ));
            }
            if rel.max_count != 0 && rel.min_count > rel.max_count {
                violations.push(SchemaViolation::new(
                    kind,
                    &path,
                    &format!(
                        "min_count {} exceeds max_count {}",
                        rel.min_count, rel.max_count
                    ),
                ));
            }
            if rel.optional && rel.min_count > 0 {
                violations.push(SchemaViolation::new(
                    kind,
                    &path,
                    "an optional relationship cannot require a minimum count",
                ));
            }
            if !rel.optional && rel.min_count == 0 {
                violations.push(SchemaViolation::new(
                    kind,
                    &path,
                    "a mandatory relationship requires min_count of at least 1",
                ));
            }
        }
    }
}

/// Attribute-path checks for every declared lookup surface.
fn validate_paths(
    objects: &[(String, Arc<SchemaObject>)],
    violations: &mut Vec<SchemaViolation>,
) {
    for (kind, object) in objects {
        let SchemaObject::Node(node) = object.as_ref() else {
            continue;
        };

        for (idx, constraint) in node.uniqueness_constraints.iter().enumerate() {
            if constraint.is_empty() {
                violations.push(SchemaViolation::new(
                    kind,
                    &format!("uniqueness_constraints/{idx}"),
                    "constraint cannot be empty",
                ));
            }
            for path in constraint {
                if !node.has_local_path(path) {
                    violations.push(SchemaViolation::new(
                        kind,
                        &format!("uniqueness_constraints/{idx}"),
                        &format!("'{path}' does not resolve to an attribute or relationship"),
                    ));
                }
            }
        }

        let attr_paths = [
            ("display_labels", &node.display_labels),
            ("order_by", &node.order_by),
            ("human_friendly_id", &node.human_friendly_id),
        ];
        for (field, paths) in attr_paths {
            for path in paths {
                let attr_name = path.strip_suffix("__value").unwrap_or(path);
                if node.get_attribute(attr_name).is_none() {
                    violations.push(SchemaViolation::new(
                        kind,
                        field,
                        &format!("'{path}' does not resolve to an attribute"),
                    ));
                }
            }
        }

        if let Some(filter) = &node.default_filter {
            let attr_name = filter.strip_suffix("__value").unwrap_or(filter);
            if node.get_attribute(attr_name).is_none() {
                violations.push(SchemaViolation::new(
                    kind,
                    "default_filter",
                    &format!("'{filter}' does not resolve to an attribute"),
                ));
            }
        }
    }
}

/// Two kinds may not both declare a mandatory relationship to each other:
/// neither could ever be created first.
fn validate_mutual_mandatory_relationships(
    kind_set: &HashSet<&str>,
    objects: &[(String, Arc<SchemaObject>)],
    violations: &mut Vec<SchemaViolation>,
) {
    let mut mandatory: HashSet<(&str, &str)> = HashSet::new();
    for (kind, object) in objects {
        for rel in object.relationships() {
            if !rel.optional && kind_set.contains(rel.peer.as_str()) {
                mandatory.insert((kind.as_str(), rel.peer.as_str()));
            }
        }
    }

    let mut reported: BTreeSet<(&str, &str)> = BTreeSet::new();
    for (kind, peer) in &mandatory {
        if kind == peer || !mandatory.contains(&(*peer, *kind)) {
            continue;
        }
        let pair = if kind < peer { (*kind, *peer) } else { (*peer, *kind) };
        if reported.insert(pair) {
            violations.push(SchemaViolation::new(
                pair.0,
                "relationships",
                &format!(
                    "'{}' and '{}' both declare a mandatory relationship to each other",
                    pair.0, pair.1
                ),
            ));
        }
    }
}

/// The parent/component relationship graph must stay a DAG; a cycle would
/// make cascade deletes and ancestry resolution ill-defined. Kahn's
/// algorithm; whatever survives the peeling is part of a cycle.
fn validate_parent_component_dag(
    objects: &[(String, Arc<SchemaObject>)],
    violations: &mut Vec<SchemaViolation>,
) {
    let mut adjacency: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    let mut in_degree: BTreeMap<&str, usize> = BTreeMap::new();

    for (kind, object) in objects {
        for rel in object.relationships() {
            if !matches!(rel.kind, RelationshipKind::Parent | RelationshipKind::Component) {
                continue;
            }
            let inserted = adjacency
                .entry(kind.as_str())
                .or_default()
                .insert(rel.peer.as_str());
            if inserted {
                in_degree.entry(kind.as_str()).or_insert(0);
                *in_degree.entry(rel.peer.as_str()).or_insert(0) += 1;
            }
        }
    }

    let mut queue: Vec<&str> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(kind, _)| *kind)
        .collect();
    let mut remaining = in_degree.clone();
    while let Some(kind) = queue.pop() {
        remaining.remove(kind);
        if let Some(peers) = adjacency.get(kind) {
            for peer in peers {
                if let Some(degree) = remaining.get_mut(peer) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push(peer);
                    }
                }
            }
        }
    }

    if !remaining.is_empty() {
        let cycle = remaining.keys().join(" -> ");
        violations.push(SchemaViolation::new(
            remaining.keys().next().unwrap_or(&""),
            "relationships",
            &format!("parent/component relationships form a cycle: {cycle}"),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::schema_branch::SchemaCache;
    use crate::model::{AttributeKind, AttributeSchema, NodeSchema, RelationshipSchema};
    use std::sync::Arc as StdArc;

    fn branch_of(nodes: Vec<NodeSchema>) -> SchemaBranch {
        let mut branch = SchemaBranch::new(StdArc::new(SchemaCache::new()), Some("main"));
        for node in nodes {
            branch.set(&node.kind(), SchemaObject::Node(node));
        }
        branch
    }

    fn node_with_name_attr(namespace: &str, name: &str) -> NodeSchema {
        let mut node = NodeSchema::new(namespace, name);
        node.attributes
            .push(AttributeSchema::new("name", AttributeKind::Text));
        node
    }

    fn parent_rel(name: &str, peer: &str) -> RelationshipSchema {
        let mut rel = RelationshipSchema::new(name, peer);
        rel.kind = RelationshipKind::Parent;
        rel
    }

    #[test]
    fn missing_peer_is_reported_with_its_path() {
        let mut node = node_with_name_attr("Test", "Widget");
        node.relationships
            .push(RelationshipSchema::new("site", "TestSite"));
        let branch = branch_of(vec![node]);

        let err = validate(&branch).unwrap_err();
        assert_eq!(err.violations.len(), 1);
        let violation = &err.violations[0];
        assert_eq!(violation.kind, "TestWidget");
        assert_eq!(violation.path, "relationships/site/peer");
        assert!(violation.message.contains("TestSite"));
    }

    #[test]
    fn invalid_lookup_paths_are_reported() {
        let mut node = node_with_name_attr("Test", "Widget");
        node.display_labels = vec!["missing__value".to_string()];
        node.uniqueness_constraints = vec![vec!["nope__value".to_string()]];
        node.order_by = vec!["name__value".to_string()];
        let branch = branch_of(vec![node]);

        let err = validate(&branch).unwrap_err();
        let paths: Vec<&str> = err.violations.iter().map(|v| v.path.as_str()).collect();
        assert!(paths.contains(&"display_labels"));
        assert!(paths.contains(&"uniqueness_constraints/0"));
        assert!(!paths.contains(&"order_by"));
    }

    #[test]
    fn mutual_mandatory_relationships_are_rejected_once_per_pair() {
        let mut widget = node_with_name_attr("Test", "Widget");
        let mut to_gadget = RelationshipSchema::new("gadget", "TestGadget");
        to_gadget.optional = false;
        to_gadget.min_count = 1;
        widget.relationships.push(to_gadget);

        let mut gadget = node_with_name_attr("Test", "Gadget");
        let mut to_widget = RelationshipSchema::new("widget", "TestWidget");
        to_widget.optional = false;
        to_widget.min_count = 1;
        gadget.relationships.push(to_widget);

        let branch = branch_of(vec![widget, gadget]);
        let err = validate(&branch).unwrap_err();
        let mutual: Vec<_> = err
            .violations
            .iter()
            .filter(|v| v.message.contains("mandatory relationship to each other"))
            .collect();
        assert_eq!(mutual.len(), 1);
    }

    #[test]
    fn one_way_mandatory_relationship_is_fine() {
        let mut widget = node_with_name_attr("Test", "Widget");
        let mut to_gadget = RelationshipSchema::new("gadget", "TestGadget");
        to_gadget.optional = false;
        to_gadget.min_count = 1;
        widget.relationships.push(to_gadget);
        let gadget = node_with_name_attr("Test", "Gadget");

        let branch = branch_of(vec![widget, gadget]);
        assert!(validate(&branch).is_ok());
    }

    #[test]
    fn parent_cycle_is_detected_and_named() {
        let mut x = node_with_name_attr("Test", "X");
        x.relationships.push(parent_rel("parent_y", "TestY"));
        let mut y = node_with_name_attr("Test", "Y");
        y.relationships.push(parent_rel("parent_z", "TestZ"));
        let mut z = node_with_name_attr("Test", "Z");
        z.relationships.push(parent_rel("parent_x", "TestX"));

        let branch = branch_of(vec![x, y, z]);
        let err = validate(&branch).unwrap_err();
        let cycle = err
            .violations
            .iter()
            .find(|v| v.message.contains("cycle"))
            .unwrap();
        for kind in ["TestX", "TestY", "TestZ"] {
            assert!(cycle.message.contains(kind), "cycle should name {kind}");
        }
    }

    #[test]
    fn breaking_the_cycle_makes_validation_pass() {
        let mut x = node_with_name_attr("Test", "X");
        x.relationships.push(parent_rel("parent_y", "TestY"));
        let mut y = node_with_name_attr("Test", "Y");
        y.relationships.push(parent_rel("parent_z", "TestZ"));
        let z = node_with_name_attr("Test", "Z");

        let branch = branch_of(vec![x, y, z]);
        assert!(validate(&branch).is_ok());
    }

    #[test]
    fn self_referencing_component_is_a_cycle() {
        let mut x = node_with_name_attr("Test", "X");
        let mut rel = RelationshipSchema::new("parts", "TestX");
        rel.kind = RelationshipKind::Component;
        x.relationships.push(rel);

        let branch = branch_of(vec![x]);
        let err = validate(&branch).unwrap_err();
        assert!(err.violations.iter().any(|v| v.message.contains("cycle")));
    }

    #[test]
    fn violations_from_independent_checks_are_aggregated() {
        let mut widget = node_with_name_attr("Test", "Widget");
        widget
            .relationships
            .push(RelationshipSchema::new("name", "TestGhost"));
        widget.display_labels = vec!["missing__value".to_string()];
        let branch = branch_of(vec![widget]);

        let err = validate(&branch).unwrap_err();
        // name collision + missing peer + bad display label, all at once
        assert!(err.violations.len() >= 3, "got: {err}");
    }
}
