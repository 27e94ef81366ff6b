use crate::logic::schema_branch::{SchemaBranch, SchemaBranchError};
use crate::logic::schema_validate::{self, SchemaValidationError, SchemaViolation};
use crate::model::{
    AttributeKind, AttributeSchema, BranchSupportType, ProfileSchema, RelationshipCardinality,
    RelationshipDeleteBehavior, RelationshipKind, RelationshipSchema, SchemaObject, SchemaState,
    humanize_name, GROUP_GENERIC, IP_ADDRESS_GENERIC, IP_PREFIX_GENERIC, PROFILE_NAMESPACE,
    PROFILE_NAME_ATTRIBUTE, PROFILE_PRIORITY_ATTRIBUTE,
};
use std::collections::BTreeMap;
use thiserror::Error;

/// Default palette applied to dropdown choices without an explicit color.
const CHOICE_COLORS: [&str; 8] = [
    "#ed6a5a", "#f4f1bb", "#9bc1bc", "#5ca4a9", "#e6ebe0", "#f0b67f", "#fe5f55", "#d6d1b1",
];

#[derive(Debug, Error)]
pub enum SchemaProcessError {
    #[error(transparent)]
    Validation(#[from] SchemaValidationError),
    #[error(transparent)]
    Lookup(#[from] SchemaBranchError),
}

/// Run the fixed processing pipeline over a schema branch:
/// pre-validation normalization, (optionally) validation, then derived
/// field generation. The order of the steps is load-bearing; every step
/// assumes the ones before it already ran.
pub fn process(branch: &mut SchemaBranch, validate: bool) -> Result<(), SchemaProcessError> {
    generate_identifiers(branch)?;
    process_default_values(branch)?;
    process_cardinality_counts(branch)?;
    process_inheritance(branch)?;
    process_hierarchy(branch)?;
    process_branch_support(branch)?;
    generate_profiles(branch)?;

    if validate {
        schema_validate::validate(branch)?;
    }

    add_group_relationships(branch)?;
    add_hierarchy_relationships(branch)?;
    process_order_weights(branch)?;
    process_labels(branch)?;
    process_dropdowns(branch)?;
    process_relationship_on_delete(branch)?;
    process_human_friendly_id(branch)?;
    Ok(())
}

fn all_object_names(branch: &SchemaBranch) -> Vec<String> {
    let mut names = branch.kinds();
    names.extend(branch.profile_names());
    names
}

/// Deterministic identifier from the sorted, lowercased kind pair.
pub fn build_relationship_identifier(kind: &str, peer: &str) -> String {
    let mut pair = [kind.to_lowercase(), peer.to_lowercase()];
    pair.sort();
    format!("{}__{}", pair[0], pair[1])
}

fn generate_identifiers(branch: &mut SchemaBranch) -> Result<(), SchemaProcessError> {
    for name in branch.kinds() {
        let mut object = branch.get(&name)?;
        let kind = object.kind();
        for rel in object.relationships_mut() {
            if rel.identifier.is_none() {
                rel.identifier = Some(build_relationship_identifier(&kind, &rel.peer));
            }
        }
        branch.set(&name, object);
    }
    Ok(())
}

/// Declaring a default value makes an attribute optional: the value is
/// always there even when the author omits it.
fn process_default_values(branch: &mut SchemaBranch) -> Result<(), SchemaProcessError> {
    for name in branch.kinds() {
        let mut object = branch.get(&name)?;
        for attr in object.attributes_mut() {
            if attr.default_value.is_some() && !attr.optional {
                attr.optional = true;
            }
        }
        branch.set(&name, object);
    }
    Ok(())
}

fn process_cardinality_counts(branch: &mut SchemaBranch) -> Result<(), SchemaProcessError> {
    for name in branch.kinds() {
        let mut object = branch.get(&name)?;
        for rel in object.relationships_mut() {
            match rel.cardinality {
                RelationshipCardinality::One => {
                    rel.max_count = 1;
                    rel.min_count = if rel.optional { 0 } else { 1 };
                }
                RelationshipCardinality::Many => {
                    if !rel.optional && rel.min_count == 0 {
                        rel.min_count = 1;
                    }
                }
            }
        }
        branch.set(&name, object);
    }
    Ok(())
}

/// Copy attributes and relationships declared on generics into the nodes
/// inheriting from them, and record the reverse `used_by` lists. Locally
/// declared elements always win over inherited ones.
fn process_inheritance(branch: &mut SchemaBranch) -> Result<(), SchemaProcessError> {
    let mut violations: Vec<SchemaViolation> = Vec::new();
    let mut used_by: BTreeMap<String, Vec<String>> = BTreeMap::new();

    for node_name in branch.node_names() {
        let mut node = branch.get_node(&node_name)?;

        if node.inherit_from.iter().any(|g| g == IP_PREFIX_GENERIC)
            && node.inherit_from.iter().any(|g| g == IP_ADDRESS_GENERIC)
        {
            violations.push(SchemaViolation::new(
                &node_name,
                "inherit_from",
                &format!(
                    "cannot inherit from both '{IP_PREFIX_GENERIC}' and '{IP_ADDRESS_GENERIC}'"
                ),
            ));
        }

        for generic_kind in node.inherit_from.clone() {
            let generic = match branch.get_generic(&generic_kind) {
                Ok(generic) => generic,
                Err(SchemaBranchError::KindNotFound(_)) => {
                    violations.push(SchemaViolation::new(
                        &node_name,
                        "inherit_from",
                        &format!("inherits from undefined generic '{generic_kind}'"),
                    ));
                    continue;
                }
                Err(SchemaBranchError::WrongCategory { .. }) => {
                    violations.push(SchemaViolation::new(
                        &node_name,
                        "inherit_from",
                        &format!("'{generic_kind}' is not a generic and cannot be inherited from"),
                    ));
                    continue;
                }
                Err(other) => return Err(other.into()),
            };

            for attr in &generic.attributes {
                if node.get_attribute(&attr.name).is_none() {
                    let mut inherited = attr.clone();
                    inherited.id = None;
                    inherited.inherited = true;
                    node.attributes.push(inherited);
                }
            }
            for rel in &generic.relationships {
                if node.get_relationship(&rel.name).is_none() {
                    let mut inherited = rel.clone();
                    inherited.id = None;
                    inherited.inherited = true;
                    node.relationships.push(inherited);
                }
            }
            used_by.entry(generic_kind).or_default().push(node_name.clone());
        }

        branch.set(&node_name, SchemaObject::Node(node));
    }

    for generic_name in branch.generic_names() {
        let mut generic = branch.get_generic(&generic_name)?;
        let mut users = used_by.remove(&generic_name).unwrap_or_default();
        users.sort();
        users.dedup();
        generic.used_by = users;
        branch.set(&generic_name, SchemaObject::Generic(generic));
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(SchemaValidationError { violations }.into())
    }
}

/// Resolve each node's hierarchy declaration into parent/children kinds.
fn process_hierarchy(branch: &mut SchemaBranch) -> Result<(), SchemaProcessError> {
    let mut violations: Vec<SchemaViolation> = Vec::new();

    for node_name in branch.node_names() {
        let mut node = branch.get_node(&node_name)?;
        let Some(hierarchy) = node.hierarchy.clone() else {
            continue;
        };

        match branch.get_generic(&hierarchy) {
            Ok(generic) if generic.hierarchical => {}
            Ok(_) => {
                violations.push(SchemaViolation::new(
                    &node_name,
                    "hierarchy",
                    &format!("'{hierarchy}' is not a hierarchical generic"),
                ));
                continue;
            }
            Err(SchemaBranchError::KindNotFound(_))
            | Err(SchemaBranchError::WrongCategory { .. }) => {
                violations.push(SchemaViolation::new(
                    &node_name,
                    "hierarchy",
                    &format!("hierarchy '{hierarchy}' is not a defined generic"),
                ));
                continue;
            }
            Err(other) => return Err(other.into()),
        }

        if node.parent.is_none() {
            node.parent = Some(hierarchy.clone());
        }
        if node.children.is_none() {
            node.children = Some(hierarchy.clone());
        }
        branch.set(&node_name, SchemaObject::Node(node));
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(SchemaValidationError { violations }.into())
    }
}

/// A relationship is only as branch-aware as the stricter of its two
/// endpoints, unless the author was explicit.
fn process_branch_support(branch: &mut SchemaBranch) -> Result<(), SchemaProcessError> {
    let mut supports: BTreeMap<String, BranchSupportType> = BTreeMap::new();
    for kind in branch.kinds() {
        let support = match branch.get_shared(&kind)?.as_ref() {
            SchemaObject::Node(n) => n.branch,
            SchemaObject::Generic(g) => g.branch,
            SchemaObject::Profile(p) => p.branch,
        };
        supports.insert(kind, support);
    }

    for name in branch.kinds() {
        let mut object = branch.get(&name)?;
        let own_support = supports
            .get(&name)
            .copied()
            .unwrap_or(BranchSupportType::Aware);

        for attr in object.attributes_mut() {
            if attr.branch.is_none() {
                attr.branch = Some(own_support);
            }
        }
        for rel in object.relationships_mut() {
            if rel.branch.is_none() {
                let combined = supports
                    .get(&rel.peer)
                    .map(|peer| own_support.combine(*peer))
                    .unwrap_or(own_support);
                rel.branch = Some(combined);
            }
        }
        branch.set(&name, object);
    }
    Ok(())
}

/// Synthesize a profile kind per overridable node: the subset of the
/// node's attributes a profile may pre-populate, plus the bookkeeping
/// attributes every profile carries.
fn generate_profiles(branch: &mut SchemaBranch) -> Result<(), SchemaProcessError> {
    for node_name in branch.node_names() {
        let node = branch.get_node(&node_name)?;
        if !node.generate_profile || node.state == SchemaState::Absent {
            continue;
        }

        let mut profile_name = AttributeSchema::new(PROFILE_NAME_ATTRIBUTE, AttributeKind::Text);
        profile_name.unique = true;

        let mut priority = AttributeSchema::new(PROFILE_PRIORITY_ATTRIBUTE, AttributeKind::Number);
        priority.optional = true;
        priority.default_value = Some(serde_json::json!(1000));

        let mut attributes = vec![profile_name, priority];
        for attr in &node.attributes {
            if attr.unique || attr.read_only {
                continue;
            }
            let mut copy = attr.clone();
            copy.id = None;
            copy.optional = true;
            copy.inherited = false;
            attributes.push(copy);
        }

        let profile_kind = format!("{}{}", PROFILE_NAMESPACE, node.kind());
        let mut related = RelationshipSchema::new("related_nodes", &node.kind());
        related.kind = RelationshipKind::Profile;
        related.cardinality = RelationshipCardinality::Many;
        related.optional = true;
        related.identifier = Some(build_relationship_identifier(&profile_kind, &node.kind()));

        let profile = ProfileSchema {
            id: None,
            name: node.kind(),
            namespace: PROFILE_NAMESPACE.to_string(),
            label: Some(format!("Profile {}", node.label.clone().unwrap_or(node.name.clone()))),
            description: None,
            branch: node.branch,
            attributes,
            relationships: vec![related],
            state: SchemaState::Present,
        };
        branch.set(&profile_kind, SchemaObject::Profile(profile));
    }
    Ok(())
}

/// Every node can be a member or subscriber of groups.
fn add_group_relationships(branch: &mut SchemaBranch) -> Result<(), SchemaProcessError> {
    for node_name in branch.node_names() {
        let mut node = branch.get_node(&node_name)?;
        if node.get_relationship("member_of_groups").is_none() {
            let mut rel = RelationshipSchema::new("member_of_groups", GROUP_GENERIC);
            rel.kind = RelationshipKind::Group;
            rel.identifier = Some("group_member".to_string());
            rel.branch = Some(node.branch);
            node.relationships.push(rel);
        }
        if node.get_relationship("subscriber_of_groups").is_none() {
            let mut rel = RelationshipSchema::new("subscriber_of_groups", GROUP_GENERIC);
            rel.kind = RelationshipKind::Group;
            rel.identifier = Some("group_subscriber".to_string());
            rel.branch = Some(node.branch);
            node.relationships.push(rel);
        }
        branch.set(&node_name, SchemaObject::Node(node));
    }
    Ok(())
}

/// Inject the parent/children relationship pair for hierarchical nodes.
fn add_hierarchy_relationships(branch: &mut SchemaBranch) -> Result<(), SchemaProcessError> {
    for node_name in branch.node_names() {
        let mut node = branch.get_node(&node_name)?;
        let mut touched = false;

        if let Some(parent_kind) = node.parent.clone() {
            if node.get_relationship("parent").is_none() {
                let mut rel = RelationshipSchema::new("parent", &parent_kind);
                rel.kind = RelationshipKind::Hierarchy;
                rel.cardinality = RelationshipCardinality::One;
                rel.identifier = Some("parent__child".to_string());
                rel.max_count = 1;
                node.relationships.push(rel);
                touched = true;
            }
        }
        if let Some(children_kind) = node.children.clone() {
            if node.get_relationship("children").is_none() {
                let mut rel = RelationshipSchema::new("children", &children_kind);
                rel.kind = RelationshipKind::Hierarchy;
                rel.cardinality = RelationshipCardinality::Many;
                rel.identifier = Some("parent__child".to_string());
                node.relationships.push(rel);
                touched = true;
            }
        }
        if touched {
            branch.set(&node_name, SchemaObject::Node(node));
        }
    }
    Ok(())
}

/// Stable ordering weights: attributes first, then relationships, spaced
/// so authors can interleave explicit weights.
fn process_order_weights(branch: &mut SchemaBranch) -> Result<(), SchemaProcessError> {
    for name in all_object_names(branch) {
        let mut object = branch.get(&name)?;
        let mut position = 0u32;
        for attr in object.attributes_mut() {
            position += 1;
            if attr.order_weight.is_none() {
                attr.order_weight = Some(position * 1000);
            }
        }
        for rel in object.relationships_mut() {
            position += 1;
            if rel.order_weight.is_none() {
                rel.order_weight = Some(position * 1000);
            }
        }
        branch.set(&name, object);
    }
    Ok(())
}

fn process_labels(branch: &mut SchemaBranch) -> Result<(), SchemaProcessError> {
    for name in all_object_names(branch) {
        let mut object = branch.get(&name)?;
        if object.label_mut().is_none() {
            let label = humanize_name(object.display_name());
            *object.label_mut() = Some(label);
        }
        for attr in object.attributes_mut() {
            if attr.label.is_none() {
                attr.label = Some(humanize_name(&attr.name));
            }
        }
        for rel in object.relationships_mut() {
            if rel.label.is_none() {
                rel.label = Some(humanize_name(&rel.name));
            }
        }
        branch.set(&name, object);
    }
    Ok(())
}

fn process_dropdowns(branch: &mut SchemaBranch) -> Result<(), SchemaProcessError> {
    for name in all_object_names(branch) {
        let mut object = branch.get(&name)?;
        for attr in object.attributes_mut() {
            if attr.kind != AttributeKind::Dropdown {
                continue;
            }
            for (idx, choice) in attr.choices.iter_mut().enumerate() {
                if choice.label.is_none() {
                    choice.label = Some(humanize_name(&choice.name));
                }
                if choice.color.is_none() {
                    choice.color = Some(CHOICE_COLORS[idx % CHOICE_COLORS.len()].to_string());
                }
            }
        }
        branch.set(&name, object);
    }
    Ok(())
}

/// Component relationships cascade on delete; everything else defaults to
/// no action.
fn process_relationship_on_delete(branch: &mut SchemaBranch) -> Result<(), SchemaProcessError> {
    for name in branch.kinds() {
        let mut object = branch.get(&name)?;
        for rel in object.relationships_mut() {
            if rel.on_delete.is_none() {
                rel.on_delete = Some(if rel.kind == RelationshipKind::Component {
                    RelationshipDeleteBehavior::Cascade
                } else {
                    RelationshipDeleteBehavior::NoAction
                });
            }
        }
        branch.set(&name, object);
    }
    Ok(())
}

/// When only one of human-friendly-id / uniqueness-constraint is declared,
/// derive the other so lookups and uniqueness always agree.
fn process_human_friendly_id(branch: &mut SchemaBranch) -> Result<(), SchemaProcessError> {
    for node_name in branch.node_names() {
        let mut node = branch.get_node(&node_name)?;
        let mut touched = false;

        if node.human_friendly_id.is_empty() {
            let derived = node.uniqueness_constraints.iter().find_map(|constraint| {
                let [path] = constraint.as_slice() else {
                    return None;
                };
                let attr_name = path.strip_suffix("__value").unwrap_or(path);
                node.get_attribute(attr_name)
                    .map(|attr| format!("{}__value", attr.name))
            });
            if let Some(path) = derived {
                node.human_friendly_id = vec![path];
                touched = true;
            }
        } else if node.uniqueness_constraints.is_empty() {
            let paths: Vec<String> = node
                .human_friendly_id
                .iter()
                .filter_map(|path| {
                    let attr_name = path.strip_suffix("__value").unwrap_or(path);
                    node.get_attribute(attr_name)
                        .map(|attr| format!("{}__value", attr.name))
                })
                .collect();
            if !paths.is_empty() && paths.len() == node.human_friendly_id.len() {
                node.uniqueness_constraints = vec![paths];
                touched = true;
            }
        }

        if touched {
            branch.set(&node_name, SchemaObject::Node(node));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::schema_branch::SchemaCache;
    use crate::model::{GenericSchema, NodeSchema};
    use std::sync::Arc;

    fn empty_branch() -> SchemaBranch {
        SchemaBranch::new(Arc::new(SchemaCache::new()), Some("main"))
    }

    fn simple_node(namespace: &str, name: &str) -> NodeSchema {
        let mut node = NodeSchema::new(namespace, name);
        node.generate_profile = false;
        node.attributes
            .push(AttributeSchema::new("name", AttributeKind::Text));
        node
    }

    #[test]
    fn identifiers_come_from_the_sorted_kind_pair() {
        let mut branch = empty_branch();
        let mut widget = simple_node("Test", "Widget");
        widget
            .relationships
            .push(RelationshipSchema::new("gadgets", "TestGadget"));
        branch.set("TestWidget", SchemaObject::Node(widget));
        branch.set("TestGadget", SchemaObject::Node(simple_node("Test", "Gadget")));

        branch.process(false).unwrap();

        let node = branch.get_node("TestWidget").unwrap();
        assert_eq!(
            node.get_relationship("gadgets").unwrap().identifier.as_deref(),
            Some("testgadget__testwidget")
        );
    }

    #[test]
    fn default_value_makes_an_attribute_optional() {
        let mut branch = empty_branch();
        let mut node = simple_node("Test", "Widget");
        let mut status = AttributeSchema::new("status", AttributeKind::Text);
        status.default_value = Some(serde_json::json!("active"));
        status.optional = false;
        node.attributes.push(status);
        branch.set("TestWidget", SchemaObject::Node(node));

        branch.process(false).unwrap();

        let node = branch.get_node("TestWidget").unwrap();
        assert!(node.get_attribute("status").unwrap().optional);
        assert!(!node.get_attribute("name").unwrap().optional);
    }

    #[test]
    fn cardinality_one_counts_are_normalized() {
        let mut branch = empty_branch();
        let mut node = simple_node("Test", "Widget");
        let mut owner = RelationshipSchema::new("owner", "TestPerson");
        owner.cardinality = RelationshipCardinality::One;
        owner.optional = false;
        node.relationships.push(owner);
        branch.set("TestWidget", SchemaObject::Node(node));
        branch.set("TestPerson", SchemaObject::Node(simple_node("Test", "Person")));

        branch.process(false).unwrap();

        let node = branch.get_node("TestWidget").unwrap();
        let owner = node.get_relationship("owner").unwrap();
        assert_eq!((owner.min_count, owner.max_count), (1, 1));
    }

    #[test]
    fn inheritance_copies_generic_elements_and_tracks_used_by() {
        let mut branch = empty_branch();
        let mut generic = GenericSchema::new("Core", "Asset");
        let mut serial = AttributeSchema::new("serial", AttributeKind::Text);
        serial.optional = true;
        generic.attributes.push(serial);
        branch.set("CoreAsset", SchemaObject::Generic(generic));

        let mut node = simple_node("Test", "Widget");
        node.inherit_from = vec!["CoreAsset".to_string()];
        branch.set("TestWidget", SchemaObject::Node(node));

        branch.process(false).unwrap();

        let node = branch.get_node("TestWidget").unwrap();
        let serial = node.get_attribute("serial").unwrap();
        assert!(serial.inherited);

        let generic = branch.get_generic("CoreAsset").unwrap();
        assert_eq!(generic.used_by, vec!["TestWidget".to_string()]);
    }

    #[test]
    fn prefix_and_address_generics_cannot_be_combined() {
        let mut branch = empty_branch();
        branch.set(
            IP_PREFIX_GENERIC,
            SchemaObject::Generic(GenericSchema::new("Builtin", "IPPrefix")),
        );
        branch.set(
            IP_ADDRESS_GENERIC,
            SchemaObject::Generic(GenericSchema::new("Builtin", "IPAddress")),
        );
        let mut node = simple_node("Test", "Subnet");
        node.inherit_from = vec![IP_PREFIX_GENERIC.to_string(), IP_ADDRESS_GENERIC.to_string()];
        branch.set("TestSubnet", SchemaObject::Node(node));

        let err = branch.process(false).unwrap_err();
        assert!(err.to_string().contains(IP_PREFIX_GENERIC));
    }

    #[test]
    fn relationship_branch_support_takes_the_stricter_endpoint() {
        let mut branch = empty_branch();
        let mut widget = simple_node("Test", "Widget");
        widget
            .relationships
            .push(RelationshipSchema::new("site", "TestSite"));
        branch.set("TestWidget", SchemaObject::Node(widget));

        let mut site = simple_node("Test", "Site");
        site.branch = BranchSupportType::Agnostic;
        branch.set("TestSite", SchemaObject::Node(site));

        branch.process(false).unwrap();

        let node = branch.get_node("TestWidget").unwrap();
        assert_eq!(
            node.get_relationship("site").unwrap().branch,
            Some(BranchSupportType::Agnostic)
        );
        assert_eq!(
            node.get_attribute("name").unwrap().branch,
            Some(BranchSupportType::Aware)
        );
    }

    #[test]
    fn profiles_carry_only_overridable_attributes() {
        let mut branch = empty_branch();
        let mut node = simple_node("Test", "Widget");
        node.generate_profile = true;
        let mut serial = AttributeSchema::new("serial", AttributeKind::Text);
        serial.unique = true;
        node.attributes.push(serial);
        let mut color = AttributeSchema::new("color", AttributeKind::Text);
        color.optional = false;
        node.attributes.push(color);
        branch.set("TestWidget", SchemaObject::Node(node));

        branch.process(false).unwrap();

        let profile = branch.get_profile("ProfileTestWidget").unwrap();
        assert!(profile.attributes.iter().any(|a| a.name == PROFILE_NAME_ATTRIBUTE));
        assert!(profile.attributes.iter().any(|a| a.name == PROFILE_PRIORITY_ATTRIBUTE));
        let color = profile.attributes.iter().find(|a| a.name == "color").unwrap();
        assert!(color.optional, "profile attributes are always optional");
        assert!(
            !profile.attributes.iter().any(|a| a.name == "serial"),
            "unique attributes cannot be overridden by a profile"
        );
    }

    #[test]
    fn group_relationships_and_delete_behavior_are_defaulted() {
        let mut branch = empty_branch();
        let mut widget = simple_node("Test", "Widget");
        let mut part = RelationshipSchema::new("parts", "TestPart");
        part.kind = RelationshipKind::Component;
        widget.relationships.push(part);
        widget
            .relationships
            .push(RelationshipSchema::new("site", "TestSite"));
        branch.set("TestWidget", SchemaObject::Node(widget));
        branch.set("TestPart", SchemaObject::Node(simple_node("Test", "Part")));
        branch.set("TestSite", SchemaObject::Node(simple_node("Test", "Site")));

        branch.process(false).unwrap();

        let node = branch.get_node("TestWidget").unwrap();
        assert!(node.get_relationship("member_of_groups").is_some());
        assert!(node.get_relationship("subscriber_of_groups").is_some());
        assert_eq!(
            node.get_relationship("parts").unwrap().on_delete,
            Some(RelationshipDeleteBehavior::Cascade)
        );
        assert_eq!(
            node.get_relationship("site").unwrap().on_delete,
            Some(RelationshipDeleteBehavior::NoAction)
        );
    }

    #[test]
    fn order_weights_and_labels_are_generated() {
        let mut branch = empty_branch();
        let mut node = simple_node("Test", "Widget");
        node.attributes
            .push(AttributeSchema::new("serial_number", AttributeKind::Text));
        branch.set("TestWidget", SchemaObject::Node(node));

        branch.process(false).unwrap();

        let node = branch.get_node("TestWidget").unwrap();
        assert_eq!(node.label.as_deref(), Some("Widget"));
        let serial = node.get_attribute("serial_number").unwrap();
        assert_eq!(serial.label.as_deref(), Some("Serial Number"));
        assert_eq!(node.attributes[0].order_weight, Some(1000));
        assert_eq!(node.attributes[1].order_weight, Some(2000));
    }

    #[test]
    fn dropdown_choices_get_labels_and_colors() {
        let mut branch = empty_branch();
        let mut node = simple_node("Test", "Widget");
        let mut status = AttributeSchema::new("status", AttributeKind::Dropdown);
        status.choices = vec![
            crate::model::DropdownChoice {
                name: "in_service".to_string(),
                label: None,
                color: None,
                description: None,
            },
            crate::model::DropdownChoice {
                name: "retired".to_string(),
                label: Some("Gone".to_string()),
                color: Some("#000000".to_string()),
                description: None,
            },
        ];
        node.attributes.push(status);
        branch.set("TestWidget", SchemaObject::Node(node));

        branch.process(false).unwrap();

        let node = branch.get_node("TestWidget").unwrap();
        let status = node.get_attribute("status").unwrap();
        assert_eq!(status.choices[0].label.as_deref(), Some("In Service"));
        assert_eq!(status.choices[0].color.as_deref(), Some(CHOICE_COLORS[0]));
        assert_eq!(status.choices[1].label.as_deref(), Some("Gone"));
        assert_eq!(status.choices[1].color.as_deref(), Some("#000000"));
    }

    #[test]
    fn human_friendly_id_and_uniqueness_derive_each_other() {
        let mut branch = empty_branch();

        let mut from_constraint = simple_node("Test", "Widget");
        from_constraint.uniqueness_constraints = vec![vec!["name__value".to_string()]];
        branch.set("TestWidget", SchemaObject::Node(from_constraint));

        let mut from_hfid = simple_node("Test", "Gadget");
        from_hfid.human_friendly_id = vec!["name__value".to_string()];
        branch.set("TestGadget", SchemaObject::Node(from_hfid));

        branch.process(false).unwrap();

        let widget = branch.get_node("TestWidget").unwrap();
        assert_eq!(widget.human_friendly_id, vec!["name__value".to_string()]);

        let gadget = branch.get_node("TestGadget").unwrap();
        assert_eq!(
            gadget.uniqueness_constraints,
            vec![vec!["name__value".to_string()]]
        );
    }

    #[test]
    fn hierarchy_wiring_injects_parent_and_children() {
        let mut branch = empty_branch();
        let mut location = GenericSchema::new("Core", "Location");
        location.hierarchical = true;
        branch.set("CoreLocation", SchemaObject::Generic(location));

        let mut site = simple_node("Test", "Site");
        site.hierarchy = Some("CoreLocation".to_string());
        branch.set("TestSite", SchemaObject::Node(site));

        branch.process(false).unwrap();

        let site = branch.get_node("TestSite").unwrap();
        assert_eq!(site.parent.as_deref(), Some("CoreLocation"));
        let parent = site.get_relationship("parent").unwrap();
        assert_eq!(parent.cardinality, RelationshipCardinality::One);
        assert_eq!(parent.kind, RelationshipKind::Hierarchy);
        let children = site.get_relationship("children").unwrap();
        assert_eq!(children.cardinality, RelationshipCardinality::Many);
    }

    #[test]
    fn hierarchy_against_a_non_hierarchical_generic_fails() {
        let mut branch = empty_branch();
        branch.set(
            "CoreThing",
            SchemaObject::Generic(GenericSchema::new("Core", "Thing")),
        );
        let mut site = simple_node("Test", "Site");
        site.hierarchy = Some("CoreThing".to_string());
        branch.set("TestSite", SchemaObject::Node(site));

        let err = branch.process(false).unwrap_err();
        assert!(err.to_string().contains("hierarchical"));
    }
}
