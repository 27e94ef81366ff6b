use crate::model::{
    content_hash, BranchSupportType, Id, RelationshipCardinality, RelationshipDeleteBehavior,
    RelationshipDirection, RelationshipKind, SchemaState,
};
use crate::model::diff::HashableModelDiff;
use serde::{Deserialize, Serialize};

/// Generic kind every group relationship points at.
pub const GROUP_GENERIC: &str = "CoreGroup";

/// Generic kinds that cannot both be inherited by the same node: a node is
/// either a prefix container or an address, never both.
pub const IP_PREFIX_GENERIC: &str = "BuiltinIPPrefix";
pub const IP_ADDRESS_GENERIC: &str = "BuiltinIPAddress";

/// Namespace used for synthesized profile kinds.
pub const PROFILE_NAMESPACE: &str = "Profile";

pub const PROFILE_NAME_ATTRIBUTE: &str = "profile_name";
pub const PROFILE_PRIORITY_ATTRIBUTE: &str = "profile_priority";

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum AttributeKind {
    Text,
    Number,
    Boolean,
    Dropdown,
    DateTime,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DropdownChoice {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeSchema {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Id>,
    pub name: String,
    pub kind: AttributeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub read_only: bool,
    /// Default value for new nodes; declaring one makes the attribute optional
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<serde_json::Value>,
    /// Validation pattern applied by the mutation layer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub regex: Option<String>,
    /// Branch support; inherits the owning node's level when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<BranchSupportType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_weight: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<DropdownChoice>,
    #[serde(default)]
    pub inherited: bool,
}

impl AttributeSchema {
    pub fn new(name: &str, kind: AttributeKind) -> Self {
        Self {
            id: None,
            name: name.to_string(),
            kind,
            label: None,
            description: None,
            optional: false,
            unique: false,
            read_only: false,
            default_value: None,
            regex: None,
            branch: None,
            order_weight: None,
            choices: Vec::new(),
            inherited: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipSchema {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Id>,
    pub name: String,
    /// Kind of the node on the other side
    pub peer: String,
    #[serde(default)]
    pub kind: RelationshipKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Stable edge identifier; generated from the sorted kind pair when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    #[serde(default)]
    pub cardinality: RelationshipCardinality,
    #[serde(default = "default_true")]
    pub optional: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<BranchSupportType>,
    #[serde(default)]
    pub min_count: u32,
    /// 0 means unbounded
    #[serde(default)]
    pub max_count: u32,
    #[serde(default)]
    pub direction: RelationshipDirection,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on_delete: Option<RelationshipDeleteBehavior>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_weight: Option<u32>,
    #[serde(default)]
    pub inherited: bool,
    #[serde(default)]
    pub read_only: bool,
}

impl RelationshipSchema {
    pub fn new(name: &str, peer: &str) -> Self {
        Self {
            id: None,
            name: name.to_string(),
            peer: peer.to_string(),
            kind: RelationshipKind::default(),
            label: None,
            description: None,
            identifier: None,
            cardinality: RelationshipCardinality::default(),
            optional: true,
            branch: None,
            min_count: 0,
            max_count: 0,
            direction: RelationshipDirection::default(),
            on_delete: None,
            order_weight: None,
            inherited: false,
            read_only: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSchema {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Id>,
    pub name: String,
    pub namespace: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub branch: BranchSupportType,
    /// Generic kinds this node inherits attributes and relationships from
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inherit_from: Vec<String>,
    #[serde(default)]
    pub attributes: Vec<AttributeSchema>,
    #[serde(default)]
    pub relationships: Vec<RelationshipSchema>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_filter: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub display_labels: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub order_by: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub uniqueness_constraints: Vec<Vec<String>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub human_friendly_id: Vec<String>,
    /// Whether a profile kind is synthesized for this node
    #[serde(default = "default_true")]
    pub generate_profile: bool,
    /// Hierarchy generic this node takes part in, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hierarchy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub children: Option<String>,
    #[serde(default)]
    pub state: SchemaState,
}

impl NodeSchema {
    pub fn new(namespace: &str, name: &str) -> Self {
        Self {
            id: None,
            name: name.to_string(),
            namespace: namespace.to_string(),
            label: None,
            description: None,
            branch: BranchSupportType::default(),
            inherit_from: Vec::new(),
            attributes: Vec::new(),
            relationships: Vec::new(),
            default_filter: None,
            display_labels: Vec::new(),
            order_by: Vec::new(),
            uniqueness_constraints: Vec::new(),
            human_friendly_id: Vec::new(),
            generate_profile: true,
            hierarchy: None,
            parent: None,
            children: None,
            state: SchemaState::Present,
        }
    }

    pub fn kind(&self) -> String {
        format!("{}{}", self.namespace, self.name)
    }

    pub fn get_attribute(&self, name: &str) -> Option<&AttributeSchema> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn get_relationship(&self, name: &str) -> Option<&RelationshipSchema> {
        self.relationships.iter().find(|r| r.name == name)
    }

    pub fn get_relationship_by_identifier(
        &self,
        identifier: &str,
    ) -> Option<&RelationshipSchema> {
        self.relationships
            .iter()
            .find(|r| r.identifier.as_deref() == Some(identifier))
    }

    pub fn mandatory_relationships(&self) -> impl Iterator<Item = &RelationshipSchema> {
        self.relationships.iter().filter(|r| !r.optional)
    }

    /// Whether a schema path like `name__value`, `name` (attribute) or a
    /// cardinality-one relationship name resolves on this node.
    pub fn has_local_path(&self, path: &str) -> bool {
        let attr_name = path.strip_suffix("__value").unwrap_or(path);
        if self.get_attribute(attr_name).is_some() {
            return true;
        }
        self.get_relationship(path)
            .map(|r| r.cardinality == RelationshipCardinality::One)
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenericSchema {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Id>,
    pub name: String,
    pub namespace: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub branch: BranchSupportType,
    #[serde(default)]
    pub attributes: Vec<AttributeSchema>,
    #[serde(default)]
    pub relationships: Vec<RelationshipSchema>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_filter: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub display_labels: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub order_by: Vec<String>,
    /// Whether this generic anchors a hierarchy of nodes
    #[serde(default)]
    pub hierarchical: bool,
    /// Node kinds inheriting from this generic; recomputed during processing
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub used_by: Vec<String>,
    #[serde(default)]
    pub state: SchemaState,
}

impl GenericSchema {
    pub fn new(namespace: &str, name: &str) -> Self {
        Self {
            id: None,
            name: name.to_string(),
            namespace: namespace.to_string(),
            label: None,
            description: None,
            branch: BranchSupportType::default(),
            attributes: Vec::new(),
            relationships: Vec::new(),
            default_filter: None,
            display_labels: Vec::new(),
            order_by: Vec::new(),
            hierarchical: false,
            used_by: Vec::new(),
            state: SchemaState::Present,
        }
    }

    pub fn kind(&self) -> String {
        format!("{}{}", self.namespace, self.name)
    }

    pub fn get_attribute(&self, name: &str) -> Option<&AttributeSchema> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn get_relationship(&self, name: &str) -> Option<&RelationshipSchema> {
        self.relationships.iter().find(|r| r.name == name)
    }
}

/// Synthesized per overridable node kind; carries the subset of the node's
/// attributes a profile may pre-populate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileSchema {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Id>,
    pub name: String,
    pub namespace: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub branch: BranchSupportType,
    #[serde(default)]
    pub attributes: Vec<AttributeSchema>,
    #[serde(default)]
    pub relationships: Vec<RelationshipSchema>,
    #[serde(default)]
    pub state: SchemaState,
}

impl ProfileSchema {
    pub fn kind(&self) -> String {
        format!("{}{}", self.namespace, self.name)
    }
}

/// Closed discriminator over the three schema object categories. Routing
/// into per-category maps always matches on this enum, never on names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "category", rename_all = "lowercase")]
pub enum SchemaObject {
    Node(NodeSchema),
    Generic(GenericSchema),
    Profile(ProfileSchema),
}

impl SchemaObject {
    pub fn kind(&self) -> String {
        match self {
            SchemaObject::Node(n) => n.kind(),
            SchemaObject::Generic(g) => g.kind(),
            SchemaObject::Profile(p) => p.kind(),
        }
    }

    pub fn id(&self) -> Option<&Id> {
        match self {
            SchemaObject::Node(n) => n.id.as_ref(),
            SchemaObject::Generic(g) => g.id.as_ref(),
            SchemaObject::Profile(p) => p.id.as_ref(),
        }
    }

    pub fn state(&self) -> SchemaState {
        match self {
            SchemaObject::Node(n) => n.state,
            SchemaObject::Generic(g) => g.state,
            SchemaObject::Profile(p) => p.state,
        }
    }

    pub fn attributes(&self) -> &[AttributeSchema] {
        match self {
            SchemaObject::Node(n) => &n.attributes,
            SchemaObject::Generic(g) => &g.attributes,
            SchemaObject::Profile(p) => &p.attributes,
        }
    }

    pub fn attributes_mut(&mut self) -> &mut Vec<AttributeSchema> {
        match self {
            SchemaObject::Node(n) => &mut n.attributes,
            SchemaObject::Generic(g) => &mut g.attributes,
            SchemaObject::Profile(p) => &mut p.attributes,
        }
    }

    pub fn relationships(&self) -> &[RelationshipSchema] {
        match self {
            SchemaObject::Node(n) => &n.relationships,
            SchemaObject::Generic(g) => &g.relationships,
            SchemaObject::Profile(p) => &p.relationships,
        }
    }

    pub fn relationships_mut(&mut self) -> &mut Vec<RelationshipSchema> {
        match self {
            SchemaObject::Node(n) => &mut n.relationships,
            SchemaObject::Generic(g) => &mut g.relationships,
            SchemaObject::Profile(p) => &mut p.relationships,
        }
    }

    pub fn label_mut(&mut self) -> &mut Option<String> {
        match self {
            SchemaObject::Node(n) => &mut n.label,
            SchemaObject::Generic(g) => &mut g.label,
            SchemaObject::Profile(p) => &mut p.label,
        }
    }

    pub fn display_name(&self) -> &str {
        match self {
            SchemaObject::Node(n) => &n.name,
            SchemaObject::Generic(g) => &g.name,
            SchemaObject::Profile(p) => &p.name,
        }
    }

    /// Content hash over the canonical JSON of the object.
    pub fn hash(&self) -> String {
        content_hash(self)
    }

    /// Field-level diff against another object (typically the same entity
    /// on another branch, possibly renamed).
    pub fn diff(&self, other: &SchemaObject) -> HashableModelDiff {
        let before = serde_json::to_value(self).unwrap_or_default();
        let after = serde_json::to_value(other).unwrap_or_default();
        HashableModelDiff::between(&before, &after)
    }
}

/// Top-level document accepted by `SchemaBranch::load_schema`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaRoot {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default)]
    pub generics: Vec<GenericSchema>,
    #[serde(default)]
    pub nodes: Vec<NodeSchema>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_concatenates_namespace_and_name() {
        let node = NodeSchema::new("Test", "Widget");
        assert_eq!(node.kind(), "TestWidget");
    }

    #[test]
    fn hash_ignores_construction_history_but_not_content() {
        let a = SchemaObject::Node(NodeSchema::new("Test", "Widget"));
        let b = SchemaObject::Node(NodeSchema::new("Test", "Widget"));
        assert_eq!(a.hash(), b.hash());

        let mut renamed = NodeSchema::new("Test", "Widget");
        renamed.description = Some("a widget".to_string());
        assert_ne!(a.hash(), SchemaObject::Node(renamed).hash());
    }

    #[test]
    fn local_path_resolution_covers_attributes_and_rels() {
        let mut node = NodeSchema::new("Test", "Widget");
        node.attributes.push(AttributeSchema::new("name", AttributeKind::Text));
        let mut rel = RelationshipSchema::new("owner", "TestPerson");
        rel.cardinality = RelationshipCardinality::One;
        node.relationships.push(rel);
        let mut many_rel = RelationshipSchema::new("tags", "TestTag");
        many_rel.cardinality = RelationshipCardinality::Many;
        node.relationships.push(many_rel);

        assert!(node.has_local_path("name__value"));
        assert!(node.has_local_path("name"));
        assert!(node.has_local_path("owner"));
        assert!(!node.has_local_path("tags"));
        assert!(!node.has_local_path("missing__value"));
    }

    #[test]
    fn schema_object_round_trips_with_category_tag() {
        let obj = SchemaObject::Generic(GenericSchema::new("Core", "Group"));
        let json = serde_json::to_string(&obj).unwrap();
        assert!(json.contains("\"category\":\"generic\""));
        let back: SchemaObject = serde_json::from_str(&json).unwrap();
        assert_eq!(back, obj);
    }
}
