use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type Id = String;

pub fn generate_id() -> Id {
    Uuid::new_v4().to_string()
}

/// How a schema element participates in branch versioning.
///
/// Ordering matters: the variants are declared from least to most
/// branch-aware so that combining two support levels can take the minimum
/// ("stricter endpoint wins").
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum BranchSupportType {
    /// Written once, visible from every branch
    Agnostic,
    /// Versioned per branch but never carried across a merge
    Local,
    /// Fully branch-versioned
    Aware,
}

impl BranchSupportType {
    /// Combine the support levels of a relationship's two endpoints.
    pub fn combine(self, other: BranchSupportType) -> BranchSupportType {
        self.min(other)
    }
}

impl Default for BranchSupportType {
    fn default() -> Self {
        BranchSupportType::Aware
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationshipKind {
    Generic,
    Attribute,
    Component,
    Parent,
    Group,
    Hierarchy,
    Profile,
}

impl Default for RelationshipKind {
    fn default() -> Self {
        RelationshipKind::Generic
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationshipCardinality {
    One,
    Many,
}

impl Default for RelationshipCardinality {
    fn default() -> Self {
        RelationshipCardinality::Many
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationshipDeleteBehavior {
    NoAction,
    Cascade,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationshipDirection {
    Bidirectional,
    Outbound,
    Inbound,
}

impl Default for RelationshipDirection {
    fn default() -> Self {
        RelationshipDirection::Bidirectional
    }
}

/// Whether a schema object is live or has been marked for removal on a
/// candidate branch. An `Absent` object on the new side of a diff is
/// reported as removed even when its id is still known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaState {
    Present,
    Absent,
}

impl Default for SchemaState {
    fn default() -> Self {
        SchemaState::Present
    }
}

/// SHA-256 content hash of any serializable value, hex encoded.
///
/// Struct field order is fixed by the type definitions and collections in
/// the schema models are ordered, so the digest is deterministic for equal
/// content regardless of how the value was assembled.
pub fn content_hash<T: Serialize>(value: &T) -> String {
    use sha2::{Digest, Sha256};

    let serialized =
        serde_json::to_string(value).expect("schema models serialize to JSON");
    let mut hasher = Sha256::new();
    hasher.update(serialized.as_bytes());
    hex::encode(hasher.finalize())
}

/// Build a human readable label from a snake_case or CamelCase name.
pub fn humanize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut capitalize_next = true;
    for (i, c) in name.chars().enumerate() {
        if c == '_' || c == '-' {
            out.push(' ');
            capitalize_next = true;
            continue;
        }
        if c.is_uppercase() && i > 0 && !capitalize_next {
            out.push(' ');
        }
        if capitalize_next {
            out.extend(c.to_uppercase());
            capitalize_next = false;
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn branch_support_combines_to_the_stricter_level() {
        assert_eq!(
            BranchSupportType::Aware.combine(BranchSupportType::Aware),
            BranchSupportType::Aware
        );
        assert_eq!(
            BranchSupportType::Aware.combine(BranchSupportType::Agnostic),
            BranchSupportType::Agnostic
        );
        assert_eq!(
            BranchSupportType::Local.combine(BranchSupportType::Aware),
            BranchSupportType::Local
        );
    }

    #[test]
    fn content_hash_is_stable_for_equal_values() {
        let a = vec!["alpha".to_string(), "beta".to_string()];
        let b = vec!["alpha".to_string(), "beta".to_string()];
        assert_eq!(content_hash(&a), content_hash(&b));
        let c = vec!["beta".to_string(), "alpha".to_string()];
        assert_ne!(content_hash(&a), content_hash(&c));
    }

    #[test]
    fn humanize_handles_snake_and_camel_case() {
        assert_eq!(humanize_name("first_name"), "First Name");
        assert_eq!(humanize_name("TestWidget"), "Test Widget");
        assert_eq!(humanize_name("name"), "Name");
    }
}
