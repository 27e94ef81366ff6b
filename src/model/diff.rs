use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Field-level difference between two versions of one schema object.
///
/// Keys are field names; a nested diff is present when both sides hold an
/// object for that field. `added`/`removed` are relative to the *after*
/// side of the comparison.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HashableModelDiff {
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub added: BTreeMap<String, Option<HashableModelDiff>>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub changed: BTreeMap<String, Option<HashableModelDiff>>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub removed: BTreeMap<String, Option<HashableModelDiff>>,
}

impl HashableModelDiff {
    pub fn has_diff(&self) -> bool {
        !self.added.is_empty() || !self.changed.is_empty() || !self.removed.is_empty()
    }

    /// Compare two JSON renderings field by field. Non-object values are
    /// compared wholesale; nested objects produce a nested diff.
    pub fn between(before: &Value, after: &Value) -> Self {
        let mut diff = HashableModelDiff::default();

        let (Some(before_map), Some(after_map)) = (before.as_object(), after.as_object())
        else {
            if before != after {
                diff.changed.insert("value".to_string(), None);
            }
            return diff;
        };

        for (key, after_value) in after_map {
            match before_map.get(key) {
                None => {
                    diff.added.insert(key.clone(), None);
                }
                Some(before_value) if before_value == after_value => {}
                Some(before_value) => {
                    let nested = if before_value.is_object() && after_value.is_object() {
                        Some(Self::between(before_value, after_value))
                    } else {
                        None
                    };
                    diff.changed.insert(key.clone(), nested);
                }
            }
        }
        for key in before_map.keys() {
            if !after_map.contains_key(key) {
                diff.removed.insert(key.clone(), None);
            }
        }

        diff
    }
}

/// Outcome of diffing two schema branches, keyed by kind. Entities are
/// matched by stable id first so a rename shows up under `changed`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SchemaDiff {
    pub added: BTreeMap<String, HashableModelDiff>,
    pub changed: BTreeMap<String, HashableModelDiff>,
    pub removed: BTreeMap<String, HashableModelDiff>,
}

impl SchemaDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.changed.is_empty() && self.removed.is_empty()
    }

    /// Every kind touched by this diff, in sorted order.
    pub fn all_kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self
            .added
            .keys()
            .chain(self.changed.keys())
            .chain(self.removed.keys())
            .cloned()
            .collect();
        kinds.sort();
        kinds.dedup();
        kinds
    }
}
