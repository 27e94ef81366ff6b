use crate::model::diff::{HashableModelDiff, SchemaDiff};
use crate::model::{
    GenericSchema, Id, NodeSchema, ProfileSchema, SchemaObject, SchemaRoot, SchemaState,
};
use itertools::Itertools;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchemaBranchError {
    #[error("schema kind '{0}' is not registered on this branch")]
    KindNotFound(String),
    #[error("schema kind '{kind}' points at hash '{hash}' missing from the cache")]
    HashMissing { kind: String, hash: String },
    #[error("schema kind '{kind}' is a {actual}, expected a {expected}")]
    WrongCategory {
        kind: String,
        expected: &'static str,
        actual: &'static str,
    },
}

/// Content-addressed store of schema objects, shared by reference across
/// every SchemaBranch. Append-only: a hash always maps to an equivalent
/// object, entries are never mutated in place, so concurrent readers can
/// never observe a torn write.
#[derive(Debug, Default)]
pub struct SchemaCache {
    entries: RwLock<HashMap<String, Arc<SchemaObject>>>,
}

impl SchemaCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, hash: &str) -> Option<Arc<SchemaObject>> {
        self.entries.read().get(hash).cloned()
    }

    /// Insert an object under its content hash and return the hash. An
    /// existing entry is kept as is.
    pub fn insert(&self, object: SchemaObject) -> String {
        let hash = object.hash();
        let mut entries = self.entries.write();
        entries.entry(hash.clone()).or_insert_with(|| Arc::new(object));
        hash
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

/// Per-branch index of the logical data model: three kind→hash maps over a
/// shared object cache. Copy-on-write discipline: `get` hands out deep
/// copies, a mutated object is written back through `set` under a fresh
/// hash, and `duplicate` only copies the index.
#[derive(Debug, Clone)]
pub struct SchemaBranch {
    cache: Arc<SchemaCache>,
    pub name: Option<String>,
    nodes: BTreeMap<String, String>,
    generics: BTreeMap<String, String>,
    profiles: BTreeMap<String, String>,
}

impl SchemaBranch {
    pub fn new(cache: Arc<SchemaCache>, name: Option<&str>) -> Self {
        Self {
            cache,
            name: name.map(str::to_string),
            nodes: BTreeMap::new(),
            generics: BTreeMap::new(),
            profiles: BTreeMap::new(),
        }
    }

    pub fn cache(&self) -> Arc<SchemaCache> {
        Arc::clone(&self.cache)
    }

    /// Register an object under a kind name; routes into the right map on
    /// the object's category discriminator. Returns the content hash.
    pub fn set(&mut self, name: &str, object: SchemaObject) -> String {
        let hash = object.hash();
        let target = match &object {
            SchemaObject::Node(_) => &mut self.nodes,
            SchemaObject::Generic(_) => &mut self.generics,
            SchemaObject::Profile(_) => &mut self.profiles,
        };
        target.insert(name.to_string(), hash.clone());
        self.cache.insert(object);
        hash
    }

    /// Remove a kind from this branch's index. Cache entries are left in
    /// place for other branches that still reference them.
    pub fn remove(&mut self, name: &str) -> bool {
        self.nodes.remove(name).is_some()
            || self.generics.remove(name).is_some()
            || self.profiles.remove(name).is_some()
    }

    /// Run the full processing pipeline over this branch's objects.
    pub fn process(
        &mut self,
        validate: bool,
    ) -> Result<(), crate::logic::schema_process::SchemaProcessError> {
        crate::logic::schema_process::process(self, validate)
    }

    fn hash_for(&self, name: &str) -> Option<&String> {
        self.nodes
            .get(name)
            .or_else(|| self.generics.get(name))
            .or_else(|| self.profiles.get(name))
    }

    pub fn has(&self, name: &str) -> bool {
        self.hash_for(name).is_some()
    }

    /// Shared read-only handle to the cached object. Callers must never
    /// mutate through this path.
    pub fn get_shared(&self, name: &str) -> Result<Arc<SchemaObject>, SchemaBranchError> {
        let hash = self
            .hash_for(name)
            .ok_or_else(|| SchemaBranchError::KindNotFound(name.to_string()))?;
        self.cache
            .get(hash)
            .ok_or_else(|| SchemaBranchError::HashMissing {
                kind: name.to_string(),
                hash: hash.clone(),
            })
    }

    /// Deep copy of the object for mutation.
    pub fn get(&self, name: &str) -> Result<SchemaObject, SchemaBranchError> {
        self.get_shared(name).map(|shared| (*shared).clone())
    }

    pub fn get_node(&self, name: &str) -> Result<NodeSchema, SchemaBranchError> {
        match self.get(name)? {
            SchemaObject::Node(node) => Ok(node),
            other => Err(SchemaBranchError::WrongCategory {
                kind: name.to_string(),
                expected: "node",
                actual: category_name(&other),
            }),
        }
    }

    pub fn get_generic(&self, name: &str) -> Result<GenericSchema, SchemaBranchError> {
        match self.get(name)? {
            SchemaObject::Generic(generic) => Ok(generic),
            other => Err(SchemaBranchError::WrongCategory {
                kind: name.to_string(),
                expected: "generic",
                actual: category_name(&other),
            }),
        }
    }

    pub fn get_profile(&self, name: &str) -> Result<ProfileSchema, SchemaBranchError> {
        match self.get(name)? {
            SchemaObject::Profile(profile) => Ok(profile),
            other => Err(SchemaBranchError::WrongCategory {
                kind: name.to_string(),
                expected: "profile",
                actual: category_name(&other),
            }),
        }
    }

    pub fn node_names(&self) -> Vec<String> {
        self.nodes.keys().cloned().collect()
    }

    pub fn generic_names(&self) -> Vec<String> {
        self.generics.keys().cloned().collect()
    }

    pub fn profile_names(&self) -> Vec<String> {
        self.profiles.keys().cloned().collect()
    }

    /// Every node and generic kind. Profiles are derived objects and are
    /// excluded from identity-level bookkeeping.
    pub fn kinds(&self) -> Vec<String> {
        self.nodes.keys().chain(self.generics.keys()).cloned().collect()
    }

    /// kind → stable id for every node and generic.
    pub fn get_all_kind_id_map(&self) -> HashMap<String, Option<Id>> {
        let mut map = HashMap::new();
        for kind in self.kinds() {
            let id = self
                .get_shared(&kind)
                .ok()
                .and_then(|obj| obj.id().cloned());
            map.insert(kind, id);
        }
        map
    }

    /// Deterministic digest of the branch's data model: SHA-256 over the
    /// sorted (name, hash) pairs of nodes and generics. Identical content
    /// yields an identical digest regardless of insertion order.
    pub fn get_hash(&self) -> String {
        let pairs: Vec<(&String, &String)> = self
            .nodes
            .iter()
            .chain(self.generics.iter())
            .sorted()
            .collect();
        crate::model::content_hash(&pairs)
    }

    /// Copy-on-write duplicate: fresh index maps, shared cache.
    pub fn duplicate(&self, name: Option<&str>) -> SchemaBranch {
        SchemaBranch {
            cache: Arc::clone(&self.cache),
            name: name.map(str::to_string).or_else(|| self.name.clone()),
            nodes: self.nodes.clone(),
            generics: self.generics.clone(),
            profiles: self.profiles.clone(),
        }
    }

    /// Load every node and generic from a schema document.
    pub fn load_schema(&mut self, root: &SchemaRoot) {
        for generic in &root.generics {
            self.set(&generic.kind(), SchemaObject::Generic(generic.clone()));
        }
        for node in &root.nodes {
            self.set(&node.kind(), SchemaObject::Node(node.clone()));
        }
    }

    /// Diff against a candidate version of this schema (`other` is the new
    /// side). Entities are reconciled by stable id first so a rename is a
    /// field-level change, never an add+remove pair; objects marked
    /// `Absent` on the new side are removed regardless of id.
    pub fn diff(&self, other: &SchemaBranch) -> Result<SchemaDiff, SchemaBranchError> {
        let mut diff = SchemaDiff::default();

        let local_ids = self.id_to_kind_map();
        let other_ids = other.id_to_kind_map();

        let shared_ids: HashSet<&Id> = local_ids
            .keys()
            .filter(|id| other_ids.contains_key(*id))
            .collect();

        let mut matched_local: HashSet<String> = HashSet::new();
        let mut matched_other: HashSet<String> = HashSet::new();

        for id in &shared_ids {
            let local_kind = &local_ids[*id];
            let other_kind = &other_ids[*id];
            matched_local.insert(local_kind.clone());
            matched_other.insert(other_kind.clone());

            let local_obj = self.get_shared(local_kind)?;
            let other_obj = other.get_shared(other_kind)?;

            if other_obj.state() == SchemaState::Absent {
                diff.removed
                    .insert(other_kind.clone(), HashableModelDiff::default());
                continue;
            }
            if local_obj.hash() == other_obj.hash() {
                continue;
            }
            diff.changed
                .insert(other_kind.clone(), local_obj.diff(&other_obj));
        }

        for kind in self.kinds() {
            if matched_local.contains(&kind) {
                continue;
            }
            if other.has(&kind) {
                matched_other.insert(kind.clone());
                let local_obj = self.get_shared(&kind)?;
                let other_obj = other.get_shared(&kind)?;
                if other_obj.state() == SchemaState::Absent {
                    diff.removed.insert(kind, HashableModelDiff::default());
                } else if local_obj.hash() != other_obj.hash() {
                    diff.changed.insert(kind, local_obj.diff(&other_obj));
                }
            } else {
                diff.removed.insert(kind, HashableModelDiff::default());
            }
        }

        for kind in other.kinds() {
            if matched_other.contains(&kind) {
                continue;
            }
            let other_obj = other.get_shared(&kind)?;
            if other_obj.state() == SchemaState::Absent {
                // never known locally and already gone: nothing to report
                continue;
            }
            diff.added.insert(kind, HashableModelDiff::default());
        }

        Ok(diff)
    }

    fn id_to_kind_map(&self) -> HashMap<Id, String> {
        let mut map = HashMap::new();
        for (kind, id) in self.get_all_kind_id_map() {
            if let Some(id) = id {
                map.insert(id, kind);
            }
        }
        map
    }
}

fn category_name(object: &SchemaObject) -> &'static str {
    match object {
        SchemaObject::Node(_) => "node",
        SchemaObject::Generic(_) => "generic",
        SchemaObject::Profile(_) => "profile",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NodeSchema;

    fn node(namespace: &str, name: &str, id: Option<&str>) -> NodeSchema {
        let mut node = NodeSchema::new(namespace, name);
        node.id = id.map(str::to_string);
        node
    }

    fn branch_with(objects: Vec<NodeSchema>) -> SchemaBranch {
        let mut branch = SchemaBranch::new(Arc::new(SchemaCache::new()), Some("main"));
        for obj in objects {
            branch.set(&obj.kind(), SchemaObject::Node(obj));
        }
        branch
    }

    #[test]
    fn hash_is_identical_regardless_of_insertion_order() {
        let cache = Arc::new(SchemaCache::new());
        let mut first = SchemaBranch::new(Arc::clone(&cache), Some("a"));
        first.set("TestWidget", SchemaObject::Node(node("Test", "Widget", None)));
        first.set("TestGadget", SchemaObject::Node(node("Test", "Gadget", None)));

        let mut second = SchemaBranch::new(cache, Some("b"));
        second.set("TestGadget", SchemaObject::Node(node("Test", "Gadget", None)));
        second.set("TestWidget", SchemaObject::Node(node("Test", "Widget", None)));

        assert_eq!(first.get_hash(), second.get_hash());
    }

    #[test]
    fn identical_definitions_share_one_cache_entry() {
        let cache = Arc::new(SchemaCache::new());
        let mut first = SchemaBranch::new(Arc::clone(&cache), Some("a"));
        let mut second = SchemaBranch::new(Arc::clone(&cache), Some("b"));

        first.set("TestWidget", SchemaObject::Node(node("Test", "Widget", None)));
        second.set("TestWidget", SchemaObject::Node(node("Test", "Widget", None)));

        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn duplicate_shares_the_cache_but_not_the_index() {
        let original = branch_with(vec![node("Test", "Widget", None)]);
        let mut copy = original.duplicate(Some("candidate"));

        assert!(Arc::ptr_eq(&original.cache(), &copy.cache()));

        let mut changed = node("Test", "Widget", None);
        changed.description = Some("changed".to_string());
        copy.set("TestWidget", SchemaObject::Node(changed));

        // original still sees the old definition
        let before = original.get_node("TestWidget").unwrap();
        assert_eq!(before.description, None);
        let after = copy.get_node("TestWidget").unwrap();
        assert_eq!(after.description, Some("changed".to_string()));
    }

    #[test]
    fn get_returns_a_deep_copy() {
        let branch = branch_with(vec![node("Test", "Widget", None)]);
        let mut copy = branch.get_node("TestWidget").unwrap();
        copy.description = Some("mutated".to_string());
        assert_eq!(branch.get_node("TestWidget").unwrap().description, None);
    }

    #[test]
    fn rename_with_stable_id_is_reported_as_changed() {
        let before = branch_with(vec![node("Test", "Widget", Some("id-1"))]);

        let mut after = before.duplicate(Some("candidate"));
        let mut renamed = node("Test", "Sprocket", Some("id-1"));
        renamed.description = None;
        after.set(&renamed.kind(), SchemaObject::Node(renamed));
        // drop the old name from the candidate index
        after.nodes.remove("TestWidget");

        let diff = before.diff(&after).unwrap();
        assert!(diff.added.is_empty(), "rename must not look like an add");
        assert_eq!(diff.removed.len(), 0, "rename must not look like a removal");
        let entry = diff.changed.get("TestSprocket").unwrap();
        assert!(entry.changed.contains_key("name"));
    }

    #[test]
    fn absent_state_on_the_new_side_counts_as_removed() {
        let before = branch_with(vec![node("Test", "Widget", Some("id-1"))]);
        let mut after = before.duplicate(None);
        let mut gone = node("Test", "Widget", Some("id-1"));
        gone.state = SchemaState::Absent;
        after.set("TestWidget", SchemaObject::Node(gone));

        let diff = before.diff(&after).unwrap();
        assert!(diff.changed.is_empty());
        assert!(diff.removed.contains_key("TestWidget"));
    }

    #[test]
    fn added_and_removed_kinds_are_detected() {
        let before = branch_with(vec![node("Test", "Widget", None)]);
        let mut after = before.duplicate(None);
        after.nodes.remove("TestWidget");
        after.set("TestGadget", SchemaObject::Node(node("Test", "Gadget", None)));

        let diff = before.diff(&after).unwrap();
        assert!(diff.added.contains_key("TestGadget"));
        assert!(diff.removed.contains_key("TestWidget"));
        assert!(diff.changed.is_empty());
    }
}
