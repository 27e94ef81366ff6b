use crate::config::{AppConfig, GLOBAL_BRANCH_NAME};
use crate::logic::schema_branch::SchemaBranch;
use crate::model::Branch;
use crate::store::traits::BranchStore;
use anyhow::Result;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("branch '{0}' not found locally or in the store")]
    BranchNotFound(String),
    #[error("branch '{0}' is protected and cannot be deleted")]
    BranchProtected(String),
    #[error("branch '{0}' already exists")]
    BranchAlreadyExists(String),
    #[error("no schema registered for branch '{0}'")]
    SchemaNotFound(String),
}

/// Process-wide context object holding the current Branch and SchemaBranch
/// per branch name. An explicit handle threaded through every entry point;
/// populated at process start from the store and cleared between tests.
#[derive(Debug)]
pub struct Registry {
    default_branch_name: String,
    branches: RwLock<HashMap<String, Branch>>,
    schemas: RwLock<HashMap<String, SchemaBranch>>,
}

impl Registry {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            default_branch_name: config.branch.default_branch_name.clone(),
            branches: RwLock::new(HashMap::new()),
            schemas: RwLock::new(HashMap::new()),
        }
    }

    pub fn default_branch_name(&self) -> &str {
        &self.default_branch_name
    }

    /// Populate the branch cache from the store. Creates the default and
    /// global branches on first start.
    pub async fn initialize<S: BranchStore>(&self, store: &S) -> Result<()> {
        let mut known = store.list_branches().await?;
        if !known.iter().any(|b| b.is_default) {
            let default = Branch::new_default(&self.default_branch_name)?;
            store.upsert_branch(default.clone()).await?;
            known.push(default);
        }
        if !known.iter().any(|b| b.is_global) {
            let global = Branch::new_global();
            store.upsert_branch(global.clone()).await?;
            known.push(global);
        }

        let mut branches = self.branches.write().await;
        for branch in known {
            branches.insert(branch.name.clone(), branch);
        }
        log::info!("registry initialized with {} branches", branches.len());
        Ok(())
    }

    /// Fetch a branch, falling back to the store on a local miss and
    /// populating the cache. A miss on both sides is an error.
    pub async fn get_branch<S: BranchStore>(&self, name: &str, store: &S) -> Result<Branch> {
        if let Some(branch) = self.branches.read().await.get(name) {
            return Ok(branch.clone());
        }
        match store.get_branch(name).await? {
            Some(branch) => {
                log::debug!("branch '{}' loaded from store on cache miss", name);
                self.branches
                    .write()
                    .await
                    .insert(branch.name.clone(), branch.clone());
                Ok(branch)
            }
            None => Err(RegistryError::BranchNotFound(name.to_string()).into()),
        }
    }

    /// Local-only lookup, no store fallback.
    pub async fn get_branch_local(&self, name: &str) -> Option<Branch> {
        self.branches.read().await.get(name).cloned()
    }

    pub async fn set_branch(&self, branch: Branch) {
        self.branches
            .write()
            .await
            .insert(branch.name.clone(), branch);
    }

    /// Create and persist a new branch forked from the default branch.
    pub async fn create_branch<S: BranchStore>(
        &self,
        store: &S,
        name: &str,
        description: Option<String>,
        is_isolated: bool,
    ) -> Result<Branch> {
        if self.branches.read().await.contains_key(name)
            || store.get_branch(name).await?.is_some()
        {
            return Err(RegistryError::BranchAlreadyExists(name.to_string()).into());
        }
        let branch = Branch::new(name, &self.default_branch_name, description, is_isolated)?;
        store.upsert_branch(branch.clone()).await?;
        self.set_branch(branch.clone()).await;
        Ok(branch)
    }

    /// Delete a branch everywhere. The default and global branches are
    /// protected.
    pub async fn delete_branch<S: BranchStore>(&self, name: &str, store: &S) -> Result<bool> {
        let branch = self.get_branch(name, store).await?;
        if branch.is_default || branch.is_global || name == GLOBAL_BRANCH_NAME {
            return Err(RegistryError::BranchProtected(name.to_string()).into());
        }
        let deleted = store.delete_branch(name).await?;
        self.branches.write().await.remove(name);
        self.schemas.write().await.remove(name);
        Ok(deleted)
    }

    pub async fn get_schema_branch(&self, name: &str) -> Result<SchemaBranch> {
        self.schemas
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::SchemaNotFound(name.to_string()).into())
    }

    pub async fn set_schema_branch(&self, name: &str, schema: SchemaBranch) {
        self.schemas.write().await.insert(name.to_string(), schema);
    }

    /// Drop all cached state; used between tests.
    pub async fn clear(&self) {
        self.branches.write().await.clear();
        self.schemas.write().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn initialize_creates_default_and_global_branches() {
        let store = MemoryStore::new();
        let registry = Registry::new(&AppConfig::default());
        registry.initialize(&store).await.unwrap();

        let main = registry.get_branch("main", &store).await.unwrap();
        assert!(main.is_default);
        let global = registry.get_branch(GLOBAL_BRANCH_NAME, &store).await.unwrap();
        assert!(global.is_global);
    }

    #[tokio::test]
    async fn cache_miss_falls_back_to_store() {
        let store = MemoryStore::new();
        let registry = Registry::new(&AppConfig::default());

        let branch = Branch::new("feature", "main", None, false).unwrap();
        store.upsert_branch(branch).await.unwrap();

        // not initialized: nothing cached locally
        let fetched = registry.get_branch("feature", &store).await.unwrap();
        assert_eq!(fetched.name, "feature");
        // second hit comes from cache
        assert!(registry.get_branch_local("feature").await.is_some());
    }

    #[tokio::test]
    async fn missing_branch_with_no_store_entry_is_an_error() {
        let store = MemoryStore::new();
        let registry = Registry::new(&AppConfig::default());

        let err = registry.get_branch("ghost", &store).await.unwrap_err();
        let registry_err = err.downcast_ref::<RegistryError>().unwrap();
        assert_eq!(
            registry_err,
            &RegistryError::BranchNotFound("ghost".to_string())
        );
    }

    #[tokio::test]
    async fn default_and_global_branches_cannot_be_deleted() {
        let store = MemoryStore::new();
        let registry = Registry::new(&AppConfig::default());
        registry.initialize(&store).await.unwrap();

        assert!(registry.delete_branch("main", &store).await.is_err());
        assert!(registry
            .delete_branch(GLOBAL_BRANCH_NAME, &store)
            .await
            .is_err());

        registry
            .create_branch(&store, "feature", None, false)
            .await
            .unwrap();
        assert!(registry.delete_branch("feature", &store).await.unwrap());
    }

    #[tokio::test]
    async fn duplicate_branch_creation_is_rejected() {
        let store = MemoryStore::new();
        let registry = Registry::new(&AppConfig::default());
        registry.initialize(&store).await.unwrap();

        registry
            .create_branch(&store, "feature", None, false)
            .await
            .unwrap();
        assert!(registry
            .create_branch(&store, "feature", None, false)
            .await
            .is_err());
    }
}
