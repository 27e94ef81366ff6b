pub mod config;
pub mod logic;
pub mod model;
pub mod registry;
pub mod store;

// Export logic types
pub use logic::{
    DeleteDependencyError, DeleteDependencyResolver, DeleteTarget, MigrationRunner,
    NodeDeleteIndex, SchemaApplyReport, SchemaBranch, SchemaCache, SchemaProcessError,
    SchemaValidationError,
};

// Export all model types
pub use model::*;

// Export registry and store types
pub use registry::{Registry, RegistryError};
pub use store::{MemoryStore, Store};
