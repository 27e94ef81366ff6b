pub mod delete_resolver;
pub mod migration;
pub mod rebase;
pub mod schema_branch;
pub mod schema_process;
pub mod schema_validate;

pub use delete_resolver::{
    DeleteDependencyError, DeleteDependencyResolver, DeleteRelationshipType, DeleteTarget,
    DependentNodeViolation, NodeDeleteIndex,
};
pub use migration::{
    apply_schema_diff, determine_constraint_validators, determine_migrations,
    dispatch_migrations, dispatch_validators, ConstraintViolation, MigrationDescriptor,
    MigrationDispatchError, MigrationResult, MigrationRunner, SchemaApplyReport,
    ValidatorDescriptor, ValidatorOutcome, ValidatorResult,
};
pub use rebase::{classify_edges, rebase_graph};
pub use schema_branch::{SchemaBranch, SchemaBranchError, SchemaCache};
pub use schema_process::{build_relationship_identifier, SchemaProcessError};
pub use schema_validate::{validate, SchemaValidationError, SchemaViolation};
