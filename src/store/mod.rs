pub mod memory;
pub mod traits;

pub use memory::MemoryStore;
pub use traits::{
    BranchStore, EdgeConflict, EdgeRecord, EdgeStatus, EdgeStore, GraphStore,
    PeerRelationship, QueryRow, RebaseActions, Store,
};
