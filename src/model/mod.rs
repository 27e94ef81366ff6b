pub mod branch;
pub mod common;
pub mod diff;
pub mod query_filter;
pub mod schema;
pub mod timestamp;

pub use branch::*;
pub use common::*;
pub use diff::*;
pub use query_filter::*;
pub use schema::*;
pub use timestamp::*;
