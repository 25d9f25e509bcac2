//! Query building and execution.
//!
//! # Architecture
//!
//! - **Plan**: the backend-neutral [`LogicalQuery`] tree
//! - **Select**: the fluent [`QueryBuilder`] that accumulates a plan
//! - **Validate**: structural checks run by `build()`
//! - **Projection**: typed selection lists and row decoding
//! - **Statement**: lowering to parameterized PostgreSQL via `sea_query`
//! - **Execution**: fetch variants on the finalized [`Query`]

pub mod execution;
pub mod plan;
pub mod projection;
pub mod select;
pub mod statement;
pub mod validate;

pub use execution::{Query, ResultPage};
pub use plan::{JoinKind, LogicalQuery, Selection, Shape};
pub use projection::{Optional, Projection};
pub use select::{select, select_from, QueryBuilder};
pub use statement::{Insert, Statement};
