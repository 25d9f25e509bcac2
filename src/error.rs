//! Error type shared by expression construction, query validation and execution.
//!
//! The variants map onto the three phases a query goes through:
//!
//! - `TypeMismatch` is raised while an expression tree is being assembled,
//! - `Validation` is raised by `QueryBuilder::build()`,
//! - `NotFound`, `NonUniqueResult` and `Execution` come back from a data source.
//!
//! Construction and validation errors are always reported before any statement
//! reaches the data source.

use crate::value::ValueType;
use thiserror::Error;

/// Error type for query construction, validation and execution
#[derive(Debug, Clone, PartialEq, Error)]
pub enum QueryError {
    /// Operand types of an operator are incompatible
    #[error("Type mismatch: cannot apply `{operator}` to {left} and {right}")]
    TypeMismatch {
        operator: &'static str,
        left: ValueType,
        right: ValueType,
    },
    /// The query is structurally invalid (reported by `build()`)
    #[error("Invalid query: {0}")]
    Validation(String),
    /// A single-result fetch matched no rows
    #[error("No rows found for a single-result query")]
    NotFound,
    /// A single-result fetch matched more than one row
    #[error("Expected a single row but the query matched {rows}")]
    NonUniqueResult { rows: usize },
    /// The data source failed to run the statement
    #[error("Execution error: {0}")]
    Execution(String),
}

impl QueryError {
    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        QueryError::Validation(msg.into())
    }

    pub(crate) fn execution(msg: impl Into<String>) -> Self {
        QueryError::Execution(msg.into())
    }
}
