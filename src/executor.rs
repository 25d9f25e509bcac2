//! Data-access boundary.
//!
//! [`DataSource`] is the collaborator that actually stores rows: it runs
//! rendered statements, applies inserts, hands out identities and brackets
//! transactions. [`QueryExecutor`] is what finalized queries run against; every
//! `DataSource` is one directly, and a `Session` is one that flushes pending
//! work first.
//!
//! Every statement goes through [`run_statement`], which owns the statement
//! log line, the `tracing` span and the query metrics.

use crate::config::QueryConfig;
use crate::error::QueryError;
use crate::query::statement::{Insert, Statement};
use crate::schema::EntitySchema;
use crate::value::Value;
use log::{debug, trace};
use std::time::Instant;

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;
#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

/// One result row: projected columns first, then fetch-joined columns
pub type Row = Vec<Value>;

/// Storage collaborator
///
/// Implementations may execute `Statement::sql` with `Statement::values`
/// against a SQL database, or interpret `Statement::plan` directly as
/// `MemoryStore` does. Either way the rows must follow the statement's layout.
pub trait DataSource {
    /// Run a select statement and return its rows
    fn query_all(&self, statement: &Statement) -> Result<Vec<Row>, QueryError>;

    /// Apply an insert and return the number of rows written
    fn insert(&self, insert: &Insert) -> Result<u64, QueryError>;

    /// Next identity for `schema`'s table
    fn next_id(&self, schema: &'static EntitySchema) -> Result<i64, QueryError>;

    fn begin_transaction(&self) -> Result<(), QueryError>;

    fn commit_transaction(&self) -> Result<(), QueryError>;

    fn rollback_transaction(&self) -> Result<(), QueryError>;
}

/// Something a finalized query can be fetched from
pub trait QueryExecutor {
    /// Run one statement
    fn execute(&self, statement: &Statement) -> Result<Vec<Row>, QueryError>;

    /// Configuration used when a builder is finalized against this executor
    fn query_config(&self) -> QueryConfig {
        QueryConfig::default()
    }
}

impl<S: DataSource + ?Sized> QueryExecutor for S {
    fn execute(&self, statement: &Statement) -> Result<Vec<Row>, QueryError> {
        run_statement(self, statement, true)
    }
}

/// Run a statement with logging, tracing and metrics around it.
pub(crate) fn run_statement<S: DataSource + ?Sized>(
    source: &S,
    statement: &Statement,
    log_statement: bool,
) -> Result<Vec<Row>, QueryError> {
    #[cfg(feature = "tracing")]
    let _span = tracing_helpers::execute_query_span(&statement.sql).entered();

    if log_statement {
        debug!("{} ({} params)", statement.sql, statement.values.0.len());
    }
    trace!("params: {:?}", statement.values.0);

    let start = Instant::now();
    let result = source.query_all(statement);
    let elapsed = start.elapsed();

    #[cfg(feature = "metrics")]
    {
        METRICS.record_query(elapsed);
        if result.is_err() {
            METRICS.record_query_error();
        }
    }

    match &result {
        Ok(rows) => trace!("{} rows in {:?}", rows.len(), elapsed),
        Err(err) => debug!("statement failed after {:?}: {err}", elapsed),
    }
    result
}
