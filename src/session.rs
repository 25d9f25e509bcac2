//! Unit of work over a [`DataSource`].
//!
//! A [`Session`] assigns identities on `persist`, queues the rows and writes
//! them on `flush`. Every query run through the session flushes first, so reads
//! always observe the session's own writes.
//!
//! # Examples
//!
//! ```no_run
//! use lifequery::entity::{Member, QMember, Team};
//! use lifequery::query::select_from;
//! use lifequery::store::MemoryStore;
//! use lifequery::Session;
//!
//! # fn main() -> Result<(), lifequery::QueryError> {
//! let store = MemoryStore::new();
//! let session = Session::new(&store);
//!
//! let tx = session.begin()?;
//! let mut team = Team::new("teamA");
//! session.persist(&mut team)?;
//! session.persist(&mut Member::new("member1", 10).with_team(&team))?;
//! tx.commit()?;
//!
//! let member = QMember::member();
//! let found = select_from(&member)
//!     .filter(member.username.eq("member1"))
//!     .fetch_one(&session)?;
//! assert_eq!(found.age(), 10);
//! # Ok(())
//! # }
//! ```

use crate::config::QueryConfig;
use crate::error::QueryError;
use crate::executor::{run_statement, DataSource, QueryExecutor, Row};
use crate::query::select::select_from;
use crate::query::statement::{Insert, Statement};
use crate::relation::Reference;
use crate::schema::{Entity, EntityPath, EntitySchema};
use crate::value::Value;
use log::{debug, info, warn};
use std::cell::RefCell;

#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

struct PendingRow {
    schema: &'static EntitySchema,
    row: Row,
}

/// Unit of work bound to a data source
pub struct Session<'s, S: DataSource + ?Sized> {
    source: &'s S,
    config: QueryConfig,
    pending: RefCell<Vec<PendingRow>>,
}

impl<'s, S: DataSource + ?Sized> Session<'s, S> {
    pub fn new(source: &'s S) -> Self {
        Self::with_config(source, QueryConfig::default())
    }

    pub fn with_config(source: &'s S, config: QueryConfig) -> Self {
        Self {
            source,
            config,
            pending: RefCell::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    pub fn source(&self) -> &'s S {
        self.source
    }

    /// Assign an identity to a new entity and queue its row for the next flush.
    ///
    /// Fails with `Validation` when the entity already has an identity or its
    /// values violate the schema; the entity is left untouched in that case.
    pub fn persist<E: Entity>(&self, entity: &mut E) -> Result<i64, QueryError> {
        let schema = E::schema();
        if let Some(id) = entity.id() {
            return Err(QueryError::validation(format!(
                "{} {id} is already persistent",
                schema.table
            )));
        }
        let mut row = entity.to_values();
        // Check everything but the identity before consuming a sequence value
        if let Some(first) = row.first_mut() {
            *first = Value::Int(0);
        }
        schema.check_row(&row)?;

        let id = self.source.next_id(schema)?;
        row[0] = Value::Int(id);
        entity.set_id(id);
        debug!("persist {} {id}", schema.table);
        self.pending.borrow_mut().push(PendingRow { schema, row });
        Ok(id)
    }

    /// Rows queued but not yet written
    pub fn pending_count(&self) -> usize {
        self.pending.borrow().len()
    }

    /// Write all queued rows, one insert per run of rows for the same table.
    ///
    /// Returns the number of rows written. Rows are dequeued before writing;
    /// if the data source rejects an insert the remaining rows are dropped.
    pub fn flush(&self) -> Result<u64, QueryError> {
        let pending = std::mem::take(&mut *self.pending.borrow_mut());
        if pending.is_empty() {
            return Ok(0);
        }

        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::flush_span(pending.len()).entered();

        let mut written = 0;
        let mut batch: Vec<Row> = Vec::new();
        let mut current: Option<&'static EntitySchema> = None;
        for PendingRow { schema, row } in pending {
            if let Some(open) = current {
                if !std::ptr::eq(open, schema) {
                    written += self.write_batch(open, std::mem::take(&mut batch))?;
                }
            }
            current = Some(schema);
            batch.push(row);
        }
        if let Some(open) = current {
            written += self.write_batch(open, batch)?;
        }
        info!("flushed {written} rows");
        Ok(written)
    }

    fn write_batch(&self, schema: &'static EntitySchema, rows: Vec<Row>) -> Result<u64, QueryError> {
        let insert = Insert::render(schema, rows)?;
        if self.config.log_statements {
            debug!("{} ({} params)", insert.sql, insert.values.0.len());
        }
        self.source.insert(&insert)
    }

    /// Drop queued rows without writing them; returns how many were dropped
    pub fn clear(&self) -> usize {
        let dropped = std::mem::take(&mut *self.pending.borrow_mut()).len();
        if dropped > 0 {
            debug!("cleared {dropped} pending rows");
        }
        dropped
    }

    /// Look up an entity by identity
    pub fn find<E: Entity>(&self, id: i64) -> Result<Option<E>, QueryError> {
        let path = E::Path::new(E::schema().table);
        select_from(&path)
            .filter(path.identity().eq(id))
            .fetch_optional(self)
    }

    /// Whether a lazy reference has been materialized
    pub fn is_loaded<T: Entity>(&self, reference: &Reference<T>) -> bool {
        reference.is_loaded()
    }

    /// Flush queued rows, then open a transaction on the data source.
    pub fn begin(&self) -> Result<Transaction<'_, 's, S>, QueryError> {
        self.flush()?;
        self.source.begin_transaction()?;
        Ok(Transaction {
            session: self,
            finished: false,
        })
    }
}

impl<S: DataSource + ?Sized> QueryExecutor for Session<'_, S> {
    fn execute(&self, statement: &Statement) -> Result<Vec<Row>, QueryError> {
        self.flush()?;
        run_statement(self.source, statement, self.config.log_statements)
    }

    fn query_config(&self) -> QueryConfig {
        self.config
    }
}

/// An open transaction; rolled back on drop unless committed
#[must_use = "a transaction is rolled back when dropped"]
pub struct Transaction<'t, 's, S: DataSource + ?Sized> {
    session: &'t Session<'s, S>,
    finished: bool,
}

impl<S: DataSource + ?Sized> Transaction<'_, '_, S> {
    /// Flush queued rows and commit
    pub fn commit(mut self) -> Result<(), QueryError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::commit_transaction_span().entered();

        self.finished = true;
        if let Err(err) = self.session.flush() {
            warn!("flush failed, rolling back: {err}");
            self.session.source.rollback_transaction()?;
            return Err(err);
        }
        self.session.source.commit_transaction()
    }

    /// Discard queued rows and roll back
    pub fn rollback(mut self) -> Result<(), QueryError> {
        self.finished = true;
        Self::roll_back(self.session)
    }

    fn roll_back(session: &Session<'_, S>) -> Result<(), QueryError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::rollback_transaction_span().entered();

        session.clear();
        session.source.rollback_transaction()
    }
}

impl<S: DataSource + ?Sized> Drop for Transaction<'_, '_, S> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        warn!("transaction dropped without commit, rolling back");
        if let Err(err) = Self::roll_back(self.session) {
            warn!("rollback failed: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Hello, Member, QHello, Team};
    use crate::store::MemoryStore;

    #[test]
    fn test_persist_assigns_identity_and_queues() {
        let store = MemoryStore::new();
        let session = Session::new(&store);
        let mut hello = Hello::new();
        let id = session.persist(&mut hello).unwrap();
        assert_eq!(hello.id(), Some(id));
        assert_eq!(session.pending_count(), 1);
        assert_eq!(store.row_count("hello").unwrap(), 0);

        assert_eq!(session.flush().unwrap(), 1);
        assert_eq!(store.row_count("hello").unwrap(), 1);
    }

    #[test]
    fn test_persist_twice_is_rejected() {
        let store = MemoryStore::new();
        let session = Session::new(&store);
        let mut team = Team::new("teamA");
        session.persist(&mut team).unwrap();
        let err = session.persist(&mut team).unwrap_err();
        assert!(matches!(err, QueryError::Validation(_)));
    }

    #[test]
    fn test_query_flushes_pending_rows() {
        let store = MemoryStore::new();
        let session = Session::new(&store);
        session.persist(&mut Hello::new()).unwrap();

        let hello = QHello::hello();
        let found = select_from(&hello).fetch(&session).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(session.pending_count(), 0);
    }

    #[test]
    fn test_find_by_identity() {
        let store = MemoryStore::new();
        let session = Session::new(&store);
        let mut member = Member::new("member1", 10);
        let id = session.persist(&mut member).unwrap();

        let found: Member = session.find(id).unwrap().unwrap();
        assert_eq!(found.username(), Some("member1"));
        assert!(session.find::<Member>(id + 1).unwrap().is_none());
    }

    #[test]
    fn test_dropped_transaction_rolls_back() {
        let store = MemoryStore::new();
        let session = Session::new(&store);
        {
            let _tx = session.begin().unwrap();
            session.persist(&mut Team::new("teamA")).unwrap();
            session.flush().unwrap();
            assert_eq!(store.row_count("team").unwrap(), 1);
        }
        assert_eq!(store.row_count("team").unwrap(), 0);
        assert!(!store.in_transaction().unwrap());
    }
}
