use crate::error::QueryError;
use crate::executor::{DataSource, Row};
use crate::query::statement::{Insert, Statement};
use crate::schema::EntitySchema;
use crate::store::eval::{Evaluator, Table, Tables};
use crate::value::Value;
use log::{debug, trace};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Default)]
struct State {
    tables: Tables,
    /// Copy of `tables` taken when the open transaction began
    snapshot: Option<Tables>,
    /// Identity sequences; never rolled back
    sequences: HashMap<&'static str, i64>,
}

/// Tables held in process memory
///
/// Each select is evaluated under one read lock, so it sees a consistent
/// snapshot even with concurrent writers. One transaction may be open at a
/// time; rolling it back restores the tables as they were at `begin`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<State>,
    selects: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of select statements executed so far
    pub fn statement_count(&self) -> usize {
        self.selects.load(Ordering::Relaxed)
    }

    /// Number of stored rows in `table`
    pub fn row_count(&self, table: &str) -> Result<usize, QueryError> {
        Ok(self.read()?.tables.get(table).map_or(0, |t| t.rows.len()))
    }

    pub fn in_transaction(&self) -> Result<bool, QueryError> {
        Ok(self.read()?.snapshot.is_some())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>, QueryError> {
        self.state
            .read()
            .map_err(|_| QueryError::execution("memory store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>, QueryError> {
        self.state
            .write()
            .map_err(|_| QueryError::execution("memory store lock poisoned"))
    }
}

fn identity(schema: &EntitySchema, row: &[Value]) -> Result<i64, QueryError> {
    match row.first() {
        Some(Value::Int(id)) => Ok(*id),
        other => Err(QueryError::execution(format!(
            "{} row has no integer identity: {other:?}",
            schema.table
        ))),
    }
}

impl DataSource for MemoryStore {
    fn query_all(&self, statement: &Statement) -> Result<Vec<Row>, QueryError> {
        self.selects.fetch_add(1, Ordering::Relaxed);
        let state = self.read()?;
        Evaluator::new(&state.tables).run(&statement.plan)
    }

    fn insert(&self, insert: &Insert) -> Result<u64, QueryError> {
        let schema = insert.schema;
        for row in &insert.rows {
            schema.check_row(row)?;
        }

        let mut state = self.write()?;
        let table = state.tables.entry(schema.table).or_insert_with(|| Table {
            schema,
            rows: BTreeMap::new(),
        });
        // Reject the whole batch before writing any of it
        let mut ids = Vec::with_capacity(insert.rows.len());
        for row in &insert.rows {
            let id = identity(schema, row)?;
            if table.rows.contains_key(&id) || ids.contains(&id) {
                return Err(QueryError::execution(format!(
                    "duplicate key {}.{} = {id}",
                    schema.table,
                    schema.id_column()?.name
                )));
            }
            ids.push(id);
        }
        for (id, row) in ids.into_iter().zip(&insert.rows) {
            table.rows.insert(id, row.clone());
        }
        trace!("inserted {} rows into {}", insert.rows.len(), schema.table);
        Ok(insert.rows.len() as u64)
    }

    fn next_id(&self, schema: &'static EntitySchema) -> Result<i64, QueryError> {
        let mut state = self.write()?;
        let next = state.sequences.entry(schema.table).or_insert(0);
        *next += 1;
        Ok(*next)
    }

    fn begin_transaction(&self) -> Result<(), QueryError> {
        let mut state = self.write()?;
        if state.snapshot.is_some() {
            return Err(QueryError::execution("a transaction is already active"));
        }
        state.snapshot = Some(state.tables.clone());
        debug!("transaction started");
        Ok(())
    }

    fn commit_transaction(&self) -> Result<(), QueryError> {
        let mut state = self.write()?;
        state
            .snapshot
            .take()
            .ok_or_else(|| QueryError::execution("no active transaction to commit"))?;
        debug!("transaction committed");
        Ok(())
    }

    fn rollback_transaction(&self) -> Result<(), QueryError> {
        let mut state = self.write()?;
        let snapshot = state
            .snapshot
            .take()
            .ok_or_else(|| QueryError::execution("no active transaction to roll back"))?;
        state.tables = snapshot;
        debug!("transaction rolled back");
        Ok(())
    }
}
