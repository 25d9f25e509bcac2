//! Execution of finalized queries.
//!
//! [`Query`] pairs a validated [`LogicalQuery`] with its typed projection and
//! offers the fetch variants: every row, exactly one, at most one, the first,
//! a [`ResultPage`] with the unpaged total, or just the count.

use crate::error::QueryError;
use crate::executor::{QueryExecutor, Row};
use crate::query::plan::LogicalQuery;
use crate::query::projection::{Layout, Projection};
use crate::query::statement::Statement;
use crate::value::Value;
use serde::Serialize;

/// One page of results together with the unpaged total
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultPage<T> {
    /// Number of rows the query matches without offset and limit
    pub total: u64,
    pub limit: Option<u64>,
    pub offset: u64,
    pub results: Vec<T>,
}

impl<T> ResultPage<T> {
    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// A validated, immutable query
#[derive(Debug, Clone)]
pub struct Query<P> {
    projection: P,
    plan: LogicalQuery,
}

impl<P: Projection> Query<P> {
    pub(crate) fn new(projection: P, plan: LogicalQuery) -> Self {
        Self { projection, plan }
    }

    pub fn plan(&self) -> &LogicalQuery {
        &self.plan
    }

    /// The statement `fetch` would run
    pub fn statement(&self) -> Statement {
        Statement::render(&self.plan)
    }

    /// PostgreSQL text of the statement `fetch` would run
    pub fn to_sql(&self) -> String {
        self.statement().sql
    }

    fn run<E: QueryExecutor + ?Sized>(
        &self,
        plan: &LogicalQuery,
        executor: &E,
    ) -> Result<Vec<P::Output>, QueryError> {
        let rows = executor.execute(&Statement::render(plan))?;
        let layout = Layout::of(plan);
        rows.iter()
            .map(|row| self.projection.decode(&mut layout.view(row)?))
            .collect()
    }

    /// All matching rows; empty when nothing matches
    pub fn fetch<E: QueryExecutor + ?Sized>(&self, executor: &E) -> Result<Vec<P::Output>, QueryError> {
        self.run(&self.plan, executor)
    }

    /// Exactly one row: `NotFound` on none, `NonUniqueResult` on several
    pub fn fetch_one<E: QueryExecutor + ?Sized>(&self, executor: &E) -> Result<P::Output, QueryError> {
        let mut rows = self.fetch(executor)?;
        match rows.len() {
            0 => Err(QueryError::NotFound),
            1 => rows.pop().ok_or(QueryError::NotFound),
            n => Err(QueryError::NonUniqueResult { rows: n }),
        }
    }

    /// At most one row: `None` on none, `NonUniqueResult` on several
    pub fn fetch_optional<E: QueryExecutor + ?Sized>(
        &self,
        executor: &E,
    ) -> Result<Option<P::Output>, QueryError> {
        match self.fetch_one(executor) {
            Ok(row) => Ok(Some(row)),
            Err(QueryError::NotFound) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// First row under the query's ordering, if any
    pub fn fetch_first<E: QueryExecutor + ?Sized>(
        &self,
        executor: &E,
    ) -> Result<Option<P::Output>, QueryError> {
        let limit = self.plan.limit.map_or(1, |l| l.min(1));
        let plan = self.plan.with_paging(self.plan.offset, Some(limit));
        Ok(self.run(&plan, executor)?.into_iter().next())
    }

    /// The requested page plus the total from a count-only statement
    pub fn fetch_results<E: QueryExecutor + ?Sized>(
        &self,
        executor: &E,
    ) -> Result<ResultPage<P::Output>, QueryError> {
        let total = self.fetch_count(executor)?;
        let results = if total == 0 {
            Vec::new()
        } else {
            self.fetch(executor)?
        };
        Ok(ResultPage {
            total,
            limit: self.plan.limit,
            offset: self.plan.offset.unwrap_or(0),
            results,
        })
    }

    /// Number of rows (groups, for grouped queries) ignoring order and paging
    pub fn fetch_count<E: QueryExecutor + ?Sized>(&self, executor: &E) -> Result<u64, QueryError> {
        let rows = executor.execute(&Statement::render(&self.plan.count_variant()))?;
        count_of(&rows)
    }
}

fn count_of(rows: &[Row]) -> Result<u64, QueryError> {
    match rows {
        [row] => match row.as_slice() {
            [Value::Int(n)] => u64::try_from(*n)
                .map_err(|_| QueryError::execution(format!("count returned {n}"))),
            [other] => Err(QueryError::execution(format!("count returned {other}"))),
            _ => Err(QueryError::execution("count row must have one column")),
        },
        _ => Err(QueryError::execution(format!(
            "count returned {} rows, expected one",
            rows.len()
        ))),
    }
}
