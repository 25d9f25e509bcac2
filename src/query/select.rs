//! Fluent query builder.
//!
//! `QueryBuilder<P>` accumulates sources, joins, predicates, grouping,
//! ordering and paging around a typed projection `P`. Every step consumes the
//! builder and returns the next state, so a partially built query is never
//! shared. Structural problems are collected and reported by [`build`], before
//! any statement is rendered.
//!
//! # Example
//!
//! ```no_run
//! use lifequery::entity::{QMember, QTeam};
//! use lifequery::query::{select, select_from};
//! use lifequery::store::MemoryStore;
//!
//! # fn main() -> Result<(), lifequery::QueryError> {
//! let store = MemoryStore::new();
//! let member = QMember::member();
//! let team = QTeam::team();
//!
//! let members = select_from(&member)
//!     .join(&member.team, &team)
//!     .filter(team.name.eq("teamA"))
//!     .order_by(member.age.desc())
//!     .fetch(&store)?;
//!
//! let avg_by_team = select((&team.name, member.age.avg()))
//!     .from(&member)
//!     .join(&member.team, &team)
//!     .group_by(&team.name)
//!     .fetch(&store)?;
//! # Ok(())
//! # }
//! ```
//!
//! [`build`]: QueryBuilder::build

use crate::config::QueryConfig;
use crate::error::QueryError;
use crate::executor::QueryExecutor;
use crate::expr::typed::{NullOrdering, OrderSpec, Predicate};
use crate::expr::{Expr, LogicalOp};
use crate::query::execution::{Query, ResultPage};
use crate::query::plan::{Join, JoinAssociation, JoinKind, LogicalQuery, Selection, Source};
use crate::query::projection::Projection;
use crate::query::validate;
use crate::relation::Association;
use crate::schema::{Entity, EntityPath};

/// Start a query projecting `projection`; add sources with [`QueryBuilder::from`].
pub fn select<P: Projection>(projection: P) -> QueryBuilder<P> {
    QueryBuilder::new(projection)
}

/// Start a query selecting the entity under `path` from its own table.
pub fn select_from<E: EntityPath>(path: &E) -> QueryBuilder<&E> {
    QueryBuilder::new(path).from(path)
}

/// Query under construction
pub struct QueryBuilder<P> {
    projection: P,
    query: LogicalQuery,
    predicates: Vec<Expr>,
    having: Vec<Expr>,
}

impl<P: Projection> QueryBuilder<P> {
    fn new(projection: P) -> Self {
        let mut query = LogicalQuery::empty();
        query.selections = projection.selections();
        Self {
            projection,
            query,
            predicates: Vec::new(),
            having: Vec::new(),
        }
    }

    /// Add a source entity; several sources form a cross (theta) join
    pub fn from<S: EntityPath>(mut self, path: &S) -> Self {
        self.query
            .sources
            .push(Source::new(path.alias(), path.schema()));
        self
    }

    fn push_join<T: Entity>(
        mut self,
        kind: JoinKind,
        association: &Association<T>,
        target: &T::Path,
    ) -> Self {
        self.query.joins.push(Join {
            kind,
            target: Source::new(target.alias(), target.schema()),
            association: Some(JoinAssociation {
                owner_alias: association.owner_alias().to_string(),
                def: association.def(),
            }),
            on: None,
            fetch: false,
        });
        self
    }

    /// Inner join following an association, binding the target under `target`'s alias
    pub fn join<T: Entity>(self, association: &Association<T>, target: &T::Path) -> Self {
        self.push_join(JoinKind::Inner, association, target)
    }

    pub fn left_join<T: Entity>(self, association: &Association<T>, target: &T::Path) -> Self {
        self.push_join(JoinKind::Left, association, target)
    }

    pub fn right_join<T: Entity>(self, association: &Association<T>, target: &T::Path) -> Self {
        self.push_join(JoinKind::Right, association, target)
    }

    fn push_entity_join<S: EntityPath>(mut self, kind: JoinKind, target: &S) -> Self {
        self.query.joins.push(Join {
            kind,
            target: Source::new(target.alias(), target.schema()),
            association: None,
            on: None,
            fetch: false,
        });
        self
    }

    /// Inner join on an unrelated entity; requires [`on`](Self::on)
    pub fn join_entity<S: EntityPath>(self, target: &S) -> Self {
        self.push_entity_join(JoinKind::Inner, target)
    }

    /// Left join on an unrelated entity; requires [`on`](Self::on)
    pub fn left_join_entity<S: EntityPath>(self, target: &S) -> Self {
        self.push_entity_join(JoinKind::Left, target)
    }

    /// Right join on an unrelated entity; requires [`on`](Self::on)
    pub fn right_join_entity<S: EntityPath>(self, target: &S) -> Self {
        self.push_entity_join(JoinKind::Right, target)
    }

    /// Extra join condition for the most recent join
    pub fn on(mut self, predicate: Predicate) -> Self {
        match self.query.joins.last_mut() {
            Some(join) => {
                join.on = Some(match join.on.take() {
                    Some(existing) => and(existing, predicate.into_expr()),
                    None => predicate.into_expr(),
                });
            }
            None => self
                .query
                .deferred_errors
                .push(QueryError::validation("`on` without a preceding join")),
        }
        self
    }

    /// Materialize the most recently joined entity into its owner
    pub fn fetch_join(mut self) -> Self {
        match self.query.joins.last_mut() {
            Some(join) => join.fetch = true,
            None => self
                .query
                .deferred_errors
                .push(QueryError::validation("`fetch_join` without a preceding join")),
        }
        self
    }

    /// Add a predicate; all predicates are conjoined
    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate.into_expr());
        self
    }

    /// Add several predicates at once, same as calling `filter` for each
    pub fn filter_all<I: IntoIterator<Item = Predicate>>(mut self, predicates: I) -> Self {
        self.predicates
            .extend(predicates.into_iter().map(Predicate::into_expr));
        self
    }

    /// Add an untyped predicate; its type is checked at build
    pub fn filter_expr(mut self, predicate: Expr) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn group_by(mut self, expr: impl Into<Expr>) -> Self {
        self.query.group_by.push(expr.into());
        self
    }

    pub fn having(mut self, predicate: Predicate) -> Self {
        self.having.push(predicate.into_expr());
        self
    }

    /// Append an ordering item; items apply in the order given
    pub fn order_by(mut self, spec: OrderSpec) -> Self {
        self.query.order_by.push(spec);
        self
    }

    /// Zero-based index of the first returned row
    pub fn offset(mut self, offset: u64) -> Self {
        self.query.offset = Some(offset);
        self
    }

    /// Maximum number of returned rows
    pub fn limit(mut self, limit: u64) -> Self {
        self.query.limit = Some(limit);
        self
    }

    /// Finish chaining without validation.
    ///
    /// Used for subqueries, which are validated together with the query that
    /// embeds them.
    pub fn into_logical(self) -> LogicalQuery {
        finish(self.query, self.predicates, self.having)
    }

    /// Validate and finalize with the default configuration
    pub fn build(self) -> Result<Query<P>, QueryError> {
        self.build_with(&QueryConfig::default())
    }

    /// Validate and finalize, resolving unspecified null ordering from `config`
    pub fn build_with(self, config: &QueryConfig) -> Result<Query<P>, QueryError> {
        let QueryBuilder {
            projection,
            query,
            predicates,
            having,
        } = self;
        let mut plan = finish(query, predicates, having);
        validate::validate(&plan)?;
        resolve_null_ordering(&mut plan, config.default_null_ordering);
        Ok(Query::new(projection, plan))
    }

    /// Build against the executor's configuration and fetch all rows
    pub fn fetch<E: QueryExecutor + ?Sized>(self, executor: &E) -> Result<Vec<P::Output>, QueryError> {
        self.build_with(&executor.query_config())?.fetch(executor)
    }

    /// Build and fetch exactly one row
    pub fn fetch_one<E: QueryExecutor + ?Sized>(self, executor: &E) -> Result<P::Output, QueryError> {
        self.build_with(&executor.query_config())?.fetch_one(executor)
    }

    /// Build and fetch zero or one row
    pub fn fetch_optional<E: QueryExecutor + ?Sized>(
        self,
        executor: &E,
    ) -> Result<Option<P::Output>, QueryError> {
        self.build_with(&executor.query_config())?.fetch_optional(executor)
    }

    /// Build and fetch the first row, if any
    pub fn fetch_first<E: QueryExecutor + ?Sized>(
        self,
        executor: &E,
    ) -> Result<Option<P::Output>, QueryError> {
        self.build_with(&executor.query_config())?.fetch_first(executor)
    }

    /// Build and fetch one page plus the unpaged total
    pub fn fetch_results<E: QueryExecutor + ?Sized>(
        self,
        executor: &E,
    ) -> Result<ResultPage<P::Output>, QueryError> {
        self.build_with(&executor.query_config())?.fetch_results(executor)
    }

    /// Build and count matching rows
    pub fn fetch_count<E: QueryExecutor + ?Sized>(self, executor: &E) -> Result<u64, QueryError> {
        self.build_with(&executor.query_config())?.fetch_count(executor)
    }
}

fn finish(mut query: LogicalQuery, predicates: Vec<Expr>, having: Vec<Expr>) -> LogicalQuery {
    match Expr::conjunction(predicates) {
        Ok(predicate) => query.predicate = predicate,
        Err(err) => query.deferred_errors.push(err),
    }
    match Expr::conjunction(having) {
        Ok(having) => query.having = having,
        Err(err) => query.deferred_errors.push(err),
    }
    query
}

fn and(left: Expr, right: Expr) -> Expr {
    Expr::Logical {
        op: LogicalOp::And,
        left: Box::new(left),
        right: Box::new(right),
    }
}

/// Give every order spec, including those of nested subqueries, an explicit
/// null ordering.
fn resolve_null_ordering(plan: &mut LogicalQuery, default: NullOrdering) {
    plan.order_by = std::mem::take(&mut plan.order_by)
        .into_iter()
        .map(|spec| spec.resolve(default))
        .collect();
    for spec in &mut plan.order_by {
        resolve_in_expr(&mut spec.expr, default);
    }
    for selection in &mut plan.selections {
        if let Selection::Expr(expr) = selection {
            resolve_in_expr(expr, default);
        }
    }
    for join in &mut plan.joins {
        if let Some(on) = &mut join.on {
            resolve_in_expr(on, default);
        }
    }
    for expr in plan
        .predicate
        .iter_mut()
        .chain(plan.having.iter_mut())
        .chain(plan.group_by.iter_mut())
    {
        resolve_in_expr(expr, default);
    }
}

fn resolve_in_expr(expr: &mut Expr, default: NullOrdering) {
    match expr {
        Expr::Column(_) | Expr::Literal(_) => {}
        Expr::SubQuery(query) => resolve_null_ordering(query, default),
        Expr::InSubquery { expr, query, .. } => {
            resolve_in_expr(expr, default);
            resolve_null_ordering(query, default);
        }
        Expr::Compare { left, right, .. }
        | Expr::Logical { left, right, .. }
        | Expr::Arithmetic { left, right, .. } => {
            resolve_in_expr(left, default);
            resolve_in_expr(right, default);
        }
        Expr::IsNull { expr, .. } | Expr::InList { expr, .. } | Expr::Like { expr, .. } => {
            resolve_in_expr(expr, default)
        }
        Expr::Not(inner) => resolve_in_expr(inner, default),
        Expr::Aggregate { arg, .. } => resolve_in_expr(arg, default),
    }
}
