//! Lowering of logical queries to parameterized PostgreSQL.
//!
//! Rendering goes through `sea_query` so every literal becomes a bind value
//! and identifiers are quoted. The logical plan travels with the SQL so that a
//! store which does not speak SQL can still execute the statement.

use crate::error::QueryError;
use crate::executor::Row;
use crate::expr::typed::{Direction, NullOrdering};
use crate::expr::{AggregateFn, ArithmeticOp, CompareOp, Expr, LogicalOp};
use crate::query::plan::{Join, JoinKind, LogicalQuery, Selection, Shape};
use crate::schema::{AssociationKind, EntitySchema};
use sea_query::{
    Alias, Expr as SqlExpr, ExprTrait, Func, JoinType, LikeExpr, Order, PostgresQueryBuilder,
    Query as SqlQuery, SelectStatement, SubQueryStatement, Values,
};

/// A rendered select statement
#[derive(Debug, Clone)]
pub struct Statement {
    pub sql: String,
    pub values: Values,
    pub plan: LogicalQuery,
}

impl Statement {
    pub fn render(plan: &LogicalQuery) -> Self {
        let (sql, values) = match plan.shape {
            Shape::Rows => select_statement(plan).build(PostgresQueryBuilder),
            Shape::Count => count_statement(plan).build(PostgresQueryBuilder),
        };
        Self {
            sql,
            values,
            plan: plan.clone(),
        }
    }
}

/// A rendered multi-row insert
#[derive(Debug, Clone)]
pub struct Insert {
    pub sql: String,
    pub values: Values,
    pub schema: &'static EntitySchema,
    pub rows: Vec<Row>,
}

impl Insert {
    pub fn render(schema: &'static EntitySchema, rows: Vec<Row>) -> Result<Self, QueryError> {
        let mut insert = SqlQuery::insert();
        insert
            .into_table(alias(schema.table))
            .columns(schema.columns.iter().map(|c| alias(c.name)));
        for row in &rows {
            insert
                .values(row.iter().map(|v| SqlExpr::val(v.to_sea_value())))
                .map_err(|e| QueryError::execution(format!("cannot render insert: {e}")))?;
        }
        let (sql, values) = insert.build(PostgresQueryBuilder);
        Ok(Self {
            sql,
            values,
            schema,
            rows,
        })
    }
}

fn alias(name: &str) -> Alias {
    Alias::new(name.to_string())
}

fn column(table_alias: &str, column: &str) -> SqlExpr {
    SqlExpr::col((alias(table_alias), alias(column)))
}

/// Source, joins and `WHERE` shared by row and count statements
fn base_statement(plan: &LogicalQuery) -> SelectStatement {
    let mut select = SqlQuery::select();
    for source in &plan.sources {
        select.from_as(alias(source.schema.table), alias(&source.alias));
    }
    for join in &plan.joins {
        let kind = match join.kind {
            JoinKind::Inner => JoinType::InnerJoin,
            JoinKind::Left => JoinType::LeftJoin,
            JoinKind::Right => JoinType::RightJoin,
        };
        select.join_as(
            kind,
            alias(join.target.schema.table),
            alias(&join.target.alias),
            join_condition(plan, join),
        );
    }
    if let Some(predicate) = &plan.predicate {
        select.and_where(lower(predicate));
    }
    select
}

/// Bound sources were checked for an identity column at build
fn id_name(schema: &EntitySchema) -> &'static str {
    schema.id_column().map_or("id", |c| c.name)
}

fn join_condition(plan: &LogicalQuery, join: &Join) -> SqlExpr {
    let target = &join.target;
    let association = join.association.as_ref().map(|a| match a.def.kind {
        AssociationKind::ManyToOne { join_column } => column(&a.owner_alias, join_column)
            .eq(column(&target.alias, id_name(target.schema))),
        AssociationKind::OneToMany { mapped_by } => {
            let owner_id = plan
                .find_source(&a.owner_alias)
                .map_or("id", |owner| id_name(owner.schema));
            column(&target.alias, mapped_by).eq(column(&a.owner_alias, owner_id))
        }
    });
    match (association, &join.on) {
        (Some(cond), Some(on)) => cond.and(lower(on)),
        (Some(cond), None) => cond,
        (None, Some(on)) => lower(on),
        (None, None) => SqlExpr::cust("TRUE"),
    }
}

fn grouping(select: &mut SelectStatement, plan: &LogicalQuery) {
    if !plan.group_by.is_empty() {
        select.add_group_by(plan.group_by.iter().map(lower));
    }
    if let Some(having) = &plan.having {
        select.and_having(lower(having));
    }
}

fn select_statement(plan: &LogicalQuery) -> SelectStatement {
    let mut select = base_statement(plan);
    for selection in &plan.selections {
        match selection {
            Selection::Entity(entity) => {
                for def in entity.schema.columns {
                    select.expr(column(&entity.alias, def.name));
                }
            }
            Selection::Expr(expr) => {
                select.expr(lower(expr));
            }
        }
    }
    for join in plan.fetch_joins() {
        for def in join.target.schema.columns {
            select.expr(column(&join.target.alias, def.name));
        }
    }
    grouping(&mut select, plan);
    for spec in &plan.order_by {
        let order = match spec.direction {
            Direction::Asc => Order::Asc,
            Direction::Desc => Order::Desc,
        };
        match spec.nulls {
            Some(nulls) => {
                let nulls = match nulls {
                    NullOrdering::First => sea_query::NullOrdering::First,
                    NullOrdering::Last => sea_query::NullOrdering::Last,
                };
                select.order_by_expr_with_nulls(lower(&spec.expr), order, nulls);
            }
            None => {
                select.order_by_expr(lower(&spec.expr), order);
            }
        }
    }
    if let Some(limit) = plan.limit {
        select.limit(limit);
    }
    if let Some(offset) = plan.offset {
        select.offset(offset);
    }
    select
}

/// `SELECT COUNT(*)` over the same tree; grouped queries count their groups.
fn count_statement(plan: &LogicalQuery) -> SelectStatement {
    let mut inner = base_statement(plan);
    if plan.is_grouped() {
        inner.expr(SqlExpr::cust("1"));
        grouping(&mut inner, plan);
        // Without GROUP BY or HAVING the inner select would yield one row per input row
        if plan.group_by.is_empty() && plan.having.is_none() {
            inner.and_having(SqlExpr::cust("TRUE"));
        }
        let mut outer = SqlQuery::select();
        outer
            .expr(SqlExpr::cust("COUNT(*)"))
            .from_subquery(inner, alias("grouped"));
        outer
    } else {
        inner.expr(SqlExpr::cust("COUNT(*)"));
        inner
    }
}

/// Lower an expression tree to a `sea_query` expression
pub(crate) fn lower(expr: &Expr) -> SqlExpr {
    match expr {
        Expr::Column(c) => column(&c.alias, c.column),
        Expr::Literal(v) => SqlExpr::val(v.to_sea_value()),
        Expr::Compare { op, left, right } => {
            let (l, r) = (lower(left), lower(right));
            match op {
                CompareOp::Eq => l.eq(r),
                CompareOp::Ne => l.ne(r),
                CompareOp::Gt => l.gt(r),
                CompareOp::Goe => l.gte(r),
                CompareOp::Lt => l.lt(r),
                CompareOp::Loe => l.lte(r),
            }
        }
        Expr::IsNull { expr, negated } => {
            if *negated {
                lower(expr).is_not_null()
            } else {
                lower(expr).is_null()
            }
        }
        Expr::InList {
            expr,
            values,
            negated,
        } => {
            let values: Vec<sea_query::Value> = values.iter().map(|v| v.to_sea_value()).collect();
            if *negated {
                lower(expr).is_not_in(values)
            } else {
                lower(expr).is_in(values)
            }
        }
        Expr::InSubquery {
            expr,
            query,
            negated,
        } => {
            let sub = select_statement(query);
            if *negated {
                lower(expr).not_in_subquery(sub)
            } else {
                lower(expr).in_subquery(sub)
            }
        }
        Expr::Like { expr, pattern } => {
            lower(expr).like(LikeExpr::new(pattern.clone()).escape('\\'))
        }
        Expr::Logical { op, left, right } => match op {
            LogicalOp::And => lower(left).and(lower(right)),
            LogicalOp::Or => lower(left).or(lower(right)),
        },
        Expr::Not(inner) => lower(inner).not(),
        Expr::Arithmetic { op, left, right } => {
            let (l, r) = (lower(left), lower(right));
            match op {
                ArithmeticOp::Add => l.add(r),
                ArithmeticOp::Subtract => l.sub(r),
                ArithmeticOp::Multiply => l.mul(r),
                ArithmeticOp::Divide => l.div(r),
            }
        }
        Expr::Aggregate { func, arg } => {
            let arg = lower(arg);
            SqlExpr::from(match func {
                AggregateFn::Count => Func::count(arg),
                AggregateFn::CountDistinct => Func::count_distinct(arg),
                AggregateFn::Sum => Func::sum(arg),
                AggregateFn::Avg => Func::avg(arg),
                AggregateFn::Max => Func::max(arg),
                AggregateFn::Min => Func::min(arg),
            })
        }
        Expr::SubQuery(query) => SqlExpr::SubQuery(
            None,
            Box::new(SubQueryStatement::SelectStatement(select_statement(query))),
        ),
    }
}
