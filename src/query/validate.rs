//! Build-time structural validation.
//!
//! Runs once per query from `QueryBuilder::build`, recursing into subqueries
//! with the enclosing aliases in scope so correlated references resolve.

use crate::error::QueryError;
use crate::expr::Expr;
use crate::query::plan::{Join, JoinKind, LogicalQuery, Selection, Source};
use crate::schema::AssociationKind;
use crate::value::ValueType;

/// Validate a finalized query tree.
pub fn validate(plan: &LogicalQuery) -> Result<(), QueryError> {
    validate_in(plan, &[])
}

fn validate_in(plan: &LogicalQuery, outer: &[&Source]) -> Result<(), QueryError> {
    if let Some(err) = plan.deferred_errors.first() {
        return Err(err.clone());
    }
    if plan.sources.is_empty() {
        return Err(QueryError::validation("query has no source; add one with `from`"));
    }
    if plan.selections.is_empty() {
        return Err(QueryError::validation("query has an empty projection"));
    }

    let mut local: Vec<&Source> = Vec::new();
    for source in &plan.sources {
        bind(&mut local, source)?;
    }
    for join in &plan.joins {
        if let Some(association) = &join.association {
            let owner = local
                .iter()
                .find(|s| s.alias == association.owner_alias)
                .ok_or_else(|| {
                    QueryError::validation(format!(
                        "join on `{}.{}` refers to an alias that is not bound before the join",
                        association.owner_alias, association.def.name
                    ))
                })?;
            if owner.schema.association(association.def.name) != Some(association.def) {
                return Err(QueryError::validation(format!(
                    "{} has no association `{}`",
                    owner.schema.table, association.def.name
                )));
            }
            if association.def.target_table != join.target.schema.table {
                return Err(QueryError::validation(format!(
                    "association `{}` targets {}, not {}",
                    association.def.name, association.def.target_table, join.target.schema.table
                )));
            }
        } else if join.on.is_none() {
            return Err(QueryError::validation(format!(
                "join on unrelated entity `{}` requires an `on` condition",
                join.target.alias
            )));
        }
        bind(&mut local, &join.target)?;
        if join.fetch {
            check_fetch_join(plan, join)?;
        }
    }

    let scope: Vec<&Source> = outer.iter().copied().chain(local.iter().copied()).collect();

    for selection in &plan.selections {
        if let Selection::Entity(entity) = selection {
            if !local.iter().any(|s| s.alias == entity.alias) {
                return Err(QueryError::validation(format!(
                    "selected entity `{}` is not a source of the query",
                    entity.alias
                )));
            }
        }
    }

    for expr in plan.expressions() {
        check_expr(expr, &scope)?;
    }

    if let Some(predicate) = &plan.predicate {
        expect_bool("where", predicate)?;
        if predicate.contains_aggregate() {
            return Err(QueryError::validation(
                "aggregate functions are not allowed in `where`; use `having`",
            ));
        }
    }
    for join in &plan.joins {
        if let Some(on) = &join.on {
            expect_bool("on", on)?;
            if on.contains_aggregate() {
                return Err(QueryError::validation("aggregate functions are not allowed in `on`"));
            }
        }
    }
    for expr in &plan.group_by {
        if expr.contains_aggregate() {
            return Err(QueryError::validation("aggregate functions are not allowed in `group_by`"));
        }
    }
    if let Some(having) = &plan.having {
        expect_bool("having", having)?;
    }

    if plan.is_grouped() {
        check_grouping(plan)?;
    }

    for expr in plan.expressions() {
        for subquery in expr.subqueries() {
            if subquery.scalar_type().is_none() {
                return Err(QueryError::validation(
                    "subquery must project exactly one expression",
                ));
            }
            validate_in(subquery, &scope)?;
        }
    }
    Ok(())
}

fn bind<'q>(local: &mut Vec<&'q Source>, source: &'q Source) -> Result<(), QueryError> {
    if local.iter().any(|s| s.alias == source.alias) {
        return Err(QueryError::validation(format!(
            "alias `{}` is bound more than once",
            source.alias
        )));
    }
    source.schema.id_column()?;
    local.push(source);
    Ok(())
}

fn check_fetch_join(plan: &LogicalQuery, join: &Join) -> Result<(), QueryError> {
    let Some(association) = &join.association else {
        return Err(QueryError::validation(
            "fetch join requires an association join",
        ));
    };
    if !matches!(association.def.kind, AssociationKind::ManyToOne { .. }) {
        return Err(QueryError::validation(format!(
            "fetch join of collection association `{}` is not supported",
            association.def.name
        )));
    }
    if join.kind == JoinKind::Right {
        return Err(QueryError::validation("fetch join must be an inner or left join"));
    }
    if join.on.is_some() {
        return Err(QueryError::validation("fetch join cannot carry an `on` condition"));
    }
    let owner_selected = plan.selections.iter().any(|s| {
        matches!(s, Selection::Entity(e) if e.alias == association.owner_alias)
    });
    if !owner_selected {
        return Err(QueryError::validation(format!(
            "fetch join of `{}.{}` requires `{}` to be selected as an entity",
            association.owner_alias, association.def.name, association.owner_alias
        )));
    }
    Ok(())
}

fn check_expr(expr: &Expr, scope: &[&Source]) -> Result<(), QueryError> {
    expr.check_types()?;
    let mut result = Ok(());
    expr.visit(&mut |e| {
        if result.is_err() {
            return;
        }
        match e {
            Expr::Column(column) => {
                let Some(source) = scope.iter().rev().find(|s| s.alias == column.alias) else {
                    result = Err(QueryError::validation(format!(
                        "unknown alias `{}` in `{e}`",
                        column.alias
                    )));
                    return;
                };
                if source.schema.column_index(column.column).is_none() {
                    result = Err(QueryError::validation(format!(
                        "{} has no column `{}`",
                        source.schema.table, column.column
                    )));
                }
            }
            Expr::Aggregate { arg, .. } if arg.contains_aggregate() => {
                result = Err(QueryError::validation(format!(
                    "nested aggregate functions in `{e}`"
                )));
            }
            _ => {}
        }
    });
    result
}

fn expect_bool(clause: &str, expr: &Expr) -> Result<(), QueryError> {
    match expr.result_type() {
        ValueType::Bool => Ok(()),
        other => Err(QueryError::validation(format!(
            "`{clause}` condition must be boolean, got {other}"
        ))),
    }
}

fn check_grouping(plan: &LogicalQuery) -> Result<(), QueryError> {
    let local: Vec<&str> = plan.scope().map(|s| s.alias.as_str()).collect();
    for selection in &plan.selections {
        match selection {
            Selection::Entity(entity) => {
                let id = entity.schema.id_column()?.name;
                let grouped = plan.group_by.iter().any(|g| {
                    matches!(g, Expr::Column(c) if c.alias == entity.alias && c.column == id)
                });
                if !grouped {
                    return Err(QueryError::validation(format!(
                        "entity `{}` is selected in an aggregate query but `{}.{id}` is not grouped",
                        entity.alias, entity.alias
                    )));
                }
            }
            Selection::Expr(expr) => ensure_grouped("projection", expr, &plan.group_by, &local)?,
        }
    }
    if let Some(having) = &plan.having {
        ensure_grouped("having", having, &plan.group_by, &local)?;
    }
    for spec in &plan.order_by {
        ensure_grouped("order_by", &spec.expr, &plan.group_by, &local)?;
    }
    Ok(())
}

/// Every column reference of the current query must sit under an aggregate or
/// inside a grouped expression. References to enclosing queries are constant
/// per group.
fn ensure_grouped(
    clause: &str,
    expr: &Expr,
    group_by: &[Expr],
    local: &[&str],
) -> Result<(), QueryError> {
    if group_by.contains(expr) {
        return Ok(());
    }
    match expr {
        Expr::Aggregate { .. } | Expr::Literal(_) | Expr::SubQuery(_) => Ok(()),
        Expr::Column(column) if !local.contains(&column.alias.as_str()) => Ok(()),
        Expr::Column(_) => Err(QueryError::validation(format!(
            "`{expr}` in {clause} must be grouped or aggregated"
        ))),
        Expr::Compare { left, right, .. }
        | Expr::Logical { left, right, .. }
        | Expr::Arithmetic { left, right, .. } => {
            ensure_grouped(clause, left, group_by, local)?;
            ensure_grouped(clause, right, group_by, local)
        }
        Expr::IsNull { expr: inner, .. }
        | Expr::InList { expr: inner, .. }
        | Expr::InSubquery { expr: inner, .. }
        | Expr::Like { expr: inner, .. }
        | Expr::Not(inner) => ensure_grouped(clause, inner, group_by, local),
    }
}
