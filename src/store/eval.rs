//! Evaluation of logical queries over in-memory tables.
//!
//! A query is evaluated in the same steps a SQL engine takes: cartesian product
//! of the sources, joins, `WHERE` with three-valued logic, grouping and
//! `HAVING`, projection, a stable sort, then offset and limit. Subqueries run
//! against the same borrowed tables, with the enclosing row in scope for
//! correlated references.

use crate::error::QueryError;
use crate::executor::Row;
use crate::expr::typed::{Direction, NullOrdering, OrderSpec};
use crate::expr::{AggregateFn, ArithmeticOp, ColumnRef, Expr, LogicalOp};
use crate::query::plan::{Join, JoinKind, LogicalQuery, Selection, Shape};
use crate::schema::{AssociationKind, EntitySchema};
use crate::value::{Value, ValueType};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

/// Rows of one table keyed by identity
#[derive(Debug, Clone)]
pub(crate) struct Table {
    pub schema: &'static EntitySchema,
    pub rows: BTreeMap<i64, Row>,
}

pub(crate) type Tables = HashMap<&'static str, Table>;

/// An alias bound to a row, or to nothing for the missing side of an outer join
#[derive(Debug, Clone, Copy)]
struct Slot<'a> {
    alias: &'a str,
    schema: &'static EntitySchema,
    row: Option<&'a [Value]>,
}

type Binding<'a> = Vec<Slot<'a>>;

enum Context<'r, 'a> {
    Row(&'r [Slot<'a>]),
    Group {
        rows: &'r [Binding<'a>],
        outer: &'r [Slot<'a>],
    },
}

impl<'r, 'a> Context<'r, 'a> {
    /// Slots used for plain column references; grouped columns are constant
    /// within a group so the first row stands for all of them
    fn slots(&self) -> &'r [Slot<'a>] {
        match *self {
            Context::Row(slots) => slots,
            Context::Group { rows, outer } => rows.first().map_or(outer, |b| b.as_slice()),
        }
    }
}

pub(crate) struct Evaluator<'a> {
    tables: &'a Tables,
}

impl<'a> Evaluator<'a> {
    pub fn new(tables: &'a Tables) -> Self {
        Self { tables }
    }

    pub fn run(&self, plan: &'a LogicalQuery) -> Result<Vec<Row>, QueryError> {
        self.query(plan, &[])
    }

    fn rows_of(&self, table: &str) -> Vec<&'a [Value]> {
        self.tables
            .get(table)
            .map(|t| t.rows.values().map(Vec::as_slice).collect())
            .unwrap_or_default()
    }

    fn query(&self, plan: &'a LogicalQuery, outer: &[Slot<'a>]) -> Result<Vec<Row>, QueryError> {
        let mut bindings: Vec<Binding<'a>> = vec![outer.to_vec()];
        for source in &plan.sources {
            let rows = self.rows_of(source.schema.table);
            let mut next = Vec::with_capacity(bindings.len() * rows.len());
            for binding in &bindings {
                for row in &rows {
                    let mut extended = binding.clone();
                    extended.push(Slot {
                        alias: &source.alias,
                        schema: source.schema,
                        row: Some(row),
                    });
                    next.push(extended);
                }
            }
            bindings = next;
        }

        for (index, join) in plan.joins.iter().enumerate() {
            bindings = self.join(plan, index, join, bindings, outer)?;
        }

        if let Some(predicate) = &plan.predicate {
            let mut kept = Vec::with_capacity(bindings.len());
            for binding in bindings {
                if truthy(&self.eval(predicate, &Context::Row(&binding))?) {
                    kept.push(binding);
                }
            }
            bindings = kept;
        }

        let mut output: Vec<(Row, Vec<Value>)> = Vec::new();
        if plan.is_grouped() {
            let groups = self.groups(plan, bindings)?;
            let mut kept = Vec::with_capacity(groups.len());
            for group in groups {
                let ctx = Context::Group {
                    rows: &group,
                    outer,
                };
                let keep = match &plan.having {
                    Some(having) => truthy(&self.eval(having, &ctx)?),
                    None => true,
                };
                if keep {
                    kept.push(group);
                }
            }
            if plan.shape == Shape::Count {
                return Ok(vec![vec![count_value(kept.len())?]]);
            }
            for group in &kept {
                let ctx = Context::Group { rows: group, outer };
                output.push(self.project(plan, &ctx)?);
            }
        } else {
            if plan.shape == Shape::Count {
                return Ok(vec![vec![count_value(bindings.len())?]]);
            }
            for binding in &bindings {
                output.push(self.project(plan, &Context::Row(binding))?);
            }
        }

        if !plan.order_by.is_empty() {
            output.sort_by(|(_, a), (_, b)| compare_keys(&plan.order_by, a, b));
        }
        let offset = plan.offset.map_or(0, to_usize);
        let limit = plan.limit.map_or(usize::MAX, to_usize);
        Ok(output
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|(row, _)| row)
            .collect())
    }

    fn join(
        &self,
        plan: &'a LogicalQuery,
        index: usize,
        join: &'a Join,
        bindings: Vec<Binding<'a>>,
        outer: &[Slot<'a>],
    ) -> Result<Vec<Binding<'a>>, QueryError> {
        let targets = self.rows_of(join.target.schema.table);
        let mut matched = vec![false; targets.len()];
        let mut next = Vec::new();
        let slot = |row| Slot {
            alias: join.target.alias.as_str(),
            schema: join.target.schema,
            row,
        };

        for binding in bindings {
            let mut any = false;
            for (i, target) in targets.iter().enumerate() {
                let mut candidate = binding.clone();
                candidate.push(slot(Some(*target)));
                if self.join_matches(join, &candidate)? {
                    matched[i] = true;
                    any = true;
                    next.push(candidate);
                }
            }
            if !any && join.kind == JoinKind::Left {
                let mut candidate = binding;
                candidate.push(slot(None));
                next.push(candidate);
            }
        }

        if join.kind == JoinKind::Right {
            let bound_before = plan
                .sources
                .iter()
                .chain(plan.joins[..index].iter().map(|j| &j.target));
            for (i, target) in targets.iter().enumerate() {
                if matched[i] {
                    continue;
                }
                let mut candidate: Binding<'a> = outer.to_vec();
                candidate.extend(bound_before.clone().map(|s| Slot {
                    alias: s.alias.as_str(),
                    schema: s.schema,
                    row: None,
                }));
                candidate.push(slot(Some(*target)));
                next.push(candidate);
            }
        }
        Ok(next)
    }

    fn join_matches(&self, join: &'a Join, candidate: &[Slot<'a>]) -> Result<bool, QueryError> {
        if let Some(association) = &join.association {
            let owner = find_slot(candidate, &association.owner_alias)?;
            let target = find_slot(candidate, &join.target.alias)?;
            let (from, key) = match association.def.kind {
                AssociationKind::ManyToOne { join_column } => (
                    slot_value(owner, join_column)?,
                    slot_value(target, target.schema.id_column()?.name)?,
                ),
                AssociationKind::OneToMany { mapped_by } => (
                    slot_value(target, mapped_by)?,
                    slot_value(owner, owner.schema.id_column()?.name)?,
                ),
            };
            if from.compare(&key) != Some(Ordering::Equal) {
                return Ok(false);
            }
        }
        match &join.on {
            Some(on) => Ok(truthy(&self.eval(on, &Context::Row(candidate))?)),
            None => Ok(true),
        }
    }

    /// Partition rows by the `GROUP BY` key, in order of first appearance.
    /// Without `GROUP BY` all rows form one group, even when there are none.
    fn groups(
        &self,
        plan: &'a LogicalQuery,
        bindings: Vec<Binding<'a>>,
    ) -> Result<Vec<Vec<Binding<'a>>>, QueryError> {
        if plan.group_by.is_empty() {
            return Ok(vec![bindings]);
        }
        let mut groups: Vec<(Vec<Value>, Vec<Binding<'a>>)> = Vec::new();
        for binding in bindings {
            let key = plan
                .group_by
                .iter()
                .map(|e| self.eval(e, &Context::Row(&binding)))
                .collect::<Result<Vec<_>, _>>()?;
            match groups.iter_mut().find(|(k, _)| *k == key) {
                Some((_, rows)) => rows.push(binding),
                None => groups.push((key, vec![binding])),
            }
        }
        Ok(groups.into_iter().map(|(_, rows)| rows).collect())
    }

    /// Output columns plus the sort keys of one row or group
    fn project(
        &self,
        plan: &'a LogicalQuery,
        ctx: &Context<'_, 'a>,
    ) -> Result<(Row, Vec<Value>), QueryError> {
        let mut row = Vec::new();
        for selection in &plan.selections {
            match selection {
                Selection::Entity(entity) => {
                    entity_values(ctx.slots(), &entity.alias, entity.schema, &mut row)?
                }
                Selection::Expr(expr) => row.push(self.eval(expr, ctx)?),
            }
        }
        for join in plan.fetch_joins() {
            entity_values(ctx.slots(), &join.target.alias, join.target.schema, &mut row)?;
        }
        let keys = plan
            .order_by
            .iter()
            .map(|spec| self.eval(&spec.expr, ctx))
            .collect::<Result<Vec<_>, _>>()?;
        Ok((row, keys))
    }

    fn eval(&self, expr: &'a Expr, ctx: &Context<'_, 'a>) -> Result<Value, QueryError> {
        match expr {
            Expr::Column(column) => column_value(ctx.slots(), column),
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Compare { op, left, right } => {
                let (l, r) = (self.eval(left, ctx)?, self.eval(right, ctx)?);
                if l.is_null() || r.is_null() {
                    return Ok(Value::Null);
                }
                let ordering = l.compare(&r).ok_or_else(|| {
                    QueryError::execution(format!("cannot compare {l} with {r}"))
                })?;
                Ok(Value::Bool(op.holds(ordering)))
            }
            Expr::IsNull { expr, negated } => {
                Ok(Value::Bool(self.eval(expr, ctx)?.is_null() != *negated))
            }
            Expr::InList {
                expr,
                values,
                negated,
            } => {
                let value = self.eval(expr, ctx)?;
                Ok(membership(&value, values, *negated))
            }
            Expr::InSubquery {
                expr,
                query,
                negated,
            } => {
                let value = self.eval(expr, ctx)?;
                let values: Vec<Value> = self
                    .query(query, ctx.slots())?
                    .into_iter()
                    .filter_map(|row| row.into_iter().next())
                    .collect();
                Ok(membership(&value, &values, *negated))
            }
            Expr::Like { expr, pattern } => match self.eval(expr, ctx)? {
                Value::Null => Ok(Value::Null),
                Value::Text(text) => Ok(Value::Bool(like_matches(&text, pattern))),
                other => Err(QueryError::execution(format!("cannot apply like to {other}"))),
            },
            Expr::Logical { op, left, right } => {
                let l = as_bool(&self.eval(left, ctx)?)?;
                // Short-circuit on the deciding value
                match (op, l) {
                    (LogicalOp::And, Some(false)) => return Ok(Value::Bool(false)),
                    (LogicalOp::Or, Some(true)) => return Ok(Value::Bool(true)),
                    _ => {}
                }
                let r = as_bool(&self.eval(right, ctx)?)?;
                Ok(match (op, l, r) {
                    (LogicalOp::And, _, Some(false)) => Value::Bool(false),
                    (LogicalOp::And, Some(true), Some(true)) => Value::Bool(true),
                    (LogicalOp::Or, _, Some(true)) => Value::Bool(true),
                    (LogicalOp::Or, Some(false), Some(false)) => Value::Bool(false),
                    _ => Value::Null,
                })
            }
            Expr::Not(inner) => Ok(match as_bool(&self.eval(inner, ctx)?)? {
                Some(b) => Value::Bool(!b),
                None => Value::Null,
            }),
            Expr::Arithmetic { op, left, right } => {
                arithmetic(*op, self.eval(left, ctx)?, self.eval(right, ctx)?)
            }
            Expr::Aggregate { func, arg } => {
                let Context::Group { rows, .. } = ctx else {
                    return Err(QueryError::execution(format!(
                        "aggregate `{expr}` evaluated outside of a group"
                    )));
                };
                let mut values = Vec::with_capacity(rows.len());
                for binding in rows.iter() {
                    let value = self.eval(arg, &Context::Row(binding))?;
                    if !value.is_null() {
                        values.push(value);
                    }
                }
                aggregate(*func, arg.result_type(), values)
            }
            Expr::SubQuery(query) => {
                let mut rows = self.query(query, ctx.slots())?;
                match rows.len() {
                    0 => Ok(Value::Null),
                    1 => Ok(rows.swap_remove(0).into_iter().next().unwrap_or(Value::Null)),
                    n => Err(QueryError::execution(format!(
                        "scalar subquery returned {n} rows"
                    ))),
                }
            }
        }
    }
}

fn find_slot<'s, 'a>(slots: &'s [Slot<'a>], alias: &str) -> Result<&'s Slot<'a>, QueryError> {
    slots
        .iter()
        .rev()
        .find(|s| s.alias == alias)
        .ok_or_else(|| QueryError::execution(format!("alias `{alias}` is not bound")))
}

fn slot_value(slot: &Slot<'_>, column: &str) -> Result<Value, QueryError> {
    let Some(row) = slot.row else {
        return Ok(Value::Null);
    };
    let index = slot.schema.column_index(column).ok_or_else(|| {
        QueryError::execution(format!("{} has no column `{column}`", slot.schema.table))
    })?;
    Ok(row.get(index).cloned().unwrap_or(Value::Null))
}

fn column_value(slots: &[Slot<'_>], column: &ColumnRef) -> Result<Value, QueryError> {
    slot_value(find_slot(slots, &column.alias)?, column.column)
}

fn entity_values(
    slots: &[Slot<'_>],
    alias: &str,
    schema: &'static EntitySchema,
    out: &mut Row,
) -> Result<(), QueryError> {
    match find_slot(slots, alias)?.row {
        Some(row) => out.extend_from_slice(row),
        None => out.extend(std::iter::repeat(Value::Null).take(schema.width())),
    }
    Ok(())
}

fn truthy(value: &Value) -> bool {
    matches!(value, Value::Bool(true))
}

fn as_bool(value: &Value) -> Result<Option<bool>, QueryError> {
    match value {
        Value::Bool(b) => Ok(Some(*b)),
        Value::Null => Ok(None),
        other => Err(QueryError::execution(format!("expected a boolean, got {other}"))),
    }
}

/// SQL `IN`: null when the probe is null or no match was found among nulls
fn membership(value: &Value, list: &[Value], negated: bool) -> Value {
    if list.is_empty() {
        return Value::Bool(negated);
    }
    if value.is_null() {
        return Value::Null;
    }
    if list.iter().any(|v| value.compare(v) == Some(Ordering::Equal)) {
        return Value::Bool(!negated);
    }
    if list.iter().any(Value::is_null) {
        return Value::Null;
    }
    Value::Bool(negated)
}

fn arithmetic(op: ArithmeticOp, left: Value, right: Value) -> Result<Value, QueryError> {
    if left.is_null() || right.is_null() {
        return Ok(Value::Null);
    }
    let overflow = || QueryError::execution(format!("integer overflow in {left} {} {right}", op.name()));
    if let (Value::Int(a), Value::Int(b), false) = (&left, &right, op == ArithmeticOp::Divide) {
        let result = match op {
            ArithmeticOp::Add => a.checked_add(*b),
            ArithmeticOp::Subtract => a.checked_sub(*b),
            _ => a.checked_mul(*b),
        };
        return result.map(Value::Int).ok_or_else(overflow);
    }
    let (Some(a), Some(b)) = (left.as_f64(), right.as_f64()) else {
        return Err(QueryError::execution(format!(
            "cannot apply {} to {left} and {right}",
            op.name()
        )));
    };
    match op {
        ArithmeticOp::Add => Ok(Value::Float(a + b)),
        ArithmeticOp::Subtract => Ok(Value::Float(a - b)),
        ArithmeticOp::Multiply => Ok(Value::Float(a * b)),
        ArithmeticOp::Divide if b == 0.0 => Err(QueryError::execution("division by zero")),
        ArithmeticOp::Divide => Ok(Value::Float(a / b)),
    }
}

/// Aggregate over non-null values; empty input yields null except for counts
fn aggregate(func: AggregateFn, arg_type: ValueType, values: Vec<Value>) -> Result<Value, QueryError> {
    match func {
        AggregateFn::Count => count_value(values.len()),
        AggregateFn::CountDistinct => {
            let mut distinct: Vec<Value> = Vec::new();
            for value in values {
                if !distinct.iter().any(|d| d.compare(&value) == Some(Ordering::Equal)) {
                    distinct.push(value);
                }
            }
            count_value(distinct.len())
        }
        _ if values.is_empty() => Ok(Value::Null),
        AggregateFn::Sum if arg_type == ValueType::Int => {
            let mut total: i64 = 0;
            for value in &values {
                let Value::Int(n) = value else {
                    return Err(QueryError::execution(format!("cannot sum {value}")));
                };
                total = total
                    .checked_add(*n)
                    .ok_or_else(|| QueryError::execution("integer overflow in sum"))?;
            }
            Ok(Value::Int(total))
        }
        AggregateFn::Sum | AggregateFn::Avg => {
            let mut total = 0.0;
            for value in &values {
                total += value
                    .as_f64()
                    .ok_or_else(|| QueryError::execution(format!("cannot sum {value}")))?;
            }
            if func == AggregateFn::Avg {
                total /= values.len() as f64;
            }
            Ok(Value::Float(total))
        }
        AggregateFn::Max | AggregateFn::Min => {
            let wanted = if func == AggregateFn::Max {
                Ordering::Greater
            } else {
                Ordering::Less
            };
            let mut iter = values.into_iter();
            let mut best = iter.next().unwrap_or(Value::Null);
            for value in iter {
                if value.compare(&best) == Some(wanted) {
                    best = value;
                }
            }
            Ok(best)
        }
    }
}

fn count_value(n: usize) -> Result<Value, QueryError> {
    i64::try_from(n)
        .map(Value::Int)
        .map_err(|_| QueryError::execution("count does not fit in i64"))
}

fn to_usize(n: u64) -> usize {
    usize::try_from(n).unwrap_or(usize::MAX)
}

/// Order two rows by their sort keys; null placement ignores direction
fn compare_keys(specs: &[OrderSpec], a: &[Value], b: &[Value]) -> Ordering {
    for (spec, (x, y)) in specs.iter().zip(a.iter().zip(b)) {
        let nulls_first = spec.nulls == Some(NullOrdering::First);
        let ordering = match (x.is_null(), y.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) if nulls_first => Ordering::Less,
            (true, false) => Ordering::Greater,
            (false, true) if nulls_first => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => {
                let ordering = x.compare(y).unwrap_or(Ordering::Equal);
                match spec.direction {
                    Direction::Asc => ordering,
                    Direction::Desc => ordering.reverse(),
                }
            }
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

enum LikeToken {
    Any,
    One,
    Char(char),
}

/// SQL `LIKE`: `%` any run, `_` one character, `\` escapes the next character
fn like_matches(text: &str, pattern: &str) -> bool {
    let mut tokens = Vec::new();
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        tokens.push(match c {
            '\\' => LikeToken::Char(chars.next().unwrap_or('\\')),
            '%' => LikeToken::Any,
            '_' => LikeToken::One,
            c => LikeToken::Char(c),
        });
    }
    let text: Vec<char> = text.chars().collect();
    let mut reachable = vec![false; text.len() + 1];
    reachable[0] = true;
    for token in &tokens {
        let mut next = vec![false; text.len() + 1];
        match token {
            LikeToken::Any => {
                let mut seen = false;
                for (i, slot) in next.iter_mut().enumerate() {
                    seen |= reachable[i];
                    *slot = seen;
                }
            }
            LikeToken::One => {
                for i in 0..text.len() {
                    next[i + 1] = reachable[i];
                }
            }
            LikeToken::Char(c) => {
                for i in 0..text.len() {
                    next[i + 1] = reachable[i] && text[i] == *c;
                }
            }
        }
        reachable = next;
    }
    reachable[text.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_wildcards() {
        assert!(like_matches("member1", "member%"));
        assert!(like_matches("member1", "%1"));
        assert!(like_matches("member1", "m_mber_"));
        assert!(!like_matches("member1", "member"));
        assert!(like_matches("50%", "50\\%"));
        assert!(!like_matches("500", "50\\%"));
        assert!(like_matches("", "%"));
    }

    #[test]
    fn test_membership_three_valued() {
        let list = [Value::Int(1), Value::Int(2)];
        assert_eq!(membership(&Value::Int(1), &list, false), Value::Bool(true));
        assert_eq!(membership(&Value::Int(3), &list, false), Value::Bool(false));
        assert_eq!(membership(&Value::Int(3), &list, true), Value::Bool(true));
        assert_eq!(membership(&Value::Null, &list, false), Value::Null);
        assert_eq!(membership(&Value::Null, &[], true), Value::Bool(true));
        assert_eq!(membership(&Value::Int(3), &[Value::Int(1), Value::Null], false), Value::Null);
    }

    #[test]
    fn test_aggregates_ignore_nulls_and_empty_input() {
        let ages = vec![Value::Int(10), Value::Int(20), Value::Int(30), Value::Int(40)];
        assert_eq!(aggregate(AggregateFn::Count, ValueType::Int, ages.clone()), Ok(Value::Int(4)));
        assert_eq!(aggregate(AggregateFn::Sum, ValueType::Int, ages.clone()), Ok(Value::Int(100)));
        assert_eq!(aggregate(AggregateFn::Avg, ValueType::Int, ages.clone()), Ok(Value::Float(25.0)));
        assert_eq!(aggregate(AggregateFn::Max, ValueType::Int, ages.clone()), Ok(Value::Int(40)));
        assert_eq!(aggregate(AggregateFn::Min, ValueType::Int, ages), Ok(Value::Int(10)));
        assert_eq!(aggregate(AggregateFn::Sum, ValueType::Int, Vec::new()), Ok(Value::Null));
        assert_eq!(aggregate(AggregateFn::Count, ValueType::Int, Vec::new()), Ok(Value::Int(0)));
    }

    #[test]
    fn test_sum_overflow_is_an_error() {
        let values = vec![Value::Int(i64::MAX), Value::Int(1)];
        assert!(matches!(
            aggregate(AggregateFn::Sum, ValueType::Int, values),
            Err(QueryError::Execution(_))
        ));
    }

    #[test]
    fn test_count_distinct() {
        let values = vec![Value::Int(1), Value::Int(1), Value::Int(2)];
        assert_eq!(aggregate(AggregateFn::CountDistinct, ValueType::Int, values), Ok(Value::Int(2)));
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(arithmetic(ArithmeticOp::Add, Value::Int(2), Value::Int(3)), Ok(Value::Int(5)));
        assert_eq!(arithmetic(ArithmeticOp::Divide, Value::Int(3), Value::Int(2)), Ok(Value::Float(1.5)));
        assert_eq!(arithmetic(ArithmeticOp::Multiply, Value::Null, Value::Int(2)), Ok(Value::Null));
        assert!(arithmetic(ArithmeticOp::Divide, Value::Int(1), Value::Int(0)).is_err());
        assert!(arithmetic(ArithmeticOp::Add, Value::Int(i64::MAX), Value::Int(1)).is_err());
    }
}
