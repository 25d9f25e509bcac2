//! Typed expression façade.
//!
//! `Expression<T>` wraps an [`Expr`] whose result type is known to be `T`.
//! Operators only accept operands that are `Comparable<T>`, so the type rules
//! the untyped constructors enforce at run time become compile errors here.
//!
//! # Example
//!
//! ```no_run
//! use lifequery::entity::QMember;
//!
//! let member = QMember::member();
//! let predicate = member.username.eq("member1").and(member.age.goe(10));
//! let order = member.username.asc().nulls_last();
//! ```

use crate::expr::{AggregateFn, ArithmeticOp, CompareOp, Expr, ExprDescription, LogicalOp};
use crate::query::select::QueryBuilder;
use crate::schema::ColumnDef;
use crate::value::{Comparable, FieldType, Numeric, Value};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;

/// An expression whose result type is `T`
pub struct Expression<T> {
    expr: Expr,
    _ty: PhantomData<fn() -> T>,
}

/// A boolean expression usable in `filter`, `on` and `having`
pub type Predicate = Expression<bool>;

impl<T> Clone for Expression<T> {
    fn clone(&self) -> Self {
        Self::from_expr(self.expr.clone())
    }
}

impl<T> PartialEq for Expression<T> {
    fn eq(&self, other: &Self) -> bool {
        self.expr == other.expr
    }
}

impl<T> fmt::Debug for Expression<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Expression").field(&self.expr).finish()
    }
}

impl<T> fmt::Display for Expression<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.expr, f)
    }
}

impl<T> From<Expression<T>> for Expr {
    fn from(e: Expression<T>) -> Self {
        e.expr
    }
}

impl<T> From<&Expression<T>> for Expr {
    fn from(e: &Expression<T>) -> Self {
        e.expr.clone()
    }
}

impl<T> Expression<T> {
    pub(crate) fn from_expr(expr: Expr) -> Self {
        Self {
            expr,
            _ty: PhantomData,
        }
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    pub fn into_expr(self) -> Expr {
        self.expr
    }

    pub fn describe(&self) -> ExprDescription {
        self.expr.describe()
    }
}

/// Right-hand side of a typed operator: a literal, another expression or a
/// scalar subquery
pub struct Operand<T> {
    expr: Expr,
    _ty: PhantomData<fn() -> T>,
}

impl<T> Operand<T> {
    fn new(expr: Expr) -> Self {
        Self {
            expr,
            _ty: PhantomData,
        }
    }
}

impl<T: FieldType> From<T> for Operand<T> {
    fn from(value: T) -> Self {
        Operand::new(Expr::Literal(value.into_value()))
    }
}

impl From<&str> for Operand<String> {
    fn from(value: &str) -> Self {
        Operand::new(Expr::Literal(Value::Text(value.to_string())))
    }
}

impl<T: FieldType, U: Comparable<T>> From<Expression<U>> for Operand<T> {
    fn from(e: Expression<U>) -> Self {
        Operand::new(e.expr)
    }
}

impl<T: FieldType, U: Comparable<T>> From<&Expression<U>> for Operand<T> {
    fn from(e: &Expression<U>) -> Self {
        Operand::new(e.expr.clone())
    }
}

impl<T: FieldType, U: Comparable<T>> From<QueryBuilder<Expression<U>>> for Operand<T> {
    fn from(query: QueryBuilder<Expression<U>>) -> Self {
        Operand::new(Expr::SubQuery(Box::new(query.into_logical())))
    }
}

impl<T: FieldType> Expression<T> {
    /// Typed reference to a column under an alias
    pub fn column(alias: &str, def: &ColumnDef) -> Self {
        Self::from_expr(Expr::column(alias, def))
    }

    /// Typed literal
    pub fn literal(value: T) -> Self {
        Self::from_expr(Expr::Literal(value.into_value()))
    }

    fn compare(&self, op: CompareOp, rhs: Operand<T>) -> Predicate {
        Expression::from_expr(Expr::Compare {
            op,
            left: Box::new(self.expr.clone()),
            right: Box::new(rhs.expr),
        })
    }

    /// `self = rhs`
    pub fn eq(&self, rhs: impl Into<Operand<T>>) -> Predicate {
        self.compare(CompareOp::Eq, rhs.into())
    }

    /// `self <> rhs`
    pub fn ne(&self, rhs: impl Into<Operand<T>>) -> Predicate {
        self.compare(CompareOp::Ne, rhs.into())
    }

    /// `self > rhs`
    pub fn gt(&self, rhs: impl Into<Operand<T>>) -> Predicate {
        self.compare(CompareOp::Gt, rhs.into())
    }

    /// `self >= rhs`
    pub fn goe(&self, rhs: impl Into<Operand<T>>) -> Predicate {
        self.compare(CompareOp::Goe, rhs.into())
    }

    /// `self < rhs`
    pub fn lt(&self, rhs: impl Into<Operand<T>>) -> Predicate {
        self.compare(CompareOp::Lt, rhs.into())
    }

    /// `self <= rhs`
    pub fn loe(&self, rhs: impl Into<Operand<T>>) -> Predicate {
        self.compare(CompareOp::Loe, rhs.into())
    }

    /// `low <= self <= high`
    pub fn between(&self, low: impl Into<Operand<T>>, high: impl Into<Operand<T>>) -> Predicate {
        self.goe(low).and(self.loe(high))
    }

    /// `self = value`, or `self IS NULL` when `value` is `None`
    pub fn eq_or_null(&self, value: Option<T>) -> Predicate {
        match value {
            Some(v) => self.eq(v),
            None => self.is_null(),
        }
    }

    fn in_values<I, V>(&self, values: I, negated: bool) -> Predicate
    where
        I: IntoIterator<Item = V>,
        V: Into<T>,
    {
        Expression::from_expr(Expr::InList {
            expr: Box::new(self.expr.clone()),
            values: values.into_iter().map(|v| v.into().into_value()).collect(),
            negated,
        })
    }

    /// `self IN (values...)`
    #[allow(clippy::wrong_self_convention)]
    pub fn is_in<I, V>(&self, values: I) -> Predicate
    where
        I: IntoIterator<Item = V>,
        V: Into<T>,
    {
        self.in_values(values, false)
    }

    /// `self NOT IN (values...)`
    pub fn not_in<I, V>(&self, values: I) -> Predicate
    where
        I: IntoIterator<Item = V>,
        V: Into<T>,
    {
        self.in_values(values, true)
    }

    /// `self IN (subquery)`
    pub fn in_subquery<U: Comparable<T>>(&self, query: QueryBuilder<Expression<U>>) -> Predicate {
        Expression::from_expr(Expr::InSubquery {
            expr: Box::new(self.expr.clone()),
            query: Box::new(query.into_logical()),
            negated: false,
        })
    }

    /// `self NOT IN (subquery)`
    pub fn not_in_subquery<U: Comparable<T>>(
        &self,
        query: QueryBuilder<Expression<U>>,
    ) -> Predicate {
        Expression::from_expr(Expr::InSubquery {
            expr: Box::new(self.expr.clone()),
            query: Box::new(query.into_logical()),
            negated: true,
        })
    }

    #[allow(clippy::wrong_self_convention)]
    pub fn is_null(&self) -> Predicate {
        Expression::from_expr(Expr::is_null(self.expr.clone(), false))
    }

    #[allow(clippy::wrong_self_convention)]
    pub fn is_not_null(&self) -> Predicate {
        Expression::from_expr(Expr::is_null(self.expr.clone(), true))
    }

    pub fn asc(&self) -> OrderSpec {
        OrderSpec::new(self.expr.clone(), Direction::Asc)
    }

    pub fn desc(&self) -> OrderSpec {
        OrderSpec::new(self.expr.clone(), Direction::Desc)
    }

    fn aggregate<R>(&self, func: AggregateFn) -> Expression<R> {
        Expression::from_expr(Expr::Aggregate {
            func,
            arg: Box::new(self.expr.clone()),
        })
    }

    /// Number of non-null values
    pub fn count(&self) -> Expression<i64> {
        self.aggregate(AggregateFn::Count)
    }

    /// Number of distinct non-null values
    pub fn count_distinct(&self) -> Expression<i64> {
        self.aggregate(AggregateFn::CountDistinct)
    }

    pub fn max(&self) -> Expression<T> {
        self.aggregate(AggregateFn::Max)
    }

    pub fn min(&self) -> Expression<T> {
        self.aggregate(AggregateFn::Min)
    }
}

impl<T: Numeric> Expression<T> {
    pub fn sum(&self) -> Expression<T::Sum> {
        self.aggregate(AggregateFn::Sum)
    }

    pub fn avg(&self) -> Expression<f64> {
        self.aggregate(AggregateFn::Avg)
    }

    fn arithmetic<R>(&self, op: ArithmeticOp, rhs: Operand<T>) -> Expression<R> {
        Expression::from_expr(Expr::Arithmetic {
            op,
            left: Box::new(self.expr.clone()),
            right: Box::new(rhs.expr),
        })
    }

    pub fn add(&self, rhs: impl Into<Operand<T>>) -> Expression<T> {
        self.arithmetic(ArithmeticOp::Add, rhs.into())
    }

    pub fn subtract(&self, rhs: impl Into<Operand<T>>) -> Expression<T> {
        self.arithmetic(ArithmeticOp::Subtract, rhs.into())
    }

    pub fn multiply(&self, rhs: impl Into<Operand<T>>) -> Expression<T> {
        self.arithmetic(ArithmeticOp::Multiply, rhs.into())
    }

    /// Division always yields a floating result
    pub fn divide(&self, rhs: impl Into<Operand<T>>) -> Expression<f64> {
        self.arithmetic(ArithmeticOp::Divide, rhs.into())
    }
}

impl Expression<String> {
    /// SQL `LIKE` with `%` and `_` wildcards
    pub fn like(&self, pattern: impl Into<String>) -> Predicate {
        Expression::from_expr(Expr::Like {
            expr: Box::new(self.expr.clone()),
            pattern: pattern.into(),
        })
    }

    pub fn contains(&self, needle: &str) -> Predicate {
        self.like(format!("%{}%", escape_like(needle)))
    }

    pub fn starts_with(&self, prefix: &str) -> Predicate {
        self.like(format!("{}%", escape_like(prefix)))
    }
}

fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

impl Expression<bool> {
    pub fn and(self, other: Predicate) -> Predicate {
        Expression::from_expr(Expr::Logical {
            op: LogicalOp::And,
            left: Box::new(self.expr),
            right: Box::new(other.expr),
        })
    }

    pub fn or(self, other: Predicate) -> Predicate {
        Expression::from_expr(Expr::Logical {
            op: LogicalOp::Or,
            left: Box::new(self.expr),
            right: Box::new(other.expr),
        })
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Predicate {
        Expression::from_expr(Expr::Not(Box::new(self.expr)))
    }
}

impl<T: FieldType> QueryBuilder<Expression<T>> {
    /// Use a single-expression query as a typed scalar subquery
    pub fn as_expression(self) -> Expression<T> {
        Expression::from_expr(Expr::SubQuery(Box::new(self.into_logical())))
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Asc,
    Desc,
}

/// Where null values sort, independent of direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NullOrdering {
    First,
    Last,
}

/// One `ORDER BY` item
#[derive(Debug, Clone, PartialEq)]
pub struct OrderSpec {
    pub expr: Expr,
    pub direction: Direction,
    /// `None` until resolved against `QueryConfig::default_null_ordering` at build
    pub nulls: Option<NullOrdering>,
}

impl OrderSpec {
    pub fn new(expr: Expr, direction: Direction) -> Self {
        Self {
            expr,
            direction,
            nulls: None,
        }
    }

    pub fn nulls_first(mut self) -> Self {
        self.nulls = Some(NullOrdering::First);
        self
    }

    pub fn nulls_last(mut self) -> Self {
        self.nulls = Some(NullOrdering::Last);
        self
    }

    pub(crate) fn resolve(mut self, default: NullOrdering) -> Self {
        self.nulls.get_or_insert(default);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ValueType;

    const AGE: ColumnDef = ColumnDef::new("age", ValueType::Int, false);
    const NAME: ColumnDef = ColumnDef::new("username", ValueType::Text, true);

    #[test]
    fn test_typed_compare_builds_bool_expression() {
        let age = Expression::<i32>::column("member", &AGE);
        let p = age.eq(10);
        assert_eq!(p.expr().result_type(), ValueType::Bool);
        assert_eq!(p.to_string(), "member.age = 10");
    }

    #[test]
    fn test_and_is_conjunction_of_both_sides() {
        let age = Expression::<i32>::column("member", &AGE);
        let name = Expression::<String>::column("member", &NAME);
        let p = name.eq("member1").and(age.eq(10));
        assert_eq!(p.to_string(), "(member.username = 'member1' and member.age = 10)");
    }

    #[test]
    fn test_aggregate_types() {
        let age = Expression::<i32>::column("member", &AGE);
        assert_eq!(age.sum().expr().result_type(), ValueType::Int);
        assert_eq!(age.avg().expr().result_type(), ValueType::Float);
        assert_eq!(age.max().expr().result_type(), ValueType::Int);
        assert_eq!(age.count().expr().result_type(), ValueType::Int);
    }

    #[test]
    fn test_eq_or_null() {
        let name = Expression::<String>::column("member", &NAME);
        let p = name.eq_or_null(None);
        assert!(matches!(p.expr(), Expr::IsNull { negated: false, .. }));
    }

    #[test]
    fn test_contains_escapes_wildcards() {
        let name = Expression::<String>::column("member", &NAME);
        let p = name.contains("50%");
        assert!(matches!(p.expr(), Expr::Like { pattern, .. } if pattern == "%50\\%%"));
    }

    #[test]
    fn test_order_spec_null_resolution() {
        let age = Expression::<i32>::column("member", &AGE);
        assert_eq!(age.desc().nulls, None);
        assert_eq!(age.desc().resolve(NullOrdering::Last).nulls, Some(NullOrdering::Last));
        assert_eq!(
            age.asc().nulls_first().resolve(NullOrdering::Last).nulls,
            Some(NullOrdering::First)
        );
    }
}
