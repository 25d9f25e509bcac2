//! Expression model.
//!
//! `Expr` is the untyped, immutable expression tree that predicates,
//! projections and ordering clauses are made of. Its constructors check operand
//! types and fail with `QueryError::TypeMismatch` before a query is ever built.
//! The typed façade in [`typed`] wraps the same tree and moves those checks to
//! compile time.
//!
//! # Examples
//!
//! ```no_run
//! use lifequery::expr::{CompareOp, Expr};
//! use lifequery::entity::QMember;
//! use lifequery::Value;
//!
//! let member = QMember::member();
//! let age: Expr = member.age.clone().into();
//!
//! // Comparing an int column with text fails at construction time
//! assert!(Expr::compare(CompareOp::Eq, age.clone(), Expr::literal("ten")).is_err());
//!
//! // `eq(null)` is rewritten to an explicit `IS NULL`
//! let is_null = Expr::compare(CompareOp::Eq, age, Expr::literal(Value::Null)).unwrap();
//! assert!(matches!(is_null, Expr::IsNull { negated: false, .. }));
//! ```

pub mod typed;

use crate::error::QueryError;
use crate::query::plan::{LogicalQuery, Selection};
use crate::schema::ColumnDef;
use crate::value::{Value, ValueType};
use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Goe,
    Lt,
    Loe,
}

impl CompareOp {
    pub fn name(self) -> &'static str {
        match self {
            CompareOp::Eq => "eq",
            CompareOp::Ne => "ne",
            CompareOp::Gt => "gt",
            CompareOp::Goe => "goe",
            CompareOp::Lt => "lt",
            CompareOp::Loe => "loe",
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "<>",
            CompareOp::Gt => ">",
            CompareOp::Goe => ">=",
            CompareOp::Lt => "<",
            CompareOp::Loe => "<=",
        }
    }

    /// Whether an ordering between the operands satisfies the operator
    pub fn holds(self, ordering: Ordering) -> bool {
        match self {
            CompareOp::Eq => ordering == Ordering::Equal,
            CompareOp::Ne => ordering != Ordering::Equal,
            CompareOp::Gt => ordering == Ordering::Greater,
            CompareOp::Goe => ordering != Ordering::Less,
            CompareOp::Lt => ordering == Ordering::Less,
            CompareOp::Loe => ordering != Ordering::Greater,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogicalOp {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArithmeticOp {
    Add,
    Subtract,
    Multiply,
    Divide,
}

impl ArithmeticOp {
    pub fn name(self) -> &'static str {
        match self {
            ArithmeticOp::Add => "add",
            ArithmeticOp::Subtract => "subtract",
            ArithmeticOp::Multiply => "multiply",
            ArithmeticOp::Divide => "divide",
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            ArithmeticOp::Add => "+",
            ArithmeticOp::Subtract => "-",
            ArithmeticOp::Multiply => "*",
            ArithmeticOp::Divide => "/",
        }
    }
}

/// Aggregate functions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateFn {
    Count,
    CountDistinct,
    Sum,
    Avg,
    Max,
    Min,
}

impl AggregateFn {
    pub fn name(self) -> &'static str {
        match self {
            AggregateFn::Count => "count",
            AggregateFn::CountDistinct => "count_distinct",
            AggregateFn::Sum => "sum",
            AggregateFn::Avg => "avg",
            AggregateFn::Max => "max",
            AggregateFn::Min => "min",
        }
    }

    /// Result type for an argument of the given type
    pub fn result_type(self, arg: ValueType) -> ValueType {
        match self {
            AggregateFn::Count | AggregateFn::CountDistinct => ValueType::Int,
            AggregateFn::Sum if arg == ValueType::Int => ValueType::Int,
            AggregateFn::Sum | AggregateFn::Avg => ValueType::Float,
            AggregateFn::Max | AggregateFn::Min => arg,
        }
    }
}

/// A column under a query alias
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnRef {
    pub alias: String,
    pub column: &'static str,
    pub ty: ValueType,
    pub nullable: bool,
}

/// Immutable expression node
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Column(ColumnRef),
    Literal(Value),
    Compare {
        op: CompareOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    IsNull {
        expr: Box<Expr>,
        negated: bool,
    },
    InList {
        expr: Box<Expr>,
        values: Vec<Value>,
        negated: bool,
    },
    InSubquery {
        expr: Box<Expr>,
        query: Box<LogicalQuery>,
        negated: bool,
    },
    /// SQL `LIKE` with `%` and `_` wildcards
    Like {
        expr: Box<Expr>,
        pattern: String,
    },
    Logical {
        op: LogicalOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Not(Box<Expr>),
    Arithmetic {
        op: ArithmeticOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Aggregate {
        func: AggregateFn,
        arg: Box<Expr>,
    },
    /// Scalar subquery projecting exactly one expression
    SubQuery(Box<LogicalQuery>),
}

fn mismatch(operator: &'static str, left: ValueType, right: ValueType) -> QueryError {
    QueryError::TypeMismatch {
        operator,
        left,
        right,
    }
}

impl Expr {
    pub fn column(alias: &str, def: &ColumnDef) -> Self {
        Expr::Column(ColumnRef {
            alias: alias.to_string(),
            column: def.name,
            ty: def.ty,
            nullable: def.nullable,
        })
    }

    pub fn literal(value: impl Into<Value>) -> Self {
        Expr::Literal(value.into())
    }

    /// Result type of the expression
    pub fn result_type(&self) -> ValueType {
        match self {
            Expr::Column(c) => c.ty,
            Expr::Literal(v) => v.value_type(),
            Expr::Compare { .. }
            | Expr::IsNull { .. }
            | Expr::InList { .. }
            | Expr::InSubquery { .. }
            | Expr::Like { .. }
            | Expr::Logical { .. }
            | Expr::Not(_) => ValueType::Bool,
            Expr::Arithmetic { op, left, right } => {
                if *op != ArithmeticOp::Divide
                    && left.result_type() == ValueType::Int
                    && right.result_type() == ValueType::Int
                {
                    ValueType::Int
                } else {
                    ValueType::Float
                }
            }
            Expr::Aggregate { func, arg } => func.result_type(arg.result_type()),
            Expr::SubQuery(query) => query.scalar_type().unwrap_or(ValueType::Null),
        }
    }

    /// Build a comparison, checking operand types.
    ///
    /// A null literal on either side turns `eq` into `IS NULL` and `ne` into
    /// `IS NOT NULL`; any other operator against null is a type mismatch.
    pub fn compare(op: CompareOp, left: Expr, right: Expr) -> Result<Expr, QueryError> {
        let (lt, rt) = (left.result_type(), right.result_type());
        if lt == ValueType::Null || rt == ValueType::Null {
            let operand = if lt == ValueType::Null { right } else { left };
            return match op {
                CompareOp::Eq if operand.result_type() != ValueType::Null => {
                    Ok(Expr::is_null(operand, false))
                }
                CompareOp::Ne if operand.result_type() != ValueType::Null => {
                    Ok(Expr::is_null(operand, true))
                }
                _ => Err(mismatch(op.name(), lt, rt)),
            };
        }
        if !lt.is_comparable_with(rt) {
            return Err(mismatch(op.name(), lt, rt));
        }
        Ok(Expr::Compare {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    pub fn is_null(expr: Expr, negated: bool) -> Expr {
        Expr::IsNull {
            expr: Box::new(expr),
            negated,
        }
    }

    pub fn in_list(expr: Expr, values: Vec<Value>, negated: bool) -> Result<Expr, QueryError> {
        let ty = expr.result_type();
        for value in &values {
            if !ty.is_comparable_with(value.value_type()) {
                return Err(mismatch("in", ty, value.value_type()));
            }
        }
        Ok(Expr::InList {
            expr: Box::new(expr),
            values,
            negated,
        })
    }

    pub fn in_subquery(expr: Expr, query: LogicalQuery, negated: bool) -> Result<Expr, QueryError> {
        let sub_ty = query.scalar_type().ok_or_else(|| {
            QueryError::validation("subquery used with `in` must project exactly one expression")
        })?;
        let ty = expr.result_type();
        if !ty.is_comparable_with(sub_ty) {
            return Err(mismatch("in", ty, sub_ty));
        }
        Ok(Expr::InSubquery {
            expr: Box::new(expr),
            query: Box::new(query),
            negated,
        })
    }

    pub fn subquery(query: LogicalQuery) -> Result<Expr, QueryError> {
        if query.scalar_type().is_none() {
            return Err(QueryError::validation(
                "scalar subquery must project exactly one expression",
            ));
        }
        Ok(Expr::SubQuery(Box::new(query)))
    }

    pub fn like(expr: Expr, pattern: impl Into<String>) -> Result<Expr, QueryError> {
        let ty = expr.result_type();
        if ty != ValueType::Text {
            return Err(mismatch("like", ty, ValueType::Text));
        }
        Ok(Expr::Like {
            expr: Box::new(expr),
            pattern: pattern.into(),
        })
    }

    pub fn logical(op: LogicalOp, left: Expr, right: Expr) -> Result<Expr, QueryError> {
        let (lt, rt) = (left.result_type(), right.result_type());
        if lt != ValueType::Bool || rt != ValueType::Bool {
            let name = match op {
                LogicalOp::And => "and",
                LogicalOp::Or => "or",
            };
            return Err(mismatch(name, lt, rt));
        }
        Ok(Expr::Logical {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    pub fn and(self, other: Expr) -> Result<Expr, QueryError> {
        Expr::logical(LogicalOp::And, self, other)
    }

    pub fn or(self, other: Expr) -> Result<Expr, QueryError> {
        Expr::logical(LogicalOp::Or, self, other)
    }

    pub fn not(self) -> Result<Expr, QueryError> {
        let ty = self.result_type();
        if ty != ValueType::Bool {
            return Err(mismatch("not", ty, ValueType::Bool));
        }
        Ok(Expr::Not(Box::new(self)))
    }

    pub fn arithmetic(op: ArithmeticOp, left: Expr, right: Expr) -> Result<Expr, QueryError> {
        let (lt, rt) = (left.result_type(), right.result_type());
        if !lt.is_numeric() || !rt.is_numeric() {
            return Err(mismatch(op.name(), lt, rt));
        }
        Ok(Expr::Arithmetic {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    pub fn aggregate(func: AggregateFn, arg: Expr) -> Result<Expr, QueryError> {
        let ty = arg.result_type();
        let numeric_only = matches!(func, AggregateFn::Sum | AggregateFn::Avg);
        if (numeric_only && !ty.is_numeric()) || ty == ValueType::Null {
            return Err(mismatch(func.name(), ty, ValueType::Float));
        }
        Ok(Expr::Aggregate {
            func,
            arg: Box::new(arg),
        })
    }

    /// Conjoin a list of predicates; `None` for an empty list.
    pub fn conjunction(predicates: Vec<Expr>) -> Result<Option<Expr>, QueryError> {
        let mut iter = predicates.into_iter();
        let Some(first) = iter.next() else {
            return Ok(None);
        };
        iter.try_fold(first, Expr::and).map(Some)
    }

    pub fn is_aggregate(&self) -> bool {
        matches!(self, Expr::Aggregate { .. })
    }

    /// Whether an aggregate appears anywhere outside nested subqueries
    pub fn contains_aggregate(&self) -> bool {
        let mut found = false;
        self.visit(&mut |e| found |= e.is_aggregate());
        found
    }

    /// Visit this node and its children, without entering subqueries.
    pub fn visit<'a>(&'a self, f: &mut dyn FnMut(&'a Expr)) {
        f(self);
        match self {
            Expr::Column(_) | Expr::Literal(_) | Expr::SubQuery(_) => {}
            Expr::Compare { left, right, .. }
            | Expr::Logical { left, right, .. }
            | Expr::Arithmetic { left, right, .. } => {
                left.visit(f);
                right.visit(f);
            }
            Expr::IsNull { expr, .. }
            | Expr::InList { expr, .. }
            | Expr::InSubquery { expr, .. }
            | Expr::Like { expr, .. } => expr.visit(f),
            Expr::Not(inner) => inner.visit(f),
            Expr::Aggregate { arg, .. } => arg.visit(f),
        }
    }

    /// Nested queries directly referenced by this expression tree
    pub fn subqueries(&self) -> Vec<&LogicalQuery> {
        let mut out = Vec::new();
        self.visit(&mut |e| match e {
            Expr::SubQuery(q) | Expr::InSubquery { query: q, .. } => out.push(q.as_ref()),
            _ => {}
        });
        out
    }

    /// Re-run the construction-time type rules over the whole tree.
    pub fn check_types(&self) -> Result<(), QueryError> {
        let mut result = Ok(());
        self.visit(&mut |e| {
            if result.is_err() {
                return;
            }
            result = match e {
                Expr::Compare { op, left, right } => {
                    let (lt, rt) = (left.result_type(), right.result_type());
                    if lt.is_comparable_with(rt) {
                        Ok(())
                    } else {
                        Err(mismatch(op.name(), lt, rt))
                    }
                }
                Expr::Logical { left, right, .. } => {
                    let (lt, rt) = (left.result_type(), right.result_type());
                    if lt == ValueType::Bool && rt == ValueType::Bool {
                        Ok(())
                    } else {
                        Err(mismatch("and/or", lt, rt))
                    }
                }
                Expr::Arithmetic { op, left, right } => {
                    let (lt, rt) = (left.result_type(), right.result_type());
                    if lt.is_numeric() && rt.is_numeric() {
                        Ok(())
                    } else {
                        Err(mismatch(op.name(), lt, rt))
                    }
                }
                Expr::InList { expr, values, .. } => {
                    let ty = expr.result_type();
                    match values.iter().find(|v| !ty.is_comparable_with(v.value_type())) {
                        Some(v) => Err(mismatch("in", ty, v.value_type())),
                        None => Ok(()),
                    }
                }
                _ => Ok(()),
            };
        });
        result
    }

    /// Serializable description of the node and its operands
    pub fn describe(&self) -> ExprDescription {
        let node = |op: &'static str, operands: Vec<ExprDescription>| ExprDescription {
            op,
            result_type: self.result_type(),
            column: None,
            value: None,
            operands,
        };
        match self {
            Expr::Column(c) => ExprDescription {
                column: Some(format!("{}.{}", c.alias, c.column)),
                ..node("column", Vec::new())
            },
            Expr::Literal(v) => ExprDescription {
                value: Some(v.clone()),
                ..node("literal", Vec::new())
            },
            Expr::Compare { op, left, right } => {
                node(op.name(), vec![left.describe(), right.describe()])
            }
            Expr::IsNull { expr, negated } => node(
                if *negated { "is_not_null" } else { "is_null" },
                vec![expr.describe()],
            ),
            Expr::InList {
                expr,
                values,
                negated,
            } => {
                let mut operands = vec![expr.describe()];
                operands.extend(values.iter().map(|v| Expr::Literal(v.clone()).describe()));
                node(if *negated { "not_in" } else { "in" }, operands)
            }
            Expr::InSubquery { expr, negated, .. } => node(
                if *negated { "not_in" } else { "in" },
                vec![expr.describe(), node("subquery", Vec::new())],
            ),
            Expr::Like { expr, pattern } => node(
                "like",
                vec![expr.describe(), Expr::Literal(Value::Text(pattern.clone())).describe()],
            ),
            Expr::Logical { op, left, right } => node(
                match op {
                    LogicalOp::And => "and",
                    LogicalOp::Or => "or",
                },
                vec![left.describe(), right.describe()],
            ),
            Expr::Not(inner) => node("not", vec![inner.describe()]),
            Expr::Arithmetic { op, left, right } => {
                node(op.name(), vec![left.describe(), right.describe()])
            }
            Expr::Aggregate { func, arg } => node(func.name(), vec![arg.describe()]),
            Expr::SubQuery(query) => node(
                "subquery",
                query
                    .selections
                    .iter()
                    .filter_map(|s| match s {
                        Selection::Expr(e) => Some(e.describe()),
                        Selection::Entity(_) => None,
                    })
                    .collect(),
            ),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Column(c) => write!(f, "{}.{}", c.alias, c.column),
            Expr::Literal(v) => write!(f, "{v}"),
            Expr::Compare { op, left, right } => write!(f, "{left} {} {right}", op.symbol()),
            Expr::IsNull { expr, negated } => {
                write!(f, "{expr} is {}null", if *negated { "not " } else { "" })
            }
            Expr::InList {
                expr,
                values,
                negated,
            } => {
                let list: Vec<String> = values.iter().map(ToString::to_string).collect();
                let not = if *negated { "not " } else { "" };
                write!(f, "{expr} {not}in ({})", list.join(", "))
            }
            Expr::InSubquery { expr, negated, .. } => {
                write!(f, "{expr} {}in (subquery)", if *negated { "not " } else { "" })
            }
            Expr::Like { expr, pattern } => write!(f, "{expr} like '{pattern}'"),
            Expr::Logical { op, left, right } => match op {
                LogicalOp::And => write!(f, "({left} and {right})"),
                LogicalOp::Or => write!(f, "({left} or {right})"),
            },
            Expr::Not(inner) => write!(f, "not {inner}"),
            Expr::Arithmetic { op, left, right } => write!(f, "({left} {} {right})", op.symbol()),
            Expr::Aggregate { func, arg } => match func {
                AggregateFn::CountDistinct => write!(f, "count(distinct {arg})"),
                other => write!(f, "{}({arg})", other.name()),
            },
            Expr::SubQuery(_) => f.write_str("(subquery)"),
        }
    }
}

/// Serializable operator/operand description of an expression
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExprDescription {
    pub op: &'static str,
    pub result_type: ValueType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub operands: Vec<ExprDescription>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const AGE: ColumnDef = ColumnDef::new("age", ValueType::Int, false);
    const NAME: ColumnDef = ColumnDef::new("username", ValueType::Text, true);

    fn age() -> Expr {
        Expr::column("member", &AGE)
    }

    fn name() -> Expr {
        Expr::column("member", &NAME)
    }

    #[test]
    fn test_compare_rejects_mismatched_types() {
        let err = Expr::compare(CompareOp::Eq, age(), Expr::literal("ten")).unwrap_err();
        assert_eq!(
            err,
            QueryError::TypeMismatch {
                operator: "eq",
                left: ValueType::Int,
                right: ValueType::Text
            }
        );
    }

    #[test]
    fn test_compare_accepts_numeric_family() {
        let expr = Expr::compare(CompareOp::Goe, age(), Expr::literal(25.0)).unwrap();
        assert_eq!(expr.result_type(), ValueType::Bool);
    }

    #[test]
    fn test_eq_null_becomes_is_null() {
        let expr = Expr::compare(CompareOp::Eq, name(), Expr::literal(Value::Null)).unwrap();
        assert_eq!(expr, Expr::is_null(name(), false));

        let expr = Expr::compare(CompareOp::Ne, Expr::literal(Value::Null), name()).unwrap();
        assert_eq!(expr, Expr::is_null(name(), true));
    }

    #[test]
    fn test_ordering_against_null_is_rejected() {
        let err = Expr::compare(CompareOp::Gt, age(), Expr::literal(Value::Null)).unwrap_err();
        assert!(matches!(err, QueryError::TypeMismatch { operator: "gt", .. }));
    }

    #[test]
    fn test_in_list_rejects_null_and_mismatch() {
        assert!(Expr::in_list(age(), vec![Value::Int(1), Value::Null], false).is_err());
        assert!(Expr::in_list(age(), vec![Value::Text("x".into())], false).is_err());
        assert!(Expr::in_list(age(), vec![Value::Int(1), Value::Int(2)], false).is_ok());
    }

    #[test]
    fn test_logical_requires_bool_operands() {
        assert!(age().and(name()).is_err());
        let p = Expr::compare(CompareOp::Eq, age(), Expr::literal(10)).unwrap();
        let q = Expr::is_null(name(), false);
        assert!(p.and(q).is_ok());
    }

    #[test]
    fn test_aggregate_result_types() {
        let sum = Expr::aggregate(AggregateFn::Sum, age()).unwrap();
        assert_eq!(sum.result_type(), ValueType::Int);
        let avg = Expr::aggregate(AggregateFn::Avg, age()).unwrap();
        assert_eq!(avg.result_type(), ValueType::Float);
        assert!(Expr::aggregate(AggregateFn::Sum, name()).is_err());
        assert!(Expr::aggregate(AggregateFn::Max, name()).is_ok());
        assert!(sum.contains_aggregate());
    }

    #[test]
    fn test_conjunction_of_empty_list() {
        assert_eq!(Expr::conjunction(Vec::new()).unwrap(), None);
    }

    #[test]
    fn test_describe_serializes_operator_and_operands() {
        let expr = Expr::compare(CompareOp::Eq, age(), Expr::literal(10)).unwrap();
        let json = serde_json::to_value(expr.describe()).unwrap();
        assert_eq!(json["op"], "eq");
        assert_eq!(json["result_type"], "bool");
        assert_eq!(json["operands"][0]["column"], "member.age");
        assert_eq!(json["operands"][1]["value"], 10);
    }

    #[test]
    fn test_display() {
        let expr = Expr::compare(CompareOp::Goe, age(), Expr::literal(30)).unwrap();
        assert_eq!(expr.to_string(), "member.age >= 30");
    }
}
