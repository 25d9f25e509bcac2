//! Runtime values and the Rust types that map onto them.
//!
//! `Value` is what rows are made of. `FieldType` connects a Rust type (`i32`,
//! `String`, ...) to its `ValueType` so that typed expressions can be checked by
//! the compiler, while the untyped expression tree checks the same rules at
//! construction time.

use crate::error::QueryError;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Result type of an expression or column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    /// Type of the untyped `NULL` literal
    Null,
    Bool,
    Int,
    Float,
    Text,
}

impl ValueType {
    pub fn is_numeric(self) -> bool {
        matches!(self, ValueType::Int | ValueType::Float)
    }

    /// Whether values of the two types may be compared with each other.
    ///
    /// Integers and floats form one family; `Null` is comparable with nothing.
    pub fn is_comparable_with(self, other: ValueType) -> bool {
        match (self, other) {
            (ValueType::Null, _) | (_, ValueType::Null) => false,
            (a, b) if a == b => true,
            (a, b) => a.is_numeric() && b.is_numeric(),
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueType::Null => "null",
            ValueType::Bool => "bool",
            ValueType::Int => "int",
            ValueType::Float => "float",
            ValueType::Text => "text",
        };
        f.write_str(name)
    }
}

/// A single cell of a row
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Null => ValueType::Null,
            Value::Bool(_) => ValueType::Bool,
            Value::Int(_) => ValueType::Int,
            Value::Float(_) => ValueType::Float,
            Value::Text(_) => ValueType::Text,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// SQL comparison: `None` when either side is null or the types are unrelated.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x.partial_cmp(&y),
                _ => None,
            },
        }
    }

    /// Convert into the bind value used by the SQL renderer
    pub fn to_sea_value(&self) -> sea_query::Value {
        match self {
            Value::Null => sea_query::Value::Bool(None),
            Value::Bool(b) => sea_query::Value::from(*b),
            Value::Int(i) => sea_query::Value::from(*i),
            Value::Float(f) => sea_query::Value::from(*f),
            Value::Text(s) => sea_query::Value::from(s.clone()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Text(s) => write!(f, "'{s}'"),
        }
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

mod sealed {
    pub trait Sealed {}
    impl Sealed for bool {}
    impl Sealed for i32 {}
    impl Sealed for i64 {}
    impl Sealed for f64 {}
    impl Sealed for String {}
}

/// Rust types that can back a typed column or expression
pub trait FieldType: sealed::Sealed + Clone + fmt::Debug + 'static {
    const TYPE: ValueType;

    fn into_value(self) -> Value;

    /// Decode a cell; `Ok(None)` for null.
    fn from_value(value: &Value) -> Result<Option<Self>, QueryError>;
}

fn decode_error(expected: ValueType, value: &Value) -> QueryError {
    QueryError::execution(format!(
        "cannot decode {} value {value} as {expected}",
        value.value_type()
    ))
}

impl FieldType for bool {
    const TYPE: ValueType = ValueType::Bool;

    fn into_value(self) -> Value {
        Value::Bool(self)
    }

    fn from_value(value: &Value) -> Result<Option<Self>, QueryError> {
        match value {
            Value::Null => Ok(None),
            Value::Bool(b) => Ok(Some(*b)),
            other => Err(decode_error(Self::TYPE, other)),
        }
    }
}

impl FieldType for i32 {
    const TYPE: ValueType = ValueType::Int;

    fn into_value(self) -> Value {
        Value::Int(i64::from(self))
    }

    fn from_value(value: &Value) -> Result<Option<Self>, QueryError> {
        match value {
            Value::Null => Ok(None),
            Value::Int(i) => i32::try_from(*i)
                .map(Some)
                .map_err(|_| QueryError::execution(format!("integer {i} does not fit in i32"))),
            other => Err(decode_error(Self::TYPE, other)),
        }
    }
}

impl FieldType for i64 {
    const TYPE: ValueType = ValueType::Int;

    fn into_value(self) -> Value {
        Value::Int(self)
    }

    fn from_value(value: &Value) -> Result<Option<Self>, QueryError> {
        match value {
            Value::Null => Ok(None),
            Value::Int(i) => Ok(Some(*i)),
            other => Err(decode_error(Self::TYPE, other)),
        }
    }
}

impl FieldType for f64 {
    const TYPE: ValueType = ValueType::Float;

    fn into_value(self) -> Value {
        Value::Float(self)
    }

    fn from_value(value: &Value) -> Result<Option<Self>, QueryError> {
        match value {
            Value::Null => Ok(None),
            Value::Int(i) => Ok(Some(*i as f64)),
            Value::Float(f) => Ok(Some(*f)),
            other => Err(decode_error(Self::TYPE, other)),
        }
    }
}

impl FieldType for String {
    const TYPE: ValueType = ValueType::Text;

    fn into_value(self) -> Value {
        Value::Text(self)
    }

    fn from_value(value: &Value) -> Result<Option<Self>, QueryError> {
        match value {
            Value::Null => Ok(None),
            Value::Text(s) => Ok(Some(s.clone())),
            other => Err(decode_error(Self::TYPE, other)),
        }
    }
}

/// Types that support `sum`, `avg` and arithmetic
pub trait Numeric: FieldType {
    /// Result type of `sum` (integers widen to `i64`)
    type Sum: Numeric;
}

impl Numeric for i32 {
    type Sum = i64;
}

impl Numeric for i64 {
    type Sum = i64;
}

impl Numeric for f64 {
    type Sum = f64;
}

/// Marker for typed operands that may be compared with a `T` expression
pub trait Comparable<T: FieldType>: FieldType {}

impl<T: FieldType> Comparable<T> for T {}
impl Comparable<i64> for i32 {}
impl Comparable<f64> for i32 {}
impl Comparable<i32> for i64 {}
impl Comparable<f64> for i64 {}
impl Comparable<i32> for f64 {}
impl Comparable<i64> for f64 {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_family_is_comparable() {
        assert!(ValueType::Int.is_comparable_with(ValueType::Float));
        assert!(ValueType::Text.is_comparable_with(ValueType::Text));
        assert!(!ValueType::Int.is_comparable_with(ValueType::Text));
        assert!(!ValueType::Null.is_comparable_with(ValueType::Null));
    }

    #[test]
    fn test_compare_mixed_numeric() {
        assert_eq!(Value::Int(30).compare(&Value::Float(25.0)), Some(Ordering::Greater));
        assert_eq!(Value::Int(25).compare(&Value::Float(25.0)), Some(Ordering::Equal));
        assert_eq!(Value::Null.compare(&Value::Int(1)), None);
        assert_eq!(Value::Text("a".into()).compare(&Value::Int(1)), None);
    }

    #[test]
    fn test_decode_i32_out_of_range() {
        let err = i32::from_value(&Value::Int(i64::MAX)).unwrap_err();
        assert!(matches!(err, QueryError::Execution(_)));
    }

    #[test]
    fn test_decode_wrong_type() {
        assert!(String::from_value(&Value::Int(3)).is_err());
        assert_eq!(f64::from_value(&Value::Int(3)).unwrap(), Some(3.0));
        assert_eq!(String::from_value(&Value::Null).unwrap(), None);
    }

    #[test]
    fn test_value_serializes_untagged() {
        let json = serde_json::to_string(&vec![Value::Null, Value::Int(4), Value::Text("x".into())]).unwrap();
        assert_eq!(json, r#"[null,4,"x"]"#);
    }
}
