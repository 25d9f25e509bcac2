//! Explicit, compile-time schema descriptions for entities.
//!
//! Every entity provides a static `EntitySchema` listing its columns in storage
//! order (identity first) and its associations. Query paths (`QMember`,
//! `QTeam`, ...) are plain structs of typed expressions built from those
//! column definitions, so no reflection is involved anywhere.

use crate::error::QueryError;
use crate::expr::typed::Expression;
use crate::query::projection::Optional;
use crate::value::{Value, ValueType};
use std::fmt;

/// A stored column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: &'static str,
    pub ty: ValueType,
    pub nullable: bool,
}

impl ColumnDef {
    pub const fn new(name: &'static str, ty: ValueType, nullable: bool) -> Self {
        Self { name, ty, nullable }
    }
}

/// How an association is stored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssociationKind {
    /// The owner holds a foreign key column pointing at the target identity
    ManyToOne { join_column: &'static str },
    /// The target holds a foreign key column pointing back at the owner
    OneToMany { mapped_by: &'static str },
}

/// A named association from one entity to another
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssociationDef {
    pub name: &'static str,
    pub target_table: &'static str,
    pub kind: AssociationKind,
}

impl AssociationDef {
    pub fn is_to_one(&self) -> bool {
        matches!(self.kind, AssociationKind::ManyToOne { .. })
    }
}

/// Static description of an entity table
#[derive(Debug, PartialEq, Eq)]
pub struct EntitySchema {
    pub table: &'static str,
    /// Columns in storage order; the identity column comes first
    pub columns: &'static [ColumnDef],
    pub associations: &'static [AssociationDef],
}

impl EntitySchema {
    pub fn id_column(&self) -> Result<&'static ColumnDef, QueryError> {
        self.columns
            .first()
            .ok_or_else(|| QueryError::execution(format!("{} has no identity column", self.table)))
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn association(&self, name: &str) -> Option<&'static AssociationDef> {
        self.associations.iter().find(|a| a.name == name)
    }

    /// Check a row against column count, types and nullability.
    pub fn check_row(&self, values: &[Value]) -> Result<(), QueryError> {
        if values.len() != self.columns.len() {
            return Err(QueryError::execution(format!(
                "{} row has {} values, expected {}",
                self.table,
                values.len(),
                self.columns.len()
            )));
        }
        for (column, value) in self.columns.iter().zip(values) {
            match value {
                Value::Null if !column.nullable => {
                    return Err(QueryError::validation(format!(
                        "column {}.{} is not nullable",
                        self.table, column.name
                    )));
                }
                Value::Null => {}
                v if v.value_type() != column.ty => {
                    return Err(QueryError::validation(format!(
                        "column {}.{} expects {}, got {}",
                        self.table,
                        column.name,
                        column.ty,
                        v.value_type()
                    )));
                }
                _ => {}
            }
        }
        Ok(())
    }
}

/// A persistent entity with an explicitly assigned identity
pub trait Entity: Clone + fmt::Debug + Sized + 'static {
    /// Query path type for this entity (`QMember` for `Member`)
    type Path: EntityPath<Entity = Self>;

    fn schema() -> &'static EntitySchema;

    /// Identity, `None` until persisted
    fn id(&self) -> Option<i64>;

    fn set_id(&mut self, id: i64);

    /// Column values in schema order
    fn to_values(&self) -> Vec<Value>;

    /// Build an entity from column values in schema order.
    ///
    /// Associations come back unmaterialized.
    fn from_values(values: &[Value]) -> Result<Self, QueryError>;

    /// Materialize a fetched association from the target's column values.
    fn attach(&mut self, association: &str, values: &[Value]) -> Result<(), QueryError> {
        let _ = values;
        Err(QueryError::execution(format!(
            "{} has no fetchable association `{association}`",
            Self::schema().table
        )))
    }
}

/// Typed query path for an entity under an alias
pub trait EntityPath: Clone + fmt::Debug {
    type Entity: Entity<Path = Self>;

    /// Build a path under the given alias
    fn new(alias: &str) -> Self;

    fn alias(&self) -> &str;

    fn schema(&self) -> &'static EntitySchema {
        <Self::Entity as Entity>::schema()
    }

    /// The identity column under this alias
    fn identity(&self) -> Expression<i64>;

    /// `count(alias.id)`
    fn count(&self) -> Expression<i64> {
        self.identity().count()
    }

    /// Entity projection yielding `None` when an outer join produced no entity
    fn optional(&self) -> Optional<Self> {
        Optional::new(self.clone())
    }
}

/// Read a typed, non-null column out of a row slice.
pub(crate) fn required<T: crate::value::FieldType>(
    schema: &EntitySchema,
    values: &[Value],
    index: usize,
) -> Result<T, QueryError> {
    let column = column_at(schema, index)?;
    let value = values.get(index).ok_or_else(|| {
        QueryError::execution(format!("{} row is missing column {}", schema.table, column.name))
    })?;
    T::from_value(value)?.ok_or_else(|| {
        QueryError::execution(format!("{}.{} is unexpectedly null", schema.table, column.name))
    })
}

/// Read a typed, nullable column out of a row slice.
pub(crate) fn nullable<T: crate::value::FieldType>(
    schema: &EntitySchema,
    values: &[Value],
    index: usize,
) -> Result<Option<T>, QueryError> {
    let column = column_at(schema, index)?;
    match values.get(index) {
        Some(value) => T::from_value(value),
        None => Err(QueryError::execution(format!(
            "{} row is missing column {}",
            schema.table, column.name
        ))),
    }
}

fn column_at(schema: &EntitySchema, index: usize) -> Result<&'static ColumnDef, QueryError> {
    schema.columns.get(index).ok_or_else(|| {
        QueryError::execution(format!("{} has no column at position {index}", schema.table))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    static EMPTY: EntitySchema = EntitySchema {
        table: "empty",
        columns: &[],
        associations: &[],
    };

    #[test]
    fn test_short_schema_reports_execution_error() {
        assert!(matches!(EMPTY.id_column(), Err(QueryError::Execution(_))));

        let values = [Value::Int(1)];
        let id: Result<i64, _> = required(&EMPTY, &values, 0);
        assert!(matches!(id, Err(QueryError::Execution(_))));
        let name: Result<Option<String>, _> = nullable(&EMPTY, &values, 1);
        assert!(matches!(name, Err(QueryError::Execution(_))));
    }
}
