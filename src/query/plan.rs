//! Logical query tree.
//!
//! `LogicalQuery` is the finalized, backend-neutral shape of a query: sources,
//! joins, one conjoined predicate, projection, grouping, ordering and paging.
//! The SQL renderer and the in-memory store both consume it.

use crate::error::QueryError;
use crate::expr::typed::OrderSpec;
use crate::expr::Expr;
use crate::schema::{AssociationDef, EntitySchema};
use crate::value::ValueType;

/// An entity table under an alias
#[derive(Debug, Clone, PartialEq)]
pub struct Source {
    pub alias: String,
    pub schema: &'static EntitySchema,
}

impl Source {
    pub fn new(alias: &str, schema: &'static EntitySchema) -> Self {
        Self {
            alias: alias.to_string(),
            schema,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
}

/// Association a join follows, e.g. `member.team`
#[derive(Debug, Clone, PartialEq)]
pub struct JoinAssociation {
    pub owner_alias: String,
    pub def: &'static AssociationDef,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub kind: JoinKind,
    pub target: Source,
    /// `None` for joins on unrelated entities, which then rely on `on`
    pub association: Option<JoinAssociation>,
    pub on: Option<Expr>,
    /// Materialize the joined entity into its owner in the same round trip
    pub fetch: bool,
}

/// An entity selected as a whole under an alias
#[derive(Debug, Clone, PartialEq)]
pub struct EntitySelection {
    pub alias: String,
    pub schema: &'static EntitySchema,
}

/// One projection item
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    Entity(EntitySelection),
    Expr(Expr),
}

impl Selection {
    /// Number of output columns the item occupies
    pub fn width(&self) -> usize {
        match self {
            Selection::Entity(e) => e.schema.width(),
            Selection::Expr(_) => 1,
        }
    }
}

/// What a statement returns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Shape {
    /// The projected rows
    Rows,
    /// A single row holding the number of rows (or groups) the query matches
    Count,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogicalQuery {
    pub selections: Vec<Selection>,
    pub sources: Vec<Source>,
    pub joins: Vec<Join>,
    pub predicate: Option<Expr>,
    pub group_by: Vec<Expr>,
    pub having: Option<Expr>,
    pub order_by: Vec<OrderSpec>,
    pub offset: Option<u64>,
    pub limit: Option<u64>,
    pub shape: Shape,
    /// Builder misuse recorded while chaining, reported by validation
    pub(crate) deferred_errors: Vec<QueryError>,
}

impl LogicalQuery {
    pub(crate) fn empty() -> Self {
        Self {
            selections: Vec::new(),
            sources: Vec::new(),
            joins: Vec::new(),
            predicate: None,
            group_by: Vec::new(),
            having: None,
            order_by: Vec::new(),
            offset: None,
            limit: None,
            shape: Shape::Rows,
            deferred_errors: Vec::new(),
        }
    }

    /// Sources followed by join targets, in binding order
    pub fn scope(&self) -> impl Iterator<Item = &Source> {
        self.sources.iter().chain(self.joins.iter().map(|j| &j.target))
    }

    pub fn find_source(&self, alias: &str) -> Option<&Source> {
        self.scope().find(|s| s.alias == alias)
    }

    /// Result type when the query projects exactly one expression
    pub fn scalar_type(&self) -> Option<ValueType> {
        match self.selections.as_slice() {
            [Selection::Expr(e)] => Some(e.result_type()),
            _ => None,
        }
    }

    /// Whether rows are collapsed into groups
    pub fn is_grouped(&self) -> bool {
        !self.group_by.is_empty()
            || self.having.is_some()
            || self.selections.iter().any(|s| match s {
                Selection::Expr(e) => e.contains_aggregate(),
                Selection::Entity(_) => false,
            })
            || self.order_by.iter().any(|o| o.expr.contains_aggregate())
    }

    /// Fetch joins in declaration order
    pub fn fetch_joins(&self) -> impl Iterator<Item = &Join> {
        self.joins.iter().filter(|j| j.fetch)
    }

    /// Count-only variant of the same source/join/predicate/grouping tree.
    ///
    /// Ordering and paging do not change cardinality and are dropped. The
    /// projection is kept so an aggregate query still counts as one group.
    pub fn count_variant(&self) -> LogicalQuery {
        LogicalQuery {
            order_by: Vec::new(),
            offset: None,
            limit: None,
            shape: Shape::Count,
            joins: self
                .joins
                .iter()
                .map(|j| Join {
                    fetch: false,
                    ..j.clone()
                })
                .collect(),
            ..self.clone()
        }
    }

    /// Same query with paging replaced
    pub(crate) fn with_paging(&self, offset: Option<u64>, limit: Option<u64>) -> LogicalQuery {
        LogicalQuery {
            offset,
            limit,
            ..self.clone()
        }
    }

    /// Every expression in the query, excluding nested subquery bodies
    pub fn expressions(&self) -> impl Iterator<Item = &Expr> {
        self.selections
            .iter()
            .filter_map(|s| match s {
                Selection::Expr(e) => Some(e),
                Selection::Entity(_) => None,
            })
            .chain(self.joins.iter().filter_map(|j| j.on.as_ref()))
            .chain(self.predicate.iter())
            .chain(self.group_by.iter())
            .chain(self.having.iter())
            .chain(self.order_by.iter().map(|o| &o.expr))
    }
}
