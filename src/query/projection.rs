//! Typed projections and row decoding.
//!
//! A [`Projection`] describes the selection list it contributes to a query and
//! decodes its part of every result row. Entity paths decode whole entities,
//! expressions decode single values, and tuples combine projections
//! left-to-right.
//!
//! Rows carry the projected columns first, followed by the columns of every
//! fetch-joined entity in join order. [`Layout`] records where each of those
//! blocks starts so that an entity projection can materialize its fetched
//! associations while it is decoded.

use crate::error::QueryError;
use crate::expr::typed::Expression;
use crate::query::plan::{EntitySelection, LogicalQuery, Selection};
use crate::schema::{Entity, EntityPath};
use crate::value::{FieldType, Value};

/// Something that can be selected and decoded from a result row
pub trait Projection {
    /// Decoded value per row
    type Output;

    /// Selection items in output order
    fn selections(&self) -> Vec<Selection>;

    /// Decode this projection's columns at the cursor of `row`
    fn decode(&self, row: &mut RowView<'_>) -> Result<Self::Output, QueryError>;
}

#[derive(Debug, Clone)]
struct FetchedBlock {
    owner_alias: String,
    association: &'static str,
    start: usize,
    width: usize,
}

/// Column positions of a result row
#[derive(Debug, Clone)]
pub struct Layout {
    starts: Vec<usize>,
    fetched: Vec<FetchedBlock>,
    width: usize,
}

impl Layout {
    pub fn of(plan: &LogicalQuery) -> Self {
        let mut starts = Vec::with_capacity(plan.selections.len());
        let mut width = 0;
        for selection in &plan.selections {
            starts.push(width);
            width += selection.width();
        }
        let mut fetched = Vec::new();
        for join in plan.fetch_joins() {
            let Some(association) = &join.association else {
                continue;
            };
            fetched.push(FetchedBlock {
                owner_alias: association.owner_alias.clone(),
                association: association.def.name,
                start: width,
                width: join.target.schema.width(),
            });
            width += join.target.schema.width();
        }
        Self {
            starts,
            fetched,
            width,
        }
    }

    /// Total number of columns per row
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn view<'r>(&'r self, row: &'r [Value]) -> Result<RowView<'r>, QueryError> {
        if row.len() != self.width {
            return Err(QueryError::execution(format!(
                "row has {} columns, expected {}",
                row.len(),
                self.width
            )));
        }
        Ok(RowView {
            layout: self,
            row,
            cursor: 0,
        })
    }
}

/// Cursor over one result row
pub struct RowView<'r> {
    layout: &'r Layout,
    row: &'r [Value],
    cursor: usize,
}

impl<'r> RowView<'r> {
    fn next_block(&mut self, width: usize) -> Result<&'r [Value], QueryError> {
        let start = *self.layout.starts.get(self.cursor).ok_or_else(|| {
            QueryError::execution("projection decodes more items than were selected")
        })?;
        self.cursor += 1;
        self.row
            .get(start..start + width)
            .ok_or_else(|| QueryError::execution("row is shorter than its layout"))
    }

    /// Next single-column item
    pub fn next_value(&mut self) -> Result<&'r Value, QueryError> {
        Ok(&self.next_block(1)?[0])
    }

    /// Next entity item of the given width
    pub fn next_entity(&mut self, width: usize) -> Result<&'r [Value], QueryError> {
        self.next_block(width)
    }

    /// Fetch-joined blocks owned by `alias`, as `(association, columns)`
    pub fn fetched(&self, alias: &str) -> Vec<(&'static str, &'r [Value])> {
        let row = self.row;
        self.layout
            .fetched
            .iter()
            .filter(|b| b.owner_alias == alias)
            .filter_map(|b| row.get(b.start..b.start + b.width).map(|v| (b.association, v)))
            .collect()
    }
}

fn entity_selection<P: EntityPath>(path: &P) -> Selection {
    Selection::Entity(EntitySelection {
        alias: path.alias().to_string(),
        schema: path.schema(),
    })
}

/// Decode an entity and attach its fetched associations.
///
/// `Ok(None)` when the identity column is null, which happens for the missing
/// side of an outer join.
fn decode_entity<P: EntityPath>(
    path: &P,
    row: &mut RowView<'_>,
) -> Result<Option<P::Entity>, QueryError> {
    let values = row.next_entity(path.schema().width())?;
    if values[0].is_null() {
        return Ok(None);
    }
    let mut entity = P::Entity::from_values(values)?;
    for (association, columns) in row.fetched(path.alias()) {
        if !columns[0].is_null() {
            entity.attach(association, columns)?;
        }
    }
    Ok(Some(entity))
}

impl<P: EntityPath> Projection for &P {
    type Output = P::Entity;

    fn selections(&self) -> Vec<Selection> {
        vec![entity_selection(*self)]
    }

    fn decode(&self, row: &mut RowView<'_>) -> Result<Self::Output, QueryError> {
        decode_entity(*self, row)?.ok_or_else(|| {
            QueryError::execution(format!(
                "no {} row for `{}`; select it with `.optional()` when it comes from an outer join",
                self.schema().table,
                self.alias()
            ))
        })
    }
}

/// Entity projection yielding `None` for the missing side of an outer join
#[derive(Debug, Clone)]
pub struct Optional<P> {
    path: P,
}

impl<P: EntityPath> Optional<P> {
    pub fn new(path: P) -> Self {
        Self { path }
    }
}

impl<P: EntityPath> Projection for Optional<P> {
    type Output = Option<P::Entity>;

    fn selections(&self) -> Vec<Selection> {
        vec![entity_selection(&self.path)]
    }

    fn decode(&self, row: &mut RowView<'_>) -> Result<Self::Output, QueryError> {
        decode_entity(&self.path, row)
    }
}

impl<T: FieldType> Projection for Expression<T> {
    type Output = Option<T>;

    fn selections(&self) -> Vec<Selection> {
        vec![Selection::Expr(self.expr().clone())]
    }

    fn decode(&self, row: &mut RowView<'_>) -> Result<Self::Output, QueryError> {
        T::from_value(row.next_value()?)
    }
}

impl<T: FieldType> Projection for &Expression<T> {
    type Output = Option<T>;

    fn selections(&self) -> Vec<Selection> {
        (*self).selections()
    }

    fn decode(&self, row: &mut RowView<'_>) -> Result<Self::Output, QueryError> {
        (*self).decode(row)
    }
}

macro_rules! tuple_projection {
    ($($name:ident : $idx:tt),+) => {
        impl<$($name: Projection),+> Projection for ($($name,)+) {
            type Output = ($($name::Output,)+);

            fn selections(&self) -> Vec<Selection> {
                let mut out = Vec::new();
                $(out.extend(self.$idx.selections());)+
                out
            }

            fn decode(&self, row: &mut RowView<'_>) -> Result<Self::Output, QueryError> {
                Ok(($(self.$idx.decode(row)?,)+))
            }
        }
    };
}

tuple_projection!(A: 0, B: 1);
tuple_projection!(A: 0, B: 1, C: 2);
tuple_projection!(A: 0, B: 1, C: 2, D: 3);
tuple_projection!(A: 0, B: 1, C: 2, D: 3, E: 4);
tuple_projection!(A: 0, B: 1, C: 2, D: 3, E: 4, F: 5);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Member, QMember, QTeam};
    use crate::query::select::select_from;

    #[test]
    fn test_layout_appends_fetched_columns() {
        let member = QMember::member();
        let team = QTeam::team();
        let plan = select_from(&member)
            .join(&member.team, &team)
            .fetch_join()
            .into_logical();
        let layout = Layout::of(&plan);
        assert_eq!(layout.width(), 4 + 2);
    }

    #[test]
    fn test_tuple_decodes_left_to_right() {
        let member = QMember::member();
        let projection = (&member.username, &member.age);
        let plan = crate::query::select::select(projection).from(&member).into_logical();
        let layout = Layout::of(&plan);
        let row = vec![Value::from("member1"), Value::Int(10)];
        let mut view = layout.view(&row).unwrap();
        let (name, age) = projection.decode(&mut view).unwrap();
        assert_eq!(name.as_deref(), Some("member1"));
        assert_eq!(age, Some(10));
    }

    #[test]
    fn test_missing_entity_needs_optional() {
        let member = QMember::member();
        let plan = select_from(&member).into_logical();
        let layout = Layout::of(&plan);
        let row = vec![Value::Null; 4];

        let mut view = layout.view(&row).unwrap();
        assert!(matches!((&member).decode(&mut view), Err(QueryError::Execution(_))));

        let mut view = layout.view(&row).unwrap();
        let decoded: Option<Member> = member.optional().decode(&mut view).unwrap();
        assert!(decoded.is_none());
    }

    #[test]
    fn test_row_width_mismatch() {
        let member = QMember::member();
        let layout = Layout::of(&select_from(&member).into_logical());
        assert!(layout.view(&[Value::Int(1)]).is_err());
    }
}
