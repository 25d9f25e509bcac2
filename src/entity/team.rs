use crate::entity::Member;
use crate::error::QueryError;
use crate::expr::typed::Expression;
use crate::relation::Association;
use crate::schema::{self, AssociationDef, AssociationKind, ColumnDef, Entity, EntityPath, EntitySchema};
use crate::value::{Value, ValueType};

static TEAM: EntitySchema = EntitySchema {
    table: "team",
    columns: &[
        ColumnDef::new("id", ValueType::Int, false),
        ColumnDef::new("name", ValueType::Text, false),
    ],
    associations: &[AssociationDef {
        name: "members",
        target_table: "member",
        kind: AssociationKind::OneToMany {
            mapped_by: "team_id",
        },
    }],
};

#[derive(Debug, Clone, PartialEq)]
pub struct Team {
    id: Option<i64>,
    name: String,
}

impl Team {
    pub fn new(name: &str) -> Self {
        Self {
            id: None,
            name: name.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Entity for Team {
    type Path = QTeam;

    fn schema() -> &'static EntitySchema {
        &TEAM
    }

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = Some(id);
    }

    fn to_values(&self) -> Vec<Value> {
        vec![self.id.into(), self.name.clone().into()]
    }

    fn from_values(values: &[Value]) -> Result<Self, QueryError> {
        Ok(Self {
            id: Some(schema::required(&TEAM, values, 0)?),
            name: schema::required(&TEAM, values, 1)?,
        })
    }
}

/// Query path for [`Team`]
#[derive(Debug, Clone)]
pub struct QTeam {
    alias: String,
    pub id: Expression<i64>,
    pub name: Expression<String>,
    /// One-to-many, joinable but never fetch-joined
    pub members: Association<Member>,
}

impl QTeam {
    pub fn new(alias: &str) -> Self {
        Self {
            alias: alias.to_string(),
            id: Expression::column(alias, &TEAM.columns[0]),
            name: Expression::column(alias, &TEAM.columns[1]),
            members: Association::new(alias, &TEAM.associations[0]),
        }
    }

    /// Path under the default alias `team`
    pub fn team() -> Self {
        Self::new("team")
    }
}

impl EntityPath for QTeam {
    type Entity = Team;

    fn new(alias: &str) -> Self {
        QTeam::new(alias)
    }

    fn alias(&self) -> &str {
        &self.alias
    }

    fn identity(&self) -> Expression<i64> {
        self.id.clone()
    }
}
