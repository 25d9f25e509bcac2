use crate::entity::Team;
use crate::error::QueryError;
use crate::expr::typed::Expression;
use crate::relation::{Association, Reference};
use crate::schema::{self, AssociationDef, AssociationKind, ColumnDef, Entity, EntityPath, EntitySchema};
use crate::value::{Value, ValueType};

static MEMBER: EntitySchema = EntitySchema {
    table: "member",
    columns: &[
        ColumnDef::new("id", ValueType::Int, false),
        ColumnDef::new("username", ValueType::Text, true),
        ColumnDef::new("age", ValueType::Int, false),
        ColumnDef::new("team_id", ValueType::Int, true),
    ],
    associations: &[AssociationDef {
        name: "team",
        target_table: "team",
        kind: AssociationKind::ManyToOne {
            join_column: "team_id",
        },
    }],
};

/// A member, optionally belonging to a [`Team`]
#[derive(Debug, Clone)]
pub struct Member {
    id: Option<i64>,
    username: Option<String>,
    age: i32,
    team: Reference<Team>,
}

impl Member {
    pub fn new(username: &str, age: i32) -> Self {
        Self {
            id: None,
            username: Some(username.to_string()),
            age,
            team: Reference::default(),
        }
    }

    /// Member without a username
    pub fn anonymous(age: i32) -> Self {
        Self {
            username: None,
            ..Self::new("", age)
        }
    }

    /// Member with a username only
    pub fn named(username: &str) -> Self {
        Self::new(username, 0)
    }

    /// Assign a team; the team must already be persisted to be stored
    pub fn with_team(mut self, team: &Team) -> Self {
        self.change_team(team);
        self
    }

    pub fn change_team(&mut self, team: &Team) {
        self.team = Reference::loaded(team.clone());
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn age(&self) -> i32 {
        self.age
    }

    pub fn team(&self) -> &Reference<Team> {
        &self.team
    }
}

impl Entity for Member {
    type Path = QMember;

    fn schema() -> &'static EntitySchema {
        &MEMBER
    }

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = Some(id);
    }

    fn to_values(&self) -> Vec<Value> {
        vec![
            self.id.into(),
            self.username.clone().into(),
            self.age.into(),
            self.team.id().into(),
        ]
    }

    fn from_values(values: &[Value]) -> Result<Self, QueryError> {
        Ok(Self {
            id: Some(schema::required(&MEMBER, values, 0)?),
            username: schema::nullable(&MEMBER, values, 1)?,
            age: schema::required(&MEMBER, values, 2)?,
            team: Reference::new(schema::nullable(&MEMBER, values, 3)?),
        })
    }

    fn attach(&mut self, association: &str, values: &[Value]) -> Result<(), QueryError> {
        match association {
            "team" => {
                self.team.set_loaded(Team::from_values(values)?);
                Ok(())
            }
            other => Err(QueryError::execution(format!(
                "member has no fetchable association `{other}`"
            ))),
        }
    }
}

/// Query path for [`Member`]
#[derive(Debug, Clone)]
pub struct QMember {
    alias: String,
    pub id: Expression<i64>,
    pub username: Expression<String>,
    pub age: Expression<i32>,
    pub team_id: Expression<i64>,
    pub team: Association<Team>,
}

impl QMember {
    pub fn new(alias: &str) -> Self {
        let column = |i: usize| &MEMBER.columns[i];
        Self {
            alias: alias.to_string(),
            id: Expression::column(alias, column(0)),
            username: Expression::column(alias, column(1)),
            age: Expression::column(alias, column(2)),
            team_id: Expression::column(alias, column(3)),
            team: Association::new(alias, &MEMBER.associations[0]),
        }
    }

    /// Path under the default alias `member`
    pub fn member() -> Self {
        Self::new("member")
    }
}

impl EntityPath for QMember {
    type Entity = Member;

    fn new(alias: &str) -> Self {
        QMember::new(alias)
    }

    fn alias(&self) -> &str {
        &self.alias
    }

    fn identity(&self) -> Expression<i64> {
        self.id.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_values_roundtrip_keeps_team_unloaded() {
        let values = vec![Value::Int(3), Value::from("member1"), Value::Int(10), Value::Int(1)];
        let member = Member::from_values(&values).unwrap();
        assert_eq!(member.username(), Some("member1"));
        assert_eq!(member.team().id(), Some(1));
        assert!(!member.team().is_loaded());
        assert_eq!(member.to_values(), values);
    }

    #[test]
    fn test_attach_team_materializes_reference() {
        let values = vec![Value::Int(3), Value::Null, Value::Int(10), Value::Int(1)];
        let mut member = Member::from_values(&values).unwrap();
        member
            .attach("team", &[Value::Int(1), Value::from("teamA")])
            .unwrap();
        assert!(member.team().is_loaded());
        assert_eq!(member.team().peek().map(Team::name), Some("teamA"));
        assert!(member.attach("members", &[]).is_err());
    }

    #[test]
    fn test_anonymous_member_has_no_username() {
        let member = Member::anonymous(100);
        assert_eq!(member.username(), None);
        assert_eq!(member.to_values()[1], Value::Null);
    }
}
