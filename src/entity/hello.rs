use crate::error::QueryError;
use crate::expr::typed::Expression;
use crate::schema::{self, ColumnDef, Entity, EntityPath, EntitySchema};
use crate::value::{Value, ValueType};

static HELLO: EntitySchema = EntitySchema {
    table: "hello",
    columns: &[ColumnDef::new("id", ValueType::Int, false)],
    associations: &[],
};

/// Identity-only entity
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Hello {
    id: Option<i64>,
}

impl Hello {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Entity for Hello {
    type Path = QHello;

    fn schema() -> &'static EntitySchema {
        &HELLO
    }

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = Some(id);
    }

    fn to_values(&self) -> Vec<Value> {
        vec![self.id.into()]
    }

    fn from_values(values: &[Value]) -> Result<Self, QueryError> {
        Ok(Self {
            id: Some(schema::required(&HELLO, values, 0)?),
        })
    }
}

#[derive(Debug, Clone)]
pub struct QHello {
    alias: String,
    pub id: Expression<i64>,
}

impl QHello {
    pub fn new(alias: &str) -> Self {
        Self {
            alias: alias.to_string(),
            id: Expression::column(alias, &HELLO.columns[0]),
        }
    }

    pub fn hello() -> Self {
        Self::new("hello")
    }
}

impl EntityPath for QHello {
    type Entity = Hello;

    fn new(alias: &str) -> Self {
        QHello::new(alias)
    }

    fn alias(&self) -> &str {
        &self.alias
    }

    fn identity(&self) -> Expression<i64> {
        self.id.clone()
    }
}
