//! # Lifequery
//!
//! Typed query builder with explicit entity schemas, SQL semantics and a
//! pluggable data source.
//!
//! Queries are assembled from typed column expressions (`member.age.goe(30)`),
//! validated into an immutable [`Query`], rendered to parameterized PostgreSQL
//! through `sea_query`, and executed against a [`DataSource`]. The bundled
//! [`MemoryStore`] evaluates the same plans in process.
//!
//! ```no_run
//! use lifequery::entity::{Member, QMember, QTeam, Team};
//! use lifequery::query::{select, select_from};
//! use lifequery::store::MemoryStore;
//! use lifequery::Session;
//!
//! # fn main() -> Result<(), lifequery::QueryError> {
//! let store = MemoryStore::new();
//! let session = Session::new(&store);
//! let mut team = Team::new("teamA");
//! session.persist(&mut team)?;
//! session.persist(&mut Member::new("member1", 10).with_team(&team))?;
//!
//! let (member, t) = (QMember::member(), QTeam::team());
//! let rows = select((t.name.clone(), member.age.avg()))
//!     .from(&member)
//!     .join(&member.team, &t)
//!     .group_by(&t.name)
//!     .fetch(&session)?;
//! assert_eq!(rows, vec![(Some("teamA".to_string()), Some(10.0))]);
//!
//! let young = select_from(&member).filter(member.age.lt(20)).fetch(&session)?;
//! assert_eq!(young.len(), 1);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod entity;
pub mod error;
pub mod executor;
pub mod expr;
pub mod metrics;
pub mod query;
pub mod relation;
pub mod schema;
pub mod session;
pub mod store;
pub mod value;

pub use config::QueryConfig;
pub use error::QueryError;
pub use executor::{DataSource, QueryExecutor, Row};
pub use expr::typed::{Direction, Expression, NullOrdering, OrderSpec, Predicate};
pub use expr::Expr;
pub use query::{select, select_from, Query, QueryBuilder, ResultPage};
pub use relation::{Association, Reference};
pub use schema::{Entity, EntityPath, EntitySchema};
pub use session::{Session, Transaction};
pub use store::MemoryStore;
pub use value::{Value, ValueType};
