//! Entities of the member/team domain and their query paths.
//!
//! Each entity carries a static [`EntitySchema`](crate::schema::EntitySchema)
//! and a path type (`QMember`, `QTeam`, `QHello`) whose fields are typed
//! column expressions under an alias. `QMember::member()` uses the default
//! alias; `QMember::new("memberSub")` binds another one, e.g. for subqueries.

mod hello;
mod member;
mod team;

pub use hello::{Hello, QHello};
pub use member::{Member, QMember};
pub use team::{QTeam, Team};
