//! Shared fixtures for integration tests
//!
//! `seeded_store()` holds two teams and four members:
//!
//! | member  | age | team  |
//! |---------|-----|-------|
//! | member1 | 10  | teamA |
//! | member2 | 20  | teamA |
//! | member3 | 30  | teamB |
//! | member4 | 40  | teamB |

#![allow(dead_code)]

use lifequery::entity::{Member, Team};
use lifequery::{MemoryStore, Session};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn seeded_store() -> MemoryStore {
    init_logging();
    let store = MemoryStore::new();
    let session = Session::new(&store);

    let mut team_a = Team::new("teamA");
    let mut team_b = Team::new("teamB");
    session.persist(&mut team_a).expect("persist teamA");
    session.persist(&mut team_b).expect("persist teamB");

    for (username, age, team) in [
        ("member1", 10, &team_a),
        ("member2", 20, &team_a),
        ("member3", 30, &team_b),
        ("member4", 40, &team_b),
    ] {
        session
            .persist(&mut Member::new(username, age).with_team(team))
            .expect("persist member");
    }
    session.flush().expect("flush fixtures");
    store
}

pub fn usernames(members: &[Member]) -> Vec<Option<&str>> {
    members.iter().map(Member::username).collect()
}
