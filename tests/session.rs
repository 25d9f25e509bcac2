//! Unit of work: persist, flush, clear and transactions

mod common;

use common::{init_logging, seeded_store};
use lifequery::entity::{Hello, Member, QHello, QMember, QTeam, Team};
use lifequery::query::select_from;
use lifequery::{Entity, MemoryStore, QueryError, Session};

#[test]
fn test_hello_round_trip() {
    init_logging();
    let store = MemoryStore::new();
    let session = Session::new(&store);

    let mut hello = Hello::new();
    session.persist(&mut hello).unwrap();

    let q_hello = QHello::hello();
    let found = select_from(&q_hello).fetch_one(&session).unwrap();
    assert_eq!(found.id(), hello.id());
}

#[test]
fn test_identities_are_assigned_per_table() {
    init_logging();
    let store = MemoryStore::new();
    let session = Session::new(&store);

    let mut team = Team::new("teamA");
    let mut member = Member::new("member1", 10).with_team(&team);
    assert_eq!(member.team().id(), None);

    assert_eq!(session.persist(&mut team).unwrap(), 1);
    member.change_team(&team);
    assert_eq!(session.persist(&mut member).unwrap(), 1);
    assert_eq!(member.team().id(), Some(1));
}

#[test]
fn test_clear_discards_unflushed_rows() {
    let store = seeded_store();
    let session = Session::new(&store);
    session.persist(&mut Member::new("member5", 50)).unwrap();
    assert_eq!(session.clear(), 1);

    let member = QMember::member();
    assert_eq!(select_from(&member).fetch_count(&session).unwrap(), 4);
}

#[test]
fn test_commit_makes_rows_visible() {
    let store = seeded_store();
    let session = Session::new(&store);

    let tx = session.begin().unwrap();
    session.persist(&mut Team::new("teamC")).unwrap();
    tx.commit().unwrap();

    let other = Session::new(&store);
    let team = QTeam::team();
    let names: Vec<String> = select_from(&team)
        .fetch(&other)
        .unwrap()
        .iter()
        .map(|t| t.name().to_string())
        .collect();
    assert_eq!(names, vec!["teamA", "teamB", "teamC"]);
}

#[test]
fn test_rollback_discards_flushed_and_pending_rows() {
    let store = seeded_store();
    let session = Session::new(&store);
    let member = QMember::member();

    let tx = session.begin().unwrap();
    session.persist(&mut Member::new("member5", 50)).unwrap();
    // The query flushes member5 inside the transaction
    assert_eq!(select_from(&member).fetch_count(&session).unwrap(), 5);
    session.persist(&mut Member::new("member6", 60)).unwrap();
    tx.rollback().unwrap();

    assert_eq!(session.pending_count(), 0);
    assert_eq!(select_from(&member).fetch_count(&session).unwrap(), 4);
}

#[test]
fn test_nested_begin_fails() {
    let store = seeded_store();
    let session = Session::new(&store);

    let tx = session.begin().unwrap();
    assert!(matches!(session.begin(), Err(QueryError::Execution(_))));
    tx.commit().unwrap();
}

#[test]
fn test_invalid_entity_is_not_persisted() {
    init_logging();
    let store = MemoryStore::new();
    let session = Session::new(&store);

    let mut hello = Hello::new();
    hello.set_id(7);
    let err = session.persist(&mut hello).unwrap_err();
    assert!(matches!(err, QueryError::Validation(_)));
    assert_eq!(session.pending_count(), 0);
}
