//! Filtering and the single-result fetch contract

mod common;

use common::{seeded_store, usernames};
use lifequery::entity::{Member, QMember};
use lifequery::query::select_from;
use lifequery::{QueryError, Session};

// ============================================================================
// Filtering
// ============================================================================

#[test]
fn test_find_by_username() {
    let store = seeded_store();
    let session = Session::new(&store);
    let member = QMember::member();

    let found = select_from(&member)
        .filter(member.username.eq("member1"))
        .fetch_one(&session)
        .unwrap();
    assert_eq!(found.username(), Some("member1"));
    assert_eq!(found.age(), 10);
}

#[test]
fn test_and_chain() {
    let store = seeded_store();
    let session = Session::new(&store);
    let member = QMember::member();

    let found = select_from(&member)
        .filter(member.username.eq("member1").and(member.age.eq(10)))
        .fetch_one(&session)
        .unwrap();
    assert_eq!(found.username(), Some("member1"));
}

#[test]
fn test_separate_filters_match_conjunction() {
    let store = seeded_store();
    let session = Session::new(&store);
    let member = QMember::member();

    let pairs = [
        (member.age.goe(20), member.age.lt(40)),
        (member.username.like("member%"), member.age.between(10, 30)),
        (member.age.is_in([10, 40]), member.username.ne("member1")),
        (member.username.is_not_null(), member.age.gt(100)),
    ];
    for (p, q) in pairs {
        let separate = select_from(&member)
            .filter(p.clone())
            .filter(q.clone())
            .fetch(&session)
            .unwrap();
        let listed = select_from(&member)
            .filter_all([p.clone(), q.clone()])
            .fetch(&session)
            .unwrap();
        let combined = select_from(&member).filter(p.and(q)).fetch(&session).unwrap();
        assert_eq!(usernames(&separate), usernames(&combined));
        assert_eq!(usernames(&listed), usernames(&combined));
    }
}

#[test]
fn test_or_and_not() {
    let store = seeded_store();
    let session = Session::new(&store);
    let member = QMember::member();

    let found = select_from(&member)
        .filter(member.age.eq(10).or(member.age.eq(40)))
        .fetch(&session)
        .unwrap();
    assert_eq!(usernames(&found), vec![Some("member1"), Some("member4")]);

    let found = select_from(&member)
        .filter(member.username.starts_with("member").not())
        .fetch(&session)
        .unwrap();
    assert!(found.is_empty());
}

#[test]
fn test_not_in_and_null_usernames() {
    let store = seeded_store();
    let session = Session::new(&store);
    session.persist(&mut Member::anonymous(25)).unwrap();
    let member = QMember::member();

    let found = select_from(&member)
        .filter(member.age.not_in([10, 20, 25]))
        .fetch(&session)
        .unwrap();
    assert_eq!(usernames(&found), vec![Some("member3"), Some("member4")]);

    // A null username matches neither `contains` nor its negation
    let matching = select_from(&member)
        .filter(member.username.contains("ber"))
        .fetch_count(&session)
        .unwrap();
    let rejected = select_from(&member)
        .filter(member.username.contains("ber").not())
        .fetch_count(&session)
        .unwrap();
    assert_eq!((matching, rejected), (4, 0));

    let anonymous = select_from(&member)
        .filter(member.username.is_null())
        .fetch_one(&session)
        .unwrap();
    assert_eq!(anonymous.age(), 25);
}

// ============================================================================
// Fetch variants
// ============================================================================

#[test]
fn test_fetch_one_requires_exactly_one_row() {
    let store = seeded_store();
    let session = Session::new(&store);
    let member = QMember::member();

    let err = select_from(&member).fetch_one(&session).unwrap_err();
    assert_eq!(err, QueryError::NonUniqueResult { rows: 4 });

    let err = select_from(&member)
        .filter(member.username.eq("nobody"))
        .fetch_one(&session)
        .unwrap_err();
    assert_eq!(err, QueryError::NotFound);
}

#[test]
fn test_fetch_variants() {
    let store = seeded_store();
    let session = Session::new(&store);
    let member = QMember::member();

    assert_eq!(select_from(&member).fetch(&session).unwrap().len(), 4);
    assert!(select_from(&member)
        .filter(member.age.gt(100))
        .fetch(&session)
        .unwrap()
        .is_empty());

    let none = select_from(&member)
        .filter(member.username.eq("nobody"))
        .fetch_optional(&session)
        .unwrap();
    assert!(none.is_none());
    assert!(matches!(
        select_from(&member).fetch_optional(&session),
        Err(QueryError::NonUniqueResult { .. })
    ));

    let first = select_from(&member)
        .order_by(member.age.desc())
        .fetch_first(&session)
        .unwrap()
        .unwrap();
    assert_eq!(first.username(), Some("member4"));

    assert_eq!(select_from(&member).fetch_count(&session).unwrap(), 4);

    let page = select_from(&member).fetch_results(&session).unwrap();
    assert_eq!(page.total, 4);
    assert_eq!(page.len(), 4);
}

#[test]
fn test_fetch_against_store_directly() {
    let store = seeded_store();
    let member = QMember::member();

    let found = select_from(&member)
        .filter(member.age.loe(20))
        .fetch(&store)
        .unwrap();
    assert_eq!(usernames(&found), vec![Some("member1"), Some("member2")]);
}
