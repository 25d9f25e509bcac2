//! Scalar, membership and correlated subqueries

mod common;

use common::{seeded_store, usernames};
use lifequery::entity::QMember;
use lifequery::query::{select, select_from};
use lifequery::{QueryError, Session};

fn ages(members: &[lifequery::entity::Member]) -> Vec<i32> {
    members.iter().map(|m| m.age()).collect()
}

#[test]
fn test_oldest_member() {
    let store = seeded_store();
    let session = Session::new(&store);
    let (member, member_sub) = (QMember::member(), QMember::new("memberSub"));

    let result = select_from(&member)
        .filter(member.age.eq(select(member_sub.age.max()).from(&member_sub)))
        .fetch(&session)
        .unwrap();
    assert_eq!(ages(&result), vec![40]);
}

#[test]
fn test_members_at_or_above_average() {
    let store = seeded_store();
    let session = Session::new(&store);
    let (member, member_sub) = (QMember::member(), QMember::new("memberSub"));

    let result = select_from(&member)
        .filter(member.age.goe(select(member_sub.age.avg()).from(&member_sub)))
        .fetch(&session)
        .unwrap();
    assert_eq!(ages(&result), vec![30, 40]);
}

#[test]
fn test_in_subquery() {
    let store = seeded_store();
    let session = Session::new(&store);
    let (member, member_sub) = (QMember::member(), QMember::new("memberSub"));

    let result = select_from(&member)
        .filter(
            member.age.in_subquery(
                select(member_sub.age.clone())
                    .from(&member_sub)
                    .filter(member_sub.age.gt(10)),
            ),
        )
        .fetch(&session)
        .unwrap();
    assert_eq!(ages(&result), vec![20, 30, 40]);

    let result = select_from(&member)
        .filter(
            member.age.not_in_subquery(
                select(member_sub.age.clone())
                    .from(&member_sub)
                    .filter(member_sub.age.gt(10)),
            ),
        )
        .fetch(&session)
        .unwrap();
    assert_eq!(ages(&result), vec![10]);
}

#[test]
fn test_subquery_in_projection() {
    let store = seeded_store();
    let session = Session::new(&store);
    let (member, member_sub) = (QMember::member(), QMember::new("memberSub"));

    let rows = select((
        member.username.clone(),
        select(member_sub.age.avg()).from(&member_sub).as_expression(),
    ))
    .from(&member)
    .fetch(&session)
    .unwrap();
    assert_eq!(rows.len(), 4);
    assert!(rows.iter().all(|(_, avg)| *avg == Some(25.0)));
    assert_eq!(rows[0].0.as_deref(), Some("member1"));
}

#[test]
fn test_correlated_subquery() {
    let store = seeded_store();
    let session = Session::new(&store);
    let (member, member_sub) = (QMember::member(), QMember::new("memberSub"));

    // Members older than the average of their own team
    let result = select_from(&member)
        .filter(
            member.age.gt(select(member_sub.age.avg())
                .from(&member_sub)
                .filter(member_sub.team_id.eq(&member.team_id))),
        )
        .fetch(&session)
        .unwrap();
    assert_eq!(usernames(&result), vec![Some("member2"), Some("member4")]);
}

#[test]
fn test_scalar_subquery_with_several_rows_fails() {
    let store = seeded_store();
    let session = Session::new(&store);
    let (member, member_sub) = (QMember::member(), QMember::new("memberSub"));

    let err = select_from(&member)
        .filter(member.age.eq(select(member_sub.age.clone()).from(&member_sub)))
        .fetch(&session)
        .unwrap_err();
    assert!(matches!(err, QueryError::Execution(_)));
}

#[test]
fn test_scalar_subquery_without_rows_is_null() {
    let store = seeded_store();
    let session = Session::new(&store);
    let (member, member_sub) = (QMember::member(), QMember::new("memberSub"));

    let result = select_from(&member)
        .filter(
            member.age.eq(select(member_sub.age.clone())
                .from(&member_sub)
                .filter(member_sub.age.gt(100))),
        )
        .fetch(&session)
        .unwrap();
    assert!(result.is_empty());
}

#[test]
fn test_inner_alias_shadows_outer() {
    let store = seeded_store();
    let member = QMember::member();
    let inner = QMember::member();

    // `member.age` inside the subquery refers to the inner source
    let result = select_from(&member)
        .filter(member.age.eq(select(inner.age.max()).from(&inner)))
        .fetch(&store)
        .unwrap();
    assert_eq!(ages(&result), vec![40]);
}
