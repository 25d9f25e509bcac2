//! Ordering with explicit null placement, and paging

mod common;

use common::{seeded_store, usernames};
use lifequery::entity::{Member, QMember};
use lifequery::query::select_from;
use lifequery::{NullOrdering, QueryConfig, Session};

fn add_age_100_members(session: &Session<'_, lifequery::MemoryStore>) {
    session.persist(&mut Member::anonymous(100)).unwrap();
    session.persist(&mut Member::new("member5", 100)).unwrap();
    session.persist(&mut Member::new("member6", 100)).unwrap();
}

// ============================================================================
// Sorting
// ============================================================================

#[test]
fn test_sort_with_nulls_last() {
    let store = seeded_store();
    let session = Session::new(&store);
    add_age_100_members(&session);
    let member = QMember::member();

    let result = select_from(&member)
        .filter(member.age.eq(100))
        .order_by(member.age.desc())
        .order_by(member.username.asc().nulls_last())
        .fetch(&session)
        .unwrap();
    assert_eq!(usernames(&result), vec![Some("member5"), Some("member6"), None]);
}

#[test]
fn test_nulls_last_holds_in_both_directions() {
    let store = seeded_store();
    let session = Session::new(&store);
    add_age_100_members(&session);
    let member = QMember::member();

    for spec in [member.username.asc(), member.username.desc()] {
        let result = select_from(&member)
            .order_by(spec.nulls_last())
            .fetch(&session)
            .unwrap();
        assert_eq!(result.len(), 7);
        assert_eq!(result.last().and_then(Member::username), None);
        assert!(result[..6].iter().all(|m| m.username().is_some()));
    }

    let result = select_from(&member)
        .order_by(member.username.desc().nulls_first())
        .fetch(&session)
        .unwrap();
    assert_eq!(result[0].username(), None);
    assert_eq!(result[1].username(), Some("member6"));
}

#[test]
fn test_session_default_null_ordering() {
    let store = seeded_store();
    let config = QueryConfig {
        default_null_ordering: NullOrdering::First,
        ..QueryConfig::default()
    };
    let session = Session::with_config(&store, config);
    add_age_100_members(&session);
    let member = QMember::member();

    let result = select_from(&member)
        .order_by(member.username.asc())
        .fetch(&session)
        .unwrap();
    assert_eq!(result[0].username(), None);
    assert_eq!(result[1].username(), Some("member1"));
}

// ============================================================================
// Paging
// ============================================================================

#[test]
fn test_paging_offset_and_limit() {
    let store = seeded_store();
    let session = Session::new(&store);
    let member = QMember::member();

    let result = select_from(&member)
        .order_by(member.username.desc())
        .offset(1)
        .limit(2)
        .fetch(&session)
        .unwrap();
    assert_eq!(usernames(&result), vec![Some("member3"), Some("member2")]);
}

#[test]
fn test_paged_results_report_unpaged_total() {
    let store = seeded_store();
    let session = Session::new(&store);
    let member = QMember::member();

    let page = select_from(&member)
        .order_by(member.username.desc())
        .offset(1)
        .limit(2)
        .fetch_results(&session)
        .unwrap();
    assert_eq!(page.total, 4);
    assert_eq!(page.limit, Some(2));
    assert_eq!(page.offset, 1);
    assert_eq!(page.len(), 2);
}

#[test]
fn test_page_sizes_over_offsets_and_limits() {
    let store = seeded_store();
    let session = Session::new(&store);
    let member = QMember::member();
    let n: u64 = 4;

    for offset in 0..6 {
        for limit in 0..6 {
            let page = select_from(&member)
                .order_by(member.age.asc())
                .offset(offset)
                .limit(limit)
                .fetch_results(&session)
                .unwrap();
            let expected = limit.min(n.saturating_sub(offset));
            assert_eq!(page.len() as u64, expected, "offset {offset} limit {limit}");
            assert_eq!(page.total, n);
        }
    }
}
