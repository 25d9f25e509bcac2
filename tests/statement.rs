//! Rendered SQL and serialized expression descriptions

mod common;

use lifequery::entity::{QMember, QTeam};
use lifequery::query::select_from;
use lifequery::Value;

#[test]
fn test_fetch_join_statement() {
    common::init_logging();
    let (member, team) = (QMember::member(), QTeam::team());

    let query = select_from(&member)
        .join(&member.team, &team)
        .fetch_join()
        .filter(member.username.eq("member1"))
        .build()
        .unwrap();
    let statement = query.statement();

    assert!(statement.sql.contains(r#"INNER JOIN "team" AS "team""#));
    assert!(statement.sql.contains(r#""member"."team_id" = "team"."id""#));
    assert!(statement.sql.contains(r#""team"."name" FROM"#));
    assert!(statement.sql.contains(r#"WHERE "member"."username" = $1"#));
    assert_eq!(statement.values.0.len(), 1);
}

#[test]
fn test_order_spells_out_null_placement() {
    let member = QMember::member();

    let sql = select_from(&member)
        .order_by(member.age.desc())
        .order_by(member.username.asc().nulls_first())
        .build()
        .unwrap()
        .to_sql();
    assert!(sql.contains(r#""member"."age" DESC NULLS LAST"#));
    assert!(sql.contains(r#""member"."username" ASC NULLS FIRST"#));
}

#[test]
fn test_predicate_description_serializes() {
    let member = QMember::member();
    let predicate = member.age.goe(30).and(member.username.is_not_null());

    let json = serde_json::to_value(predicate.describe()).unwrap();
    assert_eq!(json["op"], "and");
    assert_eq!(json["operands"][0]["op"], "goe");
    assert_eq!(json["operands"][0]["operands"][0]["column"], "member.age");
    assert_eq!(json["operands"][0]["operands"][1]["value"], 30);
    assert_eq!(json["operands"][1]["op"], "is_not_null");
}

#[test]
fn test_plan_keeps_bound_literals() {
    let member = QMember::member();
    let query = select_from(&member)
        .filter(member.age.is_in([10, 20]))
        .build()
        .unwrap();

    let predicate = query.plan().predicate.as_ref().unwrap();
    assert_eq!(predicate.to_string(), "member.age in (10, 20)");
    assert!(matches!(
        predicate,
        lifequery::Expr::InList { values, .. } if values == &vec![Value::Int(10), Value::Int(20)]
    ));
}
