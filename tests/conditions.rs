mod common;

use common::{Person, RecordingConnection, hook_log, query};
use quarry::error::UndefinedKind;
use quarry::prelude::*;
use serde_json::json;

fn person(dialect: Dialect) -> QueryBuilder {
    query(Person::class(&hook_log()), dialect)
}

#[test]
fn default_select_and_table() {
    let q = person(Dialect::SQLite);
    assert_eq!(q.to_sql().unwrap().sql, r#"select "person".* from "person""#);

    let mut q = person(Dialect::SQLite);
    q.from("person as p").where_(("p.age", ">", 3));
    assert_eq!(
        q.to_sql().unwrap().sql,
        r#"select "p".* from "person" as "p" where "p"."age" > ?"#
    );
}

#[test]
fn groups_and_references() {
    let mut q = person(Dialect::PostgreSQL);
    q.where_(Arg::group(|q| {
        q.where_(("age", ">", 18)).or_where(("name", "Arnold"));
    }))
    .where_(("age", "<", ref_("person.max_age")));

    let compiled = q.to_sql().unwrap();
    assert_eq!(
        compiled.sql,
        r#"select "person".* from "person" where ("age" > $1 or "name" = $2) and "age" < "person"."max_age""#
    );
    assert_eq!(compiled.bindings, vec![json!(18), json!("Arnold")]);
}

#[test]
fn empty_groups_add_nothing() {
    let mut q = person(Dialect::SQLite);
    q.where_(Arg::group(|_| {}));
    assert_eq!(q.to_sql().unwrap().sql, r#"select "person".* from "person""#);
}

#[test]
fn json_references_and_values() {
    let mut q = person(Dialect::PostgreSQL);
    q.where_((ref_("person.meta:tags[0]").cast_text(), "=", "x"))
        .where_(("score", ">", val(3).cast_int()));

    let compiled = q.to_sql().unwrap();
    assert_eq!(
        compiled.sql,
        r##"select "person".* from "person" where CAST("person"."meta"#>>'{tags,0}' AS text) = $1 and "score" > CAST($2 AS integer)"##
    );
    assert_eq!(compiled.bindings, vec![json!("x"), json!(3)]);
}

#[test]
fn raw_identifiers_and_values() {
    let mut q = person(Dialect::SQLite);
    q.where_raw(raw("?? in (?)", ("name", vec!["a", "b"])));

    let compiled = q.to_sql().unwrap();
    assert_eq!(
        compiled.sql,
        r#"select "person".* from "person" where "name" in (?, ?)"#
    );
    assert_eq!(compiled.bindings, vec![json!("a"), json!("b")]);
}

#[test]
fn empty_in_list_matches_nothing() {
    let mut q = person(Dialect::SQLite);
    q.where_in(("id", Vec::<i32>::new()));
    assert_eq!(
        q.to_sql().unwrap().sql,
        r#"select "person".* from "person" where 1 = 0"#
    );
}

#[test]
fn json_superset_on_postgres() {
    let mut q = person(Dialect::PostgreSQL);
    q.where_json_superset_of("doc:tags", json!(["a"]))
        .or_where_json_has_any("doc", vec!["x", "y"]);

    let compiled = q.to_sql().unwrap();
    assert_eq!(
        compiled.sql,
        r##"select "person".* from "person" where ("doc"#>'{tags}')::jsonb @> $1::jsonb or "doc"#>'{}' ?| array[$2,$3]"##
    );
    assert_eq!(
        compiled.bindings,
        vec![json!(r#"["a"]"#), json!("x"), json!("y")]
    );
}

/// `or_having_in` records a `having_in` and so joins with `and`.
#[test]
fn or_having_in_is_and() {
    let mut q = person(Dialect::SQLite);
    q.select("name")
        .group_by("name")
        .having(("name", "a"))
        .or_having_in(("name", vec!["b", "c"]));

    assert!(q.has("having_in"));
    assert!(!q.has("or_having_in"));
    assert_eq!(
        q.to_sql().unwrap().sql,
        r#"select "name" from "person" group by "name" having "name" = ? and "name" in (?, ?)"#
    );
}

#[test]
fn undefined_arguments_fail() {
    let mut q = person(Dialect::SQLite);
    q.where_(("name", Arg::Undefined));

    match q.to_sql().unwrap_err() {
        QueryError::UndefinedArgument {
            operation,
            index,
            kind,
        } => {
            assert_eq!(operation, "where");
            assert_eq!(index, 1);
            assert_eq!(kind, UndefinedKind::Argument);
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn skip_undefined_drops_the_operation() {
    let mut q = person(Dialect::SQLite);
    q.skip_undefined()
        .where_(("name", Arg::Undefined))
        .where_in(("id", vec![Arg::from(1), Arg::Undefined, Arg::from(3)]));

    assert_eq!(q.operations().count(), 1);
    let compiled = q.to_sql().unwrap();
    assert_eq!(
        compiled.sql,
        r#"select "person".* from "person" where "id" in (?, ?)"#
    );
    assert_eq!(compiled.bindings, vec![json!(1), json!(3)]);
}

#[tokio::test]
async fn find_by_id_needs_an_id() {
    let conn = RecordingConnection::new(Dialect::SQLite);
    let mut q = QueryBuilder::for_class(Person::class(&hook_log()));
    q.transacting(conn.clone()).find_by_id(Arg::Undefined);

    let err = q.execute().await.unwrap_err();
    assert!(matches!(err, QueryError::UndefinedId { ref operation } if operation == "find_by_id"));
    assert!(conn.queries().is_empty());
}

#[tokio::test]
async fn find_by_id_resolves_to_one_model() {
    let log = hook_log();
    let conn = RecordingConnection::new(Dialect::SQLite);
    conn.push_rows(vec![json!({"id": 4, "name": "Brad"})]);

    let mut q = QueryBuilder::for_class(Person::class(&log));
    q.transacting(conn.clone()).find_by_id(4);

    let result = q.execute().await.unwrap();
    let model = result.model().unwrap();
    assert_eq!(model.get("name"), Some(json!("Brad")));
    assert_eq!(
        conn.sql(),
        vec![r#"select "person".* from "person" where "person"."id" = ?"#.to_string()]
    );
    assert_eq!(*log.borrow(), vec!["before_find", "model_after_find:4"]);
}

#[tokio::test]
async fn before_find_can_cancel() {
    let log = hook_log();
    let conn = RecordingConnection::new(Dialect::SQLite);

    let mut context = Row::new();
    context.insert("cancel_find".to_string(), json!(42));
    let mut q = QueryBuilder::for_class(Person::class(&log));
    q.transacting(conn.clone()).merge_context(context);

    let result = q.execute().await.unwrap();
    assert_eq!(result, QueryResult::Value(json!(42)));
    assert!(conn.queries().is_empty());
}

#[test]
fn mysql_wraps_subqueries_on_the_modified_table() {
    let log = hook_log();
    let mut adults = query(Person::class(&log), Dialect::MySQL);
    adults.select("id").where_(("age", ">", 50));

    let mut q = query(Person::class(&log), Dialect::MySQL);
    q.delete().where_in(("id", adults.clone()));
    let sql = q.to_sql().unwrap().sql;
    assert!(
        sql.starts_with(
            "delete from `person` where `id` in (select * from (select `id` from `person` where `age` > ?)"
        ),
        "{sql}"
    );
    assert!(sql.contains("`mysql_subquery_fix`"), "{sql}");

    // Reads stay as they are.
    let mut q = query(Person::class(&log), Dialect::MySQL);
    q.where_in(("id", adults));
    assert_eq!(
        q.to_sql().unwrap().sql,
        "select `person`.* from `person` where `id` in (select `id` from `person` where `age` > ?)"
    );
}

#[test]
fn find_one_and_first() {
    let mut q = person(Dialect::SQLite);
    q.find_one(("name", "Meryl"));
    assert!(q.has_wheres());
    assert!(q.has("first"));
    // `Person` does not limit `first()` queries.
    assert_eq!(
        q.to_sql().unwrap().sql,
        r#"select "person".* from "person" where "name" = ?"#
    );
}
