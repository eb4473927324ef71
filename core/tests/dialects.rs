//! Statements rendered through the public builder API for each dialect.

use quarry_core::{Dialect, Order, SQL, SqlArg, SqlBuilder};
use serde_json::json;

fn people(dialect: Dialect) -> SqlBuilder {
    SqlBuilder::new(dialect).table("person").select(["name"])
}

#[test]
fn mssql_limits_with_top() {
    let compiled = people(Dialect::MsSql)
        .where_(SQL::ident("age"), ">", SQL::param(18))
        .limit(5)
        .to_sql()
        .unwrap();

    assert_eq!(
        compiled.sql,
        "select top (@p0) [name] from [person] where [age] > @p1"
    );
    assert_eq!(compiled.bindings, vec![json!(5), json!(18)]);
}

#[test]
fn mssql_pages_with_offset_fetch() {
    let sql = people(Dialect::MsSql)
        .order_by(SQL::ident("name"), Order::Asc)
        .offset(10)
        .limit(5)
        .to_sql()
        .unwrap()
        .sql;

    assert_eq!(
        sql,
        "select [name] from [person] order by [name] asc offset @p0 rows fetch next @p1 rows only"
    );
}

#[test]
fn limit_and_offset_elsewhere() {
    for (dialect, expected) in [
        (Dialect::SQLite, r#"select "name" from "person" limit ? offset ?"#),
        (Dialect::PostgreSQL, r#"select "name" from "person" limit $1 offset $2"#),
        (Dialect::MySQL, "select `name` from `person` limit ? offset ?"),
    ] {
        let sql = people(dialect).limit(5).offset(10).to_sql().unwrap().sql;
        assert_eq!(sql, expected, "{dialect}");
    }
}

#[test]
fn multi_row_insert_fills_missing_columns() {
    let compiled = SqlBuilder::new(Dialect::PostgreSQL)
        .table("person")
        .insert(vec![
            vec![("name".into(), SQL::param("Brad"))],
            vec![("name".into(), SQL::param("Meryl")), ("age".into(), SQL::param(70))],
        ])
        .returning(["id"])
        .to_sql()
        .unwrap();

    assert_eq!(
        compiled.sql,
        r#"insert into "person" ("name", "age") values ($1, default), ($2, $3) returning "id""#
    );
    assert_eq!(compiled.bindings, vec![json!("Brad"), json!("Meryl"), json!(70)]);
}

#[test]
fn mssql_returns_through_output() {
    let sql = SqlBuilder::new(Dialect::MsSql)
        .table("person")
        .insert(vec![vec![("name".into(), SQL::param("Brad"))]])
        .returning(["id"])
        .to_sql()
        .unwrap()
        .sql;

    assert_eq!(
        sql,
        "insert into [person] ([name]) output [inserted].[id] values (@p0)"
    );
}

#[test]
fn methods_are_called_by_name() {
    let sql = SqlBuilder::new(Dialect::MySQL)
        .call("from", vec![SqlArg::from("person")])
        .and_then(|qb| qb.call("where", vec![SqlArg::from("name"), SqlArg::from("Arnold")]))
        .unwrap()
        .to_sql()
        .unwrap()
        .sql;

    assert_eq!(sql, "select * from `person` where `name` = ?");
}

#[test]
fn unknown_methods_are_errors() {
    let err = SqlBuilder::new(Dialect::SQLite)
        .call("where_teleport", Vec::new())
        .unwrap_err();
    assert!(err.to_string().contains("where_teleport"), "{err}");
}
