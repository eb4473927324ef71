#![cfg(feature = "rusqlite")]

mod common;

use common::{Person, hook_log, invite, membership, seed_memberships, setup_db};
use quarry::operation::{WhereInCompositeOperation, WhereInStrategy};
use quarry::prelude::*;
use serde_json::{Value, json};

fn pairs(result: QueryResult) -> Vec<(Value, Value)> {
    result
        .into_models()
        .iter()
        .map(|model| {
            (
                model.get("group_id").unwrap_or_default(),
                model.get("user_id").unwrap_or_default(),
            )
        })
        .collect()
}

fn pair(group: i64, user: i64) -> (Value, Value) {
    (json!(group), json!(user))
}

#[tokio::test]
async fn or_chain_selects_the_listed_pairs() {
    let conn = setup_db();
    seed_memberships(&conn);

    let mut q = QueryBuilder::for_class(membership());
    q.transacting(conn.clone())
        .where_in_composite(vec!["group_id", "user_id"], json!([[1, 10], [2, 12], [9, 9]]))
        .order_by("group_id");

    let rows = pairs(q.execute().await.unwrap());
    assert_eq!(rows, vec![pair(1, 10), pair(2, 12)]);
}

#[tokio::test]
async fn negation_selects_the_complement() {
    let conn = setup_db();
    seed_memberships(&conn);
    let listed = json!([[1, 10], [2, 12], [3, 11]]);

    let mut inside = QueryBuilder::for_class(membership());
    inside
        .transacting(conn.clone())
        .where_in_composite(vec!["group_id", "user_id"], listed.clone());
    let inside = pairs(inside.execute().await.unwrap());

    let mut outside = QueryBuilder::for_class(membership());
    outside
        .transacting(conn.clone())
        .where_not_in_composite(vec!["group_id", "user_id"], listed);
    let outside = pairs(outside.execute().await.unwrap());

    assert_eq!(inside.len(), 3);
    assert_eq!(outside.len(), 6);
    assert!(inside.iter().all(|row| !outside.contains(row)));
}

#[tokio::test]
async fn empty_pairs_delete_nothing() {
    let conn = setup_db();
    seed_memberships(&conn);

    let mut delete = QueryBuilder::for_class(membership());
    delete
        .transacting(conn.clone())
        .delete()
        .where_in_composite(vec!["group_id", "user_id"], json!([]));
    assert_eq!(delete.execute().await.unwrap().count(), Some(0));

    let mut rest = QueryBuilder::for_class(membership());
    rest.transacting(conn.clone())
        .where_not_in_composite(vec!["group_id", "user_id"], json!([]));
    assert_eq!(pairs(rest.execute().await.unwrap()).len(), 9);
}

#[tokio::test]
async fn short_pairs_are_rejected() {
    let conn = setup_db();
    seed_memberships(&conn);

    let mut q = QueryBuilder::for_class(membership());
    q.transacting(conn.clone())
        .where_in_composite(vec!["group_id", "user_id"], json!([[1]]));
    assert!(matches!(
        q.execute().await.unwrap_err(),
        QueryError::CompositeDimensions
    ));
}

/// Row values against a subquery and the `or` chain over the same pairs
/// select the same rows.
#[tokio::test]
async fn tuple_subquery_agrees_with_or_chain() {
    let conn = setup_db();
    seed_memberships(&conn);
    conn.conn()
        .execute_batch("insert into invite (group_id, user_id) values (1, 11), (3, 12);")
        .unwrap();

    let mut invited = QueryBuilder::for_class(invite());
    invited.select(("group_id", "user_id"));

    let mut by_subquery = QueryBuilder::for_class(membership());
    by_subquery
        .transacting(conn.clone())
        .add_operation(
            WhereInCompositeOperation::new("where_in_composite", WhereInStrategy::Tuple, false),
            vec![Arg::from(vec!["group_id", "user_id"]), Arg::from(invited)],
        )
        .order_by("group_id");
    assert_eq!(
        by_subquery.to_sql().unwrap().sql,
        r#"select "membership".* from "membership" where ("group_id", "user_id") in (select "group_id", "user_id" from "invite") order by "group_id" asc"#
    );

    let mut by_pairs = QueryBuilder::for_class(membership());
    by_pairs
        .transacting(conn.clone())
        .where_in_composite(vec!["group_id", "user_id"], json!([[1, 11], [3, 12]]))
        .order_by("group_id");

    let expected = vec![pair(1, 11), pair(3, 12)];
    assert_eq!(pairs(by_subquery.execute().await.unwrap()), expected);
    assert_eq!(pairs(by_pairs.execute().await.unwrap()), expected);
}

#[tokio::test]
async fn or_chain_needs_literal_values() {
    let conn = setup_db();

    let mut invited = QueryBuilder::for_class(invite());
    invited.select(("group_id", "user_id"));

    let mut q = QueryBuilder::for_class(membership());
    q.transacting(conn.clone())
        .where_in_composite(vec!["group_id", "user_id"], invited);

    assert!(matches!(
        q.execute().await.unwrap_err(),
        QueryError::SqliteMultiColumnWhereIn
    ));
}

#[tokio::test]
async fn insert_find_and_patch() {
    let log = hook_log();
    let conn = setup_db();

    let mut insert = QueryBuilder::for_class(Person::class(&log));
    insert
        .transacting(conn.clone())
        .insert(json!({"name": "Jennifer", "age": 24}));
    let inserted = insert.execute().await.unwrap();
    let id = inserted.model().unwrap().id();
    assert_eq!(id, json!(1));

    let mut patch = QueryBuilder::for_class(Person::class(&log));
    patch
        .transacting(conn.clone())
        .patch(json!({"age": 25}))
        .where_(("id", id.clone()));
    assert_eq!(patch.execute().await.unwrap().count(), Some(1));

    let mut find = QueryBuilder::for_class(Person::class(&log));
    find.transacting(conn.clone()).find_by_id(id);
    let found = find.execute().await.unwrap();
    let model = found.model().unwrap();
    assert_eq!(model.get("name"), Some(json!("Jennifer")));
    assert_eq!(model.get("age"), Some(json!(25)));

    assert_eq!(
        *log.borrow(),
        vec![
            "model_before_insert:\"Jennifer\"",
            "before_insert:1",
            "model_before_update:patch=true",
            "before_find",
            "model_after_find:1",
        ]
    );
}

#[tokio::test]
async fn find_by_id_on_a_composite_key() {
    let conn = setup_db();
    seed_memberships(&conn);

    let mut q = QueryBuilder::for_class(membership());
    q.transacting(conn.clone()).find_by_id(vec![2, 11]);

    let result = q.execute().await.unwrap();
    let model = result.model().unwrap();
    assert_eq!(model.get("role"), Some(json!("member")));
    assert_eq!(model.id(), json!([2, 11]));
}
