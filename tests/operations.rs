mod common;

use common::{Person, hook_log, query};
use quarry::Result;
use quarry::core::SqlBuilder;
use quarry::operation::{Hooks, KnexOperation, Operation};
use quarry::prelude::*;
use serde_json::json;

/// Adds `where age > 18` from its `on_build` hook.
#[derive(Clone)]
struct AdultsOnly {
    name: String,
}

impl AdultsOnly {
    fn new() -> Self {
        Self {
            name: "adults_only".to_string(),
        }
    }
}

impl Operation for AdultsOnly {
    fn name(&self) -> &str {
        &self.name
    }

    fn hooks(&self) -> Hooks {
        Hooks::ON_BUILD
    }

    fn clone_op(&self) -> Box<dyn Operation> {
        Box::new(self.clone())
    }

    fn on_build(&mut self, builder: &mut QueryBuilder) -> Result<()> {
        builder.where_(("age", ">", 18));
        Ok(())
    }
}

/// Takes part in no lifecycle wave at all.
#[derive(Clone)]
struct Marker {
    name: String,
}

impl Operation for Marker {
    fn name(&self) -> &str {
        &self.name
    }

    fn hooks(&self) -> Hooks {
        Hooks::empty()
    }

    fn clone_op(&self) -> Box<dyn Operation> {
        Box::new(self.clone())
    }

    fn on_build_knex(&mut self, knex: SqlBuilder, _builder: &QueryBuilder) -> Result<SqlBuilder> {
        Ok(knex.limit(1))
    }
}

#[test]
fn operations_added_in_a_hook_belong_to_it() {
    let log = hook_log();
    let mut q = query(Person::class(&log), Dialect::SQLite);
    q.add_operation(AdultsOnly::new(), Vec::new());
    q.where_(("name", "Jennifer"));

    q.to_knex_query().unwrap();
    let names: Vec<&str> = q.operations().map(|op| op.name()).collect();
    assert_eq!(names, vec!["adults_only", "where", "where"]);

    // Removing the operation takes the condition it added with it.
    q.clear(Selector::kind::<AdultsOnly>());
    let compiled = q.to_sql().unwrap();
    assert_eq!(
        compiled.sql,
        r#"select "person".* from "person" where "name" = ?"#
    );
    assert_eq!(compiled.bindings, vec![json!("Jennifer")]);
}

#[test]
fn rerunning_a_hook_replaces_what_it_added() {
    let log = hook_log();
    let mut q = query(Person::class(&log), Dialect::SQLite);
    q.add_operation(AdultsOnly::new(), Vec::new());

    q.to_knex_query().unwrap();
    q.to_knex_query().unwrap();

    assert_eq!(q.operations().filter(|op| op.name() == "where").count(), 1);
    assert_eq!(
        q.to_sql().unwrap().sql,
        r#"select "person".* from "person" where "age" > ?"#
    );
}

#[test]
fn operations_without_hooks_are_kept_but_never_called() {
    let log = hook_log();
    let mut q = query(Person::class(&log), Dialect::SQLite);
    q.add_operation(
        Marker {
            name: "marker".to_string(),
        },
        Vec::new(),
    );

    assert!(q.has("marker"));
    assert_eq!(q.to_sql().unwrap().sql, r#"select "person".* from "person""#);
}

#[test]
fn selectors() {
    let log = hook_log();
    let mut q = query(Person::class(&log), Dialect::SQLite);
    q.select("name")
        .where_(("age", ">", 10))
        .or_where(("name", "Sylvester"))
        .order_by("name")
        .left_join(("pet", "pet.owner_id", "person.id"));

    assert!(q.has_selects());
    assert!(q.has_wheres());
    assert!(q.has_order_bys());
    assert!(q.has_joins());
    assert!(q.has(Selector::kind::<KnexOperation>()));
    assert_eq!(q.find_operation(Selector::where_()).unwrap().name(), "where");
    assert_eq!(q.find_last_operation(Selector::where_()).unwrap().name(), "or_where");
    assert!(!q.every_operation(Selector::where_()));

    let mut seen = Vec::new();
    q.for_each_operation(Selector::where_(), false, |op| {
        seen.push(op.name().to_string());
        true
    });
    assert_eq!(seen, vec!["select", "order_by", "left_join"]);

    q.clear_where().clear_order();
    assert!(!q.has_wheres());
    assert!(!q.has_order_bys());
    assert!(q.has_selects());
}

#[test]
fn copy_from_copies_matching_operations_once() {
    let log = hook_log();
    let mut source = query(Person::class(&log), Dialect::SQLite);
    source.add_operation(AdultsOnly::new(), Vec::new());
    source.where_(("name", "Arnold")).order_by("age");
    source.to_knex_query().unwrap();

    let mut target = query(Person::class(&log), Dialect::SQLite);
    target.copy_from(&source, Selector::predicate(|op| op.name() != "order_by"));

    assert!(!target.has_order_bys());
    assert_eq!(target.operations().count(), 3);
    assert_eq!(
        target.to_sql().unwrap().sql,
        r#"select "person".* from "person" where "age" > ? and "name" = ?"#
    );
}

#[test]
fn clones_are_independent() {
    let log = hook_log();
    let mut q = query(Person::class(&log), Dialect::SQLite);
    q.where_(("age", ">", 10));

    let mut copy = q.clone();
    copy.where_(("name", "Meryl"));

    assert_eq!(q.operations().count(), 1);
    assert_eq!(copy.operations().count(), 2);
}

#[test]
fn context_is_shared_with_children() {
    let log = hook_log();
    let mut parent = query(Person::class(&log), Dialect::SQLite);
    let mut values = Row::new();
    values.insert("tenant".to_string(), json!(7));
    parent.merge_context(values);

    let mut child = QueryBuilder::for_class(Person::class(&log));
    child.child_query_of(&parent, ChildQueryOptions::default());

    assert_eq!(child.context().get("tenant"), Some(&json!(7)));
    assert_eq!(child.dialect(), Dialect::SQLite);
}

#[test]
fn shared_context_changes_reach_the_parent() {
    let log = hook_log();
    let parent = query(Person::class(&log), Dialect::SQLite);

    let mut child = QueryBuilder::for_class(Person::class(&log));
    child.child_query_of(&parent, ChildQueryOptions::default().internal());
    let mut values = Row::new();
    values.insert("seen_by_child".to_string(), json!(true));
    child.merge_context(values);

    assert_eq!(parent.context().get("seen_by_child"), Some(&json!(true)));
    assert!(parent.is_internal());
}

#[test]
fn forked_context_changes_stay_in_the_child() {
    let log = hook_log();
    let parent = query(Person::class(&log), Dialect::SQLite);

    let mut child = QueryBuilder::for_class(Person::class(&log));
    child.child_query_of(&parent, ChildQueryOptions::fork().internal());
    let mut values = Row::new();
    values.insert("seen_by_child".to_string(), json!(true));
    child.merge_context(values);

    assert_eq!(child.context().get("seen_by_child"), Some(&json!(true)));
    assert_eq!(parent.context().get("seen_by_child"), None);
    assert!(child.is_internal());
    assert!(!parent.is_internal());
}
