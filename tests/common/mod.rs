#![allow(dead_code)]

#[cfg(feature = "rusqlite")]
mod sqlite;
#[cfg(feature = "rusqlite")]
pub use sqlite::*;

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use futures_util::FutureExt;
use futures_util::future::{self, LocalBoxFuture};
use quarry::core::CompiledQuery;
use quarry::prelude::*;

/// Names of the hooks that ran, in order.
pub type HookLog = Rc<RefCell<Vec<String>>>;

pub fn hook_log() -> HookLog {
    Rc::new(RefCell::new(Vec::new()))
}

// =============================================================================
// Model classes
// =============================================================================

pub struct Person {
    log: HookLog,
}

impl Person {
    pub fn class(log: &HookLog) -> Rc<dyn ModelClass> {
        Rc::new(Person { log: log.clone() })
    }

    fn push(&self, entry: impl Into<String>) {
        self.log.borrow_mut().push(entry.into());
    }
}

impl ModelClass for Person {
    fn table_name(&self) -> &str {
        "person"
    }

    fn relation_names(&self) -> Vec<String> {
        vec!["pets".to_string(), "parent".to_string()]
    }

    fn relation(&self, name: &str) -> Option<Relation> {
        match name {
            "pets" => Some(Relation {
                name: name.to_string(),
                kind: RelationKind::HasMany,
                related: Rc::new(Pet),
            }),
            "parent" => Some(Relation {
                name: name.to_string(),
                kind: RelationKind::BelongsToOne,
                related: Person::class(&self.log),
            }),
            _ => None,
        }
    }

    fn instance_hooks(&self) -> InstanceHooks {
        InstanceHooks::BEFORE_INSERT | InstanceHooks::BEFORE_UPDATE | InstanceHooks::AFTER_FIND
    }

    fn model_before_insert(&self, model: &ModelRef, _ctx: &UserContext) -> MaybeAsync<()> {
        self.push(format!("model_before_insert:{}", model.get("name").unwrap_or_default()));
        MaybeAsync::ok(())
    }

    /// Finishes on a later poll, like a hook that waits on I/O.
    fn model_before_update(&self, _model: &ModelRef, patch: bool, _ctx: &UserContext) -> MaybeAsync<()> {
        let log = self.log.clone();
        MaybeAsync::pending(async move {
            log.borrow_mut().push(format!("model_before_update:patch={patch}"));
            Ok(())
        })
    }

    fn model_after_find(&self, model: &ModelRef, _ctx: &UserContext) -> MaybeAsync<()> {
        self.push(format!("model_after_find:{}", model.id()));
        MaybeAsync::ok(())
    }

    fn before_insert(&self, args: &StaticHookArguments) -> MaybeAsync<()> {
        self.push(format!("before_insert:{}", args.input_items().len()));
        if args.context().get("cancel").is_some() {
            args.cancel_query(None);
        }
        MaybeAsync::ok(())
    }

    fn before_find(&self, args: &StaticHookArguments) -> MaybeAsync<()> {
        self.push("before_find");
        if let Some(value) = args.context().get("cancel_find") {
            args.cancel_query(Some(QueryResult::Value(value.clone())));
        }
        MaybeAsync::ok(())
    }

    fn before_delete(&self, args: &StaticHookArguments) -> MaybeAsync<()> {
        let sql = args.as_find_query().to_sql().map(|compiled| compiled.sql);
        self.push(format!("before_delete:{}", sql.unwrap_or_default()));
        MaybeAsync::ok(())
    }
}

pub struct Pet;

impl ModelClass for Pet {
    fn table_name(&self) -> &str {
        "pet"
    }
}

/// Keyed by `(group_id, user_id)`.
pub struct Membership;

impl ModelClass for Membership {
    fn table_name(&self) -> &str {
        "membership"
    }

    fn id_columns(&self) -> &[&str] {
        &["group_id", "user_id"]
    }

    fn use_limit_in_first(&self) -> bool {
        true
    }
}

pub fn membership() -> Rc<dyn ModelClass> {
    Rc::new(Membership)
}

pub struct Invite;

impl ModelClass for Invite {
    fn table_name(&self) -> &str {
        "invite"
    }

    fn id_columns(&self) -> &[&str] {
        &["group_id", "user_id"]
    }
}

pub fn invite() -> Rc<dyn ModelClass> {
    Rc::new(Invite)
}

/// Instance hooks that finish on a later poll and change the model, and
/// static hooks that log what they see of it.
pub struct Draft {
    log: HookLog,
}

impl Draft {
    pub fn class(log: &HookLog) -> Rc<dyn ModelClass> {
        Rc::new(Draft { log: log.clone() })
    }

    fn push(&self, entry: impl Into<String>) {
        self.log.borrow_mut().push(entry.into());
    }

    fn first_input(&self, args: &StaticHookArguments, key: &str) -> String {
        args.input_items()
            .first()
            .and_then(|model| model.get(key))
            .unwrap_or_default()
            .to_string()
    }

    fn stamp(&self, model: &ModelRef, key: &'static str, value: &'static str) -> MaybeAsync<()> {
        let log = self.log.clone();
        let model = model.clone();
        MaybeAsync::pending(async move {
            tokio::task::yield_now().await;
            model.set(key, serde_json::Value::from(value));
            log.borrow_mut().push(format!("model:{key}={value}"));
            Ok(())
        })
    }
}

impl ModelClass for Draft {
    fn table_name(&self) -> &str {
        "draft"
    }

    fn instance_hooks(&self) -> InstanceHooks {
        InstanceHooks::BEFORE_INSERT
            | InstanceHooks::AFTER_INSERT
            | InstanceHooks::BEFORE_UPDATE
            | InstanceHooks::AFTER_UPDATE
    }

    fn model_before_insert(&self, model: &ModelRef, _ctx: &UserContext) -> MaybeAsync<()> {
        self.stamp(model, "name", "filled")
    }

    fn model_after_insert(&self, model: &ModelRef, _ctx: &UserContext) -> MaybeAsync<()> {
        self.stamp(model, "state", "saved")
    }

    fn model_before_update(&self, model: &ModelRef, _patch: bool, _ctx: &UserContext) -> MaybeAsync<()> {
        self.stamp(model, "name", "edited")
    }

    fn model_after_update(&self, model: &ModelRef, _patch: bool, _ctx: &UserContext) -> MaybeAsync<()> {
        self.stamp(model, "state", "updated")
    }

    fn before_insert(&self, args: &StaticHookArguments) -> MaybeAsync<()> {
        self.push(format!("before_insert:name={}", self.first_input(args, "name")));
        MaybeAsync::ok(())
    }

    fn after_insert(&self, args: &StaticHookArguments) -> MaybeAsync<Option<QueryResult>> {
        self.push(format!("after_insert:state={}", self.first_input(args, "state")));
        MaybeAsync::ok(None)
    }

    fn before_update(&self, args: &StaticHookArguments) -> MaybeAsync<()> {
        self.push(format!("before_update:name={}", self.first_input(args, "name")));
        MaybeAsync::ok(())
    }

    fn after_update(&self, args: &StaticHookArguments) -> MaybeAsync<Option<QueryResult>> {
        self.push(format!("after_update:state={}", self.first_input(args, "state")));
        MaybeAsync::ok(None)
    }
}

/// A query for `class` that builds SQL for `dialect` without a connection.
pub fn query(class: Rc<dyn ModelClass>, dialect: Dialect) -> QueryBuilder {
    let mut query = QueryBuilder::for_class(class);
    query.set_dialect(dialect);
    query
}

// =============================================================================
// Connection
// =============================================================================

/// Records every statement and answers with scripted results, in order.
/// Statements without a scripted result get an empty one.
pub struct RecordingConnection {
    dialect: Dialect,
    queries: RefCell<Vec<CompiledQuery>>,
    results: RefCell<VecDeque<RawResult>>,
}

impl RecordingConnection {
    pub fn new(dialect: Dialect) -> Rc<Self> {
        Rc::new(Self {
            dialect,
            queries: RefCell::new(Vec::new()),
            results: RefCell::new(VecDeque::new()),
        })
    }

    pub fn push_result(&self, result: RawResult) {
        self.results.borrow_mut().push_back(result);
    }

    pub fn push_rows(&self, rows: Vec<serde_json::Value>) {
        let rows = rows
            .into_iter()
            .filter_map(|row| match row {
                serde_json::Value::Object(row) => Some(row),
                _ => None,
            })
            .collect::<Vec<_>>();
        self.push_result(RawResult {
            affected: rows.len() as u64,
            rows,
            ids: Vec::new(),
        });
    }

    pub fn queries(&self) -> Vec<CompiledQuery> {
        self.queries.borrow().clone()
    }

    pub fn sql(&self) -> Vec<String> {
        self.queries.borrow().iter().map(|q| q.sql.clone()).collect()
    }
}

impl Connection for RecordingConnection {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn execute<'a>(&'a self, query: &'a CompiledQuery) -> LocalBoxFuture<'a, Result<RawResult>> {
        self.queries.borrow_mut().push(query.clone());
        let result = self.results.borrow_mut().pop_front().unwrap_or_default();
        future::ready(Ok(result)).boxed_local()
    }
}
