//! Model classes and instances as seen by the query layer.
//!
//! Model definitions, validation and JSON schemas live outside this crate.
//! The query layer only needs the table layout, the relation lookup and the
//! lifecycle hooks, which is what [`ModelClass`] describes.

use std::cell::{Ref, RefCell};
use std::fmt;
use std::rc::Rc;

use bitflags::bitflags;
use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::error::{QueryError, Result};
use crate::hooks::StaticHookArguments;
use crate::maybe_async::MaybeAsync;
use crate::query::UserContext;
use crate::result::QueryResult;

/// A plain database row or model payload.
pub type Row = Map<String, Value>;

bitflags! {
    /// The instance hooks a model class actually implements. Hooks that are
    /// not listed here are never called.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct InstanceHooks: u8 {
        const BEFORE_INSERT = 1 << 0;
        const AFTER_INSERT = 1 << 1;
        const BEFORE_UPDATE = 1 << 2;
        const AFTER_UPDATE = 1 << 3;
        const AFTER_FIND = 1 << 4;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    BelongsToOne,
    HasOne,
    HasMany,
    ManyToMany,
    HasOneThrough,
}

/// A relation of a model class.
#[derive(Clone)]
pub struct Relation {
    pub name: String,
    pub kind: RelationKind,
    pub related: Rc<dyn ModelClass>,
}

impl fmt::Debug for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Relation")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("related", &self.related.table_name())
            .finish()
    }
}

/// Static description of a model: its table, identifier, relations and
/// hooks. All hooks default to doing nothing.
pub trait ModelClass {
    fn table_name(&self) -> &str;

    fn id_columns(&self) -> &[&str] {
        &["id"]
    }

    fn relation_names(&self) -> Vec<String> {
        Vec::new()
    }

    fn relation(&self, _name: &str) -> Option<Relation> {
        None
    }

    /// Whether `first()` should add `limit 1` to find queries.
    fn use_limit_in_first(&self) -> bool {
        false
    }

    fn column_name_to_property_name(&self, column: &str) -> String {
        column.to_string()
    }

    /// Row coming from the database, into model payload
    fn parse_database_json(&self, row: Row) -> Row {
        row
    }

    /// Model payload into a row for the database
    fn format_database_json(&self, row: Row) -> Row {
        row
    }

    fn instance_hooks(&self) -> InstanceHooks {
        InstanceHooks::empty()
    }

    // ---- instance hooks ----

    fn model_before_insert(&self, _model: &ModelRef, _ctx: &UserContext) -> MaybeAsync<()> {
        MaybeAsync::ok(())
    }

    fn model_after_insert(&self, _model: &ModelRef, _ctx: &UserContext) -> MaybeAsync<()> {
        MaybeAsync::ok(())
    }

    fn model_before_update(
        &self,
        _model: &ModelRef,
        _patch: bool,
        _ctx: &UserContext,
    ) -> MaybeAsync<()> {
        MaybeAsync::ok(())
    }

    fn model_after_update(
        &self,
        _model: &ModelRef,
        _patch: bool,
        _ctx: &UserContext,
    ) -> MaybeAsync<()> {
        MaybeAsync::ok(())
    }

    fn model_after_find(&self, _model: &ModelRef, _ctx: &UserContext) -> MaybeAsync<()> {
        MaybeAsync::ok(())
    }

    // ---- static hooks ----

    fn before_find(&self, _args: &StaticHookArguments) -> MaybeAsync<()> {
        MaybeAsync::ok(())
    }

    /// `Some` replaces the query result.
    fn after_find(&self, _args: &StaticHookArguments) -> MaybeAsync<Option<QueryResult>> {
        MaybeAsync::ok(None)
    }

    fn before_insert(&self, _args: &StaticHookArguments) -> MaybeAsync<()> {
        MaybeAsync::ok(())
    }

    fn after_insert(&self, _args: &StaticHookArguments) -> MaybeAsync<Option<QueryResult>> {
        MaybeAsync::ok(None)
    }

    fn before_update(&self, _args: &StaticHookArguments) -> MaybeAsync<()> {
        MaybeAsync::ok(())
    }

    fn after_update(&self, _args: &StaticHookArguments) -> MaybeAsync<Option<QueryResult>> {
        MaybeAsync::ok(None)
    }

    fn before_delete(&self, _args: &StaticHookArguments) -> MaybeAsync<()> {
        MaybeAsync::ok(())
    }

    fn after_delete(&self, _args: &StaticHookArguments) -> MaybeAsync<Option<QueryResult>> {
        MaybeAsync::ok(None)
    }
}

/// Loaded value of a relation on a model instance.
#[derive(Debug, Clone, PartialEq)]
pub enum RelationValue {
    One(Option<ModelRef>),
    Many(Vec<ModelRef>),
}

pub struct Model {
    class: Rc<dyn ModelClass>,
    data: Row,
    relations: IndexMap<String, RelationValue>,
}

/// Shared handle to a model instance. Equality is identity.
#[derive(Clone)]
pub struct ModelRef(Rc<RefCell<Model>>);

impl ModelRef {
    pub fn new(class: Rc<dyn ModelClass>, data: Row) -> Self {
        Self(Rc::new(RefCell::new(Model {
            class,
            data,
            relations: IndexMap::new(),
        })))
    }

    /// Builds an instance from a JSON object.
    pub fn from_json(class: Rc<dyn ModelClass>, value: Value) -> Result<Self> {
        match value {
            Value::Object(data) => Ok(Self::new(class, data)),
            other => Err(QueryError::NotAModel {
                table: class.table_name().to_string(),
                found: other.to_string(),
            }),
        }
    }

    /// Builds an instance from a database row.
    pub fn from_database_json(class: Rc<dyn ModelClass>, row: Row) -> Self {
        let data = class.parse_database_json(row);
        Self::new(class, data)
    }

    pub fn class(&self) -> Rc<dyn ModelClass> {
        self.0.borrow().class.clone()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.0.borrow().data.get(key).cloned()
    }

    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.0.borrow_mut().data.insert(key.into(), value);
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.0.borrow_mut().data.remove(key)
    }

    pub fn data(&self) -> Ref<'_, Row> {
        Ref::map(self.0.borrow(), |m| &m.data)
    }

    /// Merges `values` into the instance payload.
    pub fn set_json(&self, values: Row) {
        self.0.borrow_mut().data.extend(values);
    }

    pub fn to_json(&self) -> Row {
        self.0.borrow().data.clone()
    }

    pub fn to_database_json(&self) -> Row {
        let model = self.0.borrow();
        model.class.format_database_json(model.data.clone())
    }

    /// Merges a database row into the instance.
    pub fn set_database_json(&self, row: Row) {
        let parsed = self.class().parse_database_json(row);
        self.set_json(parsed);
    }

    /// The identifier: a single value, or an array for composite ids.
    pub fn id(&self) -> Value {
        let model = self.0.borrow();
        let columns = model.class.id_columns();
        let value_of = |c: &&str| model.data.get(*c).cloned().unwrap_or(Value::Null);
        match columns {
            [single] => value_of(single),
            _ => Value::Array(columns.iter().map(value_of).collect()),
        }
    }

    /// True when every identifier column has a non-null value.
    pub fn has_id(&self) -> bool {
        let model = self.0.borrow();
        model
            .class
            .id_columns()
            .iter()
            .all(|c| model.data.get(*c).is_some_and(|v| !v.is_null()))
    }

    pub fn set_id(&self, id: Value) -> Result<()> {
        let class = self.class();
        let columns = class.id_columns();
        let values = match id {
            Value::Array(values) => values,
            single => vec![single],
        };
        if values.len() != columns.len() {
            return Err(QueryError::InvalidId {
                table: class.table_name().to_string(),
            });
        }
        let mut model = self.0.borrow_mut();
        for (column, value) in columns.iter().zip(values) {
            model.data.insert((*column).to_string(), value);
        }
        Ok(())
    }

    pub fn relation(&self, name: &str) -> Option<RelationValue> {
        self.0.borrow().relations.get(name).cloned()
    }

    pub fn set_relation(&self, name: impl Into<String>, value: RelationValue) {
        self.0.borrow_mut().relations.insert(name.into(), value);
    }

    /// Loaded relations, in the order they were set.
    pub fn relations(&self) -> Vec<(String, RelationValue)> {
        self.0
            .borrow()
            .relations
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn ptr_eq(&self, other: &ModelRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for ModelRef {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for ModelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let model = self.0.borrow();
        f.debug_struct("Model")
            .field("table", &model.class.table_name())
            .field("data", &model.data)
            .field("relations", &model.relations.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Pair;

    impl ModelClass for Pair {
        fn table_name(&self) -> &str {
            "pair"
        }

        fn id_columns(&self) -> &[&str] {
            &["a", "b"]
        }
    }

    struct Plain;

    impl ModelClass for Plain {
        fn table_name(&self) -> &str {
            "plain"
        }
    }

    fn row(value: Value) -> Row {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn composite_ids() {
        let model = ModelRef::new(Rc::new(Pair), row(json!({ "a": 1 })));
        assert!(!model.has_id());
        assert_eq!(model.id(), json!([1, null]));

        model.set_id(json!([1, 2])).unwrap();
        assert!(model.has_id());
        assert_eq!(model.id(), json!([1, 2]));

        assert!(model.set_id(json!(3)).is_err());
    }

    #[test]
    fn single_ids() {
        let model = ModelRef::new(Rc::new(Plain), Row::new());
        assert_eq!(model.id(), Value::Null);
        model.set_id(json!(7)).unwrap();
        assert_eq!(model.get("id"), Some(json!(7)));
    }

    #[test]
    fn equality_is_identity() {
        let a = ModelRef::new(Rc::new(Plain), row(json!({ "id": 1 })));
        let b = ModelRef::new(Rc::new(Plain), row(json!({ "id": 1 })));
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }
}
