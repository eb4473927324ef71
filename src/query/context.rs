use std::fmt;
use std::rc::Rc;

use hashbrown::HashMap;
use serde_json::Value;

use crate::cache::ExpressionCaches;
use crate::connection::Connection;
use crate::model::Row;
use quarry_core::Dialect;

/// Caller supplied values passed to every model hook of a query.
///
/// Merging never mutates the bag in place: it produces a new one, so
/// builders that share an older bag keep seeing it unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserContext(Rc<Row>);

impl UserContext {
    pub fn new(values: Row) -> Self {
        Self(Rc::new(values))
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn values(&self) -> &Row {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// A new bag with `values` laid over this one.
    pub fn merged(&self, values: &Row) -> Self {
        let mut merged = (*self.0).clone();
        merged.extend(values.iter().map(|(k, v)| (k.clone(), v.clone())));
        Self::new(merged)
    }
}

/// Internal flags of a query. Deep copied whenever a context is cloned.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InternalOptions {
    /// Drop operations that were given an undefined argument instead of
    /// failing
    pub skip_undefined: bool,
    pub keep_implicit_joins: bool,
    /// The query was issued by the ORM itself
    pub is_internal_query: bool,
    pub dont_call_find_hooks: bool,
    pub call_after_find_deeply: bool,
    pub debug: bool,
}

/// How [`child_query_of`](super::QueryBuilder::child_query_of) links a
/// query to its parent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChildQueryOptions {
    /// Copy the parent's context instead of sharing it
    pub fork: bool,
    /// Mark the context as used by a query the ORM issued itself
    pub internal: bool,
}

impl ChildQueryOptions {
    pub fn fork() -> Self {
        Self {
            fork: true,
            internal: false,
        }
    }

    pub fn internal(mut self) -> Self {
        self.internal = true;
        self
    }
}

/// Per builder execution state.
///
/// Cloning shares the user context, the connection, the lookup maps and the
/// caches, and copies the options.
#[derive(Clone, Default)]
pub struct QueryContext {
    pub user: UserContext,
    pub options: InternalOptions,
    pub connection: Option<Rc<dyn Connection>>,
    /// Used when there is no connection to probe
    pub dialect: Option<Dialect>,
    /// table -> alias
    pub alias_map: Rc<HashMap<String, String>>,
    /// table -> table name to use instead
    pub table_map: Rc<HashMap<String, String>>,
    pub caches: Rc<ExpressionCaches>,
}

impl QueryContext {
    pub fn dialect(&self) -> Dialect {
        match &self.connection {
            Some(connection) => connection.dialect(),
            None => self.dialect.unwrap_or_default(),
        }
    }

    pub(crate) fn set_alias(&mut self, table: &str, alias: &str) {
        Rc::make_mut(&mut self.alias_map).insert(table.to_string(), alias.to_string());
    }

    pub(crate) fn set_table_name(&mut self, table: &str, name: &str) {
        Rc::make_mut(&mut self.table_map).insert(table.to_string(), name.to_string());
    }

    /// Parent entries first, ours on top.
    pub(crate) fn merge_maps_from(&mut self, parent: &QueryContext) {
        self.alias_map = Rc::new(merge_maps(&parent.alias_map, &self.alias_map));
        self.table_map = Rc::new(merge_maps(&parent.table_map, &self.table_map));
    }
}

fn merge_maps(
    parent: &HashMap<String, String>,
    child: &HashMap<String, String>,
) -> HashMap<String, String> {
    let mut merged = parent.clone();
    merged.extend(child.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged
}

impl fmt::Debug for QueryContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryContext")
            .field("user", &self.user)
            .field("options", &self.options)
            .field("dialect", &self.dialect())
            .field("has_connection", &self.connection.is_some())
            .field("alias_map", &self.alias_map)
            .field("table_map", &self.table_map)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn merging_user_context_leaves_the_original_alone() {
        let a = UserContext::new(row(json!({ "x": 1 })));
        let b = a.merged(&row(json!({ "y": 2 })));

        assert_eq!(a.get("y"), None);
        assert_eq!(b.get("x"), Some(&json!(1)));
        assert_eq!(b.get("y"), Some(&json!(2)));
    }

    #[test]
    fn clones_share_maps_until_written() {
        let mut ctx = QueryContext::default();
        ctx.set_alias("person", "p");

        let mut clone = ctx.clone();
        assert!(Rc::ptr_eq(&ctx.alias_map, &clone.alias_map));

        clone.set_alias("pet", "x");
        assert_eq!(ctx.alias_map.get("pet"), None);
        assert_eq!(clone.alias_map.get("person").map(String::as_str), Some("p"));
    }

    #[test]
    fn options_are_copied() {
        let ctx = QueryContext::default();
        let mut clone = ctx.clone();
        clone.options.skip_undefined = true;
        assert!(!ctx.options.skip_undefined);
    }

    #[test]
    fn child_maps_override_parent_maps() {
        let mut parent = QueryContext::default();
        parent.set_alias("person", "p");
        parent.set_alias("pet", "x");

        let mut child = QueryContext::default();
        child.set_alias("pet", "y");
        child.merge_maps_from(&parent);

        assert_eq!(child.alias_map.get("person").map(String::as_str), Some("p"));
        assert_eq!(child.alias_map.get("pet").map(String::as_str), Some("y"));
    }
}
