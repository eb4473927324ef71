//! The ORM query builder.
//!
//! A [`QueryBuilder`] is a tree of recorded [operations](crate::operation).
//! Nothing touches SQL until the query is built: then the operations apply
//! themselves to a [`SqlBuilder`](quarry_core::SqlBuilder) one hook wave at a
//! time (see [`execute`]).

mod context;
mod execute;
mod methods;
mod selector;
mod tree;

use std::cell::{Ref, RefCell, RefMut};
use std::ops::ControlFlow;
use std::rc::Rc;

use hashbrown::HashSet;
use quarry_core::Dialect;

use crate::args::Arg;
use crate::cache::ExpressionCaches;
use crate::connection::Connection;
use crate::error::{QueryError, Result};
use crate::model::{ModelClass, Row};
use crate::operation::{
    AsFind, DeleteOperation, Hook, InsertOperation, Operation, UpdateOperation,
};
use crate::result::QueryResult;

pub use context::{ChildQueryOptions, InternalOptions, QueryContext, UserContext};
pub use selector::Selector;
pub use tree::OpId;

use tree::OperationTree;

/// The operation whose hook is running and the hook.
#[derive(Debug, Clone, Copy)]
struct Frame {
    id: OpId,
    hook: Hook,
}

/// A value the query was resolved or rejected with before reaching the
/// database.
enum Resolution {
    Resolved(QueryResult),
    Rejected(QueryError),
}

impl Resolution {
    fn duplicate(&self) -> Self {
        match self {
            Resolution::Resolved(value) => Resolution::Resolved(value.clone()),
            Resolution::Rejected(error) => Resolution::Rejected(error.duplicate()),
        }
    }
}

pub struct QueryBuilder {
    model_class: Rc<dyn ModelClass>,
    tree: OperationTree,
    context: Rc<RefCell<QueryContext>>,
    partial: bool,
    active: Vec<Frame>,
    resolution: Rc<RefCell<Option<Resolution>>>,
}

impl QueryBuilder {
    pub fn for_class(model_class: Rc<dyn ModelClass>) -> Self {
        Self {
            model_class,
            tree: OperationTree::default(),
            context: Rc::default(),
            partial: false,
            active: Vec::new(),
            resolution: Rc::new(RefCell::new(None)),
        }
    }

    pub fn model_class(&self) -> &Rc<dyn ModelClass> {
        &self.model_class
    }

    // =========================================================================
    // Context
    // =========================================================================

    /// The values passed to every hook of this query.
    pub fn context(&self) -> UserContext {
        self.context.borrow().user.clone()
    }

    /// Merges `values` into the user context. A child query that shares
    /// this context sees the change, and so does its parent.
    pub fn merge_context(&mut self, values: Row) -> &mut Self {
        let mut context = self.context.borrow_mut();
        context.user = context.user.merged(&values);
        drop(context);
        self
    }

    pub fn clear_context(&mut self) -> &mut Self {
        self.context.borrow_mut().user = UserContext::default();
        self
    }

    pub fn internal_context(&self) -> Ref<'_, QueryContext> {
        self.context.borrow()
    }

    pub fn internal_options(&self) -> InternalOptions {
        self.context.borrow().options.clone()
    }

    pub fn internal_options_mut(&mut self) -> RefMut<'_, InternalOptions> {
        RefMut::map(self.context.borrow_mut(), |context| &mut context.options)
    }

    pub fn caches(&self) -> Rc<ExpressionCaches> {
        self.context.borrow().caches.clone()
    }

    /// Drops operations given an undefined argument instead of failing.
    pub fn skip_undefined(&mut self) -> &mut Self {
        self.context.borrow_mut().options.skip_undefined = true;
        self
    }

    pub fn is_internal(&self) -> bool {
        self.context.borrow().options.is_internal_query
    }

    /// Makes this a query run on behalf of `parent`.
    ///
    /// A forked child gets a copy of the parent's context. Otherwise the two
    /// share one context, and a change made through either builder shows in
    /// both. This query's own user values are laid over the parent's, and
    /// the parent's connection is used when there is one.
    pub fn child_query_of(&mut self, parent: &QueryBuilder, options: ChildQueryOptions) -> &mut Self {
        let (own_user, own_connection) = {
            let mut own = self.context.borrow_mut();
            (std::mem::take(&mut own.user), own.connection.take())
        };

        self.context = if options.fork {
            Rc::new(RefCell::new(parent.context.borrow().clone()))
        } else {
            parent.context.clone()
        };

        let mut context = self.context.borrow_mut();
        if options.internal {
            context.options.is_internal_query = true;
        }
        if !own_user.is_empty() {
            context.user = context.user.merged(own_user.values());
        }
        if own_connection.is_some() && (options.fork || context.connection.is_none()) {
            context.connection = own_connection;
        }
        drop(context);
        self
    }

    /// Makes this a subquery of `parent`. Partial builders see the
    /// parent's table names and aliases.
    pub fn subquery_of(&mut self, parent: &QueryBuilder) -> &mut Self {
        if Rc::ptr_eq(&self.context, &parent.context) {
            return self;
        }
        let parent_context = parent.context.borrow();
        let mut context = self.context.borrow_mut();
        if self.partial {
            context.merge_maps_from(&parent_context);
        }
        if context.connection.is_none() {
            context.connection = parent_context.connection.clone();
        }
        if context.dialect.is_none() {
            context.dialect = Some(parent_context.dialect());
        }
        drop(context);
        self
    }

    /// A partial builder only holds a fragment, like the conditions of a
    /// `where` group, and does not get a default table or select.
    pub fn set_partial(&mut self, partial: bool) -> &mut Self {
        self.partial = partial;
        self
    }

    pub fn is_partial(&self) -> bool {
        self.partial
    }

    // =========================================================================
    // Connection
    // =========================================================================

    /// Runs the query on `connection`, e.g. a transaction.
    pub fn transacting(&mut self, connection: Rc<dyn Connection>) -> &mut Self {
        self.context.borrow_mut().connection = Some(connection);
        self
    }

    pub fn connection(&self) -> Option<Rc<dyn Connection>> {
        self.context.borrow().connection.clone()
    }

    /// The dialect to build for when there is no connection.
    pub fn set_dialect(&mut self, dialect: Dialect) -> &mut Self {
        self.context.borrow_mut().dialect = Some(dialect);
        self
    }

    pub fn dialect(&self) -> Dialect {
        self.context.borrow().dialect()
    }

    // =========================================================================
    // Tables
    // =========================================================================

    /// The table name to use for `table`.
    pub fn table_name_for(&self, table: &str) -> String {
        self.context
            .borrow()
            .table_map
            .get(table)
            .cloned()
            .unwrap_or_else(|| table.to_string())
    }

    pub fn set_table_name_for(&mut self, table: &str, name: &str) -> &mut Self {
        self.context.borrow_mut().set_table_name(table, name);
        self
    }

    pub fn alias_for(&self, table: &str) -> Option<String> {
        self.context.borrow().alias_map.get(table).cloned()
    }

    pub fn set_alias_for(&mut self, table: &str, alias: &str) -> &mut Self {
        self.context.borrow_mut().set_alias(table, alias);
        self
    }

    /// The name `class`'s table is referred to by: its alias, or its table
    /// name.
    pub fn table_ref_for(&self, class: &dyn ModelClass) -> String {
        let table = class.table_name();
        self.alias_for(table)
            .unwrap_or_else(|| self.table_name_for(table))
    }

    pub fn table_name(&self) -> String {
        self.table_name_for(self.model_class.table_name())
    }

    pub fn table_ref(&self) -> String {
        self.table_ref_for(self.model_class.as_ref())
    }

    /// `table.id`, or an array of them for composite identifiers.
    pub fn full_id_column(&self) -> Arg {
        let table = self.table_ref();
        match self.model_class.id_columns() {
            [single] => Arg::from(format!("{table}.{single}")),
            columns => Arg::Array(
                columns
                    .iter()
                    .map(|c| Arg::from(format!("{table}.{c}")))
                    .collect(),
            ),
        }
    }

    // =========================================================================
    // Resolution
    // =========================================================================

    /// Makes the query resolve to `value` without hitting the database.
    /// Checked after each `on_before*` wave.
    pub fn resolve(&self, value: QueryResult) {
        *self.resolution.borrow_mut() = Some(Resolution::Resolved(value));
    }

    /// Makes the query fail with `error`. The first rejection wins.
    pub fn reject(&self, error: QueryError) {
        let mut resolution = self.resolution.borrow_mut();
        if !matches!(*resolution, Some(Resolution::Rejected(_))) {
            *resolution = Some(Resolution::Rejected(error));
        }
    }

    pub fn has_resolution(&self) -> bool {
        self.resolution.borrow().is_some()
    }

    fn take_resolution(&self) -> Option<Result<QueryResult>> {
        self.resolution.borrow_mut().take().map(|resolution| match resolution {
            Resolution::Resolved(value) => Ok(value),
            Resolution::Rejected(error) => Err(error),
        })
    }

    fn check_rejection(&self) -> Result<()> {
        match &*self.resolution.borrow() {
            Some(Resolution::Rejected(error)) => Err(error.duplicate()),
            _ => Ok(()),
        }
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Adds `op` after the existing operations. Inside a hook the operation
    /// becomes a child of the operation whose hook is running.
    pub fn add_operation(&mut self, op: impl Operation, args: Vec<Arg>) -> &mut Self {
        self.add_operation_using(Box::new(op), args, false);
        self
    }

    /// Like [`add_operation`](Self::add_operation) but before every other
    /// root operation.
    pub fn add_operation_to_front(&mut self, op: impl Operation, args: Vec<Arg>) -> &mut Self {
        self.add_operation_using(Box::new(op), args, true);
        self
    }

    fn add_operation_using(
        &mut self,
        op: Box<dyn Operation>,
        args: Vec<Arg>,
        front: bool,
    ) -> Option<OpId> {
        let parent = self.active.last().copied();
        let id = self.tree.alloc(op);

        let added = match self.begin_hook(id, Hook::OnAdd) {
            Some(mut op) => {
                let added = op.on_add(self, args);
                self.end_hook(id, op);
                added
            }
            None => Ok(true),
        };

        match added {
            Ok(true) => {
                match parent {
                    Some(frame) => self.tree.attach(frame.id, frame.hook, id),
                    None if front => self.tree.unshift_root(id),
                    None => self.tree.push_root(id),
                }
                Some(id)
            }
            Ok(false) => {
                self.tree.remove(id);
                None
            }
            Err(error) => {
                self.tree.remove(id);
                self.reject(error);
                None
            }
        }
    }

    /// Checks the operation out of the tree for a call of `hook`. Children
    /// added by an earlier call of the same hook are dropped first.
    fn begin_hook(&mut self, id: OpId, hook: Hook) -> Option<Box<dyn Operation>> {
        if !self.tree.is_callable(id, hook) {
            return None;
        }
        self.tree.remove_children_added_by(id, hook);
        let op = self.tree.checkout(id)?;
        quarry_core::quarry_trace_hook!(hook, op.name());
        self.active.push(Frame { id, hook });
        Some(op)
    }

    fn end_hook(&mut self, id: OpId, op: Box<dyn Operation>) {
        self.active.pop();
        self.tree.checkin(id, op);
    }

    /// The operations in tree order, parents before children. Operations
    /// running a hook right now are left out.
    pub fn operations(&self) -> impl Iterator<Item = &dyn Operation> + '_ {
        self.tree
            .pre_order()
            .into_iter()
            .filter_map(|id| self.tree.get(id))
    }

    fn matching_ids(&self, selector: &Selector, matches: bool) -> Vec<OpId> {
        let mut ids = Vec::new();
        self.tree.walk(&mut |id, node| {
            if selector.matches(node) == matches {
                ids.push(id);
            }
            ControlFlow::Continue(())
        });
        ids
    }

    /// Calls `f` for the operations `selector` matches (or, with
    /// `matches == false`, does not match) until `f` returns `false`.
    pub fn for_each_operation(
        &self,
        selector: impl Into<Selector>,
        matches: bool,
        mut f: impl FnMut(&dyn Operation) -> bool,
    ) {
        for id in self.matching_ids(&selector.into(), matches) {
            if let Some(op) = self.tree.get(id)
                && !f(op)
            {
                break;
            }
        }
    }

    pub fn find_operation(&self, selector: impl Into<Selector>) -> Option<&dyn Operation> {
        let id = self.find_operation_id(selector)?;
        self.tree.get(id)
    }

    pub fn find_last_operation(&self, selector: impl Into<Selector>) -> Option<&dyn Operation> {
        let id = *self.matching_ids(&selector.into(), true).last()?;
        self.tree.get(id)
    }

    pub fn find_operation_id(&self, selector: impl Into<Selector>) -> Option<OpId> {
        let selector = selector.into();
        let mut found = None;
        self.tree.walk(&mut |id, node| {
            if selector.matches(node) {
                found = Some(id);
                return ControlFlow::Break(());
            }
            ControlFlow::Continue(())
        });
        found
    }

    /// Mutable access to the first operation of type `T`.
    pub fn find_operation_mut<T: Operation>(&mut self) -> Option<&mut T> {
        let id = self.find_operation_id(Selector::kind::<T>())?;
        self.tree.get_mut(id)?.downcast_mut::<T>()
    }

    /// `true` when every operation matches `selector`.
    pub fn every_operation(&self, selector: impl Into<Selector>) -> bool {
        self.matching_ids(&selector.into(), false).is_empty()
    }

    pub fn has(&self, selector: impl Into<Selector>) -> bool {
        self.find_operation_id(selector).is_some()
    }

    /// Removes the matched operations together with everything they added.
    pub fn clear(&mut self, selector: impl Into<Selector>) -> &mut Self {
        let matched = self.matching_ids(&selector.into(), true);
        let set: HashSet<OpId> = matched.iter().copied().collect();
        for id in matched {
            if !self.tree.is_ancestor_in_set(id, &set) {
                self.tree.remove(id);
            }
        }
        self
    }

    /// Copies the operations of `source` that `selector` matches to the
    /// end of this builder, as root operations.
    pub fn copy_from(&mut self, source: &QueryBuilder, selector: impl Into<Selector>) -> &mut Self {
        let matched = source.matching_ids(&selector.into(), true);
        let set: HashSet<OpId> = matched.iter().copied().collect();
        for id in matched {
            if !source.tree.is_ancestor_in_set(id, &set) {
                self.tree.copy_root_from(&source.tree, id);
            }
        }
        self
    }

    pub fn is_find(&self) -> bool {
        !(self.is_insert()
            || self.is_update()
            || self.is_delete()
            || self.is_relate()
            || self.is_unrelate())
    }

    pub fn is_insert(&self) -> bool {
        self.has(Selector::kind::<InsertOperation>())
    }

    pub fn is_update(&self) -> bool {
        self.has(Selector::kind::<UpdateOperation>())
    }

    pub fn is_delete(&self) -> bool {
        self.has(Selector::kind::<DeleteOperation>())
    }

    pub fn is_relate(&self) -> bool {
        self.has("relate")
    }

    pub fn is_unrelate(&self) -> bool {
        self.has("unrelate")
    }

    pub fn has_wheres(&self) -> bool {
        self.has(Selector::where_())
    }

    pub fn has_selects(&self) -> bool {
        self.has(Selector::select())
    }

    pub fn has_order_bys(&self) -> bool {
        self.has(Selector::order_by())
    }

    pub fn has_joins(&self) -> bool {
        self.has(Selector::join())
    }

    /// A copy of this query where every operation is replaced by its find
    /// equivalent. Writes are dropped.
    pub fn to_find_query(&self) -> QueryBuilder {
        self.clone().into_find_query()
    }

    pub(crate) fn into_find_query(mut self) -> Self {
        let mut replace = Vec::new();
        let mut remove = Vec::new();
        for id in self.tree.pre_order() {
            let Some(op) = self.tree.get(id) else {
                continue;
            };
            match op.as_find(&self) {
                AsFind::Keep => {}
                AsFind::Drop => remove.push(id),
                AsFind::Replace(find) => replace.push((id, find)),
            }
        }
        for id in remove {
            self.tree.remove(id);
        }
        for (id, find) in replace {
            if self.tree.contains(id) {
                self.tree.replace(id, find);
            }
        }
        self
    }

    fn clone_inner(&self, current: Option<(OpId, &dyn Operation)>) -> Self {
        Self {
            model_class: self.model_class.clone(),
            tree: self.tree.deep_clone(current),
            context: Rc::new(RefCell::new(self.context.borrow().clone())),
            partial: self.partial,
            active: Vec::new(),
            resolution: Rc::new(RefCell::new(
                self.resolution.borrow().as_ref().map(Resolution::duplicate),
            )),
        }
    }

    /// Copies the builder from inside a hook of `current`, which is checked
    /// out of the tree while its hook runs. Resolving the copy resolves this
    /// builder.
    pub(crate) fn snapshot_in_hook(&self, current: &dyn Operation) -> (Self, Option<OpId>) {
        let id = self.active.last().map(|frame| frame.id);
        let mut snapshot = self.clone_inner(id.map(|id| (id, current)));
        snapshot.resolution = self.resolution.clone();
        (snapshot, id)
    }

    pub(crate) fn operation(&self, id: OpId) -> Option<&dyn Operation> {
        self.tree.get(id)
    }
}

impl Clone for QueryBuilder {
    fn clone(&self) -> Self {
        self.clone_inner(None)
    }
}

impl std::fmt::Debug for QueryBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let operations: Vec<&str> = self
            .tree
            .pre_order()
            .into_iter()
            .filter_map(|id| self.tree.node(id).map(|node| node.name.as_str()))
            .collect();
        f.debug_struct("QueryBuilder")
            .field("table", &self.model_class.table_name())
            .field("operations", &operations)
            .field("partial", &self.partial)
            .field("context", &*self.context.borrow())
            .finish()
    }
}
