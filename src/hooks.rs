//! Arguments passed to the static hooks of a model class.

use std::rc::Rc;

use crate::connection::Connection;
use crate::maybe_async::MaybeAsync;
use crate::model::{InstanceHooks, ModelClass, ModelRef, Relation};
use crate::operation::{ModelOptions, Operation};
use crate::query::{OpId, QueryBuilder, UserContext};
use crate::result::QueryResult;

/// What a static hook (`before_insert`, `after_find`, ...) gets to see.
///
/// The arguments own a copy of the running query, taken when the operation
/// whose hook is running prepared the call. Values are looked up from that
/// operation first, then from the rest of the copy. Models are shared with
/// the query, so changes made by instance hooks are visible here.
pub struct StaticHookArguments {
    builder: QueryBuilder,
    current: Option<OpId>,
    context: UserContext,
    result: Option<QueryResult>,
}

impl StaticHookArguments {
    pub(crate) fn new(builder: &QueryBuilder, current: &dyn Operation) -> Self {
        let (builder, current) = builder.snapshot_in_hook(current);
        Self {
            context: builder.context(),
            builder,
            current,
            result: None,
        }
    }

    pub fn context(&self) -> &UserContext {
        &self.context
    }

    pub fn transaction(&self) -> Option<Rc<dyn Connection>> {
        self.builder.connection()
    }

    pub fn relation(&self) -> Option<&Relation> {
        self.lookup(|op| op.relation())
    }

    pub fn model_options(&self) -> Option<&ModelOptions> {
        self.lookup(|op| op.model_options())
    }

    /// The models the query works on, e.g. the owners of a relation query.
    pub fn items(&self) -> &[ModelRef] {
        self.lookup(|op| op.items()).unwrap_or_default()
    }

    /// The models given to an insert, update or relate call.
    pub fn input_items(&self) -> &[ModelRef] {
        self.lookup(|op| op.input_items()).unwrap_or_default()
    }

    /// The query result. Only set for `after_*` hooks.
    pub fn result(&self) -> Option<&QueryResult> {
        self.result.as_ref()
    }

    /// Resolves the query with `value` without running the rest of it.
    ///
    /// Without a value an insert resolves to its input models, a find to an
    /// empty list and everything else to `0`.
    pub fn cancel_query(&self, value: Option<QueryResult>) {
        let value = value.unwrap_or_else(|| {
            if self.builder.is_insert() {
                QueryResult::Models(self.input_items().to_vec())
            } else if self.builder.is_find() {
                QueryResult::Models(Vec::new())
            } else {
                QueryResult::Count(0)
            }
        });
        self.builder.resolve(value);
    }

    /// A find query for the same rows this query targets, without any
    /// eagerly fetched relations.
    pub fn as_find_query(&self) -> QueryBuilder {
        let mut query = self.builder.to_find_query();
        query.clear_with_graph_fetched();
        query
    }

    fn lookup<'s, T: ?Sized + 's>(
        &'s self,
        get: impl Fn(&'s dyn Operation) -> Option<&'s T>,
    ) -> Option<&'s T> {
        self.current
            .and_then(|id| self.builder.operation(id))
            .and_then(&get)
            .or_else(|| self.builder.operations().find_map(&get))
    }
}

/// A static hook call prepared inside an operation hook. Making the call
/// can wait until the instance hooks of the same step are done.
pub(crate) struct StaticHookCall {
    class: Rc<dyn ModelClass>,
    args: StaticHookArguments,
}

impl StaticHookCall {
    pub fn new(builder: &QueryBuilder, current: &dyn Operation) -> Self {
        Self {
            class: builder.model_class().clone(),
            args: StaticHookArguments::new(builder, current),
        }
    }

    /// Calls a static `before_*` hook.
    pub fn before(
        self,
        hook: impl FnOnce(&dyn ModelClass, &StaticHookArguments) -> MaybeAsync<()>,
    ) -> MaybeAsync<()> {
        hook(self.class.as_ref(), &self.args)
    }

    /// Calls a static `after_*` hook with `result`. A value returned by the
    /// hook replaces the result.
    pub fn after(
        mut self,
        result: QueryResult,
        hook: impl FnOnce(&dyn ModelClass, &StaticHookArguments) -> MaybeAsync<Option<QueryResult>>,
    ) -> MaybeAsync<QueryResult> {
        self.args.result = Some(result.clone());
        hook(self.class.as_ref(), &self.args).map(move |replaced| replaced.unwrap_or(result))
    }
}

/// Calls a static `before_*` hook of the builder's model class right away.
pub(crate) fn call_static_before(
    builder: &QueryBuilder,
    current: &dyn Operation,
    hook: impl FnOnce(&dyn ModelClass, &StaticHookArguments) -> MaybeAsync<()>,
) -> MaybeAsync<()> {
    StaticHookCall::new(builder, current).before(hook)
}

/// Calls a static `after_*` hook right away.
pub(crate) fn call_static_after(
    builder: &QueryBuilder,
    current: &dyn Operation,
    result: QueryResult,
    hook: impl FnOnce(&dyn ModelClass, &StaticHookArguments) -> MaybeAsync<Option<QueryResult>>,
) -> MaybeAsync<QueryResult> {
    StaticHookCall::new(builder, current).after(result, hook)
}

/// Calls an instance hook on every model whose class implements it.
pub(crate) fn call_instance_hooks(
    models: &[ModelRef],
    hook: InstanceHooks,
    mut call: impl FnMut(&dyn ModelClass, &ModelRef) -> MaybeAsync<()>,
) -> MaybeAsync<()> {
    let calls = models.iter().filter_map(|model| {
        let class = model.class();
        class
            .instance_hooks()
            .contains(hook)
            .then(|| call(class.as_ref(), model))
    });
    MaybeAsync::map_after_all_return(calls.collect::<Vec<_>>(), ())
}
