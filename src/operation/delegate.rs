use std::any::TypeId;

use quarry_core::SqlBuilder;
use smallvec::SmallVec;

use super::{AsFind, Hooks, ModelOptions, Operation};
use crate::args::Arg;
use crate::error::{QueryError, Result};
use crate::maybe_async::MaybeAsync;
use crate::model::{ModelRef, Relation};
use crate::query::QueryBuilder;
use crate::result::QueryResult;

/// Forwards every hook to another operation.
///
/// Selecting by type matches both the delegating operation and its
/// delegate, so a wrapped insert still makes the query an insert.
pub struct DelegateOperation {
    name: String,
    delegate: Box<dyn Operation>,
}

impl DelegateOperation {
    pub fn new(name: impl Into<String>, delegate: Box<dyn Operation>) -> Self {
        Self {
            name: name.into(),
            delegate,
        }
    }

    pub fn delegate(&self) -> &dyn Operation {
        self.delegate.as_ref()
    }

    pub fn delegate_mut(&mut self) -> &mut dyn Operation {
        self.delegate.as_mut()
    }
}

impl Clone for DelegateOperation {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            delegate: self.delegate.clone_op(),
        }
    }
}

impl Operation for DelegateOperation {
    fn name(&self) -> &str {
        &self.name
    }

    fn hooks(&self) -> Hooks {
        self.delegate.hooks()
    }

    fn clone_op(&self) -> Box<dyn Operation> {
        Box::new(self.clone())
    }

    fn kinds(&self) -> SmallVec<[TypeId; 2]> {
        let mut kinds = SmallVec::new();
        kinds.push(TypeId::of::<Self>());
        kinds.extend(self.delegate.kinds());
        kinds
    }

    fn on_add(&mut self, builder: &mut QueryBuilder, args: Vec<Arg>) -> Result<bool> {
        self.delegate.on_add(builder, args)
    }

    fn on_before1(&mut self, builder: &mut QueryBuilder) -> MaybeAsync<()> {
        self.delegate.on_before1(builder)
    }

    fn on_before2(&mut self, builder: &mut QueryBuilder) -> MaybeAsync<()> {
        self.delegate.on_before2(builder)
    }

    fn on_before3(&mut self, builder: &mut QueryBuilder) -> MaybeAsync<()> {
        self.delegate.on_before3(builder)
    }

    fn on_build(&mut self, builder: &mut QueryBuilder) -> Result<()> {
        self.delegate.on_build(builder)
    }

    fn on_build_knex(&mut self, knex: SqlBuilder, builder: &QueryBuilder) -> Result<SqlBuilder> {
        self.delegate.on_build_knex(knex, builder)
    }

    fn on_raw_result(&mut self, builder: &mut QueryBuilder, result: QueryResult) -> MaybeAsync<QueryResult> {
        self.delegate.on_raw_result(builder, result)
    }

    fn on_after1(&mut self, builder: &mut QueryBuilder, result: QueryResult) -> MaybeAsync<QueryResult> {
        self.delegate.on_after1(builder, result)
    }

    fn on_after2(&mut self, builder: &mut QueryBuilder, result: QueryResult) -> MaybeAsync<QueryResult> {
        self.delegate.on_after2(builder, result)
    }

    fn on_after3(&mut self, builder: &mut QueryBuilder, result: QueryResult) -> MaybeAsync<QueryResult> {
        self.delegate.on_after3(builder, result)
    }

    fn query_executor(&mut self, builder: &mut QueryBuilder) -> MaybeAsync<QueryResult> {
        self.delegate.query_executor(builder)
    }

    fn on_error(&mut self, builder: &mut QueryBuilder, error: QueryError) -> MaybeAsync<QueryResult> {
        self.delegate.on_error(builder, error)
    }

    fn as_find(&self, builder: &QueryBuilder) -> AsFind {
        self.delegate.as_find(builder)
    }

    fn relation(&self) -> Option<&Relation> {
        self.delegate.relation()
    }

    fn model_options(&self) -> Option<&ModelOptions> {
        self.delegate.model_options()
    }

    fn items(&self) -> Option<&[ModelRef]> {
        self.delegate.items()
    }

    fn input_items(&self) -> Option<&[ModelRef]> {
        self.delegate.input_items()
    }
}
