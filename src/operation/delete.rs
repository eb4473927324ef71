use quarry_core::SqlBuilder;

use super::{AsFind, Hooks, Operation, operation_common};
use crate::error::Result;
use crate::hooks::{call_static_after, call_static_before};
use crate::maybe_async::MaybeAsync;
use crate::query::QueryBuilder;
use crate::result::QueryResult;

#[derive(Debug, Clone)]
pub struct DeleteOperation {
    name: String,
}

impl DeleteOperation {
    pub fn new() -> Self {
        Self {
            name: "delete".to_string(),
        }
    }
}

impl Default for DeleteOperation {
    fn default() -> Self {
        Self::new()
    }
}

impl Operation for DeleteOperation {
    operation_common!(Hooks::ON_BEFORE2 | Hooks::ON_BUILD_KNEX | Hooks::ON_AFTER2);

    fn on_before2(&mut self, builder: &mut QueryBuilder) -> MaybeAsync<()> {
        call_static_before(builder, &*self, |class, args| class.before_delete(args))
    }

    fn on_build_knex(&mut self, knex: SqlBuilder, _builder: &QueryBuilder) -> Result<SqlBuilder> {
        Ok(knex.delete())
    }

    fn on_after2(&mut self, builder: &mut QueryBuilder, result: QueryResult) -> MaybeAsync<QueryResult> {
        call_static_after(builder, &*self, result, |class, args| class.after_delete(args))
    }

    fn as_find(&self, _builder: &QueryBuilder) -> AsFind {
        AsFind::Drop
    }
}
