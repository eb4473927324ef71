use quarry_core::SqlBuilder;

use super::{Hooks, Operation, operation_common};
use crate::error::Result;
use crate::maybe_async::MaybeAsync;
use crate::query::QueryBuilder;
use crate::result::QueryResult;

/// `first()`: the first element of the result, with `limit 1` on find
/// queries of model classes that allow it.
#[derive(Debug, Clone)]
pub struct FirstOperation {
    name: String,
}

impl FirstOperation {
    pub fn new() -> Self {
        Self {
            name: "first".to_string(),
        }
    }
}

impl Default for FirstOperation {
    fn default() -> Self {
        Self::new()
    }
}

impl Operation for FirstOperation {
    operation_common!(Hooks::ON_BUILD_KNEX | Hooks::ON_AFTER3);

    fn on_build_knex(&mut self, knex: SqlBuilder, builder: &QueryBuilder) -> Result<SqlBuilder> {
        if builder.is_find() && builder.model_class().use_limit_in_first() {
            return Ok(knex.limit(1));
        }
        Ok(knex)
    }

    fn on_after3(&mut self, _builder: &mut QueryBuilder, result: QueryResult) -> MaybeAsync<QueryResult> {
        MaybeAsync::ok(result.first())
    }
}
