use quarry_core::SqlBuilder;

use super::{Hooks, Operation, operation_common};
use crate::args::{Arg, ArgConverter, should_be_added};
use crate::error::Result;
use crate::query::QueryBuilder;

/// A builder call replayed as-is on the SQL builder: `where`, `join`,
/// `order_by` and friends.
#[derive(Debug, Clone)]
pub struct KnexOperation {
    name: String,
    args: Vec<Arg>,
}

impl KnexOperation {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
        }
    }

    pub fn args(&self) -> &[Arg] {
        &self.args
    }
}

impl Operation for KnexOperation {
    operation_common!(Hooks::ON_ADD | Hooks::ON_BUILD_KNEX);

    fn on_add(&mut self, builder: &mut QueryBuilder, args: Vec<Arg>) -> Result<bool> {
        let added = should_be_added(&self.name, builder, &args)?;
        self.args = args;
        Ok(added)
    }

    fn on_build_knex(&mut self, knex: SqlBuilder, builder: &QueryBuilder) -> Result<SqlBuilder> {
        let args = ArgConverter::new(builder, &self.name).convert_all(&self.args)?;
        Ok(knex.call(&self.name, args)?)
    }
}
