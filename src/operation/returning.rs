use quarry_core::SqlBuilder;

use super::{Hooks, Operation, operation_common};
use crate::args::{Arg, ArgConverter, should_be_added};
use crate::error::Result;
use crate::query::QueryBuilder;

/// `returning(columns)`. An empty column list is not recorded.
#[derive(Debug, Clone)]
pub struct ReturningOperation {
    name: String,
    args: Vec<Arg>,
}

impl ReturningOperation {
    pub fn new() -> Self {
        Self {
            name: "returning".to_string(),
            args: Vec::new(),
        }
    }

    /// The plain column names.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.args.iter().filter_map(Arg::as_str)
    }
}

impl Default for ReturningOperation {
    fn default() -> Self {
        Self::new()
    }
}

impl Operation for ReturningOperation {
    operation_common!(Hooks::ON_ADD | Hooks::ON_BUILD_KNEX);

    fn on_add(&mut self, builder: &mut QueryBuilder, args: Vec<Arg>) -> Result<bool> {
        let args = Arg::flatten(args);
        if args.is_empty() {
            return Ok(false);
        }
        let added = should_be_added(&self.name, builder, &args)?;
        self.args = args;
        Ok(added)
    }

    fn on_build_knex(&mut self, knex: SqlBuilder, builder: &QueryBuilder) -> Result<SqlBuilder> {
        let args = ArgConverter::new(builder, &self.name).convert_all(&self.args)?;
        Ok(knex.call("returning", args)?)
    }
}
