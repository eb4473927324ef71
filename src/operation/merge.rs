use quarry_core::{SqlArg, SqlBuilder};
use serde_json::Value;

use super::insert::{InputModel, input_models};
use super::update::convert_field_expressions;
use super::{AsFind, Hooks, Operation, operation_common};
use crate::args::{Arg, ArgConverter, should_be_added};
use crate::error::{QueryError, Result};
use crate::query::QueryBuilder;

/// `merge(...)` after `on_conflict(...)`.
///
/// Without arguments every inserted column is updated on conflict. A list
/// of column names limits the update to those columns and an object gives
/// the values to set, converted like the values of an update.
#[derive(Debug, Clone)]
pub struct MergeOperation {
    name: String,
    args: Vec<Arg>,
    input: Option<InputModel>,
}

impl MergeOperation {
    pub fn new() -> Self {
        Self {
            name: "merge".to_string(),
            args: Vec::new(),
            input: None,
        }
    }
}

impl Default for MergeOperation {
    fn default() -> Self {
        Self::new()
    }
}

fn is_object(arg: &Arg) -> bool {
    matches!(arg, Arg::Object(_) | Arg::Value(Value::Object(_)) | Arg::Model(_))
}

impl Operation for MergeOperation {
    operation_common!(Hooks::ON_ADD | Hooks::ON_BUILD_KNEX);

    fn on_add(&mut self, builder: &mut QueryBuilder, args: Vec<Arg>) -> Result<bool> {
        if !should_be_added(&self.name, builder, &args)? {
            return Ok(false);
        }
        match args.as_slice() {
            [arg] if is_object(arg) => {
                self.input = input_models(builder.model_class(), arg.clone())?.into_iter().next();
            }
            _ => self.args = args,
        }
        Ok(true)
    }

    fn on_build_knex(&mut self, knex: SqlBuilder, builder: &QueryBuilder) -> Result<SqlBuilder> {
        if !knex.is_conflict_pending() {
            return Err(QueryError::MergeWithoutOnConflict);
        }
        let args = match &self.input {
            Some(input) => vec![SqlArg::Map(convert_field_expressions(builder, &self.name, input)?)],
            None => ArgConverter::new(builder, &self.name).convert_all(&self.args)?,
        };
        Ok(knex.call("merge", args)?)
    }

    fn as_find(&self, _builder: &QueryBuilder) -> AsFind {
        AsFind::Drop
    }
}
