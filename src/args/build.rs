use quarry_core::SqlArg;
use serde_json::Value;

use super::Arg;
use crate::error::{QueryError, Result, UndefinedKind};
use crate::query::QueryBuilder;
use crate::transform;

/// Converts the recorded arguments of one operation into SQL builder
/// arguments.
///
/// Nested builders become subqueries linked to `builder`, raw, reference
/// and value wrappers render to SQL fragments and models serialize to
/// their database representation.
pub(crate) struct ArgConverter<'a> {
    builder: &'a QueryBuilder,
    operation: &'a str,
    skip_undefined: bool,
}

impl<'a> ArgConverter<'a> {
    pub fn new(builder: &'a QueryBuilder, operation: &'a str) -> Self {
        Self {
            builder,
            operation,
            skip_undefined: builder.internal_options().skip_undefined,
        }
    }

    /// Converts every argument. Undefined arguments are dropped when
    /// undefined values are skipped.
    pub fn convert_all(&self, args: &[Arg]) -> Result<Vec<SqlArg>> {
        let mut out = Vec::with_capacity(args.len());
        for (index, arg) in args.iter().enumerate() {
            if let Some(converted) = self.convert(index, arg)? {
                out.push(converted);
            }
        }
        Ok(out)
    }

    pub fn convert(&self, index: usize, arg: &Arg) -> Result<Option<SqlArg>> {
        self.convert_in(index, arg, UndefinedKind::Argument)
    }

    fn convert_in(&self, index: usize, arg: &Arg, kind: UndefinedKind) -> Result<Option<SqlArg>> {
        let converted = match arg {
            Arg::Undefined if self.skip_undefined => return Ok(None),
            Arg::Undefined => return Err(QueryError::undefined(self.operation, index, kind)),
            Arg::Array(items) => {
                let mut list = Vec::with_capacity(items.len());
                for item in items {
                    if let Some(item) = self.convert_in(index, item, UndefinedKind::Item)? {
                        list.push(item);
                    }
                }
                SqlArg::List(list)
            }
            Arg::Object(entries) => {
                let mut map = Vec::with_capacity(entries.len());
                for (key, value) in entries {
                    if let Some(value) = self.convert_in(index, value, UndefinedKind::Property)? {
                        map.push((key.as_str().into(), value));
                    }
                }
                SqlArg::Map(map)
            }
            other => build_arg(other, self.builder)?,
        };
        Ok(Some(converted))
    }
}

/// Returns `false` when the operation should be dropped because one of
/// its top level arguments is undefined and undefined values are skipped.
pub(crate) fn should_be_added(operation: &str, builder: &QueryBuilder, args: &[Arg]) -> Result<bool> {
    let skip_undefined = builder.internal_options().skip_undefined;
    for (index, arg) in args.iter().enumerate() {
        if arg.is_undefined() {
            if skip_undefined {
                return Ok(false);
            }
            return Err(QueryError::undefined(operation, index, UndefinedKind::Argument));
        }
    }
    Ok(true)
}

/// Converts a single argument without any undefined handling. Used for
/// the bindings of raw fragments, where an undefined value is always an
/// error.
pub(crate) fn build_arg(arg: &Arg, builder: &QueryBuilder) -> Result<SqlArg> {
    Ok(match arg {
        Arg::Undefined => {
            return Err(QueryError::undefined("raw", 0, UndefinedKind::Argument));
        }
        Arg::Value(value) => SqlArg::Value(value.clone()),
        Arg::Raw(raw) => SqlArg::Sql(raw.to_sql(builder)?),
        Arg::Ref(reference) => SqlArg::Sql(reference.to_sql(builder)?),
        Arg::Val(value) => SqlArg::Sql(value.to_sql()?),
        Arg::Query(query) => convert_query(query, builder)?,
        Arg::Model(model) => SqlArg::Value(Value::Object(model.to_database_json())),
        Arg::Array(items) => SqlArg::List(
            items
                .iter()
                .map(|item| build_arg(item, builder))
                .collect::<Result<_>>()?,
        ),
        Arg::Object(entries) => SqlArg::Map(
            entries
                .iter()
                .map(|(key, value)| Ok((key.as_str().into(), build_arg(value, builder)?)))
                .collect::<Result<_>>()?,
        ),
        Arg::Group(group) => {
            let mut nested = QueryBuilder::for_class(builder.model_class().clone());
            nested.set_partial(true).subquery_of(builder);
            group(&mut nested);
            SqlArg::Group(Box::new(nested.to_knex_query()?))
        }
    })
}

fn convert_query(query: &QueryBuilder, parent: &QueryBuilder) -> Result<SqlArg> {
    let mut query = transform::wrap_mysql_modify_subquery(query.clone(), parent);
    query.subquery_of(parent);
    Ok(SqlArg::Query(Box::new(query.to_knex_query()?)))
}
