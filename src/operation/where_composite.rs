use quarry_core::{Boolean, SqlArg, SqlBuilder};
use serde_json::Value;

use super::{Hooks, Operation, operation_common};
use crate::args::{Arg, ArgConverter, should_be_added};
use crate::error::{QueryError, Result};
use crate::query::QueryBuilder;

/// `where(columns, op, values)` for single or composite keys.
///
/// `where_composite(["a", "b"], [1, 2])` becomes `(a = 1 and b = 2)`. The
/// operator is optional and defaults to `=`.
#[derive(Debug, Clone)]
pub struct WhereCompositeOperation {
    name: String,
    args: Vec<Arg>,
}

impl WhereCompositeOperation {
    pub fn new() -> Self {
        Self {
            name: "where_composite".to_string(),
            args: Vec::new(),
        }
    }
}

impl Default for WhereCompositeOperation {
    fn default() -> Self {
        Self::new()
    }
}

impl Operation for WhereCompositeOperation {
    operation_common!(Hooks::ON_ADD | Hooks::ON_BUILD_KNEX);

    fn on_add(&mut self, builder: &mut QueryBuilder, args: Vec<Arg>) -> Result<bool> {
        let added = should_be_added(&self.name, builder, &args)?;
        self.args = args;
        Ok(added)
    }

    fn on_build_knex(&mut self, knex: SqlBuilder, builder: &QueryBuilder) -> Result<SqlBuilder> {
        let mut args = ArgConverter::new(builder, &self.name).convert_all(&self.args)?;
        if args.len() == 2 {
            args.insert(1, SqlArg::from("="));
        } else if args.len() != 3 {
            return Err(QueryError::InvalidArgumentCount { count: args.len() });
        }

        let mut args = args.into_iter();
        let (Some(columns), Some(op), Some(values)) = (args.next(), args.next(), args.next()) else {
            return Err(QueryError::InvalidArgumentCount { count: 0 });
        };

        let columns = items(columns);
        let values = items(values);
        match (columns, values) {
            (Items::Single(column), Items::Single(value)) => {
                Ok(knex.call("where", vec![column, op, value])?)
            }
            (Items::Many(columns), Items::Many(values)) if columns.len() == values.len() => {
                let mut group = SqlBuilder::new(knex.dialect());
                for (column, value) in columns.into_iter().zip(values) {
                    group = group.call("where", vec![column, op.clone(), value])?;
                }
                Ok(knex.where_group(Boolean::And, false, group))
            }
            _ => Err(QueryError::CompositeDimensions),
        }
    }
}

/// A converted argument seen as one item or a list of them.
pub(crate) enum Items {
    Single(SqlArg),
    Many(Vec<SqlArg>),
}

/// One-element lists count as a single item.
pub(crate) fn items(arg: SqlArg) -> Items {
    let mut list = match arg {
        SqlArg::List(list) => list,
        SqlArg::Value(Value::Array(values)) => values.into_iter().map(SqlArg::Value).collect(),
        single => return Items::Single(single),
    };
    if list.len() == 1
        && let Some(single) = list.pop()
    {
        return Items::Single(single);
    }
    Items::Many(list)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn one_element_lists_are_single() {
        assert!(matches!(items(SqlArg::Value(json!(["a"]))), Items::Single(SqlArg::Value(v)) if v == json!("a")));
        assert!(matches!(items(SqlArg::Value(json!([1, 2]))), Items::Many(list) if list.len() == 2));
        assert!(matches!(items(SqlArg::from("a")), Items::Single(_)));
    }
}
