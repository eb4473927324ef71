//! `where_in` over one or many columns.
//!
//! Multi-column membership is written differently per dialect:
//!
//! * [`WhereInStrategy::Tuple`]: `(a, b) in ((1, 2), (3, 4))`
//! * [`WhereInStrategy::OrChain`]: `((a = 1 and b = 2) or (a = 3 and b = 4))`
//! * [`WhereInStrategy::ValuesExists`]:
//!   `exists (select * from (values (1, 2), (3, 4)) as V(t0, t1) where t0 = a and t1 = b)`
//!
//! All three select the same rows.

use quarry_core::{Binding, Boolean, Dialect, SQL, SqlArg, SqlBuilder};
use serde_json::Value;

use super::{Hooks, Operation, operation_common};
use crate::args::{Arg, ArgConverter, should_be_added};
use crate::error::{QueryError, Result};
use crate::query::QueryBuilder;

const HELPER_COLUMN_PREFIX: &str = "quarrytmp";

/// How a multi-column `in` is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WhereInStrategy {
    /// Native row value `in`
    Tuple,
    /// Grouped `or`/`and` chains, for SQLite
    OrChain,
    /// A derived `values` table in an `exists`, for SQL Server
    ValuesExists,
}

impl WhereInStrategy {
    pub fn for_dialect(dialect: Dialect) -> Self {
        match dialect {
            Dialect::SQLite => Self::OrChain,
            Dialect::MsSql => Self::ValuesExists,
            Dialect::PostgreSQL | Dialect::MySQL => Self::Tuple,
        }
    }
}

/// `where_in_composite(columns, values)` and its `not` form.
#[derive(Debug, Clone)]
pub struct WhereInCompositeOperation {
    name: String,
    args: Vec<Arg>,
    strategy: WhereInStrategy,
    not: bool,
}

impl WhereInCompositeOperation {
    pub fn new(name: impl Into<String>, strategy: WhereInStrategy, not: bool) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
            strategy,
            not,
        }
    }

    pub fn strategy(&self) -> WhereInStrategy {
        self.strategy
    }

    fn where_in(&self, knex: SqlBuilder, column: SqlArg, values: SqlArg) -> Result<SqlBuilder> {
        let method = if self.not { "where_not_in" } else { "where_in" };
        Ok(knex.call(method, vec![column, values])?)
    }

    fn build_non_composite(&self, knex: SqlBuilder, columns: SqlArg, values: SqlArg) -> Result<SqlBuilder> {
        let column = match list(columns) {
            Ok(mut columns) if !columns.is_empty() => columns.swap_remove(0),
            Ok(_) => return Err(QueryError::CompositeDimensions),
            Err(column) => column,
        };
        let values = match values {
            query @ (SqlArg::Query(_) | SqlArg::Sql(_)) => query,
            values => match list(values) {
                Ok(values) => {
                    let mut picked = Vec::new();
                    pick_non_null(values, &mut picked);
                    SqlArg::List(picked)
                }
                Err(single) => SqlArg::List(vec![single]),
            },
        };
        self.where_in(knex, column, values)
    }

    fn build_tuple(&self, knex: SqlBuilder, columns: Vec<SqlArg>, values: SqlArg) -> Result<SqlBuilder> {
        let values = match values {
            subquery @ (SqlArg::Query(_) | SqlArg::Sql(_)) => subquery,
            values => {
                let tuples = tuples(columns.len(), values)?;
                if tuples.is_empty() {
                    return Ok(self.match_nothing(knex));
                }
                SqlArg::List(tuples.into_iter().map(SqlArg::List).collect())
            }
        };
        self.where_in(knex, SqlArg::List(columns), values)
    }

    fn build_or_chain(&self, knex: SqlBuilder, columns: Vec<SqlArg>, values: SqlArg) -> Result<SqlBuilder> {
        if !is_list(&values) {
            return Err(QueryError::SqliteMultiColumnWhereIn);
        }
        let tuples = tuples(columns.len(), values)?;
        if tuples.is_empty() {
            return Ok(self.match_nothing(knex));
        }

        let dialect = knex.dialect();
        let mut chain = SqlBuilder::new(dialect);
        for tuple in tuples {
            let mut group = SqlBuilder::new(dialect);
            for (column, value) in columns.iter().zip(tuple) {
                group = group.call("where", vec![column.clone(), value])?;
            }
            chain = chain.where_group(Boolean::Or, false, group);
        }
        Ok(knex.where_group(Boolean::And, self.not, chain))
    }

    /// The condition for an empty value list: `in` matches no rows and
    /// `not in` matches every row.
    fn match_nothing(&self, knex: SqlBuilder) -> SqlBuilder {
        knex.where_raw(Boolean::And, SQL::raw(if self.not { "1 = 1" } else { "1 = 0" }))
    }

    fn build_values_exists(
        &self,
        knex: SqlBuilder,
        columns: Vec<SqlArg>,
        values: SqlArg,
    ) -> Result<SqlBuilder> {
        let helpers: Vec<Value> = (0..columns.len())
            .map(|index| Value::String(format!("{HELPER_COLUMN_PREFIX}{index}")))
            .collect();
        let helper_markers = vec!["??"; helpers.len()].join(",");

        let source = match values {
            SqlArg::Query(query) => SQL::raw_with_bindings(
                &format!("(?) AS V({helper_markers})"),
                std::iter::once(Binding::Sql(query.to_fragment()?))
                    .chain(helpers.iter().cloned().map(Binding::Value)),
            )?,
            SqlArg::Sql(sql) => SQL::raw_with_bindings(
                &format!("(?) AS V({helper_markers})"),
                std::iter::once(Binding::Sql(sql)).chain(helpers.iter().cloned().map(Binding::Value)),
            )?,
            values => {
                let tuples = tuples(columns.len(), values)?;
                if tuples.is_empty() {
                    return Ok(self.match_nothing(knex));
                }
                let mut rows = Vec::with_capacity(tuples.len());
                let mut bindings = Vec::new();
                for tuple in tuples {
                    rows.push(format!("({})", vec!["?"; tuple.len()].join(",")));
                    for value in tuple {
                        bindings.push(value.to_binding()?);
                    }
                }
                bindings.extend(helpers.iter().cloned().map(Binding::Value));
                SQL::raw_with_bindings(
                    &format!("(VALUES {}) AS V({helper_markers})", rows.join(",")),
                    bindings,
                )?
            }
        };

        let mut wrapper = SqlBuilder::new(knex.dialect()).from_sql(source);
        for (helper, column) in helpers.into_iter().zip(columns) {
            wrapper = wrapper.call("where_column", vec![SqlArg::Value(helper), column])?;
        }

        let method = if self.not { "where_not_exists" } else { "where_exists" };
        Ok(knex.call(method, vec![SqlArg::Query(Box::new(wrapper))])?)
    }
}

impl Operation for WhereInCompositeOperation {
    operation_common!(Hooks::ON_ADD | Hooks::ON_BUILD_KNEX);

    fn on_add(&mut self, builder: &mut QueryBuilder, args: Vec<Arg>) -> Result<bool> {
        let added = should_be_added(&self.name, builder, &args)?;
        self.args = args;
        Ok(added)
    }

    fn on_build_knex(&mut self, knex: SqlBuilder, builder: &QueryBuilder) -> Result<SqlBuilder> {
        let mut args = ArgConverter::new(builder, &self.name)
            .convert_all(&self.args)?
            .into_iter();
        let (Some(columns), Some(values), None) = (args.next(), args.next(), args.next()) else {
            return Err(QueryError::InvalidArgumentCount {
                count: self.args.len(),
            });
        };

        let columns = match list(columns) {
            Ok(columns) if columns.len() > 1 => columns,
            Ok(columns) => return self.build_non_composite(knex, SqlArg::List(columns), values),
            Err(column) => return self.build_non_composite(knex, column, values),
        };

        match self.strategy {
            WhereInStrategy::Tuple => self.build_tuple(knex, columns, values),
            WhereInStrategy::OrChain => self.build_or_chain(knex, columns, values),
            WhereInStrategy::ValuesExists => self.build_values_exists(knex, columns, values),
        }
    }
}

/// The items of a list argument, or the argument itself when it is not a
/// list.
fn list(arg: SqlArg) -> std::result::Result<Vec<SqlArg>, SqlArg> {
    match arg {
        SqlArg::List(items) => Ok(items),
        SqlArg::Value(Value::Array(items)) => Ok(items.into_iter().map(SqlArg::Value).collect()),
        other => Err(other),
    }
}

fn is_list(arg: &SqlArg) -> bool {
    matches!(arg, SqlArg::List(_) | SqlArg::Value(Value::Array(_)))
}

/// `[1, 2]` is a single tuple, `[[1, 2], [3, 4]]` a list of them.
fn normalize_tuples(values: Vec<SqlArg>) -> Vec<SqlArg> {
    match values.first() {
        Some(first) if !is_list(first) => vec![SqlArg::List(values)],
        _ => values,
    }
}

/// The value tuples of a composite `in`. Every tuple must have one value
/// per column.
fn tuples(width: usize, values: SqlArg) -> Result<Vec<Vec<SqlArg>>> {
    let values = match list(values) {
        Ok(values) => normalize_tuples(values),
        Err(single) => vec![SqlArg::List(vec![single])],
    };
    values
        .into_iter()
        .map(|tuple| {
            let tuple = list(tuple).unwrap_or_else(|single| vec![single]);
            if tuple.len() == width {
                Ok(tuple)
            } else {
                Err(QueryError::CompositeDimensions)
            }
        })
        .collect()
}

/// Flattens nested lists, dropping nulls.
fn pick_non_null(values: Vec<SqlArg>, out: &mut Vec<SqlArg>) {
    for value in values {
        match list(value) {
            Ok(nested) => pick_non_null(nested, out),
            Err(SqlArg::Value(Value::Null)) => {}
            Err(value) => out.push(value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn build(strategy: WhereInStrategy, dialect: Dialect, not: bool, values: Value) -> String {
        let op = WhereInCompositeOperation::new("where_in_composite", strategy, not);
        let knex = SqlBuilder::new(dialect).table("t");
        let columns = vec![SqlArg::from("a"), SqlArg::from("b")];
        let knex = match strategy {
            WhereInStrategy::Tuple => op.build_tuple(knex, columns, SqlArg::Value(values)),
            WhereInStrategy::OrChain => op.build_or_chain(knex, columns, SqlArg::Value(values)),
            WhereInStrategy::ValuesExists => op.build_values_exists(knex, columns, SqlArg::Value(values)),
        };
        knex.unwrap().to_sql().unwrap().sql
    }

    #[test]
    fn strategy_per_dialect() {
        assert_eq!(WhereInStrategy::for_dialect(Dialect::SQLite), WhereInStrategy::OrChain);
        assert_eq!(WhereInStrategy::for_dialect(Dialect::MsSql), WhereInStrategy::ValuesExists);
        assert_eq!(WhereInStrategy::for_dialect(Dialect::PostgreSQL), WhereInStrategy::Tuple);
        assert_eq!(WhereInStrategy::for_dialect(Dialect::MySQL), WhereInStrategy::Tuple);
    }

    #[test]
    fn tuple_in() {
        let sql = build(WhereInStrategy::Tuple, Dialect::PostgreSQL, false, json!([[1, 2], [3, 4]]));
        assert!(sql.ends_with(r#"where ("a", "b") in (($1, $2), ($3, $4))"#), "{sql}");
    }

    #[test]
    fn single_tuple_is_wrapped() {
        let sql = build(WhereInStrategy::Tuple, Dialect::PostgreSQL, false, json!([1, 2]));
        assert!(sql.ends_with(r#"where ("a", "b") in (($1, $2))"#), "{sql}");
    }

    #[test]
    fn or_chain() {
        let sql = build(WhereInStrategy::OrChain, Dialect::SQLite, false, json!([[1, 2], [3, 4]]));
        assert!(
            sql.ends_with(r#"where (("a" = ? and "b" = ?) or ("a" = ? and "b" = ?))"#),
            "{sql}"
        );
    }

    #[test]
    fn empty_values_match_nothing() {
        for strategy in [WhereInStrategy::Tuple, WhereInStrategy::OrChain, WhereInStrategy::ValuesExists] {
            let sql = build(strategy, Dialect::SQLite, false, json!([]));
            assert!(sql.ends_with("where 1 = 0"), "{strategy:?}: {sql}");
            let sql = build(strategy, Dialect::SQLite, true, json!([]));
            assert!(sql.ends_with("where 1 = 1"), "{strategy:?}: {sql}");
        }
    }

    #[test]
    fn tuples_must_match_the_columns() {
        let op = WhereInCompositeOperation::new("where_in_composite", WhereInStrategy::OrChain, false);
        for values in [json!([[1]]), json!([[1, 2], [3, 4, 5]]), json!([1, 2, 3])] {
            for strategy in [WhereInStrategy::Tuple, WhereInStrategy::OrChain, WhereInStrategy::ValuesExists] {
                let knex = SqlBuilder::new(Dialect::SQLite).table("t");
                let columns = vec![SqlArg::from("a"), SqlArg::from("b")];
                let values = SqlArg::Value(values.clone());
                let err = match strategy {
                    WhereInStrategy::Tuple => op.build_tuple(knex, columns, values),
                    WhereInStrategy::OrChain => op.build_or_chain(knex, columns, values),
                    WhereInStrategy::ValuesExists => op.build_values_exists(knex, columns, values),
                }
                .unwrap_err();
                assert!(matches!(err, QueryError::CompositeDimensions), "{strategy:?}: {err}");
            }
        }
    }

    #[test]
    fn or_chain_rejects_subqueries() {
        let op = WhereInCompositeOperation::new("where_in_composite", WhereInStrategy::OrChain, false);
        let subquery = SqlBuilder::new(Dialect::SQLite).table("u").select(["a", "b"]);
        let err = op
            .build_or_chain(
                SqlBuilder::new(Dialect::SQLite).table("t"),
                vec![SqlArg::from("a"), SqlArg::from("b")],
                SqlArg::Query(Box::new(subquery)),
            )
            .unwrap_err();
        assert!(matches!(err, QueryError::SqliteMultiColumnWhereIn));
    }

    #[test]
    fn values_exists_keeps_nulls() {
        let op = WhereInCompositeOperation::new("where_in_composite", WhereInStrategy::ValuesExists, false);
        let compiled = op
            .build_values_exists(
                SqlBuilder::new(Dialect::MsSql).table("t"),
                vec![SqlArg::from("a"), SqlArg::from("b")],
                SqlArg::Value(json!([[1, null], [3, 4]])),
            )
            .unwrap()
            .to_sql()
            .unwrap();
        assert!(compiled.sql.contains("(VALUES (@p0,@p1),(@p2,@p3)) AS V([quarrytmp0],[quarrytmp1])"), "{}", compiled.sql);
        assert_eq!(compiled.bindings, vec![json!(1), Value::Null, json!(3), json!(4)]);
    }

    #[test]
    fn non_composite_drops_nulls() {
        let op = WhereInCompositeOperation::new("where_in_composite", WhereInStrategy::ValuesExists, false);
        let compiled = op
            .build_non_composite(
                SqlBuilder::new(Dialect::MsSql).table("t"),
                SqlArg::Value(json!(["a"])),
                SqlArg::Value(json!([1, null, [2, null]])),
            )
            .unwrap()
            .to_sql()
            .unwrap();
        assert_eq!(compiled.bindings, vec![json!(1), json!(2)]);
    }
}
