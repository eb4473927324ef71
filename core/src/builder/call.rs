//! Name based dispatch over the builder methods.
//!
//! The ORM records builder calls as `(name, args)` pairs and replays them
//! here when the query is compiled. Names are snake_case.

use compact_str::CompactString;
use serde_json::Value;

use super::{Boolean, JoinKind, Order, SqlArg, SqlBuilder};
use crate::error::SqlError;
use crate::sql::{SQL, Token};

impl SqlBuilder {
    /// Applies the builder method `name` with `args`.
    pub fn call(self, name: &str, args: Vec<SqlArg>) -> crate::Result<Self> {
        match name {
            "select" | "column" | "columns" => self.call_select(args),
            "distinct" => self.distinct().call_select(args),
            "from" | "table" | "into" => self.call_from(one("from", args)?),
            "as" => {
                let alias = string_arg("as", &one("as", args)?)?;
                Ok(self.as_alias(alias))
            }

            "where" | "and_where" => self.call_where(Boolean::And, false, args),
            "or_where" => self.call_where(Boolean::Or, false, args),
            "where_not" => self.call_where(Boolean::And, true, args),
            "or_where_not" => self.call_where(Boolean::Or, true, args),

            "where_in" => self.call_where_in(Boolean::And, false, args),
            "or_where_in" => self.call_where_in(Boolean::Or, false, args),
            "where_not_in" => self.call_where_in(Boolean::And, true, args),
            "or_where_not_in" => self.call_where_in(Boolean::Or, true, args),

            "where_null" => self.call_where_null(Boolean::And, false, args),
            "or_where_null" => self.call_where_null(Boolean::Or, false, args),
            "where_not_null" => self.call_where_null(Boolean::And, true, args),
            "or_where_not_null" => self.call_where_null(Boolean::Or, true, args),

            "where_exists" => self.call_where_exists(Boolean::And, false, args),
            "or_where_exists" => self.call_where_exists(Boolean::Or, false, args),
            "where_not_exists" => self.call_where_exists(Boolean::And, true, args),
            "or_where_not_exists" => self.call_where_exists(Boolean::Or, true, args),

            "where_between" => self.call_where_between(Boolean::And, false, args),
            "or_where_between" => self.call_where_between(Boolean::Or, false, args),
            "where_not_between" => self.call_where_between(Boolean::And, true, args),
            "or_where_not_between" => self.call_where_between(Boolean::Or, true, args),

            "where_column" => self.call_where_column(Boolean::And, false, args),
            "or_where_column" => self.call_where_column(Boolean::Or, false, args),
            "where_not_column" => self.call_where_column(Boolean::And, true, args),

            "where_raw" => Ok(self.where_raw(Boolean::And, raw_arg("where_raw", args)?)),
            "or_where_raw" => Ok(self.where_raw(Boolean::Or, raw_arg("or_where_raw", args)?)),

            "join" | "inner_join" => self.call_join(JoinKind::Inner, args),
            "left_join" => self.call_join(JoinKind::Left, args),
            "left_outer_join" => self.call_join(JoinKind::LeftOuter, args),
            "right_join" => self.call_join(JoinKind::Right, args),
            "right_outer_join" => self.call_join(JoinKind::RightOuter, args),
            "full_outer_join" => self.call_join(JoinKind::FullOuter, args),
            "cross_join" => self.call_join(JoinKind::Cross, args),
            "join_raw" => Ok(self.join_raw(raw_arg("join_raw", args)?)),

            "group_by" => {
                let mut qb = self;
                for column in flatten(args) {
                    qb = qb.group_by(column.to_column("group_by")?);
                }
                Ok(qb)
            }
            "group_by_raw" => Ok(self.group_by(raw_arg("group_by_raw", args)?)),

            "having" => self.call_having(Boolean::And, args),
            "or_having" => self.call_having(Boolean::Or, args),
            "having_in" => self.call_having_in(Boolean::And, false, args),
            "or_having_in" => self.call_having_in(Boolean::Or, false, args),
            "having_not_in" => self.call_having_in(Boolean::And, true, args),
            "or_having_not_in" => self.call_having_in(Boolean::Or, true, args),
            "having_null" => self.call_having_null(Boolean::And, false, args),
            "or_having_null" => self.call_having_null(Boolean::Or, false, args),
            "having_not_null" => self.call_having_null(Boolean::And, true, args),
            "or_having_not_null" => self.call_having_null(Boolean::Or, true, args),
            "having_raw" => Ok(self.having_raw(Boolean::And, raw_arg("having_raw", args)?)),
            "or_having_raw" => Ok(self.having_raw(Boolean::Or, raw_arg("or_having_raw", args)?)),

            "order_by" => self.call_order_by(args),
            "order_by_raw" => Ok(self.order_by_raw(raw_arg("order_by_raw", args)?)),

            "limit" => {
                let limit = one("limit", args)?;
                let limit = limit
                    .as_u64()
                    .ok_or_else(|| SqlError::args("limit", format!("expected a number, got {limit:?}")))?;
                Ok(self.limit(limit))
            }
            "offset" => {
                let offset = one("offset", args)?;
                let offset = offset.as_u64().ok_or_else(|| {
                    SqlError::args("offset", format!("expected a number, got {offset:?}"))
                })?;
                Ok(self.offset(offset))
            }

            "count" | "min" | "max" | "sum" | "avg" => self.call_aggregate(name, args),

            "insert" => self.call_insert(args),
            "update" => self.call_update(args),
            "delete" | "del" => Ok(self.delete()),
            "returning" => {
                let columns = flatten(args)
                    .into_iter()
                    .map(|arg| string_arg("returning", &arg).map(CompactString::from))
                    .collect::<crate::Result<Vec<_>>>()?;
                Ok(self.returning(columns))
            }
            "on_conflict" => {
                let columns = flatten(args)
                    .into_iter()
                    .map(|arg| string_arg("on_conflict", &arg).map(CompactString::from))
                    .collect::<crate::Result<Vec<_>>>()?;
                Ok(self.on_conflict(columns))
            }
            "ignore" => self.ignore(),
            "merge" => self.call_merge(args),

            "clear_select" => Ok(self.clear_select()),
            "clear_where" => Ok(self.clear_where()),
            "clear_order" => Ok(self.clear_order()),

            _ => Err(SqlError::UnknownMethod(name.to_string())),
        }
    }

    fn call_select(self, args: Vec<SqlArg>) -> crate::Result<Self> {
        let mut qb = self;
        for arg in flatten(args) {
            qb = match arg {
                SqlArg::Value(Value::String(column)) => qb.select([column]),
                other => qb.select_sql(other.to_column("select")?),
            };
        }
        Ok(qb)
    }

    fn call_from(self, arg: SqlArg) -> crate::Result<Self> {
        match arg {
            SqlArg::Value(Value::String(table)) => Ok(self.table(&table)),
            SqlArg::Sql(sql) => Ok(self.from_sql(sql)),
            SqlArg::Query(query) => self.from_query(&query),
            other => Err(SqlError::args("from", format!("expected a table, got {other:?}"))),
        }
    }

    fn call_where(self, boolean: Boolean, not: bool, args: Vec<SqlArg>) -> crate::Result<Self> {
        let mut args = args.into_iter();
        match (args.next(), args.next(), args.next(), args.next()) {
            (Some(SqlArg::Group(group)), None, None, None) => {
                Ok(self.where_group(boolean, not, *group))
            }
            (Some(SqlArg::Sql(sql)), None, None, None) => Ok(self.push_where(boolean, not, sql)),
            (Some(SqlArg::Map(entries)), None, None, None) => {
                let mut group = SqlBuilder::new(self.dialect);
                for (column, value) in entries {
                    group = group.where_(SQL::ident(column), "=", value.to_operand()?);
                }
                Ok(self.where_group(boolean, not, group))
            }
            (Some(SqlArg::Value(Value::Object(entries))), None, None, None) => {
                let mut group = SqlBuilder::new(self.dialect);
                for (column, value) in entries {
                    group = group.where_(SQL::ident(column.as_str()), "=", SQL::param(value));
                }
                Ok(self.where_group(boolean, not, group))
            }
            (Some(column), Some(value), None, None) => {
                let left = column.to_column("where")?;
                Ok(self.where_cmp(boolean, not, left, "=", value.to_operand()?))
            }
            (Some(column), Some(op), Some(value), None) => {
                let left = column.to_column("where")?;
                let op = string_arg("where", &op)?;
                Ok(self.where_cmp(boolean, not, left, &op, value.to_operand()?))
            }
            _ => Err(SqlError::args("where", "expected 1 to 3 arguments")),
        }
    }

    fn call_where_in(self, boolean: Boolean, not: bool, args: Vec<SqlArg>) -> crate::Result<Self> {
        let [column, values] = two("where_in", args)?;
        let left = column.to_column("where_in")?;
        Ok(self.where_in(boolean, not, left, values.to_in_list()?))
    }

    fn call_where_null(self, boolean: Boolean, not: bool, args: Vec<SqlArg>) -> crate::Result<Self> {
        let column = one("where_null", args)?.to_column("where_null")?;
        Ok(self.where_null(boolean, not, column))
    }

    fn call_where_exists(
        self,
        boolean: Boolean,
        not: bool,
        args: Vec<SqlArg>,
    ) -> crate::Result<Self> {
        let subquery = match one("where_exists", args)? {
            SqlArg::Query(query) => query.to_fragment()?,
            SqlArg::Sql(sql) => sql,
            other => {
                return Err(SqlError::args(
                    "where_exists",
                    format!("expected a subquery, got {other:?}"),
                ));
            }
        };
        Ok(self.where_exists(boolean, not, subquery))
    }

    fn call_where_between(
        self,
        boolean: Boolean,
        not: bool,
        args: Vec<SqlArg>,
    ) -> crate::Result<Self> {
        let [column, range] = two("where_between", args)?;
        let column = column.to_column("where_between")?;
        let bounds: Vec<SqlArg> = match range {
            SqlArg::Value(Value::Array(items)) => items.into_iter().map(SqlArg::Value).collect(),
            SqlArg::List(items) => items,
            other => vec![other],
        };
        let [low, high]: [SqlArg; 2] = bounds
            .try_into()
            .map_err(|_| SqlError::args("where_between", "expected a [low, high] range"))?;
        Ok(self.where_between(boolean, not, column, low.to_operand()?, high.to_operand()?))
    }

    fn call_where_column(
        self,
        boolean: Boolean,
        not: bool,
        args: Vec<SqlArg>,
    ) -> crate::Result<Self> {
        let (left, op, right) = comparison_args("where_column", args)?;
        Ok(self.where_cmp(boolean, not, left, &op, right))
    }

    fn call_join(self, kind: JoinKind, args: Vec<SqlArg>) -> crate::Result<Self> {
        let mut args = args.into_iter();
        let table = match args.next() {
            Some(SqlArg::Value(Value::String(table))) => SQL::ident(table.as_str()),
            Some(SqlArg::Sql(sql)) => sql,
            Some(SqlArg::Query(query)) => query.to_subquery()?,
            other => {
                return Err(SqlError::args("join", format!("expected a table, got {other:?}")));
            }
        };

        let rest: Vec<SqlArg> = args.collect();
        let on = match rest.as_slice() {
            [] => None,
            [SqlArg::Sql(on)] => Some(on.clone()),
            [SqlArg::Group(group)] => Some(super::clause::render_clauses(&group.wheres)),
            _ => {
                let (left, op, right) = comparison_args("join", rest)?;
                Some(super::comparison(left, &op, right))
            }
        };
        Ok(self.join(kind, table, on))
    }

    fn call_having(self, boolean: Boolean, args: Vec<SqlArg>) -> crate::Result<Self> {
        let mut args = args.into_iter();
        match (args.next(), args.next(), args.next(), args.next()) {
            (Some(SqlArg::Sql(sql)), None, None, None) => Ok(self.having_raw(boolean, sql)),
            (Some(column), Some(value), None, None) => {
                let left = column.to_column("having")?;
                Ok(self.having(boolean, left, "=", value.to_operand()?))
            }
            (Some(column), Some(op), Some(value), None) => {
                let left = column.to_column("having")?;
                let op = string_arg("having", &op)?;
                Ok(self.having(boolean, left, &op, value.to_operand()?))
            }
            _ => Err(SqlError::args("having", "expected 1 to 3 arguments")),
        }
    }

    fn call_having_in(self, boolean: Boolean, not: bool, args: Vec<SqlArg>) -> crate::Result<Self> {
        let [column, values] = two("having_in", args)?;
        let left = column.to_column("having_in")?;
        Ok(self.having_in(boolean, not, left, values.to_in_list()?))
    }

    fn call_having_null(
        self,
        boolean: Boolean,
        not: bool,
        args: Vec<SqlArg>,
    ) -> crate::Result<Self> {
        let column = one("having_null", args)?.to_column("having_null")?;
        Ok(self.having_null(boolean, not, column))
    }

    fn call_order_by(self, args: Vec<SqlArg>) -> crate::Result<Self> {
        let mut args = args.into_iter();
        let column = args
            .next()
            .ok_or_else(|| SqlError::args("order_by", "expected a column"))?;
        let order = match args.next() {
            None => Order::Asc,
            Some(direction) => {
                let direction = string_arg("order_by", &direction)?;
                Order::parse(&direction).ok_or_else(|| {
                    SqlError::args("order_by", format!("unknown direction \"{direction}\""))
                })?
            }
        };
        Ok(self.order_by(column.to_column("order_by")?, order))
    }

    fn call_aggregate(self, name: &str, args: Vec<SqlArg>) -> crate::Result<Self> {
        let function = CompactString::from(name);
        let column = match args.into_iter().next() {
            None => SqlArg::from("*"),
            Some(column) => column,
        };
        let sql = match column {
            SqlArg::Value(Value::String(column)) => {
                let (column, alias) = match crate::dialect::split_alias(&column) {
                    Some((column, alias)) => (column.to_string(), Some(alias.to_string())),
                    None => (column, None),
                };
                let target = if column == "*" {
                    SQL::token(Token::STAR)
                } else {
                    SQL::ident(column)
                };
                let sql = SQL::func(function, target);
                match alias {
                    Some(alias) => sql.alias(alias),
                    None => sql,
                }
            }
            other => SQL::func(function, other.to_column(aggregate_name(name))?),
        };
        Ok(self.select_sql(sql))
    }

    fn call_insert(self, args: Vec<SqlArg>) -> crate::Result<Self> {
        let rows = match one("insert", args)? {
            SqlArg::List(items) => items,
            SqlArg::Value(Value::Array(items)) => items.into_iter().map(SqlArg::Value).collect(),
            single => vec![single],
        };
        let rows = rows
            .into_iter()
            .map(|row| assignments("insert", row))
            .collect::<crate::Result<Vec<_>>>()?;
        Ok(self.insert(rows))
    }

    fn call_update(self, args: Vec<SqlArg>) -> crate::Result<Self> {
        let mut args = args.into_iter();
        match (args.next(), args.next(), args.next()) {
            (Some(patch), None, None) => {
                let pairs = assignments("update", patch)?;
                Ok(self.update(pairs))
            }
            (Some(column), Some(value), None) => {
                let column = string_arg("update", &column)?;
                Ok(self.update(vec![(column.into(), value.to_operand()?)]))
            }
            _ => Err(SqlError::args("update", "expected an object or a column and a value")),
        }
    }

    fn call_merge(self, args: Vec<SqlArg>) -> crate::Result<Self> {
        let mut args = args.into_iter();
        match (args.next(), args.next()) {
            (None, _) => self.merge(None),
            (Some(arg @ (SqlArg::Map(_) | SqlArg::Value(Value::Object(_)))), None) => {
                let pairs = assignments("merge", arg)?;
                self.merge_values(pairs)
            }
            (Some(first), rest) => {
                let columns = flatten(std::iter::once(first).chain(rest).chain(args).collect())
                    .into_iter()
                    .map(|arg| string_arg("merge", &arg).map(CompactString::from))
                    .collect::<crate::Result<Vec<_>>>()?;
                self.merge(Some(columns))
            }
        }
    }
}

fn aggregate_name(name: &str) -> &'static str {
    match name {
        "min" => "min",
        "max" => "max",
        "sum" => "sum",
        "avg" => "avg",
        _ => "count",
    }
}

/// Expands list arguments so `select(["a", "b"])` and `select("a", "b")`
/// mean the same thing.
fn flatten(args: Vec<SqlArg>) -> Vec<SqlArg> {
    let mut out = Vec::with_capacity(args.len());
    for arg in args {
        match arg {
            SqlArg::List(items) => out.extend(flatten(items)),
            SqlArg::Value(Value::Array(items)) => out.extend(items.into_iter().map(SqlArg::Value)),
            other => out.push(other),
        }
    }
    out
}

fn one(method: &'static str, args: Vec<SqlArg>) -> crate::Result<SqlArg> {
    let mut args = args.into_iter();
    match (args.next(), args.next()) {
        (Some(arg), None) => Ok(arg),
        _ => Err(SqlError::args(method, "expected exactly one argument")),
    }
}

fn two(method: &'static str, args: Vec<SqlArg>) -> crate::Result<[SqlArg; 2]> {
    args.try_into()
        .map_err(|_| SqlError::args(method, "expected exactly two arguments"))
}

fn string_arg(method: &'static str, arg: &SqlArg) -> crate::Result<String> {
    arg.as_str()
        .map(str::to_string)
        .ok_or_else(|| SqlError::args(method, format!("expected a string, got {arg:?}")))
}

/// `(column, op, column)` or `(column, column)` with `=`.
fn comparison_args(method: &'static str, args: Vec<SqlArg>) -> crate::Result<(SQL, String, SQL)> {
    let mut args = args.into_iter();
    match (args.next(), args.next(), args.next(), args.next()) {
        (Some(left), Some(right), None, None) => Ok((
            left.to_column(method)?,
            "=".to_string(),
            right.to_column(method)?,
        )),
        (Some(left), Some(op), Some(right), None) => Ok((
            left.to_column(method)?,
            string_arg(method, &op)?,
            right.to_column(method)?,
        )),
        _ => Err(SqlError::args(method, "expected 2 or 3 arguments")),
    }
}

/// Raw SQL given either as a fragment or as a string with bindings.
fn raw_arg(method: &'static str, args: Vec<SqlArg>) -> crate::Result<SQL> {
    let mut args = args.into_iter();
    match args.next() {
        Some(SqlArg::Sql(sql)) => Ok(sql),
        Some(SqlArg::Value(Value::String(sql))) => {
            let bindings = flatten(args.collect())
                .iter()
                .map(SqlArg::to_binding)
                .collect::<crate::Result<Vec<_>>>()?;
            SQL::raw_with_bindings(&sql, bindings)
        }
        other => Err(SqlError::args(method, format!("expected raw sql, got {other:?}"))),
    }
}

/// Column/value pairs of an object argument.
fn assignments(method: &'static str, arg: SqlArg) -> crate::Result<Vec<(CompactString, SQL)>> {
    match arg {
        SqlArg::Map(entries) => entries
            .into_iter()
            .map(|(column, value)| Ok((column, value.to_operand()?)))
            .collect(),
        SqlArg::Value(Value::Object(entries)) => Ok(entries
            .into_iter()
            .map(|(column, value)| (CompactString::from(column), SQL::param(value)))
            .collect()),
        other => Err(SqlError::args(method, format!("expected an object, got {other:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Dialect;
    use serde_json::json;

    fn v(value: Value) -> SqlArg {
        SqlArg::Value(value)
    }

    fn build(calls: Vec<(&str, Vec<SqlArg>)>) -> crate::Result<SqlBuilder> {
        calls
            .into_iter()
            .try_fold(SqlBuilder::new(Dialect::SQLite), |qb, (name, args)| qb.call(name, args))
    }

    #[test]
    fn where_forms() {
        let qb = build(vec![
            ("from", vec![v(json!("person"))]),
            ("where", vec![v(json!("age")), v(json!(">")), v(json!(10))]),
            ("or_where", vec![v(json!("name")), v(json!("Jennifer"))]),
            ("where_in", vec![v(json!("id")), v(json!([1, 2]))]),
            ("where_not_null", vec![v(json!("parent_id"))]),
        ])
        .unwrap();

        let compiled = qb.to_sql().unwrap();
        assert_eq!(
            compiled.sql,
            r#"select * from "person" where "age" > ? or "name" = ? and "id" in (?, ?) and "parent_id" is not null"#
        );
        assert_eq!(
            compiled.bindings,
            vec![json!(10), json!("Jennifer"), json!(1), json!(2)]
        );
    }

    #[test]
    fn object_where_is_grouped() {
        let qb = build(vec![
            ("from", vec![v(json!("person"))]),
            ("where", vec![v(json!({"a": 1, "b": 2}))]),
        ])
        .unwrap();
        assert_eq!(
            qb.to_sql().unwrap().sql,
            r#"select * from "person" where ("a" = ? and "b" = ?)"#
        );
    }

    #[test]
    fn tuple_where_in() {
        let qb = build(vec![
            ("from", vec![v(json!("t"))]),
            ("where_in", vec![v(json!(["a", "b"])), v(json!([[1, 2], [3, 4]]))]),
        ])
        .unwrap();
        assert_eq!(
            qb.to_sql().unwrap().sql,
            r#"select * from "t" where ("a", "b") in ((?, ?), (?, ?))"#
        );
    }

    #[test]
    fn join_group_order_limit() {
        let qb = build(vec![
            ("select", vec![v(json!("person.name")), v(json!("pets.name as pet"))]),
            ("from", vec![v(json!("person"))]),
            (
                "left_join",
                vec![v(json!("pets")), v(json!("pets.owner_id")), v(json!("person.id"))],
            ),
            ("group_by", vec![v(json!("person.name"))]),
            ("order_by", vec![v(json!("person.name")), v(json!("desc"))]),
            ("limit", vec![v(json!(5))]),
        ])
        .unwrap();
        assert_eq!(
            qb.to_sql().unwrap().sql,
            r#"select "person"."name", "pets"."name" as "pet" from "person" left join "pets" on "pets"."owner_id" = "person"."id" group by "person"."name" order by "person"."name" desc limit ?"#
        );
    }

    #[test]
    fn raw_with_bindings() {
        let qb = build(vec![
            ("from", vec![v(json!("t"))]),
            ("where_raw", vec![v(json!("?? = ?")), v(json!("a")), v(json!(1))]),
        ])
        .unwrap();
        assert_eq!(qb.to_sql().unwrap().sql, r#"select * from "t" where "a" = ?"#);
    }

    #[test]
    fn aggregate_alias() {
        let qb = build(vec![
            ("count", vec![v(json!("id as total"))]),
            ("from", vec![v(json!("t"))]),
        ])
        .unwrap();
        assert_eq!(
            qb.to_sql().unwrap().sql,
            r#"select count("id") as "total" from "t""#
        );
    }

    #[test]
    fn insert_update_delete() {
        let qb = build(vec![
            ("into", vec![v(json!("t"))]),
            ("insert", vec![v(json!([{"a": 1}, {"a": 2}]))]),
        ])
        .unwrap();
        assert_eq!(
            qb.to_sql().unwrap().sql,
            r#"insert into "t" ("a") values (?), (?)"#
        );

        let qb = build(vec![
            ("table", vec![v(json!("t"))]),
            ("update", vec![v(json!("a")), v(json!(3))]),
            ("where", vec![v(json!("id")), v(json!(1))]),
        ])
        .unwrap();
        assert_eq!(
            qb.to_sql().unwrap().sql,
            r#"update "t" set "a" = ? where "id" = ?"#
        );

        let qb = build(vec![("from", vec![v(json!("t"))]), ("delete", vec![])]).unwrap();
        assert_eq!(qb.to_sql().unwrap().sql, r#"delete from "t""#);
    }

    #[test]
    fn unknown_method() {
        let err = build(vec![("frobnicate", vec![])]).unwrap_err();
        assert_eq!(err, SqlError::UnknownMethod("frobnicate".into()));
    }

    #[test]
    fn subquery_source_and_exists() {
        let inner = SqlBuilder::new(Dialect::SQLite)
            .from("pets")
            .select(["owner_id"])
            .as_alias("p");
        let qb = build(vec![("from", vec![SqlArg::from(inner.clone())])]).unwrap();
        assert_eq!(
            qb.to_sql().unwrap().sql,
            r#"select * from (select "owner_id" from "pets") as "p""#
        );

        let qb = build(vec![
            ("from", vec![v(json!("person"))]),
            ("where_exists", vec![SqlArg::from(inner)]),
        ])
        .unwrap();
        assert_eq!(
            qb.to_sql().unwrap().sql,
            r#"select * from "person" where exists (select "owner_id" from "pets")"#
        );
    }
}
