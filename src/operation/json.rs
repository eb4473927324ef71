//! Postgres `jsonb` filters: containment, key existence and type checks.
//!
//! The left hand side is a field expression (`column:path.to[0].field`)
//! rendered as `"column"#>'{path,to,0,field}'`.

use quarry_core::{Binding, Boolean, SQL, SqlArg, SqlBuilder};
use serde_json::Value;

use super::{Hooks, Operation, operation_common};
use crate::args::{Arg, ArgConverter, should_be_added};
use crate::cache::ParseCache;
use crate::error::{QueryError, Result};
use crate::field_expression::FieldExpression;
use crate::query::QueryBuilder;

/// Renders a field expression. `as_text` extracts with `#>>`.
pub(crate) fn field_reference(
    cache: &ParseCache<FieldExpression>,
    field: &SqlArg,
    as_text: bool,
) -> Result<SQL> {
    match field {
        SqlArg::Value(Value::String(expr)) => {
            let parsed = FieldExpression::parse_cached(cache, expr)?;
            let extractor = if as_text { "#>>" } else { "#>" };
            let path = parsed.json_path().replace('?', "\\?");
            Ok(SQL::raw_with_bindings(
                &format!("??{extractor}'{path}'"),
                [Binding::Value(Value::String(parsed.column_name))],
            )?)
        }
        SqlArg::Sql(sql) => Ok(sql.clone()),
        _ => Err(QueryError::JsonOperand("Invalid left hand expression.")),
    }
}

/// `(left)::jsonb op (right)::jsonb` or `(left)::jsonb op ?::jsonb`.
pub(crate) fn json_comparison(
    cache: &ParseCache<FieldExpression>,
    field: &SqlArg,
    operator: &str,
    right: &SqlArg,
    not: bool,
) -> Result<SQL> {
    let left = field_reference(cache, field, false)?;
    let prefix = if not { "not " } else { "" };
    let (template, right) = match right {
        SqlArg::Value(Value::String(_)) => ("(?)::jsonb", Binding::Sql(field_reference(cache, right, false)?)),
        SqlArg::Value(Value::Object(_) | Value::Array(_)) | SqlArg::Map(_) | SqlArg::List(_) => {
            let json = right.to_json()?;
            ("?::jsonb", Binding::Value(Value::String(json.to_string())))
        }
        _ => return Err(QueryError::JsonOperand("Invalid right hand expression.")),
    };
    Ok(SQL::raw_with_bindings(
        &format!("{prefix}(?)::jsonb {} {template}", operator.replace('?', "\\?")),
        [Binding::Sql(left), right],
    )?)
}

/// `left ?| array[...]` and `left ?& array[...]`.
pub(crate) fn json_has_keys(
    cache: &ParseCache<FieldExpression>,
    field: &SqlArg,
    operator: &str,
    keys: SqlArg,
) -> Result<SQL> {
    let left = field_reference(cache, field, false)?;
    let keys = match keys {
        SqlArg::List(keys) => keys,
        SqlArg::Value(Value::Array(keys)) => keys.into_iter().map(SqlArg::Value).collect(),
        key => vec![key],
    };

    let mut bindings = vec![Binding::Sql(left)];
    for key in keys {
        match key {
            SqlArg::Value(key @ Value::String(_)) => bindings.push(Binding::Value(key)),
            _ => return Err(QueryError::JsonOperand("All keys to find must be strings.")),
        }
    }
    let markers = vec!["?"; bindings.len() - 1].join(",");
    Ok(SQL::raw_with_bindings(
        &format!("? {} array[{markers}]", operator.replace('?', "\\?")),
        bindings,
    )?)
}

fn two_args(args: Vec<SqlArg>) -> Result<(SqlArg, SqlArg)> {
    let count = args.len();
    let mut args = args.into_iter();
    match (args.next(), args.next(), args.next()) {
        (Some(first), Some(second), None) => Ok((first, second)),
        _ => Err(QueryError::InvalidArgumentCount { count }),
    }
}

/// `where_json_superset_of(field, value)` and the other containment
/// filters.
#[derive(Debug, Clone)]
pub struct JsonFieldOperation {
    name: String,
    args: Vec<Arg>,
    operator: &'static str,
    boolean: Boolean,
    not: bool,
}

impl JsonFieldOperation {
    pub fn new(name: impl Into<String>, operator: &'static str, boolean: Boolean, not: bool) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
            operator,
            boolean,
            not,
        }
    }
}

impl Operation for JsonFieldOperation {
    operation_common!(Hooks::ON_ADD | Hooks::ON_BUILD_KNEX);

    fn on_add(&mut self, builder: &mut QueryBuilder, args: Vec<Arg>) -> Result<bool> {
        let added = should_be_added(&self.name, builder, &args)?;
        self.args = args;
        Ok(added)
    }

    fn on_build_knex(&mut self, knex: SqlBuilder, builder: &QueryBuilder) -> Result<SqlBuilder> {
        let args = ArgConverter::new(builder, &self.name).convert_all(&self.args)?;
        let (field, right) = two_args(args)?;
        let caches = builder.caches();
        let sql = json_comparison(&caches.fields, &field, self.operator, &right, self.not)?;
        Ok(knex.where_raw(self.boolean, sql))
    }
}

/// `where_json_has_any(field, keys)` and `where_json_has_all(field, keys)`.
#[derive(Debug, Clone)]
pub struct JsonHasOperation {
    name: String,
    args: Vec<Arg>,
    operator: &'static str,
    boolean: Boolean,
}

impl JsonHasOperation {
    pub fn new(name: impl Into<String>, operator: &'static str, boolean: Boolean) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
            operator,
            boolean,
        }
    }
}

impl Operation for JsonHasOperation {
    operation_common!(Hooks::ON_ADD | Hooks::ON_BUILD_KNEX);

    fn on_add(&mut self, builder: &mut QueryBuilder, args: Vec<Arg>) -> Result<bool> {
        let added = should_be_added(&self.name, builder, &args)?;
        self.args = args;
        Ok(added)
    }

    fn on_build_knex(&mut self, knex: SqlBuilder, builder: &QueryBuilder) -> Result<SqlBuilder> {
        let args = ArgConverter::new(builder, &self.name).convert_all(&self.args)?;
        let (field, keys) = two_args(args)?;
        let caches = builder.caches();
        let cache = &caches.fields;
        let sql = json_has_keys(cache, &field, self.operator, keys)?;
        Ok(knex.where_raw(self.boolean, sql))
    }
}

/// `where_json_not_array(field)` and `where_json_not_object(field)`: the
/// field is not of the given type, or is null.
#[derive(Debug, Clone)]
pub struct JsonTypeOperation {
    name: String,
    args: Vec<Arg>,
    boolean: Boolean,
    compare: Value,
}

impl JsonTypeOperation {
    pub fn new(name: impl Into<String>, boolean: Boolean, compare: Value) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
            boolean,
            compare,
        }
    }
}

impl Operation for JsonTypeOperation {
    operation_common!(Hooks::ON_ADD | Hooks::ON_BUILD_KNEX);

    fn on_add(&mut self, builder: &mut QueryBuilder, args: Vec<Arg>) -> Result<bool> {
        let added = should_be_added(&self.name, builder, &args)?;
        self.args = args;
        Ok(added)
    }

    fn on_build_knex(&mut self, knex: SqlBuilder, builder: &QueryBuilder) -> Result<SqlBuilder> {
        let args = ArgConverter::new(builder, &self.name).convert_all(&self.args)?;
        let Some(field) = args.into_iter().next() else {
            return Err(QueryError::InvalidArgumentCount { count: 0 });
        };
        let caches = builder.caches();
        let cache = &caches.fields;

        let not_of_type = json_comparison(cache, &field, "@>", &SqlArg::Value(self.compare.clone()), true)?;
        let text = field_reference(cache, &field, true)?;
        let is_null = SQL::raw_with_bindings("(?)::TEXT IS NULL", [Binding::Sql(text)])?;

        let group = SqlBuilder::new(knex.dialect())
            .where_raw(Boolean::And, not_of_type)
            .where_raw(Boolean::Or, is_null);
        Ok(knex.where_group(self.boolean, false, group))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_core::Dialect;
    use serde_json::json;

    fn render(sql: SQL) -> (String, Vec<Value>) {
        sql.build(Dialect::PostgreSQL)
    }

    #[test]
    fn superset_of_value() {
        let cache = ParseCache::unbounded();
        let sql = json_comparison(
            &cache,
            &SqlArg::from("person.doc:tags"),
            "@>",
            &SqlArg::Value(json!(["a"])),
            false,
        )
        .unwrap();
        let (text, params) = render(sql);
        assert_eq!(text, r##"("person"."doc"#>'{tags}')::jsonb @> $1::jsonb"##);
        assert_eq!(params, vec![json!(r#"["a"]"#)]);
    }

    #[test]
    fn subset_of_reference_negated() {
        let cache = ParseCache::unbounded();
        let sql = json_comparison(&cache, &SqlArg::from("a:x"), "<@", &SqlArg::from("b:y[0]"), true).unwrap();
        let (text, _) = render(sql);
        assert_eq!(text, r##"not ("a"#>'{x}')::jsonb <@ ("b"#>'{y,0}')::jsonb"##);
    }

    #[test]
    fn invalid_right_hand() {
        let cache = ParseCache::unbounded();
        let err = json_comparison(&cache, &SqlArg::from("a"), "@>", &SqlArg::Value(json!(1)), false).unwrap_err();
        assert!(matches!(err, QueryError::JsonOperand("Invalid right hand expression.")));
    }

    #[test]
    fn has_any_escapes_the_operator() {
        let cache = ParseCache::unbounded();
        let sql = json_has_keys(&cache, &SqlArg::from("doc"), "?|", SqlArg::Value(json!(["a", "b"]))).unwrap();
        let (text, params) = render(sql);
        assert_eq!(text, r##""doc"#>'{}' ?| array[$1,$2]"##);
        assert_eq!(params, vec![json!("a"), json!("b")]);
    }

    #[test]
    fn keys_must_be_strings() {
        let cache = ParseCache::unbounded();
        let err = json_has_keys(&cache, &SqlArg::from("doc"), "?&", SqlArg::Value(json!([1]))).unwrap_err();
        assert!(matches!(err, QueryError::JsonOperand("All keys to find must be strings.")));
    }
}
