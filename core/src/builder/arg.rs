use compact_str::CompactString;
use serde_json::Value;

use super::SqlBuilder;
use crate::error::SqlError;
use crate::sql::{Binding, SQL, Token};

/// An argument passed to [`SqlBuilder::call`].
///
/// This is what ORM level arguments (nested query builders, raw and
/// reference wrappers, models) are converted into before they reach the
/// SQL builder.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlArg {
    /// A plain JSON value. Strings in column position are identifiers.
    Value(Value),
    /// A pre-rendered fragment (raw SQL, a reference)
    Sql(SQL),
    /// A nested query, rendered as a parenthesized subquery
    Query(Box<SqlBuilder>),
    /// An array whose items were converted individually
    List(Vec<SqlArg>),
    /// An object whose values were converted individually
    Map(Vec<(CompactString, SqlArg)>),
    /// A condition group built by a nested builder; only its `where`
    /// clauses are used
    Group(Box<SqlBuilder>),
}

impl SqlArg {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            SqlArg::Value(Value::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            SqlArg::Value(v) => v.as_u64(),
            _ => None,
        }
    }

    /// Renders the argument in column position: strings are identifiers.
    pub(crate) fn to_column(&self, method: &'static str) -> crate::Result<SQL> {
        match self {
            SqlArg::Value(Value::String(name)) => Ok(SQL::ident(name.as_str())),
            SqlArg::Value(Value::Array(items)) => {
                let columns = items
                    .iter()
                    .map(|item| SqlArg::Value(item.clone()).to_column(method))
                    .collect::<crate::Result<Vec<_>>>()?;
                Ok(SQL::join(columns, Token::COMMA).parens())
            }
            SqlArg::List(items) => {
                let columns = items
                    .iter()
                    .map(|item| item.to_column(method))
                    .collect::<crate::Result<Vec<_>>>()?;
                Ok(SQL::join(columns, Token::COMMA).parens())
            }
            SqlArg::Sql(sql) => Ok(sql.clone()),
            SqlArg::Query(query) => query.to_subquery(),
            other => Err(SqlError::args(
                method,
                format!("expected a column, got {other:?}"),
            )),
        }
    }

    /// Renders the argument in value position: everything is a parameter
    /// unless it is already SQL.
    pub(crate) fn to_operand(&self) -> crate::Result<SQL> {
        match self {
            SqlArg::Value(value) => Ok(SQL::param(value.clone())),
            SqlArg::Sql(sql) => Ok(sql.clone()),
            SqlArg::Query(query) => query.to_subquery(),
            SqlArg::List(items) => {
                let items = items
                    .iter()
                    .map(SqlArg::to_operand)
                    .collect::<crate::Result<Vec<_>>>()?;
                Ok(SQL::join(items, Token::COMMA).parens())
            }
            SqlArg::Map(_) | SqlArg::Group(_) => Ok(SQL::param(self.to_json()?)),
        }
    }

    /// Renders the right hand side of an `in`: a list of values, a list of
    /// tuples or a subquery. The result is not parenthesized.
    pub(crate) fn to_in_list(&self) -> crate::Result<SQL> {
        match self {
            SqlArg::Value(Value::Array(items)) => Ok(SQL::join(
                items.iter().map(|item| match item {
                    Value::Array(tuple) => SQL::param_list(tuple.iter().cloned()).parens(),
                    other => SQL::param(other.clone()),
                }),
                Token::COMMA,
            )),
            SqlArg::List(items) => {
                let items = items
                    .iter()
                    .map(|item| match item {
                        SqlArg::Value(Value::Array(_)) | SqlArg::List(_) => {
                            Ok(item.to_in_list()?.parens())
                        }
                        other => other.to_operand(),
                    })
                    .collect::<crate::Result<Vec<_>>>()?;
                Ok(SQL::join(items, Token::COMMA))
            }
            SqlArg::Query(query) => query.to_fragment(),
            SqlArg::Sql(sql) => Ok(sql.clone()),
            other => other.to_operand(),
        }
    }

    /// A raw binding for `?`/`??` markers.
    pub fn to_binding(&self) -> crate::Result<Binding> {
        match self {
            SqlArg::Value(value) => Ok(Binding::Value(value.clone())),
            SqlArg::Sql(sql) => Ok(Binding::Sql(sql.clone())),
            SqlArg::Query(query) => Ok(Binding::Sql(query.to_subquery()?)),
            other => Ok(Binding::Value(other.to_json()?)),
        }
    }

    /// Converts back to plain JSON; fails for SQL fragments.
    pub fn to_json(&self) -> crate::Result<Value> {
        match self {
            SqlArg::Value(value) => Ok(value.clone()),
            SqlArg::List(items) => items
                .iter()
                .map(SqlArg::to_json)
                .collect::<crate::Result<Vec<_>>>()
                .map(Value::Array),
            SqlArg::Map(entries) => {
                let mut map = serde_json::Map::new();
                for (key, value) in entries {
                    map.insert(key.to_string(), value.to_json()?);
                }
                Ok(Value::Object(map))
            }
            other => Err(SqlError::Statement(format!(
                "{other:?} cannot be used as a plain value"
            ))),
        }
    }
}

impl From<Value> for SqlArg {
    fn from(value: Value) -> Self {
        SqlArg::Value(value)
    }
}

impl From<&str> for SqlArg {
    fn from(value: &str) -> Self {
        SqlArg::Value(Value::String(value.to_string()))
    }
}

impl From<SQL> for SqlArg {
    fn from(value: SQL) -> Self {
        SqlArg::Sql(value)
    }
}

impl From<SqlBuilder> for SqlArg {
    fn from(value: SqlBuilder) -> Self {
        SqlArg::Query(Box::new(value))
    }
}
