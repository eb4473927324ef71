//! Raw SQL with positional bindings.
//!
//! `?` consumes the next binding as a value (arrays expand to a
//! comma-separated list), `??` consumes it as an identifier (arrays expand
//! to an identifier list) and `\?` is a literal question mark.

use serde_json::Value;

use super::{RawPart, RawSql, SQL, SqlChunk};
use crate::error::SqlError;

/// A value bound to a raw SQL marker.
#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
    /// A plain value
    Value(Value),
    /// A pre-built fragment (raw SQL, a rendered subquery)
    Sql(SQL),
}

impl From<Value> for Binding {
    fn from(value: Value) -> Self {
        Binding::Value(value)
    }
}

impl From<SQL> for Binding {
    fn from(value: SQL) -> Self {
        Binding::Sql(value)
    }
}

pub(super) fn parse(sql: &str, bindings: Vec<Binding>) -> crate::Result<SQL> {
    let expected = count_markers(sql);
    if expected != bindings.len() {
        return Err(SqlError::BindingCount {
            expected,
            actual: bindings.len(),
        });
    }

    let mut raw = RawSql::default();
    let mut text = String::new();
    let mut bindings = bindings.into_iter();
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&'?') => {
                chars.next();
                text.push('?');
            }
            '?' => {
                let as_ident = chars.peek() == Some(&'?');
                if as_ident {
                    chars.next();
                }

                if !text.is_empty() {
                    raw.parts.push(RawPart::Text(std::mem::take(&mut text).into()));
                }

                let binding = bindings.next().ok_or(SqlError::BindingCount {
                    expected,
                    actual: 0,
                })?;

                if as_ident {
                    identifier_binding(binding, &mut raw.parts)?;
                } else {
                    value_binding(binding, &mut raw.parts);
                }
            }
            _ => text.push(c),
        }
    }

    if !text.is_empty() {
        raw.parts.push(RawPart::Text(text.into()));
    }

    Ok(SQL::from(SqlChunk::Raw(raw)))
}

fn count_markers(sql: &str) -> usize {
    let mut count = 0;
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&'?') => {
                chars.next();
            }
            '?' => {
                if chars.peek() == Some(&'?') {
                    chars.next();
                }
                count += 1;
            }
            _ => {}
        }
    }

    count
}

fn value_binding(binding: Binding, parts: &mut Vec<RawPart>) {
    match binding {
        Binding::Value(Value::Array(items)) => {
            for (i, item) in items.into_iter().enumerate() {
                if i > 0 {
                    parts.push(RawPart::Text(", ".into()));
                }
                parts.push(RawPart::Param(item));
            }
        }
        Binding::Value(value) => parts.push(RawPart::Param(value)),
        Binding::Sql(sql) => parts.push(RawPart::Sql(sql)),
    }
}

fn identifier_binding(binding: Binding, parts: &mut Vec<RawPart>) -> crate::Result<()> {
    match binding {
        Binding::Value(Value::String(name)) => parts.push(RawPart::Ident(name.into())),
        Binding::Value(Value::Array(items)) => {
            for (i, item) in items.into_iter().enumerate() {
                let Value::String(name) = item else {
                    return Err(SqlError::args(
                        "raw",
                        format!("identifier binding must be a string, got {item}"),
                    ));
                };
                if i > 0 {
                    parts.push(RawPart::Text(", ".into()));
                }
                parts.push(RawPart::Ident(name.into()));
            }
        }
        Binding::Sql(sql) => parts.push(RawPart::Sql(sql)),
        Binding::Value(other) => {
            return Err(SqlError::args(
                "raw",
                format!("identifier binding must be a string, got {other}"),
            ));
        }
    }
    Ok(())
}
