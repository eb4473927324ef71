use quarry_core::{Binding, SQL, SqlArg};
use serde_json::Value;

use super::build::build_arg;
use super::{Arg, IntoArgs};
use crate::error::Result;
use crate::query::QueryBuilder;

const ALIAS_KEY: &str = "__alias__";

/// Raw SQL with bindings, usable anywhere an argument is accepted.
///
/// Positional bindings use `?` for values and `??` for identifiers. When
/// the only argument is an object its entries are bound by name instead:
/// `:name` for values and `:name:` for identifiers.
#[derive(Debug, Clone)]
pub struct RawBuilder {
    sql: String,
    args: Vec<Arg>,
    alias: Option<String>,
}

impl RawBuilder {
    pub fn new(sql: impl Into<String>, args: Vec<Arg>) -> Self {
        Self {
            sql: sql.into(),
            args,
            alias: None,
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    pub fn as_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub(crate) fn to_sql(&self, builder: &QueryBuilder) -> Result<SQL> {
        if let [Arg::Object(entries)] = self.args.as_slice() {
            let mut named = Vec::with_capacity(entries.len() + 1);
            for (key, value) in entries {
                named.push((key.clone(), build_arg(value, builder)?));
            }

            let mut sql = self.sql.clone();
            if let Some(alias) = &self.alias {
                named.push((ALIAS_KEY.to_string(), SqlArg::from(alias.as_str())));
                sql.push_str(" as :__alias__:");
            }

            let (sql, bindings) = named_to_positional(&sql, &named)?;
            return Ok(SQL::raw_with_bindings(&sql, bindings)?);
        }

        let mut bindings = self
            .args
            .iter()
            .map(|arg| Ok(build_arg(arg, builder)?.to_binding()?))
            .collect::<Result<Vec<_>>>()?;

        let mut sql = self.sql.clone();
        if let Some(alias) = &self.alias {
            bindings.push(Binding::Value(Value::String(alias.clone())));
            sql.push_str(" as ??");
        }

        Ok(SQL::raw_with_bindings(&sql, bindings)?)
    }
}

/// Creates a raw fragment. A single array argument is spread into the
/// positional bindings.
pub fn raw(sql: impl Into<String>, args: impl IntoArgs) -> RawBuilder {
    RawBuilder::new(sql, normalize_raw_args(args.into_args()))
}

/// A function call `name(?, ?, ...)` with one binding per argument.
pub fn fn_(name: &str, args: impl IntoArgs) -> RawBuilder {
    let args = normalize_raw_args(args.into_args());
    let markers = vec!["?"; args.len()].join(", ");
    RawBuilder::new(format!("{name}({markers})"), args)
}

fn normalize_raw_args(mut args: Vec<Arg>) -> Vec<Arg> {
    if let [Arg::Array(_)] = args.as_slice()
        && let Some(Arg::Array(items)) = args.pop()
    {
        return items;
    }
    args
}

/// Rewrites `:name` / `:name:` markers into `?` / `??` with matching
/// positional bindings. `::` is kept as is, question marks in the text are
/// escaped and names without an entry are left untouched.
fn named_to_positional(sql: &str, named: &[(String, SqlArg)]) -> Result<(String, Vec<Binding>)> {
    let chars: Vec<char> = sql.chars().collect();
    let mut out = String::with_capacity(sql.len());
    let mut bindings = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '?' => {
                out.push_str("\\?");
                i += 1;
            }
            ':' if chars.get(i + 1) == Some(&':') => {
                out.push_str("::");
                i += 2;
            }
            ':' => {
                let start = i + 1;
                let mut end = start;
                while end < chars.len() && (chars[end].is_alphanumeric() || chars[end] == '_') {
                    end += 1;
                }
                let name: String = chars[start..end].iter().collect();
                let entry = named.iter().find(|(key, _)| *key == name);

                match entry {
                    Some((_, value)) if !name.is_empty() => {
                        let as_ident = chars.get(end) == Some(&':');
                        out.push_str(if as_ident { "??" } else { "?" });
                        bindings.push(value.to_binding()?);
                        i = if as_ident { end + 1 } else { end };
                    }
                    _ => {
                        out.push(':');
                        i += 1;
                    }
                }
            }
            c => {
                out.push(c);
                i += 1;
            }
        }
    }

    Ok((out, bindings))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn named_bindings() {
        let named = vec![
            ("col".to_string(), SqlArg::from("name")),
            ("value".to_string(), SqlArg::from(json!(3))),
        ];
        let (sql, bindings) = named_to_positional(":col: = :value and x::text <> '?'", &named).unwrap();
        assert_eq!(sql, r"?? = ? and x::text <> '\?'");
        assert_eq!(
            bindings,
            vec![Binding::Value(json!("name")), Binding::Value(json!(3))]
        );
    }

    #[test]
    fn unknown_names_are_left_alone() {
        let (sql, bindings) = named_to_positional("a = :missing", &[]).unwrap();
        assert_eq!(sql, "a = :missing");
        assert!(bindings.is_empty());
    }

    #[test]
    fn single_array_argument_is_spread() {
        let spread = raw("? + ?", vec![1, 2]);
        assert_eq!(spread.args.len(), 2);

        let nested = raw("?", vec![vec![1, 2]]).as_alias("n");
        assert_eq!(nested.args.len(), 1);
        assert_eq!(nested.alias(), Some("n"));
    }

    #[test]
    fn function_markers() {
        let f = fn_("coalesce", ("a", "b"));
        assert_eq!(f.sql(), "coalesce(?, ?)");
    }
}
