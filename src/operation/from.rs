use std::sync::LazyLock;

use quarry_core::SqlBuilder;
use regex::Regex;
use serde_json::Value;

use super::{Hooks, Operation, operation_common};
use crate::args::{Arg, ArgConverter, should_be_added};
use crate::error::{QueryError, Result};
use crate::query::QueryBuilder;

static ALIAS_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s+as\s+").expect("valid alias regex"));

/// `from`, `into` and `table`. String arguments are parsed so the builder
/// knows the table name and alias of its model class.
#[derive(Debug, Clone)]
pub struct FromOperation {
    name: String,
    args: Vec<Arg>,
    table: Option<String>,
    alias: Option<String>,
}

impl FromOperation {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
            table: None,
            alias: None,
        }
    }

    pub fn table(&self) -> Option<&str> {
        self.table.as_deref()
    }

    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    /// `false` when selecting from a subquery or raw SQL.
    pub fn is_table(&self) -> bool {
        self.table.is_some()
    }
}

/// `(table, alias)` of a `from` argument. Objects map aliases to tables and
/// must mention the model table.
fn parse_table_and_alias(
    arg: Option<&Arg>,
    model_table: &str,
) -> Result<(Option<String>, Option<String>)> {
    match arg {
        Some(Arg::Value(Value::String(table))) => {
            let mut parts = ALIAS_REGEX.splitn(table, 2);
            let table = parts.next().map(|t| t.trim().to_string());
            let alias = parts.next().map(|a| a.trim().to_string());
            Ok((table, alias))
        }
        Some(Arg::Object(entries)) => {
            for (alias, table) in entries {
                if table.as_str().map(str::trim) == Some(model_table) {
                    return Ok((Some(model_table.to_string()), Some(alias.clone())));
                }
            }
            let tables = entries
                .iter()
                .map(|(alias, table)| format!("{alias}: {}", table.as_str().unwrap_or("?")))
                .collect::<Vec<_>>()
                .join(", ");
            Err(QueryError::FromTableMismatch {
                tables: format!("{{{tables}}}"),
            })
        }
        _ => Ok((None, None)),
    }
}

impl Operation for FromOperation {
    operation_common!(Hooks::ON_ADD | Hooks::ON_BUILD_KNEX);

    fn on_add(&mut self, builder: &mut QueryBuilder, args: Vec<Arg>) -> Result<bool> {
        let added = should_be_added(&self.name, builder, &args)?;
        let model_table = builder.model_class().table_name().to_string();
        let (table, alias) = parse_table_and_alias(args.first(), &model_table)?;

        if let Some(table) = &table {
            builder.set_table_name_for(&model_table, table);
        }
        if let Some(alias) = &alias {
            builder.set_alias_for(&model_table, alias);
        }

        self.table = table;
        self.alias = alias;
        self.args = args;
        Ok(added)
    }

    fn on_build_knex(&mut self, knex: SqlBuilder, builder: &QueryBuilder) -> Result<SqlBuilder> {
        match (&self.table, &self.alias) {
            (Some(table), Some(alias)) => Ok(knex.table(&format!("{table} as {alias}"))),
            (Some(table), None) => Ok(knex.table(table)),
            _ => {
                let args = ArgConverter::new(builder, &self.name).convert_all(&self.args)?;
                Ok(knex.call(&self.name, args)?)
            }
        }
    }
}
