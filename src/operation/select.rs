use std::sync::LazyLock;

use quarry_core::SqlBuilder;
use regex::Regex;

use super::{Hooks, Operation, operation_common};
use crate::args::{Arg, ArgConverter};
use crate::error::{QueryError, Result, UndefinedKind};
use crate::model::ModelClass;
use crate::query::QueryBuilder;

static ALIAS_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s+as\s+").expect("valid alias regex"));

/// One selected column: `table.column as alias`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub table: Option<String>,
    pub column: String,
    pub alias: Option<String>,
}

impl Selection {
    pub fn new(table: Option<&str>, column: &str, alias: Option<&str>) -> Self {
        Self {
            table: table.map(str::to_string),
            column: column.to_string(),
            alias: alias.map(str::to_string),
        }
    }

    /// Parses `"table.column as alias"`. The table is everything before
    /// the last dot.
    pub fn parse(selection: &str) -> Option<Self> {
        let selection = selection.trim();
        if selection.is_empty() {
            return None;
        }

        let mut parts = ALIAS_REGEX.splitn(selection, 2);
        let target = parts.next()?.trim();
        let alias = parts.next().map(str::trim);

        let (table, column) = match target.rsplit_once('.') {
            Some((table, column)) => (Some(table), column),
            None => (None, target),
        };
        Some(Self::new(table, column, alias))
    }

    /// Whether a column selected like `self` includes `other`. A `*`
    /// selects everything of its table, or everything at all without one.
    pub fn includes(&self, other: &Selection) -> bool {
        if self.column == "*" {
            return match &self.table {
                Some(table) => other.table.as_deref() == Some(table.as_str()),
                None => true,
            };
        }
        self.column == other.column
            && match (&self.table, &other.table) {
                (Some(a), Some(b)) => a == b,
                _ => true,
            }
    }

    /// The name the column ends up under in the result rows.
    pub fn name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.column)
    }
}

/// `select`, `columns`, `distinct` and the aggregate functions.
#[derive(Debug, Clone)]
pub struct SelectOperation {
    name: String,
    args: Vec<Arg>,
    selections: Vec<Selection>,
}

impl SelectOperation {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
            selections: Vec::new(),
        }
    }

    /// The plain column selections. Raw selections are not listed.
    pub fn selections(&self) -> &[Selection] {
        &self.selections
    }

    /// The selection of this operation that includes `selection`.
    pub fn find_selection(&self, selection: &Selection) -> Option<&Selection> {
        self.selections.iter().find(|s| s.includes(selection))
    }

    /// Whether `column` of `class`'s table is selected.
    pub fn selects_column(&self, builder: &QueryBuilder, class: &dyn ModelClass, column: &str) -> bool {
        let table = builder.table_ref_for(class);
        self.find_selection(&Selection::new(Some(&table), column, None))
            .is_some()
    }

    fn selection_of(arg: &Arg) -> Option<Selection> {
        match arg {
            Arg::Value(value) => value.as_str().and_then(Selection::parse),
            Arg::Ref(reference) => Some(Selection::new(
                reference.table_name(),
                reference.column(),
                reference.alias(),
            )),
            Arg::Raw(raw) => raw.alias().map(|alias| Selection::new(None, alias, None)),
            _ => None,
        }
    }
}

impl Operation for SelectOperation {
    operation_common!(Hooks::ON_ADD | Hooks::ON_BUILD_KNEX);

    fn on_add(&mut self, builder: &mut QueryBuilder, args: Vec<Arg>) -> Result<bool> {
        let args = Arg::flatten(args);
        let skip_undefined = builder.internal_options().skip_undefined;

        let mut kept = Vec::with_capacity(args.len());
        for (index, arg) in args.into_iter().enumerate() {
            if arg.is_undefined() {
                if skip_undefined {
                    continue;
                }
                return Err(QueryError::undefined(&self.name, index, UndefinedKind::Argument));
            }
            if let Some(selection) = Self::selection_of(&arg) {
                self.selections.push(selection);
            }
            kept.push(arg);
        }

        self.args = kept;
        Ok(!self.args.is_empty() || self.name == "count" || self.name == "distinct")
    }

    fn on_build_knex(&mut self, knex: SqlBuilder, builder: &QueryBuilder) -> Result<SqlBuilder> {
        let args = ArgConverter::new(builder, &self.name).convert_all(&self.args)?;
        Ok(knex.call(&self.name, args)?)
    }
}
