//! Fluent, dialect aware query builder.
//!
//! `SqlBuilder` is a plain value: every method consumes the builder and
//! returns it, so the ORM layer can thread one builder through a chain of
//! operations. Nothing is rendered until [`SqlBuilder::to_sql`].

mod arg;
mod call;
mod clause;
mod render;

pub use arg::SqlArg;
pub use clause::{Boolean, Clause, ConflictAction, JoinKind, OnConflict, Order};
pub use render::CompiledQuery;

use compact_str::CompactString;
use serde_json::Value;

use crate::dialect::{Dialect, split_alias};
use crate::sql::{SQL, SqlChunk, Token};

/// The statement a builder renders to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Method {
    #[default]
    Select,
    Insert,
    Update,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SqlBuilder {
    dialect: Dialect,
    method: Method,
    table: Option<CompactString>,
    source: Option<SQL>,
    alias: Option<CompactString>,
    distinct: bool,
    columns: Vec<SQL>,
    joins: Vec<SQL>,
    wheres: Vec<Clause>,
    groups: Vec<SQL>,
    havings: Vec<Clause>,
    orders: Vec<SQL>,
    limit: Option<u64>,
    offset: Option<u64>,
    rows: Vec<Vec<(CompactString, SQL)>>,
    updates: Vec<(CompactString, SQL)>,
    returning: Vec<CompactString>,
    on_conflict: Option<OnConflict>,
}

impl SqlBuilder {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            ..Self::default()
        }
    }

    // ==================== inspection ====================

    #[inline]
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    #[inline]
    pub fn method(&self) -> Method {
        self.method
    }

    /// The plain table name set with `from`/`table`/`into`, without alias.
    pub fn table_name(&self) -> Option<&str> {
        self.table.as_deref()
    }

    /// The alias given with `as_alias`, used when this builder is a subquery.
    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    pub fn has_wheres(&self) -> bool {
        !self.wheres.is_empty()
    }

    pub fn has_selects(&self) -> bool {
        !self.columns.is_empty()
    }

    pub fn returning_columns(&self) -> &[CompactString] {
        &self.returning
    }

    /// `true` once `on_conflict` was called and no action chosen yet.
    pub fn is_conflict_pending(&self) -> bool {
        matches!(
            self.on_conflict,
            Some(OnConflict {
                action: ConflictAction::Pending,
                ..
            })
        )
    }

    pub fn limit_value(&self) -> Option<u64> {
        self.limit
    }

    // ==================== source ====================

    /// Sets the source table. Accepts `"table as alias"`.
    pub fn table(mut self, name: &str) -> Self {
        let name = name.trim();
        let table = split_alias(name).map_or(name, |(table, _)| table);
        self.table = Some(table.into());
        self.source = Some(SQL::ident(name));
        self
    }

    /// Alias for [`SqlBuilder::table`] reading naturally in selects.
    pub fn from(self, name: &str) -> Self {
        self.table(name)
    }

    /// Uses an arbitrary fragment (subquery, values list, raw) as the source.
    pub fn from_sql(mut self, source: SQL) -> Self {
        self.source = Some(source);
        self
    }

    /// Uses another builder as the source; it must carry an alias.
    pub fn from_query(self, query: &SqlBuilder) -> crate::Result<Self> {
        let source = query.to_subquery()?;
        Ok(self.from_sql(source))
    }

    pub fn as_alias(mut self, alias: impl Into<CompactString>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    // ==================== select ====================

    pub fn select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.columns
            .extend(columns.into_iter().map(|c| SQL::ident(c.as_ref().trim())));
        self
    }

    pub fn select_sql(mut self, sql: SQL) -> Self {
        self.columns.push(sql);
        self
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    pub fn clear_select(mut self) -> Self {
        self.columns.clear();
        self
    }

    /// `select count(column) as alias`
    pub fn count(self, column: &str, alias: Option<&str>) -> Self {
        let target = if column == "*" {
            SQL::token(Token::STAR)
        } else {
            SQL::ident(column)
        };
        let mut sql = SQL::func("count", target);
        if let Some(alias) = alias {
            sql = sql.alias(alias);
        }
        self.select_sql(sql)
    }

    // ==================== where ====================

    fn push_where(mut self, boolean: Boolean, not: bool, sql: SQL) -> Self {
        let sql = if not {
            SQL::token(Token::NOT).append(sql)
        } else {
            sql
        };
        self.wheres.push(Clause { boolean, sql });
        self
    }

    /// `left op right`, chained with `boolean`. A null right hand side with
    /// `=`/`<>` becomes `is null`/`is not null`.
    pub fn where_cmp(self, boolean: Boolean, not: bool, left: SQL, op: &str, right: SQL) -> Self {
        let sql = comparison(left, op, right);
        self.push_where(boolean, not, sql)
    }

    pub fn where_(self, left: SQL, op: &str, right: SQL) -> Self {
        self.where_cmp(Boolean::And, false, left, op, right)
    }

    pub fn or_where(self, left: SQL, op: &str, right: SQL) -> Self {
        self.where_cmp(Boolean::Or, false, left, op, right)
    }

    pub fn where_not(self, left: SQL, op: &str, right: SQL) -> Self {
        self.where_cmp(Boolean::And, true, left, op, right)
    }

    /// Adds the `where` clauses of `group` as one parenthesized condition.
    /// An empty group adds nothing.
    pub fn where_group(self, boolean: Boolean, not: bool, group: SqlBuilder) -> Self {
        if group.wheres.is_empty() {
            return self;
        }
        let sql = clause::render_clauses(&group.wheres).parens();
        self.push_where(boolean, not, sql)
    }

    pub fn where_raw(self, boolean: Boolean, sql: SQL) -> Self {
        self.push_where(boolean, false, sql)
    }

    pub fn where_null(self, boolean: Boolean, not: bool, column: SQL) -> Self {
        let sql = column.push(Token::IS);
        let sql = if not { sql.push(Token::NOT) } else { sql };
        self.push_where(boolean, false, sql.push(Token::NULL))
    }

    /// `left [not] in values`. `values` is a rendered list or subquery and is
    /// wrapped in parentheses here. An empty list renders the always-false
    /// (or always-true for `not in`) condition `1 = 0` / `1 = 1`.
    pub fn where_in(self, boolean: Boolean, not: bool, left: SQL, values: SQL) -> Self {
        if values.is_empty() {
            let sql = SQL::raw(if not { "1 = 1" } else { "1 = 0" });
            return self.push_where(boolean, false, sql);
        }
        let sql = left;
        let sql = if not { sql.push(Token::NOT) } else { sql };
        let sql = sql.push(Token::IN).append(values.parens());
        self.push_where(boolean, false, sql)
    }

    pub fn where_exists(self, boolean: Boolean, not: bool, subquery: SQL) -> Self {
        let sql = SQL::token(Token::EXISTS).append(subquery.parens());
        self.push_where(boolean, not, sql)
    }

    pub fn where_between(self, boolean: Boolean, not: bool, column: SQL, low: SQL, high: SQL) -> Self {
        let sql = column;
        let sql = if not { sql.push(Token::NOT) } else { sql };
        let sql = sql
            .push(Token::BETWEEN)
            .append(low)
            .push(Token::AND)
            .append(high);
        self.push_where(boolean, false, sql)
    }

    pub fn clear_where(mut self) -> Self {
        self.wheres.clear();
        self
    }

    // ==================== having ====================

    fn push_having(mut self, boolean: Boolean, sql: SQL) -> Self {
        self.havings.push(Clause { boolean, sql });
        self
    }

    pub fn having(self, boolean: Boolean, left: SQL, op: &str, right: SQL) -> Self {
        self.push_having(boolean, comparison(left, op, right))
    }

    pub fn having_in(self, boolean: Boolean, not: bool, left: SQL, values: SQL) -> Self {
        let sql = if not { left.push(Token::NOT) } else { left };
        self.push_having(boolean, sql.push(Token::IN).append(values.parens()))
    }

    pub fn having_null(self, boolean: Boolean, not: bool, column: SQL) -> Self {
        let sql = column.push(Token::IS);
        let sql = if not { sql.push(Token::NOT) } else { sql };
        self.push_having(boolean, sql.push(Token::NULL))
    }

    pub fn having_raw(self, boolean: Boolean, sql: SQL) -> Self {
        self.push_having(boolean, sql)
    }

    // ==================== joins, grouping, ordering ====================

    pub fn join(mut self, kind: JoinKind, table: SQL, on: Option<SQL>) -> Self {
        let mut sql = SQL::word(kind.as_str()).append(table);
        if let Some(on) = on {
            sql = sql.push(Token::ON).append(on);
        }
        self.joins.push(sql);
        self
    }

    pub fn join_raw(mut self, sql: SQL) -> Self {
        self.joins.push(sql);
        self
    }

    pub fn group_by(mut self, column: SQL) -> Self {
        self.groups.push(column);
        self
    }

    pub fn order_by(mut self, column: SQL, order: Order) -> Self {
        self.orders.push(column.push(order.token()));
        self
    }

    pub fn order_by_raw(mut self, sql: SQL) -> Self {
        self.orders.push(sql);
        self
    }

    pub fn clear_order(mut self) -> Self {
        self.orders.clear();
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    // ==================== mutations ====================

    /// Switches to an insert of the given rows. Each row is a list of
    /// `(column, value)` pairs; missing columns in multi-row inserts render
    /// as `default`.
    pub fn insert(mut self, rows: Vec<Vec<(CompactString, SQL)>>) -> Self {
        self.method = Method::Insert;
        self.rows = rows;
        self
    }

    pub fn update(mut self, assignments: Vec<(CompactString, SQL)>) -> Self {
        self.method = Method::Update;
        self.updates.extend(assignments);
        self
    }

    pub fn delete(mut self) -> Self {
        self.method = Method::Delete;
        self
    }

    pub fn returning<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<CompactString>,
    {
        for column in columns {
            let column = column.into();
            if !self.returning.contains(&column) {
                self.returning.push(column);
            }
        }
        self
    }

    pub fn on_conflict<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<CompactString>,
    {
        self.on_conflict = Some(OnConflict {
            columns: columns.into_iter().map(Into::into).collect(),
            action: ConflictAction::Pending,
        });
        self
    }

    pub fn ignore(self) -> crate::Result<Self> {
        self.set_conflict_action("ignore", ConflictAction::Ignore)
    }

    pub fn merge(self, columns: Option<Vec<CompactString>>) -> crate::Result<Self> {
        self.set_conflict_action("merge", ConflictAction::Merge(columns))
    }

    pub fn merge_values(self, assignments: Vec<(CompactString, SQL)>) -> crate::Result<Self> {
        self.set_conflict_action("merge", ConflictAction::MergeValues(assignments))
    }

    fn set_conflict_action(
        mut self,
        method: &'static str,
        action: ConflictAction,
    ) -> crate::Result<Self> {
        match self.on_conflict.as_mut() {
            Some(conflict) => {
                conflict.action = action;
                Ok(self)
            }
            None => Err(crate::SqlError::args(
                method,
                "must be called right after on_conflict",
            )),
        }
    }
}

/// Builds `left op right`, turning `= null` into `is null`.
pub(crate) fn comparison(left: SQL, op: &str, right: SQL) -> SQL {
    let is_null = matches!(right.chunks.as_slice(), [SqlChunk::Param(Value::Null)]);
    let op = op.trim();

    if is_null && (op == "=" || op.eq_ignore_ascii_case("is")) {
        return left.push(Token::IS).push(Token::NULL);
    }
    if is_null && (op == "<>" || op == "!=" || op.eq_ignore_ascii_case("is not")) {
        return left.push(Token::IS).push(Token::NOT).push(Token::NULL);
    }

    let op = if op == "=" {
        SqlChunk::Token(Token::EQ)
    } else {
        SqlChunk::word(op.to_ascii_lowercase())
    };
    left.push(op).append(right)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn where_null_comparison() {
        let qb = SqlBuilder::new(Dialect::SQLite)
            .from("person")
            .where_(SQL::ident("name"), "=", SQL::param(Value::Null));
        assert_eq!(
            qb.to_sql().unwrap().sql,
            r#"select * from "person" where "name" is null"#
        );
    }

    #[test]
    fn grouped_or_conditions() {
        let group = SqlBuilder::new(Dialect::SQLite)
            .or_where(SQL::ident("a"), "=", SQL::param(json!(1)))
            .or_where(SQL::ident("a"), "=", SQL::param(json!(2)));
        let qb = SqlBuilder::new(Dialect::SQLite)
            .from("t")
            .where_(SQL::ident("b"), ">", SQL::param(json!(0)))
            .where_group(Boolean::And, false, group);

        let compiled = qb.to_sql().unwrap();
        assert_eq!(
            compiled.sql,
            r#"select * from "t" where "b" > ? and ("a" = ? or "a" = ?)"#
        );
        assert_eq!(compiled.bindings, vec![json!(0), json!(1), json!(2)]);
    }

    #[test]
    fn merge_requires_on_conflict() {
        let err = SqlBuilder::new(Dialect::PostgreSQL).merge(None).unwrap_err();
        assert!(err.to_string().contains("on_conflict"));

        let qb = SqlBuilder::new(Dialect::PostgreSQL).on_conflict(["id"]);
        assert!(qb.is_conflict_pending());
        assert!(!qb.merge(None).unwrap().is_conflict_pending());
    }
}
