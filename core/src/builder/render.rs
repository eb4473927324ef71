use compact_str::CompactString;
use serde_json::Value;

use super::clause::render_clauses;
use super::{ConflictAction, Method, SqlBuilder};
use crate::dialect::Dialect;
use crate::error::SqlError;
use crate::sql::{SQL, Token};

/// A rendered statement ready to hand to a driver.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub sql: String,
    pub bindings: Vec<Value>,
    pub method: Method,
    /// Columns the statement asked the database to return
    pub returning: Vec<CompactString>,
}

impl SqlBuilder {
    /// Renders the statement for this builder's dialect.
    pub fn to_sql(&self) -> crate::Result<CompiledQuery> {
        let fragment = self.to_fragment()?;
        let (sql, bindings) = fragment.build(self.dialect);
        Ok(CompiledQuery {
            sql,
            bindings,
            method: self.method,
            returning: self.returning.clone(),
        })
    }

    /// Renders as a parenthesized subquery, followed by `as alias` when the
    /// builder has one.
    pub fn to_subquery(&self) -> crate::Result<SQL> {
        let sql = self.to_fragment()?.parens();
        Ok(match &self.alias {
            Some(alias) => sql.alias(alias.clone()),
            None => sql,
        })
    }

    /// Renders the statement as a dialect neutral fragment.
    pub fn to_fragment(&self) -> crate::Result<SQL> {
        match self.method {
            Method::Select => Ok(self.render_select()),
            Method::Insert => self.render_insert(),
            Method::Update => self.render_update(),
            Method::Delete => self.render_delete(),
        }
    }

    fn require_source(&self, statement: &str) -> crate::Result<SQL> {
        self.source
            .clone()
            .ok_or_else(|| SqlError::Statement(format!("{statement} requires a table")))
    }

    fn render_select(&self) -> SQL {
        let mut sql = SQL::token(Token::SELECT);

        if self.distinct {
            sql.push_mut(Token::DISTINCT);
        }

        let use_top = self.dialect == Dialect::MsSql && self.offset.is_none();
        if use_top && let Some(limit) = self.limit {
            sql.push_mut(Token::TOP);
            sql.append_mut(SQL::param(limit).parens());
        }

        if self.columns.is_empty() {
            sql.push_mut(Token::STAR);
        } else {
            sql.append_mut(SQL::join(self.columns.iter().cloned(), Token::COMMA));
        }

        if let Some(source) = &self.source {
            sql.push_mut(Token::FROM);
            sql.append_mut(source.clone());
        }

        for join in &self.joins {
            sql.append_mut(join.clone());
        }

        self.render_where(&mut sql);

        if !self.groups.is_empty() {
            sql.push_mut(Token::GROUP_BY);
            sql.append_mut(SQL::join(self.groups.iter().cloned(), Token::COMMA));
        }

        if !self.havings.is_empty() {
            sql.push_mut(Token::HAVING);
            sql.append_mut(render_clauses(&self.havings));
        }

        if !self.orders.is_empty() {
            sql.push_mut(Token::ORDER_BY);
            sql.append_mut(SQL::join(self.orders.iter().cloned(), Token::COMMA));
        }

        if self.dialect == Dialect::MsSql {
            if let Some(offset) = self.offset {
                sql.push_mut(Token::OFFSET);
                sql.append_mut(SQL::param(offset).append(SQL::word("rows")));
                if let Some(limit) = self.limit {
                    sql.append_mut(SQL::word("fetch next"));
                    sql.append_mut(SQL::param(limit).append(SQL::word("rows only")));
                }
            }
        } else {
            if let Some(limit) = self.limit {
                sql.push_mut(Token::LIMIT);
                sql.append_mut(SQL::param(limit));
            }
            if let Some(offset) = self.offset {
                sql.push_mut(Token::OFFSET);
                sql.append_mut(SQL::param(offset));
            }
        }

        sql
    }

    fn render_where(&self, sql: &mut SQL) {
        if !self.wheres.is_empty() {
            sql.push_mut(Token::WHERE);
            sql.append_mut(render_clauses(&self.wheres));
        }
    }

    fn render_returning(&self, sql: &mut SQL) {
        if self.returning.is_empty() {
            return;
        }
        match self.dialect {
            Dialect::PostgreSQL | Dialect::SQLite => {
                sql.push_mut(Token::RETURNING);
                sql.append_mut(SQL::ident_list(self.returning.iter().cloned()));
            }
            // MSSQL places `output` before `values`/`where`, MySQL has none
            Dialect::MsSql | Dialect::MySQL => {}
        }
    }

    fn render_output(&self, sql: &mut SQL, prefix: &str) {
        if self.dialect != Dialect::MsSql || self.returning.is_empty() {
            return;
        }
        sql.push_mut(Token::OUTPUT);
        sql.append_mut(SQL::ident_list(
            self.returning
                .iter()
                .map(|column| CompactString::from(format!("{prefix}.{column}"))),
        ));
    }

    fn render_insert(&self) -> crate::Result<SQL> {
        let source = self.require_source("insert")?;

        let ignore = self.dialect == Dialect::MySQL
            && matches!(
                self.on_conflict.as_ref().map(|c| &c.action),
                Some(ConflictAction::Ignore)
            );
        let mut sql = SQL::token(if ignore {
            Token::INSERT_IGNORE_INTO
        } else {
            Token::INSERT_INTO
        })
        .append(source);

        let mut columns: Vec<CompactString> = Vec::new();
        for row in &self.rows {
            for (column, _) in row {
                if !columns.contains(column) {
                    columns.push(column.clone());
                }
            }
        }

        if columns.is_empty() {
            if self.dialect == Dialect::MySQL {
                sql.append_mut(SQL::raw("() values ()"));
            } else {
                self.render_output(&mut sql, "inserted");
                sql.push_mut(Token::DEFAULT_VALUES);
            }
        } else {
            sql.append_mut(SQL::ident_list(columns.iter().cloned()).parens());
            self.render_output(&mut sql, "inserted");
            sql.push_mut(Token::VALUES);

            let rows = self.rows.iter().map(|row| {
                let values = columns.iter().map(|column| {
                    row.iter()
                        .find(|(c, _)| c == column)
                        .map(|(_, value)| value.clone())
                        .unwrap_or_else(|| self.missing_value())
                });
                SQL::join(values, Token::COMMA).parens()
            });
            sql.append_mut(SQL::join(rows, Token::COMMA));
        }

        if let Some(conflict) = &self.on_conflict {
            self.render_on_conflict(&mut sql, conflict, &columns)?;
        }

        self.render_returning(&mut sql);
        Ok(sql)
    }

    fn missing_value(&self) -> SQL {
        match self.dialect {
            Dialect::SQLite => SQL::param(Value::Null),
            _ => SQL::word("default"),
        }
    }

    fn render_on_conflict(
        &self,
        sql: &mut SQL,
        conflict: &super::OnConflict,
        inserted: &[CompactString],
    ) -> crate::Result<()> {
        let assignments = |columns: &[CompactString], excluded: fn(&CompactString) -> SQL| {
            SQL::join(
                columns.iter().map(|column| {
                    SQL::ident(column.clone())
                        .push(Token::EQ)
                        .append(excluded(column))
                }),
                Token::COMMA,
            )
        };

        match self.dialect {
            Dialect::PostgreSQL | Dialect::SQLite => {
                sql.push_mut(Token::ON_CONFLICT);
                if !conflict.columns.is_empty() {
                    sql.append_mut(SQL::ident_list(conflict.columns.iter().cloned()).parens());
                }
                match &conflict.action {
                    ConflictAction::Pending | ConflictAction::Ignore => {
                        sql.push_mut(Token::DO_NOTHING);
                    }
                    ConflictAction::Merge(columns) => {
                        let columns = columns.as_deref().unwrap_or(inserted);
                        sql.push_mut(Token::DO_UPDATE_SET);
                        sql.append_mut(assignments(columns, |c| {
                            SQL::ident(CompactString::from(format!("excluded.{c}")))
                        }));
                    }
                    ConflictAction::MergeValues(values) => {
                        sql.push_mut(Token::DO_UPDATE_SET);
                        sql.append_mut(render_assignments(values));
                    }
                }
            }
            Dialect::MySQL => match &conflict.action {
                ConflictAction::Pending | ConflictAction::Ignore => {}
                ConflictAction::Merge(columns) => {
                    let columns = columns.as_deref().unwrap_or(inserted);
                    sql.push_mut(Token::ON_DUPLICATE_KEY_UPDATE);
                    sql.append_mut(assignments(columns, |c| {
                        SQL::func("values", SQL::ident(c.clone()))
                    }));
                }
                ConflictAction::MergeValues(values) => {
                    sql.push_mut(Token::ON_DUPLICATE_KEY_UPDATE);
                    sql.append_mut(render_assignments(values));
                }
            },
            Dialect::MsSql => {
                return Err(SqlError::Statement(
                    "on_conflict is not supported by mssql".into(),
                ));
            }
        }

        Ok(())
    }

    fn render_update(&self) -> crate::Result<SQL> {
        let source = self.require_source("update")?;
        if self.updates.is_empty() {
            return Err(SqlError::Statement("update requires at least one column".into()));
        }

        let mut sql = SQL::token(Token::UPDATE)
            .append(source)
            .push(Token::SET)
            .append(render_assignments(&self.updates));
        self.render_output(&mut sql, "inserted");
        self.render_where(&mut sql);
        self.render_returning(&mut sql);
        Ok(sql)
    }

    fn render_delete(&self) -> crate::Result<SQL> {
        let source = self.require_source("delete")?;
        let mut sql = SQL::token(Token::DELETE_FROM).append(source);
        self.render_output(&mut sql, "deleted");
        self.render_where(&mut sql);
        self.render_returning(&mut sql);
        Ok(sql)
    }
}

fn render_assignments(pairs: &[(CompactString, SQL)]) -> SQL {
    SQL::join(
        pairs.iter().map(|(column, value)| {
            SQL::ident(column.clone())
                .push(Token::EQ)
                .append(value.clone())
        }),
        Token::COMMA,
    )
}
