mod chunk;
mod raw;
mod tokens;

pub use chunk::*;
pub use raw::Binding;
pub use tokens::*;

use compact_str::CompactString;
use serde_json::Value;
use smallvec::SmallVec;

use crate::dialect::{Dialect, DialectExt};

/// SQL fragment builder with flat chunk storage.
///
/// Fragments are dialect neutral: identifiers are quoted and placeholders
/// numbered only when [`SQL::build`] renders them for a concrete dialect.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SQL {
    pub chunks: SmallVec<[SqlChunk; 8]>,
}

impl SQL {
    // ==================== constructors ====================

    /// Creates an empty SQL fragment
    #[inline]
    pub const fn empty() -> Self {
        Self {
            chunks: SmallVec::new_const(),
        }
    }

    /// Creates SQL with a single token
    #[inline]
    pub fn token(t: Token) -> Self {
        Self {
            chunks: smallvec::smallvec![SqlChunk::Token(t)],
        }
    }

    /// Creates SQL with a quoted identifier
    #[inline]
    pub fn ident(name: impl Into<CompactString>) -> Self {
        Self {
            chunks: smallvec::smallvec![SqlChunk::Ident(name.into())],
        }
    }

    /// Creates SQL with unquoted, word spaced text
    #[inline]
    pub fn word(text: impl Into<CompactString>) -> Self {
        Self {
            chunks: smallvec::smallvec![SqlChunk::Word(text.into())],
        }
    }

    /// Creates SQL with verbatim text
    #[inline]
    pub fn raw(text: impl Into<CompactString>) -> Self {
        Self {
            chunks: smallvec::smallvec![SqlChunk::raw(text)],
        }
    }

    /// Creates SQL with a single parameter value
    #[inline]
    pub fn param(value: impl Into<Value>) -> Self {
        Self {
            chunks: smallvec::smallvec![SqlChunk::Param(value.into())],
        }
    }

    /// Creates SQL from raw text containing `?` value markers and `??`
    /// identifier markers. `\?` renders a literal question mark.
    pub fn raw_with_bindings(
        sql: &str,
        bindings: impl IntoIterator<Item = Binding>,
    ) -> crate::Result<Self> {
        raw::parse(sql, bindings.into_iter().collect())
    }

    /// Creates SQL for a function call: NAME(args)
    #[inline]
    pub fn func(name: impl Into<CompactString>, args: SQL) -> Self {
        SQL::word(name)
            .push(Token::LPAREN)
            .append(args)
            .push(Token::RPAREN)
    }

    // ==================== builder methods ====================

    /// Append another SQL fragment (flat extend)
    #[inline]
    pub fn append(mut self, other: impl Into<SQL>) -> Self {
        self.append_mut(other);
        self
    }

    #[inline]
    pub fn append_mut(&mut self, other: impl Into<SQL>) {
        let other = other.into();

        if self.chunks.is_empty() {
            self.chunks = other.chunks;
            return;
        }
        if other.chunks.is_empty() {
            return;
        }

        self.chunks.extend(other.chunks);
    }

    /// Push a single chunk
    #[inline]
    pub fn push(mut self, chunk: impl Into<SqlChunk>) -> Self {
        self.chunks.push(chunk.into());
        self
    }

    #[inline]
    pub fn push_mut(&mut self, chunk: impl Into<SqlChunk>) {
        self.chunks.push(chunk.into());
    }

    // ==================== combinators ====================

    /// Joins multiple SQL fragments with a separator
    pub fn join<T>(sqls: T, separator: Token) -> SQL
    where
        T: IntoIterator,
        T::Item: Into<SQL>,
    {
        let mut iter = sqls.into_iter();
        let Some(first) = iter.next() else {
            return SQL::empty();
        };

        let mut result = first.into();
        for item in iter {
            result.chunks.push(SqlChunk::Token(separator));
            result.append_mut(item);
        }
        result
    }

    /// Wrap in parentheses: (self)
    #[inline]
    pub fn parens(self) -> Self {
        SQL::token(Token::LPAREN).append(self).push(Token::RPAREN)
    }

    /// Creates an aliased version: self as "name"
    pub fn alias(self, name: impl Into<CompactString>) -> SQL {
        self.push(Token::AS).push(SqlChunk::Ident(name.into()))
    }

    /// Creates a comma-separated list of parameters.
    pub fn param_list<I>(values: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        let iter = values.into_iter();
        let (lower, _) = iter.size_hint();
        let mut chunks = SmallVec::with_capacity(lower.saturating_mul(2));
        for (i, v) in iter.enumerate() {
            if i > 0 {
                chunks.push(SqlChunk::Token(Token::COMMA));
            }
            chunks.push(SqlChunk::Param(v.into()));
        }
        SQL { chunks }
    }

    /// Creates a comma-separated list of identifiers
    pub fn ident_list<I>(names: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<CompactString>,
    {
        SQL::join(names.into_iter().map(SQL::ident), Token::COMMA)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Check if this SQL fragment is a subquery (starts with select)
    #[inline]
    pub fn is_subquery(&self) -> bool {
        matches!(self.chunks.first(), Some(SqlChunk::Token(Token::SELECT)))
    }

    // ==================== output methods ====================

    /// Generates the SQL string and collects parameter values in a single pass.
    pub fn build(&self, dialect: Dialect) -> (String, Vec<Value>) {
        let mut buf = String::with_capacity(self.chunks.len().saturating_mul(8).max(64));
        let mut params = Vec::new();
        self.write_to(dialect, &mut buf, &mut params);
        (buf, params)
    }

    /// Returns the SQL string with dialect-appropriate placeholders.
    pub fn sql(&self, dialect: Dialect) -> String {
        self.build(dialect).0
    }

    /// Returns the parameter values in placeholder order
    pub fn params(&self) -> Vec<Value> {
        self.build(Dialect::SQLite).1
    }

    fn write_to(&self, dialect: Dialect, buf: &mut String, params: &mut Vec<Value>) {
        for (i, chunk) in self.chunks.iter().enumerate() {
            match chunk {
                SqlChunk::Token(token) => buf.push_str(token.as_str()),
                SqlChunk::Ident(name) => dialect.quote_identifier(name, buf),
                SqlChunk::Word(text) => buf.push_str(text),
                SqlChunk::Param(value) => write_param(dialect, value, buf, params),
                SqlChunk::Raw(raw) => {
                    for part in &raw.parts {
                        match part {
                            RawPart::Text(text) => buf.push_str(text),
                            RawPart::Ident(name) => dialect.quote_identifier(name, buf),
                            RawPart::Param(value) => write_param(dialect, value, buf, params),
                            RawPart::Sql(sql) => sql.write_to(dialect, buf, params),
                        }
                    }
                }
            }

            if let Some(next) = self.chunks.get(i + 1)
                && chunk_needs_space(chunk, next)
            {
                buf.push(' ');
            }
        }
    }
}

fn write_param(dialect: Dialect, value: &Value, buf: &mut String, params: &mut Vec<Value>) {
    params.push(value.clone());
    buf.push_str(&dialect.render_placeholder(params.len()));
}

/// Canonical spacing logic for SQL chunk rendering.
pub(crate) fn chunk_needs_space(current: &SqlChunk, next: &SqlChunk) -> bool {
    match (current, next) {
        // Raw text that brings its own whitespace
        (SqlChunk::Raw(raw), _) if raw.ends_with_space() => false,
        (_, SqlChunk::Raw(raw)) if raw.starts_with_space() => false,
        // No space before closing/separator punctuation
        (_, SqlChunk::Token(Token::RPAREN | Token::COMMA | Token::DOT)) => false,
        // No space after opening punctuation
        (SqlChunk::Token(Token::LPAREN | Token::DOT), _) => false,
        // Space after comma
        (SqlChunk::Token(Token::COMMA), _) => true,
        // Space after closing paren if next is word-like (e.g., ") from")
        (SqlChunk::Token(Token::RPAREN), next) => next.is_word_like(),
        // Function calls: count(...)
        (SqlChunk::Word(_), SqlChunk::Token(Token::LPAREN)) => false,
        // Space before opening paren if preceded by word-like (e.g., "in (")
        (current, SqlChunk::Token(Token::LPAREN)) => current.is_word_like(),
        _ => current.is_word_like() && next.is_word_like(),
    }
}

// ==================== trait implementations ====================

impl From<Token> for SQL {
    fn from(value: Token) -> Self {
        SQL::token(value)
    }
}

impl From<SqlChunk> for SQL {
    fn from(value: SqlChunk) -> Self {
        Self {
            chunks: smallvec::smallvec![value],
        }
    }
}

impl FromIterator<SqlChunk> for SQL {
    fn from_iter<I: IntoIterator<Item = SqlChunk>>(iter: I) -> Self {
        Self {
            chunks: SmallVec::from_iter(iter),
        }
    }
}

impl IntoIterator for SQL {
    type Item = SqlChunk;
    type IntoIter = smallvec::IntoIter<[SqlChunk; 8]>;

    fn into_iter(self) -> Self::IntoIter {
        self.chunks.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn spacing_and_placeholders() {
        let sql = SQL::token(Token::SELECT)
            .push(Token::STAR)
            .push(Token::FROM)
            .append(SQL::ident("person"))
            .push(Token::WHERE)
            .append(SQL::ident("person.id"))
            .push(Token::IN)
            .append(SQL::param_list([json!(1), json!(2)]).parens());

        let (text, params) = sql.build(Dialect::PostgreSQL);
        assert_eq!(
            text,
            r#"select * from "person" where "person"."id" in ($1, $2)"#
        );
        assert_eq!(params, vec![json!(1), json!(2)]);

        assert_eq!(
            sql.sql(Dialect::MySQL),
            "select * from `person` where `person`.`id` in (?, ?)"
        );
    }

    #[test]
    fn function_calls_hug_their_parens() {
        let sql = SQL::token(Token::SELECT).append(SQL::func("count", SQL::token(Token::STAR)));
        assert_eq!(sql.sql(Dialect::SQLite), "select count(*)");
    }

    #[test]
    fn alias_and_join() {
        let sql = SQL::join([SQL::ident("a"), SQL::ident("b")], Token::COMMA)
            .parens()
            .alias("v");
        assert_eq!(sql.sql(Dialect::SQLite), r#"("a", "b") as "v""#);
    }
}
