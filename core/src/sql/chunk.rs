use compact_str::CompactString;
use serde_json::Value;

use super::tokens::Token;

/// A SQL chunk represents a part of an SQL statement.
///
/// - `Token` - SQL keywords and punctuation (select, from, =, etc.)
/// - `Ident` - Quoted identifiers, quoted per dialect at render time
/// - `Word` - Unquoted text that takes part in word spacing (operators,
///   function names, numeric literals)
/// - `Raw` - Verbatim SQL text with embedded bindings; no spacing is ever
///   inserted inside it, outside it behaves like a word
/// - `Param` - A bound value rendered as a dialect placeholder
#[derive(Debug, Clone, PartialEq)]
pub enum SqlChunk {
    /// Renders as: keyword with automatic spacing rules
    Token(Token),

    /// Renders as: "name" / `name` / [name] depending on dialect
    Ident(CompactString),

    /// Renders as: text, spaced like a keyword
    Word(CompactString),

    /// Renders as: its parts, exactly as given
    Raw(RawSql),

    /// Renders as: ? or $1 or @p0 depending on dialect
    Param(Value),
}

impl SqlChunk {
    #[inline]
    pub const fn token(t: Token) -> Self {
        Self::Token(t)
    }

    #[inline]
    pub fn ident(name: impl Into<CompactString>) -> Self {
        Self::Ident(name.into())
    }

    #[inline]
    pub fn word(text: impl Into<CompactString>) -> Self {
        Self::Word(text.into())
    }

    #[inline]
    pub fn raw(text: impl Into<CompactString>) -> Self {
        Self::Raw(RawSql {
            parts: vec![RawPart::Text(text.into())],
        })
    }

    #[inline]
    pub fn param(value: impl Into<Value>) -> Self {
        Self::Param(value.into())
    }

    /// Check if this chunk is "word-like" (needs space separation from other word-like chunks)
    #[inline]
    pub(crate) const fn is_word_like(&self) -> bool {
        match self {
            SqlChunk::Token(t) => !t.is_punctuation(),
            SqlChunk::Ident(_) | SqlChunk::Word(_) | SqlChunk::Param(_) | SqlChunk::Raw(_) => true,
        }
    }
}

/// Verbatim SQL text interleaved with bound identifiers, values and
/// nested fragments.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawSql {
    pub parts: Vec<RawPart>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RawPart {
    Text(CompactString),
    Ident(CompactString),
    Param(Value),
    Sql(super::SQL),
}

impl RawSql {
    /// `true` if the text starts with whitespace
    pub(crate) fn starts_with_space(&self) -> bool {
        matches!(self.parts.first(), Some(RawPart::Text(t)) if t.starts_with(char::is_whitespace))
    }

    /// `true` if the text ends with whitespace
    pub(crate) fn ends_with_space(&self) -> bool {
        matches!(self.parts.last(), Some(RawPart::Text(t)) if t.ends_with(char::is_whitespace))
    }
}

impl From<Token> for SqlChunk {
    #[inline]
    fn from(value: Token) -> Self {
        Self::Token(value)
    }
}

impl From<Value> for SqlChunk {
    #[inline]
    fn from(value: Value) -> Self {
        Self::Param(value)
    }
}
