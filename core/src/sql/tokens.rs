/// SQL keywords and punctuation.
///
/// Rendered lowercase. Multi-word keywords are a single token so the
/// spacing rules in [`super::chunk_needs_space`] never split them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(non_camel_case_types, clippy::upper_case_acronyms)]
pub enum Token {
    // punctuation
    LPAREN,
    RPAREN,
    COMMA,
    DOT,
    STAR,
    EQ,

    // statements
    SELECT,
    DISTINCT,
    FROM,
    INSERT_INTO,
    VALUES,
    DEFAULT_VALUES,
    UPDATE,
    SET,
    DELETE_FROM,
    RETURNING,
    OUTPUT,

    // clauses
    WHERE,
    GROUP_BY,
    HAVING,
    ORDER_BY,
    LIMIT,
    OFFSET,
    ON,
    AS,
    TOP,

    // conditions
    AND,
    OR,
    NOT,
    IN,
    IS,
    NULL,
    EXISTS,
    BETWEEN,

    // ordering
    ASC,
    DESC,

    // upserts
    ON_CONFLICT,
    DO_NOTHING,
    DO_UPDATE_SET,
    ON_DUPLICATE_KEY_UPDATE,
    INSERT_IGNORE_INTO,
}

impl Token {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Token::LPAREN => "(",
            Token::RPAREN => ")",
            Token::COMMA => ",",
            Token::DOT => ".",
            Token::STAR => "*",
            Token::EQ => "=",
            Token::SELECT => "select",
            Token::DISTINCT => "distinct",
            Token::FROM => "from",
            Token::INSERT_INTO => "insert into",
            Token::VALUES => "values",
            Token::DEFAULT_VALUES => "default values",
            Token::UPDATE => "update",
            Token::SET => "set",
            Token::DELETE_FROM => "delete from",
            Token::RETURNING => "returning",
            Token::OUTPUT => "output",
            Token::WHERE => "where",
            Token::GROUP_BY => "group by",
            Token::HAVING => "having",
            Token::ORDER_BY => "order by",
            Token::LIMIT => "limit",
            Token::OFFSET => "offset",
            Token::ON => "on",
            Token::AS => "as",
            Token::TOP => "top",
            Token::AND => "and",
            Token::OR => "or",
            Token::NOT => "not",
            Token::IN => "in",
            Token::IS => "is",
            Token::NULL => "null",
            Token::EXISTS => "exists",
            Token::BETWEEN => "between",
            Token::ASC => "asc",
            Token::DESC => "desc",
            Token::ON_CONFLICT => "on conflict",
            Token::DO_NOTHING => "do nothing",
            Token::DO_UPDATE_SET => "do update set",
            Token::ON_DUPLICATE_KEY_UPDATE => "on duplicate key update",
            Token::INSERT_IGNORE_INTO => "insert ignore into",
        }
    }

    /// Punctuation never takes part in word spacing.
    #[inline]
    pub const fn is_punctuation(&self) -> bool {
        matches!(
            self,
            Token::LPAREN | Token::RPAREN | Token::COMMA | Token::DOT
        )
    }
}

impl core::fmt::Display for Token {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}
