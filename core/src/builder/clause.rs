use compact_str::CompactString;

use crate::sql::{SQL, Token};

/// How a condition is chained onto the conditions before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Boolean {
    #[default]
    And,
    Or,
}

impl Boolean {
    pub(crate) const fn token(self) -> Token {
        match self {
            Boolean::And => Token::AND,
            Boolean::Or => Token::OR,
        }
    }
}

/// A single `where`/`having` condition with its chaining boolean.
#[derive(Debug, Clone, PartialEq)]
pub struct Clause {
    pub boolean: Boolean,
    pub sql: SQL,
}

/// Renders a list of clauses joined by their booleans. The first clause's
/// boolean is ignored.
pub(crate) fn render_clauses(clauses: &[Clause]) -> SQL {
    let mut out = SQL::empty();
    for (i, clause) in clauses.iter().enumerate() {
        if i > 0 {
            out.push_mut(clause.boolean.token());
        }
        out.append_mut(clause.sql.clone());
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    LeftOuter,
    Right,
    RightOuter,
    FullOuter,
    Cross,
}

impl JoinKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            JoinKind::Inner => "inner join",
            JoinKind::Left => "left join",
            JoinKind::LeftOuter => "left outer join",
            JoinKind::Right => "right join",
            JoinKind::RightOuter => "right outer join",
            JoinKind::FullOuter => "full outer join",
            JoinKind::Cross => "cross join",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Order {
    #[default]
    Asc,
    Desc,
}

impl Order {
    pub fn parse(s: &str) -> Option<Self> {
        if s.eq_ignore_ascii_case("asc") {
            Some(Order::Asc)
        } else if s.eq_ignore_ascii_case("desc") {
            Some(Order::Desc)
        } else {
            None
        }
    }

    pub(crate) const fn token(self) -> Token {
        match self {
            Order::Asc => Token::ASC,
            Order::Desc => Token::DESC,
        }
    }
}

/// What to do when an insert hits a conflicting row.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ConflictAction {
    /// `on_conflict` was called but neither `ignore` nor `merge` yet
    #[default]
    Pending,
    Ignore,
    /// Update the listed columns from the excluded row, or every inserted
    /// column when `None`
    Merge(Option<Vec<CompactString>>),
    /// Update with explicit assignments
    MergeValues(Vec<(CompactString, SQL)>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct OnConflict {
    pub columns: Vec<CompactString>,
    pub action: ConflictAction,
}
