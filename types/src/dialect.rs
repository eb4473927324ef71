//! Unified database dialect enum
//!
//! A connection resolves its dialect once and every dialect dependent
//! decision (placeholder style, identifier quoting, composite `IN`
//! emulation, batch insert eligibility) is a `match` on this enum.

/// SQL dialect for database-specific behavior
///
/// # Examples
///
/// ```
/// use quarry_types::Dialect;
///
/// let dialect = Dialect::PostgreSQL;
/// assert!(dialect.uses_numbered_placeholders());
///
/// let sqlite = Dialect::SQLite;
/// assert!(!sqlite.uses_numbered_placeholders());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Dialect {
    /// SQLite - uses `?` positional placeholders
    ///
    /// Compatible with: rusqlite, libsql, turso
    #[default]
    SQLite,

    /// PostgreSQL - uses `$1, $2, ...` numbered placeholders
    PostgreSQL,

    /// MySQL - uses `?` positional placeholders and backtick identifiers
    MySQL,

    /// Microsoft SQL Server - uses `@p0, @p1, ...` placeholders and
    /// bracketed identifiers
    MsSql,
}

impl Dialect {
    /// Returns `true` if this dialect uses numbered placeholders (`$1, $2, ...`)
    #[inline]
    #[must_use]
    pub const fn uses_numbered_placeholders(&self) -> bool {
        matches!(self, Dialect::PostgreSQL)
    }

    /// Returns `true` if a single `INSERT` may carry more than one row *and*
    /// report back an identifier for each of them.
    #[inline]
    #[must_use]
    pub const fn supports_batch_insert(&self) -> bool {
        matches!(self, Dialect::PostgreSQL | Dialect::MsSql)
    }

    /// Returns `true` if the dialect can return inserted rows from an
    /// `INSERT` statement (`RETURNING` / `OUTPUT`).
    #[inline]
    #[must_use]
    pub const fn supports_returning(&self) -> bool {
        matches!(self, Dialect::PostgreSQL | Dialect::MsSql)
    }

    /// Parse a dialect from a string (case-insensitive)
    ///
    /// Supports the common client names:
    /// - SQLite: `"sqlite"`, `"sqlite3"`, `"better-sqlite3"`, `"turso"`, `"libsql"`
    /// - PostgreSQL: `"postgresql"`, `"postgres"`, `"pg"`, `"pgnative"`, `"cockroachdb"`, `"redshift"`
    /// - MySQL: `"mysql"`, `"mysql2"`
    /// - SQL Server: `"mssql"`, `"sqlserver"`, `"tedious"`
    ///
    /// # Examples
    ///
    /// ```
    /// use quarry_types::Dialect;
    ///
    /// assert_eq!(Dialect::parse("sqlite3"), Some(Dialect::SQLite));
    /// assert_eq!(Dialect::parse("pg"), Some(Dialect::PostgreSQL));
    /// assert_eq!(Dialect::parse("tedious"), Some(Dialect::MsSql));
    /// assert_eq!(Dialect::parse("unknown"), None);
    /// ```
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        const SQLITE: &[&str] = &["sqlite", "sqlite3", "better-sqlite3", "turso", "libsql"];
        const POSTGRES: &[&str] = &[
            "postgresql",
            "postgres",
            "pg",
            "pgnative",
            "cockroachdb",
            "redshift",
        ];
        const MYSQL: &[&str] = &["mysql", "mysql2"];
        const MSSQL: &[&str] = &["mssql", "sqlserver", "tedious"];

        let any = |names: &[&str]| names.iter().any(|n| s.eq_ignore_ascii_case(n));

        if any(SQLITE) {
            Some(Dialect::SQLite)
        } else if any(POSTGRES) {
            Some(Dialect::PostgreSQL)
        } else if any(MYSQL) {
            Some(Dialect::MySQL)
        } else if any(MSSQL) {
            Some(Dialect::MsSql)
        } else {
            None
        }
    }

    /// Get the dialect name as a lowercase string
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Dialect::SQLite => "sqlite",
            Dialect::PostgreSQL => "postgresql",
            Dialect::MySQL => "mysql",
            Dialect::MsSql => "mssql",
        }
    }
}

impl core::fmt::Display for Dialect {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for Dialect {
    type Err = DialectParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Dialect::parse(s).ok_or(DialectParseError)
    }
}

/// Error returned when parsing an unknown dialect string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DialectParseError;

impl core::fmt::Display for DialectParseError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("unknown dialect")
    }
}

#[cfg(feature = "std")]
impl std::error::Error for DialectParseError {}
