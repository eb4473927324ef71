//! Dialect type re-exported from quarry-types with rendering extensions.

use std::borrow::Cow;

/// Re-export the unified Dialect enum from quarry-types
pub use quarry_types::Dialect;

/// Extension trait for dialect specific rendering
pub trait DialectExt {
    /// Renders a placeholder for this dialect with the given 1-based index.
    ///
    /// # Examples
    /// - PostgreSQL: `$1`, `$2`, `$3`
    /// - SQL Server: `@p0`, `@p1`, `@p2`
    /// - SQLite/MySQL: `?`
    fn render_placeholder(&self, index: usize) -> Cow<'static, str>;

    /// Quotes an identifier. Dotted names are quoted per segment, `*` is left
    /// bare and `name as alias` is split into an aliased pair.
    fn quote_identifier(&self, ident: &str, buf: &mut String);
}

impl DialectExt for Dialect {
    #[inline]
    fn render_placeholder(&self, index: usize) -> Cow<'static, str> {
        match self {
            Dialect::PostgreSQL => Cow::Owned(format!("${}", index)),
            Dialect::MsSql => Cow::Owned(format!("@p{}", index.saturating_sub(1))),
            Dialect::SQLite | Dialect::MySQL => Cow::Borrowed("?"),
        }
    }

    fn quote_identifier(&self, ident: &str, buf: &mut String) {
        if let Some((name, alias)) = split_alias(ident) {
            self.quote_identifier(name, buf);
            buf.push_str(" as ");
            quote_segment(*self, alias, buf);
            return;
        }

        for (i, segment) in ident.trim().split('.').enumerate() {
            if i > 0 {
                buf.push('.');
            }
            quote_segment(*self, segment, buf);
        }
    }
}

/// Splits `"name as alias"` (case-insensitive `as`) into its two halves.
pub fn split_alias(ident: &str) -> Option<(&str, &str)> {
    let lower = ident.to_ascii_lowercase();
    let pos = lower.find(" as ")?;
    Some((ident[..pos].trim(), ident[pos + 4..].trim()))
}

fn quote_segment(dialect: Dialect, segment: &str, buf: &mut String) {
    if segment == "*" {
        buf.push('*');
        return;
    }

    let (open, close) = match dialect {
        Dialect::MySQL => ('`', '`'),
        Dialect::MsSql => ('[', ']'),
        Dialect::SQLite | Dialect::PostgreSQL => ('"', '"'),
    };

    buf.push(open);
    for c in segment.chars() {
        if c == close {
            // Escape by doubling the closing quote
            buf.push(close);
        }
        buf.push(c);
    }
    buf.push(close);
}
