//! Field expressions: `[schema.][table.]column[:json.path[0]]`.
//!
//! The part before the first `:` names a column, split into table and column
//! on its last dot. The optional part after it addresses a value inside a
//! JSON column with `.key` and `[key]` / `[index]` steps:
//!
//! ```text
//! Person.json:details.names[1]      -> details, names, 1
//! Table.col:[1][3]                  -> 1 (array), 3 (array)
//! Table.col:['keywith.dots']        -> keywith.dots
//! Table.col:["single.'quote'.[]"]   -> single.'quote'.[]
//! ```
//!
//! A bracket holding only digits is an array index, anything else is an
//! object key. Quotes around a bracketed key are stripped unless the key is
//! nothing but quotes. A `[` or another reserved character right after a `.`
//! is rejected.

use std::fmt;

use thiserror::Error;

use crate::cache::ParseCache;

const RESERVED: [char; 3] = ['.', '[', ']'];

/// A malformed field expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct FieldExpressionError {
    message: String,
}

impl FieldExpressionError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    fn found(expected: &str, found: char) -> Self {
        Self::new(format!("Expected {expected} but \"{found}\" found."))
    }

    fn end_of_input(expected: &str) -> Self {
        Self::new(format!("Expected {expected} but end of input found."))
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

type Result<T> = std::result::Result<T, FieldExpressionError>;

/// One step into a JSON value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum JsonAccess {
    Object(String),
    Array(usize),
}

impl fmt::Display for JsonAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JsonAccess::Object(key) => f.write_str(key),
            JsonAccess::Array(index) => write!(f, "{index}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldExpression {
    /// `table.column`, or just `column` without a table
    pub column_name: String,
    pub column: String,
    pub table: Option<String>,
    pub access: Vec<JsonAccess>,
}

impl FieldExpression {
    pub fn parse(expr: &str) -> Result<Self> {
        parse(expr)
    }

    /// Parses through `cache`, returning a clone of an earlier parse of the
    /// same text when there is one.
    pub fn parse_cached(cache: &ParseCache<FieldExpression>, expr: &str) -> Result<Self> {
        cache.get_or_try_insert_with(expr, parse)
    }

    /// `true` when the expression addresses a whole column.
    pub fn is_plain(&self) -> bool {
        self.access.is_empty()
    }

    /// The access path as a Postgres text array literal: `{a,0,b}`.
    pub fn json_path(&self) -> String {
        let refs: Vec<String> = self.access.iter().map(ToString::to_string).collect();
        format!("{{{}}}", refs.join(","))
    }
}

fn clean(input: &str) -> String {
    input
        .chars()
        .filter(|c| !matches!(*c as u32, 0x00..=0x1F | 0x7F..=0x9F))
        .collect::<String>()
        .trim()
        .to_string()
}

fn parse(expr: &str) -> Result<FieldExpression> {
    let (column_part, json_part) = match expr.split_once(':') {
        Some((column, json)) => (clean(column), Some(clean(json))),
        None => (clean(expr), None),
    };

    if json_part.is_some() && column_part.is_empty() {
        return Err(FieldExpressionError::new("No column found."));
    }

    let (table, column) = match column_part.rsplit_once('.') {
        Some((table, column)) => (Some(table.to_string()), column.to_string()),
        None => (None, column_part.clone()),
    };
    let column_name = match &table {
        Some(table) if !table.is_empty() && !column.is_empty() => format!("{table}.{column}"),
        Some(table) if !table.is_empty() => table.clone(),
        _ => column.clone(),
    };

    let mut output = FieldExpression {
        column_name,
        column,
        table,
        access: Vec::new(),
    };

    let Some(json) = json_part else {
        return Ok(output);
    };

    let chars: Vec<char> = json.chars().collect();
    match chars.first() {
        None => {
            return Err(FieldExpressionError::end_of_input(
                "either \"[\" or none of \"[].\"",
            ));
        }
        Some(&c @ ('.' | ']')) => {
            return Err(FieldExpressionError::found(
                "either \"[\" or none of \"[].\"",
                c,
            ));
        }
        Some(_) => {}
    }

    parse_json_path(&chars, &mut output.access)?;
    Ok(output)
}

fn parse_json_path(mut expr: &[char], access: &mut Vec<JsonAccess>) -> Result<()> {
    let mut first = true;

    while let Some(&c) = expr.first() {
        match c {
            '[' => {
                let rest = &expr[1..];
                if rest.is_empty() {
                    return Err(FieldExpressionError::end_of_input("/[0-9]+/"));
                }
                let (step, next) = parse_bracket_reference(rest)?;
                access.push(step);
                expr = rest.get(next..).unwrap_or_default();
            }
            '.' => {
                let rest = &expr[1..];
                match rest.first() {
                    None => {
                        return Err(FieldExpressionError::end_of_input("none of \"[].\""));
                    }
                    Some(&reserved) if RESERVED.contains(&reserved) => {
                        return Err(FieldExpressionError::found("none of \"[].\"", reserved));
                    }
                    Some(_) => {}
                }
                let (key, next) = parse_object_key(rest);
                access.push(JsonAccess::Object(key));
                expr = &rest[next..];
            }
            c if first && !RESERVED.contains(&c) => {
                let (key, next) = parse_object_key(expr);
                access.push(JsonAccess::Object(key));
                expr = &expr[next..];
            }
            c => return Err(FieldExpressionError::found("\"[\" or \".\"", c)),
        }
        first = false;
    }

    Ok(())
}

fn parse_object_key(expr: &[char]) -> (String, usize) {
    let end = expr
        .iter()
        .position(|c| RESERVED.contains(c))
        .unwrap_or(expr.len());
    (expr[..end].iter().collect(), end)
}

/// Parses the inside of `[...]`. `expr` starts right after the `[`; the
/// returned index points past the closing `]`.
fn parse_bracket_reference(expr: &[char]) -> Result<(JsonAccess, usize)> {
    let len = expr.len();
    let first = expr[0];
    let mut end = 0;
    let mut is_array = false;
    let mut only_quotes = true;

    if first.is_ascii_digit() {
        is_array = true;
        while end < len && expr[end].is_ascii_digit() {
            end += 1;
        }
        if end < len && matches!(expr[end], '"' | '\'') {
            return Err(FieldExpressionError::found("\"]\"", expr[end]));
        }
        if end < len && expr[end] != ']' {
            is_array = false;
            while end < len && expr[end] != ']' {
                end += 1;
            }
        }
    } else if first == '\'' || first == '"' {
        (end, only_quotes) = parse_quoted(first, expr, 1)?;
    } else {
        while end < len && expr[end] != ']' {
            end += 1;
        }
    }

    if end >= len {
        return Err(FieldExpressionError::end_of_input("\"]\""));
    }
    if expr[end] != ']' {
        return Err(FieldExpressionError::found("\"]\"", expr[end]));
    }
    if end == 0 {
        return Err(FieldExpressionError::new("Expected a reference but \"]\" found"));
    }

    let text: String = expr[..end].iter().collect();
    let step = if is_array {
        let index = text
            .parse()
            .map_err(|_| FieldExpressionError::new(format!("Invalid array index \"{text}\"")))?;
        JsonAccess::Array(index)
    } else if matches!(first, '"' | '\'') && !only_quotes {
        JsonAccess::Object(expr[1..end - 1].iter().collect())
    } else {
        JsonAccess::Object(text)
    };

    Ok((step, end + 1))
}

/// Scans a quoted key starting at `end` (just past the opening quote).
/// Returns the index after the closing quote and whether the key consisted
/// of quote characters only.
fn parse_quoted(quote: char, expr: &[char], mut end: usize) -> Result<(usize, bool)> {
    let len = expr.len();
    let start = end;
    let mut only_quotes = true;

    while end < len && expr[end] == quote {
        end += 1;
    }
    if start < end && end < len && expr[end] != ']' {
        return Err(FieldExpressionError::found("\"]\"", expr[end]));
    }

    if end < len && expr[end] != ']' {
        while end < len && expr[end] != quote {
            only_quotes = false;
            end += 1;
        }
        if end < len && only_quotes {
            while end < len && expr[end] == quote {
                end += 1;
            }
        }
        if !only_quotes {
            end += 1;
        }
    }

    Ok((end, only_quotes))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obj(key: &str) -> JsonAccess {
        JsonAccess::Object(key.to_string())
    }

    fn arr(index: usize) -> JsonAccess {
        JsonAccess::Array(index)
    }

    fn access(expr: &str) -> Vec<JsonAccess> {
        parse(expr).unwrap().access
    }

    #[test]
    fn bracket_and_dot_references() {
        assert_eq!(access("col:[1]"), vec![arr(1)]);
        assert_eq!(access("col:['1']"), vec![obj("1")]);
        assert_eq!(access("col:[a]"), vec![obj("a")]);
        assert_eq!(access("col:['a']"), vec![obj("a")]);
        assert_eq!(access("col:[\"a\"]"), vec![obj("a")]);
        assert_eq!(access("col:a"), vec![obj("a")]);
    }

    #[test]
    fn numeric_looking_keys() {
        let parsed = parse("123").unwrap();
        assert_eq!(parsed.column, "123");
        assert_eq!(parsed.column_name, "123");
        assert!(parsed.access.is_empty());
        assert_eq!(parsed.table, None);

        assert_eq!(access("123:abc"), vec![obj("abc")]);
        assert_eq!(access("123:[1].abc"), vec![arr(1), obj("abc")]);
        assert_eq!(access("123:[1.2].abc"), vec![obj("1.2"), obj("abc")]);
        assert_eq!(access("123:[1.2][1].abc"), vec![obj("1.2"), arr(1), obj("abc")]);
        assert_eq!(access("123:[\"1.2\"][1].abc"), vec![obj("1.2"), arr(1), obj("abc")]);
    }

    #[test]
    fn table_is_split_on_the_last_dot() {
        let parsed = parse("schema.[myTable].column.foo").unwrap();
        assert_eq!(parsed.column, "foo");
        assert_eq!(parsed.table.as_deref(), Some("schema.[myTable].column"));
        assert_eq!(parsed.column_name, "schema.[myTable].column.foo");

        let parsed = parse("schema.myTable.json:foo)").unwrap();
        assert_eq!(parsed.table.as_deref(), Some("schema.myTable"));
        assert_eq!(parsed.column, "json");
        assert_eq!(parsed.access, vec![obj("foo)")]);
    }

    #[test]
    fn mixed_paths() {
        let parsed = parse("schema.myTable.json:0foo.bar[0].bob").unwrap();
        assert_eq!(parsed.table.as_deref(), Some("schema.myTable"));
        assert_eq!(parsed.column, "json");
        assert_eq!(parsed.column_name, "schema.myTable.json");
        assert_eq!(
            parsed.access,
            vec![obj("0foo"), obj("bar"), arr(0), obj("bob")]
        );

        assert_eq!(
            access("schema.myTable.json:0.bar[0].bob"),
            vec![obj("0"), obj("bar"), arr(0), obj("bob")]
        );
    }

    #[test]
    fn quoted_keys_may_contain_brackets() {
        assert_eq!(access("col:['[1.2]'][1].abc"), vec![obj("[1.2]"), arr(1), obj("abc")]);
        assert_eq!(access("col:[\"[1.2]\"][1].abc"), vec![obj("[1.2]"), arr(1), obj("abc")]);
        assert_eq!(access("col:field[\"nofa'].il\"]"), vec![obj("field"), obj("nofa'].il")]);
        assert_eq!(access("col:field['nofa\"].il']"), vec![obj("field"), obj("nofa\"].il")]);
    }

    #[test]
    fn keys_made_of_quotes_keep_them() {
        assert_eq!(access("col:[']"), vec![obj("'")]);
        assert_eq!(access("col:['']"), vec![obj("''")]);
        assert_eq!(access("col:[''']"), vec![obj("'''")]);
        assert_eq!(access("col:[\"]"), vec![obj("\"")]);
        assert_eq!(access("col:[\"\"]"), vec![obj("\"\"")]);
        assert_eq!(access("col:[\"\"\"]"), vec![obj("\"\"\"")]);
    }

    #[test]
    fn quotes_and_spaces_in_dot_references() {
        assert_eq!(access("col:I'mCool"), vec![obj("I'mCool")]);
        assert_eq!(access("col:PleaseMindThe\"Quote\""), vec![obj("PleaseMindThe\"Quote\"")]);
        assert_eq!(access("col:I work too [100]"), vec![obj("I work too "), arr(100)]);

        let parsed = parse("schema.MyCupOfTeaTable.cupOfTea:I work too [100]").unwrap();
        assert_eq!(parsed.table.as_deref(), Some("schema.MyCupOfTeaTable"));
        assert_eq!(parsed.column_name, "schema.MyCupOfTeaTable.cupOfTea");
        assert_eq!(parsed.access, vec![obj("I work too "), arr(100)]);
    }

    #[test]
    fn control_characters_are_removed() {
        let parsed = parse("  tbl.col\u{0007}:a\u{009F}.b ").unwrap();
        assert_eq!(parsed.column_name, "tbl.col");
        assert_eq!(parsed.access, vec![obj("a"), obj("b")]);
    }

    #[test]
    fn malformed_expressions_fail() {
        for expr in [
            ":[]",
            ":[nocolumn]",
            ":[\"nocolumn\"]",
            ":['nocolumn']",
            ":nocolumn",
            "col:",
            "col:.a",
            "col:]a",
            "col:[1].",
            "col:wat.[1]",
            "col:wat.['1']",
            "col:wat.[\"1\"]",
            "col:wat[1].[1]",
            "col:wat[1].['1']",
            "col:wat..b",
            "col:a[1",
            "col:a['1'",
            "col:a[\"1\"",
            "col:a[1].a[1",
            "col:a]",
            "col:a]'1'",
            "col:[1].a]1",
            "col:[1].a]\"1\"",
            "col:wat[]",
            "col:[1'a']",
            "col:['a'b]",
        ] {
            assert!(parse(expr).is_err(), "{expr} should fail");
        }
    }

    #[test]
    fn error_messages_name_the_offending_character() {
        assert_eq!(
            parse("col:wat[]").unwrap_err().message(),
            "Expected a reference but \"]\" found"
        );
        assert_eq!(
            parse("col:a[1").unwrap_err().message(),
            "Expected \"]\" but end of input found."
        );
        assert_eq!(
            parse("col:wat.[1]").unwrap_err().message(),
            "Expected none of \"[].\" but \"[\" found."
        );
    }

    #[test]
    fn json_path_literal() {
        assert_eq!(parse("t.c:a[0].b").unwrap().json_path(), "{a,0,b}");
    }

    #[test]
    fn cached_parses_are_reused() {
        let cache = ParseCache::unbounded();
        let first = FieldExpression::parse_cached(&cache, "t.c:a").unwrap();
        let second = FieldExpression::parse_cached(&cache, "t.c:a").unwrap();
        assert_eq!(first, second);
        assert_eq!(cache.len(), 1);
    }
}
