//! nom grammar for relation expressions.
//!
//! ```text
//! expression := list | term (',' term)*
//! list       := '[' term (',' term)* ','? ']'
//! term       := name ('.^' depth? | '.*')? ('(' name (',' name)* ')')? (' as ' name)? ('.' (list | term))?
//! ```

use indexmap::{IndexMap, IndexSet};
use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{tag, take_while1},
    character::complete::{char, digit1, multispace0, multispace1},
    combinator::{all_consuming, map, opt, value},
    multi::{separated_list0, separated_list1},
    sequence::{delimited, pair, preceded, terminated},
};

use super::{Recursion, RelationExpressionError, RelationNode};

// =============================================================================
// Intermediate terms
// =============================================================================

#[derive(Debug)]
struct Term {
    relation: String,
    alias: Option<String>,
    recursion: Marker,
    modify: Vec<String>,
    children: Vec<Term>,
}

#[derive(Debug, Clone, Copy)]
enum Marker {
    None,
    Recursive(Option<u32>),
    All,
}

// =============================================================================
// Combinators
// =============================================================================

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '$' | '-')
}

fn name(input: &str) -> IResult<&str, &str> {
    take_while1(is_name_char).parse(input)
}

fn comma(input: &str) -> IResult<&str, char> {
    delimited(multispace0, char(','), multispace0).parse(input)
}

/// `.^`, `.^3` or `.*`
fn recursion(input: &str) -> IResult<&str, Marker> {
    preceded(
        char('.'),
        alt((
            map(preceded(char('^'), opt(digit1)), |depth: Option<&str>| {
                // Depths that do not fit are treated as unbounded
                Marker::Recursive(depth.map(|d| d.parse::<u32>().unwrap_or(u32::MAX)))
            }),
            value(Marker::All, char('*')),
        )),
    )
    .parse(input)
}

fn modifiers(input: &str) -> IResult<&str, Vec<&str>> {
    delimited(
        pair(char('('), multispace0),
        separated_list0(comma, name),
        pair(multispace0, char(')')),
    )
    .parse(input)
}

fn alias(input: &str) -> IResult<&str, &str> {
    preceded((multispace1, tag("as"), multispace1), name).parse(input)
}

fn children(input: &str) -> IResult<&str, Vec<Term>> {
    preceded(
        delimited(multispace0, char('.'), multispace0),
        alt((list, map(term, |t| vec![t]))),
    )
    .parse(input)
}

fn term(input: &str) -> IResult<&str, Term> {
    let (input, relation) = name(input)?;
    let (input, recursion) = opt(recursion).parse(input)?;
    let (input, modify) = opt(preceded(multispace0, modifiers)).parse(input)?;
    let (input, alias) = opt(alias).parse(input)?;

    // A recursive term repeats itself and cannot name children
    let (input, children) = match recursion {
        Some(_) => (input, None),
        None => opt(children).parse(input)?,
    };

    Ok((
        input,
        Term {
            relation: relation.to_string(),
            alias: alias.map(str::to_string),
            recursion: recursion.unwrap_or(Marker::None),
            // first occurrence wins
            modify: modify
                .unwrap_or_default()
                .into_iter()
                .map(str::to_string)
                .collect::<IndexSet<_>>()
                .into_iter()
                .collect(),
            children: children.unwrap_or_default(),
        },
    ))
}

fn list(input: &str) -> IResult<&str, Vec<Term>> {
    delimited(
        pair(char('['), multispace0),
        terminated(separated_list0(comma, term), opt(comma)),
        pair(multispace0, char(']')),
    )
    .parse(input)
}

fn expression(input: &str) -> IResult<&str, Vec<Term>> {
    all_consuming(delimited(
        multispace0,
        alt((list, separated_list1(comma, term))),
        multispace0,
    ))
    .parse(input)
}

// =============================================================================
// Entry point
// =============================================================================

/// Parses `input` into a root node. Blank input yields an empty root.
pub(super) fn parse(input: &str) -> Result<RelationNode, RelationExpressionError> {
    if input.trim().is_empty() {
        return Ok(RelationNode::root());
    }

    let (_, terms) = expression(input).map_err(|e| {
        let rest = match &e {
            nom::Err::Error(e) | nom::Err::Failure(e) => e.input,
            nom::Err::Incomplete(_) => "",
        };
        RelationExpressionError::Parse {
            expression: input.to_string(),
            message: if rest.is_empty() {
                "unexpected end of input".to_string()
            } else {
                format!("unexpected input at \"{rest}\"")
            },
        }
    })?;

    let mut root = RelationNode::root();
    root.children = into_children(terms)?;
    Ok(root)
}

fn into_children(
    terms: Vec<Term>,
) -> Result<IndexMap<String, RelationNode>, RelationExpressionError> {
    let mut children = IndexMap::with_capacity(terms.len());
    for term in terms {
        let node = into_node(term)?;
        if children.contains_key(&node.name) {
            return Err(RelationExpressionError::DuplicateRelation(node.name));
        }
        children.insert(node.name.clone(), node);
    }
    Ok(children)
}

fn into_node(term: Term) -> Result<RelationNode, RelationExpressionError> {
    let (recursive, all_recursive) = match term.recursion {
        Marker::None => (Recursion::None, false),
        Marker::Recursive(None) => (Recursion::Unbounded, false),
        Marker::Recursive(Some(depth)) => (Recursion::depth(depth), false),
        Marker::All => (Recursion::None, true),
    };

    Ok(RelationNode {
        name: term.alias.unwrap_or_else(|| term.relation.clone()),
        relation: term.relation,
        modify: term.modify,
        recursive,
        all_recursive,
        children: into_children(term.children)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(node: &RelationNode) -> Vec<&str> {
        node.children.keys().map(String::as_str).collect()
    }

    #[test]
    fn parses_lists_and_nesting() {
        let root = parse("a.[b, c.d], e").unwrap();
        assert_eq!(names(&root), ["a", "e"]);
        assert_eq!(names(&root.children["a"]), ["b", "c"]);
        assert_eq!(names(&root.children["a"].children["c"]), ["d"]);
    }

    #[test]
    fn bracketed_top_level() {
        let root = parse(" [a, b,] ").unwrap();
        assert_eq!(names(&root), ["a", "b"]);
    }

    #[test]
    fn markers_modifiers_and_aliases() {
        let root = parse("parent.^3(young, old) as p, kids.*, pets.^").unwrap();

        let p = &root.children["p"];
        assert_eq!(p.relation, "parent");
        assert_eq!(p.recursive, Recursion::Depth(3));
        assert_eq!(p.modify, ["young", "old"]);

        assert!(root.children["kids"].all_recursive);
        assert_eq!(root.children["pets"].recursive, Recursion::Unbounded);
    }

    #[test]
    fn repeated_modifiers_are_dropped() {
        let root = parse("a(f, g, f), b(g, g)").unwrap();
        assert_eq!(root.children["a"].modify, ["f", "g"]);
        assert_eq!(root.children["b"].modify, ["g"]);
    }

    #[test]
    fn zero_depth_is_not_recursive() {
        let root = parse("a.^0").unwrap();
        assert_eq!(root.children["a"].recursive, Recursion::None);
    }

    #[test]
    fn duplicate_siblings_are_rejected() {
        assert_eq!(
            parse("a.[b, b]").unwrap_err(),
            RelationExpressionError::DuplicateRelation("b".into())
        );
        assert!(parse("a.[b, b as c]").is_ok());
    }

    #[test]
    fn malformed_input() {
        for input in ["a.", "a.[b", "a..b", "a.^.b", "(a)", "a,", "a b"] {
            assert!(
                matches!(parse(input), Err(RelationExpressionError::Parse { .. })),
                "{input} should not parse"
            );
        }
    }

    #[test]
    fn blank_is_empty() {
        assert!(parse("   ").unwrap().children.is_empty());
    }
}
