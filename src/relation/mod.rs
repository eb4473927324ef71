//! Relation expressions: which relations of a model graph to fetch.
//!
//! An expression is a tree of [`RelationNode`]s under an anonymous root.
//! The textual form is `a.[b(modifier) as c, d.^2, e.*]`; the object form
//! uses `$`-prefixed keys (see [`RelationExpression::to_json`]).

mod json;
mod parser;
mod property;

use std::fmt;

use indexmap::IndexMap;
use thiserror::Error;

use crate::cache::ParseCache;
use crate::error::{QueryError, Result};
use crate::model::{ModelClass, ModelRef, Relation, RelationValue};

pub use property::RelationProperty;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelationExpressionError {
    /// The same relation name appears twice among siblings
    #[error("duplicate relation name \"{0}\" in relation expression")]
    DuplicateRelation(String),

    #[error("invalid relation expression \"{expression}\": {message}")]
    Parse { expression: String, message: String },
}

/// How many times a node repeats itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Recursion {
    #[default]
    None,
    /// `.^`
    Unbounded,
    /// `.^n`
    Depth(u32),
}

impl Recursion {
    /// `.^0` is the same as no recursion at all.
    pub fn depth(depth: u32) -> Self {
        match depth {
            0 => Recursion::None,
            n => Recursion::Depth(n),
        }
    }

    pub fn is_recursive(self) -> bool {
        !matches!(self, Recursion::None)
    }

    pub fn max_depth(self) -> u32 {
        match self {
            Recursion::None => 0,
            Recursion::Unbounded => u32::MAX,
            Recursion::Depth(n) => n,
        }
    }

    /// Unbounded wins, two depths take the larger one.
    fn merge(self, other: Recursion) -> Recursion {
        match (self, other) {
            (Recursion::Unbounded, _) | (_, Recursion::Unbounded) => Recursion::Unbounded,
            (Recursion::Depth(a), Recursion::Depth(b)) => Recursion::Depth(a.max(b)),
            (Recursion::None, other) => other,
            (this, Recursion::None) => this,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RelationNode {
    /// Key among the siblings; the alias if one was given
    pub name: String,
    pub relation: String,
    pub modify: Vec<String>,
    pub recursive: Recursion,
    pub all_recursive: bool,
    pub children: IndexMap<String, RelationNode>,
}

impl RelationNode {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            relation: name.clone(),
            name,
            ..Self::default()
        }
    }

    fn merge(&self, other: &RelationNode) -> RelationNode {
        let recursive = self.recursive.merge(other.recursive);
        let all_recursive = self.all_recursive || other.all_recursive;

        let mut modify = self.modify.clone();
        for m in &other.modify {
            if !modify.contains(m) {
                modify.push(m.clone());
            }
        }

        let mut children = IndexMap::new();
        if !recursive.is_recursive() && !all_recursive {
            for (name, child) in &self.children {
                let merged = match other.children.get(name) {
                    Some(theirs) => child.merge(theirs),
                    None => child.clone(),
                };
                children.insert(name.clone(), merged);
            }
            for (name, child) in &other.children {
                if !children.contains_key(name) {
                    children.insert(name.clone(), child.clone());
                }
            }
        }

        RelationNode {
            name: self.name.clone(),
            relation: self.relation.clone(),
            modify,
            recursive,
            all_recursive,
            children,
        }
    }
}

/// A node plus how deep into its own recursion we currently are.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RelationExpression {
    node: RelationNode,
    recursion_depth: u32,
}

impl RelationExpression {
    /// The empty expression.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_node(node: RelationNode) -> Self {
        Self {
            node,
            recursion_depth: 0,
        }
    }

    /// Anything that can be turned into an expression. Expressions pass
    /// through unchanged.
    pub fn create(input: impl IntoRelationExpression) -> Result<Self> {
        input.into_relation_expression()
    }

    pub fn parse(input: &str) -> std::result::Result<Self, RelationExpressionError> {
        parser::parse(input).map(Self::from_node)
    }

    pub fn parse_cached(
        cache: &ParseCache<RelationExpression>,
        input: &str,
    ) -> std::result::Result<Self, RelationExpressionError> {
        cache.get_or_try_insert_with(input, Self::parse)
    }

    /// Expression describing the relations that are loaded in `models`.
    pub fn from_model_graph(models: &[ModelRef]) -> Self {
        let mut root = RelationNode::root();
        for model in models {
            model_to_node(model, &mut root);
        }
        Self::from_node(root)
    }

    pub fn node(&self) -> &RelationNode {
        &self.node
    }

    pub fn node_mut(&mut self) -> &mut RelationNode {
        &mut self.node
    }

    pub fn recursion_depth(&self) -> u32 {
        self.recursion_depth
    }

    pub fn max_recursion_depth(&self) -> u32 {
        self.node.recursive.max_depth()
    }

    pub fn num_children(&self) -> usize {
        self.node.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.node.children.is_empty()
    }

    pub fn merge(&self, other: &RelationExpression) -> RelationExpression {
        if self.is_empty() {
            return other.clone();
        }
        Self::from_node(self.node.merge(&other.node))
    }

    /// Whether everything `other` fetches is fetched by `self` too.
    pub fn is_sub_expression(&self, other: &RelationExpression) -> bool {
        if self.node.all_recursive {
            return true;
        }
        if other.node.all_recursive {
            return false;
        }
        if self.node.relation != other.node.relation {
            return false;
        }
        if other.node.modify.iter().any(|m| !self.node.modify.contains(m)) {
            return false;
        }

        let max = other.max_recursion_depth();
        if max > 0 {
            return self.max_recursion_depth() >= max;
        }

        other.node.children.keys().all(|name| {
            let sub = other.child_expression(name).unwrap_or_default();
            self.child_expression(name)
                .is_some_and(|own| own.is_sub_expression(&sub))
        })
    }

    fn recurses_into(&self, name: &str) -> bool {
        self.node.all_recursive
            || (name == self.node.name
                && self.recursion_depth.saturating_add(1) < self.max_recursion_depth())
    }

    /// The expression for child `name`. A recursive node answers with itself
    /// one level deeper until its depth runs out.
    pub fn child_expression(&self, name: &str) -> Option<RelationExpression> {
        if self.recurses_into(name) {
            return Some(RelationExpression {
                node: self.node.clone(),
                recursion_depth: self.recursion_depth + 1,
            });
        }
        self.node
            .children
            .get(name)
            .cloned()
            .map(RelationExpression::from_node)
    }

    /// Calls `f` for every first level child together with the relation it
    /// stands for.
    pub fn for_each_child_expression(
        &self,
        model_class: &dyn ModelClass,
        mut f: impl FnMut(RelationExpression, Option<Relation>) -> Result<()>,
    ) -> Result<()> {
        let max = self.max_recursion_depth();

        if self.node.all_recursive {
            for name in model_class.relation_names() {
                let mut node = RelationNode::new(name.as_str());
                node.all_recursive = true;
                f(Self::from_node(node), model_class.relation(&name))?;
            }
        } else if self.recursion_depth.saturating_add(1) < max {
            let child = RelationExpression {
                node: self.node.clone(),
                recursion_depth: self.recursion_depth + 1,
            };
            f(child, model_class.relation(&self.node.relation))?;
        } else if max == 0 {
            for node in self.node.children.values() {
                let relation = model_class.relation(&node.relation).ok_or_else(|| {
                    QueryError::RelationDoesNotExist {
                        relation: node.relation.clone(),
                    }
                })?;
                f(Self::from_node(node.clone()), Some(relation))?;
            }
        }

        Ok(())
    }

    /// Every sub expression reached by following `path`.
    pub fn expressions_at_path(&self, path: &RelationExpression) -> Vec<RelationExpression> {
        let mut out = Vec::new();
        collect_at_path(self, Some(path), &mut out);
        out
    }

    /// Runs `f` on the nodes [`expressions_at_path`](Self::expressions_at_path)
    /// would return, in place.
    pub fn modify_at_path(&mut self, path: &RelationExpression, f: &mut dyn FnMut(&mut RelationNode)) {
        let depth = self.recursion_depth;
        visit_at_path(&mut self.node, depth, Some(path), f);
    }
}

fn collect_at_path(
    target: &RelationExpression,
    path: Option<&RelationExpression>,
    out: &mut Vec<RelationExpression>,
) {
    let Some(path) = path.filter(|p| !p.is_empty()) else {
        out.push(target.clone());
        return;
    };

    for name in path.node.children.keys() {
        let path_child = path.child_expression(name);
        if let Some(target_child) = target.child_expression(name) {
            collect_at_path(&target_child, path_child.as_ref(), out);
        }
    }
}

fn visit_at_path(
    node: &mut RelationNode,
    depth: u32,
    path: Option<&RelationExpression>,
    f: &mut dyn FnMut(&mut RelationNode),
) {
    let Some(path) = path.filter(|p| !p.is_empty()) else {
        f(node);
        return;
    };

    for name in path.node.children.keys() {
        let path_child = path.child_expression(name);
        let recurses = node.all_recursive
            || (*name == node.name && depth.saturating_add(1) < node.recursive.max_depth());

        if recurses {
            visit_at_path(node, depth + 1, path_child.as_ref(), f);
        } else if let Some(child) = node.children.get_mut(name) {
            visit_at_path(child, 0, path_child.as_ref(), f);
        }
    }
}

fn model_to_node(model: &ModelRef, node: &mut RelationNode) {
    let class = model.class();
    for name in class.relation_names() {
        let Some(value) = model.relation(&name) else {
            continue;
        };
        let child = node
            .children
            .entry(name.clone())
            .or_insert_with(|| RelationNode::new(name.as_str()));

        match value {
            RelationValue::One(Some(related)) => model_to_node(&related, child),
            RelationValue::One(None) => {}
            RelationValue::Many(related) => {
                for related in &related {
                    model_to_node(related, child);
                }
            }
        }
    }
}

impl fmt::Display for RelationExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&node_to_string(&self.node))
    }
}

fn node_to_string(node: &RelationNode) -> String {
    let mut out = node.relation.clone();

    match node.recursive {
        Recursion::Depth(n) => out.push_str(&format!(".^{n}")),
        Recursion::Unbounded => out.push_str(".^"),
        Recursion::None if node.all_recursive => out.push_str(".*"),
        Recursion::None => {}
    }

    if !node.modify.is_empty() {
        out.push('(');
        out.push_str(&node.modify.join(", "));
        out.push(')');
    }

    if node.name != node.relation {
        out.push_str(" as ");
        out.push_str(&node.name);
    }

    let children: Vec<String> = node.children.values().map(node_to_string).collect();
    let children = match children.len() {
        0 => return out,
        1 => children.into_iter().next().unwrap_or_default(),
        _ => format!("[{}]", children.join(", ")),
    };

    if out.is_empty() {
        children
    } else {
        format!("{out}.{children}")
    }
}

/// Conversion into a [`RelationExpression`].
pub trait IntoRelationExpression {
    fn into_relation_expression(self) -> Result<RelationExpression>;
}

impl IntoRelationExpression for RelationExpression {
    fn into_relation_expression(self) -> Result<RelationExpression> {
        Ok(self)
    }
}

impl IntoRelationExpression for &RelationExpression {
    fn into_relation_expression(self) -> Result<RelationExpression> {
        Ok(self.clone())
    }
}

impl IntoRelationExpression for &str {
    fn into_relation_expression(self) -> Result<RelationExpression> {
        Ok(RelationExpression::parse(self)?)
    }
}

impl IntoRelationExpression for String {
    fn into_relation_expression(self) -> Result<RelationExpression> {
        self.as_str().into_relation_expression()
    }
}

impl IntoRelationExpression for &String {
    fn into_relation_expression(self) -> Result<RelationExpression> {
        self.as_str().into_relation_expression()
    }
}

impl IntoRelationExpression for serde_json::Value {
    fn into_relation_expression(self) -> Result<RelationExpression> {
        RelationExpression::from_json(&self)
    }
}

impl IntoRelationExpression for &serde_json::Value {
    fn into_relation_expression(self) -> Result<RelationExpression> {
        RelationExpression::from_json(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expr(s: &str) -> RelationExpression {
        RelationExpression::parse(s).unwrap()
    }

    #[test]
    fn string_form_round_trips() {
        for input in [
            "a",
            "a.b.c",
            "a.[b, c]",
            "a.^",
            "a.^4",
            "a.*",
            "a(m1, m2) as x.[b.^2, c as d]",
            "[a, b.[c, d.e]]",
            "parent.^(young)",
        ] {
            let parsed = expr(input);
            let again = expr(&parsed.to_string());
            assert_eq!(parsed, again, "{input} -> {parsed}");
        }
    }

    #[test]
    fn display_shapes() {
        assert_eq!(expr("a.[b,c]").to_string(), "a.[b, c]");
        assert_eq!(expr("a , b").to_string(), "[a, b]");
        assert_eq!(expr("a(f) as x.b").to_string(), "a(f) as x.b");
        assert_eq!(expr("a.^3").to_string(), "a.^3");
        assert_eq!(RelationExpression::new().to_string(), "");
    }

    #[test]
    fn merge_is_idempotent() {
        let e = expr("a(f).[b, c.^2], d.*");
        assert_eq!(e.merge(&e), e);
    }

    #[test]
    fn merge_unions_children_and_modifiers() {
        let merged = expr("a(f).b").merge(&expr("a(g, f).c, d"));
        assert_eq!(merged.to_string(), "[a(f, g).[b, c], d]");
    }

    #[test]
    fn merge_into_empty_returns_other() {
        let other = expr("a.b");
        assert_eq!(RelationExpression::new().merge(&other), other);
    }

    #[test]
    fn recursion_dominance() {
        let merged = expr("a.^").merge(&expr("a.^3"));
        assert_eq!(merged.node().children["a"].recursive, Recursion::Unbounded);

        let merged = expr("a.^2").merge(&expr("a.^5"));
        assert_eq!(merged.node().children["a"].recursive, Recursion::Depth(5));
    }

    #[test]
    fn recursive_merge_drops_children() {
        let merged = expr("a.b").merge(&expr("a.^2"));
        assert!(merged.node().children["a"].children.is_empty());
    }

    #[test]
    fn subset_law() {
        for input in ["a", "a.[b, c.d]", "a.^3", "a.*", "a(f).b"] {
            let e = expr(input);
            assert!(e.is_sub_expression(&RelationExpression::new()), "{input}");
            assert!(e.is_sub_expression(&e), "{input}");
        }
    }

    #[test]
    fn sub_expressions() {
        assert!(expr("a.[b, c]").is_sub_expression(&expr("a.b")));
        assert!(!expr("a.b").is_sub_expression(&expr("a.[b, c]")));
        assert!(expr("a.*").is_sub_expression(&expr("a.b.c.d")));
        assert!(!expr("a.b").is_sub_expression(&expr("a.*")));
        assert!(expr("a.^5").is_sub_expression(&expr("a.^3")));
        assert!(!expr("a.^2").is_sub_expression(&expr("a.^3")));
        assert!(expr("a.^").is_sub_expression(&expr("a.a.a")));
        assert!(!expr("a.b").is_sub_expression(&expr("a(f).b")));
    }

    #[test]
    fn child_expression_counts_recursion() {
        let e = expr("a.^2");
        let a = e.child_expression("a").unwrap();
        assert_eq!(a.recursion_depth(), 0);

        let a2 = a.child_expression("a").unwrap();
        assert_eq!(a2.recursion_depth(), 1);
        assert!(a2.child_expression("a").is_none());
    }

    #[test]
    fn expressions_at_path_follow_the_path() {
        let e = expr("a.[b.c, d]");
        let found = e.expressions_at_path(&expr("a.b"));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].node().relation, "b");

        assert!(e.expressions_at_path(&expr("x")).is_empty());
        assert_eq!(e.expressions_at_path(&RelationExpression::new()), vec![e.clone()]);
    }

    #[test]
    fn modify_at_path_edits_in_place() {
        let mut e = expr("a.[b, c]");
        e.modify_at_path(&expr("a.[b, c]"), &mut |node| node.modify.push("_f0_".into()));
        assert_eq!(e.to_string(), "a.[b(_f0_), c(_f0_)]");
    }

    #[test]
    fn create_accepts_every_input_form() {
        let e = expr("a.b");
        assert_eq!(RelationExpression::create(&e).unwrap(), e);
        assert_eq!(RelationExpression::create("a.b").unwrap(), e);
        assert_eq!(RelationExpression::create(e.to_json()).unwrap(), e);
        assert!(RelationExpression::create("a.[").is_err());
    }
}
