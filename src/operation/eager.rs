use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use super::{Hooks, Operation, operation_common};
use crate::args::GroupFn;
use crate::query::QueryBuilder;
use crate::relation::RelationExpression;

/// How related rows are loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GraphAlgorithm {
    /// One `where in` query per relation level
    #[default]
    WhereIn,
    /// A single query joining every relation
    Join,
}

/// Options for fetching a relation graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphOptions {
    /// Join kind used by [`GraphAlgorithm::Join`]
    pub join_operation: String,
    /// Largest number of owner ids in one `where in` query
    pub max_batch_size: usize,
    /// Use short generated aliases for joined columns
    pub minimize: bool,
    /// Separates the relation names in joined column aliases
    pub separator: String,
}

impl Default for GraphOptions {
    fn default() -> Self {
        Self {
            join_operation: "left_join".to_string(),
            max_batch_size: 10_000,
            minimize: false,
            separator: ":".to_string(),
        }
    }
}

/// Collects the relation graph to fetch along with the query, plus the
/// modifiers added for parts of it.
///
/// The fetching itself happens outside of the builder. This operation only
/// records what was asked for; see [`EagerOperation::build_final_expression`]
/// and [`EagerOperation::build_final_modifiers`].
#[derive(Clone)]
pub struct EagerOperation {
    name: String,
    algorithm: GraphAlgorithm,
    expression: RelationExpression,
    modifiers_at_path: Vec<(RelationExpression, GroupFn)>,
    options: GraphOptions,
}

impl EagerOperation {
    pub fn new(algorithm: GraphAlgorithm) -> Self {
        let name = match algorithm {
            GraphAlgorithm::WhereIn => "with_graph_fetched",
            GraphAlgorithm::Join => "with_graph_joined",
        };
        Self {
            name: name.to_string(),
            algorithm,
            expression: RelationExpression::new(),
            modifiers_at_path: Vec::new(),
            options: GraphOptions::default(),
        }
    }

    /// The same graph and modifiers fetched with `algorithm`.
    pub fn with_algorithm(self, algorithm: GraphAlgorithm) -> Self {
        Self {
            algorithm,
            expression: self.expression,
            modifiers_at_path: self.modifiers_at_path,
            options: self.options,
            ..Self::new(algorithm)
        }
    }

    pub fn algorithm(&self) -> GraphAlgorithm {
        self.algorithm
    }

    pub fn expression(&self) -> &RelationExpression {
        &self.expression
    }

    pub fn options(&self) -> &GraphOptions {
        &self.options
    }

    pub fn merge_expression(&mut self, expression: &RelationExpression) {
        self.expression = self.expression.merge(expression);
    }

    pub fn merge_options(&mut self, options: GraphOptions) {
        self.options = options;
    }

    pub fn add_modifier(&mut self, path: RelationExpression, modifier: impl Fn(&mut QueryBuilder) + 'static) {
        self.modifiers_at_path.push((path, Rc::new(modifier)));
    }

    /// The graph with a generated modifier name (`_f0_`, `_f1_`, ...) added
    /// to every node a modifier targets.
    pub fn build_final_expression(&self) -> RelationExpression {
        let mut expression = self.expression.clone();
        for (index, (path, _)) in self.modifiers_at_path.iter().enumerate() {
            let name = modifier_name(index);
            expression.modify_at_path(path, &mut |node| {
                if !node.modify.contains(&name) {
                    node.modify.push(name.clone());
                }
            });
        }
        expression
    }

    /// The generated modifier names mapped to their functions.
    pub fn build_final_modifiers(&self) -> IndexMap<String, GroupFn> {
        self.modifiers_at_path
            .iter()
            .enumerate()
            .map(|(index, (_, modifier))| (modifier_name(index), modifier.clone()))
            .collect()
    }
}

fn modifier_name(index: usize) -> String {
    format!("_f{index}_")
}

impl fmt::Debug for EagerOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EagerOperation")
            .field("algorithm", &self.algorithm)
            .field("expression", &self.expression.to_string())
            .field("modifiers", &self.modifiers_at_path.len())
            .field("options", &self.options)
            .finish()
    }
}

impl Operation for EagerOperation {
    operation_common!(Hooks::empty());
}
