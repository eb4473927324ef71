//! The chainable builder methods. Each one records an operation.

use serde_json::Value;

use super::{QueryBuilder, Selector};
use crate::args::{Arg, IntoArgs};
use crate::error::{QueryError, Result};
use crate::model::ModelClass;
use crate::operation::{
    DeleteOperation, EagerOperation, FindByIdOperation, FindByIdsOperation, FirstOperation,
    FromOperation, GraphAlgorithm, GraphOptions, InsertAndFetchOperation, InsertOperation,
    JsonFieldOperation, JsonHasOperation, JsonTypeOperation, KnexOperation, MergeOperation,
    ReturningOperation, SelectOperation, UpdateOperation, WhereCompositeOperation,
    WhereInCompositeOperation, WhereInStrategy,
};
use crate::relation::{IntoRelationExpression, RelationExpression};
use quarry_core::Boolean;

/// Methods passed straight through to the SQL builder under their own name.
macro_rules! knex_methods {
    ($($method:ident => $name:literal),* $(,)?) => {
        $(
            pub fn $method(&mut self, args: impl IntoArgs) -> &mut Self {
                self.add_operation(KnexOperation::new($name), args.into_args())
            }
        )*
    };
}

macro_rules! select_methods {
    ($($method:ident => $name:literal),* $(,)?) => {
        $(
            pub fn $method(&mut self, args: impl IntoArgs) -> &mut Self {
                self.add_operation(SelectOperation::new($name), args.into_args())
            }
        )*
    };
}

/// Postgres `@>` / `<@` comparisons between a JSON field and a value or
/// another field.
macro_rules! json_field_methods {
    ($($method:ident => ($operator:literal, $boolean:ident, $not:literal)),* $(,)?) => {
        $(
            pub fn $method(&mut self, field: impl Into<Arg>, other: impl Into<Arg>) -> &mut Self {
                let op = JsonFieldOperation::new(stringify!($method), $operator, Boolean::$boolean, $not);
                self.add_operation(op, vec![field.into(), other.into()])
            }
        )*
    };
}

macro_rules! json_has_methods {
    ($($method:ident => ($operator:literal, $boolean:ident)),* $(,)?) => {
        $(
            pub fn $method(&mut self, field: impl Into<Arg>, keys: impl Into<Arg>) -> &mut Self {
                let op = JsonHasOperation::new(stringify!($method), $operator, Boolean::$boolean);
                self.add_operation(op, vec![field.into(), keys.into()])
            }
        )*
    };
}

impl QueryBuilder {
    knex_methods! {
        where_ => "where",
        and_where => "and_where",
        or_where => "or_where",
        where_not => "where_not",
        or_where_not => "or_where_not",
        where_in => "where_in",
        or_where_in => "or_where_in",
        where_not_in => "where_not_in",
        or_where_not_in => "or_where_not_in",
        where_null => "where_null",
        or_where_null => "or_where_null",
        where_not_null => "where_not_null",
        or_where_not_null => "or_where_not_null",
        where_exists => "where_exists",
        or_where_exists => "or_where_exists",
        where_not_exists => "where_not_exists",
        or_where_not_exists => "or_where_not_exists",
        where_between => "where_between",
        or_where_between => "or_where_between",
        where_not_between => "where_not_between",
        or_where_not_between => "or_where_not_between",
        where_column => "where_column",
        or_where_column => "or_where_column",
        where_not_column => "where_not_column",
        where_raw => "where_raw",
        or_where_raw => "or_where_raw",

        join => "join",
        inner_join => "inner_join",
        left_join => "left_join",
        left_outer_join => "left_outer_join",
        right_join => "right_join",
        right_outer_join => "right_outer_join",
        full_outer_join => "full_outer_join",
        cross_join => "cross_join",
        join_raw => "join_raw",

        group_by => "group_by",
        group_by_raw => "group_by_raw",
        having => "having",
        or_having => "or_having",
        having_in => "having_in",
        having_not_in => "having_not_in",
        or_having_not_in => "or_having_not_in",
        having_null => "having_null",
        or_having_null => "or_having_null",
        having_not_null => "having_not_null",
        or_having_not_null => "or_having_not_null",
        having_raw => "having_raw",
        or_having_raw => "or_having_raw",

        order_by => "order_by",
        order_by_raw => "order_by_raw",
        limit => "limit",
        offset => "offset",
        as_ => "as",
        on_conflict => "on_conflict",
        ignore => "ignore",
    }

    /// Records a `having_in`, so the condition is joined with `and`.
    // FIXME: should be recorded as `or_having_in`; callers may rely on the
    // `and` behavior, see the `or_having_in_is_and` test.
    pub fn or_having_in(&mut self, args: impl IntoArgs) -> &mut Self {
        self.add_operation(KnexOperation::new("having_in"), args.into_args())
    }

    select_methods! {
        select => "select",
        columns => "columns",
        column => "column",
        distinct => "distinct",
        count => "count",
        min => "min",
        max => "max",
        sum => "sum",
        avg => "avg",
    }

    pub fn from(&mut self, args: impl IntoArgs) -> &mut Self {
        self.add_operation(FromOperation::new("from"), args.into_args())
    }

    pub fn into(&mut self, args: impl IntoArgs) -> &mut Self {
        self.add_operation(FromOperation::new("into"), args.into_args())
    }

    pub fn table(&mut self, args: impl IntoArgs) -> &mut Self {
        self.add_operation(FromOperation::new("table"), args.into_args())
    }

    pub fn returning(&mut self, args: impl IntoArgs) -> &mut Self {
        self.add_operation(ReturningOperation::new(), args.into_args())
    }

    /// Updates the conflicting row after `on_conflict`. Takes the columns
    /// to update, an object of values, or nothing to update every column.
    pub fn merge(&mut self, args: impl IntoArgs) -> &mut Self {
        self.add_operation(MergeOperation::new(), args.into_args())
    }

    // =========================================================================
    // Clearing
    // =========================================================================

    pub fn clear_select(&mut self) -> &mut Self {
        self.clear(Selector::select())
    }

    pub fn clear_where(&mut self) -> &mut Self {
        self.clear(Selector::where_())
    }

    pub fn clear_order(&mut self) -> &mut Self {
        self.clear(Selector::order_by())
    }

    // =========================================================================
    // Composite keys
    // =========================================================================

    /// `where(columns, op, values)` where both sides may be arrays of equal
    /// length. The operator defaults to `=`.
    pub fn where_composite(&mut self, args: impl IntoArgs) -> &mut Self {
        self.add_operation(WhereCompositeOperation::new(), args.into_args())
    }

    /// `where_in` for one or many columns, in the form the dialect
    /// supports.
    pub fn where_in_composite(&mut self, columns: impl Into<Arg>, values: impl Into<Arg>) -> &mut Self {
        let op = WhereInCompositeOperation::new(
            "where_in_composite",
            WhereInStrategy::for_dialect(self.dialect()),
            false,
        );
        self.add_operation(op, vec![columns.into(), values.into()])
    }

    pub fn where_not_in_composite(
        &mut self,
        columns: impl Into<Arg>,
        values: impl Into<Arg>,
    ) -> &mut Self {
        let op = WhereInCompositeOperation::new(
            "where_not_in_composite",
            WhereInStrategy::for_dialect(self.dialect()),
            true,
        );
        self.add_operation(op, vec![columns.into(), values.into()])
    }

    // =========================================================================
    // Postgres JSON
    // =========================================================================

    json_field_methods! {
        where_json_superset_of => ("@>", And, false),
        and_where_json_superset_of => ("@>", And, false),
        or_where_json_superset_of => ("@>", Or, false),
        where_json_not_superset_of => ("@>", And, true),
        and_where_json_not_superset_of => ("@>", And, true),
        or_where_json_not_superset_of => ("@>", Or, true),
        where_json_subset_of => ("<@", And, false),
        and_where_json_subset_of => ("<@", And, false),
        or_where_json_subset_of => ("<@", Or, false),
        where_json_not_subset_of => ("<@", And, true),
        and_where_json_not_subset_of => ("<@", And, true),
        or_where_json_not_subset_of => ("<@", Or, true),
    }

    json_has_methods! {
        where_json_has_any => ("?|", And),
        or_where_json_has_any => ("?|", Or),
        where_json_has_all => ("?&", And),
        or_where_json_has_all => ("?&", Or),
    }

    pub fn where_json_is_array(&mut self, field: impl Into<Arg>) -> &mut Self {
        self.where_json_superset_of(field, Value::Array(Vec::new()))
    }

    pub fn or_where_json_is_array(&mut self, field: impl Into<Arg>) -> &mut Self {
        self.or_where_json_superset_of(field, Value::Array(Vec::new()))
    }

    pub fn where_json_is_object(&mut self, field: impl Into<Arg>) -> &mut Self {
        self.where_json_superset_of(field, Value::Object(Default::default()))
    }

    pub fn or_where_json_is_object(&mut self, field: impl Into<Arg>) -> &mut Self {
        self.or_where_json_superset_of(field, Value::Object(Default::default()))
    }

    pub fn where_json_not_array(&mut self, field: impl Into<Arg>) -> &mut Self {
        let op = JsonTypeOperation::new("where_json_not_array", Boolean::And, Value::Array(Vec::new()));
        self.add_operation(op, vec![field.into()])
    }

    pub fn or_where_json_not_array(&mut self, field: impl Into<Arg>) -> &mut Self {
        let op = JsonTypeOperation::new("or_where_json_not_array", Boolean::Or, Value::Array(Vec::new()));
        self.add_operation(op, vec![field.into()])
    }

    pub fn where_json_not_object(&mut self, field: impl Into<Arg>) -> &mut Self {
        let op = JsonTypeOperation::new(
            "where_json_not_object",
            Boolean::And,
            Value::Object(Default::default()),
        );
        self.add_operation(op, vec![field.into()])
    }

    pub fn or_where_json_not_object(&mut self, field: impl Into<Arg>) -> &mut Self {
        let op = JsonTypeOperation::new(
            "or_where_json_not_object",
            Boolean::Or,
            Value::Object(Default::default()),
        );
        self.add_operation(op, vec![field.into()])
    }

    // =========================================================================
    // Finding
    // =========================================================================

    /// The row with the identifier `id`, or `None`.
    pub fn find_by_id(&mut self, id: impl Into<Arg>) -> &mut Self {
        self.add_operation(FindByIdOperation::new(), vec![id.into()])
            .first()
    }

    pub fn find_by_ids(&mut self, ids: impl Into<Arg>) -> &mut Self {
        self.add_operation(FindByIdsOperation::new(), vec![ids.into()])
    }

    /// The first row matching `where_(args)`.
    pub fn find_one(&mut self, args: impl IntoArgs) -> &mut Self {
        self.add_operation(KnexOperation::new("where"), args.into_args())
            .first()
    }

    /// Resolves to the first result instead of a list.
    pub fn first(&mut self) -> &mut Self {
        self.add_operation(FirstOperation::new(), Vec::new())
    }

    /// Calls `f` with this builder, for reusable query fragments.
    pub fn modify(&mut self, f: impl FnOnce(&mut QueryBuilder)) -> &mut Self {
        f(self);
        self
    }

    // =========================================================================
    // Writing
    // =========================================================================

    /// Inserts one model (an object or a [`ModelRef`](crate::model::ModelRef))
    /// or an array of them.
    pub fn insert(&mut self, models: impl Into<Arg>) -> &mut Self {
        self.add_operation(InsertOperation::new(), vec![models.into()])
    }

    /// Inserts and then fetches the inserted rows by identifier.
    pub fn insert_and_fetch(&mut self, models: impl Into<Arg>) -> &mut Self {
        self.add_operation(InsertAndFetchOperation::new(), vec![models.into()])
    }

    pub fn update(&mut self, values: impl Into<Arg>) -> &mut Self {
        self.add_operation(UpdateOperation::new("update", false), vec![values.into()])
    }

    /// An update that only touches the given properties.
    pub fn patch(&mut self, values: impl Into<Arg>) -> &mut Self {
        self.add_operation(UpdateOperation::new("patch", true), vec![values.into()])
    }

    pub fn delete(&mut self) -> &mut Self {
        self.add_operation(DeleteOperation::new(), Vec::new())
    }

    // =========================================================================
    // Relation graphs
    // =========================================================================

    /// Fetches the relations in `expression` with separate queries.
    pub fn with_graph_fetched(&mut self, expression: impl IntoRelationExpression) -> &mut Self {
        self.with_graph(expression, GraphOptions::default(), GraphAlgorithm::WhereIn)
    }

    /// Fetches the relations in `expression` with joins.
    pub fn with_graph_joined(&mut self, expression: impl IntoRelationExpression) -> &mut Self {
        self.with_graph(expression, GraphOptions::default(), GraphAlgorithm::Join)
    }

    pub fn with_graph_fetched_opts(
        &mut self,
        expression: impl IntoRelationExpression,
        options: GraphOptions,
    ) -> &mut Self {
        self.with_graph(expression, options, GraphAlgorithm::WhereIn)
    }

    fn with_graph(
        &mut self,
        expression: impl IntoRelationExpression,
        options: GraphOptions,
        algorithm: GraphAlgorithm,
    ) -> &mut Self {
        let parsed = match self.parse_graph(expression) {
            Ok(parsed) => parsed,
            Err(error) => {
                self.reject(error);
                return self;
            }
        };

        let existing = self
            .find_operation(Selector::kind::<EagerOperation>())
            .and_then(|op| op.downcast_ref::<EagerOperation>())
            .cloned();

        let mut eager = match existing {
            Some(existing) if existing.algorithm() == algorithm => existing,
            Some(existing) => existing.with_algorithm(algorithm),
            None => EagerOperation::new(algorithm),
        };
        eager.merge_expression(&parsed);
        eager.merge_options(options);

        self.clear(Selector::kind::<EagerOperation>());
        self.add_operation(eager, Vec::new())
    }

    fn parse_graph(&self, expression: impl IntoRelationExpression) -> Result<RelationExpression> {
        let expression = expression.into_relation_expression()?;
        check_relations(&expression, self.model_class.as_ref())?;
        Ok(expression)
    }

    /// Modifies the queries of the relations at `path` of the graph.
    pub fn modify_graph(
        &mut self,
        path: impl IntoRelationExpression,
        modifier: impl Fn(&mut QueryBuilder) + 'static,
    ) -> &mut Self {
        let path = match path.into_relation_expression() {
            Ok(path) => path,
            Err(error) => {
                self.reject(error);
                return self;
            }
        };
        match self.find_operation_mut::<EagerOperation>() {
            Some(eager) => eager.add_modifier(path, modifier),
            None => {
                let mut eager = EagerOperation::new(GraphAlgorithm::WhereIn);
                eager.add_modifier(path, modifier);
                self.add_operation(eager, Vec::new());
            }
        }
        self
    }

    pub fn clear_with_graph_fetched(&mut self) -> &mut Self {
        self.clear(Selector::kind::<EagerOperation>())
    }

    pub fn has_with_graph(&self) -> bool {
        self.has(Selector::kind::<EagerOperation>())
    }

    /// The relation graph with the modifiers added by
    /// [`modify_graph`](Self::modify_graph) attached to their nodes.
    pub fn graph_expression(&self) -> Option<RelationExpression> {
        self.find_operation(Selector::kind::<EagerOperation>())
            .and_then(|op| op.downcast_ref::<EagerOperation>())
            .map(EagerOperation::build_final_expression)
    }
}

/// Fails when `expression` names a relation its model class does not have.
fn check_relations(expression: &RelationExpression, class: &dyn ModelClass) -> Result<()> {
    expression.for_each_child_expression(class, |child, relation| {
        let Some(relation) = relation else {
            return Err(QueryError::RelationDoesNotExist {
                relation: child.node().relation.clone(),
            });
        };
        if child.recursion_depth() == 0 && !child.node().all_recursive {
            check_relations(&child, relation.related.as_ref())?;
        }
        Ok(())
    })
}
