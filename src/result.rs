use serde_json::Value;

use crate::model::{ModelRef, Row};

/// What a query resolves to. The shape depends on the statement and on the
/// operations that post-processed the result.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum QueryResult {
    #[default]
    Empty,
    /// Affected row count of an update or delete
    Count(u64),
    /// Raw rows, before they are turned into models
    Rows(Vec<Row>),
    /// Generated identifiers of an insert
    Ids(Vec<Value>),
    Models(Vec<ModelRef>),
    /// A single model, e.g. after `first()`
    Model(Option<ModelRef>),
    Value(Value),
}

impl QueryResult {
    pub fn is_array(&self) -> bool {
        matches!(
            self,
            QueryResult::Rows(_) | QueryResult::Ids(_) | QueryResult::Models(_)
        )
    }

    pub fn count(&self) -> Option<u64> {
        match self {
            QueryResult::Count(n) => Some(*n),
            _ => None,
        }
    }

    pub fn models(&self) -> &[ModelRef] {
        match self {
            QueryResult::Models(models) => models,
            QueryResult::Model(Some(model)) => std::slice::from_ref(model),
            _ => &[],
        }
    }

    pub fn into_models(self) -> Vec<ModelRef> {
        match self {
            QueryResult::Models(models) => models,
            QueryResult::Model(Some(model)) => vec![model],
            _ => Vec::new(),
        }
    }

    pub fn model(&self) -> Option<&ModelRef> {
        match self {
            QueryResult::Model(model) => model.as_ref(),
            QueryResult::Models(models) => models.first(),
            _ => None,
        }
    }

    /// The first element of an array result. Other results pass through.
    pub fn first(self) -> QueryResult {
        match self {
            QueryResult::Models(models) => QueryResult::Model(models.into_iter().next()),
            QueryResult::Rows(rows) => {
                QueryResult::Value(rows.into_iter().next().map_or(Value::Null, Value::Object))
            }
            QueryResult::Ids(ids) => {
                QueryResult::Value(ids.into_iter().next().unwrap_or(Value::Null))
            }
            other => other,
        }
    }

    /// Array results as they are, single results wrapped.
    pub fn into_array(self) -> QueryResult {
        match self {
            QueryResult::Model(model) => QueryResult::Models(model.into_iter().collect()),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn first_of_rows_and_ids() {
        let rows = QueryResult::Rows(vec![]);
        assert_eq!(rows.first(), QueryResult::Value(Value::Null));

        let ids = QueryResult::Ids(vec![json!(4), json!(5)]);
        assert_eq!(ids.first(), QueryResult::Value(json!(4)));

        assert_eq!(QueryResult::Count(2).first(), QueryResult::Count(2));
    }

    #[test]
    fn empty_model_list_has_no_first() {
        assert_eq!(QueryResult::Models(vec![]).first(), QueryResult::Model(None));
    }
}
