use std::fmt;
use std::rc::Rc;

use quarry_core::{Binding, SQL};
use serde_json::Value;

use crate::error::Result;
use crate::field_expression::{FieldExpression, FieldExpressionError};
use crate::model::ModelClass;
use crate::query::QueryBuilder;

/// A reference to a column, or to a value inside a JSON column.
///
/// ```text
/// ref_("person.meta:tags[0]").cast_text()  ->  CAST("person"."meta"#>>'{tags,0}' AS text)
/// ```
#[derive(Clone)]
pub struct ReferenceBuilder {
    expression: String,
    parsed: std::result::Result<FieldExpression, FieldExpressionError>,
    column: String,
    table: Option<String>,
    cast: Option<String>,
    to_json: bool,
    alias: Option<String>,
    model: Option<Rc<dyn ModelClass>>,
}

impl ReferenceBuilder {
    /// Parses `expression`, failing on malformed input.
    pub fn try_new(expression: &str) -> std::result::Result<Self, FieldExpressionError> {
        let parsed = FieldExpression::parse(expression)?;
        Ok(Self::from_parsed(expression, Ok(parsed)))
    }

    fn from_parsed(
        expression: &str,
        parsed: std::result::Result<FieldExpression, FieldExpressionError>,
    ) -> Self {
        let (column, table) = match &parsed {
            Ok(expr) => (expr.column.clone(), expr.table.clone()),
            Err(_) => (String::new(), None),
        };
        Self {
            expression: expression.to_string(),
            parsed,
            column,
            table,
            cast: None,
            to_json: false,
            alias: None,
            model: None,
        }
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn parsed_expr(&self) -> Option<&FieldExpression> {
        self.parsed.as_ref().ok()
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn table_name(&self) -> Option<&str> {
        self.table.as_deref()
    }

    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    pub fn cast(&self) -> Option<&str> {
        self.cast.as_deref()
    }

    pub fn model_class(&self) -> Option<&Rc<dyn ModelClass>> {
        self.model.as_ref()
    }

    /// No JSON access, no cast and no JSON conversion.
    pub fn is_plain_column_ref(&self) -> bool {
        self.parsed_expr().is_none_or(FieldExpression::is_plain) && self.cast.is_none() && !self.to_json
    }

    /// `table.column`, using the table the model class is referred to by
    /// in `builder` when no table was given.
    pub fn full_column(&self, builder: &QueryBuilder) -> String {
        let table = match (&self.table, &self.model) {
            (Some(table), _) => Some(table.clone()),
            (None, Some(model)) => Some(builder.table_ref_for(model.as_ref())),
            (None, None) => None,
        };
        match table {
            Some(table) => format!("{table}.{}", self.column),
            None => self.column.clone(),
        }
    }

    pub fn cast_text(self) -> Self {
        self.cast_to("text")
    }

    pub fn cast_int(self) -> Self {
        self.cast_to("integer")
    }

    pub fn cast_big_int(self) -> Self {
        self.cast_to("bigint")
    }

    pub fn cast_float(self) -> Self {
        self.cast_to("float")
    }

    pub fn cast_decimal(self) -> Self {
        self.cast_to("decimal")
    }

    pub fn cast_real(self) -> Self {
        self.cast_to("real")
    }

    pub fn cast_bool(self) -> Self {
        self.cast_to("boolean")
    }

    /// Wraps the reference in `to_jsonb`.
    pub fn cast_json(mut self) -> Self {
        self.to_json = true;
        self
    }

    pub fn cast_to(mut self, sql_type: impl Into<String>) -> Self {
        self.cast = Some(sql_type.into());
        self
    }

    pub fn from(self, table: impl Into<String>) -> Self {
        self.table(table)
    }

    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn model(mut self, model: Rc<dyn ModelClass>) -> Self {
        self.model = Some(model);
        self
    }

    pub fn as_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub(crate) fn to_sql(&self, builder: &QueryBuilder) -> Result<SQL> {
        let parsed = self.parsed.as_ref().map_err(Clone::clone)?;
        let mut bindings = vec![Binding::Value(Value::String(self.full_column(builder)))];

        let mut sql = if parsed.is_plain() {
            "??".to_string()
        } else {
            let extractor = if self.cast.is_some() { "#>>" } else { "#>" };
            format!("??{extractor}'{}'", parsed.json_path().replace('?', "\\?"))
        };

        if let Some(cast) = &self.cast {
            sql = format!("CAST({sql} AS {cast})");
        }
        if self.to_json {
            sql = format!("to_jsonb({sql})");
        }
        if self.should_alias()
            && let Some(alias) = &self.alias
        {
            bindings.push(Binding::Value(Value::String(alias.clone())));
            sql.push_str(" as ??");
        }

        Ok(SQL::raw_with_bindings(&sql, bindings)?)
    }

    fn should_alias(&self) -> bool {
        match &self.alias {
            None => false,
            Some(_) if !self.is_plain_column_ref() => true,
            Some(alias) => *alias != self.column,
        }
    }
}

impl fmt::Debug for ReferenceBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReferenceBuilder")
            .field("expression", &self.expression)
            .field("table", &self.table)
            .field("cast", &self.cast)
            .field("to_json", &self.to_json)
            .field("alias", &self.alias)
            .field("model", &self.model.as_ref().map(|m| m.table_name().to_string()))
            .finish()
    }
}

/// Creates a reference. A malformed expression is reported when the
/// reference is rendered.
pub fn ref_(expression: &str) -> ReferenceBuilder {
    ReferenceBuilder::from_parsed(expression, FieldExpression::parse(expression))
}
