use quarry_core::{Binding, SQL};
use serde_json::Value;

use crate::error::Result;

/// A bound value with an optional cast. Objects and arrays are bound as
/// JSON text unless [`ValueBuilder::as_array`] is used.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueBuilder {
    value: Value,
    cast: Option<String>,
    to_json: bool,
    to_array: bool,
    alias: Option<String>,
}

impl ValueBuilder {
    pub fn new(value: Value) -> Self {
        Self {
            to_json: value.is_object() || value.is_array(),
            value,
            cast: None,
            to_array: false,
            alias: None,
        }
    }

    pub fn cast(&self) -> Option<&str> {
        self.cast.as_deref()
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

    pub fn cast_json(mut self) -> Self {
        self.to_array = false;
        self.to_json = true;
        self.cast = Some("jsonb".to_string());
        self
    }

    pub fn cast_to(mut self, sql_type: impl Into<String>) -> Self {
        self.cast = Some(sql_type.into());
        self
    }

    /// Renders the value as `ARRAY[?, ...]`.
    pub fn as_array(mut self) -> Self {
        self.to_json = false;
        self.to_array = true;
        self
    }

    pub fn as_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub(crate) fn to_sql(&self) -> Result<SQL> {
        let mut bindings = Vec::new();

        let mut sql = if self.to_json {
            bindings.push(Binding::Value(Value::String(self.value.to_string())));
            "?".to_string()
        } else if self.to_array {
            let items = match &self.value {
                Value::Array(items) => items.clone(),
                single => vec![single.clone()],
            };
            let markers = vec!["?"; items.len()].join(", ");
            bindings.extend(items.into_iter().map(Binding::Value));
            format!("ARRAY[{markers}]")
        } else {
            bindings.push(Binding::Value(self.value.clone()));
            "?".to_string()
        };

        if let Some(cast) = &self.cast {
            sql = format!("CAST({sql} AS {cast})");
        }
        if let Some(alias) = &self.alias {
            bindings.push(Binding::Value(Value::String(alias.clone())));
            sql.push_str(" as ??");
        }

        Ok(SQL::raw_with_bindings(&sql, bindings)?)
    }
}

pub fn val(value: impl Into<Value>) -> ValueBuilder {
    ValueBuilder::new(value.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_core::Dialect;
    use serde_json::json;

    fn render(value: &ValueBuilder) -> (String, Vec<Value>) {
        value.to_sql().unwrap().build(Dialect::PostgreSQL)
    }

    #[test]
    fn objects_bind_as_json_text() {
        let (sql, params) = render(&val(json!({ "a": 1 })));
        assert_eq!(sql, "$1");
        assert_eq!(params, vec![json!(r#"{"a":1}"#)]);
    }

    #[test]
    fn arrays_and_casts() {
        let (sql, params) = render(&val(json!([1, 2])).as_array().cast_to("int[]"));
        assert_eq!(sql, "CAST(ARRAY[$1, $2] AS int[])");
        assert_eq!(params, vec![json!(1), json!(2)]);

        let (sql, _) = render(&val(json!([1])).as_array().cast_json().as_alias("j"));
        assert_eq!(sql, r#"CAST($1 AS jsonb) as "j""#);
    }

    #[test]
    fn scalars_bind_directly() {
        let (sql, params) = render(&val(3).cast_text());
        assert_eq!(sql, "CAST($1 AS text)");
        assert_eq!(params, vec![json!(3)]);
    }
}
