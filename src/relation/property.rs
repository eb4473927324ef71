use std::fmt;
use std::rc::Rc;

use serde_json::Value;

use crate::args::ReferenceBuilder;
use crate::error::{QueryError, Result};
use crate::field_expression::JsonAccess;
use crate::model::{ModelClass, Row};
use crate::query::QueryBuilder;

/// Keys built by [`RelationProperty::prop_key`] start with this so they never
/// look like array indexes.
const PROP_KEY_PREFIX: &str = "k_";

/// One side of a relation: a column, a JSON column path, or several of
/// them for composite keys.
///
/// All references must point into tables of the same model class.
#[derive(Clone)]
pub struct RelationProperty {
    model_class: Rc<dyn ModelClass>,
    refs: Vec<ReferenceBuilder>,
    /// Property name followed by the JSON path, one per reference
    paths: Vec<Vec<JsonAccess>>,
    props: Vec<String>,
    cols: Vec<String>,
}

impl RelationProperty {
    /// Resolves `references` (`table.column[:json.path]`) with `resolver`,
    /// which maps a table name to its model class.
    pub fn new<S, F>(references: &[S], resolver: F) -> Result<Self>
    where
        S: AsRef<str>,
        F: Fn(&str) -> Option<Rc<dyn ModelClass>>,
    {
        let mut refs = Vec::with_capacity(references.len());
        let mut classes: Vec<Rc<dyn ModelClass>> = Vec::with_capacity(references.len());
        let mut paths = Vec::with_capacity(references.len());

        for reference in references {
            let reference = reference.as_ref();
            let invalid = || QueryError::InvalidReference {
                reference: reference.to_string(),
            };

            let parsed = ReferenceBuilder::try_new(reference).map_err(|_| invalid())?;
            let table = parsed.table_name().ok_or_else(invalid)?.to_string();
            let class = resolver(&table).ok_or(QueryError::ModelNotFound { table })?;

            let mut path = vec![JsonAccess::Object(
                class.column_name_to_property_name(parsed.column()),
            )];
            if let Some(expr) = parsed.parsed_expr() {
                path.extend(expr.access.iter().cloned());
            }

            paths.push(path);
            classes.push(class);
            refs.push(parsed);
        }

        let model_class = match classes.split_first() {
            Some((first, rest))
                if rest.iter().all(|c| std::ptr::addr_eq(Rc::as_ptr(c), Rc::as_ptr(first))) =>
            {
                first.clone()
            }
            _ => {
                return Err(QueryError::InvalidReference {
                    reference: references
                        .iter()
                        .map(|r| r.as_ref())
                        .collect::<Vec<_>>()
                        .join(", "),
                });
            }
        };

        let refs: Vec<ReferenceBuilder> = refs
            .into_iter()
            .map(|r| r.model(model_class.clone()))
            .collect();
        let props = paths.iter().map(|p| p[0].to_string()).collect();
        let cols = refs.iter().map(|r| r.column().to_string()).collect();

        Ok(Self {
            model_class,
            refs,
            paths,
            props,
            cols,
        })
    }

    /// The number of columns.
    pub fn size(&self) -> usize {
        self.refs.len()
    }

    pub fn model_class(&self) -> &Rc<dyn ModelClass> {
        &self.model_class
    }

    /// Property names, which may differ from [`Self::cols`] when the model
    /// converts between database and external formats.
    pub fn props(&self) -> &[String] {
        &self.props
    }

    pub fn cols(&self) -> &[String] {
        &self.cols
    }

    /// The property values of `obj` joined into one string key.
    pub fn prop_key(&self, obj: &Row) -> String {
        let parts: Vec<String> = (0..self.size())
            .map(|i| prop_to_str(self.get_prop(obj, i).as_ref()))
            .collect();
        format!("{PROP_KEY_PREFIX}{}", parts.join(","))
    }

    pub fn get_props(&self, obj: &Row) -> Vec<Option<Value>> {
        (0..self.size()).map(|i| self.get_prop(obj, i)).collect()
    }

    /// `true` when every property has a non-null value.
    pub fn has_props(&self, obj: &Row) -> bool {
        (0..self.size()).all(|i| self.get_prop(obj, i).is_some_and(|v| !v.is_null()))
    }

    pub fn get_prop(&self, obj: &Row, index: usize) -> Option<Value> {
        let (first, rest) = self.paths[index].split_first()?;
        let mut current = obj.get(&first.to_string())?;
        for step in rest {
            current = match step {
                JsonAccess::Object(key) => current.get(key)?,
                JsonAccess::Array(i) => current.get(*i)?,
            };
        }
        Some(current.clone())
    }

    /// Sets the value at the index:th path, creating objects and arrays on
    /// the way.
    pub fn set_prop(&self, obj: &mut Row, index: usize, value: Value) {
        let Some((first, rest)) = self.paths[index].split_first() else {
            return;
        };
        let slot = obj.entry(first.to_string()).or_insert(Value::Null);
        set_path(slot, rest, value);
    }

    /// A reference to the index:th column, qualified with the table the
    /// model class has in `builder`.
    pub fn ref_(&self, builder: &QueryBuilder, index: usize) -> ReferenceBuilder {
        let table = builder.table_ref_for(self.model_class.as_ref());
        self.refs[index].clone().table(table)
    }

    pub fn refs(&self, builder: &QueryBuilder) -> Vec<ReferenceBuilder> {
        (0..self.size()).map(|i| self.ref_(builder, i)).collect()
    }

    /// Writes an update of the index:th column into `patch`. JSON paths are
    /// written as field expression keys.
    pub fn patch(&self, patch: &mut Row, index: usize, value: Value) {
        let reference = &self.refs[index];
        let key = if reference.is_plain_column_ref() {
            self.props[index].clone()
        } else {
            reference.expression().to_string()
        };
        patch.insert(key, value);
    }

    pub fn prop_description(&self, index: usize) -> &str {
        self.refs[index].expression()
    }
}

impl fmt::Debug for RelationProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelationProperty")
            .field("model_class", &self.model_class.table_name())
            .field("props", &self.props)
            .field("cols", &self.cols)
            .finish()
    }
}

fn prop_to_str(value: Option<&Value>) -> String {
    match value {
        None => "undefined".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn set_path(slot: &mut Value, path: &[JsonAccess], value: Value) {
    let Some((step, rest)) = path.split_first() else {
        *slot = value;
        return;
    };

    let next = match step {
        JsonAccess::Object(key) => {
            if !slot.is_object() {
                *slot = Value::Object(Row::new());
            }
            let Value::Object(map) = slot else { return };
            map.entry(key.clone()).or_insert(Value::Null)
        }
        JsonAccess::Array(i) => {
            if !slot.is_array() {
                *slot = Value::Array(Vec::new());
            }
            let Value::Array(items) = slot else { return };
            if items.len() <= *i {
                items.resize(*i + 1, Value::Null);
            }
            &mut items[*i]
        }
    };
    set_path(next, rest, value);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Person;

    impl ModelClass for Person {
        fn table_name(&self) -> &str {
            "person"
        }

        fn column_name_to_property_name(&self, column: &str) -> String {
            match column {
                "owner_id" => "ownerId".to_string(),
                other => other.to_string(),
            }
        }
    }

    struct Pet;

    impl ModelClass for Pet {
        fn table_name(&self) -> &str {
            "pet"
        }
    }

    fn resolver(table: &str) -> Option<Rc<dyn ModelClass>> {
        thread_local! {
            static PERSON: Rc<dyn ModelClass> = Rc::new(Person);
        }
        match table {
            "person" => Some(PERSON.with(Clone::clone)),
            "pet" => Some(Rc::new(Pet)),
            _ => None,
        }
    }

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn columns_map_to_properties() {
        let prop = RelationProperty::new(&["person.owner_id", "person.id"], resolver).unwrap();
        assert_eq!(prop.size(), 2);
        assert_eq!(prop.cols(), ["owner_id", "id"]);
        assert_eq!(prop.props(), ["ownerId", "id"]);

        let obj = row(json!({ "ownerId": 1, "id": "a" }));
        assert_eq!(prop.prop_key(&obj), "k_1,a");
        assert!(prop.has_props(&obj));
        assert!(!prop.has_props(&row(json!({ "id": 2 }))));
        assert_eq!(prop.prop_key(&row(json!({ "id": null }))), "k_undefined,null");
    }

    #[test]
    fn json_paths_are_read_and_written() {
        let prop = RelationProperty::new(&["person.meta:a.list[1]"], resolver).unwrap();
        let mut obj = Row::new();
        prop.set_prop(&mut obj, 0, json!(5));
        assert_eq!(Value::Object(obj.clone()), json!({ "meta": { "a": { "list": [null, 5] } } }));
        assert_eq!(prop.get_prop(&obj, 0), Some(json!(5)));

        let mut patch = Row::new();
        prop.patch(&mut patch, 0, json!(6));
        assert_eq!(Value::Object(patch), json!({ "person.meta:a.list[1]": 6 }));
    }

    #[test]
    fn resolution_errors() {
        assert!(matches!(
            RelationProperty::new(&["id"], resolver),
            Err(QueryError::InvalidReference { .. })
        ));
        assert!(matches!(
            RelationProperty::new(&["movie.id"], resolver),
            Err(QueryError::ModelNotFound { table }) if table == "movie"
        ));
        assert!(matches!(
            RelationProperty::new(&["person.id", "pet.id"], resolver),
            Err(QueryError::InvalidReference { .. })
        ));
        assert!(matches!(
            RelationProperty::new(&["person.c:a..b"], resolver),
            Err(QueryError::InvalidReference { .. })
        ));
    }
}
