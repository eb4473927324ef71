//! The `$`-keyed object form of relation expressions.
//!
//! ```json
//! { "pets": { "$modify": ["young"], "toys": true }, "parent": { "$recursive": 2 } }
//! ```

use indexmap::IndexMap;
use serde_json::{Map, Value, json};

use super::{Recursion, RelationExpression, RelationExpressionError, RelationNode};
use crate::error::Result;

impl RelationExpression {
    /// Fully expanded object form. Every node carries all of its `$` keys.
    pub fn to_json(&self) -> Value {
        node_to_json(self.node())
    }

    /// Accepts the object form (missing `$` keys get defaults, `true` stands
    /// for an empty child) or a string in the textual form.
    pub fn from_json(value: &Value) -> Result<RelationExpression> {
        match value {
            Value::String(s) => Ok(RelationExpression::parse(s)?),
            Value::Null => Ok(RelationExpression::new()),
            Value::Object(_) | Value::Bool(true) => {
                Ok(RelationExpression::from_node(normalize(value, "", false)))
            }
            other => Err(RelationExpressionError::Parse {
                expression: other.to_string(),
                message: "expected an object or a string".to_string(),
            }
            .into()),
        }
    }
}

fn node_to_json(node: &RelationNode) -> Value {
    let recursive = match node.recursive {
        Recursion::None => json!(false),
        Recursion::Unbounded => json!(true),
        Recursion::Depth(n) => json!(n),
    };

    let mut out = Map::new();
    out.insert("$name".into(), json!(node.name));
    out.insert("$relation".into(), json!(node.relation));
    out.insert("$modify".into(), json!(node.modify));
    out.insert("$recursive".into(), recursive);
    out.insert("$allRecursive".into(), json!(node.all_recursive));
    out.insert(
        "$childNames".into(),
        json!(node.children.keys().collect::<Vec<_>>()),
    );
    for (name, child) in &node.children {
        out.insert(name.clone(), node_to_json(child));
    }
    Value::Object(out)
}

fn normalize(value: &Value, name: &str, all_recursive: bool) -> RelationNode {
    let empty = Map::new();
    let obj = value.as_object().unwrap_or(&empty);

    let text = |key: &str| {
        obj.get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .unwrap_or(name)
            .to_string()
    };

    let modify = match obj.get("$modify") {
        Some(Value::String(m)) if !m.is_empty() => vec![m.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    };

    let recursive = match obj.get("$recursive") {
        Some(Value::Bool(true)) => Recursion::Unbounded,
        Some(Value::Number(n)) => n
            .as_u64()
            .map(|n| Recursion::depth(u32::try_from(n).unwrap_or(u32::MAX)))
            .unwrap_or_default(),
        _ => Recursion::None,
    };

    let child_names: Vec<String> = match obj.get("$childNames").and_then(Value::as_array) {
        Some(names) => names
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        None => obj.keys().filter(|k| !k.starts_with('$')).cloned().collect(),
    };

    let mut children = IndexMap::new();
    for child_name in child_names {
        if let Some(child @ (Value::Object(_) | Value::Bool(true))) = obj.get(&child_name) {
            let node = normalize(child, &child_name, false);
            children.insert(child_name, node);
        }
    }

    RelationNode {
        name: text("$name"),
        relation: text("$relation"),
        modify,
        recursive,
        all_recursive: obj
            .get("$allRecursive")
            .and_then(Value::as_bool)
            .unwrap_or(all_recursive),
        children,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shorthand_objects_normalize() {
        let e = RelationExpression::from_json(&json!({
            "pets": { "$modify": "young", "toys": true },
            "parent": { "$recursive": 2 },
            "movies": { "$relation": "films" },
            "skipped": false,
        }))
        .unwrap();

        assert_eq!(e.to_string(), "[pets(young).toys, parent.^2, films as movies]");
    }

    #[test]
    fn expanded_form_round_trips() {
        let e = RelationExpression::parse("a(f) as x.[b.^, c.*]").unwrap();
        assert_eq!(RelationExpression::from_json(&e.to_json()).unwrap(), e);
    }

    #[test]
    fn strings_are_parsed() {
        let e = RelationExpression::from_json(&json!("a.b")).unwrap();
        assert_eq!(e.to_string(), "a.b");
    }

    #[test]
    fn numbers_are_rejected() {
        assert!(RelationExpression::from_json(&json!(3)).is_err());
    }
}
