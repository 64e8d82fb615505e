// example.rs

use super::types::Schema;
use indexmap::IndexMap;
use serde_json::{json, Map, Value};

const MAX_DEPTH: usize = 4;

/// Placeholder value shaped like `schema`, for documentation examples.
pub fn example_value(schema: &Schema, components: &IndexMap<String, Schema>) -> Value {
    example_at(schema, components, 0)
}

fn example_at(schema: &Schema, components: &IndexMap<String, Schema>, depth: usize) -> Value {
    if let Some(example) = &schema.example {
        return example.clone();
    }
    if depth > MAX_DEPTH {
        return Value::Null;
    }
    if let Some(name) = schema.ref_name() {
        return match components.get(name) {
            Some(target) => example_at(target, components, depth + 1),
            None => Value::Null,
        };
    }
    if let Some(first) = schema.enum_values.as_ref().and_then(|v| v.first()) {
        return first.clone();
    }
    if let Some(branch) = schema
        .any_of
        .as_ref()
        .or(schema.one_of.as_ref())
        .and_then(|b| b.iter().find(|s| !s.is_type("null")))
    {
        return example_at(branch, components, depth + 1);
    }
    if let Some(parts) = &schema.all_of {
        let mut merged = Map::new();
        for part in parts {
            if let Value::Object(obj) = example_at(part, components, depth + 1) {
                merged.extend(obj);
            }
        }
        return Value::Object(merged);
    }

    match schema.ty.as_deref() {
        Some("string") => match schema.format.as_deref() {
            Some("date-time") => json!("2024-01-01T00:00:00Z"),
            Some("date") => json!("2024-01-01"),
            Some("int64") => json!("42"),
            Some("email") => json!("user@example.com"),
            Some("uuid") => json!("00000000-0000-0000-0000-000000000000"),
            _ => json!("example"),
        },
        Some("integer") => match &schema.minimum {
            Some(min) => Value::Number(min.clone()),
            None => json!(42),
        },
        Some("number") => json!(3.14),
        Some("boolean") => json!(true),
        Some("null") => Value::Null,
        Some("array") => match &schema.items {
            Some(items) => json!([example_at(items, components, depth + 1)]),
            None => json!([]),
        },
        Some("object") | None => {
            let mut obj = Map::new();
            if let Some(props) = &schema.properties {
                for (name, prop) in props {
                    obj.insert(name.clone(), example_at(prop, components, depth + 1));
                }
            }
            Value::Object(obj)
        }
        Some(_) => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalars() {
        let components = IndexMap::new();
        assert_eq!(example_value(&Schema::typed("string"), &components), json!("example"));
        assert_eq!(example_value(&Schema::typed("integer"), &components), json!(42));
        assert_eq!(example_value(&Schema::typed("boolean"), &components), json!(true));
        assert_eq!(
            example_value(&Schema::string_format("date-time"), &components),
            json!("2024-01-01T00:00:00Z")
        );
    }

    #[test]
    fn test_enum_uses_first_value() {
        let s = Schema {
            enum_values: Some(vec![json!("draft"), json!("published")]),
            ..Schema::typed("string")
        };
        assert_eq!(example_value(&s, &IndexMap::new()), json!("draft"));
    }

    #[test]
    fn test_object_follows_refs() {
        let mut components = IndexMap::new();
        let mut props = IndexMap::new();
        props.insert("email".to_string(), Schema::typed("string"));
        components.insert("Author".to_string(), Schema::object(props, vec![]));
        let mut filter = IndexMap::new();
        filter.insert("author".to_string(), Schema::reference("Author"));
        filter.insert("tags".to_string(), Schema::array(Schema::typed("string")));
        let s = Schema::object(filter, vec![]);
        assert_eq!(
            example_value(&s, &components),
            json!({"author": {"email": "example"}, "tags": ["example"]})
        );
    }
}
