//! Coerce wire strings into the JSON values their schema expects.
//!
//! Values that do not parse are left as strings so the validator reports them
//! with a proper `type` error instead of the binder guessing.

use crate::emit::resolve_component;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

static BARE_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("valid date regex"));

const MAX_DEPTH: usize = 32;

/// Effective schema: component refs followed, nullable wrappers unwrapped.
fn effective<'a>(document: &'a Value, schema: &'a Value) -> &'a Value {
    let schema = resolve_component(document, schema);
    for keyword in ["anyOf", "oneOf"] {
        if let Some(branches) = schema.get(keyword).and_then(Value::as_array) {
            let concrete: Vec<&Value> = branches
                .iter()
                .filter(|b| b.get("type").and_then(Value::as_str) != Some("null"))
                .collect();
            if let [only] = concrete.as_slice() {
                return resolve_component(document, only);
            }
        }
    }
    schema
}

/// `type` as a single name; `["integer", "null"]` reads as `integer`.
fn type_name(schema: &Value) -> Option<&str> {
    match schema.get("type")? {
        Value::String(ty) => Some(ty.as_str()),
        Value::Array(types) => types
            .iter()
            .filter_map(Value::as_str)
            .find(|ty| *ty != "null"),
        _ => None,
    }
}

fn convert_primitive(value: &str, schema: &Value, dates: bool) -> Value {
    match type_name(schema) {
        Some("integer") => value
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or_else(|_| Value::String(value.to_string())),
        // Whole numbers stay integral.
        Some("number") => value
            .parse::<i64>()
            .map(Value::from)
            .ok()
            .or_else(|| {
                value
                    .parse::<f64>()
                    .ok()
                    .and_then(serde_json::Number::from_f64)
                    .map(Value::Number)
            })
            .unwrap_or_else(|| Value::String(value.to_string())),
        Some("boolean") => value
            .parse::<bool>()
            .map(Value::from)
            .unwrap_or_else(|_| Value::String(value.to_string())),
        Some("null") if value == "null" || value.is_empty() => Value::Null,
        Some("string")
            if dates
                && schema.get("format").and_then(Value::as_str) == Some("date-time")
                && BARE_DATE.is_match(value) =>
        {
            Value::String(format!("{value}T00:00:00Z"))
        }
        _ => Value::String(value.to_string()),
    }
}

fn coerce_at(raw: &Value, schema: &Value, document: &Value, dates: bool, depth: usize) -> Value {
    if depth > MAX_DEPTH {
        return raw.clone();
    }
    let schema = effective(document, schema);
    match (type_name(schema), raw) {
        (Some("array"), Value::Array(items)) => {
            let item_schema = schema.get("items").unwrap_or(&Value::Null);
            Value::Array(
                items
                    .iter()
                    .map(|item| coerce_at(item, item_schema, document, dates, depth + 1))
                    .collect(),
            )
        }
        (Some("array"), Value::String(s)) => {
            let item_schema = schema.get("items").unwrap_or(&Value::Null);
            Value::Array(
                s.split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(|p| coerce_at(&Value::String(p.to_string()), item_schema, document, dates, depth + 1))
                    .collect(),
            )
        }
        (Some("object") | None, Value::Object(map)) => {
            let properties = schema.get("properties");
            let additional = schema.get("additionalProperties").filter(|a| a.is_object());
            let mut out = Map::new();
            for (key, value) in map {
                let property_schema = properties
                    .and_then(|p| p.get(key))
                    .or(additional)
                    .unwrap_or(&Value::Null);
                out.insert(
                    key.clone(),
                    coerce_at(value, property_schema, document, dates, depth + 1),
                );
            }
            Value::Object(out)
        }
        (Some("object"), Value::String(s)) => {
            serde_json::from_str(s).unwrap_or_else(|_| Value::String(s.clone()))
        }
        // A repeated scalar: let the validator see every value.
        (_, Value::Array(items)) if type_name(schema).is_some() => Value::Array(
            items
                .iter()
                .map(|item| coerce_at(item, schema, document, dates, depth + 1))
                .collect(),
        ),
        (_, Value::String(s)) => convert_primitive(s, schema, dates),
        _ => raw.clone(),
    }
}

/// Coerce `raw` (a string, an array of strings, or a deepObject tree) against
/// `schema`, following component refs in `document`.
///
/// With `dates` set, a `date-time` value given as `YYYY-MM-DD` gains
/// `T00:00:00Z`.
pub fn coerce(raw: &Value, schema: &Value, document: &Value, dates: bool) -> Value {
    coerce_at(raw, schema, document, dates, 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc() -> Value {
        json!({"components": {"schemas": {
            "Range": {"type": "object", "properties": {
                "from": {"type": "string", "format": "date-time"},
                "limit": {"type": "integer"}
            }}
        }}})
    }

    #[test]
    fn test_primitives() {
        let d = doc();
        assert_eq!(coerce(&json!("42"), &json!({"type": "integer"}), &d, false), json!(42));
        assert_eq!(coerce(&json!("1.5"), &json!({"type": "number"}), &d, false), json!(1.5));
        assert_eq!(coerce(&json!("true"), &json!({"type": "boolean"}), &d, false), json!(true));
        assert_eq!(coerce(&json!("abc"), &json!({"type": "integer"}), &d, false), json!("abc"));
        assert_eq!(coerce(&json!("7"), &json!({"type": ["integer", "null"]}), &d, false), json!(7));
        assert_eq!(coerce(&json!("x"), &json!({}), &d, false), json!("x"));
    }

    #[test]
    fn test_arrays_from_csv_and_repeats() {
        let d = doc();
        let schema = json!({"type": "array", "items": {"type": "integer"}});
        assert_eq!(coerce(&json!("1,2, 3"), &schema, &d, false), json!([1, 2, 3]));
        assert_eq!(coerce(&json!(["4", "5"]), &schema, &d, false), json!([4, 5]));
    }

    #[test]
    fn test_whole_numbers_stay_integral() {
        let d = doc();
        let schema = json!({"type": "array", "items": {"type": "number"}});
        let coerced = coerce(&json!("1,2.5,-3"), &schema, &d, false);
        assert_eq!(coerced, json!([1, 2.5, -3]));
        assert!(coerced[0].is_i64());
        assert!(coerced[1].is_f64());
        assert_eq!(coerce(&json!("1"), &json!({"type": "number"}), &d, false).to_string(), "1");
    }

    #[test]
    fn test_deep_object_follows_refs_and_dates() {
        let d = doc();
        let raw = json!({"from": "2024-01-31", "limit": "10"});
        let schema = json!({"$ref": "#/components/schemas/Range"});
        assert_eq!(
            coerce(&raw, &schema, &d, true),
            json!({"from": "2024-01-31T00:00:00Z", "limit": 10})
        );
        assert_eq!(
            coerce(&raw, &schema, &d, false),
            json!({"from": "2024-01-31", "limit": 10})
        );
    }

    #[test]
    fn test_nullable_any_of_unwraps() {
        let d = doc();
        let schema = json!({"anyOf": [{"type": "integer"}, {"type": "null"}]});
        assert_eq!(coerce(&json!("3"), &schema, &d, false), json!(3));
    }
}
