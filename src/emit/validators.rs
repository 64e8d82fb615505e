//! Self-contained validation schemas per operation and argument location.
//!
//! The runtime validates one value per location: the body as-is, and the
//! path/query/header/cookie arguments as one object keyed by wire name. Both
//! the compile-time `validators.json` and the runtime's just-in-time validators
//! are built here so they cannot drift apart.

use super::manifest::{Manifest, ManifestOperation};
use crate::binding::{ArgBinding, ParameterLocation, JSON_SCHEMA_EXTENSION};
use crate::schema::COMPONENTS_PREFIX;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

const DEFS_PREFIX: &str = "#/$defs/";

/// Resolve a manifest `schemaRef` JSON pointer against the document.
pub fn resolve_pointer<'a>(document: &'a Value, reference: &str) -> Option<&'a Value> {
    let pointer = reference.strip_prefix('#').unwrap_or(reference);
    let unescaped: Vec<String> = pointer
        .split('/')
        .skip(1)
        .map(|s| s.replace("~1", "/").replace("~0", "~"))
        .collect();
    let mut current = document;
    for segment in &unescaped {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Schema the decoded value of `arg` must satisfy.
///
/// Follows `schemaRef`, unwraps JSON-encoded parameters to their real schema,
/// and falls back to the bare `schemaType`, then to `{}`.
pub fn arg_schema(document: &Value, arg: &ArgBinding) -> Value {
    if let Some(schema) = arg
        .schema_ref
        .as_deref()
        .and_then(|r| resolve_pointer(document, r))
    {
        return schema
            .get(JSON_SCHEMA_EXTENSION)
            .cloned()
            .unwrap_or_else(|| schema.clone());
    }
    match &arg.schema_type {
        Some(ty) => json!({ "type": ty }),
        None => json!({}),
    }
}

/// Follow a component `$ref` in the document; anything else resolves to itself.
pub fn resolve_component<'a>(document: &'a Value, schema: &'a Value) -> &'a Value {
    let mut current = schema;
    for _ in 0..16 {
        let Some(name) = current
            .get("$ref")
            .and_then(Value::as_str)
            .and_then(|r| r.strip_prefix(COMPONENTS_PREFIX))
        else {
            break;
        };
        match document.pointer(&format!("/components/schemas/{name}")) {
            Some(next) => current = next,
            None => break,
        }
    }
    current
}

fn rewrite_refs(value: &mut Value, found: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            if let Some(Value::String(r)) = map.get_mut("$ref") {
                if let Some(name) = r.strip_prefix(COMPONENTS_PREFIX).map(str::to_string) {
                    *r = format!("{DEFS_PREFIX}{name}");
                    found.push(name);
                }
            }
            for v in map.values_mut() {
                rewrite_refs(v, found);
            }
        }
        Value::Array(items) => {
            for v in items {
                rewrite_refs(v, found);
            }
        }
        _ => {}
    }
}

/// Copy every component `schema` reaches into `$defs` and point its refs there.
pub fn bundle(schema: &Value, document: &Value) -> Value {
    let mut root = schema.clone();
    let mut pending = Vec::new();
    rewrite_refs(&mut root, &mut pending);
    let mut defs = Map::new();
    while let Some(name) = pending.pop() {
        if defs.contains_key(&name) {
            continue;
        }
        let Some(component) = document.pointer(&format!("/components/schemas/{name}")) else {
            continue;
        };
        let mut component = component.clone();
        rewrite_refs(&mut component, &mut pending);
        defs.insert(name, component);
    }
    if !defs.is_empty() {
        if let Value::Object(map) = &mut root {
            map.insert("$defs".to_string(), Value::Object(defs));
        } else {
            root = json!({ "allOf": [root], "$defs": defs });
        }
    }
    root
}

/// Object schema for the non-body arguments at one location.
pub fn location_schema(document: &Value, args: &[&ArgBinding]) -> Value {
    let mut properties = Map::new();
    let mut required = Vec::new();
    for arg in args {
        properties.insert(arg.name.clone(), arg_schema(document, arg));
        if arg.required {
            required.push(Value::String(arg.name.clone()));
        }
    }
    json!({ "type": "object", "properties": properties, "required": required })
}

/// Bundled validators for one operation keyed by location (`body`, `path`,
/// `query`, `header`, `cookie`). Locations without arguments are absent.
pub fn operation_validators(document: &Value, op: &ManifestOperation) -> BTreeMap<String, Value> {
    let mut out = BTreeMap::new();
    if let Some(body) = &op.args.body {
        out.insert(
            ParameterLocation::Body.as_str().to_string(),
            bundle(&arg_schema(document, body), document),
        );
    }
    for location in [
        ParameterLocation::Path,
        ParameterLocation::Query,
        ParameterLocation::Header,
        ParameterLocation::Cookie,
    ] {
        let args: Vec<&ArgBinding> = op
            .args
            .located()
            .filter(|(l, _)| *l == location)
            .map(|(_, a)| a)
            .collect();
        if args.is_empty() {
            continue;
        }
        out.insert(
            location.as_str().to_string(),
            bundle(&location_schema(document, &args), document),
        );
    }
    out
}

/// `validators.json`: `{operationId: {location: schema}}`.
pub fn precompiled_validators(document: &Value, manifest: &Manifest) -> Value {
    let mut out = Map::new();
    for op in &manifest.operations {
        let validators = operation_validators(document, op);
        out.insert(op.operation_id.clone(), json!(validators));
    }
    Value::Object(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::Serialization;

    fn doc() -> Value {
        json!({
            "paths": {"/posts": {"get": {"parameters": [
                {"name": "filter", "in": "query", "schema": {
                    "type": "string",
                    "x-json-schema": {"$ref": "#/components/schemas/Filter"}
                }},
                {"name": "page", "in": "query", "schema": {"type": "integer"}}
            ]}}},
            "components": {"schemas": {
                "Filter": {"type": "object", "properties": {"author": {"$ref": "#/components/schemas/Author"}}},
                "Author": {"type": "object", "properties": {"email": {"type": "string"}}}
            }}
        })
    }

    fn arg(name: &str, reference: Option<&str>, ty: Option<&str>) -> ArgBinding {
        ArgBinding {
            name: name.to_string(),
            index: 0,
            required: false,
            schema_ref: reference.map(str::to_string),
            schema_type: ty.map(str::to_string),
            serialization: Some(Serialization::Form),
            aggregate: false,
        }
    }

    #[test]
    fn test_arg_schema_unwraps_json_parameters_and_falls_back() {
        let d = doc();
        let filter = arg("filter", Some("#/paths/~1posts/get/parameters/0/schema"), None);
        assert_eq!(
            arg_schema(&d, &filter),
            json!({"$ref": "#/components/schemas/Filter"})
        );
        let missing = arg("x", Some("#/paths/~1nope/get/parameters/0/schema"), Some("boolean"));
        assert_eq!(arg_schema(&d, &missing), json!({"type": "boolean"}));
        assert_eq!(arg_schema(&d, &arg("y", None, None)), json!({}));
    }

    #[test]
    fn test_bundle_collects_transitive_defs() {
        let d = doc();
        let bundled = bundle(&json!({"$ref": "#/components/schemas/Filter"}), &d);
        assert_eq!(bundled["$ref"], "#/$defs/Filter");
        assert_eq!(
            bundled["$defs"]["Filter"]["properties"]["author"]["$ref"],
            "#/$defs/Author"
        );
        assert!(bundled["$defs"].get("Author").is_some());
    }
}
