use crate::binding::{infer_operation, operation_pointer, OperationPlan};
use crate::graph::ir::{IrGraph, NodeKind, Relation};
use crate::graph::registry::{DeclaredItem, Registry};
use crate::schema::{response_schema, Schema, TypeTranslator};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::debug;

pub const OPENAPI_VERSION: &str = "3.1.0";
pub const JSON_MEDIA_TYPE: &str = "application/json";

/// `info` block of the schema document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub title: String,
    pub version: String,
}

impl Default for DocumentInfo {
    fn default() -> Self {
        Self {
            title: "API".to_string(),
            version: "1.0.0".to_string(),
        }
    }
}

/// One operation with everything both emitters need.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledOperation {
    pub operation_id: String,
    pub method: http::Method,
    pub path: String,
    /// `Controller.method`
    pub handler: String,
    pub tags: Vec<String>,
    pub middleware: Vec<String>,
    pub plan: OperationPlan,
    /// `None` when the handler returns nothing.
    pub response: Option<Schema>,
}

impl CompiledOperation {
    pub fn pointer(&self) -> String {
        operation_pointer(&self.path, &self.method)
    }

    /// `200` with a body, `204` without.
    pub fn status(&self) -> u16 {
        if self.response.is_some() {
            200
        } else {
            204
        }
    }
}

/// Walk every operation node of the final graph, in graph order, and infer its
/// binding plan and response schema.
pub fn collect_operations(
    graph: &IrGraph,
    registry: &Registry,
    translator: &mut TypeTranslator<'_>,
) -> Vec<CompiledOperation> {
    let mut out = Vec::new();
    for node in graph.nodes_of(NodeKind::Operation) {
        let Some(op) = node.as_operation() else {
            continue;
        };
        let mut params: Vec<_> = node
            .outgoing(Relation::Contains)
            .filter_map(|e| graph.node(&e.target))
            .filter_map(|n| n.as_parameter())
            .collect();
        params.sort_by_key(|p| p.index);

        let pointer = operation_pointer(&op.path, &op.http_method);
        let plan = infer_operation(&params, translator, &pointer);
        let entry = registry.for_node(&node.id);
        let response = entry.and_then(|e| match &e.declared {
            DeclaredItem::Operation { method, .. } => response_schema(translator, &method.returns),
            _ => None,
        });
        let tags = entry
            .and_then(|e| e.route.as_ref())
            .map(|r| r.tags.clone())
            .unwrap_or_else(|| node.metadata.tags.iter().cloned().collect());
        debug!(
            operation_id = %op.operation_id,
            parameters = plan.parameters.len(),
            has_body = plan.request_body.is_some(),
            "Operation compiled"
        );
        out.push(CompiledOperation {
            operation_id: op.operation_id.clone(),
            method: op.http_method.clone(),
            path: op.path.clone(),
            handler: node.name().to_string(),
            tags,
            middleware: op.middleware.clone(),
            plan,
            response,
        });
    }
    out
}

fn operation_object(op: &CompiledOperation) -> Value {
    let mut obj = Map::new();
    obj.insert("operationId".into(), json!(op.operation_id));
    if !op.tags.is_empty() {
        obj.insert("tags".into(), json!(op.tags));
    }
    if !op.plan.parameters.is_empty() {
        obj.insert("parameters".into(), json!(op.plan.parameters));
    }
    if let Some(body) = &op.plan.request_body {
        obj.insert(
            "requestBody".into(),
            json!({
                "required": body.required,
                "content": { JSON_MEDIA_TYPE: { "schema": body.schema } }
            }),
        );
    }
    let response = match &op.response {
        Some(schema) => json!({
            "description": "OK",
            "content": { JSON_MEDIA_TYPE: { "schema": schema } }
        }),
        None => json!({ "description": "No Content" }),
    };
    obj.insert(
        "responses".into(),
        json!({ op.status().to_string(): response }),
    );
    Value::Object(obj)
}

/// Assemble the OpenAPI 3.1 document.
pub fn openapi_document(
    info: &DocumentInfo,
    operations: &[CompiledOperation],
    components: &IndexMap<String, Schema>,
) -> Value {
    let mut paths: IndexMap<&str, Map<String, Value>> = IndexMap::new();
    for op in operations {
        paths
            .entry(op.path.as_str())
            .or_default()
            .insert(op.method.as_str().to_ascii_lowercase(), operation_object(op));
    }
    json!({
        "openapi": OPENAPI_VERSION,
        "info": info,
        "paths": paths,
        "components": { "schemas": components },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::{ParameterLocation, ParameterObject};

    fn op(method: http::Method, path: &str, response: Option<Schema>) -> CompiledOperation {
        CompiledOperation {
            operation_id: format!("{}_{}", method.as_str().to_lowercase(), path.len()),
            method,
            path: path.to_string(),
            handler: "Users.get".to_string(),
            tags: vec!["users".to_string()],
            middleware: Vec::new(),
            plan: OperationPlan::default(),
            response,
        }
    }

    #[test]
    fn test_paths_group_methods_and_void_is_204() {
        let mut get = op(http::Method::GET, "/users/{id}", Some(Schema::reference("User")));
        get.plan.parameters.push(ParameterObject {
            name: "id".into(),
            location: ParameterLocation::Path,
            required: true,
            schema: Schema::typed("integer"),
            style: None,
            explode: None,
            example: None,
        });
        let delete = op(http::Method::DELETE, "/users/{id}", None);
        let mut components = IndexMap::new();
        components.insert("User".to_string(), Schema::typed("object"));

        let doc = openapi_document(&DocumentInfo::default(), &[get, delete], &components);
        assert_eq!(doc["openapi"], "3.1.0");
        let item = &doc["paths"]["/users/{id}"];
        assert_eq!(item["get"]["parameters"][0]["in"], "path");
        assert_eq!(
            item["get"]["responses"]["200"]["content"]["application/json"]["schema"]["$ref"],
            "#/components/schemas/User"
        );
        assert_eq!(item["delete"]["responses"]["204"]["description"], "No Content");
        assert!(item["delete"].get("parameters").is_none());
        assert_eq!(doc["components"]["schemas"]["User"]["type"], "object");
    }
}
