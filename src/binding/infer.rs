//! Design-time binding inference.
//!
//! Decides where each handler parameter comes from and how it is encoded, and
//! produces both the schema document's parameter objects and the manifest's
//! argument plan from the same decision, so the two never disagree.

use super::plan::{pointer_segment, ArgBinding, ArgBindings};
use super::types::{ParameterLocation, Serialization};
use crate::graph::ir::ParameterPayload;
use crate::schema::{example_value, is_identifier_like, Schema, TypeTranslator};
use crate::source::{annotations, ParamDecl};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use tracing::debug;

static PATH_PARAM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([^}/]+)\}").expect("path parameter regex should be valid"));

/// Extension carrying the real schema of a JSON-encoded query value.
pub const JSON_SCHEMA_EXTENSION: &str = "x-json-schema";

/// Placeholder names in a route template, in order.
pub fn path_params(template: &str) -> Vec<String> {
    PATH_PARAM
        .captures_iter(template)
        .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
        .collect()
}

/// Join a controller base path and a verb path into one normalised template.
pub fn join_route(base: &str, sub: &str) -> String {
    let joined = format!("/{}/{}", base.trim_matches('/'), sub.trim_matches('/'));
    let mut out = String::with_capacity(joined.len());
    for segment in joined.split('/').filter(|s| !s.is_empty()) {
        out.push('/');
        out.push_str(segment);
    }
    if out.is_empty() {
        out.push('/');
    }
    out
}

/// Location of a parameter: an explicit marker wins; otherwise a `{name}` in the
/// template means path, the first non-scalar parameter of a
/// `POST`/`PUT`/`PATCH` is the body, and everything else is query.
pub fn infer_location(
    param: &ParamDecl,
    method: &http::Method,
    template: &str,
    body_taken: bool,
) -> ParameterLocation {
    for a in &param.annotations {
        match a.name.as_str() {
            annotations::PATH => return ParameterLocation::Path,
            annotations::QUERY | annotations::DEEP_OBJECT => return ParameterLocation::Query,
            annotations::HEADER => return ParameterLocation::Header,
            annotations::COOKIE => return ParameterLocation::Cookie,
            annotations::BODY => return ParameterLocation::Body,
            _ => {}
        }
    }
    if path_params(template).iter().any(|p| p == &param.name) {
        return ParameterLocation::Path;
    }
    let accepts_body = matches!(
        *method,
        http::Method::POST | http::Method::PUT | http::Method::PATCH
    );
    if accepts_body && !body_taken && !param.ty.non_nullable().is_scalar() {
        return ParameterLocation::Body;
    }
    ParameterLocation::Query
}

/// An OpenAPI parameter object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterObject {
    pub name: String,
    #[serde(rename = "in")]
    pub location: ParameterLocation,
    pub required: bool,
    pub schema: Schema,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explode: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub example: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RequestBodyPlan {
    pub required: bool,
    pub schema: Schema,
}

/// Everything derived from one operation's parameter list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OperationPlan {
    pub parameters: Vec<ParameterObject>,
    pub request_body: Option<RequestBodyPlan>,
    pub args: ArgBindings,
}

/// `{type: integer, minimum: 1}`
fn positive_integer() -> Schema {
    Schema {
        minimum: Some(Number::from(1)),
        ..Schema::typed("integer")
    }
}

/// Bare JSON type of a schema, following component refs.
pub fn schema_type(schema: &Schema, translator: &TypeTranslator<'_>) -> Option<String> {
    let resolved = schema.resolve(translator.components());
    if let Some(ty) = &resolved.ty {
        return Some(ty.clone());
    }
    if resolved.properties.is_some() || resolved.all_of.is_some() {
        return Some("object".to_string());
    }
    resolved
        .any_of
        .as_ref()
        .and_then(|v| v.iter().find(|s| !s.is_type("null")))
        .and_then(|s| schema_type(s, translator))
}

struct PlanBuilder<'p> {
    pointer: &'p str,
    plan: OperationPlan,
}

impl PlanBuilder<'_> {
    fn add_parameter(
        &mut self,
        index: usize,
        param: ParameterObject,
        serialization: Serialization,
        aggregate: bool,
        schema_type: Option<String>,
    ) {
        let position = self.plan.parameters.len();
        let arg = ArgBinding {
            name: param.name.clone(),
            index,
            required: param.required,
            schema_ref: Some(format!("{}/parameters/{position}/schema", self.pointer)),
            schema_type,
            serialization: Some(serialization),
            aggregate,
        };
        self.plan.args.push(param.location, arg);
        self.plan.parameters.push(param);
    }
}

/// Infer the binding plan of one operation.
///
/// `pointer` is the operation's location in the schema document (see
/// [`operation_pointer`](super::operation_pointer)); argument `schemaRef`s point
/// below it.
pub fn infer_operation(
    params: &[&ParameterPayload],
    translator: &mut TypeTranslator<'_>,
    pointer: &str,
) -> OperationPlan {
    let mut b = PlanBuilder {
        pointer,
        plan: OperationPlan::default(),
    };
    for p in params {
        match p.location {
            ParameterLocation::Body => {
                let schema = translator.translate(&p.type_expr);
                let ty = schema_type(&schema, translator);
                b.plan.args.body = Some(ArgBinding {
                    name: p.wire_name.clone(),
                    index: p.index,
                    required: !p.is_optional,
                    schema_ref: Some(format!(
                        "{pointer}/requestBody/content/{}/schema",
                        pointer_segment("application/json")
                    )),
                    schema_type: ty,
                    serialization: Some(Serialization::Json),
                    aggregate: false,
                });
                b.plan.request_body = Some(RequestBodyPlan {
                    required: !p.is_optional,
                    schema,
                });
            }
            ParameterLocation::Path => {
                let mut schema = translator.translate_field(&p.type_expr, &p.wire_name);
                if is_identifier_like(&p.wire_name) && schema.is_numeric() {
                    schema = positive_integer();
                }
                let ty = schema_type(&schema, translator);
                let is_array = ty.as_deref() == Some("array");
                b.add_parameter(
                    p.index,
                    ParameterObject {
                        name: p.wire_name.clone(),
                        location: ParameterLocation::Path,
                        required: true,
                        schema,
                        style: is_array.then(|| "form".to_string()),
                        explode: is_array.then_some(true),
                        example: None,
                    },
                    Serialization::Form,
                    false,
                    ty,
                );
            }
            location => infer_non_body(&mut b, p, location, translator),
        }
    }
    b.plan
}

fn infer_non_body(
    b: &mut PlanBuilder<'_>,
    p: &ParameterPayload,
    location: ParameterLocation,
    translator: &mut TypeTranslator<'_>,
) {
    let schema = translator.translate_field(&p.type_expr, &p.wire_name);
    let ty = schema_type(&schema, translator);

    if p.deep_object {
        b.add_parameter(
            p.index,
            ParameterObject {
                name: p.wire_name.clone(),
                location,
                required: !p.is_optional,
                schema,
                style: Some("deepObject".to_string()),
                explode: Some(true),
                example: None,
            },
            Serialization::DeepObject,
            false,
            ty,
        );
        return;
    }

    let resolved = schema.resolve(translator.components()).clone();
    let aggregated = location == ParameterLocation::Query
        && !p.type_expr.non_nullable().is_scalar()
        && resolved.properties.is_some();
    if aggregated {
        debug!(parameter = %p.wire_name, "Aggregated query object expanded into parameters");
        let props = resolved.properties.clone().unwrap_or_default();
        for (name, prop) in props {
            let required = resolved.required.contains(&name);
            single_parameter(b, p.index, name, required, prop, location, true, translator);
        }
        return;
    }
    single_parameter(
        b,
        p.index,
        p.wire_name.clone(),
        !p.is_optional,
        schema,
        location,
        false,
        translator,
    );
}

#[allow(clippy::too_many_arguments)]
fn single_parameter(
    b: &mut PlanBuilder<'_>,
    index: usize,
    name: String,
    required: bool,
    schema: Schema,
    location: ParameterLocation,
    aggregate: bool,
    translator: &TypeTranslator<'_>,
) {
    if schema.is_object_like(translator.components()) {
        let example = example_value(&schema, translator.components());
        let encoded = serde_json::to_string(&example).unwrap_or_else(|_| "{}".to_string());
        let wire = Schema::typed("string").with_extension(JSON_SCHEMA_EXTENSION, schema.to_value());
        b.add_parameter(
            index,
            ParameterObject {
                name,
                location,
                required,
                schema: wire,
                style: None,
                explode: None,
                example: Some(Value::String(encoded)),
            },
            Serialization::Json,
            aggregate,
            Some("object".to_string()),
        );
        return;
    }
    let ty = schema_type(&schema, translator);
    let is_array = ty.as_deref() == Some("array");
    b.add_parameter(
        index,
        ParameterObject {
            name,
            location,
            required,
            schema,
            style: is_array.then(|| "form".to_string()),
            explode: is_array.then_some(true),
            example: None,
        },
        Serialization::Form,
        aggregate,
        ty,
    );
}
