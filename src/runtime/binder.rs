//! # Request Binder
//!
//! Turns one HTTP request into the positional argument list of its handler,
//! following the manifest's binding plan for the operation.
//!
//! ## Pipeline
//!
//! 1. The raw query is parsed once; `deepObject` names become nested objects.
//! 2. Each declared argument is looked up at its location, coerced against
//!    its schema and placed at its handler index. Arguments sharing an index
//!    merge into one object keyed by wire name.
//! 3. Aggregated query objects get `page`/`pageSize` defaults and a
//!    normalized `sort` array when they declare those keys.
//! 4. Every location is validated. All failures are collected and returned
//!    together as one [`ValidationFailure`]; nothing short-circuits.
//!
//! Client mistakes never produce `Err`. Only asking for an operation the
//! manifest does not know does.

use super::artifacts::Artifacts;
use super::coerce::coerce;
use super::query::{parse_cookies, parse_query, ParsedQuery};
use super::validator_cache::{field_errors, FieldError, ValidatorCache};
use crate::binding::{pointer_segment, ArgBinding, ParameterLocation, Serialization};
use crate::emit::{arg_schema, operation_validators, ManifestOperation, ValidationMode};
use anyhow::Context;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

/// Status code of every validation failure.
pub const VALIDATION_FAILURE_STATUS: u16 = 400;

const PAGE: &str = "page";
const PAGE_SIZE: &str = "pageSize";
const SORT: &str = "sort";

/// Per-location toggle for `YYYY-MM-DD` → `date-time` coercion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateCoercion {
    pub path: bool,
    pub query: bool,
    pub header: bool,
    pub cookie: bool,
}

impl Default for DateCoercion {
    fn default() -> Self {
        Self {
            path: true,
            query: true,
            header: false,
            cookie: false,
        }
    }
}

impl DateCoercion {
    pub fn enabled(&self, location: ParameterLocation) -> bool {
        match location {
            ParameterLocation::Path => self.path,
            ParameterLocation::Query => self.query,
            ParameterLocation::Header => self.header,
            ParameterLocation::Cookie => self.cookie,
            ParameterLocation::Body => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BinderConfig {
    /// `pageSize` filled into aggregated query objects that declare it
    pub default_page_size: u64,
    pub date_coercion: DateCoercion,
    /// Cache compiled validators between requests
    pub schema_cache: bool,
}

impl Default for BinderConfig {
    fn default() -> Self {
        Self {
            default_page_size: 20,
            date_coercion: DateCoercion::default(),
            schema_cache: true,
        }
    }
}

impl BinderConfig {
    /// Defaults overridden by `ROUTEFORGE_DEFAULT_PAGE_SIZE` and
    /// `ROUTEFORGE_SCHEMA_CACHE=off`.
    pub fn from_env() -> Self {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(size) = lookup("ROUTEFORGE_DEFAULT_PAGE_SIZE").and_then(|v| v.parse().ok()) {
            config.default_page_size = size;
        }
        if let Some(v) = lookup("ROUTEFORGE_SCHEMA_CACHE") {
            config.schema_cache = !v.eq_ignore_ascii_case("off");
        }
        config
    }
}

/// Request body as handed over by the HTTP layer.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Json(Value),
    Raw(String),
}

/// Everything the binder reads from a request. Header names are stored
/// lowercased; path parameters come from the router.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BindRequest {
    pub path_params: HashMap<String, String>,
    pub query: String,
    pub headers: HashMap<String, String>,
    pub cookies: HashMap<String, String>,
    pub body: Option<RequestBody>,
}

impl BindRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `http` request parts. Cookies are read from the `Cookie`
    /// header; non-UTF-8 header values are skipped.
    pub fn from_parts(
        parts: &http::request::Parts,
        path_params: HashMap<String, String>,
        body: Option<&[u8]>,
    ) -> Self {
        let headers: HashMap<String, String> = parts
            .headers
            .iter()
            .filter_map(|(name, value)| {
                Some((name.as_str().to_ascii_lowercase(), value.to_str().ok()?.to_string()))
            })
            .collect();
        let cookies = headers
            .get("cookie")
            .map(|c| parse_cookies(c))
            .unwrap_or_default();
        Self {
            path_params,
            query: parts.uri.query().unwrap_or_default().to_string(),
            headers,
            cookies,
            body: body
                .filter(|b| !b.is_empty())
                .map(|b| RequestBody::Raw(String::from_utf8_lossy(b).into_owned())),
        }
    }

    pub fn with_path_param(mut self, name: &str, value: &str) -> Self {
        self.path_params.insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_query(mut self, query: &str) -> Self {
        self.query = query.to_string();
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers
            .insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    pub fn with_cookie(mut self, name: &str, value: &str) -> Self {
        self.cookies.insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_json_body(mut self, body: Value) -> Self {
        self.body = Some(RequestBody::Json(body));
        self
    }

    pub fn with_raw_body(mut self, body: &str) -> Self {
        self.body = Some(RequestBody::Raw(body.to_string()));
        self
    }
}

/// Every check that failed for one request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationFailure {
    pub status: u16,
    pub operation_id: String,
    pub errors: Vec<FieldError>,
}

impl ValidationFailure {
    /// JSON body for the 400 response.
    pub fn body(&self) -> Value {
        json!({
            "error": "Request validation failed",
            "operationId": self.operation_id,
            "errors": self.errors,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BindOutcome {
    /// Positional handler arguments; unbound optional slots are `null`.
    Bound(Vec<Value>),
    Invalid(ValidationFailure),
}

pub struct RequestBinder {
    artifacts: Arc<Artifacts>,
    config: BinderConfig,
    validators: ValidatorCache,
}

fn error_path(location: ParameterLocation, name: &str) -> String {
    format!("/{}/{}", location.as_str(), pointer_segment(name))
}

fn json_error(path: String, error: &serde_json::Error) -> FieldError {
    FieldError {
        path,
        message: format!("invalid JSON: {error}"),
        keyword: "json".to_string(),
        params: json!({}),
    }
}

/// Decode a JSON-serialized parameter. A repeated key uses its last value.
fn decode_json(raw: &Value) -> Result<Value, serde_json::Error> {
    let text = match raw {
        Value::String(s) => s.as_str(),
        Value::Array(items) => items.iter().rev().find_map(Value::as_str).unwrap_or(""),
        other => return Ok(other.clone()),
    };
    serde_json::from_str(text)
}

fn split_sort(value: &Value) -> Value {
    let parts: Vec<Value> = match value {
        Value::String(s) => s
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(|p| Value::String(p.to_string()))
            .collect(),
        Value::Array(items) => items.iter().flat_map(|item| match split_sort(item) {
            Value::Array(inner) => inner,
            other => vec![other],
        }).collect(),
        other => return other.clone(),
    };
    Value::Array(parts)
}

impl RequestBinder {
    /// Binder over `artifacts`. In precompiled mode every shipped validator
    /// is compiled here, before the first request.
    pub fn new(artifacts: Arc<Artifacts>, config: BinderConfig) -> Self {
        let validators = ValidatorCache::new(config.schema_cache);
        if artifacts.manifest.validation.mode == ValidationMode::Precompiled {
            if let Some(precompiled) = &artifacts.validators {
                validators.precompile(&artifacts.manifest.schema_hash, precompiled);
            }
        }
        Self {
            artifacts,
            config,
            validators,
        }
    }

    pub fn artifacts(&self) -> &Arc<Artifacts> {
        &self.artifacts
    }

    pub fn config(&self) -> &BinderConfig {
        &self.config
    }

    /// Swap in freshly loaded artifacts, dropping validators of the old schema.
    pub fn reload(&mut self, artifacts: Arc<Artifacts>) {
        self.validators.retain_hash(&artifacts.manifest.schema_hash);
        if artifacts.manifest.validation.mode == ValidationMode::Precompiled {
            if let Some(precompiled) = &artifacts.validators {
                self.validators
                    .precompile(&artifacts.manifest.schema_hash, precompiled);
            }
        }
        self.artifacts = artifacts;
    }

    /// Bind `request` for `operation_id`. Fails for an unknown operation or
    /// when a validator for one of its locations cannot be compiled.
    pub fn bind(&self, operation_id: &str, request: &BindRequest) -> anyhow::Result<BindOutcome> {
        let op = self
            .artifacts
            .manifest
            .operation(operation_id)
            .with_context(|| format!("unknown operation '{operation_id}'"))?;
        let document = &self.artifacts.schema;

        let deep: HashSet<&str> = op
            .args
            .query
            .iter()
            .filter(|a| a.serialization == Some(Serialization::DeepObject))
            .map(|a| a.name.as_str())
            .collect();
        let query = parse_query(&request.query, &deep);

        let mut shared: HashMap<usize, usize> = HashMap::new();
        for (_, arg) in op.args.located() {
            *shared.entry(arg.index).or_default() += 1;
        }
        let merged = |arg: &ArgBinding| arg.aggregate || shared.get(&arg.index).copied().unwrap_or(0) > 1;

        let mut args = vec![Value::Null; op.args.arity()];
        let mut errors = Vec::new();

        for (location, bindings) in [
            (ParameterLocation::Path, &op.args.path),
            (ParameterLocation::Query, &op.args.query),
            (ParameterLocation::Header, &op.args.headers),
            (ParameterLocation::Cookie, &op.args.cookies),
        ] {
            if bindings.is_empty() {
                continue;
            }
            let mut values = Map::new();
            for arg in bindings {
                let Some(raw) = Self::raw_value(location, arg, request, &query) else {
                    continue;
                };
                let value = if arg.serialization == Some(Serialization::Json) {
                    match decode_json(&raw) {
                        Ok(v) => v,
                        Err(e) => {
                            errors.push(json_error(error_path(location, &arg.name), &e));
                            continue;
                        }
                    }
                } else {
                    coerce(
                        &raw,
                        &arg_schema(document, arg),
                        document,
                        self.config.date_coercion.enabled(location),
                    )
                };
                values.insert(arg.name.clone(), value);
            }
            if location == ParameterLocation::Query {
                self.apply_query_defaults(document, bindings, &mut values);
            }

            for arg in bindings {
                let Some(slot) = args.get_mut(arg.index) else {
                    continue;
                };
                if merged(arg) {
                    if !slot.is_object() {
                        *slot = Value::Object(Map::new());
                    }
                    if let (Value::Object(object), Some(value)) = (slot, values.get(&arg.name)) {
                        object.insert(arg.name.clone(), value.clone());
                    }
                } else if let Some(value) = values.get(&arg.name) {
                    *slot = value.clone();
                }
            }

            self.validate(op, location, &Value::Object(values), &mut errors)?;
        }

        if let Some(body_arg) = &op.args.body {
            let mut malformed = false;
            let body = match &request.body {
                None => None,
                Some(RequestBody::Json(v)) => Some(v.clone()),
                Some(RequestBody::Raw(text)) if text.trim().is_empty() => None,
                Some(RequestBody::Raw(text)) => match serde_json::from_str(text) {
                    Ok(v) => Some(v),
                    Err(e) => {
                        errors.push(json_error("/body".to_string(), &e));
                        malformed = true;
                        None
                    }
                },
            };
            match body {
                Some(body) => {
                    self.validate(op, ParameterLocation::Body, &body, &mut errors)?;
                    if let Some(slot) = args.get_mut(body_arg.index) {
                        *slot = body;
                    }
                }
                None if body_arg.required && !malformed => {
                    errors.push(FieldError {
                        path: "/body".to_string(),
                        message: "request body is required".to_string(),
                        keyword: "required".to_string(),
                        params: json!({ "missingProperty": "body" }),
                    });
                }
                None => {}
            }
        }

        if errors.is_empty() {
            return Ok(BindOutcome::Bound(args));
        }
        debug!(
            operation_id,
            error_count = errors.len(),
            "Request validation failed"
        );
        Ok(BindOutcome::Invalid(ValidationFailure {
            status: VALIDATION_FAILURE_STATUS,
            operation_id: operation_id.to_string(),
            errors,
        }))
    }

    fn raw_value(
        location: ParameterLocation,
        arg: &ArgBinding,
        request: &BindRequest,
        query: &ParsedQuery,
    ) -> Option<Value> {
        let text = |s: &String| Value::String(s.clone());
        match location {
            ParameterLocation::Path => request.path_params.get(&arg.name).map(text),
            ParameterLocation::Query => query.get(&arg.name).cloned(),
            ParameterLocation::Header => request
                .headers
                .get(&arg.name.to_ascii_lowercase())
                .map(text),
            ParameterLocation::Cookie => request.cookies.get(&arg.name).map(text),
            ParameterLocation::Body => None,
        }
    }

    /// Pagination defaults and `sort` normalization for aggregated query objects.
    fn apply_query_defaults(
        &self,
        document: &Value,
        bindings: &[ArgBinding],
        values: &mut Map<String, Value>,
    ) {
        for arg in bindings.iter().filter(|a| a.aggregate) {
            match arg.name.as_str() {
                PAGE => {
                    values.entry(PAGE).or_insert_with(|| json!(1));
                }
                PAGE_SIZE => {
                    values
                        .entry(PAGE_SIZE)
                        .or_insert_with(|| json!(self.config.default_page_size));
                }
                SORT => {
                    let declared_string = arg_schema(document, arg)
                        .get("type")
                        .and_then(Value::as_str)
                        == Some("string");
                    if declared_string {
                        continue;
                    }
                    if let Some(sort) = values.get_mut(SORT) {
                        *sort = split_sort(sort);
                    }
                }
                _ => {}
            }
        }
    }

    /// Errors only when the location's schema cannot be compiled; the
    /// request must not reach the handler unchecked.
    fn validate(
        &self,
        op: &ManifestOperation,
        location: ParameterLocation,
        instance: &Value,
        errors: &mut Vec<FieldError>,
    ) -> anyhow::Result<()> {
        let mode = self.artifacts.manifest.validation.mode;
        if mode == ValidationMode::None {
            return Ok(());
        }
        let artifacts = &self.artifacts;
        let validator = self.validators.get_or_compile_with(
            &artifacts.manifest.schema_hash,
            &op.operation_id,
            location.as_str(),
            || {
                if mode == ValidationMode::Precompiled {
                    if let Some(schema) = artifacts.precompiled(&op.operation_id, location.as_str()) {
                        return Some(schema.clone());
                    }
                }
                operation_validators(&artifacts.schema, op).remove(location.as_str())
            },
        )?;
        if let Some(validator) = validator {
            errors.extend(field_errors(
                &validator,
                instance,
                &format!("/{}", location.as_str()),
            ));
        }
        Ok(())
    }
}
