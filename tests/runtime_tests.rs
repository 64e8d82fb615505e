#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

//! End-to-end runtime tests
//!
//! # Test Strategy
//!
//! Each test compiles the blog fixture into a temporary directory, loads the
//! artifacts through an [`ArtifactCache`], and resolves requests through a
//! [`RouteTable`] and [`RequestBinder`] exactly as a host server would:
//! 1. **Binding**: path, aggregated query, deepObject and JSON-encoded values
//! 2. **Validation**: every failing field is reported, the handler is never reached
//! 3. **Middleware**: named middleware runs around binding
//! 4. **Reload**: fresh artifacts replace the cached entry
//! 5. **Default pipeline**: the same guarantees with inlining and flattening on

mod common;

use common::{blog_units, collect_refs, named_components, prim, unit};
use http::Method;
use routeforge::compiler::Compiler;
use routeforge::config::CompilerConfig;
use routeforge::emit::ValidationMode;
use routeforge::source::DeclarationUnit;
use routeforge::runtime::{
    ArtifactCache, Artifacts, BindRequest, BinderConfig, Middleware, MiddlewareRegistry,
    Rejection, RequestBinder, Resolution, RouteTable, VALIDATION_FAILURE_STATUS,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// Counts requests and remembers how each one resolved.
#[derive(Default)]
struct Audit {
    seen: AtomicUsize,
    outcomes: Mutex<Vec<&'static str>>,
}

impl Middleware for Audit {
    fn after(&self, _operation_id: &str, outcome: &Resolution, _latency: Duration) {
        self.seen.fetch_add(1, Ordering::SeqCst);
        let label = match outcome {
            Resolution::Dispatch { .. } => "dispatch",
            Resolution::Invalid(_) => "invalid",
            Resolution::Rejected(_) => "rejected",
            Resolution::NotFound => "not_found",
        };
        self.outcomes.lock().unwrap().push(label);
    }
}

/// Rejects requests without an `x-api-key` header.
struct RequireKey;

impl Middleware for RequireKey {
    fn before(&self, _operation_id: &str, request: &BindRequest) -> Option<Rejection> {
        if request.headers.contains_key("x-api-key") {
            return None;
        }
        Some(Rejection {
            status: 401,
            body: json!({"error": "missing api key"}),
        })
    }
}

struct Harness {
    _dir: TempDir,
    table: RouteTable,
    binder: RequestBinder,
    audit: Arc<Audit>,
}

impl Harness {
    fn new() -> Self {
        Self::build(named_components(), &blog_units())
    }

    fn build(config: CompilerConfig, units: &[DeclarationUnit]) -> Self {
        let audit = Arc::new(Audit::default());
        let dir = tempfile::tempdir().unwrap();
        Compiler::new(config)
            .compile(units)
            .unwrap()
            .write_to(dir.path())
            .unwrap();
        let artifacts = ArtifactCache::new().load(dir.path()).unwrap();
        let mut registry = MiddlewareRegistry::new();
        registry.register("audit", Arc::clone(&audit) as Arc<dyn Middleware>);
        let table = RouteTable::register(&artifacts.manifest, &registry).unwrap();
        let binder = RequestBinder::new(artifacts, BinderConfig::default());
        Self {
            _dir: dir,
            table,
            binder,
            audit,
        }
    }

    fn resolve(&self, method: Method, path: &str, request: BindRequest) -> Resolution {
        self.table
            .resolve(&self.binder, &method, path, request)
            .unwrap()
    }

    /// Resolve, then run the handler the way a host would.
    fn call(
        &self,
        method: Method,
        path: &str,
        request: BindRequest,
        calls: &mut HashMap<String, Vec<Value>>,
    ) -> Resolution {
        let resolution = self.resolve(method, path, request);
        if let Resolution::Dispatch { handler, args, .. } = &resolution {
            calls.insert(handler.clone(), args.clone());
        }
        resolution
    }
}

fn dispatched_args(resolution: Resolution) -> Vec<Value> {
    match resolution {
        Resolution::Dispatch { args, .. } => args,
        other => panic!("expected dispatch, got {other:?}"),
    }
}

#[test]
fn test_path_parameter_is_coerced_and_validated() {
    let h = Harness::new();
    let args = dispatched_args(h.resolve(Method::GET, "/posts/42", BindRequest::new()));
    assert_eq!(args, vec![json!(42)]);

    // Below the identifier minimum
    match h.resolve(Method::GET, "/posts/0", BindRequest::new()) {
        Resolution::Invalid(failure) => {
            assert_eq!(failure.errors.len(), 1);
            assert_eq!(failure.errors[0].path, "/path/postId");
            assert_eq!(failure.errors[0].keyword, "minimum");
        }
        other => panic!("expected invalid, got {other:?}"),
    }

    // Not a number at all
    match h.resolve(Method::GET, "/posts/abc", BindRequest::new()) {
        Resolution::Invalid(failure) => assert_eq!(failure.errors[0].keyword, "type"),
        other => panic!("expected invalid, got {other:?}"),
    }
}

#[test]
fn test_literal_route_wins_over_template() {
    let h = Harness::new();
    let found = h.table.match_route(&Method::GET, "/posts/search").unwrap();
    assert_eq!(found.operation_id, "searchPosts");
    assert_eq!(h.resolve(Method::GET, "/nowhere", BindRequest::new()), Resolution::NotFound);
}

#[test]
fn test_aggregated_query_gets_pagination_defaults() {
    let h = Harness::new();
    let args = dispatched_args(h.resolve(Method::GET, "/posts", BindRequest::new()));
    assert_eq!(args, vec![json!({"page": 1, "pageSize": 20})]);

    let request = BindRequest::new().with_query("page=3&sort=-createdAt,title&q=rust");
    let args = dispatched_args(h.resolve(Method::GET, "/posts", request));
    assert_eq!(
        args,
        vec![json!({"page": 3, "pageSize": 20, "sort": ["-createdAt", "title"], "q": "rust"})]
    );
}

#[test]
fn test_deep_object_filter_round_trip() {
    let h = Harness::new();
    let request = BindRequest::new()
        .with_query("where[author][email]=a@example.com&where[status][eq]=published");
    let args = dispatched_args(h.resolve(Method::GET, "/posts/search", request));
    assert_eq!(
        args,
        vec![json!({
            "author": {"email": "a@example.com"},
            "status": {"eq": "published"}
        })]
    );
}

#[test]
fn test_json_encoded_query_values() {
    let h = Harness::new();
    let request = BindRequest::new().with_query("author=%7B%22email%22%3A%22a%40example.com%22%7D");
    let args = dispatched_args(h.resolve(Method::GET, "/posts/export", request));
    assert_eq!(args, vec![json!({"author": {"email": "a@example.com"}})]);

    let request = BindRequest::new().with_query("author=%7Bnot-json");
    match h.resolve(Method::GET, "/posts/export", request) {
        Resolution::Invalid(failure) => {
            assert_eq!(failure.errors.len(), 1);
            assert_eq!(failure.errors[0].keyword, "json");
            assert_eq!(failure.errors[0].path, "/query/author");
        }
        other => panic!("expected invalid, got {other:?}"),
    }
}

#[test]
fn test_missing_body_fields_accumulate_and_skip_handler() {
    let h = Harness::new();
    let mut calls = HashMap::new();
    let resolution = h.call(
        Method::POST,
        "/posts",
        BindRequest::new().with_json_body(json!({})),
        &mut calls,
    );
    let Resolution::Invalid(failure) = resolution else {
        panic!("expected invalid, got {resolution:?}");
    };
    assert_eq!(failure.status, VALIDATION_FAILURE_STATUS);
    assert_eq!(failure.operation_id, "createPost");
    assert_eq!(failure.errors.len(), 2);
    assert!(failure.errors.iter().all(|e| e.keyword == "required" && e.path == "/body"));
    let mut missing: Vec<&str> = failure
        .errors
        .iter()
        .filter_map(|e| e.params["missingProperty"].as_str())
        .collect();
    missing.sort_unstable();
    assert_eq!(missing, vec!["authorId", "title"]);
    assert!(calls.is_empty(), "handler must not run on invalid input");

    let body = failure.body();
    assert_eq!(body["errors"].as_array().map(Vec::len), Some(2));

    // The audit middleware saw the failed request
    assert_eq!(h.audit.seen.load(Ordering::SeqCst), 1);
    assert_eq!(*h.audit.outcomes.lock().unwrap(), vec!["invalid"]);
}

#[test]
fn test_valid_body_reaches_handler() {
    let h = Harness::new();
    let mut calls = HashMap::new();
    h.call(
        Method::POST,
        "/posts",
        BindRequest::new().with_raw_body(r#"{"title": "Hello", "authorId": 7}"#),
        &mut calls,
    );
    assert_eq!(
        calls.get("PostController.createPost"),
        Some(&vec![json!({"title": "Hello", "authorId": 7})])
    );
}

#[test]
fn test_malformed_and_missing_body() {
    let h = Harness::new();
    match h.resolve(Method::POST, "/posts", BindRequest::new().with_raw_body("{oops")) {
        Resolution::Invalid(failure) => {
            assert_eq!(failure.errors.len(), 1);
            assert_eq!(failure.errors[0].keyword, "json");
        }
        other => panic!("expected invalid, got {other:?}"),
    }
    match h.resolve(Method::POST, "/posts", BindRequest::new()) {
        Resolution::Invalid(failure) => {
            assert_eq!(failure.errors.len(), 1);
            assert_eq!(failure.errors[0].keyword, "required");
        }
        other => panic!("expected invalid, got {other:?}"),
    }
}

#[test]
fn test_middleware_rejection_short_circuits() {
    let dir = tempfile::tempdir().unwrap();
    Compiler::new(named_components())
        .compile(&blog_units())
        .unwrap()
        .write_to(dir.path())
        .unwrap();
    let artifacts = ArtifactCache::new().load(dir.path()).unwrap();

    // Same name, different behavior: registration binds whatever the registry holds
    let mut registry = MiddlewareRegistry::new();
    registry.register("audit", Arc::new(RequireKey));
    let table = RouteTable::register(&artifacts.manifest, &registry).unwrap();
    let binder = RequestBinder::new(artifacts, BinderConfig::default());

    let rejected = table
        .resolve(&binder, &Method::POST, "/posts", BindRequest::new().with_json_body(json!({})))
        .unwrap();
    match rejected {
        Resolution::Rejected(r) => assert_eq!(r.status, 401),
        other => panic!("expected rejection, got {other:?}"),
    }

    let request = BindRequest::new()
        .with_header("X-Api-Key", "secret")
        .with_json_body(json!({"title": "t", "authorId": 1}));
    let allowed = table.resolve(&binder, &Method::POST, "/posts", request).unwrap();
    assert!(matches!(allowed, Resolution::Dispatch { .. }));
}

#[test]
fn test_unknown_middleware_is_a_registration_error() {
    let dir = tempfile::tempdir().unwrap();
    Compiler::new(named_components())
        .compile(&blog_units())
        .unwrap()
        .write_to(dir.path())
        .unwrap();
    let artifacts = ArtifactCache::new().load(dir.path()).unwrap();
    let err = RouteTable::register(&artifacts.manifest, &MiddlewareRegistry::new())
        .err()
        .expect("audit is not registered");
    assert!(err.to_string().contains("audit"));
}

#[test]
fn test_reload_swaps_in_new_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    Compiler::new(named_components())
        .compile(&blog_units())
        .unwrap()
        .write_to(dir.path())
        .unwrap();
    let cache = ArtifactCache::new();
    let first = cache.load(dir.path()).unwrap();
    let mut binder = RequestBinder::new(first.clone(), BinderConfig::default());

    let mut config = named_components();
    config.prune_unused = false;
    Compiler::new(config)
        .compile(&blog_units())
        .unwrap()
        .write_to(dir.path())
        .unwrap();
    assert!(cache.invalidate(dir.path()));
    let second = cache.load(dir.path()).unwrap();
    assert_ne!(first.manifest.schema_hash, second.manifest.schema_hash);

    binder.reload(second);
    let outcome = binder
        .bind("getPost", &BindRequest::new().with_path_param("postId", "5"))
        .unwrap();
    assert_eq!(outcome, routeforge::runtime::BindOutcome::Bound(vec![json!(5)]));
    assert!(binder.bind("noSuchOperation", &BindRequest::new()).is_err());
}

/// One operation reading a path id, a header, a cookie and an optional flag.
fn settings_units() -> Vec<DeclarationUnit> {
    let controller = json!({
        "kind": "class",
        "name": "SettingsController",
        "annotations": [{"name": "Controller", "args": ["/tenants"]}],
        "methods": [
            {"name": "getSettings",
                "annotations": [{"name": "Get", "args": ["/{tenantId}/settings"]}],
                "params": [
                    {"name": "tenantId", "type": prim("number")},
                    {"name": "tenant", "type": prim("string"),
                        "annotations": [{"name": "Header", "args": ["x-tenant"]}]},
                    {"name": "session", "type": prim("string"),
                        "annotations": [{"name": "Cookie", "args": ["sid"]}]},
                    {"name": "verbose", "type": prim("boolean"), "optional": true}
                ],
                "returns": prim("string")}
        ]
    });
    vec![unit("settings.controller.ts", json!([controller]))]
}

#[test]
fn test_header_and_cookie_parameters_bind_by_position() {
    let h = Harness::build(CompilerConfig::default(), &settings_units());
    let request = BindRequest::new()
        .with_header("X-Tenant", "acme")
        .with_cookie("sid", "s1")
        .with_query("verbose=true");
    let args = dispatched_args(h.resolve(Method::GET, "/tenants/7/settings", request));
    assert_eq!(args, vec![json!(7), json!("acme"), json!("s1"), json!(true)]);

    // The optional flag stays an empty slot
    let request = BindRequest::new()
        .with_header("x-tenant", "acme")
        .with_cookie("sid", "s1");
    let args = dispatched_args(h.resolve(Method::GET, "/tenants/7/settings", request));
    assert_eq!(args[3], Value::Null);
}

#[test]
fn test_missing_header_and_cookie_are_reported_together() {
    let h = Harness::build(CompilerConfig::default(), &settings_units());
    match h.resolve(Method::GET, "/tenants/7/settings", BindRequest::new()) {
        Resolution::Invalid(failure) => {
            assert_eq!(failure.errors.len(), 2, "{:?}", failure.errors);
            let header = failure.errors.iter().find(|e| e.path == "/header").unwrap();
            assert_eq!(header.keyword, "required");
            assert_eq!(header.params["missingProperty"], "x-tenant");
            let cookie = failure.errors.iter().find(|e| e.path == "/cookie").unwrap();
            assert_eq!(cookie.keyword, "required");
            assert_eq!(cookie.params["missingProperty"], "sid");
        }
        other => panic!("expected invalid, got {other:?}"),
    }
}

#[test]
fn test_default_pipeline_still_validates() {
    let h = Harness::build(CompilerConfig::default(), &blog_units());

    let schema = &h.binder.artifacts().schema;
    let mut refs = Vec::new();
    collect_refs(schema, &mut refs);
    for r in refs {
        let name = r.trim_start_matches("#/components/schemas/");
        assert!(schema["components"]["schemas"].get(name).is_some(), "dangling {r}");
    }

    match h.resolve(Method::POST, "/posts", BindRequest::new().with_json_body(json!({}))) {
        Resolution::Invalid(failure) => {
            assert_eq!(failure.errors.len(), 2);
            assert!(failure.errors.iter().all(|e| e.keyword == "required"));
        }
        other => panic!("expected invalid, got {other:?}"),
    }
    match h.resolve(Method::GET, "/posts/0", BindRequest::new()) {
        Resolution::Invalid(failure) => assert_eq!(failure.errors[0].keyword, "minimum"),
        other => panic!("expected invalid, got {other:?}"),
    }
    let request = BindRequest::new().with_json_body(json!({"title": "t", "authorId": 3}));
    let args = dispatched_args(h.resolve(Method::POST, "/posts", request));
    assert_eq!(args, vec![json!({"title": "t", "authorId": 3})]);
}

#[test]
fn test_uncompilable_schema_is_an_error_not_a_pass() {
    let dir = tempfile::tempdir().unwrap();
    Compiler::new(named_components())
        .compile(&blog_units())
        .unwrap()
        .write_to(dir.path())
        .unwrap();
    let mut artifacts = Artifacts::load(dir.path()).unwrap();
    assert_eq!(artifacts.manifest.validation.mode, ValidationMode::Runtime);
    artifacts.schema["components"]["schemas"]["CreatePostBody"]["properties"]["title"] =
        json!({"type": 12});

    let binder = RequestBinder::new(Arc::new(artifacts), BinderConfig::default());
    let request = BindRequest::new().with_json_body(json!({"title": "t", "authorId": 1}));
    let err = binder.bind("createPost", &request).unwrap_err();
    assert!(err.to_string().contains("createPost"), "{err}");

    // Operations whose schemas compile are unaffected
    let outcome = binder
        .bind("getPost", &BindRequest::new().with_path_param("postId", "5"))
        .unwrap();
    assert_eq!(outcome, routeforge::runtime::BindOutcome::Bound(vec![json!(5)]));
}
