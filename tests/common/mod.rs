#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

//! Declaration-unit fixtures shared by the integration tests.

use routeforge::config::CompilerConfig;
use routeforge::source::DeclarationUnit;
use serde_json::{json, Value};

pub fn prim(name: &str) -> Value {
    json!({"kind": "primitive", "name": name})
}

pub fn reference(name: &str) -> Value {
    json!({"kind": "reference", "name": name})
}

pub fn array(items: Value) -> Value {
    json!({"kind": "array", "items": items})
}

pub fn member(name: &str, ty: Value) -> Value {
    json!({"name": name, "type": ty})
}

pub fn optional(name: &str, ty: Value) -> Value {
    json!({"name": name, "type": ty, "optional": true})
}

pub fn object(members: Value) -> Value {
    json!({"kind": "object", "members": members})
}

pub fn interface(name: &str, members: Value) -> Value {
    json!({"kind": "interface", "name": name, "members": members})
}

pub fn unit(file: &str, declarations: Value) -> DeclarationUnit {
    serde_json::from_value(json!({"file": file, "declarations": declarations}))
        .expect("fixture unit should deserialize")
}

/// Default config with inlining off, so every declared type stays a named component.
pub fn named_components() -> CompilerConfig {
    let mut config = CompilerConfig::default();
    config.inline.enabled = false;
    config
}

/// A small blog API: one controller, five operations and a couple of types
/// that nothing routes to.
pub fn blog_units() -> Vec<DeclarationUnit> {
    let types = json!([
        interface("Author", json!([
            member("id", prim("number")),
            member("email", prim("string")),
        ])),
        interface("Post", json!([
            member("id", prim("number")),
            member("title", prim("string")),
            member("author", reference("Author")),
            member("tags", array(prim("string"))),
        ])),
        interface("PostFilter", json!([
            optional("author", object(json!([optional("email", prim("string"))]))),
            optional("status", object(json!([optional("eq", prim("string"))]))),
        ])),
        interface("ListQuery", json!([
            optional("page", prim("number")),
            optional("pageSize", prim("number")),
            optional("sort", array(prim("string"))),
            optional("q", prim("string")),
        ])),
        interface("CreatePostBody", json!([
            member("title", prim("string")),
            member("authorId", prim("number")),
        ])),
        interface("Draft", json!([member("body", prim("string"))])),
        interface("Orphan", json!([member("draft", reference("Draft"))])),
    ]);
    let controller = json!({
        "kind": "class",
        "name": "PostController",
        "annotations": [{"name": "Controller", "args": ["/posts"]}],
        "methods": [
            {"name": "listPosts",
                "annotations": [{"name": "Get", "args": [""]}],
                "params": [{"name": "query", "type": reference("ListQuery")}],
                "returns": array(reference("Post"))},
            {"name": "searchPosts",
                "annotations": [{"name": "Get", "args": ["/search"]}],
                "params": [{"name": "where", "type": reference("PostFilter"), "optional": true,
                    "annotations": [{"name": "DeepObject"}]}],
                "returns": array(reference("Post"))},
            {"name": "getPost",
                "annotations": [{"name": "Get", "args": ["/{postId}"]}],
                "params": [{"name": "postId", "type": prim("number")}],
                "returns": reference("Post")},
            {"name": "createPost",
                "annotations": [
                    {"name": "Post", "args": [""]},
                    {"name": "Middleware", "args": ["audit"]}
                ],
                "params": [{"name": "body", "type": reference("CreatePostBody")}],
                "returns": reference("Post")},
            {"name": "exportPosts",
                "annotations": [{"name": "Get", "args": ["/export"]}],
                "params": [{"name": "filter", "type": reference("PostFilter"),
                    "annotations": [{"name": "Query"}]}],
                "returns": prim("string")},
        ]
    });
    vec![unit("types.ts", types), unit("posts.controller.ts", json!([controller]))]
}

/// Every `$ref` string anywhere in `value`.
pub fn collect_refs(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            for (key, v) in map {
                match (key.as_str(), v) {
                    ("$ref", Value::String(r)) => out.push(r.clone()),
                    _ => collect_refs(v, out),
                }
            }
        }
        Value::Array(items) => items.iter().for_each(|v| collect_refs(v, out)),
        _ => {}
    }
}
