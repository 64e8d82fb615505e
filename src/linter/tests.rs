#![allow(clippy::unwrap_used, clippy::expect_used)]

//! Unit tests for the IR linter

use crate::config::CompilerConfig;
use crate::linter::{fail_if_errors, has_errors, lint_path, lint_units, LintIssue, LintSeverity};
use crate::source::DeclarationUnit;
use serde_json::{json, Value};
use std::io::Write;
use tempfile::NamedTempFile;

fn prim(name: &str) -> Value {
    json!({"kind": "primitive", "name": name})
}

fn reference(name: &str) -> Value {
    json!({"kind": "reference", "name": name})
}

fn controller(name: &str, methods: Value) -> Value {
    json!({"kind": "class", "name": name,
        "annotations": [{"name": "Controller", "args": ["/x"]}],
        "methods": methods})
}

fn get(name: &str, path: &str) -> Value {
    json!({"name": name,
        "annotations": [{"name": "Get", "args": [path]}],
        "params": [],
        "returns": prim("string")})
}

fn unit(file: &str, declarations: Value) -> DeclarationUnit {
    serde_json::from_value(json!({"file": file, "declarations": declarations})).unwrap()
}

fn lint(units: &[DeclarationUnit]) -> Vec<LintIssue> {
    lint_units(units, &CompilerConfig::default())
}

fn of_kind<'a>(issues: &'a [LintIssue], kind: &str) -> Vec<&'a LintIssue> {
    issues.iter().filter(|i| i.kind == kind).collect()
}

#[test]
fn test_lint_clean_declarations() {
    let units = vec![unit(
        "a.ts",
        json!([controller("HealthController", json!([get("health", "/health")]))]),
    )];
    let issues = lint(&units);
    assert!(issues.is_empty(), "unexpected issues: {issues:?}");
    assert!(fail_if_errors(&issues).is_ok());
}

#[test]
fn test_lint_operation_id_collision() {
    let units = vec![unit(
        "a.ts",
        json!([
            controller("AController", json!([get("list", "/a")])),
            controller("BController", json!([get("list", "/b")])),
        ]),
    )];
    let issues = lint(&units);
    let collisions = of_kind(&issues, "operation_id_collision");
    assert_eq!(collisions.len(), 1);
    assert_eq!(collisions[0].severity, LintSeverity::Error);
    assert!(collisions[0].message.contains("AController.list"));
    assert!(collisions[0].message.contains("BController.list"));
    assert!(has_errors(&issues));
    assert!(fail_if_errors(&issues).is_err());
    // Errors sort first
    assert_eq!(issues[0].severity, LintSeverity::Error);
}

#[test]
fn test_lint_empty_controller() {
    let units = vec![unit(
        "a.ts",
        json!([
            controller("IdleController", json!([])),
            controller("BusyController", json!([get("ping", "/ping")])),
        ]),
    )];
    let issues = lint(&units);
    let empty = of_kind(&issues, "empty_controller");
    assert_eq!(empty.len(), 1);
    assert_eq!(empty[0].location, "controller:IdleController");
    assert_eq!(empty[0].severity, LintSeverity::Warning);
}

#[test]
fn test_lint_unresolved_type() {
    let units = vec![unit(
        "a.ts",
        json!([
            {"kind": "interface", "name": "Post", "members": [
                {"name": "author", "type": reference("Ghost")}
            ]},
            controller("PostController", json!([get("list", "/")])),
        ]),
    )];
    let issues = lint(&units);
    let unresolved = of_kind(&issues, "unresolved_type");
    assert_eq!(unresolved.len(), 1);
    assert_eq!(unresolved[0].location, "type:Ghost");
}

#[test]
fn test_lint_id_collision_across_files() {
    let user = |field: &str| {
        json!([{"kind": "interface", "name": "User", "members": [
            {"name": field, "type": prim("string")}
        ]}])
    };
    let units = vec![
        unit("a.ts", user("email")),
        unit("b.ts", user("name")),
        unit("c.ts", json!([controller("UserController", json!([get("me", "/me")]))])),
    ];
    let issues = lint(&units);
    let collisions = of_kind(&issues, "id_collision");
    assert_eq!(collisions.len(), 1);
    assert!(collisions[0].message.contains("b.ts"));
}

#[test]
fn test_lint_near_duplicate_and_cycle() {
    let units = vec![unit(
        "a.ts",
        json!([
            {"kind": "interface", "name": "User", "members": [
                {"name": "id", "type": prim("number")},
                {"name": "email", "type": prim("string")}
            ]},
            {"kind": "interface", "name": "Account", "members": [
                {"name": "id", "type": prim("number")},
                {"name": "email", "type": prim("string")}
            ]},
            {"kind": "interface", "name": "Node", "members": [
                {"name": "next", "type": reference("Node")}
            ]},
            controller("UserController", json!([get("me", "/me")])),
        ]),
    )];
    let issues = lint(&units);
    let near = of_kind(&issues, "near_duplicate");
    assert_eq!(near.len(), 1);
    assert!(near[0].message.contains("User") && near[0].message.contains("Account"));

    let cycles = of_kind(&issues, "circular_reference");
    assert_eq!(cycles.len(), 1);
    assert_eq!(cycles[0].severity, LintSeverity::Info);
    assert!(cycles[0].message.contains("Node -> Node"), "{}", cycles[0].message);
    assert!(!has_errors(&issues));
}

#[test]
fn test_lint_path_reads_files() {
    let mut temp = NamedTempFile::with_suffix(".json").expect("create temp file");
    let body = json!({"file": "a.ts", "declarations": [controller("EmptyController", json!([]))]});
    temp.write_all(body.to_string().as_bytes()).expect("write units");
    temp.flush().expect("flush");

    let issues = lint_path(temp.path(), &CompilerConfig::default()).expect("lint path");
    assert_eq!(of_kind(&issues, "empty_controller").len(), 1);
}
