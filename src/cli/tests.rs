#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

//! Unit tests for CLI commands

use crate::cli::{run_cli, Cli, Commands};
use crate::emit::{MANIFEST_FILE, OPENAPI_FILE};
use clap::Parser;
use serde_json::json;

#[test]
fn test_compile_command_parses() {
    let cli = Cli::try_parse_from([
        "routeforge",
        "compile",
        "--input",
        "decls",
        "--out",
        "build",
        "--no-prune",
    ])
    .unwrap();

    match cli.command {
        Commands::Compile {
            input,
            out,
            config,
            no_prune,
        } => {
            assert_eq!(input.to_string_lossy(), "decls");
            assert_eq!(out.to_string_lossy(), "build");
            assert!(config.is_none());
            assert!(no_prune);
        }
        _ => panic!("Expected Compile command"),
    }
}

#[test]
fn test_lint_command_with_flags() {
    let cli = Cli::try_parse_from([
        "routeforge",
        "lint",
        "--input",
        "decls",
        "--fail-on-error",
        "--errors-only",
    ])
    .unwrap();

    match cli.command {
        Commands::Lint {
            fail_on_error,
            errors_only,
            ..
        } => {
            assert!(fail_on_error);
            assert!(errors_only);
        }
        _ => panic!("Expected Lint command"),
    }
}

#[test]
fn test_compile_requires_out() {
    assert!(Cli::try_parse_from(["routeforge", "compile", "--input", "decls"]).is_err());
}

#[test]
fn test_compile_writes_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("users.json");
    let unit = json!({"file": "users.ts", "declarations": [
        {"kind": "class", "name": "UserController",
            "annotations": [{"name": "Controller", "args": ["/users"]}],
            "methods": [{"name": "listUsers",
                "annotations": [{"name": "Get", "args": [""]}],
                "params": [],
                "returns": {"kind": "primitive", "name": "string"}}]}
    ]});
    std::fs::write(&input, unit.to_string()).unwrap();
    let out = dir.path().join("out");

    let cli = Cli::try_parse_from([
        "routeforge",
        "compile",
        "--input",
        input.to_str().unwrap(),
        "--out",
        out.to_str().unwrap(),
    ])
    .unwrap();
    run_cli(cli).unwrap();
    assert!(out.join(OPENAPI_FILE).exists());
    assert!(out.join(MANIFEST_FILE).exists());
}

#[test]
fn test_partition_rejects_unknown_strategy() {
    let cli = Cli::try_parse_from([
        "routeforge",
        "partition",
        "--input",
        "missing",
        "--strategy",
        "random",
    ])
    .unwrap();
    assert!(run_cli(cli).is_err());
}
