//! # Linter Module
//!
//! Diagnostics over the graph IR, before any transform runs.
//!
//! ## Checks Performed
//!
//! 1. **operation_id_collision** (error) - two operations ask for the same operationId
//! 2. **empty_controller** (warning) - a controller with no verb-annotated methods
//! 3. **unresolved_type** (warning) - a referenced type that is never declared
//! 4. **id_collision** (warning) - two declarations share a kind and name
//! 5. **near_duplicate** (warning) - two types look alike but are not merged
//! 6. **circular_reference** (info) - a type cycle; emitted as `$ref`s
//!
//! ## Usage
//!
//! ```rust,ignore
//! use routeforge::linter::{lint_path, print_lint_issues};
//!
//! let issues = lint_path(Path::new("decls/"), &CompilerConfig::default())?;
//! print_lint_issues(&issues);
//! ```

use crate::config::CompilerConfig;
use crate::graph::transform::find_near_duplicates;
use crate::graph::{GraphBuilder, IrGraph, NodeId, NodeKind, Relation, SchemaGraph};
use crate::schema::WrapperRegistry;
use crate::source::{annotations, load_units, Declaration, DeclarationIndex, DeclarationUnit};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

#[cfg(test)]
mod tests;

/// Severity level for lint issues
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LintSeverity {
    /// Produces wrong or ambiguous artifacts
    Error,
    /// Compiles, but probably not what was meant
    Warning,
    Info,
}

impl fmt::Display for LintSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LintSeverity::Error => write!(f, "error"),
            LintSeverity::Warning => write!(f, "warning"),
            LintSeverity::Info => write!(f, "info"),
        }
    }
}

/// A lint issue found in the declarations
#[derive(Debug, Clone, PartialEq)]
pub struct LintIssue {
    /// Where the issue occurred (e.g. `operation:getUser`, `type:User`)
    pub location: String,
    pub severity: LintSeverity,
    /// Type of lint issue (e.g. `near_duplicate`)
    pub kind: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl LintIssue {
    pub fn new(
        location: impl Into<String>,
        severity: LintSeverity,
        kind: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        LintIssue {
            location: location.into(),
            severity,
            kind: kind.into(),
            message: message.into(),
            suggestion: None,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

/// Load declaration units from a file or directory and lint them.
pub fn lint_path(path: &Path, config: &CompilerConfig) -> anyhow::Result<Vec<LintIssue>> {
    let units = load_units(path)?;
    Ok(lint_units(&units, config))
}

/// Lint declaration units: source-level checks plus everything [`lint_graph`] reports.
pub fn lint_units(units: &[DeclarationUnit], config: &CompilerConfig) -> Vec<LintIssue> {
    let index = DeclarationIndex::from_units(units);
    let wrappers = WrapperRegistry::default();
    let built = GraphBuilder::new(&index, &wrappers).build(units);

    let mut issues = lint_operation_ids(units);
    issues.extend(lint_graph(&built.graph, config.similarity_threshold));
    issues.sort_by(|a, b| a.severity.cmp(&b.severity));
    issues
}

/// Requested operation ids, before the builder renames duplicates.
fn lint_operation_ids(units: &[DeclarationUnit]) -> Vec<LintIssue> {
    let mut requested: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for unit in units {
        for decl in &unit.declarations {
            let Declaration::Class(class) = decl else {
                continue;
            };
            if class.annotation(annotations::CONTROLLER).is_none() {
                continue;
            }
            for method in &class.methods {
                let is_operation = method
                    .annotations
                    .iter()
                    .any(|a| annotations::verb_method(&a.name).is_some());
                if !is_operation {
                    continue;
                }
                let id = method
                    .annotation(annotations::OPERATION_ID)
                    .and_then(|a| a.first_str())
                    .unwrap_or(&method.name);
                requested
                    .entry(id.to_string())
                    .or_default()
                    .push(format!("{}.{}", class.name, method.name));
            }
        }
    }
    requested
        .into_iter()
        .filter(|(_, methods)| methods.len() > 1)
        .map(|(id, methods)| {
            LintIssue::new(
                format!("operation:{id}"),
                LintSeverity::Error,
                "operation_id_collision",
                format!(
                    "operationId '{id}' is requested by {}; later ones are renamed with a numeric suffix",
                    methods.join(", ")
                ),
            )
            .with_suggestion(format!("Add {}(\"...\") to disambiguate", annotations::OPERATION_ID))
        })
        .collect()
}

/// Checks that only need the IR.
pub fn lint_graph(graph: &IrGraph, similarity_threshold: f64) -> Vec<LintIssue> {
    let mut issues = Vec::new();

    for controller in graph.nodes_of(NodeKind::Controller) {
        let has_operations = controller.outgoing(Relation::Contains).any(|e| {
            graph
                .node(&e.target)
                .is_some_and(|n| n.kind == NodeKind::Operation)
        });
        if !has_operations {
            issues.push(
                LintIssue::new(
                    format!("controller:{}", controller.name()),
                    LintSeverity::Warning,
                    "empty_controller",
                    format!("controller '{}' declares no operations", controller.name()),
                )
                .with_suggestion("Annotate at least one method with an HTTP verb"),
            );
        }
    }

    for node in graph.nodes_of(NodeKind::TypeDefinition) {
        if node.as_type_def().is_some_and(|t| t.unresolved) {
            issues.push(LintIssue::new(
                format!("type:{}", node.name()),
                LintSeverity::Warning,
                "unresolved_type",
                format!("type '{}' is referenced but never declared; it emits an empty schema", node.name()),
            ));
        }
    }

    for collision in graph.collisions() {
        issues.push(
            LintIssue::new(
                format!("{}:{}", collision.kind.as_str(), collision.name),
                LintSeverity::Warning,
                "id_collision",
                format!(
                    "{} '{}' is declared more than once; first is {}, the later one became {}",
                    collision.kind.as_str(),
                    collision.name,
                    collision.first,
                    collision.assigned
                ),
            )
            .with_suggestion("Rename one declaration, or rely on deduplication to merge them"),
        );
    }

    for pair in find_near_duplicates(graph, similarity_threshold) {
        let name = |id: &NodeId| graph.node(id).map(|n| n.name().to_string()).unwrap_or_default();
        let (a, b) = (name(&pair.a), name(&pair.b));
        issues.push(
            LintIssue::new(
                format!("type:{a}"),
                LintSeverity::Warning,
                "near_duplicate",
                format!("'{a}' and '{b}' look alike (score {:.1}) but are not merged", pair.score),
            )
            .with_suggestion(format!("Consider reusing '{a}' in place of '{b}'")),
        );
    }

    for cycle in SchemaGraph::from_ir(graph).detect_cycles().cycles {
        let names: Vec<String> = cycle
            .iter()
            .map(|id| graph.node(id).map(|n| n.name().to_string()).unwrap_or_else(|| id.to_string()))
            .collect();
        let head = names.first().cloned().unwrap_or_default();
        issues.push(LintIssue::new(
            format!("type:{head}"),
            LintSeverity::Info,
            "circular_reference",
            format!("circular reference {}; emitted through $ref", names.join(" -> ")),
        ));
    }

    issues
}

pub fn has_errors(issues: &[LintIssue]) -> bool {
    issues.iter().any(|i| i.severity == LintSeverity::Error)
}

/// Print lint issues grouped by severity
pub fn print_lint_issues(issues: &[LintIssue]) {
    if issues.is_empty() {
        println!("No lint issues found");
        return;
    }

    let count = |s| issues.iter().filter(|i| i.severity == s).count();
    println!(
        "\nLint results: {} error(s), {} warning(s), {} info(s)\n",
        count(LintSeverity::Error),
        count(LintSeverity::Warning),
        count(LintSeverity::Info)
    );

    for (severity, heading) in [
        (LintSeverity::Error, "Errors (must fix):"),
        (LintSeverity::Warning, "Warnings (should fix):"),
        (LintSeverity::Info, "Info:"),
    ] {
        let group: Vec<&LintIssue> = issues.iter().filter(|i| i.severity == severity).collect();
        if group.is_empty() {
            continue;
        }
        println!("{heading}");
        for issue in group {
            println!("   [{}] {}", issue.kind, issue.location);
            println!("      {}", issue.message);
            if let Some(suggestion) = &issue.suggestion {
                println!("      Suggestion: {suggestion}");
            }
        }
        println!();
    }
}

/// Error if any issue is an error, after printing them all.
pub fn fail_if_errors(issues: &[LintIssue]) -> anyhow::Result<()> {
    if has_errors(issues) {
        print_lint_issues(issues);
        anyhow::bail!(
            "{} lint error(s)",
            issues.iter().filter(|i| i.severity == LintSeverity::Error).count()
        );
    }
    Ok(())
}
