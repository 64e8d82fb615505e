//! # Compiler
//!
//! One synchronous pass per build:
//!
//! ```text
//! units → index → build IR → integrity → cycles → dedup → inline → flatten
//!       → translate → emit schema document → prune → partition → manifest
//! ```
//!
//! Node ids and edge order depend only on the input order of declaration units,
//! so identical input produces byte-identical artifacts.

use crate::config::{CompilerConfig, IdentityPolicy};
use crate::emit::{
    collect_operations, manifest_document, openapi_document, precompiled_validators,
    prune_unused, Manifest, ValidationMode, ValidationSection, MANIFEST_FILE, OPENAPI_FILE,
    VALIDATORS_FILE,
};
use crate::graph::ir::IrGraph;
use crate::graph::transform::{deduplicate, find_near_duplicates, flatten, inline_nodes, SimilarityPair};
use crate::graph::{
    BuildOutput, GraphBuilder, NodeId, NodeKind, PartitionInput, PartitionPlan, Partitioner, Registry,
    SchemaGraph,
};
use crate::schema::{Schema, TypeTranslator, WrapperRegistry};
use crate::source::{Declaration, DeclarationIndex, DeclarationUnit, TypeResolver};
use crate::validator::{fail_if_issues, ValidationIssue};
use anyhow::Context;
use indexmap::IndexMap;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Resolves names against the graph first, so the declaration that survived
/// deduplication wins; names no longer in the graph (inlined types, generic
/// templates) fall back to the plain index.
pub struct GraphResolver<'a> {
    graph: &'a IrGraph,
    registry: &'a Registry,
    index: &'a DeclarationIndex,
}

impl<'a> GraphResolver<'a> {
    pub fn new(graph: &'a IrGraph, registry: &'a Registry, index: &'a DeclarationIndex) -> Self {
        Self {
            graph,
            registry,
            index,
        }
    }
}

impl TypeResolver for GraphResolver<'_> {
    fn resolve(&self, name: &str) -> Option<&Declaration> {
        self.graph
            .lookup(NodeKind::TypeDefinition, name)
            .and_then(|id| self.registry.declaration(id))
            .or_else(|| self.index.resolve(name))
    }
}

/// Counters and findings from one build, for logging and the CLI.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompileReport {
    pub nodes: usize,
    pub operations: usize,
    pub cycles: usize,
    pub merged_duplicates: usize,
    pub inlined: Vec<String>,
    pub flattened: usize,
    pub near_duplicates: Vec<SimilarityPair>,
    pub unresolved: Vec<String>,
    pub pruned: Vec<String>,
}

/// Everything one build produces.
#[derive(Debug, Clone, PartialEq)]
pub struct CompileOutput {
    pub openapi: Value,
    pub manifest: Manifest,
    /// Present in precompiled validation mode.
    pub validators: Option<Value>,
    pub partition: PartitionPlan,
    pub report: CompileReport,
}

impl CompileOutput {
    /// Write the artifacts into `out_dir`, creating it if needed. Partition
    /// groups go under `schemas/` when the plan splits.
    pub fn write_to(&self, out_dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
        std::fs::create_dir_all(out_dir)
            .with_context(|| format!("failed to create output directory {out_dir:?}"))?;
        let mut written = Vec::new();
        let mut write = |name: &Path, value: &Value| -> anyhow::Result<()> {
            let path = out_dir.join(name);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {parent:?}"))?;
            }
            let text = serde_json::to_string_pretty(value)?;
            std::fs::write(&path, text).with_context(|| format!("failed to write {path:?}"))?;
            written.push(path);
            Ok(())
        };
        write(Path::new(OPENAPI_FILE), &self.openapi)?;
        write(
            Path::new(MANIFEST_FILE),
            &serde_json::to_value(&self.manifest)?,
        )?;
        if let Some(validators) = &self.validators {
            write(Path::new(VALIDATORS_FILE), validators)?;
        }
        if self.partition.should_split {
            for group in &self.partition.groups {
                let doc = serde_json::json!({ "components": { "schemas": group.schemas } });
                write(&Path::new("schemas").join(format!("{}.json", group.name)), &doc)?;
            }
        }
        info!(files = written.len(), out_dir = ?out_dir, "Artifacts written");
        Ok(written)
    }
}

/// Compiler instance. Owns its wrapper table and a memo of finished builds
/// keyed by input and config hash.
pub struct Compiler {
    config: CompilerConfig,
    wrappers: WrapperRegistry,
    memo: HashMap<String, CompileOutput>,
}

impl Compiler {
    pub fn new(config: CompilerConfig) -> Self {
        Self {
            config,
            wrappers: WrapperRegistry::default(),
            memo: HashMap::new(),
        }
    }

    pub fn with_wrappers(mut self, wrappers: WrapperRegistry) -> Self {
        self.wrappers = wrappers;
        self.memo.clear();
        self
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Drop every memoized build.
    pub fn invalidate(&mut self) {
        debug!(entries = self.memo.len(), "Compiler memo invalidated");
        self.memo.clear();
    }

    pub fn memoized(&self) -> usize {
        self.memo.len()
    }

    /// Build the IR and reject structurally broken or empty input.
    pub fn build_ir(&self, units: &[DeclarationUnit], index: &DeclarationIndex) -> anyhow::Result<BuildOutput> {
        let built = GraphBuilder::new(index, &self.wrappers).build(units);

        let mut issues = built.graph.check_integrity();
        if self.config.identity_policy == IdentityPolicy::Reject {
            issues.extend(built.graph.collisions().iter().map(|c| {
                ValidationIssue::new(
                    c.assigned.as_str(),
                    "IdCollision",
                    format!("{} '{}' already declared as {}", c.kind.as_str(), c.name, c.first),
                )
            }));
        }
        fail_if_issues(issues)?;

        if built.graph.nodes_of(NodeKind::Controller).next().is_none() {
            anyhow::bail!("no controllers found");
        }
        if built.graph.nodes_of(NodeKind::Operation).next().is_none() {
            anyhow::bail!("no operations found");
        }
        Ok(built)
    }

    fn memo_key(&self, units: &[DeclarationUnit]) -> anyhow::Result<String> {
        let mut hasher = Sha256::new();
        hasher.update(serde_json::to_vec(units)?);
        hasher.update(serde_json::to_vec(&self.config)?);
        Ok(hasher.finalize().iter().map(|b| format!("{b:02x}")).collect())
    }

    /// Compile declaration units into the build artifacts.
    pub fn compile(&mut self, units: &[DeclarationUnit]) -> anyhow::Result<CompileOutput> {
        let key = self.memo_key(units)?;
        if let Some(hit) = self.memo.get(&key) {
            debug!(key = %&key[..16], "Compile memo hit");
            return Ok(hit.clone());
        }
        let output = self.compile_uncached(units)?;
        self.memo.insert(key, output.clone());
        Ok(output)
    }

    fn compile_uncached(&self, units: &[DeclarationUnit]) -> anyhow::Result<CompileOutput> {
        let index = DeclarationIndex::from_units(units);
        let BuildOutput {
            mut graph,
            registry,
        } = self.build_ir(units, &index)?;
        let mut report = CompileReport::default();

        let cycles = SchemaGraph::from_ir(&graph).detect_cycles();
        report.cycles = cycles.cycles.len();
        for cycle in &cycles.cycles {
            debug!(cycle = ?cycle, "Circular reference");
        }
        report.near_duplicates = find_near_duplicates(&graph, self.config.similarity_threshold);

        if self.config.dedup {
            report.merged_duplicates = deduplicate(&mut graph).merged.len();
        }
        let inline = inline_nodes(&mut graph, &self.config.inline)?;
        report.inlined = inline.inlined_names().map(str::to_string).collect();
        report.flattened = flatten(&mut graph, &self.config.flatten)?.flattened.len();
        fail_if_issues(graph.check_integrity())?;

        let resolver = GraphResolver::new(&graph, &registry, &index);
        let mut translator =
            TypeTranslator::new(&resolver, &self.wrappers).with_inline(report.inlined.iter().cloned());
        for name in emission_order(&graph) {
            translator.translate_named(&name);
        }
        let operations = collect_operations(&graph, &registry, &mut translator);
        report.operations = operations.len();
        report.unresolved = translator.unresolved().iter().cloned().collect();
        let components = translator.into_components();

        let mut openapi = openapi_document(&self.config.info(), &operations, &components);
        if self.config.prune_unused {
            report.pruned = prune_unused(&mut openapi);
        }
        let retained: IndexMap<String, Schema> = components
            .into_iter()
            .filter(|(name, _)| !report.pruned.contains(name))
            .collect();
        let partition = Partitioner::new(self.config.partition.clone())
            .plan(&PartitionInput::from_graph(&graph, retained));

        let mode = self.config.effective_validation_mode();
        let validation = ValidationSection {
            mode,
            precompiled: (mode == ValidationMode::Precompiled).then(|| VALIDATORS_FILE.to_string()),
        };
        let manifest = manifest_document(&openapi, &operations, validation);
        let validators =
            (mode == ValidationMode::Precompiled).then(|| precompiled_validators(&openapi, &manifest));

        report.nodes = graph.len();
        info!(
            nodes = report.nodes,
            operations = report.operations,
            cycles = report.cycles,
            merged_duplicates = report.merged_duplicates,
            inlined = report.inlined.len(),
            flattened = report.flattened,
            near_duplicates = report.near_duplicates.len(),
            unresolved = report.unresolved.len(),
            pruned = report.pruned.len(),
            strategy = %partition.strategy,
            "Compilation complete"
        );
        Ok(CompileOutput {
            openapi,
            manifest,
            validators,
            partition,
            report,
        })
    }
}

/// Declared, concrete type names in dependency order (used types first).
/// Types on a cycle follow in graph order.
fn emission_order(graph: &IrGraph) -> Vec<String> {
    let emittable = |id: &NodeId| {
        graph.node(id).filter(|n| {
            n.as_type_def().is_some_and(|t| {
                t.shape.is_some() && !t.is_generic && !t.unresolved && t.primitive.is_none()
            })
        })
    };
    let order = SchemaGraph::from_ir(graph).topological_sort();
    let mut seen = BTreeSet::new();
    let mut names = Vec::new();
    for id in order.order.iter().rev().chain(order.remaining.iter()) {
        if let Some(node) = emittable(id) {
            if seen.insert(node.name().to_string()) {
                names.push(node.name().to_string());
            }
        }
    }
    names
}
