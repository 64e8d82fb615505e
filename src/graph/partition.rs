//! Heuristic grouping of the compiled schema set into output files.
//!
//! | condition | strategy |
//! |---|---|
//! | fewer schemas than `threshold` | `none` |
//! | mean external `$ref` count > 3 | `dependency` (SCCs stay together) |
//! | more than one controller and mean refs < 2 | `controller` |
//! | otherwise | `size` (complexity-ordered buckets) |
//!
//! An explicit strategy in [`PartitionOptions`] skips the heuristics.

use super::algorithms::SchemaGraph;
use super::ir::{IrGraph, NodeKind};
use crate::schema::Schema;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use tracing::info;

/// Group collecting schemas used by no controller or by several.
pub const SHARED_GROUP: &str = "_shared";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartitionStrategy {
    None,
    Dependency,
    Controller,
    Size,
}

impl fmt::Display for PartitionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PartitionStrategy::None => "none",
            PartitionStrategy::Dependency => "dependency",
            PartitionStrategy::Controller => "controller",
            PartitionStrategy::Size => "size",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for PartitionStrategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(PartitionStrategy::None),
            "dependency" => Ok(PartitionStrategy::Dependency),
            "controller" => Ok(PartitionStrategy::Controller),
            "size" => Ok(PartitionStrategy::Size),
            other => anyhow::bail!("unknown partition strategy '{other}'"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PartitionOptions {
    pub threshold: usize,
    pub max_group_size: usize,
    pub strategy: Option<PartitionStrategy>,
}

impl Default for PartitionOptions {
    fn default() -> Self {
        Self {
            threshold: 50,
            max_group_size: 25,
            strategy: None,
        }
    }
}

/// What the partitioner looks at.
#[derive(Debug, Clone, Default)]
pub struct PartitionInput {
    pub schemas: IndexMap<String, Schema>,
    /// Schema name → controllers whose operations reach it.
    pub controller_usage: HashMap<String, BTreeSet<String>>,
    pub controller_count: usize,
}

impl PartitionInput {
    /// Derive controller usage from graph reachability. A schema is used by a
    /// controller when the controller reaches its type node, or reaches a used
    /// schema that `$ref`s it. Generic instantiations (`Page_User`) count when
    /// the controller reaches the base declaration and every argument type.
    pub fn from_graph(graph: &IrGraph, schemas: IndexMap<String, Schema>) -> Self {
        let snapshot = SchemaGraph::from_ir(graph);
        let known: HashSet<&str> = graph
            .nodes_of(NodeKind::TypeDefinition)
            .map(|n| n.name())
            .collect();
        let mut usage: HashMap<String, BTreeSet<String>> = HashMap::new();
        let mut controller_count = 0;
        for controller in graph.nodes_of(NodeKind::Controller) {
            controller_count += 1;
            let reached: HashSet<&str> = snapshot
                .reachable_from(&controller.id)
                .iter()
                .filter_map(|id| graph.node(id))
                .filter(|n| n.kind == NodeKind::TypeDefinition)
                .map(|n| n.name())
                .collect();
            let mut pending: Vec<String> = schemas
                .keys()
                .filter(|name| reaches_schema(name, &reached, &known))
                .cloned()
                .collect();
            while let Some(name) = pending.pop() {
                let users = usage.entry(name.clone()).or_default();
                if !users.insert(controller.name().to_string()) {
                    continue;
                }
                if let Some(schema) = schemas.get(&name) {
                    pending.extend(schema.refs().into_iter().filter(|r| schemas.contains_key(r)));
                }
            }
        }
        Self {
            schemas,
            controller_usage: usage,
            controller_count,
        }
    }
}

/// `name` is a reached declaration, or an instantiation `Base_Arg1_Arg2` of
/// one whose argument labels are reached too. Labels that name no type node
/// (literals, sanitized expressions) do not block the match.
fn reaches_schema(name: &str, reached: &HashSet<&str>, known: &HashSet<&str>) -> bool {
    if reached.contains(name) {
        return true;
    }
    let Some((base, args)) = name.split_once('_') else {
        return false;
    };
    reached.contains(base)
        && args.split('_').all(|label| {
            let label = label.trim_end_matches("Array");
            reached.contains(label) || !known.contains(label)
        })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaGroup {
    pub name: String,
    pub schemas: IndexMap<String, Schema>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionMetrics {
    pub schema_count: usize,
    pub avg_deps: f64,
    pub controller_groups: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionPlan {
    pub strategy: PartitionStrategy,
    pub should_split: bool,
    pub groups: Vec<SchemaGroup>,
    pub metrics: PartitionMetrics,
    /// Human-readable explanation; diagnostics only.
    pub recommendation: String,
}

/// Distinct `$ref` targets of `name`'s schema other than itself.
fn external_refs(name: &str, schema: &Schema) -> BTreeSet<String> {
    let mut refs = schema.refs();
    refs.remove(name);
    refs
}

fn nested_depth(schema: &Schema) -> usize {
    schema
        .children()
        .map(|c| 1 + nested_depth(c))
        .max()
        .unwrap_or(0)
}

fn any_schema(schema: &Schema, pred: &dyn Fn(&Schema) -> bool) -> bool {
    pred(schema) || schema.children().any(|c| any_schema(c, pred))
}

fn ref_count(schema: &Schema) -> usize {
    usize::from(schema.reference.is_some()) + schema.children().map(ref_count).sum::<usize>()
}

/// `properties + 2 × depth + 0.5 × refs + 5 × union + 5 × intersection + enum`.
pub fn complexity_score(schema: &Schema) -> f64 {
    let props = schema.properties.as_ref().map(IndexMap::len).unwrap_or(0) as f64;
    let depth = nested_depth(schema) as f64;
    let refs = ref_count(schema) as f64;
    let has_union = any_schema(schema, &|s| s.any_of.is_some() || s.one_of.is_some());
    let has_intersection = any_schema(schema, &|s| s.all_of.is_some());
    let has_enum = any_schema(schema, &|s| s.enum_values.is_some());
    props
        + 2.0 * depth
        + 0.5 * refs
        + if has_union { 5.0 } else { 0.0 }
        + if has_intersection { 5.0 } else { 0.0 }
        + if has_enum { 1.0 } else { 0.0 }
}

#[derive(Debug, Clone, Default)]
pub struct Partitioner {
    options: PartitionOptions,
}

impl Partitioner {
    pub fn new(options: PartitionOptions) -> Self {
        Self { options }
    }

    pub fn metrics(&self, input: &PartitionInput) -> PartitionMetrics {
        let count = input.schemas.len();
        let total: usize = input
            .schemas
            .iter()
            .map(|(name, s)| external_refs(name, s).len())
            .sum();
        PartitionMetrics {
            schema_count: count,
            avg_deps: if count == 0 {
                0.0
            } else {
                total as f64 / count as f64
            },
            controller_groups: input.controller_count,
        }
    }

    pub fn plan(&self, input: &PartitionInput) -> PartitionPlan {
        let metrics = self.metrics(input);
        let (strategy, recommendation) = match self.options.strategy {
            Some(s) => (s, format!("strategy '{s}' set explicitly")),
            None => self.choose(&metrics),
        };
        let groups = match strategy {
            PartitionStrategy::None => vec![SchemaGroup {
                name: "default".to_string(),
                schemas: input.schemas.clone(),
            }],
            PartitionStrategy::Dependency => self.by_dependency(input),
            PartitionStrategy::Controller => self.by_controller(input),
            PartitionStrategy::Size => self.by_size(input),
        };
        info!(
            strategy = %strategy,
            schemas = metrics.schema_count,
            avg_deps = metrics.avg_deps,
            controllers = metrics.controller_groups,
            groups = groups.len(),
            "Partition plan chosen"
        );
        PartitionPlan {
            strategy,
            should_split: strategy != PartitionStrategy::None,
            groups,
            metrics,
            recommendation,
        }
    }

    fn choose(&self, m: &PartitionMetrics) -> (PartitionStrategy, String) {
        if m.schema_count < self.options.threshold {
            return (
                PartitionStrategy::None,
                format!(
                    "{} schemas is below the split threshold of {}; keep one file",
                    m.schema_count, self.options.threshold
                ),
            );
        }
        if m.avg_deps > 3.0 {
            return (
                PartitionStrategy::Dependency,
                format!(
                    "schemas reference {:.1} others on average; group strongly connected schemas",
                    m.avg_deps
                ),
            );
        }
        if m.controller_groups > 1 && m.avg_deps < 2.0 {
            return (
                PartitionStrategy::Controller,
                format!(
                    "{} controllers with loosely coupled schemas ({:.1} refs each); split per controller",
                    m.controller_groups, m.avg_deps
                ),
            );
        }
        (
            PartitionStrategy::Size,
            format!(
                "no dominant structure; bucket by complexity into groups of at most {}",
                self.options.max_group_size
            ),
        )
    }

    fn by_dependency(&self, input: &PartitionInput) -> Vec<SchemaGroup> {
        let edges: Vec<(&str, String)> = input
            .schemas
            .iter()
            .flat_map(|(name, s)| {
                external_refs(name, s)
                    .into_iter()
                    .filter(|r| input.schemas.contains_key(r))
                    .map(move |r| (name.as_str(), r))
            })
            .collect();
        let snapshot = SchemaGraph::from_edges(
            input.schemas.keys().map(String::as_str),
            edges.iter().map(|(a, b)| (*a, b.as_str())),
        );
        let mut cyclic = Vec::new();
        let mut singles = Vec::new();
        for component in snapshot.strongly_connected_components() {
            let names: Vec<String> = component.iter().map(|id| id.as_str().to_string()).collect();
            if names.len() > 1 {
                cyclic.push(names);
            } else {
                singles.extend(names);
            }
        }
        let mut groups = Vec::new();
        for (i, names) in cyclic.into_iter().enumerate() {
            groups.push(self.group(format!("cycle_{}", i + 1), &names, input));
        }
        for name in singles {
            groups.push(self.group(name.clone(), std::slice::from_ref(&name), input));
        }
        groups
    }

    fn by_controller(&self, input: &PartitionInput) -> Vec<SchemaGroup> {
        let mut buckets: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for name in input.schemas.keys() {
            let owner = match input.controller_usage.get(name) {
                Some(users) if users.len() == 1 => users.iter().next().cloned(),
                _ => None,
            };
            buckets
                .entry(owner.unwrap_or_else(|| SHARED_GROUP.to_string()))
                .or_default()
                .push(name.clone());
        }
        let shared = buckets.remove(SHARED_GROUP);
        let mut groups: Vec<SchemaGroup> = buckets
            .into_iter()
            .map(|(controller, names)| self.group(controller, &names, input))
            .collect();
        if let Some(names) = shared {
            groups.push(self.group(SHARED_GROUP.to_string(), &names, input));
        }
        groups
    }

    fn by_size(&self, input: &PartitionInput) -> Vec<SchemaGroup> {
        let mut scored: Vec<(&String, f64)> = input
            .schemas
            .iter()
            .map(|(name, s)| (name, complexity_score(s)))
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        let names: Vec<String> = scored.into_iter().map(|(n, _)| n.clone()).collect();
        names
            .chunks(self.options.max_group_size.max(1))
            .enumerate()
            .map(|(i, chunk)| self.group(format!("group_{}", i + 1), chunk, input))
            .collect()
    }

    fn group(&self, name: String, names: &[String], input: &PartitionInput) -> SchemaGroup {
        let schemas = names
            .iter()
            .filter_map(|n| input.schemas.get(n).map(|s| (n.clone(), s.clone())))
            .collect();
        SchemaGroup { name, schemas }
    }
}
