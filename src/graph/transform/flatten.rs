use super::{absorb, compile_patterns, default_exclude, is_excluded};
use crate::graph::ir::{IrGraph, NodeId, NodeKind};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FlattenOptions {
    pub enabled: bool,
    /// Anonymous structures nested deeper than this collapse into their parent.
    pub max_level: usize,
    /// Merge anonymous object structures with identical property sets.
    pub merge_overlapping: bool,
    pub exclude: Vec<String>,
}

impl Default for FlattenOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            max_level: 2,
            merge_overlapping: false,
            exclude: default_exclude(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlattenReport {
    pub flattened: Vec<NodeId>,
    /// `(removed, kept)` pairs from overlap merging.
    pub merged: Vec<(NodeId, NodeId)>,
}

/// Nesting level of every anonymous node: 1 when its owner is a named node,
/// owner's level + 1 when the owner is anonymous too.
fn anonymous_levels(graph: &IrGraph) -> HashMap<NodeId, usize> {
    let mut owner: HashMap<NodeId, NodeId> = HashMap::new();
    for node in graph.nodes() {
        for edge in node.edges.iter().filter(|e| !e.is_absorbed()) {
            let anonymous = graph
                .node(&edge.target)
                .is_some_and(|t| t.kind.is_anonymous());
            if anonymous {
                owner.entry(edge.target.clone()).or_insert_with(|| node.id.clone());
            }
        }
    }
    let mut levels = HashMap::new();
    for id in owner.keys() {
        let mut level = 1;
        let mut cur = id;
        while let Some(parent) = owner.get(cur) {
            let parent_anonymous = graph.node(parent).is_some_and(|p| p.kind.is_anonymous());
            if !parent_anonymous || level > owner.len() {
                break;
            }
            level += 1;
            cur = parent;
        }
        levels.insert(id.clone(), level);
    }
    levels
}

/// Collapse anonymous structures nested beyond `max_level` into their parent,
/// deepest first, then optionally merge overlapping ones.
pub fn flatten(graph: &mut IrGraph, options: &FlattenOptions) -> anyhow::Result<FlattenReport> {
    let mut report = FlattenReport::default();
    if !options.enabled {
        return Ok(report);
    }
    let patterns = compile_patterns(&options.exclude)?;

    let mut deep: Vec<(NodeId, usize)> = anonymous_levels(graph)
        .into_iter()
        .filter(|(_, level)| *level > options.max_level)
        .collect();
    deep.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    for (id, level) in deep {
        let Some(name) = graph.node(&id).map(|n| n.name().to_string()) else {
            continue;
        };
        if is_excluded(&name, &patterns) {
            continue;
        }
        let parents = absorb(graph, &id, "flattened");
        debug!(node = %id, level, parents = parents.len(), "Anonymous structure flattened");
        report.flattened.push(id);
    }

    if options.merge_overlapping {
        merge_overlapping(graph, &patterns, &mut report);
    }
    info!(
        flattened = report.flattened.len(),
        merged = report.merged.len(),
        "Flatten pass complete"
    );
    Ok(report)
}

fn merge_overlapping(graph: &mut IrGraph, patterns: &[regex::Regex], report: &mut FlattenReport) {
    let mut by_shape: BTreeMap<Vec<String>, Vec<NodeId>> = BTreeMap::new();
    for node in graph.nodes_of(NodeKind::SchemaComponent) {
        if is_excluded(node.name(), patterns) {
            continue;
        }
        let Some(props) = node.properties() else {
            continue;
        };
        if props.is_empty() {
            continue;
        }
        let mut shape: Vec<String> = props.keys().cloned().collect();
        shape.sort();
        by_shape.entry(shape).or_default().push(node.id.clone());
    }
    for ids in by_shape.into_values().filter(|ids| ids.len() > 1) {
        let keep = &ids[0];
        for dup in &ids[1..] {
            graph.retarget(dup, keep);
            graph.remove_node(dup);
            report.merged.push((dup.clone(), keep.clone()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::ir::{Edge, NodePayload, Relation, StructurePayload, TypeDefPayload};

    fn anon(g: &mut IrGraph, name: &str, props: &[&str]) -> NodeId {
        let mut payload = StructurePayload::default();
        for p in props {
            payload
                .properties
                .insert(p.to_string(), NodeId::from("TypeDefinition:string"));
        }
        g.add_node(
            NodeKind::SchemaComponent,
            name,
            None,
            NodePayload::Structure(payload),
        )
    }

    #[test]
    fn test_deep_structures_collapse_into_parent() {
        let mut g = IrGraph::new();
        let root = g.add_node(
            NodeKind::TypeDefinition,
            "Order",
            None,
            NodePayload::TypeDefinition(TypeDefPayload::default()),
        );
        let l1 = anon(&mut g, "Order.shipping", &["address"]);
        let l2 = anon(&mut g, "Order.shipping.address", &["geo"]);
        let l3 = anon(&mut g, "Order.shipping.address.geo", &["lat"]);
        g.add_edge(Edge::new(Relation::Uses, root.clone(), l1.clone()));
        g.add_edge(Edge::new(Relation::Uses, l1.clone(), l2.clone()));
        g.add_edge(Edge::new(Relation::Uses, l2.clone(), l3.clone()));

        let report = flatten(&mut g, &FlattenOptions::default()).unwrap();
        assert_eq!(report.flattened, vec![l3.clone()]);
        assert!(g.contains(&l2));
        let edge = g.node(&l2).unwrap().edges.iter().find(|e| e.target == l3).unwrap();
        assert!(edge.flag("flattened"));
        assert!(g.check_integrity().is_empty());
    }

    #[test]
    fn test_merge_overlapping_shapes() {
        let mut g = IrGraph::new();
        let owner = g.add_node(
            NodeKind::TypeDefinition,
            "User",
            None,
            NodePayload::TypeDefinition(TypeDefPayload::default()),
        );
        let a = anon(&mut g, "User.home", &["city", "zip"]);
        let b = anon(&mut g, "User.work", &["zip", "city"]);
        g.add_edge(Edge::new(Relation::Uses, owner.clone(), a.clone()));
        g.add_edge(Edge::new(Relation::Uses, owner.clone(), b.clone()));
        let options = FlattenOptions {
            merge_overlapping: true,
            ..Default::default()
        };
        let report = flatten(&mut g, &options).unwrap();
        assert_eq!(report.merged, vec![(b.clone(), a.clone())]);
        assert!(!g.contains(&b));
        assert!(g.node(&owner).unwrap().edges.iter().all(|e| e.target == a));
    }
}
