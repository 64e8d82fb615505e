use crate::graph::ir::{IrGraph, Node, NodeId, NodeKind};
use indexmap::IndexMap;
use tracing::{debug, info};

/// One merged duplicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedDuplicate {
    pub name: String,
    pub removed: NodeId,
    pub survivor: NodeId,
    pub edges_rewritten: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DedupReport {
    pub merged: Vec<MergedDuplicate>,
}

/// `10 × properties + 2 × tags + 5 × generic`.
pub fn completeness_score(node: &Node) -> u32 {
    let (props, generic) = node
        .as_type_def()
        .map(|t| (t.properties.len() as u32, t.is_generic))
        .unwrap_or((0, false));
    10 * props + 2 * node.metadata.tags.len() as u32 + if generic { 5 } else { 0 }
}

/// Merge `TypeDefinition` nodes that share a name into the most complete one.
///
/// Every edge that targeted a removed duplicate is rewritten to target the
/// survivor. Ties go to the node created first.
pub fn deduplicate(graph: &mut IrGraph) -> DedupReport {
    let mut groups: IndexMap<String, Vec<(NodeId, u32)>> = IndexMap::new();
    for node in graph.nodes_of(NodeKind::TypeDefinition) {
        groups
            .entry(node.name().to_string())
            .or_default()
            .push((node.id.clone(), completeness_score(node)));
    }

    let mut report = DedupReport::default();
    for (name, members) in groups.into_iter().filter(|(_, m)| m.len() > 1) {
        let mut best = 0;
        for (i, (_, score)) in members.iter().enumerate() {
            if *score > members[best].1 {
                best = i;
            }
        }
        let survivor = members[best].0.clone();
        for (i, (dup, score)) in members.iter().enumerate() {
            if i == best {
                continue;
            }
            let edges_rewritten = graph.retarget(dup, &survivor);
            graph.remove_node(dup);
            debug!(
                name = %name,
                removed = %dup,
                survivor = %survivor,
                score,
                edges_rewritten,
                "Duplicate type merged"
            );
            report.merged.push(MergedDuplicate {
                name: name.clone(),
                removed: dup.clone(),
                survivor: survivor.clone(),
                edges_rewritten,
            });
        }
    }
    info!(merged = report.merged.len(), "Deduplication pass complete");
    report
}
