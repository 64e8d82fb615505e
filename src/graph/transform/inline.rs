use super::{absorb, compile_patterns, default_exclude, is_excluded};
use crate::graph::algorithms::SchemaGraph;
use crate::graph::ir::{IrGraph, NodeId, NodeKind};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct InlineOptions {
    pub enabled: bool,
    /// Deepest chain of types below a candidate that may still be inlined.
    pub max_depth: usize,
    /// Upper bound on nodes absorbed in one pass.
    pub max_nodes: usize,
    /// Regexes over type names that are never inlined.
    pub exclude: Vec<String>,
}

impl Default for InlineOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            max_depth: 3,
            max_nodes: 100,
            exclude: default_exclude(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InlineReport {
    /// `(absorbed node, type name)` in absorption order.
    pub inlined: Vec<(NodeId, String)>,
    pub excluded: usize,
}

impl InlineReport {
    /// Names of absorbed declared (non-primitive) types.
    pub fn inlined_names(&self) -> impl Iterator<Item = &str> {
        self.inlined.iter().map(|(_, n)| n.as_str())
    }
}

/// Absorb primitive types and types used at most once into their use sites.
///
/// Types on a cycle, generic declarations, unresolved names and names matching
/// an exclude pattern stay. A candidate with no users is left for pruning.
pub fn inline_nodes(graph: &mut IrGraph, options: &InlineOptions) -> anyhow::Result<InlineReport> {
    let mut report = InlineReport::default();
    if !options.enabled {
        return Ok(report);
    }
    let patterns = compile_patterns(&options.exclude)?;
    let snapshot = SchemaGraph::from_ir(graph);
    let cyclic = snapshot.cyclic_nodes();
    let mut depth_memo = HashMap::new();

    let candidates: Vec<(NodeId, String, bool)> = graph
        .nodes_of(NodeKind::TypeDefinition)
        .filter_map(|n| {
            let t = n.as_type_def()?;
            if t.unresolved || t.is_generic || cyclic.contains(&n.id) {
                return None;
            }
            Some((n.id.clone(), n.name().to_string(), t.primitive.is_some()))
        })
        .collect();

    for (id, name, primitive) in candidates {
        if report.inlined.len() >= options.max_nodes {
            debug!(max_nodes = options.max_nodes, "Inline budget exhausted");
            break;
        }
        if is_excluded(&name, &patterns) {
            report.excluded += 1;
            continue;
        }
        let users: HashSet<&NodeId> = graph.incoming(&id).map(|e| &e.source).collect();
        let usage = users.len();
        if usage == 0 || (!primitive && usage > 1) {
            continue;
        }
        if !primitive && type_depth(&snapshot, graph, &id, &mut depth_memo) > options.max_depth {
            continue;
        }
        absorb(graph, &id, "inlined");
        debug!(node = %id, usage, primitive, "Node inlined");
        report.inlined.push((id, name));
    }
    info!(
        inlined = report.inlined.len(),
        excluded = report.excluded,
        "Inline pass complete"
    );
    Ok(report)
}

/// Length of the longest chain of declared types below `id` (acyclic part only).
fn type_depth(
    snapshot: &SchemaGraph,
    graph: &IrGraph,
    id: &NodeId,
    memo: &mut HashMap<NodeId, usize>,
) -> usize {
    if let Some(&d) = memo.get(id) {
        return d;
    }
    memo.insert(id.clone(), 0);
    let mut deepest = 0;
    for next in snapshot.successors(id) {
        let declared = graph
            .node(next)
            .and_then(|n| n.as_type_def())
            .is_some_and(|t| t.primitive.is_none());
        let structural = graph.node(next).is_some_and(|n| n.kind.is_anonymous());
        if declared || structural {
            deepest = deepest.max(1 + type_depth(snapshot, graph, next, memo));
        }
    }
    memo.insert(id.clone(), deepest);
    deepest
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::ir::{Edge, NodePayload, Relation, TypeDefPayload};
    use crate::source::PrimitiveKind;

    fn add(g: &mut IrGraph, name: &str, primitive: Option<PrimitiveKind>) -> NodeId {
        g.add_node(
            NodeKind::TypeDefinition,
            name,
            None,
            NodePayload::TypeDefinition(TypeDefPayload {
                primitive,
                ..Default::default()
            }),
        )
    }

    #[test]
    fn test_single_use_and_primitives_are_absorbed() {
        let mut g = IrGraph::new();
        let user = add(&mut g, "User", None);
        let order = add(&mut g, "Order", None);
        let money = add(&mut g, "Money", None);
        let string = add(&mut g, "string", Some(PrimitiveKind::String));
        g.add_edge(Edge::new(Relation::Uses, order.clone(), money.clone()));
        g.add_edge(Edge::new(Relation::Uses, user.clone(), string.clone()));
        g.add_edge(Edge::new(Relation::Uses, order.clone(), string.clone()));
        g.add_edge(Edge::new(Relation::Uses, money.clone(), string.clone()));
        g.add_edge(Edge::new(Relation::Uses, user.clone(), order.clone()));
        g.add_edge(Edge::new(Relation::Uses, money.clone(), user.clone()));

        let report = inline_nodes(&mut g, &InlineOptions::default()).unwrap();
        assert!(!g.contains(&string));
        assert!(report.inlined.iter().any(|(id, _)| id == &string));
        let edge = g
            .node(&user)
            .unwrap()
            .edges
            .iter()
            .find(|e| e.target == string)
            .unwrap();
        assert!(edge.flag("inlined"));
        assert_eq!(edge.properties["inlinedFrom"], "TypeDefinition:string");
        // User <-> Order <-> Money form a cycle and stay.
        assert!(g.contains(&money));
        assert!(g.check_integrity().is_empty());
    }

    #[test]
    fn test_payload_refs_into_absorbed_node_pair_with_flagged_edge() {
        let mut g = IrGraph::new();
        let mut payload = TypeDefPayload::default();
        let money = add(&mut g, "Money", None);
        payload.properties.insert("total".to_string(), money.clone());
        let order = g.add_node(
            NodeKind::TypeDefinition,
            "Order",
            None,
            NodePayload::TypeDefinition(payload),
        );
        let mut edge = Edge::new(Relation::Uses, order.clone(), money.clone());
        edge.properties.insert("property".to_string(), "total".into());
        g.add_edge(edge);

        inline_nodes(&mut g, &InlineOptions::default()).unwrap();
        assert!(!g.contains(&money));
        let node = g.node(&order).unwrap();
        assert_eq!(node.as_type_def().unwrap().properties["total"], money);
        assert!(node
            .edges
            .iter()
            .any(|e| e.target == money && e.is_absorbed()));
        assert!(g.check_integrity().is_empty());
    }

    #[test]
    fn test_exclude_pattern_protects_contract_types() {
        let mut g = IrGraph::new();
        let op = add(&mut g, "Holder", None);
        let body = add(&mut g, "BodyCreateUser", None);
        let extra = add(&mut g, "Extra", None);
        g.add_edge(Edge::new(Relation::Uses, op.clone(), body.clone()));
        g.add_edge(Edge::new(Relation::Uses, op.clone(), extra.clone()));
        let report = inline_nodes(&mut g, &InlineOptions::default()).unwrap();
        assert!(g.contains(&body));
        assert!(!g.contains(&extra));
        assert_eq!(report.excluded, 1);
    }

    #[test]
    fn test_hoists_edges_of_absorbed_node() {
        let mut g = IrGraph::new();
        let a = add(&mut g, "A", None);
        let b = add(&mut g, "B", None);
        let c = add(&mut g, "C", None);
        let d = add(&mut g, "D", None);
        g.add_edge(Edge::new(Relation::Uses, a.clone(), b.clone()));
        g.add_edge(Edge::new(Relation::Uses, b.clone(), c.clone()));
        g.add_edge(Edge::new(Relation::Uses, d.clone(), c.clone()));
        let options = InlineOptions {
            max_nodes: 1,
            ..Default::default()
        };
        inline_nodes(&mut g, &options).unwrap();
        assert!(!g.contains(&b));
        assert!(g
            .node(&a)
            .unwrap()
            .edges
            .iter()
            .any(|e| e.target == c && e.properties.get("via").is_some()));
    }
}
