//! IR transform passes.
//!
//! Each pass mutates the [`IrGraph`] in place and returns a report. Passes take
//! a fresh [`SchemaGraph`](crate::graph::SchemaGraph) snapshot before deciding
//! anything and re-read the live graph while mutating, so no pass works from
//! adjacency another pass has already invalidated.

pub mod dedup;
pub mod flatten;
pub mod inline;
pub mod similarity;

pub use dedup::{completeness_score, deduplicate, DedupReport};
pub use flatten::{flatten, FlattenOptions, FlattenReport};
pub use inline::{inline_nodes, InlineOptions, InlineReport};
pub use similarity::{find_near_duplicates, SimilarityPair, DEFAULT_SIMILARITY_THRESHOLD};

use super::ir::{Edge, IrGraph, NodeId};
use anyhow::Context;
use regex::Regex;
use serde_json::Value;

/// Names protected from absorption unless overridden.
pub const DEFAULT_EXCLUDE: &str = "^(Body|Request|Response)";

pub(crate) fn default_exclude() -> Vec<String> {
    vec![DEFAULT_EXCLUDE.to_string()]
}

pub(crate) fn compile_patterns(patterns: &[String]) -> anyhow::Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|p| Regex::new(p).with_context(|| format!("invalid exclude pattern '{p}'")))
        .collect()
}

pub(crate) fn is_excluded(name: &str, patterns: &[Regex]) -> bool {
    patterns.iter().any(|re| re.is_match(name))
}

/// Absorb `absorbed` into the node(s) using it.
///
/// Each live edge into `absorbed` is marked `{flag: true, <flag>From: id}`, the
/// absorbed node's outgoing edges are copied onto every consumer, and the node
/// is removed. Returns the consumers.
///
/// Consumer payload refs (`properties`, `return_type`, `ty`) keep pointing at
/// the removed id. Each such ref is paired with the flagged edge above, so it
/// reads as "expanded in place" the same way the edge does, and property keys
/// stay intact for the shape comparisons of later passes.
pub(crate) fn absorb(graph: &mut IrGraph, absorbed: &NodeId, flag: &str) -> Vec<NodeId> {
    let mut consumers: Vec<NodeId> = graph.incoming(absorbed).map(|e| e.source.clone()).collect();
    consumers.dedup();
    let outgoing: Vec<Edge> = graph
        .node(absorbed)
        .map(|n| n.edges.clone())
        .unwrap_or_default();

    for consumer in &consumers {
        if let Some(node) = graph.node_mut(consumer) {
            for edge in node
                .edges
                .iter_mut()
                .filter(|e| &e.target == absorbed && !e.is_absorbed())
            {
                edge.properties.insert(flag.to_string(), Value::Bool(true));
                edge.properties.insert(
                    format!("{flag}From"),
                    Value::String(absorbed.as_str().to_string()),
                );
            }
        }
        for edge in &outgoing {
            if &edge.target == consumer {
                continue;
            }
            let mut hoisted = Edge::new(edge.relation, consumer.clone(), edge.target.clone());
            hoisted.properties = edge.properties.clone();
            hoisted
                .properties
                .insert("via".to_string(), Value::String(absorbed.as_str().to_string()));
            graph.add_edge(hoisted);
        }
    }
    graph.remove_node(absorbed);
    consumers
}
