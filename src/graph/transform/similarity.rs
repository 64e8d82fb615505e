//! Advisory near-duplicate scoring.
//!
//! Flags differently named types that look alike. Nothing is merged here:
//! an exact name match is the only automatic merge trigger.

use crate::graph::ir::{IrGraph, NodeId, NodeKind};
use std::collections::BTreeSet;

pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 12.0;

#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityPair {
    pub a: NodeId,
    pub b: NodeId,
    pub name_similarity: f64,
    pub property_jaccard: f64,
    pub score: f64,
}

pub fn levenshtein(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut cur = vec![0; b.len() + 1];
    for (i, ca) in a.chars().enumerate() {
        cur[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            cur[j + 1] = (prev[j + 1] + 1).min(cur[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    prev[b.len()]
}

/// `1 - distance / longer length`, in `[0, 1]`.
pub fn name_similarity(a: &str, b: &str) -> f64 {
    let longest = a.chars().count().max(b.chars().count());
    if longest == 0 {
        return 1.0;
    }
    1.0 - levenshtein(a, b) as f64 / longest as f64
}

pub fn jaccard(a: &BTreeSet<&str>, b: &BTreeSet<&str>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

/// `10 × name + 5 × jaccard + 50 × identical non-empty property sets`.
pub fn similarity_score(
    name_a: &str,
    name_b: &str,
    props_a: &BTreeSet<&str>,
    props_b: &BTreeSet<&str>,
) -> SimilarityParts {
    let name = name_similarity(name_a, name_b);
    let jac = jaccard(props_a, props_b);
    let identical = !props_a.is_empty() && props_a == props_b;
    SimilarityParts {
        name,
        jaccard: jac,
        score: 10.0 * name + 5.0 * jac + if identical { 50.0 } else { 0.0 },
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimilarityParts {
    pub name: f64,
    pub jaccard: f64,
    pub score: f64,
}

/// Pairs of declared types scoring at or above `threshold`, best first.
pub fn find_near_duplicates(graph: &IrGraph, threshold: f64) -> Vec<SimilarityPair> {
    let candidates: Vec<(&NodeId, &str, BTreeSet<&str>)> = graph
        .nodes_of(NodeKind::TypeDefinition)
        .filter_map(|n| {
            let t = n.as_type_def()?;
            if t.primitive.is_some() || t.unresolved || t.shape.is_none() {
                return None;
            }
            Some((&n.id, n.name(), t.properties.keys().map(String::as_str).collect()))
        })
        .collect();

    let mut pairs = Vec::new();
    for (i, (id_a, name_a, props_a)) in candidates.iter().enumerate() {
        for (id_b, name_b, props_b) in &candidates[i + 1..] {
            if name_a == name_b {
                continue;
            }
            let parts = similarity_score(name_a, name_b, props_a, props_b);
            if parts.score >= threshold {
                pairs.push(SimilarityPair {
                    a: (*id_a).clone(),
                    b: (*id_b).clone(),
                    name_similarity: parts.name,
                    property_jaccard: parts.jaccard,
                    score: parts.score,
                });
            }
        }
    }
    pairs.sort_by(|x, y| y.score.total_cmp(&x.score));
    pairs
}
