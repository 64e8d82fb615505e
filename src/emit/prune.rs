//! Unused-schema pruning over the emitted document.
//!
//! Works on the JSON tree directly: collect every `$ref` under `paths`, then keep
//! adding the refs found inside already-kept components until nothing new
//! appears. Components never reached are dropped.

use crate::schema::COMPONENTS_PREFIX;
use serde_json::Value;
use std::collections::BTreeSet;
use tracing::{debug, info};

fn collect_refs(value: &Value, out: &mut BTreeSet<String>) {
    match value {
        Value::Object(map) => {
            if let Some(name) = map
                .get("$ref")
                .and_then(Value::as_str)
                .and_then(|r| r.strip_prefix(COMPONENTS_PREFIX))
            {
                out.insert(name.to_string());
            }
            for v in map.values() {
                collect_refs(v, out);
            }
        }
        Value::Array(items) => {
            for v in items {
                collect_refs(v, out);
            }
        }
        _ => {}
    }
}

/// Component names reachable from `paths` through `$ref`s.
pub fn reachable_components(document: &Value) -> BTreeSet<String> {
    let mut kept = BTreeSet::new();
    if let Some(paths) = document.get("paths") {
        collect_refs(paths, &mut kept);
    }
    let Some(schemas) = document.pointer("/components/schemas") else {
        return kept;
    };
    let mut frontier: Vec<String> = kept.iter().cloned().collect();
    while let Some(name) = frontier.pop() {
        let Some(schema) = schemas.get(&name) else {
            continue;
        };
        let mut found = BTreeSet::new();
        collect_refs(schema, &mut found);
        for r in found {
            if kept.insert(r.clone()) {
                frontier.push(r);
            }
        }
    }
    kept
}

/// Remove unreachable components in place. Returns the removed names, sorted.
pub fn prune_unused(document: &mut Value) -> Vec<String> {
    let kept = reachable_components(document);
    let Some(Value::Object(schemas)) = document.pointer_mut("/components/schemas") else {
        return Vec::new();
    };
    let removed: Vec<String> = schemas
        .keys()
        .filter(|k| !kept.contains(*k))
        .cloned()
        .collect();
    for name in &removed {
        schemas.remove(name);
        debug!(schema = %name, "Unused schema pruned");
    }
    info!(
        pruned = removed.len(),
        kept = schemas.len(),
        "Unused schema pruning complete"
    );
    let mut removed = removed;
    removed.sort();
    removed
}
