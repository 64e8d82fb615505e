//! Query string and cookie parsing.
//!
//! The raw query is decoded once per request. Names flagged `deepObject` are
//! assembled from bracket notation into nested objects; every other name stays
//! a plain string, or an array of strings when repeated.

use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};

/// Query values for one request, keyed by parameter name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedQuery {
    values: HashMap<String, Value>,
}

impl ParsedQuery {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Split `where[author][email]` into `("where", ["author", "email"])`.
///
/// Keys without well-formed brackets come back whole with no segments.
fn split_brackets(key: &str) -> (&str, Vec<&str>) {
    let Some(open) = key.find('[') else {
        return (key, Vec::new());
    };
    let base = &key[..open];
    let mut segments = Vec::new();
    let mut rest = &key[open..];
    while let Some(inner) = rest.strip_prefix('[') {
        let Some(close) = inner.find(']') else {
            return (key, Vec::new());
        };
        segments.push(&inner[..close]);
        rest = &inner[close + 1..];
    }
    if !rest.is_empty() || base.is_empty() {
        return (key, Vec::new());
    }
    (base, segments)
}

fn insert_deep(target: &mut Map<String, Value>, segments: &[&str], value: String) {
    let Some((head, tail)) = segments.split_first() else {
        return;
    };
    if tail.is_empty() {
        match target.get_mut(*head) {
            Some(Value::Array(items)) => items.push(Value::String(value)),
            Some(existing) if existing.is_string() => {
                let previous = existing.take();
                *existing = Value::Array(vec![previous, Value::String(value)]);
            }
            _ => {
                target.insert(head.to_string(), Value::String(value));
            }
        }
        return;
    }
    let entry = target
        .entry(head.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if !entry.is_object() {
        *entry = Value::Object(Map::new());
    }
    if let Value::Object(child) = entry {
        insert_deep(child, tail, value);
    }
}

fn push_flat(values: &mut HashMap<String, Value>, name: String, value: String) {
    match values.get_mut(&name) {
        Some(Value::Array(items)) => items.push(Value::String(value)),
        Some(existing) => {
            let previous = existing.take();
            *existing = Value::Array(vec![previous, Value::String(value)]);
        }
        None => {
            values.insert(name, Value::String(value));
        }
    }
}

/// Parse `raw` (without the leading `?`).
///
/// `deep_names` lists the parameters serialized as `deepObject`. A `name[]`
/// key on a flat parameter always yields an array.
pub fn parse_query(raw: &str, deep_names: &HashSet<&str>) -> ParsedQuery {
    let raw = raw.strip_prefix('?').unwrap_or(raw);
    let mut values: HashMap<String, Value> = HashMap::new();
    for (key, value) in url::form_urlencoded::parse(raw.as_bytes()) {
        let (base, segments) = split_brackets(&key);
        if deep_names.contains(base) && !segments.is_empty() {
            let entry = values
                .entry(base.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            if let Value::Object(map) = entry {
                insert_deep(map, &segments, value.into_owned());
            }
            continue;
        }
        if segments == [""] {
            let entry = values
                .entry(base.to_string())
                .or_insert_with(|| Value::Array(Vec::new()));
            match entry {
                Value::Array(items) => items.push(Value::String(value.into_owned())),
                other => {
                    let previous = other.take();
                    *other = Value::Array(vec![previous, Value::String(value.into_owned())]);
                }
            }
            continue;
        }
        push_flat(&mut values, key.into_owned(), value.into_owned());
    }
    ParsedQuery { values }
}

/// Parse a `Cookie` header into name/value pairs.
pub fn parse_cookies(header: &str) -> HashMap<String, String> {
    header
        .split(';')
        .filter_map(|pair| {
            let mut parts = pair.trim().splitn(2, '=');
            let name = parts.next()?.trim();
            let value = parts.next()?.trim();
            if name.is_empty() {
                return None;
            }
            Some((name.to_string(), value.to_string()))
        })
        .collect()
}
