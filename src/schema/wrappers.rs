//! Pluggable unwrapping of ORM relation wrapper generics.
//!
//! An ORM collaborator exposes relations as generic wrapper types
//! (`Collection<Post>`, `Reference<User>`). They are not expanded structurally: a
//! collection becomes an array of its target, a reference becomes the target
//! itself, and both carry an `x-relation` extension describing the relation.

use crate::source::TypeExpr;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;

/// Vendor extension key carrying relation metadata.
pub const RELATION_EXTENSION: &str = "x-relation";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RelationKind {
    HasMany,
    ManyToMany,
    BelongsTo,
    HasOne,
}

impl RelationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RelationKind::HasMany => "hasMany",
            RelationKind::ManyToMany => "manyToMany",
            RelationKind::BelongsTo => "belongsTo",
            RelationKind::HasOne => "hasOne",
        }
    }

    /// Collection relations unwrap to arrays.
    pub fn is_collection(self) -> bool {
        matches!(self, RelationKind::HasMany | RelationKind::ManyToMany)
    }
}

/// Result of recognising a wrapper. `target` is `None` when the wrapper was
/// written without a type argument; the translator then degrades to `{}`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Unwrapped<'a> {
    pub wrapper: &'a str,
    pub relation: RelationKind,
    pub target: Option<&'a TypeExpr>,
}

impl Unwrapped<'_> {
    pub fn extension(&self) -> Value {
        let mut ext = json!({
            "kind": self.relation.as_str(),
            "wrapper": self.wrapper,
        });
        if let Some(TypeExpr::Reference { name, .. }) = self.target {
            ext["target"] = Value::String(name.clone());
        }
        ext
    }
}

/// Recognises wrapper generic names for one ORM.
pub trait WrapperAdapter: Send + Sync {
    fn name(&self) -> &str;
    fn relation_for(&self, wrapper: &str) -> Option<RelationKind>;
}

/// Name-table adapter; the default table covers the usual relation wrappers.
#[derive(Debug, Clone)]
pub struct OrmWrapperAdapter {
    name: String,
    relations: HashMap<String, RelationKind>,
}

impl OrmWrapperAdapter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            relations: HashMap::new(),
        }
    }

    pub fn with(mut self, wrapper: &str, relation: RelationKind) -> Self {
        self.relations.insert(wrapper.to_string(), relation);
        self
    }
}

impl Default for OrmWrapperAdapter {
    fn default() -> Self {
        OrmWrapperAdapter::new("orm")
            .with("Collection", RelationKind::HasMany)
            .with("HasMany", RelationKind::HasMany)
            .with("ManyToMany", RelationKind::ManyToMany)
            .with("Reference", RelationKind::BelongsTo)
            .with("Ref", RelationKind::BelongsTo)
            .with("BelongsTo", RelationKind::BelongsTo)
            .with("HasOne", RelationKind::HasOne)
    }
}

impl WrapperAdapter for OrmWrapperAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn relation_for(&self, wrapper: &str) -> Option<RelationKind> {
        self.relations.get(wrapper).copied()
    }
}

/// Ordered set of adapters; the first adapter recognising a name wins.
pub struct WrapperRegistry {
    adapters: Vec<Box<dyn WrapperAdapter>>,
}

impl Default for WrapperRegistry {
    fn default() -> Self {
        Self {
            adapters: vec![Box::new(OrmWrapperAdapter::default())],
        }
    }
}

impl std::fmt::Debug for WrapperRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.adapters.iter().map(|a| a.name()))
            .finish()
    }
}

impl WrapperRegistry {
    pub fn empty() -> Self {
        Self {
            adapters: Vec::new(),
        }
    }

    pub fn register(&mut self, adapter: Box<dyn WrapperAdapter>) {
        self.adapters.push(adapter);
    }

    pub fn is_wrapper(&self, name: &str) -> bool {
        self.adapters.iter().any(|a| a.relation_for(name).is_some())
    }

    pub fn unwrap<'a>(&self, name: &'a str, args: &'a [TypeExpr]) -> Option<Unwrapped<'a>> {
        let relation = self.adapters.iter().find_map(|a| a.relation_for(name))?;
        Some(Unwrapped {
            wrapper: name,
            relation,
            target: args.first(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_adapter_recognises_relations() {
        let reg = WrapperRegistry::default();
        let args = vec![TypeExpr::named("Post")];
        let u = reg.unwrap("Collection", &args).unwrap();
        assert_eq!(u.relation, RelationKind::HasMany);
        assert!(u.relation.is_collection());
        assert_eq!(u.extension()["target"], "Post");
        assert!(reg.unwrap("Reference", &args).is_some());
        assert!(reg.unwrap("Page", &args).is_none());
    }

    #[test]
    fn test_custom_adapter_registration() {
        let mut reg = WrapperRegistry::empty();
        assert!(!reg.is_wrapper("Many"));
        reg.register(Box::new(
            OrmWrapperAdapter::new("custom").with("Many", RelationKind::ManyToMany),
        ));
        let u = reg.unwrap("Many", &[]).unwrap();
        assert_eq!(u.relation, RelationKind::ManyToMany);
        assert!(u.target.is_none());
    }
}
