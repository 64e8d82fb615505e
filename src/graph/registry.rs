//! Build-time registration table.
//!
//! Every declaration the builder turns into a node gets one arena slot holding the
//! declared item and, for routes, the route metadata read off its annotations. The
//! table is filled once while the graph is built; later phases look things up by
//! [`StableId`] instead of re-reading annotations.

use super::ir::NodeId;
use crate::source::{ClassDecl, Declaration, MethodDecl, ParamDecl};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Index into the registry arena. Assigned in registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StableId(pub u32);

#[derive(Debug, Clone, PartialEq)]
pub enum DeclaredItem {
    Type(Declaration),
    Controller(ClassDecl),
    Operation {
        controller: String,
        method: MethodDecl,
    },
    Parameter(ParamDecl),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RouteMetadata {
    pub http_method: http::Method,
    pub path: String,
    pub operation_id: String,
    pub tags: Vec<String>,
    pub middleware: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegistryEntry {
    pub id: StableId,
    pub node: NodeId,
    pub file: String,
    pub declared: DeclaredItem,
    pub route: Option<RouteMetadata>,
}

#[derive(Debug, Clone, Default)]
pub struct Registry {
    entries: Vec<RegistryEntry>,
    by_node: HashMap<NodeId, StableId>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        node: NodeId,
        file: &str,
        declared: DeclaredItem,
        route: Option<RouteMetadata>,
    ) -> StableId {
        let id = StableId(self.entries.len() as u32);
        self.by_node.insert(node.clone(), id);
        self.entries.push(RegistryEntry {
            id,
            node,
            file: file.to_string(),
            declared,
            route,
        });
        id
    }

    pub fn get(&self, id: StableId) -> Option<&RegistryEntry> {
        self.entries.get(id.0 as usize)
    }

    pub fn for_node(&self, node: &NodeId) -> Option<&RegistryEntry> {
        self.by_node.get(node).and_then(|id| self.get(*id))
    }

    /// The declaration behind a type node, if it came from one.
    pub fn declaration(&self, node: &NodeId) -> Option<&Declaration> {
        match &self.for_node(node)?.declared {
            DeclaredItem::Type(d) => Some(d),
            _ => None,
        }
    }

    pub fn entries(&self) -> &[RegistryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
