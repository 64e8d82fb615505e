use super::registry::StableId;
use crate::binding::ParameterLocation;
use crate::source::{DeclShape, PrimitiveKind, TypeExpr};
use crate::validator::ValidationIssue;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use tracing::debug;

/// Generated node identity: `kind:name`, namespaced by file on collision.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(kind: NodeKind, name: &str) -> Self {
        NodeId(format!("{}:{}", kind.as_str(), name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        NodeId(s.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NodeKind {
    TypeDefinition,
    Controller,
    Operation,
    Parameter,
    Enum,
    Union,
    Intersection,
    SchemaComponent,
}

impl NodeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NodeKind::TypeDefinition => "TypeDefinition",
            NodeKind::Controller => "Controller",
            NodeKind::Operation => "Operation",
            NodeKind::Parameter => "Parameter",
            NodeKind::Enum => "Enum",
            NodeKind::Union => "Union",
            NodeKind::Intersection => "Intersection",
            NodeKind::SchemaComponent => "SchemaComponent",
        }
    }

    /// Nodes lowered from inline type syntax rather than a named declaration.
    pub fn is_anonymous(self) -> bool {
        matches!(
            self,
            NodeKind::Enum | NodeKind::Union | NodeKind::Intersection | NodeKind::SchemaComponent
        )
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Relation {
    Uses,
    Contains,
    Extends,
    Validates,
    References,
    DependsOn,
    Generates,
}

/// A directed, typed edge. Stored on its source node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub relation: Relation,
    pub source: NodeId,
    pub target: NodeId,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, Value>,
}

impl Edge {
    pub fn new(relation: Relation, source: NodeId, target: NodeId) -> Self {
        Self {
            relation,
            source,
            target,
            properties: BTreeMap::new(),
        }
    }

    pub fn with_property(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.properties.insert(key.to_string(), value.into());
        self
    }

    pub fn flag(&self, key: &str) -> bool {
        self.properties
            .get(key)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// An inlined or flattened edge records an absorbed node; its target no
    /// longer exists as a node and it is not followed by graph algorithms.
    pub fn is_absorbed(&self) -> bool {
        self.flag("inlined") || self.flag("flattened")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub file: String,
    #[serde(default)]
    pub line: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct NodeMetadata {
    pub name: String,
    pub source: Option<SourceLocation>,
    pub tags: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TypeDefPayload {
    /// Property name → node holding the property's type
    pub properties: IndexMap<String, NodeId>,
    pub primitive: Option<PrimitiveKind>,
    pub shape: Option<DeclShape>,
    pub is_generic: bool,
    /// Referenced by name but never declared; emits an empty schema.
    pub unresolved: bool,
    pub registry_id: Option<StableId>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ControllerPayload {
    pub base_path: String,
    pub registry_id: Option<StableId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OperationPayload {
    pub http_method: http::Method,
    /// Full route template (controller base + verb path)
    pub path: String,
    pub operation_id: String,
    pub method_name: String,
    pub return_type: Option<NodeId>,
    pub middleware: Vec<String>,
    pub registry_id: Option<StableId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParameterPayload {
    pub index: usize,
    pub location: ParameterLocation,
    /// Wire name (defaults to the declared parameter name)
    pub wire_name: String,
    /// Resolved type node; `None` until the resolution step runs.
    pub ty: Option<NodeId>,
    pub type_expr: TypeExpr,
    pub is_optional: bool,
    pub deep_object: bool,
}

/// Payload of anonymous structure nodes (`SchemaComponent`, `Union`,
/// `Intersection`, `Enum`).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StructurePayload {
    pub properties: IndexMap<String, NodeId>,
    pub members: Vec<NodeId>,
    pub values: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodePayload {
    TypeDefinition(TypeDefPayload),
    Controller(ControllerPayload),
    Operation(OperationPayload),
    Parameter(ParameterPayload),
    Structure(StructurePayload),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    pub metadata: NodeMetadata,
    pub edges: Vec<Edge>,
    pub payload: NodePayload,
}

impl Node {
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn as_type_def(&self) -> Option<&TypeDefPayload> {
        match &self.payload {
            NodePayload::TypeDefinition(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_operation(&self) -> Option<&OperationPayload> {
        match &self.payload {
            NodePayload::Operation(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_parameter(&self) -> Option<&ParameterPayload> {
        match &self.payload {
            NodePayload::Parameter(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_controller(&self) -> Option<&ControllerPayload> {
        match &self.payload {
            NodePayload::Controller(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_structure(&self) -> Option<&StructurePayload> {
        match &self.payload {
            NodePayload::Structure(p) => Some(p),
            _ => None,
        }
    }

    /// Property map for type definitions and object-like structure nodes.
    pub fn properties(&self) -> Option<&IndexMap<String, NodeId>> {
        match &self.payload {
            NodePayload::TypeDefinition(p) => Some(&p.properties),
            NodePayload::Structure(p) => Some(&p.properties),
            _ => None,
        }
    }

    pub fn is_primitive(&self) -> bool {
        self.as_type_def().is_some_and(|t| t.primitive.is_some())
    }

    pub fn outgoing(&self, relation: Relation) -> impl Iterator<Item = &Edge> {
        self.edges.iter().filter(move |e| e.relation == relation)
    }
}

/// Record of an identity collision resolved by namespacing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdCollision {
    pub kind: NodeKind,
    pub name: String,
    pub first: NodeId,
    pub assigned: NodeId,
}

/// The intermediate representation: nodes in insertion order, edges on their
/// source node. Every mutation bumps [`IrGraph::revision`].
#[derive(Debug, Clone, Default)]
pub struct IrGraph {
    nodes: IndexMap<NodeId, Node>,
    by_name: HashMap<(NodeKind, String), NodeId>,
    collisions: Vec<IdCollision>,
    revision: u64,
}

impl IrGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn collisions(&self) -> &[IdCollision] {
        &self.collisions
    }

    /// Create a node, applying the identity policy: the first `kind+name` gets
    /// `kind:name`; later ones get `kind:name@file`, then a `#n` suffix.
    pub fn add_node(
        &mut self,
        kind: NodeKind,
        name: &str,
        source: Option<SourceLocation>,
        payload: NodePayload,
    ) -> NodeId {
        let base = NodeId::new(kind, name);
        let id = if !self.nodes.contains_key(&base) {
            base
        } else {
            let file = source.as_ref().map(|s| s.file.as_str()).unwrap_or("?");
            let mut candidate = NodeId(format!("{base}@{file}"));
            let mut n = 2;
            while self.nodes.contains_key(&candidate) {
                candidate = NodeId(format!("{base}@{file}#{n}"));
                n += 1;
            }
            debug!(first = %base, assigned = %candidate, "Node identity collision namespaced");
            self.collisions.push(IdCollision {
                kind,
                name: name.to_string(),
                first: base,
                assigned: candidate.clone(),
            });
            candidate
        };
        self.by_name
            .entry((kind, name.to_string()))
            .or_insert_with(|| id.clone());
        self.nodes.insert(
            id.clone(),
            Node {
                id: id.clone(),
                kind,
                metadata: NodeMetadata {
                    name: name.to_string(),
                    source,
                    tags: BTreeSet::new(),
                },
                edges: Vec::new(),
                payload,
            },
        );
        self.revision += 1;
        id
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn node_mut(&mut self, id: &NodeId) -> Option<&mut Node> {
        self.revision += 1;
        self.nodes.get_mut(id)
    }

    /// First node registered under `kind+name` (after dedup: the survivor).
    pub fn lookup(&self, kind: NodeKind, name: &str) -> Option<&NodeId> {
        self.by_name.get(&(kind, name.to_string()))
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn node_ids(&self) -> impl Iterator<Item = &NodeId> {
        self.nodes.keys()
    }

    pub fn nodes_of(&self, kind: NodeKind) -> impl Iterator<Item = &Node> {
        self.nodes.values().filter(move |n| n.kind == kind)
    }

    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.nodes.values().flat_map(|n| n.edges.iter())
    }

    /// Edges pointing at `id`, skipping absorbed ones.
    pub fn incoming<'a>(&'a self, id: &'a NodeId) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges()
            .filter(move |e| &e.target == id && !e.is_absorbed())
    }

    /// Append an edge to its source node. Returns `false` if the source is missing.
    pub fn add_edge(&mut self, edge: Edge) -> bool {
        match self.nodes.get_mut(&edge.source) {
            Some(node) => {
                if !node.edges.contains(&edge) {
                    node.edges.push(edge);
                }
                self.revision += 1;
                true
            }
            None => false,
        }
    }

    /// Rewrite every edge (and payload reference) targeting `from` to target `to`.
    pub fn retarget(&mut self, from: &NodeId, to: &NodeId) -> usize {
        let mut rewritten = 0;
        for node in self.nodes.values_mut() {
            for edge in node.edges.iter_mut().filter(|e| &e.target == from) {
                edge.target = to.clone();
                rewritten += 1;
            }
            let refs: Vec<&mut NodeId> = match &mut node.payload {
                NodePayload::TypeDefinition(p) => p.properties.values_mut().collect(),
                NodePayload::Structure(p) => p
                    .properties
                    .values_mut()
                    .chain(p.members.iter_mut())
                    .collect(),
                NodePayload::Operation(p) => p.return_type.iter_mut().collect(),
                NodePayload::Parameter(p) => p.ty.iter_mut().collect(),
                NodePayload::Controller(_) => Vec::new(),
            };
            for r in refs.into_iter().filter(|r| *r == from) {
                *r = to.clone();
            }
            // Retargeting can make non-adjacent edges identical.
            let mut seen = HashSet::new();
            node.edges
                .retain(|e| seen.insert((e.relation, e.target.clone(), e.is_absorbed())));
        }
        self.revision += 1;
        rewritten
    }

    /// Remove a node and its outgoing edges. Edges pointing at it are left for
    /// the caller to retarget or absorb.
    pub fn remove_node(&mut self, id: &NodeId) -> Option<Node> {
        let node = self.nodes.shift_remove(id)?;
        let key = (node.kind, node.metadata.name.clone());
        if self.by_name.get(&key) == Some(id) {
            let replacement = self
                .nodes
                .values()
                .find(|n| n.kind == node.kind && n.metadata.name == node.metadata.name)
                .map(|n| n.id.clone());
            match replacement {
                Some(r) => {
                    self.by_name.insert(key, r);
                }
                None => {
                    self.by_name.remove(&key);
                }
            }
        }
        self.revision += 1;
        Some(node)
    }

    /// Every non-absorbed edge must target a node present in the graph.
    /// Payload refs are not walked: a ref into an absorbed node is expected
    /// and always has a matching absorbed edge.
    pub fn check_integrity(&self) -> Vec<ValidationIssue> {
        self.edges()
            .filter(|e| !e.is_absorbed() && !self.nodes.contains_key(&e.target))
            .map(|e| {
                ValidationIssue::new(
                    e.source.as_str(),
                    "DanglingEdge",
                    format!("{:?} edge targets missing node {}", e.relation, e.target),
                )
            })
            .collect()
    }
}
