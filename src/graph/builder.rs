//! Graph IR builder.
//!
//! Building runs in two steps. The scan step walks every declaration unit and
//! creates nodes: controllers, their verb-annotated methods as operations, one
//! parameter node per method parameter, and a `TypeDefinition` for everything
//! else. Parameters get a placeholder `uses` edge whose target does not exist
//! yet. The resolve step then lowers each member, parameter and return type to
//! nodes and replaces the placeholders.

use super::ir::{
    ControllerPayload, Edge, IrGraph, NodeId, NodeKind, NodePayload, OperationPayload,
    ParameterPayload, Relation, SourceLocation, StructurePayload, TypeDefPayload,
};
use super::registry::{DeclaredItem, Registry, RouteMetadata};
use crate::binding::{infer_location, join_route};
use crate::schema::WrapperRegistry;
use crate::source::{
    annotations, ClassDecl, Declaration, DeclarationUnit, Member, MethodDecl, PrimitiveKind,
    TypeExpr, TypeResolver,
};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info, warn};

/// Result of a build: the graph plus the registration table filled alongside it.
#[derive(Debug, Clone, Default)]
pub struct BuildOutput {
    pub graph: IrGraph,
    pub registry: Registry,
}

/// Target id used by parameter edges until the resolve step runs.
fn placeholder_id(ty: &TypeExpr) -> NodeId {
    NodeId::from(format!("Unresolved:{ty}").as_str())
}

/// Same scheme the route generator uses for duplicate handler names.
fn unique_operation_id(seen: &mut HashSet<String>, id: &str) -> String {
    if seen.insert(id.to_string()) {
        return id.to_string();
    }
    let mut counter = 1;
    loop {
        let candidate = format!("{id}_{counter}");
        if seen.insert(candidate.clone()) {
            warn!(operation_id = %id, assigned = %candidate, "Duplicate operation id renamed");
            return candidate;
        }
        counter += 1;
    }
}

struct PendingType {
    node: NodeId,
    decl: Declaration,
}

struct PendingParam {
    node: NodeId,
    owner: String,
    name: String,
    ty: TypeExpr,
    type_params: Vec<String>,
}

struct PendingReturn {
    node: NodeId,
    owner: String,
    ty: TypeExpr,
}

/// Where a lowered type expression is being attached.
#[derive(Clone, Copy)]
struct Site<'s> {
    owner: &'s str,
    prop: &'s str,
    type_params: &'s [String],
    file: &'s str,
}

pub struct GraphBuilder<'a> {
    resolver: &'a dyn TypeResolver,
    wrappers: &'a WrapperRegistry,
    out: BuildOutput,
    operation_ids: HashSet<String>,
    types: Vec<PendingType>,
    params: Vec<PendingParam>,
    returns: Vec<PendingReturn>,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(resolver: &'a dyn TypeResolver, wrappers: &'a WrapperRegistry) -> Self {
        Self {
            resolver,
            wrappers,
            out: BuildOutput::default(),
            operation_ids: HashSet::new(),
            types: Vec::new(),
            params: Vec::new(),
            returns: Vec::new(),
        }
    }

    /// Scan then resolve every unit. Units are processed in the order given.
    pub fn build(mut self, units: &[DeclarationUnit]) -> BuildOutput {
        for unit in units {
            for decl in &unit.declarations {
                self.scan_declaration(&unit.file, decl);
            }
        }
        self.resolve();
        let graph = &self.out.graph;
        info!(
            nodes = graph.len(),
            controllers = graph.nodes_of(NodeKind::Controller).count(),
            operations = graph.nodes_of(NodeKind::Operation).count(),
            types = graph.nodes_of(NodeKind::TypeDefinition).count(),
            collisions = graph.collisions().len(),
            "Graph IR built"
        );
        self.out
    }

    fn scan_declaration(&mut self, file: &str, decl: &Declaration) {
        if let Declaration::Class(class) = decl {
            if class.annotation(annotations::CONTROLLER).is_some() {
                self.scan_controller(file, class);
                return;
            }
        }
        let source = Some(SourceLocation {
            file: file.to_string(),
            line: decl.line(),
        });
        let payload = NodePayload::TypeDefinition(TypeDefPayload {
            shape: Some(decl.shape()),
            is_generic: !decl.type_params().is_empty(),
            ..Default::default()
        });
        let graph = &mut self.out.graph;
        let id = graph.add_node(NodeKind::TypeDefinition, decl.name(), source, payload);
        let stable = self
            .out
            .registry
            .register(id.clone(), file, DeclaredItem::Type(decl.clone()), None);
        if let Some(node) = graph.node_mut(&id) {
            node.metadata.tags.extend(decl.tags().iter().cloned());
            if let NodePayload::TypeDefinition(p) = &mut node.payload {
                p.registry_id = Some(stable);
            }
        }
        self.types.push(PendingType {
            node: id,
            decl: decl.clone(),
        });
    }

    fn scan_controller(&mut self, file: &str, class: &ClassDecl) {
        let base_path = class
            .annotation(annotations::CONTROLLER)
            .and_then(|a| a.first_str())
            .unwrap_or("")
            .to_string();
        let source = Some(SourceLocation {
            file: file.to_string(),
            line: class.line,
        });
        let controller = self.out.graph.add_node(
            NodeKind::Controller,
            &class.name,
            source,
            NodePayload::Controller(ControllerPayload {
                base_path: base_path.clone(),
                registry_id: None,
            }),
        );
        let stable = self.out.registry.register(
            controller.clone(),
            file,
            DeclaredItem::Controller(class.clone()),
            None,
        );
        if let Some(node) = self.out.graph.node_mut(&controller) {
            node.metadata.tags.extend(class.tags.iter().cloned());
            if let NodePayload::Controller(p) = &mut node.payload {
                p.registry_id = Some(stable);
            }
        }

        let mut operations = 0;
        for method in &class.methods {
            if self.scan_operation(file, class, &controller, &base_path, method) {
                operations += 1;
            }
        }
        if operations == 0 {
            warn!(controller = %class.name, file, "Controller has no recognised operations");
        }
    }

    fn scan_operation(
        &mut self,
        file: &str,
        class: &ClassDecl,
        controller: &NodeId,
        base_path: &str,
        method: &MethodDecl,
    ) -> bool {
        let Some((verb, sub_path)) = method.annotations.iter().find_map(|a| {
            annotations::verb_method(&a.name).map(|m| (m, a.first_str().unwrap_or("")))
        }) else {
            return false;
        };
        let path = join_route(base_path, sub_path);
        let requested = method
            .annotation(annotations::OPERATION_ID)
            .and_then(|a| a.first_str())
            .unwrap_or(&method.name);
        let operation_id = unique_operation_id(&mut self.operation_ids, requested);
        let tags = method
            .annotation(annotations::TAGS)
            .map(|a| a.strings())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| class.tags.clone());
        let middleware = method
            .annotation(annotations::MIDDLEWARE)
            .map(|a| a.strings())
            .unwrap_or_default();

        let op_name = format!("{}.{}", class.name, method.name);
        let source = Some(SourceLocation {
            file: file.to_string(),
            line: method.line,
        });
        let op = self.out.graph.add_node(
            NodeKind::Operation,
            &op_name,
            source.clone(),
            NodePayload::Operation(OperationPayload {
                http_method: verb.clone(),
                path: path.clone(),
                operation_id: operation_id.clone(),
                method_name: method.name.clone(),
                return_type: None,
                middleware: middleware.clone(),
                registry_id: None,
            }),
        );
        let stable = self.out.registry.register(
            op.clone(),
            file,
            DeclaredItem::Operation {
                controller: class.name.clone(),
                method: method.clone(),
            },
            Some(RouteMetadata {
                http_method: verb.clone(),
                path: path.clone(),
                operation_id: operation_id.clone(),
                tags: tags.clone(),
                middleware,
            }),
        );
        if let Some(node) = self.out.graph.node_mut(&op) {
            node.metadata.tags.extend(tags);
            if let NodePayload::Operation(p) = &mut node.payload {
                p.registry_id = Some(stable);
            }
        }
        self.out
            .graph
            .add_edge(Edge::new(Relation::Contains, controller.clone(), op.clone()));
        debug!(operation_id = %operation_id, method = %verb, path = %path, "Operation scanned");

        let mut body_taken = false;
        for (index, param) in method.params.iter().enumerate() {
            let location = infer_location(param, &verb, &path, body_taken);
            if location == crate::binding::ParameterLocation::Body {
                body_taken = true;
            }
            let wire_name = param
                .annotations
                .iter()
                .find(|a| {
                    matches!(
                        a.name.as_str(),
                        annotations::PATH | annotations::QUERY | annotations::HEADER | annotations::COOKIE
                    )
                })
                .and_then(|a| a.first_str())
                .unwrap_or(&param.name)
                .to_string();
            let param_name = format!("{op_name}.{}", param.name);
            let p = self.out.graph.add_node(
                NodeKind::Parameter,
                &param_name,
                source.clone(),
                NodePayload::Parameter(ParameterPayload {
                    index,
                    location,
                    wire_name,
                    ty: None,
                    type_expr: param.ty.clone(),
                    is_optional: param.optional,
                    deep_object: param.has_annotation(annotations::DEEP_OBJECT),
                }),
            );
            self.out
                .registry
                .register(p.clone(), file, DeclaredItem::Parameter(param.clone()), None);
            self.out
                .graph
                .add_edge(Edge::new(Relation::Contains, op.clone(), p.clone()));
            self.out.graph.add_edge(
                Edge::new(Relation::Uses, p.clone(), placeholder_id(&param.ty))
                    .with_property("placeholder", true),
            );
            self.params.push(PendingParam {
                node: p,
                owner: op_name.clone(),
                name: param.name.clone(),
                ty: param.ty.clone(),
                type_params: class.type_params.clone(),
            });
        }
        self.returns.push(PendingReturn {
            node: op,
            owner: op_name,
            ty: method.returns.clone(),
        });
        true
    }

    fn resolve(&mut self) {
        for pending in std::mem::take(&mut self.types) {
            self.resolve_type(&pending);
        }
        for pending in std::mem::take(&mut self.params) {
            let file = self.file_of(&pending.node);
            if let Some(node) = self.out.graph.node_mut(&pending.node) {
                node.edges.retain(|e| !e.flag("placeholder"));
            }
            let site = Site {
                owner: &pending.owner,
                prop: &pending.name,
                type_params: &pending.type_params,
                file: &file,
            };
            let target = self.lower(&pending.ty, &pending.node, site, BTreeMap::new());
            if let Some(node) = self.out.graph.node_mut(&pending.node) {
                if let NodePayload::Parameter(p) = &mut node.payload {
                    p.ty = target;
                }
            }
        }
        for pending in std::mem::take(&mut self.returns) {
            let ty = unwrap_promise(&pending.ty);
            if ty
                .as_primitive()
                .is_some_and(|p| matches!(p, PrimitiveKind::Void | PrimitiveKind::Undefined))
            {
                continue;
            }
            let file = self.file_of(&pending.node);
            let site = Site {
                owner: &pending.owner,
                prop: "response",
                type_params: &[],
                file: &file,
            };
            let mut props = BTreeMap::new();
            props.insert("response".to_string(), Value::Bool(true));
            let target = self.lower(ty, &pending.node, site, props);
            if let Some(node) = self.out.graph.node_mut(&pending.node) {
                if let NodePayload::Operation(p) = &mut node.payload {
                    p.return_type = target;
                }
            }
        }
    }

    fn file_of(&self, id: &NodeId) -> String {
        self.out
            .graph
            .node(id)
            .and_then(|n| n.metadata.source.as_ref())
            .map(|s| s.file.clone())
            .unwrap_or_default()
    }

    fn resolve_type(&mut self, pending: &PendingType) {
        let file = self.file_of(&pending.node);
        let name = pending.decl.name().to_string();
        let type_params = pending.decl.type_params().to_vec();
        for parent in pending.decl.extends() {
            let target = self.named_node(parent);
            self.out.graph.add_edge(Edge::new(
                Relation::Extends,
                pending.node.clone(),
                target,
            ));
        }
        match &pending.decl {
            Declaration::Alias(alias) => {
                let site = Site {
                    owner: &name,
                    prop: "",
                    type_params: &type_params,
                    file: &file,
                };
                let mut props = BTreeMap::new();
                props.insert("alias".to_string(), Value::Bool(true));
                self.lower(&alias.target, &pending.node, site, props);
            }
            Declaration::Enum(_) => {}
            Declaration::Class(_) | Declaration::Interface(_) => {
                let members: Vec<Member> = pending.decl.members().to_vec();
                self.lower_members(&pending.node, &name, &members, &type_params, &file);
            }
        }
    }

    fn lower_members(
        &mut self,
        owner_id: &NodeId,
        owner: &str,
        members: &[Member],
        type_params: &[String],
        file: &str,
    ) {
        for member in members {
            let site = Site {
                owner,
                prop: &member.name,
                type_params,
                file,
            };
            let mut props = BTreeMap::new();
            props.insert("property".to_string(), Value::String(member.name.clone()));
            if member.optional {
                props.insert("optional".to_string(), Value::Bool(true));
            }
            if let Some(target) = self.lower(&member.ty, owner_id, site, props) {
                if let Some(node) = self.out.graph.node_mut(owner_id) {
                    match &mut node.payload {
                        NodePayload::TypeDefinition(p) => {
                            p.properties.insert(member.name.clone(), target);
                        }
                        NodePayload::Structure(p) => {
                            p.properties.insert(member.name.clone(), target);
                        }
                        _ => {}
                    }
                }
            }
        }
    }

    /// First node declared under `name`, or an unresolved placeholder type.
    fn named_node(&mut self, name: &str) -> NodeId {
        if let Some(id) = self.out.graph.lookup(NodeKind::TypeDefinition, name) {
            return id.clone();
        }
        warn!(type_name = %name, "Unresolved type reference, emitting empty schema");
        self.out.graph.add_node(
            NodeKind::TypeDefinition,
            name,
            None,
            NodePayload::TypeDefinition(TypeDefPayload {
                unresolved: true,
                ..Default::default()
            }),
        )
    }

    fn primitive_node(&mut self, kind: PrimitiveKind) -> NodeId {
        if let Some(id) = self.out.graph.lookup(NodeKind::TypeDefinition, kind.as_str()) {
            return id.clone();
        }
        self.out.graph.add_node(
            NodeKind::TypeDefinition,
            kind.as_str(),
            None,
            NodePayload::TypeDefinition(TypeDefPayload {
                primitive: Some(kind),
                ..Default::default()
            }),
        )
    }

    fn structure_node(&mut self, kind: NodeKind, site: Site<'_>, payload: StructurePayload) -> NodeId {
        let name = if site.prop.is_empty() {
            site.owner.to_string()
        } else {
            format!("{}.{}", site.owner, site.prop)
        };
        let source = Some(SourceLocation {
            file: site.file.to_string(),
            line: None,
        });
        self.out
            .graph
            .add_node(kind, &name, source, NodePayload::Structure(payload))
    }

    /// Lower `expr` to a node and connect `from` to it with a `uses` edge
    /// carrying `props`. Returns `None` for generic type parameters.
    fn lower(
        &mut self,
        expr: &TypeExpr,
        from: &NodeId,
        site: Site<'_>,
        mut props: BTreeMap<String, Value>,
    ) -> Option<NodeId> {
        let mut relation = Relation::Uses;
        let target = match expr {
            TypeExpr::Primitive { name } => self.primitive_node(*name),
            TypeExpr::Literal { value } => self.primitive_node(literal_kind(value)),
            TypeExpr::Date => self.named_builtin("Date"),
            TypeExpr::Array { items } => {
                props.insert("array".to_string(), Value::Bool(true));
                return self.lower(items, from, site, props);
            }
            TypeExpr::Record { value, .. } => {
                props.insert("record".to_string(), Value::Bool(true));
                return self.lower(value, from, site, props);
            }
            TypeExpr::Object { members } => {
                let id = self.structure_node(NodeKind::SchemaComponent, site, StructurePayload::default());
                let owner = self.out.graph.node(&id).map(|n| n.name().to_string()).unwrap_or_default();
                self.lower_members(&id, &owner, members, site.type_params, site.file);
                id
            }
            TypeExpr::Union { variants } => {
                let inner = expr.non_nullable();
                if !std::ptr::eq(inner, expr) {
                    props.insert("nullable".to_string(), Value::Bool(true));
                    return self.lower(inner, from, site, props);
                }
                if variants.iter().all(|v| matches!(v, TypeExpr::Literal { .. })) {
                    let values = variants
                        .iter()
                        .filter_map(|v| match v {
                            TypeExpr::Literal { value } => Some(value.clone()),
                            _ => None,
                        })
                        .collect();
                    self.structure_node(
                        NodeKind::Enum,
                        site,
                        StructurePayload {
                            values,
                            ..Default::default()
                        },
                    )
                } else {
                    self.composite(NodeKind::Union, variants, site)
                }
            }
            TypeExpr::Intersection { parts } => self.composite(NodeKind::Intersection, parts, site),
            TypeExpr::Reference { name, args } => {
                if site.type_params.iter().any(|p| p == name) {
                    return None;
                }
                if let Some(unwrapped) = self.wrappers.unwrap(name, args) {
                    props.insert(
                        "relation".to_string(),
                        Value::String(unwrapped.relation.as_str().to_string()),
                    );
                    if unwrapped.relation.is_collection() {
                        props.insert("array".to_string(), Value::Bool(true));
                    }
                    match unwrapped.target {
                        Some(TypeExpr::Reference { name: target, .. }) => {
                            relation = Relation::References;
                            self.named_node(target)
                        }
                        Some(other) => return self.lower(other, from, site, props),
                        None => self.named_node(name),
                    }
                } else {
                    match (name.as_str(), args.as_slice()) {
                        ("Array", [item]) => {
                            props.insert("array".to_string(), Value::Bool(true));
                            return self.lower(item, from, site, props);
                        }
                        ("Record", [_, value]) => {
                            props.insert("record".to_string(), Value::Bool(true));
                            return self.lower(value, from, site, props);
                        }
                        ("Promise" | "Partial" | "Pick" | "Omit" | "Readonly", [inner, ..]) => {
                            return self.lower(inner, from, site, props);
                        }
                        _ => {}
                    }
                    if self.resolver.resolve(name).is_none() {
                        debug!(type_name = %name, owner = site.owner, "Reference not found by resolver");
                    }
                    let id = self.named_node(name);
                    for (i, arg) in args.iter().enumerate() {
                        let mut arg_props = BTreeMap::new();
                        arg_props.insert("typeArgument".to_string(), Value::from(i));
                        self.lower(arg, from, site, arg_props);
                    }
                    id
                }
            }
        };
        let mut edge = Edge::new(relation, from.clone(), target.clone());
        edge.properties = props;
        self.out.graph.add_edge(edge);
        Some(target)
    }

    fn composite(&mut self, kind: NodeKind, parts: &[TypeExpr], site: Site<'_>) -> NodeId {
        let id = self.structure_node(kind, site, StructurePayload::default());
        let owner = self.out.graph.node(&id).map(|n| n.name().to_string()).unwrap_or_default();
        let mut members = Vec::new();
        for (i, part) in parts.iter().enumerate() {
            let prop = i.to_string();
            let inner = Site {
                owner: &owner,
                prop: &prop,
                ..site
            };
            let mut props = BTreeMap::new();
            props.insert("member".to_string(), Value::from(i));
            if let Some(m) = self.lower(part, &id, inner, props) {
                members.push(m);
            }
        }
        if let Some(node) = self.out.graph.node_mut(&id) {
            if let NodePayload::Structure(p) = &mut node.payload {
                p.members = members;
            }
        }
        id
    }

    fn named_builtin(&mut self, name: &str) -> NodeId {
        if let Some(id) = self.out.graph.lookup(NodeKind::TypeDefinition, name) {
            return id.clone();
        }
        self.out.graph.add_node(
            NodeKind::TypeDefinition,
            name,
            None,
            NodePayload::TypeDefinition(TypeDefPayload::default()),
        )
    }
}

fn literal_kind(value: &Value) -> PrimitiveKind {
    match value {
        Value::String(_) => PrimitiveKind::String,
        Value::Bool(_) => PrimitiveKind::Boolean,
        Value::Number(n) if n.is_i64() || n.is_u64() => PrimitiveKind::Integer,
        Value::Number(_) => PrimitiveKind::Number,
        _ => PrimitiveKind::Null,
    }
}

/// `Promise<T>` → `T`; anything else unchanged.
pub fn unwrap_promise(ty: &TypeExpr) -> &TypeExpr {
    match ty {
        TypeExpr::Reference { name, args } if name == "Promise" => {
            args.first().map(unwrap_promise).unwrap_or(ty)
        }
        _ => ty,
    }
}

/// Convenience wrapper: build a graph from units with the default wrappers.
pub fn build_graph(units: &[DeclarationUnit], resolver: &dyn TypeResolver) -> BuildOutput {
    let wrappers = WrapperRegistry::default();
    GraphBuilder::new(resolver, &wrappers).build(units)
}
