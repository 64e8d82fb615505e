//! Type-to-schema translation.
//!
//! [`TypeTranslator`] turns one statically known [`TypeExpr`] into a [`Schema`].
//! Named declarations are registered as components and referenced by `$ref`.
//! Each component name moves through [`TranslationState`]: a name that is
//! `InProgress` is being expanded further up the stack, so meeting it again
//! always yields a `$ref` instead of expanding it a second time. This is what
//! makes self-referential and mutually recursive types terminate.

use super::naming::{component_name, is_identifier_like};
use super::types::Schema;
use super::wrappers::{WrapperRegistry, RELATION_EXTENSION};
use crate::source::{Declaration, Member, PrimitiveKind, TypeExpr, TypeResolver};
use indexmap::IndexMap;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum TranslationState {
    NotStarted,
    InProgress,
    /// Finished: the schema to use at every site (a `$ref`, or the expansion
    /// itself for inlined types).
    Done(Schema),
}

pub struct TypeTranslator<'a> {
    resolver: &'a dyn TypeResolver,
    wrappers: &'a WrapperRegistry,
    states: HashMap<String, TranslationState>,
    components: IndexMap<String, Schema>,
    /// Names to expand at their use site instead of registering.
    inline: HashSet<String>,
    /// Inline candidates met while still in progress; they must stay components.
    pinned: HashSet<String>,
    /// Generic parameter bindings, innermost last.
    bindings: Vec<HashMap<String, TypeExpr>>,
    unresolved: BTreeSet<String>,
}

impl<'a> TypeTranslator<'a> {
    pub fn new(resolver: &'a dyn TypeResolver, wrappers: &'a WrapperRegistry) -> Self {
        Self {
            resolver,
            wrappers,
            states: HashMap::new(),
            components: IndexMap::new(),
            inline: HashSet::new(),
            pinned: HashSet::new(),
            bindings: Vec::new(),
            unresolved: BTreeSet::new(),
        }
    }

    pub fn with_inline(mut self, names: impl IntoIterator<Item = String>) -> Self {
        self.inline.extend(names);
        self
    }

    pub fn state(&self, component: &str) -> TranslationState {
        self.states
            .get(component)
            .cloned()
            .unwrap_or(TranslationState::NotStarted)
    }

    pub fn components(&self) -> &IndexMap<String, Schema> {
        &self.components
    }

    pub fn into_components(self) -> IndexMap<String, Schema> {
        self.components
    }

    /// Names referenced but never declared.
    pub fn unresolved(&self) -> &BTreeSet<String> {
        &self.unresolved
    }

    pub fn translate(&mut self, expr: &TypeExpr) -> Schema {
        self.tr(expr, &[])
    }

    /// Translate the type of a named field; the name feeds the numeric
    /// identifier rule.
    pub fn translate_field(&mut self, expr: &TypeExpr, field: &str) -> Schema {
        self.tr(expr, &[field])
    }

    /// Translate a declared type by name, registering it as a component.
    pub fn translate_named(&mut self, name: &str) -> Schema {
        self.reference(name, &[], &[])
    }

    fn tr(&mut self, expr: &TypeExpr, names: &[&str]) -> Schema {
        match expr {
            TypeExpr::Primitive { name } => primitive(*name, names),
            TypeExpr::Literal { value } => literal(value),
            TypeExpr::Date => Schema::string_format("date-time"),
            TypeExpr::Array { items } => Schema::array(self.tr(items, &[])),
            TypeExpr::Object { members } => self.object(members),
            TypeExpr::Record { value, .. } => Schema::record(self.tr(value, &[])),
            TypeExpr::Intersection { parts } => Schema {
                all_of: Some(parts.iter().map(|p| self.tr(p, names)).collect()),
                ..Default::default()
            },
            TypeExpr::Union { variants } => self.union(expr, variants, names),
            TypeExpr::Reference { name, args } => self.reference(name, args, names),
        }
    }

    fn union(&mut self, expr: &TypeExpr, variants: &[TypeExpr], names: &[&str]) -> Schema {
        let inner = expr.non_nullable();
        if !std::ptr::eq(inner, expr) {
            let has_null = variants
                .iter()
                .any(|v| v.as_primitive() == Some(PrimitiveKind::Null));
            let schema = self.tr(inner, names);
            // `T | undefined` only makes the field optional.
            return if has_null {
                Schema::nullable(schema)
            } else {
                schema
            };
        }
        let literals: Option<Vec<Value>> = variants
            .iter()
            .map(|v| match v {
                TypeExpr::Literal { value } => Some(value.clone()),
                _ => None,
            })
            .collect();
        if let Some(values) = literals {
            return enum_schema(values);
        }
        Schema {
            any_of: Some(variants.iter().map(|v| self.tr(v, names)).collect()),
            ..Default::default()
        }
    }

    fn object(&mut self, members: &[Member]) -> Schema {
        let mut properties = IndexMap::new();
        let mut required = Vec::new();
        for member in members {
            let mut schema = self.tr(&member.ty, &[&member.name]);
            if schema.description.is_none() {
                schema.description = member.description.clone();
            }
            if !member.optional && !accepts_undefined(&member.ty) {
                required.push(member.name.clone());
            }
            properties.insert(member.name.clone(), schema);
        }
        Schema::object(properties, required)
    }

    fn bound(&self, name: &str) -> Option<TypeExpr> {
        self.bindings.last().and_then(|b| b.get(name)).cloned()
    }

    fn reference(&mut self, name: &str, args: &[TypeExpr], names: &[&str]) -> Schema {
        if args.is_empty() {
            if let Some(bound) = self.bound(name) {
                // Bound arguments were written in the caller's scope.
                let scope = self.bindings.pop();
                let schema = self.tr(&bound, names);
                if let Some(scope) = scope {
                    self.bindings.push(scope);
                }
                return schema;
            }
        }
        if let Some(unwrapped) = self.wrappers.unwrap(name, args) {
            let extension = unwrapped.extension();
            let Some(target) = unwrapped.target else {
                warn!(wrapper = %name, "Relation wrapper without target type, emitting empty schema");
                return Schema::any().with_extension(RELATION_EXTENSION, extension);
            };
            let inner = self.tr(target, &[]);
            let schema = if unwrapped.relation.is_collection() {
                Schema::array(inner)
            } else {
                inner
            };
            return schema.with_extension(RELATION_EXTENSION, extension);
        }
        match (name, args) {
            ("Array", [item]) => return Schema::array(self.tr(item, &[])),
            ("Promise" | "Readonly", [inner]) => return self.tr(inner, names),
            ("Record", [_, value]) => return Schema::record(self.tr(value, &[])),
            ("Partial", [inner]) => {
                let mut schema = self.expanded(inner);
                schema.required.clear();
                return schema;
            }
            ("Pick", [inner, keys]) => {
                let keep = literal_keys(keys);
                return self.filtered(inner, |k| keep.contains(k));
            }
            ("Omit", [inner, keys]) => {
                let drop = literal_keys(keys);
                return self.filtered(inner, |k| !drop.contains(k));
            }
            _ => {}
        }
        let Some(decl) = self.resolver.resolve(name).cloned() else {
            if name == "Date" {
                return Schema::string_format("date-time");
            }
            if self.unresolved.insert(name.to_string()) {
                warn!(type_name = %name, "Unresolved type, emitting empty schema");
            }
            return Schema::any();
        };
        let args: Vec<TypeExpr> = args.iter().map(|a| self.substitute(a)).collect();
        self.named(&decl, &args, names)
    }

    fn named(&mut self, decl: &Declaration, args: &[TypeExpr], names: &[&str]) -> Schema {
        // Aliases of scalars stay inline; their name joins the numeric rule.
        if let Declaration::Alias(alias) = decl {
            if alias.type_params.is_empty() && alias.target.is_scalar() {
                let mut scoped: Vec<&str> = names.to_vec();
                scoped.push(&alias.name);
                return self.tr(&alias.target, &scoped);
            }
        }
        let component = component_name(decl.name(), args);
        match self.state(&component) {
            TranslationState::Done(schema) => return schema,
            TranslationState::InProgress => {
                debug!(component = %component, "Recursive reference, emitting $ref");
                self.pinned.insert(component.clone());
                return Schema::reference(&component);
            }
            TranslationState::NotStarted => {}
        }
        self.states
            .insert(component.clone(), TranslationState::InProgress);

        let scope: HashMap<String, TypeExpr> = decl
            .type_params()
            .iter()
            .cloned()
            .zip(args.iter().cloned())
            .collect();
        self.bindings.push(scope);
        let body = self.expand(decl);
        self.bindings.pop();

        let result = if self.inline.contains(decl.name()) && !self.pinned.contains(&component) {
            body
        } else {
            self.components.insert(component.clone(), body);
            Schema::reference(&component)
        };
        self.states
            .insert(component, TranslationState::Done(result.clone()));
        result
    }

    fn expand(&mut self, decl: &Declaration) -> Schema {
        match decl {
            Declaration::Class(_) | Declaration::Interface(_) => {
                let members = self.collect_members(decl);
                self.object(&members)
            }
            Declaration::Alias(alias) => self.tr(&alias.target, &[&alias.name]),
            Declaration::Enum(e) => {
                let values = e.members.iter().map(|m| m.value.clone()).collect();
                let names: Vec<Value> = e
                    .members
                    .iter()
                    .map(|m| Value::String(m.name.clone()))
                    .collect();
                enum_schema(values).with_extension("x-enum-varnames", Value::Array(names))
            }
        }
    }

    /// Own members plus inherited ones; a member declared closer to `decl` wins.
    fn collect_members(&self, decl: &Declaration) -> Vec<Member> {
        let mut visited = HashSet::new();
        let mut chain = Vec::new();
        self.ancestry(decl, &mut visited, &mut chain);
        let mut merged: IndexMap<String, Member> = IndexMap::new();
        for d in chain.iter().rev() {
            for m in d.members() {
                merged.insert(m.name.clone(), m.clone());
            }
        }
        merged.into_values().collect()
    }

    fn ancestry(&self, decl: &Declaration, visited: &mut HashSet<String>, chain: &mut Vec<Declaration>) {
        if !visited.insert(decl.name().to_string()) {
            return;
        }
        chain.push(decl.clone());
        for parent in decl.extends() {
            match self.resolver.resolve(parent) {
                Some(p) => self.ancestry(p, visited, chain),
                None => warn!(type_name = %decl.name(), parent, "Unresolved base type"),
            }
        }
    }

    /// The object schema behind `expr`, following a component `$ref`.
    fn expanded(&mut self, expr: &TypeExpr) -> Schema {
        let schema = self.tr(expr, &[]);
        schema.resolve(&self.components).clone()
    }

    fn filtered(&mut self, expr: &TypeExpr, keep: impl Fn(&str) -> bool) -> Schema {
        let mut schema = self.expanded(expr);
        if let Some(props) = schema.properties.as_mut() {
            props.retain(|k, _| keep(k));
        }
        schema.required.retain(|k| keep(k));
        schema
    }

    fn substitute(&self, expr: &TypeExpr) -> TypeExpr {
        match expr {
            TypeExpr::Reference { name, args } if args.is_empty() => {
                self.bound(name).unwrap_or_else(|| expr.clone())
            }
            TypeExpr::Reference { name, args } => TypeExpr::Reference {
                name: name.clone(),
                args: args.iter().map(|a| self.substitute(a)).collect(),
            },
            TypeExpr::Array { items } => TypeExpr::array(self.substitute(items)),
            other => other.clone(),
        }
    }
}

fn primitive(kind: PrimitiveKind, names: &[&str]) -> Schema {
    match kind {
        PrimitiveKind::String => Schema::typed("string"),
        PrimitiveKind::Number if names.iter().any(|n| is_identifier_like(n)) => {
            Schema::typed("integer")
        }
        PrimitiveKind::Number => Schema::typed("number"),
        PrimitiveKind::Integer => Schema::typed("integer"),
        PrimitiveKind::Boolean => Schema::typed("boolean"),
        PrimitiveKind::Bigint => Schema {
            pattern: Some(r"^-?\d+$".to_string()),
            ..Schema::string_format("int64")
        },
        PrimitiveKind::Null => Schema::typed("null"),
        PrimitiveKind::Undefined | PrimitiveKind::Void | PrimitiveKind::Any | PrimitiveKind::Unknown => {
            Schema::any()
        }
    }
}

fn json_type(value: &Value) -> Option<&'static str> {
    match value {
        Value::String(_) => Some("string"),
        Value::Bool(_) => Some("boolean"),
        Value::Number(n) if n.is_i64() || n.is_u64() => Some("integer"),
        Value::Number(_) => Some("number"),
        Value::Null => Some("null"),
        _ => None,
    }
}

fn literal(value: &Value) -> Schema {
    Schema {
        ty: json_type(value).map(str::to_string),
        enum_values: Some(vec![value.clone()]),
        ..Default::default()
    }
}

/// `enum` with a `type` when every value shares one JSON type.
fn enum_schema(values: Vec<Value>) -> Schema {
    let mut types: BTreeSet<&str> = values.iter().filter_map(json_type).collect();
    if types.contains("integer") && types.contains("number") {
        types.remove("integer");
    }
    let ty = if types.len() == 1 {
        types.into_iter().next().map(str::to_string)
    } else {
        None
    };
    if ty.as_deref() == Some("boolean") && values.len() == 2 {
        return Schema::typed("boolean");
    }
    Schema {
        ty,
        enum_values: Some(values),
        ..Default::default()
    }
}

fn accepts_undefined(ty: &TypeExpr) -> bool {
    match ty {
        TypeExpr::Union { variants } => variants
            .iter()
            .any(|v| v.as_primitive() == Some(PrimitiveKind::Undefined)),
        _ => false,
    }
}

/// Keys named by a string literal or a union of string literals (`"a" | "b"`).
fn literal_keys(expr: &TypeExpr) -> HashSet<String> {
    match expr {
        TypeExpr::Literal { value } => value.as_str().map(str::to_string).into_iter().collect(),
        TypeExpr::Union { variants } => variants.iter().flat_map(literal_keys).collect(),
        _ => HashSet::new(),
    }
}

/// Schema for one operation's declared return type, `None` when it returns nothing.
pub fn response_schema(translator: &mut TypeTranslator<'_>, returns: &TypeExpr) -> Option<Schema> {
    let ty = crate::graph::unwrap_promise(returns);
    match ty.as_primitive() {
        Some(PrimitiveKind::Void | PrimitiveKind::Undefined) => None,
        _ => Some(translator.translate(ty)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{DeclarationIndex, DeclarationUnit};
    use serde_json::json;

    fn index(decls: Value) -> DeclarationIndex {
        let unit: DeclarationUnit =
            serde_json::from_value(json!({"file": "t.ts", "declarations": decls})).unwrap();
        DeclarationIndex::from_units(&[unit])
    }

    #[test]
    fn test_numeric_identifier_rule() {
        let idx = index(json!([
            {"kind": "interface", "name": "User", "members": [
                {"name": "userId", "type": {"kind": "primitive", "name": "number"}},
                {"name": "score", "type": {"kind": "primitive", "name": "number"}}
            ]}
        ]));
        let wrappers = WrapperRegistry::default();
        let mut t = TypeTranslator::new(&idx, &wrappers);
        assert_eq!(t.translate_named("User"), Schema::reference("User"));
        let user = t.components()["User"].to_value();
        assert_eq!(user["properties"]["userId"], json!({"type": "integer"}));
        assert_eq!(user["properties"]["score"], json!({"type": "number"}));
        assert_eq!(user["required"], json!(["userId", "score"]));
    }

    #[test]
    fn test_self_reference_terminates_with_ref() {
        let idx = index(json!([
            {"kind": "interface", "name": "Node", "members": [
                {"name": "children", "type": {"kind": "array", "items": {"kind": "reference", "name": "Node"}}},
                {"name": "parent", "optional": true, "type": {"kind": "reference", "name": "Node"}}
            ]}
        ]));
        let wrappers = WrapperRegistry::default();
        let mut t = TypeTranslator::new(&idx, &wrappers);
        t.translate_named("Node");
        let node = t.components()["Node"].to_value();
        assert_eq!(node["properties"]["children"]["items"]["$ref"], "#/components/schemas/Node");
        assert_eq!(node["required"], json!(["children"]));
        assert!(matches!(t.state("Node"), TranslationState::Done(_)));
    }

    #[test]
    fn test_wrappers_and_builtins() {
        let idx = index(json!([
            {"kind": "interface", "name": "Post", "members": [
                {"name": "title", "type": {"kind": "primitive", "name": "string"}}
            ]},
            {"kind": "interface", "name": "Author", "members": [
                {"name": "posts", "type": {"kind": "reference", "name": "Collection",
                    "args": [{"kind": "reference", "name": "Post"}]}},
                {"name": "counts", "type": {"kind": "record",
                    "key": {"kind": "primitive", "name": "string"},
                    "value": {"kind": "primitive", "name": "number"}}},
                {"name": "big", "type": {"kind": "primitive", "name": "bigint"}},
                {"name": "joined", "type": {"kind": "date"}}
            ]}
        ]));
        let wrappers = WrapperRegistry::default();
        let mut t = TypeTranslator::new(&idx, &wrappers);
        t.translate_named("Author");
        let a = t.components()["Author"].to_value();
        assert_eq!(a["properties"]["posts"]["type"], "array");
        assert_eq!(a["properties"]["posts"]["items"]["$ref"], "#/components/schemas/Post");
        assert_eq!(a["properties"]["posts"]["x-relation"]["kind"], "hasMany");
        assert_eq!(a["properties"]["counts"]["additionalProperties"], json!({"type": "number"}));
        assert_eq!(
            a["properties"]["big"],
            json!({"type": "string", "format": "int64", "pattern": "^-?\\d+$"})
        );
        assert_eq!(a["properties"]["joined"], json!({"type": "string", "format": "date-time"}));
    }

    #[test]
    fn test_generic_instantiation_and_inheritance() {
        let idx = index(json!([
            {"kind": "interface", "name": "Base", "members": [
                {"name": "id", "type": {"kind": "primitive", "name": "number"}}
            ]},
            {"kind": "interface", "name": "User", "extends": ["Base"], "members": [
                {"name": "name", "type": {"kind": "primitive", "name": "string"}}
            ]},
            {"kind": "interface", "name": "Page", "typeParams": ["T"], "members": [
                {"name": "items", "type": {"kind": "array", "items": {"kind": "reference", "name": "T"}}},
                {"name": "totalItems", "type": {"kind": "primitive", "name": "number"}}
            ]}
        ]));
        let wrappers = WrapperRegistry::default();
        let mut t = TypeTranslator::new(&idx, &wrappers);
        let s = t.translate(&TypeExpr::generic("Page", vec![TypeExpr::named("User")]));
        assert_eq!(s, Schema::reference("Page_User"));
        let page = t.components()["Page_User"].to_value();
        assert_eq!(page["properties"]["items"]["items"]["$ref"], "#/components/schemas/User");
        assert_eq!(page["properties"]["totalItems"]["type"], "integer");
        let user = t.components()["User"].to_value();
        assert_eq!(user["required"], json!(["id", "name"]));
    }

    #[test]
    fn test_partial_pick_and_omit() {
        let idx = index(json!([
            {"kind": "interface", "name": "User", "members": [
                {"name": "id", "type": {"kind": "primitive", "name": "number"}},
                {"name": "name", "type": {"kind": "primitive", "name": "string"}},
                {"name": "email", "type": {"kind": "primitive", "name": "string"}}
            ]}
        ]));
        let wrappers = WrapperRegistry::default();
        let mut t = TypeTranslator::new(&idx, &wrappers);
        let user = TypeExpr::named("User");
        let keys = |names: &[&str]| TypeExpr::Union {
            variants: names
                .iter()
                .map(|n| TypeExpr::Literal { value: json!(n) })
                .collect(),
        };

        let pick = t
            .translate(&TypeExpr::generic("Pick", vec![user.clone(), keys(&["id", "name"])]))
            .to_value();
        assert_eq!(pick["properties"]["id"], json!({"type": "integer"}));
        assert!(pick["properties"].get("email").is_none());
        assert_eq!(pick["required"], json!(["id", "name"]));

        let omit = t
            .translate(&TypeExpr::generic(
                "Omit",
                vec![user.clone(), keys(&["id", "name"])],
            ))
            .to_value();
        let props: Vec<&String> = omit["properties"].as_object().unwrap().keys().collect();
        assert_eq!(props, vec!["email"]);
        assert_eq!(omit["required"], json!(["email"]));

        let single = t
            .translate(&TypeExpr::generic(
                "Omit",
                vec![user.clone(), TypeExpr::Literal { value: json!("email") }],
            ))
            .to_value();
        assert!(single["properties"].get("email").is_none());
        assert!(single["properties"].get("id").is_some());

        let partial = t
            .translate(&TypeExpr::generic("Partial", vec![user]))
            .to_value();
        assert_eq!(partial["properties"].as_object().unwrap().len(), 3);
        assert!(partial.get("required").is_none());
        // The named component itself keeps its required list
        assert_eq!(t.components()["User"].to_value()["required"], json!(["id", "name", "email"]));
    }

    #[test]
    fn test_unresolved_degrades_to_empty() {
        let idx = DeclarationIndex::new();
        let wrappers = WrapperRegistry::default();
        let mut t = TypeTranslator::new(&idx, &wrappers);
        assert!(t.translate(&TypeExpr::named("Ghost")).is_any());
        assert!(t.unresolved().contains("Ghost"));
    }

    #[test]
    fn test_inline_names_are_expanded_at_use_site() {
        let idx = index(json!([
            {"kind": "interface", "name": "Money", "members": [
                {"name": "amount", "type": {"kind": "primitive", "name": "number"}}
            ]}
        ]));
        let wrappers = WrapperRegistry::default();
        let mut t = TypeTranslator::new(&idx, &wrappers).with_inline(["Money".to_string()]);
        let s = t.translate_named("Money");
        assert!(s.properties.is_some());
        assert!(t.components().is_empty());
    }
}
