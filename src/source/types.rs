use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// One file's worth of declarations, as reported by the host type system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeclarationUnit {
    /// Source file the declarations were read from
    pub file: String,
    #[serde(default)]
    pub declarations: Vec<Declaration>,
}

/// A top-level declaration inside a [`DeclarationUnit`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Declaration {
    Class(ClassDecl),
    Interface(InterfaceDecl),
    Alias(AliasDecl),
    Enum(EnumDecl),
}

impl Declaration {
    pub fn name(&self) -> &str {
        match self {
            Declaration::Class(c) => &c.name,
            Declaration::Interface(i) => &i.name,
            Declaration::Alias(a) => &a.name,
            Declaration::Enum(e) => &e.name,
        }
    }

    pub fn tags(&self) -> &[String] {
        match self {
            Declaration::Class(c) => &c.tags,
            Declaration::Interface(i) => &i.tags,
            Declaration::Alias(a) => &a.tags,
            Declaration::Enum(e) => &e.tags,
        }
    }

    pub fn line(&self) -> Option<u32> {
        match self {
            Declaration::Class(c) => c.line,
            Declaration::Interface(i) => i.line,
            Declaration::Alias(a) => a.line,
            Declaration::Enum(e) => e.line,
        }
    }

    /// Generic parameter names (`Page<T>` → `["T"]`).
    pub fn type_params(&self) -> &[String] {
        match self {
            Declaration::Class(c) => &c.type_params,
            Declaration::Interface(i) => &i.type_params,
            Declaration::Alias(a) => &a.type_params,
            Declaration::Enum(_) => &[],
        }
    }

    /// Named members, empty for aliases and enums.
    pub fn members(&self) -> &[Member] {
        match self {
            Declaration::Class(c) => &c.members,
            Declaration::Interface(i) => &i.members,
            Declaration::Alias(_) | Declaration::Enum(_) => &[],
        }
    }

    /// Names of the declarations this one extends.
    pub fn extends(&self) -> Vec<&str> {
        match self {
            Declaration::Class(c) => c.extends.iter().map(String::as_str).collect(),
            Declaration::Interface(i) => i.extends.iter().map(String::as_str).collect(),
            Declaration::Alias(_) | Declaration::Enum(_) => Vec::new(),
        }
    }

    pub fn shape(&self) -> DeclShape {
        match self {
            Declaration::Class(_) => DeclShape::Class,
            Declaration::Interface(_) => DeclShape::Interface,
            Declaration::Alias(_) => DeclShape::Alias,
            Declaration::Enum(_) => DeclShape::Enum,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DeclShape {
    Class,
    Interface,
    Alias,
    Enum,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassDecl {
    pub name: String,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
    #[serde(default)]
    pub type_params: Vec<String>,
    #[serde(default)]
    pub extends: Option<String>,
    #[serde(default)]
    pub members: Vec<Member>,
    #[serde(default)]
    pub methods: Vec<MethodDecl>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub line: Option<u32>,
}

impl ClassDecl {
    pub fn annotation(&self, name: &str) -> Option<&Annotation> {
        self.annotations.iter().find(|a| a.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterfaceDecl {
    pub name: String,
    #[serde(default)]
    pub type_params: Vec<String>,
    #[serde(default)]
    pub extends: Vec<String>,
    #[serde(default)]
    pub members: Vec<Member>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub line: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AliasDecl {
    pub name: String,
    #[serde(default)]
    pub type_params: Vec<String>,
    pub target: TypeExpr,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub line: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EnumDecl {
    pub name: String,
    #[serde(default)]
    pub members: Vec<EnumMember>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub line: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumMember {
    pub name: String,
    pub value: Value,
}

/// A named property of a class, interface or object literal type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: TypeExpr,
    #[serde(default)]
    pub optional: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MethodDecl {
    pub name: String,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
    #[serde(default)]
    pub params: Vec<ParamDecl>,
    #[serde(default = "TypeExpr::void")]
    pub returns: TypeExpr,
    #[serde(default)]
    pub line: Option<u32>,
}

impl MethodDecl {
    pub fn annotation(&self, name: &str) -> Option<&Annotation> {
        self.annotations.iter().find(|a| a.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamDecl {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: TypeExpr,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
}

impl ParamDecl {
    pub fn annotation(&self, name: &str) -> Option<&Annotation> {
        self.annotations.iter().find(|a| a.name == name)
    }

    pub fn has_annotation(&self, name: &str) -> bool {
        self.annotation(name).is_some()
    }
}

/// A decorator-style marker (`Controller("/users")`, `Get("/{id}")`, `DeepObject`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub name: String,
    #[serde(default)]
    pub args: Vec<Value>,
}

impl Annotation {
    pub fn new(name: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }

    /// First argument as a string, if present.
    pub fn first_str(&self) -> Option<&str> {
        self.args.first().and_then(Value::as_str)
    }

    /// All string arguments.
    pub fn strings(&self) -> Vec<String> {
        self.args
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrimitiveKind {
    String,
    Number,
    Integer,
    Boolean,
    Bigint,
    Null,
    Undefined,
    Void,
    Any,
    Unknown,
}

impl PrimitiveKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PrimitiveKind::String => "string",
            PrimitiveKind::Number => "number",
            PrimitiveKind::Integer => "integer",
            PrimitiveKind::Boolean => "boolean",
            PrimitiveKind::Bigint => "bigint",
            PrimitiveKind::Null => "null",
            PrimitiveKind::Undefined => "undefined",
            PrimitiveKind::Void => "void",
            PrimitiveKind::Any => "any",
            PrimitiveKind::Unknown => "unknown",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "string" => PrimitiveKind::String,
            "number" => PrimitiveKind::Number,
            "integer" => PrimitiveKind::Integer,
            "boolean" => PrimitiveKind::Boolean,
            "bigint" => PrimitiveKind::Bigint,
            "null" => PrimitiveKind::Null,
            "undefined" => PrimitiveKind::Undefined,
            "void" => PrimitiveKind::Void,
            "any" => PrimitiveKind::Any,
            "unknown" => PrimitiveKind::Unknown,
            _ => return None,
        })
    }

    /// `null`, `undefined` and `void` carry no value of their own.
    pub fn is_empty_value(self) -> bool {
        matches!(
            self,
            PrimitiveKind::Null | PrimitiveKind::Undefined | PrimitiveKind::Void
        )
    }
}

/// A statically known type, as resolved by the host type system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum TypeExpr {
    Primitive {
        name: PrimitiveKind,
    },
    Literal {
        value: Value,
    },
    Date,
    Array {
        items: Box<TypeExpr>,
    },
    Object {
        #[serde(default)]
        members: Vec<Member>,
    },
    Reference {
        name: String,
        #[serde(default)]
        args: Vec<TypeExpr>,
    },
    Union {
        variants: Vec<TypeExpr>,
    },
    Intersection {
        parts: Vec<TypeExpr>,
    },
    Record {
        key: Box<TypeExpr>,
        value: Box<TypeExpr>,
    },
}

impl Default for TypeExpr {
    fn default() -> Self {
        TypeExpr::void()
    }
}

impl TypeExpr {
    pub fn primitive(kind: PrimitiveKind) -> Self {
        TypeExpr::Primitive { name: kind }
    }

    pub fn string() -> Self {
        Self::primitive(PrimitiveKind::String)
    }

    pub fn number() -> Self {
        Self::primitive(PrimitiveKind::Number)
    }

    pub fn boolean() -> Self {
        Self::primitive(PrimitiveKind::Boolean)
    }

    pub fn void() -> Self {
        Self::primitive(PrimitiveKind::Void)
    }

    pub fn named(name: impl Into<String>) -> Self {
        TypeExpr::Reference {
            name: name.into(),
            args: Vec::new(),
        }
    }

    pub fn generic(name: impl Into<String>, args: Vec<TypeExpr>) -> Self {
        TypeExpr::Reference {
            name: name.into(),
            args,
        }
    }

    pub fn array(items: TypeExpr) -> Self {
        TypeExpr::Array {
            items: Box::new(items),
        }
    }

    pub fn record(value: TypeExpr) -> Self {
        TypeExpr::Record {
            key: Box::new(TypeExpr::string()),
            value: Box::new(value),
        }
    }

    pub fn as_primitive(&self) -> Option<PrimitiveKind> {
        match self {
            TypeExpr::Primitive { name } => Some(*name),
            _ => None,
        }
    }

    /// Scalars serialize to a single path/query/header token.
    pub fn is_scalar(&self) -> bool {
        match self {
            TypeExpr::Primitive { .. } | TypeExpr::Literal { .. } | TypeExpr::Date => true,
            TypeExpr::Union { variants } => variants.iter().all(TypeExpr::is_scalar),
            _ => false,
        }
    }

    /// Strip `null`/`undefined` variants off a union (`T | null` → `T`).
    pub fn non_nullable(&self) -> &TypeExpr {
        if let TypeExpr::Union { variants } = self {
            let mut rest = variants
                .iter()
                .filter(|v| !v.as_primitive().is_some_and(PrimitiveKind::is_empty_value));
            if let (Some(only), None) = (rest.next(), rest.next()) {
                return only;
            }
        }
        self
    }
}

impl fmt::Display for TypeExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeExpr::Primitive { name } => f.write_str(name.as_str()),
            TypeExpr::Literal { value } => write!(f, "{value}"),
            TypeExpr::Date => f.write_str("Date"),
            TypeExpr::Array { items } => write!(f, "{items}[]"),
            TypeExpr::Object { members } => {
                f.write_str("{ ")?;
                for m in members {
                    write!(f, "{}{}: {}; ", m.name, if m.optional { "?" } else { "" }, m.ty)?;
                }
                f.write_str("}")
            }
            TypeExpr::Reference { name, args } => {
                f.write_str(name)?;
                if !args.is_empty() {
                    f.write_str("<")?;
                    for (i, a) in args.iter().enumerate() {
                        if i > 0 {
                            f.write_str(", ")?;
                        }
                        write!(f, "{a}")?;
                    }
                    f.write_str(">")?;
                }
                Ok(())
            }
            TypeExpr::Union { variants } => join(f, variants, " | "),
            TypeExpr::Intersection { parts } => join(f, parts, " & "),
            TypeExpr::Record { key, value } => write!(f, "Record<{key}, {value}>"),
        }
    }
}

fn join(f: &mut fmt::Formatter<'_>, items: &[TypeExpr], sep: &str) -> fmt::Result {
    for (i, t) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        write!(f, "{t}")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_type_expr_deserializes_tagged() {
        let t: TypeExpr = serde_json::from_value(json!({
            "kind": "reference",
            "name": "Page",
            "args": [{"kind": "reference", "name": "User"}]
        }))
        .unwrap();
        assert_eq!(t.to_string(), "Page<User>");
    }

    #[test]
    fn test_non_nullable_strips_null() {
        let t = TypeExpr::Union {
            variants: vec![
                TypeExpr::named("User"),
                TypeExpr::primitive(PrimitiveKind::Null),
            ],
        };
        assert_eq!(t.non_nullable(), &TypeExpr::named("User"));
    }

    #[test]
    fn test_scalar_union_of_literals() {
        let t = TypeExpr::Union {
            variants: vec![
                TypeExpr::Literal { value: json!("a") },
                TypeExpr::Literal { value: json!("b") },
            ],
        };
        assert!(t.is_scalar());
        assert!(!TypeExpr::named("User").is_scalar());
    }
}
