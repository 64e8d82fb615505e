use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::collections::{BTreeMap, BTreeSet};

/// Prefix of component references in the emitted schema document.
pub const COMPONENTS_PREFIX: &str = "#/components/schemas/";

/// Intermediate JSON-Schema-like value produced by the translator.
///
/// Only the keywords the translator emits are modelled; anything else (vendor
/// extensions such as `x-relation`) lives in `extensions` and is flattened back
/// into the object on serialization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schema {
    #[serde(rename = "$ref", default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub ty: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<IndexMap<String, Schema>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<Schema>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_properties: Option<Box<Schema>>,
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub any_of: Option<Vec<Schema>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub one_of: Option<Vec<Schema>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub all_of: Option<Vec<Schema>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<Number>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<Number>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub example: Option<Value>,
    #[serde(flatten)]
    pub extensions: BTreeMap<String, Value>,
}

impl Schema {
    /// `{}`: accepts anything. Used wherever a type cannot be resolved.
    pub fn any() -> Self {
        Self::default()
    }

    pub fn typed(ty: &str) -> Self {
        Self {
            ty: Some(ty.to_string()),
            ..Default::default()
        }
    }

    pub fn string_format(format: &str) -> Self {
        Self {
            format: Some(format.to_string()),
            ..Self::typed("string")
        }
    }

    pub fn reference(component: &str) -> Self {
        Self {
            reference: Some(format!("{COMPONENTS_PREFIX}{component}")),
            ..Default::default()
        }
    }

    pub fn array(items: Schema) -> Self {
        Self {
            items: Some(Box::new(items)),
            ..Self::typed("array")
        }
    }

    pub fn object(properties: IndexMap<String, Schema>, required: Vec<String>) -> Self {
        Self {
            properties: Some(properties),
            required,
            ..Self::typed("object")
        }
    }

    pub fn record(value: Schema) -> Self {
        Self {
            additional_properties: Some(Box::new(value)),
            ..Self::typed("object")
        }
    }

    /// `T | null` in JSON Schema 2020-12 form.
    pub fn nullable(inner: Schema) -> Self {
        Self {
            any_of: Some(vec![inner, Self::typed("null")]),
            ..Default::default()
        }
    }

    pub fn with_extension(mut self, key: &str, value: Value) -> Self {
        self.extensions.insert(key.to_string(), value);
        self
    }

    pub fn is_any(&self) -> bool {
        self == &Self::default()
    }

    /// Component name behind a local `$ref`.
    pub fn ref_name(&self) -> Option<&str> {
        self.reference
            .as_deref()
            .and_then(|r| r.strip_prefix(COMPONENTS_PREFIX))
    }

    pub fn is_type(&self, ty: &str) -> bool {
        self.ty.as_deref() == Some(ty)
    }

    pub fn is_numeric(&self) -> bool {
        self.is_type("number") || self.is_type("integer")
    }

    /// Has properties or additionalProperties, is an array of such, or an
    /// `allOf` with such a branch. `$ref`s are followed through `components`.
    pub fn is_object_like(&self, components: &IndexMap<String, Schema>) -> bool {
        self.object_like_depth(components, 0)
    }

    fn object_like_depth(&self, components: &IndexMap<String, Schema>, depth: usize) -> bool {
        if depth > 16 {
            return false;
        }
        if let Some(target) = self.ref_name().and_then(|n| components.get(n)) {
            return target.object_like_depth(components, depth + 1);
        }
        if self.properties.is_some() || self.additional_properties.is_some() {
            return true;
        }
        if let Some(items) = &self.items {
            if items.object_like_depth(components, depth + 1) {
                return true;
            }
        }
        self.all_of.as_ref().is_some_and(|branches| {
            branches
                .iter()
                .any(|b| b.object_like_depth(components, depth + 1))
        })
    }

    /// Follow a `$ref` to its component; non-refs resolve to themselves.
    pub fn resolve<'a>(&'a self, components: &'a IndexMap<String, Schema>) -> &'a Schema {
        let mut current = self;
        for _ in 0..16 {
            match current.ref_name().and_then(|n| components.get(n)) {
                Some(next) => current = next,
                None => break,
            }
        }
        current
    }

    /// Direct subschemas.
    pub fn children(&self) -> impl Iterator<Item = &Schema> {
        self.properties
            .iter()
            .flat_map(|p| p.values())
            .chain(self.items.as_deref())
            .chain(self.additional_properties.as_deref())
            .chain(self.any_of.iter().flatten())
            .chain(self.one_of.iter().flatten())
            .chain(self.all_of.iter().flatten())
    }

    /// Every component name referenced anywhere inside this schema.
    pub fn refs(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        let mut stack = vec![self];
        while let Some(s) = stack.pop() {
            if let Some(name) = s.ref_name() {
                out.insert(name.to_string());
            }
            stack.extend(s.children());
        }
        out
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
