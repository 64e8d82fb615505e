//! # Schema Module
//!
//! Translation of statically known types into JSON-Schema-like [`Schema`] values,
//! independent of the graph IR.
//!
//! - [`translate`]: the recursion-guarded [`TypeTranslator`]
//! - [`wrappers`]: pluggable ORM relation wrapper unwrapping
//! - [`naming`]: component naming and the numeric identifier rule
//! - [`example`]: placeholder example values derived from a schema

pub mod example;
pub mod naming;
pub mod translate;
mod types;
pub mod wrappers;

pub use example::example_value;
pub use naming::{component_name, is_identifier_like};
pub use translate::{response_schema, TranslationState, TypeTranslator};
pub use types::{Schema, COMPONENTS_PREFIX};
pub use wrappers::{OrmWrapperAdapter, RelationKind, WrapperAdapter, WrapperRegistry};
