//! # Binding Module
//!
//! Parameter binding decided at compile time: where each handler argument is
//! read from, how it is serialized on the wire, and the manifest plan the
//! runtime binder follows without ever looking at source types again.

mod infer;
mod plan;
mod types;

pub use infer::{
    infer_location, infer_operation, join_route, path_params, schema_type, OperationPlan,
    ParameterObject, RequestBodyPlan, JSON_SCHEMA_EXTENSION,
};
pub use plan::{operation_pointer, pointer_segment, ArgBinding, ArgBindings};
pub use types::{ParameterLocation, Serialization};
