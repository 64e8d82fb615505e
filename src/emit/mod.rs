//! # Emit Module
//!
//! Turns the final graph into the two build artifacts: the OpenAPI 3.1 schema
//! document and the binding manifest. `validators.json` is written alongside in
//! precompiled validation mode. Pruning runs on the emitted JSON, after both
//! documents are assembled.

pub mod manifest;
pub mod openapi;
pub mod prune;
pub mod validators;

pub use manifest::{
    manifest_document, schema_hash, HttpBinding, Manifest, ManifestOperation, ManifestResponse,
    ValidationMode, ValidationSection, MANIFEST_VERSION,
};
pub use openapi::{collect_operations, openapi_document, CompiledOperation, DocumentInfo};
pub use prune::{prune_unused, reachable_components};
pub use validators::{
    arg_schema, bundle, location_schema, operation_validators, precompiled_validators,
    resolve_component, resolve_pointer,
};

/// Schema document file name inside the output directory.
pub const OPENAPI_FILE: &str = "openapi.json";
/// Manifest file name inside the output directory.
pub const MANIFEST_FILE: &str = "manifest.json";
/// Precompiled validators file name inside the output directory.
pub const VALIDATORS_FILE: &str = "validators.json";
