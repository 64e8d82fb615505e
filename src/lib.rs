//! # routeforge
//!
//! **routeforge** compiles annotated handler declarations (controllers, routed methods and the
//! data types they use) into an OpenAPI 3.1 document plus a binding manifest, and ships the
//! runtime half that uses those artifacts to bind, coerce and validate incoming requests.
//!
//! ## Architecture
//!
//! The library is organized into a build side and a runtime side:
//!
//! - **[`source`]** - Declaration-unit input model and loading
//! - **[`graph`]** - Graph IR, registry, cycle detection, IR transforms and schema partitioning
//! - **[`schema`]** - Type-to-schema translation, naming and ORM wrapper unwrapping
//! - **[`binding`]** - Parameter location inference and per-argument binding plans
//! - **[`emit`]** - OpenAPI document, manifest, pruning and precompiled validators
//! - **[`compiler`]** - The end-to-end compile pipeline
//! - **[`linter`]** - Diagnostics over the IR
//! - **[`runtime`]** - Artifact loading, query parsing, coercion, validation and routing
//! - **[`cli`]** - `compile`, `lint` and `partition` commands
//!
//! ### Compile Flow
//!
//! ```mermaid
//! sequenceDiagram
//!     participant CLI
//!     participant Source as source::load_units
//!     participant Graph as graph::GraphBuilder
//!     participant Emit as emit
//!     participant FS as File System
//!
//!     CLI->>Source: load_units(input)
//!     Source-->>CLI: Vec<DeclarationUnit>
//!     CLI->>Graph: build(units)
//!     Graph->>Graph: dedup, inline, flatten
//!     Graph-->>Emit: IrGraph + Registry
//!     Emit->>Emit: openapi, prune, partition
//!     Emit->>Emit: manifest (hash of final document)
//!     Emit->>FS: openapi.json, manifest.json, validators.json
//! ```
//!
//! ### Request Flow
//!
//! ```mermaid
//! sequenceDiagram
//!     participant Host
//!     participant Routes as runtime::RouteTable
//!     participant Binder as runtime::RequestBinder
//!     participant Cache as runtime::ValidatorCache
//!
//!     Host->>Routes: resolve(method, path, request)
//!     Routes->>Routes: match + middleware before()
//!     Routes->>Binder: bind(operation_id, request)
//!     Binder->>Binder: parse query, coerce, defaults
//!     Binder->>Cache: get_or_compile(hash, op, location)
//!     Cache-->>Binder: Validator
//!     Binder-->>Routes: Bound(args) or Invalid(errors)
//!     Routes-->>Host: Resolution
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use routeforge::compiler::Compiler;
//! use routeforge::config::CompilerConfig;
//! use routeforge::source::load_units;
//!
//! let units = load_units("decls/".as_ref())?;
//! let output = Compiler::new(CompilerConfig::default()).compile(&units)?;
//! output.write_to("build/api".as_ref())?;
//! ```
//!
//! Validation failures at runtime are reported all at once with status 400, one entry per
//! field, each carrying a JSON-pointer-like path such as `/body/email` or `/query/page`.

pub mod binding;
pub mod cli;
pub mod compiler;
pub mod config;
pub mod emit;
pub mod graph;
pub mod linter;
pub mod logging;
pub mod runtime;
pub mod schema;
pub mod source;
pub mod validator;

pub use compiler::{CompileOutput, CompileReport, Compiler};
pub use config::CompilerConfig;
pub use runtime::{ArtifactCache, BindOutcome, BindRequest, RequestBinder, RouteTable};
