//! # Graph Module
//!
//! The intermediate representation the compiler works on, and everything that
//! analyses or rewrites it.
//!
//! ## Pipeline
//!
//! 1. [`builder`] scans declaration units into an [`IrGraph`] and fills the
//!    [`Registry`]
//! 2. [`algorithms`] take a [`SchemaGraph`] adjacency snapshot for cycle, SCC,
//!    ordering and reachability queries
//! 3. [`transform`] merges duplicates and absorbs single-use or primitive nodes
//! 4. [`partition`] decides how the compiled schema set is split into files
//!
//! Snapshots do not follow later mutations. Every mutating pass leaves the
//! graph at a new [`IrGraph::revision`], and callers rebuild their
//! [`SchemaGraph`] when [`SchemaGraph::is_stale`] says so.

pub mod algorithms;
pub mod builder;
pub mod ir;
pub mod partition;
pub mod registry;
pub mod transform;

pub use algorithms::{CycleReport, SchemaGraph};
pub use builder::{build_graph, unwrap_promise, BuildOutput, GraphBuilder};
pub use ir::{Edge, IrGraph, Node, NodeId, NodeKind, NodePayload, Relation};
pub use partition::{PartitionInput, PartitionOptions, PartitionPlan, PartitionStrategy, Partitioner};
pub use registry::{DeclaredItem, Registry, RouteMetadata, StableId};
