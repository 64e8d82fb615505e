//! # Source Module
//!
//! Compiler input: declaration units exported by the host type system.
//!
//! A unit lists the classes, interfaces, aliases and enums of one source file with
//! their members already resolved to [`TypeExpr`] values. Controllers and operations
//! are recognised from a small annotation vocabulary:
//!
//! - `Controller(path)` on a class
//! - `Get|Post|Put|Patch|Delete|Head|Options(path)` on a method, `{name}` placeholders
//! - `OperationId(id)`, `Tags(..)`, `Middleware(..)` on a method
//! - `Path(name?)`, `Query(name?)`, `Header(name?)`, `Cookie(name?)`, `Body`, `DeepObject`
//!   on a parameter
//!
//! The compiler never infers types. It only asks [`TypeResolver::resolve`] for the
//! declaration behind a name.

mod load;
mod types;

pub use load::*;
pub use types::*;

/// Annotation names understood by the graph builder.
pub mod annotations {
    pub const CONTROLLER: &str = "Controller";
    pub const OPERATION_ID: &str = "OperationId";
    pub const TAGS: &str = "Tags";
    pub const MIDDLEWARE: &str = "Middleware";
    pub const PATH: &str = "Path";
    pub const QUERY: &str = "Query";
    pub const HEADER: &str = "Header";
    pub const COOKIE: &str = "Cookie";
    pub const BODY: &str = "Body";
    pub const DEEP_OBJECT: &str = "DeepObject";

    /// HTTP verb annotations.
    pub const VERBS: &[&str] = &["Get", "Post", "Put", "Patch", "Delete", "Head", "Options"];

    /// Map a verb annotation name to its HTTP method.
    pub fn verb_method(name: &str) -> Option<http::Method> {
        Some(match name {
            "Get" => http::Method::GET,
            "Post" => http::Method::POST,
            "Put" => http::Method::PUT,
            "Patch" => http::Method::PATCH,
            "Delete" => http::Method::DELETE,
            "Head" => http::Method::HEAD,
            "Options" => http::Method::OPTIONS,
            _ => return None,
        })
    }
}
