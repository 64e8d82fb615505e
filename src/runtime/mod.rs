//! # Runtime Module
//!
//! Request-time half of routeforge: loads compiled artifacts, matches routes,
//! and binds/validates requests into handler arguments.
//!
//! Artifacts are shared read-only behind `Arc`; a reload builds a new
//! [`Artifacts`] value and swaps it in rather than mutating the old one.

pub mod artifacts;
pub mod binder;
pub mod coerce;
pub mod hot_reload;
pub mod query;
pub mod routes;
pub mod validator_cache;

pub use artifacts::{artifact_mtimes, ArtifactCache, Artifacts};
pub use binder::{
    BindOutcome, BindRequest, BinderConfig, DateCoercion, RequestBinder, RequestBody,
    ValidationFailure, VALIDATION_FAILURE_STATUS,
};
pub use coerce::coerce;
pub use hot_reload::watch_artifacts;
pub use query::{parse_cookies, parse_query, ParsedQuery};
pub use routes::{
    Middleware, MiddlewareRegistry, Rejection, Resolution, RouteMatch, RouteTable,
};
pub use validator_cache::{field_errors, FieldError, ValidatorCache};
