//! Route registration and matching over a loaded manifest.
//!
//! Middleware named by operations is resolved against a [`MiddlewareRegistry`]
//! when the table is built. An unknown name fails registration; requests never
//! see an unresolved reference.

use super::binder::{BindOutcome, BindRequest, RequestBinder, ValidationFailure};
use crate::emit::Manifest;
use http::Method;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// A response produced by middleware instead of the handler.
#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    pub status: u16,
    pub body: Value,
}

pub trait Middleware: Send + Sync {
    /// Return a rejection to stop the request before binding.
    fn before(&self, _operation_id: &str, _request: &BindRequest) -> Option<Rejection> {
        None
    }
    fn after(&self, _operation_id: &str, _outcome: &Resolution, _latency: Duration) {}
}

/// Middleware available to routes, by name.
#[derive(Clone, Default)]
pub struct MiddlewareRegistry {
    entries: HashMap<String, Arc<dyn Middleware>>,
}

impl MiddlewareRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, middleware: Arc<dyn Middleware>) {
        self.entries.insert(name.into(), middleware);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Middleware>> {
        self.entries.get(name).map(Arc::clone)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

struct Route {
    operation_id: String,
    handler: String,
    method: Method,
    path: String,
    pattern: Regex,
    param_names: Vec<String>,
    middleware: Vec<Arc<dyn Middleware>>,
}

/// A matched route with its extracted path parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteMatch {
    pub operation_id: String,
    pub handler: String,
    pub path_params: HashMap<String, String>,
}

/// What the caller should do with a request.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    NotFound,
    Rejected(Rejection),
    Invalid(ValidationFailure),
    /// Call `handler` with `args`.
    Dispatch {
        operation_id: String,
        handler: String,
        args: Vec<Value>,
    },
}

pub struct RouteTable {
    routes: Vec<Route>,
}

/// `^/users/([^/]+)$` plus placeholder names, for a `{name}` path template.
fn path_to_regex(path: &str) -> anyhow::Result<(Regex, Vec<String>)> {
    let mut pattern = String::with_capacity(path.len() + 5);
    pattern.push('^');
    let mut param_names = Vec::new();
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        pattern.push('/');
        if let Some(name) = segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
            pattern.push_str("([^/]+)");
            param_names.push(name.to_string());
        } else {
            pattern.push_str(&regex::escape(segment));
        }
    }
    if param_names.is_empty() && pattern == "^" {
        pattern.push('/');
    }
    pattern.push('$');
    let regex = Regex::new(&pattern)
        .map_err(|e| anyhow::anyhow!("invalid route pattern for '{path}': {e}"))?;
    Ok((regex, param_names))
}

/// Percent-decode one path segment. `+` stays literal.
fn decode_segment(segment: &str) -> String {
    let escaped = segment.replace('+', "%2B").replace('&', "%26").replace('=', "%3D");
    url::form_urlencoded::parse(format!("v={escaped}").as_bytes())
        .next()
        .map(|(_, v)| v.into_owned())
        .unwrap_or_else(|| segment.to_string())
}

impl RouteTable {
    /// One route per manifest operation. Fails on the first middleware name
    /// the registry does not know, or an unparseable HTTP method.
    pub fn register(manifest: &Manifest, middleware: &MiddlewareRegistry) -> anyhow::Result<Self> {
        let mut routes = Vec::with_capacity(manifest.operations.len());
        for op in &manifest.operations {
            let method = Method::from_str(&op.http.method.to_ascii_uppercase()).map_err(|e| {
                anyhow::anyhow!("operation '{}' has invalid method: {e}", op.operation_id)
            })?;
            let resolved = op
                .middleware
                .iter()
                .map(|name| {
                    middleware.get(name).ok_or_else(|| {
                        anyhow::anyhow!(
                            "operation '{}' references unknown middleware '{name}' (registered: {:?})",
                            op.operation_id,
                            middleware.names()
                        )
                    })
                })
                .collect::<anyhow::Result<Vec<_>>>()?;
            let (pattern, param_names) = path_to_regex(&op.http.path)?;
            routes.push(Route {
                operation_id: op.operation_id.clone(),
                handler: op.handler.clone(),
                method,
                path: op.http.path.clone(),
                pattern,
                param_names,
                middleware: resolved,
            });
        }
        // Literal routes win over templated ones.
        routes.sort_by_key(|r| r.param_names.len());
        info!(routes = routes.len(), "Routes registered");
        Ok(Self { routes })
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// `(method, path template, operation id)` for every route.
    pub fn routes(&self) -> impl Iterator<Item = (&Method, &str, &str)> {
        self.routes
            .iter()
            .map(|r| (&r.method, r.path.as_str(), r.operation_id.as_str()))
    }

    fn find(&self, method: &Method, path: &str) -> Option<(&Route, HashMap<String, String>)> {
        self.routes
            .iter()
            .filter(|r| r.method == *method)
            .find_map(|route| {
                let captures = route.pattern.captures(path)?;
                let params = route
                    .param_names
                    .iter()
                    .enumerate()
                    .filter_map(|(i, name)| {
                        let value = captures.get(i + 1)?.as_str();
                        Some((name.clone(), decode_segment(value)))
                    })
                    .collect();
                Some((route, params))
            })
    }

    pub fn match_route(&self, method: &Method, path: &str) -> Option<RouteMatch> {
        let (route, path_params) = self.find(method, path)?;
        Some(RouteMatch {
            operation_id: route.operation_id.clone(),
            handler: route.handler.clone(),
            path_params,
        })
    }

    /// Match, run middleware, then bind. Path parameters from the match are
    /// merged into `request`.
    pub fn resolve(
        &self,
        binder: &RequestBinder,
        method: &Method,
        path: &str,
        mut request: BindRequest,
    ) -> anyhow::Result<Resolution> {
        let Some((route, path_params)) = self.find(method, path) else {
            debug!(method = %method, path, "No route matched");
            return Ok(Resolution::NotFound);
        };
        let started = Instant::now();
        request.path_params.extend(path_params);

        let resolution = match route
            .middleware
            .iter()
            .find_map(|m| m.before(&route.operation_id, &request))
        {
            Some(rejection) => Resolution::Rejected(rejection),
            None => match binder.bind(&route.operation_id, &request)? {
                BindOutcome::Bound(args) => Resolution::Dispatch {
                    operation_id: route.operation_id.clone(),
                    handler: route.handler.clone(),
                    args,
                },
                BindOutcome::Invalid(failure) => Resolution::Invalid(failure),
            },
        };
        let latency = started.elapsed();
        for m in &route.middleware {
            m.after(&route.operation_id, &resolution, latency);
        }
        Ok(resolution)
    }
}
