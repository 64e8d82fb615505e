use super::types::{ParameterLocation, Serialization};
use serde::{Deserialize, Serialize};

/// How one handler argument (or one member of an aggregated argument) is bound.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArgBinding {
    /// Wire name: query key, header name, cookie name or path placeholder
    pub name: String,
    /// Position in the handler's argument list
    pub index: usize,
    pub required: bool,
    /// JSON pointer into the schema document (`#/paths/...`) for this value's schema
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_ref: Option<String>,
    /// Bare JSON type, used when `schema_ref` does not resolve
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serialization: Option<Serialization>,
    /// Member of an object assembled from several wire values at `index`
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub aggregate: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArgBindings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<ArgBinding>,
    #[serde(default)]
    pub path: Vec<ArgBinding>,
    #[serde(default)]
    pub query: Vec<ArgBinding>,
    #[serde(default)]
    pub headers: Vec<ArgBinding>,
    #[serde(default)]
    pub cookies: Vec<ArgBinding>,
}

impl ArgBindings {
    pub fn push(&mut self, location: ParameterLocation, arg: ArgBinding) {
        match location {
            ParameterLocation::Body => self.body = Some(arg),
            ParameterLocation::Path => self.path.push(arg),
            ParameterLocation::Query => self.query.push(arg),
            ParameterLocation::Header => self.headers.push(arg),
            ParameterLocation::Cookie => self.cookies.push(arg),
        }
    }

    /// Non-body bindings with their location.
    pub fn located(&self) -> impl Iterator<Item = (ParameterLocation, &ArgBinding)> {
        self.path
            .iter()
            .map(|a| (ParameterLocation::Path, a))
            .chain(self.query.iter().map(|a| (ParameterLocation::Query, a)))
            .chain(self.headers.iter().map(|a| (ParameterLocation::Header, a)))
            .chain(self.cookies.iter().map(|a| (ParameterLocation::Cookie, a)))
    }

    /// Number of handler arguments (highest index + 1).
    pub fn arity(&self) -> usize {
        self.located()
            .map(|(_, a)| a)
            .chain(self.body.iter())
            .map(|a| a.index + 1)
            .max()
            .unwrap_or(0)
    }
}

/// Escape one JSON pointer segment.
pub fn pointer_segment(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}

/// `#/paths/<path>/<method>` for an operation in the schema document.
pub fn operation_pointer(path: &str, method: &http::Method) -> String {
    format!(
        "#/paths/{}/{}",
        pointer_segment(path),
        method.as_str().to_ascii_lowercase()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_pointer_escapes_slashes() {
        assert_eq!(
            operation_pointer("/users/{id}", &http::Method::GET),
            "#/paths/~1users~1{id}/get"
        );
    }

    #[test]
    fn test_arity_counts_body() {
        let arg = |index| ArgBinding {
            name: "x".into(),
            index,
            required: true,
            schema_ref: None,
            schema_type: None,
            serialization: None,
            aggregate: false,
        };
        let mut args = ArgBindings::default();
        args.push(ParameterLocation::Query, arg(0));
        args.push(ParameterLocation::Body, arg(2));
        assert_eq!(args.arity(), 3);
    }
}
