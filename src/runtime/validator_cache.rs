//! # Validator Cache
//!
//! Compiled JSON Schema validators shared across requests.
//!
//! Keys are `{schema_hash}:{operation_id}:{location}`, so validators compiled
//! against one schema document are never served for another after a reload.
//! Disable with `ROUTEFORGE_SCHEMA_CACHE=off`; every lookup then compiles.
//!
//! Lock poisoning is recovered from rather than propagated: the map only ever
//! holds fully compiled validators.

use anyhow::Context;
use jsonschema::error::ValidationErrorKind;
use jsonschema::Validator;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, error, info};

/// One failed check, reported to the client as part of a 400 response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldError {
    /// JSON pointer into the request, prefixed by location (`/body/name`)
    pub path: String,
    pub message: String,
    /// Failing JSON Schema keyword, or `json` for undecodable values
    pub keyword: String,
    pub params: Value,
}

/// Run `validator` over `instance`, prefixing every error path with `prefix`.
pub fn field_errors(validator: &Validator, instance: &Value, prefix: &str) -> Vec<FieldError> {
    validator
        .iter_errors(instance)
        .map(|err| {
            let schema_path = err.schema_path().to_string();
            let keyword = schema_path
                .rsplit('/')
                .next()
                .filter(|k| !k.is_empty())
                .unwrap_or("schema")
                .to_string();
            let params = match err.kind() {
                ValidationErrorKind::Required { property } => json!({ "missingProperty": property }),
                _ => json!({}),
            };
            FieldError {
                path: format!("{prefix}{}", err.instance_path()),
                message: err.to_string(),
                keyword,
                params,
            }
        })
        .collect()
}

#[derive(Clone)]
pub struct ValidatorCache {
    cache: Arc<RwLock<HashMap<String, Arc<Validator>>>>,
    enabled: bool,
}

impl ValidatorCache {
    pub fn new(enabled: bool) -> Self {
        info!(enabled, "Initializing JSON Schema validator cache");
        Self {
            cache: Arc::new(RwLock::new(HashMap::new())),
            enabled,
        }
    }

    fn cache_key(schema_hash: &str, operation_id: &str, location: &str) -> String {
        format!("{schema_hash}:{operation_id}:{location}")
    }

    fn compile(schema: &Value, operation_id: &str, location: &str) -> anyhow::Result<Arc<Validator>> {
        match jsonschema::validator_for(schema) {
            Ok(validator) => Ok(Arc::new(validator)),
            Err(e) => {
                error!(
                    operation_id,
                    location,
                    error = %e,
                    "Failed to compile JSON Schema"
                );
                anyhow::bail!("{location} schema of operation '{operation_id}' does not compile: {e}")
            }
        }
    }

    /// Cached validator for `operation_id` at `location`, compiling `schema`
    /// on a miss. Fails when the schema does not compile.
    pub fn get_or_compile(
        &self,
        schema_hash: &str,
        operation_id: &str,
        location: &str,
        schema: &Value,
    ) -> anyhow::Result<Arc<Validator>> {
        self.get_or_compile_with(schema_hash, operation_id, location, || Some(schema.clone()))?
            .context("no schema to compile")
    }

    /// Like [`get_or_compile`](Self::get_or_compile), building the schema
    /// only when nothing is cached. `Ok(None)` when there is no schema for
    /// the location.
    pub fn get_or_compile_with(
        &self,
        schema_hash: &str,
        operation_id: &str,
        location: &str,
        schema: impl FnOnce() -> Option<Value>,
    ) -> anyhow::Result<Option<Arc<Validator>>> {
        if !self.enabled {
            let Some(schema) = schema() else {
                return Ok(None);
            };
            return Self::compile(&schema, operation_id, location).map(Some);
        }
        let key = Self::cache_key(schema_hash, operation_id, location);
        {
            let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(validator) = cache.get(&key) {
                debug!(operation_id, location, cache_key = %key, "Schema validator cache hit");
                return Ok(Some(Arc::clone(validator)));
            }
        }

        let Some(schema) = schema() else {
            return Ok(None);
        };
        let validator = Self::compile(&schema, operation_id, location)?;
        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        // Another request may have compiled it while we held no lock.
        if let Some(existing) = cache.get(&key) {
            return Ok(Some(Arc::clone(existing)));
        }
        cache.insert(key.clone(), Arc::clone(&validator));
        debug!(
            operation_id,
            location,
            cache_key = %key,
            cache_size = cache.len(),
            "Schema validator compiled and cached"
        );
        Ok(Some(validator))
    }

    /// Compile every `{operationId: {location: schema}}` entry up front.
    /// Returns how many validators compiled.
    pub fn precompile(&self, schema_hash: &str, validators: &Value) -> usize {
        let Some(operations) = validators.as_object() else {
            return 0;
        };
        let mut compiled = 0;
        for (operation_id, locations) in operations {
            let Some(locations) = locations.as_object() else {
                continue;
            };
            for (location, schema) in locations {
                // Failures are logged; the request that needs it reports the error.
                if self
                    .get_or_compile(schema_hash, operation_id, location, schema)
                    .is_ok()
                {
                    compiled += 1;
                }
            }
        }
        info!(compiled, schema_hash, "Precompiled request validators");
        compiled
    }

    pub fn size(&self) -> usize {
        self.cache.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn clear(&self) {
        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        let cleared = cache.len();
        cache.clear();
        info!(cleared, "Validator cache cleared");
    }

    /// Drop validators compiled for any schema other than `schema_hash`.
    pub fn retain_hash(&self, schema_hash: &str) {
        let prefix = format!("{schema_hash}:");
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|key, _| key.starts_with(&prefix));
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

impl Default for ValidatorCache {
    fn default() -> Self {
        let enabled = std::env::var("ROUTEFORGE_SCHEMA_CACHE")
            .map(|v| !v.eq_ignore_ascii_case("off"))
            .unwrap_or(true);
        Self::new(enabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {"name": {"type": "string"}, "age": {"type": "integer"}},
            "required": ["name", "age"]
        })
    }

    #[test]
    fn test_cache_hit_returns_same_validator() {
        let cache = ValidatorCache::new(true);
        let a = cache.get_or_compile("h1", "createUser", "body", &schema()).unwrap();
        let b = cache.get_or_compile("h1", "createUser", "body", &schema()).unwrap();
        assert!(cache
            .get_or_compile_with("h1", "createUser", "query", || None)
            .unwrap()
            .is_none());
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.size(), 1);
    }

    #[test]
    fn test_disabled_cache_never_stores() {
        let cache = ValidatorCache::new(false);
        assert!(cache.get_or_compile("h1", "createUser", "body", &schema()).is_ok());
        assert_eq!(cache.size(), 0);
    }

    #[test]
    fn test_retain_hash_drops_stale_entries() {
        let cache = ValidatorCache::new(true);
        cache.get_or_compile("old", "a", "body", &schema()).unwrap();
        cache.get_or_compile("new", "a", "body", &schema()).unwrap();
        cache.retain_hash("new");
        assert_eq!(cache.size(), 1);
        cache.clear();
        assert_eq!(cache.size(), 0);
    }

    #[test]
    fn test_invalid_schema_is_an_error() {
        let cache = ValidatorCache::new(true);
        let err = cache
            .get_or_compile("h", "a", "body", &json!({"type": 12}))
            .err()
            .expect("type must be a string or array");
        assert!(err.to_string().contains("operation 'a'"), "{err}");
        assert_eq!(cache.size(), 0);
        assert_eq!(cache.precompile("h", &json!({"a": {"body": {"type": 12}}})), 0);
    }

    #[test]
    fn test_field_errors_report_each_missing_property() {
        let validator = jsonschema::validator_for(&schema()).unwrap();
        let errors = field_errors(&validator, &json!({}), "/body");
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().all(|e| e.keyword == "required" && e.path == "/body"));
        let missing: Vec<&Value> = errors.iter().map(|e| &e.params["missingProperty"]).collect();
        assert!(missing.contains(&&json!("name")));
        assert!(missing.contains(&&json!("age")));

        let errors = field_errors(&validator, &json!({"name": "x", "age": "old"}), "/body");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].path, "/body/age");
        assert_eq!(errors[0].keyword, "type");
    }
}
