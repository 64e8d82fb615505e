use super::openapi::{CompiledOperation, JSON_MEDIA_TYPE};
use crate::binding::{pointer_segment, ArgBindings};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::Path;

/// Bumped whenever the manifest layout changes incompatibly.
pub const MANIFEST_VERSION: u32 = 1;

/// How the runtime validates bound values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationMode {
    None,
    /// Compile validators on first use.
    #[default]
    #[serde(alias = "ajv-runtime")]
    Runtime,
    /// Load validators bundled at compile time.
    Precompiled,
}

impl fmt::Display for ValidationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ValidationMode::None => "none",
            ValidationMode::Runtime => "runtime",
            ValidationMode::Precompiled => "precompiled",
        })
    }
}

impl std::str::FromStr for ValidationMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "off" => Ok(ValidationMode::None),
            "runtime" | "ajv-runtime" => Ok(ValidationMode::Runtime),
            "precompiled" => Ok(ValidationMode::Precompiled),
            other => anyhow::bail!("unknown validation mode '{other}'"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ValidationSection {
    pub mode: ValidationMode,
    /// File (relative to the manifest) holding precompiled validators.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precompiled: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpBinding {
    pub method: String,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestResponse {
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_ref: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestOperation {
    pub operation_id: String,
    pub http: HttpBinding,
    pub handler: String,
    pub args: ArgBindings,
    pub responses: Vec<ManifestResponse>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub middleware: Vec<String>,
}

/// The binding plan the runtime follows, one entry per operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub manifest_version: u32,
    /// Prefix of the SHA-256 of the schema document this manifest belongs to.
    pub schema_hash: String,
    #[serde(default)]
    pub validation: ValidationSection,
    pub operations: Vec<ManifestOperation>,
}

impl Manifest {
    pub fn operation(&self, operation_id: &str) -> Option<&ManifestOperation> {
        self.operations
            .iter()
            .find(|op| op.operation_id == operation_id)
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read manifest {path:?}"))?;
        let manifest: Manifest = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse manifest {path:?}"))?;
        if manifest.manifest_version != MANIFEST_VERSION {
            anyhow::bail!(
                "unsupported manifest version {} in {path:?} (expected {MANIFEST_VERSION})",
                manifest.manifest_version
            );
        }
        Ok(manifest)
    }
}

/// First 16 hex characters of the SHA-256 of the document's JSON text.
pub fn schema_hash(document: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(document.to_string().as_bytes());
    let digest = hasher.finalize();
    digest
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<String>()
        .chars()
        .take(16)
        .collect()
}

fn manifest_operation(op: &CompiledOperation) -> ManifestOperation {
    let status = op.status();
    let schema_ref = op.response.as_ref().map(|_| {
        format!(
            "{}/responses/{status}/content/{}/schema",
            op.pointer(),
            pointer_segment(JSON_MEDIA_TYPE)
        )
    });
    ManifestOperation {
        operation_id: op.operation_id.clone(),
        http: HttpBinding {
            method: op.method.as_str().to_string(),
            path: op.path.clone(),
        },
        handler: op.handler.clone(),
        args: op.plan.args.clone(),
        responses: vec![ManifestResponse { status, schema_ref }],
        middleware: op.middleware.clone(),
    }
}

/// Record every operation's binding plan against the emitted `document`.
pub fn manifest_document(
    document: &Value,
    operations: &[CompiledOperation],
    validation: ValidationSection,
) -> Manifest {
    Manifest {
        manifest_version: MANIFEST_VERSION,
        schema_hash: schema_hash(document),
        validation,
        operations: operations.iter().map(manifest_operation).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::OperationPlan;
    use crate::schema::Schema;
    use serde_json::json;

    #[test]
    fn test_manifest_records_response_pointer() {
        let op = CompiledOperation {
            operation_id: "getUser".into(),
            method: http::Method::GET,
            path: "/users/{id}".into(),
            handler: "UserController.getUser".into(),
            tags: Vec::new(),
            middleware: vec!["auth".into()],
            plan: OperationPlan::default(),
            response: Some(Schema::reference("User")),
        };
        let doc = json!({"openapi": "3.1.0"});
        let manifest = manifest_document(&doc, &[op], ValidationSection::default());
        let value = serde_json::to_value(&manifest).unwrap();
        assert_eq!(value["manifestVersion"], 1);
        assert_eq!(value["validation"]["mode"], "runtime");
        assert_eq!(value["operations"][0]["http"]["method"], "GET");
        assert_eq!(
            value["operations"][0]["responses"][0]["schemaRef"],
            "#/paths/~1users~1{id}/get/responses/200/content/application~1json/schema"
        );
        assert_eq!(manifest.schema_hash.len(), 16);
        assert_eq!(manifest.schema_hash, schema_hash(&doc));
    }

    #[test]
    fn test_validation_mode_accepts_legacy_name() {
        let section: ValidationSection =
            serde_json::from_value(json!({"mode": "ajv-runtime"})).unwrap();
        assert_eq!(section.mode, ValidationMode::Runtime);
        assert_eq!("precompiled".parse::<ValidationMode>().unwrap(), ValidationMode::Precompiled);
    }
}
