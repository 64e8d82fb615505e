//! Compiled artifacts loaded from an output directory, and a cache of them.
//!
//! A load stats every artifact file; when any modification time differs from
//! the cached entry, the whole entry is rebuilt and swapped in. Readers hold an
//! `Arc` to whichever entry they got and never see a half-updated one.

use crate::emit::{
    schema_hash, Manifest, ValidationMode, MANIFEST_FILE, OPENAPI_FILE, VALIDATORS_FILE,
};
use anyhow::Context;
use dashmap::DashMap;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, info};

/// The schema document, manifest and optional precompiled validators of one build.
#[derive(Debug, Clone)]
pub struct Artifacts {
    pub dir: PathBuf,
    pub schema: Value,
    pub manifest: Manifest,
    pub validators: Option<Value>,
    pub mtimes: BTreeMap<PathBuf, SystemTime>,
}

fn read_json(path: &Path) -> anyhow::Result<Value> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("failed to read {path:?}"))?;
    serde_json::from_str(&content).with_context(|| format!("failed to parse {path:?}"))
}

/// Modification times of the artifact files present in `dir`.
pub fn artifact_mtimes(dir: &Path) -> BTreeMap<PathBuf, SystemTime> {
    [OPENAPI_FILE, MANIFEST_FILE, VALIDATORS_FILE]
        .iter()
        .map(|name| dir.join(name))
        .filter_map(|path| {
            let modified = std::fs::metadata(&path).and_then(|m| m.modified()).ok()?;
            Some((path, modified))
        })
        .collect()
}

impl Artifacts {
    /// Read `openapi.json`, `manifest.json` and, in precompiled mode, the
    /// validators file. Fails when the manifest was built from a different
    /// schema document.
    pub fn load(dir: &Path) -> anyhow::Result<Self> {
        let mtimes = artifact_mtimes(dir);
        let schema = read_json(&dir.join(OPENAPI_FILE))?;
        let manifest = Manifest::load(&dir.join(MANIFEST_FILE))?;
        let actual = schema_hash(&schema);
        if actual != manifest.schema_hash {
            anyhow::bail!(
                "manifest in {dir:?} was built for schema {} but {OPENAPI_FILE} hashes to {actual}",
                manifest.schema_hash
            );
        }
        let validators = if manifest.validation.mode == ValidationMode::Precompiled {
            let file = manifest
                .validation
                .precompiled
                .as_deref()
                .unwrap_or(VALIDATORS_FILE);
            Some(read_json(&dir.join(file))?)
        } else {
            None
        };
        Ok(Self {
            dir: dir.to_path_buf(),
            schema,
            manifest,
            validators,
            mtimes,
        })
    }

    /// Precompiled schema for one operation and location, if present.
    pub fn precompiled(&self, operation_id: &str, location: &str) -> Option<&Value> {
        self.validators.as_ref()?.get(operation_id)?.get(location)
    }
}

/// Output directory → loaded artifacts.
#[derive(Debug, Default)]
pub struct ArtifactCache {
    entries: DashMap<PathBuf, Arc<Artifacts>>,
}

impl ArtifactCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached artifacts for `dir`, reloaded when any file changed on disk.
    pub fn load(&self, dir: &Path) -> anyhow::Result<Arc<Artifacts>> {
        let current = artifact_mtimes(dir);
        if let Some(entry) = self.entries.get(dir) {
            if entry.mtimes == current {
                debug!(dir = ?dir, "Artifact cache hit");
                return Ok(Arc::clone(entry.value()));
            }
        }
        let artifacts = Arc::new(Artifacts::load(dir)?);
        info!(
            dir = ?dir,
            operations = artifacts.manifest.operations.len(),
            schema_hash = %artifacts.manifest.schema_hash,
            "Artifacts loaded"
        );
        self.entries
            .insert(dir.to_path_buf(), Arc::clone(&artifacts));
        Ok(artifacts)
    }

    /// Forget `dir`; the next load reads from disk.
    pub fn invalidate(&self, dir: &Path) -> bool {
        let removed = self.entries.remove(dir).is_some();
        if removed {
            info!(dir = ?dir, "Artifact cache entry invalidated");
        }
        removed
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
