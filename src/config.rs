//! # Compiler Configuration
//!
//! [`CompilerConfig`] is read from a YAML (`.yaml`/`.yml`), TOML (`.toml`) or JSON
//! file, chosen by extension, then overridden from the environment:
//!
//! | variable | field |
//! |---|---|
//! | `ROUTEFORGE_TITLE` | `title` |
//! | `ROUTEFORGE_API_VERSION` | `version` |
//! | `ROUTEFORGE_DEDUP` | `dedup` |
//! | `ROUTEFORGE_PRUNE_UNUSED` | `prune_unused` |
//! | `ROUTEFORGE_VALIDATION_MODE` | `validation_mode` (`none`, `runtime`, `precompiled`) |
//! | `ROUTEFORGE_PARTITION_STRATEGY` | `partition.strategy` |
//! | `ROUTEFORGE_SIMILARITY_THRESHOLD` | `similarity_threshold` |
//!
//! Every field has a default, so an empty file (or no file) is a valid config.

use crate::emit::{DocumentInfo, ValidationMode};
use crate::graph::transform::{FlattenOptions, InlineOptions, DEFAULT_SIMILARITY_THRESHOLD};
use crate::graph::PartitionOptions;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};

/// What to do when two declarations share a kind and a name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentityPolicy {
    /// Later declarations get a file-qualified id; dedup merges them.
    #[default]
    Namespace,
    /// Any collision fails the build.
    Reject,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CompilerConfig {
    pub title: String,
    pub version: String,
    pub dedup: bool,
    pub inline: InlineOptions,
    pub flatten: FlattenOptions,
    pub partition: PartitionOptions,
    pub prune_unused: bool,
    pub validation_mode: ValidationMode,
    /// Shorthand for `validation_mode: precompiled`.
    pub precompiled_validators: bool,
    pub identity_policy: IdentityPolicy,
    pub similarity_threshold: f64,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        let info = DocumentInfo::default();
        Self {
            title: info.title,
            version: info.version,
            dedup: true,
            inline: InlineOptions::default(),
            flatten: FlattenOptions::default(),
            partition: PartitionOptions::default(),
            prune_unused: true,
            validation_mode: ValidationMode::Runtime,
            precompiled_validators: false,
            identity_policy: IdentityPolicy::Namespace,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
        }
    }
}

fn parse_bool(key: &str, value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => {
            warn!(variable = key, value, "Ignoring non-boolean environment override");
            None
        }
    }
}

impl CompilerConfig {
    /// Load a config file, dispatching on its extension.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {path:?}"))?;
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        let config = match ext {
            "yaml" | "yml" => serde_yaml::from_str(&content)
                .with_context(|| format!("failed to parse YAML config {path:?}"))?,
            "toml" => toml::from_str(&content)
                .with_context(|| format!("failed to parse TOML config {path:?}"))?,
            _ => serde_json::from_str(&content)
                .with_context(|| format!("failed to parse JSON config {path:?}"))?,
        };
        debug!(path = ?path, "Compiler config loaded");
        Ok(config)
    }

    /// `load` when a path is given, defaults otherwise; then environment overrides.
    pub fn resolve(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(p) => Self::load(p)?,
            None => Self::default(),
        };
        config.apply_env(|k| std::env::var(k).ok())?;
        Ok(config)
    }

    /// Apply `ROUTEFORGE_*` overrides read through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<()> {
        if let Some(v) = lookup("ROUTEFORGE_TITLE") {
            self.title = v;
        }
        if let Some(v) = lookup("ROUTEFORGE_API_VERSION") {
            self.version = v;
        }
        if let Some(v) = lookup("ROUTEFORGE_DEDUP").and_then(|v| parse_bool("ROUTEFORGE_DEDUP", &v)) {
            self.dedup = v;
        }
        if let Some(v) = lookup("ROUTEFORGE_PRUNE_UNUSED")
            .and_then(|v| parse_bool("ROUTEFORGE_PRUNE_UNUSED", &v))
        {
            self.prune_unused = v;
        }
        if let Some(v) = lookup("ROUTEFORGE_VALIDATION_MODE") {
            self.validation_mode = v
                .parse()
                .context("invalid ROUTEFORGE_VALIDATION_MODE")?;
        }
        if let Some(v) = lookup("ROUTEFORGE_PARTITION_STRATEGY") {
            self.partition.strategy = Some(
                v.parse()
                    .context("invalid ROUTEFORGE_PARTITION_STRATEGY")?,
            );
        }
        if let Some(v) = lookup("ROUTEFORGE_SIMILARITY_THRESHOLD") {
            self.similarity_threshold = v
                .parse()
                .with_context(|| format!("invalid ROUTEFORGE_SIMILARITY_THRESHOLD '{v}'"))?;
        }
        Ok(())
    }

    pub fn info(&self) -> DocumentInfo {
        DocumentInfo {
            title: self.title.clone(),
            version: self.version.clone(),
        }
    }

    pub fn effective_validation_mode(&self) -> ValidationMode {
        if self.precompiled_validators {
            ValidationMode::Precompiled
        } else {
            self.validation_mode
        }
    }
}
