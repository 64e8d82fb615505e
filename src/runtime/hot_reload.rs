//! # Hot Reload
//!
//! Watches a build output directory and refreshes the [`ArtifactCache`] entry
//! when `openapi.json`, `manifest.json` or `validators.json` change.
//!
//! A reload that fails (half-written files, a manifest paired with the wrong
//! schema) is logged and the callback is not invoked; callers keep serving
//! whatever artifacts they already hold.
//!
//! ```rust,ignore
//! let cache = Arc::new(ArtifactCache::new());
//! let _watcher = watch_artifacts("build/api", Arc::clone(&cache), |artifacts| {
//!     println!("reloaded {} operations", artifacts.manifest.operations.len());
//! })?;
//! ```

use super::artifacts::{ArtifactCache, Artifacts};
use crate::emit::{MANIFEST_FILE, OPENAPI_FILE, VALIDATORS_FILE};
use notify::{Config, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

fn is_artifact(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| [OPENAPI_FILE, MANIFEST_FILE, VALIDATORS_FILE].contains(&n))
}

/// Watch `dir` and hand freshly loaded artifacts to `on_reload`.
///
/// The returned watcher stops watching when dropped.
pub fn watch_artifacts<P, F>(
    dir: P,
    cache: Arc<ArtifactCache>,
    mut on_reload: F,
) -> notify::Result<RecommendedWatcher>
where
    P: AsRef<Path>,
    F: FnMut(Arc<Artifacts>) + Send + 'static,
{
    let dir: PathBuf = dir.as_ref().to_path_buf();
    let watch_dir = dir.clone();

    let mut watcher = RecommendedWatcher::new(
        move |res: Result<notify::Event, notify::Error>| match res {
            Ok(event) => {
                if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                    return;
                }
                if !event.paths.iter().any(|p| is_artifact(p)) {
                    return;
                }
                cache.invalidate(&watch_dir);
                match cache.load(&watch_dir) {
                    Ok(artifacts) => {
                        info!(
                            dir = ?watch_dir,
                            operations = artifacts.manifest.operations.len(),
                            "hot-reload: artifacts reloaded"
                        );
                        on_reload(artifacts);
                    }
                    Err(e) => warn!(dir = ?watch_dir, error = %e, "hot-reload: reload failed"),
                }
            }
            Err(e) => error!(error = ?e, "hot-reload: watch error"),
        },
        Config::default(),
    )?;

    watcher.watch(&dir, RecursiveMode::NonRecursive)?;
    Ok(watcher)
}
