//! Explicit temp-path cleanup: a first-class component rather than a
//! one-off call at the end of a job function. Per-stage paths are tracked
//! as they're created and released on every exit path (success, failure,
//! cancel), not only the happy path.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Mutex;

use tracing::warn;

/// Tracks temp paths created during a job run so they can be removed on
/// every exit path. Does not rely on `Drop` as the primary release
/// mechanism — callers must call `close()` explicitly; `Drop` only warns
/// if a scope was abandoned without one.
pub struct CleanupScope {
    paths: Mutex<HashSet<PathBuf>>,
    closed: Mutex<bool>,
    label: String,
}

impl CleanupScope {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            paths: Mutex::new(HashSet::new()),
            closed: Mutex::new(false),
            label: label.into(),
        }
    }

    /// Track a path for removal when the scope closes.
    pub fn register_temp(&self, path: impl Into<PathBuf>) {
        self.paths.lock().unwrap().insert(path.into());
    }

    /// Stop tracking a path without deleting it — used when a temp file
    /// becomes a durable artifact (e.g. the final render output).
    pub fn transfer_out(&self, path: &std::path::Path) {
        self.paths.lock().unwrap().remove(path);
    }

    /// Remove every remaining tracked path. Per-path errors (including
    /// "already gone") are swallowed and logged, never propagated — a
    /// cleanup failure must not fail an already-finished job.
    pub async fn close(&self) {
        let paths: Vec<PathBuf> = {
            let mut tracked = self.paths.lock().unwrap();
            tracked.drain().collect()
        };

        for path in paths {
            if path.is_dir() {
                if let Err(e) = tokio::fs::remove_dir_all(&path).await {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        warn!(scope = %self.label, path = %path.display(), error = %e, "failed to remove temp directory");
                    }
                }
            } else if let Err(e) = tokio::fs::remove_file(&path).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(scope = %self.label, path = %path.display(), error = %e, "failed to remove temp file");
                }
            }
        }

        *self.closed.lock().unwrap() = true;
    }
}

impl Drop for CleanupScope {
    fn drop(&mut self) {
        if !*self.closed.lock().unwrap() {
            warn!(scope = %self.label, "cleanup scope dropped without close() — temp paths may leak");
        }
    }
}
