//! Local folder watcher producing file-created trigger events.
//!
//! Provides:
//! - `start_folder_watcher()` -- Starts a debounced recursive watcher on a root
//! - `WatcherHandle` -- RAII handle that keeps the watcher alive
//! - `relative_trigger_path()` -- Maps an absolute path to the trigger path
//!
//! Paths in emitted events are relative to the watched root with a leading
//! `/` (e.g. `/Resumes/john.pdf`), which is what folder matchers compare
//! against.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

// notify-debouncer-mini re-exports the notify version it was built against.
use notify_debouncer_mini::notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_mini::{DebounceEventResult, Debouncer, new_debouncer};
use procflow_types::workflow::FileCreatedEvent;
use serde_json::json;
use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can occur while setting up a folder watch.
#[derive(Debug, thiserror::Error)]
pub enum FileWatchError {
    /// Failed to create the filesystem watcher.
    #[error("watcher creation failed: {0}")]
    WatcherCreation(String),

    /// Failed to add the root to the watcher.
    #[error("failed to watch path '{path}': {reason}")]
    WatchPath { path: String, reason: String },
}

// ---------------------------------------------------------------------------
// WatcherHandle
// ---------------------------------------------------------------------------

/// RAII handle that keeps a folder watcher alive.
///
/// Dropping the handle stops the watch and closes the event channel.
pub struct WatcherHandle {
    _debouncer: Debouncer<RecommendedWatcher>,
    root: PathBuf,
}

impl WatcherHandle {
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Drop for WatcherHandle {
    fn drop(&mut self) {
        tracing::debug!(root = %self.root.display(), "folder watcher dropped");
    }
}

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

/// Trigger path of `path` under `root`: `/`-separated with a leading `/`.
///
/// `None` when `path` is not inside `root`.
pub fn relative_trigger_path(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        return None;
    }
    Some(format!("/{}", parts.join("/")))
}

/// Files known to exist under the watched root.
///
/// Seeded with what is on disk when the watch starts so existing files are
/// not reported. Paths that disappear are forgotten, so the set follows the
/// folder's contents and a file created again later is reported again.
#[derive(Debug, Default)]
struct SeenFiles(HashSet<PathBuf>);

impl SeenFiles {
    fn scan(root: &Path) -> Self {
        let mut seen = HashSet::new();
        let mut pending = vec![root.to_path_buf()];
        while let Some(dir) = pending.pop() {
            let Ok(entries) = std::fs::read_dir(&dir) else {
                continue;
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_dir() {
                    pending.push(path);
                } else {
                    seen.insert(path);
                }
            }
        }
        Self(seen)
    }

    /// Whether `path` is a file that was not known before.
    fn admit(&mut self, path: &Path) -> bool {
        if path.is_file() {
            return self.0.insert(path.to_path_buf());
        }
        if !path.exists() {
            self.0.retain(|known| !known.starts_with(path));
        }
        false
    }

    fn len(&self) -> usize {
        self.0.len()
    }
}

// ---------------------------------------------------------------------------
// Folder watcher lifecycle
// ---------------------------------------------------------------------------

/// Start a debounced recursive watcher on `root`.
///
/// Returns a `WatcherHandle` (keep alive to maintain the watch) and a
/// receiver that yields one `FileCreatedEvent` per newly seen file.
/// Modifications of already-known files and directory events are ignored.
/// When the receiver falls behind, the watcher thread waits for room in the
/// channel rather than dropping events.
pub fn start_folder_watcher(
    root: &Path,
    organization_id: Option<String>,
    debounce_ms: Option<u64>,
) -> Result<(WatcherHandle, mpsc::Receiver<FileCreatedEvent>), FileWatchError> {
    let debounce_duration = Duration::from_millis(debounce_ms.unwrap_or(500));
    let (tx, rx) = mpsc::channel::<FileCreatedEvent>(256);

    let root_path = root.to_path_buf();
    let watch_root = root_path.clone();
    let mut seen = SeenFiles::scan(root);

    let mut debouncer = new_debouncer(
        debounce_duration,
        move |result: DebounceEventResult| match result {
            Ok(events) => {
                for event in events {
                    let path = event.path;
                    if !seen.admit(&path) {
                        continue;
                    }
                    let Some(file_path) = relative_trigger_path(&watch_root, &path) else {
                        continue;
                    };
                    let size = std::fs::metadata(&path).map(|m| m.len()).ok();

                    tracing::debug!(file_path = file_path.as_str(), "file created");

                    let event = FileCreatedEvent {
                        file_path,
                        organization_id: organization_id.clone(),
                        file_metadata: json!({
                            "absolute_path": path.display().to_string(),
                            "size": size,
                        }),
                    };
                    if tx.blocking_send(event).is_err() {
                        tracing::debug!(path = %path.display(), "file event receiver closed");
                        return;
                    }
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "folder watcher error");
            }
        },
    )
    .map_err(|e| FileWatchError::WatcherCreation(e.to_string()))?;

    debouncer
        .watcher()
        .watch(&root_path, RecursiveMode::Recursive)
        .map_err(|e| FileWatchError::WatchPath {
            path: root_path.display().to_string(),
            reason: e.to_string(),
        })?;

    tracing::info!(root = %root_path.display(), "folder watcher started");

    let handle = WatcherHandle {
        _debouncer: debouncer,
        root: root_path,
    };

    Ok((handle, rx))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
