//! Data directory layout.

use std::path::{Path, PathBuf};

/// Resolve the data directory from environment or platform defaults.
///
/// Priority:
/// 1. `PROCFLOW_DATA_DIR` environment variable
/// 2. `~/.procflow`
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("PROCFLOW_DATA_DIR") {
        return PathBuf::from(dir);
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".procflow");
    }

    PathBuf::from(".procflow")
}

/// SQLite database URL inside the data directory.
pub fn database_url(data_dir: &Path) -> String {
    format!("sqlite://{}?mode=rwc", data_dir.join("procflow.db").display())
}

/// Directory where generated documents are written.
pub fn documents_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("documents")
}

/// Directory scanned for workflow definition files.
pub fn workflows_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("workflows")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_paths() {
        let data_dir = PathBuf::from("/home/user/.procflow");
        assert_eq!(
            database_url(&data_dir),
            "sqlite:///home/user/.procflow/procflow.db?mode=rwc"
        );
        assert_eq!(
            documents_dir(&data_dir),
            PathBuf::from("/home/user/.procflow/documents")
        );
        assert_eq!(
            workflows_dir(&data_dir),
            PathBuf::from("/home/user/.procflow/workflows")
        );
    }

    #[test]
    fn test_resolve_data_dir_from_env() {
        // SAFETY: This test is single-threaded and restores the env var immediately.
        unsafe {
            std::env::set_var("PROCFLOW_DATA_DIR", "/tmp/test-procflow");
        }
        let dir = resolve_data_dir();
        assert_eq!(dir, PathBuf::from("/tmp/test-procflow"));
        unsafe {
            std::env::remove_var("PROCFLOW_DATA_DIR");
        }
    }
}
