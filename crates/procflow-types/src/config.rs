//! Global configuration types for procflow.
//!
//! `GlobalConfig` represents the top-level `config.toml` that controls the
//! resume scheduler, step execution defaults, trigger matching, the SQLite
//! store and the HTTP server.

use serde::{Deserialize, Serialize};

/// Top-level configuration for procflow.
///
/// Loaded from `~/.procflow/config.toml`. All fields have sensible defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub execution: ExecutionConfig,

    #[serde(default)]
    pub triggers: TriggerSettings,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub server: ServerConfig,
}

/// Settings for the delay/resume ticker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Cron expression or human-readable interval ("every minute").
    #[serde(default = "default_schedule")]
    pub schedule: String,

    /// Maximum number of due runs claimed per tick.
    #[serde(default = "default_batch_limit")]
    pub batch_limit: u32,
}

fn default_schedule() -> String {
    "every minute".to_string()
}

fn default_batch_limit() -> u32 {
    100
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            schedule: default_schedule(),
            batch_limit: default_batch_limit(),
        }
    }
}

/// Defaults applied while executing steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Extraction results below this confidence are flagged, unless the step
    /// sets its own threshold.
    #[serde(default = "default_min_confidence")]
    pub default_min_confidence: f64,
}

fn default_min_confidence() -> f64 {
    0.7
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            default_min_confidence: default_min_confidence(),
        }
    }
}

/// Folder matching strategy for file-created triggers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FolderMatchMode {
    /// Parent folder, path prefix, or opaque folder identifier substring.
    #[default]
    Permissive,
    /// Parent folder must equal the configured folder.
    Exact,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TriggerSettings {
    #[serde(default)]
    pub matcher: FolderMatchMode,
}

/// SQLite connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Size of the read-only connection pool. Writes always go through a
    /// single connection.
    #[serde(default = "default_max_readers")]
    pub max_readers: u32,

    /// How long a connection waits on a locked database before failing.
    #[serde(default = "default_busy_timeout_secs")]
    pub busy_timeout_secs: u64,
}

fn default_max_readers() -> u32 {
    8
}

fn default_busy_timeout_secs() -> u64 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            max_readers: default_max_readers(),
            busy_timeout_secs: default_busy_timeout_secs(),
        }
    }
}

/// HTTP server bind settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}
