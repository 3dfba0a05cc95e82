//! Global configuration loader for procflow.
//!
//! Reads `config.toml` from the data directory (`~/.procflow/` in production)
//! and deserializes it into [`GlobalConfig`]. Falls back to defaults when the
//! file is missing or malformed.

use std::path::Path;

use procflow_types::config::GlobalConfig;

/// Load global configuration from `{data_dir}/config.toml`.
///
/// - If the file does not exist, returns [`GlobalConfig::default()`].
/// - If the file exists but fails to parse, logs a warning and returns the default.
/// - If the file exists and parses successfully, returns the parsed config.
pub async fn load_global_config(data_dir: &Path) -> GlobalConfig {
    let config_path = data_dir.join("config.toml");

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config.toml found at {}, using defaults", config_path.display());
            return GlobalConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return GlobalConfig::default();
        }
    };

    match toml::from_str::<GlobalConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(
                "Failed to parse {}: {err}, using defaults",
                config_path.display()
            );
            GlobalConfig::default()
        }
    }
}

/// Extraction confidence threshold, clamped to `[0, 1]`.
///
/// Non-finite values fall back to the built-in default.
pub fn resolve_min_confidence(config: &GlobalConfig) -> f64 {
    let value = config.execution.default_min_confidence;
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        procflow_core::workflow::step_runner::DEFAULT_MIN_CONFIDENCE
    }
}

/// Batch limit for one resume tick; never zero.
pub fn resolve_batch_limit(config: &GlobalConfig) -> u32 {
    config.scheduler.batch_limit.max(1)
}
