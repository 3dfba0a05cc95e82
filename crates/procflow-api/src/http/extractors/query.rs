//! Query parameter extractors for list endpoints.

use serde::Deserialize;

/// Query parameters for run list endpoints.
#[derive(Debug, Deserialize)]
pub struct RunListQuery {
    /// Maximum number of runs to return.
    #[serde(default = "default_run_limit")]
    pub limit: u32,
}

fn default_run_limit() -> u32 {
    20
}
