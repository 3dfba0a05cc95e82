//! CLI command definitions and dispatch for the `procflow` binary.
//!
//! Uses clap derive macros for argument parsing. Resource commands follow a
//! noun-verb pattern (e.g., `procflow workflow create`, `procflow run show`).

pub mod run;
pub mod trigger;
pub mod user;
pub mod workflow;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use procflow_observe::tracing_setup::LogFormat;

/// Run document workflows: capture, extract, validate, wait, escalate.
#[derive(Parser)]
#[command(name = "procflow", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug, -vvv for trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Export spans to stdout through OpenTelemetry.
    #[arg(long, global = true, env = "PROCFLOW_OTEL")]
    pub otel: bool,

    /// Log line format on stderr: pretty or json.
    #[arg(long, global = true, env = "PROCFLOW_LOG_FORMAT", default_value = "pretty")]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage workflow definitions.
    Workflow {
        #[command(subcommand)]
        action: workflow::WorkflowCommand,
    },

    /// Start and manage workflow runs.
    Run {
        #[command(subcommand)]
        action: run::RunCommand,
    },

    /// Manage the users runs can be assigned to.
    User {
        #[command(subcommand)]
        action: user::UserCommand,
    },

    /// Resume every run whose delay has elapsed, once.
    Tick,

    /// Report a created file and start the workflows it triggers.
    Trigger {
        /// Path of the created file (e.g. /Resumes/john.pdf).
        path: String,

        /// Organization the file belongs to.
        #[arg(long)]
        org: Option<String>,

        /// Extra file metadata as a JSON object.
        #[arg(long)]
        metadata: Option<String>,
    },

    /// Watch a local folder and trigger workflows for new files.
    Watch {
        /// Root folder to watch recursively.
        dir: PathBuf,

        /// Organization the files belong to.
        #[arg(long)]
        org: Option<String>,

        /// Debounce window in milliseconds.
        #[arg(long, default_value = "500")]
        debounce_ms: u64,
    },

    /// Start the REST API server and the resume ticker.
    Serve {
        /// Port to listen on (defaults to config.toml).
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to (defaults to config.toml).
        #[arg(long)]
        host: Option<String>,

        /// Do not run the periodic resume ticker.
        #[arg(long)]
        no_ticker: bool,
    },

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

/// Print a JSON value pretty-printed.
pub(crate) fn print_json(value: &impl serde::Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Parse a JSON object argument (`--input`, `--values`, `--metadata`).
pub(crate) fn parse_json_object(
    raw: Option<&str>,
) -> anyhow::Result<serde_json::Map<String, serde_json::Value>> {
    let Some(raw) = raw else {
        return Ok(serde_json::Map::new());
    };
    match serde_json::from_str::<serde_json::Value>(raw)? {
        serde_json::Value::Object(map) => Ok(map),
        other => anyhow::bail!("expected a JSON object, got: {other}"),
    }
}
