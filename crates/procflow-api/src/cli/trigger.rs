//! CLI commands driving the scheduler and file triggers: `tick`, `trigger`
//! and `watch`.

use std::path::Path;

use anyhow::{Context, Result};
use console::style;
use uuid::Uuid;

use procflow_core::workflow::scheduler::TickReport;
use procflow_infra::workflow::file_trigger::start_folder_watcher;
use procflow_types::workflow::FileCreatedEvent;

use super::{parse_json_object, print_json};
use crate::state::AppState;

/// Run one resume tick now.
pub async fn handle_tick(state: &AppState, json: bool) -> Result<()> {
    let report = state.scheduler.tick().await?;
    if json {
        return print_json(&report);
    }
    print_tick_report(&report);
    Ok(())
}

fn print_tick_report(report: &TickReport) {
    println!();
    println!(
        "  {} Resumed {}/{} due run(s), {} skipped, {} failed",
        style("*").green().bold(),
        report.succeeded,
        report.attempted,
        report.skipped,
        report.failed
    );
    for err in &report.errors {
        println!("    {} {}: {}", style("✗").red(), err.run_id, err.message);
    }
    println!();
}

/// Report a single created file.
pub async fn handle_trigger(
    path: String,
    org: Option<String>,
    metadata: Option<String>,
    state: &AppState,
    json: bool,
) -> Result<()> {
    let event = FileCreatedEvent {
        file_path: path,
        organization_id: org,
        file_metadata: serde_json::Value::Object(
            parse_json_object(metadata.as_deref()).context("Invalid --metadata")?,
        ),
    };
    let started = state.triggers.dispatch(&event).await?;

    if json {
        return print_json(&serde_json::json!({
            "file_path": event.file_path,
            "run_ids": started,
        }));
    }
    print_started(&event.file_path, &started);
    Ok(())
}

fn print_started(file_path: &str, started: &[Uuid]) {
    if started.is_empty() {
        println!("  {} {} matched no workflow", style("-").dim(), file_path);
        return;
    }
    println!(
        "  {} {} started {} run(s)",
        style("*").green().bold(),
        style(file_path).cyan(),
        started.len()
    );
    for id in started {
        println!("    {id}");
    }
}

/// Watch `dir` until Ctrl+C, dispatching every created file.
pub async fn handle_watch(
    dir: &Path,
    org: Option<String>,
    debounce_ms: u64,
    state: &AppState,
    json: bool,
) -> Result<()> {
    let root = dir
        .canonicalize()
        .with_context(|| format!("Cannot watch {}", dir.display()))?;
    let (_handle, mut events) = start_folder_watcher(&root, org, Some(debounce_ms))?;

    if !json {
        println!();
        println!(
            "  {} Watching {} for new files",
            style("👁").bold(),
            style(root.display()).cyan()
        );
        println!("  {}", style("Press Ctrl+C to stop").dim());
        println!();
    }

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                match state.triggers.dispatch(&event).await {
                    Ok(started) if json => {
                        print_json(&serde_json::json!({
                            "file_path": event.file_path,
                            "run_ids": started,
                        }))?;
                    }
                    Ok(started) => print_started(&event.file_path, &started),
                    Err(e) => {
                        tracing::error!(file = event.file_path.as_str(), error = %e, "trigger dispatch failed");
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    Ok(())
}
