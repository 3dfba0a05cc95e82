//! CLI workflow definition subcommands.
//!
//! Provides create, sync, list, show, validate and delete for workflow
//! definitions stored in the database.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Subcommand;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use uuid::Uuid;

use procflow_core::repository::workflow::WorkflowRepository;
use procflow_core::workflow::definition::{WorkflowError, discover_workflows, load_workflow_file};
use procflow_core::workflow::validation;
use procflow_infra::filesystem::workflows_dir;
use procflow_types::workflow::{TriggerConfig, ValidationReport, WorkflowDefinition};

use super::print_json;
use crate::state::AppState;

/// Workflow management subcommands.
#[derive(Subcommand)]
pub enum WorkflowCommand {
    /// Register a workflow from a YAML or JSON file.
    Create {
        /// Path to the workflow file.
        file: PathBuf,
    },

    /// Register every workflow file found in the data directory's `workflows/`.
    Sync,

    /// List registered workflows.
    List,

    /// Show a workflow definition.
    Show {
        /// Workflow UUID.
        id: Uuid,
    },

    /// Check every step's configuration.
    Validate {
        /// Workflow UUID.
        id: Uuid,
    },

    /// Delete a registered workflow. Existing runs become blocked on resume.
    Delete {
        /// Workflow UUID.
        id: Uuid,
    },
}

/// Handle a workflow subcommand.
pub async fn handle_workflow_command(
    cmd: WorkflowCommand,
    state: &AppState,
    json: bool,
) -> Result<()> {
    match cmd {
        WorkflowCommand::Create { file } => handle_create(&file, state, json).await,
        WorkflowCommand::Sync => handle_sync(state, json).await,
        WorkflowCommand::List => handle_list(state, json).await,
        WorkflowCommand::Show { id } => handle_show(&id, state, json).await,
        WorkflowCommand::Validate { id } => handle_validate(&id, state, json).await,
        WorkflowCommand::Delete { id } => handle_delete(&id, state, json).await,
    }
}

// ---------------------------------------------------------------------------
// Create / Sync
// ---------------------------------------------------------------------------

async fn handle_create(file: &PathBuf, state: &AppState, json: bool) -> Result<()> {
    let def = load_workflow_file(file).map_err(|e| match e {
        WorkflowError::Parse(msg) => anyhow::anyhow!("Failed to parse workflow file: {msg}"),
        WorkflowError::Invalid(problems) => {
            anyhow::anyhow!("Invalid workflow:\n  - {}", problems.join("\n  - "))
        }
        other => anyhow::anyhow!("Failed to load workflow: {other}"),
    })?;

    state.engine.save_workflow(&def).await?;
    let report = validation::validate(&def.steps);

    if json {
        return print_json(&serde_json::json!({
            "id": def.id.to_string(),
            "name": def.name,
            "steps": def.steps.len(),
            "validation": report,
        }));
    }

    println!();
    println!(
        "  {} Created workflow '{}'",
        style("*").green().bold(),
        style(&def.name).cyan()
    );
    println!("  ID: {}", def.id);
    println!("  Steps: {}", def.steps.len());
    println!("  Trigger: {}", describe_trigger(&def));
    if !report.valid {
        println!();
        print_report(&report);
    }
    println!();

    Ok(())
}

async fn handle_sync(state: &AppState, json: bool) -> Result<()> {
    let dir = workflows_dir(&state.data_dir);
    let found = discover_workflows(&dir)
        .with_context(|| format!("Failed to scan {}", dir.display()))?;

    let mut saved = Vec::new();
    for (path, def) in found {
        match state.engine.save_workflow(&def).await {
            Ok(()) => saved.push(def),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping workflow file");
            }
        }
    }

    if json {
        let out: Vec<_> = saved
            .iter()
            .map(|d| serde_json::json!({ "id": d.id.to_string(), "name": d.name }))
            .collect();
        return print_json(&out);
    }

    println!();
    println!(
        "  {} Synced {} workflow(s) from {}",
        style("*").green().bold(),
        saved.len(),
        style(dir.display()).dim()
    );
    println!();
    Ok(())
}

// ---------------------------------------------------------------------------
// List / Show
// ---------------------------------------------------------------------------

async fn handle_list(state: &AppState, json: bool) -> Result<()> {
    let defs = state
        .engine
        .repository()
        .list_definitions()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to list workflows: {e}"))?;

    if json {
        let out: Vec<_> = defs
            .iter()
            .map(|d| {
                serde_json::json!({
                    "id": d.id.to_string(),
                    "name": d.name,
                    "organization_id": d.organization_id,
                    "steps": d.steps.len(),
                    "published": d.is_published,
                    "active": d.is_active,
                })
            })
            .collect();
        return print_json(&out);
    }

    if defs.is_empty() {
        println!();
        println!("  No workflows registered.");
        println!(
            "  Create one with: {}",
            style("procflow workflow create <file.yaml>").dim()
        );
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Name").fg(Color::Cyan),
            Cell::new("ID"),
            Cell::new("Org"),
            Cell::new("Steps"),
            Cell::new("Trigger"),
            Cell::new("State"),
        ]);

    for d in &defs {
        let state_cell = match (d.is_published, d.is_active) {
            (true, true) => Cell::new("live").fg(Color::Green),
            (true, false) => Cell::new("paused").fg(Color::Yellow),
            (false, _) => Cell::new("draft").fg(Color::DarkGrey),
        };
        table.add_row(vec![
            Cell::new(&d.name),
            Cell::new(d.id.to_string()),
            Cell::new(d.organization_id.as_deref().unwrap_or("-")),
            Cell::new(d.steps.len()),
            Cell::new(describe_trigger(d)),
            state_cell,
        ]);
    }

    println!();
    println!("{table}");
    println!();

    Ok(())
}

async fn handle_show(id: &Uuid, state: &AppState, json: bool) -> Result<()> {
    let def = state
        .engine
        .repository()
        .get_definition(id)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to look up workflow: {e}"))?
        .ok_or_else(|| anyhow::anyhow!("Workflow '{id}' not found"))?;

    if json {
        return print_json(&def);
    }

    println!();
    println!("  {} {}", style("Workflow:").bold(), style(&def.name).cyan());
    if let Some(desc) = &def.description {
        println!("  {}", style(desc).dim());
    }
    println!("  Trigger: {}", describe_trigger(&def));
    println!();

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("#"),
            Cell::new("Step").fg(Color::Cyan),
            Cell::new("Action"),
            Cell::new("Title"),
            Cell::new("Assignee"),
        ]);
    for (i, step) in def.steps.iter().enumerate() {
        table.add_row(vec![
            Cell::new(i),
            Cell::new(&step.id),
            Cell::new(step.action().as_str()),
            Cell::new(&step.title),
            Cell::new(step.assignee.as_deref().unwrap_or("-")),
        ]);
    }
    println!("{table}");
    println!();

    Ok(())
}

// ---------------------------------------------------------------------------
// Validate / Delete
// ---------------------------------------------------------------------------

async fn handle_validate(id: &Uuid, state: &AppState, json: bool) -> Result<()> {
    let report = state.engine.validate_workflow(id).await?;

    if json {
        return print_json(&report);
    }

    println!();
    if report.valid {
        println!("  {} All steps are configured", style("✓").green());
    } else {
        print_report(&report);
    }
    println!();
    Ok(())
}

async fn handle_delete(id: &Uuid, state: &AppState, json: bool) -> Result<()> {
    let deleted = state
        .engine
        .repository()
        .delete_definition(id)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to delete workflow: {e}"))?;

    if !deleted {
        bail!("Workflow '{id}' not found");
    }

    if json {
        return print_json(&serde_json::json!({ "deleted": id.to_string() }));
    }

    println!();
    println!("  {} Deleted workflow {}", style("*").green().bold(), id);
    println!();
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn describe_trigger(def: &WorkflowDefinition) -> String {
    match &def.trigger {
        Some(TriggerConfig::FileCreated { folder_path }) => format!("file created in {folder_path}"),
        Some(TriggerConfig::Manual {}) | None => "manual".to_string(),
    }
}

fn print_report(report: &ValidationReport) {
    println!(
        "  {} {} step(s) need configuration:",
        style("!").yellow().bold(),
        report.errors.len()
    );
    for issue in &report.errors {
        println!("    {} {}", style(&issue.step_id).cyan(), issue.message);
    }
}
