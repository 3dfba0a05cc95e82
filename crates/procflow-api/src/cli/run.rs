//! CLI run subcommands.
//!
//! Start runs, inspect their logs, submit human input, and handle
//! escalations (resolve, reopen, reassign).

use anyhow::Result;
use clap::Subcommand;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use uuid::Uuid;

use procflow_core::repository::workflow::WorkflowRepository;
use procflow_types::workflow::{LogOutcome, RunSource, RunStatus, WorkflowRun};

use super::{parse_json_object, print_json};
use crate::state::AppState;

/// Run management subcommands.
#[derive(Subcommand)]
pub enum RunCommand {
    /// Start a run of a workflow.
    Start {
        /// Workflow UUID.
        workflow_id: Uuid,

        /// Initial input as a JSON object.
        #[arg(long)]
        input: Option<String>,
    },

    /// Show a run with its step log.
    Show {
        /// Run UUID.
        run_id: Uuid,
    },

    /// List recent runs.
    #[command(alias = "ls")]
    List {
        /// Only runs of this workflow.
        #[arg(long)]
        workflow: Option<Uuid>,

        /// Maximum number of runs to display.
        #[arg(long, default_value = "20")]
        limit: u32,
    },

    /// Submit values for a run waiting on human input.
    Submit {
        /// Run UUID.
        run_id: Uuid,

        /// Values as a JSON object, merged into the run context.
        #[arg(long)]
        values: String,
    },

    /// Accept a flagged step and continue the run.
    Resolve {
        /// Run UUID.
        run_id: Uuid,

        /// Index of the flagged entry in the run log.
        log_index: usize,

        /// Reviewer comment recorded on the entry.
        #[arg(long, default_value = "")]
        comment: String,
    },

    /// Re-run a flagged step.
    Reopen {
        /// Run UUID.
        run_id: Uuid,

        /// Index of the flagged entry in the run log.
        log_index: usize,

        /// Reviewer comment recorded on the entry.
        #[arg(long, default_value = "")]
        comment: String,
    },

    /// Hand a waiting or flagged run to another user.
    Reassign {
        /// Run UUID.
        run_id: Uuid,

        /// Email of the new assignee.
        email: String,
    },
}

/// Handle a run subcommand.
pub async fn handle_run_command(cmd: RunCommand, state: &AppState, json: bool) -> Result<()> {
    match cmd {
        RunCommand::Start { workflow_id, input } => {
            let input = parse_json_object(input.as_deref())?;
            let run = state
                .engine
                .start_run(&workflow_id, input, RunSource::Manual)
                .await?;
            display_run(&run, json)
        }
        RunCommand::Show { run_id } => {
            let run = state.engine.get_run(&run_id).await?;
            display_run(&run, json)
        }
        RunCommand::List { workflow, limit } => handle_list(workflow.as_ref(), limit, state, json).await,
        RunCommand::Submit { run_id, values } => {
            let values = parse_json_object(Some(&values))?;
            let run = state.engine.submit_input(&run_id, values).await?;
            display_run(&run, json)
        }
        RunCommand::Resolve {
            run_id,
            log_index,
            comment,
        } => {
            let run = state.engine.resolve_flag(&run_id, log_index, &comment).await?;
            display_run(&run, json)
        }
        RunCommand::Reopen {
            run_id,
            log_index,
            comment,
        } => {
            let run = state.engine.reopen_flag(&run_id, log_index, &comment).await?;
            display_run(&run, json)
        }
        RunCommand::Reassign { run_id, email } => {
            let assignee = state.engine.reassign(&run_id, &email).await?;
            if json {
                return print_json(&assignee);
            }
            println!();
            println!(
                "  {} Run {} reassigned to {} <{}>",
                style("*").green().bold(),
                short_id(&run_id),
                style(&assignee.display_name).cyan(),
                assignee.email
            );
            println!();
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// List
// ---------------------------------------------------------------------------

async fn handle_list(
    workflow_id: Option<&Uuid>,
    limit: u32,
    state: &AppState,
    json: bool,
) -> Result<()> {
    let runs = state
        .engine
        .repository()
        .list_runs(workflow_id, limit)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to list runs: {e}"))?;

    if json {
        return print_json(&runs);
    }

    if runs.is_empty() {
        println!();
        println!("  No runs yet.");
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Run ID").fg(Color::Cyan),
            Cell::new("Workflow"),
            Cell::new("Status"),
            Cell::new("Step"),
            Cell::new("Started"),
            Cell::new("Resume at"),
        ]);

    for r in &runs {
        let resume_at = r
            .resume_at
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());
        table.add_row(vec![
            Cell::new(r.id.to_string()),
            Cell::new(&r.workflow_name),
            format_status(r.status),
            Cell::new(r.current_step_index),
            Cell::new(r.created_at.format("%Y-%m-%d %H:%M").to_string()),
            Cell::new(resume_at),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    Ok(())
}

// ---------------------------------------------------------------------------
// Display
// ---------------------------------------------------------------------------

fn display_run(run: &WorkflowRun, json: bool) -> Result<()> {
    if json {
        return print_json(run);
    }

    println!();
    println!(
        "  {} {} ({})",
        style("Run").bold(),
        style(run.id).cyan(),
        style(&run.workflow_name).dim()
    );
    println!(
        "  Status: {}  Step: {}",
        status_style(run.status),
        run.current_step_index
    );
    if let Some(resume_at) = run.resume_at {
        println!("  Resumes at: {}", resume_at.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    if let Some(assignee) = &run.current_assignee {
        println!("  Assignee: {} <{}>", assignee.display_name, assignee.email);
    }
    if let Some(err) = &run.error {
        println!("  Error: {}", style(err).red());
    }

    if !run.logs.is_empty() {
        let mut table = Table::new();
        table
            .load_preset(presets::UTF8_FULL_CONDENSED)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(vec![
                Cell::new("#"),
                Cell::new("Step").fg(Color::Cyan),
                Cell::new("Action"),
                Cell::new("Outcome"),
                Cell::new("At"),
                Cell::new("Comment"),
            ]);
        for (i, entry) in run.logs.iter().enumerate() {
            let outcome = match entry.outcome {
                LogOutcome::Success => Cell::new("success").fg(Color::Green),
                LogOutcome::Failure => Cell::new("failure").fg(Color::Red),
                LogOutcome::Flagged => Cell::new("flagged").fg(Color::Yellow),
            };
            table.add_row(vec![
                Cell::new(i),
                Cell::new(&entry.step_id),
                Cell::new(entry.action.map(|a| a.as_str()).unwrap_or("-")),
                outcome,
                Cell::new(entry.timestamp.format("%H:%M:%S").to_string()),
                Cell::new(entry.resolution_comment.as_deref().unwrap_or("")),
            ]);
        }
        println!();
        println!("{table}");
    }
    println!();

    Ok(())
}

fn short_id(id: &Uuid) -> String {
    id.to_string().chars().take(8).collect()
}

fn status_style(status: RunStatus) -> console::StyledObject<&'static str> {
    let text = status.as_str();
    match status {
        RunStatus::Running => style(text).blue(),
        RunStatus::InProgress | RunStatus::WaitingDelay => style(text).magenta(),
        RunStatus::Flagged => style(text).yellow(),
        RunStatus::Completed => style(text).green(),
        RunStatus::Failed | RunStatus::Blocked => style(text).red(),
    }
}

fn format_status(status: RunStatus) -> Cell {
    let cell = Cell::new(status.as_str());
    match status {
        RunStatus::Running => cell.fg(Color::Blue),
        RunStatus::InProgress | RunStatus::WaitingDelay => cell.fg(Color::Magenta),
        RunStatus::Flagged => cell.fg(Color::Yellow),
        RunStatus::Completed => cell.fg(Color::Green),
        RunStatus::Failed => cell.fg(Color::Red),
        RunStatus::Blocked => cell.fg(Color::DarkRed),
    }
}
