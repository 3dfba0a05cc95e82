//! Pure run state transitions.
//!
//! `apply_result` folds one `ExecutionResult` into a run: it appends the log
//! entry, stores step output in the context, moves the cursor, and sets the
//! status. Persistence and event publishing are left to the engine.

use chrono::{DateTime, Utc};
use procflow_types::event::RunEvent;
use procflow_types::workflow::{
    LogEntry, LogKind, LogOutcome, RunStatus, StepDefinition, WorkflowDefinition, WorkflowRun,
};
use serde_json::{Value, json};

use super::step_runner::ExecutionResult;

/// Context key under which a step's output is stored.
///
/// Named outputs use `output_variable_name`; anonymous ones use
/// `step_<index>`.
pub fn output_key(step: Option<&StepDefinition>, step_index: usize) -> String {
    step.and_then(|s| s.output_variable_name.as_deref())
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(String::from)
        .unwrap_or_else(|| format!("step_{step_index}"))
}

/// Store `output` in the run context for the step at `step_index`.
///
/// Named outputs are stored as-is; anonymous outputs are wrapped as
/// `{ "output": ... }`.
pub fn store_output(
    run: &mut WorkflowRun,
    definition: Option<&WorkflowDefinition>,
    step_index: usize,
    output: Value,
) {
    let step = definition.and_then(|d| d.steps.get(step_index));
    let key = output_key(step, step_index);
    let named = step.is_some_and(|s| {
        s.output_variable_name
            .as_deref()
            .is_some_and(|n| !n.trim().is_empty())
    });
    let value = if named { output } else { json!({ "output": output }) };
    run.context.insert(key, value);
}

/// Apply an execution result for the step at `step_index` and return the
/// events describing the transition.
///
/// The run must be `Running`; the caller checks this before executing.
pub fn apply_result(
    run: &mut WorkflowRun,
    definition: &WorkflowDefinition,
    step_index: usize,
    result: ExecutionResult,
    now: DateTime<Utc>,
) -> Vec<RunEvent> {
    let Some(step) = definition.steps.get(step_index) else {
        return vec![block(run, format!("step index {step_index} is out of range"), now)];
    };
    run.updated_at = now;

    let entry = |outcome, output| LogEntry {
        step_id: step.id.clone(),
        step_index,
        action: Some(step.action()),
        kind: LogKind::Step,
        timestamp: now,
        output,
        outcome,
        resolution_comment: None,
    };

    match result {
        ExecutionResult::Success { output, next_index } => {
            run.logs.push(entry(LogOutcome::Success, output.clone()));
            store_output(run, Some(definition), step_index, output);
            run.current_step_index = next_index;

            let mut events = vec![RunEvent::StepCompleted {
                run_id: run.id,
                step_id: step.id.clone(),
                step_index,
                action: step.action().to_string(),
            }];
            if next_index >= definition.steps.len() {
                events.push(complete(run, now));
            }
            events
        }
        ExecutionResult::Waiting { resume_at } => {
            run.logs
                .push(entry(LogOutcome::Success, json!({ "resume_at": resume_at })));
            run.current_step_index = step_index + 1;
            run.status = RunStatus::WaitingDelay;
            run.resume_at = Some(resume_at);
            vec![RunEvent::RunWaiting {
                run_id: run.id,
                resume_at,
            }]
        }
        ExecutionResult::AwaitingActor { assignee } => {
            run.status = RunStatus::InProgress;
            vec![RunEvent::RunAwaitingActor {
                run_id: run.id,
                step_id: step.id.clone(),
                assignee,
            }]
        }
        ExecutionResult::Flagged { reason, output } => {
            run.logs.push(entry(
                LogOutcome::Flagged,
                json!({ "reason": reason, "output": output }),
            ));
            run.current_step_index = step_index + 1;
            run.status = RunStatus::Flagged;
            vec![RunEvent::RunFlagged {
                run_id: run.id,
                step_id: step.id.clone(),
                reason,
            }]
        }
        ExecutionResult::Failure { error } => {
            run.logs
                .push(entry(LogOutcome::Failure, json!({ "error": error })));
            run.status = RunStatus::Failed;
            run.error = Some(error.clone());
            run.completed_at = Some(now);
            vec![RunEvent::RunFailed {
                run_id: run.id,
                step_id: step.id.clone(),
                error,
            }]
        }
    }
}

/// Mark the run completed.
pub fn complete(run: &mut WorkflowRun, now: DateTime<Utc>) -> RunEvent {
    run.status = RunStatus::Completed;
    run.resume_at = None;
    run.completed_at = Some(now);
    run.updated_at = now;
    RunEvent::RunCompleted {
        run_id: run.id,
        workflow_name: run.workflow_name.clone(),
        steps_completed: run.step_attempts(),
    }
}

/// Mark the run blocked with the given reason.
pub fn block(run: &mut WorkflowRun, reason: String, now: DateTime<Utc>) -> RunEvent {
    run.status = RunStatus::Blocked;
    run.resume_at = None;
    run.error = Some(reason.clone());
    run.updated_at = now;
    RunEvent::RunBlocked {
        run_id: run.id,
        reason,
    }
}
