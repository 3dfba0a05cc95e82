//! Human intervention on flagged and waiting-for-actor runs.
//!
//! Each operation checks its guards first and leaves the run untouched when
//! a guard fails. Persisting the mutated run and continuing execution is the
//! engine's job.

use chrono::{DateTime, Utc};
use procflow_types::workflow::{
    LogEntry, LogKind, LogOutcome, RunStatus, UserIdentity, WorkflowDefinition, WorkflowRun,
};
use serde_json::{Value, json};
use thiserror::Error;

use super::transition::output_key;

/// Guard failures for escalation operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EscalationError {
    /// The run is not in a status that allows the operation.
    #[error("cannot {operation} a run that is {status}")]
    InvalidStatus {
        operation: &'static str,
        status: RunStatus,
    },

    /// No log entry at the given index.
    #[error("log entry {0} does not exist")]
    LogIndexOutOfRange(usize),

    /// The log entry exists but is not flagged.
    #[error("log entry {0} is not flagged")]
    EntryNotFlagged(usize),

    /// The log entry is a system entry, not a step attempt.
    #[error("log entry {0} is not a step entry")]
    NotAStepEntry(usize),
}

fn require_status(
    run: &WorkflowRun,
    operation: &'static str,
    allowed: &[RunStatus],
) -> Result<(), EscalationError> {
    if allowed.contains(&run.status) {
        Ok(())
    } else {
        Err(EscalationError::InvalidStatus {
            operation,
            status: run.status,
        })
    }
}

fn step_entry(run: &WorkflowRun, log_index: usize) -> Result<&LogEntry, EscalationError> {
    let entry = run
        .logs
        .get(log_index)
        .ok_or(EscalationError::LogIndexOutOfRange(log_index))?;
    if entry.kind != LogKind::Step {
        return Err(EscalationError::NotAStepEntry(log_index));
    }
    Ok(entry)
}

/// Accept a flagged step.
///
/// Marks the entry successful with `comment`, merges its output and the
/// comment into the context under the step's output key, and sets the run
/// back to `Running`. The cursor already points past the flagged step.
pub fn resolve(
    run: &mut WorkflowRun,
    definition: Option<&WorkflowDefinition>,
    log_index: usize,
    comment: &str,
    now: DateTime<Utc>,
) -> Result<(), EscalationError> {
    require_status(run, "resolve", &[RunStatus::Flagged])?;
    let entry = step_entry(run, log_index)?;
    if entry.outcome != LogOutcome::Flagged {
        return Err(EscalationError::EntryNotFlagged(log_index));
    }

    let step_index = entry.step_index;
    // Flagged entries carry `{reason, output}`; the step output is the inner value.
    let output = entry
        .output
        .get("output")
        .cloned()
        .unwrap_or_else(|| entry.output.clone());

    let mut merged = match output {
        Value::Object(map) => map,
        Value::Null => serde_json::Map::new(),
        other => {
            let mut map = serde_json::Map::new();
            map.insert("output".to_string(), other);
            map
        }
    };
    merged.insert("resolution_comment".to_string(), json!(comment));

    let step = definition.and_then(|d| d.steps.get(step_index));
    run.context
        .insert(output_key(step, step_index), Value::Object(merged));

    let entry = &mut run.logs[log_index];
    entry.outcome = LogOutcome::Success;
    entry.resolution_comment = Some(comment.to_string());

    run.status = RunStatus::Running;
    run.updated_at = now;
    Ok(())
}

/// Send a flagged run back to the step recorded at `log_index`.
///
/// Records `comment` on the entry and rewinds the cursor so the engine
/// re-executes that step.
pub fn reopen(
    run: &mut WorkflowRun,
    log_index: usize,
    comment: &str,
    now: DateTime<Utc>,
) -> Result<(), EscalationError> {
    require_status(run, "reopen", &[RunStatus::Flagged])?;
    let step_index = step_entry(run, log_index)?.step_index;

    run.logs[log_index].resolution_comment = Some(comment.to_string());
    run.current_step_index = step_index;
    run.status = RunStatus::Running;
    run.updated_at = now;
    Ok(())
}

/// Check that a run may be reassigned, without mutating it.
pub fn check_reassign(run: &WorkflowRun) -> Result<(), EscalationError> {
    require_status(run, "reassign", &[RunStatus::InProgress, RunStatus::Flagged])
}

/// Hand the run to `assignee` and record the change as a system log entry.
pub fn reassign(
    run: &mut WorkflowRun,
    assignee: UserIdentity,
    now: DateTime<Utc>,
) -> Result<(), EscalationError> {
    check_reassign(run)?;

    let from = run.current_assignee.as_ref().map(|u| u.email.clone());
    run.logs.push(LogEntry {
        step_id: "reassignment".to_string(),
        step_index: run.current_step_index,
        action: None,
        kind: LogKind::Reassignment,
        timestamp: now,
        output: json!({ "from": from, "to": assignee.email }),
        outcome: LogOutcome::Success,
        resolution_comment: None,
    });
    run.current_assignee = Some(assignee);
    run.updated_at = now;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::step_runner::ExecutionResult;
    use crate::workflow::testing::{definition, step};
    use crate::workflow::transition::apply_result;
    use procflow_types::workflow::{RunContext, RunSource, StepConfig, TransformConfig};
    use uuid::Uuid;

    fn flagged_run() -> (WorkflowDefinition, WorkflowRun) {
        let def = definition(vec![
            step("check", StepConfig::Transform(TransformConfig::default())),
            step("next", StepConfig::Transform(TransformConfig::default())),
        ]);
        let mut run = WorkflowRun::new(&def, RunSource::Manual, RunContext::new(), Utc::now());
        apply_result(
            &mut run,
            &def,
            0,
            ExecutionResult::Flagged {
                reason: "mismatch".to_string(),
                output: json!({ "total": 10 }),
            },
            Utc::now(),
        );
        (def, run)
    }

    fn user(email: &str) -> UserIdentity {
        UserIdentity {
            id: Uuid::now_v7(),
            email: email.to_string(),
            display_name: email.to_string(),
        }
    }

    #[test]
    fn resolve_marks_entry_and_merges_output() {
        let (def, mut run) = flagged_run();
        resolve(&mut run, Some(&def), 0, "looks fine", Utc::now()).unwrap();

        assert_eq!(run.status, RunStatus::Running);
        assert_eq!(run.current_step_index, 1);
        assert_eq!(run.logs[0].outcome, LogOutcome::Success);
        assert_eq!(run.logs[0].resolution_comment.as_deref(), Some("looks fine"));
        assert_eq!(
            run.context["step_0"],
            json!({ "total": 10, "resolution_comment": "looks fine" })
        );
    }

    #[test]
    fn resolve_requires_flagged_entry() {
        let (def, mut run) = flagged_run();
        assert_eq!(
            resolve(&mut run, Some(&def), 4, "x", Utc::now()),
            Err(EscalationError::LogIndexOutOfRange(4))
        );

        resolve(&mut run, Some(&def), 0, "ok", Utc::now()).unwrap();
        run.status = RunStatus::Flagged;
        assert_eq!(
            resolve(&mut run, Some(&def), 0, "again", Utc::now()),
            Err(EscalationError::EntryNotFlagged(0))
        );
    }

    #[test]
    fn reopen_rewinds_cursor() {
        let (_, mut run) = flagged_run();
        reopen(&mut run, 0, "redo", Utc::now()).unwrap();
        assert_eq!(run.current_step_index, 0);
        assert_eq!(run.status, RunStatus::Running);
        assert_eq!(run.logs[0].resolution_comment.as_deref(), Some("redo"));
    }

    #[test]
    fn reopen_rejects_running_run() {
        let (_, mut run) = flagged_run();
        run.status = RunStatus::Running;
        assert!(matches!(
            reopen(&mut run, 0, "redo", Utc::now()),
            Err(EscalationError::InvalidStatus { operation: "reopen", .. })
        ));
        assert_eq!(run.current_step_index, 1);
    }

    #[test]
    fn reassign_records_system_entry() {
        let (_, mut run) = flagged_run();
        run.current_assignee = Some(user("old@acme.test"));
        reassign(&mut run, user("new@acme.test"), Utc::now()).unwrap();

        let entry = run.logs.last().unwrap();
        assert_eq!(entry.kind, LogKind::Reassignment);
        assert_eq!(entry.output, json!({ "from": "old@acme.test", "to": "new@acme.test" }));
        assert_eq!(run.current_assignee.as_ref().unwrap().email, "new@acme.test");
        assert_eq!(run.step_attempts(), 1);
    }

    #[test]
    fn reassign_on_completed_run_is_rejected_without_mutation() {
        let (_, mut run) = flagged_run();
        run.status = RunStatus::Completed;
        let logs_before = run.logs.len();
        let err = reassign(&mut run, user("new@acme.test"), Utc::now()).unwrap_err();
        assert!(matches!(err, EscalationError::InvalidStatus { operation: "reassign", .. }));
        assert_eq!(run.logs.len(), logs_before);
        assert!(run.current_assignee.is_none());
    }

    #[test]
    fn system_entries_cannot_be_reopened() {
        let (_, mut run) = flagged_run();
        reassign(&mut run, user("a@acme.test"), Utc::now()).unwrap();
        assert_eq!(
            reopen(&mut run, 1, "x", Utc::now()),
            Err(EscalationError::NotAStepEntry(1))
        );
    }
}
