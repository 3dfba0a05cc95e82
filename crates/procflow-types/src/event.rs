//! Event types for the procflow run event bus.
//!
//! `RunEvent` is broadcast by the engine as runs move between states.
//! All variants are Clone + Send + Sync for use with tokio broadcast channels.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Events emitted while runs execute.
///
/// Subscribers (logging, the HTTP layer, tests) receive every event published
/// after they subscribed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    /// A run was created and is about to execute its first step.
    RunStarted {
        run_id: Uuid,
        workflow_name: String,
        source: String,
    },

    /// A step finished successfully.
    StepCompleted {
        run_id: Uuid,
        step_id: String,
        step_index: usize,
        action: String,
    },

    /// A run parked on a delay step.
    RunWaiting {
        run_id: Uuid,
        resume_at: DateTime<Utc>,
    },

    /// A run resumed after its delay elapsed.
    RunResumed { run_id: Uuid },

    /// A run parked on a human-owned step.
    RunAwaitingActor {
        run_id: Uuid,
        step_id: String,
        assignee: Option<String>,
    },

    /// A step was flagged for human review.
    RunFlagged {
        run_id: Uuid,
        step_id: String,
        reason: String,
    },

    /// A run finished all of its steps.
    RunCompleted {
        run_id: Uuid,
        workflow_name: String,
        steps_completed: usize,
    },

    /// A step failed and the run stopped.
    RunFailed {
        run_id: Uuid,
        step_id: String,
        error: String,
    },

    /// A run could not continue (missing definition or invalid cursor).
    RunBlocked { run_id: Uuid, reason: String },

    /// The human actor responsible for a run changed.
    RunReassigned {
        run_id: Uuid,
        from: Option<String>,
        to: String,
    },
}

impl RunEvent {
    /// The run this event belongs to.
    pub fn run_id(&self) -> Uuid {
        match self {
            RunEvent::RunStarted { run_id, .. }
            | RunEvent::StepCompleted { run_id, .. }
            | RunEvent::RunWaiting { run_id, .. }
            | RunEvent::RunResumed { run_id }
            | RunEvent::RunAwaitingActor { run_id, .. }
            | RunEvent::RunFlagged { run_id, .. }
            | RunEvent::RunCompleted { run_id, .. }
            | RunEvent::RunFailed { run_id, .. }
            | RunEvent::RunBlocked { run_id, .. }
            | RunEvent::RunReassigned { run_id, .. } => *run_id,
        }
    }

    /// Snake-case event name, matching the serialized `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            RunEvent::RunStarted { .. } => "run_started",
            RunEvent::StepCompleted { .. } => "step_completed",
            RunEvent::RunWaiting { .. } => "run_waiting",
            RunEvent::RunResumed { .. } => "run_resumed",
            RunEvent::RunAwaitingActor { .. } => "run_awaiting_actor",
            RunEvent::RunFlagged { .. } => "run_flagged",
            RunEvent::RunCompleted { .. } => "run_completed",
            RunEvent::RunFailed { .. } => "run_failed",
            RunEvent::RunBlocked { .. } => "run_blocked",
            RunEvent::RunReassigned { .. } => "run_reassigned",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_started_serde_roundtrip() {
        let event = RunEvent::RunStarted {
            run_id: Uuid::now_v7(),
            workflow_name: "intake".to_string(),
            source: "manual".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"run_started\""));
        assert_eq!(event.kind(), "run_started");
        let parsed: RunEvent = serde_json::from_str(&json).unwrap();
        assert!(matches!(parsed, RunEvent::RunStarted { .. }));
    }

    #[test]
    fn test_run_waiting_serde_roundtrip() {
        let resume_at = Utc::now();
        let event = RunEvent::RunWaiting {
            run_id: Uuid::now_v7(),
            resume_at,
        };
        let json = serde_json::to_string(&event).unwrap();
        let parsed: RunEvent = serde_json::from_str(&json).unwrap();
        match parsed {
            RunEvent::RunWaiting { resume_at: at, .. } => assert_eq!(at, resume_at),
            other => panic!("expected RunWaiting, got {other:?}"),
        }
    }

    #[test]
    fn test_run_id_accessor() {
        let id = Uuid::now_v7();
        let events = [
            RunEvent::RunResumed { run_id: id },
            RunEvent::RunBlocked {
                run_id: id,
                reason: "workflow deleted".to_string(),
            },
            RunEvent::RunReassigned {
                run_id: id,
                from: None,
                to: "b@acme.test".to_string(),
            },
        ];
        for event in events {
            assert_eq!(event.run_id(), id);
            let tag = serde_json::to_value(&event).unwrap()["type"].clone();
            assert_eq!(tag, event.kind());
        }
    }
}
