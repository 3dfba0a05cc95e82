//! Run engine: drives runs through the state machine and persists every
//! transition.
//!
//! The engine executes one step at a time. After each step it applies the
//! result, writes the run back conditionally on its version, publishes the
//! resulting events, and continues while the run is still `Running`. Every
//! public operation (start, submit input, resolve, reopen, reassign, resume)
//! ends when the run reaches its next suspension or terminal status.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use procflow_types::error::RepositoryError;
use procflow_types::event::RunEvent;
use procflow_types::workflow::{
    RunContext, RunSource, RunStatus, UserIdentity, ValidationReport, WorkflowDefinition,
    WorkflowRun,
};
use uuid::Uuid;

use crate::event::bus::EventBus;
use crate::repository::user::UserDirectory;
use crate::repository::workflow::WorkflowRepository;

use super::definition::{WorkflowError, validate_definition};
use super::escalation::{self, EscalationError};
use super::step_runner::{ExecutionResult, StepRunner};
use super::transition;
use super::validation;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors returned by engine operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("repository error: {0}")]
    Repository(RepositoryError),

    /// A concurrent writer updated the run first.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("run {0} not found")]
    RunNotFound(Uuid),

    #[error("workflow {0} not found")]
    WorkflowNotFound(Uuid),

    #[error("no user with email '{0}'")]
    UserNotFound(String),

    /// Step configuration is incomplete; the run was not started.
    #[error("workflow has {} invalid step(s)", .0.errors.len())]
    InvalidDefinition(ValidationReport),

    /// Structural problem with a workflow definition.
    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    /// An escalation guard rejected the operation.
    #[error(transparent)]
    Escalation(#[from] EscalationError),

    /// The run's status does not allow the operation.
    #[error("invalid transition: {0}")]
    InvalidTransition(String),
}

impl From<RepositoryError> for EngineError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::Conflict(msg) => EngineError::Conflict(msg),
            other => EngineError::Repository(other),
        }
    }
}

// ---------------------------------------------------------------------------
// RunEngine
// ---------------------------------------------------------------------------

/// Executes workflow runs against a repository and user directory.
///
/// Generic over the storage ports so the same engine runs on SQLite in the
/// binary and on in-memory maps in tests.
pub struct RunEngine<R: WorkflowRepository, U: UserDirectory> {
    repo: Arc<R>,
    users: Arc<U>,
    runner: StepRunner,
    event_bus: EventBus,
}

impl<R: WorkflowRepository, U: UserDirectory> RunEngine<R, U> {
    pub fn new(repo: Arc<R>, users: Arc<U>, runner: StepRunner, event_bus: EventBus) -> Self {
        Self {
            repo,
            users,
            runner,
            event_bus,
        }
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    // -----------------------------------------------------------------------
    // Definitions
    // -----------------------------------------------------------------------

    /// Check a definition's structure and store it.
    pub async fn save_workflow(&self, definition: &WorkflowDefinition) -> Result<(), EngineError> {
        validate_definition(definition)?;
        self.repo.save_definition(definition).await?;
        tracing::info!(
            workflow_id = %definition.id,
            workflow = definition.name.as_str(),
            steps = definition.steps.len(),
            "workflow saved"
        );
        Ok(())
    }

    async fn load_definition(&self, workflow_id: &Uuid) -> Result<WorkflowDefinition, EngineError> {
        self.repo
            .get_definition(workflow_id)
            .await?
            .ok_or(EngineError::WorkflowNotFound(*workflow_id))
    }

    /// Validate the step configuration of a stored workflow.
    pub async fn validate_workflow(
        &self,
        workflow_id: &Uuid,
    ) -> Result<ValidationReport, EngineError> {
        let definition = self.load_definition(workflow_id).await?;
        Ok(validation::validate(&definition.steps))
    }

    // -----------------------------------------------------------------------
    // Starting and continuing runs
    // -----------------------------------------------------------------------

    /// Start a run of a stored workflow with the given initial input.
    pub async fn start_run(
        &self,
        workflow_id: &Uuid,
        input: RunContext,
        source: RunSource,
    ) -> Result<WorkflowRun, EngineError> {
        let definition = self.load_definition(workflow_id).await?;
        self.start_run_for(&definition, input, source).await
    }

    /// Start a run of an already-loaded definition.
    pub async fn start_run_for(
        &self,
        definition: &WorkflowDefinition,
        input: RunContext,
        source: RunSource,
    ) -> Result<WorkflowRun, EngineError> {
        let report = validation::validate(&definition.steps);
        if !report.valid {
            tracing::warn!(
                workflow_id = %definition.id,
                errors = report.errors.len(),
                "refusing to start run of invalid workflow"
            );
            return Err(EngineError::InvalidDefinition(report));
        }

        let now = Utc::now();
        let run = WorkflowRun::new(definition, source, input, now);
        self.repo.create_run(&run).await?;

        tracing::info!(
            run_id = %run.id,
            workflow = definition.name.as_str(),
            source = ?source,
            "run started"
        );
        self.event_bus.publish(RunEvent::RunStarted {
            run_id: run.id,
            workflow_name: definition.name.clone(),
            source: format!("{source:?}").to_lowercase(),
        });

        self.drive(run, Some(definition), now).await
    }

    /// Continue a run that was just moved to `Running` by a caller holding
    /// its latest version.
    pub async fn continue_run(
        &self,
        run: WorkflowRun,
        now: DateTime<Utc>,
    ) -> Result<WorkflowRun, EngineError> {
        let definition = self.repo.get_definition(&run.workflow_id).await?;
        self.drive(run, definition.as_ref(), now).await
    }

    pub async fn get_run(&self, run_id: &Uuid) -> Result<WorkflowRun, EngineError> {
        self.repo
            .get_run(run_id)
            .await?
            .ok_or(EngineError::RunNotFound(*run_id))
    }

    // -----------------------------------------------------------------------
    // Human input and escalation
    // -----------------------------------------------------------------------

    /// Merge human-submitted values into an `InProgress` run and resume it.
    pub async fn submit_input(
        &self,
        run_id: &Uuid,
        values: RunContext,
    ) -> Result<WorkflowRun, EngineError> {
        let mut run = self.get_run(run_id).await?;
        if run.status != RunStatus::InProgress {
            return Err(EngineError::InvalidTransition(format!(
                "run {} is {}, input can only be submitted while in_progress",
                run.id, run.status
            )));
        }

        let now = Utc::now();
        run.context.extend(values);
        run.status = RunStatus::Running;
        run.updated_at = now;
        self.persist(&mut run).await?;

        tracing::info!(run_id = %run.id, "input submitted, resuming run");
        self.continue_run(run, now).await
    }

    /// Accept the flagged step recorded at `log_index` and continue the run.
    pub async fn resolve_flag(
        &self,
        run_id: &Uuid,
        log_index: usize,
        comment: &str,
    ) -> Result<WorkflowRun, EngineError> {
        let mut run = self.get_run(run_id).await?;
        let definition = self.repo.get_definition(&run.workflow_id).await?;
        let now = Utc::now();

        escalation::resolve(&mut run, definition.as_ref(), log_index, comment, now)?;
        self.persist(&mut run).await?;

        tracing::info!(run_id = %run.id, log_index, "flag resolved");
        self.drive(run, definition.as_ref(), now).await
    }

    /// Rewind a flagged run to the step recorded at `log_index` and re-run it.
    pub async fn reopen_flag(
        &self,
        run_id: &Uuid,
        log_index: usize,
        comment: &str,
    ) -> Result<WorkflowRun, EngineError> {
        let mut run = self.get_run(run_id).await?;
        let now = Utc::now();

        escalation::reopen(&mut run, log_index, comment, now)?;
        self.persist(&mut run).await?;

        tracing::info!(
            run_id = %run.id,
            log_index,
            step_index = run.current_step_index,
            "flag reopened"
        );
        self.continue_run(run, now).await
    }

    /// Hand a waiting or flagged run to the user with `email`.
    pub async fn reassign(&self, run_id: &Uuid, email: &str) -> Result<UserIdentity, EngineError> {
        let mut run = self.get_run(run_id).await?;
        escalation::check_reassign(&run)?;

        let assignee = self
            .users
            .find_by_email(email)
            .await?
            .ok_or_else(|| EngineError::UserNotFound(email.to_string()))?;

        let from = run.current_assignee.as_ref().map(|u| u.email.clone());
        escalation::reassign(&mut run, assignee.clone(), Utc::now())?;
        self.persist(&mut run).await?;

        tracing::info!(
            run_id = %run.id,
            from = from.as_deref().unwrap_or("-"),
            to = assignee.email.as_str(),
            "run reassigned"
        );
        self.event_bus.publish(RunEvent::RunReassigned {
            run_id: run.id,
            from,
            to: assignee.email.clone(),
        });
        Ok(assignee)
    }

    // -----------------------------------------------------------------------
    // Execution loop
    // -----------------------------------------------------------------------

    /// Execute steps until the run leaves `Running`.
    async fn drive(
        &self,
        mut run: WorkflowRun,
        definition: Option<&WorkflowDefinition>,
        now: DateTime<Utc>,
    ) -> Result<WorkflowRun, EngineError> {
        while run.status == RunStatus::Running {
            let Some(definition) = definition else {
                let reason = format!("workflow {} no longer exists", run.workflow_id);
                let event = transition::block(&mut run, reason, now);
                self.commit(&mut run, vec![event]).await?;
                break;
            };

            let step_index = run.current_step_index;
            if step_index == definition.steps.len() {
                let event = transition::complete(&mut run, now);
                self.commit(&mut run, vec![event]).await?;
                break;
            }
            if step_index > definition.steps.len() {
                let reason = format!(
                    "cursor {step_index} is past the last step ({})",
                    definition.steps.len()
                );
                let event = transition::block(&mut run, reason, now);
                self.commit(&mut run, vec![event]).await?;
                break;
            }

            let result = self.runner.execute(&run, step_index, definition, now).await;

            if let ExecutionResult::AwaitingActor {
                assignee: Some(email),
            } = &result
            {
                run.current_assignee = self.users.find_by_email(email).await?;
                if run.current_assignee.is_none() {
                    tracing::warn!(run_id = %run.id, assignee = email.as_str(), "assignee not in directory");
                }
            }

            let events = transition::apply_result(&mut run, definition, step_index, result, now);
            self.commit(&mut run, events).await?;
        }

        Ok(run)
    }

    /// Persist the run and publish its events.
    async fn commit(&self, run: &mut WorkflowRun, events: Vec<RunEvent>) -> Result<(), EngineError> {
        self.persist(run).await?;
        for event in events {
            log_event(&event);
            self.event_bus.publish(event);
        }
        Ok(())
    }

    /// Conditionally write the run and adopt the new version.
    async fn persist(&self, run: &mut WorkflowRun) -> Result<(), EngineError> {
        run.version = self.repo.update_run(run).await?;
        Ok(())
    }
}

fn log_event(event: &RunEvent) {
    match event {
        RunEvent::StepCompleted {
            run_id,
            step_id,
            action,
            ..
        } => tracing::debug!(run_id = %run_id, step_id = step_id.as_str(), action = action.as_str(), "step completed"),
        RunEvent::RunWaiting { run_id, resume_at } => {
            tracing::info!(run_id = %run_id, resume_at = %resume_at, "run waiting on delay")
        }
        RunEvent::RunAwaitingActor {
            run_id, step_id, ..
        } => tracing::info!(run_id = %run_id, step_id = step_id.as_str(), "run awaiting input"),
        RunEvent::RunFlagged {
            run_id,
            step_id,
            reason,
        } => tracing::info!(run_id = %run_id, step_id = step_id.as_str(), reason = reason.as_str(), "step flagged"),
        RunEvent::RunCompleted {
            run_id,
            steps_completed,
            ..
        } => tracing::info!(run_id = %run_id, steps_completed, "run completed"),
        RunEvent::RunFailed {
            run_id,
            step_id,
            error,
        } => tracing::warn!(run_id = %run_id, step_id = step_id.as_str(), error = error.as_str(), "run failed"),
        RunEvent::RunBlocked { run_id, reason } => {
            tracing::warn!(run_id = %run_id, reason = reason.as_str(), "run blocked")
        }
        RunEvent::RunStarted { .. } | RunEvent::RunResumed { .. } | RunEvent::RunReassigned { .. } => {}
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::memory::{InMemoryUserDirectory, InMemoryWorkflowRepository};
    use crate::workflow::testing::{RecordingServices, definition, step};
    use procflow_types::workflow::{
        CaptureInputConfig, CompareConfig, DelayConfig, DelayUnit, InputDataType,
        InsertRecordConfig, LogKind, LogOutcome, StepConfig, TransformConfig,
    };
    use serde_json::json;

    type Engine = RunEngine<InMemoryWorkflowRepository, InMemoryUserDirectory>;

    fn engine() -> (Engine, Arc<RecordingServices>, Arc<InMemoryUserDirectory>) {
        let services = Arc::new(RecordingServices::default());
        let users = Arc::new(InMemoryUserDirectory::new());
        let engine = RunEngine::new(
            Arc::new(InMemoryWorkflowRepository::new()),
            users.clone(),
            StepRunner::new(services.clone()),
            EventBus::new(64),
        );
        (engine, services, users)
    }

    fn input(value: serde_json::Value) -> RunContext {
        match value {
            serde_json::Value::Object(map) => map,
            _ => RunContext::new(),
        }
    }

    fn user(email: &str) -> UserIdentity {
        UserIdentity {
            id: Uuid::now_v7(),
            email: email.to_string(),
            display_name: email.to_string(),
        }
    }

    fn capture(id: &str, label: &str) -> procflow_types::workflow::StepDefinition {
        let mut s = step(
            id,
            StepConfig::CaptureInput(CaptureInputConfig {
                label: label.to_string(),
                data_type: Some(InputDataType::Text),
                required: true,
                ..Default::default()
            }),
        );
        s.assignee = Some("clerk@acme.test".to_string());
        s
    }

    fn mismatch() -> procflow_types::workflow::StepDefinition {
        step(
            "cmp",
            StepConfig::Compare(CompareConfig {
                left: Some(json!(1)),
                right: Some(json!(2)),
                flag_on_mismatch: true,
                ..Default::default()
            }),
        )
    }

    #[tokio::test]
    async fn run_of_transforms_completes() {
        let (engine, _, _) = engine();
        let def = definition(vec![
            step("a", StepConfig::Transform(TransformConfig::default())),
            step("b", StepConfig::Transform(TransformConfig::default())),
        ]);
        engine.save_workflow(&def).await.unwrap();
        let mut events = engine.event_bus().subscribe();

        let run = engine
            .start_run(&def.id, RunContext::new(), RunSource::Manual)
            .await
            .unwrap();

        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.logs.len(), 2);
        assert!(run.completed_at.is_some());

        let stored = engine.get_run(&run.id).await.unwrap();
        assert_eq!(stored.status, RunStatus::Completed);
        assert_eq!(stored.version, run.version);

        assert!(matches!(events.recv().await.unwrap(), RunEvent::RunStarted { .. }));
    }

    #[tokio::test]
    async fn invalid_workflow_is_not_started() {
        let (engine, _, _) = engine();
        let def = definition(vec![step("d", StepConfig::Delay(DelayConfig::default()))]);
        engine.save_workflow(&def).await.unwrap();

        let err = engine
            .start_run(&def.id, RunContext::new(), RunSource::Manual)
            .await
            .unwrap_err();
        match err {
            EngineError::InvalidDefinition(report) => assert_eq!(report.errors[0].step_id, "d"),
            other => panic!("expected invalid definition, got {other:?}"),
        }
        assert!(engine.repository().list_runs(None, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_workflow_is_not_found() {
        let (engine, _, _) = engine();
        let id = Uuid::now_v7();
        assert!(matches!(
            engine.start_run(&id, RunContext::new(), RunSource::Manual).await,
            Err(EngineError::WorkflowNotFound(missing)) if missing == id
        ));
    }

    #[tokio::test]
    async fn missing_input_parks_run_until_submitted() {
        let (engine, services, users) = engine();
        users.insert(user("clerk@acme.test"));
        let def = definition(vec![
            capture("name", "Name"),
            step(
                "save",
                StepConfig::InsertRecord(InsertRecordConfig {
                    collection: "people".to_string(),
                    data: json!({ "name": "{{name}}" }),
                }),
            ),
        ]);
        engine.save_workflow(&def).await.unwrap();

        let run = engine
            .start_run(&def.id, RunContext::new(), RunSource::Manual)
            .await
            .unwrap();
        assert_eq!(run.status, RunStatus::InProgress);
        assert_eq!(run.current_assignee.as_ref().unwrap().email, "clerk@acme.test");
        assert!(run.logs.is_empty());

        let run = engine
            .submit_input(&run.id, input(json!({ "name": "Jane" })))
            .await
            .unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(services.records(), vec![("people".to_string(), json!({ "name": "Jane" }))]);
    }

    #[tokio::test]
    async fn submit_input_requires_in_progress() {
        let (engine, _, _) = engine();
        let def = definition(vec![step("a", StepConfig::Transform(TransformConfig::default()))]);
        engine.save_workflow(&def).await.unwrap();
        let run = engine
            .start_run(&def.id, RunContext::new(), RunSource::Manual)
            .await
            .unwrap();
        assert!(matches!(
            engine.submit_input(&run.id, RunContext::new()).await,
            Err(EngineError::InvalidTransition(_))
        ));
    }

    #[tokio::test]
    async fn resolve_continues_after_flagged_step() {
        let (engine, _, _) = engine();
        let def = definition(vec![
            mismatch(),
            step("after", StepConfig::Transform(TransformConfig::default())),
        ]);
        engine.save_workflow(&def).await.unwrap();

        let run = engine
            .start_run(&def.id, RunContext::new(), RunSource::Manual)
            .await
            .unwrap();
        assert_eq!(run.status, RunStatus::Flagged);
        assert_eq!(run.current_step_index, 1);

        let run = engine.resolve_flag(&run.id, 0, "accepted").await.unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.logs.len(), 2);
        assert_eq!(run.logs[0].outcome, LogOutcome::Success);
        assert_eq!(run.context["step_0"]["resolution_comment"], json!("accepted"));
    }

    #[tokio::test]
    async fn reopen_reexecutes_flagged_step() {
        let (engine, _, _) = engine();
        let def = definition(vec![mismatch()]);
        engine.save_workflow(&def).await.unwrap();

        let run = engine
            .start_run(&def.id, RunContext::new(), RunSource::Manual)
            .await
            .unwrap();
        let run = engine.reopen_flag(&run.id, 0, "try again").await.unwrap();

        // Same operands, so the step flags again
        assert_eq!(run.status, RunStatus::Flagged);
        assert_eq!(run.logs.len(), 2);
        assert_eq!(run.logs[0].resolution_comment.as_deref(), Some("try again"));
    }

    #[tokio::test]
    async fn reassign_flagged_run() {
        let (engine, _, users) = engine();
        users.insert(user("lead@acme.test"));
        let def = definition(vec![mismatch()]);
        engine.save_workflow(&def).await.unwrap();
        let run = engine
            .start_run(&def.id, RunContext::new(), RunSource::Manual)
            .await
            .unwrap();

        let assignee = engine.reassign(&run.id, "LEAD@acme.test").await.unwrap();
        assert_eq!(assignee.email, "lead@acme.test");

        let stored = engine.get_run(&run.id).await.unwrap();
        assert_eq!(stored.current_assignee, Some(assignee));
        assert_eq!(stored.logs.last().unwrap().kind, LogKind::Reassignment);
    }

    #[tokio::test]
    async fn reassign_guards_leave_run_untouched() {
        let (engine, _, users) = engine();
        users.insert(user("lead@acme.test"));
        let def = definition(vec![step("a", StepConfig::Transform(TransformConfig::default()))]);
        engine.save_workflow(&def).await.unwrap();
        let run = engine
            .start_run(&def.id, RunContext::new(), RunSource::Manual)
            .await
            .unwrap();
        assert_eq!(run.status, RunStatus::Completed);

        assert!(matches!(
            engine.reassign(&run.id, "lead@acme.test").await,
            Err(EngineError::Escalation(EscalationError::InvalidStatus { .. }))
        ));
        let stored = engine.get_run(&run.id).await.unwrap();
        assert_eq!(stored.version, run.version);
        assert!(stored.current_assignee.is_none());

        let flagged_def = definition(vec![mismatch()]);
        engine.save_workflow(&flagged_def).await.unwrap();
        let flagged = engine
            .start_run(&flagged_def.id, RunContext::new(), RunSource::Manual)
            .await
            .unwrap();
        assert!(matches!(
            engine.reassign(&flagged.id, "ghost@acme.test").await,
            Err(EngineError::UserNotFound(_))
        ));
        assert_eq!(engine.get_run(&flagged.id).await.unwrap().version, flagged.version);
    }

    #[tokio::test]
    async fn missing_definition_blocks_run() {
        let (engine, _, _) = engine();
        let def = definition(vec![
            step(
                "wait",
                StepConfig::Delay(DelayConfig {
                    duration: 1,
                    unit: DelayUnit::Minutes,
                }),
            ),
            step("after", StepConfig::Transform(TransformConfig::default())),
        ]);
        engine.save_workflow(&def).await.unwrap();
        let mut run = engine
            .start_run(&def.id, RunContext::new(), RunSource::Manual)
            .await
            .unwrap();
        engine.repository().delete_definition(&def.id).await.unwrap();

        run.status = RunStatus::Running;
        run.resume_at = None;
        run.version = engine.repository().update_run(&run).await.unwrap();
        let run = engine.continue_run(run, Utc::now()).await.unwrap();
        assert_eq!(run.status, RunStatus::Blocked);
        assert!(run.error.unwrap().contains("no longer exists"));
    }

    #[tokio::test]
    async fn stale_write_is_a_conflict() {
        let (engine, _, _) = engine();
        let def = definition(vec![mismatch()]);
        engine.save_workflow(&def).await.unwrap();
        let run = engine
            .start_run(&def.id, RunContext::new(), RunSource::Manual)
            .await
            .unwrap();

        // Someone else resolves first; our copy is now stale
        let mut stale = run.clone();
        engine.resolve_flag(&run.id, 0, "first").await.unwrap();
        stale.status = RunStatus::Running;
        assert!(matches!(
            engine.continue_run(stale, Utc::now()).await,
            Err(EngineError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn step_attempts_never_exceed_cursor() {
        let (engine, _, _) = engine();
        let def = definition(vec![
            step("a", StepConfig::Transform(TransformConfig::default())),
            mismatch(),
            step("c", StepConfig::Transform(TransformConfig::default())),
        ]);
        engine.save_workflow(&def).await.unwrap();
        let run = engine
            .start_run(&def.id, RunContext::new(), RunSource::Manual)
            .await
            .unwrap();
        assert!(run.step_attempts() <= run.current_step_index + 1);

        let run = engine.resolve_flag(&run.id, 1, "ok").await.unwrap();
        assert!(run.step_attempts() <= run.current_step_index + 1);
        assert_eq!(run.status, RunStatus::Completed);
    }
}
