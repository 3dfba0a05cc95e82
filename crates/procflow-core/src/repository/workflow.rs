//! Workflow repository trait definition.
//!
//! Defines the storage interface for workflow definitions and runs. The
//! infrastructure layer (procflow-infra) implements this trait with SQLite
//! persistence; `memory::InMemoryWorkflowRepository` backs tests.

use chrono::{DateTime, Utc};
use procflow_types::error::RepositoryError;
use procflow_types::workflow::{WorkflowDefinition, WorkflowRun};
use uuid::Uuid;

/// Repository trait for workflow persistence.
///
/// Covers two entity families:
/// - **Definitions:** CRUD for workflow definitions.
/// - **Runs:** Create/query runs and update them with optimistic concurrency.
///
/// Run writes are conditional on `WorkflowRun::version`: `update_run` only
/// succeeds when the stored version equals the version the caller read, and
/// returns the new version. A stale write yields `RepositoryError::Conflict`.
///
/// Uses native async fn in traits (Rust 2024 edition, no async_trait macro).
pub trait WorkflowRepository: Send + Sync {
    // -----------------------------------------------------------------------
    // Definitions
    // -----------------------------------------------------------------------

    /// Upsert a workflow definition (insert or replace by ID).
    fn save_definition(
        &self,
        def: &WorkflowDefinition,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Get a workflow definition by its UUID.
    fn get_definition(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<WorkflowDefinition>, RepositoryError>> + Send;

    /// List all workflow definitions, ordered by name.
    fn list_definitions(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<WorkflowDefinition>, RepositoryError>> + Send;

    /// Published, active definitions belonging to `organization_id` (or to no
    /// organization when `None`). Candidates for trigger matching.
    fn list_active_definitions(
        &self,
        organization_id: Option<&str>,
    ) -> impl std::future::Future<Output = Result<Vec<WorkflowDefinition>, RepositoryError>> + Send;

    /// Delete a workflow definition by ID. Returns `true` if it existed.
    fn delete_definition(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;

    // -----------------------------------------------------------------------
    // Runs
    // -----------------------------------------------------------------------

    /// Insert a new run. Fails with `Conflict` if the ID already exists.
    fn create_run(
        &self,
        run: &WorkflowRun,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Get a run by its UUID.
    fn get_run(
        &self,
        run_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<WorkflowRun>, RepositoryError>> + Send;

    /// Replace a run if its stored version equals `run.version`.
    ///
    /// Returns the new version (`run.version + 1`).
    fn update_run(
        &self,
        run: &WorkflowRun,
    ) -> impl std::future::Future<Output = Result<u64, RepositoryError>> + Send;

    /// List runs, newest first, optionally for a single workflow.
    fn list_runs(
        &self,
        workflow_id: Option<&Uuid>,
        limit: u32,
    ) -> impl std::future::Future<Output = Result<Vec<WorkflowRun>, RepositoryError>> + Send;

    /// Runs waiting on a delay whose `resume_at <= now`, oldest due first.
    fn list_due_runs(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> impl std::future::Future<Output = Result<Vec<WorkflowRun>, RepositoryError>> + Send;
}
