//! In-memory implementations of the repository ports.
//!
//! Backed by `DashMap`, so conditional run updates are atomic per entry. Used
//! by the engine tests and for ephemeral runs where no database is wanted.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use procflow_types::error::RepositoryError;
use procflow_types::workflow::{RunStatus, UserIdentity, WorkflowDefinition, WorkflowRun};
use uuid::Uuid;

use super::user::UserDirectory;
use super::workflow::WorkflowRepository;

/// Workflow repository holding definitions and runs in concurrent maps.
#[derive(Debug, Default)]
pub struct InMemoryWorkflowRepository {
    definitions: DashMap<Uuid, WorkflowDefinition>,
    runs: DashMap<Uuid, WorkflowRun>,
}

impl InMemoryWorkflowRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl WorkflowRepository for InMemoryWorkflowRepository {
    async fn save_definition(&self, def: &WorkflowDefinition) -> Result<(), RepositoryError> {
        self.definitions.insert(def.id, def.clone());
        Ok(())
    }

    async fn get_definition(&self, id: &Uuid) -> Result<Option<WorkflowDefinition>, RepositoryError> {
        Ok(self.definitions.get(id).map(|d| d.clone()))
    }

    async fn list_definitions(&self) -> Result<Vec<WorkflowDefinition>, RepositoryError> {
        let mut defs: Vec<_> = self.definitions.iter().map(|d| d.clone()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(defs)
    }

    async fn list_active_definitions(
        &self,
        organization_id: Option<&str>,
    ) -> Result<Vec<WorkflowDefinition>, RepositoryError> {
        let mut defs: Vec<_> = self
            .definitions
            .iter()
            .filter(|d| d.is_published && d.is_active)
            .filter(|d| d.organization_id.as_deref() == organization_id)
            .map(|d| d.clone())
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(defs)
    }

    async fn delete_definition(&self, id: &Uuid) -> Result<bool, RepositoryError> {
        Ok(self.definitions.remove(id).is_some())
    }

    async fn create_run(&self, run: &WorkflowRun) -> Result<(), RepositoryError> {
        match self.runs.entry(run.id) {
            Entry::Occupied(_) => Err(RepositoryError::Conflict(format!(
                "run {} already exists",
                run.id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(run.clone());
                Ok(())
            }
        }
    }

    async fn get_run(&self, run_id: &Uuid) -> Result<Option<WorkflowRun>, RepositoryError> {
        Ok(self.runs.get(run_id).map(|r| r.clone()))
    }

    async fn update_run(&self, run: &WorkflowRun) -> Result<u64, RepositoryError> {
        let mut stored = self.runs.get_mut(&run.id).ok_or(RepositoryError::NotFound)?;
        if stored.version != run.version {
            return Err(RepositoryError::Conflict(format!(
                "run {} is at version {}, write was based on {}",
                run.id, stored.version, run.version
            )));
        }
        let mut next = run.clone();
        next.version = run.version + 1;
        *stored = next;
        Ok(run.version + 1)
    }

    async fn list_runs(
        &self,
        workflow_id: Option<&Uuid>,
        limit: u32,
    ) -> Result<Vec<WorkflowRun>, RepositoryError> {
        let mut runs: Vec<_> = self
            .runs
            .iter()
            .filter(|r| workflow_id.is_none_or(|id| &r.workflow_id == id))
            .map(|r| r.clone())
            .collect();
        runs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        runs.truncate(limit as usize);
        Ok(runs)
    }

    async fn list_due_runs(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<WorkflowRun>, RepositoryError> {
        let mut runs: Vec<_> = self
            .runs
            .iter()
            .filter(|r| r.status == RunStatus::WaitingDelay)
            .filter(|r| r.resume_at.is_some_and(|at| at <= now))
            .map(|r| r.clone())
            .collect();
        runs.sort_by_key(|r| r.resume_at);
        runs.truncate(limit as usize);
        Ok(runs)
    }
}

/// User directory keyed by lowercase email.
#[derive(Debug, Default)]
pub struct InMemoryUserDirectory {
    users: DashMap<String, UserIdentity>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user, replacing any existing entry with the same email.
    pub fn insert(&self, user: UserIdentity) {
        self.users.insert(user.email.to_lowercase(), user);
    }
}

impl UserDirectory for InMemoryUserDirectory {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserIdentity>, RepositoryError> {
        Ok(self
            .users
            .get(&email.trim().to_lowercase())
            .map(|u| u.clone()))
    }
}
