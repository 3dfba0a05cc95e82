//! SQLite workflow repository implementation.
//!
//! Implements `WorkflowRepository` from `procflow-core` using sqlx with split
//! read/write pools. Definitions and runs are stored as JSON documents; the
//! columns the engine queries on (publish state, organization, status,
//! resume time, version) are kept alongside and indexed.

use chrono::{DateTime, SecondsFormat, Utc};
use procflow_core::repository::workflow::WorkflowRepository;
use procflow_types::error::RepositoryError;
use procflow_types::workflow::{RunStatus, WorkflowDefinition, WorkflowRun};
use sqlx::Row;
use uuid::Uuid;

use super::pool::DatabasePool;

/// SQLite-backed implementation of `WorkflowRepository`.
pub struct SqliteWorkflowRepository {
    pool: DatabasePool,
}

impl SqliteWorkflowRepository {
    /// Create a new repository backed by the given database pool.
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Internal row types
// ---------------------------------------------------------------------------

struct WorkflowDefRow {
    definition: String,
}

impl WorkflowDefRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            definition: row.try_get("definition")?,
        })
    }

    fn into_definition(self) -> Result<WorkflowDefinition, RepositoryError> {
        serde_json::from_str(&self.definition)
            .map_err(|e| RepositoryError::document("workflow", e))
    }
}

struct WorkflowRunRow {
    document: String,
    version: i64,
}

impl WorkflowRunRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            document: row.try_get("document")?,
            version: row.try_get("version")?,
        })
    }

    /// The `version` column is authoritative over the copy in the document.
    fn into_run(self) -> Result<WorkflowRun, RepositoryError> {
        let mut run: WorkflowRun = serde_json::from_str(&self.document)
            .map_err(|e| RepositoryError::document("run", e))?;
        run.version = u64::try_from(self.version)
            .map_err(|_| RepositoryError::Query(format!("invalid run version: {}", self.version)))?;
        Ok(run)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Fixed-width timestamp so that text comparison in SQL orders by time.
fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn query_err(e: sqlx::Error) -> RepositoryError {
    RepositoryError::Query(e.to_string())
}

fn version_param(version: u64) -> Result<i64, RepositoryError> {
    i64::try_from(version).map_err(|_| RepositoryError::Query(format!("version overflow: {version}")))
}

fn rows_to_runs(rows: &[sqlx::sqlite::SqliteRow]) -> Result<Vec<WorkflowRun>, RepositoryError> {
    rows.iter()
        .map(|row| {
            WorkflowRunRow::from_row(row)
                .map_err(query_err)?
                .into_run()
        })
        .collect()
}

fn rows_to_definitions(
    rows: &[sqlx::sqlite::SqliteRow],
) -> Result<Vec<WorkflowDefinition>, RepositoryError> {
    rows.iter()
        .map(|row| {
            WorkflowDefRow::from_row(row)
                .map_err(query_err)?
                .into_definition()
        })
        .collect()
}

// ---------------------------------------------------------------------------
// WorkflowRepository impl
// ---------------------------------------------------------------------------

impl WorkflowRepository for SqliteWorkflowRepository {
    async fn save_definition(&self, def: &WorkflowDefinition) -> Result<(), RepositoryError> {
        let definition_json = serde_json::to_string(def)
            .map_err(|e| RepositoryError::document("workflow", e))?;
        let now = format_datetime(&Utc::now());

        sqlx::query(
            r#"INSERT INTO workflows (id, name, organization_id, is_published, is_active, definition, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 organization_id = excluded.organization_id,
                 is_published = excluded.is_published,
                 is_active = excluded.is_active,
                 definition = excluded.definition,
                 updated_at = excluded.updated_at"#,
        )
        .bind(def.id.to_string())
        .bind(&def.name)
        .bind(&def.organization_id)
        .bind(def.is_published)
        .bind(def.is_active)
        .bind(&definition_json)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool.writer)
        .await
        .map_err(query_err)?;

        Ok(())
    }

    async fn get_definition(&self, id: &Uuid) -> Result<Option<WorkflowDefinition>, RepositoryError> {
        let row = sqlx::query("SELECT definition FROM workflows WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_err)?;

        row.map(|row| {
            WorkflowDefRow::from_row(&row)
                .map_err(query_err)?
                .into_definition()
        })
        .transpose()
    }

    async fn list_definitions(&self) -> Result<Vec<WorkflowDefinition>, RepositoryError> {
        let rows = sqlx::query("SELECT definition FROM workflows ORDER BY name ASC")
            .fetch_all(&self.pool.reader)
            .await
            .map_err(query_err)?;
        rows_to_definitions(&rows)
    }

    async fn list_active_definitions(
        &self,
        organization_id: Option<&str>,
    ) -> Result<Vec<WorkflowDefinition>, RepositoryError> {
        let rows = sqlx::query(
            r#"SELECT definition FROM workflows
               WHERE is_published = 1 AND is_active = 1 AND organization_id IS ?
               ORDER BY name ASC"#,
        )
        .bind(organization_id)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_err)?;
        rows_to_definitions(&rows)
    }

    async fn delete_definition(&self, id: &Uuid) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM workflows WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool.writer)
            .await
            .map_err(query_err)?;

        Ok(result.rows_affected() > 0)
    }

    async fn create_run(&self, run: &WorkflowRun) -> Result<(), RepositoryError> {
        let document = serde_json::to_string(run)
            .map_err(|e| RepositoryError::document("run", e))?;

        let result = sqlx::query(
            r#"INSERT INTO workflow_runs
               (id, workflow_id, organization_id, status, resume_at, version, document, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(run.id.to_string())
        .bind(run.workflow_id.to_string())
        .bind(&run.organization_id)
        .bind(run.status.as_str())
        .bind(run.resume_at.as_ref().map(format_datetime))
        .bind(version_param(run.version)?)
        .bind(&document)
        .bind(format_datetime(&run.created_at))
        .bind(format_datetime(&run.updated_at))
        .execute(&self.pool.writer)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(
                RepositoryError::Conflict(format!("run {} already exists", run.id)),
            ),
            Err(e) => Err(query_err(e)),
        }
    }

    async fn get_run(&self, run_id: &Uuid) -> Result<Option<WorkflowRun>, RepositoryError> {
        let row = sqlx::query("SELECT document, version FROM workflow_runs WHERE id = ?")
            .bind(run_id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_err)?;

        row.map(|row| WorkflowRunRow::from_row(&row).map_err(query_err)?.into_run())
            .transpose()
    }

    async fn update_run(&self, run: &WorkflowRun) -> Result<u64, RepositoryError> {
        let next_version = run.version + 1;
        let mut stored = run.clone();
        stored.version = next_version;
        let document = serde_json::to_string(&stored)
            .map_err(|e| RepositoryError::document("run", e))?;

        let result = sqlx::query(
            r#"UPDATE workflow_runs
               SET status = ?, resume_at = ?, organization_id = ?, version = ?, document = ?, updated_at = ?
               WHERE id = ? AND version = ?"#,
        )
        .bind(run.status.as_str())
        .bind(run.resume_at.as_ref().map(format_datetime))
        .bind(&run.organization_id)
        .bind(version_param(next_version)?)
        .bind(&document)
        .bind(format_datetime(&run.updated_at))
        .bind(run.id.to_string())
        .bind(version_param(run.version)?)
        .execute(&self.pool.writer)
        .await
        .map_err(query_err)?;

        if result.rows_affected() == 0 {
            // Distinguish a missing run from a stale version
            let current = sqlx::query("SELECT version FROM workflow_runs WHERE id = ?")
                .bind(run.id.to_string())
                .fetch_optional(&self.pool.writer)
                .await
                .map_err(query_err)?;
            return match current {
                None => Err(RepositoryError::NotFound),
                Some(row) => {
                    let stored_version: i64 = row.try_get("version").map_err(query_err)?;
                    Err(RepositoryError::Conflict(format!(
                        "run {} is at version {stored_version}, write was based on {}",
                        run.id, run.version
                    )))
                }
            };
        }

        Ok(next_version)
    }

    async fn list_runs(
        &self,
        workflow_id: Option<&Uuid>,
        limit: u32,
    ) -> Result<Vec<WorkflowRun>, RepositoryError> {
        let rows = match workflow_id {
            Some(id) => {
                sqlx::query(
                    r#"SELECT document, version FROM workflow_runs
                       WHERE workflow_id = ?
                       ORDER BY created_at DESC, id DESC LIMIT ?"#,
                )
                .bind(id.to_string())
                .bind(limit)
                .fetch_all(&self.pool.reader)
                .await
            }
            None => {
                sqlx::query(
                    "SELECT document, version FROM workflow_runs ORDER BY created_at DESC, id DESC LIMIT ?",
                )
                .bind(limit)
                .fetch_all(&self.pool.reader)
                .await
            }
        }
        .map_err(query_err)?;

        rows_to_runs(&rows)
    }

    async fn list_due_runs(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<WorkflowRun>, RepositoryError> {
        let rows = sqlx::query(
            r#"SELECT document, version FROM workflow_runs
               WHERE status = ? AND resume_at IS NOT NULL AND resume_at <= ?
               ORDER BY resume_at ASC LIMIT ?"#,
        )
        .bind(RunStatus::WaitingDelay.as_str())
        .bind(format_datetime(&now))
        .bind(limit)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_err)?;

        rows_to_runs(&rows)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
