//! Delay/resume scheduling.
//!
//! Provides:
//! - `ResumeScheduler::tick_at`, one polling pass that claims due runs and
//!   continues them
//! - Human-readable schedule normalization ("every minute" -> cron)
//! - `ResumeTicker`, a `tokio-cron-scheduler` job that fires the tick
//!   periodically

use std::sync::Arc;

use chrono::{DateTime, Utc};
use procflow_types::error::RepositoryError;
use procflow_types::event::RunEvent;
use procflow_types::workflow::{RunStatus, WorkflowRun};
use serde::Serialize;
use tokio::sync::RwLock;
use tokio_cron_scheduler::{Job, JobScheduler};
use uuid::Uuid;

use crate::repository::user::UserDirectory;
use crate::repository::workflow::WorkflowRepository;

use super::engine::{EngineError, RunEngine};

/// Default maximum number of due runs claimed per tick.
pub const DEFAULT_BATCH_LIMIT: u32 = 100;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can occur while configuring the periodic tick.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// Failed to create or manipulate the cron job.
    #[error("scheduler error: {0}")]
    JobError(String),

    /// Invalid cron expression or schedule string.
    #[error("invalid schedule: {0}")]
    InvalidSchedule(String),
}

// ---------------------------------------------------------------------------
// Tick report
// ---------------------------------------------------------------------------

/// A run the tick could not process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TickError {
    pub run_id: Uuid,
    pub message: String,
}

/// Summary of one scheduler pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    /// Due runs found.
    pub attempted: usize,
    /// Runs claimed and continued to their next suspension or end.
    pub succeeded: usize,
    /// Runs that were claimed but could not be continued.
    pub failed: usize,
    /// Runs another writer claimed or changed first.
    pub skipped: usize,
    pub errors: Vec<TickError>,
}

// ---------------------------------------------------------------------------
// ResumeScheduler
// ---------------------------------------------------------------------------

/// Resumes runs whose delay has elapsed.
pub struct ResumeScheduler<R: WorkflowRepository, U: UserDirectory> {
    engine: Arc<RunEngine<R, U>>,
    batch_limit: u32,
}

impl<R: WorkflowRepository, U: UserDirectory> ResumeScheduler<R, U> {
    pub fn new(engine: Arc<RunEngine<R, U>>) -> Self {
        Self {
            engine,
            batch_limit: DEFAULT_BATCH_LIMIT,
        }
    }

    pub fn with_batch_limit(mut self, batch_limit: u32) -> Self {
        self.batch_limit = batch_limit;
        self
    }

    /// Run one pass at the current time.
    pub async fn tick(&self) -> Result<TickReport, EngineError> {
        self.tick_at(Utc::now()).await
    }

    /// Claim and continue every run that is `WaitingDelay` with
    /// `resume_at <= now`.
    ///
    /// Per-run failures are recorded in the report; only a failure to query
    /// due runs is returned as an error.
    pub async fn tick_at(&self, now: DateTime<Utc>) -> Result<TickReport, EngineError> {
        let due = self
            .engine
            .repository()
            .list_due_runs(now, self.batch_limit)
            .await?;

        let mut report = TickReport {
            attempted: due.len(),
            ..TickReport::default()
        };

        for run in due {
            let run_id = run.id;
            let claimed = match self.claim(run, now).await {
                Ok(Some(run)) => run,
                Ok(None) => {
                    tracing::debug!(run_id = %run_id, "run already claimed, skipping");
                    report.skipped += 1;
                    continue;
                }
                Err(e) => {
                    tracing::warn!(run_id = %run_id, error = %e, "failed to claim run");
                    report.failed += 1;
                    report.errors.push(TickError {
                        run_id,
                        message: e.to_string(),
                    });
                    continue;
                }
            };

            match self.engine.continue_run(claimed, now).await {
                Ok(run) => {
                    tracing::info!(run_id = %run_id, status = %run.status, "run resumed");
                    report.succeeded += 1;
                }
                Err(e) => {
                    tracing::warn!(run_id = %run_id, error = %e, "resumed run could not continue");
                    report.failed += 1;
                    report.errors.push(TickError {
                        run_id,
                        message: e.to_string(),
                    });
                }
            }
        }

        if report.attempted > 0 {
            tracing::info!(
                attempted = report.attempted,
                succeeded = report.succeeded,
                failed = report.failed,
                skipped = report.skipped,
                "resume tick finished"
            );
        }
        Ok(report)
    }

    /// Move a due run to `Running` with a write conditional on the version
    /// read. Returns `None` when another writer got there first.
    async fn claim(
        &self,
        mut run: WorkflowRun,
        now: DateTime<Utc>,
    ) -> Result<Option<WorkflowRun>, RepositoryError> {
        if run.status != RunStatus::WaitingDelay || run.resume_at.is_none_or(|at| at > now) {
            return Ok(None);
        }
        run.status = RunStatus::Running;
        run.resume_at = None;
        run.updated_at = now;

        match self.engine.repository().update_run(&run).await {
            Ok(version) => {
                run.version = version;
                self.engine
                    .event_bus()
                    .publish(RunEvent::RunResumed { run_id: run.id });
                Ok(Some(run))
            }
            Err(RepositoryError::Conflict(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

// ---------------------------------------------------------------------------
// Human-readable schedule normalization
// ---------------------------------------------------------------------------

/// Normalize a human-readable schedule string to a 6-field cron expression.
///
/// Supported patterns (case-insensitive):
/// - "every N seconds"     -> "*/N * * * * *"
/// - "every N minutes"     -> "0 */N * * * *"
/// - "every N hours"       -> "0 0 */N * * *"
/// - "every minute"        -> "0 * * * * *"
/// - "every hour"          -> "0 0 * * * *"
/// - "every day at HH:MM"  -> "0 MM HH * * *"
///
/// 5-field cron expressions get a leading seconds field; 6-field ones pass
/// through unchanged.
pub fn normalize_schedule(input: &str) -> Result<String, SchedulerError> {
    let trimmed = input.trim();
    let invalid = || SchedulerError::InvalidSchedule(input.to_string());

    let parts: Vec<&str> = trimmed.split_whitespace().collect();
    if parts.len() == 5 {
        return Ok(format!("0 {trimmed}"));
    }
    if parts.len() == 6 {
        return Ok(trimmed.to_string());
    }

    let lower = trimmed.to_lowercase();
    match lower.as_str() {
        "every minute" | "minutely" => return Ok("0 * * * * *".to_string()),
        "every hour" | "hourly" => return Ok("0 0 * * * *".to_string()),
        "every day" | "daily" => return Ok("0 0 0 * * *".to_string()),
        _ => {}
    }

    let Some(rest) = lower.strip_prefix("every ") else {
        return Err(invalid());
    };

    if let Some(at) = rest.strip_prefix("day at ") {
        let (hour, minute) = at.split_once(':').ok_or_else(invalid)?;
        let hour: u32 = hour.trim().parse().map_err(|_| invalid())?;
        let minute: u32 = minute.trim().parse().map_err(|_| invalid())?;
        if hour < 24 && minute < 60 {
            return Ok(format!("0 {minute} {hour} * * *"));
        }
        return Err(invalid());
    }

    let words: Vec<&str> = rest.split_whitespace().collect();
    if let [n, unit] = words.as_slice() {
        let n: u32 = n.parse().map_err(|_| invalid())?;
        if n == 0 {
            return Err(SchedulerError::InvalidSchedule(
                "interval must be > 0".to_string(),
            ));
        }
        return match unit.trim_end_matches('s') {
            "second" => Ok(format!("*/{n} * * * * *")),
            "minute" => Ok(format!("0 */{n} * * * *")),
            "hour" => Ok(format!("0 0 */{n} * * *")),
            _ => Err(invalid()),
        };
    }

    Err(invalid())
}

// ---------------------------------------------------------------------------
// ResumeTicker
// ---------------------------------------------------------------------------

/// Callback invoked each time the ticker fires.
pub type TickCallback =
    Arc<dyn Fn(DateTime<Utc>) -> futures_util::future::BoxFuture<'static, ()> + Send + Sync>;

/// Periodic driver for the resume tick, wrapping `tokio-cron-scheduler`.
pub struct ResumeTicker {
    inner: RwLock<Option<JobScheduler>>,
}

impl ResumeTicker {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(None),
        }
    }

    /// Start firing `callback` on `schedule` (cron or human-readable).
    pub async fn start(&self, schedule: &str, callback: TickCallback) -> Result<(), SchedulerError> {
        let cron_expr = normalize_schedule(schedule)?;

        let job = Job::new_async(cron_expr.as_str(), move |_uuid, _lock| {
            let cb = callback.clone();
            Box::pin(async move {
                let now = Utc::now();
                tracing::debug!(%now, "resume tick fired");
                cb(now).await;
            })
        })
        .map_err(|e| SchedulerError::InvalidSchedule(e.to_string()))?;

        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| SchedulerError::JobError(e.to_string()))?;
        scheduler
            .add(job)
            .await
            .map_err(|e| SchedulerError::JobError(e.to_string()))?;
        scheduler
            .start()
            .await
            .map_err(|e| SchedulerError::JobError(e.to_string()))?;

        let mut inner = self.inner.write().await;
        if let Some(mut previous) = inner.replace(scheduler) {
            previous
                .shutdown()
                .await
                .map_err(|e| SchedulerError::JobError(e.to_string()))?;
        }

        tracing::info!(schedule = cron_expr.as_str(), "resume ticker started");
        Ok(())
    }

    /// Stop the ticker. A no-op when it was never started.
    pub async fn stop(&self) -> Result<(), SchedulerError> {
        let mut inner = self.inner.write().await;
        if let Some(mut scheduler) = inner.take() {
            scheduler
                .shutdown()
                .await
                .map_err(|e| SchedulerError::JobError(e.to_string()))?;
            tracing::info!("resume ticker stopped");
        }
        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        self.inner.read().await.is_some()
    }
}

impl Default for ResumeTicker {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
