//! Application state wiring all services together.
//!
//! AppState holds the concrete engine, scheduler and trigger matcher used by
//! both the CLI and the REST API. The engine is generic over its storage
//! ports; AppState pins it to the SQLite implementations.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use procflow_core::event::EventBus;
use procflow_core::workflow::engine::RunEngine;
use procflow_core::workflow::scheduler::ResumeScheduler;
use procflow_core::workflow::step_runner::StepRunner;
use procflow_core::workflow::trigger::{TriggerMatcher, folder_matcher};
use procflow_infra::config::{load_global_config, resolve_batch_limit, resolve_min_confidence};
use procflow_infra::filesystem::{database_url, documents_dir, resolve_data_dir};
use procflow_infra::sqlite::pool::DatabasePool;
use procflow_infra::sqlite::services::SqliteStepServices;
use procflow_infra::sqlite::user::SqliteUserDirectory;
use procflow_infra::sqlite::workflow::SqliteWorkflowRepository;
use procflow_types::config::GlobalConfig;

/// Concrete type aliases for the engine generics pinned to infra implementations.
pub type ConcreteEngine = RunEngine<SqliteWorkflowRepository, SqliteUserDirectory>;

pub type ConcreteScheduler = ResumeScheduler<SqliteWorkflowRepository, SqliteUserDirectory>;

pub type ConcreteTriggerMatcher = TriggerMatcher<SqliteWorkflowRepository, SqliteUserDirectory>;

/// Shared application state.
///
/// Used by both CLI commands and REST API handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ConcreteEngine>,
    pub scheduler: Arc<ConcreteScheduler>,
    pub triggers: Arc<ConcreteTriggerMatcher>,
    pub users: Arc<SqliteUserDirectory>,
    pub config: Arc<GlobalConfig>,
    pub data_dir: PathBuf,
    pub db_pool: DatabasePool,
}

impl AppState {
    /// Initialize the application state in the resolved data directory.
    pub async fn init() -> anyhow::Result<Self> {
        Self::init_at(&resolve_data_dir()).await
    }

    /// Initialize the application state in `data_dir`: load config, connect
    /// to the database, wire the engine.
    pub async fn init_at(data_dir: &Path) -> anyhow::Result<Self> {
        tokio::fs::create_dir_all(data_dir).await?;

        let config = load_global_config(data_dir).await;
        let db_pool = DatabasePool::connect(&database_url(data_dir), &config.database).await?;

        let repo = Arc::new(SqliteWorkflowRepository::new(db_pool.clone()));
        let users = Arc::new(SqliteUserDirectory::new(db_pool.clone()));
        let services = Arc::new(SqliteStepServices::new(
            db_pool.clone(),
            documents_dir(data_dir),
        ));

        let runner =
            StepRunner::new(services).with_default_min_confidence(resolve_min_confidence(&config));
        let engine = Arc::new(RunEngine::new(
            repo,
            users.clone(),
            runner,
            EventBus::default(),
        ));

        let scheduler = Arc::new(
            ResumeScheduler::new(engine.clone()).with_batch_limit(resolve_batch_limit(&config)),
        );
        let triggers = Arc::new(TriggerMatcher::new(
            engine.clone(),
            folder_matcher(config.triggers.matcher),
        ));

        tracing::debug!(data_dir = %data_dir.display(), "application state ready");

        Ok(Self {
            engine,
            scheduler,
            triggers,
            users,
            config: Arc::new(config),
            data_dir: data_dir.to_path_buf(),
            db_pool,
        })
    }
}
