//! SQLite connection pools for the workflow store.
//!
//! One writer connection serializes every INSERT/UPDATE, which is what makes
//! the version-checked run updates race-free. Reads go through a separate
//! read-only pool so listing runs never waits on a resume batch. Both run in
//! WAL mode.

use std::str::FromStr;
use std::time::Duration;

use procflow_types::config::DatabaseConfig;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};

#[derive(Clone)]
pub struct DatabasePool {
    pub reader: SqlitePool,
    pub writer: SqlitePool,
}

impl DatabasePool {
    /// Open the store at `database_url` with default settings.
    pub async fn new(database_url: &str) -> Result<Self, sqlx::Error> {
        Self::connect(database_url, &DatabaseConfig::default()).await
    }

    /// Open the store, apply pending migrations, then open the reader pool.
    pub async fn connect(database_url: &str, config: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(config.busy_timeout_secs))
            .create_if_missing(true);

        let writer = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options.clone())
            .await?;

        // The reader pool opens read-only, so the schema must exist first.
        sqlx::migrate!("../../migrations").run(&writer).await?;

        let reader = SqlitePoolOptions::new()
            .max_connections(config.max_readers.max(1))
            .connect_with(options.read_only(true))
            .await?;

        tracing::debug!(
            url = database_url,
            max_readers = config.max_readers,
            "workflow store opened"
        );
        Ok(Self { reader, writer })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url_in(dir: &tempfile::TempDir) -> String {
        format!("sqlite://{}?mode=rwc", dir.path().join("store.db").display())
    }

    #[tokio::test]
    async fn migrations_create_workflow_tables() {
        let dir = tempfile::tempdir().unwrap();
        let pool = DatabasePool::new(&url_in(&dir)).await.unwrap();

        let tables: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' AND name != '_sqlx_migrations' ORDER BY name",
        )
        .fetch_all(&pool.reader)
        .await
        .unwrap();

        let names: Vec<&str> = tables.iter().map(|t| t.0.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "documents",
                "notifications",
                "records",
                "sheet_rows",
                "users",
                "workflow_runs",
                "workflows",
            ]
        );
    }

    #[tokio::test]
    async fn writer_uses_wal() {
        let dir = tempfile::tempdir().unwrap();
        let pool = DatabasePool::new(&url_in(&dir)).await.unwrap();

        let (mode,): (String,) = sqlx::query_as("PRAGMA journal_mode")
            .fetch_one(&pool.writer)
            .await
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
    }

    #[tokio::test]
    async fn reader_rejects_writes() {
        let dir = tempfile::tempdir().unwrap();
        let config = DatabaseConfig {
            max_readers: 2,
            busy_timeout_secs: 1,
        };
        let pool = DatabasePool::connect(&url_in(&dir), &config).await.unwrap();

        let result = sqlx::query("INSERT INTO users (id, email, display_name, created_at) VALUES ('u', 'a@b.c', 'A', '2026-01-01T00:00:00Z')")
            .execute(&pool.reader)
            .await;
        assert!(result.is_err());
    }
}
