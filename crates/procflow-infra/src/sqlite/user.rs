//! SQLite user directory.
//!
//! Backs `UserDirectory` with the `users` table. Emails are unique and
//! compared case-insensitively (the column is `COLLATE NOCASE`).

use chrono::Utc;
use procflow_core::repository::user::UserDirectory;
use procflow_types::error::RepositoryError;
use procflow_types::workflow::UserIdentity;
use sqlx::Row;
use uuid::Uuid;

use super::pool::DatabasePool;

/// SQLite-backed implementation of `UserDirectory`.
pub struct SqliteUserDirectory {
    pool: DatabasePool,
}

impl SqliteUserDirectory {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// Register a user or update the display name of an existing email.
    ///
    /// Returns the stored identity (the existing id is kept on update).
    pub async fn upsert_user(
        &self,
        email: &str,
        display_name: &str,
    ) -> Result<UserIdentity, RepositoryError> {
        let email = email.trim();
        if email.is_empty() {
            return Err(RepositoryError::Query("email must not be empty".to_string()));
        }

        sqlx::query(
            r#"INSERT INTO users (id, email, display_name, created_at)
               VALUES (?, ?, ?, ?)
               ON CONFLICT(email) DO UPDATE SET display_name = excluded.display_name"#,
        )
        .bind(Uuid::now_v7().to_string())
        .bind(email)
        .bind(display_name)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let row = sqlx::query("SELECT id, email, display_name FROM users WHERE email = ?")
            .bind(email)
            .fetch_one(&self.pool.writer)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
        row_to_identity(&row)
    }

    /// All registered users ordered by email.
    pub async fn list_users(&self) -> Result<Vec<UserIdentity>, RepositoryError> {
        let rows = sqlx::query("SELECT id, email, display_name FROM users ORDER BY email ASC")
            .fetch_all(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
        rows.iter().map(row_to_identity).collect()
    }
}

fn row_to_identity(row: &sqlx::sqlite::SqliteRow) -> Result<UserIdentity, RepositoryError> {
    let id: String = row
        .try_get("id")
        .map_err(|e| RepositoryError::Query(e.to_string()))?;
    Ok(UserIdentity {
        id: Uuid::parse_str(&id)
            .map_err(|e| RepositoryError::Query(format!("invalid UUID '{id}': {e}")))?,
        email: row
            .try_get("email")
            .map_err(|e| RepositoryError::Query(e.to_string()))?,
        display_name: row
            .try_get("display_name")
            .map_err(|e| RepositoryError::Query(e.to_string()))?,
    })
}

impl UserDirectory for SqliteUserDirectory {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserIdentity>, RepositoryError> {
        let row = sqlx::query("SELECT id, email, display_name FROM users WHERE email = ?")
            .bind(email.trim())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
        row.as_ref().map(row_to_identity).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_directory() -> (SqliteUserDirectory, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("test.db").display());
        let pool = DatabasePool::new(&url).await.unwrap();
        (SqliteUserDirectory::new(pool), dir)
    }

    #[tokio::test]
    async fn test_lookup_is_case_insensitive() {
        let (users, _dir) = test_directory().await;
        let created = users.upsert_user("Alice@Acme.test", "Alice").await.unwrap();

        let found = users.find_by_email("alice@acme.test").await.unwrap().unwrap();
        assert_eq!(found.id, created.id);
        assert_eq!(found.display_name, "Alice");

        assert!(users.find_by_email("bob@acme.test").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_keeps_id() {
        let (users, _dir) = test_directory().await;
        let first = users.upsert_user("bob@acme.test", "Bob").await.unwrap();
        let second = users.upsert_user("BOB@acme.test", "Robert").await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.display_name, "Robert");
        assert_eq!(users.list_users().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_email_rejected() {
        let (users, _dir) = test_directory().await;
        assert!(users.upsert_user("  ", "Nobody").await.is_err());
    }
}
