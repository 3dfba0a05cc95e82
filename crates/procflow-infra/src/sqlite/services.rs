//! Concrete step services over SQLite and the local filesystem.
//!
//! Records, notifications and sheet rows are written to their tables;
//! generated documents are written under the documents directory with a
//! row in `documents`. Notifications are only queued here, delivery is
//! someone else's job. Extraction reads `field: value` lines from a file
//! (when the source names an existing path) or from the source text itself.

use std::path::{Path, PathBuf};

use chrono::Utc;
use procflow_core::workflow::step_runner::{
    DocumentRequest, Extraction, Notification, ServiceFuture, StepError, StepServices,
};
use serde_json::{Value, json};
use uuid::Uuid;

use super::pool::DatabasePool;

/// SQLite + filesystem implementation of `StepServices`.
#[derive(Clone)]
pub struct SqliteStepServices {
    pool: DatabasePool,
    documents_dir: PathBuf,
}

impl SqliteStepServices {
    pub fn new(pool: DatabasePool, documents_dir: PathBuf) -> Self {
        Self {
            pool,
            documents_dir,
        }
    }
}

fn service_err(e: impl std::fmt::Display) -> StepError {
    StepError::ServiceError(e.to_string())
}

/// Keep only the final path component so documents stay inside their folder.
fn safe_file_name(name: &str) -> String {
    let name = name.rsplit(['/', '\\']).next().unwrap_or("").trim();
    if name.is_empty() || name == "." || name == ".." {
        "document".to_string()
    } else {
        name.to_string()
    }
}

/// Normalize a field label for matching: lowercase, spaces and dashes as `_`.
fn field_key(label: &str) -> String {
    label
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == ' ' || c == '-' { '_' } else { c })
        .collect()
}

/// Parse `field: value` lines and pick out the requested fields.
///
/// Confidence is the share of requested fields found with a non-empty value.
pub fn extract_fields(text: &str, fields: &[String]) -> Extraction {
    let mut found = serde_json::Map::new();
    for line in text.lines() {
        let Some((label, value)) = line.split_once(':') else {
            continue;
        };
        let key = field_key(label);
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        if let Some(field) = fields.iter().find(|f| field_key(f) == key) {
            found
                .entry(field.clone())
                .or_insert_with(|| Value::String(value.to_string()));
        }
    }

    let confidence = if fields.is_empty() {
        1.0
    } else {
        found.len() as f64 / fields.len() as f64
    };

    Extraction {
        fields: found,
        confidence,
    }
}

async fn read_source(source: &str) -> Result<String, StepError> {
    let path = Path::new(source);
    if !source.contains('\n') && tokio::fs::metadata(path).await.is_ok_and(|m| m.is_file()) {
        tokio::fs::read_to_string(path).await.map_err(service_err)
    } else {
        Ok(source.to_string())
    }
}

impl StepServices for SqliteStepServices {
    fn insert_record(&self, collection: &str, data: &Value) -> ServiceFuture<'_, Value> {
        let collection = collection.to_string();
        let data = data.clone();
        Box::pin(async move {
            let id = Uuid::now_v7();
            sqlx::query(
                "INSERT INTO records (id, collection, data, created_at) VALUES (?, ?, ?, ?)",
            )
            .bind(id.to_string())
            .bind(&collection)
            .bind(data.to_string())
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool.writer)
            .await
            .map_err(service_err)?;

            tracing::debug!(record_id = %id, collection = collection.as_str(), "record inserted");
            Ok(json!({
                "record_id": id.to_string(),
                "collection": collection,
                "data": data,
            }))
        })
    }

    fn extract(&self, source: &str, fields: &[String]) -> ServiceFuture<'_, Extraction> {
        let source = source.to_string();
        let fields = fields.to_vec();
        Box::pin(async move {
            let text = read_source(&source).await?;
            Ok(extract_fields(&text, &fields))
        })
    }

    fn generate_document(&self, request: &DocumentRequest) -> ServiceFuture<'_, Value> {
        let request = request.clone();
        Box::pin(async move {
            let run_dir = self.documents_dir.join(request.run_id.to_string());
            tokio::fs::create_dir_all(&run_dir)
                .await
                .map_err(service_err)?;

            let file_name = format!(
                "{}.{}",
                safe_file_name(&request.file_name),
                request.format.extension()
            );
            let path = run_dir.join(&file_name);
            tokio::fs::write(&path, request.content.as_bytes())
                .await
                .map_err(service_err)?;

            let id = Uuid::now_v7();
            let path_str = path.display().to_string();
            sqlx::query(
                r#"INSERT INTO documents (id, run_id, file_name, format, path, created_at)
                   VALUES (?, ?, ?, ?, ?, ?)"#,
            )
            .bind(id.to_string())
            .bind(request.run_id.to_string())
            .bind(&file_name)
            .bind(request.format.extension())
            .bind(&path_str)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool.writer)
            .await
            .map_err(service_err)?;

            tracing::debug!(run_id = %request.run_id, path = path_str.as_str(), "document written");
            Ok(json!({
                "document_id": id.to_string(),
                "file_name": file_name,
                "path": path_str,
            }))
        })
    }

    fn notify(&self, notification: &Notification) -> ServiceFuture<'_, Value> {
        let notification = notification.clone();
        Box::pin(async move {
            let id = Uuid::now_v7();
            sqlx::query(
                r#"INSERT INTO notifications (id, run_id, channel, recipient, subject, message, created_at)
                   VALUES (?, ?, ?, ?, ?, ?, ?)"#,
            )
            .bind(id.to_string())
            .bind(notification.run_id.to_string())
            .bind(notification.channel.as_str())
            .bind(&notification.recipient)
            .bind(&notification.subject)
            .bind(&notification.message)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool.writer)
            .await
            .map_err(service_err)?;

            Ok(json!({
                "notification_id": id.to_string(),
                "channel": notification.channel.as_str(),
                "recipient": notification.recipient,
                "status": "queued",
            }))
        })
    }

    fn append_row(
        &self,
        sheet_id: &str,
        row: &serde_json::Map<String, Value>,
    ) -> ServiceFuture<'_, Value> {
        let sheet_id = sheet_id.to_string();
        let row_data = Value::Object(row.clone()).to_string();
        Box::pin(async move {
            sqlx::query("INSERT INTO sheet_rows (sheet_id, row_data, created_at) VALUES (?, ?, ?)")
                .bind(&sheet_id)
                .bind(&row_data)
                .bind(Utc::now().to_rfc3339())
                .execute(&self.pool.writer)
                .await
                .map_err(service_err)?;

            let (count,): (i64,) =
                sqlx::query_as("SELECT COUNT(*) FROM sheet_rows WHERE sheet_id = ?")
                    .bind(&sheet_id)
                    .fetch_one(&self.pool.writer)
                    .await
                    .map_err(service_err)?;

            Ok(json!({ "sheet_id": sheet_id, "row": count }))
        })
    }
}
