//! Trigger and scheduler handlers for the REST API.

use std::time::Instant;

use axum::Json;
use axum::extract::State;
use serde::Serialize;
use uuid::Uuid;

use procflow_core::workflow::scheduler::TickReport;
use procflow_types::workflow::FileCreatedEvent;

use crate::http::error::AppError;
use crate::http::response::ApiResponse;
use crate::state::AppState;

/// Runs started by a file-created event.
#[derive(Debug, Serialize)]
pub struct TriggerResult {
    pub run_ids: Vec<Uuid>,
}

/// POST /api/v1/triggers/file-created - Start the workflows a new file triggers.
pub async fn file_created(
    State(state): State<AppState>,
    Json(event): Json<FileCreatedEvent>,
) -> Result<Json<ApiResponse<TriggerResult>>, AppError> {
    let start = Instant::now();
    if event.file_path.trim().is_empty() {
        return Err(AppError::Validation("file_path must not be empty".to_string()));
    }
    let run_ids = state.triggers.dispatch(&event).await?;
    Ok(Json(ApiResponse::success(TriggerResult { run_ids }, start)))
}

/// POST /api/v1/scheduler/tick - Resume every run whose delay has elapsed.
pub async fn tick(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<TickReport>>, AppError> {
    let start = Instant::now();
    let report = state.scheduler.tick().await?;
    Ok(Json(ApiResponse::success(report, start)))
}
