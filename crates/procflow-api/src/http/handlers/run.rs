//! Run handlers for the REST API: inspection, human input, and escalation.

use std::time::Instant;

use axum::Json;
use axum::extract::{Path, State};
use serde::Deserialize;
use uuid::Uuid;

use procflow_types::workflow::{RunContext, UserIdentity, WorkflowRun};

use crate::http::error::AppError;
use crate::http::response::ApiResponse;
use crate::state::AppState;

/// Body of `POST /runs/{id}/input`.
#[derive(Debug, Deserialize)]
pub struct SubmitInputRequest {
    pub values: RunContext,
}

/// Body of the resolve and reopen endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct EscalationRequest {
    #[serde(default)]
    pub comment: String,
}

/// Body of `POST /runs/{id}/reassign`.
#[derive(Debug, Deserialize)]
pub struct ReassignRequest {
    pub new_assignee_email: String,
}

fn run_response(run: WorkflowRun, start: Instant) -> Json<ApiResponse<WorkflowRun>> {
    let id = run.id;
    let workflow_id = run.workflow_id;
    Json(
        ApiResponse::success(run, start)
            .with_link("self", &format!("/api/v1/runs/{id}"))
            .with_link("workflow", &format!("/api/v1/workflows/{workflow_id}")),
    )
}

/// GET /api/v1/runs/{id} - Get a run with its log.
pub async fn get_run(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<WorkflowRun>>, AppError> {
    let start = Instant::now();
    let run = state.engine.get_run(&id).await?;
    Ok(run_response(run, start))
}

/// POST /api/v1/runs/{id}/input - Submit values for a run awaiting input.
pub async fn submit_input(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<SubmitInputRequest>,
) -> Result<Json<ApiResponse<WorkflowRun>>, AppError> {
    let start = Instant::now();
    let run = state.engine.submit_input(&id, body.values).await?;
    Ok(run_response(run, start))
}

/// POST /api/v1/runs/{id}/logs/{log_index}/resolve - Accept a flagged step.
pub async fn resolve_flag(
    State(state): State<AppState>,
    Path((id, log_index)): Path<(Uuid, usize)>,
    body: Option<Json<EscalationRequest>>,
) -> Result<Json<ApiResponse<WorkflowRun>>, AppError> {
    let start = Instant::now();
    let comment = body.map(|Json(b)| b.comment).unwrap_or_default();
    let run = state.engine.resolve_flag(&id, log_index, &comment).await?;
    Ok(run_response(run, start))
}

/// POST /api/v1/runs/{id}/logs/{log_index}/reopen - Re-run a flagged step.
pub async fn reopen_flag(
    State(state): State<AppState>,
    Path((id, log_index)): Path<(Uuid, usize)>,
    body: Option<Json<EscalationRequest>>,
) -> Result<Json<ApiResponse<WorkflowRun>>, AppError> {
    let start = Instant::now();
    let comment = body.map(|Json(b)| b.comment).unwrap_or_default();
    let run = state.engine.reopen_flag(&id, log_index, &comment).await?;
    Ok(run_response(run, start))
}

/// POST /api/v1/runs/{id}/reassign - Hand a run to another user.
pub async fn reassign(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<ReassignRequest>,
) -> Result<Json<ApiResponse<UserIdentity>>, AppError> {
    let start = Instant::now();
    let email = body.new_assignee_email.trim();
    if email.is_empty() {
        return Err(AppError::Validation(
            "new_assignee_email must not be empty".to_string(),
        ));
    }
    let assignee = state.engine.reassign(&id, email).await?;
    Ok(Json(
        ApiResponse::success(assignee, start).with_link("run", &format!("/api/v1/runs/{id}")),
    ))
}
