//! Workflow definition handlers for the REST API.
//!
//! Endpoints for registering and inspecting workflow definitions,
//! validating their step configuration, and starting runs.

use std::time::Instant;

use axum::Json;
use axum::extract::{Path, Query, State};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use procflow_core::repository::workflow::WorkflowRepository;
use procflow_core::workflow::engine::EngineError;
use procflow_core::workflow::validation;
use procflow_types::workflow::{
    RunContext, RunSource, StepDefinition, ValidationReport, WorkflowDefinition, WorkflowRun,
};

use crate::http::error::AppError;
use crate::http::extractors::query::RunListQuery;
use crate::http::response::ApiResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request / response bodies
// ---------------------------------------------------------------------------

/// A stored definition together with its step validation report.
#[derive(Debug, Serialize)]
pub struct SavedWorkflow {
    pub workflow: WorkflowDefinition,
    pub validation: ValidationReport,
}

/// Body of `POST /workflows/{id}/runs`.
#[derive(Debug, Default, Deserialize)]
pub struct StartRunRequest {
    #[serde(default)]
    pub input: RunContext,
}

/// Body of `POST /workflows/validate`.
#[derive(Debug, Deserialize)]
pub struct ValidateStepsRequest {
    pub steps: Vec<StepDefinition>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /api/v1/workflows - Register or replace a workflow definition.
pub async fn create_workflow(
    State(state): State<AppState>,
    Json(body): Json<WorkflowDefinition>,
) -> Result<Json<ApiResponse<SavedWorkflow>>, AppError> {
    let start = Instant::now();

    state.engine.save_workflow(&body).await?;
    let validation = validation::validate(&body.steps);
    let id = body.id;

    let resp = ApiResponse::success(
        SavedWorkflow {
            workflow: body,
            validation,
        },
        start,
    )
    .with_link("self", &format!("/api/v1/workflows/{id}"))
    .with_link("runs", &format!("/api/v1/workflows/{id}/runs"));

    Ok(Json(resp))
}

/// GET /api/v1/workflows - List all workflow definitions.
pub async fn list_workflows(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<WorkflowDefinition>>>, AppError> {
    let start = Instant::now();
    let defs = state.engine.repository().list_definitions().await?;
    Ok(Json(
        ApiResponse::list(defs, start).with_link("self", "/api/v1/workflows"),
    ))
}

/// GET /api/v1/workflows/{id} - Get a workflow definition.
pub async fn get_workflow(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<WorkflowDefinition>>, AppError> {
    let start = Instant::now();
    let def = state
        .engine
        .repository()
        .get_definition(&id)
        .await?
        .ok_or(EngineError::WorkflowNotFound(id))?;

    Ok(Json(
        ApiResponse::success(def, start)
            .with_link("self", &format!("/api/v1/workflows/{id}"))
            .with_link("runs", &format!("/api/v1/workflows/{id}/runs")),
    ))
}

/// POST /api/v1/workflows/{id}/validate - Validate a stored workflow's steps.
pub async fn validate_workflow(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<ValidationReport>>, AppError> {
    let start = Instant::now();
    let report = state.engine.validate_workflow(&id).await?;
    Ok(Json(ApiResponse::success(report, start)))
}

/// POST /api/v1/workflows/validate - Validate an unsaved step list.
pub async fn validate_steps(
    Json(body): Json<ValidateStepsRequest>,
) -> Result<Json<ApiResponse<ValidationReport>>, AppError> {
    let start = Instant::now();
    Ok(Json(ApiResponse::success(
        validation::validate(&body.steps),
        start,
    )))
}

/// POST /api/v1/workflows/{id}/runs - Start a run.
pub async fn start_run(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Option<Json<StartRunRequest>>,
) -> Result<Json<ApiResponse<WorkflowRun>>, AppError> {
    let start = Instant::now();
    let input = body.map(|Json(b)| b.input).unwrap_or_default();

    let run = state
        .engine
        .start_run(&id, input, RunSource::Manual)
        .await?;
    let run_id = run.id;

    Ok(Json(
        ApiResponse::success(run, start).with_link("self", &format!("/api/v1/runs/{run_id}")),
    ))
}

/// GET /api/v1/workflows/{id}/runs - Recent runs of a workflow, newest first.
pub async fn list_runs(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<RunListQuery>,
) -> Result<Json<ApiResponse<Vec<WorkflowRun>>>, AppError> {
    let start = Instant::now();
    let runs = state
        .engine
        .repository()
        .list_runs(Some(&id), query.limit)
        .await?;
    Ok(Json(ApiResponse::list(runs, start)))
}
