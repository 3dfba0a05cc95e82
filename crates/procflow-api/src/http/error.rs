//! Application error type mapping to HTTP status codes and envelope format.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use procflow_core::workflow::engine::EngineError;
use procflow_types::error::RepositoryError;

use crate::http::response::ApiResponse;

/// Application-level error that maps to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    /// Engine operation errors.
    Engine(EngineError),
    /// Malformed request.
    Validation(String),
}

impl From<EngineError> for AppError {
    fn from(e: EngineError) -> Self {
        AppError::Engine(e)
    }
}

impl From<RepositoryError> for AppError {
    fn from(e: RepositoryError) -> Self {
        AppError::Engine(EngineError::from(e))
    }
}

impl AppError {
    /// Status code, machine-readable code, and optional details.
    fn classify(&self) -> (StatusCode, &'static str, Option<serde_json::Value>) {
        match self {
            AppError::Engine(e) => match e {
                EngineError::RunNotFound(_) => (StatusCode::NOT_FOUND, "RUN_NOT_FOUND", None),
                EngineError::WorkflowNotFound(_) => {
                    (StatusCode::NOT_FOUND, "WORKFLOW_NOT_FOUND", None)
                }
                EngineError::UserNotFound(_) => (StatusCode::NOT_FOUND, "USER_NOT_FOUND", None),
                EngineError::Repository(RepositoryError::NotFound) => {
                    (StatusCode::NOT_FOUND, "NOT_FOUND", None)
                }
                EngineError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT", None),
                EngineError::Escalation(_) => (StatusCode::CONFLICT, "ESCALATION_REJECTED", None),
                EngineError::InvalidTransition(_) => {
                    (StatusCode::CONFLICT, "INVALID_TRANSITION", None)
                }
                EngineError::InvalidDefinition(report) => (
                    StatusCode::BAD_REQUEST,
                    "INVALID_DEFINITION",
                    serde_json::to_value(report).ok(),
                ),
                EngineError::Workflow(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", None),
                EngineError::Repository(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "REPOSITORY_ERROR", None)
                }
            },
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", None),
        }
    }

    fn message(&self) -> String {
        match self {
            AppError::Engine(e) => e.to_string(),
            AppError::Validation(msg) => msg.clone(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, details) = self.classify();
        if status.is_server_error() {
            tracing::error!(code, error = %self.message(), "request failed");
        }
        let body = ApiResponse::<()>::failure(code, self.message(), details);
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use procflow_core::workflow::escalation::EscalationError;
    use procflow_types::workflow::{RunStatus, ValidationIssue, ValidationReport};
    use uuid::Uuid;

    fn status_of(err: AppError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn test_engine_error_status_codes() {
        assert_eq!(
            status_of(EngineError::RunNotFound(Uuid::now_v7()).into()),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(EngineError::Conflict("stale".to_string()).into()),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(
                EngineError::Escalation(EscalationError::InvalidStatus {
                    operation: "reassign",
                    status: RunStatus::Completed,
                })
                .into()
            ),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(RepositoryError::Query("boom".to_string()).into()),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_invalid_definition_carries_report() {
        let report = ValidationReport::from_issues(vec![ValidationIssue {
            step_id: "notify".to_string(),
            message: "recipient is required".to_string(),
        }]);
        let err = AppError::from(EngineError::InvalidDefinition(report));
        let (status, code, details) = err.classify();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(code, "INVALID_DEFINITION");
        assert_eq!(details.unwrap()["errors"][0]["step_id"], "notify");
    }
}
