//! Axum router configuration with middleware.
//!
//! All routes are under `/api/v1/`; `/health` is also served at the root.
//! Middleware: CORS, tracing.

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::http::handlers;
use crate::state::AppState;

/// Build the complete API router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        // Workflow definitions
        .route(
            "/workflows",
            post(handlers::workflow::create_workflow).get(handlers::workflow::list_workflows),
        )
        .route("/workflows/validate", post(handlers::workflow::validate_steps))
        .route("/workflows/{id}", get(handlers::workflow::get_workflow))
        .route(
            "/workflows/{id}/validate",
            post(handlers::workflow::validate_workflow),
        )
        .route(
            "/workflows/{id}/runs",
            post(handlers::workflow::start_run).get(handlers::workflow::list_runs),
        )
        // Runs
        .route("/runs/{id}", get(handlers::run::get_run))
        .route("/runs/{id}/input", post(handlers::run::submit_input))
        .route(
            "/runs/{id}/logs/{log_index}/resolve",
            post(handlers::run::resolve_flag),
        )
        .route(
            "/runs/{id}/logs/{log_index}/reopen",
            post(handlers::run::reopen_flag),
        )
        .route("/runs/{id}/reassign", post(handlers::run::reassign))
        // Triggers and scheduler
        .route(
            "/triggers/file-created",
            post(handlers::trigger::file_created),
        )
        .route("/scheduler/tick", post(handlers::trigger::tick))
        .route("/health", get(health_check));

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/health", get(health_check))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /health - Simple health check endpoint.
async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    async fn test_app() -> (Router, AppState, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::init_at(dir.path()).await.unwrap();
        (build_router(state.clone()), state, dir)
    }

    async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    fn record_workflow() -> Value {
        json!({
            "name": "register-employee",
            "is_published": true,
            "trigger": { "type": "file_created", "folder_path": "Resumes" },
            "steps": [
                {
                    "id": "save",
                    "title": "Save employee",
                    "config": {
                        "action": "insert_record",
                        "collection": "employees",
                        "data": { "name": "{{name}}" }
                    }
                }
            ]
        })
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _state, _dir) = test_app().await;
        let (status, body) = call(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");

        let (status, _) = call(&app, "GET", "/api/v1/health", None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_create_workflow_and_run_to_completion() {
        let (app, _state, _dir) = test_app().await;

        let (status, body) = call(&app, "POST", "/api/v1/workflows", Some(record_workflow())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["validation"]["valid"], true);
        let workflow_id = body["data"]["workflow"]["id"].as_str().unwrap().to_string();

        let (status, body) = call(
            &app,
            "POST",
            &format!("/api/v1/workflows/{workflow_id}/runs"),
            Some(json!({ "input": { "name": "Jane" } })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "completed");
        let run_id = body["data"]["id"].as_str().unwrap().to_string();

        let (status, body) = call(&app, "GET", &format!("/api/v1/runs/{run_id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["logs"].as_array().unwrap().len(), 1);

        let (status, body) = call(
            &app,
            "GET",
            &format!("/api/v1/workflows/{workflow_id}/runs"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_run_is_404_envelope() {
        let (app, _state, _dir) = test_app().await;
        let (status, body) = call(
            &app,
            "GET",
            &format!("/api/v1/runs/{}", uuid::Uuid::now_v7()),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["errors"][0]["code"], "RUN_NOT_FOUND");
        assert!(body["data"].is_null());
    }

    #[tokio::test]
    async fn test_invalid_workflow_refuses_to_start() {
        let (app, _state, _dir) = test_app().await;
        let workflow = json!({
            "name": "broken",
            "steps": [
                { "id": "ping", "title": "Ping", "config": { "action": "notify", "message": "hi" } }
            ]
        });
        let (status, body) = call(&app, "POST", "/api/v1/workflows", Some(workflow)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["validation"]["valid"], false);
        let workflow_id = body["data"]["workflow"]["id"].as_str().unwrap().to_string();

        let (status, body) = call(
            &app,
            "POST",
            &format!("/api/v1/workflows/{workflow_id}/validate"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["errors"][0]["step_id"], "ping");

        let (status, body) = call(
            &app,
            "POST",
            &format!("/api/v1/workflows/{workflow_id}/runs"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["errors"][0]["code"], "INVALID_DEFINITION");
        assert_eq!(body["errors"][0]["details"]["valid"], false);
    }

    #[tokio::test]
    async fn test_validate_unsaved_steps() {
        let (app, _state, _dir) = test_app().await;
        let (status, body) = call(
            &app,
            "POST",
            "/api/v1/workflows/validate",
            Some(json!({
                "steps": [
                    { "id": "wait", "title": "Wait", "config": { "action": "delay", "duration": 0, "unit": "minutes" } }
                ]
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["valid"], false);
    }

    #[tokio::test]
    async fn test_reassign_completed_run_conflicts() {
        let (app, state, _dir) = test_app().await;
        state
            .users
            .upsert_user("reviewer@acme.test", "Reviewer")
            .await
            .unwrap();

        let (_, body) = call(&app, "POST", "/api/v1/workflows", Some(record_workflow())).await;
        let workflow_id = body["data"]["workflow"]["id"].as_str().unwrap().to_string();
        let (_, body) = call(
            &app,
            "POST",
            &format!("/api/v1/workflows/{workflow_id}/runs"),
            Some(json!({ "input": { "name": "Jane" } })),
        )
        .await;
        let run_id = body["data"]["id"].as_str().unwrap().to_string();

        let (status, body) = call(
            &app,
            "POST",
            &format!("/api/v1/runs/{run_id}/reassign"),
            Some(json!({ "new_assignee_email": "reviewer@acme.test" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["errors"][0]["code"], "ESCALATION_REJECTED");
    }

    #[tokio::test]
    async fn test_file_created_trigger_and_tick() {
        let (app, _state, _dir) = test_app().await;
        call(&app, "POST", "/api/v1/workflows", Some(record_workflow())).await;

        let (status, body) = call(
            &app,
            "POST",
            "/api/v1/triggers/file-created",
            Some(json!({ "file_path": "/resumes/john.pdf" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["run_ids"].as_array().unwrap().len(), 1);

        let (status, body) = call(
            &app,
            "POST",
            "/api/v1/triggers/file-created",
            Some(json!({ "file_path": "/Archive/Resumes2/john.pdf" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["data"]["run_ids"].as_array().unwrap().is_empty());

        let (status, body) = call(&app, "POST", "/api/v1/scheduler/tick", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["attempted"], 0);
    }
}
