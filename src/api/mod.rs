//! HTTP API - routes requests onto the pipeline registry
//!
//! Routing is transport-independent: `handle_request` takes a method, path
//! and body and returns a `Response`; `http` does the socket work.

pub mod http;
pub mod models;

use crate::config::Settings;
use crate::definition::PipelineConfig;
use crate::error::{ErrorCategory, PipelineError};
use crate::observability::ServerMetrics;
use crate::registry::PipelineRegistry;
use models::{ErrorResponse, ExecuteResponse, HealthResponse, MessageResponse, PipelineListResponse, StatusResponse};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, warn};

/// Shared server state, built once at startup
pub struct AppState {
    pub registry: Arc<PipelineRegistry>,
    pub settings: Settings,
    pub metrics: ServerMetrics,
}

impl AppState {
    pub fn new(registry: Arc<PipelineRegistry>, settings: Settings) -> Self {
        Self {
            registry,
            settings,
            metrics: ServerMetrics::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub content_type: &'static str,
    pub body: String,
}

impl Response {
    pub fn json<T: Serialize>(status: u16, value: &T) -> Self {
        match serde_json::to_string(value) {
            Ok(body) => Self {
                status,
                content_type: "application/json",
                body,
            },
            Err(e) => Self::error(500, format!("Failed to serialize response: {}", e)),
        }
    }

    pub fn error(status: u16, detail: impl Into<String>) -> Self {
        let body = ErrorResponse { detail: detail.into() };
        Self {
            status,
            content_type: "application/json",
            body: serde_json::to_string(&body).unwrap_or_else(|_| r#"{"detail":"error"}"#.to_string()),
        }
    }

    pub fn text(status: u16, body: String) -> Self {
        Self {
            status,
            content_type: "text/plain; version=0.0.4",
            body,
        }
    }

    pub fn empty(status: u16) -> Self {
        Self {
            status,
            content_type: "application/json",
            body: String::new(),
        }
    }
}

pub fn status_code(err: &PipelineError) -> u16 {
    match err.category() {
        ErrorCategory::Configuration => 400,
        ErrorCategory::Admission => 409,
        ErrorCategory::NotFound => 404,
        ErrorCategory::Source | ErrorCategory::Processing | ErrorCategory::Storage => 500,
    }
}

/// Build an error response; `context` prefixes server-side failures
fn failure(err: PipelineError, context: &str) -> Response {
    let status = status_code(&err);
    if status >= 500 {
        error!("{}: {}", context, err);
        Response::error(status, format!("{}: {}", context, err))
    } else {
        warn!("{}: {}", context, err);
        Response::error(status, err.to_string())
    }
}

fn parse_config(body: &str) -> Result<PipelineConfig, Response> {
    serde_json::from_str(body).map_err(|e| Response::error(422, format!("Invalid request body: {}", e)))
}

async fn create(state: &AppState, body: &str) -> Response {
    let config = match parse_config(body) {
        Ok(config) => config,
        Err(response) => return response,
    };
    let name = config.name.clone();
    match state.registry.create(config).await {
        Ok(()) => Response::json(
            201,
            &MessageResponse {
                message: format!("Pipeline '{}' created successfully", name),
            },
        ),
        Err(err) => failure(err, "Error creating pipeline"),
    }
}

async fn execute(state: &AppState, name: &str) -> Response {
    let result = state.registry.execute(name).await;

    // Only runs that actually started are counted
    if let Ok(pipeline) = state.registry.get(name).await {
        let status = pipeline.status();
        let started = !matches!(result, Err(PipelineError::Busy(_) | PipelineError::NotFound(_)));
        if started {
            let outcome = if result.is_ok() { "success" } else { "failed" };
            state.metrics.record_execution(outcome, status.duration().unwrap_or(0.0));
        }
    }

    match result {
        Ok(location) => Response::json(
            200,
            &ExecuteResponse {
                message: format!("Pipeline '{}' executed successfully", name),
                storage_location: location,
            },
        ),
        Err(err) => failure(err, "Error executing pipeline"),
    }
}

async fn update(state: &AppState, name: &str, body: &str) -> Response {
    let config = match parse_config(body) {
        Ok(config) => config,
        Err(response) => return response,
    };
    match state.registry.update(name, config).await {
        Ok(()) => Response::json(
            200,
            &MessageResponse {
                message: format!("Pipeline '{}' updated successfully", name),
            },
        ),
        Err(err) => failure(err, "Error updating pipeline"),
    }
}

async fn delete(state: &AppState, name: &str) -> Response {
    match state.registry.delete(name).await {
        Ok(()) => Response::json(
            200,
            &MessageResponse {
                message: format!("Pipeline '{}' deleted successfully", name),
            },
        ),
        Err(err) => failure(err, "Error deleting pipeline"),
    }
}

fn respond<T: Serialize>(result: Result<T, PipelineError>, context: &str) -> Response {
    match result {
        Ok(value) => Response::json(200, &value),
        Err(err) => failure(err, context),
    }
}

/// Returns the route template (for metrics) and the response
async fn route(state: &AppState, method: &str, path: &str, body: &str) -> (&'static str, Response) {
    match (method, path) {
        ("OPTIONS", _) => return ("*", Response::empty(200)),
        ("GET", "/health") => {
            return (
                "/health",
                Response::json(
                    200,
                    &HealthResponse {
                        status: "healthy",
                        project: state.settings.project_name.clone(),
                    },
                ),
            )
        }
        ("GET", "/metrics") => {
            let count = state.registry.len().await;
            return ("/metrics", Response::text(200, state.metrics.render(count)));
        }
        _ => {}
    }

    let base = format!("{}/pipeline", state.settings.api_prefix);
    let Some(rest) = path.strip_prefix(base.as_str()) else {
        return ("unmatched", Response::error(404, format!("Endpoint not found: {} {}", method, path)));
    };
    if !rest.is_empty() && !rest.starts_with('/') {
        return ("unmatched", Response::error(404, format!("Endpoint not found: {} {}", method, path)));
    }
    let segments: Vec<&str> = rest.split('/').filter(|s| !s.is_empty()).collect();
    let registry = &state.registry;

    match (method, segments.as_slice()) {
        ("GET", []) => (
            "/pipeline",
            Response::json(
                200,
                &PipelineListResponse {
                    pipelines: registry.list().await,
                },
            ),
        ),
        ("POST", []) => ("/pipeline", create(state, body).await),
        ("POST", [name, "run"]) => ("/pipeline/{name}/run", execute(state, name).await),
        ("GET", [name]) => (
            "/pipeline/{name}",
            respond(
                registry.get_status(name).await.map(StatusResponse::from),
                "Error getting pipeline status",
            ),
        ),
        ("PUT", [name]) => ("/pipeline/{name}", update(state, name, body).await),
        ("DELETE", [name]) => ("/pipeline/{name}", delete(state, name).await),
        ("GET", [name, "data"]) => (
            "/pipeline/{name}/data",
            respond(registry.get_data(name).await, "Error retrieving pipeline data"),
        ),
        ("GET", [name, "stats"]) => (
            "/pipeline/{name}/stats",
            respond(registry.get_stats(name).await, "Error getting pipeline stats"),
        ),
        ("GET", [name, "schema"]) => (
            "/pipeline/{name}/schema",
            respond(registry.get_schema(name).await, "Error getting pipeline schema"),
        ),
        (_, [] | [_] | [_, "run" | "data" | "stats" | "schema"]) => (
            "unmatched",
            Response::error(405, format!("Method {} not allowed for {}", method, path)),
        ),
        _ => ("unmatched", Response::error(404, format!("Endpoint not found: {} {}", method, path))),
    }
}

/// Dispatch one request. `path` may carry a query string or trailing slash.
pub async fn handle_request(state: &AppState, method: &str, path: &str, body: &str) -> Response {
    let path = path.split('?').next().unwrap_or("");
    let path = match path.trim_end_matches('/') {
        "" => "/",
        trimmed => trimmed,
    };

    let (template, response) = route(state, method, path, body).await;
    state.metrics.record_request(method, template, response.status);
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use tempfile::TempDir;

    fn state(dir: &TempDir) -> AppState {
        AppState::new(Arc::new(PipelineRegistry::new(dir.path().join("store"))), Settings::new())
    }

    fn body(response: &Response) -> Value {
        serde_json::from_str(&response.body).unwrap()
    }

    #[tokio::test]
    async fn test_health_and_unknown_route() {
        let temp_dir = TempDir::new().unwrap();
        let state = state(&temp_dir);

        let response = handle_request(&state, "GET", "/health", "").await;
        assert_eq!(response.status, 200);
        assert_eq!(body(&response)["status"], "healthy");

        let response = handle_request(&state, "GET", "/nope", "").await;
        assert_eq!(response.status, 404);
        assert!(body(&response)["detail"].is_string());
    }

    #[tokio::test]
    async fn test_pipeline_lifecycle() {
        let temp_dir = TempDir::new().unwrap();
        let state = state(&temp_dir);
        let csv = temp_dir.path().join("people.csv");
        std::fs::write(&csv, "id,name\n1,John\n2,Jane\n").unwrap();

        let config = json!({
            "name": "people",
            "collectors": [{"type": "csv", "file_path": csv}],
            "processors": [{"type": "cleaner", "config": {"rename_columns": {"name": "full_name"}}}],
            "storage_dir": temp_dir.path().join("out"),
        })
        .to_string();

        let response = handle_request(&state, "POST", "/api/v1/pipeline/", &config).await;
        assert_eq!(response.status, 201);

        let response = handle_request(&state, "POST", "/api/v1/pipeline", &config).await;
        assert_eq!(response.status, 400);
        assert_eq!(body(&response)["detail"], "Pipeline with name 'people' already exists");

        let response = handle_request(&state, "GET", "/api/v1/pipeline/people", "").await;
        assert_eq!(body(&response)["status"], "initialized");

        let response = handle_request(&state, "POST", "/api/v1/pipeline/people/run", "").await;
        assert_eq!(response.status, 200);
        assert!(body(&response)["storage_location"].as_str().unwrap().ends_with("latest.parquet"));

        let response = handle_request(&state, "GET", "/api/v1/pipeline/people/data", "").await;
        let rows = body(&response);
        assert_eq!(rows.as_array().unwrap().len(), 2);
        assert_eq!(rows[0]["full_name"], "John");

        let response = handle_request(&state, "GET", "/api/v1/pipeline/people/stats", "").await;
        assert_eq!(body(&response)["success_rate"], 1.0);

        let response = handle_request(&state, "GET", "/api/v1/pipeline/people/schema", "").await;
        assert_eq!(body(&response)["column_count"], 2);

        let response = handle_request(&state, "GET", "/api/v1/pipeline/people", "").await;
        let status = body(&response);
        assert_eq!(status["status"], "completed");
        assert_eq!(status["progress"], 100);
        assert!(status["duration"].is_number());

        let response = handle_request(&state, "DELETE", "/api/v1/pipeline/people", "").await;
        assert_eq!(response.status, 200);
        let response = handle_request(&state, "GET", "/api/v1/pipeline/people", "").await;
        assert_eq!(response.status, 404);

        assert_eq!(state.metrics.execution_count("success"), 1);
    }

    #[tokio::test]
    async fn test_error_mapping() {
        let temp_dir = TempDir::new().unwrap();
        let state = state(&temp_dir);

        let response = handle_request(&state, "POST", "/api/v1/pipeline", "{not json").await;
        assert_eq!(response.status, 422);

        let bad_type = json!({"name": "p", "collectors": [{"type": "ftp"}]}).to_string();
        let response = handle_request(&state, "POST", "/api/v1/pipeline", &bad_type).await;
        assert_eq!(response.status, 400);

        let missing_file = json!({
            "name": "p",
            "collectors": [{"type": "csv", "file_path": temp_dir.path().join("missing.csv")}],
        })
        .to_string();
        assert_eq!(handle_request(&state, "POST", "/api/v1/pipeline", &missing_file).await.status, 201);

        let response = handle_request(&state, "POST", "/api/v1/pipeline/p/run", "").await;
        assert_eq!(response.status, 500);
        assert!(body(&response)["detail"].as_str().unwrap().contains("File not found"));
        assert_eq!(state.metrics.execution_count("failed"), 1);

        let mismatched = json!({"name": "q", "collectors": [{"type": "csv", "file_path": "a.csv"}]}).to_string();
        let response = handle_request(&state, "PUT", "/api/v1/pipeline/p", &mismatched).await;
        assert_eq!(response.status, 400);

        let response = handle_request(&state, "POST", "/api/v1/pipeline/ghost/run", "").await;
        assert_eq!(response.status, 404);

        let response = handle_request(&state, "PATCH", "/api/v1/pipeline/p", "").await;
        assert_eq!(response.status, 405);
    }

    #[tokio::test]
    async fn test_list_and_metrics() {
        let temp_dir = TempDir::new().unwrap();
        let state = state(&temp_dir);

        let response = handle_request(&state, "GET", "/api/v1/pipeline", "").await;
        assert_eq!(body(&response)["pipelines"], json!([]));

        let response = handle_request(&state, "GET", "/metrics", "").await;
        assert!(response.content_type.starts_with("text/plain"));
        assert!(response.body.contains("pipeline_registered 0"));
        assert!(response.body.contains("route=\"/pipeline\""));
    }
}
