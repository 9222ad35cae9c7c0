//! Local HTTP surface: batch tool registration, tool listing, and the
//! automation-client execute endpoint.
//!
//! Routes:
//! - `POST /register-tools` — batch registration pushed by editor plugins
//! - `POST /execute` — run one tool through the orchestrator
//! - `GET /projects/{project_id}/tools` — list registered tools
//! - `GET /health` — liveness probe

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::models::tool::ToolDefinition;
use crate::orchestrator::executor::ToolExecutor;
use crate::registry::ToolRegistry;
use crate::{AppError, Result};

/// Shared application state handed to every route handler.
pub struct AppState {
    /// Process-wide tool registry.
    pub registry: Arc<ToolRegistry>,
    /// Execution orchestrator.
    pub executor: Arc<ToolExecutor>,
}

/// Batch registration payload pushed by an editor plugin.
#[derive(Debug, Deserialize)]
struct RegisterToolsPayload {
    /// Target project identifier.
    project_id: String,
    /// Optional instance hash to record for token resolution.
    #[serde(default)]
    project_hash: Option<String>,
    /// Definitions to upsert.
    tools: Vec<ToolDefinition>,
}

/// Execute-endpoint payload from an automation client.
#[derive(Debug, Deserialize)]
struct ExecuteRequest {
    /// Tool name to run.
    tool: String,
    /// Project identifier; resolved from `instance` when omitted.
    #[serde(default)]
    project_id: Option<String>,
    /// Instance token (`<name>@<hash prefix>`, bare id, or hash prefix).
    #[serde(default)]
    instance: Option<String>,
    /// Tool parameters.
    #[serde(default)]
    params: Option<Value>,
}

/// Build the router over shared state.
#[must_use]
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/register-tools", post(register_tools))
        .route("/execute", post(execute))
        .route("/projects/{project_id}/tools", get(list_tools))
        .route("/health", get(health))
        .with_state(state)
}

/// Serve the HTTP surface until the token is cancelled.
///
/// # Errors
///
/// Returns `AppError::Config` if the listener cannot bind or the server
/// fails.
pub async fn serve(state: Arc<AppState>, port: u16, ct: CancellationToken) -> Result<()> {
    let bind = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .map_err(|err| AppError::Config(format!("failed to bind HTTP on {bind}: {err}")))?;

    info!(%bind, "HTTP surface listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { ct.cancelled().await })
        .await
        .map_err(|err| AppError::Config(format!("HTTP server error: {err}")))?;

    info!("HTTP surface shut down");
    Ok(())
}

/// Handler for `GET /health` — returns 200 OK with a plain-text body.
async fn health() -> &'static str {
    "ok"
}

/// Handler for `POST /register-tools`.
async fn register_tools(State(state): State<Arc<AppState>>, Json(raw): Json<Value>) -> Response {
    let payload: RegisterToolsPayload = match serde_json::from_value(raw) {
        Ok(payload) => payload,
        Err(err) => return validation_error(format!("invalid registration payload: {err}")),
    };

    let outcome = state
        .registry
        .register_batch(
            &payload.project_id,
            payload.project_hash.as_deref(),
            payload.tools,
        )
        .await;

    Json(serde_json::json!({
        "success": true,
        "registered": outcome.registered,
        "replaced": outcome.replaced,
        "message": outcome.message,
    }))
    .into_response()
}

/// Handler for `POST /execute`.
async fn execute(State(state): State<Arc<AppState>>, Json(raw): Json<Value>) -> Response {
    let request: ExecuteRequest = match serde_json::from_value(raw) {
        Ok(request) => request,
        Err(err) => return validation_error(format!("invalid execute payload: {err}")),
    };

    let project_id = match request.project_id {
        Some(project_id) => project_id,
        None => {
            match state
                .registry
                .resolve_project_id(request.instance.as_deref())
                .await
            {
                Some(project_id) => project_id,
                None => {
                    return validation_error(
                        "project_id is required when no instance token is given",
                    )
                }
            }
        }
    };

    let params = request.params.unwrap_or(Value::Null);
    match state
        .executor
        .execute(&project_id, &request.tool, request.instance.as_deref(), params)
        .await
    {
        Ok(result) => Json(result).into_response(),
        Err(err) => error_response(&err),
    }
}

/// Handler for `GET /projects/{project_id}/tools`.
async fn list_tools(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
) -> Json<Vec<ToolDefinition>> {
    Json(state.registry.list_tools(&project_id).await)
}

/// A 400 response with a structured validation body.
fn validation_error(message: impl Into<String>) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({ "success": false, "error": message.into() })),
    )
        .into_response()
}

/// Map an application error to an HTTP response.
fn error_response(err: &AppError) -> Response {
    let status = match err {
        AppError::Validation(_) => StatusCode::BAD_REQUEST,
        AppError::NotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::BAD_GATEWAY,
    };
    (
        status,
        Json(serde_json::json!({ "success": false, "error": err.to_string() })),
    )
        .into_response()
}
