//! LiveAgent HTTP API
//!
//! Axum-based HTTP server exposing the runtime to the agent builder and
//! dashboard. Runs alongside the Unix socket IPC server.
//!
//! Each endpoint is a thin axum handler over a pure inner function that
//! builds an IPC request, routes it, and maps the response to a status code.
//!
//! Endpoints:
//! - GET    /health                    — liveness
//! - GET    /ready                     — readiness (session store reachable)
//! - GET    /version                   — server version info
//! - POST   /api/agents/register       — register or update an agent
//! - GET    /api/agents                — list registered agents
//! - GET    /api/agents/:id            — agent status
//! - DELETE /api/agents/:id            — unregister an agent
//! - GET    /api/agents/:id/sessions   — live sessions of an agent
//! - POST   /api/sessions/create       — create a session
//! - GET    /api/sessions/:id          — session details
//! - POST   /api/sessions/:id/end      — end a session
//! - POST   /api/sessions/:id/status   — status / participant update

use std::sync::Arc;

use anyhow::Result;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use liveagent_core::ipc::{RuntimeRequest, RuntimeResponse};
use liveagent_core::LiveAgentConfig;
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use crate::runtime::AgentRuntime;

/// Shared state for all HTTP handlers
#[derive(Clone)]
pub struct HttpState {
    pub runtime: Arc<AgentRuntime>,
    pub config: LiveAgentConfig,
}

/// Build the Axum router with all endpoints
pub fn build_router(state: Arc<HttpState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .route("/version", get(version_handler))
        .route("/api/agents/register", post(register_agent_handler))
        .route("/api/agents", get(list_agents_handler))
        .route(
            "/api/agents/:agent_id",
            get(agent_status_handler).delete(unregister_agent_handler),
        )
        .route("/api/agents/:agent_id/sessions", get(agent_sessions_handler))
        .route("/api/sessions/create", post(create_session_handler))
        .route("/api/sessions/:session_id", get(get_session_handler))
        .route("/api/sessions/:session_id/end", post(end_session_handler))
        .route("/api/sessions/:session_id/status", post(update_session_handler))
        .with_state(state)
}

/// Start the HTTP server on the configured address.
/// Gracefully shuts down when the broadcast shutdown signal fires.
pub async fn start_http_server(
    runtime: Arc<AgentRuntime>,
    config: LiveAgentConfig,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let addr = format!("{}:{}", config.http.host, config.http.port);
    let state = Arc::new(HttpState { runtime, config });

    let app = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("LiveAgent HTTP API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("HTTP server shutting down...");
        })
        .await?;

    Ok(())
}

// ============================================================================
// Request DTOs
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterAgentRequest {
    pub agent_id: i32,
    pub tenant_id: i32,
    pub config: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    pub agent_id: i32,
    pub tenant_id: i32,
    pub room_name: String,
    pub participant_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSessionRequest {
    pub status: String,
    pub participant_count: Option<i32>,
}

// ============================================================================
// Inner (directly testable) functions
// ============================================================================

/// Liveness: pure, no IO.
pub fn health_inner() -> serde_json::Value {
    serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    })
}

/// Readiness: the session store must answer.
pub async fn ready_inner(runtime: &AgentRuntime) -> (StatusCode, serde_json::Value) {
    match runtime.ready().await {
        Ok(()) => (
            StatusCode::OK,
            serde_json::json!({
                "status": "ready",
                "timestamp": chrono::Utc::now().to_rfc3339(),
            }),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            serde_json::json!({
                "status": "not ready",
                "reason": format!("session store not reachable: {}", e),
            }),
        ),
    }
}

pub fn version_inner() -> serde_json::Value {
    serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "protocol": "liveagent/1",
    })
}

/// Bearer-token check for agent management. Open when no key is configured.
pub fn authorize(expected: Option<&str>, authorization: Option<&str>) -> bool {
    match expected {
        None => true,
        Some(key) => authorization
            .map(|h| h.strip_prefix("Bearer ").unwrap_or(h))
            .is_some_and(|token| token == key),
    }
}

/// Route an IPC request and translate the response into an HTTP pair.
pub async fn dispatch_inner(
    runtime: &AgentRuntime,
    request: RuntimeRequest,
) -> (StatusCode, serde_json::Value) {
    let response = crate::router::handle_request(request, runtime).await;
    match response_to_http(response) {
        Ok(data) => (StatusCode::OK, data),
        Err((status, message)) => (
            status,
            serde_json::json!({
                "error": message,
                "status": "error",
            }),
        ),
    }
}

pub async fn register_agent_inner(
    runtime: &AgentRuntime,
    req: RegisterAgentRequest,
) -> (StatusCode, serde_json::Value) {
    dispatch_inner(
        runtime,
        RuntimeRequest::RegisterAgent {
            agent_id: req.agent_id,
            tenant_id: req.tenant_id,
            config: req.config,
        },
    )
    .await
}

pub async fn create_session_inner(
    runtime: &AgentRuntime,
    req: CreateSessionRequest,
) -> (StatusCode, serde_json::Value) {
    dispatch_inner(
        runtime,
        RuntimeRequest::CreateSession {
            agent_id: req.agent_id,
            tenant_id: req.tenant_id,
            room_name: req.room_name,
            participant_name: req.participant_name,
        },
    )
    .await
}

// ============================================================================
// Axum handler wrappers (thin, delegate to inner functions)
// ============================================================================

fn unauthorized() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({"error": "Unauthorized", "status": "error"})),
    )
}

fn is_authorized(state: &HttpState, headers: &HeaderMap) -> bool {
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    authorize(state.config.http.api_key.as_deref(), authorization)
}

pub async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(health_inner()))
}

pub async fn ready_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let (status, body) = ready_inner(&state.runtime).await;
    (status, Json(body))
}

pub async fn version_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(version_inner()))
}

pub async fn register_agent_handler(
    State(state): State<Arc<HttpState>>,
    headers: HeaderMap,
    Json(req): Json<RegisterAgentRequest>,
) -> impl IntoResponse {
    if !is_authorized(&state, &headers) {
        return unauthorized();
    }
    let (status, body) = register_agent_inner(&state.runtime, req).await;
    (status, Json(body))
}

pub async fn unregister_agent_handler(
    State(state): State<Arc<HttpState>>,
    headers: HeaderMap,
    Path(agent_id): Path<i32>,
) -> impl IntoResponse {
    if !is_authorized(&state, &headers) {
        return unauthorized();
    }
    let (status, body) =
        dispatch_inner(&state.runtime, RuntimeRequest::UnregisterAgent { agent_id }).await;
    (status, Json(body))
}

pub async fn list_agents_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let (status, body) = dispatch_inner(&state.runtime, RuntimeRequest::ListAgents).await;
    (status, Json(body))
}

pub async fn agent_status_handler(
    State(state): State<Arc<HttpState>>,
    Path(agent_id): Path<i32>,
) -> impl IntoResponse {
    let (status, body) =
        dispatch_inner(&state.runtime, RuntimeRequest::GetAgentStatus { agent_id }).await;
    (status, Json(body))
}

pub async fn agent_sessions_handler(
    State(state): State<Arc<HttpState>>,
    Path(agent_id): Path<i32>,
) -> impl IntoResponse {
    let (status, body) =
        dispatch_inner(&state.runtime, RuntimeRequest::ListAgentSessions { agent_id }).await;
    (status, Json(body))
}

pub async fn create_session_handler(
    State(state): State<Arc<HttpState>>,
    Json(req): Json<CreateSessionRequest>,
) -> impl IntoResponse {
    let (status, body) = create_session_inner(&state.runtime, req).await;
    (status, Json(body))
}

pub async fn get_session_handler(
    State(state): State<Arc<HttpState>>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    let (status, body) =
        dispatch_inner(&state.runtime, RuntimeRequest::GetSession { session_id }).await;
    (status, Json(body))
}

pub async fn end_session_handler(
    State(state): State<Arc<HttpState>>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    let (status, body) =
        dispatch_inner(&state.runtime, RuntimeRequest::EndSession { session_id }).await;
    (status, Json(body))
}

pub async fn update_session_handler(
    State(state): State<Arc<HttpState>>,
    Path(session_id): Path<String>,
    Json(req): Json<UpdateSessionRequest>,
) -> impl IntoResponse {
    let (status, body) = dispatch_inner(
        &state.runtime,
        RuntimeRequest::UpdateSession {
            session_id,
            status: req.status,
            participant_count: req.participant_count,
        },
    )
    .await;
    (status, Json(body))
}

// ============================================================================
// Helpers
// ============================================================================

/// HTTP status for an IPC error class.
pub fn status_for_kind(kind: Option<&str>) -> StatusCode {
    match kind {
        Some("validation") => StatusCode::BAD_REQUEST,
        Some("not_registered") | Some("not_found") => StatusCode::NOT_FOUND,
        Some("capacity_exceeded") => StatusCode::TOO_MANY_REQUESTS,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Convert an IPC `RuntimeResponse` into an HTTP body value, or a status and message.
pub fn response_to_http(
    response: RuntimeResponse,
) -> std::result::Result<serde_json::Value, (StatusCode, String)> {
    if response.is_ok() {
        Ok(response.data.unwrap_or(serde_json::json!({})))
    } else {
        Err((
            status_for_kind(response.kind.as_deref()),
            response.error.unwrap_or_else(|| "unknown error".to_string()),
        ))
    }
}

// ============================================================================
// Unit Tests: call inner functions directly
// ============================================================================
