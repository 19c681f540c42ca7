use liveagent_core::ipc::{RuntimeRequest, RuntimeResponse};
use liveagent_core::RuntimeError;

use crate::runtime::AgentRuntime;

/// Stable machine-readable class for each error, used by the HTTP layer to
/// pick a status code.
pub fn error_kind(error: &RuntimeError) -> &'static str {
    match error {
        RuntimeError::Validation(_) => "validation",
        RuntimeError::NotRegistered(_) => "not_registered",
        RuntimeError::CapacityExceeded { .. } => "capacity_exceeded",
        RuntimeError::NotFound(_) => "not_found",
        _ => "internal",
    }
}

fn error_response(error: RuntimeError) -> RuntimeResponse {
    RuntimeResponse::err_kind(error_kind(&error), error.to_string())
}

pub async fn handle_request(request: RuntimeRequest, runtime: &AgentRuntime) -> RuntimeResponse {
    match request {
        RuntimeRequest::Ping => RuntimeResponse::pong(),
        RuntimeRequest::Health => match runtime.ready().await {
            Ok(()) => RuntimeResponse::ok(serde_json::json!({
                "status": "healthy",
                "agents": runtime.list_agents().await.len(),
                "cached_sessions": runtime.sessions().cached_count(),
            })),
            Err(e) => RuntimeResponse::err(format!("Store check failed: {}", e)),
        },
        RuntimeRequest::RegisterAgent {
            agent_id,
            tenant_id,
            config,
        } => match runtime.register_agent(agent_id, tenant_id, config).await {
            Ok(()) => RuntimeResponse::ok(serde_json::json!({
                "success": true,
                "agentId": agent_id,
            })),
            Err(e) => error_response(e),
        },
        RuntimeRequest::UnregisterAgent { agent_id } => {
            match runtime.unregister_agent(agent_id).await {
                Ok(()) => RuntimeResponse::ok(serde_json::json!({"success": true})),
                Err(e) => error_response(e),
            }
        }
        RuntimeRequest::CreateSession {
            agent_id,
            tenant_id,
            room_name,
            participant_name,
        } => {
            match runtime
                .create_session(agent_id, tenant_id, &room_name, participant_name.as_deref())
                .await
            {
                Ok(session) => RuntimeResponse::ok(serde_json::json!({
                    "success": true,
                    "session": session,
                })),
                Err(e) => error_response(e),
            }
        }
        RuntimeRequest::EndSession { session_id } => match runtime.end_session(&session_id).await {
            Ok(()) => RuntimeResponse::ok(serde_json::json!({"success": true})),
            Err(e) => error_response(e),
        },
        RuntimeRequest::GetSession { session_id } => match runtime.get_session(&session_id).await {
            Some(session) => RuntimeResponse::ok(serde_json::json!(session)),
            None => error_response(RuntimeError::NotFound(session_id)),
        },
        RuntimeRequest::UpdateSession {
            session_id,
            status,
            participant_count,
        } => match runtime
            .update_session(&session_id, &status, participant_count)
            .await
        {
            Ok(session) => RuntimeResponse::ok(serde_json::json!(session)),
            Err(e) => error_response(e),
        },
        RuntimeRequest::GetAgentStatus { agent_id } => {
            RuntimeResponse::ok(serde_json::json!(runtime.get_agent_status(agent_id).await))
        }
        RuntimeRequest::ListAgents => RuntimeResponse::ok(serde_json::json!({
            "agents": runtime.list_agents().await,
        })),
        RuntimeRequest::ListAgentSessions { agent_id } => RuntimeResponse::ok(serde_json::json!({
            "sessions": runtime.list_agent_sessions(agent_id).await,
        })),
    }
}
