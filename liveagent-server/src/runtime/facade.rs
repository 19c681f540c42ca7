//! Runtime Facade — the single entry point for the IPC and HTTP layers.
//!
//! Holds no state of its own beyond the two registries; every operation is
//! delegation plus error translation.

use std::sync::Arc;

use liveagent_core::{
    DispatchGateway, RuntimeError, Session, SessionStatus, SessionStore, StoreError,
};
use serde::Serialize;

use super::agent_registry::AgentRegistry;
use super::session_registry::SessionRegistry;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentStatus {
    pub registered: bool,
    pub active: bool,
    pub active_sessions: usize,
    pub max_sessions: usize,
}

pub struct AgentRuntime {
    agents: AgentRegistry,
    sessions: Arc<SessionRegistry>,
}

impl AgentRuntime {
    pub fn new(
        store: Arc<dyn SessionStore>,
        dispatcher: Arc<dyn DispatchGateway>,
        default_max_sessions: usize,
    ) -> Self {
        let sessions = Arc::new(SessionRegistry::new(store));
        let agents = AgentRegistry::new(sessions.clone(), dispatcher, default_max_sessions);
        Self { agents, sessions }
    }

    pub fn agents(&self) -> &AgentRegistry {
        &self.agents
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub async fn register_agent(
        &self,
        agent_id: i32,
        tenant_id: i32,
        config: serde_json::Value,
    ) -> Result<(), RuntimeError> {
        self.agents.register(agent_id, tenant_id, config)?;
        Ok(())
    }

    /// Idempotent: unregistering an unknown agent succeeds.
    pub async fn unregister_agent(&self, agent_id: i32) -> Result<(), RuntimeError> {
        self.agents.unregister(agent_id).await;
        Ok(())
    }

    pub async fn create_session(
        &self,
        agent_id: i32,
        tenant_id: i32,
        room_name: &str,
        participant_name: Option<&str>,
    ) -> Result<Session, RuntimeError> {
        if room_name.trim().is_empty() {
            return Err(RuntimeError::validation("room name must not be empty"));
        }

        let instance = self
            .agents
            .get(agent_id)
            .ok_or(RuntimeError::NotRegistered(agent_id))?;

        if instance.tenant_id() != tenant_id {
            return Err(RuntimeError::validation(format!(
                "agent {} does not belong to tenant {}",
                agent_id, tenant_id
            )));
        }

        instance.create_session(room_name, participant_name).await
    }

    /// End a session wherever it lives. Unknown sessions are a no-op.
    pub async fn end_session(&self, session_id: &str) -> Result<(), RuntimeError> {
        let owner = match self.sessions.get(session_id).await {
            Some(session) => self.agents.get(session.agent_id),
            None => None,
        };

        match owner {
            Some(instance) => {
                instance.end_session(session_id).await;
            }
            None => {
                self.sessions.end(session_id).await;
            }
        }
        Ok(())
    }

    pub async fn get_session(&self, session_id: &str) -> Option<Session> {
        self.sessions.get(session_id).await
    }

    /// Status/participant update from the platform side (webhooks). An
    /// `ended` status performs a full end.
    pub async fn update_session(
        &self,
        session_id: &str,
        status: &str,
        participant_count: Option<i32>,
    ) -> Result<Session, RuntimeError> {
        let status: SessionStatus = status.parse()?;

        // make sure a stored-only session is cached before touching it
        let current = self
            .sessions
            .get(session_id)
            .await
            .ok_or_else(|| RuntimeError::NotFound(session_id.to_string()))?;
        if current.is_ended() {
            return Ok(current);
        }

        let updated = self
            .sessions
            .update_status(session_id, status, participant_count)
            .await
            .ok_or_else(|| RuntimeError::NotFound(session_id.to_string()))?;

        if updated.is_ended() {
            self.end_session(session_id).await?;
        }
        Ok(updated)
    }

    pub async fn get_agent_status(&self, agent_id: i32) -> AgentStatus {
        match self.agents.get(agent_id) {
            Some(instance) => {
                let status = instance.status();
                AgentStatus {
                    registered: true,
                    active: status.initialized,
                    active_sessions: status.active_sessions,
                    max_sessions: status.max_sessions,
                }
            }
            None => AgentStatus {
                registered: false,
                active: false,
                active_sessions: 0,
                max_sessions: 0,
            },
        }
    }

    pub async fn list_agents(&self) -> Vec<i32> {
        self.agents.list()
    }

    pub async fn list_agent_sessions(&self, agent_id: i32) -> Vec<Session> {
        self.sessions.get_by_agent(agent_id)
    }

    /// Readiness: the store mirror answers.
    pub async fn ready(&self) -> Result<(), StoreError> {
        self.sessions.store().ping().await
    }
}
