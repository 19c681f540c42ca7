//! Agent Instance — one per registered agent.
//!
//! Owns admission control and the set of session ids this agent is serving.
//! Capacity is checked and a slot reserved under a single lock; the session
//! registry write and the dispatch call run afterwards, outside it.

use std::collections::HashSet;
use std::sync::Arc;

use liveagent_core::{
    AgentDefinition, DispatchGateway, DispatchRequest, RuntimeError, Session, SessionStatus,
};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;

use super::session_registry::SessionRegistry;

#[derive(Debug, Default)]
struct Slots {
    initialized: bool,
    owned: HashSet<String>,
    /// Admitted creations that have not yet produced a session id.
    reserved: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceStatus {
    pub initialized: bool,
    pub active_sessions: usize,
    pub max_sessions: usize,
}

pub struct AgentInstance {
    agent_id: i32,
    definition: RwLock<AgentDefinition>,
    default_max_sessions: usize,
    slots: Mutex<Slots>,
    sessions: Arc<SessionRegistry>,
    dispatcher: Arc<dyn DispatchGateway>,
}

impl AgentInstance {
    pub fn new(
        definition: AgentDefinition,
        sessions: Arc<SessionRegistry>,
        dispatcher: Arc<dyn DispatchGateway>,
        default_max_sessions: usize,
    ) -> Self {
        Self {
            agent_id: definition.agent_id,
            definition: RwLock::new(definition),
            default_max_sessions,
            slots: Mutex::new(Slots::default()),
            sessions,
            dispatcher,
        }
    }

    pub fn agent_id(&self) -> i32 {
        self.agent_id
    }

    pub fn tenant_id(&self) -> i32 {
        self.definition.read().tenant_id
    }

    pub fn definition(&self) -> AgentDefinition {
        self.definition.read().clone()
    }

    /// Mark the instance ready to accept sessions.
    pub fn initialize(&self) {
        self.slots.lock().initialized = true;
        tracing::info!(agent_id = self.agent_id, "Agent instance initialized");
    }

    /// Swap configuration in place; live sessions are untouched. A lowered
    /// capacity only affects future admissions.
    pub fn update_config(&self, definition: AgentDefinition) {
        *self.definition.write() = definition;
        tracing::info!(agent_id = self.agent_id, "Agent configuration updated");
    }

    pub fn max_sessions(&self) -> usize {
        self.definition
            .read()
            .config
            .max_sessions(self.default_max_sessions)
    }

    pub fn owns(&self, session_id: &str) -> bool {
        self.slots.lock().owned.contains(session_id)
    }

    pub fn session_ids(&self) -> Vec<String> {
        self.slots.lock().owned.iter().cloned().collect()
    }

    /// Admit, create and dispatch a session into `room_name`.
    ///
    /// Ownership is claimed before dispatch and activation, so an end that
    /// arrives at any point releases the slot. A session ended while being
    /// created is returned in its ended state.
    ///
    /// A dispatch failure is logged and the session is still activated; the
    /// platform's automatic dispatch or a later manual join can pick it up.
    pub async fn create_session(
        &self,
        room_name: &str,
        participant_name: Option<&str>,
    ) -> Result<Session, RuntimeError> {
        let (tenant_id, credentials) = {
            let definition = self.definition.read();
            (
                definition.tenant_id,
                definition.config.livekit_config.clone(),
            )
        };
        let reservation = self.reserve(self.max_sessions())?;

        let session = self.sessions.create(self.agent_id, tenant_id, room_name).await;
        let session_id = session.session_id.clone();

        if !reservation.commit(&session_id) {
            tracing::warn!(
                agent_id = self.agent_id,
                session_id = %session_id,
                "Agent drained during session creation; ending session"
            );
            self.sessions.end(&session_id).await;
            return Err(RuntimeError::NotRegistered(self.agent_id));
        }

        // an end that raced the creation found nothing to release
        if !self.sessions.is_live(&session_id) {
            self.release(&session_id);
            return Ok(self.ended_record(session).await);
        }

        let request =
            DispatchRequest::for_session(&session, credentials).with_participant(participant_name);
        if let Err(e) = self.dispatcher.request_join(&request).await {
            tracing::error!(
                agent_id = self.agent_id,
                session_id = %session_id,
                room = %room_name,
                gateway = self.dispatcher.name(),
                error = %e,
                "Failed to dispatch agent to room; keeping session"
            );
        }

        let activated = self
            .sessions
            .update_status(&session_id, SessionStatus::Active, None)
            .await;
        match activated {
            Some(active) if !active.is_ended() => Ok(active),
            Some(ended) => {
                self.release(&session_id);
                Ok(ended)
            }
            None => {
                self.release(&session_id);
                Ok(self.ended_record(session).await)
            }
        }
    }

    /// End the session, then release ownership. Releasing after eviction
    /// means a creation still claiming the id sees it gone and releases it
    /// itself. Ending a session this instance does not own still ends it in
    /// the registry.
    pub async fn end_session(&self, session_id: &str) -> Option<Session> {
        let ended = self.sessions.end(session_id).await;
        self.release(session_id);
        ended
    }

    pub fn status(&self) -> InstanceStatus {
        let max_sessions = self.max_sessions();
        let slots = self.slots.lock();
        InstanceStatus {
            initialized: slots.initialized,
            active_sessions: slots.owned.len(),
            max_sessions,
        }
    }

    /// Stop admitting and end every owned session. Returns how many sessions
    /// were ended; sessions already gone from the registry are skipped.
    pub async fn drain(&self) -> usize {
        let ids: Vec<String> = {
            let mut slots = self.slots.lock();
            slots.initialized = false;
            slots.owned.iter().cloned().collect()
        };

        let mut ended = 0;
        for session_id in ids {
            match self.end_session(&session_id).await {
                Some(_) => ended += 1,
                None => tracing::warn!(
                    agent_id = self.agent_id,
                    session_id = %session_id,
                    "Session missing from registry during drain"
                ),
            }
        }

        tracing::info!(agent_id = self.agent_id, ended, "Agent instance drained");
        ended
    }

    fn release(&self, session_id: &str) {
        self.slots.lock().owned.remove(session_id);
    }

    /// Final state of a session ended by someone else mid-creation.
    async fn ended_record(&self, mut session: Session) -> Session {
        match self.sessions.get(&session.session_id).await {
            Some(found) if found.is_ended() => found,
            _ => {
                session.mark_ended(chrono::Utc::now());
                session
            }
        }
    }

    fn reserve(&self, max_sessions: usize) -> Result<Reservation<'_>, RuntimeError> {
        let mut slots = self.slots.lock();
        if !slots.initialized {
            return Err(RuntimeError::NotRegistered(self.agent_id));
        }
        if slots.owned.len() + slots.reserved >= max_sessions {
            tracing::info!(
                agent_id = self.agent_id,
                max_sessions,
                "Session rejected: agent at capacity"
            );
            return Err(RuntimeError::CapacityExceeded {
                agent_id: self.agent_id,
                max_sessions,
            });
        }
        slots.reserved += 1;
        Ok(Reservation {
            slots: &self.slots,
            committed: false,
        })
    }
}

/// A held admission slot. Dropping it without `commit` gives the slot back,
/// which covers cancelled requests.
struct Reservation<'a> {
    slots: &'a Mutex<Slots>,
    committed: bool,
}

impl Reservation<'_> {
    /// Convert the slot into ownership of `session_id`. Returns false if the
    /// instance stopped accepting sessions in the meantime.
    fn commit(mut self, session_id: &str) -> bool {
        self.committed = true;
        let mut slots = self.slots.lock();
        slots.reserved -= 1;
        if slots.initialized {
            slots.owned.insert(session_id.to_string());
            true
        } else {
            false
        }
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.slots.lock().reserved -= 1;
        }
    }
}
