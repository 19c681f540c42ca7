//! Agent Registry — agent id → instance, plus the definition each agent was
//! registered with.

use std::collections::HashMap;
use std::sync::Arc;

use liveagent_core::{AgentConfig, AgentDefinition, DispatchGateway, RuntimeError};
use parking_lot::RwLock;

use super::agent_instance::AgentInstance;
use super::session_registry::SessionRegistry;

pub struct AgentRegistry {
    instances: RwLock<HashMap<i32, Arc<AgentInstance>>>,
    configs: RwLock<HashMap<i32, AgentDefinition>>,
    sessions: Arc<SessionRegistry>,
    dispatcher: Arc<dyn DispatchGateway>,
    default_max_sessions: usize,
}

impl AgentRegistry {
    pub fn new(
        sessions: Arc<SessionRegistry>,
        dispatcher: Arc<dyn DispatchGateway>,
        default_max_sessions: usize,
    ) -> Self {
        Self {
            instances: RwLock::new(HashMap::new()),
            configs: RwLock::new(HashMap::new()),
            sessions,
            dispatcher,
            default_max_sessions,
        }
    }

    /// Register or re-register an agent. The payload is validated before any
    /// state changes; re-registration swaps configuration without touching
    /// live sessions.
    pub fn register(
        &self,
        agent_id: i32,
        tenant_id: i32,
        config: serde_json::Value,
    ) -> Result<Arc<AgentInstance>, RuntimeError> {
        let config = AgentConfig::from_value(config)?;
        let definition = AgentDefinition {
            agent_id,
            tenant_id,
            config,
        };

        let instance = {
            let mut instances = self.instances.write();
            match instances.get(&agent_id) {
                Some(existing) => {
                    existing.update_config(definition.clone());
                    existing.clone()
                }
                None => {
                    let instance = Arc::new(AgentInstance::new(
                        definition.clone(),
                        self.sessions.clone(),
                        self.dispatcher.clone(),
                        self.default_max_sessions,
                    ));
                    instance.initialize();
                    instances.insert(agent_id, instance.clone());
                    instance
                }
            }
        };
        self.configs.write().insert(agent_id, definition);

        tracing::info!(
            agent_id,
            tenant_id,
            max_sessions = instance.max_sessions(),
            "Agent registered"
        );
        Ok(instance)
    }

    /// Remove the agent and end its sessions. Unknown agents are a no-op;
    /// returns whether an instance existed.
    ///
    /// The instance leaves the map before draining so no new session can be
    /// routed to it while its sessions are being ended.
    pub async fn unregister(&self, agent_id: i32) -> bool {
        let instance = self.instances.write().remove(&agent_id);
        self.configs.write().remove(&agent_id);

        match instance {
            Some(instance) => {
                let ended = instance.drain().await;
                tracing::info!(agent_id, ended, "Agent unregistered");
                true
            }
            None => {
                tracing::debug!(agent_id, "Unregister of unknown agent ignored");
                false
            }
        }
    }

    pub fn get(&self, agent_id: i32) -> Option<Arc<AgentInstance>> {
        self.instances.read().get(&agent_id).cloned()
    }

    pub fn get_config(&self, agent_id: i32) -> Option<AgentDefinition> {
        self.configs.read().get(&agent_id).cloned()
    }

    /// Registered agent ids, ascending.
    pub fn list(&self) -> Vec<i32> {
        let mut ids: Vec<i32> = self.instances.read().keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::testing::RecordingDispatcher;
    use liveagent_core::MemorySessionStore;
    use serde_json::json;

    fn registry() -> (AgentRegistry, Arc<SessionRegistry>) {
        let sessions = Arc::new(SessionRegistry::new(Arc::new(MemorySessionStore::new())));
        let registry = AgentRegistry::new(
            sessions.clone(),
            Arc::new(RecordingDispatcher::ok()),
            10,
        );
        (registry, sessions)
    }

    fn config(max: u32) -> serde_json::Value {
        json!({
            "sttProvider": "assemblyai",
            "ttsProvider": "elevenlabs",
            "llmProvider": "anthropic",
            "maxConcurrentSessions": max
        })
    }

    #[test]
    fn test_register_creates_initialized_instance() {
        let (registry, _) = registry();
        let instance = registry.register(42, 1, config(2)).unwrap();
        assert!(instance.status().initialized);
        assert_eq!(registry.list(), vec![42]);
        assert_eq!(registry.get_config(42).unwrap().tenant_id, 1);
    }

    #[test]
    fn test_register_rejects_malformed_config_without_state_change() {
        let (registry, _) = registry();
        let err = match registry.register(42, 1, json!({"sttProvider": "deepgram"})) {
            Err(e) => e,
            Ok(_) => panic!("malformed config was accepted"),
        };
        assert!(matches!(err, RuntimeError::Validation(_)));
        assert!(registry.list().is_empty());
        assert!(registry.get_config(42).is_none());
    }

    #[tokio::test]
    async fn test_reregister_swaps_config_in_place() {
        let (registry, _) = registry();
        let first = registry.register(42, 1, config(1)).unwrap();
        let session = first.create_session("x", None).await.unwrap();

        let second = registry.register(42, 1, config(4)).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(second.owns(&session.session_id));
        assert_eq!(second.max_sessions(), 4);
        assert_eq!(
            registry.get_config(42).unwrap().config.max_concurrent_sessions,
            Some(4)
        );
    }

    #[tokio::test]
    async fn test_unregister_drains_and_removes() {
        let (registry, sessions) = registry();
        let instance = registry.register(42, 1, config(3)).unwrap();
        instance.create_session("a", None).await.unwrap();
        instance.create_session("b", None).await.unwrap();

        assert!(registry.unregister(42).await);
        assert!(registry.get(42).is_none());
        assert!(registry.get_config(42).is_none());
        assert!(registry.list().is_empty());
        assert!(sessions.get_by_agent(42).is_empty());
    }

    #[tokio::test]
    async fn test_unregister_twice_is_noop() {
        let (registry, _) = registry();
        registry.register(42, 1, config(1)).unwrap();
        assert!(registry.unregister(42).await);
        assert!(!registry.unregister(42).await);
        assert!(!registry.unregister(7).await);
    }

    #[test]
    fn test_lookups_return_none_for_unknown() {
        let (registry, _) = registry();
        assert!(registry.get(1).is_none());
        assert!(registry.get_config(1).is_none());
    }
}
