pub mod agent_instance;
pub mod agent_registry;
pub mod facade;
pub mod session_registry;

#[cfg(test)]
pub(crate) mod testing;

pub use agent_instance::{AgentInstance, InstanceStatus};
pub use agent_registry::AgentRegistry;
pub use facade::{AgentRuntime, AgentStatus};
pub use session_registry::SessionRegistry;
