pub mod agent;
pub mod session;

pub use agent::{AgentConfig, AgentDefinition, LiveKitCredentials};
pub use session::{Session, SessionStatus};
