pub mod config;
pub mod db;
pub mod dispatch;
pub mod error;
pub mod ipc;
pub mod models;
pub mod store;

pub use config::LiveAgentConfig;
pub use dispatch::{
    DispatchError, DispatchGateway, DispatchMetadata, DispatchRequest, LiveKitDispatchClient,
};
pub use error::RuntimeError;
pub use models::{AgentConfig, AgentDefinition, LiveKitCredentials, Session, SessionStatus};
pub use store::{MemorySessionStore, PgSessionStore, SessionStore, SessionUpdate, StoreError};
