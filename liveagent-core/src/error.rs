use thiserror::Error;

use crate::dispatch::DispatchError;
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Agent {0} not registered")]
    NotRegistered(i32),

    #[error("Agent {agent_id} is at capacity ({max_sessions} sessions)")]
    CapacityExceeded { agent_id: i32, max_sessions: usize },

    #[error("Session {0} not found")]
    NotFound(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("IPC error: {0}")]
    Ipc(String),
}

impl RuntimeError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}
