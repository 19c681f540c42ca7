use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum RuntimeRequest {
    Ping,
    Health,
    RegisterAgent {
        agent_id: i32,
        tenant_id: i32,
        config: serde_json::Value,
    },
    UnregisterAgent {
        agent_id: i32,
    },
    CreateSession {
        agent_id: i32,
        tenant_id: i32,
        room_name: String,
        #[serde(default)]
        participant_name: Option<String>,
    },
    EndSession {
        session_id: String,
    },
    GetSession {
        session_id: String,
    },
    UpdateSession {
        session_id: String,
        status: String,
        #[serde(default)]
        participant_count: Option<i32>,
    },
    GetAgentStatus {
        agent_id: i32,
    },
    ListAgents,
    ListAgentSessions {
        agent_id: i32,
    },
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RuntimeResponse {
    pub status: String,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    /// Machine-readable error class (`validation`, `not_registered`, ...).
    #[serde(default)]
    pub kind: Option<String>,
    pub version: String,
}

impl RuntimeResponse {
    pub fn ok(data: serde_json::Value) -> Self {
        Self {
            status: "ok".to_string(),
            data: Some(data),
            error: None,
            kind: None,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            data: None,
            error: Some(msg.into()),
            kind: None,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn err_kind(kind: &str, msg: impl Into<String>) -> Self {
        Self {
            kind: Some(kind.to_string()),
            ..Self::err(msg)
        }
    }

    pub fn pong() -> Self {
        Self::ok(serde_json::json!({"pong": true}))
    }

    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}
