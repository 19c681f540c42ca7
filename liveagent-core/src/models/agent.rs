use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::RuntimeError;

const REQUIRED_PROVIDERS: [&str; 3] = ["sttProvider", "ttsProvider", "llmProvider"];

/// Per-agent LiveKit credentials; any field left out falls back to the
/// process-wide `[livekit]` section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveKitCredentials {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_secret: Option<String>,
}

/// Agent configuration payload.
///
/// Only `maxConcurrentSessions` and the LiveKit credentials are consumed by the
/// runtime. Provider selections are validated for presence and, together with
/// every key not named here, handed through to provider mapping untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrent_sessions: Option<u32>,
    pub stt_provider: String,
    pub tts_provider: String,
    pub llm_provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub livekit_config: Option<LiveKitCredentials>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AgentConfig {
    /// Validate and type a raw configuration payload.
    pub fn from_value(payload: Value) -> Result<Self, RuntimeError> {
        let obj = payload
            .as_object()
            .ok_or_else(|| RuntimeError::validation("agent config must be a JSON object"))?;

        for field in REQUIRED_PROVIDERS {
            match obj.get(field).and_then(Value::as_str) {
                Some(v) if !v.trim().is_empty() => {}
                _ => {
                    return Err(RuntimeError::validation(format!(
                        "missing required field '{}'",
                        field
                    )))
                }
            }
        }

        serde_json::from_value(payload)
            .map_err(|e| RuntimeError::validation(format!("invalid agent config: {}", e)))
    }

    /// Capacity for this agent. Unset or zero means `default`.
    pub fn max_sessions(&self, default: usize) -> usize {
        match self.max_concurrent_sessions {
            Some(n) if n > 0 => n as usize,
            _ => default,
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// A registered agent: its identity plus the configuration it was registered with.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentDefinition {
    pub agent_id: i32,
    pub tenant_id: i32,
    pub config: AgentConfig,
}
