//! Dispatch Gateway — asks the real-time platform to place an agent in a room.
//!
//! A dispatch failure never aborts session creation; the caller logs it and
//! carries on, so an automatic or out-of-band join can still pick the room up.
//!
//! `LiveKitDispatchClient` talks to LiveKit's Twirp endpoint
//! `livekit.AgentDispatchService/CreateDispatch` with a short-lived HS256
//! access token carrying a `roomAdmin` grant for the target room.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use jsonwebtoken::{EncodingKey, Header};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;

use crate::config::LiveKitConfig;
use crate::models::{LiveKitCredentials, Session};

const CREATE_DISPATCH_PATH: &str = "/twirp/livekit.AgentDispatchService/CreateDispatch";

// ============================================================================
// DispatchGateway trait
// ============================================================================

#[async_trait]
pub trait DispatchGateway: Send + Sync {
    async fn request_join(&self, request: &DispatchRequest) -> Result<(), DispatchError>;

    /// Gateway name for logging.
    fn name(&self) -> &str;
}

// ============================================================================
// Error / request types
// ============================================================================

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("LiveKit credentials not configured")]
    MissingCredentials,

    #[error("Access token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    #[error("Metadata encoding error: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error("All {attempts} dispatch attempts failed")]
    RetryExhausted { attempts: usize },
}

impl DispatchError {
    /// Server-side and transport failures are retried; client errors are not.
    fn is_transient(&self) -> bool {
        match self {
            DispatchError::Http(_) => true,
            DispatchError::Api { code, .. } => *code >= 500 || *code == 429,
            _ => false,
        }
    }
}

/// Correlation metadata attached to a dispatch, read back by the agent worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchMetadata {
    pub agent_id: i32,
    pub session_id: String,
    pub tenant_id: i32,
    /// Display name of the caller who asked for the session, if given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participant_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DispatchRequest {
    pub agent_name: String,
    pub room_name: String,
    pub metadata: DispatchMetadata,
    /// Per-agent credential overrides.
    pub credentials: Option<LiveKitCredentials>,
}

impl DispatchRequest {
    pub fn for_session(session: &Session, credentials: Option<LiveKitCredentials>) -> Self {
        Self {
            agent_name: agent_name(session.agent_id),
            room_name: session.room_name.clone(),
            metadata: DispatchMetadata {
                agent_id: session.agent_id,
                session_id: session.session_id.clone(),
                tenant_id: session.tenant_id,
                participant_name: None,
            },
            credentials,
        }
    }

    pub fn with_participant(mut self, participant_name: Option<&str>) -> Self {
        self.metadata.participant_name = participant_name
            .filter(|name| !name.trim().is_empty())
            .map(str::to_string);
        self
    }
}

/// Worker name an agent registers under on the real-time platform.
pub fn agent_name(agent_id: i32) -> String {
    format!("agent-{}", agent_id)
}

// ============================================================================
// LiveKit wire structs (private)
// ============================================================================

#[derive(Debug, Serialize)]
struct CreateDispatchBody<'a> {
    agent_name: &'a str,
    room: &'a str,
    metadata: String,
}

#[derive(Debug, Deserialize)]
struct TwirpError {
    code: Option<String>,
    msg: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct AccessClaims {
    iss: String,
    sub: String,
    nbf: u64,
    exp: u64,
    video: VideoGrant,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoGrant {
    room_admin: bool,
    room: String,
}

struct ResolvedTarget {
    endpoint: String,
    api_key: String,
    api_secret: String,
}

// ============================================================================
// LiveKitDispatchClient
// ============================================================================

#[derive(Debug, Clone)]
pub struct LiveKitDispatchClient {
    client: Client,
    config: LiveKitConfig,
}

impl LiveKitDispatchClient {
    pub fn new(config: LiveKitConfig) -> Result<Self, DispatchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self { client, config })
    }

    fn resolve(&self, overrides: Option<&LiveKitCredentials>) -> Result<ResolvedTarget, DispatchError> {
        let pick = |own: Option<&String>, fallback: Option<&String>| {
            own.or(fallback).filter(|v| !v.is_empty()).cloned()
        };

        let url = overrides
            .and_then(|c| c.url.as_ref())
            .filter(|u| !u.is_empty())
            .unwrap_or(&self.config.url);
        let api_key = pick(
            overrides.and_then(|c| c.api_key.as_ref()),
            self.config.api_key.as_ref(),
        );
        let api_secret = pick(
            overrides.and_then(|c| c.api_secret.as_ref()),
            self.config.api_secret.as_ref(),
        );

        match (api_key, api_secret) {
            (Some(api_key), Some(api_secret)) if !url.is_empty() => Ok(ResolvedTarget {
                endpoint: format!("{}{}", http_base_url(url), CREATE_DISPATCH_PATH),
                api_key,
                api_secret,
            }),
            _ => Err(DispatchError::MissingCredentials),
        }
    }

    fn access_token(&self, target: &ResolvedTarget, room: &str) -> Result<String, DispatchError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();

        let claims = AccessClaims {
            iss: target.api_key.clone(),
            sub: target.api_key.clone(),
            nbf: now,
            exp: now + self.config.token_ttl_seconds,
            video: VideoGrant {
                room_admin: true,
                room: room.to_string(),
            },
        };

        let token = jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(target.api_secret.as_bytes()),
        )?;
        Ok(token)
    }

    async fn dispatch_once(
        &self,
        target: &ResolvedTarget,
        request: &DispatchRequest,
        metadata: &str,
    ) -> Result<(), DispatchError> {
        let token = self.access_token(target, &request.room_name)?;
        let body = CreateDispatchBody {
            agent_name: &request.agent_name,
            room: &request.room_name,
            metadata: metadata.to_string(),
        };

        let response = self
            .client
            .post(&target.endpoint)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let error_body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<TwirpError>(&error_body)
            .ok()
            .map(|e| {
                format!(
                    "{}: {}",
                    e.code.unwrap_or_else(|| "unknown".to_string()),
                    e.msg.unwrap_or_default()
                )
            })
            .unwrap_or(error_body);

        tracing::warn!(code = status.as_u16(), message = %message, "LiveKit dispatch rejected");

        Err(DispatchError::Api {
            code: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl DispatchGateway for LiveKitDispatchClient {
    async fn request_join(&self, request: &DispatchRequest) -> Result<(), DispatchError> {
        let target = self.resolve(request.credentials.as_ref())?;
        let metadata = serde_json::to_string(&request.metadata)?;

        let retry_strategy = ExponentialBackoff::from_millis(self.config.retry_delay_ms)
            .max_delay(Duration::from_secs(5))
            .map(jitter)
            .take(self.config.max_retries);

        let result = RetryIf::spawn(
            retry_strategy,
            || self.dispatch_once(&target, request, &metadata),
            |e: &DispatchError| e.is_transient(),
        )
        .await;

        match result {
            Ok(()) => {
                tracing::info!(
                    agent = %request.agent_name,
                    room = %request.room_name,
                    session_id = %request.metadata.session_id,
                    "Dispatched agent to room"
                );
                Ok(())
            }
            Err(e) if e.is_transient() => {
                let attempts = self.config.max_retries + 1;
                tracing::error!(attempts, error = %e, "All dispatch attempts failed");
                Err(DispatchError::RetryExhausted { attempts })
            }
            Err(e) => Err(e),
        }
    }

    fn name(&self) -> &str {
        "livekit"
    }
}

/// LiveKit URLs are usually given as websocket URLs; the server API lives on
/// the same host over HTTP(S).
fn http_base_url(url: &str) -> String {
    let url = url.trim_end_matches('/');
    if let Some(rest) = url.strip_prefix("wss://") {
        format!("https://{}", rest)
    } else if let Some(rest) = url.strip_prefix("ws://") {
        format!("http://{}", rest)
    } else {
        url.to_string()
    }
}

// ============================================================================
// TESTS
// ============================================================================
