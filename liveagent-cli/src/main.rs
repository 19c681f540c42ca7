//! liveagent-cli — operator CLI for the LiveAgent runtime HTTP API
//!
//! # Subcommands
//! - `register <agent-id> <tenant-id> <config.json>` — register or update an agent
//! - `unregister <agent-id>`                         — unregister an agent
//! - `agents`                                        — list registered agents
//! - `agent-status <agent-id>`                       — capacity and activation
//! - `create-session <agent-id> <tenant-id> <room>`  — open a session
//! - `end-session <session-id>`                      — end a session
//! - `session <session-id>`                          — show a session
//! - `status`                                        — show server health

use clap::{Parser, Subcommand};
use serde::Deserialize;

const DEFAULT_SERVER: &str = "http://127.0.0.1:8080";

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(
    name = "liveagent-cli",
    version,
    about = "LiveAgent runtime — agent and session management"
)]
struct Cli {
    /// LiveAgent HTTP server URL (overrides LIVEAGENT_HTTP_URL env var)
    #[arg(long, env = "LIVEAGENT_HTTP_URL", default_value = DEFAULT_SERVER)]
    server: String,

    /// Bearer token for agent management endpoints
    #[arg(long, env = "LIVEAGENT_API_KEY")]
    api_key: Option<String>,

    /// Print raw JSON responses
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Register (or re-register) an agent from a JSON config file
    Register {
        agent_id: i32,
        tenant_id: i32,
        /// Path to the agent config JSON
        config: std::path::PathBuf,
    },

    /// Unregister an agent and end its live sessions
    Unregister { agent_id: i32 },

    /// List registered agents
    Agents,

    /// Show an agent's activation and capacity
    AgentStatus { agent_id: i32 },

    /// Create a session for an agent in a room
    CreateSession {
        agent_id: i32,
        tenant_id: i32,
        room: String,

        #[arg(long)]
        participant: Option<String>,
    },

    /// End a session
    EndSession { session_id: String },

    /// Show a session
    Session { session_id: String },

    /// Show LiveAgent server status
    Status,
}

// ============================================================================
// API Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub session_id: String,
    pub agent_id: i32,
    pub room_name: String,
    pub status: String,
    pub started_at: String,
    pub ended_at: Option<String>,
    pub duration_seconds: Option<i32>,
    #[serde(default)]
    pub participant_count: i32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentStatusView {
    pub registered: bool,
    pub active: bool,
    pub active_sessions: usize,
    pub max_sessions: usize,
}

/// One-line rendering of a session.
pub fn format_session(s: &SessionView) -> String {
    let mut line = format!(
        "{}  agent={}  room={}  status={}  participants={}  started={}",
        s.session_id, s.agent_id, s.room_name, s.status, s.participant_count, s.started_at
    );
    if let Some(ended) = &s.ended_at {
        line.push_str(&format!("  ended={}", ended));
    }
    if let Some(secs) = s.duration_seconds {
        line.push_str(&format!("  duration={}s", secs));
    }
    line
}

pub fn format_agent_status(agent_id: i32, s: &AgentStatusView) -> String {
    if !s.registered {
        return format!("agent {}: not registered", agent_id);
    }
    format!(
        "agent {}: {}  sessions {}/{}",
        agent_id,
        if s.active { "active" } else { "idle" },
        s.active_sessions,
        s.max_sessions
    )
}

// ============================================================================
// HTTP Client Calls
// ============================================================================

struct Api {
    client: reqwest::blocking::Client,
    server: String,
    api_key: Option<String>,
}

impl Api {
    fn new(server: &str, api_key: Option<String>) -> anyhow::Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            server: server.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn send(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> anyhow::Result<serde_json::Value> {
        let url = format!("{}{}", self.server, path);
        let mut req = self.client.request(method, &url);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        if let Some(body) = body {
            req = req.json(&body);
        }

        let resp = req
            .send()
            .map_err(|e| anyhow::anyhow!("connection failed to {}: {}", url, e))?;
        let status = resp.status();
        let value: serde_json::Value = resp.json().unwrap_or_default();
        if !status.is_success() {
            anyhow::bail!(
                "server returned {}: {}",
                status,
                value["error"].as_str().unwrap_or("unknown error")
            );
        }
        Ok(value)
    }
}

fn print_json(value: &serde_json::Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let api = Api::new(&cli.server, cli.api_key)?;
    let json = cli.json;

    match cli.command {
        Commands::Register {
            agent_id,
            tenant_id,
            config,
        } => {
            let raw = std::fs::read_to_string(&config)?;
            let config: serde_json::Value = serde_json::from_str(&raw)?;
            let body = serde_json::json!({
                "agentId": agent_id,
                "tenantId": tenant_id,
                "config": config,
            });
            let resp = api.send(reqwest::Method::POST, "/api/agents/register", Some(body))?;
            if json {
                return print_json(&resp);
            }
            println!("agent {} registered", agent_id);
        }
        Commands::Unregister { agent_id } => {
            let resp = api.send(
                reqwest::Method::DELETE,
                &format!("/api/agents/{}", agent_id),
                None,
            )?;
            if json {
                return print_json(&resp);
            }
            println!("agent {} unregistered", agent_id);
        }
        Commands::Agents => {
            let resp = api.send(reqwest::Method::GET, "/api/agents", None)?;
            if json {
                return print_json(&resp);
            }
            let ids: Vec<i32> = serde_json::from_value(resp["agents"].clone())?;
            if ids.is_empty() {
                eprintln!("No agents registered");
            }
            for id in ids {
                println!("{}", id);
            }
        }
        Commands::AgentStatus { agent_id } => {
            let resp = api.send(
                reqwest::Method::GET,
                &format!("/api/agents/{}", agent_id),
                None,
            )?;
            if json {
                return print_json(&resp);
            }
            let status: AgentStatusView = serde_json::from_value(resp)?;
            println!("{}", format_agent_status(agent_id, &status));
        }
        Commands::CreateSession {
            agent_id,
            tenant_id,
            room,
            participant,
        } => {
            let body = serde_json::json!({
                "agentId": agent_id,
                "tenantId": tenant_id,
                "roomName": room,
                "participantName": participant,
            });
            let resp = api.send(reqwest::Method::POST, "/api/sessions/create", Some(body))?;
            if json {
                return print_json(&resp);
            }
            let session: SessionView = serde_json::from_value(resp["session"].clone())?;
            println!("{}", format_session(&session));
        }
        Commands::EndSession { session_id } => {
            let resp = api.send(
                reqwest::Method::POST,
                &format!("/api/sessions/{}/end", session_id),
                None,
            )?;
            if json {
                return print_json(&resp);
            }
            println!("session {} ended", session_id);
        }
        Commands::Session { session_id } => {
            let resp = api.send(
                reqwest::Method::GET,
                &format!("/api/sessions/{}", session_id),
                None,
            )?;
            if json {
                return print_json(&resp);
            }
            let session: SessionView = serde_json::from_value(resp)?;
            println!("{}", format_session(&session));
        }
        Commands::Status => {
            let health = api.send(reqwest::Method::GET, "/health", None)?;
            let version = api.send(reqwest::Method::GET, "/version", None)?;
            let ready = api
                .send(reqwest::Method::GET, "/ready", None)
                .map(|v| v["status"].as_str().unwrap_or("unknown").to_string())
                .unwrap_or_else(|e| format!("not ready ({})", e));
            println!("LiveAgent server: {}", health["status"].as_str().unwrap_or("unknown"));
            println!("Version:          {}", version["version"].as_str().unwrap_or("?"));
            println!("Session store:    {}", ready);
        }
    }

    Ok(())
}

// ============================================================================
// Main
// ============================================================================

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("liveagent-cli: {}", e);
        std::process::exit(1);
    }
}

// ============================================================================
// Tests
// ============================================================================
