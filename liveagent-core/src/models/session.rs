use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RuntimeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Connecting,
    Active,
    Ended,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Connecting => "connecting",
            SessionStatus::Active => "active",
            SessionStatus::Ended => "ended",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = RuntimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "connecting" => Ok(SessionStatus::Connecting),
            "active" => Ok(SessionStatus::Active),
            "ended" => Ok(SessionStatus::Ended),
            other => Err(RuntimeError::validation(format!(
                "unknown session status '{}'",
                other
            ))),
        }
    }
}

/// One run of an agent in a room, from creation to end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub session_id: String,
    pub agent_id: i32,
    pub tenant_id: i32,
    pub room_name: String,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<i32>,
    pub participant_count: i32,
}

impl Session {
    /// A fresh `connecting` session with a random 21-character id.
    pub fn new(agent_id: i32, tenant_id: i32, room_name: impl Into<String>) -> Self {
        Self {
            session_id: nanoid::nanoid!(),
            agent_id,
            tenant_id,
            room_name: room_name.into(),
            status: SessionStatus::Connecting,
            started_at: Utc::now(),
            ended_at: None,
            duration_seconds: None,
            participant_count: 0,
        }
    }

    pub fn is_ended(&self) -> bool {
        self.status == SessionStatus::Ended
    }

    /// Terminal transition. Sets `ended_at` and the whole-second duration.
    pub fn mark_ended(&mut self, at: DateTime<Utc>) {
        self.status = SessionStatus::Ended;
        self.ended_at = Some(at);
        self.duration_seconds = Some(elapsed_seconds(self.started_at, at));
    }
}

/// Whole seconds between two instants, floored and clamped at zero.
pub fn elapsed_seconds(started_at: DateTime<Utc>, ended_at: DateTime<Utc>) -> i32 {
    let secs = (ended_at - started_at).num_seconds().max(0);
    i32::try_from(secs).unwrap_or(i32::MAX)
}
