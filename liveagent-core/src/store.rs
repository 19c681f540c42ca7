//! Durable Store Gateway — the write-behind mirror of session records.
//!
//! The in-memory session cache is authoritative for live sessions; the store
//! holds history once a session leaves the cache. Callers treat every
//! `StoreError` as an external-dependency failure: logged, never fatal.
//!
//! `agent_instance_sessions` is owned by an external migration system. This
//! module only reads and writes the columns it needs and never touches schema.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use parking_lot::Mutex;
use sqlx::PgPool;
use thiserror::Error;

use crate::models::{Session, SessionStatus};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Corrupt session row {session_id}: {reason}")]
    Corrupt { session_id: String, reason: String },

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Mutable columns of a session record.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionUpdate {
    pub status: SessionStatus,
    pub ended_at: Option<chrono::DateTime<chrono::Utc>>,
    pub duration_seconds: Option<i32>,
    pub participant_count: Option<i32>,
}

impl SessionUpdate {
    pub fn from_session(session: &Session) -> Self {
        Self {
            status: session.status,
            ended_at: session.ended_at,
            duration_seconds: session.duration_seconds,
            participant_count: Some(session.participant_count),
        }
    }
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert(&self, session: &Session) -> Result<(), StoreError>;

    /// Apply `update` to the record keyed by `session_id`. An unknown key is
    /// not an error.
    async fn update_by_key(&self, session_id: &str, update: &SessionUpdate)
        -> Result<(), StoreError>;

    async fn find_by_key(&self, session_id: &str) -> Result<Option<Session>, StoreError>;

    /// Reachability probe for readiness checks.
    async fn ping(&self) -> Result<(), StoreError>;

    /// Backend name for logging.
    fn name(&self) -> &str;
}

// ============================================================================
// PgSessionStore
// ============================================================================

#[derive(Debug, sqlx::FromRow)]
struct SessionRow {
    session_id: String,
    agent_id: i32,
    tenant_id: i32,
    room_name: String,
    status: String,
    started_at: NaiveDateTime,
    ended_at: Option<NaiveDateTime>,
    duration_seconds: Option<i32>,
    participant_count: Option<i32>,
}

impl TryFrom<SessionRow> for Session {
    type Error = StoreError;

    fn try_from(row: SessionRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<SessionStatus>()
            .map_err(|e| StoreError::Corrupt {
                session_id: row.session_id.clone(),
                reason: e.to_string(),
            })?;

        Ok(Session {
            session_id: row.session_id,
            agent_id: row.agent_id,
            tenant_id: row.tenant_id,
            room_name: row.room_name,
            status,
            started_at: row.started_at.and_utc(),
            ended_at: row.ended_at.map(|t| t.and_utc()),
            duration_seconds: row.duration_seconds,
            participant_count: row.participant_count.unwrap_or(0),
        })
    }
}

/// Postgres-backed store over `agent_instance_sessions`. Timestamps are
/// written as naive UTC to match the `timestamp` (no time zone) columns.
#[derive(Debug, Clone)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn insert(&self, session: &Session) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO agent_instance_sessions
                (agent_id, tenant_id, session_id, room_name, status, started_at, participant_count)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(session.agent_id)
        .bind(session.tenant_id)
        .bind(&session.session_id)
        .bind(&session.room_name)
        .bind(session.status.as_str())
        .bind(session.started_at.naive_utc())
        .bind(session.participant_count)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_by_key(
        &self,
        session_id: &str,
        update: &SessionUpdate,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE agent_instance_sessions
            SET status = $2,
                ended_at = COALESCE($3, ended_at),
                duration_seconds = COALESCE($4, duration_seconds),
                participant_count = COALESCE($5, participant_count),
                updated_at = NOW()
            WHERE session_id = $1
            "#,
        )
        .bind(session_id)
        .bind(update.status.as_str())
        .bind(update.ended_at.map(|t| t.naive_utc()))
        .bind(update.duration_seconds)
        .bind(update.participant_count)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            tracing::debug!(session_id = %session_id, "No stored row to update");
        }
        Ok(())
    }

    async fn find_by_key(&self, session_id: &str) -> Result<Option<Session>, StoreError> {
        let row: Option<SessionRow> = sqlx::query_as(
            r#"
            SELECT session_id, agent_id, tenant_id, room_name, status,
                   started_at, ended_at, duration_seconds, participant_count
            FROM agent_instance_sessions
            WHERE session_id = $1
            "#,
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Session::try_from).transpose()
    }

    async fn ping(&self) -> Result<(), StoreError> {
        crate::db::check_sessions_table(&self.pool).await?;
        Ok(())
    }

    fn name(&self) -> &str {
        "postgres"
    }
}

// ============================================================================
// MemorySessionStore
// ============================================================================

/// In-process store with the same contract. Used when `[database] enabled =
/// false` and in tests.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    rows: Mutex<HashMap<String, Session>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.lock().is_empty()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn insert(&self, session: &Session) -> Result<(), StoreError> {
        let mut rows = self.rows.lock();
        if rows.contains_key(&session.session_id) {
            return Err(StoreError::Unavailable(format!(
                "duplicate session_id {}",
                session.session_id
            )));
        }
        rows.insert(session.session_id.clone(), session.clone());
        Ok(())
    }

    async fn update_by_key(
        &self,
        session_id: &str,
        update: &SessionUpdate,
    ) -> Result<(), StoreError> {
        if let Some(row) = self.rows.lock().get_mut(session_id) {
            row.status = update.status;
            if update.ended_at.is_some() {
                row.ended_at = update.ended_at;
            }
            if update.duration_seconds.is_some() {
                row.duration_seconds = update.duration_seconds;
            }
            if let Some(count) = update.participant_count {
                row.participant_count = count;
            }
        }
        Ok(())
    }

    async fn find_by_key(&self, session_id: &str) -> Result<Option<Session>, StoreError> {
        Ok(self.rows.lock().get(session_id).cloned())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
