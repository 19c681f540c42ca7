//! Session Registry — authoritative in-memory cache of live sessions.
//!
//! Every mutation lands in the cache first and is then mirrored to the
//! `SessionStore` outside the cache lock. Store failures are logged and
//! swallowed: the cache keeps reflecting the locally intended outcome, so
//! cache and store may diverge until the next successful write.
//!
//! Writes for one session are serialised and always carry the newest cached
//! state, so a slow write can never land after, and overwrite, a later one.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use liveagent_core::{Session, SessionStatus, SessionStore, SessionUpdate};
use parking_lot::{Mutex, RwLock};

/// Store-side shadow of one cached session.
struct StoreMirror {
    /// Newest state not yet handed to the store.
    pending: Mutex<Option<Session>>,
    /// Held across the store call. `true` once the record exists in the store.
    written: tokio::sync::Mutex<bool>,
}

impl StoreMirror {
    fn new(exists_in_store: bool) -> Self {
        Self {
            pending: Mutex::new(None),
            written: tokio::sync::Mutex::new(exists_in_store),
        }
    }
}

pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Session>>,
    by_agent: Mutex<HashMap<i32, HashSet<String>>>,
    mirrors: Mutex<HashMap<String, Arc<StoreMirror>>>,
    store: Arc<dyn SessionStore>,
}

impl SessionRegistry {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            by_agent: Mutex::new(HashMap::new()),
            mirrors: Mutex::new(HashMap::new()),
            store,
        }
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Create a `connecting` session, cache it, then mirror it to the store.
    pub async fn create(&self, agent_id: i32, tenant_id: i32, room_name: &str) -> Session {
        let session = Session::new(agent_id, tenant_id, room_name);

        let mirror = {
            let mut sessions = self.sessions.write();
            sessions.insert(session.session_id.clone(), session.clone());
            self.index(agent_id, &session.session_id);
            self.stage(&session, false)
        };
        self.flush(&session.session_id, &mirror).await;

        tracing::info!(
            session_id = %session.session_id,
            agent_id,
            room = %room_name,
            "Session created"
        );
        session
    }

    /// Cache-only lookup; returns `None` when the session is not cached.
    ///
    /// `ended` is terminal: a cached ended session is returned unchanged.
    pub async fn update_status(
        &self,
        session_id: &str,
        status: SessionStatus,
        participant_count: Option<i32>,
    ) -> Option<Session> {
        let (snapshot, mirror) = {
            let mut sessions = self.sessions.write();
            let session = sessions.get_mut(session_id)?;
            if session.is_ended() {
                return Some(session.clone());
            }

            if status == SessionStatus::Ended {
                session.mark_ended(Utc::now());
            } else {
                session.status = status;
            }
            if let Some(count) = participant_count {
                session.participant_count = count;
            }
            let snapshot = session.clone();
            let mirror = self.stage(&snapshot, true);
            (snapshot, mirror)
        };
        self.flush(session_id, &mirror).await;

        tracing::debug!(session_id = %session_id, status = %snapshot.status, "Session updated");
        Some(snapshot)
    }

    /// Transition to `ended`, then drop the session from the cache and the
    /// per-agent index. Returns the ended record if it was cached.
    ///
    /// Eviction waits until the ended record has been handed to the store.
    pub async fn end(&self, session_id: &str) -> Option<Session> {
        let ended = self
            .update_status(session_id, SessionStatus::Ended, None)
            .await;

        let mirror = self.mirrors.lock().get(session_id).cloned();
        if let Some(mirror) = mirror {
            self.flush(session_id, &mirror).await;
        }

        let removed = self.sessions.write().remove(session_id);
        self.mirrors.lock().remove(session_id);
        if let Some(session) = removed {
            self.unindex(session.agent_id, session_id);
            tracing::info!(
                session_id = %session_id,
                agent_id = session.agent_id,
                duration_seconds = ?ended.as_ref().and_then(|s| s.duration_seconds),
                "Session ended"
            );
        }
        ended
    }

    /// Cache first, then a single read-through from the store. Ended records
    /// read from the store are returned but not cached.
    pub async fn get(&self, session_id: &str) -> Option<Session> {
        let cached = self.sessions.read().get(session_id).cloned();
        if cached.is_some() {
            return cached;
        }

        match self.store.find_by_key(session_id).await {
            Ok(Some(session)) if session.is_ended() => Some(session),
            Ok(Some(session)) => {
                let cached = {
                    let mut sessions = self.sessions.write();
                    let cached = sessions
                        .entry(session_id.to_string())
                        .or_insert(session)
                        .clone();
                    if !cached.is_ended() {
                        self.index(cached.agent_id, session_id);
                    }
                    cached
                };
                tracing::debug!(session_id = %session_id, "Session loaded from store");
                Some(cached)
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(session_id = %session_id, error = %e, "Failed to load session from store");
                None
            }
        }
    }

    /// Cached and not ended.
    pub fn is_live(&self, session_id: &str) -> bool {
        self.sessions
            .read()
            .get(session_id)
            .is_some_and(|s| !s.is_ended())
    }

    /// Cached sessions of one agent, oldest first. Never consults the store.
    pub fn get_by_agent(&self, agent_id: i32) -> Vec<Session> {
        let ids: Vec<String> = self
            .by_agent
            .lock()
            .get(&agent_id)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default();

        let sessions = self.sessions.read();
        let mut found: Vec<Session> = ids
            .iter()
            .filter_map(|id| sessions.get(id).cloned())
            .collect();
        found.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        found
    }

    pub fn cached_count(&self) -> usize {
        self.sessions.read().len()
    }

    /// Record `session` as the newest state to mirror. Called with the cache
    /// write lock held, so staged states follow cache order.
    fn stage(&self, session: &Session, exists_in_store: bool) -> Arc<StoreMirror> {
        let mirror = self
            .mirrors
            .lock()
            .entry(session.session_id.clone())
            .or_insert_with(|| Arc::new(StoreMirror::new(exists_in_store)))
            .clone();
        *mirror.pending.lock() = Some(session.clone());
        mirror
    }

    /// Hand the newest staged state to the store. A no-op when a concurrent
    /// flush already wrote it.
    async fn flush(&self, session_id: &str, mirror: &StoreMirror) {
        let mut written = mirror.written.lock().await;
        let pending = mirror.pending.lock().take();
        let Some(session) = pending else {
            return;
        };

        if *written {
            match self
                .store
                .update_by_key(session_id, &SessionUpdate::from_session(&session))
                .await
            {
                Ok(()) => {}
                Err(e) => tracing::warn!(
                    session_id = %session_id,
                    status = %session.status,
                    error = %e,
                    "Failed to persist session update"
                ),
            }
        } else {
            match self.store.insert(&session).await {
                Ok(()) => *written = true,
                Err(e) => tracing::warn!(
                    session_id = %session_id,
                    store = self.store.name(),
                    error = %e,
                    "Failed to persist new session; cache remains authoritative"
                ),
            }
        }
    }

    fn index(&self, agent_id: i32, session_id: &str) {
        self.by_agent
            .lock()
            .entry(agent_id)
            .or_default()
            .insert(session_id.to_string());
    }

    fn unindex(&self, agent_id: i32, session_id: &str) {
        let mut by_agent = self.by_agent.lock();
        if let Some(ids) = by_agent.get_mut(&agent_id) {
            ids.remove(session_id);
            if ids.is_empty() {
                by_agent.remove(&agent_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::testing::{FlakyStore, SlowStore};
    use liveagent_core::MemorySessionStore;
    use std::time::Duration;

    fn registry() -> (SessionRegistry, Arc<MemorySessionStore>) {
        let store = Arc::new(MemorySessionStore::new());
        (SessionRegistry::new(store.clone()), store)
    }

    #[tokio::test]
    async fn test_create_caches_and_persists() {
        let (registry, store) = registry();
        let session = registry.create(42, 1, "r1").await;

        assert_eq!(session.status, SessionStatus::Connecting);
        assert_eq!(registry.get(&session.session_id).await.unwrap().room_name, "r1");
        let stored = store.find_by_key(&session.session_id).await.unwrap().unwrap();
        assert_eq!(stored.agent_id, 42);
    }

    #[tokio::test]
    async fn test_update_status_unknown_session_is_noop() {
        let (registry, store) = registry();
        assert!(registry
            .update_status("nope", SessionStatus::Active, Some(3))
            .await
            .is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_update_status_sets_participants_and_mirrors() {
        let (registry, store) = registry();
        let session = registry.create(1, 1, "r").await;

        let updated = registry
            .update_status(&session.session_id, SessionStatus::Active, Some(2))
            .await
            .unwrap();
        assert_eq!(updated.status, SessionStatus::Active);
        assert_eq!(updated.participant_count, 2);
        assert!(updated.ended_at.is_none());

        let stored = store.find_by_key(&session.session_id).await.unwrap().unwrap();
        assert_eq!(stored.status, SessionStatus::Active);
        assert_eq!(stored.participant_count, 2);
    }

    #[tokio::test]
    async fn test_ended_is_terminal() {
        let (registry, _store) = registry();
        let session = registry.create(1, 1, "r").await;
        let ended = registry
            .update_status(&session.session_id, SessionStatus::Ended, None)
            .await
            .unwrap();
        let again = registry
            .update_status(&session.session_id, SessionStatus::Active, None)
            .await
            .unwrap();
        assert_eq!(again.status, SessionStatus::Ended);
        assert_eq!(again.ended_at, ended.ended_at);
    }

    #[tokio::test]
    async fn test_end_removes_from_cache_and_index() {
        let (registry, store) = registry();
        let session = registry.create(7, 1, "r").await;
        assert_eq!(registry.get_by_agent(7).len(), 1);

        let ended = registry.end(&session.session_id).await.unwrap();
        assert_eq!(ended.status, SessionStatus::Ended);
        assert!(ended.ended_at.is_some());
        assert_eq!(ended.duration_seconds, Some(0));
        assert_eq!(registry.cached_count(), 0);
        assert!(registry.get_by_agent(7).is_empty());

        // history survives in the store
        let stored = store.find_by_key(&session.session_id).await.unwrap().unwrap();
        assert_eq!(stored.status, SessionStatus::Ended);
        assert!(stored.duration_seconds.is_some());
    }

    #[tokio::test]
    async fn test_end_unknown_session_is_noop() {
        let (registry, _store) = registry();
        assert!(registry.end("missing").await.is_none());
    }

    #[tokio::test]
    async fn test_get_reads_through_and_repopulates_cache() {
        let (registry, store) = registry();
        let mut session = Session::new(3, 1, "from-store");
        session.status = SessionStatus::Active;
        store.insert(&session).await.unwrap();

        assert_eq!(registry.cached_count(), 0);
        let found = registry.get(&session.session_id).await.unwrap();
        assert_eq!(found.room_name, "from-store");
        assert_eq!(registry.cached_count(), 1);
        assert_eq!(registry.get_by_agent(3).len(), 1);
    }

    #[tokio::test]
    async fn test_get_absent_everywhere_is_none() {
        let (registry, _store) = registry();
        assert!(registry.get("ghost").await.is_none());
    }

    #[tokio::test]
    async fn test_store_failures_do_not_affect_cache() {
        let store = Arc::new(FlakyStore::failing());
        let registry = SessionRegistry::new(store.clone());

        let session = registry.create(1, 1, "offline").await;
        assert_eq!(registry.get(&session.session_id).await.unwrap().room_name, "offline");

        let ended = registry.end(&session.session_id).await.unwrap();
        assert!(ended.is_ended());
        assert!(registry.get(&session.session_id).await.is_none());
        assert!(store.write_attempts() >= 2);
    }

    #[tokio::test]
    async fn test_get_by_agent_only_returns_that_agent() {
        let (registry, _store) = registry();
        registry.create(1, 1, "a").await;
        registry.create(1, 1, "b").await;
        registry.create(2, 1, "c").await;

        let rooms: Vec<String> = registry
            .get_by_agent(1)
            .into_iter()
            .map(|s| s.room_name)
            .collect();
        assert_eq!(rooms.len(), 2);
        assert!(rooms.contains(&"a".to_string()));
        assert!(rooms.contains(&"b".to_string()));
    }

    #[tokio::test]
    async fn test_get_does_not_cache_ended_history() {
        let (registry, store) = registry();
        let mut session = Session::new(3, 1, "old-call");
        session.mark_ended(Utc::now());
        store.insert(&session).await.unwrap();

        let found = registry.get(&session.session_id).await.unwrap();
        assert!(found.is_ended());
        assert_eq!(registry.cached_count(), 0);
        assert!(registry.get_by_agent(3).is_empty());
    }

    #[tokio::test]
    async fn test_slow_write_never_overwrites_later_end() {
        let store = Arc::new(SlowStore::default().slow_activation(Duration::from_millis(200)));
        let registry = Arc::new(SessionRegistry::new(store.clone()));
        let session = registry.create(1, 1, "r").await;
        let session_id = session.session_id.clone();

        let activating = tokio::spawn({
            let registry = registry.clone();
            let session_id = session_id.clone();
            async move {
                registry
                    .update_status(&session_id, SessionStatus::Active, None)
                    .await
            }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;

        let ended = registry.end(&session_id).await.unwrap();
        assert!(ended.is_ended());
        activating.await.unwrap();

        let stored = store.inner().find_by_key(&session_id).await.unwrap().unwrap();
        assert_eq!(stored.status, SessionStatus::Ended);
        assert_eq!(registry.cached_count(), 0);
        assert!(registry.get(&session_id).await.unwrap().is_ended());
    }
}
