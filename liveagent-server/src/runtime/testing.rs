//! Store and dispatch doubles for lifecycle tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use liveagent_core::{
    DispatchError, DispatchGateway, DispatchRequest, MemorySessionStore, Session, SessionStatus,
    SessionStore, SessionUpdate, StoreError,
};
use parking_lot::Mutex;

/// Memory store whose writes and reads can be switched to fail.
#[derive(Default)]
pub struct FlakyStore {
    inner: MemorySessionStore,
    failing: AtomicBool,
    write_attempts: AtomicUsize,
}

impl FlakyStore {
    pub fn failing() -> Self {
        let store = Self::default();
        store.set_failing(true);
        store
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn write_attempts(&self) -> usize {
        self.write_attempts.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("connection refused".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl SessionStore for FlakyStore {
    async fn insert(&self, session: &Session) -> Result<(), StoreError> {
        self.write_attempts.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        self.inner.insert(session).await
    }

    async fn update_by_key(
        &self,
        session_id: &str,
        update: &SessionUpdate,
    ) -> Result<(), StoreError> {
        self.write_attempts.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        self.inner.update_by_key(session_id, update).await
    }

    async fn find_by_key(&self, session_id: &str) -> Result<Option<Session>, StoreError> {
        self.check()?;
        self.inner.find_by_key(session_id).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.check()
    }

    fn name(&self) -> &str {
        "flaky"
    }
}

/// Memory store that stalls inserts and/or activation writes.
#[derive(Default)]
pub struct SlowStore {
    inner: MemorySessionStore,
    insert_delay: Duration,
    activate_delay: Duration,
}

impl SlowStore {
    pub fn slow_insert(mut self, delay: Duration) -> Self {
        self.insert_delay = delay;
        self
    }

    pub fn slow_activation(mut self, delay: Duration) -> Self {
        self.activate_delay = delay;
        self
    }

    pub fn inner(&self) -> &MemorySessionStore {
        &self.inner
    }
}

#[async_trait]
impl SessionStore for SlowStore {
    async fn insert(&self, session: &Session) -> Result<(), StoreError> {
        tokio::time::sleep(self.insert_delay).await;
        self.inner.insert(session).await
    }

    async fn update_by_key(
        &self,
        session_id: &str,
        update: &SessionUpdate,
    ) -> Result<(), StoreError> {
        if update.status == SessionStatus::Active {
            tokio::time::sleep(self.activate_delay).await;
        }
        self.inner.update_by_key(session_id, update).await
    }

    async fn find_by_key(&self, session_id: &str) -> Result<Option<Session>, StoreError> {
        self.inner.find_by_key(session_id).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    fn name(&self) -> &str {
        "slow"
    }
}

/// Records every dispatch and optionally rejects them all.
#[derive(Default)]
pub struct RecordingDispatcher {
    fail: bool,
    requests: Mutex<Vec<DispatchRequest>>,
}

impl RecordingDispatcher {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn requests(&self) -> Vec<DispatchRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl DispatchGateway for RecordingDispatcher {
    async fn request_join(&self, request: &DispatchRequest) -> Result<(), DispatchError> {
        self.requests.lock().push(request.clone());
        if self.fail {
            Err(DispatchError::Api {
                code: 503,
                message: "unavailable: livekit down".to_string(),
            })
        } else {
            Ok(())
        }
    }

    fn name(&self) -> &str {
        "recording"
    }
}
