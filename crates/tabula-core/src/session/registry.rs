//! Session registry: explicit lifecycle for live sessions.
//!
//! Sessions are created on first contact and evicted on disconnect, on
//! explicit delete, or when idle past a deadline. Each slot serializes step
//! execution through its own mutex and carries a `CancellationToken` that
//! eviction fires, so in-flight code runs are abandoned with the session.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

use tabula_types::error::RegistryError;
use tabula_types::session::SessionId;

use super::state::SessionState;

/// One live session.
pub struct SessionSlot {
    state: Mutex<SessionState>,
    cancel: CancellationToken,
    /// Unix millis of the last time the slot was locked.
    last_active_ms: AtomicI64,
}

impl SessionSlot {
    fn new(state: SessionState) -> Self {
        Self {
            state: Mutex::new(state),
            cancel: CancellationToken::new(),
            last_active_ms: AtomicI64::new(Utc::now().timestamp_millis()),
        }
    }

    /// Wait for exclusive access to the session. Concurrent triggers queue
    /// here in arrival order.
    pub async fn lock(&self) -> MutexGuard<'_, SessionState> {
        let guard = self.state.lock().await;
        self.touch();
        guard
    }

    /// Exclusive access without waiting.
    pub fn try_lock(&self) -> Option<MutexGuard<'_, SessionState>> {
        let guard = self.state.try_lock().ok()?;
        self.touch();
        Some(guard)
    }

    /// Token cancelled when the session is evicted.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn touch(&self) {
        self.last_active_ms
            .store(Utc::now().timestamp_millis(), Ordering::Release);
    }

    pub fn idle_for(&self) -> Duration {
        let last = self.last_active_ms.load(Ordering::Acquire);
        let elapsed = Utc::now().timestamp_millis().saturating_sub(last);
        Duration::from_millis(elapsed.max(0) as u64)
    }
}

/// Registry of live sessions keyed by id.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<SessionId, Arc<SessionSlot>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a session at `Upload` and register it.
    pub fn create(&self) -> (SessionId, Arc<SessionSlot>) {
        let id = SessionId::new();
        let slot = Arc::new(SessionSlot::new(SessionState::new(id)));
        self.sessions.insert(id, slot.clone());
        tracing::info!(session_id = %id, "session created");
        (id, slot)
    }

    pub fn get(&self, id: &SessionId) -> Result<Arc<SessionSlot>, RegistryError> {
        self.sessions
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or(RegistryError::NotFound(*id))
    }

    /// Remove a session and cancel any work still running for it.
    pub fn remove(&self, id: &SessionId) -> Result<(), RegistryError> {
        let (_, slot) = self
            .sessions
            .remove(id)
            .ok_or(RegistryError::NotFound(*id))?;
        slot.cancel.cancel();
        tracing::info!(session_id = %id, "session removed");
        Ok(())
    }

    /// Evict every session idle for longer than `max_idle`. Returns the
    /// evicted ids.
    pub fn evict_idle(&self, max_idle: Duration) -> Vec<SessionId> {
        let expired: Vec<SessionId> = self
            .sessions
            .iter()
            .filter(|entry| entry.value().idle_for() > max_idle)
            .map(|entry| *entry.key())
            .collect();

        for id in &expired {
            if let Some((_, slot)) = self.sessions.remove(id) {
                slot.cancel.cancel();
                tracing::info!(session_id = %id, "idle session evicted");
            }
        }
        expired
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn ids(&self) -> Vec<SessionId> {
        self.sessions.iter().map(|entry| *entry.key()).collect()
    }
}
