use chrono::{DateTime, Utc};
use futures::FutureExt;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::AbortHandle;
use tracing::{error, info};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub id: Uuid,
    pub channel_id: String,
    pub started_at: DateTime<Utc>,
}

struct RunningSession {
    info: SessionInfo,
    abort: AbortHandle,
}

/// Background relay tasks, keyed by session id.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    running: Arc<Mutex<HashMap<Uuid, RunningSession>>>,
}

/// Removes its session from the registry when the task ends or is aborted.
struct Deregister {
    registry: SessionRegistry,
    id: Uuid,
}

impl Drop for Deregister {
    fn drop(&mut self) {
        self.registry.lock().remove(&self.id);
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `task(session_id)` on the runtime and track it until it ends.
    /// A panic inside the task is logged and contained.
    pub fn spawn<F, Fut>(&self, channel_id: &str, task: F) -> Uuid
    where
        F: FnOnce(Uuid) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let id = Uuid::new_v4();
        let fut = task(id);
        let deregister = Deregister {
            registry: self.clone(),
            id,
        };

        // Held across the spawn so the task cannot deregister before it is
        // registered.
        let mut running = self.lock();
        let handle = tokio::spawn(async move {
            let _deregister = deregister;
            if let Err(panic) = AssertUnwindSafe(fut).catch_unwind().await {
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!(session_id = %id, reason = %reason, "Relay session panicked");
            }
        });
        running.insert(
            id,
            RunningSession {
                info: SessionInfo {
                    id,
                    channel_id: channel_id.to_string(),
                    started_at: Utc::now(),
                },
                abort: handle.abort_handle(),
            },
        );
        id
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.lock().contains_key(id)
    }

    pub fn list(&self) -> Vec<SessionInfo> {
        let mut sessions: Vec<SessionInfo> =
            self.lock().values().map(|s| s.info.clone()).collect();
        sessions.sort_by_key(|s| s.started_at);
        sessions
    }

    /// Cancel every running session. Returns how many were cancelled.
    pub fn abort_all(&self) -> usize {
        let drained: Vec<RunningSession> = self.lock().drain().map(|(_, s)| s).collect();
        for session in &drained {
            session.abort.abort();
        }
        if !drained.is_empty() {
            info!(count = drained.len(), "Aborted running relay sessions");
        }
        drained.len()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, RunningSession>> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
