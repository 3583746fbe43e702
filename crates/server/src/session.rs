//! Session Registry
//!
//! Process-wide table of live sessions keyed by session id. Sessions are
//! created on connect, closed on disconnect and evicted once idle for longer
//! than the configured timeout. Every eviction drives the session's loop to
//! `Closed` so its adapter handles are released.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use voice_turn_agent::{CloseReason, TurnHandle, TurnOrchestrator};
use voice_turn_config::SessionConfig;
use voice_turn_core::TurnState;

use crate::metrics::{record_active_sessions, record_session_created, record_session_evicted};
use crate::ServerError;

/// Entry in the session listing
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub state: TurnState,
    pub created_at: DateTime<Utc>,
}

/// Live sessions and their idle-eviction policy
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, TurnHandle>>,
    orchestrator: TurnOrchestrator,
    max_sessions: usize,
    idle_timeout: Duration,
    cleanup_interval: Duration,
}

impl SessionRegistry {
    pub fn new(orchestrator: TurnOrchestrator, config: &SessionConfig) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            orchestrator,
            max_sessions: config.max_sessions,
            idle_timeout: Duration::from_secs(config.idle_timeout_secs),
            cleanup_interval: Duration::from_secs(config.cleanup_interval_secs),
        }
    }

    /// Override the idle timeout and sweep interval
    pub fn with_timeouts(mut self, idle_timeout: Duration, cleanup_interval: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self.cleanup_interval = cleanup_interval;
        self
    }

    /// Start a background task that evicts idle sessions every `cleanup_interval`
    ///
    /// Sending `true` on the returned channel stops the task.
    pub fn start_cleanup_task(self: &Arc<Self>) -> watch::Sender<bool> {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let registry = Arc::clone(self);
        let interval = registry.cleanup_interval;

        tokio::spawn(async move {
            let mut interval_timer = tokio::time::interval(interval);
            interval_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = interval_timer.tick() => {
                        let evicted = registry.evict_idle().await;
                        if evicted > 0 {
                            tracing::info!(
                                evicted,
                                remaining = registry.count(),
                                "Session cleanup evicted idle sessions"
                            );
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            tracing::info!("Session cleanup task shutting down");
                            break;
                        }
                    }
                }
            }
        });

        shutdown_tx
    }

    /// Start a new session loop in `Listening`
    pub fn create(&self) -> Result<TurnHandle, ServerError> {
        let mut sessions = self.sessions.write();

        if sessions.len() >= self.max_sessions {
            tracing::warn!(max_sessions = self.max_sessions, "Session limit reached");
            return Err(ServerError::AtCapacity(self.max_sessions));
        }

        let id = uuid::Uuid::new_v4().to_string();
        let handle = self.orchestrator.start(&id);
        sessions.insert(id.clone(), handle.clone());
        let count = sessions.len();
        drop(sessions);

        record_session_created();
        record_active_sessions(count);
        tracing::info!(session_id = %id, active = count, "Created session");

        Ok(handle)
    }

    pub fn get(&self, id: &str) -> Option<TurnHandle> {
        self.sessions.read().get(id).cloned()
    }

    /// Close and forget a session; false if it was not registered
    pub async fn remove(&self, id: &str, reason: CloseReason) -> bool {
        let removed = self.sessions.write().remove(id);
        let Some(handle) = removed else {
            return false;
        };

        record_active_sessions(self.count());
        handle.close(reason).await;
        tracing::info!(session_id = %id, reason = reason.as_str(), "Removed session");
        true
    }

    pub fn count(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn list(&self) -> Vec<SessionSummary> {
        let mut summaries: Vec<SessionSummary> = self
            .sessions
            .read()
            .values()
            .map(|handle| SessionSummary {
                session_id: handle.session_id().to_string(),
                state: handle.state(),
                created_at: handle.created_at(),
            })
            .collect();
        summaries.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        summaries
    }

    /// Close sessions idle past the timeout, plus any whose loop already ended
    pub async fn evict_idle(&self) -> usize {
        let timeout = self.idle_timeout;
        let expired: Vec<TurnHandle> = {
            let mut sessions = self.sessions.write();
            let ids: Vec<String> = sessions
                .iter()
                .filter(|(_, handle)| handle.is_closed() || handle.idle_for() > timeout)
                .map(|(id, _)| id.clone())
                .collect();
            ids.iter().filter_map(|id| sessions.remove(id)).collect()
        };

        if expired.is_empty() {
            return 0;
        }
        record_active_sessions(self.count());

        for handle in &expired {
            tracing::info!(
                session_id = %handle.session_id(),
                idle_secs = handle.idle_for().as_secs(),
                "Evicting idle session"
            );
            handle.close(CloseReason::IdleTimeout).await;
            record_session_evicted();
        }

        expired.len()
    }

    /// Close every session, used on shutdown
    pub async fn close_all(&self, reason: CloseReason) {
        let handles: Vec<TurnHandle> = self.sessions.write().drain().map(|(_, h)| h).collect();
        record_active_sessions(0);

        for handle in &handles {
            handle.close(reason).await;
        }
        if !handles.is_empty() {
            tracing::info!(closed = handles.len(), reason = reason.as_str(), "Closed all sessions");
        }
    }
}
