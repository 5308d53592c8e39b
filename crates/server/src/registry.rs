//! Session registry
//!
//! Process-wide map from session id to live session. Entries are added on
//! connection open and removed on close; a background sweeper reclaims
//! sessions whose transport died without a clean teardown.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::{mpsc, watch};

use scribe_engine::{InferenceExecutor, ModelCache, ModelId};

use crate::session::{Session, SessionEvent};
use crate::ServerError;

/// Capacity of each session's outbound event channel.
const EVENT_CHANNEL_CAPACITY: usize = 64;

pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    models: Arc<ModelCache>,
    executor: Arc<InferenceExecutor>,
    default_model: ModelId,
    max_sessions: usize,
    session_timeout: Duration,
    sweep_interval: Duration,
}

impl SessionRegistry {
    pub fn new(
        models: Arc<ModelCache>,
        executor: Arc<InferenceExecutor>,
        default_model: ModelId,
        max_sessions: usize,
    ) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            models,
            executor,
            default_model,
            max_sessions,
            session_timeout: Duration::from_secs(3600),
            sweep_interval: Duration::from_secs(300),
        }
    }

    pub fn with_timeouts(mut self, session_timeout: Duration, sweep_interval: Duration) -> Self {
        self.session_timeout = session_timeout;
        self.sweep_interval = sweep_interval;
        self
    }

    /// Create and register a session; returns it with the receiving end
    /// of its event channel.
    pub fn create(&self) -> Result<(Arc<Session>, mpsc::Receiver<SessionEvent>), ServerError> {
        let mut sessions = self.sessions.write();

        if sessions.len() >= self.max_sessions {
            Self::remove_expired_locked(&mut sessions, self.session_timeout);
            if sessions.len() >= self.max_sessions {
                return Err(ServerError::Session("session capacity reached".to_string()));
            }
        }

        let id = uuid::Uuid::new_v4().to_string();
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let session = Arc::new(Session::new(
            &id,
            self.default_model,
            Arc::clone(&self.models),
            Arc::clone(&self.executor),
            tx,
        ));
        sessions.insert(id.clone(), Arc::clone(&session));

        tracing::info!(session = %id, active = sessions.len(), "session registered");

        Ok((session, rx))
    }

    pub fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.read().get(id).cloned()
    }

    /// Unregister a session. Idempotent; removing an unknown id is a no-op.
    pub fn remove(&self, id: &str) {
        let removed = self.sessions.write().remove(id);
        if let Some(session) = removed {
            session.cleanup();
            tracing::info!(session = %id, "session unregistered");
        }
    }

    pub fn count(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn list(&self) -> Vec<String> {
        self.sessions.read().keys().cloned().collect()
    }

    /// Remove sessions idle past the session timeout.
    pub fn remove_expired(&self) {
        let mut sessions = self.sessions.write();
        Self::remove_expired_locked(&mut sessions, self.session_timeout);
    }

    fn remove_expired_locked(sessions: &mut HashMap<String, Arc<Session>>, timeout: Duration) {
        let expired: Vec<String> = sessions
            .iter()
            .filter(|(_, s)| s.is_expired(timeout))
            .map(|(id, _)| id.clone())
            .collect();

        for id in expired {
            if let Some(session) = sessions.remove(&id) {
                session.cleanup();
                tracing::info!(session = %id, "expired session removed");
            }
        }
    }

    /// Start the background sweeper. Returns a shutdown sender; send
    /// `true` to stop the task.
    pub fn start_sweeper(self: &Arc<Self>) -> watch::Sender<bool> {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let registry = Arc::clone(self);
        let interval = registry.sweep_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let before = registry.count();
                        registry.remove_expired();
                        let after = registry.count();
                        if before != after {
                            tracing::info!(removed = before - after, remaining = after, "session sweep");
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            tracing::info!("session sweeper shutting down");
                            break;
                        }
                    }
                }
            }
        });

        shutdown_tx
    }
}
