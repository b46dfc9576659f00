//! `SessionManager`: tracks every live `MediaHandler` by session id,
//! enforces the process's concurrent-session cap, and periodically
//! sweeps handlers that have reached `Closing` (spec §5 "Concurrency &
//! Resource Model" session cap; grounded in the reference server's
//! `SessionManager::start_cleanup_task`, generalized from a timeout-based
//! sweep to a state-based one since `MediaHandler` already tracks its own
//! terminal state).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::watch;

use crate::error::{MediaError, Result};
use crate::handler::{DetachReason, MediaHandler};
use crate::state::MediaState;

pub struct SessionManager {
    handlers: RwLock<HashMap<String, Arc<MediaHandler>>>,
    max_concurrent_sessions: usize,
    sweep_interval: Duration,
}

impl SessionManager {
    pub fn new(max_concurrent_sessions: usize, sweep_interval: Duration) -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            max_concurrent_sessions,
            sweep_interval,
        }
    }

    /// Registers a newly attached handler, failing with `CapacityExceeded`
    /// if the process is already at its session cap (spec §5: "failure
    /// mode when exceeded: reject new attach attempts").
    pub fn register(&self, handler: Arc<MediaHandler>) -> Result<()> {
        let mut handlers = self.handlers.write();
        if handlers.len() >= self.max_concurrent_sessions {
            self.sweep_closed_locked(&mut handlers);
            if handlers.len() >= self.max_concurrent_sessions {
                return Err(MediaError::CapacityExceeded);
            }
        }
        handlers.insert(handler.session_id().to_string(), handler);
        Ok(())
    }

    pub fn get(&self, session_id: &str) -> Option<Arc<MediaHandler>> {
        self.handlers.read().get(session_id).cloned()
    }

    pub async fn detach(&self, session_id: &str, reason: DetachReason) {
        let handler = self.handlers.write().remove(session_id);
        if let Some(handler) = handler {
            handler.detach(reason).await;
        }
    }

    pub fn count(&self) -> usize {
        self.handlers.read().len()
    }

    fn sweep_closed_locked(&self, handlers: &mut HashMap<String, Arc<MediaHandler>>) {
        let closed: Vec<String> = handlers
            .iter()
            .filter(|(_, h)| h.state() == MediaState::Closing)
            .map(|(id, _)| id.clone())
            .collect();
        for id in closed {
            handlers.remove(&id);
        }
    }

    /// Spawns a background sweep of `Closing` handlers, mirroring the
    /// reference `start_cleanup_task`'s interval-timer-plus-shutdown-watch
    /// shape. Returns the shutdown sender.
    pub fn start_sweep_task(self: &Arc<Self>) -> watch::Sender<bool> {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let manager = self.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(manager.sweep_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let before = manager.count();
                        manager.handlers.write().retain(|_, h| h.state() != MediaState::Closing);
                        let after = manager.count();
                        if before != after {
                            tracing::info!(removed = before - after, remaining = after, "swept closed media sessions");
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            tracing::info!("session sweep task shutting down");
                            break;
                        }
                    }
                }
            }
        });

        shutdown_tx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_empty() {
        let manager = SessionManager::new(4, Duration::from_secs(60));
        assert_eq!(manager.count(), 0);
        assert!(manager.get("missing").is_none());
    }
}
