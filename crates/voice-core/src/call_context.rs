//! `CallContext` — per-call ephemeral state, separate from `CoreMemory`
//! and never persisted (spec §3).

use std::time::Instant;

#[derive(Debug, Clone)]
pub struct CallContext {
    pub peer_participant_id: Option<String>,
    pub started_at: Instant,
    pub last_activity_at: Instant,
    /// Opaque handle to a pre-initialized passthrough agent connection,
    /// present only for `STREAMING_MODE=PASSTHROUGH` calls.
    pub passthrough_handle: Option<String>,
}

impl CallContext {
    pub fn new(peer_participant_id: Option<String>) -> Self {
        let now = Instant::now();
        Self {
            peer_participant_id,
            started_at: now,
            last_activity_at: now,
            passthrough_handle: None,
        }
    }

    pub fn touch(&mut self) {
        self.last_activity_at = Instant::now();
    }

    pub fn idle_for(&self) -> std::time::Duration {
        self.last_activity_at.elapsed()
    }
}
