//! The per-session `MediaState` machine (spec §4.4 state table).

use parking_lot::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaState {
    /// Session start or after a completed turn.
    Idle,
    /// First partial observed with no active agent audio.
    Listening,
    /// Agent frames enqueued to the socket.
    Speaking,
    /// A partial arrived while `Speaking`; stop-audio and cancellation in flight.
    BargingIn,
    /// A final was enqueued; the orchestrator is running.
    Turning,
    /// Socket close, lease loss, or fatal error. Terminal.
    Closing,
}

/// Thread-safe holder for the current `MediaState`, logging every
/// transition (grounded in the reference session's `active: RwLock<bool>`
/// pattern, generalized to a full enum).
pub struct SessionState {
    current: Mutex<MediaState>,
}

impl SessionState {
    pub fn new() -> Self {
        Self { current: Mutex::new(MediaState::Idle) }
    }

    pub fn current(&self) -> MediaState {
        *self.current.lock()
    }

    pub fn transition_to(&self, next: MediaState) {
        let mut guard = self.current.lock();
        if *guard != next {
            tracing::debug!(from = ?*guard, to = ?next, "media state transition");
            *guard = next;
        }
    }

    pub fn is_closing(&self) -> bool {
        *self.current.lock() == MediaState::Closing
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_idle_and_tracks_transitions() {
        let state = SessionState::new();
        assert_eq!(state.current(), MediaState::Idle);
        state.transition_to(MediaState::Listening);
        assert_eq!(state.current(), MediaState::Listening);
        state.transition_to(MediaState::Closing);
        assert!(state.is_closing());
    }
}
