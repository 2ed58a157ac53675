//! Per-session interrupt state machine.
//!
//! ```text
//! Idle -> Connecting -> Listening <-> Speaking
//!   \________\______________\___________\----> Closed
//! ```

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No upstream connection yet.
    #[default]
    Idle,
    Connecting,
    /// Upstream open, model not speaking.
    Listening,
    /// Model output is being forwarded to the client.
    Speaking,
    /// Terminal.
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Listening => "listening",
            Self::Speaking => "speaking",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Tracks the state of one session. Transitions that do not apply in the
/// current state are ignored; each method reports whether it changed anything.
#[derive(Debug, Default)]
pub struct SessionMachine {
    state: SessionState,
}

impl SessionMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The speaking flag: true while model output is being delivered.
    pub fn is_speaking(&self) -> bool {
        self.state == SessionState::Speaking
    }

    pub fn is_closed(&self) -> bool {
        self.state == SessionState::Closed
    }

    /// `Idle -> Connecting`, on the client's start signal.
    pub fn begin_connect(&mut self) -> bool {
        self.transition(SessionState::Idle, SessionState::Connecting)
    }

    /// `Connecting -> Listening`, once the upstream is open.
    pub fn upstream_opened(&mut self) -> bool {
        self.transition(SessionState::Connecting, SessionState::Listening)
    }

    /// `Listening -> Speaking`, on the first response frame. Already speaking is a no-op.
    pub fn response_started(&mut self) -> bool {
        self.transition(SessionState::Listening, SessionState::Speaking)
    }

    /// `Speaking -> Listening`, on the upstream end-of-response marker.
    pub fn response_ended(&mut self) -> bool {
        self.transition(SessionState::Speaking, SessionState::Listening)
    }

    /// `Speaking -> Listening`, on a client interrupt. Does not wait for the upstream.
    pub fn interrupt(&mut self) -> bool {
        self.transition(SessionState::Speaking, SessionState::Listening)
    }

    /// Any state to `Closed`. Returns false if already closed.
    pub fn close(&mut self) -> bool {
        if self.is_closed() {
            return false;
        }
        self.state = SessionState::Closed;
        true
    }

    fn transition(&mut self, from: SessionState, to: SessionState) -> bool {
        if self.state != from {
            return false;
        }
        tracing::debug!(%from, %to, "Session state transition.");
        self.state = to;
        true
    }
}
