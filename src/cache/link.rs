//! Connection state of the invalidation consumer's event-log link.

use std::fmt;
use std::time::Duration;

use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
    Reconnecting,
}

impl ConnectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared, observable connection state.
///
/// The read loop reports failures through [`Link::on_close`]; the reconnect
/// supervisor drives [`Link::on_reconnecting`] and [`Link::on_ready`]. Watchers
/// wake on every actual transition.
#[derive(Debug)]
pub struct Link {
    state: watch::Sender<ConnectionState>,
}

impl Default for Link {
    fn default() -> Self {
        Self::new()
    }
}

impl Link {
    pub fn new() -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self { state }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Connection established. Returns whether the state changed.
    pub fn on_ready(&self) -> bool {
        self.transition(|_| Some(ConnectionState::Connected))
    }

    /// Connection lost or closed.
    pub fn on_close(&self) -> bool {
        self.transition(|_| Some(ConnectionState::Disconnected))
    }

    /// A retry is scheduled. Ignored unless currently disconnected.
    pub fn on_reconnecting(&self) -> bool {
        self.transition(|current| {
            (current == ConnectionState::Disconnected).then_some(ConnectionState::Reconnecting)
        })
    }

    fn transition(&self, next: impl FnOnce(ConnectionState) -> Option<ConnectionState>) -> bool {
        self.state.send_if_modified(|current| match next(*current) {
            Some(state) if state != *current => {
                *current = state;
                true
            }
            _ => false,
        })
    }
}

/// Capped linear retry delay: `min(step * attempt, max)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    step: Duration,
    max: Duration,
}

impl Backoff {
    pub fn new(step: Duration, max: Duration) -> Self {
        Self { step, max }
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        self.step.saturating_mul(attempt).min(self.max)
    }
}
