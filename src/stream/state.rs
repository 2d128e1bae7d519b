//! Stream lifecycle states.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Lifecycle state of a supervised stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamState {
    #[default]
    Starting,
    Ready,
    Running,
    Stopped,
    Crashed,
    StartupFailed,
}

impl StreamState {
    /// Whether the stream can make no further transitions.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Stopped | Self::Crashed | Self::StartupFailed)
    }
}

/// Tracks and publishes state transitions for one stream.
#[derive(Debug)]
pub(crate) struct StateMachine {
    tx: watch::Sender<StreamState>,
}

impl StateMachine {
    pub fn new() -> (Self, watch::Receiver<StreamState>) {
        let (tx, rx) = watch::channel(StreamState::Starting);
        (Self { tx }, rx)
    }

    pub fn transition(&self, to: StreamState) {
        let from = *self.tx.borrow();
        tracing::debug!(?from, ?to, "Stream state transition");
        self.tx.send_replace(to);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state_is_starting() {
        let (_machine, rx) = StateMachine::new();
        assert_eq!(*rx.borrow(), StreamState::Starting);
    }

    #[test]
    fn test_transition_publishes() {
        let (machine, rx) = StateMachine::new();
        machine.transition(StreamState::Ready);
        machine.transition(StreamState::Running);
        assert_eq!(*rx.borrow(), StreamState::Running);
    }

    #[test]
    fn test_terminal_states() {
        assert!(StreamState::Stopped.is_terminal());
        assert!(StreamState::Crashed.is_terminal());
        assert!(StreamState::StartupFailed.is_terminal());
        assert!(!StreamState::Starting.is_terminal());
        assert!(!StreamState::Ready.is_terminal());
        assert!(!StreamState::Running.is_terminal());
    }
}
