//! Server state machine.
//!
//! ```text
//! Idle ──start──▶ Starting ──bound──▶ Running ──stop──▶ Stopping ──drained──▶ Stopped
//!                    │
//!                    └──failure──▶ Idle
//! ```

use std::fmt;

use thiserror::Error;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServerState {
    Idle,
    Starting,
    Running,
    Stopping,
    Stopped,
}

impl ServerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServerState::Idle => "idle",
            ServerState::Starting => "starting",
            ServerState::Running => "running",
            ServerState::Stopping => "stopping",
            ServerState::Stopped => "stopped",
        }
    }

    pub fn can_transition_to(&self, next: ServerState) -> bool {
        use ServerState::*;
        matches!(
            (self, next),
            (Idle, Starting)
                | (Starting, Running)
                | (Starting, Idle)
                | (Running, Stopping)
                | (Stopping, Stopped)
        )
    }
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    #[error("cannot move from {from} to {to}")]
    InvalidTransition { from: ServerState, to: ServerState },
    #[error("registration is closed once the server has started (state: {state})")]
    RegistrationClosed { state: ServerState },
}

/// Shared lifecycle state. Written only through checked transitions.
#[derive(Debug)]
pub struct StateCell {
    tx: watch::Sender<ServerState>,
}

impl StateCell {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(ServerState::Idle);
        Self { tx }
    }

    pub fn get(&self) -> ServerState {
        *self.tx.borrow()
    }

    /// Watch state changes.
    pub fn subscribe(&self) -> watch::Receiver<ServerState> {
        self.tx.subscribe()
    }

    /// Move to `to` if the current state is `from`. Check and set are atomic.
    pub fn transition(&self, from: ServerState, to: ServerState) -> Result<(), LifecycleError> {
        let mut actual = from;
        let changed = self.tx.send_if_modified(|state| {
            if *state == from && from.can_transition_to(to) {
                *state = to;
                true
            } else {
                actual = *state;
                false
            }
        });
        if changed {
            tracing::debug!(from = %from, to = %to, "Server state changed");
            Ok(())
        } else {
            Err(LifecycleError::InvalidTransition { from: actual, to })
        }
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}
