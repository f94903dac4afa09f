//! Channel connection states.

use std::fmt;

/// Lifecycle state of a [`ConnectionManager`](super::ConnectionManager).
///
/// ```text
/// Idle -> Connecting -> Open -> Closing -> Terminated
///            |            |
///            +-> Reconnecting { attempt } -+
/// ```
///
/// Any state moves to `Terminated` on `disconnect()` or when the reconnect
/// ceiling is exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting,
    /// Waiting to reopen after a failure; `attempt` is 1-based.
    Reconnecting {
        attempt: u32,
    },
    Open,
    Closing,
    Terminated,
}

impl ConnectionState {
    pub fn is_open(&self) -> bool {
        matches!(self, ConnectionState::Open)
    }

    pub fn is_terminated(&self) -> bool {
        matches!(self, ConnectionState::Terminated)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Idle => write!(f, "idle"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Reconnecting { attempt } => write!(f, "reconnecting (attempt {})", attempt),
            ConnectionState::Open => write!(f, "open"),
            ConnectionState::Closing => write!(f, "closing"),
            ConnectionState::Terminated => write!(f, "terminated"),
        }
    }
}
