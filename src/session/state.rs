use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of a duplex session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Connecting,
    Active,
    /// Transient: cancelling agent audio after a barge-in
    Interrupted,
    Closed,
    Error,
}

impl SessionState {
    /// No further transitions are possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Error)
    }

    /// Microphone and transport are held
    pub fn is_live(&self) -> bool {
        matches!(self, SessionState::Active | SessionState::Interrupted)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Connecting => "connecting",
            SessionState::Active => "active",
            SessionState::Interrupted => "interrupted",
            SessionState::Closed => "closed",
            SessionState::Error => "error",
        };
        f.write_str(name)
    }
}
