use serde::Serialize;
use std::fmt;

/// Lifecycle of a session
///
/// States only move forward. CLOSED and ERROR are terminal and reachable
/// from any other state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    Idle,
    Connecting,
    JoinSent,
    Negotiating,
    Connected,
    Running,
    Ending,
    Closed,
    Error,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Error)
    }

    pub fn can_transition(&self, next: SessionState) -> bool {
        !self.is_terminal() && (next.is_terminal() || next > *self)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "IDLE",
            SessionState::Connecting => "CONNECTING",
            SessionState::JoinSent => "JOIN_SENT",
            SessionState::Negotiating => "NEGOTIATING",
            SessionState::Connected => "CONNECTED",
            SessionState::Running => "RUNNING",
            SessionState::Ending => "ENDING",
            SessionState::Closed => "CLOSED",
            SessionState::Error => "ERROR",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_only() {
        assert!(SessionState::Idle.can_transition(SessionState::Connecting));
        assert!(SessionState::Connected.can_transition(SessionState::Running));
        assert!(!SessionState::Running.can_transition(SessionState::Negotiating));
        assert!(!SessionState::Running.can_transition(SessionState::Running));
    }

    #[test]
    fn test_terminal_states_absorb() {
        assert!(SessionState::JoinSent.can_transition(SessionState::Error));
        assert!(SessionState::Idle.can_transition(SessionState::Closed));
        assert!(!SessionState::Closed.can_transition(SessionState::Error));
        assert!(!SessionState::Error.can_transition(SessionState::Closed));
    }
}
