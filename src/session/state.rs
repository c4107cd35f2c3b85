//! # Session Status
//!
//! ## Session Lifecycle:
//! 1. **Idle**: no microphone, no socket
//! 2. **Connecting**: microphone acquired, socket opening
//! 3. **Active**: `init` sent, capture and playback running
//! 4. **Closing**: teardown in progress
//!
//! `Connecting` and `Active` only ever leave through `Closing` (or straight
//! back to `Idle` after a failed connect has released what it acquired).

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionStatus {
    #[default]
    Idle,
    Connecting,
    Active,
    Closing,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Idle => "idle",
            SessionStatus::Connecting => "connecting",
            SessionStatus::Active => "active",
            SessionStatus::Closing => "closing",
        }
    }

    /// Whether the session holds (or is acquiring) the microphone and socket.
    pub fn is_engaged(&self) -> bool {
        matches!(self, SessionStatus::Connecting | SessionStatus::Active)
    }

    /// Legal transitions of the controller state machine.
    pub fn can_transition_to(&self, next: SessionStatus) -> bool {
        use SessionStatus::*;
        matches!(
            (self, next),
            (Idle, Connecting)
                | (Connecting, Active)
                | (Connecting, Closing)
                | (Connecting, Idle)
                | (Active, Closing)
                | (Closing, Idle)
        )
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_transitions() {
        use SessionStatus::*;
        assert!(Idle.can_transition_to(Connecting));
        assert!(Connecting.can_transition_to(Active));
        assert!(Active.can_transition_to(Closing));
        assert!(Closing.can_transition_to(Idle));

        assert!(!Idle.can_transition_to(Active));
        assert!(!Active.can_transition_to(Idle));
        assert!(!Active.can_transition_to(Connecting));
    }

    #[test]
    fn test_engaged() {
        assert!(SessionStatus::Active.is_engaged());
        assert!(!SessionStatus::Closing.is_engaged());
        assert_eq!(SessionStatus::default().to_string(), "idle");
    }
}
