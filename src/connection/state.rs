//! Connection state machine

use crate::{Error, Result};

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Transport open, nothing sent yet
    Initial,

    /// `hello` sent, awaiting server description
    Handshaking,

    /// SASL conversation in progress
    Authenticating,

    /// Idle (ready for a command)
    Ready,

    /// Command sent, reply not yet read
    CommandInProgress,

    /// Closed
    Closed,
}

impl ConnectionState {
    /// Check if transition is valid
    pub fn can_transition_to(&self, next: ConnectionState) -> bool {
        use ConnectionState::*;

        matches!(
            (self, next),
            (Initial, Handshaking)
                | (Handshaking, Authenticating)
                | (Handshaking, Ready)
                | (Authenticating, Ready)
                | (Ready, CommandInProgress)
                | (CommandInProgress, Ready)
                | (_, Closed)
        )
    }

    /// Transition to new state
    pub fn transition(&mut self, next: ConnectionState) -> Result<()> {
        if !self.can_transition_to(next) {
            return Err(Error::InvalidState {
                expected: format!("valid transition from {:?}", self),
                actual: format!("{:?}", next),
            });
        }
        *self = next;
        Ok(())
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initial => write!(f, "initial"),
            Self::Handshaking => write!(f, "handshaking"),
            Self::Authenticating => write!(f, "authenticating"),
            Self::Ready => write!(f, "ready"),
            Self::CommandInProgress => write!(f, "command_in_progress"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_transitions() {
        let mut state = ConnectionState::Initial;
        assert!(state.transition(ConnectionState::Handshaking).is_ok());
        assert!(state.transition(ConnectionState::Authenticating).is_ok());
        assert!(state.transition(ConnectionState::Ready).is_ok());
        assert!(state.transition(ConnectionState::CommandInProgress).is_ok());
        assert!(state.transition(ConnectionState::Ready).is_ok());
    }

    #[test]
    fn test_unauthenticated_handshake_goes_straight_to_ready() {
        let mut state = ConnectionState::Handshaking;
        assert!(state.transition(ConnectionState::Ready).is_ok());
    }

    #[test]
    fn test_invalid_transition() {
        let mut state = ConnectionState::Initial;
        assert!(state.transition(ConnectionState::Ready).is_err());

        let mut state = ConnectionState::CommandInProgress;
        assert!(state.transition(ConnectionState::CommandInProgress).is_err());
    }

    #[test]
    fn test_close_from_any_state() {
        let mut state = ConnectionState::CommandInProgress;
        assert!(state.transition(ConnectionState::Closed).is_ok());
    }
}
