use thiserror::Error;
use uuid::Uuid;

use crate::registry::RegistryError;

/// Failures of session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Operation not allowed in the session's or step's current state
    #[error("{0}")]
    InvalidState(String),

    /// Malformed caller input
    #[error("{0}")]
    InvalidInput(String),

    #[error("session {0} not found")]
    NotFound(Uuid),

    /// Unknown mode, or step table and stored session disagree
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("session storage failed: {0}")]
    Storage(String),
}

impl SessionError {
    pub fn invalid_state(message: impl Into<String>) -> Self {
        SessionError::InvalidState(message.into())
    }

    /// Caller asked for something the current state does not allow.
    pub fn is_precondition(&self) -> bool {
        matches!(self, SessionError::InvalidState(_))
    }

    /// Registry and stored data disagree; not the caller's fault.
    pub fn is_configuration(&self) -> bool {
        match self {
            SessionError::Registry(err) => !matches!(err, RegistryError::UnknownMode(_)),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(SessionError::invalid_state("Step is already in progress.").is_precondition());
        assert!(!SessionError::NotFound(Uuid::new_v4()).is_precondition());

        let unknown_step = SessionError::from(RegistryError::UnknownStep {
            mode: crate::registry::Mode::Express,
            code: "9".into(),
        });
        assert!(unknown_step.is_configuration());

        let unknown_mode = SessionError::from(RegistryError::UnknownMode("turbo".into()));
        assert!(!unknown_mode.is_configuration());
    }

    #[test]
    fn test_invalid_state_message_is_verbatim() {
        let err = SessionError::invalid_state("Already at the first step.");
        assert_eq!(err.to_string(), "Already at the first step.");
    }
}
