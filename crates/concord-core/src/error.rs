//! Error types shared by the dispatcher and the guards it runs.

use crate::gather::GatherError;

/// Error raised while evaluating guards for a navigation.
#[derive(Debug, thiserror::Error)]
pub enum GuardError {
    /// A guard function failed. Not caught; it fails the navigation.
    #[error("guard failed: {0}")]
    Failed(String),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Gather(#[from] GatherError),
}

impl GuardError {
    pub fn failed(reason: impl Into<String>) -> Self {
        GuardError::Failed(reason.into())
    }
}

/// Misuse of the coordination protocol. Always fatal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("guard coordination for {participant} used before activation")]
    NotActivated { participant: String },
    #[error("guard coordination for {participant} is already active")]
    AlreadyActivated { participant: String },
}
