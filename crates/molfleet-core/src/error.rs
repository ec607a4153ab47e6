//! Core error types for molfleet-core

use thiserror::Error;

use molfleet_client::ClientError;

use crate::state::RolloutPhase;

/// Errors that can occur in core operations
#[derive(Error, Debug, Clone)]
pub enum CoreError {
    /// Host not found in registry
    #[error("host not found: {0}")]
    HostNotFound(String),

    /// Client-side gating failed; no request was issued
    #[error("{0}")]
    Precondition(String),

    /// A discovery run is already streaming
    #[error("discovery already in progress")]
    DiscoveryInProgress,

    /// Invalid rollout transition attempted
    #[error("invalid rollout transition from {from} to {to}")]
    InvalidTransition {
        /// Current phase
        from: RolloutPhase,
        /// Attempted target phase
        to: RolloutPhase,
    },

    /// Request failed; the text is display-ready
    #[error("{0}")]
    Client(String),
}

impl From<ClientError> for CoreError {
    fn from(err: ClientError) -> Self {
        CoreError::Client(err.user_message())
    }
}
