//! Error types for session negotiation

use crate::state::{ConnectionState, NegotiationState, Operation, Phase};

/// Result type alias using the session Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while driving a session
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The operation needs a transport and `initialize` has not run yet
    #[error("Session is not initialized")]
    NotInitialized,

    /// The operation is not legal for the current phase
    #[error("Cannot {operation} in phase {}", display_phase(.phase))]
    IllegalPhase {
        /// Operation that was refused
        operation: Operation,
        /// Phase observed when the operation was refused
        phase: Option<Phase>,
    },

    /// No open outbound data channel is available
    #[error("Channel unavailable: {0}")]
    ChannelUnavailable(String),

    /// The transport rejected an operation
    #[error("Transport failure: {0}")]
    TransportFailure(String),

    /// The transport reported a raw state pair outside the phase table
    #[error("Invalid session state: connection={connection}, negotiation={negotiation}")]
    InvalidState {
        connection: ConnectionState,
        negotiation: NegotiationState,
    },

    /// Invalid configuration parameter
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Exchange payload could not be decoded
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn display_phase(phase: &Option<Phase>) -> String {
    match phase {
        Some(phase) => phase.to_string(),
        None => "uninitialized".to_string(),
    }
}

impl Error {
    /// Shorthand for an `IllegalPhase` refusal
    pub fn illegal(operation: Operation, phase: Option<Phase>) -> Self {
        Error::IllegalPhase { operation, phase }
    }

    /// Wrap any displayable transport error
    pub fn transport(err: impl std::fmt::Display) -> Self {
        Error::TransportFailure(err.to_string())
    }

    /// Check if the caller could have avoided this error by consulting the
    /// session predicates first
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Error::NotInitialized | Error::IllegalPhase { .. } | Error::ChannelUnavailable(_)
        )
    }

    /// Check if this error originated in the transport
    pub fn is_transport_error(&self) -> bool {
        matches!(self, Error::TransportFailure(_))
    }

    /// Check if this error signals a broken transport contract
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::InvalidState { .. })
    }
}
