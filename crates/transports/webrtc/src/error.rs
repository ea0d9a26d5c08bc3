//! Error types for the WebRTC transport

/// Result type alias using the WebRTC transport Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in WebRTC transport operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Session-level error
    #[error(transparent)]
    Core(#[from] peerpaste_core::Error),

    /// WebRTC library error
    #[error("WebRTC error: {0}")]
    WebRtc(String),

    /// Invalid configuration parameter
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Wrap a webrtc-rs error with context
    pub fn webrtc(context: &str, err: impl std::fmt::Display) -> Self {
        Error::WebRtc(format!("{}: {}", context, err))
    }

    /// Check if this error is a configuration error
    pub fn is_config_error(&self) -> bool {
        match self {
            Error::InvalidConfig(_) => true,
            Error::Core(e) => matches!(e, peerpaste_core::Error::InvalidConfig(_)),
            _ => false,
        }
    }

    /// Check if this error came from the WebRTC stack itself
    pub fn is_webrtc_error(&self) -> bool {
        matches!(self, Error::WebRtc(_))
    }
}

/// At the transport boundary every WebRTC failure is a transport failure
impl From<Error> for peerpaste_core::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Core(e) => e,
            Error::InvalidConfig(msg) => peerpaste_core::Error::InvalidConfig(msg),
            Error::Serialization(e) => peerpaste_core::Error::Serialization(e),
            Error::Io(e) => peerpaste_core::Error::Io(e),
            Error::WebRtc(msg) => peerpaste_core::Error::TransportFailure(msg),
        }
    }
}
