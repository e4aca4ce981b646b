//! Error types for the mediaroute client transport layer

use thiserror::Error;

use crate::parameters::MediaKind;

/// Result type alias for transport operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur while driving a transport session
#[derive(Debug, Error)]
pub enum Error {
    /// Operation attempted on a closed transport or an unregistered child entity
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Media kind not permitted by the negotiated capabilities
    #[error("Cannot produce {0}")]
    UnsupportedKind(MediaKind),

    /// Producer or consumer id already registered on the transport
    #[error("Duplicate id: {0}")]
    DuplicateId(String),

    /// A DTLS connect handshake is already pending for this transport
    #[error("Connect already in progress for transport {0}")]
    ConnectInProgress(String),

    /// Malformed options or arguments
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Failure reported by the negotiation handler
    #[error("Handler error: {0}")]
    Handler(String),

    /// Rejection from the signaling layer (connect, produce)
    #[error("Signaling error: {0}")]
    Signaling(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Signaling(err.to_string())
    }
}
