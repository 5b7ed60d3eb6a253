//! Error types for framelink.

use thiserror::Error;

/// Main error type for all framelink operations.
#[derive(Debug, Error)]
pub enum FramelinkError {
    /// Transport failure: read, write, dial, listen or an expired deadline.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error (configuration files).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// MsgPack serialization error.
    #[error("MsgPack encode error: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    /// MsgPack deserialization error.
    #[error("MsgPack decode error: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),

    /// Malformed framing: short header or a frame above the size limit.
    #[error("Format error: {0}")]
    Format(String),

    /// The application rejected a frame header.
    #[error("Header rejected: {0}")]
    Validation(String),

    /// Another connection is already registered under this remote address.
    #[error("Connection already registered for {0}")]
    RegistrationConflict(String),

    /// The connection is closed (or was never started).
    #[error("Connection not alive")]
    NotAlive,

    /// The client currently holds no connection.
    #[error("No connection")]
    NoConnection,

    /// Outbound queue is at capacity (non-blocking send only).
    #[error("Outbound queue full")]
    QueueFull,
}

impl FramelinkError {
    /// Whether this error terminates the connection it occurred on.
    pub fn is_connection_fatal(&self) -> bool {
        matches!(
            self,
            FramelinkError::Io(_) | FramelinkError::Format(_) | FramelinkError::Validation(_)
        )
    }
}

/// Result type alias using FramelinkError.
pub type Result<T> = std::result::Result<T, FramelinkError>;
