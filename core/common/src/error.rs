//! Common error types for TraceSync.

use thiserror::Error;

/// Top-level error type for TraceSync operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Network call failed or returned a non-success status.
    #[error("Network error: {0}")]
    Network(String),

    /// The remote rejected the session credential (HTTP 401).
    #[error("Session expired")]
    AuthExpired,

    /// Establishing a session failed.
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// A point buffer could not be decoded.
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// The remote returned a summary that violates the protocol.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Reconciliation did not converge below the configured level ceiling.
    #[error("Digest escalation exceeded level {0}")]
    EscalationLimit(u32),

    /// Local store operation failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The sync scheduler is not running or dropped a request.
    #[error("Scheduler error: {0}")]
    Scheduler(String),
}

impl Error {
    /// Whether this error is scoped to the network (and worth retrying next cycle).
    pub fn is_network(&self) -> bool {
        matches!(self, Error::Network(_) | Error::AuthExpired | Error::Io(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
