//! Common error types for tasksync.

use thiserror::Error;

/// Top-level error type for tasksync operations.
#[derive(Debug, Error)]
pub enum Error {
    /// No connectivity, or the connection to the remote failed.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The remote answered with a non-2xx status code.
    #[error("Server error: HTTP {0}")]
    Server(u16),

    /// The remote payload could not be decoded.
    #[error("Decoding error: {0}")]
    Decoding(String),

    /// An outgoing record could not be serialized.
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Local store operation failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization of local data failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Resource already exists.
    #[error("Already exists: {0}")]
    AlreadyExists(String),
}

impl Error {
    /// Whether this error came from talking to the remote authority.
    ///
    /// Remote errors never escape the sync engine: they are converted into
    /// queued operations or a local fallback.
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            Error::Transport(_) | Error::Server(_) | Error::Decoding(_) | Error::Encoding(_)
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
