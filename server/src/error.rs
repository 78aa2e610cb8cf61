//! Error types for the session server

use thiserror::Error;

/// Failures of a single player connection
#[derive(Debug, Error)]
pub enum SessionError {
    /// Nothing arrived (or could be written) within the allotted time
    #[error("connection timed out")]
    Timeout,

    /// The peer closed the stream
    #[error("connection closed by peer")]
    Closed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SessionError {
    /// Whether the player should be dropped rather than skipped for a cycle
    pub fn is_fatal(&self) -> bool {
        !matches!(self, SessionError::Timeout)
    }
}

/// Failures of server-level operations
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("server is already listening")]
    AlreadyListening,

    #[error("server is not listening")]
    NotListening,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A freshly created room refused its first player
    #[error("no room could take the player")]
    RoomUnavailable,
}
