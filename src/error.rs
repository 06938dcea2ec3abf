//! Error types for zero-redis.

use thiserror::Error;

/// Result type for zero-redis operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Error type for zero-redis.
#[derive(Debug, Error)]
pub enum Error {
    /// Socket down, pool empty, or operation on a closed connection
    #[error("Connection error: {0}")]
    Connection(String),

    /// Wire protocol violation, or an outgoing argument that cannot be
    /// encoded in the configured charset
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Server error reply (`-<KIND> <message>`)
    #[error("Server error: {kind} {message}")]
    Response {
        /// First whitespace-delimited token of the error line, e.g. `ERR`,
        /// `WRONGTYPE`, `NOSCRIPT`.
        kind: String,
        message: String,
    },

    /// Invalid usage of the API (contradictory flags, commit outside a
    /// transaction, etc.)
    #[error("Invalid usage: {0}")]
    InvalidUsage(String),

    /// EXEC returned nil because a watched key changed before commit
    #[error("Watch error: {0}")]
    Watch(String),

    /// SCRIPT KILL was sent while no script was running
    #[error("No script running")]
    NoScriptRunning,

    /// EVALSHA referenced a script hash the server does not know
    #[error("Script does not exist: {0}")]
    ScriptDoesNotExist(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns true if the error means the connection is gone and any
    /// in-flight request on it is unrecoverable.
    pub fn is_connection_lost(&self) -> bool {
        matches!(self, Error::Connection(_) | Error::Io(_))
    }

    /// Get the server error kind if this is a `Response` error.
    pub fn response_kind(&self) -> Option<&str> {
        match self {
            Error::Response { kind, .. } => Some(kind),
            _ => None,
        }
    }

    pub(crate) fn connection_lost() -> Self {
        Error::Connection("Lost connection".into())
    }

    pub(crate) fn not_connected() -> Self {
        Error::Connection("Not connected".into())
    }
}
