//! Error types for the ledger node.

use thiserror::Error;

/// Result type for ledger node operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the socket server and client plumbing.
#[derive(Debug, Error)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Protocol error
    #[error("Protocol error: {0}")]
    Protocol(String),
}
