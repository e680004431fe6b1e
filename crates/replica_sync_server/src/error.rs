//! Error types for the sync server.

use replica_sync_engine::SyncError;
use std::net::SocketAddr;
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the sync server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// The listening socket could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Requested address.
        addr: SocketAddr,
        /// Underlying error.
        source: std::io::Error,
    },

    /// A call failed.
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    /// Returns true if this error was caused by the peer rather than the server.
    pub fn is_client_error(&self) -> bool {
        match self {
            ServerError::Sync(err) => matches!(
                err,
                SyncError::Protocol(_) | SyncError::Codec(_) | SyncError::Cancelled
            ),
            ServerError::Bind { .. } | ServerError::Io(_) => false,
        }
    }
}
