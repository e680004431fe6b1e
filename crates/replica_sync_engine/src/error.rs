//! Error types for the sync engine.

use replica_core::CoreError;
use replica_sync_protocol::{CodecError, Frame, StatusCode};
use std::io;
use thiserror::Error;
use tracing::{debug, error, warn};

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The peer failed the call with a status.
    #[error("{code}: {message}")]
    Status {
        /// Classification.
        code: StatusCode,
        /// Detail.
        message: String,
    },

    /// The peer could not be reached.
    #[error("peer unavailable: {0}")]
    Unavailable(String),

    /// The transport could not be set up locally.
    #[error("transport setup failed: {0}")]
    Setup(String),

    /// Timeout.
    #[error("operation timed out")]
    Timeout,

    /// Sync was cancelled.
    #[error("sync cancelled")]
    Cancelled,

    /// Protocol error (unexpected or malformed frame).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Local diff or patch failure.
    #[error("core error: {0}")]
    Core(#[from] CoreError),

    /// Codec error.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl SyncError {
    /// Creates a status error.
    pub fn status(code: StatusCode, message: impl Into<String>) -> Self {
        Self::Status {
            code,
            message: message.into(),
        }
    }

    /// Classifies this error.
    pub fn code(&self) -> StatusCode {
        match self {
            SyncError::Status { code, .. } => *code,
            SyncError::Unavailable(_) => StatusCode::Unavailable,
            SyncError::Setup(_) => StatusCode::Internal,
            SyncError::Timeout => StatusCode::DeadlineExceeded,
            SyncError::Cancelled => StatusCode::Canceled,
            SyncError::Protocol(_) | SyncError::Codec(_) => StatusCode::InvalidArgument,
            SyncError::Core(err) if err.is_malformed_entry() => StatusCode::InvalidArgument,
            SyncError::Core(_) => StatusCode::Internal,
            SyncError::Io(err) => match err.kind() {
                io::ErrorKind::ConnectionRefused
                | io::ErrorKind::ConnectionReset
                | io::ErrorKind::ConnectionAborted
                | io::ErrorKind::NotConnected
                | io::ErrorKind::BrokenPipe
                | io::ErrorKind::UnexpectedEof => StatusCode::Unavailable,
                io::ErrorKind::TimedOut => StatusCode::DeadlineExceeded,
                _ => StatusCode::Internal,
            },
        }
    }

    /// Returns true if the call ended by cancellation.
    pub fn is_canceled(&self) -> bool {
        self.code() == StatusCode::Canceled
    }

    /// Returns true if the peer could not be reached.
    pub fn is_unavailable(&self) -> bool {
        self.code() == StatusCode::Unavailable
    }

    /// Converts this error into the frame that reports it to a peer.
    pub fn to_frame(&self) -> Frame {
        let message = match self {
            SyncError::Status { message, .. } => message.clone(),
            other => other.to_string(),
        };
        Frame::Status {
            code: self.code(),
            message,
        }
    }

    /// Logs the end of a session or call at a level matching its cause.
    ///
    /// Cancellation is routine; an unreachable peer is a warning; anything
    /// else is an error.
    pub fn log_termination(&self, what: &str) {
        match self.code() {
            StatusCode::Canceled => debug!(what, "cancelled"),
            StatusCode::Unavailable => warn!(what, error = %self, "peer unavailable"),
            _ => error!(what, error = %self, "terminated with error"),
        }
    }
}
