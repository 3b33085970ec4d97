//! Error types for backend operations.

use crate::lock::LockMode;
use std::io;
use thiserror::Error;

/// Result type for backend operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur while locking or persisting a variable.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A persisted value could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] lockstep_codec::CodecError),

    /// `unlock` was called on a lock that is not held.
    #[error("{mode} lock released while not held")]
    LockNotHeld {
        /// The mode of the lock handle.
        mode: LockMode,
    },

    /// The backend cannot serve the request (disconnected, shut down, ...).
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

impl StorageError {
    /// Creates an unavailable-backend error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }
}
