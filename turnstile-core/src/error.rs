//! Error types shared by every rule store.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for rule store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by the facade and by rule store backends.
#[derive(Debug, Error)]
pub enum Error {
    /// A feature name was empty after normalization.
    #[error("Invalid feature name: {0:?}")]
    InvalidFeatureName(String),

    /// A group name was empty after trimming.
    #[error("Invalid group name: {0:?}")]
    InvalidGroupName(String),

    /// A value set could not be encoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Stored bytes could not be decoded into a value set.
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// The backend could not be reached.
    #[error("Connection error: {0}")]
    Connection(String),

    /// A backend command or query failed.
    #[error("{backend} backend error: {source}")]
    Backend {
        /// Static name of the failing backend.
        backend: &'static str,
        /// Underlying client error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A transaction failed to commit and was rolled back.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// An optimistic update kept losing to concurrent writers.
    #[error("Write conflict on {key} after {attempts} attempts")]
    Conflict {
        /// Storage key that was contended.
        key: String,
        /// Number of check-and-set attempts made.
        attempts: u32,
    },

    /// Invalid backend configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The in-process writer task is gone.
    #[error("Memory store writer has stopped")]
    WriterStopped,

    /// Backup file could not be read or written.
    #[error(transparent)]
    Backup(#[from] BackupError),
}

impl Error {
    /// Wrap a client-library error raised by `backend`.
    pub fn backend(
        backend: &'static str,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Backend {
            backend,
            source: source.into(),
        }
    }

    /// Check if this error was raised before reaching storage.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidFeatureName(_) | Self::InvalidGroupName(_) | Self::Config(_)
        )
    }

    /// Check if retrying the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Connection(_) | Self::Conflict { .. } | Self::Transaction(_)
        )
    }
}

/// Backup file errors.
///
/// A missing file and malformed content are kept apart so callers can decide
/// whether a restore is worth retrying.
#[derive(Debug, Error)]
pub enum BackupError {
    /// The backup file does not exist.
    #[error("Backup file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The backup file is not a valid breakdown document.
    #[error("Malformed backup: {0}")]
    Malformed(String),

    /// Any other I/O failure.
    #[error("Backup I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for BackupError {
    fn from(err: serde_json::Error) -> Self {
        Self::Malformed(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_errors() {
        assert!(Error::InvalidFeatureName(" ".into()).is_input_error());
        assert!(!Error::WriterStopped.is_input_error());
    }

    #[test]
    fn test_retryable() {
        let conflict = Error::Conflict {
            key: "turnstile:search".into(),
            attempts: 3,
        };
        assert!(conflict.is_retryable());
        assert!(!Error::Deserialization("bad".into()).is_retryable());
    }

    #[test]
    fn test_backend_error_display() {
        let io = std::io::Error::other("socket closed");
        let err = Error::backend("redis", io);
        assert_eq!(err.to_string(), "redis backend error: socket closed");
    }
}
