//! Error types for the PostgreSQL rule store.

use sea_orm::DbErr;
use thiserror::Error;

/// Errors raised by [`SeaOrmStore`](crate::SeaOrmStore).
#[derive(Error, Debug)]
pub enum SeaOrmError {
    /// Database connection error.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Database error from SeaORM.
    #[error("Database error: {0}")]
    Database(#[from] DbErr),

    /// Transaction error.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A stored `rules` document does not decode.
    #[error("Corrupt rules for {feature}: {reason}")]
    Corrupt {
        /// Feature whose row failed to decode.
        feature: String,
        /// Decoder message.
        reason: String,
    },

    /// Error raised by the shared rule model.
    #[error(transparent)]
    Core(#[from] turnstile_core::Error),
}

/// Result type alias for PostgreSQL rule store operations.
pub type SeaOrmResult<T> = Result<T, SeaOrmError>;

impl SeaOrmError {
    pub(crate) fn corrupt(feature: impl Into<String>, err: serde_json::Error) -> Self {
        Self::Corrupt {
            feature: feature.into(),
            reason: err.to_string(),
        }
    }
}

impl From<SeaOrmError> for turnstile_core::Error {
    fn from(err: SeaOrmError) -> Self {
        use turnstile_core::Error;

        match err {
            SeaOrmError::Connection(msg) => Error::Connection(msg),
            SeaOrmError::Database(e @ (DbErr::Conn(_) | DbErr::ConnectionAcquire(_))) => {
                Error::Connection(e.to_string())
            }
            SeaOrmError::Database(e) => Error::backend("postgres", e),
            SeaOrmError::Transaction(msg) => Error::Transaction(msg),
            SeaOrmError::Config(msg) => Error::Config(msg),
            SeaOrmError::Corrupt { feature, reason } => {
                Error::Deserialization(format!("{}: {}", feature, reason))
            }
            SeaOrmError::Core(inner) => inner,
        }
    }
}
