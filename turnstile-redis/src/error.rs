//! Redis error types.

use thiserror::Error;

/// Result type for Redis operations.
pub type Result<T> = std::result::Result<T, RedisError>;

/// Redis errors.
#[derive(Debug, Error)]
pub enum RedisError {
    /// Connection error.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Pool error.
    #[error("Pool error: {0}")]
    Pool(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A stored hash field is not a valid group name.
    #[error("Corrupt rule entry in {key}: {reason}")]
    Corrupt { key: String, reason: String },

    /// Check-and-set kept aborting.
    #[error("Write conflict on {key} after {attempts} attempts")]
    Conflict { key: String, attempts: u32 },

    /// Error raised by the shared rule model (names, serializer).
    #[error(transparent)]
    Core(#[from] turnstile_core::Error),

    /// Underlying Redis error.
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

impl RedisError {
    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connection(_) | Self::Pool(_) | Self::Conflict { .. } => true,
            Self::Redis(e) => e.is_connection_dropped() || e.is_timeout(),
            _ => false,
        }
    }

    /// Check if this error indicates connection loss.
    pub fn is_connection_error(&self) -> bool {
        match self {
            Self::Connection(_) => true,
            Self::Redis(e) => e.is_connection_dropped() || e.is_connection_refusal(),
            _ => false,
        }
    }
}

impl<E> From<bb8::RunError<E>> for RedisError
where
    E: std::error::Error + 'static,
{
    fn from(err: bb8::RunError<E>) -> Self {
        Self::Pool(err.to_string())
    }
}

impl From<RedisError> for turnstile_core::Error {
    fn from(err: RedisError) -> Self {
        use turnstile_core::Error;

        match err {
            RedisError::Connection(msg) | RedisError::Pool(msg) => Error::Connection(msg),
            RedisError::Config(msg) => Error::Config(msg),
            RedisError::Corrupt { key, reason } => {
                Error::Deserialization(format!("{}: {}", key, reason))
            }
            RedisError::Conflict { key, attempts } => Error::Conflict { key, attempts },
            RedisError::Core(inner) => inner,
            RedisError::Redis(e) if e.is_connection_dropped() || e.is_connection_refusal() => {
                Error::Connection(e.to_string())
            }
            RedisError::Redis(e) => Error::backend("redis", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversion_into_store_error() {
        let err: turnstile_core::Error = RedisError::Pool("timed out".into()).into();
        assert!(matches!(err, turnstile_core::Error::Connection(_)));

        let err: turnstile_core::Error = RedisError::Conflict {
            key: "turnstile:search".into(),
            attempts: 32,
        }
        .into();
        assert!(matches!(
            err,
            turnstile_core::Error::Conflict { attempts: 32, .. }
        ));

        let err: turnstile_core::Error =
            RedisError::Core(turnstile_core::Error::InvalidFeatureName(" ".into())).into();
        assert!(err.is_input_error());
    }

    #[test]
    fn test_retryable() {
        assert!(RedisError::Connection("reset".into()).is_retryable());
        assert!(!RedisError::Config("bad".into()).is_retryable());
    }
}
