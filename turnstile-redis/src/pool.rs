//! Redis connection pool.

use bb8::{Pool, PooledConnection};
use bb8_redis::RedisConnectionManager;
use tracing::info;

use crate::{RedisConfig, RedisError, Result};

/// Type alias for the connection pool.
pub type RedisPool = Pool<RedisConnectionManager>;

/// A connection checked out of [`RedisPool`].
pub type RedisConnection<'a> = PooledConnection<'a, RedisConnectionManager>;

/// Builder for creating Redis connection pools.
pub struct RedisPoolBuilder<'a> {
    config: &'a RedisConfig,
}

impl<'a> RedisPoolBuilder<'a> {
    /// Create a new pool builder.
    pub fn new(config: &'a RedisConfig) -> Self {
        Self { config }
    }

    /// Build the connection pool and check that the server answers.
    pub async fn build(self) -> Result<RedisPool> {
        let url = self.config.connection_url()?;

        let manager =
            RedisConnectionManager::new(url).map_err(|e| RedisError::Connection(e.to_string()))?;

        let pool = Pool::builder()
            .max_size(self.config.pool_size)
            .min_idle(self.config.min_idle)
            .connection_timeout(self.config.connection_timeout)
            .build(manager)
            .await
            .map_err(|e| RedisError::Connection(e.to_string()))?;

        // Scoped so the connection returns to the pool before we hand it out.
        {
            let mut conn = pool.get().await?;
            let _: String = redis::cmd("PING")
                .query_async(&mut *conn)
                .await
                .map_err(|e| RedisError::Connection(e.to_string()))?;
        }

        info!(
            pool_size = self.config.pool_size,
            url = %self.config.redacted_url(),
            "Redis connection pool created"
        );

        Ok(pool)
    }
}
