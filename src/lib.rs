//! # Turnstile
//!
//! Runtime feature toggles with group-based rules.
//!
//! Applications register *groups* (predicates over an actor), bind
//! *features* to groups, and ask whether a feature is enabled for an actor.
//! Rules live in a pluggable store:
//!
//! | Adapter | Crate | Storage |
//! |---|---|---|
//! | `memory` | [`turnstile_core`] | in-process table with a single writer task |
//! | `redis` | `turnstile_redis` | one hash per feature, optimistic check-and-set |
//! | `postgres` | `turnstile_seaorm` | one row per feature, JSONB rules |
//!
//! ## Quick Start
//!
//! ```
//! use turnstile::prelude::*;
//!
//! struct User { id: i64, staff: bool }
//!
//! # #[tokio::main]
//! # async fn main() -> turnstile::Result<()> {
//! let store = turnstile::connect(BackendConfig::Memory).await?;
//! let flags = Turnstile::new(store);
//!
//! flags.register("staff", |user: &User, _| user.staff)?;
//! flags.enable("dashboard", "staff").await?;
//!
//! assert!(flags.is_enabled("dashboard", &User { id: 1, staff: true }).await?);
//! # Ok(())
//! # }
//! ```
//!
//! ## Choosing a backend at runtime
//!
//! ```rust,ignore
//! // TURNSTILE_ADAPTER=redis TURNSTILE_REDIS_URL=redis://cache:6379
//! let store = turnstile::connect(BackendConfig::from_env()?).await?;
//! ```

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

pub use turnstile_core::*;

#[cfg(feature = "redis")]
pub use turnstile_redis;

#[cfg(feature = "postgres")]
pub use turnstile_seaorm;

/// Which rule store to build, and how.
///
/// Deserializes from a document tagged by `adapter`:
///
/// ```
/// # use turnstile::BackendConfig;
/// let config: BackendConfig = serde_json::from_str(r#"{"adapter": "memory"}"#).unwrap();
/// assert_eq!(config.adapter(), "memory");
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "adapter", rename_all = "lowercase")]
pub enum BackendConfig {
    /// In-process table. Rules are lost when the process exits.
    #[default]
    Memory,

    /// Redis hash store.
    #[cfg(feature = "redis")]
    Redis(turnstile_redis::RedisConfig),

    /// PostgreSQL table.
    #[cfg(feature = "postgres")]
    Postgres(turnstile_seaorm::DatabaseConfig),
}

impl BackendConfig {
    /// Adapter name, as used in configuration.
    pub fn adapter(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            #[cfg(feature = "redis")]
            Self::Redis(_) => "redis",
            #[cfg(feature = "postgres")]
            Self::Postgres(_) => "postgres",
        }
    }

    /// Load configuration from environment variables.
    ///
    /// `TURNSTILE_ADAPTER` selects the backend (default `memory`); the
    /// backend reads its own `TURNSTILE_*` variables.
    pub fn from_env() -> Result<Self> {
        let adapter = std::env::var("TURNSTILE_ADAPTER").unwrap_or_else(|_| "memory".into());

        match adapter.trim().to_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            #[cfg(feature = "redis")]
            "redis" => {
                let config = turnstile_redis::RedisConfig::from_env()?.build()?;
                Ok(Self::Redis(config))
            }
            #[cfg(feature = "postgres")]
            "postgres" => Ok(Self::Postgres(turnstile_seaorm::DatabaseConfig::from_env()?)),
            other => Err(Error::Config(format!(
                "Unknown or disabled adapter: {}",
                other
            ))),
        }
    }
}

/// Build the configured rule store and run its idempotent setup.
pub async fn connect(config: BackendConfig) -> Result<Arc<dyn RuleStore>> {
    let adapter = config.adapter();

    let store: Arc<dyn RuleStore> = match config {
        BackendConfig::Memory => Arc::new(MemoryStore::new()),
        #[cfg(feature = "redis")]
        BackendConfig::Redis(config) => {
            Arc::new(turnstile_redis::RedisStore::connect(config).await?)
        }
        #[cfg(feature = "postgres")]
        BackendConfig::Postgres(config) => {
            Arc::new(turnstile_seaorm::SeaOrmStore::connect(config).await?)
        }
    };

    store.setup().await?;
    info!(adapter, "Rule store ready");
    Ok(store)
}

/// Prelude for common imports.
pub mod prelude {
    pub use crate::{BackendConfig, connect};
    pub use turnstile_core::prelude::*;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_memory() {
        assert_eq!(BackendConfig::default().adapter(), "memory");
    }

    #[cfg(feature = "redis")]
    #[test]
    fn test_redis_config_document() {
        let config: BackendConfig = serde_json::from_str(
            r#"{"adapter": "redis", "url": "redis://cache:6379", "prefix": "app"}"#,
        )
        .unwrap();

        match config {
            BackendConfig::Redis(redis) => {
                assert_eq!(redis.url, "redis://cache:6379");
                assert_eq!(redis.prefix, "app");
                assert_eq!(redis.set_key, "turnstile-features");
            }
            other => panic!("unexpected adapter {}", other.adapter()),
        }
    }

    #[cfg(feature = "postgres")]
    #[test]
    fn test_postgres_config_document() {
        let config: BackendConfig = serde_json::from_str(
            r#"{"adapter": "postgres", "database_url": "postgres://db/app", "table": "flags"}"#,
        )
        .unwrap();
        assert_eq!(config.adapter(), "postgres");
    }

    #[test]
    fn test_unknown_adapter_rejected() {
        let parsed = serde_json::from_str::<BackendConfig>(r#"{"adapter": "etcd"}"#);
        assert!(parsed.is_err());
    }

    #[tokio::test]
    async fn test_connect_memory() {
        let store = connect(BackendConfig::Memory).await.unwrap();
        assert_eq!(store.backend(), "memory");
        assert!(store.features(None).await.unwrap().is_empty());
    }
}
