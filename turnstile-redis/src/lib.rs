//! # Turnstile Redis
//!
//! Redis rule store for Turnstile feature toggles.
//!
//! ## Features
//!
//! - **Connection Pooling**: Connections are managed with bb8
//! - **Hash per feature**: `{prefix}:{feature}` maps group names to encoded value sets
//! - **Lost-update safety**: `enable`/`disable` use `WATCH`/`MULTI`/`EXEC`
//! - **Atomic rename**: Implemented as a Lua script
//! - **Pluggable encoding**: CBOR by default, JSON optionally
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use turnstile_core::Turnstile;
//! use turnstile_redis::{RedisConfig, RedisStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RedisConfig::builder()
//!         .url("redis://localhost:6379")
//!         .prefix("myapp")
//!         .build()?;
//!
//!     let store = RedisStore::connect(config).await?;
//!     let flags: Turnstile<()> = Turnstile::new(Arc::new(store));
//!     flags.enable("search", "everyone").await?;
//!
//!     Ok(())
//! }
//! ```

mod config;
mod error;
mod pool;
mod store;

pub use config::{RedisConfig, RedisConfigBuilder};
pub use error::{RedisError, Result};
pub use pool::{RedisConnection, RedisPool, RedisPoolBuilder};
pub use store::RedisStore;

// Re-export redis crate for convenience
pub use redis;

/// Prelude for common imports.
///
/// ```
/// use turnstile_redis::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::{RedisConfig, RedisConfigBuilder};
    pub use crate::error::{RedisError, Result};
    pub use crate::store::RedisStore;
}
