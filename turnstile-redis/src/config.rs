//! Redis rule store configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use turnstile_core::SerializerKind;
use url::Url;

use crate::{RedisError, Result};

/// Redis rule store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    /// Redis URL (redis://host:port or rediss://host:port for TLS).
    pub url: String,
    /// Prefix of the per-feature hash keys (`{prefix}:{feature}`).
    pub prefix: String,
    /// Key of the set holding every known feature name.
    pub set_key: String,
    /// Connection pool size.
    pub pool_size: u32,
    /// Minimum idle connections.
    pub min_idle: Option<u32>,
    /// Connection timeout.
    #[serde(with = "humantime_serde")]
    pub connection_timeout: Duration,
    /// Database number (0-15).
    pub database: Option<u8>,
    /// Username for Redis 6+ ACL.
    pub username: Option<String>,
    /// Password.
    pub password: Option<String>,
    /// Encoding of stored value sets.
    pub serializer: SerializerKind,
    /// Upper bound on check-and-set attempts for one `enable`/`disable`.
    pub max_cas_attempts: u32,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            prefix: "turnstile".to_string(),
            set_key: "turnstile-features".to_string(),
            pool_size: 10,
            min_idle: Some(1),
            connection_timeout: Duration::from_secs(5),
            database: None,
            username: None,
            password: None,
            serializer: SerializerKind::default(),
            max_cas_attempts: 32,
        }
    }
}

impl RedisConfig {
    /// Create a new configuration.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Create a builder.
    pub fn builder() -> RedisConfigBuilder {
        RedisConfigBuilder::new()
    }

    /// Load configuration from environment variables.
    ///
    /// - `TURNSTILE_REDIS_URL`
    /// - `TURNSTILE_REDIS_PREFIX`
    /// - `TURNSTILE_REDIS_SET_KEY`
    /// - `TURNSTILE_REDIS_POOL_SIZE`
    /// - `TURNSTILE_REDIS_DATABASE`
    /// - `TURNSTILE_REDIS_USERNAME` / `TURNSTILE_REDIS_PASSWORD`
    /// - `TURNSTILE_SERIALIZER` (`cbor` or `json`)
    pub fn from_env() -> Result<RedisConfigBuilder> {
        let mut builder = RedisConfigBuilder::new();

        if let Ok(url) = std::env::var("TURNSTILE_REDIS_URL") {
            builder = builder.url(url);
        }

        if let Ok(prefix) = std::env::var("TURNSTILE_REDIS_PREFIX") {
            builder = builder.prefix(prefix);
        }

        if let Ok(set_key) = std::env::var("TURNSTILE_REDIS_SET_KEY") {
            builder = builder.set_key(set_key);
        }

        if let Ok(pool_size) = std::env::var("TURNSTILE_REDIS_POOL_SIZE") {
            let size = pool_size
                .parse()
                .map_err(|_| RedisError::Config("Invalid TURNSTILE_REDIS_POOL_SIZE".into()))?;
            builder = builder.pool_size(size);
        }

        if let Ok(db) = std::env::var("TURNSTILE_REDIS_DATABASE") {
            let db = db
                .parse()
                .map_err(|_| RedisError::Config("Invalid TURNSTILE_REDIS_DATABASE".into()))?;
            builder = builder.database(db);
        }

        if let Ok(username) = std::env::var("TURNSTILE_REDIS_USERNAME") {
            builder = builder.username(username);
        }

        if let Ok(password) = std::env::var("TURNSTILE_REDIS_PASSWORD") {
            builder = builder.password(password);
        }

        if let Ok(serializer) = std::env::var("TURNSTILE_SERIALIZER") {
            builder = builder.serializer(SerializerKind::parse(&serializer)?);
        }

        Ok(builder)
    }

    /// Key of the hash holding the rules of `feature`.
    pub fn feature_key(&self, feature: &str) -> String {
        format!("{}:{}", self.prefix, feature)
    }

    /// Full Redis URL with credentials and database applied.
    pub fn connection_url(&self) -> Result<String> {
        let mut url = Url::parse(&self.url)
            .map_err(|e| RedisError::Config(format!("Invalid Redis URL: {}", e)))?;

        if let Some(username) = &self.username {
            url.set_username(username)
                .map_err(|_| RedisError::Config("URL cannot carry a username".into()))?;
        }

        if let Some(password) = &self.password {
            url.set_password(Some(password))
                .map_err(|_| RedisError::Config("URL cannot carry a password".into()))?;
        }

        if let Some(db) = self.database {
            url.set_path(&format!("/{}", db));
        }

        Ok(url.to_string())
    }

    /// The URL with any password masked, for logs.
    pub fn redacted_url(&self) -> String {
        match Url::parse(&self.url) {
            Ok(mut url) => {
                if url.password().is_some() {
                    let _ = url.set_password(Some("***"));
                }
                url.to_string()
            }
            Err(_) => "<invalid url>".to_string(),
        }
    }

    /// Reject settings that would make the store unusable.
    pub fn validate(&self) -> Result<()> {
        if self.prefix.is_empty() {
            return Err(RedisError::Config("prefix must not be empty".into()));
        }
        if self.set_key.is_empty() {
            return Err(RedisError::Config("set_key must not be empty".into()));
        }
        if self.set_key.starts_with(&format!("{}:", self.prefix)) {
            return Err(RedisError::Config(
                "set_key must not live under the feature key prefix".into(),
            ));
        }
        if self.max_cas_attempts == 0 {
            return Err(RedisError::Config("max_cas_attempts must be at least 1".into()));
        }
        Ok(())
    }
}

/// Builder for Redis configuration.
#[derive(Default)]
pub struct RedisConfigBuilder {
    config: RedisConfig,
}

impl RedisConfigBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            config: RedisConfig::default(),
        }
    }

    /// Set the Redis URL.
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.config.url = url.into();
        self
    }

    /// Set the feature key prefix.
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.prefix = prefix.into();
        self
    }

    /// Set the key of the feature membership set.
    pub fn set_key(mut self, key: impl Into<String>) -> Self {
        self.config.set_key = key.into();
        self
    }

    /// Set the pool size.
    pub fn pool_size(mut self, size: u32) -> Self {
        self.config.pool_size = size;
        self
    }

    /// Set the minimum idle connections.
    pub fn min_idle(mut self, min_idle: u32) -> Self {
        self.config.min_idle = Some(min_idle);
        self
    }

    /// Set the connection timeout.
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.config.connection_timeout = timeout;
        self
    }

    /// Set the database number.
    pub fn database(mut self, db: u8) -> Self {
        self.config.database = Some(db);
        self
    }

    /// Set the username (Redis 6+ ACL).
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.config.username = Some(username.into());
        self
    }

    /// Set the password.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.config.password = Some(password.into());
        self
    }

    /// Set the value set encoding.
    pub fn serializer(mut self, serializer: SerializerKind) -> Self {
        self.config.serializer = serializer;
        self
    }

    /// Set the check-and-set attempt limit.
    pub fn max_cas_attempts(mut self, attempts: u32) -> Self {
        self.config.max_cas_attempts = attempts;
        self
    }

    /// Build and validate the configuration.
    pub fn build(self) -> Result<RedisConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
