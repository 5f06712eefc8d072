//! Configuration for the PostgreSQL rule store.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::{SeaOrmError, SeaOrmResult};

/// Configuration for a PostgreSQL rule store connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database URL.
    pub database_url: String,

    /// Table holding one row per feature.
    #[serde(default = "default_table")]
    pub table: String,

    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout.
    #[serde(default = "default_connect_timeout")]
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// Idle timeout for connections.
    #[serde(default = "default_idle_timeout")]
    #[serde(with = "humantime_serde")]
    pub idle_timeout: Duration,

    /// Enable SQLx statement logging.
    #[serde(default)]
    pub sqlx_logging: bool,
}

fn default_table() -> String {
    "turnstile_features".to_string()
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_idle_timeout() -> Duration {
    Duration::from_secs(10 * 60) // 10 minutes
}

impl DatabaseConfig {
    /// Create a new configuration with the given database URL.
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            table: default_table(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connect_timeout: default_connect_timeout(),
            idle_timeout: default_idle_timeout(),
            sqlx_logging: false,
        }
    }

    /// Create configuration from environment variables.
    ///
    /// Uses the following environment variables:
    /// - `TURNSTILE_DATABASE_URL`: Required database URL
    /// - `TURNSTILE_DATABASE_TABLE`: Table name (default: turnstile_features)
    /// - `TURNSTILE_DATABASE_MAX_CONNECTIONS`: Max connections (default: 10)
    /// - `TURNSTILE_DATABASE_MIN_CONNECTIONS`: Min connections (default: 1)
    /// - `TURNSTILE_DATABASE_CONNECT_TIMEOUT`: Connect timeout in seconds
    /// - `TURNSTILE_DATABASE_SQLX_LOGGING`: Enable SQLx logging (true/false)
    pub fn from_env() -> SeaOrmResult<Self> {
        let database_url = std::env::var("TURNSTILE_DATABASE_URL")
            .map_err(|_| SeaOrmError::Config("TURNSTILE_DATABASE_URL not set".into()))?;

        let mut config = Self::new(database_url);

        if let Ok(table) = std::env::var("TURNSTILE_DATABASE_TABLE") {
            config.table = table;
        }

        if let Ok(max) = std::env::var("TURNSTILE_DATABASE_MAX_CONNECTIONS") {
            config.max_connections = max.parse().map_err(|_| {
                SeaOrmError::Config("Invalid TURNSTILE_DATABASE_MAX_CONNECTIONS".into())
            })?;
        }

        if let Ok(min) = std::env::var("TURNSTILE_DATABASE_MIN_CONNECTIONS") {
            config.min_connections = min.parse().map_err(|_| {
                SeaOrmError::Config("Invalid TURNSTILE_DATABASE_MIN_CONNECTIONS".into())
            })?;
        }

        if let Ok(timeout) = std::env::var("TURNSTILE_DATABASE_CONNECT_TIMEOUT") {
            config.connect_timeout = Duration::from_secs(timeout.parse().map_err(|_| {
                SeaOrmError::Config("Invalid TURNSTILE_DATABASE_CONNECT_TIMEOUT".into())
            })?);
        }

        if let Ok(logging) = std::env::var("TURNSTILE_DATABASE_SQLX_LOGGING") {
            config.sqlx_logging = logging == "true" || logging == "1";
        }

        config.validate()?;
        Ok(config)
    }

    /// Set the table name.
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// Set the maximum number of connections.
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the minimum number of connections.
    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    /// Set the connection timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the idle timeout.
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Enable or disable SQLx logging.
    pub fn sqlx_logging(mut self, enabled: bool) -> Self {
        self.sqlx_logging = enabled;
        self
    }

    /// Check the table name and pool bounds.
    ///
    /// The table name is spliced into SQL text, so it must be a plain
    /// identifier, optionally qualified by a schema (`schema.table`).
    pub fn validate(&self) -> SeaOrmResult<()> {
        let parts: Vec<&str> = self.table.split('.').collect();
        if parts.len() > 2 || !parts.iter().all(|part| is_identifier(part)) {
            return Err(SeaOrmError::Config(format!(
                "Invalid table name: {:?}",
                self.table
            )));
        }
        if self.min_connections > self.max_connections {
            return Err(SeaOrmError::Config(
                "min_connections exceeds max_connections".into(),
            ));
        }
        Ok(())
    }

    /// The database URL with any password masked, for logs.
    pub fn redacted_url(&self) -> String {
        match Url::parse(&self.database_url) {
            Ok(mut url) => {
                if url.password().is_some() {
                    let _ = url.set_password(Some("***"));
                }
                url.to_string()
            }
            Err(_) => "<invalid url>".to_string(),
        }
    }

    /// Convert to SeaORM ConnectOptions.
    pub fn to_connect_options(&self) -> sea_orm::ConnectOptions {
        let mut options = sea_orm::ConnectOptions::new(&self.database_url);

        options
            .max_connections(self.max_connections)
            .min_connections(self.min_connections)
            .connect_timeout(self.connect_timeout)
            .idle_timeout(self.idle_timeout)
            .sqlx_logging(self.sqlx_logging);

        options
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self::new("postgres://localhost/turnstile")
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let starts_well = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    starts_well && name.len() <= 63 && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Humantime serde module for duration serialization.
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
