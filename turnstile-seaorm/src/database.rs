//! Database connection management.

use crate::{DatabaseConfig, SeaOrmError, SeaOrmResult};
use sea_orm::{ConnectionTrait, DatabaseConnection, DbBackend};
use std::sync::Arc;
use tracing::{debug, info};

/// Database wrapper providing connection management.
#[derive(Clone)]
pub struct Database {
    conn: DatabaseConnection,
    config: Arc<DatabaseConfig>,
}

impl Database {
    /// Connect to the database with the given configuration.
    pub async fn connect(config: DatabaseConfig) -> SeaOrmResult<Self> {
        config.validate()?;
        info!(url = %config.redacted_url(), "Connecting to database");

        let options = config.to_connect_options();
        let conn = sea_orm::Database::connect(options)
            .await
            .map_err(|e| SeaOrmError::Connection(e.to_string()))?;

        if conn.get_database_backend() != DbBackend::Postgres {
            return Err(SeaOrmError::Config(
                "the rule store requires PostgreSQL".into(),
            ));
        }

        info!(
            max_connections = config.max_connections,
            "Database connection established"
        );

        Ok(Self {
            conn,
            config: Arc::new(config),
        })
    }

    /// Connect using environment variables.
    pub async fn connect_from_env() -> SeaOrmResult<Self> {
        let config = DatabaseConfig::from_env()?;
        Self::connect(config).await
    }

    /// Get a reference to the underlying connection.
    pub fn connection(&self) -> &DatabaseConnection {
        &self.conn
    }

    /// Get the configuration.
    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// Ping the database to check connectivity.
    pub async fn ping(&self) -> SeaOrmResult<()> {
        debug!("Pinging database");
        self.conn
            .ping()
            .await
            .map_err(|e| SeaOrmError::Connection(e.to_string()))
    }

    /// Close the database connection.
    pub async fn close(self) -> SeaOrmResult<()> {
        info!("Closing database connection");
        self.conn
            .close()
            .await
            .map_err(|e| SeaOrmError::Connection(e.to_string()))
    }
}

impl std::ops::Deref for Database {
    type Target = DatabaseConnection;

    fn deref(&self) -> &Self::Target {
        &self.conn
    }
}
