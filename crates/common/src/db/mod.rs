//! Database connection management
//!
//! Provides the pooled Postgres connection used by the pgvector store.

use crate::config::DatabaseConfig;
use crate::errors::{AppError, Result};
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use std::time::Duration;
use tracing::info;

/// Database connection pool wrapper
#[derive(Clone)]
pub struct DbPool {
    connection: DatabaseConnection,
}

impl DbPool {
    /// Create a new database pool from configuration
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        info!("Connecting to database...");

        let mut opts = ConnectOptions::new(&config.url);
        opts.max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .sqlx_logging(false);

        let connection = Database::connect(opts)
            .await
            .map_err(|e| AppError::VectorStore {
                message: format!("Failed to connect to database: {}", e),
            })?;

        info!("Database connection established");

        Ok(Self { connection })
    }

    /// Get the sea-orm connection
    pub fn connection(&self) -> &DatabaseConnection {
        &self.connection
    }

    /// Get the underlying sqlx pool, for binds sea-orm has no type for
    pub fn pg_pool(&self) -> &sqlx::PgPool {
        self.connection.get_postgres_connection_pool()
    }
}
