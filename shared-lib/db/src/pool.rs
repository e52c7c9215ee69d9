//! Database connection pool management.

use sqlx::mysql::MySqlPoolOptions;
use sqlx::MySqlPool;
use std::time::Duration;

use crate::config::DbConfig;
use error::DatabaseError;

/// Type alias for MySQL connection pool.
pub type DbPool = MySqlPool;

fn pool_options(config: &DbConfig) -> MySqlPoolOptions {
    MySqlPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
}

/// Create a new database connection pool, opening the first connection
/// eagerly so bad credentials surface at startup.
pub async fn create_pool(config: &DbConfig) -> Result<DbPool, DatabaseError> {
    tracing::info!("Creating database pool: {}", config.redacted_url());

    let pool = pool_options(config)
        .connect_with(config.connect_options())
        .await
        .map_err(|e| {
            tracing::error!("Failed to create database pool: {}", e);
            DatabaseError::ConnectionFailed(e.to_string())
        })?;

    tracing::info!("Database pool created successfully");
    Ok(pool)
}

/// Create a pool that connects on first use.
///
/// Must be called inside a tokio runtime.
pub fn create_lazy_pool(config: &DbConfig) -> DbPool {
    tracing::info!("Creating lazy database pool: {}", config.redacted_url());
    pool_options(config).connect_lazy_with(config.connect_options())
}

/// Close the pool, waiting for checked-out connections to be returned.
pub async fn close_pool(pool: &DbPool) {
    pool.close().await;
    tracing::info!("Database pool closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::classify;

    fn unreachable_config() -> DbConfig {
        // Port 1 on loopback refuses connections.
        DbConfig::new("127.0.0.1", 1, "testdb", "user", "pass")
            .with_min_connections(0)
            .with_connect_timeout(1)
    }

    #[tokio::test]
    async fn test_create_pool_unreachable_host() {
        let result = create_pool(&unreachable_config()).await;
        assert!(matches!(result, Err(DatabaseError::ConnectionFailed(_))));
    }

    #[tokio::test]
    async fn test_lazy_pool_fails_on_first_query() {
        let pool = create_lazy_pool(&unreachable_config());
        let result = sqlx::query("SELECT 1").execute(&pool).await.map_err(classify);
        assert!(matches!(result, Err(DatabaseError::ConnectionFailed(_))));
    }
}
