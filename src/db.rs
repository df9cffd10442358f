//! Database connection and pool management.
//!
//! Wraps SeaORM connection setup (Postgres or SQLite) with retry on startup,
//! a liveness probe and the migration entry point used by the server and CLI.

use anyhow::{Context, Result};
use migration::{Migrator, MigratorTrait};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Statement};
use std::time::Duration;
use tokio::time::sleep;

use crate::config::AppConfig;

const MAX_CONNECT_ATTEMPTS: u32 = 5;

/// Errors that can occur during database operations.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Failed to connect to database: {source}")]
    ConnectionFailed {
        #[from]
        source: sea_orm::DbErr,
    },
    #[error("Database connection timeout after {timeout_ms}ms")]
    ConnectionTimeout { timeout_ms: u64 },
    #[error("Invalid database configuration: {message}")]
    InvalidConfiguration { message: String },
}

/// Initializes a database connection pool with the given configuration.
///
/// Accepts Postgres or SQLite URLs. Pool size and acquire timeout come from
/// the configuration; transient connection failures are retried with
/// exponential backoff starting at 100ms.
///
/// # Arguments
///
/// * `cfg` - Application configuration containing database settings
///
/// # Errors
///
/// Returns [`DatabaseError::InvalidConfiguration`] for a blank URL and
/// [`DatabaseError::ConnectionFailed`] once every attempt has failed.
///
/// # Examples
///
/// ```no_run
/// use ainstein::{config::AppConfig, db::init_pool};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let config = AppConfig::default();
///     let db = init_pool(&config).await?;
///     // Use the database connection...
///     Ok(())
/// }
/// ```
pub async fn init_pool(cfg: &AppConfig) -> Result<DatabaseConnection> {
    if cfg.database_url.trim().is_empty() {
        return Err(DatabaseError::InvalidConfiguration {
            message: "Database URL cannot be empty".to_string(),
        }
        .into());
    }

    let mut opt = ConnectOptions::new(&cfg.database_url);
    opt.max_connections(cfg.db_max_connections)
        .acquire_timeout(Duration::from_millis(cfg.db_acquire_timeout_ms))
        .idle_timeout(Duration::from_secs(600)) // 10 minutes
        .max_lifetime(Duration::from_secs(1800)) // 30 minutes
        .sqlx_logging(true)
        .sqlx_logging_level(log::LevelFilter::Debug);

    // Exponential backoff between attempts
    let mut retry_delay = Duration::from_millis(100);

    for attempt in 1..=MAX_CONNECT_ATTEMPTS {
        match Database::connect(opt.clone()).await {
            Ok(conn) => {
                log::info!("Connected to database (attempt {})", attempt);
                return Ok(conn);
            }
            Err(e) => {
                if attempt == MAX_CONNECT_ATTEMPTS {
                    log::error!(
                        "Failed to connect to database after {} attempts: {}",
                        MAX_CONNECT_ATTEMPTS,
                        e
                    );
                    return Err(DatabaseError::ConnectionFailed { source: e }.into());
                }

                log::warn!(
                    "Database connection attempt {} failed: {}, retrying in {:?}",
                    attempt,
                    e,
                    retry_delay
                );

                sleep(retry_delay).await;
                retry_delay *= 2;
            }
        }
    }

    Err(DatabaseError::ConnectionTimeout {
        timeout_ms: cfg.db_acquire_timeout_ms,
    }
    .into())
}

/// Applies all pending migrations.
///
/// A no-op when the schema is already current, so it is safe to call on
/// every startup.
///
/// # Arguments
///
/// * `db` - Connection the migrator runs against
///
/// # Errors
///
/// Returns an error if the pending set cannot be read or a migration fails.
pub async fn run_migrations(db: &DatabaseConnection) -> Result<()> {
    let pending = Migrator::get_pending_migrations(db)
        .await
        .context("listing pending migrations")?;
    if pending.is_empty() {
        log::info!("Database schema is up to date");
        return Ok(());
    }

    log::info!("Applying {} pending migration(s)", pending.len());
    Migrator::up(db, None)
        .await
        .context("applying migrations")?;
    Ok(())
}

/// Health check for the database connection.
///
/// Verifies that the connection is still usable by executing `SELECT 1`.
///
/// # Arguments
///
/// * `db` - Database connection to check
///
/// # Returns
///
/// Returns `Ok(())` if the connection is healthy, or an error otherwise.
pub async fn health_check(db: &DatabaseConnection) -> Result<()> {
    let stmt = Statement::from_string(db.get_database_backend(), "SELECT 1".to_string());

    db.query_one(stmt)
        .await
        .context("Database health check failed")?;

    Ok(())
}

/// Fresh migrated in-memory SQLite database for unit tests.
#[cfg(test)]
pub(crate) async fn test_connection() -> DatabaseConnection {
    let config = AppConfig {
        database_url: "sqlite::memory:".to_string(),
        db_max_connections: 1,
        ..AppConfig::default()
    };
    let db = init_pool(&config).await.expect("in-memory database");
    run_migrations(&db).await.expect("migrations apply");
    db
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_database_url() {
        let config = AppConfig {
            database_url: "  ".to_string(),
            ..AppConfig::default()
        };

        let rt = tokio::runtime::Runtime::new().unwrap();
        let result = rt.block_on(init_pool(&config));

        assert!(matches!(
            result.unwrap_err().downcast::<DatabaseError>(),
            Ok(DatabaseError::InvalidConfiguration { .. })
        ));
    }

    #[tokio::test]
    async fn sqlite_memory_pool_is_healthy_and_migrates() {
        let config = AppConfig {
            database_url: "sqlite::memory:".to_string(),
            db_max_connections: 1,
            ..AppConfig::default()
        };

        let db = init_pool(&config).await.unwrap();
        health_check(&db).await.unwrap();
        run_migrations(&db).await.unwrap();
        // Second run is a no-op.
        run_migrations(&db).await.unwrap();
        assert!(Migrator::get_pending_migrations(&db).await.unwrap().is_empty());
    }
}
