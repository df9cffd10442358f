//! # Ainstein API Main Entry Point
//!
//! Loads configuration, prepares the database and serves the HTTP API
//! together with the generation worker.

use anyhow::Context;
use ainstein::{
    config::ConfigLoader,
    db::{init_pool, run_migrations},
    seeds::run_seeds,
    server::run_server,
    telemetry::init_tracing,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ConfigLoader::new().load()?;
    init_tracing(&config)?;

    tracing::info!(profile = %config.profile, "Loaded configuration");
    if let Ok(redacted) = config.redacted_json() {
        tracing::debug!(config = %redacted, "Effective configuration");
    }

    let db = init_pool(&config).await.context("connecting to the database")?;
    if config.run_migrations {
        run_migrations(&db).await?;
    }
    run_seeds(&db).await.context("seeding defaults")?;

    run_server(config, db).await
}
