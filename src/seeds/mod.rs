//! Database seeding
//!
//! Idempotent bootstrap data created on startup and by `ainstein-admin seed`:
//! the `platform` tenant and the system prompts it owns.

pub mod prompts;

use anyhow::Result;
use sea_orm::DatabaseConnection;

pub use prompts::{PLATFORM_SUBDOMAIN, seed_platform_tenant, seed_system_prompts};

/// Run every seed in dependency order.
pub async fn run_seeds(db: &DatabaseConnection) -> Result<()> {
    let tenant = seed_platform_tenant(db).await?;
    seed_system_prompts(db, tenant.id).await?;
    Ok(())
}
