//! Database migrations for the Ainstein platform.
//!
//! One migration per table, applied in dependency order (tenants first).

pub use sea_orm_migration::prelude::*;

mod m2025_10_01_000001_create_tenants;
mod m2025_10_01_000002_create_users;
mod m2025_10_01_000003_create_pages;
mod m2025_10_01_000004_create_prompts;
mod m2025_10_01_000005_create_content_generations;
mod m2025_10_01_000006_create_platform_settings;
mod m2025_10_01_000007_create_api_keys;
mod m2025_10_01_000008_create_usage_histories;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2025_10_01_000001_create_tenants::Migration),
            Box::new(m2025_10_01_000002_create_users::Migration),
            Box::new(m2025_10_01_000003_create_pages::Migration),
            Box::new(m2025_10_01_000004_create_prompts::Migration),
            Box::new(m2025_10_01_000005_create_content_generations::Migration),
            Box::new(m2025_10_01_000006_create_platform_settings::Migration),
            Box::new(m2025_10_01_000007_create_api_keys::Migration),
            Box::new(m2025_10_01_000008_create_usage_histories::Migration),
        ]
    }
}
