//! Migration to create the tenants table.
//!
//! Tenants are the isolation boundary: every tenant-scoped table references
//! `tenants.id` with cascading deletes.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Tenants::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Tenants::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Tenants::Name).text().not_null())
                    .col(ColumnDef::new(Tenants::Domain).text().null().unique_key())
                    .col(ColumnDef::new(Tenants::Subdomain).text().null().unique_key())
                    .col(
                        ColumnDef::new(Tenants::PlanType)
                            .text()
                            .not_null()
                            .default("free"),
                    )
                    .col(
                        ColumnDef::new(Tenants::TokensMonthlyLimit)
                            .big_integer()
                            .not_null()
                            .default(10000),
                    )
                    .col(
                        ColumnDef::new(Tenants::TokensUsedCurrent)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Tenants::UsagePeriod).text().not_null())
                    .col(
                        ColumnDef::new(Tenants::Status)
                            .text()
                            .not_null()
                            .default("active"),
                    )
                    .col(ColumnDef::new(Tenants::ThemeConfig).json_binary().null())
                    .col(ColumnDef::new(Tenants::BrandConfig).json_binary().null())
                    .col(
                        ColumnDef::new(Tenants::Features)
                            .text()
                            .not_null()
                            .default(""),
                    )
                    .col(ColumnDef::new(Tenants::StripeCustomerId).text().null())
                    .col(ColumnDef::new(Tenants::StripeSubscriptionId).text().null())
                    .col(
                        ColumnDef::new(Tenants::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Tenants::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_tenants_usage_period")
                    .table(Tenants::Table)
                    .col(Tenants::UsagePeriod)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Tenants::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Tenants {
    Table,
    Id,
    Name,
    Domain,
    Subdomain,
    PlanType,
    TokensMonthlyLimit,
    TokensUsedCurrent,
    UsagePeriod,
    Status,
    ThemeConfig,
    BrandConfig,
    Features,
    StripeCustomerId,
    StripeSubscriptionId,
    CreatedAt,
    UpdatedAt,
}
