//! Migration to create the usage_histories table (one row per tenant and month).

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(UsageHistories::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(UsageHistories::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(UsageHistories::TenantId).uuid().not_null())
                    .col(ColumnDef::new(UsageHistories::Month).text().not_null())
                    .col(
                        ColumnDef::new(UsageHistories::TokensUsed)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(UsageHistories::PagesGenerated)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(UsageHistories::ApiCalls)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(UsageHistories::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(UsageHistories::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_usage_histories_tenant_id")
                            .from(UsageHistories::Table, UsageHistories::TenantId)
                            .to(Tenants::Table, Tenants::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_usage_histories_tenant_month_unique")
                    .table(UsageHistories::Table)
                    .col(UsageHistories::TenantId)
                    .col(UsageHistories::Month)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(UsageHistories::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum UsageHistories {
    Table,
    Id,
    TenantId,
    Month,
    TokensUsed,
    PagesGenerated,
    ApiCalls,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Tenants {
    Table,
    Id,
}
