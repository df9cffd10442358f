//! Migration to create the prompts table.
//!
//! `(tenant_id, alias)` is unique; rows with a NULL alias never collide.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Prompts::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Prompts::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Prompts::TenantId).uuid().not_null())
                    .col(ColumnDef::new(Prompts::Name).text().not_null())
                    .col(ColumnDef::new(Prompts::Alias).text().null())
                    .col(ColumnDef::new(Prompts::Description).text().null())
                    .col(ColumnDef::new(Prompts::Template).text().not_null())
                    .col(ColumnDef::new(Prompts::Variables).json_binary().null())
                    .col(ColumnDef::new(Prompts::Category).text().null())
                    .col(
                        ColumnDef::new(Prompts::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(Prompts::IsSystem)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Prompts::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Prompts::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_prompts_tenant_id")
                            .from(Prompts::Table, Prompts::TenantId)
                            .to(Tenants::Table, Tenants::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_prompts_tenant_alias_unique")
                    .table(Prompts::Table)
                    .col(Prompts::TenantId)
                    .col(Prompts::Alias)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_prompts_is_system")
                    .table(Prompts::Table)
                    .col(Prompts::IsSystem)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Prompts::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Prompts {
    Table,
    Id,
    TenantId,
    Name,
    Alias,
    Description,
    Template,
    Variables,
    Category,
    IsActive,
    IsSystem,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Tenants {
    Table,
    Id,
}
