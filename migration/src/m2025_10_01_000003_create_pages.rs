//! Migration to create the pages table (tenant-scoped generation targets).

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Pages::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Pages::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Pages::TenantId).uuid().not_null())
                    .col(ColumnDef::new(Pages::UrlPath).text().not_null())
                    .col(ColumnDef::new(Pages::Keyword).text().not_null())
                    .col(ColumnDef::new(Pages::Category).text().null())
                    .col(
                        ColumnDef::new(Pages::Language)
                            .text()
                            .not_null()
                            .default("en"),
                    )
                    .col(ColumnDef::new(Pages::CmsType).text().null())
                    .col(ColumnDef::new(Pages::CmsPageId).text().null())
                    .col(
                        ColumnDef::new(Pages::Status)
                            .text()
                            .not_null()
                            .default("draft"),
                    )
                    .col(
                        ColumnDef::new(Pages::Priority)
                            .integer()
                            .not_null()
                            .default(5),
                    )
                    .col(ColumnDef::new(Pages::Metadata).json_binary().null())
                    .col(
                        ColumnDef::new(Pages::LastSynced)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Pages::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Pages::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_pages_tenant_id")
                            .from(Pages::Table, Pages::TenantId)
                            .to(Tenants::Table, Tenants::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_pages_tenant_url_path_unique")
                    .table(Pages::Table)
                    .col(Pages::TenantId)
                    .col(Pages::UrlPath)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_pages_tenant_status")
                    .table(Pages::Table)
                    .col(Pages::TenantId)
                    .col(Pages::Status)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Pages::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Pages {
    Table,
    Id,
    TenantId,
    UrlPath,
    Keyword,
    Category,
    Language,
    CmsType,
    CmsPageId,
    Status,
    Priority,
    Metadata,
    LastSynced,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Tenants {
    Table,
    Id,
}
