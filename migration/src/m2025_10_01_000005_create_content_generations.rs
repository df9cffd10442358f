//! Migration to create the content_generations table.
//!
//! Rows double as the generation work queue: the worker claims `pending`
//! rows whose `next_attempt_at` has passed, oldest first.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ContentGenerations::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ContentGenerations::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ContentGenerations::TenantId).uuid().not_null())
                    .col(ColumnDef::new(ContentGenerations::PageId).uuid().not_null())
                    .col(ColumnDef::new(ContentGenerations::PromptId).uuid().null())
                    .col(
                        ColumnDef::new(ContentGenerations::PromptType)
                            .text()
                            .not_null()
                            .default("content"),
                    )
                    .col(
                        ColumnDef::new(ContentGenerations::PromptTemplate)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ContentGenerations::Variables)
                            .json_binary()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(ContentGenerations::AdditionalInstructions)
                            .text()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(ContentGenerations::GeneratedContent)
                            .text()
                            .null(),
                    )
                    .col(ColumnDef::new(ContentGenerations::MetaTitle).text().null())
                    .col(
                        ColumnDef::new(ContentGenerations::MetaDescription)
                            .text()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(ContentGenerations::TokensUsed)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(ContentGenerations::AiModel).text().null())
                    .col(
                        ColumnDef::new(ContentGenerations::ExecutionMode)
                            .text()
                            .not_null()
                            .default("async"),
                    )
                    .col(
                        ColumnDef::new(ContentGenerations::Status)
                            .text()
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        ColumnDef::new(ContentGenerations::Attempts)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(ContentGenerations::ErrorMessage)
                            .text()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(ContentGenerations::NextAttemptAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(ContentGenerations::StartedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(ContentGenerations::PublishedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(ContentGenerations::CompletedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(ContentGenerations::CreatedBy).uuid().null())
                    .col(
                        ColumnDef::new(ContentGenerations::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(ContentGenerations::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_content_generations_tenant_id")
                            .from(ContentGenerations::Table, ContentGenerations::TenantId)
                            .to(Tenants::Table, Tenants::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_content_generations_page_id")
                            .from(ContentGenerations::Table, ContentGenerations::PageId)
                            .to(Pages::Table, Pages::Id)
                            .on_delete(ForeignKeyAction::NoAction),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_content_generations_prompt_id")
                            .from(ContentGenerations::Table, ContentGenerations::PromptId)
                            .to(Prompts::Table, Prompts::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_content_generations_created_by")
                            .from(ContentGenerations::Table, ContentGenerations::CreatedBy)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_content_generations_queue")
                    .table(ContentGenerations::Table)
                    .col(ContentGenerations::Status)
                    .col(ContentGenerations::NextAttemptAt)
                    .col(ContentGenerations::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_content_generations_tenant_created")
                    .table(ContentGenerations::Table)
                    .col(ContentGenerations::TenantId)
                    .col(ContentGenerations::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_content_generations_page_id")
                    .table(ContentGenerations::Table)
                    .col(ContentGenerations::PageId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ContentGenerations::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ContentGenerations {
    Table,
    Id,
    TenantId,
    PageId,
    PromptId,
    PromptType,
    PromptTemplate,
    Variables,
    AdditionalInstructions,
    GeneratedContent,
    MetaTitle,
    MetaDescription,
    TokensUsed,
    AiModel,
    ExecutionMode,
    Status,
    Attempts,
    ErrorMessage,
    NextAttemptAt,
    StartedAt,
    PublishedAt,
    CompletedAt,
    CreatedBy,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Tenants {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum Pages {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum Prompts {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum Users {
    Table,
    Id,
}
