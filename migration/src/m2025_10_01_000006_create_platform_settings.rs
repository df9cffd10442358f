//! Migration to create the platform_settings table.
//!
//! Holds a single row; secret columns store `enc:v1:` sealed text.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(PlatformSettings::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PlatformSettings::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(PlatformSettings::OpenaiApiKey).text().null())
                    .col(
                        ColumnDef::new(PlatformSettings::OpenaiDefaultModel)
                            .text()
                            .not_null()
                            .default("gpt-4o-mini"),
                    )
                    .col(
                        ColumnDef::new(PlatformSettings::OpenaiMaxTokens)
                            .integer()
                            .not_null()
                            .default(2000),
                    )
                    .col(
                        ColumnDef::new(PlatformSettings::OpenaiTemperature)
                            .double()
                            .not_null()
                            .default(0.7),
                    )
                    .col(ColumnDef::new(PlatformSettings::StripePublicKey).text().null())
                    .col(ColumnDef::new(PlatformSettings::StripeSecretKey).text().null())
                    .col(
                        ColumnDef::new(PlatformSettings::StripeWebhookSecret)
                            .text()
                            .null(),
                    )
                    .col(ColumnDef::new(PlatformSettings::SmtpHost).text().null())
                    .col(ColumnDef::new(PlatformSettings::SmtpPort).integer().null())
                    .col(ColumnDef::new(PlatformSettings::SmtpUsername).text().null())
                    .col(ColumnDef::new(PlatformSettings::SmtpPassword).text().null())
                    .col(ColumnDef::new(PlatformSettings::SmtpEncryption).text().null())
                    .col(
                        ColumnDef::new(PlatformSettings::MailFromAddress)
                            .text()
                            .null(),
                    )
                    .col(ColumnDef::new(PlatformSettings::MailFromName).text().null())
                    .col(ColumnDef::new(PlatformSettings::GoogleClientId).text().null())
                    .col(
                        ColumnDef::new(PlatformSettings::GoogleClientSecret)
                            .text()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(PlatformSettings::FacebookClientId)
                            .text()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(PlatformSettings::FacebookClientSecret)
                            .text()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(PlatformSettings::PlatformName)
                            .text()
                            .not_null()
                            .default("Ainstein Platform"),
                    )
                    .col(
                        ColumnDef::new(PlatformSettings::PlatformDescription)
                            .text()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(PlatformSettings::MaintenanceMode)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(PlatformSettings::DefaultPlanId).text().null())
                    .col(
                        ColumnDef::new(PlatformSettings::QueueMaxTries)
                            .integer()
                            .not_null()
                            .default(3),
                    )
                    .col(
                        ColumnDef::new(PlatformSettings::QueueRetryAfter)
                            .integer()
                            .not_null()
                            .default(90),
                    )
                    .col(
                        ColumnDef::new(PlatformSettings::RateLimitPerMinute)
                            .integer()
                            .not_null()
                            .default(60),
                    )
                    .col(
                        ColumnDef::new(PlatformSettings::RateLimitAiPerHour)
                            .integer()
                            .not_null()
                            .default(100),
                    )
                    .col(
                        ColumnDef::new(PlatformSettings::FeatureFlags)
                            .json_binary()
                            .null(),
                    )
                    .col(ColumnDef::new(PlatformSettings::LogoPath).text().null())
                    .col(ColumnDef::new(PlatformSettings::FaviconPath).text().null())
                    .col(
                        ColumnDef::new(PlatformSettings::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(PlatformSettings::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(PlatformSettings::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum PlatformSettings {
    Table,
    Id,
    OpenaiApiKey,
    OpenaiDefaultModel,
    OpenaiMaxTokens,
    OpenaiTemperature,
    StripePublicKey,
    StripeSecretKey,
    StripeWebhookSecret,
    SmtpHost,
    SmtpPort,
    SmtpUsername,
    SmtpPassword,
    SmtpEncryption,
    MailFromAddress,
    MailFromName,
    GoogleClientId,
    GoogleClientSecret,
    FacebookClientId,
    FacebookClientSecret,
    PlatformName,
    PlatformDescription,
    MaintenanceMode,
    DefaultPlanId,
    QueueMaxTries,
    QueueRetryAfter,
    RateLimitPerMinute,
    RateLimitAiPerHour,
    FeatureFlags,
    LogoPath,
    FaviconPath,
    CreatedAt,
    UpdatedAt,
}
