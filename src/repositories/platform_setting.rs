//! # Platform Setting Repository
//!
//! The settings table holds exactly one row, created on first access.

use crate::error::RepositoryError;
use crate::models::platform_setting::{
    ActiveModel as SettingActiveModel, Entity as PlatformSetting, Model as SettingModel,
};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, QueryOrder, Set};
use uuid::Uuid;

pub struct PlatformSettingRepository<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> PlatformSettingRepository<'a> {
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    /// The settings row, inserting the defaults when the table is empty.
    pub async fn get_or_create(&self) -> Result<SettingModel, RepositoryError> {
        if let Some(existing) = PlatformSetting::find()
            .order_by_asc(crate::models::platform_setting::Column::CreatedAt)
            .one(self.db)
            .await?
        {
            return Ok(existing);
        }

        let now = Utc::now();
        let defaults = SettingActiveModel {
            id: Set(Uuid::new_v4()),
            openai_api_key: Set(None),
            openai_default_model: Set("gpt-4o-mini".to_string()),
            openai_max_tokens: Set(2000),
            openai_temperature: Set(0.7),
            stripe_public_key: Set(None),
            stripe_secret_key: Set(None),
            stripe_webhook_secret: Set(None),
            smtp_host: Set(None),
            smtp_port: Set(None),
            smtp_username: Set(None),
            smtp_password: Set(None),
            smtp_encryption: Set(None),
            mail_from_address: Set(None),
            mail_from_name: Set(None),
            google_client_id: Set(None),
            google_client_secret: Set(None),
            facebook_client_id: Set(None),
            facebook_client_secret: Set(None),
            platform_name: Set("Ainstein Platform".to_string()),
            platform_description: Set(None),
            maintenance_mode: Set(false),
            default_plan_id: Set(None),
            queue_max_tries: Set(3),
            queue_retry_after: Set(90),
            rate_limit_per_minute: Set(60),
            rate_limit_ai_per_hour: Set(100),
            feature_flags: Set(None),
            logo_path: Set(None),
            favicon_path: Set(None),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };

        defaults
            .insert(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    /// Persist a modified settings row.
    pub async fn save(&self, mut active: SettingActiveModel) -> Result<SettingModel, RepositoryError> {
        active.updated_at = Set(Utc::now().into());
        active
            .update(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }
}
