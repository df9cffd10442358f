//! PlatformSetting entity model
//!
//! Single-row table with global configuration. Secret columns hold
//! `enc:v1:` sealed values (see [`crate::crypto::encrypt_secret`]).

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "platform_settings")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub openai_api_key: Option<String>,
    pub openai_default_model: String,
    pub openai_max_tokens: i32,
    pub openai_temperature: f64,

    pub stripe_public_key: Option<String>,
    pub stripe_secret_key: Option<String>,
    pub stripe_webhook_secret: Option<String>,

    pub smtp_host: Option<String>,
    pub smtp_port: Option<i32>,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub smtp_encryption: Option<String>,
    pub mail_from_address: Option<String>,
    pub mail_from_name: Option<String>,

    pub google_client_id: Option<String>,
    pub google_client_secret: Option<String>,
    pub facebook_client_id: Option<String>,
    pub facebook_client_secret: Option<String>,

    pub platform_name: String,
    pub platform_description: Option<String>,
    pub maintenance_mode: bool,
    pub default_plan_id: Option<String>,

    pub queue_max_tries: i32,
    pub queue_retry_after: i32,
    pub rate_limit_per_minute: i32,
    pub rate_limit_ai_per_hour: i32,

    /// Feature name → enabled
    #[sea_orm(column_type = "JsonBinary")]
    pub feature_flags: Option<JsonValue>,

    pub logo_path: Option<String>,
    pub favicon_path: Option<String>,

    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
