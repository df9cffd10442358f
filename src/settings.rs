//! Platform settings service.
//!
//! Reads the singleton `platform_settings` row through a one-hour TTL cache,
//! decrypting secret columns on load. Every write invalidates the cache.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use moka::sync::Cache;
use sea_orm::{DatabaseConnection, IntoActiveModel, Set};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use thiserror::Error;
use utoipa::ToSchema;

use crate::crypto::{self, CryptoError, CryptoKey};
use crate::error::RepositoryError;
use crate::models::platform_setting::Model as SettingModel;
use crate::repositories::PlatformSettingRepository;

pub const CACHE_TTL: Duration = Duration::from_secs(3600);
/// Placeholder shown instead of a configured secret.
pub const SECRET_MASK: &str = "********";
pub const SECRET_FIELDS: &[&str] = &[
    "openai_api_key",
    "stripe_secret_key",
    "stripe_webhook_secret",
    "smtp_password",
    "google_client_secret",
    "facebook_client_secret",
];
pub const SMTP_ENCRYPTIONS: &[&str] = &["tls", "ssl", "none"];

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("secret handling failed: {0}")]
    Crypto(#[from] CryptoError),
    #[error("unknown setting '{0}'")]
    UnknownKey(String),
    #[error("invalid settings")]
    Validation(BTreeMap<String, String>),
}

impl From<SettingsError> for crate::error::ApiError {
    fn from(error: SettingsError) -> Self {
        match error {
            SettingsError::Repository(err) => err.into(),
            SettingsError::Crypto(err) => err.into(),
            SettingsError::UnknownKey(key) => crate::error::validation_failed(
                json!({ key: "Unknown setting." }),
            ),
            SettingsError::Validation(fields) => {
                crate::error::validation_failed(json!(fields))
            }
        }
    }
}

/// Decrypted view of the settings row.
#[derive(Clone, Serialize, PartialEq)]
pub struct SettingsSnapshot {
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
    pub feature_flags: BTreeMap<String, bool>,
    pub logo_path: Option<String>,
    pub favicon_path: Option<String>,
}

impl std::fmt::Debug for SettingsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettingsSnapshot")
            .field("platform_name", &self.platform_name)
            .field("maintenance_mode", &self.maintenance_mode)
            .field("openai_default_model", &self.openai_default_model)
            .finish_non_exhaustive()
    }
}

impl SettingsSnapshot {
    fn from_model(model: &SettingModel, key: &CryptoKey) -> Result<Self, CryptoError> {
        let open = |field: &str, value: &Option<String>| -> Result<Option<String>, CryptoError> {
            value
                .as_deref()
                .map(|stored| crypto::decrypt_secret(key, field, stored))
                .transpose()
        };

        let feature_flags = model
            .feature_flags
            .as_ref()
            .and_then(Value::as_object)
            .map(|flags| {
                flags
                    .iter()
                    .filter_map(|(name, enabled)| enabled.as_bool().map(|b| (name.clone(), b)))
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            openai_api_key: open("openai_api_key", &model.openai_api_key)?,
            openai_default_model: model.openai_default_model.clone(),
            openai_max_tokens: model.openai_max_tokens,
            openai_temperature: model.openai_temperature,
            stripe_public_key: model.stripe_public_key.clone(),
            stripe_secret_key: open("stripe_secret_key", &model.stripe_secret_key)?,
            stripe_webhook_secret: open("stripe_webhook_secret", &model.stripe_webhook_secret)?,
            smtp_host: model.smtp_host.clone(),
            smtp_port: model.smtp_port,
            smtp_username: model.smtp_username.clone(),
            smtp_password: open("smtp_password", &model.smtp_password)?,
            smtp_encryption: model.smtp_encryption.clone(),
            mail_from_address: model.mail_from_address.clone(),
            mail_from_name: model.mail_from_name.clone(),
            google_client_id: model.google_client_id.clone(),
            google_client_secret: open("google_client_secret", &model.google_client_secret)?,
            facebook_client_id: model.facebook_client_id.clone(),
            facebook_client_secret: open("facebook_client_secret", &model.facebook_client_secret)?,
            platform_name: model.platform_name.clone(),
            platform_description: model.platform_description.clone(),
            maintenance_mode: model.maintenance_mode,
            default_plan_id: model.default_plan_id.clone(),
            queue_max_tries: model.queue_max_tries,
            queue_retry_after: model.queue_retry_after,
            rate_limit_per_minute: model.rate_limit_per_minute,
            rate_limit_ai_per_hour: model.rate_limit_ai_per_hour,
            feature_flags,
            logo_path: model.logo_path.clone(),
            favicon_path: model.favicon_path.clone(),
        })
    }

    pub fn is_openai_configured(&self) -> bool {
        configured(&self.openai_api_key)
    }

    pub fn is_stripe_configured(&self) -> bool {
        configured(&self.stripe_public_key) && configured(&self.stripe_secret_key)
    }

    pub fn is_smtp_configured(&self) -> bool {
        configured(&self.smtp_host) && self.smtp_port.is_some()
    }

    pub fn is_google_login_configured(&self) -> bool {
        configured(&self.google_client_id) && configured(&self.google_client_secret)
    }

    pub fn is_facebook_login_configured(&self) -> bool {
        configured(&self.facebook_client_id) && configured(&self.facebook_client_secret)
    }

    pub fn feature_enabled(&self, flag: &str) -> bool {
        self.feature_flags.get(flag).copied().unwrap_or(false)
    }

    /// Names of enabled feature flags.
    pub fn enabled_features(&self) -> Vec<String> {
        self.feature_flags
            .iter()
            .filter(|(_, enabled)| **enabled)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// All settings as JSON with secrets replaced by [`SECRET_MASK`] and a
    /// `<field>_configured` flag added for each secret.
    pub fn masked_json(&self) -> Value {
        let mut value = serde_json::to_value(self).unwrap_or_else(|_| json!({}));
        if let Some(map) = value.as_object_mut() {
            mask_secrets(map);
        }
        value
    }

    /// One setting by name, secrets masked.
    pub fn masked_value(&self, key: &str) -> Option<Value> {
        self.masked_json().get(key).cloned()
    }
}

fn configured(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

fn mask_secrets(map: &mut Map<String, Value>) {
    for field in SECRET_FIELDS {
        let configured = map
            .get(*field)
            .and_then(Value::as_str)
            .is_some_and(|v| !v.is_empty());
        map.insert(
            (*field).to_string(),
            if configured {
                Value::String(SECRET_MASK.to_string())
            } else {
                Value::Null
            },
        );
        map.insert(format!("{field}_configured"), Value::Bool(configured));
    }
}

/// Partial settings update. For secret fields an empty string clears the value.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct SettingsUpdate {
    pub openai_api_key: Option<String>,
    pub openai_default_model: Option<String>,
    pub openai_max_tokens: Option<i32>,
    pub openai_temperature: Option<f64>,
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
    pub platform_name: Option<String>,
    pub platform_description: Option<String>,
    pub maintenance_mode: Option<bool>,
    pub default_plan_id: Option<String>,
    pub queue_max_tries: Option<i32>,
    pub queue_retry_after: Option<i32>,
    pub rate_limit_per_minute: Option<i32>,
    pub rate_limit_ai_per_hour: Option<i32>,
    pub feature_flags: Option<BTreeMap<String, bool>>,
    pub logo_path: Option<String>,
    pub favicon_path: Option<String>,
}

impl SettingsUpdate {
    /// Build an update for a single `key`, parsing `raw` as JSON when the
    /// field is not textual (`maintenance_mode true`, `smtp_port 587`).
    pub fn from_pair(key: &str, raw: &str) -> Result<Self, SettingsError> {
        let as_text = json!({ key: raw });
        if let Ok(update) = serde_json::from_value::<Self>(as_text) {
            return Ok(update);
        }

        let parsed: Value = serde_json::from_str(raw).map_err(|_| {
            SettingsError::Validation(BTreeMap::from([(
                key.to_string(),
                "Invalid value.".to_string(),
            )]))
        })?;
        serde_json::from_value::<Self>(json!({ key: parsed })).map_err(|err| {
            if err.to_string().contains("unknown field") {
                SettingsError::UnknownKey(key.to_string())
            } else {
                SettingsError::Validation(BTreeMap::from([(key.to_string(), err.to_string())]))
            }
        })
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        let mut errors = BTreeMap::new();
        if let Some(temperature) = self.openai_temperature
            && !(0.0..=2.0).contains(&temperature)
        {
            errors.insert(
                "openai_temperature".to_string(),
                "The temperature must be between 0 and 2.".to_string(),
            );
        }
        if let Some(max_tokens) = self.openai_max_tokens
            && !(1..=128_000).contains(&max_tokens)
        {
            errors.insert(
                "openai_max_tokens".to_string(),
                "The max tokens must be between 1 and 128000.".to_string(),
            );
        }
        if let Some(port) = self.smtp_port
            && !(1..=65_535).contains(&port)
        {
            errors.insert(
                "smtp_port".to_string(),
                "The SMTP port must be between 1 and 65535.".to_string(),
            );
        }
        if let Some(encryption) = self.smtp_encryption.as_deref()
            && !SMTP_ENCRYPTIONS.contains(&encryption)
        {
            errors.insert(
                "smtp_encryption".to_string(),
                "The SMTP encryption must be one of tls, ssl, none.".to_string(),
            );
        }
        if let Some(address) = self.mail_from_address.as_deref()
            && !address.is_empty()
            && !crate::config::is_valid_email(address)
        {
            errors.insert(
                "mail_from_address".to_string(),
                "The mail from address must be a valid email address.".to_string(),
            );
        }
        if let Some(name) = self.platform_name.as_deref()
            && (name.trim().is_empty() || name.chars().count() > 255)
        {
            errors.insert(
                "platform_name".to_string(),
                "The platform name is required and may not exceed 255 characters.".to_string(),
            );
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(SettingsError::Validation(errors))
        }
    }
}

/// Cached access to platform settings
#[derive(Clone)]
pub struct PlatformSettings {
    db: DatabaseConnection,
    key: CryptoKey,
    cache: Cache<(), Arc<SettingsSnapshot>>,
}

impl PlatformSettings {
    pub fn new(db: DatabaseConnection, key: CryptoKey) -> Self {
        Self {
            db,
            key,
            cache: Cache::builder()
                .max_capacity(1)
                .time_to_live(CACHE_TTL)
                .build(),
        }
    }

    pub async fn get_all(&self) -> Result<Arc<SettingsSnapshot>, SettingsError> {
        if let Some(snapshot) = self.cache.get(&()) {
            return Ok(snapshot);
        }

        let model = PlatformSettingRepository::new(&self.db)
            .get_or_create()
            .await?;
        let snapshot = Arc::new(SettingsSnapshot::from_model(&model, &self.key)?);
        self.cache.insert((), Arc::clone(&snapshot));
        Ok(snapshot)
    }

    /// Decrypted value of one setting.
    pub async fn get(&self, key: &str) -> Result<Value, SettingsError> {
        let snapshot = self.get_all().await?;
        serde_json::to_value(&*snapshot)
            .ok()
            .and_then(|value| value.get(key).cloned())
            .ok_or_else(|| SettingsError::UnknownKey(key.to_string()))
    }

    pub async fn update(&self, update: SettingsUpdate) -> Result<Arc<SettingsSnapshot>, SettingsError> {
        update.validate()?;

        let repo = PlatformSettingRepository::new(&self.db);
        let model = repo.get_or_create().await?;
        let mut active = model.into_active_model();

        let seal = |field: &str, value: String| -> Result<Option<String>, CryptoError> {
            if value.is_empty() {
                Ok(None)
            } else {
                crypto::encrypt_secret(&self.key, field, &value).map(Some)
            }
        };

        if let Some(v) = update.openai_api_key {
            active.openai_api_key = Set(seal("openai_api_key", v)?);
        }
        if let Some(v) = update.openai_default_model {
            active.openai_default_model = Set(v);
        }
        if let Some(v) = update.openai_max_tokens {
            active.openai_max_tokens = Set(v);
        }
        if let Some(v) = update.openai_temperature {
            active.openai_temperature = Set(v);
        }
        if let Some(v) = update.stripe_public_key {
            active.stripe_public_key = Set(empty_to_none(v));
        }
        if let Some(v) = update.stripe_secret_key {
            active.stripe_secret_key = Set(seal("stripe_secret_key", v)?);
        }
        if let Some(v) = update.stripe_webhook_secret {
            active.stripe_webhook_secret = Set(seal("stripe_webhook_secret", v)?);
        }
        if let Some(v) = update.smtp_host {
            active.smtp_host = Set(empty_to_none(v));
        }
        if let Some(v) = update.smtp_port {
            active.smtp_port = Set(Some(v));
        }
        if let Some(v) = update.smtp_username {
            active.smtp_username = Set(empty_to_none(v));
        }
        if let Some(v) = update.smtp_password {
            active.smtp_password = Set(seal("smtp_password", v)?);
        }
        if let Some(v) = update.smtp_encryption {
            active.smtp_encryption = Set(Some(v));
        }
        if let Some(v) = update.mail_from_address {
            active.mail_from_address = Set(empty_to_none(v));
        }
        if let Some(v) = update.mail_from_name {
            active.mail_from_name = Set(empty_to_none(v));
        }
        if let Some(v) = update.google_client_id {
            active.google_client_id = Set(empty_to_none(v));
        }
        if let Some(v) = update.google_client_secret {
            active.google_client_secret = Set(seal("google_client_secret", v)?);
        }
        if let Some(v) = update.facebook_client_id {
            active.facebook_client_id = Set(empty_to_none(v));
        }
        if let Some(v) = update.facebook_client_secret {
            active.facebook_client_secret = Set(seal("facebook_client_secret", v)?);
        }
        if let Some(v) = update.platform_name {
            active.platform_name = Set(v);
        }
        if let Some(v) = update.platform_description {
            active.platform_description = Set(empty_to_none(v));
        }
        if let Some(v) = update.maintenance_mode {
            active.maintenance_mode = Set(v);
        }
        if let Some(v) = update.default_plan_id {
            active.default_plan_id = Set(empty_to_none(v));
        }
        if let Some(v) = update.queue_max_tries {
            active.queue_max_tries = Set(v);
        }
        if let Some(v) = update.queue_retry_after {
            active.queue_retry_after = Set(v);
        }
        if let Some(v) = update.rate_limit_per_minute {
            active.rate_limit_per_minute = Set(v);
        }
        if let Some(v) = update.rate_limit_ai_per_hour {
            active.rate_limit_ai_per_hour = Set(v);
        }
        if let Some(flags) = update.feature_flags {
            active.feature_flags = Set(Some(json!(flags)));
        }
        if let Some(v) = update.logo_path {
            active.logo_path = Set(empty_to_none(v));
        }
        if let Some(v) = update.favicon_path {
            active.favicon_path = Set(empty_to_none(v));
        }

        repo.save(active).await?;
        self.invalidate();
        tracing::info!("Platform settings updated");
        self.get_all().await
    }

    /// Set one setting from its textual form.
    pub async fn set(&self, key: &str, raw: &str) -> Result<Arc<SettingsSnapshot>, SettingsError> {
        self.update(SettingsUpdate::from_pair(key, raw)?).await
    }

    pub fn invalidate(&self) {
        self.cache.invalidate_all();
    }
}

fn empty_to_none(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_connection;
    use crate::models::PlatformSetting;
    use sea_orm::EntityTrait;

    fn key() -> CryptoKey {
        CryptoKey::new(vec![3u8; 32]).unwrap()
    }

    #[tokio::test]
    async fn secrets_are_encrypted_at_rest_and_masked() {
        let db = test_connection().await;
        let settings = PlatformSettings::new(db.clone(), key());

        let snapshot = settings
            .update(SettingsUpdate {
                openai_api_key: Some("sk-live-abc".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(snapshot.is_openai_configured());
        assert_eq!(snapshot.openai_api_key.as_deref(), Some("sk-live-abc"));

        let row = PlatformSetting::find().one(&db).await.unwrap().unwrap();
        let stored = row.openai_api_key.unwrap();
        assert!(crypto::is_encrypted_text(&stored));
        assert!(!stored.contains("sk-live-abc"));

        let masked = snapshot.masked_json();
        assert_eq!(masked["openai_api_key"], SECRET_MASK);
        assert_eq!(masked["openai_api_key_configured"], true);
        assert_eq!(masked["smtp_password"], Value::Null);
        assert_eq!(masked["smtp_password_configured"], false);
    }

    #[tokio::test]
    async fn empty_secret_clears_value() {
        let db = test_connection().await;
        let settings = PlatformSettings::new(db, key());
        settings.set("smtp_password", "hunter2").await.unwrap();

        let cleared = settings.set("smtp_password", "").await.unwrap();
        assert!(cleared.smtp_password.is_none());
    }

    #[tokio::test]
    async fn integrations_report_configured_only_when_complete() {
        let db = test_connection().await;
        let settings = PlatformSettings::new(db, key());
        let snapshot = settings.set("smtp_host", "mail.ainstein.test").await.unwrap();
        assert!(!snapshot.is_smtp_configured());
        assert!(settings.set("smtp_port", "587").await.unwrap().is_smtp_configured());

        settings.set("stripe_public_key", "pk_test_1").await.unwrap();
        assert!(!settings.get_all().await.unwrap().is_stripe_configured());
        let snapshot = settings.set("stripe_secret_key", "sk_test_1").await.unwrap();
        assert!(snapshot.is_stripe_configured());
    }

    #[tokio::test]
    async fn cache_serves_reads_until_invalidated() {
        let db = test_connection().await;
        let settings = PlatformSettings::new(db.clone(), key());
        assert_eq!(settings.get_all().await.unwrap().platform_name, "Ainstein Platform");

        // Write behind the service's back: the cached snapshot is still served.
        let row = PlatformSetting::find().one(&db).await.unwrap().unwrap();
        let mut active = row.into_active_model();
        active.platform_name = Set("Renamed".into());
        PlatformSettingRepository::new(&db).save(active).await.unwrap();
        assert_eq!(settings.get_all().await.unwrap().platform_name, "Ainstein Platform");

        settings.invalidate();
        assert_eq!(settings.get("platform_name").await.unwrap(), json!("Renamed"));
    }

    #[tokio::test]
    async fn validation_rejects_out_of_range_values() {
        let db = test_connection().await;
        let settings = PlatformSettings::new(db, key());

        let err = settings
            .update(SettingsUpdate {
                openai_temperature: Some(2.5),
                smtp_port: Some(0),
                smtp_encryption: Some("starttls".into()),
                ..Default::default()
            })
            .await
            .unwrap_err();
        let SettingsError::Validation(fields) = err else {
            panic!("expected validation error");
        };
        assert!(fields.contains_key("openai_temperature"));
        assert!(fields.contains_key("smtp_port"));
        assert!(fields.contains_key("smtp_encryption"));
    }

    #[test]
    fn from_pair_parses_typed_values() {
        let update = SettingsUpdate::from_pair("maintenance_mode", "true").unwrap();
        assert_eq!(update.maintenance_mode, Some(true));

        let update = SettingsUpdate::from_pair("platform_name", "123").unwrap();
        assert_eq!(update.platform_name.as_deref(), Some("123"));

        assert!(matches!(
            SettingsUpdate::from_pair("nonexistent", "1"),
            Err(SettingsError::UnknownKey(_))
        ));
    }

    #[test]
    fn feature_flags_default_to_disabled() {
        let mut snapshot_flags = BTreeMap::new();
        snapshot_flags.insert("beta".to_string(), true);
        snapshot_flags.insert("legacy".to_string(), false);
        let snapshot = SettingsSnapshot {
            feature_flags: snapshot_flags,
            ..snapshot_defaults()
        };
        assert!(snapshot.feature_enabled("beta"));
        assert!(!snapshot.feature_enabled("legacy"));
        assert!(!snapshot.feature_enabled("missing"));
        assert_eq!(snapshot.enabled_features(), vec!["beta".to_string()]);
    }

    fn snapshot_defaults() -> SettingsSnapshot {
        SettingsSnapshot {
            openai_api_key: None,
            openai_default_model: "gpt-4o-mini".into(),
            openai_max_tokens: 2000,
            openai_temperature: 0.7,
            stripe_public_key: None,
            stripe_secret_key: None,
            stripe_webhook_secret: None,
            smtp_host: None,
            smtp_port: None,
            smtp_username: None,
            smtp_password: None,
            smtp_encryption: None,
            mail_from_address: None,
            mail_from_name: None,
            google_client_id: None,
            google_client_secret: None,
            facebook_client_id: None,
            facebook_client_secret: None,
            platform_name: "Ainstein Platform".into(),
            platform_description: None,
            maintenance_mode: false,
            default_plan_id: None,
            queue_max_tries: 3,
            queue_retry_after: 90,
            rate_limit_per_minute: 60,
            rate_limit_ai_per_hour: 100,
            feature_flags: BTreeMap::new(),
            logo_path: None,
            favicon_path: None,
        }
    }
}
