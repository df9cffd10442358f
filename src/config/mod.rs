//! Configuration loading for the Ainstein platform.
//!
//! Loads layered `.env` files and environment variables prefixed with
//! `AINSTEIN_`, producing a typed [`AppConfig`].

use std::{collections::BTreeMap, env, net::SocketAddr, path::PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

const ENV_PREFIX: &str = "AINSTEIN_";
const REDACTED: &str = "[REDACTED]";

/// Application configuration derived from `AINSTEIN_*` environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct AppConfig {
    #[serde(default = "default_profile")]
    pub profile: String,
    #[serde(default = "default_api_bind_addr")]
    pub api_bind_addr: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_format")]
    pub log_format: String,
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,
    #[serde(default = "default_db_acquire_timeout_ms")]
    pub db_acquire_timeout_ms: u64,
    #[serde(default = "default_true")]
    pub run_migrations: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crypto_key: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwt_secret: Option<String>,
    #[serde(default = "default_jwt_ttl_seconds")]
    pub jwt_ttl_seconds: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cors_allowed_origins: Vec<String>,
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,
    #[serde(default)]
    pub openai: OpenAiConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub usage_reset: UsageResetConfig,
    #[serde(default)]
    pub mail: MailConfig,
}

/// OpenAI client configuration. The API key here is only a fallback for the
/// `openai_api_key` platform setting.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct OpenAiConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
    #[serde(default = "default_openai_timeout_seconds")]
    pub timeout_seconds: u64,
}

/// Background generation worker tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct WorkerConfig {
    /// Poll interval between claim rounds (default: 1000ms)
    #[serde(default = "default_worker_tick_ms")]
    pub tick_ms: u64,
    /// Maximum number of generations processed at the same time (default: 4)
    #[serde(default = "default_worker_concurrency")]
    pub concurrency: usize,
    /// Maximum rows claimed per round (default: 8)
    #[serde(default = "default_worker_claim_batch")]
    pub claim_batch: u64,
    /// Attempts before a generation is marked permanently failed (default: 3)
    #[serde(default = "default_worker_max_attempts")]
    pub max_attempts: i32,
    /// Hard timeout for a single attempt (default: 300s)
    #[serde(default = "default_worker_max_run_seconds")]
    pub max_run_seconds: u64,
    /// Base delay for retry backoff, doubled per attempt (default: 10s)
    #[serde(default = "default_worker_backoff_base_seconds")]
    pub backoff_base_seconds: u64,
}

/// Monthly token usage reset task.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct UsageResetConfig {
    #[serde(default = "default_usage_reset_tick_seconds")]
    pub tick_seconds: u64,
}

/// Outbound mail transport selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct MailConfig {
    /// `log` (default) or `http`
    #[serde(default = "default_mail_transport")]
    pub transport: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_token: Option<String>,
    #[serde(default = "default_mail_from_address")]
    pub from_address: String,
    #[serde(default = "default_mail_from_name")]
    pub from_name: String,
    /// Recipients of platform notifications (new registrations, high usage)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub admin_notification_emails: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            profile: default_profile(),
            api_bind_addr: default_api_bind_addr(),
            log_level: default_log_level(),
            log_format: default_log_format(),
            database_url: default_database_url(),
            db_max_connections: default_db_max_connections(),
            db_acquire_timeout_ms: default_db_acquire_timeout_ms(),
            run_migrations: true,
            crypto_key: None,
            jwt_secret: None,
            jwt_ttl_seconds: default_jwt_ttl_seconds(),
            cors_allowed_origins: Vec::new(),
            public_base_url: default_public_base_url(),
            openai: OpenAiConfig::default(),
            worker: WorkerConfig::default(),
            usage_reset: UsageResetConfig::default(),
            mail: MailConfig::default(),
        }
    }
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_openai_base_url(),
            timeout_seconds: default_openai_timeout_seconds(),
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            tick_ms: default_worker_tick_ms(),
            concurrency: default_worker_concurrency(),
            claim_batch: default_worker_claim_batch(),
            max_attempts: default_worker_max_attempts(),
            max_run_seconds: default_worker_max_run_seconds(),
            backoff_base_seconds: default_worker_backoff_base_seconds(),
        }
    }
}

impl Default for UsageResetConfig {
    fn default() -> Self {
        Self {
            tick_seconds: default_usage_reset_tick_seconds(),
        }
    }
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            transport: default_mail_transport(),
            http_endpoint: None,
            http_token: None,
            from_address: default_mail_from_address(),
            from_name: default_mail_from_name(),
            admin_notification_emails: Vec::new(),
        }
    }
}

impl OpenAiConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        url::Url::parse(&self.base_url).map_err(|source| ConfigError::InvalidUrl {
            field: "OPENAI_BASE_URL",
            value: self.base_url.clone(),
            source,
        })?;

        if self.timeout_seconds == 0 || self.timeout_seconds > 600 {
            return Err(ConfigError::InvalidOpenAiTimeout {
                value: self.timeout_seconds,
            });
        }

        Ok(())
    }
}

impl WorkerConfig {
    /// Validate worker configuration bounds
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_ms < 100 || self.tick_ms > 60_000 {
            return Err(ConfigError::InvalidWorkerTick { value: self.tick_ms });
        }

        if self.concurrency == 0 || self.concurrency > 64 {
            return Err(ConfigError::InvalidWorkerConcurrency {
                value: self.concurrency,
            });
        }

        if self.claim_batch == 0 {
            return Err(ConfigError::InvalidWorkerClaimBatch {
                value: self.claim_batch,
            });
        }

        if self.max_attempts < 1 || self.max_attempts > 10 {
            return Err(ConfigError::InvalidWorkerMaxAttempts {
                value: self.max_attempts,
            });
        }

        if self.max_run_seconds < 10 {
            return Err(ConfigError::InvalidWorkerMaxRun {
                value: self.max_run_seconds,
            });
        }

        Ok(())
    }
}

impl UsageResetConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_seconds < 10 || self.tick_seconds > 86_400 {
            return Err(ConfigError::InvalidUsageResetTick {
                value: self.tick_seconds,
            });
        }
        Ok(())
    }
}

impl MailConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.transport.as_str() {
            "log" => {}
            "http" => {
                let endpoint = self
                    .http_endpoint
                    .as_deref()
                    .ok_or(ConfigError::MissingMailEndpoint)?;
                url::Url::parse(endpoint).map_err(|source| ConfigError::InvalidUrl {
                    field: "MAIL_HTTP_ENDPOINT",
                    value: endpoint.to_string(),
                    source,
                })?;
            }
            other => {
                return Err(ConfigError::InvalidMailTransport {
                    value: other.to_string(),
                });
            }
        }

        if !is_valid_email(&self.from_address) {
            return Err(ConfigError::InvalidMailAddress {
                value: self.from_address.clone(),
            });
        }

        for address in &self.admin_notification_emails {
            if !is_valid_email(address) {
                return Err(ConfigError::InvalidMailAddress {
                    value: address.clone(),
                });
            }
        }

        Ok(())
    }
}

impl AppConfig {
    /// Returns the configured bind address as a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        self.api_bind_addr.parse()
    }

    /// Local and test profiles relax secret requirements.
    pub fn is_development(&self) -> bool {
        matches!(self.profile.as_str(), "local" | "test")
    }

    /// Returns a redacted JSON representation (secrets are redacted).
    pub fn redacted_json(&self) -> serde_json::Result<String> {
        let mut config = self.clone();

        if config.crypto_key.is_some() {
            config.crypto_key = Some(REDACTED.as_bytes().to_vec());
        }
        if config.jwt_secret.is_some() {
            config.jwt_secret = Some(REDACTED.to_string());
        }
        if config.openai.api_key.is_some() {
            config.openai.api_key = Some(REDACTED.to_string());
        }
        if config.mail.http_token.is_some() {
            config.mail.http_token = Some(REDACTED.to_string());
        }

        serde_json::to_string_pretty(&config)
    }

    /// Validates the configuration, returning an error if required settings are missing.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.crypto_key {
            Some(ref key) if key.len() != 32 => {
                return Err(ConfigError::InvalidCryptoKeyLength { length: key.len() });
            }
            Some(_) => {}
            None => return Err(ConfigError::MissingCryptoKey),
        }

        match self.jwt_secret.as_deref() {
            None | Some("") => return Err(ConfigError::MissingJwtSecret),
            Some(secret) if !self.is_development() && secret.len() < 32 => {
                return Err(ConfigError::WeakJwtSecret {
                    length: secret.len(),
                });
            }
            Some(_) => {}
        }

        if self.jwt_ttl_seconds < 60 {
            return Err(ConfigError::InvalidJwtTtl {
                value: self.jwt_ttl_seconds,
            });
        }

        if !matches!(self.log_format.as_str(), "json" | "pretty") {
            return Err(ConfigError::InvalidLogFormat {
                value: self.log_format.clone(),
            });
        }

        url::Url::parse(&self.public_base_url).map_err(|source| ConfigError::InvalidUrl {
            field: "PUBLIC_BASE_URL",
            value: self.public_base_url.clone(),
            source,
        })?;

        self.openai.validate()?;
        self.worker.validate()?;
        self.usage_reset.validate()?;
        self.mail.validate()?;

        Ok(())
    }
}

fn default_profile() -> String {
    "local".to_string()
}

fn default_api_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_database_url() -> String {
    "sqlite://ainstein.db?mode=rwc".to_string()
}

fn default_db_max_connections() -> u32 {
    10
}

fn default_db_acquire_timeout_ms() -> u64 {
    5000
}

fn default_true() -> bool {
    true
}

fn default_jwt_ttl_seconds() -> u64 {
    86_400 // 24 hours
}

fn default_public_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_openai_timeout_seconds() -> u64 {
    120
}

fn default_worker_tick_ms() -> u64 {
    1000
}

fn default_worker_concurrency() -> usize {
    4
}

fn default_worker_claim_batch() -> u64 {
    8
}

fn default_worker_max_attempts() -> i32 {
    3
}

fn default_worker_max_run_seconds() -> u64 {
    300 // 5 minutes
}

fn default_worker_backoff_base_seconds() -> u64 {
    10
}

fn default_usage_reset_tick_seconds() -> u64 {
    3600 // 1 hour
}

fn default_mail_transport() -> String {
    "log".to_string()
}

fn default_mail_from_address() -> String {
    "noreply@ainstein.com".to_string()
}

fn default_mail_from_name() -> String {
    "Ainstein Platform".to_string()
}

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load environment file {path}: {source}")]
    EnvFile {
        path: PathBuf,
        source: dotenvy::Error,
    },
    #[error("invalid api bind address '{value}': {source}")]
    InvalidBindAddr {
        value: String,
        source: std::net::AddrParseError,
    },
    #[error("crypto key is missing; set AINSTEIN_CRYPTO_KEY environment variable")]
    MissingCryptoKey,
    #[error("crypto key is invalid base64: {error}")]
    InvalidCryptoKeyBase64 { error: String },
    #[error("crypto key must decode to exactly 32 bytes, got {length} bytes")]
    InvalidCryptoKeyLength { length: usize },
    #[error("JWT secret is missing; set AINSTEIN_JWT_SECRET environment variable")]
    MissingJwtSecret,
    #[error("JWT secret must be at least 32 bytes outside local/test profiles, got {length}")]
    WeakJwtSecret { length: usize },
    #[error("JWT TTL must be at least 60 seconds, got {value}")]
    InvalidJwtTtl { value: u64 },
    #[error("log format must be 'json' or 'pretty', got '{value}'")]
    InvalidLogFormat { value: String },
    #[error("{field} is not a valid URL '{value}': {source}")]
    InvalidUrl {
        field: &'static str,
        value: String,
        source: url::ParseError,
    },
    #[error("OpenAI timeout must be between 1 and 600 seconds, got {value}")]
    InvalidOpenAiTimeout { value: u64 },
    #[error("worker tick must be between 100 and 60000 ms, got {value}")]
    InvalidWorkerTick { value: u64 },
    #[error("worker concurrency must be between 1 and 64, got {value}")]
    InvalidWorkerConcurrency { value: usize },
    #[error("worker claim batch must be positive, got {value}")]
    InvalidWorkerClaimBatch { value: u64 },
    #[error("worker max attempts must be between 1 and 10, got {value}")]
    InvalidWorkerMaxAttempts { value: i32 },
    #[error("worker max run time must be at least 10 seconds, got {value}")]
    InvalidWorkerMaxRun { value: u64 },
    #[error("usage reset tick must be between 10 and 86400 seconds, got {value}")]
    InvalidUsageResetTick { value: u64 },
    #[error("mail transport must be 'log' or 'http', got '{value}'")]
    InvalidMailTransport { value: String },
    #[error("mail http transport requires AINSTEIN_MAIL_HTTP_ENDPOINT")]
    MissingMailEndpoint,
    #[error("invalid mail address: {value}")]
    InvalidMailAddress { value: String },
}

/// Minimal `local@domain.tld` shape check.
pub fn is_valid_email(value: &str) -> bool {
    let mut parts = value.split('@');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(local), Some(domain), None) => {
            !local.is_empty()
                && !local.contains(char::is_whitespace)
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && domain
                    .chars()
                    .all(|c| c.is_alphanumeric() || c == '.' || c == '-')
        }
        _ => false,
    }
}

fn split_list(value: String) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

/// Loads configuration using layered `.env` files and `AINSTEIN_*` env vars.
pub struct ConfigLoader {
    base_dir: PathBuf,
}

impl ConfigLoader {
    /// Creates a new loader rooted at the current working directory.
    pub fn new() -> Self {
        Self {
            base_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    /// Creates a loader rooted at the provided directory (useful for tests).
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Loads and validates the configuration.
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let (mut layered, profile_hint) = self.collect_layered_env()?;

        // Process environment wins over every file layer.
        for (key, value) in env::vars() {
            if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                layered.insert(stripped.to_string(), value);
            }
        }

        let profile = layered
            .remove("PROFILE")
            .filter(|v| !v.is_empty())
            .unwrap_or(profile_hint);
        let api_bind_addr = layered
            .remove("API_BIND_ADDR")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(default_api_bind_addr);
        let log_level = layered
            .remove("LOG_LEVEL")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(default_log_level);
        let log_format = layered
            .remove("LOG_FORMAT")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(default_log_format);
        let database_url = layered
            .remove("DATABASE_URL")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(default_database_url);
        let db_max_connections = layered
            .remove("DB_MAX_CONNECTIONS")
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(default_db_max_connections);
        let db_acquire_timeout_ms = layered
            .remove("DB_ACQUIRE_TIMEOUT_MS")
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(default_db_acquire_timeout_ms);
        let run_migrations = layered
            .remove("RUN_MIGRATIONS")
            .and_then(|v| v.parse().ok())
            .unwrap_or(true);

        let crypto_key = match non_empty(layered.remove("CRYPTO_KEY")) {
            Some(key_str) => {
                use base64::{Engine as _, engine::general_purpose};
                Some(general_purpose::STANDARD.decode(&key_str).map_err(|e| {
                    ConfigError::InvalidCryptoKeyBase64 {
                        error: e.to_string(),
                    }
                })?)
            }
            None => None,
        };

        let jwt_secret = non_empty(layered.remove("JWT_SECRET"));
        let jwt_ttl_seconds = layered
            .remove("JWT_TTL_SECONDS")
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(default_jwt_ttl_seconds);
        let cors_allowed_origins = layered
            .remove("CORS_ALLOWED_ORIGINS")
            .map(split_list)
            .unwrap_or_default();
        let public_base_url = layered
            .remove("PUBLIC_BASE_URL")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(default_public_base_url);

        let openai = OpenAiConfig {
            api_key: non_empty(layered.remove("OPENAI_API_KEY"))
                .or_else(|| non_empty(env::var("OPENAI_API_KEY").ok())),
            base_url: layered
                .remove("OPENAI_BASE_URL")
                .filter(|v| !v.is_empty())
                .unwrap_or_else(default_openai_base_url),
            timeout_seconds: layered
                .remove("OPENAI_TIMEOUT_SECONDS")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_openai_timeout_seconds),
        };

        let worker = WorkerConfig {
            tick_ms: layered
                .remove("WORKER_TICK_MS")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_worker_tick_ms),
            concurrency: layered
                .remove("WORKER_CONCURRENCY")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_worker_concurrency),
            claim_batch: layered
                .remove("WORKER_CLAIM_BATCH")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_worker_claim_batch),
            max_attempts: layered
                .remove("WORKER_MAX_ATTEMPTS")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_worker_max_attempts),
            max_run_seconds: layered
                .remove("WORKER_MAX_RUN_SECONDS")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_worker_max_run_seconds),
            backoff_base_seconds: layered
                .remove("WORKER_BACKOFF_BASE_SECONDS")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_worker_backoff_base_seconds),
        };

        let usage_reset = UsageResetConfig {
            tick_seconds: layered
                .remove("USAGE_RESET_TICK_SECONDS")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_usage_reset_tick_seconds),
        };

        let mail = MailConfig {
            transport: layered
                .remove("MAIL_TRANSPORT")
                .filter(|v| !v.is_empty())
                .unwrap_or_else(default_mail_transport),
            http_endpoint: non_empty(layered.remove("MAIL_HTTP_ENDPOINT")),
            http_token: non_empty(layered.remove("MAIL_HTTP_TOKEN")),
            from_address: layered
                .remove("MAIL_FROM_ADDRESS")
                .filter(|v| !v.is_empty())
                .unwrap_or_else(default_mail_from_address),
            from_name: layered
                .remove("MAIL_FROM_NAME")
                .filter(|v| !v.is_empty())
                .unwrap_or_else(default_mail_from_name),
            admin_notification_emails: layered
                .remove("ADMIN_NOTIFICATION_EMAILS")
                .map(split_list)
                .unwrap_or_default(),
        };

        let config = AppConfig {
            profile,
            api_bind_addr,
            log_level,
            log_format,
            database_url,
            db_max_connections,
            db_acquire_timeout_ms,
            run_migrations,
            crypto_key,
            jwt_secret,
            jwt_ttl_seconds,
            cors_allowed_origins,
            public_base_url,
            openai,
            worker,
            usage_reset,
            mail,
        };

        config.validate()?;

        match config.bind_addr() {
            Ok(_) => Ok(config),
            Err(source) => Err(ConfigError::InvalidBindAddr {
                value: config.api_bind_addr.clone(),
                source,
            }),
        }
    }

    fn collect_layered_env(&self) -> Result<(BTreeMap<String, String>, String), ConfigError> {
        let mut values = BTreeMap::new();

        self.merge_dotenv(self.base_dir.join(".env"), &mut values)?;
        self.merge_dotenv(self.base_dir.join(".env.local"), &mut values)?;

        let profile = env::var(format!("{ENV_PREFIX}PROFILE"))
            .ok()
            .filter(|v| !v.is_empty())
            .or_else(|| values.get("PROFILE").cloned())
            .unwrap_or_else(default_profile);

        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}", &profile)),
            &mut values,
        )?;
        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}.local", &profile)),
            &mut values,
        )?;

        Ok((values, profile))
    }

    fn merge_dotenv(
        &self,
        path: PathBuf,
        values: &mut BTreeMap<String, String>,
    ) -> Result<(), ConfigError> {
        match dotenvy::from_path_iter(&path) {
            Ok(iter) => {
                for item in iter {
                    let (key, value) = item.map_err(|source| ConfigError::EnvFile {
                        path: path.clone(),
                        source,
                    })?;
                    if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                        values.insert(stripped.to_string(), value);
                    }
                }
                Ok(())
            }
            Err(dotenvy::Error::Io(ref io_err))
                if io_err.kind() == std::io::ErrorKind::NotFound =>
            {
                Ok(())
            }
            Err(err) => Err(ConfigError::EnvFile { path, source: err }),
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> AppConfig {
        AppConfig {
            crypto_key: Some(vec![7u8; 32]),
            jwt_secret: Some("local-secret".to_string()),
            ..AppConfig::default()
        }
    }

    #[test]
    fn default_config_requires_crypto_key() {
        let config = AppConfig::default();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingCryptoKey)
        ));
    }

    #[test]
    fn short_crypto_key_is_rejected() {
        let config = AppConfig {
            crypto_key: Some(vec![1u8; 16]),
            ..valid_config()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidCryptoKeyLength { length: 16 })
        ));
    }

    #[test]
    fn weak_jwt_secret_allowed_only_in_development() {
        assert!(valid_config().validate().is_ok());

        let production = AppConfig {
            profile: "production".to_string(),
            ..valid_config()
        };
        assert!(matches!(
            production.validate(),
            Err(ConfigError::WeakJwtSecret { .. })
        ));
    }

    #[test]
    fn worker_bounds_are_enforced() {
        let mut config = valid_config();
        config.worker.concurrency = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidWorkerConcurrency { value: 0 })
        ));

        let mut config = valid_config();
        config.worker.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn http_mail_transport_needs_endpoint() {
        let mut config = valid_config();
        config.mail.transport = "http".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingMailEndpoint)
        ));

        config.mail.http_endpoint = Some("https://mail.example.com/send".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn redacted_json_hides_secrets() {
        let mut config = valid_config();
        config.openai.api_key = Some("sk-live-secret".to_string());
        let json = config.redacted_json().unwrap();
        assert!(!json.contains("sk-live-secret"));
        assert!(!json.contains("local-secret"));
        assert!(json.contains(REDACTED));
    }

    #[test]
    fn email_shape_check() {
        assert!(is_valid_email("ops@ainstein.com"));
        assert!(!is_valid_email("ops@localhost"));
        assert!(!is_valid_email("no-at-sign.com"));
        assert!(!is_valid_email("a@b@c.com"));
    }
}
