//! # AI Provider Integration
//!
//! Chat-completion providers behind the [`LlmProvider`] trait, plus the
//! [`AiService`] that resolves credentials from platform settings.

pub mod mock;
pub mod openai;
pub mod service;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{ApiError, provider_error, service_unavailable};
use crate::settings::SettingsError;

pub use mock::MockProvider;
pub use openai::OpenAiProvider;
pub use service::{AiService, GeneratedContent};

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const FALLBACK_MODELS: &[&str] = &["gpt-3.5-turbo", "gpt-4", "gpt-4o"];

/// Keys that route requests to [`MockProvider`] instead of a real API.
pub const PLACEHOLDER_KEYS: &[&str] = &[
    "sk-test",
    "sk-test-key",
    "sk-test-key-replace-with-real-openai-key",
    "your-openai-api-key-here",
    "fake-key",
    "demo-key",
];

pub fn is_placeholder_key(key: &str) -> bool {
    PLACEHOLDER_KEYS.contains(&key)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatCompletion {
    pub content: String,
    /// Provider-reported usage, when available.
    pub total_tokens: Option<u64>,
    pub model: String,
}

/// AI provider failures
#[derive(Debug, Error)]
pub enum AiError {
    #[error("OpenAI API key not configured in platform settings or environment")]
    NotConfigured,

    #[error("provider rejected credentials: {0}")]
    Unauthorized(String),

    #[error("rate limited by provider")]
    RateLimited { retry_after: Option<u64> },

    #[error("transient provider failure: {0}")]
    Transient(String),

    #[error("provider request failed with status {status}: {message}")]
    Permanent { status: u16, message: String },

    #[error("invalid provider response: {0}")]
    InvalidResponse(String),

    #[error(transparent)]
    Settings(#[from] SettingsError),
}

impl AiError {
    /// Whether retrying the same request later could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AiError::RateLimited { .. } | AiError::Transient(_))
    }
}

impl From<reqwest::Error> for AiError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            AiError::InvalidResponse(error.to_string())
        } else {
            AiError::Transient(error.to_string())
        }
    }
}

impl From<AiError> for ApiError {
    fn from(error: AiError) -> Self {
        match error {
            AiError::NotConfigured => service_unavailable("AI provider is not configured"),
            AiError::Settings(err) => err.into(),
            AiError::RateLimited { retry_after } => {
                let api_error = provider_error("AI provider rate limit reached");
                match retry_after {
                    Some(seconds) => api_error.with_retry_after(seconds),
                    None => api_error,
                }
            }
            other => {
                tracing::warn!(error = %other, "AI provider request failed");
                provider_error(&format!("Content generation failed: {other}"))
            }
        }
    }
}

#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn chat(&self, request: &ChatRequest) -> Result<ChatCompletion, AiError>;

    async fn list_models(&self) -> Result<Vec<String>, AiError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn placeholder_keys_are_recognised() {
        assert!(is_placeholder_key("sk-test"));
        assert!(is_placeholder_key("demo-key"));
        assert!(!is_placeholder_key("sk-proj-real"));
    }

    #[test]
    fn retryable_classification() {
        assert!(AiError::Transient("timeout".into()).is_retryable());
        assert!(AiError::RateLimited { retry_after: None }.is_retryable());
        assert!(!AiError::Unauthorized("bad key".into()).is_retryable());
        assert!(!AiError::NotConfigured.is_retryable());
    }

    #[test]
    fn api_error_mapping() {
        let err: ApiError = AiError::Permanent {
            status: 400,
            message: "bad request".into(),
        }
        .into();
        assert_eq!(err.status, StatusCode::BAD_GATEWAY);
        assert_eq!(&*err.code, "PROVIDER_ERROR");

        let err: ApiError = AiError::RateLimited {
            retry_after: Some(20),
        }
        .into();
        assert_eq!(err.retry_after, Some(20));

        let err: ApiError = AiError::NotConfigured.into();
        assert_eq!(err.status, StatusCode::SERVICE_UNAVAILABLE);
    }
}
