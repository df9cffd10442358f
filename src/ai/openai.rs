//! OpenAI chat-completions client

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};

use super::{AiError, ChatCompletion, ChatRequest, LlmProvider};

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    total_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct ModelList {
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

pub struct OpenAiProvider {
    client: Client,
    base_url: String,
    api_key: String,
}

impl OpenAiProvider {
    pub fn new(client: Client, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }
}

/// Map a non-success response onto the provider error taxonomy.
async fn error_from_response(response: reqwest::Response) -> AiError {
    let status = response.status();
    let retry_after = response
        .headers()
        .get("Retry-After")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok());
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorEnvelope>(&body)
        .map(|envelope| envelope.error.message)
        .unwrap_or(body);

    match status {
        StatusCode::UNAUTHORIZED => AiError::Unauthorized(message),
        StatusCode::TOO_MANY_REQUESTS => AiError::RateLimited { retry_after },
        s if s.is_server_error() || s == StatusCode::REQUEST_TIMEOUT => {
            AiError::Transient(format!("status {}: {}", s.as_u16(), message))
        }
        s => AiError::Permanent {
            status: s.as_u16(),
            message,
        },
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatCompletion, AiError> {
        debug!(model = %request.model, messages = request.messages.len(), "Sending chat completion request");

        let response = self
            .client
            .post(self.endpoint("chat/completions"))
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            let error = error_from_response(response).await;
            warn!(error = %error, "OpenAI chat completion failed");
            return Err(error);
        }

        let body: CompletionResponse = response.json().await?;
        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| AiError::InvalidResponse("completion contained no choices".into()))?;

        Ok(ChatCompletion {
            content,
            total_tokens: body.usage.map(|usage| usage.total_tokens),
            model: body.model.unwrap_or_else(|| request.model.clone()),
        })
    }

    async fn list_models(&self) -> Result<Vec<String>, AiError> {
        let response = self
            .client
            .get(self.endpoint("models"))
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let list: ModelList = response.json().await?;
        Ok(list.data.into_iter().map(|entry| entry.id).collect())
    }
}
