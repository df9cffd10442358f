//! Content generation on top of the configured provider.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};
use utoipa::ToSchema;

use super::{
    AiError, ChatMessage, ChatRequest, DEFAULT_MODEL, FALLBACK_MODELS, LlmProvider, MockProvider,
    OpenAiProvider, is_placeholder_key,
};
use crate::config::OpenAiConfig;
use crate::settings::PlatformSettings;
use crate::templating::{estimate_tokens, fill_template};

pub const SYSTEM_PROMPT: &str = "You are an expert content writer specialized in SEO-optimized content creation. Provide high-quality, engaging content based on the user's requirements.";
pub const COST_PER_TOKEN: f64 = 0.000002;
pub const META_TITLE_MAX_CHARS: usize = 60;
pub const META_DESCRIPTION_MAX_CHARS: usize = 155;

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct GeneratedContent {
    pub content: String,
    pub tokens_used: u64,
    pub model: String,
    pub cost: f64,
}

struct Resolved {
    provider: Arc<dyn LlmProvider>,
    model: String,
    max_tokens: u32,
    temperature: f64,
}

/// Resolves credentials and generation parameters from platform settings on
/// every call, so a settings change takes effect without a restart.
#[derive(Clone)]
pub struct AiService {
    settings: PlatformSettings,
    config: OpenAiConfig,
    http: reqwest::Client,
    provider_override: Option<Arc<dyn LlmProvider>>,
}

impl AiService {
    pub fn new(settings: PlatformSettings, config: OpenAiConfig) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;
        Ok(Self {
            settings,
            config,
            http,
            provider_override: None,
        })
    }

    /// Route every request to `provider` regardless of the configured key.
    pub fn with_provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.provider_override = Some(provider);
        self
    }

    fn provider_for_key(&self, key: &str) -> Arc<dyn LlmProvider> {
        if is_placeholder_key(key) {
            info!("Using mock AI provider for placeholder API key");
            Arc::new(MockProvider)
        } else {
            Arc::new(OpenAiProvider::new(
                self.http.clone(),
                self.config.base_url.clone(),
                key,
            ))
        }
    }

    async fn resolve(&self) -> Result<Resolved, AiError> {
        let settings = self.settings.get_all().await?;

        let provider = match &self.provider_override {
            Some(provider) => Arc::clone(provider),
            None => {
                let key = settings
                    .openai_api_key
                    .clone()
                    .filter(|k| !k.trim().is_empty())
                    .or_else(|| self.config.api_key.clone().filter(|k| !k.trim().is_empty()))
                    .ok_or(AiError::NotConfigured)?;
                self.provider_for_key(&key)
            }
        };

        let model = if settings.openai_default_model.trim().is_empty() {
            DEFAULT_MODEL.to_string()
        } else {
            settings.openai_default_model.clone()
        };

        Ok(Resolved {
            provider,
            model,
            max_tokens: settings.openai_max_tokens.max(1) as u32,
            temperature: settings.openai_temperature,
        })
    }

    /// Model new generations are recorded against.
    pub async fn default_model(&self) -> Result<String, AiError> {
        let settings = self.settings.get_all().await?;
        if settings.openai_default_model.trim().is_empty() {
            Ok(DEFAULT_MODEL.to_string())
        } else {
            Ok(settings.openai_default_model.clone())
        }
    }

    async fn complete(
        &self,
        prompt: String,
        model: Option<&str>,
    ) -> Result<GeneratedContent, AiError> {
        let resolved = self.resolve().await?;
        let request = ChatRequest {
            model: model.map(str::to_string).unwrap_or(resolved.model),
            messages: vec![ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(prompt)],
            max_tokens: resolved.max_tokens,
            temperature: resolved.temperature,
        };

        let completion = resolved.provider.chat(&request).await?;
        let content = completion.content.trim().to_string();
        let tokens_used = completion.total_tokens.unwrap_or_else(|| {
            let text = request
                .messages
                .iter()
                .map(|m| m.content.as_str())
                .collect::<String>();
            estimate_tokens(&format!("{text}{content}")) as u64
        });

        Ok(GeneratedContent {
            content,
            tokens_used,
            model: request.model,
            cost: tokens_used as f64 * COST_PER_TOKEN,
        })
    }

    /// Single completion for a fully rendered prompt.
    pub async fn generate_simple_content(&self, prompt: &str) -> Result<String, AiError> {
        self.complete(prompt.to_string(), None)
            .await
            .map(|generated| generated.content)
    }

    pub async fn generate_content(
        &self,
        template: &str,
        variables: &BTreeMap<String, String>,
        model: Option<&str>,
    ) -> Result<GeneratedContent, AiError> {
        self.complete(fill_template(template, variables), model).await
    }

    pub async fn generate_meta_titles(
        &self,
        keyword: &str,
        category: Option<&str>,
        count: usize,
    ) -> Result<Vec<String>, AiError> {
        let mut prompt = format!(
            "Generate {count} SEO-optimized meta titles for a page targeting the keyword: '{keyword}'"
        );
        if let Some(category) = category {
            prompt.push_str(&format!(" in the {category} category"));
        }
        prompt.push_str(&format!(
            ". Each title should be:\n- Maximum {META_TITLE_MAX_CHARS} characters\n- Include the primary keyword naturally\n- Be compelling and click-worthy\n- Optimized for search engines\n\nFormat as a numbered list."
        ));

        let generated = self.complete(prompt, None).await?;
        Ok(parse_list(&generated.content, META_TITLE_MAX_CHARS, count))
    }

    pub async fn generate_meta_descriptions(
        &self,
        keyword: &str,
        category: Option<&str>,
        count: usize,
    ) -> Result<Vec<String>, AiError> {
        let mut prompt = format!(
            "Generate {count} SEO-optimized meta descriptions for a page targeting the keyword: '{keyword}'"
        );
        if let Some(category) = category {
            prompt.push_str(&format!(" in the {category} category"));
        }
        prompt.push_str(&format!(
            ". Each description should be:\n- Maximum {META_DESCRIPTION_MAX_CHARS} characters\n- Include the primary keyword naturally\n- Be compelling with a call-to-action\n- Encourage clicks from search results\n\nFormat as a numbered list."
        ));

        let generated = self.complete(prompt, None).await?;
        Ok(parse_list(&generated.content, META_DESCRIPTION_MAX_CHARS, count))
    }

    pub async fn generate_blog_article(
        &self,
        keyword: &str,
        word_count: u32,
    ) -> Result<GeneratedContent, AiError> {
        let prompt = format!(
            "Write a comprehensive blog article of approximately {word_count} words on the topic: '{keyword}'.\n\n\
             Structure the article with:\n\
             - Engaging introduction with the keyword\n\
             - 3-4 main sections with H2 subheadings\n\
             - Natural keyword integration (2-3% density)\n\
             - Practical tips or actionable advice\n\
             - Conclusion with a call-to-action\n\n\
             Make it informative, engaging, and SEO-optimized."
        );
        self.complete(prompt, None).await
    }

    /// GPT model ids offered by the provider, or a fixed list when the
    /// provider cannot be reached.
    pub async fn available_models(&self) -> Vec<String> {
        let listed = match self.resolve().await {
            Ok(resolved) => resolved.provider.list_models().await,
            Err(err) => Err(err),
        };

        match listed {
            Ok(models) => {
                let mut models: Vec<String> =
                    models.into_iter().filter(|id| id.contains("gpt")).collect();
                models.sort();
                models
            }
            Err(err) => {
                warn!(error = %err, "Failed to fetch AI models, using fallback list");
                FALLBACK_MODELS.iter().map(|m| m.to_string()).collect()
            }
        }
    }

    /// Whether `key` (or the configured key when `None`) can list models.
    pub async fn validate_api_key(&self, key: Option<&str>) -> bool {
        let provider = match key {
            Some(key) if self.provider_override.is_none() => self.provider_for_key(key),
            _ => match self.resolve().await {
                Ok(resolved) => resolved.provider,
                Err(_) => return false,
            },
        };
        provider.list_models().await.is_ok()
    }
}

/// Lines of a list completion with numbering, bullets and quotes removed,
/// each cut to `max_chars`.
pub fn parse_list(content: &str, max_chars: usize, count: usize) -> Vec<String> {
    content
        .lines()
        .map(strip_list_marker)
        .filter(|line| !line.is_empty())
        .map(|line| line.chars().take(max_chars).collect::<String>().trim().to_string())
        .take(count)
        .collect()
}

fn strip_list_marker(line: &str) -> &str {
    let line = line.trim();
    let without_number = match line.find(|c: char| !c.is_ascii_digit()) {
        Some(idx) if idx > 0 && line[idx..].starts_with(['.', ')']) => &line[idx + 1..],
        _ => line,
    };
    without_number
        .trim_start_matches(['-', '*', '•'])
        .trim()
        .trim_matches('"')
        .trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::CryptoKey;
    use crate::db::test_connection;
    use crate::settings::SettingsUpdate;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn service(base_url: String, env_key: Option<&str>) -> AiService {
        let db = test_connection().await;
        let settings = PlatformSettings::new(db, CryptoKey::new(vec![1u8; 32]).unwrap());
        AiService::new(
            settings,
            OpenAiConfig {
                api_key: env_key.map(str::to_string),
                base_url,
                timeout_seconds: 5,
            },
        )
        .unwrap()
    }

    #[test]
    fn parse_list_strips_markers_and_truncates() {
        let content = "Here you go:\n1. First title\n2) \"Second title\"\n- third one that is far too long for the limit\n";
        let parsed = parse_list(content, 12, 3);
        assert_eq!(parsed, vec!["Here you go:", "First title", "Second title"]);

        let parsed = parse_list("- alpha\n* beta\n• gamma", 60, 5);
        assert_eq!(parsed, vec!["alpha", "beta", "gamma"]);
    }

    #[tokio::test]
    async fn missing_key_is_not_configured() {
        let ai = service("http://127.0.0.1:9".into(), None).await;
        assert!(matches!(
            ai.generate_simple_content("hi").await,
            Err(AiError::NotConfigured)
        ));
        assert_eq!(
            ai.available_models().await,
            vec!["gpt-3.5-turbo", "gpt-4", "gpt-4o"]
        );
    }

    #[tokio::test]
    async fn placeholder_key_uses_mock_provider() {
        let ai = service("http://127.0.0.1:9".into(), Some("sk-test")).await;
        let content = ai.generate_simple_content("Rust tips").await.unwrap();
        assert!(content.contains("Rust tips"));
        assert!(ai.validate_api_key(None).await);
    }

    #[tokio::test]
    async fn settings_key_takes_precedence_and_fills_template() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(wiremock::matchers::bearer_token("sk-from-settings"))
            .and(body_partial_json(json!({
                "model": "gpt-4o",
                "messages": [
                    { "role": "system", "content": SYSTEM_PROMPT },
                    { "role": "user", "content": "About tokio and [VARIABLE_NOT_PROVIDED]" }
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{ "message": { "content": "  Generated body  " } }],
                "usage": { "total_tokens": 1000 }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let ai = service(server.uri(), Some("sk-from-env")).await;
        ai.settings
            .update(SettingsUpdate {
                openai_api_key: Some("sk-from-settings".into()),
                openai_default_model: Some("gpt-4o".into()),
                ..Default::default()
            })
            .await
            .unwrap();

        let variables = BTreeMap::from([("topic".to_string(), "tokio".to_string())]);
        let generated = ai
            .generate_content("About {{topic}} and {{missing}}", &variables, None)
            .await
            .unwrap();
        assert_eq!(generated.content, "Generated body");
        assert_eq!(generated.tokens_used, 1000);
        assert_eq!(generated.model, "gpt-4o");
        assert!((generated.cost - 0.002).abs() < 1e-9);
    }

    #[tokio::test]
    async fn available_models_filters_and_sorts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/models"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{ "id": "gpt-4o" }, { "id": "dall-e-3" }, { "id": "gpt-3.5-turbo" }]
            })))
            .mount(&server)
            .await;

        let ai = service(server.uri(), Some("sk-real")).await;
        assert_eq!(ai.available_models().await, vec!["gpt-3.5-turbo", "gpt-4o"]);
        assert!(ai.validate_api_key(Some("sk-other")).await);
    }

    #[tokio::test]
    async fn meta_titles_are_parsed_from_numbered_list() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{ "message": { "content": "1. Tokio Guide\n2. Async Rust Basics\n3. Runtime Deep Dive\n4. Extra" } }],
                "usage": { "total_tokens": 120 }
            })))
            .mount(&server)
            .await;

        let ai = service(server.uri(), Some("sk-real")).await;
        let titles = ai
            .generate_meta_titles("tokio", Some("rust"), 3)
            .await
            .unwrap();
        assert_eq!(titles, vec!["Tokio Guide", "Async Rust Basics", "Runtime Deep Dive"]);

        let descriptions = ai.generate_meta_descriptions("tokio", None, 2).await.unwrap();
        assert_eq!(descriptions.len(), 2);

        let article = ai.generate_blog_article("tokio", 800).await.unwrap();
        assert_eq!(article.tokens_used, 120);
    }
}
