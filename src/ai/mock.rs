//! Offline provider used with placeholder API keys.

use async_trait::async_trait;

use super::{AiError, ChatCompletion, ChatRequest, LlmProvider};
use crate::templating::estimate_tokens;

const EXCERPT_CHARS: usize = 80;

/// Returns canned, deterministic completions without network access.
#[derive(Debug, Clone, Default)]
pub struct MockProvider;

impl MockProvider {
    fn render(prompt: &str) -> String {
        let excerpt: String = prompt
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .unwrap_or("the requested topic")
            .chars()
            .take(EXCERPT_CHARS)
            .collect();

        format!(
            "1. {excerpt}: a practical guide\n\
             2. Everything you need to know about {excerpt}\n\
             3. {excerpt} explained with clear examples\n\n\
             This is demo content generated without contacting an AI provider. \
             Configure a real OpenAI API key in the platform settings to produce live content."
        )
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatCompletion, AiError> {
        let prompt = request
            .messages
            .iter()
            .rev()
            .find(|message| message.role == "user")
            .map(|message| message.content.as_str())
            .unwrap_or_default();
        let content = Self::render(prompt);
        let total_tokens = estimate_tokens(&format!("{prompt}{content}")) as u64;

        Ok(ChatCompletion {
            content,
            total_tokens: Some(total_tokens),
            model: request.model.clone(),
        })
    }

    async fn list_models(&self) -> Result<Vec<String>, AiError> {
        Ok(vec![
            "gpt-3.5-turbo".to_string(),
            "gpt-4".to_string(),
            "gpt-4o".to_string(),
            "gpt-4o-mini".to_string(),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::ChatMessage;

    #[tokio::test]
    async fn completions_are_deterministic() {
        let request = ChatRequest {
            model: "gpt-4o-mini".into(),
            messages: vec![
                ChatMessage::system("be helpful"),
                ChatMessage::user("Rust ownership\nmore detail"),
            ],
            max_tokens: 50,
            temperature: 0.0,
        };

        let first = MockProvider.chat(&request).await.unwrap();
        let second = MockProvider.chat(&request).await.unwrap();
        assert_eq!(first, second);
        assert!(first.content.starts_with("1. Rust ownership"));
        assert!(first.total_tokens.unwrap() > 0);
    }
}
