//! Prompt template rendering.
//!
//! Templates carry `{{name}}` placeholders (the single-brace `{name}` form is
//! also accepted when rendering generation prompts).

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;

use crate::models::page::Model as PageModel;

pub const MISSING_VARIABLE: &str = "[VARIABLE_NOT_PROVIDED]";

fn placeholder_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"\{\{\s*([^{}]+?)\s*\}\}").ok())
        .as_ref()
}

/// Distinct placeholder names in order of first appearance.
pub fn extract_placeholders(template: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    let Some(pattern) = placeholder_pattern() else {
        return names;
    };
    for captures in pattern.captures_iter(template) {
        let name = captures[1].to_string();
        if !names.contains(&name) {
            names.push(name);
        }
    }
    names
}

/// Replace `{{key}}` and `{key}` for every provided variable. Unknown
/// placeholders are left as they are.
pub fn replace_variables(template: &str, variables: &BTreeMap<String, String>) -> String {
    let mut rendered = template.to_string();
    for (key, value) in variables {
        rendered = rendered.replace(&format!("{{{{{key}}}}}", key = key), value);
        rendered = rendered.replace(&format!("{{{key}}}", key = key), value);
    }
    rendered
}

/// Replace `{{key}}` placeholders and mark any that remain unresolved.
pub fn fill_template(template: &str, variables: &BTreeMap<String, String>) -> String {
    let mut rendered = template.to_string();
    for (key, value) in variables {
        rendered = rendered.replace(&format!("{{{{{key}}}}}", key = key), value);
    }
    match placeholder_pattern() {
        Some(pattern) => pattern.replace_all(&rendered, MISSING_VARIABLE).into_owned(),
        None => rendered,
    }
}

/// Full prompt sent to the provider for one generation job.
pub fn build_generation_prompt(
    template: &str,
    variables: &BTreeMap<String, String>,
    page: &PageModel,
    additional_instructions: Option<&str>,
) -> String {
    let mut prompt = replace_variables(template, variables);

    prompt.push_str("\n\nPage Context:\n");
    prompt.push_str(&format!("URL Path: {}\n", page.url_path));
    prompt.push_str(&format!("Target Keyword: {}\n", page.keyword));
    if let Some(title) = page.metadata_str("meta_title") {
        prompt.push_str(&format!("Meta Title: {title}\n"));
    }
    if let Some(description) = page.metadata_str("meta_description") {
        prompt.push_str(&format!("Meta Description: {description}\n"));
    }
    if let Some(brief) = page.metadata_str("content_brief") {
        prompt.push_str(&format!("Content Brief: {brief}\n"));
    }

    if let Some(extra) = additional_instructions.filter(|text| !text.trim().is_empty()) {
        prompt.push_str(&format!("\n\nAdditional instructions: {extra}"));
    }

    prompt
}

/// Rough token count: one token per four bytes, rounded up.
pub fn estimate_tokens(text: &str) -> i64 {
    text.len().div_ceil(4) as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use uuid::Uuid;

    fn vars(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn page(metadata: Option<serde_json::Value>) -> PageModel {
        let now = Utc::now();
        PageModel {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            url_path: "/blog/rust".into(),
            keyword: "rust async".into(),
            category: None,
            language: "en".into(),
            cms_type: None,
            cms_page_id: None,
            status: "active".into(),
            priority: 5,
            metadata,
            last_synced: None,
            created_at: now.into(),
            updated_at: now.into(),
        }
    }

    #[test]
    fn placeholders_are_deduplicated_in_order() {
        assert_eq!(
            extract_placeholders("{{keyword}} and {{ tone }} then {{keyword}}"),
            vec!["keyword".to_string(), "tone".to_string()]
        );
        assert!(extract_placeholders("no variables").is_empty());
    }

    #[test]
    fn both_brace_styles_are_replaced() {
        let rendered = replace_variables("Write about {{topic}} in {tone} voice", &vars(&[
            ("topic", "tokio"),
            ("tone", "friendly"),
        ]));
        assert_eq!(rendered, "Write about tokio in friendly voice");
    }

    #[test]
    fn unresolved_placeholders_are_marked() {
        let rendered = fill_template("{{a}} / {{b}}", &vars(&[("a", "x")]));
        assert_eq!(rendered, format!("x / {MISSING_VARIABLE}"));
    }

    #[test]
    fn generation_prompt_appends_page_context() {
        let page = page(Some(json!({
            "meta_title": "Async Rust",
            "content_brief": "Beginner friendly",
            "meta_description": ""
        })));
        let prompt = build_generation_prompt(
            "Article on {{keyword}}",
            &vars(&[("keyword", "rust async")]),
            &page,
            Some("Use short paragraphs"),
        );

        assert_eq!(
            prompt,
            "Article on rust async\n\nPage Context:\nURL Path: /blog/rust\nTarget Keyword: rust async\nMeta Title: Async Rust\nContent Brief: Beginner friendly\n\n\nAdditional instructions: Use short paragraphs"
        );
    }

    #[test]
    fn token_estimate_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }
}
