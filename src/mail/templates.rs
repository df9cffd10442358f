//! Transactional mail templates.
//!
//! Every template renders both a plain-text and an HTML body.

use std::collections::BTreeMap;

pub const PLATFORM_SUFFIX: &str = "Ainstein Platform";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMail {
    pub subject: String,
    pub text: String,
    pub html: String,
}

/// Category of an operator notification; selects the subject emoji.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminNotificationKind {
    NewUser,
    HighUsage,
    Error,
    Maintenance,
    Security,
    Other(String),
}

impl AdminNotificationKind {
    pub fn parse(value: &str) -> Self {
        match value {
            "new_user" => Self::NewUser,
            "high_usage" => Self::HighUsage,
            "error" => Self::Error,
            "maintenance" => Self::Maintenance,
            "security" => Self::Security,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::NewUser => "new_user",
            Self::HighUsage => "high_usage",
            Self::Error => "error",
            Self::Maintenance => "maintenance",
            Self::Security => "security",
            Self::Other(other) => other,
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            Self::NewUser => "👥",
            Self::HighUsage => "⚡",
            Self::Error => "🚨",
            Self::Maintenance => "🔧",
            Self::Security => "🛡️",
            Self::Other(_) => "📢",
        }
    }
}

/// Generation facts shown in the completion mail
#[derive(Debug, Clone)]
pub struct GenerationSummary<'a> {
    pub recipient_name: &'a str,
    pub page_url: &'a str,
    pub prompt_type: &'a str,
    pub tokens_used: i64,
    pub error: Option<&'a str>,
    pub link: &'a str,
}

fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

fn html_layout(heading: &str, paragraphs: &[String], action: Option<(&str, &str)>) -> String {
    let mut html = format!(
        "<!DOCTYPE html><html><body style=\"font-family:Arial,sans-serif;color:#1f2937\">\
         <h1 style=\"font-size:20px\">{}</h1>",
        escape_html(heading)
    );
    for paragraph in paragraphs {
        html.push_str(&format!("<p>{}</p>", escape_html(paragraph)));
    }
    if let Some((label, url)) = action {
        html.push_str(&format!(
            "<p><a href=\"{}\" style=\"background:#2563eb;color:#fff;padding:10px 16px;border-radius:6px;text-decoration:none\">{}</a></p>",
            escape_html(url),
            escape_html(label)
        ));
    }
    html.push_str(&format!(
        "<p style=\"color:#6b7280;font-size:12px\">{}</p></body></html>",
        PLATFORM_SUFFIX
    ));
    html
}

pub fn welcome(name: &str, tenant_name: Option<&str>, dashboard_url: &str) -> RenderedMail {
    let mut paragraphs = vec![
        "Thanks for joining Ainstein Platform. Your account is ready and you can start generating SEO content right away."
            .to_string(),
    ];
    if let Some(tenant) = tenant_name {
        paragraphs.push(format!("Your workspace: {tenant}"));
    }
    paragraphs.push(format!("Open your dashboard: {dashboard_url}"));

    let heading = format!("Welcome, {name}!");
    RenderedMail {
        subject: format!("Welcome to {PLATFORM_SUFFIX}! 🚀"),
        text: format!("{heading}\n\n{}\n", paragraphs.join("\n\n")),
        html: html_layout(&heading, &paragraphs, Some(("Go to dashboard", dashboard_url))),
    }
}

pub fn generation_complete(summary: &GenerationSummary<'_>, success: bool) -> RenderedMail {
    let subject = if success {
        format!("Content Generation Complete ✅ - {PLATFORM_SUFFIX}")
    } else {
        format!("Content Generation Failed ❌ - {PLATFORM_SUFFIX}")
    };

    let mut paragraphs = vec![
        format!("Hello {},", summary.recipient_name),
        format!("Page: {}", summary.page_url),
        format!("Prompt type: {}", summary.prompt_type),
    ];
    if success {
        paragraphs.push("Your content has been generated and is ready for review.".to_string());
        paragraphs.push(format!("Tokens used: {}", summary.tokens_used));
    } else {
        paragraphs.push("Unfortunately the content generation could not be completed.".to_string());
        paragraphs.push(format!("Error: {}", summary.error.unwrap_or("Unknown error")));
    }
    paragraphs.push(format!("View the generation: {}", summary.link));

    let heading = if success {
        "Your content is ready"
    } else {
        "Content generation failed"
    };
    RenderedMail {
        subject,
        text: format!("{heading}\n\n{}\n", paragraphs.join("\n\n")),
        html: html_layout(heading, &paragraphs, Some(("View generation", summary.link))),
    }
}

pub fn admin_notification(
    kind: &AdminNotificationKind,
    title: &str,
    message: &str,
    data: &BTreeMap<String, String>,
    admin_url: &str,
) -> RenderedMail {
    let mut paragraphs = vec![message.to_string()];
    for (key, value) in data {
        paragraphs.push(format!("{key}: {value}"));
    }

    RenderedMail {
        subject: format!("{} {title} - {PLATFORM_SUFFIX}", kind.emoji()),
        text: format!("{title}\n\n{}\n\nAdmin panel: {admin_url}\n", paragraphs.join("\n")),
        html: html_layout(title, &paragraphs, Some(("Open admin panel", admin_url))),
    }
}

pub fn test_message() -> RenderedMail {
    let body = "This is a test email from Ainstein Platform. If you receive this, email configuration is working correctly.";
    RenderedMail {
        subject: format!("Test Email - {PLATFORM_SUFFIX}"),
        text: body.to_string(),
        html: html_layout("Test email", &[body.to_string()], None),
    }
}
