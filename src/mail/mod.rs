//! # Transactional Mail
//!
//! A [`Mailer`] delivers rendered messages; the [`Notifier`] decides who gets
//! what. Delivery failures are logged by the notifier and never propagate to
//! the operation that triggered the mail.

pub mod templates;
pub mod transport;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use sea_orm::DatabaseConnection;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::{AppConfig, MailConfig};
use crate::models::{content_generation, page, tenant, user};
use crate::repositories::UserRepository;
use crate::settings::PlatformSettings;

pub use templates::{AdminNotificationKind, RenderedMail};
pub use transport::{HttpMailer, LogMailer, MemoryMailer};

/// Usage share that triggers the operator alert.
pub const HIGH_USAGE_THRESHOLD: f64 = 80.0;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("mail transport error: {0}")]
    Transport(String),
    #[error("mail request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("mail provider rejected message with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("message has no recipients")]
    NoRecipients,
    #[error("unknown mail transport '{0}'")]
    UnknownTransport(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sender {
    pub email: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipient {
    pub email: String,
    pub name: Option<String>,
}

impl Recipient {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            name: None,
        }
    }

    pub fn named(email: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            name: Some(name.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub from: Sender,
    pub to: Vec<Recipient>,
    pub subject: String,
    pub text: String,
    pub html: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    fn name(&self) -> &'static str;

    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError>;
}

/// Transport selected by `MAIL_TRANSPORT`.
pub fn build_mailer(config: &MailConfig) -> Result<Arc<dyn Mailer>, MailError> {
    match config.transport.as_str() {
        "log" => Ok(Arc::new(LogMailer)),
        "http" => {
            let endpoint = config
                .http_endpoint
                .clone()
                .ok_or_else(|| MailError::Transport("MAIL_HTTP_ENDPOINT is not set".into()))?;
            Ok(Arc::new(HttpMailer::new(endpoint, config.http_token.clone())?))
        }
        other => Err(MailError::UnknownTransport(other.to_string())),
    }
}

/// Sends the platform's notification mails
#[derive(Clone)]
pub struct Notifier {
    mailer: Arc<dyn Mailer>,
    db: DatabaseConnection,
    settings: PlatformSettings,
    config: Arc<AppConfig>,
}

impl Notifier {
    pub fn new(
        mailer: Arc<dyn Mailer>,
        db: DatabaseConnection,
        settings: PlatformSettings,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            mailer,
            db,
            settings,
            config,
        }
    }

    pub fn mailer(&self) -> &Arc<dyn Mailer> {
        &self.mailer
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.public_base_url.trim_end_matches('/'), path)
    }

    async fn sender(&self) -> Sender {
        let mut sender = Sender {
            email: self.config.mail.from_address.clone(),
            name: self.config.mail.from_name.clone(),
        };
        match self.settings.get_all().await {
            Ok(settings) => {
                if let Some(address) = settings.mail_from_address.clone() {
                    sender.email = address;
                }
                if let Some(name) = settings.mail_from_name.clone() {
                    sender.name = name;
                }
            }
            Err(err) => warn!(error = %err, "Falling back to configured mail sender"),
        }
        sender
    }

    /// Render and hand one message to the transport.
    pub async fn deliver(&self, to: Vec<Recipient>, rendered: RenderedMail) -> Result<(), MailError> {
        if to.is_empty() {
            return Err(MailError::NoRecipients);
        }
        let mail = OutgoingMail {
            from: self.sender().await,
            to,
            subject: rendered.subject,
            text: rendered.text,
            html: rendered.html,
        };
        self.mailer.send(mail).await
    }

    async fn deliver_logged(&self, kind: &str, to: Vec<Recipient>, rendered: RenderedMail) -> bool {
        let recipients = to.len();
        match self.deliver(to, rendered).await {
            Ok(()) => {
                info!(mail = kind, recipients, transport = self.mailer.name(), "Mail sent");
                true
            }
            Err(err) => {
                error!(mail = kind, error = %err, "Failed to send mail");
                false
            }
        }
    }

    pub async fn send_welcome(&self, user: &user::Model, tenant: Option<&tenant::Model>) -> bool {
        let rendered = templates::welcome(
            &user.name,
            tenant.map(|t| t.name.as_str()),
            &self.url("/dashboard"),
        );
        self.deliver_logged(
            "welcome",
            vec![Recipient::named(&user.email, &user.name)],
            rendered,
        )
        .await
    }

    pub async fn send_generation_result(
        &self,
        user: &user::Model,
        generation: &content_generation::Model,
        page: &page::Model,
        success: bool,
    ) -> bool {
        let link = self.url(&format!("/generations/{}", generation.id));
        let summary = templates::GenerationSummary {
            recipient_name: &user.name,
            page_url: &page.url_path,
            prompt_type: &generation.prompt_type,
            tokens_used: generation.tokens_used,
            error: generation.error_message.as_deref(),
            link: &link,
        };
        self.deliver_logged(
            "content_generation",
            vec![Recipient::named(&user.email, &user.name)],
            templates::generation_complete(&summary, success),
        )
        .await
    }

    async fn admin_recipients(&self) -> Vec<Recipient> {
        if !self.config.mail.admin_notification_emails.is_empty() {
            return self
                .config
                .mail
                .admin_notification_emails
                .iter()
                .map(Recipient::new)
                .collect();
        }

        match UserRepository::new(&self.db).active_super_admins().await {
            Ok(admins) => admins
                .into_iter()
                .map(|admin| Recipient::named(admin.email, admin.name))
                .collect(),
            Err(err) => {
                error!(error = %err, "Failed to load admin recipients");
                Vec::new()
            }
        }
    }

    pub async fn notify_admins(
        &self,
        kind: AdminNotificationKind,
        title: &str,
        message: &str,
        data: BTreeMap<String, String>,
    ) -> bool {
        let recipients = self.admin_recipients().await;
        if recipients.is_empty() {
            warn!(kind = kind.as_str(), "No admin emails found for notification");
            return false;
        }
        let rendered =
            templates::admin_notification(&kind, title, message, &data, &self.url("/admin"));
        self.deliver_logged(kind.as_str(), recipients, rendered).await
    }

    pub async fn notify_new_user(&self, user: &user::Model, tenant_name: Option<&str>) -> bool {
        let data = BTreeMap::from([
            ("user_email".to_string(), user.email.clone()),
            ("user_role".to_string(), user.role.clone()),
            (
                "tenant_name".to_string(),
                tenant_name.unwrap_or("N/A").to_string(),
            ),
            (
                "registration_date".to_string(),
                user.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            ),
        ]);
        self.notify_admins(
            AdminNotificationKind::NewUser,
            "New User Registration",
            &format!(
                "A new user has registered on the platform: {} ({})",
                user.name, user.email
            ),
            data,
        )
        .await
    }

    pub async fn notify_high_usage(&self, tenant: &tenant::Model) -> bool {
        let percent = tenant.usage_percent();
        let data = BTreeMap::from([
            ("tenant_name".to_string(), tenant.name.clone()),
            ("usage_percentage".to_string(), format!("{percent}")),
            ("tokens_used".to_string(), tenant.tokens_used_current.to_string()),
            ("tokens_limit".to_string(), tenant.tokens_monthly_limit.to_string()),
            (
                "remaining_tokens".to_string(),
                tenant.remaining_tokens().to_string(),
            ),
        ]);
        self.notify_admins(
            AdminNotificationKind::HighUsage,
            "High Token Usage Alert",
            &format!(
                "Tenant '{}' has reached {}% of their monthly token limit.",
                tenant.name,
                percent.round()
            ),
            data,
        )
        .await
    }

    pub async fn send_test(&self, to: &str) -> Result<(), MailError> {
        self.deliver(vec![Recipient::new(to)], templates::test_message())
            .await
    }
}

/// Whether moving from `before` to `after` used tokens crosses the alert threshold.
pub fn crosses_high_usage(before: i64, after: i64, limit: i64) -> bool {
    let before = tenant::usage_percent(before, limit);
    let after = tenant::usage_percent(after, limit);
    before < HIGH_USAGE_THRESHOLD && after >= HIGH_USAGE_THRESHOLD
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::CryptoKey;
    use crate::db::test_connection;
    use crate::repositories::user::NewUser;
    use crate::settings::SettingsUpdate;

    async fn notifier(admin_emails: Vec<String>) -> (Notifier, Arc<MemoryMailer>) {
        let db = test_connection().await;
        let settings = PlatformSettings::new(db.clone(), CryptoKey::new(vec![2u8; 32]).unwrap());
        let mut config = AppConfig::default();
        config.public_base_url = "https://app.ainstein.test/".into();
        config.mail.admin_notification_emails = admin_emails;
        let memory = Arc::new(MemoryMailer::default());
        let notifier = Notifier::new(memory.clone(), db, settings, Arc::new(config));
        (notifier, memory)
    }

    #[test]
    fn threshold_crossing() {
        assert!(crosses_high_usage(700, 850, 1000));
        assert!(!crosses_high_usage(810, 900, 1000));
        assert!(!crosses_high_usage(100, 200, 1000));
        assert!(!crosses_high_usage(0, 0, 0));
    }

    #[test]
    fn unknown_transport_is_rejected() {
        let config = MailConfig {
            transport: "carrier-pigeon".into(),
            ..MailConfig::default()
        };
        assert!(matches!(
            build_mailer(&config),
            Err(MailError::UnknownTransport(_))
        ));
    }

    #[tokio::test]
    async fn settings_override_sender_and_links_use_base_url() {
        let (notifier, memory) = notifier(vec![]).await;
        notifier
            .settings
            .update(SettingsUpdate {
                mail_from_address: Some("hello@acme.test".into()),
                ..Default::default()
            })
            .await
            .unwrap();

        notifier.send_test("ops@acme.test").await.unwrap();
        let sent = memory.sent();
        assert_eq!(sent[0].from.email, "hello@acme.test");
        assert_eq!(sent[0].subject, "Test Email - Ainstein Platform");
        assert_eq!(sent[0].to, vec![Recipient::new("ops@acme.test")]);
    }

    #[tokio::test]
    async fn admin_notifications_fall_back_to_super_admins() {
        let (notifier, memory) = notifier(vec![]).await;
        assert!(
            !notifier
                .notify_admins(AdminNotificationKind::Error, "Boom", "It broke", BTreeMap::new())
                .await
        );

        UserRepository::new(&notifier.db)
            .create(NewUser {
                tenant_id: None,
                email: "root@ainstein.test".into(),
                password_hash: String::new(),
                name: "Root".into(),
                role: None,
                is_super_admin: true,
                is_active: true,
                email_verified: true,
                preferences: None,
            })
            .await
            .unwrap();

        assert!(
            notifier
                .notify_admins(AdminNotificationKind::Error, "Boom", "It broke", BTreeMap::new())
                .await
        );
        let sent = memory.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject, "🚨 Boom - Ainstein Platform");
        assert_eq!(sent[0].to[0].email, "root@ainstein.test");
    }

    #[tokio::test]
    async fn configured_admin_emails_win() {
        let (notifier, memory) = notifier(vec!["alerts@acme.test".into()]).await;
        assert!(
            notifier
                .notify_admins(
                    AdminNotificationKind::Maintenance,
                    "Window",
                    "Tonight",
                    BTreeMap::new()
                )
                .await
        );
        assert_eq!(memory.sent()[0].to, vec![Recipient::new("alerts@acme.test")]);
    }
}
