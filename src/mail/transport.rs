//! Mail transports

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use super::{MailError, Mailer, OutgoingMail};

/// Writes a log line per message instead of delivering it.
#[derive(Debug, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError> {
        let recipients: Vec<&str> = mail.to.iter().map(|r| r.email.as_str()).collect();
        info!(
            from = %mail.from.email,
            to = ?recipients,
            subject = %mail.subject,
            "Mail delivered to log transport"
        );
        Ok(())
    }
}

/// Posts messages to a transactional-mail HTTP API.
pub struct HttpMailer {
    client: reqwest::Client,
    endpoint: String,
    token: Option<String>,
}

impl HttpMailer {
    pub fn new(endpoint: impl Into<String>, token: Option<String>) -> Result<Self, MailError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            token,
        })
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError> {
        let payload = json!({
            "from": { "email": mail.from.email, "name": mail.from.name },
            "to": mail.to.iter().map(|r| json!({ "email": r.email, "name": r.name })).collect::<Vec<_>>(),
            "subject": mail.subject,
            "text": mail.text,
            "html": mail.html,
        });

        let mut request = self.client.post(&self.endpoint).json(&payload);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MailError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        info!(subject = %mail.subject, recipients = mail.to.len(), "Mail accepted by HTTP transport");
        Ok(())
    }
}

/// Keeps every message in memory. Useful for dry runs and tests.
#[derive(Debug, Default)]
pub struct MemoryMailer {
    sent: Mutex<Vec<OutgoingMail>>,
}

impl MemoryMailer {
    pub fn sent(&self) -> Vec<OutgoingMail> {
        self.sent
            .lock()
            .map(|sent| sent.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Mailer for MemoryMailer {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError> {
        self.sent
            .lock()
            .map_err(|_| MailError::Transport("mail buffer poisoned".into()))?
            .push(mail);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mail::{Recipient, Sender};
    use wiremock::matchers::{bearer_token, body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn mail() -> OutgoingMail {
        OutgoingMail {
            from: Sender {
                email: "noreply@ainstein.com".into(),
                name: "Ainstein Platform".into(),
            },
            to: vec![Recipient::named("ada@acme.test", "Ada")],
            subject: "Hello".into(),
            text: "Body".into(),
            html: "<p>Body</p>".into(),
        }
    }

    #[tokio::test]
    async fn http_mailer_posts_json_with_bearer() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/send"))
            .and(bearer_token("mail-token"))
            .and(body_partial_json(json!({
                "from": { "email": "noreply@ainstein.com" },
                "to": [{ "email": "ada@acme.test", "name": "Ada" }],
                "subject": "Hello"
            })))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        let mailer = HttpMailer::new(format!("{}/send", server.uri()), Some("mail-token".into())).unwrap();
        mailer.send(mail()).await.unwrap();
    }

    #[tokio::test]
    async fn http_mailer_surfaces_rejections() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(422).set_body_string("bad sender"))
            .mount(&server)
            .await;

        let mailer = HttpMailer::new(server.uri(), None).unwrap();
        match mailer.send(mail()).await {
            Err(MailError::Rejected { status, body }) => {
                assert_eq!(status, 422);
                assert_eq!(body, "bad sender");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn memory_mailer_records() {
        let mailer = MemoryMailer::default();
        mailer.send(mail()).await.unwrap();
        assert_eq!(mailer.sent().len(), 1);
        assert!(LogMailer.send(mail()).await.is_ok());
    }
}
