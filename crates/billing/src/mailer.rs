//! Transactional email over a Resend-compatible HTTP API.

use async_trait::async_trait;
use picshare_domain::services::notify::{EmailMessage, MailError, Mailer};
use picshare_domain::MailerConfig;
use reqwest::Client;
use serde::Serialize;
use tracing::debug;

#[derive(Clone)]
pub struct HttpMailer {
    client: Client,
    api_url: String,
    api_key: String,
    from: String,
}

#[derive(Serialize)]
struct OutgoingEmail<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: &'a str,
    text: &'a str,
}

impl HttpMailer {
    pub fn new(config: &MailerConfig) -> Self {
        Self {
            client: Client::new(),
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
            from: config.from.clone(),
        }
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, message: EmailMessage) -> Result<(), MailError> {
        let body = OutgoingEmail {
            from: &self.from,
            to: [&message.to],
            subject: &message.subject,
            html: &message.html,
            text: &message.text,
        };
        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| MailError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(MailError::Rejected(format!("{status}: {detail}")));
        }
        debug!(to = %message.to, subject = %message.subject, "email accepted by provider");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_wraps_single_recipient() {
        let body = OutgoingEmail {
            from: "noreply@picshare.example",
            to: ["owner@example.com"],
            subject: "Hello",
            html: "<p>hi</p>",
            text: "hi",
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["to"], serde_json::json!(["owner@example.com"]));
        assert_eq!(json["from"], "noreply@picshare.example");
    }
}
