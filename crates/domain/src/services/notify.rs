//! Transactional email: the `Mailer` seam, a log-only fallback and the
//! message templates the signup, billing and sweep flows send.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::counter;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MailError {
    #[error("mail transport failed: {0}")]
    Transport(String),
    #[error("mail provider rejected message: {0}")]
    Rejected(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub html: String,
    pub text: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: EmailMessage) -> Result<(), MailError>;
}

/// Used when no provider is configured: messages are logged, never delivered.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: EmailMessage) -> Result<(), MailError> {
        info!(to = %message.to, subject = %message.subject, "email delivery disabled; message logged");
        Ok(())
    }
}

/// Sends the message and swallows failures after logging them. Email never
/// fails the request that triggered it.
pub async fn send_best_effort(
    mailer: &dyn Mailer,
    kind: &'static str,
    message: EmailMessage,
) -> bool {
    let to = message.to.clone();
    match mailer.send(message).await {
        Ok(()) => {
            counter!("emails_sent_total", "kind" => kind, "result" => "sent").increment(1);
            true
        }
        Err(err) => {
            counter!("emails_sent_total", "kind" => kind, "result" => "error").increment(1);
            warn!(%to, kind, error = %err, "failed to send email");
            false
        }
    }
}

pub struct WelcomeEmail<'a> {
    pub to: &'a str,
    pub shop_name: &'a str,
    pub shop_slug: &'a str,
    pub username: &'a str,
    pub password: &'a str,
    pub plan_name: &'a str,
    pub period_end: DateTime<Utc>,
    pub base_url: &'a str,
}

impl WelcomeEmail<'_> {
    pub fn render(&self) -> EmailMessage {
        let admin_url = format!("{}/{}/admin", self.base_url.trim_end_matches('/'), self.shop_slug);
        let expires = self.period_end.format("%Y-%m-%d %H:%M UTC");
        EmailMessage {
            to: self.to.to_string(),
            subject: format!("Welcome to Picshare - {}", self.shop_name),
            html: format!(
                "<h1>Welcome, {shop}!</h1>\
                 <p>Your {plan} plan is active until {expires}.</p>\
                 <p>Admin panel: <a href=\"{url}\">{url}</a></p>\
                 <p>Username: <strong>{user}</strong><br>Password: <strong>{pass}</strong></p>\
                 <p>Please change your password after the first login.</p>",
                shop = self.shop_name,
                plan = self.plan_name,
                url = admin_url,
                user = self.username,
                pass = self.password,
            ),
            text: format!(
                "Welcome, {}!\nYour {} plan is active until {}.\nAdmin panel: {}\nUsername: {}\nPassword: {}\n",
                self.shop_name, self.plan_name, expires, admin_url, self.username, self.password
            ),
        }
    }
}

pub struct ReceiptEmail<'a> {
    pub to: &'a str,
    pub shop_name: &'a str,
    pub plan_name: &'a str,
    pub amount: i64,
    pub currency: &'a str,
    pub payment_reference: &'a str,
    pub paid_at: DateTime<Utc>,
}

impl ReceiptEmail<'_> {
    pub fn render(&self) -> EmailMessage {
        let amount = format_amount(self.amount, self.currency);
        let paid_at = self.paid_at.format("%Y-%m-%d %H:%M UTC");
        EmailMessage {
            to: self.to.to_string(),
            subject: format!("Payment receipt - {}", self.plan_name),
            html: format!(
                "<h1>Thank you for your payment</h1>\
                 <p>Shop: {}</p><p>Plan: {}</p><p>Amount: {}</p>\
                 <p>Reference: {}</p><p>Date: {}</p>",
                self.shop_name, self.plan_name, amount, self.payment_reference, paid_at
            ),
            text: format!(
                "Payment receipt\nShop: {}\nPlan: {}\nAmount: {}\nReference: {}\nDate: {}\n",
                self.shop_name, self.plan_name, amount, self.payment_reference, paid_at
            ),
        }
    }
}

pub struct ExpiryWarningEmail<'a> {
    pub to: &'a str,
    pub shop_name: &'a str,
    pub plan_name: &'a str,
    pub days_remaining: i64,
    pub period_end: DateTime<Utc>,
    pub base_url: &'a str,
}

impl ExpiryWarningEmail<'_> {
    pub fn render(&self) -> EmailMessage {
        let renew_url = format!("{}/pricing", self.base_url.trim_end_matches('/'));
        let expires = self.period_end.format("%Y-%m-%d %H:%M UTC");
        EmailMessage {
            to: self.to.to_string(),
            subject: format!(
                "Your {} plan expires in {} day(s)",
                self.plan_name, self.days_remaining
            ),
            html: format!(
                "<p>Hi {},</p><p>Your {} plan expires on {}.</p>\
                 <p>Renew here: <a href=\"{url}\">{url}</a></p>",
                self.shop_name,
                self.plan_name,
                expires,
                url = renew_url
            ),
            text: format!(
                "Hi {},\nYour {} plan expires on {}.\nRenew here: {}\n",
                self.shop_name, self.plan_name, expires, renew_url
            ),
        }
    }
}

/// Formats minor units as `1,234.56 THB`.
pub fn format_amount(minor: i64, currency: &str) -> String {
    let sign = if minor < 0 { "-" } else { "" };
    let abs = minor.unsigned_abs();
    let major = (abs / 100).to_string();
    let mut grouped = String::with_capacity(major.len() + major.len() / 3);
    for (i, ch) in major.chars().enumerate() {
        if i > 0 && (major.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    format!(
        "{sign}{grouped}.{:02} {}",
        abs % 100,
        currency.to_ascii_uppercase()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FailingMailer {
        attempts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Mailer for FailingMailer {
        async fn send(&self, message: EmailMessage) -> Result<(), MailError> {
            self.attempts.lock().unwrap().push(message.to);
            Err(MailError::Transport("smtp down".into()))
        }
    }

    #[test]
    fn amounts_are_grouped_and_scaled() {
        assert_eq!(format_amount(19900, "thb"), "199.00 THB");
        assert_eq!(format_amount(2399000, "thb"), "23,990.00 THB");
        assert_eq!(format_amount(-4999, "usd"), "-49.99 USD");
        assert_eq!(format_amount(5, "thb"), "0.05 THB");
    }

    #[test]
    fn welcome_email_carries_credentials_and_login_link() {
        let message = WelcomeEmail {
            to: "owner@example.com",
            shop_name: "Test Event",
            shop_slug: "test-event",
            username: "testevent_ab12",
            password: "S3cret!pass12",
            plan_name: "Trial",
            period_end: Utc::now(),
            base_url: "https://picshare.example/",
        }
        .render();
        assert_eq!(message.to, "owner@example.com");
        assert!(message.text.contains("testevent_ab12"));
        assert!(message.text.contains("S3cret!pass12"));
        assert!(message
            .html
            .contains("https://picshare.example/test-event/admin"));
    }

    #[tokio::test]
    async fn best_effort_send_swallows_failures() {
        let mailer = FailingMailer::default();
        let message = EmailMessage {
            to: "owner@example.com".into(),
            subject: "s".into(),
            html: String::new(),
            text: String::new(),
        };
        send_best_effort(&mailer, "welcome", message).await;
        assert_eq!(mailer.attempts.lock().unwrap().len(), 1);
    }
}
