//! Stripe integration and outbound email. The API process embeds this crate:
//! `StripeClient` backs the payment gateway seam, `webhook` authenticates
//! incoming events and `pipeline` applies them to storage.

pub mod mailer;
pub mod pipeline;
pub mod stripe;
pub mod webhook;

pub use mailer::HttpMailer;
pub use pipeline::{process_event, WebhookOutcome};
pub use stripe::StripeClient;
pub use webhook::{construct_event, verify_signature, StripeEvent, WebhookError};
