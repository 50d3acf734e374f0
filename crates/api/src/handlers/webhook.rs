use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::info;

use picshare_billing::{construct_event, process_event, WebhookOutcome};

use crate::state::AppState;

use super::ApiError;

pub const SIGNATURE_HEADER: &str = "Stripe-Signature";

#[derive(Debug, Serialize, Deserialize)]
pub struct WebhookAck {
    pub received: bool,
    pub outcome: String,
}

/// Consumes the raw body so the signature is checked over the exact bytes
/// the provider signed.
pub async fn stripe_webhook_handler(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    let signature = req
        .headers()
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());
    let now = Utc::now();

    let event = construct_event(
        &body,
        signature,
        state.settings().webhook_secret.as_deref(),
        now.timestamp(),
    )
    .inspect_err(|err| {
        counter!("webhook_requests_total", "result" => "rejected").increment(1);
        info!(error = %err, "webhook rejected");
    })?;

    let outcome = process_event(state.storage(), &event, now).await?;
    let outcome = match outcome {
        WebhookOutcome::Applied => "applied",
        WebhookOutcome::NoMatch => "no_match",
        WebhookOutcome::Ignored => "ignored",
    };
    counter!("webhook_requests_total", "result" => outcome).increment(1);
    Ok(HttpResponse::Ok().json(WebhookAck {
        received: true,
        outcome: outcome.to_string(),
    }))
}
