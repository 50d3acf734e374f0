//! Stripe webhook authentication and event decoding.

use hmac::{Hmac, Mac};
use picshare_domain::storage::StorageError;
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;
use thiserror::Error;
use tracing::warn;

/// Maximum age of a signed timestamp, in seconds.
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("missing Stripe-Signature header")]
    MissingSignature,
    #[error("malformed Stripe-Signature header")]
    MalformedSignature,
    #[error("no signatures found matching the expected signature for payload")]
    SignatureMismatch,
    #[error("timestamp outside the tolerance zone")]
    TimestampOutOfTolerance,
    #[error("invalid webhook payload: {0}")]
    InvalidPayload(String),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl WebhookError {
    /// Errors caused by the request itself rather than by processing it.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, WebhookError::Storage(_))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub data: EventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventData {
    pub object: Value,
}

impl StripeEvent {
    pub fn object<T: serde::de::DeserializeOwned>(&self) -> Result<T, WebhookError> {
        serde_json::from_value(self.data.object.clone())
            .map_err(|err| WebhookError::InvalidPayload(format!("{}: {err}", self.kind)))
    }
}

/// Checks a `t=...,v1=...` header against `HMAC-SHA256(secret, "{t}.{body}")`.
/// Any of several `v1` entries may match, which covers secret rotation.
pub fn verify_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    now: i64,
) -> Result<(), WebhookError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            continue;
        };
        match key {
            "t" => {
                timestamp = Some(
                    value
                        .parse::<i64>()
                        .map_err(|_| WebhookError::MalformedSignature)?,
                )
            }
            "v1" => signatures.push(value),
            _ => {}
        }
    }
    let timestamp = timestamp.ok_or(WebhookError::MalformedSignature)?;
    if signatures.is_empty() {
        return Err(WebhookError::MalformedSignature);
    }

    let matched = signatures.iter().any(|candidate| {
        let Ok(expected) = hex::decode(candidate) else {
            return false;
        };
        let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
            return false;
        };
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        mac.verify_slice(&expected).is_ok()
    });
    if !matched {
        return Err(WebhookError::SignatureMismatch);
    }

    if (now - timestamp).abs() > SIGNATURE_TOLERANCE_SECS {
        return Err(WebhookError::TimestampOutOfTolerance);
    }
    Ok(())
}

/// Authenticates and decodes an event. Without a configured secret the body
/// is accepted unsigned, which is only meant for local development.
pub fn construct_event(
    payload: &[u8],
    signature: Option<&str>,
    secret: Option<&str>,
    now: i64,
) -> Result<StripeEvent, WebhookError> {
    match secret {
        Some(secret) => {
            let header = signature.ok_or(WebhookError::MissingSignature)?;
            verify_signature(payload, header, secret, now)?;
        }
        None => warn!("STRIPE_WEBHOOK_SECRET not set; accepting unsigned webhook"),
    }
    serde_json::from_slice(payload).map_err(|err| WebhookError::InvalidPayload(err.to_string()))
}

/// Produces a header value the way Stripe signs, for tests and local tooling.
pub fn sign_payload(payload: &[u8], secret: &str, timestamp: i64) -> String {
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return format!("t={timestamp}"),
    };
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    format!(
        "t={timestamp},v1={}",
        hex::encode(mac.finalize().into_bytes())
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test";
    const BODY: &[u8] = br#"{"id":"evt_1","type":"payment_intent.succeeded","data":{"object":{"id":"pi_1"}}}"#;

    #[test]
    fn valid_signature_is_accepted() {
        let header = sign_payload(BODY, SECRET, 1_700_000_000);
        verify_signature(BODY, &header, SECRET, 1_700_000_100).expect("valid");
        let event = construct_event(BODY, Some(&header), Some(SECRET), 1_700_000_100)
            .expect("event");
        assert_eq!(event.kind, "payment_intent.succeeded");
    }

    #[test]
    fn tampered_body_or_wrong_secret_is_rejected() {
        let header = sign_payload(BODY, SECRET, 1_700_000_000);
        let err = verify_signature(b"{}", &header, SECRET, 1_700_000_000).unwrap_err();
        assert!(matches!(err, WebhookError::SignatureMismatch));
        let err = verify_signature(BODY, &header, "whsec_other", 1_700_000_000).unwrap_err();
        assert!(matches!(err, WebhookError::SignatureMismatch));
    }

    #[test]
    fn stale_timestamp_is_rejected() {
        let header = sign_payload(BODY, SECRET, 1_700_000_000);
        let err = verify_signature(BODY, &header, SECRET, 1_700_000_301).unwrap_err();
        assert!(matches!(err, WebhookError::TimestampOutOfTolerance));
    }

    #[test]
    fn rotated_secret_matches_any_v1() {
        let good = sign_payload(BODY, SECRET, 1_700_000_000);
        let v1 = good.split_once("v1=").unwrap().1;
        let header = format!("t=1700000000,v1=deadbeef,v1={v1}");
        verify_signature(BODY, &header, SECRET, 1_700_000_000).expect("second v1 matches");
    }

    #[test]
    fn missing_or_malformed_header_is_reported() {
        let err = construct_event(BODY, None, Some(SECRET), 0).unwrap_err();
        assert!(matches!(err, WebhookError::MissingSignature));
        let err = verify_signature(BODY, "v1=abc", SECRET, 0).unwrap_err();
        assert!(matches!(err, WebhookError::MalformedSignature));
        let err = verify_signature(BODY, "t=abc,v1=abc", SECRET, 0).unwrap_err();
        assert!(matches!(err, WebhookError::MalformedSignature));
    }

    #[test]
    fn unsigned_body_is_accepted_without_secret() {
        let event = construct_event(BODY, None, None, 0).expect("event");
        assert_eq!(event.id, "evt_1");
    }
}
