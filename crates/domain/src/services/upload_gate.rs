//! Per-tenant payment requirement in front of guest uploads.

use std::collections::BTreeMap;

use metrics::counter;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::model::{NewPayment, PaymentStatus, Tenant};
use crate::services::gateway::{
    payment_method_types_for, GatewayError, NewPaymentIntent, PaymentGateway, PaymentIntent,
};
use crate::storage::{PaymentStore, StorageError};

#[derive(Debug, Error)]
pub enum GateError {
    #[error("Payment is required for this tenant")]
    PaymentRequired,
    #[error("Invalid payment ID")]
    InvalidPayment,
    #[error("Payment not completed. Status: {status}")]
    NotCompleted { status: String },
    #[error("Payment does not belong to this tenant")]
    WrongTenant,
    #[error("Payment amount is not configured for this tenant")]
    PriceNotConfigured,
    #[error(transparent)]
    Gateway(GatewayError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Treats the placeholder strings browsers send for unset form values as
/// absent.
pub fn normalize_payment_ref(raw: Option<&str>) -> Option<&str> {
    raw.map(str::trim)
        .filter(|value| !value.is_empty() && *value != "null" && *value != "undefined")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome {
    /// The tenant does not charge for uploads; any supplied reference is ignored.
    NotRequired,
    Verified(PaymentIntent),
}

impl GateOutcome {
    pub fn payment_intent(&self) -> Option<&PaymentIntent> {
        match self {
            GateOutcome::NotRequired => None,
            GateOutcome::Verified(intent) => Some(intent),
        }
    }
}

pub async fn verify_upload_payment(
    gateway: &dyn PaymentGateway,
    tenant: &Tenant,
    payment_ref: Option<&str>,
) -> Result<GateOutcome, GateError> {
    let result = verify(gateway, tenant, payment_ref).await;
    let label = match &result {
        Ok(GateOutcome::NotRequired) => "not_required",
        Ok(GateOutcome::Verified(_)) => "verified",
        Err(GateError::PaymentRequired) => "missing",
        Err(GateError::Gateway(_)) => "error",
        Err(_) => "rejected",
    };
    counter!("upload_gate_total", "result" => label).increment(1);
    result
}

async fn verify(
    gateway: &dyn PaymentGateway,
    tenant: &Tenant,
    payment_ref: Option<&str>,
) -> Result<GateOutcome, GateError> {
    if !tenant.payment_enabled {
        return Ok(GateOutcome::NotRequired);
    }
    let intent_id = normalize_payment_ref(payment_ref).ok_or(GateError::PaymentRequired)?;

    let intent = match gateway.retrieve_payment_intent(intent_id).await {
        Ok(intent) => intent,
        Err(GatewayError::Api { status, .. }) if (400..500).contains(&status) => {
            return Err(GateError::InvalidPayment)
        }
        Err(err) => return Err(GateError::Gateway(err)),
    };
    if !intent.is_succeeded() {
        return Err(GateError::NotCompleted {
            status: intent.status,
        });
    }
    let tenant_id = tenant.id.to_string();
    if intent.metadata_value("tenant_id") != Some(tenant_id.as_str()) {
        warn!(tenant = %tenant.slug, intent = %intent.id, "payment intent presented for another tenant");
        return Err(GateError::WrongTenant);
    }
    Ok(GateOutcome::Verified(intent))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadPayment {
    pub client_secret: Option<String>,
    pub payment_intent_id: String,
    pub amount: i64,
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadPaymentOutcome {
    NotRequired,
    Created(UploadPayment),
}

/// Opens a payment intent for one upload at the tenant's configured price.
/// The pending Payment row is recorded best effort.
pub async fn create_upload_payment<S>(
    gateway: &dyn PaymentGateway,
    store: &S,
    tenant: &Tenant,
    session_id: &str,
) -> Result<UploadPaymentOutcome, GateError>
where
    S: PaymentStore + ?Sized,
{
    if !tenant.payment_enabled {
        return Ok(UploadPaymentOutcome::NotRequired);
    }
    if tenant.price_amount <= 0 {
        return Err(GateError::PriceNotConfigured);
    }

    let currency = tenant.price_currency.to_lowercase();
    let metadata = BTreeMap::from([
        ("tenant_id".to_string(), tenant.id.to_string()),
        ("tenant_slug".to_string(), tenant.slug.clone()),
        ("session_id".to_string(), session_id.to_string()),
    ]);
    let intent = gateway
        .create_payment_intent(NewPaymentIntent {
            amount: tenant.price_amount,
            currency: currency.clone(),
            customer: None,
            payment_method_types: payment_method_types_for(&currency),
            description: Some(format!("Photo upload - {}", tenant.name)),
            receipt_email: None,
            metadata,
        })
        .await
        .map_err(GateError::Gateway)?;

    if let Err(err) = store
        .insert_payment(NewPayment {
            tenant_id: tenant.id,
            stripe_payment_intent_id: intent.id.clone(),
            amount: intent.amount,
            currency: intent.currency.clone(),
            status: PaymentStatus::Pending,
            session_id: Some(session_id.to_string()),
            metadata: json!({ "tenant_slug": tenant.slug }),
        })
        .await
    {
        warn!(tenant = %tenant.slug, intent = %intent.id, error = %err, "failed to record pending payment");
    }

    info!(tenant = %tenant.slug, intent = %intent.id, amount = intent.amount, "upload payment intent created");
    Ok(UploadPaymentOutcome::Created(UploadPayment {
        client_secret: intent.client_secret,
        payment_intent_id: intent.id,
        amount: intent.amount,
        currency: intent.currency,
    }))
}

/// Marks the verified intent's Payment row succeeded, creating it when the
/// pending row was never recorded. Returns the row id for the image link.
pub async fn settle_upload_payment<S>(
    store: &S,
    tenant: &Tenant,
    intent: &PaymentIntent,
    session_id: &str,
) -> Result<Uuid, GateError>
where
    S: PaymentStore + ?Sized,
{
    if let Some(payment) = store.find_payment_by_intent(&intent.id).await? {
        if payment.tenant_id != tenant.id {
            return Err(GateError::WrongTenant);
        }
        if payment.status != PaymentStatus::Succeeded {
            store
                .update_payment_status(&intent.id, PaymentStatus::Succeeded)
                .await?;
        }
        return Ok(payment.id);
    }

    let payment = store
        .insert_payment(NewPayment {
            tenant_id: tenant.id,
            stripe_payment_intent_id: intent.id.clone(),
            amount: intent.amount,
            currency: intent.currency.clone(),
            status: PaymentStatus::Succeeded,
            session_id: Some(session_id.to_string()),
            metadata: json!({ "tenant_slug": tenant.slug }),
        })
        .await?;
    Ok(payment.id)
}
