//! Applies authenticated Stripe events to subscriptions, payments, tenants
//! and the billing ledger.

use chrono::{DateTime, Utc};
use metrics::counter;
use picshare_domain::model::{
    BillingStatus, NewBillingRecord, PaymentStatus, Subscription, SubscriptionPatch,
    SubscriptionStatus,
};
use picshare_domain::services::gateway::PaymentIntent;
use picshare_domain::storage::{BillingStore, PaymentStore, SubscriptionStore, TenantStore};
use serde::Deserialize;
use tracing::{info, warn};

use crate::webhook::{StripeEvent, WebhookError};

pub const PAYMENT_SUCCEEDED: &str = "payment_intent.succeeded";
pub const PAYMENT_FAILED: &str = "payment_intent.payment_failed";
pub const CHARGE_REFUNDED: &str = "charge.refunded";
pub const SUBSCRIPTION_UPDATED: &str = "customer.subscription.updated";
pub const SUBSCRIPTION_DELETED: &str = "customer.subscription.deleted";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// The event changed local state.
    Applied,
    /// The event referenced nothing we track.
    NoMatch,
    /// The event type is not handled.
    Ignored,
}

impl WebhookOutcome {
    fn label(&self) -> &'static str {
        match self {
            WebhookOutcome::Applied => "applied",
            WebhookOutcome::NoMatch => "no_match",
            WebhookOutcome::Ignored => "ignored",
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChargeObject {
    id: String,
    #[serde(default)]
    payment_intent: Option<String>,
    #[serde(default)]
    amount_refunded: i64,
    currency: String,
}

#[derive(Debug, Deserialize)]
struct SubscriptionObject {
    id: String,
    status: String,
    #[serde(default)]
    current_period_start: Option<i64>,
    #[serde(default)]
    current_period_end: Option<i64>,
}

/// Maps a provider subscription status onto ours.
pub fn map_subscription_status(status: &str) -> SubscriptionStatus {
    match status {
        "canceled" => SubscriptionStatus::Canceled,
        "past_due" | "unpaid" => SubscriptionStatus::PaymentFailed,
        _ => SubscriptionStatus::Active,
    }
}

pub async fn process_event<S>(
    store: &S,
    event: &StripeEvent,
    now: DateTime<Utc>,
) -> Result<WebhookOutcome, WebhookError>
where
    S: SubscriptionStore + PaymentStore + BillingStore + TenantStore + ?Sized,
{
    let outcome = match event.kind.as_str() {
        PAYMENT_SUCCEEDED => payment_settled(store, event.object()?, true, now).await,
        PAYMENT_FAILED => payment_settled(store, event.object()?, false, now).await,
        CHARGE_REFUNDED => charge_refunded(store, event.object()?, now).await,
        SUBSCRIPTION_UPDATED => subscription_updated(store, event.object()?).await,
        SUBSCRIPTION_DELETED => subscription_deleted(store, event.object()?, now).await,
        other => {
            info!(event = %event.id, kind = other, "unhandled webhook event type");
            Ok(WebhookOutcome::Ignored)
        }
    };

    let result = match &outcome {
        Ok(outcome) => outcome.label(),
        Err(_) => "error",
    };
    counter!("webhook_events_total", "type" => event.kind.clone(), "result" => result)
        .increment(1);
    outcome
}

async fn payment_settled<S>(
    store: &S,
    intent: PaymentIntent,
    succeeded: bool,
    now: DateTime<Utc>,
) -> Result<WebhookOutcome, WebhookError>
where
    S: SubscriptionStore + PaymentStore + BillingStore + ?Sized,
{
    let payment_status = if succeeded {
        PaymentStatus::Succeeded
    } else {
        PaymentStatus::Failed
    };
    let payment_updated = store
        .update_payment_status(&intent.id, payment_status)
        .await?;

    let Some(subscription) = store
        .find_subscription_by_payment_intent(&intent.id)
        .await?
    else {
        if !payment_updated {
            info!(intent = %intent.id, "no payment or subscription for payment intent");
            return Ok(WebhookOutcome::NoMatch);
        }
        return Ok(WebhookOutcome::Applied);
    };

    let (status, billing_status, description) = if succeeded {
        (
            SubscriptionStatus::Active,
            BillingStatus::Paid,
            format!(
                "Payment for {}",
                intent.metadata_value("plan_name").unwrap_or("subscription")
            ),
        )
    } else {
        (
            SubscriptionStatus::PaymentFailed,
            BillingStatus::Failed,
            format!(
                "Failed payment for {}",
                intent.metadata_value("plan_name").unwrap_or("subscription")
            ),
        )
    };

    store
        .update_subscription(
            subscription.id,
            SubscriptionPatch {
                status: Some(status),
                ..Default::default()
            },
        )
        .await?;
    book_once(
        store,
        ledger_entry(
            &subscription,
            intent.amount,
            intent.currency.clone(),
            billing_status,
            description,
            Some(intent.id.clone()),
            now,
        ),
    )
    .await?;

    info!(
        subscription = %subscription.id,
        intent = %intent.id,
        status = %status,
        "payment recorded for subscription"
    );
    Ok(WebhookOutcome::Applied)
}

async fn charge_refunded<S>(
    store: &S,
    charge: ChargeObject,
    now: DateTime<Utc>,
) -> Result<WebhookOutcome, WebhookError>
where
    S: SubscriptionStore + BillingStore + ?Sized,
{
    let Some(intent_id) = charge.payment_intent.as_deref() else {
        warn!(charge = %charge.id, "refunded charge carries no payment intent");
        return Ok(WebhookOutcome::NoMatch);
    };
    let Some(subscription) = store.find_subscription_by_payment_intent(intent_id).await? else {
        info!(intent = intent_id, "no subscription found for refund");
        return Ok(WebhookOutcome::NoMatch);
    };

    store
        .update_subscription(
            subscription.id,
            SubscriptionPatch {
                status: Some(SubscriptionStatus::Refunded),
                current_period_end: Some(now),
                ..Default::default()
            },
        )
        .await?;
    book_once(
        store,
        ledger_entry(
            &subscription,
            -charge.amount_refunded,
            charge.currency,
            BillingStatus::Refunded,
            "Refund issued".to_string(),
            Some(intent_id.to_string()),
            now,
        ),
    )
    .await?;

    info!(subscription = %subscription.id, "refund recorded for subscription");
    Ok(WebhookOutcome::Applied)
}

async fn subscription_updated<S>(
    store: &S,
    remote: SubscriptionObject,
) -> Result<WebhookOutcome, WebhookError>
where
    S: SubscriptionStore + ?Sized,
{
    let Some(subscription) = store.find_subscription_by_stripe_id(&remote.id).await? else {
        info!(stripe_subscription = %remote.id, "no subscription found for stripe subscription");
        return Ok(WebhookOutcome::NoMatch);
    };

    let status = map_subscription_status(&remote.status);
    store
        .update_subscription(
            subscription.id,
            SubscriptionPatch {
                status: Some(status),
                current_period_start: remote
                    .current_period_start
                    .and_then(|secs| DateTime::from_timestamp(secs, 0)),
                current_period_end: remote
                    .current_period_end
                    .and_then(|secs| DateTime::from_timestamp(secs, 0)),
                stripe_subscription_id: None,
            },
        )
        .await?;

    info!(subscription = %subscription.id, %status, "subscription updated");
    Ok(WebhookOutcome::Applied)
}

async fn subscription_deleted<S>(
    store: &S,
    remote: SubscriptionObject,
    now: DateTime<Utc>,
) -> Result<WebhookOutcome, WebhookError>
where
    S: SubscriptionStore + TenantStore + ?Sized,
{
    let Some(subscription) = store.find_subscription_by_stripe_id(&remote.id).await? else {
        info!(stripe_subscription = %remote.id, "no subscription found for stripe subscription");
        return Ok(WebhookOutcome::NoMatch);
    };

    store
        .update_subscription(
            subscription.id,
            SubscriptionPatch {
                status: Some(SubscriptionStatus::Canceled),
                current_period_end: Some(now),
                ..Default::default()
            },
        )
        .await?;
    store
        .set_tenant_active(subscription.tenant_id, false)
        .await?;

    info!(tenant = %subscription.tenant_id, "subscription canceled and tenant deactivated");
    Ok(WebhookOutcome::Applied)
}

/// Appends the ledger row unless one with the same intent and status is
/// already booked. Stripe redelivers events, and paid signups book the
/// payment before the webhook arrives.
async fn book_once<S>(store: &S, record: NewBillingRecord) -> Result<(), WebhookError>
where
    S: BillingStore + ?Sized,
{
    if let Some(intent_id) = record.stripe_payment_intent_id.as_deref() {
        if let Some(existing) = store
            .find_billing_record_by_intent(intent_id, record.status)
            .await?
        {
            info!(record = %existing.id, intent = intent_id, "ledger entry already booked");
            return Ok(());
        }
    }
    store.append_billing_record(record).await?;
    Ok(())
}

fn ledger_entry(
    subscription: &Subscription,
    amount: i64,
    currency: String,
    status: BillingStatus,
    description: String,
    intent_id: Option<String>,
    paid_at: DateTime<Utc>,
) -> NewBillingRecord {
    NewBillingRecord {
        tenant_id: subscription.tenant_id,
        subscription_id: Some(subscription.id),
        amount,
        currency,
        status,
        description: Some(description),
        stripe_payment_intent_id: intent_id,
        paid_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use picshare_domain::model::NewPayment;
    use picshare_domain::services::testing::{
        fixture_plan, fixture_subscription, fixture_tenant, MemoryStore,
    };
    use picshare_domain::storage::TenantStore;
    use serde_json::json;

    fn event(kind: &str, object: serde_json::Value) -> StripeEvent {
        serde_json::from_value(json!({
            "id": "evt_test",
            "type": kind,
            "data": { "object": object },
        }))
        .expect("event")
    }

    fn seeded(intent: Option<&str>, stripe_sub: Option<&str>) -> (MemoryStore, Subscription) {
        let store = MemoryStore::default();
        let tenant = store.seed_tenant(fixture_tenant("test-event"));
        let plan = store.seed_plan(fixture_plan("oneday", 19900, Some(200)));
        let mut subscription = fixture_subscription(&tenant, &plan, Utc::now());
        subscription.stripe_payment_intent_id = intent.map(str::to_string);
        subscription.stripe_subscription_id = stripe_sub.map(str::to_string);
        let subscription = store.seed_subscription(subscription);
        (store, subscription)
    }

    fn intent_object(id: &str, status: &str) -> serde_json::Value {
        json!({
            "id": id,
            "status": status,
            "amount": 19900,
            "currency": "thb",
            "metadata": { "plan_name": "One Day" },
        })
    }

    #[tokio::test]
    async fn succeeded_intent_activates_and_records_payment() {
        let (store, subscription) = seeded(Some("pi_1"), None);
        let now = Utc::now();
        let outcome = process_event(
            &store,
            &event(PAYMENT_SUCCEEDED, intent_object("pi_1", "succeeded")),
            now,
        )
        .await
        .unwrap();
        assert_eq!(outcome, WebhookOutcome::Applied);

        let updated = store.subscription(subscription.id).unwrap();
        assert_eq!(updated.status, SubscriptionStatus::Active);
        let ledger = store
            .list_billing_records(subscription.tenant_id)
            .await
            .unwrap();
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger[0].status, BillingStatus::Paid);
        assert_eq!(ledger[0].amount, 19900);
        assert_eq!(ledger[0].description.as_deref(), Some("Payment for One Day"));
    }

    #[tokio::test]
    async fn redelivered_success_books_the_ledger_once() {
        let (store, subscription) = seeded(Some("pi_1"), None);
        let delivery = event(PAYMENT_SUCCEEDED, intent_object("pi_1", "succeeded"));
        for _ in 0..2 {
            let outcome = process_event(&store, &delivery, Utc::now()).await.unwrap();
            assert_eq!(outcome, WebhookOutcome::Applied);
        }

        let ledger = store
            .list_billing_records(subscription.tenant_id)
            .await
            .unwrap();
        assert_eq!(ledger.len(), 1);
    }

    #[tokio::test]
    async fn success_after_signup_booking_adds_no_second_row() {
        let (store, subscription) = seeded(Some("pi_1"), None);
        store
            .append_billing_record(NewBillingRecord {
                tenant_id: subscription.tenant_id,
                subscription_id: Some(subscription.id),
                amount: 19900,
                currency: "thb".into(),
                status: BillingStatus::Paid,
                description: Some("One Day".into()),
                stripe_payment_intent_id: Some("pi_1".into()),
                paid_at: Utc::now(),
            })
            .await
            .unwrap();

        process_event(
            &store,
            &event(PAYMENT_SUCCEEDED, intent_object("pi_1", "succeeded")),
            Utc::now(),
        )
        .await
        .unwrap();

        let ledger = store
            .list_billing_records(subscription.tenant_id)
            .await
            .unwrap();
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger[0].description.as_deref(), Some("One Day"));
    }

    #[tokio::test]
    async fn failed_intent_marks_subscription_and_upload_payment() {
        let (store, subscription) = seeded(Some("pi_1"), None);
        store
            .insert_payment(NewPayment {
                tenant_id: subscription.tenant_id,
                stripe_payment_intent_id: "pi_1".into(),
                amount: 19900,
                currency: "thb".into(),
                status: PaymentStatus::Pending,
                session_id: None,
                metadata: json!({}),
            })
            .await
            .unwrap();

        process_event(
            &store,
            &event(PAYMENT_FAILED, intent_object("pi_1", "requires_payment_method")),
            Utc::now(),
        )
        .await
        .unwrap();

        assert_eq!(
            store.subscription(subscription.id).unwrap().status,
            SubscriptionStatus::PaymentFailed
        );
        let payment = store.find_payment_by_intent("pi_1").await.unwrap().unwrap();
        assert_eq!(payment.status, PaymentStatus::Failed);
        let ledger = store
            .list_billing_records(subscription.tenant_id)
            .await
            .unwrap();
        assert_eq!(ledger[0].status, BillingStatus::Failed);
    }

    #[tokio::test]
    async fn refund_ends_period_with_negative_ledger_entry() {
        let (store, subscription) = seeded(Some("pi_1"), None);
        let now = Utc::now();
        process_event(
            &store,
            &event(
                CHARGE_REFUNDED,
                json!({"id": "ch_1", "payment_intent": "pi_1", "amount_refunded": 19900, "currency": "thb"}),
            ),
            now,
        )
        .await
        .unwrap();

        let updated = store.subscription(subscription.id).unwrap();
        assert_eq!(updated.status, SubscriptionStatus::Refunded);
        assert_eq!(updated.current_period_end, now);
        let ledger = store
            .list_billing_records(subscription.tenant_id)
            .await
            .unwrap();
        assert_eq!(ledger[0].amount, -19900);
        assert_eq!(ledger[0].status, BillingStatus::Refunded);
    }

    #[tokio::test]
    async fn subscription_update_maps_status_and_copies_period() {
        let (store, subscription) = seeded(None, Some("sub_1"));
        process_event(
            &store,
            &event(
                SUBSCRIPTION_UPDATED,
                json!({"id": "sub_1", "status": "past_due",
                       "current_period_start": 1_700_000_000, "current_period_end": 1_702_592_000}),
            ),
            Utc::now(),
        )
        .await
        .unwrap();

        let updated = store.subscription(subscription.id).unwrap();
        assert_eq!(updated.status, SubscriptionStatus::PaymentFailed);
        assert_eq!(updated.current_period_end.timestamp(), 1_702_592_000);
        assert_eq!(updated.current_period_start.timestamp(), 1_700_000_000);
    }

    #[tokio::test]
    async fn subscription_deleted_deactivates_tenant() {
        let (store, subscription) = seeded(None, Some("sub_1"));
        process_event(
            &store,
            &event(SUBSCRIPTION_DELETED, json!({"id": "sub_1", "status": "canceled"})),
            Utc::now(),
        )
        .await
        .unwrap();

        assert_eq!(
            store.subscription(subscription.id).unwrap().status,
            SubscriptionStatus::Canceled
        );
        let tenant = store
            .find_tenant(subscription.tenant_id)
            .await
            .unwrap()
            .unwrap();
        assert!(!tenant.is_active);
    }

    #[tokio::test]
    async fn unknown_and_unmatched_events_are_acknowledged() {
        let (store, _) = seeded(None, None);
        let outcome = process_event(&store, &event("invoice.created", json!({})), Utc::now())
            .await
            .unwrap();
        assert_eq!(outcome, WebhookOutcome::Ignored);

        let outcome = process_event(
            &store,
            &event(PAYMENT_SUCCEEDED, intent_object("pi_unknown", "succeeded")),
            Utc::now(),
        )
        .await
        .unwrap();
        assert_eq!(outcome, WebhookOutcome::NoMatch);
    }

    #[test]
    fn provider_statuses_map_onto_ours() {
        assert_eq!(map_subscription_status("canceled"), SubscriptionStatus::Canceled);
        assert_eq!(map_subscription_status("unpaid"), SubscriptionStatus::PaymentFailed);
        assert_eq!(map_subscription_status("trialing"), SubscriptionStatus::Active);
    }
}
