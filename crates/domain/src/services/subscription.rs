//! Subscription health checks for tenant-scoped requests, plus the sweep that
//! expires lapsed plans and sends renewal reminders.

use chrono::{DateTime, Utc};
use metrics::counter;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::model::{ActiveSubscription, Subscription, SubscriptionPlan, Tenant};
use crate::services::notify::{send_best_effort, ExpiryWarningEmail, Mailer};
use crate::storage::{StorageError, SubscriptionStore, TenantStore};

/// Window, in days, in which a subscription counts as expiring soon.
pub const EXPIRY_WARNING_DAYS: i64 = 7;
const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GuardError {
    #[error("an active subscription is required")]
    SubscriptionRequired,
    #[error("tenant is not active")]
    TenantInactive,
    #[error("subscription expired at {expired_at}")]
    SubscriptionExpired { expired_at: DateTime<Utc> },
    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryState {
    Active { days_remaining: i64 },
    Expired,
}

/// Pure expiry detection. `now == period_end` still counts as active.
pub fn detect_expiry(now: DateTime<Utc>, period_end: DateTime<Utc>) -> ExpiryState {
    if now > period_end {
        return ExpiryState::Expired;
    }
    let seconds = (period_end - now).num_seconds();
    let days_remaining = (seconds + SECONDS_PER_DAY - 1) / SECONDS_PER_DAY;
    ExpiryState::Active { days_remaining }
}

pub fn is_expiring_soon(days_remaining: i64) -> bool {
    days_remaining > 0 && days_remaining <= EXPIRY_WARNING_DAYS
}

/// A subscription that passed the guard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionHealth {
    pub subscription: Subscription,
    pub plan: SubscriptionPlan,
    pub days_until_expiry: i64,
    pub expiring_soon: bool,
}

/// Gates a tenant-scoped operation on subscription health. A lapsed period is
/// persisted (subscription expired, tenant deactivated) before the request is
/// rejected.
pub async fn check_subscription_active<S>(
    store: &S,
    tenant: &Tenant,
    now: DateTime<Utc>,
) -> Result<SubscriptionHealth, GuardError>
where
    S: SubscriptionStore + ?Sized,
{
    let Some(active) = store.find_active_subscription(tenant.id).await? else {
        counter!("subscription_guard_total", "result" => "required").increment(1);
        return Err(GuardError::SubscriptionRequired);
    };

    if !tenant.is_active {
        counter!("subscription_guard_total", "result" => "inactive").increment(1);
        return Err(GuardError::TenantInactive);
    }

    let ActiveSubscription { subscription, plan } = active;
    match detect_expiry(now, subscription.current_period_end) {
        ExpiryState::Expired => {
            store.expire_subscription(subscription.id, tenant.id).await?;
            counter!("subscription_guard_total", "result" => "expired").increment(1);
            info!(
                tenant = %tenant.slug,
                subscription = %subscription.id,
                "subscription expired; tenant deactivated"
            );
            Err(GuardError::SubscriptionExpired {
                expired_at: subscription.current_period_end,
            })
        }
        ExpiryState::Active { days_remaining } => {
            counter!("subscription_guard_total", "result" => "ok").increment(1);
            Ok(SubscriptionHealth {
                subscription,
                plan,
                days_until_expiry: days_remaining,
                expiring_soon: is_expiring_soon(days_remaining),
            })
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub expired: Vec<Uuid>,
    pub warned: Vec<Uuid>,
    pub failed: usize,
}

/// Walks every active subscription: lapsed ones are expired exactly as the
/// guard would, ones entering the warning window get a single reminder.
pub async fn sweep_subscriptions<S>(
    store: &S,
    mailer: &dyn Mailer,
    base_url: &str,
    now: DateTime<Utc>,
) -> Result<SweepReport, StorageError>
where
    S: SubscriptionStore + TenantStore + ?Sized,
{
    let mut report = SweepReport::default();
    for ActiveSubscription { subscription, plan } in store.list_active_subscriptions().await? {
        match detect_expiry(now, subscription.current_period_end) {
            ExpiryState::Expired => {
                match store
                    .expire_subscription(subscription.id, subscription.tenant_id)
                    .await
                {
                    Ok(()) => report.expired.push(subscription.id),
                    Err(err) => {
                        report.failed += 1;
                        warn!(subscription = %subscription.id, error = %err, "failed to expire subscription");
                    }
                }
            }
            ExpiryState::Active { days_remaining }
                if is_expiring_soon(days_remaining) && !subscription.expiry_warning_sent =>
            {
                let tenant = match store.find_tenant(subscription.tenant_id).await {
                    Ok(Some(tenant)) => tenant,
                    Ok(None) => continue,
                    Err(err) => {
                        report.failed += 1;
                        warn!(subscription = %subscription.id, error = %err, "failed to load tenant for expiry warning");
                        continue;
                    }
                };
                if let Some(email) = tenant.owner_email.as_deref() {
                    let message = ExpiryWarningEmail {
                        to: email,
                        shop_name: &tenant.name,
                        plan_name: &plan.name,
                        days_remaining,
                        period_end: subscription.current_period_end,
                        base_url,
                    }
                    .render();
                    send_best_effort(mailer, "expiry_warning", message).await;
                }
                match store.mark_expiry_warning_sent(subscription.id).await {
                    Ok(()) => report.warned.push(subscription.id),
                    Err(err) => {
                        report.failed += 1;
                        warn!(subscription = %subscription.id, error = %err, "failed to flag expiry warning");
                    }
                }
            }
            ExpiryState::Active { .. } => {}
        }
    }

    counter!("subscription_sweep_expired_total").increment(report.expired.len() as u64);
    counter!("subscription_sweep_warned_total").increment(report.warned.len() as u64);
    info!(
        expired = report.expired.len(),
        warned = report.warned.len(),
        failed = report.failed,
        "subscription sweep finished"
    );
    Ok(report)
}
