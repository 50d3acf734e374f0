//! Upload quota derived from the tenant's active plan.

use chrono::{DateTime, Utc};
use metrics::counter;
use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use crate::model::{ActiveSubscription, UploadLimit};
use crate::services::subscription::{detect_expiry, ExpiryState};
use crate::storage::{ImageStore, StorageError, SubscriptionStore, TenantStore};

pub const GRACE_PERIOD_MULTIPLIER: f64 = 1.2;
pub const WARNING_THRESHOLD_PERCENT: f64 = 80.0;
pub const CRITICAL_THRESHOLD_PERCENT: f64 = 100.0;

pub const REASON_OK: &str = "OK";
pub const REASON_LIMIT_REACHED: &str = "Image limit reached";
pub const REASON_TENANT_NOT_FOUND: &str = "Tenant not found";
pub const REASON_TENANT_INACTIVE: &str = "Tenant is not active";
pub const REASON_NO_SUBSCRIPTION: &str = "No active subscription";
pub const REASON_EXPIRED: &str = "Subscription expired";
pub const REASON_CHECK_FAILED: &str = "Error checking quota";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WarningLevel {
    Ok,
    Warning,
    Critical,
}

/// Non-blocking usage assessment attached to quota payloads.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LimitEvaluation {
    pub percent: f64,
    /// `None` when unlimited.
    pub remaining: Option<i64>,
    pub in_grace_period: bool,
    pub warning_level: WarningLevel,
}

pub fn evaluate_limit(usage: i64, limit: UploadLimit) -> LimitEvaluation {
    let limit = match limit {
        UploadLimit::Unlimited => {
            return LimitEvaluation {
                percent: 0.0,
                remaining: None,
                in_grace_period: false,
                warning_level: WarningLevel::Ok,
            }
        }
        UploadLimit::Limited(limit) => limit,
    };

    let percent = if limit == 0 {
        if usage > 0 {
            CRITICAL_THRESHOLD_PERCENT
        } else {
            0.0
        }
    } else {
        usage as f64 / limit as f64 * 100.0
    };
    let grace_ceiling = (limit as f64 * GRACE_PERIOD_MULTIPLIER).floor() as i64;
    let warning_level = if percent >= CRITICAL_THRESHOLD_PERCENT || usage >= limit {
        WarningLevel::Critical
    } else if percent >= WARNING_THRESHOLD_PERCENT {
        WarningLevel::Warning
    } else {
        WarningLevel::Ok
    };

    LimitEvaluation {
        percent,
        remaining: Some((limit - usage).max(0)),
        in_grace_period: usage >= limit && usage < grace_ceiling,
        warning_level,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuotaUsage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_limit_gb: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period_end: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evaluation: Option<LimitEvaluation>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuotaDecision {
    pub allowed: bool,
    pub reason: String,
    pub usage: Option<QuotaUsage>,
}

impl QuotaDecision {
    fn denied(reason: &str, usage: Option<QuotaUsage>) -> Self {
        Self {
            allowed: false,
            reason: reason.to_string(),
            usage,
        }
    }

    fn fail_open() -> Self {
        Self {
            allowed: true,
            reason: REASON_CHECK_FAILED.to_string(),
            usage: None,
        }
    }
}

/// Pure decision given the already-loaded subscription and image count.
pub fn decide(active: &ActiveSubscription, image_count: i64, now: DateTime<Utc>) -> QuotaDecision {
    let ActiveSubscription { subscription, plan } = active;
    let period_end = subscription.current_period_end;
    if detect_expiry(now, period_end) == ExpiryState::Expired {
        return QuotaDecision::denied(
            REASON_EXPIRED,
            Some(QuotaUsage {
                current: None,
                limit: None,
                plan: None,
                storage_limit_gb: None,
                period_end: Some(period_end),
                evaluation: None,
            }),
        );
    }

    let limit = plan.upload_limit();
    let usage = QuotaUsage {
        current: Some(image_count),
        limit: Some(limit.as_raw()),
        plan: Some(plan.name.clone()),
        storage_limit_gb: Some(plan.features.storage_gb),
        period_end: Some(period_end),
        evaluation: Some(evaluate_limit(image_count, limit)),
    };

    match limit {
        UploadLimit::Limited(ceiling) if image_count >= ceiling => QuotaDecision {
            allowed: false,
            reason: REASON_LIMIT_REACHED.to_string(),
            usage: Some(usage),
        },
        _ => QuotaDecision {
            allowed: true,
            reason: REASON_OK.to_string(),
            usage: Some(usage),
        },
    }
}

/// Loads tenant, subscription and image count, then decides. Any storage
/// failure allows the upload.
pub async fn check_quota<S>(store: &S, tenant_id: Uuid, now: DateTime<Utc>) -> QuotaDecision
where
    S: TenantStore + SubscriptionStore + ImageStore + ?Sized,
{
    let decision = match load_and_decide(store, tenant_id, now).await {
        Ok(decision) => decision,
        Err(err) => {
            warn!(%tenant_id, error = %err, "quota check failed; allowing upload");
            QuotaDecision::fail_open()
        }
    };
    let result = if decision.reason == REASON_CHECK_FAILED {
        "fail_open"
    } else if decision.allowed {
        "allowed"
    } else {
        "denied"
    };
    counter!("quota_checks_total", "result" => result).increment(1);
    decision
}

async fn load_and_decide<S>(
    store: &S,
    tenant_id: Uuid,
    now: DateTime<Utc>,
) -> Result<QuotaDecision, StorageError>
where
    S: TenantStore + SubscriptionStore + ImageStore + ?Sized,
{
    let Some(tenant) = store.find_tenant(tenant_id).await? else {
        return Ok(QuotaDecision::denied(REASON_TENANT_NOT_FOUND, None));
    };
    if !tenant.is_active {
        return Ok(QuotaDecision::denied(REASON_TENANT_INACTIVE, None));
    }
    let Some(active) = store.find_active_subscription(tenant_id).await? else {
        return Ok(QuotaDecision::denied(REASON_NO_SUBSCRIPTION, None));
    };
    let count = store.count_images(tenant_id).await?;
    Ok(decide(&active, i64::try_from(count).unwrap_or(i64::MAX), now))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::{
        fixture_image, fixture_plan, fixture_subscription, fixture_tenant, MemoryStore,
    };
    use crate::model::ModerationStatus;
    use chrono::Duration;

    #[test]
    fn boundary_blocks_only_at_or_above_limit() {
        let now = Utc::now();
        let tenant = fixture_tenant("quota");
        let plan = fixture_plan("trial", 0, Some(3));
        let active = ActiveSubscription {
            subscription: fixture_subscription(&tenant, &plan, now + Duration::days(1)),
            plan,
        };

        for count in 0..3 {
            assert!(decide(&active, count, now).allowed, "count {count}");
        }
        for count in 3..6 {
            let decision = decide(&active, count, now);
            assert!(!decision.allowed, "count {count}");
            assert_eq!(decision.reason, REASON_LIMIT_REACHED);
            let usage = decision.usage.unwrap();
            assert_eq!(usage.current, Some(count));
            assert_eq!(usage.limit, Some(3));
            assert_eq!(usage.plan.as_deref(), Some("Plan trial"));
        }
    }

    #[test]
    fn unlimited_plan_always_allows() {
        let now = Utc::now();
        let tenant = fixture_tenant("unlimited");
        let plan = fixture_plan("unlimited_monthly", 499900, Some(-1));
        let active = ActiveSubscription {
            subscription: fixture_subscription(&tenant, &plan, now + Duration::days(1)),
            plan,
        };
        for count in [0, 1, 10_000, i64::MAX] {
            assert!(decide(&active, count, now).allowed);
        }
    }

    #[test]
    fn expired_period_is_denied_with_period_end() {
        let now = Utc::now();
        let tenant = fixture_tenant("late");
        let plan = fixture_plan("trial", 0, Some(50));
        let end = now - Duration::minutes(1);
        let active = ActiveSubscription {
            subscription: fixture_subscription(&tenant, &plan, end),
            plan,
        };
        let decision = decide(&active, 0, now);
        assert!(!decision.allowed);
        assert_eq!(decision.reason, REASON_EXPIRED);
        assert_eq!(decision.usage.unwrap().period_end, Some(end));
    }

    #[test]
    fn evaluation_thresholds() {
        let ok = evaluate_limit(10, UploadLimit::Limited(100));
        assert_eq!(ok.warning_level, WarningLevel::Ok);
        assert_eq!(ok.remaining, Some(90));

        let warning = evaluate_limit(80, UploadLimit::Limited(100));
        assert_eq!(warning.warning_level, WarningLevel::Warning);
        assert!(!warning.in_grace_period);

        let critical = evaluate_limit(100, UploadLimit::Limited(100));
        assert_eq!(critical.warning_level, WarningLevel::Critical);
        assert!(critical.in_grace_period);
        assert_eq!(critical.remaining, Some(0));

        let beyond = evaluate_limit(120, UploadLimit::Limited(100));
        assert!(!beyond.in_grace_period);

        let unlimited = evaluate_limit(5_000, UploadLimit::Unlimited);
        assert_eq!(unlimited.remaining, None);
        assert_eq!(unlimited.warning_level, WarningLevel::Ok);
    }

    #[tokio::test]
    async fn check_quota_reports_lookup_reasons() {
        let store = MemoryStore::default();
        let now = Utc::now();

        let missing = check_quota(&store, Uuid::new_v4(), now).await;
        assert!(!missing.allowed);
        assert_eq!(missing.reason, REASON_TENANT_NOT_FOUND);

        let mut inactive = fixture_tenant("inactive");
        inactive.is_active = false;
        let inactive = store.seed_tenant(inactive);
        assert_eq!(
            check_quota(&store, inactive.id, now).await.reason,
            REASON_TENANT_INACTIVE
        );

        let bare = store.seed_tenant(fixture_tenant("bare"));
        assert_eq!(
            check_quota(&store, bare.id, now).await.reason,
            REASON_NO_SUBSCRIPTION
        );
    }

    #[tokio::test]
    async fn check_quota_counts_existing_images() {
        let store = MemoryStore::default();
        let now = Utc::now();
        let tenant = store.seed_tenant(fixture_tenant("counted"));
        let plan = store.seed_plan(fixture_plan("trial", 0, Some(2)));
        store.seed_subscription(fixture_subscription(&tenant, &plan, now + Duration::days(1)));

        store.seed_image(fixture_image(&tenant, ModerationStatus::Pending));
        assert!(check_quota(&store, tenant.id, now).await.allowed);

        store.seed_image(fixture_image(&tenant, ModerationStatus::Rejected));
        let decision = check_quota(&store, tenant.id, now).await;
        assert!(!decision.allowed);
        assert_eq!(decision.reason, REASON_LIMIT_REACHED);
    }

    #[tokio::test]
    async fn storage_failure_fails_open() {
        let store = MemoryStore::default();
        let now = Utc::now();
        let tenant = store.seed_tenant(fixture_tenant("flaky"));
        let plan = store.seed_plan(fixture_plan("trial", 0, Some(0)));
        store.seed_subscription(fixture_subscription(&tenant, &plan, now + Duration::days(1)));
        store.fail_on("count_images");

        let decision = check_quota(&store, tenant.id, now).await;
        assert!(decision.allowed);
        assert_eq!(decision.reason, REASON_CHECK_FAILED);
        assert!(decision.usage.is_none());
    }
}
