use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use uuid::Uuid;

pub const TRIAL_PLAN_KEY: &str = "trial";
const MONTHLY_PERIOD_DAYS: i64 = 30;
const YEARLY_PERIOD_DAYS: i64 = 365;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BillingType {
    OneTime,
    Subscription,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BillingInterval {
    Month,
    Year,
}

/// Usage limits and feature flags attached to a plan. `-1` in any numeric
/// ceiling means unlimited.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanFeatures {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tenants: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_uploads: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_uploads_per_month: Option<i64>,
    #[serde(default)]
    pub storage_gb: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retention_days: Option<i64>,
    #[serde(default)]
    pub watermark: bool,
    #[serde(default)]
    pub api_access: bool,
    #[serde(default)]
    pub email_support: bool,
    #[serde(default)]
    pub priority_support: bool,
    #[serde(default)]
    pub dedicated_support: bool,
}

/// Effective upload ceiling derived from a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadLimit {
    Unlimited,
    Limited(i64),
}

impl UploadLimit {
    fn from_raw(raw: i64) -> Self {
        if raw < 0 {
            UploadLimit::Unlimited
        } else {
            UploadLimit::Limited(raw)
        }
    }

    /// Wire representation, `-1` for unlimited.
    pub fn as_raw(&self) -> i64 {
        match self {
            UploadLimit::Unlimited => -1,
            UploadLimit::Limited(limit) => *limit,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionPlan {
    pub id: Uuid,
    pub key: String,
    pub name: String,
    pub description: Option<String>,
    pub price: i64,
    pub currency: String,
    pub billing_type: BillingType,
    pub billing_interval: Option<BillingInterval>,
    pub duration_days: Option<i32>,
    pub features: PlanFeatures,
    pub is_active: bool,
    pub sort_order: i32,
}

impl SubscriptionPlan {
    pub fn requires_payment(&self) -> bool {
        self.price > 0
    }

    /// Upload ceiling for the plan: one-time plans read `max_uploads`,
    /// subscription plans `max_uploads_per_month`, each falling back to the
    /// other and finally to unlimited.
    pub fn upload_limit(&self) -> UploadLimit {
        let features = &self.features;
        let raw = match self.billing_type {
            BillingType::OneTime => features.max_uploads.or(features.max_uploads_per_month),
            BillingType::Subscription => features.max_uploads_per_month.or(features.max_uploads),
        };
        raw.map(UploadLimit::from_raw)
            .unwrap_or(UploadLimit::Unlimited)
    }

    /// Length of one billing period.
    pub fn period_length(&self) -> Duration {
        match self.billing_type {
            BillingType::OneTime => Duration::days(i64::from(self.duration_days.unwrap_or(0))),
            BillingType::Subscription => match self.billing_interval {
                Some(BillingInterval::Year) => Duration::days(YEARLY_PERIOD_DAYS),
                _ => Duration::days(MONTHLY_PERIOD_DAYS),
            },
        }
    }

    pub fn period_end(&self, start: DateTime<Utc>) -> DateTime<Utc> {
        start + self.period_length()
    }
}
