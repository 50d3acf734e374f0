//! Plan catalog seeded on every start. Existing keys are left untouched so
//! operators can adjust prices in the database.

use picshare_domain::model::{BillingInterval, BillingType, PlanFeatures, DEFAULT_CURRENCY};
use picshare_domain::storage::StorageResult;
use sea_orm::sea_query::OnConflict;
use sea_orm::{DatabaseConnection, EntityTrait, Set};
use uuid::Uuid;

use crate::entity::subscription_plans;
use crate::errors::{map_db_err, StorageError};

struct CatalogPlan {
    key: &'static str,
    name: &'static str,
    description: &'static str,
    price: i64,
    billing_type: BillingType,
    billing_interval: Option<BillingInterval>,
    duration_days: Option<i32>,
    features: PlanFeatures,
    sort_order: i32,
}

#[allow(clippy::too_many_arguments)]
fn one_time(
    key: &'static str,
    name: &'static str,
    description: &'static str,
    price: i64,
    days: i32,
    max_uploads: i64,
    storage_gb: i64,
    sort_order: i32,
) -> CatalogPlan {
    CatalogPlan {
        key,
        name,
        description,
        price,
        billing_type: BillingType::OneTime,
        billing_interval: None,
        duration_days: Some(days),
        features: PlanFeatures {
            max_tenants: Some(1),
            max_uploads: Some(max_uploads),
            storage_gb,
            retention_days: Some(i64::from(days.max(3))),
            ..Default::default()
        },
        sort_order,
    }
}

fn recurring(
    key: &'static str,
    name: &'static str,
    description: &'static str,
    price: i64,
    interval: BillingInterval,
    features: PlanFeatures,
    sort_order: i32,
) -> CatalogPlan {
    CatalogPlan {
        key,
        name,
        description,
        price,
        billing_type: BillingType::Subscription,
        billing_interval: Some(interval),
        duration_days: None,
        features,
        sort_order,
    }
}

fn tier_features(tier: &str) -> PlanFeatures {
    match tier {
        "starter" => PlanFeatures {
            max_tenants: Some(1),
            max_uploads_per_month: Some(500),
            storage_gb: 10,
            ..Default::default()
        },
        "pro" => PlanFeatures {
            max_tenants: Some(3),
            max_uploads_per_month: Some(3000),
            storage_gb: 50,
            email_support: true,
            ..Default::default()
        },
        "business" => PlanFeatures {
            max_tenants: Some(10),
            max_uploads_per_month: Some(15000),
            storage_gb: 200,
            api_access: true,
            email_support: true,
            priority_support: true,
            ..Default::default()
        },
        _ => PlanFeatures {
            max_tenants: Some(-1),
            max_uploads_per_month: Some(-1),
            storage_gb: 1000,
            api_access: true,
            email_support: true,
            priority_support: true,
            dedicated_support: true,
            ..Default::default()
        },
    }
}

fn catalog() -> Vec<CatalogPlan> {
    use BillingInterval::{Month, Year};

    let mut trial = one_time("trial", "Free Trial", "Try every feature free for 3 days", 0, 3, 50, 1, 10);
    trial.features.watermark = true;

    vec![
        trial,
        one_time("oneday", "One Day", "A single-day event", 19900, 1, 200, 5, 20),
        one_time("oneweek", "One Week", "Events running up to a week", 49900, 7, 1000, 10, 30),
        one_time("onemonth", "One Month", "A month of photo sharing", 99900, 30, 5000, 30, 40),
        recurring("starter_monthly", "Starter", "Small venues", 29900, Month, tier_features("starter"), 100),
        recurring("pro_monthly", "Pro", "Regular events", 89900, Month, tier_features("pro"), 110),
        recurring("business_monthly", "Business", "Multi-venue operators", 249900, Month, tier_features("business"), 120),
        recurring("unlimited_monthly", "Unlimited", "No upload ceiling", 499900, Month, tier_features("unlimited"), 130),
        recurring("starter_yearly", "Starter (Yearly)", "Small venues, billed yearly", 287000, Year, tier_features("starter"), 200),
        recurring("pro_yearly", "Pro (Yearly)", "Regular events, billed yearly", 863000, Year, tier_features("pro"), 210),
        recurring("business_yearly", "Business (Yearly)", "Multi-venue operators, billed yearly", 2399000, Year, tier_features("business"), 220),
        recurring("unlimited_yearly", "Unlimited (Yearly)", "No upload ceiling, billed yearly", 4799000, Year, tier_features("unlimited"), 230),
    ]
}

pub async fn seed_plan_catalog(db: &DatabaseConnection) -> StorageResult<()> {
    for plan in catalog() {
        let features = serde_json::to_value(&plan.features).map_err(StorageError::from_source)?;
        let model = subscription_plans::ActiveModel {
            id: Set(Uuid::new_v4()),
            plan_key: Set(plan.key.to_string()),
            name: Set(plan.name.to_string()),
            description: Set(Some(plan.description.to_string())),
            price: Set(plan.price),
            currency: Set(DEFAULT_CURRENCY.to_string()),
            billing_type: Set(plan.billing_type.into()),
            billing_interval: Set(plan.billing_interval.map(Into::into)),
            duration_days: Set(plan.duration_days),
            features: Set(features),
            is_active: Set(true),
            sort_order: Set(plan.sort_order),
        };
        subscription_plans::Entity::insert(model)
            .on_conflict(
                OnConflict::column(subscription_plans::Column::PlanKey)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(db)
            .await
            .map_err(map_db_err)?;
    }
    Ok(())
}
