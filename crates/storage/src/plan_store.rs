use picshare_domain::model::{PlanFeatures, SubscriptionPlan};
use picshare_domain::storage::{PlanStore, StorageResult};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder};

use crate::entity::subscription_plans;
use crate::errors::{map_db_err, StorageError};
use crate::SeaOrmStorage;

#[async_trait::async_trait]
impl PlanStore for SeaOrmStorage {
    async fn find_plan_by_key(&self, key: &str) -> StorageResult<Option<SubscriptionPlan>> {
        let maybe = subscription_plans::Entity::find()
            .filter(subscription_plans::Column::PlanKey.eq(key))
            .one(self.connection())
            .await
            .map_err(map_db_err)?;
        maybe.map(plan_to_domain).transpose()
    }

    async fn list_plans(&self) -> StorageResult<Vec<SubscriptionPlan>> {
        let rows = subscription_plans::Entity::find()
            .filter(subscription_plans::Column::IsActive.eq(true))
            .order_by_asc(subscription_plans::Column::SortOrder)
            .all(self.connection())
            .await
            .map_err(map_db_err)?;
        rows.into_iter().map(plan_to_domain).collect()
    }
}

pub(crate) fn plan_to_domain(model: subscription_plans::Model) -> StorageResult<SubscriptionPlan> {
    let features: PlanFeatures = serde_json::from_value(model.features)
        .map_err(|err| StorageError::Database(format!("plan {}: {err}", model.plan_key)))?;
    Ok(SubscriptionPlan {
        id: model.id,
        key: model.plan_key,
        name: model.name,
        description: model.description,
        price: model.price,
        currency: model.currency,
        billing_type: model.billing_type.into(),
        billing_interval: model.billing_interval.map(Into::into),
        duration_days: model.duration_days,
        features,
        is_active: model.is_active,
        sort_order: model.sort_order,
    })
}
