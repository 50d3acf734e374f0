use std::collections::HashMap;

use chrono::Utc;
use picshare_domain::model::{
    ActiveSubscription, NewSubscription, Subscription, SubscriptionPatch, SubscriptionStatus,
};
use picshare_domain::storage::{StorageResult, SubscriptionStore};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveEnum, ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use uuid::Uuid;

use crate::entity::subscriptions::{self, SubscriptionStatusDb};
use crate::entity::{subscription_plans, tenants};
use crate::errors::{map_db_err, StorageError};
use crate::plan_store::plan_to_domain;
use crate::SeaOrmStorage;

#[async_trait::async_trait]
impl SubscriptionStore for SeaOrmStorage {
    async fn insert_subscription(
        &self,
        subscription: NewSubscription,
    ) -> StorageResult<Subscription> {
        let model = subscriptions::ActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set(subscription.tenant_id),
            plan_id: Set(subscription.plan_id),
            status: Set(subscription.status.into()),
            current_period_start: Set(subscription.current_period_start),
            current_period_end: Set(subscription.current_period_end),
            admin_username: Set(subscription.admin_username),
            admin_password_hash: Set(subscription.admin_password_hash),
            credentials_sent: Set(subscription.credentials_sent),
            stripe_customer_id: Set(subscription.stripe_customer_id),
            stripe_payment_intent_id: Set(subscription.stripe_payment_intent_id),
            stripe_subscription_id: Set(None),
            expiry_warning_sent: Set(false),
            created_at: Set(Utc::now()),
        };
        let created = model.insert(self.connection()).await.map_err(map_db_err)?;
        Ok(subscription_to_domain(created))
    }

    async fn find_active_subscription(
        &self,
        tenant_id: Uuid,
    ) -> StorageResult<Option<ActiveSubscription>> {
        let Some(model) = subscriptions::Entity::find()
            .filter(subscriptions::Column::TenantId.eq(tenant_id))
            .filter(subscriptions::Column::Status.eq(SubscriptionStatusDb::Active))
            .order_by_desc(subscriptions::Column::CurrentPeriodEnd)
            .one(self.connection())
            .await
            .map_err(map_db_err)?
        else {
            return Ok(None);
        };

        let plan = subscription_plans::Entity::find_by_id(model.plan_id)
            .one(self.connection())
            .await
            .map_err(map_db_err)?
            .ok_or_else(|| {
                StorageError::Database(format!(
                    "subscription {} references missing plan {}",
                    model.id, model.plan_id
                ))
            })?;

        Ok(Some(ActiveSubscription {
            subscription: subscription_to_domain(model),
            plan: plan_to_domain(plan)?,
        }))
    }

    async fn find_subscription_by_payment_intent(
        &self,
        payment_intent_id: &str,
    ) -> StorageResult<Option<Subscription>> {
        let maybe = subscriptions::Entity::find()
            .filter(subscriptions::Column::StripePaymentIntentId.eq(payment_intent_id))
            .one(self.connection())
            .await
            .map_err(map_db_err)?;
        Ok(maybe.map(subscription_to_domain))
    }

    async fn find_subscription_by_stripe_id(
        &self,
        stripe_subscription_id: &str,
    ) -> StorageResult<Option<Subscription>> {
        let maybe = subscriptions::Entity::find()
            .filter(subscriptions::Column::StripeSubscriptionId.eq(stripe_subscription_id))
            .one(self.connection())
            .await
            .map_err(map_db_err)?;
        Ok(maybe.map(subscription_to_domain))
    }

    async fn update_subscription(
        &self,
        id: Uuid,
        patch: SubscriptionPatch,
    ) -> StorageResult<Option<Subscription>> {
        let Some(model) = subscriptions::Entity::find_by_id(id)
            .one(self.connection())
            .await
            .map_err(map_db_err)?
        else {
            return Ok(None);
        };

        let mut active: subscriptions::ActiveModel = model.into();
        if let Some(status) = patch.status {
            active.status = Set(status.into());
        }
        if let Some(start) = patch.current_period_start {
            active.current_period_start = Set(start);
        }
        if let Some(end) = patch.current_period_end {
            active.current_period_end = Set(end);
        }
        if let Some(stripe_id) = patch.stripe_subscription_id {
            active.stripe_subscription_id = Set(Some(stripe_id));
        }
        let updated = active.update(self.connection()).await.map_err(map_db_err)?;
        Ok(Some(subscription_to_domain(updated)))
    }

    async fn expire_subscription(
        &self,
        subscription_id: Uuid,
        tenant_id: Uuid,
    ) -> StorageResult<()> {
        let txn = self.connection().begin().await.map_err(map_db_err)?;
        subscriptions::Entity::update_many()
            .col_expr(
                subscriptions::Column::Status,
                Expr::value(SubscriptionStatusDb::Expired.to_value()),
            )
            .filter(subscriptions::Column::Id.eq(subscription_id))
            .exec(&txn)
            .await
            .map_err(map_db_err)?;
        tenants::Entity::update_many()
            .col_expr(tenants::Column::IsActive, Expr::value(false))
            .filter(tenants::Column::Id.eq(tenant_id))
            .exec(&txn)
            .await
            .map_err(map_db_err)?;
        txn.commit().await.map_err(map_db_err)
    }

    async fn list_active_subscriptions(&self) -> StorageResult<Vec<ActiveSubscription>> {
        let rows = subscriptions::Entity::find()
            .filter(subscriptions::Column::Status.eq(SubscriptionStatusDb::Active))
            .order_by_asc(subscriptions::Column::CurrentPeriodEnd)
            .all(self.connection())
            .await
            .map_err(map_db_err)?;
        let plans = subscription_plans::Entity::find()
            .all(self.connection())
            .await
            .map_err(map_db_err)?
            .into_iter()
            .map(|plan| plan_to_domain(plan).map(|plan| (plan.id, plan)))
            .collect::<StorageResult<HashMap<_, _>>>()?;

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let plan = plans.get(&row.plan_id)?.clone();
                Some(ActiveSubscription {
                    subscription: subscription_to_domain(row),
                    plan,
                })
            })
            .collect())
    }

    async fn mark_expiry_warning_sent(&self, subscription_id: Uuid) -> StorageResult<()> {
        subscriptions::Entity::update_many()
            .col_expr(subscriptions::Column::ExpiryWarningSent, Expr::value(true))
            .filter(subscriptions::Column::Id.eq(subscription_id))
            .exec(self.connection())
            .await
            .map_err(map_db_err)?;
        Ok(())
    }

    async fn mark_credentials_sent(&self, subscription_id: Uuid) -> StorageResult<()> {
        subscriptions::Entity::update_many()
            .col_expr(subscriptions::Column::CredentialsSent, Expr::value(true))
            .filter(subscriptions::Column::Id.eq(subscription_id))
            .exec(self.connection())
            .await
            .map_err(map_db_err)?;
        Ok(())
    }

    async fn delete_subscription(&self, id: Uuid) -> StorageResult<bool> {
        let result = subscriptions::Entity::delete_by_id(id)
            .exec(self.connection())
            .await
            .map_err(map_db_err)?;
        Ok(result.rows_affected > 0)
    }
}

fn subscription_to_domain(model: subscriptions::Model) -> Subscription {
    Subscription {
        id: model.id,
        tenant_id: model.tenant_id,
        plan_id: model.plan_id,
        status: SubscriptionStatus::from(model.status),
        current_period_start: model.current_period_start,
        current_period_end: model.current_period_end,
        admin_username: model.admin_username,
        admin_password_hash: model.admin_password_hash,
        credentials_sent: model.credentials_sent,
        stripe_customer_id: model.stripe_customer_id,
        stripe_payment_intent_id: model.stripe_payment_intent_id,
        stripe_subscription_id: model.stripe_subscription_id,
        expiry_warning_sent: model.expiry_warning_sent,
        created_at: model.created_at,
    }
}
