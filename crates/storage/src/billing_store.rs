use picshare_domain::model::{BillingRecord, BillingStatus, NewBillingRecord};
use picshare_domain::storage::{BillingStore, StorageResult};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use uuid::Uuid;

use crate::entity::billing_history::{self, BillingStatusDb};
use crate::errors::map_db_err;
use crate::SeaOrmStorage;

#[async_trait::async_trait]
impl BillingStore for SeaOrmStorage {
    async fn append_billing_record(
        &self,
        record: NewBillingRecord,
    ) -> StorageResult<BillingRecord> {
        let model = billing_history::ActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set(record.tenant_id),
            subscription_id: Set(record.subscription_id),
            amount: Set(record.amount),
            currency: Set(record.currency),
            status: Set(record.status.into()),
            description: Set(record.description),
            stripe_payment_intent_id: Set(record.stripe_payment_intent_id),
            paid_at: Set(record.paid_at),
        };
        let created = model.insert(self.connection()).await.map_err(map_db_err)?;
        Ok(billing_to_domain(created))
    }

    async fn list_billing_records(&self, tenant_id: Uuid) -> StorageResult<Vec<BillingRecord>> {
        let rows = billing_history::Entity::find()
            .filter(billing_history::Column::TenantId.eq(tenant_id))
            .order_by_desc(billing_history::Column::PaidAt)
            .all(self.connection())
            .await
            .map_err(map_db_err)?;
        Ok(rows.into_iter().map(billing_to_domain).collect())
    }

    async fn find_billing_record_by_intent(
        &self,
        payment_intent_id: &str,
        status: BillingStatus,
    ) -> StorageResult<Option<BillingRecord>> {
        let row = billing_history::Entity::find()
            .filter(billing_history::Column::StripePaymentIntentId.eq(payment_intent_id))
            .filter(billing_history::Column::Status.eq(BillingStatusDb::from(status)))
            .one(self.connection())
            .await
            .map_err(map_db_err)?;
        Ok(row.map(billing_to_domain))
    }

    async fn delete_billing_record(&self, id: Uuid) -> StorageResult<bool> {
        let result = billing_history::Entity::delete_by_id(id)
            .exec(self.connection())
            .await
            .map_err(map_db_err)?;
        Ok(result.rows_affected > 0)
    }
}

fn billing_to_domain(model: billing_history::Model) -> BillingRecord {
    BillingRecord {
        id: model.id,
        tenant_id: model.tenant_id,
        subscription_id: model.subscription_id,
        amount: model.amount,
        currency: model.currency,
        status: model.status.into(),
        description: model.description,
        stripe_payment_intent_id: model.stripe_payment_intent_id,
        paid_at: model.paid_at,
    }
}
