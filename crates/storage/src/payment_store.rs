use chrono::Utc;
use picshare_domain::model::{NewPayment, Payment, PaymentStatus};
use picshare_domain::storage::{PaymentStore, StorageResult};
use sea_orm::sea_query::Expr;
use sea_orm::ActiveEnum;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use uuid::Uuid;

use crate::entity::payments::{self, PaymentStatusDb};
use crate::errors::map_db_err;
use crate::SeaOrmStorage;

#[async_trait::async_trait]
impl PaymentStore for SeaOrmStorage {
    async fn insert_payment(&self, payment: NewPayment) -> StorageResult<Payment> {
        let model = payments::ActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set(payment.tenant_id),
            stripe_payment_intent_id: Set(payment.stripe_payment_intent_id),
            amount: Set(payment.amount),
            currency: Set(payment.currency),
            status: Set(payment.status.into()),
            session_id: Set(payment.session_id),
            metadata: Set(payment.metadata),
            created_at: Set(Utc::now()),
        };
        let created = model.insert(self.connection()).await.map_err(map_db_err)?;
        Ok(payment_to_domain(created))
    }

    async fn find_payment_by_intent(
        &self,
        payment_intent_id: &str,
    ) -> StorageResult<Option<Payment>> {
        let maybe = payments::Entity::find()
            .filter(payments::Column::StripePaymentIntentId.eq(payment_intent_id))
            .one(self.connection())
            .await
            .map_err(map_db_err)?;
        Ok(maybe.map(payment_to_domain))
    }

    async fn update_payment_status(
        &self,
        payment_intent_id: &str,
        status: PaymentStatus,
    ) -> StorageResult<bool> {
        let result = payments::Entity::update_many()
            .col_expr(
                payments::Column::Status,
                Expr::value(PaymentStatusDb::from(status).to_value()),
            )
            .filter(payments::Column::StripePaymentIntentId.eq(payment_intent_id))
            .exec(self.connection())
            .await
            .map_err(map_db_err)?;
        Ok(result.rows_affected > 0)
    }
}

fn payment_to_domain(model: payments::Model) -> Payment {
    Payment {
        id: model.id,
        tenant_id: model.tenant_id,
        stripe_payment_intent_id: model.stripe_payment_intent_id,
        amount: model.amount,
        currency: model.currency,
        status: model.status.into(),
        session_id: model.session_id,
        metadata: model.metadata,
        created_at: model.created_at,
    }
}
