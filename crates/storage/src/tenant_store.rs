use chrono::Utc;
use picshare_domain::model::{NewTenant, Tenant, TenantUpdate};
use picshare_domain::storage::{StorageResult, TenantStore};
use sea_orm::sea_query::{Expr, Query};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde_json::json;
use uuid::Uuid;

use crate::entity::{
    admins, billing_history, comments, images, likes, payments, subscriptions, tenants,
};
use crate::errors::map_db_err;
use crate::SeaOrmStorage;

#[async_trait::async_trait]
impl TenantStore for SeaOrmStorage {
    async fn insert_tenant(&self, tenant: NewTenant) -> StorageResult<Tenant> {
        let model = tenants::ActiveModel {
            id: Set(Uuid::new_v4()),
            slug: Set(tenant.slug),
            name: Set(tenant.name),
            description: Set(tenant.description),
            owner_email: Set(tenant.owner_email),
            owner_phone: Set(tenant.owner_phone),
            is_active: Set(tenant.is_active),
            is_public: Set(true),
            payment_enabled: Set(tenant.payment_enabled),
            price_amount: Set(tenant.price_amount),
            price_currency: Set(tenant.price_currency),
            display_duration: Set(picshare_domain::model::DEFAULT_DISPLAY_DURATION),
            image_expiry_hours: Set(picshare_domain::model::DEFAULT_IMAGE_EXPIRY_HOURS),
            max_images_per_user: Set(None),
            theme_settings: Set(json!({})),
            display_settings: Set(json!({})),
            created_at: Set(Utc::now()),
        };
        let created = model.insert(self.connection()).await.map_err(map_db_err)?;
        Ok(tenant_to_domain(created))
    }

    async fn find_tenant(&self, id: Uuid) -> StorageResult<Option<Tenant>> {
        let maybe = tenants::Entity::find_by_id(id)
            .one(self.connection())
            .await
            .map_err(map_db_err)?;
        Ok(maybe.map(tenant_to_domain))
    }

    async fn find_tenant_by_slug(&self, slug: &str) -> StorageResult<Option<Tenant>> {
        let maybe = tenants::Entity::find()
            .filter(tenants::Column::Slug.eq(slug))
            .one(self.connection())
            .await
            .map_err(map_db_err)?;
        Ok(maybe.map(tenant_to_domain))
    }

    async fn slug_exists(&self, slug: &str) -> StorageResult<bool> {
        let count = tenants::Entity::find()
            .filter(tenants::Column::Slug.eq(slug))
            .count(self.connection())
            .await
            .map_err(map_db_err)?;
        Ok(count > 0)
    }

    async fn update_tenant(
        &self,
        id: Uuid,
        update: TenantUpdate,
    ) -> StorageResult<Option<Tenant>> {
        let Some(model) = tenants::Entity::find_by_id(id)
            .one(self.connection())
            .await
            .map_err(map_db_err)?
        else {
            return Ok(None);
        };

        let mut active: tenants::ActiveModel = model.into();
        let TenantUpdate {
            slug,
            name,
            description,
            owner_email,
            owner_phone,
            is_active,
            is_public,
            payment_enabled,
            price_amount,
            price_currency,
            display_duration,
            image_expiry_hours,
            max_images_per_user,
            theme_settings,
            display_settings,
        } = update;
        if let Some(v) = slug {
            active.slug = Set(v);
        }
        if let Some(v) = name {
            active.name = Set(v);
        }
        if let Some(v) = description {
            active.description = Set(Some(v));
        }
        if let Some(v) = owner_email {
            active.owner_email = Set(Some(v));
        }
        if let Some(v) = owner_phone {
            active.owner_phone = Set(Some(v));
        }
        if let Some(v) = is_active {
            active.is_active = Set(v);
        }
        if let Some(v) = is_public {
            active.is_public = Set(v);
        }
        if let Some(v) = payment_enabled {
            active.payment_enabled = Set(v);
        }
        if let Some(v) = price_amount {
            active.price_amount = Set(v);
        }
        if let Some(v) = price_currency {
            active.price_currency = Set(v);
        }
        if let Some(v) = display_duration {
            active.display_duration = Set(v);
        }
        if let Some(v) = image_expiry_hours {
            active.image_expiry_hours = Set(v);
        }
        if let Some(v) = max_images_per_user {
            active.max_images_per_user = Set(Some(v));
        }
        if let Some(v) = theme_settings {
            active.theme_settings = Set(v);
        }
        if let Some(v) = display_settings {
            active.display_settings = Set(v);
        }

        let updated = active.update(self.connection()).await.map_err(map_db_err)?;
        Ok(Some(tenant_to_domain(updated)))
    }

    async fn set_tenant_active(&self, id: Uuid, active: bool) -> StorageResult<()> {
        tenants::Entity::update_many()
            .col_expr(tenants::Column::IsActive, Expr::value(active))
            .filter(tenants::Column::Id.eq(id))
            .exec(self.connection())
            .await
            .map_err(map_db_err)?;
        Ok(())
    }

    async fn list_tenants(&self, active: Option<bool>) -> StorageResult<Vec<Tenant>> {
        let mut query = tenants::Entity::find().order_by_desc(tenants::Column::CreatedAt);
        if let Some(active) = active {
            query = query.filter(tenants::Column::IsActive.eq(active));
        }
        let rows = query.all(self.connection()).await.map_err(map_db_err)?;
        Ok(rows.into_iter().map(tenant_to_domain).collect())
    }

    async fn delete_tenant(&self, id: Uuid) -> StorageResult<bool> {
        let txn = self.connection().begin().await.map_err(map_db_err)?;

        let tenant_images = Query::select()
            .column(images::Column::Id)
            .from(images::Entity)
            .and_where(images::Column::TenantId.eq(id))
            .to_owned();
        likes::Entity::delete_many()
            .filter(likes::Column::ImageId.in_subquery(tenant_images))
            .exec(&txn)
            .await
            .map_err(map_db_err)?;
        comments::Entity::delete_many()
            .filter(comments::Column::TenantId.eq(id))
            .exec(&txn)
            .await
            .map_err(map_db_err)?;
        images::Entity::delete_many()
            .filter(images::Column::TenantId.eq(id))
            .exec(&txn)
            .await
            .map_err(map_db_err)?;
        payments::Entity::delete_many()
            .filter(payments::Column::TenantId.eq(id))
            .exec(&txn)
            .await
            .map_err(map_db_err)?;
        billing_history::Entity::delete_many()
            .filter(billing_history::Column::TenantId.eq(id))
            .exec(&txn)
            .await
            .map_err(map_db_err)?;
        subscriptions::Entity::delete_many()
            .filter(subscriptions::Column::TenantId.eq(id))
            .exec(&txn)
            .await
            .map_err(map_db_err)?;
        admins::Entity::delete_many()
            .filter(admins::Column::TenantId.eq(id))
            .exec(&txn)
            .await
            .map_err(map_db_err)?;
        let result = tenants::Entity::delete_by_id(id)
            .exec(&txn)
            .await
            .map_err(map_db_err)?;

        txn.commit().await.map_err(map_db_err)?;
        Ok(result.rows_affected > 0)
    }
}

pub(crate) fn tenant_to_domain(model: tenants::Model) -> Tenant {
    Tenant {
        id: model.id,
        slug: model.slug,
        name: model.name,
        description: model.description,
        owner_email: model.owner_email,
        owner_phone: model.owner_phone,
        is_active: model.is_active,
        is_public: model.is_public,
        payment_enabled: model.payment_enabled,
        price_amount: model.price_amount,
        price_currency: model.price_currency,
        display_duration: model.display_duration,
        image_expiry_hours: model.image_expiry_hours,
        max_images_per_user: model.max_images_per_user,
        theme_settings: model.theme_settings,
        display_settings: model.display_settings,
        created_at: model.created_at,
    }
}
