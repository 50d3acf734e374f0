use chrono::Utc;
use picshare_domain::model::{Admin, AdminDeletion, NewAdmin};
use picshare_domain::storage::{AdminStore, StorageResult};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::entity::admins;
use crate::errors::map_db_err;
use crate::SeaOrmStorage;

#[async_trait::async_trait]
impl AdminStore for SeaOrmStorage {
    async fn insert_admin(&self, admin: NewAdmin) -> StorageResult<Admin> {
        let model = admins::ActiveModel {
            id: Set(Uuid::new_v4()),
            username: Set(admin.username),
            password_hash: Set(admin.password_hash),
            email: Set(admin.email),
            tenant_id: Set(admin.tenant_id),
            is_super_admin: Set(admin.is_super_admin),
            role: Set(admin.role),
            created_at: Set(Utc::now()),
        };
        let created = model.insert(self.connection()).await.map_err(map_db_err)?;
        Ok(admin_to_domain(created))
    }

    async fn find_admin(&self, id: Uuid) -> StorageResult<Option<Admin>> {
        let maybe = admins::Entity::find_by_id(id)
            .one(self.connection())
            .await
            .map_err(map_db_err)?;
        Ok(maybe.map(admin_to_domain))
    }

    async fn find_admin_for_login(
        &self,
        username: &str,
        tenant_id: Uuid,
    ) -> StorageResult<Option<Admin>> {
        let maybe = admins::Entity::find()
            .filter(admins::Column::Username.eq(username))
            .filter(
                Condition::any()
                    .add(admins::Column::TenantId.eq(tenant_id))
                    .add(admins::Column::IsSuperAdmin.eq(true)),
            )
            .one(self.connection())
            .await
            .map_err(map_db_err)?;
        Ok(maybe.map(admin_to_domain))
    }

    async fn find_super_admin(&self, username: &str) -> StorageResult<Option<Admin>> {
        let maybe = admins::Entity::find()
            .filter(admins::Column::Username.eq(username))
            .filter(admins::Column::IsSuperAdmin.eq(true))
            .one(self.connection())
            .await
            .map_err(map_db_err)?;
        Ok(maybe.map(admin_to_domain))
    }

    async fn username_exists(&self, username: &str) -> StorageResult<bool> {
        let count = admins::Entity::find()
            .filter(admins::Column::Username.eq(username))
            .count(self.connection())
            .await
            .map_err(map_db_err)?;
        Ok(count > 0)
    }

    async fn list_admins(&self) -> StorageResult<Vec<Admin>> {
        let rows = admins::Entity::find()
            .order_by_desc(admins::Column::CreatedAt)
            .all(self.connection())
            .await
            .map_err(map_db_err)?;
        Ok(rows.into_iter().map(admin_to_domain).collect())
    }

    async fn delete_admin_keeping_super_admin(&self, id: Uuid) -> StorageResult<AdminDeletion> {
        let txn = self.connection().begin().await.map_err(map_db_err)?;
        // Row locks serialize concurrent removals on Postgres; SQLite already
        // allows a single writer.
        let super_admins = admins::Entity::find()
            .filter(admins::Column::IsSuperAdmin.eq(true))
            .lock_exclusive()
            .all(&txn)
            .await
            .map_err(map_db_err)?;
        let Some(target) = admins::Entity::find_by_id(id)
            .one(&txn)
            .await
            .map_err(map_db_err)?
        else {
            return Ok(AdminDeletion::NotFound);
        };
        if target.is_super_admin && super_admins.len() <= 1 {
            return Ok(AdminDeletion::LastSuperAdmin);
        }
        admins::Entity::delete_by_id(id)
            .exec(&txn)
            .await
            .map_err(map_db_err)?;
        txn.commit().await.map_err(map_db_err)?;
        Ok(AdminDeletion::Deleted)
    }

    async fn delete_admin(&self, id: Uuid) -> StorageResult<bool> {
        let result = admins::Entity::delete_by_id(id)
            .exec(self.connection())
            .await
            .map_err(map_db_err)?;
        Ok(result.rows_affected > 0)
    }
}

fn admin_to_domain(model: admins::Model) -> Admin {
    Admin {
        id: model.id,
        username: model.username,
        password_hash: model.password_hash,
        email: model.email,
        tenant_id: model.tenant_id,
        is_super_admin: model.is_super_admin,
        role: model.role,
        created_at: model.created_at,
    }
}
