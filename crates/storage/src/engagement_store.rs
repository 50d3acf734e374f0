use chrono::Utc;
use picshare_domain::model::{Comment, Like, NewComment};
use picshare_domain::storage::{EngagementStore, StorageResult};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::entity::{comments, images, likes};
use crate::errors::map_db_err;
use crate::SeaOrmStorage;

#[async_trait::async_trait]
impl EngagementStore for SeaOrmStorage {
    async fn add_like(&self, image_id: Uuid, session_id: &str) -> StorageResult<Like> {
        let txn = self.connection().begin().await.map_err(map_db_err)?;
        let model = likes::ActiveModel {
            id: Set(Uuid::new_v4()),
            image_id: Set(image_id),
            session_id: Set(session_id.to_string()),
            created_at: Set(Utc::now()),
        };
        let created = model.insert(&txn).await.map_err(map_db_err)?;
        images::Entity::update_many()
            .col_expr(
                images::Column::LikeCount,
                Expr::col(images::Column::LikeCount).add(1),
            )
            .filter(images::Column::Id.eq(image_id))
            .exec(&txn)
            .await
            .map_err(map_db_err)?;
        txn.commit().await.map_err(map_db_err)?;

        Ok(Like {
            id: created.id,
            image_id: created.image_id,
            session_id: created.session_id,
            created_at: created.created_at,
        })
    }

    async fn remove_like(&self, image_id: Uuid, session_id: &str) -> StorageResult<bool> {
        let txn = self.connection().begin().await.map_err(map_db_err)?;
        let removed = likes::Entity::delete_many()
            .filter(likes::Column::ImageId.eq(image_id))
            .filter(likes::Column::SessionId.eq(session_id))
            .exec(&txn)
            .await
            .map_err(map_db_err)?;
        if removed.rows_affected == 0 {
            return Ok(false);
        }

        images::Entity::update_many()
            .col_expr(
                images::Column::LikeCount,
                Expr::col(images::Column::LikeCount).sub(1),
            )
            .filter(images::Column::Id.eq(image_id))
            .filter(images::Column::LikeCount.gt(0))
            .exec(&txn)
            .await
            .map_err(map_db_err)?;
        txn.commit().await.map_err(map_db_err)?;
        Ok(true)
    }

    async fn has_liked(&self, image_id: Uuid, session_id: &str) -> StorageResult<bool> {
        let count = likes::Entity::find()
            .filter(likes::Column::ImageId.eq(image_id))
            .filter(likes::Column::SessionId.eq(session_id))
            .count(self.connection())
            .await
            .map_err(map_db_err)?;
        Ok(count > 0)
    }

    async fn liked_image_ids(
        &self,
        session_id: &str,
        image_ids: &[Uuid],
    ) -> StorageResult<Vec<Uuid>> {
        if image_ids.is_empty() {
            return Ok(Vec::new());
        }
        likes::Entity::find()
            .select_only()
            .column(likes::Column::ImageId)
            .filter(likes::Column::SessionId.eq(session_id))
            .filter(likes::Column::ImageId.is_in(image_ids.iter().copied()))
            .into_tuple::<Uuid>()
            .all(self.connection())
            .await
            .map_err(map_db_err)
    }

    async fn add_comment(&self, comment: NewComment) -> StorageResult<Comment> {
        let txn = self.connection().begin().await.map_err(map_db_err)?;
        let model = comments::ActiveModel {
            id: Set(Uuid::new_v4()),
            image_id: Set(comment.image_id),
            tenant_id: Set(comment.tenant_id),
            session_id: Set(comment.session_id),
            content: Set(comment.content),
            is_hidden: Set(false),
            created_at: Set(Utc::now()),
        };
        let created = model.insert(&txn).await.map_err(map_db_err)?;
        images::Entity::update_many()
            .col_expr(
                images::Column::CommentCount,
                Expr::col(images::Column::CommentCount).add(1),
            )
            .filter(images::Column::Id.eq(comment.image_id))
            .exec(&txn)
            .await
            .map_err(map_db_err)?;
        txn.commit().await.map_err(map_db_err)?;
        Ok(comment_to_domain(created))
    }

    async fn list_comments(&self, image_id: Uuid) -> StorageResult<Vec<Comment>> {
        let rows = comments::Entity::find()
            .filter(comments::Column::ImageId.eq(image_id))
            .filter(comments::Column::IsHidden.eq(false))
            .order_by_desc(comments::Column::CreatedAt)
            .all(self.connection())
            .await
            .map_err(map_db_err)?;
        Ok(rows.into_iter().map(comment_to_domain).collect())
    }

    async fn hide_comment(&self, tenant_id: Uuid, comment_id: Uuid) -> StorageResult<bool> {
        let txn = self.connection().begin().await.map_err(map_db_err)?;
        let Some(comment) = comments::Entity::find_by_id(comment_id)
            .filter(comments::Column::TenantId.eq(tenant_id))
            .one(&txn)
            .await
            .map_err(map_db_err)?
        else {
            return Ok(false);
        };
        if comment.is_hidden {
            return Ok(true);
        }

        comments::Entity::update_many()
            .col_expr(comments::Column::IsHidden, Expr::value(true))
            .filter(comments::Column::Id.eq(comment_id))
            .exec(&txn)
            .await
            .map_err(map_db_err)?;
        images::Entity::update_many()
            .col_expr(
                images::Column::CommentCount,
                Expr::col(images::Column::CommentCount).sub(1),
            )
            .filter(images::Column::Id.eq(comment.image_id))
            .filter(images::Column::CommentCount.gt(0))
            .exec(&txn)
            .await
            .map_err(map_db_err)?;
        txn.commit().await.map_err(map_db_err)?;
        Ok(true)
    }
}

fn comment_to_domain(model: comments::Model) -> Comment {
    Comment {
        id: model.id,
        image_id: model.image_id,
        tenant_id: model.tenant_id,
        session_id: model.session_id,
        content: model.content,
        is_hidden: model.is_hidden,
        created_at: model.created_at,
    }
}
