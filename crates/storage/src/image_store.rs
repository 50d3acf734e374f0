use chrono::Utc;
use picshare_domain::model::{
    Image, ImageStats, ImageTransition, ModerationStatus, NewImage,
};
use picshare_domain::storage::{ImageStore, StorageResult};
use sea_orm::sea_query::{
    Expr, PostgresQueryBuilder, Query, SqliteQueryBuilder, UpdateStatement,
};
use sea_orm::{
    ActiveEnum, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseBackend, EntityTrait,
    FromQueryResult, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, Statement,
    TransactionTrait,
};
use uuid::Uuid;

use crate::entity::images::{self, ModerationStatusDb};
use crate::entity::{comments, likes};
use crate::errors::{map_db_err, StorageError};
use crate::SeaOrmStorage;

/// `UPDATE ... RETURNING` is only emitted for backends that support it.
pub(crate) fn returning_statement(
    backend: DatabaseBackend,
    query: &UpdateStatement,
) -> StorageResult<Statement> {
    let (sql, values) = match backend {
        DatabaseBackend::Sqlite => query.build(SqliteQueryBuilder),
        DatabaseBackend::Postgres => query.build(PostgresQueryBuilder),
        DatabaseBackend::MySql => {
            return Err(StorageError::Database(
                "mysql backend is not supported".into(),
            ))
        }
    };
    Ok(Statement::from_sql_and_values(backend, sql, values))
}

#[async_trait::async_trait]
impl ImageStore for SeaOrmStorage {
    async fn insert_image(&self, image: NewImage) -> StorageResult<Image> {
        let model = images::ActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set(image.tenant_id),
            payment_id: Set(image.payment_id),
            original_filename: Set(image.original_filename),
            file_path: Set(image.file_path),
            thumbnail_path: Set(image.thumbnail_path),
            file_url: Set(image.file_url),
            thumbnail_url: Set(image.thumbnail_url),
            file_size: Set(image.file_size),
            width: Set(image.width),
            height: Set(image.height),
            mime_type: Set(image.mime_type),
            status: Set(ModerationStatusDb::Pending),
            approved_by: Set(None),
            approved_at: Set(None),
            rejection_reason: Set(None),
            expires_at: Set(None),
            session_id: Set(image.session_id),
            caption: Set(image.caption),
            like_count: Set(0),
            comment_count: Set(0),
            uploaded_at: Set(Utc::now()),
        };
        let created = model.insert(self.connection()).await.map_err(map_db_err)?;
        Ok(image_to_domain(created))
    }

    async fn find_image(&self, tenant_id: Uuid, image_id: Uuid) -> StorageResult<Option<Image>> {
        let maybe = images::Entity::find_by_id(image_id)
            .filter(images::Column::TenantId.eq(tenant_id))
            .one(self.connection())
            .await
            .map_err(map_db_err)?;
        Ok(maybe.map(image_to_domain))
    }

    async fn list_images(
        &self,
        tenant_id: Uuid,
        status: Option<ModerationStatus>,
    ) -> StorageResult<Vec<Image>> {
        let mut select = images::Entity::find().filter(images::Column::TenantId.eq(tenant_id));
        if let Some(status) = status {
            select = select.filter(images::Column::Status.eq(ModerationStatusDb::from(status)));
        }
        let rows = select
            .order_by_desc(images::Column::UploadedAt)
            .all(self.connection())
            .await
            .map_err(map_db_err)?;
        Ok(rows.into_iter().map(image_to_domain).collect())
    }

    async fn count_images(&self, tenant_id: Uuid) -> StorageResult<u64> {
        images::Entity::find()
            .filter(images::Column::TenantId.eq(tenant_id))
            .count(self.connection())
            .await
            .map_err(map_db_err)
    }

    async fn transition_image(
        &self,
        tenant_id: Uuid,
        image_id: Uuid,
        transition: ImageTransition,
    ) -> StorageResult<Option<Image>> {
        let backend = self.connection().get_database_backend();

        let mut query = Query::update();
        query.table(images::Entity);
        match &transition {
            ImageTransition::Approve {
                approved_by,
                approved_at,
                expires_at,
            } => {
                query.value(
                    images::Column::Status,
                    ModerationStatusDb::Approved.to_value(),
                );
                query.value(images::Column::ApprovedBy, *approved_by);
                query.value(images::Column::ApprovedAt, *approved_at);
                query.value(images::Column::ExpiresAt, *expires_at);
            }
            ImageTransition::Reject { reason, .. } => {
                query.value(
                    images::Column::Status,
                    ModerationStatusDb::Rejected.to_value(),
                );
                query.value(images::Column::RejectionReason, reason.clone());
            }
        }
        query.and_where(images::Column::Id.eq(image_id));
        query.and_where(images::Column::TenantId.eq(tenant_id));
        query.and_where(images::Column::Status.eq(ModerationStatusDb::Pending));
        query.returning_all();

        let stmt = returning_statement(backend, &query)?;
        let maybe_row = self
            .connection()
            .query_one(stmt)
            .await
            .map_err(map_db_err)?;

        match maybe_row {
            Some(row) => {
                let updated = images::Model::from_query_result(&row, "")
                    .map_err(StorageError::from_source)?;
                Ok(Some(image_to_domain(updated)))
            }
            None => Ok(None),
        }
    }

    async fn delete_image(&self, tenant_id: Uuid, image_id: Uuid) -> StorageResult<bool> {
        let txn = self.connection().begin().await.map_err(map_db_err)?;
        let owned = images::Entity::find_by_id(image_id)
            .filter(images::Column::TenantId.eq(tenant_id))
            .count(&txn)
            .await
            .map_err(map_db_err)?;
        if owned == 0 {
            return Ok(false);
        }

        likes::Entity::delete_many()
            .filter(likes::Column::ImageId.eq(image_id))
            .exec(&txn)
            .await
            .map_err(map_db_err)?;
        comments::Entity::delete_many()
            .filter(comments::Column::ImageId.eq(image_id))
            .exec(&txn)
            .await
            .map_err(map_db_err)?;
        let result = images::Entity::delete_by_id(image_id)
            .exec(&txn)
            .await
            .map_err(map_db_err)?;
        txn.commit().await.map_err(map_db_err)?;
        Ok(result.rows_affected > 0)
    }

    async fn image_stats(&self, tenant_id: Uuid) -> StorageResult<ImageStats> {
        #[derive(FromQueryResult)]
        struct StatusCount {
            status: ModerationStatusDb,
            images: i64,
            likes: Option<i64>,
            comments: Option<i64>,
        }

        let rows = images::Entity::find()
            .select_only()
            .column(images::Column::Status)
            .column_as(Expr::col(images::Column::Id).count(), "images")
            .column_as(Expr::col(images::Column::LikeCount).sum(), "likes")
            .column_as(Expr::col(images::Column::CommentCount).sum(), "comments")
            .filter(images::Column::TenantId.eq(tenant_id))
            .group_by(images::Column::Status)
            .into_model::<StatusCount>()
            .all(self.connection())
            .await
            .map_err(map_db_err)?;

        let mut stats = ImageStats::default();
        for row in rows {
            let count = u64::try_from(row.images).unwrap_or_default();
            stats.total += count;
            stats.likes += u64::try_from(row.likes.unwrap_or_default()).unwrap_or_default();
            stats.comments += u64::try_from(row.comments.unwrap_or_default()).unwrap_or_default();
            match row.status {
                ModerationStatusDb::Pending => stats.pending += count,
                ModerationStatusDb::Approved => stats.approved += count,
                ModerationStatusDb::Rejected => stats.rejected += count,
            }
        }
        Ok(stats)
    }
}

fn image_to_domain(model: images::Model) -> Image {
    Image {
        id: model.id,
        tenant_id: model.tenant_id,
        payment_id: model.payment_id,
        original_filename: model.original_filename,
        file_path: model.file_path,
        thumbnail_path: model.thumbnail_path,
        file_url: model.file_url,
        thumbnail_url: model.thumbnail_url,
        file_size: model.file_size,
        width: model.width,
        height: model.height,
        mime_type: model.mime_type,
        status: model.status.into(),
        approved_by: model.approved_by,
        approved_at: model.approved_at,
        rejection_reason: model.rejection_reason,
        expires_at: model.expires_at,
        session_id: model.session_id,
        caption: model.caption,
        like_count: model.like_count,
        comment_count: model.comment_count,
        uploaded_at: model.uploaded_at,
    }
}
