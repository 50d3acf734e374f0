use sea_orm::sea_query::{ColumnDef, Index, IndexCreateStatement, Table, TableCreateStatement};
use sea_orm::{ConnectionTrait, DatabaseBackend, DatabaseConnection};

use crate::entity::{
    admins, billing_history, comments, images, likes, payments, subscription_plans,
    subscriptions, tenants,
};
use crate::errors::StorageError;
use picshare_domain::storage::StorageResult;

pub async fn run_migrations(db: &DatabaseConnection) -> StorageResult<()> {
    let backend = db.get_database_backend();

    let tenants_table = Table::create()
        .table(tenants::Entity)
        .col(&mut uuid_pk(tenants::Column::Id))
        .col(
            ColumnDef::new(tenants::Column::Slug)
                .string_len(64)
                .not_null()
                .unique_key(),
        )
        .col(ColumnDef::new(tenants::Column::Name).string().not_null())
        .col(ColumnDef::new(tenants::Column::Description).text().null())
        .col(ColumnDef::new(tenants::Column::OwnerEmail).string().null())
        .col(ColumnDef::new(tenants::Column::OwnerPhone).string_len(32).null())
        .col(ColumnDef::new(tenants::Column::IsActive).boolean().not_null().default(true))
        .col(ColumnDef::new(tenants::Column::IsPublic).boolean().not_null().default(true))
        .col(
            ColumnDef::new(tenants::Column::PaymentEnabled)
                .boolean()
                .not_null()
                .default(false),
        )
        .col(
            ColumnDef::new(tenants::Column::PriceAmount)
                .big_integer()
                .not_null()
                .default(0),
        )
        .col(
            ColumnDef::new(tenants::Column::PriceCurrency)
                .string_len(3)
                .not_null()
                .default("thb"),
        )
        .col(
            ColumnDef::new(tenants::Column::DisplayDuration)
                .integer()
                .not_null()
                .default(10),
        )
        .col(
            ColumnDef::new(tenants::Column::ImageExpiryHours)
                .integer()
                .not_null()
                .default(1),
        )
        .col(ColumnDef::new(tenants::Column::MaxImagesPerUser).integer().null())
        .col(ColumnDef::new(tenants::Column::ThemeSettings).json().not_null())
        .col(ColumnDef::new(tenants::Column::DisplaySettings).json().not_null())
        .col(&mut timestamp(tenants::Column::CreatedAt))
        .to_owned();
    create_table(db, backend, tenants_table).await?;

    let plans_table = Table::create()
        .table(subscription_plans::Entity)
        .col(&mut uuid_pk(subscription_plans::Column::Id))
        .col(
            ColumnDef::new(subscription_plans::Column::PlanKey)
                .string_len(64)
                .not_null()
                .unique_key(),
        )
        .col(ColumnDef::new(subscription_plans::Column::Name).string().not_null())
        .col(ColumnDef::new(subscription_plans::Column::Description).text().null())
        .col(ColumnDef::new(subscription_plans::Column::Price).big_integer().not_null())
        .col(ColumnDef::new(subscription_plans::Column::Currency).string_len(3).not_null())
        .col(
            ColumnDef::new(subscription_plans::Column::BillingType)
                .string_len(16)
                .not_null(),
        )
        .col(
            ColumnDef::new(subscription_plans::Column::BillingInterval)
                .string_len(8)
                .null(),
        )
        .col(ColumnDef::new(subscription_plans::Column::DurationDays).integer().null())
        .col(ColumnDef::new(subscription_plans::Column::Features).json().not_null())
        .col(
            ColumnDef::new(subscription_plans::Column::IsActive)
                .boolean()
                .not_null()
                .default(true),
        )
        .col(
            ColumnDef::new(subscription_plans::Column::SortOrder)
                .integer()
                .not_null()
                .default(0),
        )
        .to_owned();
    create_table(db, backend, plans_table).await?;

    let subscriptions_table = Table::create()
        .table(subscriptions::Entity)
        .col(&mut uuid_pk(subscriptions::Column::Id))
        .col(ColumnDef::new(subscriptions::Column::TenantId).uuid().not_null())
        .col(ColumnDef::new(subscriptions::Column::PlanId).uuid().not_null())
        .col(ColumnDef::new(subscriptions::Column::Status).string_len(16).not_null())
        .col(&mut timestamp(subscriptions::Column::CurrentPeriodStart))
        .col(&mut timestamp(subscriptions::Column::CurrentPeriodEnd))
        .col(ColumnDef::new(subscriptions::Column::AdminUsername).string().null())
        .col(ColumnDef::new(subscriptions::Column::AdminPasswordHash).string().null())
        .col(
            ColumnDef::new(subscriptions::Column::CredentialsSent)
                .boolean()
                .not_null()
                .default(false),
        )
        .col(ColumnDef::new(subscriptions::Column::StripeCustomerId).string().null())
        .col(ColumnDef::new(subscriptions::Column::StripePaymentIntentId).string().null())
        .col(ColumnDef::new(subscriptions::Column::StripeSubscriptionId).string().null())
        .col(
            ColumnDef::new(subscriptions::Column::ExpiryWarningSent)
                .boolean()
                .not_null()
                .default(false),
        )
        .col(&mut timestamp(subscriptions::Column::CreatedAt))
        .to_owned();
    create_table(db, backend, subscriptions_table).await?;

    let admins_table = Table::create()
        .table(admins::Entity)
        .col(&mut uuid_pk(admins::Column::Id))
        .col(
            ColumnDef::new(admins::Column::Username)
                .string_len(64)
                .not_null()
                .unique_key(),
        )
        .col(ColumnDef::new(admins::Column::PasswordHash).string().not_null())
        .col(ColumnDef::new(admins::Column::Email).string().null())
        .col(ColumnDef::new(admins::Column::TenantId).uuid().null())
        .col(
            ColumnDef::new(admins::Column::IsSuperAdmin)
                .boolean()
                .not_null()
                .default(false),
        )
        .col(ColumnDef::new(admins::Column::Role).string_len(32).not_null())
        .col(&mut timestamp(admins::Column::CreatedAt))
        .to_owned();
    create_table(db, backend, admins_table).await?;

    let images_table = Table::create()
        .table(images::Entity)
        .col(&mut uuid_pk(images::Column::Id))
        .col(ColumnDef::new(images::Column::TenantId).uuid().not_null())
        .col(ColumnDef::new(images::Column::PaymentId).uuid().null())
        .col(ColumnDef::new(images::Column::OriginalFilename).string().null())
        .col(ColumnDef::new(images::Column::FilePath).string().not_null())
        .col(ColumnDef::new(images::Column::ThumbnailPath).string().not_null())
        .col(ColumnDef::new(images::Column::FileUrl).text().not_null())
        .col(ColumnDef::new(images::Column::ThumbnailUrl).text().not_null())
        .col(ColumnDef::new(images::Column::FileSize).big_integer().not_null())
        .col(ColumnDef::new(images::Column::Width).integer().not_null())
        .col(ColumnDef::new(images::Column::Height).integer().not_null())
        .col(ColumnDef::new(images::Column::MimeType).string_len(32).not_null())
        .col(ColumnDef::new(images::Column::Status).string_len(16).not_null())
        .col(ColumnDef::new(images::Column::ApprovedBy).uuid().null())
        .col(
            ColumnDef::new(images::Column::ApprovedAt)
                .timestamp_with_time_zone()
                .null(),
        )
        .col(ColumnDef::new(images::Column::RejectionReason).text().null())
        .col(
            ColumnDef::new(images::Column::ExpiresAt)
                .timestamp_with_time_zone()
                .null(),
        )
        .col(ColumnDef::new(images::Column::SessionId).string().null())
        .col(ColumnDef::new(images::Column::Caption).text().null())
        .col(ColumnDef::new(images::Column::LikeCount).integer().not_null().default(0))
        .col(ColumnDef::new(images::Column::CommentCount).integer().not_null().default(0))
        .col(&mut timestamp(images::Column::UploadedAt))
        .to_owned();
    create_table(db, backend, images_table).await?;

    let payments_table = Table::create()
        .table(payments::Entity)
        .col(&mut uuid_pk(payments::Column::Id))
        .col(ColumnDef::new(payments::Column::TenantId).uuid().not_null())
        .col(
            ColumnDef::new(payments::Column::StripePaymentIntentId)
                .string()
                .not_null()
                .unique_key(),
        )
        .col(ColumnDef::new(payments::Column::Amount).big_integer().not_null())
        .col(ColumnDef::new(payments::Column::Currency).string_len(3).not_null())
        .col(ColumnDef::new(payments::Column::Status).string_len(16).not_null())
        .col(ColumnDef::new(payments::Column::SessionId).string().null())
        .col(ColumnDef::new(payments::Column::Metadata).json().not_null())
        .col(&mut timestamp(payments::Column::CreatedAt))
        .to_owned();
    create_table(db, backend, payments_table).await?;

    let likes_table = Table::create()
        .table(likes::Entity)
        .col(&mut uuid_pk(likes::Column::Id))
        .col(ColumnDef::new(likes::Column::ImageId).uuid().not_null())
        .col(ColumnDef::new(likes::Column::SessionId).string().not_null())
        .col(&mut timestamp(likes::Column::CreatedAt))
        .to_owned();
    create_table(db, backend, likes_table).await?;

    let comments_table = Table::create()
        .table(comments::Entity)
        .col(&mut uuid_pk(comments::Column::Id))
        .col(ColumnDef::new(comments::Column::ImageId).uuid().not_null())
        .col(ColumnDef::new(comments::Column::TenantId).uuid().not_null())
        .col(ColumnDef::new(comments::Column::SessionId).string().not_null())
        .col(ColumnDef::new(comments::Column::Content).text().not_null())
        .col(
            ColumnDef::new(comments::Column::IsHidden)
                .boolean()
                .not_null()
                .default(false),
        )
        .col(&mut timestamp(comments::Column::CreatedAt))
        .to_owned();
    create_table(db, backend, comments_table).await?;

    let billing_table = Table::create()
        .table(billing_history::Entity)
        .col(&mut uuid_pk(billing_history::Column::Id))
        .col(ColumnDef::new(billing_history::Column::TenantId).uuid().not_null())
        .col(ColumnDef::new(billing_history::Column::SubscriptionId).uuid().null())
        .col(ColumnDef::new(billing_history::Column::Amount).big_integer().not_null())
        .col(ColumnDef::new(billing_history::Column::Currency).string_len(3).not_null())
        .col(ColumnDef::new(billing_history::Column::Status).string_len(16).not_null())
        .col(ColumnDef::new(billing_history::Column::Description).text().null())
        .col(
            ColumnDef::new(billing_history::Column::StripePaymentIntentId)
                .string()
                .null(),
        )
        .col(&mut timestamp(billing_history::Column::PaidAt))
        .to_owned();
    create_table(db, backend, billing_table).await?;

    create_index(
        db,
        backend,
        Index::create()
            .name("uq_likes_image_session")
            .table(likes::Entity)
            .col(likes::Column::ImageId)
            .col(likes::Column::SessionId)
            .unique()
            .to_owned(),
    )
    .await?;
    create_index(
        db,
        backend,
        Index::create()
            .name("idx_images_tenant_status")
            .table(images::Entity)
            .col(images::Column::TenantId)
            .col(images::Column::Status)
            .to_owned(),
    )
    .await?;
    create_index(
        db,
        backend,
        Index::create()
            .name("idx_subscriptions_tenant_status")
            .table(subscriptions::Entity)
            .col(subscriptions::Column::TenantId)
            .col(subscriptions::Column::Status)
            .to_owned(),
    )
    .await?;
    create_index(
        db,
        backend,
        Index::create()
            .name("idx_comments_image")
            .table(comments::Entity)
            .col(comments::Column::ImageId)
            .to_owned(),
    )
    .await?;

    Ok(())
}

fn uuid_pk<C: sea_orm::sea_query::IntoIden>(column: C) -> ColumnDef {
    ColumnDef::new(column).uuid().not_null().primary_key().to_owned()
}

fn timestamp<C: sea_orm::sea_query::IntoIden>(column: C) -> ColumnDef {
    ColumnDef::new(column)
        .timestamp_with_time_zone()
        .not_null()
        .to_owned()
}

async fn create_table(
    db: &DatabaseConnection,
    backend: DatabaseBackend,
    mut statement: TableCreateStatement,
) -> StorageResult<()> {
    statement.if_not_exists();
    db.execute(backend.build(&statement))
        .await
        .map_err(StorageError::from_source)?;
    Ok(())
}

async fn create_index(
    db: &DatabaseConnection,
    backend: DatabaseBackend,
    mut statement: IndexCreateStatement,
) -> StorageResult<()> {
    statement.if_not_exists();
    db.execute(backend.build(&statement))
        .await
        .map_err(StorageError::from_source)?;
    Ok(())
}
