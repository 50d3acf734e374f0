use async_trait::async_trait;
use uuid::Uuid;

use crate::model::{
    ActiveSubscription, Admin, AdminDeletion, BillingRecord, BillingStatus, Comment, Image,
    ImageStats, ImageTransition, Like, ModerationStatus, NewAdmin, NewBillingRecord, NewComment,
    NewImage, NewPayment, NewSubscription, NewTenant, Payment, PaymentStatus, Subscription,
    SubscriptionPatch, SubscriptionPlan, Tenant, TenantUpdate,
};

use super::StorageResult;

#[async_trait]
pub trait TenantStore: Send + Sync {
    /// Fails with `StorageError::Conflict` when the slug is taken.
    async fn insert_tenant(&self, tenant: NewTenant) -> StorageResult<Tenant>;
    async fn find_tenant(&self, id: Uuid) -> StorageResult<Option<Tenant>>;
    async fn find_tenant_by_slug(&self, slug: &str) -> StorageResult<Option<Tenant>>;
    async fn slug_exists(&self, slug: &str) -> StorageResult<bool>;
    async fn update_tenant(&self, id: Uuid, update: TenantUpdate)
        -> StorageResult<Option<Tenant>>;
    async fn set_tenant_active(&self, id: Uuid, active: bool) -> StorageResult<()>;
    async fn list_tenants(&self, active: Option<bool>) -> StorageResult<Vec<Tenant>>;
    /// Removes the tenant together with every row that references it.
    async fn delete_tenant(&self, id: Uuid) -> StorageResult<bool>;
}

#[async_trait]
pub trait PlanStore: Send + Sync {
    async fn find_plan_by_key(&self, key: &str) -> StorageResult<Option<SubscriptionPlan>>;
    /// Active catalog entries ordered by `sort_order`.
    async fn list_plans(&self) -> StorageResult<Vec<SubscriptionPlan>>;
}

#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    async fn insert_subscription(
        &self,
        subscription: NewSubscription,
    ) -> StorageResult<Subscription>;
    /// The tenant's subscription in `active` status (latest period end wins)
    /// joined with its plan.
    async fn find_active_subscription(
        &self,
        tenant_id: Uuid,
    ) -> StorageResult<Option<ActiveSubscription>>;
    async fn find_subscription_by_payment_intent(
        &self,
        payment_intent_id: &str,
    ) -> StorageResult<Option<Subscription>>;
    async fn find_subscription_by_stripe_id(
        &self,
        stripe_subscription_id: &str,
    ) -> StorageResult<Option<Subscription>>;
    async fn update_subscription(
        &self,
        id: Uuid,
        patch: SubscriptionPatch,
    ) -> StorageResult<Option<Subscription>>;
    /// Marks the subscription expired and the tenant inactive in one transaction.
    async fn expire_subscription(&self, subscription_id: Uuid, tenant_id: Uuid)
        -> StorageResult<()>;
    async fn list_active_subscriptions(&self) -> StorageResult<Vec<ActiveSubscription>>;
    async fn mark_expiry_warning_sent(&self, subscription_id: Uuid) -> StorageResult<()>;
    async fn mark_credentials_sent(&self, subscription_id: Uuid) -> StorageResult<()>;
    async fn delete_subscription(&self, id: Uuid) -> StorageResult<bool>;
}

#[async_trait]
pub trait AdminStore: Send + Sync {
    /// Fails with `StorageError::Conflict` when the username is taken.
    async fn insert_admin(&self, admin: NewAdmin) -> StorageResult<Admin>;
    async fn find_admin(&self, id: Uuid) -> StorageResult<Option<Admin>>;
    /// Username lookup scoped to admins of `tenant_id` plus super-admins.
    async fn find_admin_for_login(
        &self,
        username: &str,
        tenant_id: Uuid,
    ) -> StorageResult<Option<Admin>>;
    /// Username lookup restricted to super-admins.
    async fn find_super_admin(&self, username: &str) -> StorageResult<Option<Admin>>;
    async fn username_exists(&self, username: &str) -> StorageResult<bool>;
    /// Every admin account, newest first.
    async fn list_admins(&self) -> StorageResult<Vec<Admin>>;
    /// Deletes the admin unless it is the only super-admin left. The count
    /// and the delete run in one transaction with the super-admin rows
    /// locked, so concurrent removals cannot empty the set.
    async fn delete_admin_keeping_super_admin(&self, id: Uuid) -> StorageResult<AdminDeletion>;
    async fn delete_admin(&self, id: Uuid) -> StorageResult<bool>;
}

#[async_trait]
pub trait ImageStore: Send + Sync {
    async fn insert_image(&self, image: NewImage) -> StorageResult<Image>;
    async fn find_image(&self, tenant_id: Uuid, image_id: Uuid) -> StorageResult<Option<Image>>;
    /// Newest upload first.
    async fn list_images(
        &self,
        tenant_id: Uuid,
        status: Option<ModerationStatus>,
    ) -> StorageResult<Vec<Image>>;
    async fn count_images(&self, tenant_id: Uuid) -> StorageResult<u64>;
    /// Applies the transition only while the image is still pending. Returns
    /// `None` when the image is absent or was already processed.
    async fn transition_image(
        &self,
        tenant_id: Uuid,
        image_id: Uuid,
        transition: ImageTransition,
    ) -> StorageResult<Option<Image>>;
    /// Removes the image together with its likes and comments.
    async fn delete_image(&self, tenant_id: Uuid, image_id: Uuid) -> StorageResult<bool>;
    async fn image_stats(&self, tenant_id: Uuid) -> StorageResult<ImageStats>;
}

#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn insert_payment(&self, payment: NewPayment) -> StorageResult<Payment>;
    async fn find_payment_by_intent(&self, payment_intent_id: &str)
        -> StorageResult<Option<Payment>>;
    /// Returns `false` when no payment row references the intent.
    async fn update_payment_status(
        &self,
        payment_intent_id: &str,
        status: PaymentStatus,
    ) -> StorageResult<bool>;
}

#[async_trait]
pub trait EngagementStore: Send + Sync {
    /// Inserts the like and bumps the image counter. A duplicate
    /// `(image, session)` pair fails with `StorageError::Conflict`.
    async fn add_like(&self, image_id: Uuid, session_id: &str) -> StorageResult<Like>;
    async fn remove_like(&self, image_id: Uuid, session_id: &str) -> StorageResult<bool>;
    async fn has_liked(&self, image_id: Uuid, session_id: &str) -> StorageResult<bool>;
    /// Subset of `image_ids` liked by the session.
    async fn liked_image_ids(
        &self,
        session_id: &str,
        image_ids: &[Uuid],
    ) -> StorageResult<Vec<Uuid>>;
    /// Inserts the comment and bumps the image counter.
    async fn add_comment(&self, comment: NewComment) -> StorageResult<Comment>;
    /// Visible comments, newest first.
    async fn list_comments(&self, image_id: Uuid) -> StorageResult<Vec<Comment>>;
    async fn hide_comment(&self, tenant_id: Uuid, comment_id: Uuid) -> StorageResult<bool>;
}

#[async_trait]
pub trait BillingStore: Send + Sync {
    async fn append_billing_record(&self, record: NewBillingRecord)
        -> StorageResult<BillingRecord>;
    /// Newest first.
    async fn list_billing_records(&self, tenant_id: Uuid) -> StorageResult<Vec<BillingRecord>>;
    /// The ledger row already booked for `payment_intent_id` with `status`.
    async fn find_billing_record_by_intent(
        &self,
        payment_intent_id: &str,
        status: BillingStatus,
    ) -> StorageResult<Option<BillingRecord>>;
    async fn delete_billing_record(&self, id: Uuid) -> StorageResult<bool>;
}
