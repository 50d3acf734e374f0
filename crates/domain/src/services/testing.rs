//! In-process fakes for the storage traits and external collaborators.
//! Compiled for unit tests and, through the `testing` feature, for the HTTP
//! crate's integration tests.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use uuid::Uuid;

use crate::model::{
    ActiveSubscription, Admin, AdminDeletion, BillingRecord, BillingStatus, BillingType, Comment, Image,
    ImageStats, ImageTransition, Like, ModerationStatus, NewAdmin, NewBillingRecord, NewComment,
    NewImage, NewPayment, NewSubscription, NewTenant, Payment, PaymentStatus, PlanFeatures,
    Subscription, SubscriptionPatch, SubscriptionPlan, SubscriptionStatus, Tenant, TenantUpdate,
    DEFAULT_CURRENCY, DEFAULT_DISPLAY_DURATION, DEFAULT_IMAGE_EXPIRY_HOURS,
};
use crate::services::blob::{BlobError, BlobStore, StoredBlob};
use crate::services::gateway::{
    Customer, GatewayError, NewCustomer, NewPaymentIntent, PaymentGateway, PaymentIntent,
};
use crate::services::notify::{EmailMessage, MailError, Mailer};
use crate::storage::{
    AdminStore, BillingStore, EngagementStore, ImageStore, PaymentStore, PlanStore,
    StorageError, StorageResult, SubscriptionStore, TenantStore,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub fn fixture_tenant(slug: &str) -> Tenant {
    Tenant {
        id: Uuid::new_v4(),
        slug: slug.to_string(),
        name: format!("Event {slug}"),
        description: None,
        owner_email: Some(format!("{slug}@example.com")),
        owner_phone: None,
        is_active: true,
        is_public: true,
        payment_enabled: false,
        price_amount: 0,
        price_currency: DEFAULT_CURRENCY.to_string(),
        display_duration: DEFAULT_DISPLAY_DURATION,
        image_expiry_hours: DEFAULT_IMAGE_EXPIRY_HOURS,
        max_images_per_user: None,
        theme_settings: json!({}),
        display_settings: json!({}),
        created_at: Utc::now(),
    }
}

/// One-time plan lasting three days.
pub fn fixture_plan(key: &str, price: i64, max_uploads: Option<i64>) -> SubscriptionPlan {
    SubscriptionPlan {
        id: Uuid::new_v4(),
        key: key.to_string(),
        name: format!("Plan {key}"),
        description: None,
        price,
        currency: DEFAULT_CURRENCY.to_string(),
        billing_type: BillingType::OneTime,
        billing_interval: None,
        duration_days: Some(3),
        features: PlanFeatures {
            max_uploads,
            storage_gb: 1,
            ..Default::default()
        },
        is_active: true,
        sort_order: 0,
    }
}

pub fn fixture_subscription(
    tenant: &Tenant,
    plan: &SubscriptionPlan,
    period_end: DateTime<Utc>,
) -> Subscription {
    Subscription {
        id: Uuid::new_v4(),
        tenant_id: tenant.id,
        plan_id: plan.id,
        status: SubscriptionStatus::Active,
        current_period_start: period_end - plan.period_length(),
        current_period_end: period_end,
        admin_username: None,
        admin_password_hash: None,
        credentials_sent: false,
        stripe_customer_id: None,
        stripe_payment_intent_id: None,
        stripe_subscription_id: None,
        expiry_warning_sent: false,
        created_at: Utc::now(),
    }
}

pub fn fixture_image(tenant: &Tenant, status: ModerationStatus) -> Image {
    let id = Uuid::new_v4();
    let now = Utc::now();
    let approved = status == ModerationStatus::Approved;
    Image {
        id,
        tenant_id: tenant.id,
        payment_id: None,
        original_filename: Some("photo.jpg".to_string()),
        file_path: format!("{}/images/{id}.jpg", tenant.slug),
        thumbnail_path: format!("{}/thumbnails/{id}.jpg", tenant.slug),
        file_url: format!("/uploads/{}/images/{id}.jpg", tenant.slug),
        thumbnail_url: format!("/uploads/{}/thumbnails/{id}.jpg", tenant.slug),
        file_size: 1024,
        width: 800,
        height: 600,
        mime_type: "image/jpeg".to_string(),
        status,
        approved_by: None,
        approved_at: approved.then_some(now),
        rejection_reason: None,
        expires_at: approved.then(|| now + Duration::hours(1)),
        session_id: None,
        caption: None,
        like_count: 0,
        comment_count: 0,
        uploaded_at: now,
    }
}

#[derive(Default)]
struct Tables {
    tenants: Vec<Tenant>,
    plans: Vec<SubscriptionPlan>,
    subscriptions: Vec<Subscription>,
    admins: Vec<Admin>,
    images: Vec<Image>,
    payments: Vec<Payment>,
    likes: Vec<Like>,
    comments: Vec<Comment>,
    billing: Vec<BillingRecord>,
}

#[derive(Default)]
struct Faults {
    failing: HashSet<&'static str>,
    flip_before_transition: Option<ModerationStatus>,
    hide_likes: bool,
}

/// Vector-backed store implementing every storage trait, with switches to
/// inject failures and races.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    faults: Mutex<Faults>,
}

impl MemoryStore {
    /// Makes the named trait method fail with a database error.
    pub fn fail_on(&self, operation: &'static str) {
        lock(&self.faults).failing.insert(operation);
    }

    /// Simulates a concurrent moderator deciding the image between the
    /// caller's read and its conditional update.
    pub fn flip_status_before_transition(&self, status: ModerationStatus) {
        lock(&self.faults).flip_before_transition = Some(status);
    }

    /// Makes `has_liked` miss existing likes, as a racing request would.
    pub fn hide_likes_from_lookup(&self) {
        lock(&self.faults).hide_likes = true;
    }

    fn check(&self, operation: &'static str) -> StorageResult<()> {
        if lock(&self.faults).failing.contains(operation) {
            return Err(StorageError::Database(format!("injected failure in {operation}")));
        }
        Ok(())
    }

    pub fn seed_tenant(&self, tenant: Tenant) -> Tenant {
        lock(&self.tables).tenants.push(tenant.clone());
        tenant
    }

    pub fn seed_plan(&self, plan: SubscriptionPlan) -> SubscriptionPlan {
        lock(&self.tables).plans.push(plan.clone());
        plan
    }

    pub fn seed_subscription(&self, subscription: Subscription) -> Subscription {
        lock(&self.tables).subscriptions.push(subscription.clone());
        subscription
    }

    pub fn seed_image(&self, image: Image) -> Image {
        lock(&self.tables).images.push(image.clone());
        image
    }

    pub fn subscription(&self, id: Uuid) -> Option<Subscription> {
        lock(&self.tables)
            .subscriptions
            .iter()
            .find(|s| s.id == id)
            .cloned()
    }

    /// Row counts of (tenants, subscriptions, admins, billing records).
    pub fn counts(&self) -> (usize, usize, usize, usize) {
        let tables = lock(&self.tables);
        (
            tables.tenants.len(),
            tables.subscriptions.len(),
            tables.admins.len(),
            tables.billing.len(),
        )
    }
}

fn join_plan(tables: &Tables, subscription: &Subscription) -> Option<ActiveSubscription> {
    tables
        .plans
        .iter()
        .find(|plan| plan.id == subscription.plan_id)
        .map(|plan| ActiveSubscription {
            subscription: subscription.clone(),
            plan: plan.clone(),
        })
}

#[async_trait]
impl TenantStore for MemoryStore {
    async fn insert_tenant(&self, tenant: NewTenant) -> StorageResult<Tenant> {
        self.check("insert_tenant")?;
        let mut tables = lock(&self.tables);
        if tables.tenants.iter().any(|t| t.slug == tenant.slug) {
            return Err(StorageError::Conflict(format!("slug {}", tenant.slug)));
        }
        let mut row = fixture_tenant(&tenant.slug);
        row.name = tenant.name;
        row.description = tenant.description;
        row.owner_email = tenant.owner_email;
        row.owner_phone = tenant.owner_phone;
        row.is_active = tenant.is_active;
        row.payment_enabled = tenant.payment_enabled;
        row.price_amount = tenant.price_amount;
        row.price_currency = tenant.price_currency;
        tables.tenants.push(row.clone());
        Ok(row)
    }

    async fn find_tenant(&self, id: Uuid) -> StorageResult<Option<Tenant>> {
        self.check("find_tenant")?;
        Ok(lock(&self.tables).tenants.iter().find(|t| t.id == id).cloned())
    }

    async fn find_tenant_by_slug(&self, slug: &str) -> StorageResult<Option<Tenant>> {
        self.check("find_tenant_by_slug")?;
        Ok(lock(&self.tables)
            .tenants
            .iter()
            .find(|t| t.slug == slug)
            .cloned())
    }

    async fn slug_exists(&self, slug: &str) -> StorageResult<bool> {
        self.check("slug_exists")?;
        Ok(lock(&self.tables).tenants.iter().any(|t| t.slug == slug))
    }

    async fn update_tenant(
        &self,
        id: Uuid,
        update: TenantUpdate,
    ) -> StorageResult<Option<Tenant>> {
        self.check("update_tenant")?;
        let mut tables = lock(&self.tables);
        if let Some(slug) = update.slug.as_deref() {
            if tables.tenants.iter().any(|t| t.slug == slug && t.id != id) {
                return Err(StorageError::Conflict(format!("slug {slug}")));
            }
        }
        let Some(tenant) = tables.tenants.iter_mut().find(|t| t.id == id) else {
            return Ok(None);
        };
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
            tenant.slug = v;
        }
        if let Some(v) = name {
            tenant.name = v;
        }
        if let Some(v) = description {
            tenant.description = Some(v);
        }
        if let Some(v) = owner_email {
            tenant.owner_email = Some(v);
        }
        if let Some(v) = owner_phone {
            tenant.owner_phone = Some(v);
        }
        if let Some(v) = is_active {
            tenant.is_active = v;
        }
        if let Some(v) = is_public {
            tenant.is_public = v;
        }
        if let Some(v) = payment_enabled {
            tenant.payment_enabled = v;
        }
        if let Some(v) = price_amount {
            tenant.price_amount = v;
        }
        if let Some(v) = price_currency {
            tenant.price_currency = v;
        }
        if let Some(v) = display_duration {
            tenant.display_duration = v;
        }
        if let Some(v) = image_expiry_hours {
            tenant.image_expiry_hours = v;
        }
        if let Some(v) = max_images_per_user {
            tenant.max_images_per_user = Some(v);
        }
        if let Some(v) = theme_settings {
            tenant.theme_settings = v;
        }
        if let Some(v) = display_settings {
            tenant.display_settings = v;
        }
        Ok(Some(tenant.clone()))
    }

    async fn set_tenant_active(&self, id: Uuid, active: bool) -> StorageResult<()> {
        self.check("set_tenant_active")?;
        if let Some(tenant) = lock(&self.tables).tenants.iter_mut().find(|t| t.id == id) {
            tenant.is_active = active;
        }
        Ok(())
    }

    async fn list_tenants(&self, active: Option<bool>) -> StorageResult<Vec<Tenant>> {
        self.check("list_tenants")?;
        let mut tenants: Vec<Tenant> = lock(&self.tables)
            .tenants
            .iter()
            .filter(|t| active.map_or(true, |a| t.is_active == a))
            .cloned()
            .collect();
        tenants.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(tenants)
    }

    async fn delete_tenant(&self, id: Uuid) -> StorageResult<bool> {
        self.check("delete_tenant")?;
        let mut tables = lock(&self.tables);
        let before = tables.tenants.len();
        tables.tenants.retain(|t| t.id != id);
        if tables.tenants.len() == before {
            return Ok(false);
        }
        let image_ids: HashSet<Uuid> = tables
            .images
            .iter()
            .filter(|i| i.tenant_id == id)
            .map(|i| i.id)
            .collect();
        tables.likes.retain(|l| !image_ids.contains(&l.image_id));
        tables.comments.retain(|c| c.tenant_id != id);
        tables.images.retain(|i| i.tenant_id != id);
        tables.payments.retain(|p| p.tenant_id != id);
        tables.subscriptions.retain(|s| s.tenant_id != id);
        tables.admins.retain(|a| a.tenant_id != Some(id));
        tables.billing.retain(|b| b.tenant_id != id);
        Ok(true)
    }
}

#[async_trait]
impl PlanStore for MemoryStore {
    async fn find_plan_by_key(&self, key: &str) -> StorageResult<Option<SubscriptionPlan>> {
        self.check("find_plan_by_key")?;
        Ok(lock(&self.tables).plans.iter().find(|p| p.key == key).cloned())
    }

    async fn list_plans(&self) -> StorageResult<Vec<SubscriptionPlan>> {
        self.check("list_plans")?;
        let mut plans: Vec<SubscriptionPlan> = lock(&self.tables)
            .plans
            .iter()
            .filter(|p| p.is_active)
            .cloned()
            .collect();
        plans.sort_by_key(|p| p.sort_order);
        Ok(plans)
    }
}

#[async_trait]
impl SubscriptionStore for MemoryStore {
    async fn insert_subscription(
        &self,
        subscription: NewSubscription,
    ) -> StorageResult<Subscription> {
        self.check("insert_subscription")?;
        let row = Subscription {
            id: Uuid::new_v4(),
            tenant_id: subscription.tenant_id,
            plan_id: subscription.plan_id,
            status: subscription.status,
            current_period_start: subscription.current_period_start,
            current_period_end: subscription.current_period_end,
            admin_username: subscription.admin_username,
            admin_password_hash: subscription.admin_password_hash,
            credentials_sent: subscription.credentials_sent,
            stripe_customer_id: subscription.stripe_customer_id,
            stripe_payment_intent_id: subscription.stripe_payment_intent_id,
            stripe_subscription_id: None,
            expiry_warning_sent: false,
            created_at: Utc::now(),
        };
        lock(&self.tables).subscriptions.push(row.clone());
        Ok(row)
    }

    async fn find_active_subscription(
        &self,
        tenant_id: Uuid,
    ) -> StorageResult<Option<ActiveSubscription>> {
        self.check("find_active_subscription")?;
        let tables = lock(&self.tables);
        Ok(tables
            .subscriptions
            .iter()
            .filter(|s| s.tenant_id == tenant_id && s.status == SubscriptionStatus::Active)
            .max_by_key(|s| s.current_period_end)
            .and_then(|s| join_plan(&tables, s)))
    }

    async fn find_subscription_by_payment_intent(
        &self,
        payment_intent_id: &str,
    ) -> StorageResult<Option<Subscription>> {
        self.check("find_subscription_by_payment_intent")?;
        Ok(lock(&self.tables)
            .subscriptions
            .iter()
            .find(|s| s.stripe_payment_intent_id.as_deref() == Some(payment_intent_id))
            .cloned())
    }

    async fn find_subscription_by_stripe_id(
        &self,
        stripe_subscription_id: &str,
    ) -> StorageResult<Option<Subscription>> {
        self.check("find_subscription_by_stripe_id")?;
        Ok(lock(&self.tables)
            .subscriptions
            .iter()
            .find(|s| s.stripe_subscription_id.as_deref() == Some(stripe_subscription_id))
            .cloned())
    }

    async fn update_subscription(
        &self,
        id: Uuid,
        patch: SubscriptionPatch,
    ) -> StorageResult<Option<Subscription>> {
        self.check("update_subscription")?;
        let mut tables = lock(&self.tables);
        let Some(row) = tables.subscriptions.iter_mut().find(|s| s.id == id) else {
            return Ok(None);
        };
        if let Some(status) = patch.status {
            row.status = status;
        }
        if let Some(start) = patch.current_period_start {
            row.current_period_start = start;
        }
        if let Some(end) = patch.current_period_end {
            row.current_period_end = end;
        }
        if let Some(stripe_id) = patch.stripe_subscription_id {
            row.stripe_subscription_id = Some(stripe_id);
        }
        Ok(Some(row.clone()))
    }

    async fn expire_subscription(
        &self,
        subscription_id: Uuid,
        tenant_id: Uuid,
    ) -> StorageResult<()> {
        self.check("expire_subscription")?;
        let mut tables = lock(&self.tables);
        if let Some(row) = tables.subscriptions.iter_mut().find(|s| s.id == subscription_id) {
            row.status = SubscriptionStatus::Expired;
        }
        if let Some(tenant) = tables.tenants.iter_mut().find(|t| t.id == tenant_id) {
            tenant.is_active = false;
        }
        Ok(())
    }

    async fn list_active_subscriptions(&self) -> StorageResult<Vec<ActiveSubscription>> {
        self.check("list_active_subscriptions")?;
        let tables = lock(&self.tables);
        Ok(tables
            .subscriptions
            .iter()
            .filter(|s| s.status == SubscriptionStatus::Active)
            .filter_map(|s| join_plan(&tables, s))
            .collect())
    }

    async fn mark_expiry_warning_sent(&self, subscription_id: Uuid) -> StorageResult<()> {
        self.check("mark_expiry_warning_sent")?;
        if let Some(row) = lock(&self.tables)
            .subscriptions
            .iter_mut()
            .find(|s| s.id == subscription_id)
        {
            row.expiry_warning_sent = true;
        }
        Ok(())
    }

    async fn mark_credentials_sent(&self, subscription_id: Uuid) -> StorageResult<()> {
        self.check("mark_credentials_sent")?;
        if let Some(row) = lock(&self.tables)
            .subscriptions
            .iter_mut()
            .find(|s| s.id == subscription_id)
        {
            row.credentials_sent = true;
        }
        Ok(())
    }

    async fn delete_subscription(&self, id: Uuid) -> StorageResult<bool> {
        self.check("delete_subscription")?;
        let mut tables = lock(&self.tables);
        let before = tables.subscriptions.len();
        tables.subscriptions.retain(|s| s.id != id);
        Ok(tables.subscriptions.len() != before)
    }
}

#[async_trait]
impl AdminStore for MemoryStore {
    async fn insert_admin(&self, admin: NewAdmin) -> StorageResult<Admin> {
        self.check("insert_admin")?;
        let mut tables = lock(&self.tables);
        if tables.admins.iter().any(|a| a.username == admin.username) {
            return Err(StorageError::Conflict(format!("username {}", admin.username)));
        }
        let row = Admin {
            id: Uuid::new_v4(),
            username: admin.username,
            password_hash: admin.password_hash,
            email: admin.email,
            tenant_id: admin.tenant_id,
            is_super_admin: admin.is_super_admin,
            role: admin.role,
            created_at: Utc::now(),
        };
        tables.admins.push(row.clone());
        Ok(row)
    }

    async fn find_admin(&self, id: Uuid) -> StorageResult<Option<Admin>> {
        self.check("find_admin")?;
        Ok(lock(&self.tables).admins.iter().find(|a| a.id == id).cloned())
    }

    async fn find_admin_for_login(
        &self,
        username: &str,
        tenant_id: Uuid,
    ) -> StorageResult<Option<Admin>> {
        self.check("find_admin_for_login")?;
        Ok(lock(&self.tables)
            .admins
            .iter()
            .find(|a| a.username == username && (a.is_super_admin || a.tenant_id == Some(tenant_id)))
            .cloned())
    }

    async fn find_super_admin(&self, username: &str) -> StorageResult<Option<Admin>> {
        self.check("find_super_admin")?;
        Ok(lock(&self.tables)
            .admins
            .iter()
            .find(|a| a.username == username && a.is_super_admin)
            .cloned())
    }

    async fn username_exists(&self, username: &str) -> StorageResult<bool> {
        self.check("username_exists")?;
        Ok(lock(&self.tables).admins.iter().any(|a| a.username == username))
    }

    async fn list_admins(&self) -> StorageResult<Vec<Admin>> {
        self.check("list_admins")?;
        let mut admins = lock(&self.tables).admins.clone();
        admins.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(admins)
    }

    async fn delete_admin_keeping_super_admin(&self, id: Uuid) -> StorageResult<AdminDeletion> {
        self.check("delete_admin_keeping_super_admin")?;
        let mut tables = lock(&self.tables);
        let Some(target) = tables.admins.iter().find(|a| a.id == id) else {
            return Ok(AdminDeletion::NotFound);
        };
        let super_admins = tables.admins.iter().filter(|a| a.is_super_admin).count();
        if target.is_super_admin && super_admins <= 1 {
            return Ok(AdminDeletion::LastSuperAdmin);
        }
        tables.admins.retain(|a| a.id != id);
        Ok(AdminDeletion::Deleted)
    }

    async fn delete_admin(&self, id: Uuid) -> StorageResult<bool> {
        self.check("delete_admin")?;
        let mut tables = lock(&self.tables);
        let before = tables.admins.len();
        tables.admins.retain(|a| a.id != id);
        Ok(tables.admins.len() != before)
    }
}

#[async_trait]
impl ImageStore for MemoryStore {
    async fn insert_image(&self, image: NewImage) -> StorageResult<Image> {
        self.check("insert_image")?;
        let row = Image {
            id: Uuid::new_v4(),
            tenant_id: image.tenant_id,
            payment_id: image.payment_id,
            original_filename: image.original_filename,
            file_path: image.file_path,
            thumbnail_path: image.thumbnail_path,
            file_url: image.file_url,
            thumbnail_url: image.thumbnail_url,
            file_size: image.file_size,
            width: image.width,
            height: image.height,
            mime_type: image.mime_type,
            status: ModerationStatus::Pending,
            approved_by: None,
            approved_at: None,
            rejection_reason: None,
            expires_at: None,
            session_id: image.session_id,
            caption: image.caption,
            like_count: 0,
            comment_count: 0,
            uploaded_at: Utc::now(),
        };
        lock(&self.tables).images.push(row.clone());
        Ok(row)
    }

    async fn find_image(&self, tenant_id: Uuid, image_id: Uuid) -> StorageResult<Option<Image>> {
        self.check("find_image")?;
        Ok(lock(&self.tables)
            .images
            .iter()
            .find(|i| i.id == image_id && i.tenant_id == tenant_id)
            .cloned())
    }

    async fn list_images(
        &self,
        tenant_id: Uuid,
        status: Option<ModerationStatus>,
    ) -> StorageResult<Vec<Image>> {
        self.check("list_images")?;
        let mut images: Vec<Image> = lock(&self.tables)
            .images
            .iter()
            .filter(|i| i.tenant_id == tenant_id && status.map_or(true, |s| i.status == s))
            .cloned()
            .collect();
        images.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
        Ok(images)
    }

    async fn count_images(&self, tenant_id: Uuid) -> StorageResult<u64> {
        self.check("count_images")?;
        let count = lock(&self.tables)
            .images
            .iter()
            .filter(|i| i.tenant_id == tenant_id)
            .count();
        Ok(count as u64)
    }

    async fn transition_image(
        &self,
        tenant_id: Uuid,
        image_id: Uuid,
        transition: ImageTransition,
    ) -> StorageResult<Option<Image>> {
        self.check("transition_image")?;
        let flip = lock(&self.faults).flip_before_transition;
        let mut tables = lock(&self.tables);
        let Some(image) = tables
            .images
            .iter_mut()
            .find(|i| i.id == image_id && i.tenant_id == tenant_id)
        else {
            return Ok(None);
        };
        if let Some(status) = flip {
            image.status = status;
        }
        if image.status != ModerationStatus::Pending {
            return Ok(None);
        }
        image.status = transition.target();
        match transition {
            ImageTransition::Approve {
                approved_by,
                approved_at,
                expires_at,
            } => {
                image.approved_by = Some(approved_by);
                image.approved_at = Some(approved_at);
                image.expires_at = Some(expires_at);
            }
            ImageTransition::Reject { reason, .. } => {
                image.rejection_reason = Some(reason);
            }
        }
        Ok(Some(image.clone()))
    }

    async fn delete_image(&self, tenant_id: Uuid, image_id: Uuid) -> StorageResult<bool> {
        self.check("delete_image")?;
        let mut tables = lock(&self.tables);
        let before = tables.images.len();
        tables
            .images
            .retain(|i| !(i.id == image_id && i.tenant_id == tenant_id));
        if tables.images.len() == before {
            return Ok(false);
        }
        tables.likes.retain(|l| l.image_id != image_id);
        tables.comments.retain(|c| c.image_id != image_id);
        Ok(true)
    }

    async fn image_stats(&self, tenant_id: Uuid) -> StorageResult<ImageStats> {
        self.check("image_stats")?;
        let tables = lock(&self.tables);
        let mut stats = ImageStats::default();
        for image in tables.images.iter().filter(|i| i.tenant_id == tenant_id) {
            stats.total += 1;
            match image.status {
                ModerationStatus::Pending => stats.pending += 1,
                ModerationStatus::Approved => stats.approved += 1,
                ModerationStatus::Rejected => stats.rejected += 1,
            }
            stats.likes += u64::try_from(image.like_count).unwrap_or(0);
            stats.comments += u64::try_from(image.comment_count).unwrap_or(0);
        }
        Ok(stats)
    }
}

#[async_trait]
impl PaymentStore for MemoryStore {
    async fn insert_payment(&self, payment: NewPayment) -> StorageResult<Payment> {
        self.check("insert_payment")?;
        let row = Payment {
            id: Uuid::new_v4(),
            tenant_id: payment.tenant_id,
            stripe_payment_intent_id: payment.stripe_payment_intent_id,
            amount: payment.amount,
            currency: payment.currency,
            status: payment.status,
            session_id: payment.session_id,
            metadata: payment.metadata,
            created_at: Utc::now(),
        };
        lock(&self.tables).payments.push(row.clone());
        Ok(row)
    }

    async fn find_payment_by_intent(
        &self,
        payment_intent_id: &str,
    ) -> StorageResult<Option<Payment>> {
        self.check("find_payment_by_intent")?;
        Ok(lock(&self.tables)
            .payments
            .iter()
            .find(|p| p.stripe_payment_intent_id == payment_intent_id)
            .cloned())
    }

    async fn update_payment_status(
        &self,
        payment_intent_id: &str,
        status: PaymentStatus,
    ) -> StorageResult<bool> {
        self.check("update_payment_status")?;
        let mut tables = lock(&self.tables);
        let mut found = false;
        for payment in tables
            .payments
            .iter_mut()
            .filter(|p| p.stripe_payment_intent_id == payment_intent_id)
        {
            payment.status = status;
            found = true;
        }
        Ok(found)
    }
}

#[async_trait]
impl EngagementStore for MemoryStore {
    async fn add_like(&self, image_id: Uuid, session_id: &str) -> StorageResult<Like> {
        self.check("add_like")?;
        let mut tables = lock(&self.tables);
        if tables
            .likes
            .iter()
            .any(|l| l.image_id == image_id && l.session_id == session_id)
        {
            return Err(StorageError::Conflict("like".to_string()));
        }
        let like = Like {
            id: Uuid::new_v4(),
            image_id,
            session_id: session_id.to_string(),
            created_at: Utc::now(),
        };
        tables.likes.push(like.clone());
        if let Some(image) = tables.images.iter_mut().find(|i| i.id == image_id) {
            image.like_count += 1;
        }
        Ok(like)
    }

    async fn remove_like(&self, image_id: Uuid, session_id: &str) -> StorageResult<bool> {
        self.check("remove_like")?;
        let mut tables = lock(&self.tables);
        let before = tables.likes.len();
        tables
            .likes
            .retain(|l| !(l.image_id == image_id && l.session_id == session_id));
        let removed = tables.likes.len() != before;
        if removed {
            if let Some(image) = tables.images.iter_mut().find(|i| i.id == image_id) {
                image.like_count = (image.like_count - 1).max(0);
            }
        }
        Ok(removed)
    }

    async fn has_liked(&self, image_id: Uuid, session_id: &str) -> StorageResult<bool> {
        self.check("has_liked")?;
        if lock(&self.faults).hide_likes {
            return Ok(false);
        }
        Ok(lock(&self.tables)
            .likes
            .iter()
            .any(|l| l.image_id == image_id && l.session_id == session_id))
    }

    async fn liked_image_ids(
        &self,
        session_id: &str,
        image_ids: &[Uuid],
    ) -> StorageResult<Vec<Uuid>> {
        self.check("liked_image_ids")?;
        Ok(lock(&self.tables)
            .likes
            .iter()
            .filter(|l| l.session_id == session_id && image_ids.contains(&l.image_id))
            .map(|l| l.image_id)
            .collect())
    }

    async fn add_comment(&self, comment: NewComment) -> StorageResult<Comment> {
        self.check("add_comment")?;
        let mut tables = lock(&self.tables);
        let row = Comment {
            id: Uuid::new_v4(),
            image_id: comment.image_id,
            tenant_id: comment.tenant_id,
            session_id: comment.session_id,
            content: comment.content,
            is_hidden: false,
            created_at: Utc::now(),
        };
        tables.comments.push(row.clone());
        if let Some(image) = tables.images.iter_mut().find(|i| i.id == row.image_id) {
            image.comment_count += 1;
        }
        Ok(row)
    }

    async fn list_comments(&self, image_id: Uuid) -> StorageResult<Vec<Comment>> {
        self.check("list_comments")?;
        let mut comments: Vec<Comment> = lock(&self.tables)
            .comments
            .iter()
            .filter(|c| c.image_id == image_id && !c.is_hidden)
            .cloned()
            .collect();
        comments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(comments)
    }

    async fn hide_comment(&self, tenant_id: Uuid, comment_id: Uuid) -> StorageResult<bool> {
        self.check("hide_comment")?;
        let mut tables = lock(&self.tables);
        let Some(comment) = tables
            .comments
            .iter_mut()
            .find(|c| c.id == comment_id && c.tenant_id == tenant_id)
        else {
            return Ok(false);
        };
        if comment.is_hidden {
            return Ok(true);
        }
        comment.is_hidden = true;
        let image_id = comment.image_id;
        if let Some(image) = tables.images.iter_mut().find(|i| i.id == image_id) {
            image.comment_count = image.comment_count.saturating_sub(1);
        }
        Ok(true)
    }
}

#[async_trait]
impl BillingStore for MemoryStore {
    async fn append_billing_record(
        &self,
        record: NewBillingRecord,
    ) -> StorageResult<BillingRecord> {
        self.check("append_billing_record")?;
        let row = BillingRecord {
            id: Uuid::new_v4(),
            tenant_id: record.tenant_id,
            subscription_id: record.subscription_id,
            amount: record.amount,
            currency: record.currency,
            status: record.status,
            description: record.description,
            stripe_payment_intent_id: record.stripe_payment_intent_id,
            paid_at: record.paid_at,
        };
        lock(&self.tables).billing.push(row.clone());
        Ok(row)
    }

    async fn list_billing_records(&self, tenant_id: Uuid) -> StorageResult<Vec<BillingRecord>> {
        self.check("list_billing_records")?;
        let mut records: Vec<BillingRecord> = lock(&self.tables)
            .billing
            .iter()
            .filter(|b| b.tenant_id == tenant_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.paid_at.cmp(&a.paid_at));
        Ok(records)
    }

    async fn find_billing_record_by_intent(
        &self,
        payment_intent_id: &str,
        status: BillingStatus,
    ) -> StorageResult<Option<BillingRecord>> {
        self.check("find_billing_record_by_intent")?;
        Ok(lock(&self.tables)
            .billing
            .iter()
            .find(|b| {
                b.status == status
                    && b.stripe_payment_intent_id.as_deref() == Some(payment_intent_id)
            })
            .cloned())
    }

    async fn delete_billing_record(&self, id: Uuid) -> StorageResult<bool> {
        self.check("delete_billing_record")?;
        let mut tables = lock(&self.tables);
        let before = tables.billing.len();
        tables.billing.retain(|b| b.id != id);
        Ok(tables.billing.len() != before)
    }
}

#[derive(Default)]
struct GatewayState {
    intents: HashMap<String, PaymentIntent>,
    customers: usize,
    method_types: Vec<Vec<String>>,
}

/// Payment provider double. New intents start in
/// `requires_payment_method`; tests promote them with `set_status`.
#[derive(Default)]
pub struct FakeGateway {
    state: Mutex<GatewayState>,
}

impl FakeGateway {
    pub fn intent(&self, id: &str) -> Option<PaymentIntent> {
        lock(&self.state).intents.get(id).cloned()
    }

    pub fn set_status(&self, id: &str, status: &str) {
        if let Some(intent) = lock(&self.state).intents.get_mut(id) {
            intent.status = status.to_string();
        }
    }

    /// Registers an intent directly, bypassing `create_payment_intent`.
    pub fn insert_intent(&self, intent: PaymentIntent) {
        lock(&self.state).intents.insert(intent.id.clone(), intent);
    }

    pub fn created_method_types(&self) -> Vec<Vec<String>> {
        lock(&self.state).method_types.clone()
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_customer(&self, _customer: NewCustomer) -> Result<Customer, GatewayError> {
        let mut state = lock(&self.state);
        state.customers += 1;
        Ok(Customer {
            id: format!("cus_test_{}", state.customers),
        })
    }

    async fn create_payment_intent(
        &self,
        intent: NewPaymentIntent,
    ) -> Result<PaymentIntent, GatewayError> {
        let mut state = lock(&self.state);
        let id = format!("pi_test_{}", state.intents.len() + 1);
        let created = PaymentIntent {
            id: id.clone(),
            status: "requires_payment_method".to_string(),
            amount: intent.amount,
            currency: intent.currency,
            customer: intent.customer,
            client_secret: Some(format!("{id}_secret")),
            metadata: intent.metadata,
        };
        state.method_types.push(intent.payment_method_types);
        state.intents.insert(id, created.clone());
        Ok(created)
    }

    async fn retrieve_payment_intent(&self, id: &str) -> Result<PaymentIntent, GatewayError> {
        lock(&self.state)
            .intents
            .get(id)
            .cloned()
            .ok_or_else(|| GatewayError::Api {
                status: 404,
                message: format!("No such payment_intent: '{id}'"),
            })
    }
}

/// Captures sent messages.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<EmailMessage>>,
}

impl RecordingMailer {
    pub fn sent(&self) -> Vec<EmailMessage> {
        lock(&self.sent).clone()
    }

    pub fn sent_to(&self) -> Vec<String> {
        lock(&self.sent).iter().map(|m| m.to.clone()).collect()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, message: EmailMessage) -> Result<(), MailError> {
        lock(&self.sent).push(message);
        Ok(())
    }
}

/// Blob store kept in a map; `failing()` rejects every write and delete.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<BTreeMap<String, Vec<u8>>>,
    failing: bool,
}

impl MemoryBlobStore {
    pub fn failing() -> Self {
        Self {
            blobs: Mutex::default(),
            failing: true,
        }
    }

    pub fn paths(&self) -> Vec<String> {
        lock(&self.blobs).keys().cloned().collect()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(
        &self,
        path: &str,
        bytes: Vec<u8>,
        _content_type: &str,
    ) -> Result<StoredBlob, BlobError> {
        if self.failing {
            return Err(BlobError::Remote("injected put failure".to_string()));
        }
        lock(&self.blobs).insert(path.to_string(), bytes);
        Ok(StoredBlob {
            path: path.to_string(),
            url: self.public_url(path),
        })
    }

    fn public_url(&self, path: &str) -> String {
        format!("/uploads/{path}")
    }

    async fn delete(&self, paths: &[String]) -> Result<(), BlobError> {
        if self.failing {
            return Err(BlobError::Remote("injected delete failure".to_string()));
        }
        let mut blobs = lock(&self.blobs);
        for path in paths {
            blobs.remove(path);
        }
        Ok(())
    }
}
