//! Operator views across every tenant: platform statistics and admin account
//! removal.

use std::collections::BTreeMap;

use serde::Serialize;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::model::{Admin, AdminDeletion, BillingStatus, ImageStats};
use crate::storage::{AdminStore, BillingStore, ImageStore, StorageError, TenantStore};

/// Revenue in minor units keyed by lowercase currency code.
pub type Revenue = BTreeMap<String, i64>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PlatformOverview {
    pub total_tenants: u64,
    pub active_tenants: u64,
    pub total_images: u64,
    pub pending_images: u64,
    pub approved_images: u64,
    pub rejected_images: u64,
    pub total_revenue: Revenue,
    pub total_payments: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TenantBreakdown {
    pub tenant_id: Uuid,
    pub slug: String,
    pub name: String,
    pub is_active: bool,
    pub total_images: u64,
    pub pending: u64,
    pub approved: u64,
    pub rejected: u64,
    pub revenue: Revenue,
    pub payments_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlatformStats {
    pub overview: PlatformOverview,
    pub tenants: Vec<TenantBreakdown>,
}

/// Aggregates image counts and the billing ledger per tenant. Refund rows
/// carry negative amounts, so they net out of revenue.
pub async fn platform_stats<S>(store: &S) -> Result<PlatformStats, StorageError>
where
    S: TenantStore + ImageStore + BillingStore + ?Sized,
{
    let tenants = store.list_tenants(None).await?;
    let mut overview = PlatformOverview::default();
    let mut breakdown = Vec::with_capacity(tenants.len());

    for tenant in tenants {
        let ImageStats {
            total,
            pending,
            approved,
            rejected,
            ..
        } = store.image_stats(tenant.id).await?;

        let mut revenue = Revenue::new();
        let mut payments_count = 0;
        for record in store.list_billing_records(tenant.id).await? {
            match record.status {
                BillingStatus::Paid => {
                    payments_count += 1;
                    *revenue.entry(record.currency).or_default() += record.amount;
                }
                BillingStatus::Refunded => {
                    *revenue.entry(record.currency).or_default() += record.amount;
                }
                BillingStatus::Failed => {}
            }
        }

        overview.total_tenants += 1;
        if tenant.is_active {
            overview.active_tenants += 1;
        }
        overview.total_images += total;
        overview.pending_images += pending;
        overview.approved_images += approved;
        overview.rejected_images += rejected;
        overview.total_payments += payments_count;
        for (currency, amount) in &revenue {
            *overview.total_revenue.entry(currency.clone()).or_default() += amount;
        }

        breakdown.push(TenantBreakdown {
            tenant_id: tenant.id,
            slug: tenant.slug,
            name: tenant.name,
            is_active: tenant.is_active,
            total_images: total,
            pending,
            approved,
            rejected,
            revenue,
            payments_count,
        });
    }

    Ok(PlatformStats {
        overview,
        tenants: breakdown,
    })
}

#[derive(Debug, Error)]
pub enum AdminRemovalError {
    #[error("Admin not found")]
    NotFound,
    #[error("Cannot delete yourself")]
    SelfRemoval,
    #[error("Cannot delete the last super admin")]
    LastSuperAdmin,
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Deletes an admin account. An operator may not remove their own account,
/// and the platform always keeps at least one super-admin.
pub async fn remove_admin<S>(
    store: &S,
    acting_admin: Uuid,
    admin_id: Uuid,
) -> Result<Admin, AdminRemovalError>
where
    S: AdminStore + ?Sized,
{
    if acting_admin == admin_id {
        return Err(AdminRemovalError::SelfRemoval);
    }
    let admin = store
        .find_admin(admin_id)
        .await?
        .ok_or(AdminRemovalError::NotFound)?;
    match store.delete_admin_keeping_super_admin(admin_id).await? {
        AdminDeletion::Deleted => {}
        AdminDeletion::NotFound => return Err(AdminRemovalError::NotFound),
        AdminDeletion::LastSuperAdmin => return Err(AdminRemovalError::LastSuperAdmin),
    }
    info!(admin = %admin.username, by = %acting_admin, "admin removed");
    Ok(admin)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::model::{ModerationStatus, NewAdmin, NewBillingRecord};
    use crate::services::testing::{fixture_image, fixture_tenant, MemoryStore};

    fn ledger(tenant_id: Uuid, amount: i64, status: BillingStatus) -> NewBillingRecord {
        NewBillingRecord {
            tenant_id,
            subscription_id: None,
            amount,
            currency: "thb".into(),
            status,
            description: None,
            stripe_payment_intent_id: None,
            paid_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn stats_aggregate_images_and_net_revenue() {
        let store = MemoryStore::default();
        let busy = store.seed_tenant(fixture_tenant("busy-event"));
        let mut idle = fixture_tenant("idle-event");
        idle.is_active = false;
        let idle = store.seed_tenant(idle);

        store.seed_image(fixture_image(&busy, ModerationStatus::Pending));
        store.seed_image(fixture_image(&busy, ModerationStatus::Approved));
        store.seed_image(fixture_image(&busy, ModerationStatus::Approved));
        store.seed_image(fixture_image(&idle, ModerationStatus::Rejected));

        store
            .append_billing_record(ledger(busy.id, 99_000, BillingStatus::Paid))
            .await
            .unwrap();
        store
            .append_billing_record(ledger(busy.id, -20_000, BillingStatus::Refunded))
            .await
            .unwrap();
        store
            .append_billing_record(ledger(idle.id, 50_000, BillingStatus::Failed))
            .await
            .unwrap();

        let stats = platform_stats(&store).await.unwrap();
        assert_eq!(stats.overview.total_tenants, 2);
        assert_eq!(stats.overview.active_tenants, 1);
        assert_eq!(stats.overview.total_images, 4);
        assert_eq!(stats.overview.pending_images, 1);
        assert_eq!(stats.overview.approved_images, 2);
        assert_eq!(stats.overview.rejected_images, 1);
        assert_eq!(stats.overview.total_payments, 1);
        assert_eq!(stats.overview.total_revenue.get("thb"), Some(&79_000));

        let busy_row = stats
            .tenants
            .iter()
            .find(|row| row.slug == "busy-event")
            .unwrap();
        assert_eq!(busy_row.approved, 2);
        assert_eq!(busy_row.payments_count, 1);
        let idle_row = stats
            .tenants
            .iter()
            .find(|row| row.slug == "idle-event")
            .unwrap();
        assert!(!idle_row.is_active);
        assert!(idle_row.revenue.is_empty());
    }

    #[tokio::test]
    async fn stats_surface_storage_failures() {
        let store = MemoryStore::default();
        store.seed_tenant(fixture_tenant("broken"));
        store.fail_on("image_stats");
        assert!(platform_stats(&store).await.is_err());
    }

    #[tokio::test]
    async fn last_super_admin_is_kept() {
        let store = MemoryStore::default();
        let root = store
            .insert_admin(NewAdmin::super_admin("root", "hash"))
            .await
            .unwrap();
        let operator = store
            .insert_admin(NewAdmin::super_admin("operator", "hash"))
            .await
            .unwrap();

        assert!(matches!(
            remove_admin(&store, root.id, root.id).await,
            Err(AdminRemovalError::SelfRemoval)
        ));
        let removed = remove_admin(&store, root.id, operator.id).await.unwrap();
        assert_eq!(removed.username, "operator");

        let tenant_id = Uuid::new_v4();
        let staff = store
            .insert_admin(NewAdmin::tenant_admin(tenant_id, "staff", "hash"))
            .await
            .unwrap();
        assert!(matches!(
            remove_admin(&store, staff.id, root.id).await,
            Err(AdminRemovalError::LastSuperAdmin)
        ));
        remove_admin(&store, root.id, staff.id).await.unwrap();
        assert!(matches!(
            remove_admin(&store, root.id, staff.id).await,
            Err(AdminRemovalError::NotFound)
        ));
        assert_eq!(super_admin_count(&store).await, 1);
    }

    async fn super_admin_count(store: &MemoryStore) -> usize {
        store
            .list_admins()
            .await
            .unwrap()
            .iter()
            .filter(|admin| admin.is_super_admin)
            .count()
    }

    #[tokio::test]
    async fn super_admins_removing_each_other_leave_one_behind() {
        let store = MemoryStore::default();
        let first = store
            .insert_admin(NewAdmin::super_admin("first", "hash"))
            .await
            .unwrap();
        let second = store
            .insert_admin(NewAdmin::super_admin("second", "hash"))
            .await
            .unwrap();

        let (a, b) = tokio::join!(
            remove_admin(&store, first.id, second.id),
            remove_admin(&store, second.id, first.id),
        );
        let removed = [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count();
        assert_eq!(removed, 1);
        assert!(matches!(
            a.err().or(b.err()),
            Some(AdminRemovalError::LastSuperAdmin)
        ));
        assert_eq!(super_admin_count(&store).await, 1);
    }
}
