//! Tenant lookup by slug and the validated update paths used by tenant
//! admins and super-admins.

use thiserror::Error;
use tracing::info;

use crate::model::{validate_slug, NewTenant, SlugError, Tenant, TenantUpdate};
use crate::storage::{StorageError, TenantStore};

#[derive(Debug, Error)]
pub enum TenantError {
    #[error("Tenant not found or inactive")]
    NotFoundOrInactive,
    #[error("Tenant not found")]
    NotFound,
    #[error("Invalid slug: {0}")]
    InvalidSlug(#[from] SlugError),
    #[error("Slug already taken")]
    SlugTaken,
    #[error("{0}")]
    InvalidSetting(&'static str),
    #[error(transparent)]
    Storage(StorageError),
}

impl From<StorageError> for TenantError {
    fn from(err: StorageError) -> Self {
        if err.is_conflict() {
            TenantError::SlugTaken
        } else {
            TenantError::Storage(err)
        }
    }
}

/// Public tenant-scoped routes: the tenant must exist and be active.
pub async fn resolve_active<S>(store: &S, slug: &str) -> Result<Tenant, TenantError>
where
    S: TenantStore + ?Sized,
{
    store
        .find_tenant_by_slug(slug)
        .await?
        .filter(|tenant| tenant.is_active)
        .ok_or(TenantError::NotFoundOrInactive)
}

/// Guarded routes load inactive tenants too so the subscription guard can
/// report why the tenant is unavailable.
pub async fn resolve_any<S>(store: &S, slug: &str) -> Result<Tenant, TenantError>
where
    S: TenantStore + ?Sized,
{
    store
        .find_tenant_by_slug(slug)
        .await?
        .ok_or(TenantError::NotFound)
}

/// Drops the fields a tenant admin may not change from their own settings page.
pub fn settings_only(update: TenantUpdate) -> TenantUpdate {
    TenantUpdate {
        owner_email: None,
        owner_phone: None,
        is_active: None,
        ..update
    }
}

pub fn validate_update(update: &TenantUpdate) -> Result<(), TenantError> {
    if let Some(slug) = update.slug.as_deref() {
        validate_slug(slug)?;
    }
    if update.name.as_deref().is_some_and(|name| name.trim().is_empty()) {
        return Err(TenantError::InvalidSetting("Name cannot be empty"));
    }
    if update.price_amount.is_some_and(|amount| amount < 0) {
        return Err(TenantError::InvalidSetting("Price must not be negative"));
    }
    if let Some(currency) = update.price_currency.as_deref() {
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(TenantError::InvalidSetting("Currency must be a 3-letter code"));
        }
    }
    if update.display_duration.is_some_and(|secs| secs <= 0) {
        return Err(TenantError::InvalidSetting("Display duration must be positive"));
    }
    if update.image_expiry_hours.is_some_and(|hours| hours <= 0) {
        return Err(TenantError::InvalidSetting("Image expiry hours must be positive"));
    }
    if update.max_images_per_user.is_some_and(|max| max < 0) {
        return Err(TenantError::InvalidSetting("Max images per user must not be negative"));
    }
    Ok(())
}

/// Validates and applies a partial update. A changed slug is re-checked for
/// uniqueness; the store's unique index still decides concurrent renames.
pub async fn update_tenant<S>(
    store: &S,
    tenant: &Tenant,
    mut update: TenantUpdate,
) -> Result<Tenant, TenantError>
where
    S: TenantStore + ?Sized,
{
    validate_update(&update)?;
    if let Some(currency) = update.price_currency.as_mut() {
        *currency = currency.to_lowercase();
    }
    if update.slug.as_deref() == Some(tenant.slug.as_str()) {
        update.slug = None;
    }
    if update.is_empty() {
        return Ok(tenant.clone());
    }
    if let Some(slug) = update.slug.as_deref() {
        if store.slug_exists(slug).await? {
            return Err(TenantError::SlugTaken);
        }
    }

    let updated = store
        .update_tenant(tenant.id, update)
        .await?
        .ok_or(TenantError::NotFound)?;
    info!(tenant = %updated.slug, "tenant settings updated");
    Ok(updated)
}

pub async fn create_tenant<S>(store: &S, tenant: NewTenant) -> Result<Tenant, TenantError>
where
    S: TenantStore + ?Sized,
{
    validate_slug(&tenant.slug)?;
    if tenant.name.trim().is_empty() {
        return Err(TenantError::InvalidSetting("Name cannot be empty"));
    }
    if tenant.price_amount < 0 {
        return Err(TenantError::InvalidSetting("Price must not be negative"));
    }
    if store.slug_exists(&tenant.slug).await? {
        return Err(TenantError::SlugTaken);
    }
    let created = store.insert_tenant(tenant).await?;
    info!(tenant = %created.slug, "tenant created");
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::{fixture_tenant, MemoryStore};

    #[tokio::test]
    async fn resolver_hides_inactive_tenants() {
        let store = MemoryStore::default();
        let active = store.seed_tenant(fixture_tenant("live"));
        let mut dormant = fixture_tenant("dormant");
        dormant.is_active = false;
        store.seed_tenant(dormant);

        assert_eq!(resolve_active(&store, "live").await.unwrap().id, active.id);
        let err = resolve_active(&store, "dormant").await.unwrap_err();
        assert_eq!(err.to_string(), "Tenant not found or inactive");
        assert!(!resolve_any(&store, "dormant").await.unwrap().is_active);
        assert!(matches!(
            resolve_any(&store, "missing").await,
            Err(TenantError::NotFound)
        ));
    }

    #[test]
    fn settings_reject_out_of_range_values() {
        let invalid = [
            TenantUpdate { price_amount: Some(-1), ..Default::default() },
            TenantUpdate { image_expiry_hours: Some(0), ..Default::default() },
            TenantUpdate { price_currency: Some("baht".into()), ..Default::default() },
            TenantUpdate { name: Some("  ".into()), ..Default::default() },
        ];
        for update in invalid {
            assert!(matches!(
                validate_update(&update),
                Err(TenantError::InvalidSetting(_))
            ));
        }
        assert!(matches!(
            validate_update(&TenantUpdate { slug: Some("No".into()), ..Default::default() }),
            Err(TenantError::InvalidSlug(SlugError::InvalidFormat))
        ));
    }

    #[test]
    fn admin_settings_cannot_reactivate_tenant() {
        let update = settings_only(TenantUpdate {
            is_active: Some(true),
            owner_email: Some("x@example.com".into()),
            name: Some("Renamed".into()),
            ..Default::default()
        });
        assert_eq!(update.is_active, None);
        assert_eq!(update.owner_email, None);
        assert_eq!(update.name.as_deref(), Some("Renamed"));
    }

    #[tokio::test]
    async fn slug_rename_is_checked_for_uniqueness() {
        let store = MemoryStore::default();
        let tenant = store.seed_tenant(fixture_tenant("first"));
        store.seed_tenant(fixture_tenant("second"));

        let clash = TenantUpdate { slug: Some("second".into()), ..Default::default() };
        assert!(matches!(
            update_tenant(&store, &tenant, clash).await,
            Err(TenantError::SlugTaken)
        ));

        let rename = TenantUpdate {
            slug: Some("renamed".into()),
            price_currency: Some("USD".into()),
            ..Default::default()
        };
        let updated = update_tenant(&store, &tenant, rename).await.unwrap();
        assert_eq!(updated.slug, "renamed");
        assert_eq!(updated.price_currency, "usd");
        assert!(resolve_active(&store, "first").await.is_err());
    }

    #[tokio::test]
    async fn create_rejects_duplicate_slug() {
        let store = MemoryStore::default();
        create_tenant(&store, NewTenant::new("venue", "Venue")).await.unwrap();
        assert!(matches!(
            create_tenant(&store, NewTenant::new("venue", "Other")).await,
            Err(TenantError::SlugTaken)
        ));
        assert!(matches!(
            create_tenant(&store, NewTenant::new("v", "Short")).await,
            Err(TenantError::InvalidSlug(SlugError::TooShort))
        ));
    }
}
