//! Platform operator routes under `/super-admin`.

use std::collections::HashMap;

use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use picshare_domain::model::{Admin, NewAdmin, NewTenant, TenantUpdate, DEFAULT_CURRENCY};
use picshare_domain::services::{
    credentials::{hash_password, verify_password},
    platform::{platform_stats, remove_admin},
    tenant::{create_tenant, update_tenant},
};
use picshare_domain::storage::{AdminStore, ImageStore, TenantStore};

use crate::{extract::SuperAdmin, state::AppState};

use super::{
    admin::{required, AdminProfile, LoginRequest, LoginResponse},
    success, ApiError,
};

const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Default, Deserialize)]
pub struct TenantListQuery {
    pub is_active: Option<bool>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct CreateTenantRequest {
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub owner_email: Option<String>,
    #[serde(default)]
    pub owner_phone: Option<String>,
    #[serde(default)]
    pub payment_enabled: Option<bool>,
    #[serde(default)]
    pub price_amount: Option<i64>,
    #[serde(default)]
    pub price_currency: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TenantRef {
    pub slug: String,
    pub name: String,
}

/// An admin account with the slug and name of the tenant it manages.
#[derive(Debug, Serialize)]
pub struct AdminListing {
    #[serde(flatten)]
    pub admin: Admin,
    pub tenant: Option<TenantRef>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct CreateAdminRequest {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub tenant_id: Option<Uuid>,
    #[serde(default)]
    pub is_super_admin: bool,
}

pub async fn login_handler(
    state: web::Data<AppState>,
    payload: web::Json<LoginRequest>,
) -> Result<HttpResponse, ApiError> {
    let (Some(username), Some(password)) = (
        required(payload.username.as_deref()),
        payload.password.as_deref().filter(|p| !p.is_empty()),
    ) else {
        return Err(ApiError::Validation("Username and password are required".into()));
    };
    let admin = state
        .storage()
        .find_super_admin(username)
        .await?
        .filter(|admin| verify_password(password, &admin.password_hash))
        .ok_or_else(|| ApiError::Auth("Invalid credentials".into()))?;

    let token = state.tokens().issue(&admin, Utc::now())?;
    info!(admin = %admin.username, "super admin logged in");
    Ok(HttpResponse::Ok().json(LoginResponse {
        success: true,
        token,
        admin: AdminProfile {
            id: admin.id,
            username: admin.username,
            role: admin.role,
            tenant_id: admin.tenant_id,
            is_super_admin: admin.is_super_admin,
        },
    }))
}

pub async fn list_tenants_handler(
    state: web::Data<AppState>,
    _auth: SuperAdmin,
    query: web::Query<TenantListQuery>,
) -> Result<HttpResponse, ApiError> {
    let tenants = state.storage().list_tenants(query.is_active).await?;
    Ok(success(tenants))
}

pub async fn create_tenant_handler(
    state: web::Data<AppState>,
    _auth: SuperAdmin,
    payload: web::Json<CreateTenantRequest>,
) -> Result<HttpResponse, ApiError> {
    let request = payload.into_inner();
    let (Some(slug), Some(name)) = (
        required(request.slug.as_deref()),
        required(request.name.as_deref()),
    ) else {
        return Err(ApiError::Validation("Slug and name are required".into()));
    };

    let mut tenant = NewTenant::new(slug, name);
    tenant.description = request.description;
    tenant.owner_email = request.owner_email;
    tenant.owner_phone = request.owner_phone;
    tenant.payment_enabled = request.payment_enabled.unwrap_or(false);
    tenant.price_amount = request.price_amount.unwrap_or(0);
    tenant.price_currency = request
        .price_currency
        .map(|currency| currency.to_lowercase())
        .unwrap_or_else(|| DEFAULT_CURRENCY.to_string());

    let created = create_tenant(state.storage(), tenant).await?;
    Ok(HttpResponse::Created().json(super::DataBody {
        success: true,
        data: created,
    }))
}

pub async fn update_tenant_handler(
    state: web::Data<AppState>,
    _auth: SuperAdmin,
    tenant_id: web::Path<Uuid>,
    payload: web::Json<TenantUpdate>,
) -> Result<HttpResponse, ApiError> {
    let tenant = state
        .storage()
        .find_tenant(*tenant_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Tenant not found".into()))?;
    let updated = update_tenant(state.storage(), &tenant, payload.into_inner()).await?;
    Ok(success(updated))
}

/// Deletes the tenant and everything it owns. Stored files are removed best
/// effort before the rows go.
pub async fn delete_tenant_handler(
    state: web::Data<AppState>,
    SuperAdmin(operator): SuperAdmin,
    tenant_id: web::Path<Uuid>,
) -> Result<HttpResponse, ApiError> {
    let tenant_id = tenant_id.into_inner();
    let tenant = state
        .storage()
        .find_tenant(tenant_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Tenant not found".into()))?;

    let paths: Vec<String> = state
        .storage()
        .list_images(tenant_id, None)
        .await?
        .into_iter()
        .flat_map(|image| [image.file_path, image.thumbnail_path])
        .collect();
    if !paths.is_empty() {
        if let Err(err) = state.blobs().delete(&paths).await {
            warn!(tenant = %tenant.slug, error = %err, "failed to remove tenant files");
        }
    }

    if !state.storage().delete_tenant(tenant_id).await? {
        return Err(ApiError::NotFound("Tenant not found".into()));
    }
    info!(tenant = %tenant.slug, by = %operator.username, "tenant deleted");
    Ok(success(serde_json::json!({ "id": tenant_id })))
}

pub async fn create_admin_handler(
    state: web::Data<AppState>,
    SuperAdmin(operator): SuperAdmin,
    payload: web::Json<CreateAdminRequest>,
) -> Result<HttpResponse, ApiError> {
    let request = payload.into_inner();
    let (Some(username), Some(password)) = (
        required(request.username.as_deref()),
        request.password.as_deref().filter(|p| !p.is_empty()),
    ) else {
        return Err(ApiError::Validation("Username and password are required".into()));
    };
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::Validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }

    let password_hash = hash_password(password)?;
    let mut admin = if request.is_super_admin {
        NewAdmin::super_admin(username, password_hash)
    } else {
        let tenant_id = request
            .tenant_id
            .ok_or_else(|| ApiError::Validation("tenant_id is required".into()))?;
        if state.storage().find_tenant(tenant_id).await?.is_none() {
            return Err(ApiError::NotFound("Tenant not found".into()));
        }
        NewAdmin::tenant_admin(tenant_id, username, password_hash)
    };
    admin.email = request.email;

    if state.storage().username_exists(username).await? {
        return Err(ApiError::Conflict("Username already taken".into()));
    }
    let created = match state.storage().insert_admin(admin).await {
        Ok(created) => created,
        Err(err) if err.is_conflict() => {
            return Err(ApiError::Conflict("Username already taken".into()))
        }
        Err(err) => return Err(err.into()),
    };
    info!(
        admin = %created.username,
        super_admin = created.is_super_admin,
        by = %operator.username,
        "admin created"
    );
    Ok(HttpResponse::Created().json(super::DataBody {
        success: true,
        data: AdminProfile {
            id: created.id,
            username: created.username,
            role: created.role,
            tenant_id: created.tenant_id,
            is_super_admin: created.is_super_admin,
        },
    }))
}

pub async fn list_admins_handler(
    state: web::Data<AppState>,
    _auth: SuperAdmin,
) -> Result<HttpResponse, ApiError> {
    let tenants: HashMap<Uuid, TenantRef> = state
        .storage()
        .list_tenants(None)
        .await?
        .into_iter()
        .map(|tenant| {
            (
                tenant.id,
                TenantRef {
                    slug: tenant.slug,
                    name: tenant.name,
                },
            )
        })
        .collect();
    let admins: Vec<AdminListing> = state
        .storage()
        .list_admins()
        .await?
        .into_iter()
        .map(|admin| AdminListing {
            tenant: admin.tenant_id.and_then(|id| tenants.get(&id).cloned()),
            admin,
        })
        .collect();
    Ok(success(admins))
}

pub async fn delete_admin_handler(
    state: web::Data<AppState>,
    SuperAdmin(operator): SuperAdmin,
    admin_id: web::Path<Uuid>,
) -> Result<HttpResponse, ApiError> {
    let removed = remove_admin(state.storage(), operator.sub, admin_id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "message": "Admin deleted successfully",
        "data": { "id": removed.id },
    })))
}

pub async fn stats_handler(
    state: web::Data<AppState>,
    _auth: SuperAdmin,
) -> Result<HttpResponse, ApiError> {
    let stats = platform_stats(state.storage()).await?;
    Ok(success(stats))
}
