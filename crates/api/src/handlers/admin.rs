//! Tenant admin routes. Every handler resolves the tenant from the path and
//! checks the bearer token may act on it.

use actix_web::{web, HttpResponse};
use chrono::Utc;
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use picshare_domain::model::{
    BillingRecord, ModerationStatus, Subscription, SubscriptionPlan, Tenant, TenantUpdate,
};
use picshare_domain::services::{
    credentials::verify_password,
    moderation::Moderator,
    quota::check_quota,
    subscription::{detect_expiry, is_expiring_soon, ExpiryState},
    tenant::{resolve_any, settings_only, update_tenant},
};
use picshare_domain::storage::{
    AdminStore, BillingStore, EngagementStore, ImageStore, SubscriptionStore,
};

use crate::{extract::AdminAuth, state::AppState};

use super::{success, ApiError};

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AdminProfile {
    pub id: Uuid,
    pub username: String,
    pub role: String,
    pub tenant_id: Option<Uuid>,
    pub is_super_admin: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub success: bool,
    pub token: String,
    pub admin: AdminProfile,
}

#[derive(Debug, Default, Deserialize)]
pub struct ImageListQuery {
    pub status: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct RejectRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SubscriptionOverview {
    pub subscription: Option<Subscription>,
    pub plan: Option<SubscriptionPlan>,
    pub expired: bool,
    pub days_until_expiry: Option<i64>,
    pub expiring_soon: bool,
    pub billing_history: Vec<BillingRecord>,
}

async fn managed_tenant(
    state: &AppState,
    auth: &AdminAuth,
    slug: &str,
) -> Result<Tenant, ApiError> {
    let tenant = resolve_any(state.storage(), slug).await?;
    auth.require_tenant(&tenant)?;
    Ok(tenant)
}

pub(crate) fn required(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

pub async fn login_handler(
    state: web::Data<AppState>,
    slug: web::Path<String>,
    payload: web::Json<LoginRequest>,
) -> Result<HttpResponse, ApiError> {
    let (Some(username), Some(password)) = (
        required(payload.username.as_deref()),
        payload.password.as_deref().filter(|p| !p.is_empty()),
    ) else {
        return Err(ApiError::Validation("Username and password are required".into()));
    };

    let tenant = resolve_any(state.storage(), &slug).await?;
    let admin = state
        .storage()
        .find_admin_for_login(username, tenant.id)
        .await?
        .filter(|admin| verify_password(password, &admin.password_hash));
    let Some(admin) = admin else {
        counter!("admin_logins_total", "result" => "rejected").increment(1);
        return Err(ApiError::Auth("Invalid credentials".into()));
    };

    let token = state.tokens().issue(&admin, Utc::now())?;
    counter!("admin_logins_total", "result" => "ok").increment(1);
    info!(tenant = %tenant.slug, admin = %admin.username, "admin logged in");
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

pub async fn list_images_handler(
    state: web::Data<AppState>,
    auth: AdminAuth,
    slug: web::Path<String>,
    query: web::Query<ImageListQuery>,
) -> Result<HttpResponse, ApiError> {
    let tenant = managed_tenant(&state, &auth, &slug).await?;
    let status = match required(query.status.as_deref()) {
        None | Some("all") => None,
        Some(raw) => Some(
            raw.parse::<ModerationStatus>()
                .map_err(|_| ApiError::Validation(format!("Unknown status `{raw}`")))?,
        ),
    };
    let images = state.storage().list_images(tenant.id, status).await?;
    Ok(success(images))
}

pub async fn approve_handler(
    state: web::Data<AppState>,
    auth: AdminAuth,
    path: web::Path<(String, Uuid)>,
) -> Result<HttpResponse, ApiError> {
    let (slug, image_id) = path.into_inner();
    let tenant = managed_tenant(&state, &auth, &slug).await?;
    let image = Moderator::new(state.storage(), state.events(), &tenant)
        .approve(image_id, auth.admin_id(), Utc::now())
        .await?;
    Ok(success(image))
}

pub async fn reject_handler(
    state: web::Data<AppState>,
    auth: AdminAuth,
    path: web::Path<(String, Uuid)>,
    payload: Option<web::Json<RejectRequest>>,
) -> Result<HttpResponse, ApiError> {
    let (slug, image_id) = path.into_inner();
    let tenant = managed_tenant(&state, &auth, &slug).await?;
    let reason = payload.as_ref().and_then(|body| body.reason.as_deref());
    let image = Moderator::new(state.storage(), state.events(), &tenant)
        .reject(image_id, auth.admin_id(), reason)
        .await?;
    Ok(success(image))
}

pub async fn delete_image_handler(
    state: web::Data<AppState>,
    auth: AdminAuth,
    path: web::Path<(String, Uuid)>,
) -> Result<HttpResponse, ApiError> {
    let (slug, image_id) = path.into_inner();
    let tenant = managed_tenant(&state, &auth, &slug).await?;
    Moderator::new(state.storage(), state.events(), &tenant)
        .delete(state.blobs(), image_id)
        .await?;
    Ok(success(serde_json::json!({ "id": image_id })))
}

pub async fn stats_handler(
    state: web::Data<AppState>,
    auth: AdminAuth,
    slug: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let tenant = managed_tenant(&state, &auth, &slug).await?;
    let stats = state.storage().image_stats(tenant.id).await?;
    Ok(success(stats))
}

pub async fn quota_handler(
    state: web::Data<AppState>,
    auth: AdminAuth,
    slug: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let tenant = managed_tenant(&state, &auth, &slug).await?;
    let decision = check_quota(state.storage(), tenant.id, Utc::now()).await;
    Ok(success(decision))
}

/// Read-only view for the dashboard: reports a lapsed period without
/// persisting it; the upload guard does that on the next request.
pub async fn subscription_handler(
    state: web::Data<AppState>,
    auth: AdminAuth,
    slug: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let tenant = managed_tenant(&state, &auth, &slug).await?;
    let active = state.storage().find_active_subscription(tenant.id).await?;
    let billing_history = state.storage().list_billing_records(tenant.id).await?;
    let now = Utc::now();

    let overview = match active {
        Some(active) => {
            let days = match detect_expiry(now, active.subscription.current_period_end) {
                ExpiryState::Active { days_remaining } => Some(days_remaining),
                ExpiryState::Expired => None,
            };
            SubscriptionOverview {
                expired: days.is_none(),
                expiring_soon: days.is_some_and(is_expiring_soon),
                days_until_expiry: days,
                subscription: Some(active.subscription),
                plan: Some(active.plan),
                billing_history,
            }
        }
        None => SubscriptionOverview {
            subscription: None,
            plan: None,
            expired: false,
            days_until_expiry: None,
            expiring_soon: false,
            billing_history,
        },
    };
    Ok(success(overview))
}

pub async fn settings_handler(
    state: web::Data<AppState>,
    auth: AdminAuth,
    slug: web::Path<String>,
    payload: web::Json<TenantUpdate>,
) -> Result<HttpResponse, ApiError> {
    let tenant = managed_tenant(&state, &auth, &slug).await?;
    let updated = update_tenant(state.storage(), &tenant, settings_only(payload.into_inner())).await?;
    Ok(success(updated))
}

pub async fn hide_comment_handler(
    state: web::Data<AppState>,
    auth: AdminAuth,
    path: web::Path<(String, Uuid)>,
) -> Result<HttpResponse, ApiError> {
    let (slug, comment_id) = path.into_inner();
    let tenant = managed_tenant(&state, &auth, &slug).await?;
    if !state.storage().hide_comment(tenant.id, comment_id).await? {
        return Err(ApiError::NotFound("Comment not found".into()));
    }
    Ok(success(serde_json::json!({ "id": comment_id, "is_hidden": true })))
}
