//! Public tenant pages: tenant info, the historical gallery, the live display
//! wall and single images.

use std::collections::HashSet;

use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use picshare_domain::model::{Image, ModerationStatus, PublicImage, Tenant};
use picshare_domain::services::{
    gallery::{display_view, gallery_view, paginate, sort_images, GallerySort, PageRequest},
    tenant::resolve_active,
};
use picshare_domain::storage::{EngagementStore, ImageStore};

use crate::{extract::session_id, state::AppState};

use super::{success, ApiError};

#[derive(Debug, Default, Deserialize)]
pub struct GalleryQuery {
    pub sort: Option<String>,
    pub offset: Option<usize>,
    pub limit: Option<usize>,
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ImageView {
    #[serde(flatten)]
    pub image: PublicImage,
    pub has_liked: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GalleryPage {
    pub images: Vec<ImageView>,
    pub total: usize,
    pub offset: usize,
    pub limit: usize,
    pub has_more: bool,
    pub sort: String,
}

/// The subset of tenant settings guests may see.
#[derive(Debug, Serialize)]
pub struct PublicTenant {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
    pub description: Option<String>,
    pub payment_enabled: bool,
    pub price_amount: i64,
    pub price_currency: String,
    pub display_duration: i32,
    pub max_images_per_user: Option<i32>,
    pub theme_settings: Value,
    pub display_settings: Value,
}

impl From<Tenant> for PublicTenant {
    fn from(tenant: Tenant) -> Self {
        Self {
            id: tenant.id,
            slug: tenant.slug,
            name: tenant.name,
            description: tenant.description,
            payment_enabled: tenant.payment_enabled,
            price_amount: tenant.price_amount,
            price_currency: tenant.price_currency,
            display_duration: tenant.display_duration,
            max_images_per_user: tenant.max_images_per_user,
            theme_settings: tenant.theme_settings,
            display_settings: tenant.display_settings,
        }
    }
}

pub async fn tenant_info_handler(
    state: web::Data<AppState>,
    slug: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let tenant = resolve_active(state.storage(), &slug).await?;
    Ok(success(PublicTenant::from(tenant)))
}

/// Branding for the guest pages.
#[derive(Debug, Serialize)]
pub struct TenantTheme {
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub theme: Value,
    pub display_settings: Value,
    pub payment_enabled: bool,
    pub price_amount: i64,
    pub price_currency: String,
    pub display_duration: i32,
}

pub async fn theme_handler(
    state: web::Data<AppState>,
    slug: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let tenant = resolve_active(state.storage(), &slug).await?;
    Ok(success(TenantTheme {
        name: tenant.name,
        slug: tenant.slug,
        description: tenant.description,
        theme: tenant.theme_settings,
        display_settings: tenant.display_settings,
        payment_enabled: tenant.payment_enabled,
        price_amount: tenant.price_amount,
        price_currency: tenant.price_currency,
        display_duration: tenant.display_duration,
    }))
}

pub async fn gallery_handler(
    state: web::Data<AppState>,
    req: HttpRequest,
    slug: web::Path<String>,
    query: web::Query<GalleryQuery>,
) -> Result<HttpResponse, ApiError> {
    let tenant = resolve_active(state.storage(), &slug).await?;
    let images = state
        .storage()
        .list_images(tenant.id, Some(ModerationStatus::Approved))
        .await?;
    let page = sorted_page(&state, &req, &query, gallery_view(images)).await?;
    Ok(success(page))
}

pub async fn display_handler(
    state: web::Data<AppState>,
    req: HttpRequest,
    slug: web::Path<String>,
    query: web::Query<GalleryQuery>,
) -> Result<HttpResponse, ApiError> {
    let tenant = resolve_active(state.storage(), &slug).await?;
    let images = state
        .storage()
        .list_images(tenant.id, Some(ModerationStatus::Approved))
        .await?;
    let page = sorted_page(&state, &req, &query, display_view(images, Utc::now())).await?;
    Ok(success(serde_json::json!({
        "display_duration": tenant.display_duration,
        "display_settings": tenant.display_settings,
        "gallery": page,
    })))
}

pub async fn image_handler(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<(String, Uuid)>,
    query: web::Query<GalleryQuery>,
) -> Result<HttpResponse, ApiError> {
    let (slug, image_id) = path.into_inner();
    let tenant = resolve_active(state.storage(), &slug).await?;
    let image = state
        .storage()
        .find_image(tenant.id, image_id)
        .await?
        .filter(|image| image.status == ModerationStatus::Approved)
        .ok_or_else(|| ApiError::NotFound("Image not found".into()))?;
    let session = session_id(&req, query.session_id.as_deref());
    let has_liked = state.storage().has_liked(image.id, &session).await?;
    Ok(success(ImageView {
        image: image.into(),
        has_liked,
    }))
}

async fn sorted_page(
    state: &AppState,
    req: &HttpRequest,
    query: &GalleryQuery,
    mut images: Vec<Image>,
) -> Result<GalleryPage, ApiError> {
    let sort = GallerySort::parse(query.sort.as_deref());
    sort_images(&mut images, sort);
    let page = paginate(images, PageRequest::new(query.offset, query.limit));

    let session = session_id(req, query.session_id.as_deref());
    let ids: Vec<Uuid> = page.items.iter().map(|image| image.id).collect();
    let liked: HashSet<Uuid> = state
        .storage()
        .liked_image_ids(&session, &ids)
        .await?
        .into_iter()
        .collect();

    Ok(GalleryPage {
        images: page
            .items
            .into_iter()
            .map(|image| ImageView {
                has_liked: liked.contains(&image.id),
                image: image.into(),
            })
            .collect(),
        total: page.total,
        offset: page.offset,
        limit: page.limit,
        has_more: page.has_more,
        sort: sort_label(sort).to_string(),
    })
}

fn sort_label(sort: GallerySort) -> &'static str {
    match sort {
        GallerySort::Latest => "latest",
        GallerySort::Oldest => "oldest",
        GallerySort::MostLiked => "most_liked",
        GallerySort::MostCommented => "most_commented",
    }
}
