use actix_web::{web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use picshare_domain::services::{
    engagement::{add_comment, list_comments, toggle_like},
    tenant::resolve_active,
};

use crate::{extract::session_id, state::AppState};

use super::{success, ApiError};

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct LikeRequest {
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct CommentRequest {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Likes the image for the caller's session, or unlikes it on a second call.
pub async fn like_handler(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<(String, Uuid)>,
    payload: Option<web::Json<LikeRequest>>,
) -> Result<HttpResponse, ApiError> {
    let (slug, image_id) = path.into_inner();
    let tenant = resolve_active(state.storage(), &slug).await?;
    let supplied = payload.as_ref().and_then(|body| body.session_id.as_deref());
    let session = session_id(&req, supplied);
    let outcome = toggle_like(state.storage(), state.events(), &tenant, image_id, &session).await?;
    Ok(success(outcome))
}

pub async fn list_comments_handler(
    state: web::Data<AppState>,
    path: web::Path<(String, Uuid)>,
) -> Result<HttpResponse, ApiError> {
    let (slug, image_id) = path.into_inner();
    let tenant = resolve_active(state.storage(), &slug).await?;
    let comments = list_comments(state.storage(), &tenant, image_id).await?;
    Ok(success(comments))
}

pub async fn add_comment_handler(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<(String, Uuid)>,
    payload: web::Json<CommentRequest>,
) -> Result<HttpResponse, ApiError> {
    let (slug, image_id) = path.into_inner();
    let tenant = resolve_active(state.storage(), &slug).await?;
    let session = session_id(&req, payload.session_id.as_deref());
    let content = payload.content.as_deref().unwrap_or_default();
    let comment = add_comment(
        state.storage(),
        state.events(),
        &tenant,
        image_id,
        &session,
        content,
    )
    .await?;
    Ok(success(comment))
}
