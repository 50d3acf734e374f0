//! Guest likes and comments on approved images.

use metrics::counter;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::model::{Comment, Image, ModerationStatus, NewComment, Tenant};
use crate::services::realtime::{EventBus, TenantEvent};
use crate::storage::{EngagementStore, ImageStore, StorageError};

pub const MAX_COMMENT_LENGTH: usize = 500;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngagementError {
    #[error("image not found")]
    ImageNotFound,
    #[error("comment text is required")]
    EmptyComment,
    #[error("comment must be at most {MAX_COMMENT_LENGTH} characters")]
    CommentTooLong,
    #[error("image already liked")]
    AlreadyLiked,
    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LikeOutcome {
    pub liked: bool,
    pub like_count: i32,
}

/// Trims and length-checks a comment body (counted in characters).
pub fn normalize_comment(raw: &str) -> Result<String, EngagementError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(EngagementError::EmptyComment);
    }
    if trimmed.chars().count() > MAX_COMMENT_LENGTH {
        return Err(EngagementError::CommentTooLong);
    }
    Ok(trimmed.to_string())
}

async fn approved_image<S>(store: &S, tenant: &Tenant, image_id: Uuid) -> Result<Image, EngagementError>
where
    S: ImageStore + ?Sized,
{
    match store.find_image(tenant.id, image_id).await? {
        Some(image) if image.status == ModerationStatus::Approved => Ok(image),
        _ => Err(EngagementError::ImageNotFound),
    }
}

/// Likes the image for this session, or removes the like when one exists.
pub async fn toggle_like<S>(
    store: &S,
    events: &EventBus,
    tenant: &Tenant,
    image_id: Uuid,
    session_id: &str,
) -> Result<LikeOutcome, EngagementError>
where
    S: ImageStore + EngagementStore + ?Sized,
{
    let image = approved_image(store, tenant, image_id).await?;

    if store.has_liked(image_id, session_id).await? {
        store.remove_like(image_id, session_id).await?;
        let like_count = (image.like_count - 1).max(0);
        counter!("engagement_events_total", "kind" => "unlike").increment(1);
        events.publish(
            tenant.id,
            TenantEvent::ImageUnliked {
                image_id,
                like_count,
            },
        );
        return Ok(LikeOutcome {
            liked: false,
            like_count,
        });
    }

    match store.add_like(image_id, session_id).await {
        Ok(_) => {}
        Err(err) if err.is_conflict() => {
            counter!("engagement_events_total", "kind" => "duplicate_like").increment(1);
            return Err(EngagementError::AlreadyLiked);
        }
        Err(err) => return Err(err.into()),
    }
    let like_count = image.like_count + 1;
    counter!("engagement_events_total", "kind" => "like").increment(1);
    events.publish(
        tenant.id,
        TenantEvent::ImageLiked {
            image_id,
            like_count,
        },
    );
    Ok(LikeOutcome {
        liked: true,
        like_count,
    })
}

pub async fn add_comment<S>(
    store: &S,
    events: &EventBus,
    tenant: &Tenant,
    image_id: Uuid,
    session_id: &str,
    raw_content: &str,
) -> Result<Comment, EngagementError>
where
    S: ImageStore + EngagementStore + ?Sized,
{
    let content = normalize_comment(raw_content)?;
    let image = approved_image(store, tenant, image_id).await?;
    let comment = store
        .add_comment(NewComment {
            image_id,
            tenant_id: tenant.id,
            session_id: session_id.to_string(),
            content,
        })
        .await?;
    counter!("engagement_events_total", "kind" => "comment").increment(1);
    events.publish(
        tenant.id,
        TenantEvent::ImageCommented {
            image_id,
            comment_count: image.comment_count + 1,
        },
    );
    Ok(comment)
}

pub async fn list_comments<S>(
    store: &S,
    tenant: &Tenant,
    image_id: Uuid,
) -> Result<Vec<Comment>, EngagementError>
where
    S: ImageStore + EngagementStore + ?Sized,
{
    approved_image(store, tenant, image_id).await?;
    Ok(store.list_comments(image_id).await?)
}
