use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use uuid::Uuid;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    AsRefStr,
    Display,
    EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ModerationStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub payment_id: Option<Uuid>,
    pub original_filename: Option<String>,
    pub file_path: String,
    pub thumbnail_path: String,
    pub file_url: String,
    pub thumbnail_url: String,
    pub file_size: i64,
    pub width: i32,
    pub height: i32,
    pub mime_type: String,
    pub status: ModerationStatus,
    pub approved_by: Option<Uuid>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub session_id: Option<String>,
    pub caption: Option<String>,
    pub like_count: i32,
    pub comment_count: i32,
    pub uploaded_at: DateTime<Utc>,
}

impl Image {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(expires_at) if expires_at <= now)
    }
}

/// What guests see of an approved image. Storage paths and the uploader's
/// session id stay server side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicImage {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub file_url: String,
    pub thumbnail_url: String,
    pub width: i32,
    pub height: i32,
    pub mime_type: String,
    pub status: ModerationStatus,
    pub approved_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub caption: Option<String>,
    pub like_count: i32,
    pub comment_count: i32,
    pub uploaded_at: DateTime<Utc>,
}

impl From<Image> for PublicImage {
    fn from(image: Image) -> Self {
        Self {
            id: image.id,
            tenant_id: image.tenant_id,
            file_url: image.file_url,
            thumbnail_url: image.thumbnail_url,
            width: image.width,
            height: image.height,
            mime_type: image.mime_type,
            status: image.status,
            approved_at: image.approved_at,
            expires_at: image.expires_at,
            caption: image.caption,
            like_count: image.like_count,
            comment_count: image.comment_count,
            uploaded_at: image.uploaded_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewImage {
    pub tenant_id: Uuid,
    pub payment_id: Option<Uuid>,
    pub original_filename: Option<String>,
    pub file_path: String,
    pub thumbnail_path: String,
    pub file_url: String,
    pub thumbnail_url: String,
    pub file_size: i64,
    pub width: i32,
    pub height: i32,
    pub mime_type: String,
    pub session_id: Option<String>,
    pub caption: Option<String>,
}

/// A moderation decision. Stores apply it only while the image is pending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageTransition {
    Approve {
        approved_by: Uuid,
        approved_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    },
    Reject {
        rejected_by: Uuid,
        reason: String,
    },
}

impl ImageTransition {
    pub fn target(&self) -> ModerationStatus {
        match self {
            ImageTransition::Approve { .. } => ModerationStatus::Approved,
            ImageTransition::Reject { .. } => ModerationStatus::Rejected,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImageStats {
    pub total: u64,
    pub pending: u64,
    pub approved: u64,
    pub rejected: u64,
    pub likes: u64,
    pub comments: u64,
}
