//! Pending → approved/rejected transitions for uploaded images.

use chrono::{DateTime, Duration, Utc};
use metrics::counter;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::model::{Image, ImageTransition, ModerationStatus, Tenant};
use crate::services::blob::BlobStore;
use crate::services::realtime::{EventBus, TenantEvent};
use crate::storage::{ImageStore, StorageError};

pub const DEFAULT_REJECTION_REASON: &str = "No reason provided";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModerationError {
    #[error("image not found")]
    NotFound,
    #[error("image already processed")]
    AlreadyProcessed,
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Moderation actions scoped to one tenant. Every lookup filters on the
/// tenant id, so foreign images read as not found.
pub struct Moderator<'a, S: ?Sized> {
    store: &'a S,
    events: &'a EventBus,
    tenant: &'a Tenant,
}

impl<'a, S> Moderator<'a, S>
where
    S: ImageStore + ?Sized,
{
    pub fn new(store: &'a S, events: &'a EventBus, tenant: &'a Tenant) -> Self {
        Self {
            store,
            events,
            tenant,
        }
    }

    pub async fn approve(
        &self,
        image_id: Uuid,
        admin_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Image, ModerationError> {
        let expires_at = now + Duration::hours(i64::from(self.tenant.image_expiry_hours.max(0)));
        let image = self
            .transition(
                image_id,
                ImageTransition::Approve {
                    approved_by: admin_id,
                    approved_at: now,
                    expires_at,
                },
            )
            .await?;
        self.events.publish(
            self.tenant.id,
            TenantEvent::ImageApproved {
                image: Box::new(image.clone().into()),
            },
        );
        Ok(image)
    }

    pub async fn reject(
        &self,
        image_id: Uuid,
        admin_id: Uuid,
        reason: Option<&str>,
    ) -> Result<Image, ModerationError> {
        let reason = reason
            .map(str::trim)
            .filter(|reason| !reason.is_empty())
            .unwrap_or(DEFAULT_REJECTION_REASON)
            .to_string();
        let image = self
            .transition(
                image_id,
                ImageTransition::Reject {
                    rejected_by: admin_id,
                    reason,
                },
            )
            .await?;
        self.events
            .publish(self.tenant.id, TenantEvent::ImageRejected { image_id });
        Ok(image)
    }

    /// Removes stored files (best effort) and then the row. Valid in any state.
    pub async fn delete(
        &self,
        blobs: &dyn BlobStore,
        image_id: Uuid,
    ) -> Result<(), ModerationError> {
        let image = self
            .store
            .find_image(self.tenant.id, image_id)
            .await?
            .ok_or(ModerationError::NotFound)?;

        let paths = vec![image.file_path.clone(), image.thumbnail_path.clone()];
        if let Err(err) = blobs.delete(&paths).await {
            warn!(image = %image_id, error = %err, "failed to remove stored image files");
        }

        if !self.store.delete_image(self.tenant.id, image_id).await? {
            return Err(ModerationError::NotFound);
        }
        counter!("moderation_actions_total", "action" => "delete", "result" => "ok").increment(1);
        info!(tenant = %self.tenant.slug, image = %image_id, "image deleted");
        self.events
            .publish(self.tenant.id, TenantEvent::ImageDeleted { image_id });
        Ok(())
    }

    async fn transition(
        &self,
        image_id: Uuid,
        transition: ImageTransition,
    ) -> Result<Image, ModerationError> {
        let action = match transition.target() {
            ModerationStatus::Approved => "approve",
            _ => "reject",
        };
        let current = self
            .store
            .find_image(self.tenant.id, image_id)
            .await?
            .ok_or_else(|| {
                counter!("moderation_actions_total", "action" => action, "result" => "not_found")
                    .increment(1);
                ModerationError::NotFound
            })?;
        if current.status != ModerationStatus::Pending {
            counter!("moderation_actions_total", "action" => action, "result" => "already_processed")
                .increment(1);
            return Err(ModerationError::AlreadyProcessed);
        }

        // The store re-checks `pending`, so a concurrent decision loses here.
        match self
            .store
            .transition_image(self.tenant.id, image_id, transition)
            .await?
        {
            Some(image) => {
                counter!("moderation_actions_total", "action" => action, "result" => "ok")
                    .increment(1);
                info!(tenant = %self.tenant.slug, image = %image_id, action, "image moderated");
                Ok(image)
            }
            None => {
                counter!("moderation_actions_total", "action" => action, "result" => "already_processed")
                    .increment(1);
                Err(ModerationError::AlreadyProcessed)
            }
        }
    }
}
