//! In-process fan-out of tenant events to server-sent-event subscribers.

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use crate::model::PublicImage;

const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TenantEvent {
    ImageApproved { image: Box<PublicImage> },
    ImageRejected { image_id: Uuid },
    ImageDeleted { image_id: Uuid },
    ImageLiked { image_id: Uuid, like_count: i32 },
    ImageUnliked { image_id: Uuid, like_count: i32 },
    ImageCommented { image_id: Uuid, comment_count: i32 },
}

impl TenantEvent {
    pub fn name(&self) -> &'static str {
        match self {
            TenantEvent::ImageApproved { .. } => "image_approved",
            TenantEvent::ImageRejected { .. } => "image_rejected",
            TenantEvent::ImageDeleted { .. } => "image_deleted",
            TenantEvent::ImageLiked { .. } => "image_liked",
            TenantEvent::ImageUnliked { .. } => "image_unliked",
            TenantEvent::ImageCommented { .. } => "image_commented",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Envelope {
    pub tenant_id: Uuid,
    pub event: TenantEvent,
}

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Envelope>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes to current subscribers. Having none is not an error.
    pub fn publish(&self, tenant_id: Uuid, event: TenantEvent) {
        let name = event.name();
        let delivered = self.sender.send(Envelope { tenant_id, event }).unwrap_or(0);
        debug!(%tenant_id, event = name, delivered, "tenant event published");
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.sender.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        let tenant_id = Uuid::new_v4();
        let image_id = Uuid::new_v4();

        bus.publish(tenant_id, TenantEvent::ImageDeleted { image_id });

        let envelope = rx.recv().await.unwrap();
        assert_eq!(envelope.tenant_id, tenant_id);
        assert_eq!(envelope.event, TenantEvent::ImageDeleted { image_id });
    }

    #[test]
    fn publishing_without_subscribers_is_silent() {
        let bus = EventBus::default();
        bus.publish(Uuid::new_v4(), TenantEvent::ImageRejected {
            image_id: Uuid::new_v4(),
        });
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let event = TenantEvent::ImageLiked {
            image_id: Uuid::nil(),
            like_count: 3,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "image_liked");
        assert_eq!(json["like_count"], 3);
    }
}
