//! Server-sent events for one tenant's display wall and gallery.

use actix_web::{http::header, web, HttpResponse};
use futures_util::stream::{self, StreamExt};
use tokio::sync::broadcast::{error::RecvError, Receiver};
use tracing::debug;
use uuid::Uuid;

use picshare_domain::services::{
    realtime::{Envelope, TenantEvent},
    tenant::resolve_active,
};

use crate::state::AppState;

use super::ApiError;

pub async fn events_handler(
    state: web::Data<AppState>,
    slug: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let tenant = resolve_active(state.storage(), &slug).await?;
    let receiver = state.events().subscribe();
    debug!(tenant = %tenant.slug, "event stream opened");

    let hello = format!("event: connected\ndata: {{\"tenant\":\"{}\"}}\n\n", tenant.slug);
    let greeting = stream::once(async move { Ok::<_, actix_web::Error>(web::Bytes::from(hello)) });
    let updates = stream::unfold((receiver, tenant.id), |(mut receiver, tenant_id)| async move {
        let frame = next_frame(&mut receiver, tenant_id).await?;
        Some((
            Ok::<_, actix_web::Error>(web::Bytes::from(frame)),
            (receiver, tenant_id),
        ))
    });

    Ok(HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header((header::CACHE_CONTROL, "no-cache"))
        .streaming(greeting.chain(updates)))
}

/// Waits for the next event addressed to `tenant_id`. Lagging receivers skip
/// what they missed; a closed bus ends the stream.
async fn next_frame(receiver: &mut Receiver<Envelope>, tenant_id: Uuid) -> Option<String> {
    loop {
        match receiver.recv().await {
            Ok(envelope) if envelope.tenant_id == tenant_id => {
                return encode_event(&envelope.event);
            }
            Ok(_) => continue,
            Err(RecvError::Lagged(skipped)) => {
                debug!(%tenant_id, skipped, "event stream lagged");
                continue;
            }
            Err(RecvError::Closed) => return None,
        }
    }
}

fn encode_event(event: &TenantEvent) -> Option<String> {
    let data = serde_json::to_string(event).ok()?;
    Some(format!("event: {}\ndata: {data}\n\n", event.name()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use picshare_domain::services::realtime::EventBus;

    #[test]
    fn frames_name_the_event() {
        let image_id = Uuid::new_v4();
        let frame = encode_event(&TenantEvent::ImageRejected { image_id }).unwrap();
        assert!(frame.starts_with("event: image_rejected\ndata: {"));
        assert!(frame.contains(&image_id.to_string()));
        assert!(frame.ends_with("\n\n"));
    }

    #[actix_web::test]
    async fn frames_are_filtered_by_tenant() {
        let bus = EventBus::default();
        let mut receiver = bus.subscribe();
        let ours = Uuid::new_v4();
        let image_id = Uuid::new_v4();
        bus.publish(Uuid::new_v4(), TenantEvent::ImageDeleted { image_id });
        bus.publish(ours, TenantEvent::ImageRejected { image_id });

        let frame = next_frame(&mut receiver, ours).await.unwrap();
        assert!(frame.starts_with("event: image_rejected"));
    }
}
