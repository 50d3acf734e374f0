use std::{path::PathBuf, sync::Arc};

use picshare_domain::services::{
    auth::TokenAuthority, blob::BlobStore, gateway::PaymentGateway, notify::Mailer,
    rate_limit::RateLimiter, realtime::EventBus,
};
use picshare_domain::TelemetryGuard;
use picshare_storage::SeaOrmStorage;

use crate::media::ImageProcessor;

/// External services injected at bootstrap and replaced by fakes in tests.
#[derive(Clone)]
pub struct Collaborators {
    pub gateway: Arc<dyn PaymentGateway>,
    pub blobs: Arc<dyn BlobStore>,
    pub mailer: Arc<dyn Mailer>,
    pub media: Arc<dyn ImageProcessor>,
}

#[derive(Debug, Clone)]
pub struct AppSettings {
    pub base_url: String,
    pub expose_signup_credentials: bool,
    pub upload_max_bytes: usize,
    pub webhook_secret: Option<String>,
    /// Set when uploads live on the local filesystem and are served by the API.
    pub local_upload_root: Option<PathBuf>,
}

#[derive(Clone)]
pub struct AppState {
    storage: SeaOrmStorage,
    collaborators: Collaborators,
    tokens: TokenAuthority,
    limiter: RateLimiter,
    events: EventBus,
    telemetry: TelemetryGuard,
    settings: Arc<AppSettings>,
}

impl AppState {
    pub fn new(
        storage: SeaOrmStorage,
        collaborators: Collaborators,
        tokens: TokenAuthority,
        limiter: RateLimiter,
        telemetry: TelemetryGuard,
        settings: AppSettings,
    ) -> Self {
        Self {
            storage,
            collaborators,
            tokens,
            limiter,
            events: EventBus::default(),
            telemetry,
            settings: Arc::new(settings),
        }
    }

    pub fn storage(&self) -> &SeaOrmStorage {
        &self.storage
    }

    pub fn gateway(&self) -> &dyn PaymentGateway {
        self.collaborators.gateway.as_ref()
    }

    pub fn blobs(&self) -> &dyn BlobStore {
        self.collaborators.blobs.as_ref()
    }

    pub fn mailer(&self) -> &dyn Mailer {
        self.collaborators.mailer.as_ref()
    }

    pub fn media(&self) -> Arc<dyn ImageProcessor> {
        Arc::clone(&self.collaborators.media)
    }

    pub fn tokens(&self) -> &TokenAuthority {
        &self.tokens
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn telemetry(&self) -> &TelemetryGuard {
        &self.telemetry
    }

    pub fn settings(&self) -> &AppSettings {
        &self.settings
    }
}
