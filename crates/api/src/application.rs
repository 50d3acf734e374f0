use std::{path::Path, sync::Arc, time::Duration};

#[cfg(unix)]
use std::fs;

use actix_web::{
    middleware::{from_fn, Logger},
    web, App, HttpServer,
};
use thiserror::Error;
use tracing::info;

use picshare_billing::{HttpMailer, StripeClient};
use picshare_domain::services::{
    auth::TokenAuthority,
    notify::{LogMailer, Mailer},
    rate_limit::{RateLimiter, DEFAULT_SWEEP_INTERVAL},
};
use picshare_domain::storage::StorageError;
use picshare_domain::{
    init_telemetry, ApiConfig, BlobBackendConfig, ConfigError, TelemetryConfig, TelemetryError,
};
use picshare_storage::{blob::blob_store_from_config, SeaOrmStorage};

use crate::{
    handlers::{
        admin, engagement, events, files, gallery, internal, set_verbose_errors, signup,
        super_admin, upload, webhook,
    },
    media::JpegProcessor,
    middleware::rate_limit,
    state::{AppSettings, AppState, Collaborators},
};

pub async fn run() -> Result<(), BootstrapError> {
    // 1. configuration and telemetry
    let config = ApiConfig::load_from_env()?;
    let telemetry = init_telemetry(&TelemetryConfig::from_env("API"))?;
    set_verbose_errors(config.verbose_errors());

    // 2. storage (migrations and plan catalog run on connect)
    let storage = SeaOrmStorage::connect(config.database_url()).await?;

    // 3. external collaborators, each selected once
    let mailer: Arc<dyn Mailer> = match config.mailer() {
        Some(mailer) => Arc::new(HttpMailer::new(mailer)),
        None => {
            info!("EMAIL_API_URL not configured; emails are logged only");
            Arc::new(LogMailer)
        }
    };
    let collaborators = Collaborators {
        gateway: Arc::new(StripeClient::new(
            config.stripe_api_base(),
            config.stripe_secret_key(),
        )),
        blobs: blob_store_from_config(config.blob_backend()),
        mailer,
        media: Arc::new(JpegProcessor),
    };

    // 4. rate limiter and its sweeper
    let limiter = RateLimiter::in_memory(
        Duration::from_secs(config.rate_limit_window_secs()),
        config.rate_limit_max_requests(),
    );
    let sweeper = limiter.spawn_sweeper(DEFAULT_SWEEP_INTERVAL);

    // 5. shared state
    let settings = AppSettings {
        base_url: config.app_base_url().to_string(),
        expose_signup_credentials: config.expose_signup_credentials(),
        upload_max_bytes: config.upload_max_bytes(),
        webhook_secret: config.stripe_webhook_secret().map(str::to_string),
        local_upload_root: match config.blob_backend() {
            BlobBackendConfig::Local { root } => Some(root.clone()),
            BlobBackendConfig::Supabase { .. } => None,
        },
    };
    let state = AppState::new(
        storage,
        collaborators,
        TokenAuthority::new(config.jwt_secret()),
        limiter,
        telemetry,
        settings,
    );

    let served = serve(&config, state).await;

    // 6. the sweeper outlives the servers only until here
    sweeper.shutdown().await;
    info!("api stopped");
    served
}

async fn serve(config: &ApiConfig, state: AppState) -> Result<(), BootstrapError> {
    let operator_routes_on_public = !config.has_internal_listener();

    let public_state = state.clone();
    let mut public_server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(public_state.clone()))
            .app_data(web::PayloadConfig::new(payload_limit(&public_state)))
            .wrap(from_fn(rate_limit))
            .wrap(Logger::default())
            .configure(|cfg| configure_public(cfg, operator_routes_on_public))
    });

    #[cfg(unix)]
    {
        if let Some(socket) = config.api_unix_socket() {
            cleanup_socket(socket)?;
            public_server = public_server.bind_uds(socket)?;
        } else {
            public_server = public_server.bind(config.api_bind_address())?;
        }
    }

    #[cfg(not(unix))]
    {
        if let Some(socket) = config.api_unix_socket() {
            return Err(BootstrapError::Io(std::io::Error::other(format!(
                "unix socket '{socket}' requested but this platform does not support it"
            ))));
        }
        public_server = public_server.bind(config.api_bind_address())?;
    }

    let public_server = public_server.run();

    let internal_server = if config.has_internal_listener() {
        let internal_state = state.clone();
        let mut internal_server = HttpServer::new(move || {
            App::new()
                .app_data(web::Data::new(internal_state.clone()))
                .wrap(Logger::default())
                .configure(configure_internal)
        });

        #[cfg(unix)]
        {
            if let Some(socket) = config.internal_unix_socket() {
                cleanup_socket(socket)?;
                internal_server = internal_server.bind_uds(socket)?;
            } else if let Some(addr) = config.internal_bind_address() {
                internal_server = internal_server.bind(addr)?;
            } else {
                return Err(BootstrapError::Io(std::io::Error::other(
                    "internal listener configured but no bind target provided",
                )));
            }
        }

        #[cfg(not(unix))]
        {
            if let Some(socket) = config.internal_unix_socket() {
                return Err(BootstrapError::Io(std::io::Error::other(format!(
                    "internal unix socket '{socket}' requested but this platform does not support it"
                ))));
            }
            if let Some(addr) = config.internal_bind_address() {
                internal_server = internal_server.bind(addr)?;
            } else {
                return Err(BootstrapError::Io(std::io::Error::other(
                    "internal listener configured but no bind target provided",
                )));
            }
        }

        Some(internal_server.run())
    } else {
        None
    };

    info!(address = config.api_bind_address(), "api listening");
    if let Some(internal) = internal_server {
        tokio::try_join!(public_server, internal)?;
    } else {
        public_server.await?;
    }

    Ok(())
}

/// Raw-body routes (webhooks) need room for the provider's payloads; the
/// multipart upload stream is bounded separately by `UPLOAD_MAX_BYTES`.
fn payload_limit(state: &AppState) -> usize {
    state.settings().upload_max_bytes.max(1024 * 1024)
}

/// Public routes. Literal prefixes are registered before the `{slug}`
/// catch-alls. `operator_routes` mounts `/metrics` and a super-admin guarded
/// sweep when there is no internal listener.
pub fn configure_public(cfg: &mut web::ServiceConfig, operator_routes: bool) {
    cfg.route("/plans", web::get().to(signup::plans_handler))
        .route("/check-slug/{slug}", web::get().to(signup::check_slug_handler))
        .route("/signup/trial", web::post().to(signup::trial_signup_handler))
        .route(
            "/signup/create-payment",
            web::post().to(signup::create_signup_payment_handler),
        )
        .route("/signup/complete", web::post().to(signup::complete_signup_handler))
        .route("/webhook/stripe", web::post().to(webhook::stripe_webhook_handler))
        .route("/uploads/{path:.*}", web::get().to(files::uploaded_file_handler))
        .route("/super-admin/login", web::post().to(super_admin::login_handler))
        .route(
            "/super-admin/tenants",
            web::get().to(super_admin::list_tenants_handler),
        )
        .route(
            "/super-admin/tenants",
            web::post().to(super_admin::create_tenant_handler),
        )
        .route(
            "/super-admin/tenants/{tenant_id}",
            web::put().to(super_admin::update_tenant_handler),
        )
        .route(
            "/super-admin/tenants/{tenant_id}",
            web::delete().to(super_admin::delete_tenant_handler),
        )
        .route(
            "/super-admin/admins",
            web::get().to(super_admin::list_admins_handler),
        )
        .route(
            "/super-admin/admins",
            web::post().to(super_admin::create_admin_handler),
        )
        .route(
            "/super-admin/admins/{admin_id}",
            web::delete().to(super_admin::delete_admin_handler),
        )
        .route("/super-admin/stats", web::get().to(super_admin::stats_handler));

    if operator_routes {
        cfg.route("/metrics", web::get().to(internal::metrics_handler))
            .route(
                "/internal/subscriptions/sweep",
                web::post().to(internal::guarded_sweep_handler),
            );
    }

    cfg.route("/{slug}/info", web::get().to(gallery::tenant_info_handler))
        .route("/{slug}/theme", web::get().to(gallery::theme_handler))
        .route("/{slug}/gallery", web::get().to(gallery::gallery_handler))
        .route("/{slug}/display", web::get().to(gallery::display_handler))
        .route("/{slug}/events", web::get().to(events::events_handler))
        .route(
            "/{slug}/images/{image_id}",
            web::get().to(gallery::image_handler),
        )
        .route(
            "/{slug}/images/{image_id}/like",
            web::post().to(engagement::like_handler),
        )
        .route(
            "/{slug}/images/{image_id}/comments",
            web::get().to(engagement::list_comments_handler),
        )
        .route(
            "/{slug}/images/{image_id}/comments",
            web::post().to(engagement::add_comment_handler),
        )
        .route(
            "/{slug}/payment/create",
            web::post().to(upload::create_payment_handler),
        )
        .route("/{slug}/upload", web::post().to(upload::upload_handler))
        .route("/{slug}/admin/login", web::post().to(admin::login_handler))
        .route(
            "/{slug}/admin/images",
            web::get().to(admin::list_images_handler),
        )
        .route(
            "/{slug}/admin/images/{image_id}/approve",
            web::put().to(admin::approve_handler),
        )
        .route(
            "/{slug}/admin/images/{image_id}/reject",
            web::put().to(admin::reject_handler),
        )
        .route(
            "/{slug}/admin/images/{image_id}",
            web::delete().to(admin::delete_image_handler),
        )
        .route("/{slug}/admin/stats", web::get().to(admin::stats_handler))
        .route("/{slug}/admin/quota", web::get().to(admin::quota_handler))
        .route(
            "/{slug}/admin/subscription",
            web::get().to(admin::subscription_handler),
        )
        .route("/{slug}/admin/settings", web::put().to(admin::settings_handler))
        .route(
            "/{slug}/admin/comments/{comment_id}/hide",
            web::put().to(admin::hide_comment_handler),
        );
}

pub fn configure_internal(cfg: &mut web::ServiceConfig) {
    cfg.route("/metrics", web::get().to(internal::metrics_handler))
        .route(
            "/internal/subscriptions/sweep",
            web::post().to(internal::sweep_handler),
        );
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A stale socket file from an unclean exit makes `bind_uds` fail.
#[cfg(unix)]
fn cleanup_socket(path: &str) -> std::io::Result<()> {
    let socket_path = Path::new(path);
    if socket_path.exists() {
        fs::remove_file(socket_path)?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn cleanup_socket(_path: &str) -> std::io::Result<()> {
    Ok(())
}
