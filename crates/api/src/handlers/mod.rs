pub mod admin;
pub mod engagement;
pub mod events;
pub mod files;
pub mod gallery;
pub mod internal;
pub mod signup;
pub mod super_admin;
pub mod upload;
pub mod webhook;

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use picshare_billing::WebhookError;
use picshare_domain::services::{
    auth::TokenError,
    blob::BlobError,
    credentials::CredentialError,
    engagement::EngagementError,
    gateway::GatewayError,
    moderation::ModerationError,
    platform::AdminRemovalError,
    quota::QuotaUsage,
    signup::SignupError,
    subscription::GuardError,
    tenant::TenantError,
    upload_gate::GateError,
};
use picshare_domain::storage::StorageError;

use crate::media::MediaError;

static VERBOSE_ERRORS: OnceCell<bool> = OnceCell::new();

/// Enables the `detail` field on dependency failures. Set once at bootstrap.
pub fn set_verbose_errors(enabled: bool) {
    let _ = VERBOSE_ERRORS.set(enabled);
}

fn verbose_errors() -> bool {
    VERBOSE_ERRORS.get().copied().unwrap_or(false)
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Auth(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    Payment(String),
    #[error("{reason}")]
    QuotaExceeded {
        reason: String,
        usage: Option<QuotaUsage>,
    },
    #[error("Active subscription required")]
    SubscriptionRequired,
    #[error("Tenant is not active")]
    TenantInactive,
    #[error("Subscription expired")]
    SubscriptionExpired { expired_at: DateTime<Utc> },
    #[error("Too many requests, please try again later")]
    RateLimited { retry_after: u64 },
    /// Carries the source message; rendered only with verbose errors.
    #[error("Internal server error")]
    Dependency(String),
}

impl ApiError {
    pub fn dependency(context: &str, err: impl std::fmt::Display) -> Self {
        error!(context, error = %err, "dependency failure");
        ApiError::Dependency(format!("{context}: {err}"))
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::Conflict(_) | ApiError::Payment(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Auth(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_)
            | ApiError::QuotaExceeded { .. }
            | ApiError::SubscriptionRequired
            | ApiError::TenantInactive
            | ApiError::SubscriptionExpired { .. } => StatusCode::FORBIDDEN,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Dependency(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let message = self.to_string();
        let mut body = ErrorBody {
            success: false,
            error: message.clone(),
            message,
            usage: None,
            expired_at: None,
            retry_after: None,
            detail: None,
        };
        match self {
            ApiError::QuotaExceeded { usage, .. } => body.usage = usage.clone(),
            ApiError::SubscriptionExpired { expired_at } => body.expired_at = Some(*expired_at),
            ApiError::RateLimited { retry_after } => body.retry_after = Some(*retry_after),
            ApiError::Dependency(detail) if verbose_errors() => body.detail = Some(detail.clone()),
            _ => {}
        }

        let mut response = HttpResponse::build(self.status_code());
        if let ApiError::RateLimited { retry_after } = self {
            response.insert_header(("Retry-After", retry_after.to_string()));
        }
        response.json(body)
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<QuotaUsage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expired_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// `{"success": true, "data": ...}`
#[derive(Debug, Serialize)]
pub struct DataBody<T> {
    pub success: bool,
    pub data: T,
}

pub fn success<T: Serialize>(data: T) -> HttpResponse {
    HttpResponse::Ok().json(DataBody {
        success: true,
        data,
    })
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Conflict(_) => ApiError::Conflict("Resource already exists".into()),
            StorageError::Database(_) => ApiError::dependency("storage", err),
        }
    }
}

impl From<TenantError> for ApiError {
    fn from(err: TenantError) -> Self {
        match err {
            TenantError::NotFoundOrInactive | TenantError::NotFound => {
                ApiError::NotFound(err.to_string())
            }
            TenantError::InvalidSlug(_) | TenantError::InvalidSetting(_) => {
                ApiError::Validation(err.to_string())
            }
            TenantError::SlugTaken => ApiError::Conflict(err.to_string()),
            TenantError::Storage(inner) => inner.into(),
        }
    }
}

impl From<GuardError> for ApiError {
    fn from(err: GuardError) -> Self {
        match err {
            GuardError::SubscriptionRequired => ApiError::SubscriptionRequired,
            GuardError::TenantInactive => ApiError::TenantInactive,
            GuardError::SubscriptionExpired { expired_at } => {
                ApiError::SubscriptionExpired { expired_at }
            }
            GuardError::Storage(inner) => inner.into(),
        }
    }
}

impl From<ModerationError> for ApiError {
    fn from(err: ModerationError) -> Self {
        match err {
            ModerationError::NotFound => ApiError::NotFound("Image not found".into()),
            ModerationError::AlreadyProcessed => {
                ApiError::Conflict("Image already processed".into())
            }
            ModerationError::Storage(inner) => inner.into(),
        }
    }
}

impl From<AdminRemovalError> for ApiError {
    fn from(err: AdminRemovalError) -> Self {
        match err {
            AdminRemovalError::NotFound => ApiError::NotFound(err.to_string()),
            AdminRemovalError::SelfRemoval | AdminRemovalError::LastSuperAdmin => {
                ApiError::Validation(err.to_string())
            }
            AdminRemovalError::Storage(inner) => inner.into(),
        }
    }
}

impl From<EngagementError> for ApiError {
    fn from(err: EngagementError) -> Self {
        match err {
            EngagementError::ImageNotFound => ApiError::NotFound("Image not found".into()),
            EngagementError::EmptyComment | EngagementError::CommentTooLong => {
                ApiError::Validation(err.to_string())
            }
            EngagementError::AlreadyLiked => ApiError::Conflict("Image already liked".into()),
            EngagementError::Storage(inner) => inner.into(),
        }
    }
}

impl From<GateError> for ApiError {
    fn from(err: GateError) -> Self {
        match err {
            GateError::PaymentRequired
            | GateError::InvalidPayment
            | GateError::NotCompleted { .. }
            | GateError::WrongTenant => ApiError::Payment(err.to_string()),
            GateError::PriceNotConfigured => ApiError::Validation(err.to_string()),
            GateError::Gateway(inner) => inner.into(),
            GateError::Storage(inner) => inner.into(),
        }
    }
}

impl From<SignupError> for ApiError {
    fn from(err: SignupError) -> Self {
        match err {
            SignupError::MissingFields
            | SignupError::InvalidSlug(_)
            | SignupError::PlanNotFound
            | SignupError::PlanNotPayable => ApiError::Validation(err.to_string()),
            SignupError::SlugTaken | SignupError::AlreadyProvisioned => {
                ApiError::Conflict(err.to_string())
            }
            SignupError::PaymentNotCompleted | SignupError::PaymentMismatch => {
                ApiError::Payment(err.to_string())
            }
            SignupError::CatalogMissing(_) | SignupError::UsernameExhausted => {
                ApiError::dependency("signup", err)
            }
            SignupError::Gateway(inner) => inner.into(),
            SignupError::Credentials(inner) => inner.into(),
            SignupError::Storage(inner) => inner.into(),
        }
    }
}

impl From<TokenError> for ApiError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Expired | TokenError::Invalid(_) => {
                ApiError::Auth("Invalid or expired token".into())
            }
            TokenError::Signing(_) => ApiError::dependency("token signing", err),
        }
    }
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        ApiError::dependency("payment provider", err)
    }
}

impl From<BlobError> for ApiError {
    fn from(err: BlobError) -> Self {
        ApiError::dependency("blob storage", err)
    }
}

impl From<CredentialError> for ApiError {
    fn from(err: CredentialError) -> Self {
        ApiError::dependency("credentials", err)
    }
}

impl From<MediaError> for ApiError {
    fn from(err: MediaError) -> Self {
        match err {
            MediaError::Decode(_) => ApiError::Validation(err.to_string()),
            MediaError::Encode(_) => ApiError::dependency("image processing", err),
        }
    }
}

impl From<WebhookError> for ApiError {
    fn from(err: WebhookError) -> Self {
        if err.is_client_error() {
            ApiError::Validation(format!("Webhook Error: {err}"))
        } else {
            ApiError::dependency("webhook", err)
        }
    }
}
