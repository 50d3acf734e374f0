//! Guest uploads. Order of checks: subscription guard, quota, payment gate,
//! then file validation and storage.

use actix_multipart::{Field, Multipart};
use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use futures_util::TryStreamExt;
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use picshare_domain::model::{Image, NewImage, Tenant};
use picshare_domain::services::{
    blob::{original_path, thumbnail_path},
    quota::check_quota,
    subscription::check_subscription_active,
    tenant::resolve_any,
    upload_gate::{
        create_upload_payment, settle_upload_payment, verify_upload_payment, UploadPayment,
        UploadPaymentOutcome,
    },
};
use picshare_domain::storage::ImageStore;

use crate::{
    extract::session_id,
    media::{is_accepted_mime, ProcessedImage, OUTPUT_MIME_TYPE},
    state::AppState,
};

use super::{success, ApiError};

/// Text fields are short identifiers; anything longer is truncated.
const MAX_TEXT_FIELD_BYTES: usize = 1024;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct UploadQuery {
    #[serde(default, rename = "paymentIntentId")]
    pub payment_intent_id: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct PaymentRequest {
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PaymentCreatedResponse {
    pub success: bool,
    pub payment_required: bool,
    #[serde(flatten)]
    pub payment: Option<UploadPayment>,
}

async fn guarded_tenant(state: &AppState, slug: &str) -> Result<Tenant, ApiError> {
    let tenant = resolve_any(state.storage(), slug).await?;
    check_subscription_active(state.storage(), &tenant, Utc::now()).await?;
    Ok(tenant)
}

pub async fn create_payment_handler(
    state: web::Data<AppState>,
    req: HttpRequest,
    slug: web::Path<String>,
    payload: Option<web::Json<PaymentRequest>>,
) -> Result<HttpResponse, ApiError> {
    let tenant = guarded_tenant(&state, &slug).await?;
    let supplied = payload.as_ref().and_then(|body| body.session_id.as_deref());
    let session = session_id(&req, supplied);

    let payment =
        match create_upload_payment(state.gateway(), state.storage(), &tenant, &session).await? {
            UploadPaymentOutcome::NotRequired => None,
            UploadPaymentOutcome::Created(payment) => Some(payment),
        };
    Ok(HttpResponse::Ok().json(PaymentCreatedResponse {
        success: true,
        payment_required: payment.is_some(),
        payment,
    }))
}

pub async fn upload_handler(
    state: web::Data<AppState>,
    req: HttpRequest,
    slug: web::Path<String>,
    query: web::Query<UploadQuery>,
    payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    let result = upload(&state, &req, &slug, query.into_inner(), payload).await;
    let label = match &result {
        Ok(_) => "ok",
        Err(err) => error_label(err),
    };
    counter!("upload_requests_total", "result" => label).increment(1);
    result.map(success)
}

fn error_label(err: &ApiError) -> &'static str {
    match err {
        ApiError::Payment(_) => "payment_rejected",
        ApiError::QuotaExceeded { .. } => "quota_exceeded",
        ApiError::SubscriptionRequired
        | ApiError::TenantInactive
        | ApiError::SubscriptionExpired { .. } => "subscription",
        ApiError::Validation(_) => "invalid",
        ApiError::NotFound(_) => "not_found",
        _ => "error",
    }
}

async fn upload(
    state: &AppState,
    req: &HttpRequest,
    slug: &str,
    query: UploadQuery,
    mut payload: Multipart,
) -> Result<Image, ApiError> {
    let tenant = guarded_tenant(state, slug).await?;

    let quota = check_quota(state.storage(), tenant.id, Utc::now()).await;
    if !quota.allowed {
        return Err(ApiError::QuotaExceeded {
            reason: quota.reason,
            usage: quota.usage,
        });
    }

    let form = read_form(&mut payload, state.settings().upload_max_bytes).await?;
    let payment_ref = form
        .payment_intent_id
        .as_deref()
        .or(query.payment_intent_id.as_deref());
    let gate = verify_upload_payment(state.gateway(), &tenant, payment_ref).await?;

    let file = form
        .file
        .ok_or_else(|| ApiError::Validation("No file uploaded".into()))?;
    if !file.content_type.as_deref().is_some_and(is_accepted_mime) {
        return Err(ApiError::Validation(
            "Only JPEG, PNG and WebP images are allowed".into(),
        ));
    }
    if file.oversized {
        return Err(ApiError::Validation(format!(
            "File exceeds the {} byte upload limit",
            state.settings().upload_max_bytes
        )));
    }

    let media = state.media();
    let bytes = file.bytes;
    let original_size = bytes.len();
    let processed: ProcessedImage = web::block(move || media.process(&bytes))
        .await
        .map_err(|err| ApiError::dependency("image processing", err))??;

    let session = session_id(req, form.session_id.as_deref().or(query.session_id.as_deref()));
    let blob_id = Uuid::new_v4();
    let stored = store_blobs(state, &tenant, blob_id, processed).await?;

    let payment_id = match gate.payment_intent() {
        Some(intent) => {
            match settle_upload_payment(state.storage(), &tenant, intent, &session).await {
                Ok(id) => Some(id),
                Err(err) => {
                    discard_blobs(state, vec![stored.original_path, stored.thumbnail_path]).await;
                    return Err(err.into());
                }
            }
        }
        None => None,
    };

    let inserted = state
        .storage()
        .insert_image(NewImage {
            tenant_id: tenant.id,
            payment_id,
            original_filename: file.filename,
            file_path: stored.original_path.clone(),
            thumbnail_path: stored.thumbnail_path.clone(),
            file_url: stored.original_url,
            thumbnail_url: stored.thumbnail_url,
            file_size: i64::try_from(original_size).unwrap_or(i64::MAX),
            width: i32::try_from(stored.width).unwrap_or(i32::MAX),
            height: i32::try_from(stored.height).unwrap_or(i32::MAX),
            mime_type: OUTPUT_MIME_TYPE.to_string(),
            session_id: Some(session),
            caption: form.caption,
        })
        .await;

    match inserted {
        Ok(image) => {
            info!(tenant = %tenant.slug, image = %image.id, paid = payment_id.is_some(), "image uploaded");
            Ok(image)
        }
        Err(err) => {
            discard_blobs(state, vec![stored.original_path, stored.thumbnail_path]).await;
            Err(err.into())
        }
    }
}

struct StoredPair {
    original_path: String,
    original_url: String,
    thumbnail_path: String,
    thumbnail_url: String,
    width: u32,
    height: u32,
}

async fn store_blobs(
    state: &AppState,
    tenant: &Tenant,
    blob_id: Uuid,
    processed: ProcessedImage,
) -> Result<StoredPair, ApiError> {
    let ProcessedImage {
        original,
        thumbnail,
        width,
        height,
    } = processed;
    let original = state
        .blobs()
        .put(&original_path(&tenant.slug, blob_id), original, OUTPUT_MIME_TYPE)
        .await?;
    let thumbnail = match state
        .blobs()
        .put(&thumbnail_path(&tenant.slug, blob_id), thumbnail, OUTPUT_MIME_TYPE)
        .await
    {
        Ok(stored) => stored,
        Err(err) => {
            discard_blobs(state, vec![original.path]).await;
            return Err(err.into());
        }
    };
    Ok(StoredPair {
        original_path: original.path,
        original_url: original.url,
        thumbnail_path: thumbnail.path,
        thumbnail_url: thumbnail.url,
        width,
        height,
    })
}

async fn discard_blobs(state: &AppState, paths: Vec<String>) {
    if let Err(err) = state.blobs().delete(&paths).await {
        warn!(error = %err, ?paths, "failed to clean up stored upload");
    }
}

#[derive(Debug, Default)]
struct UploadedFile {
    filename: Option<String>,
    content_type: Option<String>,
    bytes: Vec<u8>,
    oversized: bool,
}

#[derive(Debug, Default)]
struct UploadForm {
    file: Option<UploadedFile>,
    payment_intent_id: Option<String>,
    session_id: Option<String>,
    caption: Option<String>,
}

/// Buffers the multipart body. Validation happens after the payment gate, so
/// an oversized file is drained and flagged rather than rejected here.
async fn read_form(payload: &mut Multipart, max_bytes: usize) -> Result<UploadForm, ApiError> {
    let mut form = UploadForm::default();
    while let Some(mut field) = payload.try_next().await.map_err(malformed)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" | "image" => form.file = Some(read_file(&mut field, max_bytes).await?),
            "paymentIntentId" | "payment_intent_id" => {
                form.payment_intent_id = Some(read_text(&mut field).await?)
            }
            "session_id" | "sessionId" => form.session_id = Some(read_text(&mut field).await?),
            "caption" => {
                form.caption = Some(read_text(&mut field).await?).filter(|c| !c.trim().is_empty())
            }
            _ => while field.try_next().await.map_err(malformed)?.is_some() {},
        }
    }
    Ok(form)
}

async fn read_file(field: &mut Field, max_bytes: usize) -> Result<UploadedFile, ApiError> {
    let mut file = UploadedFile {
        filename: field
            .content_disposition()
            .and_then(|disposition| disposition.get_filename())
            .map(str::to_string),
        content_type: field.content_type().map(|mime| mime.essence_str().to_string()),
        ..UploadedFile::default()
    };
    while let Some(chunk) = field.try_next().await.map_err(malformed)? {
        if file.oversized {
            continue;
        }
        if file.bytes.len() + chunk.len() > max_bytes {
            file.oversized = true;
            file.bytes = Vec::new();
        } else {
            file.bytes.extend_from_slice(&chunk);
        }
    }
    Ok(file)
}

async fn read_text(field: &mut Field) -> Result<String, ApiError> {
    let mut buf = Vec::new();
    while let Some(chunk) = field.try_next().await.map_err(malformed)? {
        let room = MAX_TEXT_FIELD_BYTES.saturating_sub(buf.len());
        buf.extend_from_slice(&chunk[..chunk.len().min(room)]);
    }
    Ok(String::from_utf8_lossy(&buf).trim().to_string())
}

fn malformed(err: actix_multipart::MultipartError) -> ApiError {
    ApiError::Validation(format!("Malformed upload: {err}"))
}
