//! Serves uploads written by the local filesystem blob backend.

use actix_web::{http::header, web, HttpResponse};

use picshare_domain::services::blob::validate_blob_path;

use crate::state::AppState;

use super::ApiError;

pub async fn uploaded_file_handler(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let not_found = || ApiError::NotFound("File not found".into());
    let Some(root) = state.settings().local_upload_root.as_ref() else {
        return Err(not_found());
    };
    validate_blob_path(&path).map_err(|_| not_found())?;

    let bytes = match tokio::fs::read(root.join(path.as_str())).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Err(not_found()),
        Err(err) => return Err(ApiError::dependency("local file read", err)),
    };
    Ok(HttpResponse::Ok()
        .content_type(content_type_for(&path))
        .insert_header((header::CACHE_CONTROL, "public, max-age=86400"))
        .body(bytes))
}

fn content_type_for(path: &str) -> &'static str {
    let extension = path.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase());
    match extension.as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    }
}
