use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BlobError {
    #[error("blob io failed: {0}")]
    Io(String),
    #[error("object storage request failed: {0}")]
    Remote(String),
    #[error("invalid blob path `{0}`")]
    InvalidPath(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    pub path: String,
    pub url: String,
}

/// Object storage for originals and thumbnails. Paths are relative and
/// tenant-scoped, e.g. `my-event/images/<uuid>.jpg`.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<StoredBlob, BlobError>;
    fn public_url(&self, path: &str) -> String;
    /// Deleting an absent object succeeds.
    async fn delete(&self, paths: &[String]) -> Result<(), BlobError>;
}

pub fn original_path(tenant_slug: &str, id: Uuid) -> String {
    format!("{tenant_slug}/images/{id}.jpg")
}

pub fn thumbnail_path(tenant_slug: &str, id: Uuid) -> String {
    format!("{tenant_slug}/thumbnails/{id}.jpg")
}

/// Rejects absolute paths and parent traversal.
pub fn validate_blob_path(path: &str) -> Result<(), BlobError> {
    let bad = path.is_empty()
        || path.starts_with('/')
        || path.contains('\\')
        || path.split('/').any(|segment| segment.is_empty() || segment == "..");
    if bad {
        Err(BlobError::InvalidPath(path.to_string()))
    } else {
        Ok(())
    }
}
