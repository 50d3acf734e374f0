use async_trait::async_trait;
use picshare_domain::services::blob::{validate_blob_path, BlobError, BlobStore, StoredBlob};
use reqwest::Client;
use serde_json::json;
use tracing::warn;

/// Supabase Storage backend. Objects live in a single public bucket.
#[derive(Clone)]
pub struct SupabaseBlobStore {
    client: Client,
    base_url: String,
    service_key: String,
    bucket: String,
}

impl SupabaseBlobStore {
    pub fn new(base_url: &str, service_key: &str, bucket: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            service_key: service_key.to_string(),
            bucket: bucket.to_string(),
        }
    }

    fn object_url(&self, path: &str) -> String {
        format!("{}/storage/v1/object/{}/{}", self.base_url, self.bucket, path)
    }
}

#[async_trait]
impl BlobStore for SupabaseBlobStore {
    async fn put(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<StoredBlob, BlobError> {
        validate_blob_path(path)?;
        let response = self
            .client
            .post(self.object_url(path))
            .bearer_auth(&self.service_key)
            .header("apikey", &self.service_key)
            .header("content-type", content_type)
            .header("x-upsert", "true")
            .body(bytes)
            .send()
            .await
            .map_err(|err| BlobError::Remote(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BlobError::Remote(format!("upload returned {status}: {body}")));
        }

        Ok(StoredBlob {
            path: path.to_string(),
            url: self.public_url(path),
        })
    }

    fn public_url(&self, path: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.base_url, self.bucket, path
        )
    }

    async fn delete(&self, paths: &[String]) -> Result<(), BlobError> {
        if paths.is_empty() {
            return Ok(());
        }
        for path in paths {
            validate_blob_path(path)?;
        }
        let response = self
            .client
            .delete(format!(
                "{}/storage/v1/object/{}",
                self.base_url, self.bucket
            ))
            .bearer_auth(&self.service_key)
            .header("apikey", &self.service_key)
            .json(&json!({ "prefixes": paths }))
            .send()
            .await
            .map_err(|err| BlobError::Remote(err.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            warn!(count = paths.len(), "blob delete found no objects");
            return Ok(());
        }
        if !status.is_success() {
            return Err(BlobError::Remote(format!("delete returned {status}")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_url_points_at_public_bucket_path() {
        let store = SupabaseBlobStore::new("https://proj.supabase.co/", "key", "tenant-images");
        assert_eq!(
            store.public_url("event/images/a.jpg"),
            "https://proj.supabase.co/storage/v1/object/public/tenant-images/event/images/a.jpg"
        );
        assert_eq!(
            store.object_url("event/thumbnails/a.jpg"),
            "https://proj.supabase.co/storage/v1/object/tenant-images/event/thumbnails/a.jpg"
        );
    }
}
