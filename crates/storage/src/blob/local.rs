use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use picshare_domain::services::blob::{validate_blob_path, BlobError, BlobStore, StoredBlob};
use tokio::fs;

/// URL prefix under which the API serves the upload directory.
pub const LOCAL_URL_PREFIX: &str = "/uploads";

/// Writes blobs below a directory on local disk.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &PathBuf {
        &self.root
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(
        &self,
        path: &str,
        bytes: Vec<u8>,
        _content_type: &str,
    ) -> Result<StoredBlob, BlobError> {
        validate_blob_path(path)?;
        let target = self.root.join(path);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|err| BlobError::Io(err.to_string()))?;
        }
        fs::write(&target, bytes)
            .await
            .map_err(|err| BlobError::Io(err.to_string()))?;
        Ok(StoredBlob {
            path: path.to_string(),
            url: self.public_url(path),
        })
    }

    fn public_url(&self, path: &str) -> String {
        format!("{LOCAL_URL_PREFIX}/{path}")
    }

    async fn delete(&self, paths: &[String]) -> Result<(), BlobError> {
        for path in paths {
            validate_blob_path(path)?;
            match fs::remove_file(self.root.join(path)).await {
                Ok(()) => {}
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => return Err(BlobError::Io(err.to_string())),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_writes_nested_file_and_delete_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = LocalBlobStore::new(dir.path());

        let stored = store
            .put("event/images/a.jpg", vec![1, 2, 3], "image/jpeg")
            .await
            .expect("put");
        assert_eq!(stored.url, "/uploads/event/images/a.jpg");
        let written = std::fs::read(dir.path().join("event/images/a.jpg")).expect("read");
        assert_eq!(written, vec![1, 2, 3]);

        let paths = vec!["event/images/a.jpg".to_string()];
        store.delete(&paths).await.expect("first delete");
        store.delete(&paths).await.expect("second delete");
        assert!(!dir.path().join("event/images/a.jpg").exists());
    }

    #[tokio::test]
    async fn traversal_paths_are_refused() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = LocalBlobStore::new(dir.path());
        let err = store
            .put("../escape.jpg", vec![0], "image/jpeg")
            .await
            .unwrap_err();
        assert!(matches!(err, BlobError::InvalidPath(_)));
    }
}
