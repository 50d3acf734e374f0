//! Blob storage backends for uploaded originals and thumbnails.

mod local;
mod supabase;

use std::sync::Arc;

use picshare_domain::services::blob::BlobStore;
use picshare_domain::BlobBackendConfig;

pub use local::LocalBlobStore;
pub use supabase::SupabaseBlobStore;

/// Builds the backend selected by `STORAGE_BACKEND`.
pub fn blob_store_from_config(config: &BlobBackendConfig) -> Arc<dyn BlobStore> {
    match config {
        BlobBackendConfig::Local { root } => Arc::new(LocalBlobStore::new(root.clone())),
        BlobBackendConfig::Supabase {
            url,
            service_key,
            bucket,
        } => Arc::new(SupabaseBlobStore::new(url, service_key, bucket)),
    }
}
