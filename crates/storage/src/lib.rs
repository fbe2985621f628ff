//! Versioned document storage for the BOM repository.
//!
//! This crate provides:
//! - The `BomStore` contract with create-only writes
//! - The shared key layout and storage metadata record
//! - Backends: local filesystem and S3-compatible

pub mod backends;
pub mod cancel;
pub mod error;
pub mod layout;
pub mod traits;

pub use backends::{
    filesystem::FilesystemBackend,
    s3::{S3Backend, S3Options},
};
pub use error::{StorageError, StorageResult};
pub use traits::{BomStore, BomStoreExt, BomUpload, OriginalBom, SerialStream};

use bomrepo_core::config::StorageConfig;
use std::sync::Arc;

/// Create a document store from configuration.
///
/// The store is not initialized; call [`BomStore::initialize`] before use.
pub async fn from_config(config: &StorageConfig) -> StorageResult<Arc<dyn BomStore>> {
    config.validate().map_err(StorageError::Config)?;

    match config {
        StorageConfig::Filesystem { path } => {
            let backend = FilesystemBackend::new(path).await?;
            Ok(Arc::new(backend))
        }
        StorageConfig::S3 {
            bucket,
            endpoint,
            region,
            prefix,
            access_key_id,
            secret_access_key,
            force_path_style,
            conditional_writes,
        } => {
            let backend = S3Backend::new(S3Options {
                bucket: bucket.clone(),
                endpoint: endpoint.clone(),
                region: region.clone(),
                prefix: prefix.clone(),
                access_key_id: access_key_id.clone(),
                secret_access_key: secret_access_key.clone(),
                force_path_style: *force_path_style,
                conditional_writes: *conditional_writes,
            })
            .await?;
            Ok(Arc::new(backend))
        }
    }
}
