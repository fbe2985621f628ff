//! Storage trait definitions.

use crate::error::StorageResult;
use async_trait::async_trait;
use bomrepo_core::{Format, SpecVersion};
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;

/// A boxed stream of serial numbers for streaming enumeration.
///
/// The stream is tied to the store borrow. Each item is checked against the
/// cancellation token passed to [`BomStore::list_serial_numbers`]; a fired
/// token ends the stream with [`crate::StorageError::Cancelled`].
pub type SerialStream<'a> = Pin<Box<dyn Stream<Item = StorageResult<String>> + Send + 'a>>;

/// A preserved original submission together with its tags.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OriginalBom {
    pub format: Format,
    pub spec_version: SpecVersion,
    pub data: Bytes,
}

/// Versioned document store.
///
/// Serial numbers are passed in their unescaped URN form; implementations
/// map them onto keys through [`crate::layout`]. Both write paths are
/// create-only: a write to a key that already has content fails with
/// [`crate::StorageError::AlreadyExists`] and leaves the existing content
/// untouched.
#[async_trait]
pub trait BomStore: Send + Sync + 'static {
    /// Create the root container if needed and read or write the storage
    /// metadata record. Idempotent.
    async fn initialize(&self, cancel: &CancellationToken) -> StorageResult<()>;

    /// Start writing the canonical document for `(serial_number, version)`.
    async fn store(
        &self,
        serial_number: &str,
        version: u32,
        cancel: &CancellationToken,
    ) -> StorageResult<Box<dyn BomUpload>>;

    /// Read the canonical document, or `None` if absent.
    async fn retrieve(
        &self,
        serial_number: &str,
        version: u32,
        cancel: &CancellationToken,
    ) -> StorageResult<Option<Bytes>>;

    /// Every stored version for a serial number, ascending. Empty if none.
    async fn list_versions(
        &self,
        serial_number: &str,
        cancel: &CancellationToken,
    ) -> StorageResult<Vec<u32>>;

    /// Lazily enumerate every serial number with at least one key.
    fn list_serial_numbers<'a>(&'a self, cancel: &'a CancellationToken) -> SerialStream<'a>;

    /// Remove every key under one version namespace. Absent versions are a no-op.
    async fn delete(
        &self,
        serial_number: &str,
        version: u32,
        cancel: &CancellationToken,
    ) -> StorageResult<()>;

    /// Remove every key under a lineage. Absent lineages are a no-op.
    async fn delete_all(&self, serial_number: &str, cancel: &CancellationToken)
    -> StorageResult<()>;

    /// Creation (filesystem) or last-modified (object storage) time of the
    /// canonical document.
    async fn age(
        &self,
        serial_number: &str,
        version: u32,
        cancel: &CancellationToken,
    ) -> StorageResult<OffsetDateTime>;

    /// Start writing an original document for the given tags.
    async fn store_original(
        &self,
        serial_number: &str,
        version: u32,
        format: Format,
        spec_version: SpecVersion,
        cancel: &CancellationToken,
    ) -> StorageResult<Box<dyn BomUpload>>;

    /// Find the original document stored next to a version, if any.
    async fn retrieve_original(
        &self,
        serial_number: &str,
        version: u32,
        cancel: &CancellationToken,
    ) -> StorageResult<Option<OriginalBom>>;

    /// Get the name of this storage backend.
    ///
    /// Returns a static string identifier for the backend type (e.g., "s3", "filesystem").
    fn backend_name(&self) -> &'static str;

    /// Verify storage backend connectivity.
    ///
    /// The default implementation returns Ok(()).
    async fn health_check(&self) -> StorageResult<()> {
        Ok(())
    }
}

/// Trait for streaming document writes.
///
/// Nothing becomes visible under the target key until `finish` succeeds.
#[async_trait]
pub trait BomUpload: Send {
    /// Write a chunk of data.
    async fn write(&mut self, data: Bytes) -> StorageResult<()>;

    /// Publish the document and return the total bytes written.
    async fn finish(self: Box<Self>) -> StorageResult<u64>;

    /// Abort the upload.
    async fn abort(self: Box<Self>) -> StorageResult<()>;
}

/// Whole-buffer convenience writes on top of [`BomStore`].
///
/// Automatically implemented for every store, including `dyn BomStore`.
#[async_trait]
pub trait BomStoreExt: BomStore {
    async fn store_bytes(
        &self,
        serial_number: &str,
        version: u32,
        data: Bytes,
        cancel: &CancellationToken,
    ) -> StorageResult<u64> {
        let upload = self.store(serial_number, version, cancel).await?;
        write_all(upload, data).await
    }

    async fn store_original_bytes(
        &self,
        serial_number: &str,
        version: u32,
        format: Format,
        spec_version: SpecVersion,
        data: Bytes,
        cancel: &CancellationToken,
    ) -> StorageResult<u64> {
        let upload = self
            .store_original(serial_number, version, format, spec_version, cancel)
            .await?;
        write_all(upload, data).await
    }
}

impl<T: BomStore + ?Sized> BomStoreExt for T {}

/// Write one buffer, aborting the upload if the write fails.
pub(crate) async fn write_all(mut upload: Box<dyn BomUpload>, data: Bytes) -> StorageResult<u64> {
    if let Err(err) = upload.write(data).await {
        let _ = upload.abort().await;
        return Err(err);
    }
    upload.finish().await
}
