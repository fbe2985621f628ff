//! Repository service: version allocation and document-level policy on top
//! of a [`BomStore`].

use crate::error::{ServiceError, ServiceResult};
use async_stream::try_stream;
use bomrepo_core::codec;
use bomrepo_core::media_type::{self, MediaType};
use bomrepo_core::{Bom, BomIdentifier, CdxUrn, Format, SerialNumber, SpecVersion};
use bomrepo_storage::{BomStore, BomStoreExt, OriginalBom, StorageError};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::sync::Arc;
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

/// Result of a create-only write.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreOutcome {
    /// The document was written under this identifier.
    Stored(BomIdentifier),
    /// The target already had content; nothing was written.
    AlreadyExists(BomIdentifier),
}

impl StoreOutcome {
    pub fn identifier(&self) -> &BomIdentifier {
        match self {
            Self::Stored(id) | Self::AlreadyExists(id) => id,
        }
    }

    pub fn is_stored(&self) -> bool {
        matches!(self, Self::Stored(_))
    }
}

/// An encoded document ready to hand back to a client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderedBom {
    pub content_type: String,
    pub body: Bytes,
}

/// Document-level operations shared by request handlers and background jobs.
#[derive(Clone)]
pub struct RepoService {
    store: Arc<dyn BomStore>,
}

impl RepoService {
    pub fn new(store: Arc<dyn BomStore>) -> Self {
        Self { store }
    }

    pub fn backend(&self) -> &Arc<dyn BomStore> {
        &self.store
    }

    /// Store a document, generating a serial number and allocating the next
    /// version when either is missing.
    ///
    /// Allocation reads the current latest version and adds one. Two writers
    /// racing on the same serial number can compute the same version; the
    /// loser sees [`StoreOutcome::AlreadyExists`] and may retry.
    #[instrument(skip(self, bom, cancel))]
    pub async fn store(
        &self,
        mut bom: Bom,
        cancel: &CancellationToken,
    ) -> ServiceResult<StoreOutcome> {
        let serial = match bom.serial_number.as_deref() {
            None | Some("") => SerialNumber::generate(),
            Some(value) => SerialNumber::parse(value)?,
        };
        let version = match bom.version {
            Some(0) => {
                return Err(ServiceError::InvalidIdentifier(
                    "version must be a positive integer".to_string(),
                ));
            }
            Some(version) => version,
            None => self
                .latest_version(serial.as_str(), cancel)
                .await?
                .map_or(1, |latest| latest + 1),
        };

        bom.serial_number = Some(serial.as_str().to_string());
        bom.version = Some(version);
        let identifier = BomIdentifier::new(serial.into_string(), version);
        let encoded = codec::encode_canonical(&bom)?;

        match self
            .store
            .store_bytes(&identifier.serial_number, version, Bytes::from(encoded), cancel)
            .await
        {
            Ok(size) => {
                debug!(
                    serial_number = %identifier.serial_number,
                    version,
                    cdx_urn = ?identifier.to_cdx_urn(),
                    size,
                    "Stored document"
                );
                Ok(StoreOutcome::Stored(identifier))
            }
            Err(StorageError::AlreadyExists(_)) => Ok(StoreOutcome::AlreadyExists(identifier)),
            Err(err) => Err(err.into()),
        }
    }

    /// Retrieve one version, or the latest when `version` is `None`.
    ///
    /// Absence is `Ok(None)`, never an error.
    #[instrument(skip(self, cancel))]
    pub async fn retrieve(
        &self,
        serial_number: &str,
        version: Option<u32>,
        cancel: &CancellationToken,
    ) -> ServiceResult<Option<Bom>> {
        let serial = SerialNumber::parse(serial_number)?;
        let version = match version {
            Some(version) => version,
            None => match self.latest_version(serial.as_str(), cancel).await? {
                Some(version) => version,
                None => return Ok(None),
            },
        };
        self.fetch(serial.as_str(), version, cancel).await
    }

    /// Retrieve by a `urn:cdx:<uuid>/<version>` reference, or by a serial
    /// number, which resolves to the latest version.
    #[instrument(skip(self, cancel))]
    pub async fn retrieve_by_reference(
        &self,
        reference: &str,
        cancel: &CancellationToken,
    ) -> ServiceResult<Option<Bom>> {
        if let Ok(urn) = CdxUrn::parse(reference) {
            let id = urn.into_identifier();
            return self
                .retrieve(&id.serial_number, Some(id.version), cancel)
                .await;
        }
        if !SerialNumber::is_valid(reference) {
            return Err(ServiceError::InvalidIdentifier(format!(
                "expected a serial number or CDX URN: {reference}"
            )));
        }
        self.retrieve(reference, None, cancel).await
    }

    async fn fetch(
        &self,
        serial_number: &str,
        version: u32,
        cancel: &CancellationToken,
    ) -> ServiceResult<Option<Bom>> {
        match self.store.retrieve(serial_number, version, cancel).await? {
            Some(data) => Ok(Some(codec::decode_canonical(&data)?)),
            None => Ok(None),
        }
    }

    /// Lazily yield every version of a lineage in ascending version order.
    ///
    /// Versions deleted between listing and fetching are skipped.
    pub fn retrieve_all<'a>(
        &'a self,
        serial_number: &'a str,
        cancel: &'a CancellationToken,
    ) -> impl Stream<Item = ServiceResult<Bom>> + Send + 'a {
        try_stream! {
            let serial = SerialNumber::parse(serial_number)?;
            let versions = self.store.list_versions(serial.as_str(), cancel).await?;
            for version in versions {
                if cancel.is_cancelled() {
                    Err(ServiceError::Cancelled)?;
                }
                if let Some(bom) = self.fetch(serial.as_str(), version, cancel).await? {
                    yield bom;
                }
            }
        }
    }

    pub async fn latest_version(
        &self,
        serial_number: &str,
        cancel: &CancellationToken,
    ) -> ServiceResult<Option<u32>> {
        let versions = self.store.list_versions(serial_number, cancel).await?;
        Ok(versions.last().copied())
    }

    pub async fn list_versions(
        &self,
        serial_number: &str,
        cancel: &CancellationToken,
    ) -> ServiceResult<Vec<u32>> {
        let serial = SerialNumber::parse(serial_number)?;
        Ok(self.store.list_versions(serial.as_str(), cancel).await?)
    }

    pub fn list_serial_numbers<'a>(
        &'a self,
        cancel: &'a CancellationToken,
    ) -> impl Stream<Item = ServiceResult<String>> + Send + 'a {
        self.store
            .list_serial_numbers(cancel)
            .map(|item| item.map_err(ServiceError::from))
    }

    pub async fn age(
        &self,
        serial_number: &str,
        version: u32,
        cancel: &CancellationToken,
    ) -> ServiceResult<OffsetDateTime> {
        Ok(self.store.age(serial_number, version, cancel).await?)
    }

    /// Delete one version, or the whole lineage when `version` is `None`.
    #[instrument(skip(self, cancel))]
    pub async fn delete(
        &self,
        serial_number: &str,
        version: Option<u32>,
        cancel: &CancellationToken,
    ) -> ServiceResult<()> {
        let serial = SerialNumber::parse(serial_number)?;
        match version {
            Some(version) => self.store.delete(serial.as_str(), version, cancel).await?,
            None => self.store.delete_all(serial.as_str(), cancel).await?,
        }
        Ok(())
    }

    pub async fn delete_all(
        &self,
        serial_number: &str,
        cancel: &CancellationToken,
    ) -> ServiceResult<()> {
        self.delete(serial_number, None, cancel).await
    }

    /// Preserve submitted bytes next to a stored version.
    #[instrument(skip(self, data, cancel), fields(size = data.len()))]
    pub async fn store_original(
        &self,
        serial_number: &str,
        version: u32,
        format: Format,
        spec_version: SpecVersion,
        data: Bytes,
        cancel: &CancellationToken,
    ) -> ServiceResult<StoreOutcome> {
        let serial = SerialNumber::parse(serial_number)?;
        format.ensure_supports(spec_version)?;
        let identifier = BomIdentifier::new(serial.into_string(), version);

        match self
            .store
            .store_original_bytes(
                &identifier.serial_number,
                version,
                format,
                spec_version,
                data,
                cancel,
            )
            .await
        {
            Ok(_) => Ok(StoreOutcome::Stored(identifier)),
            Err(StorageError::AlreadyExists(_)) => Ok(StoreOutcome::AlreadyExists(identifier)),
            Err(err) => Err(err.into()),
        }
    }

    pub async fn retrieve_original(
        &self,
        serial_number: &str,
        version: u32,
        cancel: &CancellationToken,
    ) -> ServiceResult<Option<OriginalBom>> {
        let serial = SerialNumber::parse(serial_number)?;
        Ok(self
            .store
            .retrieve_original(serial.as_str(), version, cancel)
            .await?)
    }

    /// Decode a submission by content type, store its canonical form, then
    /// keep the submitted bytes as the original for the new version.
    #[instrument(skip(self, data, cancel), fields(size = data.len()))]
    pub async fn submit(
        &self,
        data: Bytes,
        content_type: &str,
        cancel: &CancellationToken,
    ) -> ServiceResult<StoreOutcome> {
        let media = MediaType::parse(content_type)?;
        let bom = codec::decode(&data, media.format)?;
        let spec_version = media.spec_version.unwrap_or(bom.spec_version);
        media.format.ensure_supports(spec_version)?;

        let outcome = self.store(bom, cancel).await?;
        let StoreOutcome::Stored(identifier) = &outcome else {
            return Ok(outcome);
        };

        let original = self
            .store_original(
                &identifier.serial_number,
                identifier.version,
                media.format,
                spec_version,
                data,
                cancel,
            )
            .await?;
        if !original.is_stored() {
            warn!(
                serial_number = %identifier.serial_number,
                version = identifier.version,
                format = %media.format,
                spec_version = %spec_version,
                "Original document already present"
            );
        }
        Ok(outcome)
    }

    /// Encode a document for the first acceptable `(format, spec)` in `accept`.
    pub fn render(&self, bom: &Bom, accept: &str) -> ServiceResult<RenderedBom> {
        let (format, spec_version) = media_type::negotiate_output(accept)?;
        let body = codec::encode(bom, format, spec_version)?;
        Ok(RenderedBom {
            content_type: MediaType::content_type(format, spec_version),
            body: Bytes::from(body),
        })
    }

    /// Serve an original unchanged if `accept` admits its tags.
    pub fn render_original(
        &self,
        original: &OriginalBom,
        accept: &str,
    ) -> ServiceResult<RenderedBom> {
        let media =
            media_type::negotiate_original(accept, original.format, original.spec_version)?;
        Ok(RenderedBom {
            content_type: media.to_string(),
            body: original.data.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bomrepo_core::model::{Component, ComponentType, Metadata};
    use bomrepo_storage::FilesystemBackend;
    use futures::TryStreamExt;
    use tempfile::TempDir;

    async fn service() -> (TempDir, RepoService) {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path()).await.unwrap();
        backend.initialize(&CancellationToken::new()).await.unwrap();
        (dir, RepoService::new(Arc::new(backend)))
    }

    fn document(name: &str) -> Bom {
        let mut bom = Bom::new(SpecVersion::LATEST);
        bom.metadata = Some(Metadata {
            component: Some(Component::new(ComponentType::Application, name)),
            ..Default::default()
        });
        bom
    }

    #[tokio::test]
    async fn test_store_generates_serial_and_allocates_versions() {
        let (_dir, repo) = service().await;
        let cancel = CancellationToken::new();

        let first = repo.store(document("a"), &cancel).await.unwrap();
        let StoreOutcome::Stored(first) = first else {
            panic!("expected a stored outcome");
        };
        assert!(SerialNumber::is_valid(&first.serial_number));
        assert_eq!(first.version, 1);

        let mut next = document("a");
        next.serial_number = Some(first.serial_number.clone());
        let second = repo.store(next, &cancel).await.unwrap();
        assert_eq!(second.identifier().version, 2);

        let latest = repo
            .retrieve(&first.serial_number, None, &cancel)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.version, Some(2));
    }

    #[tokio::test]
    async fn test_retrieve_all_is_ascending() {
        let (_dir, repo) = service().await;
        let cancel = CancellationToken::new();
        let serial = SerialNumber::generate().into_string();

        for version in [3, 1, 2] {
            let mut bom = document("b");
            bom.serial_number = Some(serial.clone());
            bom.version = Some(version);
            assert!(repo.store(bom, &cancel).await.unwrap().is_stored());
        }

        let versions: Vec<Option<u32>> = repo
            .retrieve_all(&serial, &cancel)
            .map_ok(|bom| bom.version)
            .try_collect()
            .await
            .unwrap();
        assert_eq!(versions, vec![Some(1), Some(2), Some(3)]);
    }

    #[tokio::test]
    async fn test_rejects_invalid_identifiers() {
        let (_dir, repo) = service().await;
        let cancel = CancellationToken::new();

        let mut bom = document("c");
        bom.serial_number = Some("not-a-urn".to_string());
        assert!(matches!(
            repo.store(bom, &cancel).await,
            Err(ServiceError::InvalidIdentifier(_))
        ));

        let mut bom = document("c");
        bom.version = Some(0);
        assert!(matches!(
            repo.store(bom, &cancel).await,
            Err(ServiceError::InvalidIdentifier(_))
        ));

        assert!(matches!(
            repo.retrieve(" urn:uuid:3e671687-395b-41f5-a30f-a58921a69b79", None, &cancel)
                .await,
            Err(ServiceError::InvalidIdentifier(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_documents_are_absent() {
        let (_dir, repo) = service().await;
        let cancel = CancellationToken::new();
        let serial = SerialNumber::generate().into_string();

        assert!(repo.retrieve(&serial, None, &cancel).await.unwrap().is_none());
        assert!(repo.retrieve(&serial, Some(4), &cancel).await.unwrap().is_none());
        assert!(
            repo.retrieve_original(&serial, 1, &cancel)
                .await
                .unwrap()
                .is_none()
        );
        repo.delete(&serial, None, &cancel).await.unwrap();
    }

    #[tokio::test]
    async fn test_render_original_checks_accept() {
        let (_dir, repo) = service().await;
        let original = OriginalBom {
            format: Format::Xml,
            spec_version: SpecVersion::V1_2,
            data: Bytes::from_static(b"<bom/>"),
        };

        let rendered = repo
            .render_original(&original, "application/vnd.cyclonedx+xml; version=1.2")
            .unwrap();
        assert_eq!(rendered.content_type, "application/vnd.cyclonedx+xml; version=1.2");
        assert_eq!(rendered.body, original.data);

        assert!(matches!(
            repo.render_original(&original, "application/json"),
            Err(ServiceError::UnacceptableMediaType(_))
        ));
        assert!(matches!(
            repo.render_original(&original, "*/*"),
            Err(ServiceError::UnacceptableMediaType(_))
        ));
    }
}
