//! Local filesystem storage backend.

use crate::cancel;
use crate::error::{StorageError, StorageResult};
use crate::layout::{self, METADATA_KEY, StorageMetadata};
use crate::traits::{BomStore, BomUpload, OriginalBom, SerialStream, write_all};
use async_trait::async_trait;
use bomrepo_core::{Format, SpecVersion};
use bytes::Bytes;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use time::OffsetDateTime;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::instrument;
use uuid::Uuid;

/// Local filesystem document store.
///
/// Writes go to a uniquely named temp file next to the target and are
/// published with a hard link, which fails if the target already exists.
#[derive(Debug)]
pub struct FilesystemBackend {
    root: PathBuf,
}

impl FilesystemBackend {
    /// Create a new filesystem backend.
    pub async fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get the full path for a key, with path traversal protection.
    ///
    /// Runs on the blocking pool because `canonicalize` and
    /// `symlink_metadata` are synchronous.
    async fn key_path(&self, key: &str) -> StorageResult<PathBuf> {
        let root = self.root.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || Self::key_path_sync(&root, &key))
            .await
            .map_err(|e| {
                StorageError::Io(std::io::Error::other(format!("spawn_blocking failed: {e}")))
            })?
    }

    /// Returns an error if the key would escape the storage root, either
    /// lexically or through a symlinked ancestor.
    fn key_path_sync(root: &Path, key: &str) -> StorageResult<PathBuf> {
        if key.is_empty() || key.contains("..") || key.starts_with('/') || key.contains('\\') {
            return Err(StorageError::InvalidKey(format!(
                "path traversal not allowed: {key}"
            )));
        }
        for component in Path::new(key).components() {
            if !matches!(component, Component::Normal(_)) {
                return Err(StorageError::InvalidKey(format!(
                    "contains unsafe path component: {key}"
                )));
            }
        }

        let path = root.join(key);
        let root_canonical = root.canonicalize().map_err(|e| {
            StorageError::Io(std::io::Error::new(
                e.kind(),
                format!("failed to canonicalize root: {e}"),
            ))
        })?;

        // Check the nearest existing ancestor (or the path itself).
        let mut candidate = Some(path.as_path());
        while let Some(current) = candidate {
            match std::fs::symlink_metadata(current) {
                Ok(meta) => {
                    let canonical = current.canonicalize().map_err(|e| {
                        if meta.file_type().is_symlink() {
                            StorageError::InvalidKey(format!(
                                "symlink target missing or invalid: {key}"
                            ))
                        } else {
                            StorageError::Io(e)
                        }
                    })?;
                    if !canonical.starts_with(&root_canonical) {
                        return Err(StorageError::InvalidKey(format!(
                            "resolved path escapes storage root: {key}"
                        )));
                    }
                    break;
                }
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => return Err(StorageError::Io(err)),
            }
            candidate = current.parent();
        }

        Ok(path)
    }

    /// Ensure parent directory exists.
    async fn ensure_parent(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Probe the target, then open a temp file beside it.
    async fn begin_upload(&self, key: String) -> StorageResult<Box<dyn BomUpload>> {
        let path = self.key_path(&key).await?;
        if fs::try_exists(&path).await? {
            return Err(StorageError::AlreadyExists(key));
        }
        self.ensure_parent(&path).await?;

        let temp_name = format!(".tmp.{}", Uuid::new_v4());
        let temp_path = path.with_file_name(
            path.file_name()
                .map(|n| format!("{}{}", n.to_string_lossy(), temp_name))
                .unwrap_or_else(|| temp_name.clone()),
        );
        let file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_path)
            .await?;

        // Only version directories are pruned on failure, never the root.
        let cleanup_dir = path
            .parent()
            .filter(|parent| *parent != self.root.as_path())
            .map(Path::to_path_buf);

        Ok(Box::new(FilesystemUpload {
            file,
            key,
            temp_path,
            final_path: path,
            cleanup_dir,
            bytes_written: 0,
        }))
    }

    /// Remove a directory tree, treating a missing tree as already removed.
    async fn remove_tree(&self, key: &str) -> StorageResult<()> {
        let path = self.key_path(key).await?;
        match fs::remove_dir_all(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    /// Best-effort removal of a directory that may have become empty.
    async fn prune_empty_dir(&self, key: &str) {
        if let Ok(path) = self.key_path(key).await {
            let _ = fs::remove_dir(&path).await;
        }
    }

    async fn read_optional(&self, key: &str) -> StorageResult<Option<Bytes>> {
        let path = self.key_path(key).await?;
        match fs::read(&path).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Io(e)),
        }
    }
}

#[async_trait]
impl BomStore for FilesystemBackend {
    #[instrument(skip(self, cancel), fields(backend = "filesystem"))]
    async fn initialize(&self, cancel: &CancellationToken) -> StorageResult<()> {
        cancel::check(cancel)?;
        fs::create_dir_all(&self.root).await?;
        let path = self.key_path(METADATA_KEY).await?;

        match fs::read(&path).await {
            Ok(data) => return StorageMetadata::from_bytes(&data)?.ensure_supported(),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(StorageError::Io(e)),
        }

        let record = StorageMetadata::current().to_bytes()?;
        let result = match self.begin_upload(METADATA_KEY.to_string()).await {
            Ok(upload) => write_all(upload, Bytes::from(record)).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(_) => {
                tracing::info!(root = ?self.root, "Initialized storage metadata");
                Ok(())
            }
            // Another process initialized concurrently.
            Err(StorageError::AlreadyExists(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self, cancel), fields(backend = "filesystem"))]
    async fn store(
        &self,
        serial_number: &str,
        version: u32,
        cancel: &CancellationToken,
    ) -> StorageResult<Box<dyn BomUpload>> {
        cancel::check(cancel)?;
        self.begin_upload(layout::canonical_key(serial_number, version))
            .await
    }

    #[instrument(skip(self, cancel), fields(backend = "filesystem"))]
    async fn retrieve(
        &self,
        serial_number: &str,
        version: u32,
        cancel: &CancellationToken,
    ) -> StorageResult<Option<Bytes>> {
        cancel::run(
            cancel,
            self.read_optional(&layout::canonical_key(serial_number, version)),
        )
        .await
    }

    #[instrument(skip(self, cancel), fields(backend = "filesystem"))]
    async fn list_versions(
        &self,
        serial_number: &str,
        cancel: &CancellationToken,
    ) -> StorageResult<Vec<u32>> {
        cancel::check(cancel)?;
        let dir = self.key_path(&layout::serial_prefix(serial_number)).await?;
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::Io(e)),
        };

        let mut versions = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            cancel::check(cancel)?;
            // Use file_type() to avoid following symlinks.
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let Some(version) = entry.file_name().to_str().and_then(layout::parse_version)
            else {
                continue;
            };
            // A version exists once its canonical document is published.
            if fs::try_exists(entry.path().join(layout::CANONICAL_NAME)).await? {
                versions.push(version);
            }
        }
        versions.sort_unstable();
        Ok(versions)
    }

    fn list_serial_numbers<'a>(&'a self, cancel: &'a CancellationToken) -> SerialStream<'a> {
        let stream = async_stream::try_stream! {
            cancel::check(cancel)?;
            let base = self.root.join(layout::layout_root());
            let mut entries = match fs::read_dir(&base).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => return,
                Err(e) => Err(StorageError::Io(e))?,
            };

            while let Some(entry) = entries.next_entry().await? {
                cancel::check(cancel)?;
                // Ignore symlinks and stray files.
                if !entry.file_type().await?.is_dir() {
                    continue;
                }
                if let Some(name) = entry.file_name().to_str() {
                    yield layout::unescape_serial(name);
                }
            }
        };

        Box::pin(stream)
    }

    #[instrument(skip(self, cancel), fields(backend = "filesystem"))]
    async fn delete(
        &self,
        serial_number: &str,
        version: u32,
        cancel: &CancellationToken,
    ) -> StorageResult<()> {
        cancel::check(cancel)?;
        self.remove_tree(&layout::version_prefix(serial_number, version))
            .await?;
        self.prune_empty_dir(&layout::serial_prefix(serial_number))
            .await;
        Ok(())
    }

    #[instrument(skip(self, cancel), fields(backend = "filesystem"))]
    async fn delete_all(
        &self,
        serial_number: &str,
        cancel: &CancellationToken,
    ) -> StorageResult<()> {
        cancel::check(cancel)?;
        self.remove_tree(&layout::serial_prefix(serial_number)).await
    }

    #[instrument(skip(self, cancel), fields(backend = "filesystem"))]
    async fn age(
        &self,
        serial_number: &str,
        version: u32,
        cancel: &CancellationToken,
    ) -> StorageResult<OffsetDateTime> {
        cancel::check(cancel)?;
        let key = layout::canonical_key(serial_number, version);
        let path = self.key_path(&key).await?;
        let metadata = fs::metadata(&path).await.map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                StorageError::NotFound(key.clone())
            } else {
                StorageError::Io(e)
            }
        })?;

        // Birth time is not available on every filesystem.
        let created = metadata.created().or_else(|_| metadata.modified())?;
        Ok(OffsetDateTime::from(created))
    }

    #[instrument(skip(self, cancel), fields(backend = "filesystem"))]
    async fn store_original(
        &self,
        serial_number: &str,
        version: u32,
        format: Format,
        spec_version: SpecVersion,
        cancel: &CancellationToken,
    ) -> StorageResult<Box<dyn BomUpload>> {
        cancel::check(cancel)?;
        self.begin_upload(layout::original_key(
            serial_number,
            version,
            format,
            spec_version,
        ))
        .await
    }

    #[instrument(skip(self, cancel), fields(backend = "filesystem"))]
    async fn retrieve_original(
        &self,
        serial_number: &str,
        version: u32,
        cancel: &CancellationToken,
    ) -> StorageResult<Option<OriginalBom>> {
        cancel::check(cancel)?;
        let prefix = layout::version_prefix(serial_number, version);
        let dir = self.key_path(&prefix).await?;
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StorageError::Io(e)),
        };

        let mut candidates = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str()
                && let Some(tags) = layout::parse_original_name(name)
            {
                candidates.push((name.to_string(), tags));
            }
        }
        candidates.sort();

        let Some((name, (format, spec_version))) = candidates.into_iter().next() else {
            return Ok(None);
        };
        let key = format!("{prefix}/{name}");
        Ok(cancel::run(cancel, self.read_optional(&key))
            .await?
            .map(|data| OriginalBom {
                format,
                spec_version,
                data,
            }))
    }

    fn backend_name(&self) -> &'static str {
        "filesystem"
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn health_check(&self) -> StorageResult<()> {
        let metadata = fs::metadata(&self.root).await.map_err(|e| {
            StorageError::Io(std::io::Error::new(
                e.kind(),
                format!("storage root not accessible: {e}"),
            ))
        })?;

        if !metadata.is_dir() {
            return Err(StorageError::Io(std::io::Error::new(
                ErrorKind::NotADirectory,
                format!("storage root is not a directory: {:?}", self.root),
            )));
        }

        Ok(())
    }
}

/// Streaming upload for filesystem backend.
struct FilesystemUpload {
    file: fs::File,
    key: String,
    temp_path: PathBuf,
    final_path: PathBuf,
    cleanup_dir: Option<PathBuf>,
    bytes_written: u64,
}

impl FilesystemUpload {
    async fn discard(temp_path: &Path, cleanup_dir: Option<&Path>) {
        let _ = fs::remove_file(temp_path).await;
        // Fails harmlessly unless the directory is empty.
        if let Some(dir) = cleanup_dir {
            let _ = fs::remove_dir(dir).await;
        }
    }
}

#[async_trait]
impl BomUpload for FilesystemUpload {
    async fn write(&mut self, data: Bytes) -> StorageResult<()> {
        self.file.write_all(&data).await?;
        self.bytes_written += data.len() as u64;
        Ok(())
    }

    async fn finish(self: Box<Self>) -> StorageResult<u64> {
        let FilesystemUpload {
            file,
            key,
            temp_path,
            final_path,
            cleanup_dir,
            bytes_written,
        } = *self;

        // Ensure all data is on disk before the document becomes visible.
        if let Err(e) = file.sync_all().await {
            drop(file);
            Self::discard(&temp_path, cleanup_dir.as_deref()).await;
            return Err(StorageError::Io(e));
        }
        drop(file);

        match fs::hard_link(&temp_path, &final_path).await {
            Ok(()) => {
                let _ = fs::remove_file(&temp_path).await;
                Ok(bytes_written)
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                let _ = fs::remove_file(&temp_path).await;
                Err(StorageError::AlreadyExists(key))
            }
            Err(e) => {
                Self::discard(&temp_path, cleanup_dir.as_deref()).await;
                Err(StorageError::Io(e))
            }
        }
    }

    async fn abort(self: Box<Self>) -> StorageResult<()> {
        let FilesystemUpload {
            file,
            temp_path,
            cleanup_dir,
            ..
        } = *self;
        drop(file);
        Self::discard(&temp_path, cleanup_dir.as_deref()).await;
        Ok(())
    }
}
