//! S3-compatible storage backend using AWS SDK.

use crate::cancel;
use crate::error::{StorageError, StorageResult};
use crate::layout::{self, CANONICAL_NAME, METADATA_KEY, StorageMetadata};
use crate::traits::{BomStore, BomUpload, OriginalBom, SerialStream, write_all};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::provider::ProvideCredentials;
use aws_credential_types::provider::error::CredentialsError;
use aws_credential_types::provider::future::ProvideCredentials as ProvideCredentialsFuture;
use aws_sdk_s3::Client;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::types::{
    BucketLocationConstraint, CreateBucketConfiguration, Delete, ObjectIdentifier,
};
use aws_smithy_http_client::Builder as SmithyHttpClientBuilder;
use bomrepo_core::{Format, SpecVersion};
use bytes::Bytes;
use futures::{Stream, TryStreamExt};
use std::collections::BTreeSet;
use std::pin::Pin;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// Bulk-delete requests are capped below the service limit of 1000 keys.
const DELETE_BATCH_SIZE: i32 = 999;

const DEFAULT_REGION: &str = "us-east-1";

type KeyStream<'a> = Pin<Box<dyn Stream<Item = StorageResult<String>> + Send + 'a>>;

/// Marker included in lazy-credentials initialization errors so we can map them
/// to actionable storage config errors instead of generic S3 transport failures.
const CREDENTIALS_INIT_ERROR_MARKER: &str = "bomrepo-s3-lazy-credentials-init";
const CREDENTIALS_RESOLVE_ERROR_MARKER: &str = "bomrepo-s3-lazy-credentials-resolve";

/// Lazily initializes the AWS default credentials chain on first signed request.
///
/// This avoids constructor-time side effects (notably TLS/native-root initialization)
/// in environments where no root certificates are available.
#[derive(Debug)]
struct LazyDefaultCredentialsProvider {
    region: String,
    chain: OnceCell<aws_config::default_provider::credentials::DefaultCredentialsChain>,
}

impl LazyDefaultCredentialsProvider {
    fn new(region: String) -> Self {
        Self {
            region,
            chain: OnceCell::new(),
        }
    }

    async fn build_chain(
        &self,
    ) -> Result<aws_config::default_provider::credentials::DefaultCredentialsChain, CredentialsError>
    {
        let region = aws_config::Region::new(self.region.clone());

        tokio::task::spawn(async move {
            aws_config::default_provider::credentials::DefaultCredentialsChain::builder()
                .region(region)
                .build()
                .await
        })
        .await
        .map_err(|join_err| {
            CredentialsError::provider_error(format!(
                "{CREDENTIALS_INIT_ERROR_MARKER}: failed to initialize AWS default credential chain: {join_err}"
            ))
        })
    }

    async fn chain(
        &self,
    ) -> Result<&aws_config::default_provider::credentials::DefaultCredentialsChain, CredentialsError>
    {
        self.chain
            .get_or_try_init(|| async { self.build_chain().await })
            .await
    }

    async fn credentials(&self) -> aws_credential_types::provider::Result {
        let chain = self.chain().await?;
        chain.provide_credentials().await.map_err(|err| {
            CredentialsError::provider_error(format!(
                "{CREDENTIALS_RESOLVE_ERROR_MARKER}: default AWS credentials resolution failed: {err}"
            ))
        })
    }
}

impl ProvideCredentials for LazyDefaultCredentialsProvider {
    fn provide_credentials<'a>(&'a self) -> ProvideCredentialsFuture<'a>
    where
        Self: 'a,
    {
        ProvideCredentialsFuture::new(self.credentials())
    }
}

fn map_s3_operation_error<E>(err: SdkError<E>) -> StorageError
where
    E: std::error::Error + Send + Sync + 'static,
{
    let err_text = err.to_string();
    if err_text.contains(CREDENTIALS_INIT_ERROR_MARKER)
        || err_text.contains(CREDENTIALS_RESOLVE_ERROR_MARKER)
    {
        return StorageError::Config(
            "S3 credential initialization failed. Configure AWS credentials explicitly or ensure ambient AWS credentials and trust roots are available."
                .to_string(),
        );
    }

    StorageError::S3(Box::new(err))
}

fn status_of<E>(err: &SdkError<E>) -> Option<u16> {
    match err {
        SdkError::ServiceError(service_err) => Some(service_err.raw().status().as_u16()),
        _ => None,
    }
}

/// Connection settings for [`S3Backend`].
#[derive(Clone, Debug, Default)]
pub struct S3Options {
    pub bucket: String,
    pub endpoint: Option<String>,
    pub region: Option<String>,
    pub prefix: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    /// Use path-style URLs (`endpoint/bucket/key`) instead of virtual-hosted
    /// style (`bucket.endpoint/key`). Required for MinIO.
    pub force_path_style: bool,
    /// Send `If-None-Match: *` on document writes.
    pub conditional_writes: bool,
}

/// S3-compatible document store using AWS SDK.
///
/// Create-only semantics rely on an existence probe before the upload
/// starts. Two writers can pass the probe for the same key concurrently;
/// with `conditional_writes` the store itself rejects the second PUT.
pub struct S3Backend {
    client: Client,
    bucket: String,
    prefix: Option<String>,
    /// Normalized endpoint, or the canonical AWS endpoint for the region.
    endpoint: String,
    region: String,
    conditional_writes: bool,
}

impl std::fmt::Debug for S3Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Backend")
            .field("bucket", &self.bucket)
            .field("prefix", &self.prefix)
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .field("conditional_writes", &self.conditional_writes)
            .finish_non_exhaustive()
    }
}

impl S3Backend {
    /// Create a new S3 backend. No request is sent until first use.
    pub async fn new(options: S3Options) -> StorageResult<Self> {
        let S3Options {
            bucket,
            endpoint,
            region,
            prefix,
            access_key_id,
            secret_access_key,
            force_path_style,
            conditional_writes,
        } = options;

        if access_key_id.is_some() ^ secret_access_key.is_some() {
            return Err(StorageError::Config(
                "s3 config requires both access_key_id and secret_access_key when either is set"
                    .to_string(),
            ));
        }

        // Build S3 client config directly and defer ambient credentials chain
        // initialization until first signed request.
        let resolved_region = region.unwrap_or_else(|| DEFAULT_REGION.to_string());
        let mut s3_config_builder = aws_sdk_s3::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(aws_config::Region::new(resolved_region.clone()));

        if let (Some(key_id), Some(secret)) = (access_key_id, secret_access_key) {
            let credentials = aws_sdk_s3::config::Credentials::new(
                key_id,
                secret,
                None, // session token
                None, // expiration
                "bomrepo-config",
            );
            s3_config_builder = s3_config_builder.credentials_provider(credentials);
        } else {
            s3_config_builder = s3_config_builder
                .credentials_provider(LazyDefaultCredentialsProvider::new(resolved_region.clone()));
        }

        // Handle bare host:port endpoints (e.g., "minio:9000") by prepending http://
        let normalized_endpoint = endpoint.map(|endpoint_url| {
            let endpoint_lower = endpoint_url.to_lowercase();
            if endpoint_lower.starts_with("http://") || endpoint_lower.starts_with("https://") {
                endpoint_url
            } else {
                format!("http://{endpoint_url}")
            }
        });

        if let Some(endpoint_url) = &normalized_endpoint {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint_url);

            // For explicit HTTP endpoints (e.g. local MinIO), use an HTTP-only client
            // so SDK initialization doesn't depend on native trust roots.
            if endpoint_url.to_ascii_lowercase().starts_with("http://") {
                s3_config_builder =
                    s3_config_builder.http_client(SmithyHttpClientBuilder::new().build_http());
            }
        }

        if force_path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        let client = Client::from_conf(s3_config_builder.build());

        let stored_endpoint = match &normalized_endpoint {
            Some(url) => url.clone(),
            None => format!("s3.{resolved_region}.amazonaws.com"),
        };

        // Strip trailing slashes to avoid double-slash keys like "prefix//key".
        let normalized_prefix = prefix
            .map(|p| p.trim_end_matches('/').to_string())
            .filter(|p| !p.is_empty());

        Ok(Self {
            client,
            bucket,
            prefix: normalized_prefix,
            endpoint: stored_endpoint,
            region: resolved_region,
            conditional_writes,
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    /// Get the full object key for a key (applies prefix if configured).
    fn full_key(&self, key: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{prefix}/{key}"),
            None => key.to_string(),
        }
    }

    /// Strip the configured prefix from a full object key.
    fn strip_prefix<'k>(&self, full_key: &'k str) -> &'k str {
        match &self.prefix {
            Some(prefix) => full_key
                .strip_prefix(prefix.as_str())
                .and_then(|rest| rest.strip_prefix('/'))
                .unwrap_or(full_key),
            None => full_key,
        }
    }

    /// Convert an AWS SDK error to StorageError, mapping 404 to NotFound.
    fn map_sdk_error<E>(err: SdkError<E>, key: &str) -> StorageError
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        if status_of(&err) == Some(404) {
            return StorageError::NotFound(key.to_string());
        }
        map_s3_operation_error(err)
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(self.full_key(key))
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(err) if status_of(&err) == Some(404) => Ok(false),
            Err(err) => Err(map_s3_operation_error(err)),
        }
    }

    async fn get_optional(&self, key: &str) -> StorageResult<Option<Bytes>> {
        let output = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(self.full_key(key))
            .send()
            .await
        {
            Ok(output) => output,
            Err(err) if status_of(&err) == Some(404) => return Ok(None),
            Err(err) => return Err(map_s3_operation_error(err)),
        };

        let bytes = output
            .body
            .collect()
            .await
            .map_err(|e| StorageError::S3(Box::new(e)))?
            .into_bytes();
        Ok(Some(bytes))
    }

    async fn begin_upload(&self, key: String) -> StorageResult<Box<dyn BomUpload>> {
        if self.exists(&key).await? {
            return Err(StorageError::AlreadyExists(key));
        }
        Ok(Box::new(S3Upload {
            client: self.client.clone(),
            bucket: self.bucket.clone(),
            full_key: self.full_key(&key),
            key,
            conditional: self.conditional_writes,
            buffer: Vec::new(),
        }))
    }

    /// Stream every key below `prefix` (which must end in `/`), relative to
    /// the configured prefix. One listing page is held at a time.
    fn keys_under<'a>(&'a self, prefix: &str, cancel: &'a CancellationToken) -> KeyStream<'a> {
        let full_prefix = self.full_key(prefix);

        let stream = async_stream::try_stream! {
            let mut continuation_token: Option<String> = None;

            loop {
                cancel::check(cancel)?;
                let mut request = self
                    .client
                    .list_objects_v2()
                    .bucket(&self.bucket)
                    .prefix(&full_prefix);
                if let Some(token) = continuation_token.take() {
                    request = request.continuation_token(token);
                }
                let output = cancel::run(cancel, async {
                    request.send().await.map_err(map_s3_operation_error)
                })
                .await?;

                for object in output.contents() {
                    if let Some(key) = object.key() {
                        yield self.strip_prefix(key).to_string();
                    }
                }

                if output.is_truncated() == Some(true) {
                    continuation_token = output.next_continuation_token().map(|s| s.to_string());
                } else {
                    break;
                }
            }
        };

        Box::pin(stream)
    }

    /// Delete everything below `prefix` in batches of at most
    /// [`DELETE_BATCH_SIZE`] keys, continuing past failed batches.
    async fn delete_prefix(&self, prefix: &str, cancel: &CancellationToken) -> StorageResult<()> {
        let full_prefix = self.full_key(prefix);
        let mut failed = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            cancel::check(cancel)?;
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(&full_prefix)
                .max_keys(DELETE_BATCH_SIZE);
            if let Some(token) = continuation_token.take() {
                request = request.continuation_token(token);
            }
            let output = cancel::run(cancel, async {
                request.send().await.map_err(map_s3_operation_error)
            })
            .await?;

            let keys: Vec<String> = output
                .contents()
                .iter()
                .filter_map(|object| object.key().map(str::to_string))
                .collect();
            if !keys.is_empty() {
                failed.extend(self.delete_batch(keys).await?);
            }

            if output.is_truncated() == Some(true) {
                continuation_token = output.next_continuation_token().map(|s| s.to_string());
            } else {
                break;
            }
        }

        if failed.is_empty() {
            Ok(())
        } else {
            tracing::warn!(
                prefix = %prefix,
                failed = failed.len(),
                "Bulk delete left keys behind"
            );
            Err(StorageError::BatchDelete { failed })
        }
    }

    /// Issue one bulk delete, returning the keys that were not removed.
    async fn delete_batch(&self, keys: Vec<String>) -> StorageResult<Vec<String>> {
        let objects = keys
            .iter()
            .map(|key| ObjectIdentifier::builder().key(key).build())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StorageError::S3(Box::new(e)))?;
        let delete = Delete::builder()
            .set_objects(Some(objects))
            .quiet(true)
            .build()
            .map_err(|e| StorageError::S3(Box::new(e)))?;

        match self
            .client
            .delete_objects()
            .bucket(&self.bucket)
            .delete(delete)
            .send()
            .await
        {
            Ok(output) => Ok(output
                .errors()
                .iter()
                .filter_map(|err| err.key().map(str::to_string))
                .collect()),
            Err(err) => {
                tracing::warn!(error = %err, keys = keys.len(), "Bulk delete request failed");
                Ok(keys)
            }
        }
    }

    async fn ensure_bucket(&self) -> StorageResult<()> {
        match self.client.head_bucket().bucket(&self.bucket).send().await {
            Ok(_) => return Ok(()),
            Err(err) if status_of(&err) == Some(404) => {}
            Err(err) => return Err(map_s3_operation_error(err)),
        }

        let mut request = self.client.create_bucket().bucket(&self.bucket);
        if self.region != DEFAULT_REGION {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(self.region.as_str()))
                    .build(),
            );
        }
        match request.send().await {
            Ok(_) => {
                tracing::info!(bucket = %self.bucket, "Created bucket");
                Ok(())
            }
            Err(err)
                if err.as_service_error().is_some_and(|e| {
                    e.is_bucket_already_owned_by_you() || e.is_bucket_already_exists()
                }) =>
            {
                Ok(())
            }
            Err(err) => Err(map_s3_operation_error(err)),
        }
    }
}

/// `v1/{escaped}/` (relative common prefix) → unescaped serial number.
fn serial_from_common_prefix(relative: &str) -> Option<String> {
    let root = layout::layout_root();
    let escaped = relative
        .strip_prefix(root.as_str())?
        .strip_prefix('/')?
        .trim_end_matches('/');
    if escaped.is_empty() || escaped.contains('/') {
        return None;
    }
    Some(layout::unescape_serial(escaped))
}

/// `{serial prefix}/{version}/bom.cdx` → version.
fn version_from_key(relative: &str, serial_prefix: &str) -> Option<u32> {
    let rest = relative.strip_prefix(serial_prefix)?.strip_prefix('/')?;
    let (version, name) = rest.split_once('/')?;
    if name != CANONICAL_NAME {
        return None;
    }
    layout::parse_version(version)
}

#[async_trait]
impl BomStore for S3Backend {
    #[instrument(skip(self, cancel), fields(backend = "s3", bucket = %self.bucket))]
    async fn initialize(&self, cancel: &CancellationToken) -> StorageResult<()> {
        cancel::check(cancel)?;
        self.ensure_bucket().await?;

        if let Some(data) = self.get_optional(METADATA_KEY).await? {
            return StorageMetadata::from_bytes(&data)?.ensure_supported();
        }

        let record = StorageMetadata::current().to_bytes()?;
        let result = match self.begin_upload(METADATA_KEY.to_string()).await {
            Ok(upload) => write_all(upload, Bytes::from(record)).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(_) => {
                tracing::info!(bucket = %self.bucket, "Initialized storage metadata");
                Ok(())
            }
            Err(StorageError::AlreadyExists(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self, cancel), fields(backend = "s3"))]
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

    #[instrument(skip(self, cancel), fields(backend = "s3"))]
    async fn retrieve(
        &self,
        serial_number: &str,
        version: u32,
        cancel: &CancellationToken,
    ) -> StorageResult<Option<Bytes>> {
        cancel::run(
            cancel,
            self.get_optional(&layout::canonical_key(serial_number, version)),
        )
        .await
    }

    #[instrument(skip(self, cancel), fields(backend = "s3"))]
    async fn list_versions(
        &self,
        serial_number: &str,
        cancel: &CancellationToken,
    ) -> StorageResult<Vec<u32>> {
        let serial_prefix = layout::serial_prefix(serial_number);
        let mut keys = self.keys_under(&format!("{serial_prefix}/"), cancel);

        let mut versions = BTreeSet::new();
        while let Some(key) = keys.try_next().await? {
            if let Some(version) = version_from_key(&key, &serial_prefix) {
                versions.insert(version);
            }
        }
        Ok(versions.into_iter().collect())
    }

    fn list_serial_numbers<'a>(&'a self, cancel: &'a CancellationToken) -> SerialStream<'a> {
        let full_prefix = self.full_key(&format!("{}/", layout::layout_root()));

        let stream = async_stream::try_stream! {
            let mut continuation_token: Option<String> = None;

            loop {
                cancel::check(cancel)?;
                let mut request = self
                    .client
                    .list_objects_v2()
                    .bucket(&self.bucket)
                    .prefix(&full_prefix)
                    .delimiter("/");
                if let Some(token) = continuation_token.take() {
                    request = request.continuation_token(token);
                }
                let output = cancel::run(cancel, async {
                    request.send().await.map_err(map_s3_operation_error)
                })
                .await?;

                for common in output.common_prefixes() {
                    cancel::check(cancel)?;
                    if let Some(serial) = common
                        .prefix()
                        .and_then(|p| serial_from_common_prefix(self.strip_prefix(p)))
                    {
                        yield serial;
                    }
                }

                if output.is_truncated() == Some(true) {
                    continuation_token = output.next_continuation_token().map(|s| s.to_string());
                } else {
                    break;
                }
            }
        };

        Box::pin(stream)
    }

    #[instrument(skip(self, cancel), fields(backend = "s3"))]
    async fn delete(
        &self,
        serial_number: &str,
        version: u32,
        cancel: &CancellationToken,
    ) -> StorageResult<()> {
        let prefix = format!("{}/", layout::version_prefix(serial_number, version));
        self.delete_prefix(&prefix, cancel).await
    }

    #[instrument(skip(self, cancel), fields(backend = "s3"))]
    async fn delete_all(
        &self,
        serial_number: &str,
        cancel: &CancellationToken,
    ) -> StorageResult<()> {
        let prefix = format!("{}/", layout::serial_prefix(serial_number));
        self.delete_prefix(&prefix, cancel).await
    }

    #[instrument(skip(self, cancel), fields(backend = "s3"))]
    async fn age(
        &self,
        serial_number: &str,
        version: u32,
        cancel: &CancellationToken,
    ) -> StorageResult<OffsetDateTime> {
        let key = layout::canonical_key(serial_number, version);
        let output = cancel::run(cancel, async {
            self.client
                .head_object()
                .bucket(&self.bucket)
                .key(self.full_key(&key))
                .send()
                .await
                .map_err(|e| Self::map_sdk_error(e, &key))
        })
        .await?;

        let last_modified = output.last_modified().ok_or_else(|| StorageError::Corrupt {
            key: key.clone(),
            message: "object has no last-modified time".to_string(),
        })?;
        OffsetDateTime::from_unix_timestamp(last_modified.secs()).map_err(|e| {
            StorageError::Corrupt {
                key,
                message: format!("invalid last-modified time: {e}"),
            }
        })
    }

    #[instrument(skip(self, cancel), fields(backend = "s3"))]
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

    #[instrument(skip(self, cancel), fields(backend = "s3"))]
    async fn retrieve_original(
        &self,
        serial_number: &str,
        version: u32,
        cancel: &CancellationToken,
    ) -> StorageResult<Option<OriginalBom>> {
        let prefix = format!("{}/", layout::version_prefix(serial_number, version));
        let mut keys = self.keys_under(&prefix, cancel);

        // Listings come back in key order, so the first match is the
        // lowest-sorting original.
        while let Some(key) = keys.try_next().await? {
            let Some((format, spec_version)) = key
                .strip_prefix(prefix.as_str())
                .and_then(layout::parse_original_name)
            else {
                continue;
            };
            let data = cancel::run(cancel, self.get_optional(&key)).await?;
            return Ok(data.map(|data| OriginalBom {
                format,
                spec_version,
                data,
            }));
        }
        Ok(None)
    }

    fn backend_name(&self) -> &'static str {
        "s3"
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn health_check(&self) -> StorageResult<()> {
        const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

        let marker_key = self.full_key(".bomrepo-health-check");

        let health_check_future = async {
            self.client
                .put_object()
                .bucket(&self.bucket)
                .key(&marker_key)
                .body(Bytes::from_static(b"health-check").into())
                .send()
                .await
                .map_err(map_s3_operation_error)?;

            match self
                .client
                .delete_object()
                .bucket(&self.bucket)
                .key(&marker_key)
                .send()
                .await
            {
                Ok(_) => Ok(()),
                Err(err) if status_of(&err) == Some(404) => Ok(()),
                Err(err) => Err(map_s3_operation_error(err)),
            }
        };

        tokio::time::timeout(HEALTH_CHECK_TIMEOUT, health_check_future)
            .await
            .map_err(|_| {
                StorageError::Io(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "S3 health check timed out after 10 seconds",
                ))
            })?
    }
}

/// Buffered upload published with a single PUT on `finish`.
struct S3Upload {
    client: Client,
    bucket: String,
    key: String,
    full_key: String,
    conditional: bool,
    buffer: Vec<u8>,
}

#[async_trait]
impl BomUpload for S3Upload {
    async fn write(&mut self, data: Bytes) -> StorageResult<()> {
        self.buffer.extend_from_slice(&data);
        Ok(())
    }

    async fn finish(self: Box<Self>) -> StorageResult<u64> {
        let S3Upload {
            client,
            bucket,
            key,
            full_key,
            conditional,
            buffer,
        } = *self;
        let size = buffer.len() as u64;

        let mut request = client
            .put_object()
            .bucket(&bucket)
            .key(&full_key)
            .body(Bytes::from(buffer).into());
        if conditional {
            request = request.if_none_match("*");
        }

        match request.send().await {
            Ok(_) => Ok(size),
            Err(err) if conditional && status_of(&err) == Some(412) => {
                Err(StorageError::AlreadyExists(key))
            }
            Err(err) => Err(map_s3_operation_error(err)),
        }
    }

    async fn abort(self: Box<Self>) -> StorageResult<()> {
        Ok(())
    }
}
