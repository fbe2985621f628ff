//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Storage backend configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Local filesystem storage.
    Filesystem {
        /// Root directory for storage.
        path: PathBuf,
    },
    /// S3-compatible storage.
    S3 {
        /// Bucket name. Created on initialization if missing.
        bucket: String,
        /// Optional endpoint URL (for MinIO, etc.).
        endpoint: Option<String>,
        /// AWS region.
        region: Option<String>,
        /// Optional key prefix.
        prefix: Option<String>,
        /// AWS access key ID. Falls back to the ambient credential chain if not set.
        /// WARNING: Prefer env vars or IAM roles over storing secrets in config files.
        access_key_id: Option<String>,
        /// AWS secret access key. Falls back to the ambient credential chain if not set.
        secret_access_key: Option<String>,
        /// Force path-style URLs (`endpoint/bucket/key`). Required for MinIO.
        #[serde(default)]
        force_path_style: bool,
        /// Send `If-None-Match: *` on document writes so the store itself
        /// rejects a second write to the same key. Only enable for stores
        /// that honour conditional PUTs.
        #[serde(default)]
        conditional_writes: bool,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Filesystem {
            path: PathBuf::from("./data/repo"),
        }
    }
}

impl StorageConfig {
    /// Validate storage configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            StorageConfig::S3 {
                bucket,
                access_key_id,
                secret_access_key,
                ..
            } => {
                if bucket.trim().is_empty() {
                    return Err("s3 config requires a non-empty bucket name".to_string());
                }
                match (access_key_id.as_ref(), secret_access_key.as_ref()) {
                    (Some(_), Some(_)) | (None, None) => Ok(()),
                    _ => Err(
                        "s3 config requires both access_key_id and secret_access_key when either is set"
                            .to_string(),
                    ),
                }
            }
            StorageConfig::Filesystem { path } => {
                if path.as_os_str().is_empty() {
                    return Err("filesystem config requires a path".to_string());
                }
                Ok(())
            }
        }
    }
}

/// Retention sweep configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Run the retention loop (default: true).
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Keep at most this many versions per serial number (0 = unlimited).
    #[serde(default)]
    pub max_versions: u32,
    /// Delete versions older than this many days (0 = unlimited).
    #[serde(default)]
    pub max_age_days: u32,
    /// Seconds between sweeps (default: 1 hour).
    #[serde(default = "default_retention_interval_secs")]
    pub interval_secs: u64,
}

fn default_enabled() -> bool {
    true
}

fn default_retention_interval_secs() -> u64 {
    3600 // 1 hour
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            max_versions: 0,
            max_age_days: 0,
            interval_secs: default_retention_interval_secs(),
        }
    }
}

impl RetentionConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.interval_secs == 0 {
            return Err("retention.interval_secs must be greater than zero".to_string());
        }
        Ok(())
    }
}

/// Search index configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Run the index refresh loop (default: true).
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Seconds between full reconciliations (default: 10 minutes).
    #[serde(default = "default_cache_refresh_interval_secs")]
    pub refresh_interval_secs: u64,
}

fn default_cache_refresh_interval_secs() -> u64 {
    600 // 10 minutes
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            refresh_interval_secs: default_cache_refresh_interval_secs(),
        }
    }
}

impl CacheConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.refresh_interval_secs == 0 {
            return Err("cache.refresh_interval_secs must be greater than zero".to_string());
        }
        Ok(())
    }
}

/// Process shutdown configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ShutdownConfig {
    /// How long background loops may take to finish their current
    /// iteration once a stop is requested (default: 30 seconds).
    #[serde(default = "default_grace_period_secs")]
    pub grace_period_secs: u64,
}

fn default_grace_period_secs() -> u64 {
    30
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            grace_period_secs: default_grace_period_secs(),
        }
    }
}

impl ShutdownConfig {
    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Storage backend configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Retention sweep configuration.
    #[serde(default)]
    pub retention: RetentionConfig,
    /// Search index configuration.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Shutdown configuration.
    #[serde(default)]
    pub shutdown: ShutdownConfig,
}

impl AppConfig {
    /// Create a test configuration rooted at `path`.
    ///
    /// **For testing only.** Uses filesystem storage and short intervals.
    pub fn for_testing(path: impl Into<PathBuf>) -> Self {
        Self {
            storage: StorageConfig::Filesystem { path: path.into() },
            retention: RetentionConfig {
                interval_secs: 1,
                ..RetentionConfig::default()
            },
            cache: CacheConfig {
                refresh_interval_secs: 1,
                ..CacheConfig::default()
            },
            shutdown: ShutdownConfig {
                grace_period_secs: 5,
            },
        }
    }

    /// Validate every section, reporting the first problem found.
    pub fn validate(&self) -> Result<(), String> {
        self.storage.validate()?;
        self.retention.validate()?;
        self.cache.validate()?;
        Ok(())
    }
}
