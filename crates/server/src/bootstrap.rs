//! Startup wiring: configuration loading, backend initialization and
//! background loop startup.

use crate::cache::CacheIndex;
use crate::repo::RepoService;
use crate::retention::{RetentionPolicy, RetentionService};
use crate::scheduler::{CacheRefreshJob, RetentionJob, Scheduler};
use anyhow::{Context, Result, anyhow};
use bomrepo_core::config::AppConfig;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Prefix for configuration environment variables.
pub const ENV_PREFIX: &str = "BOMREPO_";

/// Load configuration from an optional TOML file, overridden by
/// `BOMREPO_`-prefixed environment variables (`__` separates sections).
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let mut figment = Figment::new();

    if path.exists() {
        tracing::info!(config_path = %path.display(), "Loading configuration from file");
        figment = figment.merge(Toml::file(path));
    } else {
        tracing::debug!("No config file found at {}", path.display());
    }

    let config: AppConfig = figment
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()
        .context("failed to load configuration")?;
    config
        .validate()
        .map_err(|e| anyhow!("invalid configuration: {e}"))?;
    Ok(config)
}

/// Long-lived services shared by request handlers and background loops.
#[derive(Clone)]
pub struct Services {
    pub repo: RepoService,
    pub index: Arc<CacheIndex>,
    pub retention: Arc<RetentionService>,
}

/// Open and initialize the configured backend, then build the services on
/// top of it. Must complete before any traffic is accepted.
pub async fn build_services(config: &AppConfig, cancel: &CancellationToken) -> Result<Services> {
    let store = bomrepo_storage::from_config(&config.storage)
        .await
        .context("failed to open storage backend")?;

    store
        .initialize(cancel)
        .await
        .context("failed to initialize storage")?;
    tracing::info!(backend = store.backend_name(), "Storage backend initialized");

    store
        .health_check()
        .await
        .context("storage health check failed")?;
    tracing::info!("Storage backend connectivity verified");

    let repo = RepoService::new(store);
    let retention = RetentionService::new(
        repo.clone(),
        RetentionPolicy::from_config(&config.retention),
    );

    Ok(Services {
        repo,
        index: Arc::new(CacheIndex::new()),
        retention: Arc::new(retention),
    })
}

/// Start the background loops enabled in `config`.
pub fn start_scheduler(config: &AppConfig, services: &Services) -> Scheduler {
    let mut scheduler = Scheduler::new();

    if config.cache.enabled {
        let job = CacheRefreshJob::new(services.repo.clone(), services.index.clone());
        scheduler.spawn(Arc::new(job), config.cache.refresh_interval());
        tracing::info!(
            interval_secs = config.cache.refresh_interval_secs,
            "Cache refresh loop spawned"
        );
    } else {
        tracing::info!("Cache refresh disabled");
    }

    if config.retention.enabled {
        let job = RetentionJob::new(services.retention.clone());
        scheduler.spawn(Arc::new(job), config.retention.interval());
        tracing::info!(
            interval_secs = config.retention.interval_secs,
            max_versions = config.retention.max_versions,
            max_age_days = config.retention.max_age_days,
            "Retention loop spawned"
        );
    } else {
        tracing::info!("Retention sweep disabled");
    }

    scheduler
}

#[cfg(test)]
mod tests {
    use super::*;
    use bomrepo_core::config::StorageConfig;

    #[test]
    fn test_load_config_from_file() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("bomrepo.toml");
        std::fs::write(
            &path,
            r#"
[storage]
type = "filesystem"
path = "/var/lib/bomrepo"

[retention]
max_versions = 3
"#,
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert!(matches!(
            config.storage,
            StorageConfig::Filesystem { ref path } if path == Path::new("/var/lib/bomrepo")
        ));
        assert_eq!(config.retention.max_versions, 3);
        assert!(config.cache.enabled);
    }

    #[test]
    fn test_load_config_rejects_invalid_values() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("bomrepo.toml");
        std::fs::write(&path, "[cache]\nrefresh_interval_secs = 0\n").unwrap();

        assert!(load_config(&path).is_err());
    }

    #[tokio::test]
    async fn test_build_services_initializes_filesystem() {
        let temp = tempfile::tempdir().unwrap();
        let config = AppConfig::for_testing(temp.path().join("repo"));

        let services = build_services(&config, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(services.repo.backend().backend_name(), "filesystem");
        assert!(temp.path().join("repo").join("storage-metadata").exists());
        assert!(services.index.is_empty());
    }
}
