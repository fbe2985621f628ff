//! Count- and age-based pruning of document lineages.

use crate::error::{ServiceError, ServiceResult};
use crate::repo::RepoService;
use bomrepo_core::SerialNumber;
use bomrepo_core::config::RetentionConfig;
use bomrepo_storage::StorageError;
use futures::TryStreamExt;
use time::{Duration, OffsetDateTime};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

/// Per-lineage limits. Zero means unlimited.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub max_versions: u32,
    pub max_age_days: u32,
}

impl RetentionPolicy {
    pub fn from_config(config: &RetentionConfig) -> Self {
        Self {
            max_versions: config.max_versions,
            max_age_days: config.max_age_days,
        }
    }

    pub fn is_unlimited(&self) -> bool {
        self.max_versions == 0 && self.max_age_days == 0
    }
}

/// Counters from one sweep.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RetentionStats {
    pub serial_numbers_processed: u64,
    pub versions_deleted: u64,
}

pub struct RetentionService {
    repo: RepoService,
    policy: RetentionPolicy,
}

impl RetentionService {
    pub fn new(repo: RepoService, policy: RetentionPolicy) -> Self {
        Self { repo, policy }
    }

    pub fn policy(&self) -> RetentionPolicy {
        self.policy
    }

    /// Apply the policy to every lineage in the store.
    pub async fn sweep(&self, cancel: &CancellationToken) -> ServiceResult<RetentionStats> {
        self.sweep_at(OffsetDateTime::now_utc(), cancel).await
    }

    /// Apply the policy as if the current time were `now`.
    #[instrument(
        skip(self, cancel),
        fields(
            max_versions = self.policy.max_versions,
            max_age_days = self.policy.max_age_days
        )
    )]
    pub async fn sweep_at(
        &self,
        now: OffsetDateTime,
        cancel: &CancellationToken,
    ) -> ServiceResult<RetentionStats> {
        let mut stats = RetentionStats::default();
        if self.policy.is_unlimited() {
            return Ok(stats);
        }

        let mut serials = Box::pin(self.repo.list_serial_numbers(cancel));
        while let Some(serial_number) = serials.try_next().await? {
            if !SerialNumber::is_valid(&serial_number) {
                warn!(serial_number = %serial_number, "Skipping unrecognized serial number");
                continue;
            }
            stats.versions_deleted += self.prune(&serial_number, now, cancel).await?;
            stats.serial_numbers_processed += 1;
        }

        Ok(stats)
    }

    /// Count rule first, then age rule. Returns how many versions were deleted.
    async fn prune(
        &self,
        serial_number: &str,
        now: OffsetDateTime,
        cancel: &CancellationToken,
    ) -> ServiceResult<u64> {
        let mut deleted = 0;

        if self.policy.max_versions > 0 {
            let versions = self.repo.list_versions(serial_number, cancel).await?;
            let excess = versions
                .len()
                .saturating_sub(self.policy.max_versions as usize);
            for &version in versions.iter().take(excess) {
                self.remove(serial_number, version, "max_versions", cancel)
                    .await?;
                deleted += 1;
            }
        }

        if self.policy.max_age_days > 0 {
            let cutoff = now - Duration::days(i64::from(self.policy.max_age_days));
            for version in self.repo.list_versions(serial_number, cancel).await? {
                let created = match self.repo.age(serial_number, version, cancel).await {
                    Ok(created) => created,
                    // Removed concurrently.
                    Err(ServiceError::Backend(StorageError::NotFound(_))) => continue,
                    Err(err) => return Err(err),
                };
                if created < cutoff {
                    self.remove(serial_number, version, "max_age_days", cancel)
                        .await?;
                    deleted += 1;
                }
            }
        }

        Ok(deleted)
    }

    async fn remove(
        &self,
        serial_number: &str,
        version: u32,
        rule: &'static str,
        cancel: &CancellationToken,
    ) -> ServiceResult<()> {
        if cancel.is_cancelled() {
            return Err(ServiceError::Cancelled);
        }
        self.repo
            .delete(serial_number, Some(version), cancel)
            .await?;
        debug!(serial_number = %serial_number, version, rule, "Pruned version");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_from_config() {
        let config = RetentionConfig {
            max_versions: 5,
            max_age_days: 0,
            ..RetentionConfig::default()
        };
        let policy = RetentionPolicy::from_config(&config);
        assert_eq!(policy.max_versions, 5);
        assert!(!policy.is_unlimited());
        assert!(RetentionPolicy::default().is_unlimited());
    }
}
