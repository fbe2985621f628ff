//! In-memory discovery index over stored documents.
//!
//! The index is a derived projection. It is rebuilt by a full mark-and-sweep
//! pass over the repository and may lag the backing store by up to one
//! refresh interval.

use crate::error::{ServiceError, ServiceResult};
use crate::repo::RepoService;
use bomrepo_core::{Bom, BomIdentifier, SerialNumber};
use futures::TryStreamExt;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

type EntryKey = (String, u32);

/// Search projection of one stored document. Text fields are lowercased.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheEntry {
    pub serial_number: String,
    pub version: u32,
    pub group: Option<String>,
    pub name: Option<String>,
    pub component_version: Option<String>,
}

impl CacheEntry {
    pub fn from_bom(serial_number: &str, version: u32, bom: &Bom) -> Self {
        let component = bom.metadata_component();
        Self {
            serial_number: serial_number.to_string(),
            version,
            group: component.and_then(|c| c.group.as_deref()).map(str::to_lowercase),
            name: component.map(|c| c.name.to_lowercase()),
            component_version: component
                .and_then(|c| c.version.as_deref())
                .map(str::to_lowercase),
        }
    }

    fn identifier(&self) -> BomIdentifier {
        BomIdentifier::new(self.serial_number.clone(), self.version)
    }
}

/// Exact-match filters, AND-combined and case-insensitive.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SearchQuery {
    group: Option<String>,
    name: Option<String>,
    version: Option<String>,
}

impl SearchQuery {
    /// Build a query; empty strings count as absent. At least one filter
    /// must remain.
    pub fn new(
        group: Option<&str>,
        name: Option<&str>,
        version: Option<&str>,
    ) -> ServiceResult<Self> {
        fn normalize(value: Option<&str>) -> Option<String> {
            value
                .filter(|v| !v.is_empty())
                .map(str::to_lowercase)
        }

        let query = Self {
            group: normalize(group),
            name: normalize(name),
            version: normalize(version),
        };
        if query.group.is_none() && query.name.is_none() && query.version.is_none() {
            return Err(ServiceError::InvalidSearch(
                "at least one of group, name or version is required".to_string(),
            ));
        }
        Ok(query)
    }

    fn matches(&self, entry: &CacheEntry) -> bool {
        fn field(filter: &Option<String>, value: &Option<String>) -> bool {
            filter.as_ref().is_none_or(|f| value.as_ref() == Some(f))
        }

        field(&self.group, &entry.group)
            && field(&self.name, &entry.name)
            && field(&self.version, &entry.component_version)
    }
}

/// Counters from one reconciliation pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    pub documents_indexed: u64,
    pub entries_removed: u64,
}

/// Discovery index keyed by `(serial_number, version)`.
///
/// Reconciliation is the only writer. The lock is never held across an
/// await point.
#[derive(Default)]
pub struct CacheIndex {
    entries: RwLock<HashMap<EntryKey, CacheEntry>>,
}

impl CacheIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Identifiers of every entry matching `query`, sorted.
    pub fn search(&self, query: &SearchQuery) -> Vec<BomIdentifier> {
        let mut found: Vec<BomIdentifier> = self
            .entries
            .read()
            .values()
            .filter(|entry| query.matches(entry))
            .map(CacheEntry::identifier)
            .collect();
        found.sort_by(|a, b| {
            a.serial_number
                .cmp(&b.serial_number)
                .then(a.version.cmp(&b.version))
        });
        found
    }

    /// Rebuild the index from the repository.
    ///
    /// Every stored document is fetched and upserted. Entries not seen during
    /// the pass are removed afterwards. A cancelled pass returns
    /// [`ServiceError::Cancelled`] and removes nothing.
    pub async fn reconcile(
        &self,
        repo: &RepoService,
        cancel: &CancellationToken,
    ) -> ServiceResult<ReconcileStats> {
        let mut unseen: HashSet<EntryKey> = self.entries.read().keys().cloned().collect();
        let mut stats = ReconcileStats::default();

        let mut serials = Box::pin(repo.list_serial_numbers(cancel));
        while let Some(serial_number) = serials.try_next().await? {
            if !SerialNumber::is_valid(&serial_number) {
                warn!(serial_number = %serial_number, "Skipping unrecognized serial number");
                continue;
            }

            for version in repo.list_versions(&serial_number, cancel).await? {
                if cancel.is_cancelled() {
                    return Err(ServiceError::Cancelled);
                }

                let bom = match repo.retrieve(&serial_number, Some(version), cancel).await {
                    Ok(Some(bom)) => bom,
                    Ok(None) => continue,
                    Err(ServiceError::Codec(message)) => {
                        warn!(
                            serial_number = %serial_number,
                            version,
                            error = %message,
                            "Skipping undecodable document"
                        );
                        continue;
                    }
                    Err(err) => return Err(err),
                };

                let entry = CacheEntry::from_bom(&serial_number, version, &bom);
                let key = (serial_number.clone(), version);
                unseen.remove(&key);
                self.entries.write().insert(key, entry);
                stats.documents_indexed += 1;
            }
        }

        if !unseen.is_empty() {
            let mut entries = self.entries.write();
            for key in &unseen {
                if entries.remove(key).is_some() {
                    debug!(serial_number = %key.0, version = key.1, "Evicted cache entry");
                    stats.entries_removed += 1;
                }
            }
        }

        Ok(stats)
    }
}
