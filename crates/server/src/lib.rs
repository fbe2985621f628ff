//! bomrepo server: repository service, search index, retention and
//! background scheduling over a [`bomrepo_storage::BomStore`].

pub mod bootstrap;
pub mod cache;
pub mod error;
pub mod repo;
pub mod retention;
pub mod scheduler;

pub use bootstrap::Services;
pub use cache::{CacheEntry, CacheIndex, ReconcileStats, SearchQuery};
pub use error::{ServiceError, ServiceResult};
pub use repo::{RenderedBom, RepoService, StoreOutcome};
pub use retention::{RetentionPolicy, RetentionService, RetentionStats};
pub use scheduler::{BackgroundJob, BackgroundLoop, LoopHandle, Scheduler, StopOutcome};
