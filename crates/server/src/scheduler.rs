//! Background loops: cache refresh and retention sweep.
//!
//! Each loop runs its job, then sleeps for a fixed interval. Stopping a loop
//! interrupts the sleep immediately but lets an in-flight iteration finish,
//! up to a grace period. After the grace period the iteration's own
//! cancellation token is fired and the loop is awaited.

use crate::cache::CacheIndex;
use crate::error::{ServiceError, ServiceResult};
use crate::repo::RepoService;
use crate::retention::RetentionService;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// One unit of periodic work.
#[async_trait]
pub trait BackgroundJob: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    /// Run one iteration. `cancel` fires only when shutdown has outlasted
    /// the grace period.
    async fn run(&self, cancel: &CancellationToken) -> ServiceResult<()>;
}

/// Rebuilds the discovery index.
pub struct CacheRefreshJob {
    repo: RepoService,
    index: Arc<CacheIndex>,
}

impl CacheRefreshJob {
    pub fn new(repo: RepoService, index: Arc<CacheIndex>) -> Self {
        Self { repo, index }
    }
}

#[async_trait]
impl BackgroundJob for CacheRefreshJob {
    fn name(&self) -> &'static str {
        "cache_refresh"
    }

    async fn run(&self, cancel: &CancellationToken) -> ServiceResult<()> {
        let started = Instant::now();
        let stats = self.index.reconcile(&self.repo, cancel).await?;
        info!(
            documents_indexed = stats.documents_indexed,
            entries_removed = stats.entries_removed,
            entries = self.index.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Cache refresh completed"
        );
        Ok(())
    }
}

/// Applies the retention policy to every lineage.
pub struct RetentionJob {
    service: Arc<RetentionService>,
}

impl RetentionJob {
    pub fn new(service: Arc<RetentionService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl BackgroundJob for RetentionJob {
    fn name(&self) -> &'static str {
        "retention_sweep"
    }

    async fn run(&self, cancel: &CancellationToken) -> ServiceResult<()> {
        let started = Instant::now();
        let stats = self.service.sweep(cancel).await?;
        info!(
            serial_numbers_processed = stats.serial_numbers_processed,
            versions_deleted = stats.versions_deleted,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Retention sweep completed"
        );
        Ok(())
    }
}

/// A job paired with the pause between its iterations.
pub struct BackgroundLoop {
    job: Arc<dyn BackgroundJob>,
    interval: Duration,
}

impl BackgroundLoop {
    pub fn new(job: Arc<dyn BackgroundJob>, interval: Duration) -> Self {
        Self { job, interval }
    }

    /// Spawn the loop onto the runtime.
    pub fn start(self) -> LoopHandle {
        let name = self.job.name();
        let stop = CancellationToken::new();
        let work = CancellationToken::new();
        let handle = tokio::spawn(run_loop(
            self.job,
            self.interval,
            stop.clone(),
            work.clone(),
        ));
        LoopHandle {
            name,
            stop,
            work,
            handle,
        }
    }
}

async fn run_loop(
    job: Arc<dyn BackgroundJob>,
    interval: Duration,
    stop: CancellationToken,
    work: CancellationToken,
) {
    let name = job.name();
    info!(job = name, interval_secs = interval.as_secs(), "Background loop started");

    loop {
        if stop.is_cancelled() {
            break;
        }

        info!(job = name, "Background iteration starting");
        match job.run(&work).await {
            Ok(()) => {}
            Err(ServiceError::Cancelled) => {
                warn!(job = name, "Background iteration interrupted");
                break;
            }
            Err(e) => {
                error!(job = name, error = %e, code = e.code(), "Background iteration failed");
            }
        }

        tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }

    info!(job = name, "Background loop stopped");
}

/// How a loop ended when asked to stop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopOutcome {
    /// The loop finished within the grace period.
    Graceful,
    /// The grace period expired and the running iteration was cancelled.
    Forced,
}

/// Handle to a running loop.
pub struct LoopHandle {
    name: &'static str,
    stop: CancellationToken,
    work: CancellationToken,
    handle: JoinHandle<()>,
}

impl LoopHandle {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// False once the loop has exited, including by panic.
    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Signal the loop to stop and wait up to `grace` for it to finish.
    pub async fn stop(self, grace: Duration) -> StopOutcome {
        let Self {
            name,
            stop,
            work,
            mut handle,
        } = self;
        stop.cancel();

        match tokio::time::timeout(grace, &mut handle).await {
            Ok(result) => {
                log_exit(name, result);
                StopOutcome::Graceful
            }
            Err(_) => {
                warn!(
                    job = name,
                    grace_secs = grace.as_secs(),
                    "Grace period expired, cancelling running iteration"
                );
                work.cancel();
                log_exit(name, handle.await);
                StopOutcome::Forced
            }
        }
    }
}

fn log_exit(name: &'static str, result: Result<(), JoinError>) {
    match result {
        Ok(()) => {}
        Err(join_err) if join_err.is_panic() => {
            error!(job = name, panic = ?join_err, "Background loop panicked");
        }
        Err(join_err) => {
            warn!(job = name, error = ?join_err, "Background loop was aborted");
        }
    }
}

/// The set of loops started at process initialization.
#[derive(Default)]
pub struct Scheduler {
    loops: Vec<LoopHandle>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn(&mut self, job: Arc<dyn BackgroundJob>, interval: Duration) {
        self.loops.push(BackgroundLoop::new(job, interval).start());
    }

    pub fn loops(&self) -> &[LoopHandle] {
        &self.loops
    }

    /// Stop every loop concurrently, each with the same grace period.
    pub async fn shutdown(self, grace: Duration) -> Vec<(&'static str, StopOutcome)> {
        let stops = self.loops.into_iter().map(|handle| async move {
            let name = handle.name();
            (name, handle.stop(grace).await)
        });
        futures::future::join_all(stops).await
    }
}
