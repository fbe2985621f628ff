//! Cooperative cancellation helpers.

use crate::error::{StorageError, StorageResult};
use std::future::Future;
use tokio_util::sync::CancellationToken;

/// Fail with [`StorageError::Cancelled`] if the token has fired.
pub fn check(cancel: &CancellationToken) -> StorageResult<()> {
    if cancel.is_cancelled() {
        Err(StorageError::Cancelled)
    } else {
        Ok(())
    }
}

/// Run `fut` to completion unless the token fires first.
pub async fn run<F, T>(cancel: &CancellationToken, fut: F) -> StorageResult<T>
where
    F: Future<Output = StorageResult<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(StorageError::Cancelled),
        result = fut => result,
    }
}
