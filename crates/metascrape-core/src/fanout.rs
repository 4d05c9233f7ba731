//! Bounded concurrent fan-out over independent sub-resource fetches.
//!
//! Used where one record field needs N follow-up requests (cast bios,
//! per-index preview pages). Every task runs to completion; the caller gets
//! whatever succeeded plus one error per failed task.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::error::AppError;

/// Limits applied to one fan-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FanOutLimit {
    /// Maximum number of tasks in flight at once.
    pub concurrency: usize,
    /// Identifiers beyond this count are dropped before any task starts.
    pub max_items: Option<usize>,
}

impl FanOutLimit {
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
            max_items: None,
        }
    }

    pub fn with_max_items(mut self, max_items: usize) -> Self {
        self.max_items = Some(max_items);
        self
    }
}

impl Default for FanOutLimit {
    /// Ten tasks in flight, no truncation.
    fn default() -> Self {
        Self::new(10)
    }
}

/// Joined output of a fan-out. `values` order follows completion order, not
/// input order.
#[derive(Debug)]
pub struct FanOut<T> {
    pub values: Vec<T>,
    pub errors: Vec<AppError>,
}

impl<T> Default for FanOut<T> {
    fn default() -> Self {
        Self {
            values: Vec::new(),
            errors: Vec::new(),
        }
    }
}

/// Spawn one task per identifier and wait for all of them.
///
/// At most `limit.concurrency` tasks run at once. Results and errors are
/// appended under a single mutex. A task that panics is recorded as an error.
/// No task outlives this call.
pub async fn fan_out<I, T, F, Fut>(ids: I, limit: FanOutLimit, task: F) -> FanOut<T>
where
    I: IntoIterator,
    F: Fn(I::Item) -> Fut + Send,
    Fut: Future<Output = Result<T, AppError>> + Send + 'static,
    T: Send + 'static,
{
    let permits = Arc::new(Semaphore::new(limit.concurrency.max(1)));
    let collected = Arc::new(Mutex::new(FanOut::default()));
    let mut set = JoinSet::new();

    let ids = ids.into_iter().take(limit.max_items.unwrap_or(usize::MAX));
    for id in ids {
        let permits = Arc::clone(&permits);
        let collected = Arc::clone(&collected);
        let work = task(id);
        set.spawn(async move {
            // The semaphore is never closed.
            let _permit = permits.acquire_owned().await.ok();
            let outcome = work.await;
            let mut guard = collected.lock().unwrap_or_else(PoisonError::into_inner);
            match outcome {
                Ok(value) => guard.values.push(value),
                Err(error) => guard.errors.push(error),
            }
        });
    }

    tracing::debug!(tasks = set.len(), concurrency = limit.concurrency, "Fan-out started");

    while let Some(joined) = set.join_next().await {
        if let Err(e) = joined {
            tracing::warn!(error = %e, "Fan-out task did not complete");
            collected
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .errors
                .push(AppError::Generic(format!("fan-out task failed: {e}")));
        }
    }

    let mut guard = collected.lock().unwrap_or_else(PoisonError::into_inner);
    let result = std::mem::take(&mut *guard);
    tracing::debug!(
        succeeded = result.values.len(),
        failed = result.errors.len(),
        "Fan-out joined"
    );
    result
}
