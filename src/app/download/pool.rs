//! Fork-join worker pool
//!
//! Spawns a fixed number of tokio tasks that drain a shared queue of indexed
//! jobs. Each task keeps its own `(index, result)` pairs; after every task has
//! been joined the results are placed by index, so output order always matches
//! input order.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use crate::errors::{DownloadError, DownloadResult};

/// Run `task` over all `jobs` on at most `workers` concurrent tasks
///
/// # Errors
///
/// Returns `DownloadError::WorkerPanic` if a worker task dies before reporting
/// its results.
pub async fn run_indexed<J, T, F, Fut>(jobs: Vec<J>, workers: usize, task: F) -> DownloadResult<Vec<T>>
where
    J: Send + 'static,
    T: Send + 'static,
    F: Fn(J) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = T> + Send + 'static,
{
    let total = jobs.len();
    if total == 0 {
        return Ok(Vec::new());
    }

    let queue: VecDeque<(usize, J)> = jobs.into_iter().enumerate().collect();
    let queue = Arc::new(Mutex::new(queue));
    let task = Arc::new(task);
    let worker_count = workers.clamp(1, total);

    let mut handles = Vec::with_capacity(worker_count);
    for worker_id in 0..worker_count {
        let queue = Arc::clone(&queue);
        let task = Arc::clone(&task);
        handles.push(tokio::spawn(async move {
            let mut completed = Vec::new();
            loop {
                let next = queue.lock().await.pop_front();
                let Some((index, job)) = next else {
                    break;
                };
                completed.push((index, task(job).await));
            }
            debug!("Worker {} finished {} job(s)", worker_id, completed.len());
            completed
        }));
    }

    let mut slots: Vec<Option<T>> = (0..total).map(|_| None).collect();
    for handle in handles {
        let completed = handle.await.map_err(|e| DownloadError::WorkerPanic {
            reason: e.to_string(),
        })?;
        for (index, result) in completed {
            slots[index] = Some(result);
        }
    }

    slots
        .into_iter()
        .enumerate()
        .map(|(index, slot)| {
            slot.ok_or_else(|| DownloadError::WorkerPanic {
                reason: format!("no result reported for job {}", index),
            })
        })
        .collect()
}
