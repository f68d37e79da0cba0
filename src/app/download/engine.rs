//! Concurrent download engine
//!
//! Runs size probes (dry run) and streamed payload transfers over a bounded
//! worker pool. Every file gets its own retry loop. A transfer is written to
//! `<final>.download` and only renamed to its final name once complete, so the
//! cache never contains a truncated raster under a final name. Failures of
//! individual files are collected and reported together after all workers
//! have finished.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use indicatif::ProgressBar;
use tokio::fs;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info};

use super::config::EngineConfig;
use super::pool::run_indexed;
use super::types::{DownloadJob, DownloadOutcome, DownloadRequest, DryRunSummary};
use crate::app::cache::{CacheJanitor, PathGenerator};
use crate::app::client::{bounded, FileTransport};
use crate::app::retry::RetryPolicy;
use crate::errors::{
    BatchOperation, DownloadError, DownloadResult, FileError, FileFailure, TransportError,
};

/// Download engine over a [`FileTransport`]
#[derive(Debug, Clone)]
pub struct DownloadEngine {
    transport: Arc<dyn FileTransport>,
    config: EngineConfig,
    progress: Option<ProgressBar>,
    janitor: Option<CacheJanitor>,
}

impl DownloadEngine {
    pub fn new(transport: Arc<dyn FileTransport>, config: EngineConfig) -> Self {
        Self {
            transport,
            config,
            progress: None,
            janitor: None,
        }
    }

    /// Repair the cache with `janitor` at the start of every run
    pub fn with_janitor(mut self, janitor: CacheJanitor) -> Self {
        self.janitor = Some(janitor);
        self
    }

    /// Tick `progress` once per finished file
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Compute how many bytes `execute` would transfer, without transferring
    ///
    /// Files that already exist count as zero when `skip_if_exists` is set, as
    /// do files whose size the server does not report.
    ///
    /// # Errors
    ///
    /// Returns a single `DownloadError::BatchFailed` listing every probe that
    /// failed after retries, or `DownloadError::Cache` if the repair failed.
    pub async fn plan_sizes(
        &self,
        request: &DownloadRequest,
        skip_if_exists: bool,
    ) -> DownloadResult<DryRunSummary> {
        self.repair_cache().await?;
        let worker = Arc::new(self.file_worker(
            skip_if_exists,
            self.config.chunk_size,
            request.len(),
        ));
        let workers = self.config.probe_worker_count();
        debug!(
            "Probing sizes of {} file(s) with {} worker(s)",
            request.len(),
            workers
        );

        let outcomes = run_indexed(request.jobs().to_vec(), workers, move |job| {
            let worker = Arc::clone(&worker);
            async move { worker.probe(job).await }
        })
        .await?;

        let outcomes = collect_failures(BatchOperation::SizeCheck, outcomes)?;
        let summary =
            DryRunSummary::from_sizes(outcomes.iter().map(|o| o.size.unwrap_or(0)).collect());

        info!(
            "Dry run: {} file(s) to download, {:.2} MB in total",
            summary.files_to_download,
            summary.total_size_mb()
        );
        Ok(summary)
    }

    /// Download every file of the request
    ///
    /// Returns all local paths of the request, skipped files included, in
    /// lexical order.
    ///
    /// # Errors
    ///
    /// Returns a single `DownloadError::BatchFailed` listing every file that
    /// failed after retries. Successful files of the same batch stay in place.
    pub async fn execute(
        &self,
        request: &DownloadRequest,
        skip_if_exists: bool,
        chunk_size: usize,
    ) -> DownloadResult<Vec<PathBuf>> {
        self.repair_cache().await?;
        let worker = Arc::new(self.file_worker(
            skip_if_exists,
            chunk_size.max(1),
            request.len(),
        ));
        let workers = self.config.worker_count;
        info!(
            "Downloading {} file(s) with {} worker(s)",
            request.len(),
            workers
        );

        let outcomes = run_indexed(request.jobs().to_vec(), workers, move |job| {
            let worker = Arc::clone(&worker);
            async move { worker.download(job).await }
        })
        .await?;

        let outcomes = collect_failures(BatchOperation::Download, outcomes)?;
        let transferred: u64 = outcomes.iter().filter_map(|o| o.size).sum();
        info!(
            "Downloaded {} file(s), {} bytes transferred",
            outcomes.len(),
            transferred
        );

        Ok(request.sorted_local_paths())
    }

    async fn repair_cache(&self) -> DownloadResult<()> {
        if let Some(janitor) = &self.janitor {
            let removed = janitor.repair_orphans().await?;
            if removed > 0 {
                debug!("Removed {} interrupted download(s) before the run", removed);
            }
        }
        Ok(())
    }

    fn file_worker(&self, skip_if_exists: bool, chunk_size: usize, total: usize) -> FileWorker {
        if let Some(progress) = &self.progress {
            progress.set_length(total as u64);
            progress.set_position(0);
        }
        FileWorker {
            transport: Arc::clone(&self.transport),
            retry: self.config.retry.clone(),
            attempt_timeout: self.config.attempt_timeout,
            skip_if_exists,
            chunk_size,
            progress: self.progress.clone(),
        }
    }
}

/// Turn outcomes into an error if any of them failed
fn collect_failures(
    operation: BatchOperation,
    outcomes: Vec<DownloadOutcome>,
) -> DownloadResult<Vec<DownloadOutcome>> {
    if outcomes.iter().all(DownloadOutcome::is_success) {
        return Ok(outcomes);
    }

    let failures: Vec<FileFailure> = outcomes
        .into_iter()
        .filter_map(|outcome| {
            outcome.error.map(|error| FileFailure {
                remote_path: outcome.job.remote_path,
                local_path: outcome.job.local_path,
                error,
            })
        })
        .collect();
    Err(DownloadError::BatchFailed {
        operation,
        failures,
    })
}

/// Per-file work shared by all pool tasks
#[derive(Debug)]
struct FileWorker {
    transport: Arc<dyn FileTransport>,
    retry: RetryPolicy,
    attempt_timeout: Duration,
    skip_if_exists: bool,
    chunk_size: usize,
    progress: Option<ProgressBar>,
}

impl FileWorker {
    async fn probe(&self, job: DownloadJob) -> DownloadOutcome {
        let result = if self.skip_if_exists && is_file(&job.local_path).await {
            Ok(0)
        } else {
            let label = format!("size check of {}", job.remote_path);
            self.retry
                .run(&label, || self.probe_once(&job.remote_path))
                .await
        };
        self.tick();

        match result {
            Ok(size) => DownloadOutcome::success(job, Some(size)),
            Err(e) => DownloadOutcome::failure(job, e.into()),
        }
    }

    async fn probe_once(&self, remote_path: &str) -> Result<u64, TransportError> {
        let size = bounded(
            self.attempt_timeout,
            remote_path,
            self.transport.probe_size(remote_path),
        )
        .await?;
        Ok(size.unwrap_or(0))
    }

    async fn download(&self, job: DownloadJob) -> DownloadOutcome {
        if self.skip_if_exists && is_file(&job.local_path).await {
            debug!("Skipping existing file {}", job.local_path.display());
            self.tick();
            return DownloadOutcome::success(job, None);
        }

        let label = format!("download of {}", job.remote_path);
        let result = self.retry.run(&label, || self.download_once(&job)).await;
        self.tick();

        match result {
            Ok(bytes) => {
                debug!("Saved {} ({} bytes)", job.local_path.display(), bytes);
                DownloadOutcome::success(job, Some(bytes))
            }
            Err(e) => DownloadOutcome::failure(job, e),
        }
    }

    /// One attempt: stream into the temp file, then publish it
    async fn download_once(&self, job: &DownloadJob) -> Result<u64, FileError> {
        let temp_path = PathGenerator::temp_path(&job.local_path);

        let bytes = match self.stream_to(job, &temp_path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                let _ = fs::remove_file(&temp_path).await;
                return Err(e);
            }
        };

        if let Err(e) = fs::rename(&temp_path, &job.local_path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(FileError::AtomicRename {
                temp_path,
                final_path: job.local_path.clone(),
                reason: e.to_string(),
            });
        }
        Ok(bytes)
    }

    async fn stream_to(&self, job: &DownloadJob, temp_path: &Path) -> Result<u64, FileError> {
        if let Some(parent) = job.local_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| FileError::io(parent, e))?;
        }

        let mut stream = bounded(
            self.attempt_timeout,
            &job.remote_path,
            self.transport.open_stream(&job.remote_path),
        )
        .await?;

        let file = fs::File::create(temp_path)
            .await
            .map_err(|e| FileError::io(temp_path, e))?;
        let mut writer = BufWriter::with_capacity(self.chunk_size, file);

        let mut written = 0u64;
        loop {
            let next = tokio::time::timeout(self.attempt_timeout, stream.next())
                .await
                .map_err(|_| TransportError::Timeout {
                    url: job.remote_path.clone(),
                    timeout: self.attempt_timeout,
                })?;
            let Some(chunk) = next else {
                break;
            };
            let chunk = chunk?;
            writer
                .write_all(&chunk)
                .await
                .map_err(|e| FileError::io(temp_path, e))?;
            written += chunk.len() as u64;
        }

        writer
            .flush()
            .await
            .map_err(|e| FileError::io(temp_path, e))?;
        writer
            .get_ref()
            .sync_all()
            .await
            .map_err(|e| FileError::io(temp_path, e))?;
        Ok(written)
    }

    fn tick(&self) {
        if let Some(progress) = &self.progress {
            progress.inc(1);
        }
    }
}

async fn is_file(path: &Path) -> bool {
    fs::metadata(path).await.map(|m| m.is_file()).unwrap_or(false)
}
