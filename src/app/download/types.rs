//! Download request and result types

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::app::cache::PathGenerator;
use crate::app::catalog::CatalogEntry;
use crate::errors::{DownloadError, DownloadResult, FileError};

/// One remote file and where it goes locally
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadJob {
    pub remote_path: String,
    pub local_path: PathBuf,
}

/// Ordered set of jobs with distinct destinations
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadRequest {
    jobs: Vec<DownloadJob>,
}

impl DownloadRequest {
    /// Build a request, rejecting two jobs with the same destination
    pub fn new(jobs: Vec<DownloadJob>) -> DownloadResult<Self> {
        let mut seen = HashSet::with_capacity(jobs.len());
        for job in &jobs {
            if !seen.insert(job.local_path.as_path()) {
                return Err(DownloadError::DuplicateDestination {
                    path: job.local_path.clone(),
                });
            }
        }
        Ok(Self { jobs })
    }

    /// One job per catalogue entry, destined for the cache directory
    pub fn from_entries(cache_root: &Path, entries: &[CatalogEntry]) -> DownloadResult<Self> {
        Self::new(
            entries
                .iter()
                .map(|entry| DownloadJob {
                    remote_path: entry.remote_path.clone(),
                    local_path: PathGenerator::raster_path(cache_root, entry),
                })
                .collect(),
        )
    }

    pub fn jobs(&self) -> &[DownloadJob] {
        &self.jobs
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Destinations in lexical order
    pub fn sorted_local_paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.jobs.iter().map(|j| j.local_path.clone()).collect();
        paths.sort();
        paths
    }
}

/// Result of one job
#[derive(Debug)]
pub struct DownloadOutcome {
    pub job: DownloadJob,
    /// Bytes to transfer (size probes) or transferred (downloads)
    pub size: Option<u64>,
    /// Captured failure; `None` means success
    pub error: Option<FileError>,
}

impl DownloadOutcome {
    pub fn success(job: DownloadJob, size: Option<u64>) -> Self {
        Self {
            job,
            size,
            error: None,
        }
    }

    pub fn failure(job: DownloadJob, error: FileError) -> Self {
        Self {
            job,
            size: None,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Cost of a download request, computed without transferring payloads
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DryRunSummary {
    /// Bytes per job, in request order; zero for skipped or unsized files
    pub sizes: Vec<u64>,
    /// Files with a nonzero size
    pub files_to_download: usize,
    pub total_bytes: u64,
}

impl DryRunSummary {
    pub fn from_sizes(sizes: Vec<u64>) -> Self {
        let files_to_download = sizes.iter().filter(|s| **s > 0).count();
        let total_bytes = sizes.iter().sum();
        Self {
            sizes,
            files_to_download,
            total_bytes,
        }
    }

    /// Total size in megabytes (10^6 bytes), rounded to 2 decimals
    pub fn total_size_mb(&self) -> f64 {
        (self.total_bytes as f64 / 1e4).round() / 100.0
    }
}
