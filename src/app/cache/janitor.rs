//! Cache maintenance: orphan repair and purging
//!
//! Both operations walk the cache directory recursively. Per-file deletion
//! failures are logged and skipped, never fatal.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::path::PathGenerator;
use crate::constants::files;
use crate::errors::{CacheError, CacheResult};

/// Outcome of a purge
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PurgeReport {
    pub dry_run: bool,
    /// Files selected for deletion
    pub matched_files: usize,
    /// Files actually deleted, always zero for a dry run
    pub deleted_files: usize,
    /// Combined size of the matched files
    pub total_bytes: u64,
}

impl PurgeReport {
    /// Size of the matched files in megabytes (10^6 bytes), rounded to 2 decimals
    pub fn total_size_mb(&self) -> f64 {
        (self.total_bytes as f64 / 1e4).round() / 100.0
    }
}

/// Removes stale and unwanted files from the cache directory
#[derive(Debug, Clone)]
pub struct CacheJanitor {
    cache_root: PathBuf,
}

impl CacheJanitor {
    pub fn new(cache_root: impl Into<PathBuf>) -> Self {
        Self {
            cache_root: cache_root.into(),
        }
    }

    pub fn cache_root(&self) -> &Path {
        &self.cache_root
    }

    /// Delete leftovers of interrupted downloads, returns how many were removed
    pub async fn repair_orphans(&self) -> CacheResult<usize> {
        let root = self.cache_root.clone();
        tokio::task::spawn_blocking(move || repair_orphans_blocking(&root))
            .await
            .map_err(|e| CacheError::ScanFailed {
                reason: e.to_string(),
            })?
    }

    /// Report, or delete, everything in the cache
    ///
    /// With `keep_country_borders`, files whose name contains `level0` are left
    /// alone. A missing cache directory yields an empty report.
    pub async fn purge(&self, dry_run: bool, keep_country_borders: bool) -> CacheResult<PurgeReport> {
        let root = self.cache_root.clone();
        tokio::task::spawn_blocking(move || purge_blocking(&root, dry_run, keep_country_borders))
            .await
            .map_err(|e| CacheError::ScanFailed {
                reason: e.to_string(),
            })?
    }
}

/// All regular files below `root`; unreadable entries are skipped
fn cached_files(root: &Path) -> CacheResult<Vec<PathBuf>> {
    if !root.exists() {
        return Ok(Vec::new());
    }
    if !root.is_dir() {
        return Err(CacheError::DirectoryNotAccessible {
            path: root.to_path_buf(),
        });
    }

    let mut paths = Vec::new();
    for entry in WalkDir::new(root).min_depth(1) {
        match entry {
            Ok(entry) if entry.file_type().is_file() => paths.push(entry.into_path()),
            Ok(_) => {}
            Err(e) => warn!("Skipping unreadable cache entry: {}", e),
        }
    }
    Ok(paths)
}

fn repair_orphans_blocking(root: &Path) -> CacheResult<usize> {
    let mut removed = 0;
    for path in cached_files(root)?
        .into_iter()
        .filter(|p| PathGenerator::is_temp_path(p))
    {
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!("Removed interrupted download {}", path.display());
                removed += 1;
            }
            Err(e) => warn!("Failed to delete cached file at {}: {}", path.display(), e),
        }
    }

    if removed > 0 {
        info!("Removed {} leftover(s) of interrupted downloads", removed);
    }
    Ok(removed)
}

fn purge_blocking(root: &Path, dry_run: bool, keep_country_borders: bool) -> CacheResult<PurgeReport> {
    let mut report = PurgeReport {
        dry_run,
        ..Default::default()
    };

    for path in cached_files(root)? {
        let is_border_data = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.contains(files::COUNTRY_BORDER_MARKER));
        if keep_country_borders && is_border_data {
            continue;
        }

        report.matched_files += 1;
        report.total_bytes += fs::metadata(&path).map(|m| m.len()).unwrap_or(0);

        if !dry_run {
            match fs::remove_file(&path) {
                Ok(()) => report.deleted_files += 1,
                Err(e) => warn!("Failed to delete cached file at {}: {}", path.display(), e),
            }
        }
    }

    info!(
        "Cache purge{}: {} file(s) matched, {} deleted, {:.2} MB",
        if dry_run { " (dry run)" } else { "" },
        report.matched_files,
        report.deleted_files,
        report.total_size_mb()
    );
    Ok(report)
}
