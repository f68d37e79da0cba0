//! Catalogue service configuration

use std::path::PathBuf;
use std::time::Duration;

use crate::app::retry::RetryPolicy;
use crate::constants::limits;

/// Configuration for the [`Catalog`](super::Catalog) service
#[derive(Debug, Clone)]
pub struct CatalogConfig {
    /// Directory holding the snapshot and its sidecars
    pub catalog_dir: PathBuf,
    /// Timeout for each attempt on the catalogue channel
    pub remote_timeout: Duration,
    /// Retry policy for the catalogue channel
    pub retry: RetryPolicy,
}

impl CatalogConfig {
    pub fn new(catalog_dir: impl Into<PathBuf>) -> Self {
        Self {
            catalog_dir: catalog_dir.into(),
            remote_timeout: limits::CATALOG_TIMEOUT,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_remote_timeout(mut self, timeout: Duration) -> Self {
        self.remote_timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}
