//! Cache configuration types and defaults

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Configuration for the raster cache
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Directory holding downloaded rasters
    pub cache_root: PathBuf,
    /// Spare country border data (`level0` files) when purging
    pub keep_country_borders: bool,
}

impl CacheConfig {
    /// Create a new cache configuration with custom cache root
    pub fn with_cache_root(cache_root: impl Into<PathBuf>) -> Self {
        Self {
            cache_root: cache_root.into(),
            keep_country_borders: false,
        }
    }

    pub fn with_keep_country_borders(mut self, enabled: bool) -> Self {
        self.keep_country_borders = enabled;
        self
    }
}
