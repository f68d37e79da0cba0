//! Application constants for WorldPop Fetcher
//!
//! This module centralizes all constants used throughout the application,
//! organized by functional domain for maintainability and clarity.

use std::time::Duration;

/// Environment variable names for configuration overrides
pub mod env {
    /// Overrides the raster cache directory
    pub const CACHE_DIR: &str = "WORLDPOP_FETCHER_CACHE_DIR";

    /// Overrides the number of concurrent download workers
    pub const MAX_CONCURRENCY: &str = "WORLDPOP_FETCHER_MAX_CONCURRENCY";
}

/// HTTP client configuration constants
pub mod http {
    use super::Duration;

    /// Default user agent for all HTTP requests
    pub const USER_AGENT: &str = "WorldPop-Fetcher/0.1.0 (Population Research Tool)";

    /// Default HTTP request timeout
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

    /// Connection establishment timeout
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(20);

    /// Connection pool idle timeout
    pub const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

    /// Maximum idle connections per host in pool
    pub const POOL_MAX_PER_HOST: usize = 25;
}

/// Rate limiting and retry configuration
pub mod limits {
    use super::Duration;

    /// Default rate limit for WorldPop requests (requests per second)
    pub const DEFAULT_RATE_LIMIT_RPS: u32 = 20;

    /// Retries after the first attempt for transient failures
    pub const MAX_RETRIES: u32 = 3;

    /// Base delay for exponential backoff (milliseconds)
    pub const RETRY_BASE_DELAY_MS: u64 = 500;

    /// Maximum backoff delay (seconds)
    pub const MAX_BACKOFF_SECS: u64 = 30;

    /// Timeout applied to each individual remote attempt
    pub const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(60);

    /// Timeout for catalogue hash and catalogue payload requests
    pub const CATALOG_TIMEOUT: Duration = Duration::from_secs(20);
}

/// WorldPop service URLs and endpoints
pub mod worldpop {
    /// Base URL serving both the catalogue assets and the raster files
    pub const BASE_URL: &str = "https://data.worldpop.org";

    /// Remote path of the MD5 digest of the raw catalogue
    pub const CATALOG_HASH_PATH: &str = "assets/wpgpDatasets.md5";

    /// Remote path of the raw catalogue CSV
    pub const CATALOG_PATH: &str = "assets/wpgpDatasets.csv";
}

/// Catalogue parsing and persistence constants
pub mod catalog {
    /// Earliest year any annual WorldPop dataset can refer to
    pub const FIRST_SUPPORTED_YEAR: i32 = 2000;

    /// Extension every catalogued raster must carry
    pub const RASTER_EXTENSION: &str = "tif";

    /// Cleaned catalogue snapshot file name
    pub const SNAPSHOT_FILE_NAME: &str = "catalog.json";

    /// Sidecar holding the hash of the last ingested raw catalogue
    pub const HASH_FILE_NAME: &str = "raw_catalog_hash.txt";

    /// Touch marker whose modification time records the last staleness check
    pub const CHECK_MARKER_FILE_NAME: &str = "last_catalog_check";

    /// Number of columns in the raw catalogue CSV
    pub const RAW_COLUMN_COUNT: usize = 7;
}

/// File operation constants
pub mod files {
    /// Suffix of in-flight downloads; only renamed away once complete
    pub const DOWNLOAD_SUFFIX: &str = ".download";

    /// Temporary suffix used for atomic catalogue writes
    pub const TEMP_FILE_SUFFIX: &str = ".tmp";

    /// Default write buffer size for streamed downloads (1 MiB)
    pub const DOWNLOAD_CHUNK_SIZE: usize = 1024 * 1024;

    /// File name marker of cached country border data
    pub const COUNTRY_BORDER_MARKER: &str = "level0";

    /// Application directory name under the OS cache/config/data dirs
    pub const APP_DIR_NAME: &str = "worldpop-fetcher";
}

/// Worker and concurrency configuration
pub mod workers {
    /// Upper bound on the default number of download workers
    pub const MAX_DEFAULT_WORKER_COUNT: usize = 16;

    /// Size probes are cheap; they fan out wider than payload transfers
    pub const PROBE_FAN_OUT: usize = 4;

    /// Default number of download workers: all cores but two, at least one
    pub fn default_worker_count() -> usize {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        cores.saturating_sub(2).clamp(1, MAX_DEFAULT_WORKER_COUNT)
    }
}

// Re-export commonly used constants for convenience
pub use env::{CACHE_DIR as ENV_CACHE_DIR, MAX_CONCURRENCY as ENV_MAX_CONCURRENCY};
pub use files::{DOWNLOAD_SUFFIX, TEMP_FILE_SUFFIX};
pub use http::USER_AGENT;
pub use limits::{DEFAULT_RATE_LIMIT_RPS, MAX_RETRIES};
pub use workers::default_worker_count;
