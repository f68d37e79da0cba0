//! Configuration management for WorldPop Fetcher
//!
//! Settings are layered: built-in defaults, then a TOML config file, then
//! environment variables, then command-line flags (applied by the CLI).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::app::cache::CacheConfig;
use crate::app::catalog::CatalogConfig;
use crate::app::client::ClientConfig;
use crate::app::download::EngineConfig;
use crate::app::retry::RetryPolicy;
use crate::constants::{env, files, http, limits, workers, worldpop};
use crate::errors::{ConfigError, ConfigResult};

/// Unified application configuration for TOML serialization
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Raster cache settings
    pub cache: CacheConfigToml,
    /// HTTP client settings
    pub client: ClientConfigToml,
    /// Download engine settings
    pub download: DownloadConfigToml,
    /// Catalogue synchronization settings
    pub catalog: CatalogConfigToml,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// TOML-friendly cache configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfigToml {
    /// Cache directory path (None = OS cache directory)
    pub cache_root: Option<PathBuf>,
    /// Spare country border data when purging
    pub keep_country_borders: bool,
}

impl Default for CacheConfigToml {
    fn default() -> Self {
        Self {
            cache_root: None,
            keep_country_borders: false,
        }
    }
}

/// TOML-friendly client configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfigToml {
    /// Server hosting the catalogue and the rasters
    pub base_url: String,
    /// TCP keep-alive timeout in seconds (None = disabled)
    pub tcp_keepalive_secs: Option<u64>,
    /// TCP nodelay setting
    pub tcp_nodelay: bool,
    /// Connection pool idle timeout in seconds (None = no timeout)
    pub pool_idle_timeout_secs: Option<u64>,
    /// Maximum idle connections per host
    pub pool_max_per_host: usize,
    /// Total request timeout in seconds (None = per-attempt timeouts only)
    pub request_timeout_secs: Option<u64>,
    /// Connect timeout in seconds
    pub connect_timeout_secs: u64,
    /// Rate limit (requests per second)
    pub rate_limit_rps: u32,
}

impl Default for ClientConfigToml {
    fn default() -> Self {
        Self {
            base_url: worldpop::BASE_URL.to_string(),
            tcp_keepalive_secs: Some(30),
            tcp_nodelay: true,
            pool_idle_timeout_secs: Some(http::POOL_IDLE_TIMEOUT.as_secs()),
            pool_max_per_host: http::POOL_MAX_PER_HOST,
            request_timeout_secs: None,
            connect_timeout_secs: http::CONNECT_TIMEOUT.as_secs(),
            rate_limit_rps: limits::DEFAULT_RATE_LIMIT_RPS,
        }
    }
}

/// TOML-friendly download engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfigToml {
    /// Concurrent transfers (None = all cores but two)
    pub worker_count: Option<usize>,
    /// Multiplier for concurrent size probes
    pub probe_fan_out: usize,
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Base delay between retries in milliseconds
    pub retry_base_delay_ms: u64,
    /// Maximum retry delay in seconds
    pub retry_max_delay_secs: u64,
    /// Timeout for each network operation of an attempt in seconds
    pub attempt_timeout_secs: u64,
    /// Write buffer size in bytes
    pub chunk_size: usize,
}

impl Default for DownloadConfigToml {
    fn default() -> Self {
        Self {
            worker_count: None,
            probe_fan_out: workers::PROBE_FAN_OUT,
            max_retries: limits::MAX_RETRIES,
            retry_base_delay_ms: limits::RETRY_BASE_DELAY_MS,
            retry_max_delay_secs: limits::MAX_BACKOFF_SECS,
            attempt_timeout_secs: limits::ATTEMPT_TIMEOUT.as_secs(),
            chunk_size: files::DOWNLOAD_CHUNK_SIZE,
        }
    }
}

/// TOML-friendly catalogue configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfigToml {
    /// Catalogue directory (None = OS data directory)
    pub catalog_dir: Option<PathBuf>,
    /// Timeout for each catalogue request in seconds
    pub remote_timeout_secs: u64,
    /// Retries after the first attempt
    pub max_retries: u32,
}

impl Default for CatalogConfigToml {
    fn default() -> Self {
        Self {
            catalog_dir: None,
            remote_timeout_secs: limits::CATALOG_TIMEOUT.as_secs(),
            max_retries: limits::MAX_RETRIES,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level used when no verbosity flag is given
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

/// Runtime configuration of every component
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub cache: CacheConfig,
    pub client: ClientConfig,
    pub engine: EngineConfig,
    pub catalog: CatalogConfig,
}

impl AppConfig {
    /// Load configuration with multi-source precedence:
    /// 1. Default values
    /// 2. Config file (explicit path, or the first one found in standard locations)
    /// 3. Environment variables
    pub async fn load(config_file_override: Option<PathBuf>) -> ConfigResult<Self> {
        let config_path = match config_file_override {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigError::NotFound { path });
                }
                Some(path)
            }
            None => Self::find_config_file(),
        };

        let mut config = match config_path {
            Some(path) => Self::load_from_file(&path).await?,
            None => Self::default(),
        };

        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from environment variables, looked up through `lookup`
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup(env::CACHE_DIR).filter(|v| !v.trim().is_empty()) {
            debug!("Cache directory overridden by {}", env::CACHE_DIR);
            self.cache.cache_root = Some(PathBuf::from(dir));
        }

        if let Some(value) = lookup(env::MAX_CONCURRENCY) {
            let workers = value
                .trim()
                .parse::<usize>()
                .map_err(|e| ConfigError::InvalidValue {
                    field: env::MAX_CONCURRENCY.to_string(),
                    value: value.clone(),
                    reason: e.to_string(),
                })?;
            debug!("Worker count overridden by {}", env::MAX_CONCURRENCY);
            self.download.worker_count = Some(workers);
        }
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        let invalid = |field: &str, value: String, reason: &str| ConfigError::InvalidValue {
            field: field.to_string(),
            value,
            reason: reason.to_string(),
        };

        if self.download.worker_count == Some(0) {
            return Err(invalid(
                "download.worker_count",
                "0".to_string(),
                "At least one worker is required",
            ));
        }
        if self.download.chunk_size == 0 {
            return Err(invalid(
                "download.chunk_size",
                "0".to_string(),
                "Chunk size must be positive",
            ));
        }
        if self.client.rate_limit_rps == 0 {
            return Err(invalid(
                "client.rate_limit_rps",
                "0".to_string(),
                "Rate limit must be positive",
            ));
        }
        if url::Url::parse(&self.client.base_url).is_err() {
            return Err(invalid(
                "client.base_url",
                self.client.base_url.clone(),
                "Not a valid URL",
            ));
        }
        Ok(())
    }

    /// Convert TOML-friendly configuration to runtime configuration
    pub fn to_runtime_config(&self) -> ConfigResult<RuntimeConfig> {
        let cache_root = match &self.cache.cache_root {
            Some(dir) => dir.clone(),
            None => default_cache_dir()?,
        };
        let catalog_dir = match &self.catalog.catalog_dir {
            Some(dir) => dir.clone(),
            None => default_catalog_dir()?,
        };

        let engine = self.download.to_runtime_config();
        engine.validate()?;

        Ok(RuntimeConfig {
            cache: CacheConfig::with_cache_root(cache_root)
                .with_keep_country_borders(self.cache.keep_country_borders),
            client: self.client.to_runtime_config(),
            engine,
            catalog: self.catalog.to_runtime_config(catalog_dir),
        })
    }

    /// Find configuration file in standard locations
    fn find_config_file() -> Option<PathBuf> {
        let mut search_paths = vec![PathBuf::from(format!("./{}.toml", files::APP_DIR_NAME))];
        if let Ok(path) = Self::default_config_path() {
            search_paths.push(path);
        }

        let found = search_paths.into_iter().find(|path| path.exists());
        match &found {
            Some(path) => debug!("Found config file: {}", path.display()),
            None => debug!("No config file found in standard locations"),
        }
        found
    }

    /// Get the default config file path for the current user
    pub fn default_config_path() -> ConfigResult<PathBuf> {
        let config_dir =
            dirs::config_dir().ok_or(ConfigError::NoStandardDirectory { kind: "config" })?;
        Ok(config_dir.join(files::APP_DIR_NAME).join("config.toml"))
    }

    /// Load configuration from a TOML file
    async fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        let config: AppConfig = toml::from_str(&content)?;
        info!("Loaded configuration from: {}", path.display());
        Ok(config)
    }
}

impl ClientConfigToml {
    /// Convert to runtime ClientConfig
    pub fn to_runtime_config(&self) -> ClientConfig {
        ClientConfig {
            base_url: self.base_url.clone(),
            tcp_keepalive: self.tcp_keepalive_secs.map(Duration::from_secs),
            tcp_nodelay: self.tcp_nodelay,
            pool_idle_timeout: self.pool_idle_timeout_secs.map(Duration::from_secs),
            pool_max_per_host: self.pool_max_per_host,
            request_timeout: self.request_timeout_secs.map(Duration::from_secs),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            rate_limit_rps: self.rate_limit_rps,
        }
    }
}

impl DownloadConfigToml {
    /// Convert to runtime EngineConfig
    pub fn to_runtime_config(&self) -> EngineConfig {
        EngineConfig {
            worker_count: self
                .worker_count
                .unwrap_or_else(workers::default_worker_count),
            probe_fan_out: self.probe_fan_out,
            retry: RetryPolicy::default()
                .with_max_retries(self.max_retries)
                .with_base_delay(Duration::from_millis(self.retry_base_delay_ms))
                .with_max_delay(Duration::from_secs(self.retry_max_delay_secs)),
            attempt_timeout: Duration::from_secs(self.attempt_timeout_secs),
            chunk_size: self.chunk_size,
        }
    }
}

impl CatalogConfigToml {
    /// Convert to runtime CatalogConfig
    pub fn to_runtime_config(&self, catalog_dir: PathBuf) -> CatalogConfig {
        CatalogConfig::new(catalog_dir)
            .with_remote_timeout(Duration::from_secs(self.remote_timeout_secs))
            .with_retry(RetryPolicy::default().with_max_retries(self.max_retries))
    }
}

/// OS cache directory for downloaded rasters
pub fn default_cache_dir() -> ConfigResult<PathBuf> {
    let cache_dir = dirs::cache_dir().ok_or(ConfigError::NoStandardDirectory { kind: "cache" })?;
    Ok(cache_dir.join(files::APP_DIR_NAME))
}

/// OS data directory for the catalogue snapshot
pub fn default_catalog_dir() -> ConfigResult<PathBuf> {
    let data_dir = dirs::data_dir().ok_or(ConfigError::NoStandardDirectory { kind: "data" })?;
    Ok(data_dir.join(files::APP_DIR_NAME).join("catalog"))
}
