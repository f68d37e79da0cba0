//! Error types for WorldPop Fetcher
//!
//! This module defines the error types for all components of the application.
//! Errors are grouped by the taxonomy the fetcher reasons about: usage errors,
//! coverage errors, catalogue-integrity errors, transient and permanent network
//! errors. Every variant carries enough context to let a caller adjust a query or
//! retry later.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors raised by the remote transports (catalogue channel and bulk files)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Connection refused, DNS failure or similar
    #[error("Could not connect to {url}: {reason}")]
    Connect { url: String, reason: String },

    /// A single attempt exceeded its timeout
    #[error("Request to {url} timed out after {timeout:?}")]
    Timeout { url: String, timeout: Duration },

    /// Server returned an error status
    #[error("Server responded with HTTP {status} for {url}")]
    Status { status: u16, url: String },

    /// The response body was interrupted mid-transfer
    #[error("Transfer from {url} was interrupted: {reason}")]
    Body { url: String, reason: String },

    /// Any other protocol-level failure
    #[error("Request to {url} failed: {reason}")]
    Request { url: String, reason: String },

    /// Invalid URL provided
    #[error("Invalid URL: {url} - {error}")]
    InvalidUrl { url: String, error: String },

    /// Client settings that cannot produce a working transport
    #[error("Invalid transport configuration: {reason}")]
    InvalidConfig { reason: String },
}

impl TransportError {
    /// Whether retrying the same request may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            TransportError::Connect { .. }
            | TransportError::Timeout { .. }
            | TransportError::Body { .. }
            | TransportError::Request { .. } => true,
            TransportError::Status { status, .. } => {
                *status == 408 || *status == 429 || (500..600).contains(status)
            }
            TransportError::InvalidUrl { .. } | TransportError::InvalidConfig { .. } => false,
        }
    }

    /// Whether the failure means the remote is unreachable rather than misbehaving
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            TransportError::Connect { .. }
                | TransportError::Timeout { .. }
                | TransportError::Body { .. }
                | TransportError::Request { .. }
        )
    }
}

/// Catalogue loading, parsing and integrity errors
#[derive(Error, Debug)]
pub enum CatalogError {
    /// No catalogue snapshot has been stored yet
    #[error("Catalogue snapshot not found: {path}")]
    NotFound { path: PathBuf },

    /// Filesystem error while reading or writing catalogue artifacts
    #[error("Catalogue I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot (de)serialization error
    #[error("Catalogue snapshot JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Raw catalogue CSV could not be read
    #[error("Raw catalogue CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// A raw catalogue record has the wrong shape
    #[error("Malformed catalogue record at line {line}: {reason}")]
    MalformedRecord { line: u64, reason: String },

    /// Two entries describe the same dataset for the same region
    #[error(
        "Bad catalogue: dataset '{dataset_name}' is listed more than once for region {region}"
    )]
    DuplicateEntry {
        dataset_name: String,
        region: String,
    },

    /// A catalogued remote file is not a raster of the expected format
    #[error("Unexpected file format in catalogue: {remote_path}. All datasets should be .tif files")]
    UnexpectedFormat { remote_path: String },

    /// A name expected to carry exactly one valid year token does not
    #[error(
        "Bad format ('{name}'): the name of an annual dataset must contain exactly one valid year identifier"
    )]
    InvalidYearToken { name: String },

    /// Internal consistency violation
    #[error("Catalogue integrity violation: {reason}")]
    Integrity { reason: String },

    /// Name pattern failed to compile
    #[error("Invalid name pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// Remote catalogue channel failed
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Query validation (usage) and coverage errors
#[derive(Error, Debug)]
pub enum QueryError {
    /// Product names never carry a year token
    #[error(
        "Product name '{product}' should never contain a year identifier; use the separate years filter instead"
    )]
    ProductContainsYear { product: String },

    /// Product is neither static nor annual
    #[error("'{product}' is neither a static nor an annual WorldPop product")]
    UnknownProduct { product: String },

    /// Region codes with no data at all
    #[error("WorldPop has no data for the following country codes: {}", .codes.join(", "))]
    UnknownRegions { codes: Vec<String> },

    /// Years with no annual data at all
    #[error("WorldPop has no annual data whatsoever for the following years: {}", join_years(.years))]
    UnknownYears { years: Vec<i32> },

    /// Years filter could not be parsed
    #[error("Invalid years filter '{value}': expected a comma-separated list of years or 'all'")]
    InvalidYearFilter { value: String },

    /// A download request needs at least one region
    #[error("At least one country code is required")]
    NoRegions,

    /// Annual products need an explicit years filter
    #[error(
        "A years filter is required since '{product}' is an annual WorldPop product; use 'all' for every available year"
    )]
    YearsRequired { product: String },

    /// Static products take no years filter
    #[error("No years filter may be given since '{product}' is a static WorldPop product")]
    YearsNotAllowed { product: String },

    /// Not every (region, year) combination exists
    #[error(
        "Data product '{product}' is not available for all combinations of countries and years. Available: {}",
        format_coverage(.available)
    )]
    IncompleteCoverage {
        product: String,
        available: BTreeMap<String, Vec<i32>>,
    },

    /// Static product missing for some regions
    #[error("Data product '{product}' is not available for the following countries: {}", .regions.join(", "))]
    MissingRegions { product: String, regions: Vec<String> },

    /// Catalogue could not be loaded
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

impl QueryError {
    /// Malformed or incompatible query arguments
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            QueryError::ProductContainsYear { .. }
                | QueryError::UnknownProduct { .. }
                | QueryError::UnknownRegions { .. }
                | QueryError::UnknownYears { .. }
                | QueryError::InvalidYearFilter { .. }
                | QueryError::NoRegions
                | QueryError::YearsRequired { .. }
                | QueryError::YearsNotAllowed { .. }
        )
    }

    /// The catalogue cannot satisfy the full requested cross-product
    pub fn is_coverage_error(&self) -> bool {
        matches!(
            self,
            QueryError::IncompleteCoverage { .. } | QueryError::MissingRegions { .. }
        )
    }
}

fn join_years(years: &[i32]) -> String {
    years
        .iter()
        .map(|y| y.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn format_coverage(available: &BTreeMap<String, Vec<i32>>) -> String {
    available
        .iter()
        .map(|(region, years)| format!("{}: [{}]", region, join_years(years)))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Failure of a single per-file operation
#[derive(Error, Debug)]
pub enum FileError {
    /// Remote side failed
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Local file could not be written
    #[error("File I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Completed temp file could not be published under its final name
    #[error("Atomic file operation failed: could not rename {temp_path} to {final_path}: {reason}")]
    AtomicRename {
        temp_path: PathBuf,
        final_path: PathBuf,
        reason: String,
    },
}

impl FileError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        FileError::Io {
            path: path.into(),
            source,
        }
    }

    /// Only remote hiccups are worth another attempt
    pub fn is_transient(&self) -> bool {
        match self {
            FileError::Transport(e) => e.is_transient(),
            FileError::Io { .. } | FileError::AtomicRename { .. } => false,
        }
    }
}

/// One failed file in an aggregated batch error
#[derive(Debug)]
pub struct FileFailure {
    pub remote_path: String,
    pub local_path: PathBuf,
    pub error: FileError,
}

impl fmt::Display for FileFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.local_path.display(), self.error)
    }
}

/// Which engine operation produced a batch failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOperation {
    SizeCheck,
    Download,
}

impl fmt::Display for BatchOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchOperation::SizeCheck => write!(f, "size check(s)"),
            BatchOperation::Download => write!(f, "download(s)"),
        }
    }
}

/// Download engine errors
#[derive(Error, Debug)]
pub enum DownloadError {
    /// One or more files of a batch failed
    #[error("{} {} failed. Details:\n{}", .failures.len(), .operation, format_failures(.failures))]
    BatchFailed {
        operation: BatchOperation,
        failures: Vec<FileFailure>,
    },

    /// Two jobs would write the same local file
    #[error("Duplicate download destination: {path}")]
    DuplicateDestination { path: PathBuf },

    /// A worker task died before reporting its results
    #[error("Download worker terminated unexpectedly: {reason}")]
    WorkerPanic { reason: String },

    /// The cache could not be repaired before the run
    #[error("Cache repair failed: {0}")]
    Cache(#[from] CacheError),
}

fn format_failures(failures: &[FileFailure]) -> String {
    failures
        .iter()
        .map(|failure| format!("- {}", failure))
        .collect::<Vec<_>>()
        .join("\n")
}

impl DownloadError {
    /// Failed files of a batch error, empty for other variants
    pub fn failures(&self) -> &[FileFailure] {
        match self {
            DownloadError::BatchFailed { failures, .. } => failures,
            _ => &[],
        }
    }
}

/// Cache management errors
#[derive(Error, Debug)]
pub enum CacheError {
    /// Cache directory not found or inaccessible
    #[error("Cache directory not accessible: {path}")]
    DirectoryNotAccessible { path: PathBuf },

    /// Filesystem error while scanning the cache
    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Background scan task failed
    #[error("Cache scan failed: {reason}")]
    ScanFailed { reason: String },
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    NotFound { path: PathBuf },

    /// Invalid configuration format
    #[error("Invalid configuration format: {0}")]
    InvalidFormat(#[from] toml::de::Error),

    /// Configuration could not be read or written
    #[error("Configuration I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration value
    #[error("Invalid configuration value for {field}: {value}. {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    /// The OS offers no standard directory for the requested purpose
    #[error("Could not determine the user {kind} directory")]
    NoStandardDirectory { kind: &'static str },
}

/// Top-level application error that can represent any error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Download(#[from] DownloadError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Generic application error with context
    #[error("Application error: {message}")]
    Generic { message: String },
}

impl AppError {
    /// Create a generic application error with a message
    pub fn generic(message: impl Into<String>) -> Self {
        Self::Generic {
            message: message.into(),
        }
    }

    /// Check if the error is recoverable (transient)
    pub fn is_recoverable(&self) -> bool {
        match self {
            AppError::Transport(e) | AppError::Catalog(CatalogError::Transport(e)) => {
                e.is_transient()
            }
            AppError::Download(DownloadError::BatchFailed { failures, .. }) => {
                failures.iter().all(|f| f.error.is_transient())
            }
            _ => false,
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            AppError::Transport(_) => "network",
            AppError::Catalog(_) => "catalog",
            AppError::Query(e) if e.is_coverage_error() => "coverage",
            AppError::Query(e) if e.is_usage_error() => "usage",
            AppError::Query(_) => "catalog",
            AppError::Download(DownloadError::Cache(_)) | AppError::Cache(_) => "cache",
            AppError::Download(_) => "download",
            AppError::Config(_) => "config",
            AppError::Io(_) => "io",
            AppError::Generic { .. } => "generic",
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;

/// Transport result type alias
pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Catalogue result type alias
pub type CatalogResult<T> = std::result::Result<T, CatalogError>;

/// Query result type alias
pub type QueryResult<T> = std::result::Result<T, QueryError>;

/// Download result type alias
pub type DownloadResult<T> = std::result::Result<T, DownloadError>;

/// Cache result type alias
pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// Configuration result type alias
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
