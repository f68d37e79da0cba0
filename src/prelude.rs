//! Prelude module for WorldPop Fetcher Library
//!
//! This module re-exports the most commonly used items from the library,
//! providing a convenient way to import everything needed for typical usage
//! with a single `use worldpop_fetcher::prelude::*;` statement.
//!
//! # Usage
//!
//! ```rust,no_run
//! use worldpop_fetcher::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = AppConfig::load(None).await?;
//!     let fetcher = Fetcher::from_runtime_config(config.to_runtime_config()?)?;
//!
//!     let entries = fetcher
//!         .resolve_complete("ppp", &["LIE".to_string()], Some(&YearFilter::years([2020])))
//!         .await?;
//!     println!("{} file(s) to fetch", entries.len());
//!     Ok(())
//! }
//! ```

// Core result types
pub use crate::errors::{AppError, Result};

// Essential app components that are used in most integrations
pub use crate::app::{
    CacheConfig, Catalog, CatalogConfig, CatalogEntry, DownloadEngine, DownloadOptions,
    DownloadReport, DownloadRequest, DryRunSummary, EngineConfig, Fetcher, HttpTransport,
    PurgeReport, QueryResolver, RetryPolicy, SyncOutcome, YearFilter,
};
pub use crate::config::AppConfig;

// Commonly used constants
pub use crate::constants::{DEFAULT_RATE_LIMIT_RPS, MAX_RETRIES, USER_AGENT};

pub use std::path::{Path, PathBuf};
pub use std::sync::Arc;

pub use tokio;
