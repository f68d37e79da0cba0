//! Core application logic for WorldPop Fetcher
//!
//! This module contains the catalogue service, query resolution, the
//! concurrent download engine, cache maintenance and the remote transports.
//!
//! # Module Organization
//!
//! - [`catalog`] - Catalogue snapshot, on-disk store and hash-based synchronization
//! - [`query`] - Validated, complete resolution of product/region/year requests
//! - [`download`] - Dry-run size planning and concurrent atomic downloads
//! - [`cache`] - Cache path layout, orphan repair and purge
//! - [`client`] - Transport traits and the HTTP implementation
//! - [`retry`] - Retry policy with exponential backoff and jitter
//! - [`fetcher`] - Facade tying the components together
//!
//! # Examples
//!
//! ```rust,no_run
//! use worldpop_fetcher::app::{DownloadOptions, DownloadReport, Fetcher, YearFilter};
//! use worldpop_fetcher::config::AppConfig;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AppConfig::load(None).await?;
//! let fetcher = Fetcher::from_runtime_config(config.to_runtime_config()?)?;
//!
//! let regions = vec!["COD".to_string(), "CAF".to_string()];
//! let years = YearFilter::years([2019, 2020]);
//! let options = DownloadOptions::default().with_dry_run(true);
//!
//! if let DownloadReport::DryRun(summary) =
//!     fetcher.download("ppp", &regions, Some(&years), options).await?
//! {
//!     println!("{} files, {:.2} MB", summary.files_to_download, summary.total_size_mb());
//! }
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod catalog;
pub mod client;
pub mod download;
pub mod fetcher;
pub mod query;
pub mod retry;

// Re-export main public API
pub use cache::{CacheConfig, CacheJanitor, PathGenerator, PurgeReport};
pub use catalog::{Catalog, CatalogConfig, CatalogEntry, CatalogSnapshot, CatalogView, SyncOutcome};
pub use client::{CatalogSource, ClientConfig, FileTransport, HttpTransport};
pub use download::{DownloadEngine, DownloadRequest, DryRunSummary, EngineConfig};
pub use fetcher::{DownloadOptions, DownloadReport, Fetcher};
pub use query::{QueryResolver, YearFilter};
pub use retry::RetryPolicy;
