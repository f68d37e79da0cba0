//! Concurrent downloads of catalogued rasters
//!
//! # Module Organization
//!
//! - [`types`] - Requests, per-file outcomes and dry-run summaries
//! - [`pool`] - Fork-join worker pool with index-addressed results
//! - [`engine`] - Size probes and streamed, atomic, retried transfers
//! - [`config`] - Engine configuration

pub mod config;
pub mod engine;
pub mod pool;
pub mod types;

pub use config::EngineConfig;
pub use engine::DownloadEngine;
pub use types::{DownloadJob, DownloadOutcome, DownloadRequest, DryRunSummary};
