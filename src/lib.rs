//! WorldPop Fetcher Library
//!
//! A Rust library for downloading WorldPop country rasters. Keeps a local copy
//! of the dataset catalogue synchronized through a content hash, resolves
//! product/region/year requests into complete sets of files and downloads them
//! concurrently with retries and atomic writes.

pub mod app;
pub mod cli;
pub mod config;
pub mod constants;
pub mod errors;
pub mod prelude;

// Re-export commonly used types for convenience
pub use errors::{AppError, Result};
