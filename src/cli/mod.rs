//! Command-line interface components
//!
//! This module contains CLI-specific code for the WorldPop Fetcher
//! application: argument parsing and command handlers.

pub mod args;
pub mod commands;

pub use args::{
    CacheAction, CacheArgs, CatalogAction, CatalogArgs, Cli, Commands, DownloadArgs, GlobalArgs,
};
pub use commands::{handle_cache, handle_catalog, handle_download};
