//! Command-line argument parsing for WorldPop Fetcher
//!
//! This module defines the CLI structure using clap derive macros: raster
//! downloads, catalogue inspection and cache maintenance.

use std::path::PathBuf;

use clap::{ArgGroup, Args, Parser, Subcommand};

use crate::app::YearFilter;

/// WorldPop Fetcher - Download WorldPop country rasters
#[derive(Parser, Debug)]
#[command(
    name = "worldpop_fetcher",
    version,
    about = "Download WorldPop country rasters into a local cache",
    long_about = "Downloads WorldPop population and covariate rasters per country and year.
Keeps a local copy of the dataset catalogue in sync with the server, checks that every
requested country and year exists before downloading, and transfers files concurrently
with automatic retries."
)]
pub struct Cli {
    /// Global options
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Global arguments available to all subcommands
#[derive(Args, Debug)]
pub struct GlobalArgs {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Very verbose logging (debug level)
    #[arg(long, global = true)]
    pub very_verbose: bool,

    /// Quiet mode - suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Configuration file path
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Cache directory path
    #[arg(long, global = true, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Download rasters of one product for a set of countries
    Download(DownloadArgs),

    /// Inspect or refresh the dataset catalogue
    Catalog(CatalogArgs),

    /// Cache maintenance
    Cache(CacheArgs),
}

/// Arguments for the download command
#[derive(Args, Debug, Clone)]
pub struct DownloadArgs {
    /// Product name without year (e.g. "ppp", "level0_100m")
    #[arg(short, long)]
    pub product: String,

    /// Comma-separated ISO 3166-1 alpha-3 country codes (e.g. "COD,CAF")
    #[arg(short, long, value_delimiter = ',', required = true)]
    pub regions: Vec<String>,

    /// Comma-separated years, or "all" (annual products only)
    #[arg(short, long)]
    pub years: Option<YearFilter>,

    /// Only report how much would be downloaded
    #[arg(long)]
    pub dry_run: bool,

    /// Download again even if files are already cached
    #[arg(short, long)]
    pub force: bool,

    /// Number of concurrent download workers
    #[arg(short = 'w', long)]
    pub workers: Option<usize>,

    /// Write buffer size in bytes
    #[arg(long, value_name = "BYTES")]
    pub chunk_size: Option<usize>,
}

/// Arguments for catalogue management
#[derive(Args, Debug)]
pub struct CatalogArgs {
    #[command(subcommand)]
    pub action: CatalogAction,
}

/// Catalogue actions
#[derive(Subcommand, Debug)]
pub enum CatalogAction {
    /// Check the remote catalogue and download it if it changed
    Update {
        /// Download the catalogue even if it is up to date
        #[arg(short, long)]
        force: bool,
    },

    /// Show catalogue location, size and freshness
    Info,

    /// List product names
    #[command(group(ArgGroup::new("kind").args(["annual", "static_only"])))]
    Products {
        /// Only products published per year
        #[arg(long)]
        annual: bool,

        /// Only products without a year
        #[arg(long = "static")]
        static_only: bool,
    },

    /// List country codes
    Regions,

    /// List years covered by annual products
    Years,
}

/// Arguments for cache management
#[derive(Args, Debug)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub action: CacheAction,
}

/// Cache management actions
#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// Remove leftovers of interrupted downloads
    Repair,

    /// Delete cached rasters (dry run unless --execute is given)
    Purge {
        /// Actually delete files
        #[arg(long)]
        execute: bool,

        /// Keep country border rasters
        #[arg(long)]
        keep_borders: bool,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Logging level requested on the command line, if any
    pub fn log_level(&self) -> Option<tracing::Level> {
        if self.global.quiet {
            Some(tracing::Level::ERROR)
        } else if self.global.very_verbose {
            Some(tracing::Level::DEBUG)
        } else if self.global.verbose {
            Some(tracing::Level::INFO)
        } else {
            None
        }
    }
}

impl DownloadArgs {
    /// Reject option values clap cannot check on its own
    pub fn validate(&self) -> Result<(), String> {
        if self.workers == Some(0) {
            return Err("Number of workers must be greater than 0".to_string());
        }
        if self.chunk_size == Some(0) {
            return Err("Chunk size must be greater than 0".to_string());
        }
        if self.regions.iter().all(|r| r.trim().is_empty()) {
            return Err("At least one region code is required".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("worldpop_fetcher").chain(args.iter().copied()))
            .unwrap()
    }

    #[test]
    fn test_download_args_parsing() {
        let cli = parse(&[
            "download",
            "--product",
            "ppp",
            "--regions",
            "COD,CAF",
            "--years",
            "2019,2020",
            "--dry-run",
        ]);

        let Commands::Download(args) = cli.command else {
            panic!("expected download command");
        };
        assert_eq!(args.product, "ppp");
        assert_eq!(args.regions, vec!["COD", "CAF"]);
        assert_eq!(args.years, Some(YearFilter::years([2019, 2020])));
        assert!(args.dry_run);
        assert!(!args.force);
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_years_all() {
        let cli = parse(&["download", "-p", "ppp", "-r", "LIE", "-y", "all"]);
        let Commands::Download(args) = cli.command else {
            panic!("expected download command");
        };
        assert_eq!(args.years, Some(YearFilter::All));
    }

    #[test]
    fn test_invalid_years_rejected() {
        let result = Cli::try_parse_from([
            "worldpop_fetcher",
            "download",
            "-p",
            "ppp",
            "-r",
            "LIE",
            "-y",
            "twenty",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_download_args_validation() {
        let mut args = DownloadArgs {
            product: "ppp".to_string(),
            regions: vec!["LIE".to_string()],
            years: None,
            dry_run: false,
            force: false,
            workers: Some(4),
            chunk_size: None,
        };
        assert!(args.validate().is_ok());

        args.workers = Some(0);
        assert!(args.validate().is_err());

        args.workers = None;
        args.chunk_size = Some(0);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_product_kind_flags_conflict() {
        let result = Cli::try_parse_from([
            "worldpop_fetcher",
            "catalog",
            "products",
            "--annual",
            "--static",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_log_level() {
        let quiet = parse(&["-q", "catalog", "info"]);
        let verbose = parse(&["catalog", "info", "--verbose"]);
        let debug = parse(&["--very-verbose", "cache", "repair"]);
        let default = parse(&["cache", "repair"]);

        assert_eq!(quiet.log_level(), Some(tracing::Level::ERROR));
        assert_eq!(verbose.log_level(), Some(tracing::Level::INFO));
        assert_eq!(debug.log_level(), Some(tracing::Level::DEBUG));
        assert_eq!(default.log_level(), None);
    }
}
