//! WorldPop Fetcher CLI application
//!
//! Command-line interface for downloading WorldPop country rasters into a
//! local cache, with a hash-synchronized copy of the dataset catalogue.

use std::process;

use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use worldpop_fetcher::cli::{handle_cache, handle_catalog, handle_download, Cli, Commands};
use worldpop_fetcher::config::AppConfig;
use worldpop_fetcher::errors::Result;

#[tokio::main]
async fn main() {
    let result = run().await;

    if let Err(e) = result {
        eprintln!("Error ({}): {}", e.category(), e);
        process::exit(1);
    }
}

/// Main application logic
async fn run() -> Result<()> {
    // Ignore errors if file doesn't exist
    dotenv::dotenv().ok();

    let cli = Cli::parse_args();

    let mut config = AppConfig::load(cli.global.config.clone()).await?;
    if let Some(cache_dir) = &cli.global.cache_dir {
        config.cache.cache_root = Some(cache_dir.clone());
    }

    init_logging(&cli, &config);

    info!("WorldPop Fetcher v{} starting", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Download(args) => {
            info!("Executing download command");
            handle_download(args, config).await
        }
        Commands::Catalog(args) => {
            info!("Executing catalog command");
            handle_catalog(args, config).await
        }
        Commands::Cache(args) => {
            info!("Executing cache command");
            handle_cache(args, config).await
        }
    }
}

/// Initialize logging from the CLI flags, falling back to the configured level
fn init_logging(cli: &Cli, config: &AppConfig) {
    let level = cli
        .log_level()
        .map(|level| level.to_string().to_lowercase())
        .unwrap_or_else(|| config.logging.level.clone());

    let filter = EnvFilter::from_default_env().add_directive(
        format!("worldpop_fetcher={}", level)
            .parse()
            .unwrap_or_else(|_| "worldpop_fetcher=warn".parse().expect("static directive")),
    );

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(cli.global.very_verbose)
        .init();

    if cli.global.very_verbose {
        info!("Very verbose logging enabled");
    } else if cli.global.verbose {
        info!("Verbose logging enabled");
    }
}
