//! Command handlers for WorldPop Fetcher CLI
//!
//! This module implements the command handlers that connect CLI arguments to
//! the [`Fetcher`] and the catalogue service.

use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};

use crate::app::{DownloadOptions, DownloadReport, Fetcher, SyncOutcome};
use crate::cli::{CacheAction, CacheArgs, CatalogAction, CatalogArgs, DownloadArgs};
use crate::config::AppConfig;
use crate::errors::{AppError, Result};

/// Handle the download command
///
/// Resolves the request against the catalogue and either reports its size
/// (`--dry-run`) or downloads every missing file into the cache.
pub async fn handle_download(args: DownloadArgs, mut config: AppConfig) -> Result<()> {
    args.validate().map_err(AppError::generic)?;

    if let Some(workers) = args.workers {
        config.download.worker_count = Some(workers);
    }
    let chunk_size = args.chunk_size.unwrap_or(config.download.chunk_size);
    let options = DownloadOptions::default()
        .with_dry_run(args.dry_run)
        .with_skip_existing(!args.force)
        .with_chunk_size(chunk_size);

    let progress = create_progress_bar(if args.dry_run {
        "Checking file sizes"
    } else {
        "Downloading rasters"
    })?;
    let fetcher = build_fetcher(&config)?.with_progress(progress.clone());

    let years = args.years.as_ref();
    info!(
        "Requesting '{}' for {} region(s), years: {}",
        args.product,
        args.regions.len(),
        years.map_or_else(|| "-".to_string(), |y| y.to_string())
    );

    let start_time = Instant::now();
    let result = fetcher
        .download(&args.product, &args.regions, years, options)
        .await;
    progress.finish_and_clear();

    match result? {
        DownloadReport::DryRun(summary) => {
            println!("📋 Dry Run");
            println!("==========");
            println!("Files to download: {}", summary.files_to_download);
            println!("Total size: {:.2} MB", summary.total_size_mb());
            if args.force {
                println!("(--force: cached files are counted as well)");
            }
        }
        DownloadReport::Completed(paths) => {
            println!("\n📊 Download Summary:");
            println!("  Files: {}", paths.len());
            println!("  Time: {:?}", start_time.elapsed());
            for path in &paths {
                println!("  {}", path.display());
            }
        }
    }
    Ok(())
}

/// Handle catalogue commands
pub async fn handle_catalog(args: CatalogArgs, config: AppConfig) -> Result<()> {
    let fetcher = build_fetcher(&config)?;
    let catalog = fetcher.catalog();

    match args.action {
        CatalogAction::Update { force } => {
            println!("📋 Catalogue Update");
            println!("==================");
            match catalog.update(force).await? {
                SyncOutcome::Refreshed => println!("✅ Catalogue downloaded"),
                SyncOutcome::UpToDate => println!("✅ Catalogue is already up to date!"),
                SyncOutcome::NetworkUnreachable => {
                    println!("⚠️  Server unreachable, keeping the stored catalogue")
                }
            }
        }
        CatalogAction::Info => {
            let view = catalog.view().await?;
            println!("📋 Catalogue Information");
            println!("=======================");
            println!("Location:      {}", catalog.store().dir().display());
            println!("Entries:       {}", view.entries().len());
            println!("Regions:       {}", view.regions().len());
            println!(
                "Products:      {} static, {} annual",
                view.static_products().len(),
                view.annual_products().len()
            );
            match catalog.content_hash().await? {
                Some(hash) => println!("Content hash:  {}", hash),
                None => println!("Content hash:  unknown"),
            }
            match catalog.last_check_time().await {
                Some(time) => println!("Last checked:  {}", time.to_rfc3339()),
                None => println!("Last checked:  never"),
            }
        }
        CatalogAction::Products {
            annual,
            static_only,
        } => {
            if !static_only {
                print_list("Annual products", catalog.annual_product_names().await?);
            }
            if !annual {
                print_list("Static products", catalog.static_product_names().await?);
            }
        }
        CatalogAction::Regions => {
            print_list("Regions", catalog.all_regions().await?);
        }
        CatalogAction::Years => {
            print_list("Years", catalog.annual_years().await?);
        }
    }
    Ok(())
}

/// Handle cache commands
pub async fn handle_cache(args: CacheArgs, config: AppConfig) -> Result<()> {
    let fetcher = build_fetcher(&config)?;
    let cache_root = fetcher.cache_config().cache_root.clone();

    match args.action {
        CacheAction::Repair => {
            let removed = fetcher.repair_cache().await?;
            if removed == 0 {
                println!("✅ No interrupted downloads in {}", cache_root.display());
            } else {
                println!(
                    "🧹 Removed {} interrupted download(s) from {}",
                    removed,
                    cache_root.display()
                );
            }
        }
        CacheAction::Purge {
            execute,
            keep_borders,
        } => {
            let keep_borders = keep_borders || config.cache.keep_country_borders;
            let report = fetcher.purge_cache(!execute, keep_borders).await?;
            if report.dry_run {
                println!(
                    "ℹ️  {} file(s), {:.2} MB would be deleted from {}",
                    report.matched_files,
                    report.total_size_mb(),
                    cache_root.display()
                );
                println!("   Run again with --execute to delete them.");
            } else {
                println!(
                    "🗑️  Deleted {} of {} file(s), {:.2} MB",
                    report.deleted_files,
                    report.matched_files,
                    report.total_size_mb()
                );
            }
        }
    }
    Ok(())
}

fn build_fetcher(config: &AppConfig) -> Result<Fetcher> {
    let runtime = config.to_runtime_config()?;
    debug!(
        "Cache: {}, catalogue: {}, workers: {}",
        runtime.cache.cache_root.display(),
        runtime.catalog.catalog_dir.display(),
        runtime.engine.worker_count
    );
    Fetcher::from_runtime_config(runtime)
}

fn create_progress_bar(message: &'static str) -> Result<ProgressBar> {
    let progress = ProgressBar::new(0);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .map_err(|e| AppError::generic(format!("Progress bar template error: {}", e)))?
            .progress_chars("##-"),
    );
    progress.set_message(message);
    progress.enable_steady_tick(Duration::from_millis(100));
    Ok(progress)
}

fn print_list<T: std::fmt::Display>(title: &str, items: impl IntoIterator<Item = T>) {
    println!("{}:", title);
    for item in items {
        println!("  {}", item);
    }
}
