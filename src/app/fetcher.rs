//! High-level fetcher
//!
//! [`Fetcher`] wires the catalogue, the query resolver, the download engine and
//! the cache janitor together. A download request goes through the same steps
//! every time: resolve the complete set of catalogue entries, map them to cache
//! paths, then either probe sizes (dry run) or transfer. The engine is handed
//! the janitor, so every engine run starts by removing interrupted downloads.

use std::path::PathBuf;
use std::sync::Arc;

use indicatif::ProgressBar;
use tracing::{debug, info};

use super::cache::{CacheConfig, CacheJanitor, PurgeReport};
use super::catalog::{Catalog, CatalogEntry};
use super::client::HttpTransport;
use super::download::{DownloadEngine, DownloadRequest, DryRunSummary};
use super::query::{QueryResolver, YearFilter};
use crate::config::RuntimeConfig;
use crate::constants::files;
use crate::errors::Result;

/// Options for a single download call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadOptions {
    /// Leave files that are already cached untouched
    pub skip_existing: bool,
    /// Only compute the transfer cost
    pub dry_run: bool,
    /// Write buffer size in bytes
    pub chunk_size: usize,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            skip_existing: true,
            dry_run: false,
            chunk_size: files::DOWNLOAD_CHUNK_SIZE,
        }
    }
}

impl DownloadOptions {
    pub fn with_skip_existing(mut self, skip_existing: bool) -> Self {
        self.skip_existing = skip_existing;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }
}

/// Result of [`Fetcher::download`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadReport {
    /// Cost of the request; nothing was transferred
    DryRun(DryRunSummary),
    /// Every local path of the request, in lexical order
    Completed(Vec<PathBuf>),
}

/// Caller-facing entry point for catalogue queries and raster downloads
#[derive(Debug)]
pub struct Fetcher {
    catalog: Arc<Catalog>,
    resolver: QueryResolver,
    engine: DownloadEngine,
    janitor: CacheJanitor,
    cache: CacheConfig,
}

impl Fetcher {
    pub fn new(catalog: Arc<Catalog>, engine: DownloadEngine, cache: CacheConfig) -> Self {
        let janitor = CacheJanitor::new(cache.cache_root.clone());
        Self {
            resolver: QueryResolver::new(Arc::clone(&catalog)),
            engine: engine.with_janitor(janitor.clone()),
            janitor,
            catalog,
            cache,
        }
    }

    /// Build a fetcher talking HTTP to the configured server
    ///
    /// One [`HttpTransport`] serves both the catalogue and the raster files, so
    /// they share the connection pool and the rate limiter.
    pub fn from_runtime_config(config: RuntimeConfig) -> Result<Self> {
        let transport = Arc::new(HttpTransport::new(&config.client)?);
        let catalog = Arc::new(Catalog::new(config.catalog, transport.clone())?);
        let engine = DownloadEngine::new(transport, config.engine);
        Ok(Self::new(catalog, engine, config.cache))
    }

    /// Report file progress on `progress`
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.engine = self.engine.with_progress(progress);
        self
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn resolver(&self) -> &QueryResolver {
        &self.resolver
    }

    pub fn cache_config(&self) -> &CacheConfig {
        &self.cache
    }

    /// Catalogue entries covering every requested region (and year)
    pub async fn resolve_complete(
        &self,
        product: &str,
        regions: &[String],
        years: Option<&YearFilter>,
    ) -> Result<Vec<CatalogEntry>> {
        Ok(self
            .resolver
            .resolve_complete(product, regions, years)
            .await?)
    }

    /// Map a complete query onto cache paths
    pub async fn prepare_request(
        &self,
        product: &str,
        regions: &[String],
        years: Option<&YearFilter>,
    ) -> Result<DownloadRequest> {
        let entries = self.resolve_complete(product, regions, years).await?;
        let request = DownloadRequest::from_entries(&self.cache.cache_root, &entries)?;
        debug!(
            "Prepared {} download job(s) for '{}'",
            request.len(),
            product
        );
        Ok(request)
    }

    /// Download a product for the given regions (and years) into the cache
    ///
    /// # Errors
    ///
    /// Usage and coverage errors from the resolver, a cache error from the
    /// repair step, or a single aggregated error listing every failed file.
    pub async fn download(
        &self,
        product: &str,
        regions: &[String],
        years: Option<&YearFilter>,
        options: DownloadOptions,
    ) -> Result<DownloadReport> {
        let request = self.prepare_request(product, regions, years).await?;
        if options.dry_run {
            let summary = self
                .engine
                .plan_sizes(&request, options.skip_existing)
                .await?;
            return Ok(DownloadReport::DryRun(summary));
        }

        let paths = self
            .engine
            .execute(&request, options.skip_existing, options.chunk_size)
            .await?;
        info!(
            "{} file(s) available in {}",
            paths.len(),
            self.cache.cache_root.display()
        );
        Ok(DownloadReport::Completed(paths))
    }

    /// Dry run of [`Self::download`]
    pub async fn plan_sizes(
        &self,
        product: &str,
        regions: &[String],
        years: Option<&YearFilter>,
        skip_existing: bool,
    ) -> Result<DryRunSummary> {
        let request = self.prepare_request(product, regions, years).await?;
        Ok(self.engine.plan_sizes(&request, skip_existing).await?)
    }

    /// Remove interrupted downloads from the cache
    pub async fn repair_cache(&self) -> Result<usize> {
        Ok(self.janitor.repair_orphans().await?)
    }

    /// Delete cached rasters; `dry_run` only reports what would be deleted
    pub async fn purge_cache(
        &self,
        dry_run: bool,
        keep_country_borders: bool,
    ) -> Result<PurgeReport> {
        Ok(self.janitor.purge(dry_run, keep_country_borders).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;

    use async_trait::async_trait;
    use bytes::Bytes;
    use futures::stream;
    use tempfile::TempDir;

    use crate::app::catalog::{content_hash, CatalogConfig};
    use crate::app::client::{ByteStream, CatalogSource, FileTransport};
    use crate::app::download::EngineConfig;
    use crate::app::retry::RetryPolicy;
    use crate::errors::{AppError, QueryError, TransportError, TransportResult};

    const CATALOG: &str = "\
idx,Covariate,ISO3,Country,Title,Description,notes
1,438,LIE,Liechtenstein,ppp_2010,GIS/Population/Global_2000_2020/2010/LIE/lie_ppp_2010.tif,Estimated total number of people per grid-cell 2010
2,438,LIE,Liechtenstein,ppp_2011,GIS/Population/Global_2000_2020/2011/LIE/lie_ppp_2011.tif,Estimated total number of people per grid-cell 2011
3,438,LIE,Liechtenstein,level0_100m,GIS/Covariates/Global_2000_2020/LIE/lie_level0_100m.tif,National boundary
";

    #[derive(Debug)]
    struct MemoryRemote {
        files: HashMap<String, Vec<u8>>,
    }

    impl MemoryRemote {
        fn new() -> Self {
            let files = [
                "GIS/Population/Global_2000_2020/2010/LIE/lie_ppp_2010.tif",
                "GIS/Population/Global_2000_2020/2011/LIE/lie_ppp_2011.tif",
                "GIS/Covariates/Global_2000_2020/LIE/lie_level0_100m.tif",
            ]
            .into_iter()
            .map(|path| (path.to_string(), vec![7u8; 2048]))
            .collect();
            Self { files }
        }
    }

    #[async_trait]
    impl CatalogSource for MemoryRemote {
        async fn fetch_hash_payload(&self) -> TransportResult<String> {
            Ok(format!(
                "{}  wpgpDatasets.csv\n",
                content_hash(CATALOG.as_bytes())
            ))
        }

        async fn fetch_catalog_payload(&self) -> TransportResult<Vec<u8>> {
            Ok(CATALOG.as_bytes().to_vec())
        }
    }

    #[async_trait]
    impl FileTransport for MemoryRemote {
        async fn probe_size(&self, remote_path: &str) -> TransportResult<Option<u64>> {
            self.files
                .get(remote_path)
                .map(|data| Some(data.len() as u64))
                .ok_or_else(|| TransportError::Status {
                    status: 404,
                    url: remote_path.to_string(),
                })
        }

        async fn open_stream(&self, remote_path: &str) -> TransportResult<ByteStream> {
            let data = self.files.get(remote_path).cloned().ok_or_else(|| {
                TransportError::Status {
                    status: 404,
                    url: remote_path.to_string(),
                }
            })?;
            let chunks: Vec<TransportResult<Bytes>> = data
                .chunks(512)
                .map(|c| Ok(Bytes::copy_from_slice(c)))
                .collect();
            Ok(Box::pin(stream::iter(chunks)))
        }
    }

    fn fetcher(temp: &TempDir) -> Fetcher {
        let remote = Arc::new(MemoryRemote::new());
        let catalog = Catalog::new(
            CatalogConfig::new(temp.path().join("catalog")).with_retry(RetryPolicy::none()),
            remote.clone(),
        )
        .unwrap();
        let engine = DownloadEngine::new(
            remote,
            EngineConfig::default()
                .with_worker_count(2)
                .with_retry(RetryPolicy::none())
                .with_attempt_timeout(Duration::from_secs(5)),
        );
        Fetcher::new(
            Arc::new(catalog),
            engine,
            CacheConfig::with_cache_root(temp.path().join("cache")),
        )
    }

    fn lie() -> Vec<String> {
        vec!["LIE".to_string()]
    }

    #[tokio::test]
    async fn test_dry_run_then_download_then_warm_dry_run() {
        let temp = TempDir::new().unwrap();
        let fetcher = fetcher(&temp);
        let years = YearFilter::years([2010, 2011]);

        let cold = fetcher.plan_sizes("ppp", &lie(), Some(&years), true).await.unwrap();
        assert_eq!(cold.files_to_download, 2);
        assert_eq!(cold.total_bytes, 4096);

        let report = fetcher
            .download("ppp", &lie(), Some(&years), DownloadOptions::default())
            .await
            .unwrap();
        let cache_root = temp.path().join("cache");
        assert_eq!(
            report,
            DownloadReport::Completed(vec![
                cache_root.join("ppp_LIE_2010.tif"),
                cache_root.join("ppp_LIE_2011.tif"),
            ])
        );

        let warm = fetcher.plan_sizes("ppp", &lie(), Some(&years), true).await.unwrap();
        assert_eq!(warm.files_to_download, 0);
        assert_eq!(warm.total_bytes, 0);
    }

    #[tokio::test]
    async fn test_download_repairs_orphans_first() {
        let temp = TempDir::new().unwrap();
        let fetcher = fetcher(&temp);
        let cache_root = temp.path().join("cache");
        tokio::fs::create_dir_all(&cache_root).await.unwrap();
        let orphan = cache_root.join("ppp_LIE_2010.tif.download");
        tokio::fs::write(&orphan, b"partial").await.unwrap();

        fetcher
            .download("level0_100m", &lie(), None, DownloadOptions::default())
            .await
            .unwrap();

        assert!(!orphan.exists());
        assert!(cache_root.join("level0_100m_LIE.tif").exists());
    }

    #[tokio::test]
    async fn test_dry_run_repairs_orphans_too() {
        let temp = TempDir::new().unwrap();
        let fetcher = fetcher(&temp);
        let cache_root = temp.path().join("cache");
        tokio::fs::create_dir_all(cache_root.join("nested")).await.unwrap();
        let orphan = cache_root.join("nested").join("ppp_LIE_2011.tif.download");
        tokio::fs::write(&orphan, b"partial").await.unwrap();

        let summary = fetcher
            .plan_sizes("ppp", &lie(), Some(&YearFilter::years([2010])), true)
            .await
            .unwrap();

        assert_eq!(summary.files_to_download, 1);
        assert!(!orphan.exists());
    }

    #[tokio::test]
    async fn test_coverage_error_is_reported() {
        let temp = TempDir::new().unwrap();
        let fetcher = fetcher(&temp);
        let years = YearFilter::years([2010, 2012]);

        let err = fetcher
            .download("ppp", &lie(), Some(&years), DownloadOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            AppError::Query(QueryError::UnknownYears { .. })
                | AppError::Query(QueryError::IncompleteCoverage { .. })
        ));
        assert!(!temp.path().join("cache").join("ppp_LIE_2010.tif").exists());
    }

    #[tokio::test]
    async fn test_purge_keeps_borders() {
        let temp = TempDir::new().unwrap();
        let fetcher = fetcher(&temp);

        fetcher
            .download("level0_100m", &lie(), None, DownloadOptions::default())
            .await
            .unwrap();
        fetcher
            .download(
                "ppp",
                &lie(),
                Some(&YearFilter::years([2010])),
                DownloadOptions::default(),
            )
            .await
            .unwrap();

        let report = fetcher.purge_cache(false, true).await.unwrap();
        assert_eq!(report.deleted_files, 1);

        let cache_root = temp.path().join("cache");
        assert!(cache_root.join("level0_100m_LIE.tif").exists());
        assert!(!cache_root.join("ppp_LIE_2010.tif").exists());
    }
}
