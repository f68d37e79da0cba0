//! Integration tests for catalogue synchronization and downloads
//!
//! These tests drive the public API end to end against an in-memory server:
//! catalogue hash checks, complete query resolution, dry runs, real downloads
//! and per-file retry aggregation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream;
use tempfile::TempDir;

use worldpop_fetcher::app::catalog::content_hash;
use worldpop_fetcher::app::client::ByteStream;
use worldpop_fetcher::app::{
    CacheConfig, Catalog, CatalogConfig, CatalogSource, DownloadEngine, DownloadOptions,
    DownloadReport, EngineConfig, Fetcher, FileTransport, RetryPolicy, SyncOutcome, YearFilter,
};
use worldpop_fetcher::errors::{
    AppError, DownloadError, QueryError, TransportError, TransportResult,
};

const HEADER: &str = "idx,Covariate,ISO3,Country,Title,Description,notes";

/// In-memory WorldPop server
#[derive(Debug, Default)]
struct FakeServer {
    catalog: Mutex<String>,
    files: Mutex<HashMap<String, Vec<u8>>>,
    /// Remaining transient failures per remote path
    flaky: Mutex<HashMap<String, usize>>,
    offline: Mutex<bool>,
    catalog_downloads: AtomicUsize,
    transfers: AtomicUsize,
}

impl FakeServer {
    fn new(rows: &[(i64, u16, &str, &str, &str, &str)]) -> Arc<Self> {
        let server = Arc::new(Self::default());
        server.publish(rows);
        server
    }

    /// Replace the catalogue; every listed file is served with 1000 bytes per id
    fn publish(&self, rows: &[(i64, u16, &str, &str, &str, &str)]) {
        let mut csv = String::from(HEADER);
        let mut files = self.files.lock().unwrap();
        for (id, numeric, iso3, country, dataset, path) in rows {
            csv.push_str(&format!(
                "\n{},{},{},{},{},{},Estimated {}",
                id, numeric, iso3, country, dataset, path, dataset
            ));
            files.insert(path.to_string(), vec![1u8; 1000 * *id as usize]);
        }
        csv.push('\n');
        *self.catalog.lock().unwrap() = csv;
    }

    fn fail_times(&self, remote_path: &str, times: usize) {
        self.flaky
            .lock()
            .unwrap()
            .insert(remote_path.to_string(), times);
    }

    fn set_offline(&self, offline: bool) {
        *self.offline.lock().unwrap() = offline;
    }

    fn check_flaky(&self, remote_path: &str) -> TransportResult<()> {
        let mut flaky = self.flaky.lock().unwrap();
        match flaky.get_mut(remote_path) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                Err(TransportError::Status {
                    status: 503,
                    url: remote_path.to_string(),
                })
            }
            _ => Ok(()),
        }
    }

    fn file(&self, remote_path: &str) -> TransportResult<Vec<u8>> {
        self.files
            .lock()
            .unwrap()
            .get(remote_path)
            .cloned()
            .ok_or_else(|| TransportError::Status {
                status: 404,
                url: remote_path.to_string(),
            })
    }
}

#[async_trait]
impl CatalogSource for FakeServer {
    async fn fetch_hash_payload(&self) -> TransportResult<String> {
        if *self.offline.lock().unwrap() {
            return Err(TransportError::Connect {
                url: "wpgpDatasets.md5".to_string(),
                reason: "connection refused".to_string(),
            });
        }
        let catalog = self.catalog.lock().unwrap().clone();
        Ok(format!("{}  wpgpDatasets.csv\n", content_hash(catalog.as_bytes())))
    }

    async fn fetch_catalog_payload(&self) -> TransportResult<Vec<u8>> {
        self.catalog_downloads.fetch_add(1, Ordering::SeqCst);
        Ok(self.catalog.lock().unwrap().clone().into_bytes())
    }
}

#[async_trait]
impl FileTransport for FakeServer {
    async fn probe_size(&self, remote_path: &str) -> TransportResult<Option<u64>> {
        self.check_flaky(remote_path)?;
        Ok(Some(self.file(remote_path)?.len() as u64))
    }

    async fn open_stream(&self, remote_path: &str) -> TransportResult<ByteStream> {
        self.check_flaky(remote_path)?;
        let data = self.file(remote_path)?;
        self.transfers.fetch_add(1, Ordering::SeqCst);
        let chunks: Vec<TransportResult<Bytes>> = data
            .chunks(256)
            .map(|chunk| Ok(Bytes::copy_from_slice(chunk)))
            .collect();
        Ok(Box::pin(stream::iter(chunks)))
    }
}

fn catalog_rows() -> Vec<(i64, u16, &'static str, &'static str, &'static str, &'static str)> {
    vec![
        (1, 438, "LIE", "Liechtenstein", "ppp_2010", "GIS/Population/2010/LIE/lie_ppp_2010.tif"),
        (2, 438, "LIE", "Liechtenstein", "ppp_2011", "GIS/Population/2011/LIE/lie_ppp_2011.tif"),
        (3, 438, "LIE", "Liechtenstein", "ppp_2012", "GIS/Population/2012/LIE/lie_ppp_2012.tif"),
        (4, 438, "LIE", "Liechtenstein", "level0_100m", "GIS/Borders/LIE/lie_level0_100m.tif"),
        (5, 180, "COD", "Congo DRC", "ppp_2020", "GIS/Population/2020/COD/cod_ppp_2020.tif"),
        (6, 140, "CAF", "Central African Republic", "ppp_2020", "GIS/Population/2020/CAF/caf_ppp_2020.tif"),
        (7, 180, "COD", "Congo DRC", "pop_2025", "GIS/Projections/2025/COD/cod_pop_2025.tif"),
    ]
}

fn test_retry() -> RetryPolicy {
    RetryPolicy::default()
        .with_max_retries(3)
        .with_base_delay(Duration::from_millis(1))
        .with_max_delay(Duration::from_millis(5))
}

fn catalog(server: &Arc<FakeServer>, dir: &TempDir) -> Arc<Catalog> {
    let config = CatalogConfig::new(dir.path().join("catalog")).with_retry(RetryPolicy::none());
    let source: Arc<dyn CatalogSource> = server.clone();
    Arc::new(Catalog::new(config, source).unwrap())
}

fn fetcher(server: &Arc<FakeServer>, dir: &TempDir) -> Fetcher {
    let transport: Arc<dyn FileTransport> = server.clone();
    let engine = DownloadEngine::new(
        transport,
        EngineConfig::default()
            .with_worker_count(3)
            .with_retry(test_retry())
            .with_attempt_timeout(Duration::from_secs(5)),
    );
    Fetcher::new(
        catalog(server, dir),
        engine,
        CacheConfig::with_cache_root(dir.path().join("cache")),
    )
}

fn regions(codes: &[&str]) -> Vec<String> {
    codes.iter().map(|c| c.to_string()).collect()
}

#[tokio::test]
async fn test_lie_cold_dry_run_download_warm_dry_run() {
    let dir = TempDir::new().unwrap();
    let server = FakeServer::new(&catalog_rows());
    let fetcher = fetcher(&server, &dir);
    let years = YearFilter::years(2010..=2012);
    let lie = regions(&["LIE"]);

    let cold = fetcher
        .plan_sizes("ppp", &lie, Some(&years), true)
        .await
        .unwrap();
    assert_eq!(cold.files_to_download, 3);
    assert_eq!(cold.total_bytes, 6000);
    assert_eq!(cold.total_size_mb(), 0.01);
    assert_eq!(server.transfers.load(Ordering::SeqCst), 0);

    let report = fetcher
        .download("ppp", &lie, Some(&years), DownloadOptions::default())
        .await
        .unwrap();
    let cache = dir.path().join("cache");
    let DownloadReport::Completed(paths) = report else {
        panic!("expected a real download");
    };
    assert_eq!(
        paths,
        vec![
            cache.join("ppp_LIE_2010.tif"),
            cache.join("ppp_LIE_2011.tif"),
            cache.join("ppp_LIE_2012.tif"),
        ]
    );
    for path in &paths {
        assert!(path.exists());
    }
    assert_eq!(std::fs::metadata(&paths[2]).unwrap().len(), 3000);

    let warm = fetcher
        .plan_sizes("ppp", &lie, Some(&years), true)
        .await
        .unwrap();
    assert_eq!(warm.files_to_download, 0);
    assert_eq!(warm.total_bytes, 0);

    // skipped files are still reported and not transferred again
    let again = fetcher
        .download("ppp", &lie, Some(&years), DownloadOptions::default())
        .await
        .unwrap();
    assert_eq!(again, DownloadReport::Completed(paths));
    assert_eq!(server.transfers.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_cod_caf_2025_is_a_coverage_error() {
    let dir = TempDir::new().unwrap();
    let server = FakeServer::new(&catalog_rows());
    let fetcher = fetcher(&server, &dir);

    let err = fetcher
        .download(
            "ppp",
            &regions(&["COD", "CAF"]),
            Some(&YearFilter::years([2025])),
            DownloadOptions::default(),
        )
        .await
        .unwrap_err();

    assert_eq!(err.category(), "coverage");
    match err {
        AppError::Query(QueryError::IncompleteCoverage { product, available }) => {
            assert_eq!(product, "ppp");
            // the years ppp really has, so the caller can adjust the query
            assert_eq!(available.get("COD"), Some(&vec![2020]));
            assert_eq!(available.get("CAF"), Some(&vec![2020]));
        }
        other => panic!("expected a coverage error, got {other:?}"),
    }
    assert_eq!(server.transfers.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_resolve_complete_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let server = FakeServer::new(&catalog_rows());
    let fetcher = fetcher(&server, &dir);
    let years = YearFilter::years([2020]);
    let codes = regions(&["COD", "CAF"]);

    let first = fetcher
        .resolve_complete("ppp", &codes, Some(&years))
        .await
        .unwrap();
    let second = fetcher
        .resolve_complete("ppp", &codes, Some(&years))
        .await
        .unwrap();

    assert_eq!(first.len(), 2);
    assert_eq!(first, second);
    assert_eq!(server.catalog_downloads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_transient_failures_are_retried() {
    let dir = TempDir::new().unwrap();
    let server = FakeServer::new(&catalog_rows());
    let fetcher = fetcher(&server, &dir);
    server.fail_times("GIS/Population/2011/LIE/lie_ppp_2011.tif", 3);

    let report = fetcher
        .download(
            "ppp",
            &regions(&["LIE"]),
            Some(&YearFilter::years([2010, 2011])),
            DownloadOptions::default(),
        )
        .await
        .unwrap();

    let DownloadReport::Completed(paths) = report else {
        panic!("expected a real download");
    };
    assert_eq!(paths.len(), 2);
    assert!(paths.iter().all(|p| p.exists()));
}

#[tokio::test]
async fn test_exhausted_retries_are_aggregated() {
    let dir = TempDir::new().unwrap();
    let server = FakeServer::new(&catalog_rows());
    let fetcher = fetcher(&server, &dir);
    server.fail_times("GIS/Population/2012/LIE/lie_ppp_2012.tif", 4);

    let err = fetcher
        .download(
            "ppp",
            &regions(&["LIE"]),
            Some(&YearFilter::All),
            DownloadOptions::default(),
        )
        .await
        .unwrap_err();

    let AppError::Download(download_error) = &err else {
        panic!("expected a download error, got {err:?}");
    };
    assert!(matches!(download_error, DownloadError::BatchFailed { .. }));
    let failures = download_error.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(
        failures[0].remote_path,
        "GIS/Population/2012/LIE/lie_ppp_2012.tif"
    );
    assert!(err.is_recoverable());

    // the other files of the batch are kept, the failed one never shows up
    let cache = dir.path().join("cache");
    assert!(cache.join("ppp_LIE_2010.tif").exists());
    assert!(cache.join("ppp_LIE_2011.tif").exists());
    assert!(!cache.join("ppp_LIE_2012.tif").exists());
    assert!(!cache.join("ppp_LIE_2012.tif.download").exists());
}

#[tokio::test]
async fn test_catalog_staleness_checks() {
    let dir = TempDir::new().unwrap();
    let server = FakeServer::new(&catalog_rows());

    let first = catalog(&server, &dir);
    assert_eq!(first.update(false).await.unwrap(), SyncOutcome::Refreshed);
    let checked = first.last_check_time().await.unwrap();

    // a second process with the same catalogue directory only compares hashes
    let second = catalog(&server, &dir);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(second.update(false).await.unwrap(), SyncOutcome::UpToDate);
    assert!(second.last_check_time().await.unwrap() > checked);
    assert_eq!(server.catalog_downloads.load(Ordering::SeqCst), 1);

    // unreachable server: keep serving the stored catalogue
    server.set_offline(true);
    let checked = second.last_check_time().await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(
        second.update(false).await.unwrap(),
        SyncOutcome::NetworkUnreachable
    );
    assert!(second.last_check_time().await.unwrap() > checked);
    assert!(second.all_regions().await.unwrap().contains("LIE"));
    server.set_offline(false);

    // changed remote catalogue: downloaded again
    let mut rows = catalog_rows();
    rows.push((8, 20, "AND", "Andorra", "ppp_2020", "GIS/Population/2020/AND/and_ppp_2020.tif"));
    server.publish(&rows);
    assert_eq!(second.update(false).await.unwrap(), SyncOutcome::Refreshed);
    assert!(second.all_regions().await.unwrap().contains("AND"));

    // forced refresh ignores matching hashes
    assert_eq!(second.update(true).await.unwrap(), SyncOutcome::Refreshed);
    assert_eq!(server.catalog_downloads.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_long_lived_fetcher_sees_catalogue_updates() {
    let dir = TempDir::new().unwrap();
    let server = FakeServer::new(&catalog_rows());
    let fetcher = fetcher(&server, &dir);

    let entries = fetcher.resolver().resolve(None, None, None).await.unwrap();
    assert!(entries.iter().all(|e| e.country_code_alpha3 != "AND"));

    let mut rows = catalog_rows();
    rows.push((8, 20, "AND", "Andorra", "ppp_2020", "GIS/Population/2020/AND/and_ppp_2020.tif"));
    server.publish(&rows);

    let andorra = fetcher
        .resolver()
        .resolve(None, Some(&regions(&["AND"])), None)
        .await
        .unwrap();
    assert_eq!(andorra.len(), 1);
    assert_eq!(server.catalog_downloads.load(Ordering::SeqCst), 2);

    let report = fetcher
        .download(
            "ppp",
            &regions(&["AND"]),
            Some(&YearFilter::years([2020])),
            DownloadOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(
        report,
        DownloadReport::Completed(vec![dir.path().join("cache").join("ppp_AND_2020.tif")])
    );
}

#[tokio::test]
async fn test_purge_after_download() {
    let dir = TempDir::new().unwrap();
    let server = FakeServer::new(&catalog_rows());
    let fetcher = fetcher(&server, &dir);
    let lie = regions(&["LIE"]);

    fetcher
        .download("level0_100m", &lie, None, DownloadOptions::default())
        .await
        .unwrap();
    fetcher
        .download(
            "ppp",
            &lie,
            Some(&YearFilter::years([2010])),
            DownloadOptions::default(),
        )
        .await
        .unwrap();

    let preview = fetcher.purge_cache(true, false).await.unwrap();
    assert_eq!(preview.matched_files, 2);
    assert_eq!(preview.deleted_files, 0);
    assert_eq!(preview.total_bytes, 5000);

    let purged = fetcher.purge_cache(false, true).await.unwrap();
    assert_eq!(purged.deleted_files, 1);
    assert!(dir.path().join("cache").join("level0_100m_LIE.tif").exists());
}
