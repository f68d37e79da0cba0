//! Catalogue synchronization service
//!
//! [`Catalog`] owns the cached catalogue for the lifetime of the process. It
//! compares the small remote hash with the one recorded next to the local
//! snapshot and only downloads the full raw catalogue when they differ (or when
//! no usable local snapshot exists). Every read runs that check, so a
//! long-lived process picks up catalogue updates. If the remote cannot be
//! reached the stale snapshot keeps being served.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::config::CatalogConfig;
use super::parse::{content_hash, parse_hash_payload, parse_raw_catalog, YearTokens};
use super::store::CatalogStore;
use super::types::CatalogView;
use crate::app::client::{bounded, CatalogSource};
use crate::app::retry::RetryPolicy;
use crate::constants::worldpop;
use crate::errors::{CatalogResult, TransportResult};

/// Result of a completed staleness check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// A fresh catalogue was downloaded and stored
    Refreshed,
    /// Local and remote hashes match
    UpToDate,
    /// The remote could not be reached; the stored catalogue is kept
    NetworkUnreachable,
}

/// Catalogue service: synchronization plus the cached in-memory view
#[derive(Debug)]
pub struct Catalog {
    store: CatalogStore,
    source: Arc<dyn CatalogSource>,
    retry: RetryPolicy,
    remote_timeout: Duration,
    tokens: YearTokens,
    current: RwLock<Option<Arc<CatalogView>>>,
    sync_lock: Mutex<()>,
}

impl Catalog {
    /// Create the service; nothing is read or fetched until first use
    pub fn new(config: CatalogConfig, source: Arc<dyn CatalogSource>) -> CatalogResult<Self> {
        Ok(Self {
            store: CatalogStore::new(config.catalog_dir),
            source,
            retry: config.retry,
            remote_timeout: config.remote_timeout,
            tokens: YearTokens::new()?,
            current: RwLock::new(None),
            sync_lock: Mutex::new(()),
        })
    }

    pub fn store(&self) -> &CatalogStore {
        &self.store
    }

    pub fn year_tokens(&self) -> &YearTokens {
        &self.tokens
    }

    /// Make sure the stored catalogue matches the remote one
    ///
    /// # Errors
    ///
    /// Network-classified failures of the hash check are not errors (see
    /// [`SyncOutcome::NetworkUnreachable`]). Everything else propagates: HTTP
    /// status errors, failures while downloading the full catalogue, parse and
    /// integrity errors, filesystem errors. The check timestamp is left alone
    /// in that case.
    pub async fn ensure_fresh(
        &self,
        force_overwrite: bool,
        remote_timeout: Duration,
    ) -> CatalogResult<SyncOutcome> {
        let _guard = self.sync_lock.lock().await;

        if force_overwrite || !self.store.exists().await? {
            return self.refresh(remote_timeout).await;
        }

        let Some(local_hash) = self.store.read_hash().await? else {
            debug!("No local catalogue hash recorded");
            return self.refresh(remote_timeout).await;
        };

        match self.fetch_remote_hash(remote_timeout).await {
            Ok(Some(remote_hash)) if remote_hash == local_hash => {
                debug!("Catalogue is up to date ({})", local_hash);
                self.store.touch_check_timestamp().await?;
                Ok(SyncOutcome::UpToDate)
            }
            Ok(_) => {
                info!("Remote catalogue has changed");
                self.refresh(remote_timeout).await
            }
            Err(e) if e.is_network() => {
                warn!(
                    "Could not check whether the catalogue is up to date: {}. Proceeding with the stored catalogue, which may be out of date",
                    e
                );
                self.store.touch_check_timestamp().await?;
                Ok(SyncOutcome::NetworkUnreachable)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Current catalogue, checked against the remote hash on every call
    ///
    /// The in-memory view is reused while the hash matches; a refresh swaps
    /// it for the newly downloaded catalogue.
    pub async fn view(&self) -> CatalogResult<Arc<CatalogView>> {
        self.ensure_fresh(false, self.remote_timeout).await?;
        self.loaded_view().await
    }

    /// Run a staleness check now; `force_overwrite` skips the hash comparison
    pub async fn update(&self, force_overwrite: bool) -> CatalogResult<SyncOutcome> {
        self.ensure_fresh(force_overwrite, self.remote_timeout).await
    }

    /// Alpha-3 codes of all regions with any data
    pub async fn all_regions(&self) -> CatalogResult<BTreeSet<String>> {
        Ok(self.view().await?.regions().clone())
    }

    pub async fn static_product_names(&self) -> CatalogResult<BTreeSet<String>> {
        Ok(self.view().await?.static_products().clone())
    }

    pub async fn annual_product_names(&self) -> CatalogResult<BTreeSet<String>> {
        Ok(self.view().await?.annual_products().clone())
    }

    pub async fn annual_years(&self) -> CatalogResult<BTreeSet<i32>> {
        Ok(self.view().await?.annual_years().clone())
    }

    pub async fn dataset_names(&self) -> CatalogResult<BTreeSet<String>> {
        Ok(self.view().await?.dataset_names().clone())
    }

    /// When the remote catalogue was last checked, if ever
    pub async fn last_check_time(&self) -> Option<DateTime<Utc>> {
        self.store.last_check_time().await
    }

    /// Hash of the raw catalogue behind the stored snapshot
    pub async fn content_hash(&self) -> CatalogResult<Option<String>> {
        self.store.read_hash().await
    }

    /// Returns the cached view, loading it from disk when absent
    async fn loaded_view(&self) -> CatalogResult<Arc<CatalogView>> {
        let mut current = self.current.write().await;
        if let Some(view) = current.as_ref() {
            return Ok(Arc::clone(view));
        }

        let view = Arc::new(CatalogView::new(self.store.load().await?));
        *current = Some(Arc::clone(&view));
        Ok(view)
    }

    async fn fetch_remote_hash(&self, remote_timeout: Duration) -> TransportResult<Option<String>> {
        let source = &self.source;
        let payload = self
            .retry
            .run("catalogue hash check", || async move {
                bounded(
                    remote_timeout,
                    worldpop::CATALOG_HASH_PATH,
                    source.fetch_hash_payload(),
                )
                .await
            })
            .await?;
        Ok(parse_hash_payload(&payload))
    }

    async fn refresh(&self, remote_timeout: Duration) -> CatalogResult<SyncOutcome> {
        info!("Downloading fresh WorldPop catalogue");

        let source = &self.source;
        let payload = self
            .retry
            .run("catalogue download", || async move {
                bounded(
                    remote_timeout,
                    worldpop::CATALOG_PATH,
                    source.fetch_catalog_payload(),
                )
                .await
            })
            .await?;

        let hash = content_hash(&payload);
        let mut snapshot = parse_raw_catalog(&payload, &self.tokens)?;

        // snapshot first: a crash before the hash is written forces a refresh next time
        self.store.save(&snapshot).await?;
        self.store.write_hash(&hash).await?;
        self.store.touch_check_timestamp().await?;

        snapshot.metadata.content_hash = Some(hash);
        snapshot.metadata.last_check_time = self.store.last_check_time().await;

        info!(
            "Stored catalogue with {} entries at {}",
            snapshot.len(),
            self.store.snapshot_path().display()
        );

        *self.current.write().await = Some(Arc::new(CatalogView::new(snapshot)));
        Ok(SyncOutcome::Refreshed)
    }
}
