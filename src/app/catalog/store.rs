//! On-disk catalogue snapshot and sidecars
//!
//! Layout under the catalogue directory:
//! - `catalog.json`: the cleaned snapshot
//! - `raw_catalog_hash.txt`: MD5 of the raw catalogue the snapshot was built from
//! - `last_catalog_check`: touch marker, only its modification time matters
//!
//! Snapshot and hash are written to a temporary sibling first and renamed into
//! place, so readers never observe a half-written file.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tokio::fs;
use tracing::debug;

use super::types::CatalogSnapshot;
use crate::constants::{catalog, files};
use crate::errors::{CatalogError, CatalogResult};

/// Filesystem store for the catalogue
#[derive(Debug, Clone)]
pub struct CatalogStore {
    dir: PathBuf,
}

impl CatalogStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.dir.join(catalog::SNAPSHOT_FILE_NAME)
    }

    pub fn hash_path(&self) -> PathBuf {
        self.dir.join(catalog::HASH_FILE_NAME)
    }

    pub fn marker_path(&self) -> PathBuf {
        self.dir.join(catalog::CHECK_MARKER_FILE_NAME)
    }

    /// Whether a snapshot has been stored
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Io` if the snapshot path cannot be inspected
    pub async fn exists(&self) -> CatalogResult<bool> {
        Ok(fs::try_exists(self.snapshot_path()).await?)
    }

    /// Load the stored snapshot, filling its metadata from the sidecars
    ///
    /// # Errors
    ///
    /// - `CatalogError::NotFound` if no snapshot was stored yet
    /// - `CatalogError::DuplicateEntry` / `UnexpectedFormat` if the stored
    ///   snapshot breaks an integrity rule
    pub async fn load(&self) -> CatalogResult<CatalogSnapshot> {
        let path = self.snapshot_path();
        let content = match fs::read(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CatalogError::NotFound { path });
            }
            Err(e) => return Err(e.into()),
        };

        let mut snapshot: CatalogSnapshot = serde_json::from_slice(&content)?;
        snapshot.validate()?;
        snapshot.metadata.content_hash = self.read_hash().await?;
        snapshot.metadata.last_check_time = self.last_check_time().await;

        debug!(
            "Loaded catalogue snapshot with {} entries from {}",
            snapshot.len(),
            path.display()
        );
        Ok(snapshot)
    }

    /// Persist a snapshot atomically
    pub async fn save(&self, snapshot: &CatalogSnapshot) -> CatalogResult<()> {
        let content = serde_json::to_vec(snapshot)?;
        self.write_atomic(&self.snapshot_path(), &content).await
    }

    /// Hash of the raw catalogue behind the stored snapshot
    pub async fn read_hash(&self) -> CatalogResult<Option<String>> {
        match fs::read_to_string(self.hash_path()).await {
            Ok(content) => {
                let hash = content.trim();
                Ok((!hash.is_empty()).then(|| hash.to_string()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn write_hash(&self, hash: &str) -> CatalogResult<()> {
        self.write_atomic(&self.hash_path(), hash.as_bytes()).await
    }

    /// Record that a staleness check just completed
    pub async fn touch_check_timestamp(&self) -> CatalogResult<()> {
        fs::create_dir_all(&self.dir).await?;
        fs::write(self.marker_path(), Utc::now().to_rfc3339()).await?;
        Ok(())
    }

    /// When the last staleness check completed
    pub async fn last_check_time(&self) -> Option<DateTime<Utc>> {
        let metadata = fs::metadata(self.marker_path()).await.ok()?;
        metadata.modified().ok().map(DateTime::<Utc>::from)
    }

    async fn write_atomic(&self, path: &Path, content: &[u8]) -> CatalogResult<()> {
        fs::create_dir_all(&self.dir).await?;

        let mut temp_name = path.as_os_str().to_owned();
        temp_name.push(files::TEMP_FILE_SUFFIX);
        let temp_path = PathBuf::from(temp_name);

        fs::write(&temp_path, content).await?;
        if let Err(e) = fs::rename(&temp_path, path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }
        Ok(())
    }
}
