//! Catalogue data types
//!
//! [`CatalogEntry`] is one cleaned row of the remote catalogue, [`CatalogSnapshot`]
//! the persisted collection of entries plus its sync metadata, and [`CatalogView`]
//! the shared in-memory handle with lazily derived listings.

use std::collections::{BTreeSet, HashSet};
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::catalog;
use crate::errors::{CatalogError, CatalogResult};

/// One remote dataset for one country
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Row identifier from the raw catalogue
    pub id: i64,
    /// ISO 3166-1 numeric country code
    pub country_code_numeric: u16,
    /// ISO 3166-1 alpha-3 country code, the region key used in queries
    pub country_code_alpha3: String,
    pub country_name: String,
    /// Raw dataset name, annual datasets carry a `_YYYY` token
    pub dataset_name: String,
    /// Dataset name without its year token
    pub product_name: String,
    pub is_annual: bool,
    pub year: Option<i32>,
    /// Server-relative path of the raster
    pub remote_path: String,
    pub remote_file_name: String,
    pub notes: String,
}

impl CatalogEntry {
    /// Whether the entry refers to a file of the expected raster format
    pub fn has_raster_extension(&self) -> bool {
        std::path::Path::new(&self.remote_path)
            .extension()
            .is_some_and(|ext| ext == catalog::RASTER_EXTENSION)
    }
}

/// Bookkeeping about the last catalogue synchronization
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncMetadata {
    /// MD5 hex digest of the raw catalogue the entries were built from
    pub content_hash: Option<String>,
    /// When the remote catalogue was last checked for staleness
    pub last_check_time: Option<DateTime<Utc>>,
}

/// Persisted, cleaned catalogue
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogSnapshot {
    pub entries: Vec<CatalogEntry>,
    #[serde(default)]
    pub metadata: SyncMetadata,
}

impl CatalogSnapshot {
    pub fn new(entries: Vec<CatalogEntry>) -> Self {
        Self {
            entries,
            metadata: SyncMetadata::default(),
        }
    }

    /// Check the invariants every stored catalogue must satisfy
    ///
    /// # Errors
    ///
    /// - `CatalogError::UnexpectedFormat` if a remote file is not a `.tif` raster
    /// - `CatalogError::DuplicateEntry` if a dataset is listed twice for one region
    pub fn validate(&self) -> CatalogResult<()> {
        let mut seen = HashSet::with_capacity(self.entries.len());
        for entry in &self.entries {
            if !entry.has_raster_extension() {
                return Err(CatalogError::UnexpectedFormat {
                    remote_path: entry.remote_path.clone(),
                });
            }
            if !seen.insert((entry.dataset_name.as_str(), entry.country_code_alpha3.as_str())) {
                return Err(CatalogError::DuplicateEntry {
                    dataset_name: entry.dataset_name.clone(),
                    region: entry.country_code_alpha3.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Immutable, shareable catalogue with memoized listings
///
/// A view is replaced wholesale when the catalogue is refreshed, which drops its
/// derived listings along with it.
#[derive(Debug)]
pub struct CatalogView {
    snapshot: CatalogSnapshot,
    regions: OnceLock<BTreeSet<String>>,
    static_products: OnceLock<BTreeSet<String>>,
    annual_products: OnceLock<BTreeSet<String>>,
    annual_years: OnceLock<BTreeSet<i32>>,
    dataset_names: OnceLock<BTreeSet<String>>,
}

impl CatalogView {
    pub fn new(snapshot: CatalogSnapshot) -> Self {
        Self {
            snapshot,
            regions: OnceLock::new(),
            static_products: OnceLock::new(),
            annual_products: OnceLock::new(),
            annual_years: OnceLock::new(),
            dataset_names: OnceLock::new(),
        }
    }

    pub fn snapshot(&self) -> &CatalogSnapshot {
        &self.snapshot
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.snapshot.entries
    }

    /// Alpha-3 codes of every country with at least one dataset
    pub fn regions(&self) -> &BTreeSet<String> {
        self.regions.get_or_init(|| {
            self.entries()
                .iter()
                .map(|e| e.country_code_alpha3.clone())
                .collect()
        })
    }

    pub fn static_products(&self) -> &BTreeSet<String> {
        self.static_products.get_or_init(|| {
            self.entries()
                .iter()
                .filter(|e| !e.is_annual)
                .map(|e| e.product_name.clone())
                .collect()
        })
    }

    pub fn annual_products(&self) -> &BTreeSet<String> {
        self.annual_products.get_or_init(|| {
            self.entries()
                .iter()
                .filter(|e| e.is_annual)
                .map(|e| e.product_name.clone())
                .collect()
        })
    }

    /// Every year covered by at least one annual dataset
    pub fn annual_years(&self) -> &BTreeSet<i32> {
        self.annual_years
            .get_or_init(|| self.entries().iter().filter_map(|e| e.year).collect())
    }

    pub fn dataset_names(&self) -> &BTreeSet<String> {
        self.dataset_names.get_or_init(|| {
            self.entries()
                .iter()
                .map(|e| e.dataset_name.clone())
                .collect()
        })
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::{annual, fixed};
    use super::*;

    #[test]
    fn test_validate_rejects_duplicates() {
        let snapshot = CatalogSnapshot::new(vec![
            annual(1, "LIE", "ppp", 2010),
            annual(2, "LIE", "ppp", 2010),
        ]);
        assert!(matches!(
            snapshot.validate(),
            Err(CatalogError::DuplicateEntry { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_non_raster_files() {
        let mut entry = fixed(1, "LIE", "srtm_topo_100m");
        entry.remote_path = "GIS/Static/LIE/lie_srtm_topo_100m.zip".into();
        let snapshot = CatalogSnapshot::new(vec![entry]);
        assert!(matches!(
            snapshot.validate(),
            Err(CatalogError::UnexpectedFormat { .. })
        ));
    }

    #[test]
    fn test_raster_extension_is_case_sensitive() {
        let mut entry = fixed(1, "LIE", "srtm_topo_100m");
        assert!(entry.has_raster_extension());

        entry.remote_path = "GIS/Static/LIE/lie_srtm_topo_100m.TIF".into();
        assert!(!entry.has_raster_extension());
        assert!(matches!(
            CatalogSnapshot::new(vec![entry]).validate(),
            Err(CatalogError::UnexpectedFormat { .. })
        ));
    }

    #[test]
    fn test_view_listings() {
        let view = CatalogView::new(CatalogSnapshot::new(vec![
            annual(1, "LIE", "ppp", 2010),
            annual(2, "LIE", "ppp", 2011),
            annual(3, "COD", "ppp", 2020),
            fixed(4, "COD", "srtm_topo_100m"),
        ]));

        assert_eq!(view.regions().iter().collect::<Vec<_>>(), vec!["COD", "LIE"]);
        assert!(view.static_products().contains("srtm_topo_100m"));
        assert!(view.annual_products().contains("ppp"));
        assert!(!view.annual_products().contains("srtm_topo_100m"));
        assert_eq!(
            view.annual_years().iter().copied().collect::<Vec<_>>(),
            vec![2010, 2011, 2020]
        );
        assert!(view.dataset_names().contains("ppp_2011"));
    }
}
