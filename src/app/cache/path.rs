//! Local file path generation
//!
//! Rasters are stored flat in the cache directory, one file per product,
//! country and (for annual products) year.

use std::path::{Path, PathBuf};

use crate::app::catalog::CatalogEntry;
use crate::constants::{catalog, files};

/// Path generation utility for cached rasters
pub struct PathGenerator;

impl PathGenerator {
    /// Get the cache path of the raster behind a catalogue entry
    ///
    /// Structure:
    /// - Static products: {cache_root}/{product}_{ISO3}.tif
    /// - Annual products: {cache_root}/{product}_{ISO3}_{year}.tif
    pub fn raster_path(cache_root: &Path, entry: &CatalogEntry) -> PathBuf {
        Self::path_for(
            cache_root,
            &entry.product_name,
            &entry.country_code_alpha3,
            entry.year,
        )
    }

    pub fn path_for(cache_root: &Path, product: &str, iso3: &str, year: Option<i32>) -> PathBuf {
        let file_name = match year {
            Some(year) => format!("{}_{}_{}.{}", product, iso3, year, catalog::RASTER_EXTENSION),
            None => format!("{}_{}.{}", product, iso3, catalog::RASTER_EXTENSION),
        };
        cache_root.join(file_name)
    }

    /// In-flight sibling of a final path
    pub fn temp_path(final_path: &Path) -> PathBuf {
        let mut name = final_path.as_os_str().to_owned();
        name.push(files::DOWNLOAD_SUFFIX);
        PathBuf::from(name)
    }

    /// Whether a path is a leftover of an interrupted download
    pub fn is_temp_path(path: &Path) -> bool {
        path.file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with(files::DOWNLOAD_SUFFIX))
    }
}
