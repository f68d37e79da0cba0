//! WorldPop catalogue: parsing, persistence and synchronization
//!
//! The catalogue lists every remote raster, one row per dataset and country.
//! A local snapshot is kept in the catalogue directory and refreshed only when
//! the hash published next to the remote catalogue changes.
//!
//! # Module Organization
//!
//! - [`types`] - Entries, snapshots and the shared in-memory view
//! - [`parse`] - Raw CSV parsing, year-token rules and normalization
//! - [`store`] - Atomic on-disk persistence of the snapshot and its sidecars
//! - [`sync`] - The [`Catalog`] service with hash-based staleness checks
//! - [`config`] - Service configuration

pub mod config;
pub mod parse;
pub mod store;
pub mod sync;
pub mod types;

pub use config::CatalogConfig;
pub use parse::{content_hash, parse_raw_catalog, YearTokens};
pub use store::CatalogStore;
pub use sync::{Catalog, SyncOutcome};
pub use types::{CatalogEntry, CatalogSnapshot, CatalogView, SyncMetadata};
