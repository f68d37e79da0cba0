//! Local raster cache
//!
//! Downloaded rasters live flat in one cache directory. In-flight downloads are
//! written to a `.download` sibling and renamed into place once complete, so a
//! crash can only ever leave `.download` files behind; the janitor removes
//! those before the next run.
//!
//! # Module Organization
//!
//! - [`config`] - Configuration types
//! - [`path`] - File path generation
//! - [`janitor`] - Orphan repair and purging

pub mod config;
pub mod janitor;
pub mod path;

// Re-export main public API
pub use config::CacheConfig;
pub use janitor::{CacheJanitor, PurgeReport};
pub use path::PathGenerator;
