//! Remote transports for the catalogue channel and bulk raster files
//!
//! The rest of the crate only talks to the remote side through two narrow traits:
//! - [`CatalogSource`]: the small catalogue hash and the full raw catalogue
//! - [`FileTransport`]: metadata-only size probes and streamed file payloads
//!
//! [`HttpTransport`] implements both against the WorldPop HTTPS server. Tests
//! substitute in-memory implementations.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

use crate::errors::{TransportError, TransportResult};

pub mod config;
pub mod http;

pub use config::ClientConfig;
pub use http::HttpTransport;

/// Stream of payload chunks for one remote file
pub type ByteStream = BoxStream<'static, TransportResult<Bytes>>;

/// Remote catalogue channel
#[async_trait]
pub trait CatalogSource: Send + Sync + fmt::Debug {
    /// Small text payload whose first whitespace-delimited token is the
    /// hash of the current raw catalogue
    async fn fetch_hash_payload(&self) -> TransportResult<String>;

    /// Full raw catalogue (CSV)
    async fn fetch_catalog_payload(&self) -> TransportResult<Vec<u8>>;
}

/// Remote bulk-file channel
#[async_trait]
pub trait FileTransport: Send + Sync + fmt::Debug {
    /// Size of a remote file without transferring it; `None` when the server
    /// does not report one
    async fn probe_size(&self, remote_path: &str) -> TransportResult<Option<u64>>;

    /// Open a streamed transfer of a remote file
    async fn open_stream(&self, remote_path: &str) -> TransportResult<ByteStream>;
}

/// Apply a per-attempt timeout to one remote operation
///
/// An elapsed timeout becomes `TransportError::Timeout`, which the retry
/// policy treats as transient.
pub(crate) async fn bounded<T>(
    timeout: Duration,
    remote_path: &str,
    operation: impl Future<Output = TransportResult<T>>,
) -> TransportResult<T> {
    match tokio::time::timeout(timeout, operation).await {
        Ok(result) => result,
        Err(_) => Err(TransportError::Timeout {
            url: remote_path.to_string(),
            timeout,
        }),
    }
}
