//! HTTP transport for the WorldPop server
//!
//! Serves the catalogue channel (hash + raw CSV under `/assets`) and the bulk
//! raster files (HEAD probes, streamed GETs) through one rate-limited reqwest
//! client. Retries are not done here; callers wrap operations in a
//! [`RetryPolicy`](crate::app::retry::RetryPolicy).

use std::num::NonZeroU32;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use governor::{clock::DefaultClock, state::InMemoryState, state::NotKeyed, Jitter, Quota, RateLimiter};
use reqwest::header::CONTENT_LENGTH;
use reqwest::{Client, Method, Response};
use tracing::debug;
use url::Url;

use super::config::ClientConfig;
use super::{ByteStream, CatalogSource, FileTransport};
use crate::constants::{limits, worldpop};
use crate::errors::{TransportError, TransportResult};

/// reqwest-backed transport with client-side rate limiting
#[derive(Debug)]
pub struct HttpTransport {
    client: Client,
    base_url: Url,
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    timeout_hint: Duration,
}

impl HttpTransport {
    /// Creates a transport from the given client configuration
    ///
    /// # Errors
    ///
    /// Returns `TransportError` if the base URL is invalid, the rate limit is
    /// zero, or the HTTP client cannot be built
    pub fn new(config: &ClientConfig) -> TransportResult<Self> {
        let mut base_url = Url::parse(&config.base_url).map_err(|e| TransportError::InvalidUrl {
            url: config.base_url.clone(),
            error: e.to_string(),
        })?;
        // Url::join replaces the last segment unless the base ends with a slash
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let rate = NonZeroU32::new(config.rate_limit_rps).ok_or_else(|| {
            TransportError::InvalidConfig {
                reason: "rate limit must be at least one request per second".to_string(),
            }
        })?;

        Ok(Self {
            client: config.build_http_client()?,
            base_url,
            rate_limiter: RateLimiter::direct(Quota::per_second(rate)),
            timeout_hint: config.request_timeout.unwrap_or(limits::ATTEMPT_TIMEOUT),
        })
    }

    /// Get the base URL of the remote server
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Absolute URL of a server-relative path
    pub fn url_for(&self, path: &str) -> TransportResult<Url> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| TransportError::InvalidUrl {
                url: path.to_string(),
                error: e.to_string(),
            })
    }

    /// Sends one rate-limited request and rejects non-success statuses
    async fn send(&self, method: Method, url: &Url) -> TransportResult<Response> {
        self.rate_limiter
            .until_ready_with_jitter(Jitter::up_to(Duration::from_millis(50)))
            .await;

        let response = self
            .client
            .request(method.clone(), url.as_str())
            .send()
            .await
            .map_err(|e| self.map_error(e, url))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        debug!("{} {} -> {}", method, url, status);
        Ok(response)
    }

    fn map_error(&self, err: reqwest::Error, url: &Url) -> TransportError {
        classify_reqwest_error(err, url.as_str(), self.timeout_hint)
    }
}

/// Map a reqwest error onto the transport taxonomy
fn classify_reqwest_error(err: reqwest::Error, url: &str, timeout: Duration) -> TransportError {
    let url = url.to_string();
    if err.is_timeout() {
        TransportError::Timeout { url, timeout }
    } else if err.is_connect() {
        TransportError::Connect {
            url,
            reason: err.to_string(),
        }
    } else if let Some(status) = err.status() {
        TransportError::Status {
            status: status.as_u16(),
            url,
        }
    } else if err.is_body() || err.is_decode() {
        TransportError::Body {
            url,
            reason: err.to_string(),
        }
    } else {
        TransportError::Request {
            url,
            reason: err.to_string(),
        }
    }
}

#[async_trait]
impl CatalogSource for HttpTransport {
    async fn fetch_hash_payload(&self) -> TransportResult<String> {
        let url = self.url_for(worldpop::CATALOG_HASH_PATH)?;
        let response = self.send(Method::GET, &url).await?;
        response.text().await.map_err(|e| self.map_error(e, &url))
    }

    async fn fetch_catalog_payload(&self) -> TransportResult<Vec<u8>> {
        let url = self.url_for(worldpop::CATALOG_PATH)?;
        let response = self.send(Method::GET, &url).await?;
        let bytes = response.bytes().await.map_err(|e| self.map_error(e, &url))?;
        debug!("Fetched raw catalogue: {} bytes", bytes.len());
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl FileTransport for HttpTransport {
    async fn probe_size(&self, remote_path: &str) -> TransportResult<Option<u64>> {
        let url = self.url_for(remote_path)?;
        let response = self.send(Method::HEAD, &url).await?;
        Ok(response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<u64>().ok()))
    }

    async fn open_stream(&self, remote_path: &str) -> TransportResult<ByteStream> {
        let url = self.url_for(remote_path)?;
        let response = self.send(Method::GET, &url).await?;

        let url = url.to_string();
        let timeout = self.timeout_hint;
        let stream = response
            .bytes_stream()
            .map(move |chunk| chunk.map_err(|e| classify_reqwest_error(e, &url, timeout)));
        Ok(stream.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_creation() {
        let transport = HttpTransport::new(&ClientConfig::default()).unwrap();
        assert_eq!(transport.base_url().as_str(), "https://data.worldpop.org/");
    }

    #[test]
    fn test_zero_rate_limit_fails() {
        let config = ClientConfig {
            rate_limit_rps: 0,
            ..Default::default()
        };
        match HttpTransport::new(&config) {
            Err(e @ TransportError::InvalidConfig { .. }) => {
                assert!(!e.is_transient());
                assert!(!e.to_string().contains("URL"));
            }
            Err(other) => panic!("expected a configuration error, got {}", other),
            Ok(_) => panic!("a zero rate limit must be rejected"),
        }
    }

    #[test]
    fn test_url_for_remote_paths() {
        let config = ClientConfig::default().with_base_url("https://mirror.example.org/worldpop");
        let transport = HttpTransport::new(&config).unwrap();

        let url = transport
            .url_for("/GIS/Population/Global_2000_2020/2010/LIE/lie_ppp_2010.tif")
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://mirror.example.org/worldpop/GIS/Population/Global_2000_2020/2010/LIE/lie_ppp_2010.tif"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        let config = ClientConfig::default().with_base_url("not a url");
        assert!(matches!(
            HttpTransport::new(&config),
            Err(TransportError::InvalidUrl { .. })
        ));
    }
}
