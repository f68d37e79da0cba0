//! HTTP client configuration and building logic
//!
//! This module handles the configuration and construction of the reqwest client
//! used for both the catalogue channel and the bulk raster downloads.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::constants::{http, limits, worldpop};
use crate::errors::{TransportError, TransportResult};

/// Configuration for the HTTP transport
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL serving catalogue assets and raster files
    pub base_url: String,
    /// TCP keep-alive settings
    pub tcp_keepalive: Option<Duration>,
    /// TCP nodelay (disable Nagle's algorithm)
    pub tcp_nodelay: bool,
    /// Connection pool idle timeout
    pub pool_idle_timeout: Option<Duration>,
    /// Maximum number of idle connections per host
    pub pool_max_per_host: usize,
    /// Total request timeout; `None` leaves large streamed transfers to the
    /// per-attempt timeouts of the download engine
    pub request_timeout: Option<Duration>,
    /// Connect timeout
    pub connect_timeout: Duration,
    /// Rate limit (requests per second)
    pub rate_limit_rps: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: worldpop::BASE_URL.to_string(),
            tcp_keepalive: Some(Duration::from_secs(30)),
            tcp_nodelay: true,
            pool_idle_timeout: Some(http::POOL_IDLE_TIMEOUT),
            pool_max_per_host: http::POOL_MAX_PER_HOST,
            request_timeout: None,
            connect_timeout: http::CONNECT_TIMEOUT,
            rate_limit_rps: limits::DEFAULT_RATE_LIMIT_RPS,
        }
    }
}

impl ClientConfig {
    /// Point the transport at a different server
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Builds the HTTP client with the specified configuration
    pub fn build_http_client(&self) -> TransportResult<Client> {
        let mut client_builder = Client::builder()
            .connect_timeout(self.connect_timeout)
            .user_agent(http::USER_AGENT)
            .tcp_nodelay(self.tcp_nodelay)
            .pool_max_idle_per_host(self.pool_max_per_host);

        if let Some(timeout) = self.request_timeout {
            client_builder = client_builder.timeout(timeout);
        }

        if let Some(keepalive) = self.tcp_keepalive {
            client_builder = client_builder.tcp_keepalive(keepalive);
        }

        if let Some(idle_timeout) = self.pool_idle_timeout {
            client_builder = client_builder.pool_idle_timeout(idle_timeout);
        }

        client_builder
            .build()
            .map_err(|e| TransportError::InvalidConfig {
                reason: format!("could not build HTTP client: {}", e),
            })
    }
}
