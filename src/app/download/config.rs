//! Download engine configuration

use std::time::Duration;

use crate::app::retry::RetryPolicy;
use crate::constants::{files, limits, workers};
use crate::errors::{ConfigError, ConfigResult};

/// Configuration for the [`DownloadEngine`](super::DownloadEngine)
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Number of concurrent payload transfers
    pub worker_count: usize,
    /// Size probes run on `worker_count * probe_fan_out` workers
    pub probe_fan_out: usize,
    /// Per-file retry policy
    pub retry: RetryPolicy,
    /// Timeout for each network operation of an attempt: the size probe,
    /// opening the stream, and every body chunk
    pub attempt_timeout: Duration,
    /// Default write buffer size for streamed transfers
    pub chunk_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_count: workers::default_worker_count(),
            probe_fan_out: workers::PROBE_FAN_OUT,
            retry: RetryPolicy::default(),
            attempt_timeout: limits::ATTEMPT_TIMEOUT,
            chunk_size: files::DOWNLOAD_CHUNK_SIZE,
        }
    }
}

impl EngineConfig {
    pub fn with_worker_count(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    pub fn with_probe_fan_out(mut self, probe_fan_out: usize) -> Self {
        self.probe_fan_out = probe_fan_out;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Number of concurrent size probes
    pub fn probe_worker_count(&self) -> usize {
        self.worker_count.saturating_mul(self.probe_fan_out.max(1))
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.worker_count == 0 {
            return Err(ConfigError::InvalidValue {
                field: "download.worker_count".to_string(),
                value: self.worker_count.to_string(),
                reason: "At least one worker is required".to_string(),
            });
        }
        if self.chunk_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "download.chunk_size".to_string(),
                value: self.chunk_size.to_string(),
                reason: "Chunk size must be positive".to_string(),
            });
        }
        if self.attempt_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "download.attempt_timeout_secs".to_string(),
                value: "0".to_string(),
                reason: "Timeout must be positive".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(
            config.probe_worker_count(),
            config.worker_count * workers::PROBE_FAN_OUT
        );
    }

    #[test]
    fn test_validation_rejects_zero_values() {
        assert!(EngineConfig::default().with_worker_count(0).validate().is_err());
        assert!(EngineConfig::default().with_chunk_size(0).validate().is_err());
        assert!(EngineConfig::default()
            .with_attempt_timeout(Duration::ZERO)
            .validate()
            .is_err());
    }
}
