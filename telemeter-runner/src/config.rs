//! Runner configuration
//!
//! Collector connection settings and batching limits. Values come from
//! command-line flags or their environment variable fallbacks.

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;
use telemeter_client::RetryStrategy;

use crate::service::ambient::DEFAULT_PIPELINE_ENV_DIR;
use crate::service::DeliveryTarget;

/// Runner configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Collector URL; delivery is disabled when absent
    pub collector_url: Option<String>,

    /// Collector token, with or without the auth scheme
    pub collector_token: String,

    /// Collector index, omitted from payloads when empty
    pub collector_index: String,

    /// Ship the full log output of failed steps
    pub send_logs: bool,

    /// Identifier of this pipeline run, reported as the envelope host
    pub correlation_id: String,

    /// Maximum number of log lines per request
    pub batch_size: usize,

    /// Upper bound for a single collector request
    pub request_timeout: Duration,

    /// Additional attempts after a failed request
    pub retries: u32,

    /// Accept any certificate presented by the collector
    pub skip_tls_verification: bool,

    /// Directory holding `git/` and `github/` pipeline environment files
    pub pipeline_env_dir: PathBuf,
}

impl Config {
    /// Creates a new configuration with defaults
    pub fn new(collector_url: Option<String>, collector_token: String) -> Self {
        Self {
            collector_url,
            collector_token,
            collector_index: String::new(),
            send_logs: false,
            correlation_id: uuid::Uuid::new_v4().to_string(),
            batch_size: 20_000,
            request_timeout: Duration::from_secs(5),
            retries: 0,
            skip_tls_verification: false,
            pipeline_env_dir: PathBuf::from(DEFAULT_PIPELINE_ENV_DIR),
        }
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if let Some(url) = &self.collector_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                anyhow::bail!("collector_url must start with http:// or https://");
            }

            if self.collector_token.trim().is_empty() {
                anyhow::bail!("collector_token cannot be empty when collector_url is set");
            }
        }

        if self.correlation_id.is_empty() {
            anyhow::bail!("correlation_id cannot be empty");
        }

        if self.batch_size == 0 {
            anyhow::bail!("batch_size must be greater than 0");
        }

        if self.request_timeout.is_zero() {
            anyhow::bail!("request_timeout must be greater than 0");
        }

        Ok(())
    }

    /// Builds the delivery target, or `None` when no collector is configured
    pub fn delivery_target(&self) -> anyhow::Result<Option<DeliveryTarget>> {
        let Some(url) = &self.collector_url else {
            return Ok(None);
        };

        let batch_size = NonZeroUsize::new(self.batch_size)
            .ok_or_else(|| anyhow::anyhow!("batch_size must be greater than 0"))?;

        let retry_strategy = match self.retries {
            0 => RetryStrategy::None,
            n => RetryStrategy::Immediate(n.saturating_add(1)),
        };

        Ok(Some(
            DeliveryTarget::new(
                url.clone(),
                self.collector_token.clone(),
                self.correlation_id.clone(),
            )
            .with_index(self.collector_index.clone())
            .with_send_logs(self.send_logs)
            .with_batch_size(batch_size)
            .with_request_timeout(self.request_timeout)
            .with_retry_strategy(retry_strategy)
            .with_skip_tls_verification(self.skip_tls_verification),
        ))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(None, String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.batch_size, 20_000);
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert!(!config.send_logs);
        assert!(!config.correlation_id.is_empty());
        assert!(config.validate().is_ok());
        assert!(config.delivery_target().unwrap().is_none());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::new(
            Some("http://localhost:8088/services/collector".to_string()),
            "token".to_string(),
        );

        // Valid config should pass
        assert!(config.validate().is_ok());

        // Invalid URL should fail
        config.collector_url = Some("localhost:8088".to_string());
        assert!(config.validate().is_err());

        config.collector_url = Some("https://localhost:8088".to_string());
        config.collector_token = String::new();
        assert!(config.validate().is_err());

        config.collector_token = "token".to_string();
        config.batch_size = 0;
        assert!(config.validate().is_err());
        assert!(config.delivery_target().is_err());
    }

    #[test]
    fn test_delivery_target() {
        let mut config = Config::new(
            Some("https://collector.example.com".to_string()),
            "abc".to_string(),
        );
        config.collector_index = "piper".to_string();
        config.send_logs = true;
        config.batch_size = 500;
        config.retries = 2;

        let target = config.delivery_target().unwrap().unwrap();
        assert_eq!(target.endpoint, "https://collector.example.com");
        assert_eq!(target.index, "piper");
        assert!(target.send_logs);
        assert_eq!(target.batch_size.get(), 500);
        assert_eq!(target.correlation_id, config.correlation_id);
        assert_eq!(target.retry_strategy, RetryStrategy::Immediate(3));
    }
}
