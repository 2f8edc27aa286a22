//! Telemeter HTTP Client
//!
//! Authenticated transport to a Splunk-style HTTP event collector.
//!
//! The client knows nothing about telemetry or log batching. It takes an
//! already serialized payload, POSTs it to the configured endpoint with the
//! collector token, enforces the request timeout and retry strategy, and
//! turns anything other than `200 OK` into a [`ClientError`].
//!
//! # Example
//!
//! ```no_run
//! use telemeter_client::{ClientOptions, CollectorClient, Transport};
//!
//! #[tokio::main]
//! async fn main() -> telemeter_client::Result<()> {
//!     let client = CollectorClient::new(
//!         "https://collector.example.com:8088/services/collector",
//!         ClientOptions::new("Splunk 1234"),
//!     )?;
//!
//!     client.post(br#"{"host":"h","event":{}}"#.to_vec()).await?;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod retry;

// Re-export commonly used types
pub use error::{ClientError, Result};
pub use retry::RetryStrategy;
pub use reqwest::StatusCode;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Response};
use std::time::Duration;
use tracing::{debug, warn};

/// Scheme the collector expects in front of the token
pub const AUTH_SCHEME: &str = "Splunk";

/// Maximum number of response body bytes kept for diagnostics
pub const MAX_DIAGNOSTIC_BODY_BYTES: usize = 1000;

/// Default upper bound for a single request
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Prefixes the token with the collector auth scheme unless already present
///
/// # Example
/// ```
/// use telemeter_client::normalize_token;
///
/// assert_eq!(normalize_token("abc"), "Splunk abc");
/// assert_eq!(normalize_token("Splunk abc"), "Splunk abc");
/// ```
pub fn normalize_token(token: &str) -> String {
    let prefix = format!("{} ", AUTH_SCHEME);
    if token.starts_with(&prefix) {
        token.to_string()
    } else {
        format!("{}{}", prefix, token)
    }
}

/// Something that can deliver a serialized payload to the collector
///
/// The delivery layer only depends on this trait, so batching can be
/// exercised without a network.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends one payload and waits for the collector to accept it
    async fn post(&self, payload: Vec<u8>) -> Result<()>;
}

/// Options used to build a [`CollectorClient`]
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Value of the `Authorization` header, scheme included
    pub token: String,
    /// Upper bound for a single request attempt
    pub timeout: Duration,
    pub retry_strategy: RetryStrategy,
    /// Accept any certificate presented by the collector
    pub skip_tls_verification: bool,
}

impl ClientOptions {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
            retry_strategy: RetryStrategy::None,
            skip_tls_verification: false,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry_strategy(mut self, retry_strategy: RetryStrategy) -> Self {
        self.retry_strategy = retry_strategy;
        self
    }

    pub fn with_skip_tls_verification(mut self, skip: bool) -> Self {
        self.skip_tls_verification = skip;
        self
    }
}

/// HTTP client for the event collector
#[derive(Debug, Clone)]
pub struct CollectorClient {
    /// Full collector URL, requests are POSTed here as-is
    endpoint: String,
    token: String,
    retry_strategy: RetryStrategy,
    client: Client,
}

impl CollectorClient {
    /// Create a new collector client
    ///
    /// # Arguments
    /// * `endpoint` - Full URL of the collector endpoint
    /// * `options` - Token, timeout and retry settings
    ///
    /// # Errors
    /// Returns [`ClientError::Configuration`] when the endpoint is not an
    /// http(s) URL or the token is empty.
    pub fn new(endpoint: impl Into<String>, options: ClientOptions) -> Result<Self> {
        let endpoint = endpoint.into();
        validate_endpoint(&endpoint)?;

        if options.token.trim().is_empty() {
            return Err(ClientError::Configuration(
                "collector token cannot be empty".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(options.timeout)
            .danger_accept_invalid_certs(options.skip_tls_verification)
            .build()
            .map_err(|e| ClientError::Configuration(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            endpoint,
            token: options.token,
            retry_strategy: options.retry_strategy,
            client,
        })
    }

    /// Get the collector endpoint
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Sends a single attempt of the request
    async fn post_once(&self, payload: Vec<u8>) -> Result<()> {
        let response = self
            .client
            .post(&self.endpoint)
            .header(AUTHORIZATION, &self.token)
            .header(CONTENT_TYPE, "application/json")
            .body(payload)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Checks the collector answer
    ///
    /// Only `200 OK` counts as accepted. For anything else the first
    /// [`MAX_DIAGNOSTIC_BODY_BYTES`] of the body are logged and returned.
    /// The response is consumed here, so it is released on every path.
    async fn handle_response(&self, response: Response) -> Result<()> {
        let status = response.status();

        if status == StatusCode::OK {
            return Ok(());
        }

        match read_diagnostic_body(response, MAX_DIAGNOSTIC_BODY_BYTES).await {
            Ok(body) => {
                warn!("{}: collector logging failed - {}", status, body);
                Err(ClientError::rejected(status, body))
            }
            Err(source) => {
                warn!(
                    "{}: collector logging failed, could not read response body: {}",
                    status, source
                );
                Err(ClientError::DiagnosticRead { status, source })
            }
        }
    }
}

#[async_trait]
impl Transport for CollectorClient {
    async fn post(&self, payload: Vec<u8>) -> Result<()> {
        let max_attempts = self.retry_strategy.max_attempts();
        let mut attempt = 0;

        loop {
            attempt += 1;

            match self.post_once(payload.clone()).await {
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    let delay = self.retry_strategy.delay_after(attempt);
                    debug!(
                        "Collector request failed (attempt {}/{}), retrying in {:?}: {}",
                        attempt, max_attempts, delay, e
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
                outcome => return outcome,
            }
        }
    }
}

fn validate_endpoint(endpoint: &str) -> Result<()> {
    if endpoint.is_empty() {
        return Err(ClientError::Configuration(
            "collector endpoint cannot be empty".to_string(),
        ));
    }

    let url = reqwest::Url::parse(endpoint).map_err(|e| {
        ClientError::Configuration(format!("invalid collector endpoint '{}': {}", endpoint, e))
    })?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ClientError::Configuration(format!(
            "collector endpoint must start with http:// or https://, got '{}'",
            endpoint
        )));
    }

    Ok(())
}

/// Reads at most `limit` bytes of the response body
async fn read_diagnostic_body(
    mut response: Response,
    limit: usize,
) -> std::result::Result<String, reqwest::Error> {
    let mut body = Vec::new();

    while body.len() < limit {
        let Some(chunk) = response.chunk().await? else {
            break;
        };
        let take = chunk.len().min(limit - body.len());
        body.extend_from_slice(&chunk[..take]);
    }

    Ok(String::from_utf8_lossy(&body).into_owned())
}
