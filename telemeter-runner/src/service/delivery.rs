//! Delivery facade
//!
//! Single entry point for shipping step and pipeline telemetry to the
//! collector. Decides whether logs go along, batches them and surfaces the
//! first failure.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use telemeter_client::{
    ClientOptions, CollectorClient, DEFAULT_REQUEST_TIMEOUT, RetryStrategy, Transport,
    normalize_token,
};
use telemeter_core::domain::telemetry::{ERROR_CODE_SUCCESS, PipelineTelemetry, TelemetryData};
use tracing::{debug, info, warn};

use crate::error::DeliveryError;
use crate::service::ambient::AmbientContext;
use crate::service::dispatch::{BatchDispatcher, DEFAULT_BATCH_SIZE};
use crate::service::log_collector::LogCollector;
use crate::service::payload::PayloadBuilder;
use crate::service::secrets::SecretRegistry;

/// Raw tokens shorter than this are not masked on their own
///
/// The normalized token is always masked. Masking a very short raw value
/// would garble unrelated text.
pub const MIN_RAW_TOKEN_LEN: usize = 8;

/// Where and how telemetry is delivered
///
/// Built once at startup and never changed afterwards.
#[derive(Debug, Clone)]
pub struct DeliveryTarget {
    /// Full collector URL
    pub endpoint: String,
    /// Collector token, with or without the auth scheme
    pub token: String,
    pub index: String,
    /// Reported as the envelope host
    pub correlation_id: String,
    /// Ship the full log output of failed steps
    pub send_logs: bool,
    pub batch_size: NonZeroUsize,
    pub request_timeout: Duration,
    pub retry_strategy: RetryStrategy,
    pub skip_tls_verification: bool,
}

impl DeliveryTarget {
    pub fn new(
        endpoint: impl Into<String>,
        token: impl Into<String>,
        correlation_id: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            token: token.into(),
            index: String::new(),
            correlation_id: correlation_id.into(),
            send_logs: false,
            batch_size: DEFAULT_BATCH_SIZE,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            retry_strategy: RetryStrategy::None,
            skip_tls_verification: false,
        }
    }

    pub fn with_index(mut self, index: impl Into<String>) -> Self {
        self.index = index.into();
        self
    }

    pub fn with_send_logs(mut self, send_logs: bool) -> Self {
        self.send_logs = send_logs;
        self
    }

    pub fn with_batch_size(mut self, batch_size: NonZeroUsize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
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

/// Ships telemetry and logs to the collector
pub struct Delivery {
    send_logs: bool,
    batch_size: NonZeroUsize,
    builder: PayloadBuilder,
    dispatcher: BatchDispatcher,
}

impl Delivery {
    /// Builds the delivery subsystem for `target`
    ///
    /// The normalized token, and the raw one when at least
    /// [`MIN_RAW_TOKEN_LEN`] long, are registered as secrets before anything
    /// can log them.
    ///
    /// # Errors
    /// Returns [`DeliveryError::Config`] when the endpoint is empty or not
    /// an http(s) URL, or the token is empty.
    pub fn initialize(
        target: DeliveryTarget,
        secrets: &SecretRegistry,
        ambient: Arc<dyn AmbientContext>,
    ) -> Result<Self, DeliveryError> {
        if target.token.trim().is_empty() {
            return Err(DeliveryError::Config(
                "collector token cannot be empty".to_string(),
            ));
        }

        let token = normalize_token(&target.token);
        if target.token.len() >= MIN_RAW_TOKEN_LEN {
            secrets.register(target.token.clone());
        }
        secrets.register(token.clone());

        let options = ClientOptions::new(token)
            .with_timeout(target.request_timeout)
            .with_retry_strategy(target.retry_strategy)
            .with_skip_tls_verification(target.skip_tls_verification);
        let client = CollectorClient::new(target.endpoint.clone(), options)?;

        info!(
            "Telemetry delivery enabled: endpoint={}, send_logs={}, batch_size={}",
            client.endpoint(),
            target.send_logs,
            target.batch_size
        );

        Ok(Self::with_transport(target, Arc::new(client), ambient))
    }

    /// Builds the subsystem on top of an existing transport
    pub fn with_transport(
        target: DeliveryTarget,
        transport: Arc<dyn Transport>,
        ambient: Arc<dyn AmbientContext>,
    ) -> Self {
        Self {
            send_logs: target.send_logs,
            batch_size: target.batch_size,
            builder: PayloadBuilder::new(target.correlation_id, target.index, ambient),
            dispatcher: BatchDispatcher::new(transport),
        }
    }

    /// Whether `telemetry` goes out without any log lines
    ///
    /// Successful steps never ship logs. Failed steps do so only when
    /// log shipping is enabled.
    pub fn telemetry_only(&self, telemetry: &TelemetryData) -> bool {
        telemetry.custom.error_code == ERROR_CODE_SUCCESS || !self.send_logs
    }

    /// Sends the telemetry of one step, with its logs when required
    ///
    /// When logs go along, every batch carries the same telemetry and at
    /// least one request is made even if nothing was captured. The first
    /// failing batch aborts the rest.
    pub async fn send(
        &self,
        telemetry: &TelemetryData,
        collector: &dyn LogCollector,
    ) -> Result<(), DeliveryError> {
        let summary = self.builder.prepare_telemetry(telemetry);

        if self.telemetry_only(telemetry) {
            debug!("Sending telemetry for step {}", summary.step_name);
            let payload = self.builder.step_payload(&summary, &[])?;
            return self
                .dispatcher
                .send_one(payload)
                .await
                .map_err(DeliveryError::Telemetry);
        }

        let messages = collector.messages();
        let batches = self
            .dispatcher
            .dispatch(&messages, self.batch_size, |batch| {
                self.builder.step_payload(&summary, batch)
            })
            .await?;

        debug!(
            "Sent {} log messages in {} batch(es) for step {}",
            messages.len(),
            batches,
            summary.step_name
        );
        Ok(())
    }

    /// Sends the pipeline telemetry, followed by the raw pipeline log
    /// when log shipping is enabled
    ///
    /// A failed telemetry request does not stop the log batches; it is only
    /// returned when no logs are shipped. Log batches fail fast.
    pub async fn send_pipeline_status(
        &self,
        telemetry: &PipelineTelemetry,
        raw_log: &[u8],
    ) -> Result<(), DeliveryError> {
        let payload = self.builder.pipeline_telemetry_payload(telemetry)?;
        let sent = self.dispatcher.send_one(payload).await;

        if !self.send_logs {
            return sent.map_err(DeliveryError::Telemetry);
        }

        if let Err(e) = sent {
            warn!("Failed to send pipeline telemetry, sending logs anyway: {}", e);
        }

        let lines = split_log_lines(raw_log);
        let batches = self
            .dispatcher
            .dispatch(&lines, self.batch_size, |batch| {
                self.builder.pipeline_log_payload(telemetry, batch)
            })
            .await?;

        debug!(
            "Sent {} pipeline log lines in {} batch(es)",
            lines.len(),
            batches
        );
        Ok(())
    }
}

/// Splits raw log output into lines
///
/// Invalid UTF-8 is replaced rather than rejected. A trailing newline does
/// not produce an empty last line, and `\r\n` endings are handled.
pub fn split_log_lines(raw: &[u8]) -> Vec<String> {
    let decoded = String::from_utf8_lossy(raw);
    let text = decoded.strip_suffix('\n').unwrap_or(&decoded);

    if text.is_empty() {
        return Vec::new();
    }

    text.split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line).to_string())
        .collect()
}
