//! Error types for telemetry delivery

use telemeter_client::ClientError;
use thiserror::Error;

/// Errors surfaced by the delivery subsystem
///
/// None of these are fatal for the step itself; the step wrapper logs them
/// and carries on with shutdown.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// Destination or token missing or malformed
    #[error("invalid delivery configuration: {0}")]
    Config(String),

    /// A payload could not be serialized; nothing was sent
    #[error("error while marshalling collector message details: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The telemetry-only request failed
    #[error("error while sending telemetry: {0}")]
    Telemetry(#[source] ClientError),

    /// A log batch failed; batches after it were not sent
    #[error("error while sending logs (batch {batch} of {total}): {source}")]
    Logs {
        batch: usize,
        total: usize,
        #[source]
        source: ClientError,
    },
}

impl From<ClientError> for DeliveryError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Configuration(message) => DeliveryError::Config(message),
            other => DeliveryError::Telemetry(other),
        }
    }
}
