//! Batch dispatcher
//!
//! Slices a sequence into contiguous batches and sends one request per
//! batch, strictly one after another. The first failure stops the run;
//! batches already accepted by the collector stay accepted.

use std::num::NonZeroUsize;
use std::sync::Arc;
use telemeter_client::{ClientError, Transport};
use tracing::debug;

use crate::error::DeliveryError;

/// Batch size used when nothing else is configured
pub const DEFAULT_BATCH_SIZE: NonZeroUsize = match NonZeroUsize::new(20_000) {
    Some(size) => size,
    None => unreachable!(),
};

/// Splits `items` into contiguous slices of at most `batch_size`
///
/// Concatenating the slices reproduces `items` exactly. An empty input
/// still produces a single empty batch so that the telemetry is sent.
pub fn plan_batches<T>(items: &[T], batch_size: NonZeroUsize) -> Vec<&[T]> {
    if items.is_empty() {
        return vec![items];
    }
    items.chunks(batch_size.get()).collect()
}

/// Failure of one batch within a dispatch run
#[derive(Debug)]
pub struct BatchFailure {
    /// 1-based position of the failed batch
    pub batch: usize,
    pub total: usize,
    pub source: ClientError,
}

impl From<BatchFailure> for DeliveryError {
    fn from(failure: BatchFailure) -> Self {
        DeliveryError::Logs {
            batch: failure.batch,
            total: failure.total,
            source: failure.source,
        }
    }
}

/// Sends prepared payloads through a [`Transport`]
#[derive(Clone)]
pub struct BatchDispatcher {
    transport: Arc<dyn Transport>,
}

impl BatchDispatcher {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Sends a single payload
    pub async fn send_one(&self, payload: Vec<u8>) -> Result<(), ClientError> {
        self.transport.post(payload).await
    }

    /// Builds one payload per batch, then sends them in order
    ///
    /// Every payload is serialized before the first request goes out, so a
    /// serialization error means nothing was sent at all.
    pub async fn dispatch<T, F>(
        &self,
        items: &[T],
        batch_size: NonZeroUsize,
        build: F,
    ) -> Result<usize, DeliveryError>
    where
        F: Fn(&[T]) -> Result<Vec<u8>, DeliveryError>,
    {
        let payloads = plan_batches(items, batch_size)
            .into_iter()
            .map(build)
            .collect::<Result<Vec<_>, _>>()?;
        let total = payloads.len();

        for (index, payload) in payloads.into_iter().enumerate() {
            let batch = index + 1;
            debug!("Sending batch {}/{} ({} bytes)", batch, total, payload.len());

            self.transport
                .post(payload)
                .await
                .map_err(|source| BatchFailure {
                    batch,
                    total,
                    source,
                })?;
        }

        Ok(total)
    }
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingTransport;
    use super::*;

    fn size(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    #[test]
    fn test_plan_batches_partition() {
        for n in [0usize, 1, 2, 5, 9, 10, 11, 99, 100, 101] {
            for b in [1usize, 2, 3, 10, 100, 1000] {
                let items: Vec<usize> = (0..n).collect();
                let batches = plan_batches(&items, size(b));

                let expected = if n == 0 { 1 } else { n.div_ceil(b) };
                assert_eq!(batches.len(), expected, "n={} b={}", n, b);
                assert!(batches.iter().all(|batch| batch.len() <= b));
                assert_eq!(batches.concat(), items, "n={} b={}", n, b);
            }
        }
    }

    #[test]
    fn test_plan_batches_sizes() {
        let items = vec![0u8; 45_000];
        let sizes: Vec<usize> = plan_batches(&items, DEFAULT_BATCH_SIZE)
            .iter()
            .map(|batch| batch.len())
            .collect();
        assert_eq!(sizes, vec![20_000, 20_000, 5_000]);
    }

    #[tokio::test]
    async fn test_dispatch_sends_in_order() {
        let transport = Arc::new(RecordingTransport::default());
        let dispatcher = BatchDispatcher::new(transport.clone());
        let items: Vec<u32> = (0..7).collect();

        let sent = dispatcher
            .dispatch(&items, size(3), |batch| Ok(serde_json::to_vec(batch)?))
            .await
            .unwrap();

        assert_eq!(sent, 3);
        let payloads = transport.sent();
        assert_eq!(payloads[0], serde_json::json!([0, 1, 2]));
        assert_eq!(payloads[1], serde_json::json!([3, 4, 5]));
        assert_eq!(payloads[2], serde_json::json!([6]));
    }

    #[tokio::test]
    async fn test_dispatch_stops_at_first_failure() {
        let transport = Arc::new(RecordingTransport::failing_at(2));
        let dispatcher = BatchDispatcher::new(transport.clone());
        let items: Vec<u32> = (0..10).collect();

        let err = dispatcher
            .dispatch(&items, size(2), |batch| Ok(serde_json::to_vec(batch)?))
            .await
            .unwrap_err();

        assert!(matches!(err, DeliveryError::Logs { batch: 2, total: 5, .. }));
        assert_eq!(transport.count(), 2);
    }

    #[tokio::test]
    async fn test_dispatch_build_error_sends_nothing() {
        let transport = Arc::new(RecordingTransport::default());
        let dispatcher = BatchDispatcher::new(transport.clone());
        let items: Vec<u32> = (0..4).collect();

        let err = dispatcher
            .dispatch(&items, size(2), |batch| {
                if batch[0] == 2 {
                    Err(DeliveryError::Config("cannot build".to_string()))
                } else {
                    Ok(serde_json::to_vec(batch)?)
                }
            })
            .await
            .unwrap_err();

        assert!(matches!(err, DeliveryError::Config(_)));
        assert_eq!(transport.count(), 0);
    }
}
