//! Step finalization
//!
//! A [`StepReporter`] is created when a step starts and consumed when it
//! ends, so telemetry is reported at most once. [`run_step`] runs the step
//! body as its own task; an error or a panic in the body still ends in
//! [`StepReporter::finalize`].

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use telemeter_core::domain::telemetry::{
    ERROR_CODE_FAILURE, ERROR_CODE_SUCCESS, ErrorCategory, TelemetryData,
};
use thiserror::Error;
use tracing::{debug, error, info};

use crate::service::{Delivery, LogCollector};

/// Step error carrying the category to report
///
/// Errors of any other type are reported as [`ErrorCategory::Undefined`].
#[derive(Debug, Error)]
#[error("{message}")]
pub struct StepFailure {
    pub category: ErrorCategory,
    pub message: String,
}

impl StepFailure {
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
        }
    }
}

/// How the step body ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Success,
    Failed(ErrorCategory),
}

impl StepOutcome {
    /// Outcome for a body that returned an error
    pub fn from_error(err: &anyhow::Error) -> Self {
        let category = err
            .downcast_ref::<StepFailure>()
            .map(|failure| failure.category)
            .unwrap_or_default();
        StepOutcome::Failed(category)
    }
}

/// Reports the telemetry of one step execution
pub struct StepReporter {
    telemetry: TelemetryData,
    delivery: Option<Delivery>,
    collector: Arc<dyn LogCollector>,
    started: Instant,
}

impl StepReporter {
    /// Starts timing the step
    ///
    /// Without a `delivery` the reporter still computes the telemetry but
    /// sends nothing.
    pub fn new(
        step_name: impl Into<String>,
        delivery: Option<Delivery>,
        collector: Arc<dyn LogCollector>,
    ) -> Self {
        Self {
            telemetry: TelemetryData::for_step(step_name),
            delivery,
            collector,
            started: Instant::now(),
        }
    }

    pub fn with_stage_name(mut self, stage_name: impl Into<String>) -> Self {
        self.telemetry.base.stage_name = stage_name.into();
        self
    }

    pub fn with_pipeline_url_hash(mut self, hash: impl Into<String>) -> Self {
        self.telemetry.base.pipeline_url_hash = hash.into();
        self
    }

    pub fn with_build_url_hash(mut self, hash: impl Into<String>) -> Self {
        self.telemetry.base.build_url_hash = hash.into();
        self
    }

    /// Completes the telemetry and hands it to the delivery subsystem
    ///
    /// Delivery failures are logged and otherwise ignored; they never
    /// change the outcome of the step.
    pub async fn finalize(self, outcome: StepOutcome) -> TelemetryData {
        let mut telemetry = self.telemetry;
        telemetry.custom.duration = self.started.elapsed().as_millis().to_string();

        match outcome {
            StepOutcome::Success => {
                telemetry.custom.error_code = ERROR_CODE_SUCCESS.to_string();
                telemetry.custom.error_category = ErrorCategory::Undefined;
                info!(
                    "Step {} finished successfully in {}ms",
                    telemetry.base.step_name, telemetry.custom.duration
                );
            }
            StepOutcome::Failed(category) => {
                telemetry.custom.error_code = ERROR_CODE_FAILURE.to_string();
                telemetry.custom.error_category = category;
                error!(
                    "Step {} failed after {}ms (category: {})",
                    telemetry.base.step_name, telemetry.custom.duration, category
                );
            }
        }

        match &self.delivery {
            Some(delivery) => {
                if let Err(e) = delivery.send(&telemetry, self.collector.as_ref()).await {
                    error!("Failed to deliver telemetry: {}", e);
                }
            }
            None => debug!("Telemetry delivery not configured, nothing sent"),
        }

        telemetry
    }
}

/// Runs `body` and finalizes `reporter` with its outcome
pub async fn run_step<F>(reporter: StepReporter, body: F) -> TelemetryData
where
    F: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    let outcome = match tokio::spawn(body).await {
        Ok(Ok(())) => StepOutcome::Success,
        Ok(Err(e)) => {
            error!("Step execution failed: {:#}", e);
            StepOutcome::from_error(&e)
        }
        Err(e) if e.is_panic() => {
            error!("Step execution panicked: {}", e);
            StepOutcome::Failed(ErrorCategory::Undefined)
        }
        Err(e) => {
            error!("Step execution was cancelled: {}", e);
            StepOutcome::Failed(ErrorCategory::Undefined)
        }
    };

    reporter.finalize(outcome).await
}
