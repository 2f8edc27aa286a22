//! Collector envelope DTOs
//!
//! Every request to the collector carries exactly one envelope. The envelope
//! names the host (the correlation id of the run), how the collector should
//! parse the event, the index to store it in, and the event itself.

use serde::{Deserialize, Serialize};

use crate::domain::log::LogMessage;
use crate::domain::telemetry::{PipelineTelemetry, TelemetrySummary};

/// Source type for structured JSON events
pub const SOURCE_TYPE_JSON: &str = "_json";

/// Source type for raw text log lines
pub const SOURCE_TYPE_TEXT: &str = "txt";

/// Outer wrapper around an event sent to the collector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<E> {
    pub host: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub source: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub sourcetype: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub index: String,
    pub event: E,
}

/// Per-step event: the step telemetry plus an optional slice of its logs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepEvent {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<LogMessage>,
    pub telemetry: TelemetrySummary,
}

/// Pipeline event: the pipeline telemetry plus raw log lines
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineLogEvent {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<String>,
    pub telemetry: PipelineTelemetry,
}

/// Envelope carrying a per-step event
pub type StepEnvelope = Envelope<StepEvent>;

/// Envelope carrying a slice of the raw pipeline log
pub type PipelineLogEnvelope = Envelope<PipelineLogEvent>;

/// Envelope carrying pipeline telemetry on its own
pub type PipelineTelemetryEnvelope = Envelope<PipelineTelemetry>;
