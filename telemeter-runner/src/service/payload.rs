//! Payload builder
//!
//! Shapes telemetry and log slices into collector envelopes and serializes
//! them. Empty optional fields are left out of the JSON.

use std::sync::Arc;
use telemeter_core::domain::log::LogMessage;
use telemeter_core::domain::telemetry::{PipelineTelemetry, TelemetryData, TelemetrySummary};
use telemeter_core::dto::envelope::{
    Envelope, PipelineLogEnvelope, PipelineLogEvent, PipelineTelemetryEnvelope, SOURCE_TYPE_JSON,
    SOURCE_TYPE_TEXT, StepEnvelope, StepEvent,
};

use crate::error::DeliveryError;
use crate::service::ambient::AmbientContext;

/// Builds the request bodies sent to the collector
pub struct PayloadBuilder {
    /// Reported as the envelope host
    correlation_id: String,
    index: String,
    ambient: Arc<dyn AmbientContext>,
}

impl PayloadBuilder {
    pub fn new(
        correlation_id: impl Into<String>,
        index: impl Into<String>,
        ambient: Arc<dyn AmbientContext>,
    ) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            index: index.into(),
            ambient,
        }
    }

    /// Flattens step telemetry into the record the collector expects
    ///
    /// Repository details come from the ambient context and fall back to
    /// the sentinel value when unavailable; this never fails.
    pub fn prepare_telemetry(&self, data: &TelemetryData) -> TelemetrySummary {
        let ambient = self.ambient.fetch();

        TelemetrySummary {
            pipeline_url_hash: data.base.pipeline_url_hash.clone(),
            build_url_hash: data.base.build_url_hash.clone(),
            stage_name: data.base.stage_name.clone(),
            step_name: data.base.step_name.clone(),
            exit_code: data.custom.error_code.clone(),
            duration: data.custom.duration.clone(),
            error_code: data.custom.error_code.clone(),
            error_category: data.custom.error_category.to_string(),
            correlation_id: self.correlation_id.clone(),
            commit_hash: ambient.commit_hash,
            branch: ambient.branch,
            git_owner: ambient.git_owner,
            git_repository: ambient.git_repository,
        }
    }

    /// Per-step body: telemetry plus a (possibly empty) slice of messages
    pub fn step_payload(
        &self,
        telemetry: &TelemetrySummary,
        messages: &[LogMessage],
    ) -> Result<Vec<u8>, DeliveryError> {
        let envelope: StepEnvelope = self.envelope(
            SOURCE_TYPE_JSON,
            StepEvent {
                messages: messages.to_vec(),
                telemetry: telemetry.clone(),
            },
        );
        Ok(serde_json::to_vec(&envelope)?)
    }

    /// Pipeline body carrying only the pipeline telemetry
    pub fn pipeline_telemetry_payload(
        &self,
        telemetry: &PipelineTelemetry,
    ) -> Result<Vec<u8>, DeliveryError> {
        let envelope: PipelineTelemetryEnvelope =
            self.envelope(SOURCE_TYPE_JSON, telemetry.clone());
        Ok(serde_json::to_vec(&envelope)?)
    }

    /// Pipeline body carrying raw log lines and the pipeline telemetry
    pub fn pipeline_log_payload(
        &self,
        telemetry: &PipelineTelemetry,
        lines: &[String],
    ) -> Result<Vec<u8>, DeliveryError> {
        let envelope: PipelineLogEnvelope = self.envelope(
            SOURCE_TYPE_TEXT,
            PipelineLogEvent {
                messages: lines.to_vec(),
                telemetry: telemetry.clone(),
            },
        );
        Ok(serde_json::to_vec(&envelope)?)
    }

    fn envelope<E>(&self, sourcetype: &str, event: E) -> Envelope<E> {
        Envelope {
            host: self.correlation_id.clone(),
            source: String::new(),
            sourcetype: sourcetype.to_string(),
            index: self.index.clone(),
            event,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::ambient::{AmbientInfo, StaticAmbientContext};
    use serde_json::Value;
    use telemeter_core::domain::log::LogLevel;
    use telemeter_core::domain::telemetry::{ERROR_CODE_SUCCESS, ErrorCategory, NOT_AVAILABLE};

    fn ambient() -> Arc<dyn AmbientContext> {
        Arc::new(StaticAmbientContext(AmbientInfo {
            commit_hash: "0123abcd".to_string(),
            branch: "main".to_string(),
            git_owner: "acme".to_string(),
            git_repository: "widgets".to_string(),
        }))
    }

    fn telemetry() -> TelemetryData {
        let mut data = TelemetryData::for_step("kubernetesDeploy");
        data.base.stage_name = "Acceptance".to_string();
        data.base.pipeline_url_hash = "p-hash".to_string();
        data.custom.duration = "1500".to_string();
        data.custom.error_category = ErrorCategory::Infrastructure;
        data
    }

    #[test]
    fn test_prepare_telemetry_maps_fields() {
        let builder = PayloadBuilder::new("corr-1", "piper", ambient());
        let summary = builder.prepare_telemetry(&telemetry());

        assert_eq!(summary.step_name, "kubernetesDeploy");
        assert_eq!(summary.stage_name, "Acceptance");
        assert_eq!(summary.pipeline_url_hash, "p-hash");
        assert_eq!(summary.build_url_hash, "");
        assert_eq!(summary.duration, "1500");
        assert_eq!(summary.error_code, "1");
        assert_eq!(summary.exit_code, "1");
        assert_eq!(summary.error_category, "infrastructure");
        assert_eq!(summary.correlation_id, "corr-1");
        assert_eq!(summary.commit_hash, "0123abcd");
        assert_eq!(summary.branch, "main");
        assert_eq!(summary.git_owner, "acme");
        assert_eq!(summary.git_repository, "widgets");
    }

    #[test]
    fn test_prepare_telemetry_with_unavailable_context() {
        let builder = PayloadBuilder::new(
            "corr-1",
            "",
            Arc::new(StaticAmbientContext(AmbientInfo::unavailable())),
        );
        let mut data = telemetry();
        data.custom.error_code = ERROR_CODE_SUCCESS.to_string();

        let summary = builder.prepare_telemetry(&data);
        assert_eq!(summary.branch, NOT_AVAILABLE);
        assert_eq!(summary.commit_hash, NOT_AVAILABLE);
        assert_eq!(summary.exit_code, "0");
    }

    #[test]
    fn test_step_payload_without_messages() {
        let builder = PayloadBuilder::new("corr-1", "piper", ambient());
        let summary = builder.prepare_telemetry(&telemetry());

        let payload = builder.step_payload(&summary, &[]).unwrap();
        let json: Value = serde_json::from_slice(&payload).unwrap();

        assert_eq!(json["host"], "corr-1");
        assert_eq!(json["sourcetype"], "_json");
        assert_eq!(json["index"], "piper");
        assert!(json.get("source").is_none());
        assert!(json["event"].get("messages").is_none());
        assert_eq!(json["event"]["telemetry"]["StepName"], "kubernetesDeploy");
        assert!(json["event"]["telemetry"].get("BuildUrlHash").is_none());
    }

    #[test]
    fn test_step_payload_with_messages() {
        let builder = PayloadBuilder::new("corr-1", "piper", ambient());
        let summary = builder.prepare_telemetry(&telemetry());
        let messages = vec![
            LogMessage::new(LogLevel::Info, "first"),
            LogMessage::new(LogLevel::Error, "second"),
        ];

        let payload = builder.step_payload(&summary, &messages).unwrap();
        let json: Value = serde_json::from_slice(&payload).unwrap();

        assert_eq!(json["event"]["messages"][0]["message"], "first");
        assert_eq!(json["event"]["messages"][1]["level"], "error");
    }

    #[test]
    fn test_empty_index_is_omitted() {
        let builder = PayloadBuilder::new("corr-1", "", ambient());
        let payload = builder
            .pipeline_telemetry_payload(&PipelineTelemetry::default())
            .unwrap();
        let json: Value = serde_json::from_slice(&payload).unwrap();

        assert!(json.get("index").is_none());
        assert_eq!(json["sourcetype"], "_json");
    }

    #[test]
    fn test_pipeline_log_payload_is_plain_text() {
        let builder = PayloadBuilder::new("corr-1", "piper", ambient());
        let telemetry = PipelineTelemetry {
            status: "FAILURE".to_string(),
            ..Default::default()
        };
        let lines = vec!["line one".to_string(), "line two".to_string()];

        let payload = builder.pipeline_log_payload(&telemetry, &lines).unwrap();
        let json: Value = serde_json::from_slice(&payload).unwrap();

        assert_eq!(json["sourcetype"], "txt");
        assert_eq!(json["event"]["messages"][1], "line two");
        assert_eq!(json["event"]["telemetry"]["PipelineStatus"], "FAILURE");
    }
}
