//! Telemetry domain types
//!
//! Two shapes exist for step telemetry: [`TelemetryData`] is what the step
//! wrapper fills in while the step runs, [`TelemetrySummary`] is the flat
//! record the collector receives. [`PipelineTelemetry`] describes a whole
//! pipeline run rather than a single step.

use serde::{Deserialize, Serialize};

/// Error code reported by a step that completed successfully
pub const ERROR_CODE_SUCCESS: &str = "0";

/// Error code reported by a step that failed
pub const ERROR_CODE_FAILURE: &str = "1";

/// Placeholder used when ambient context cannot be read
pub const NOT_AVAILABLE: &str = "N/A";

/// Telemetry collected for one step execution
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetryData {
    pub base: BaseData,
    pub custom: CustomData,
}

impl TelemetryData {
    /// Creates telemetry for a step that has not finished yet
    ///
    /// The error code starts out as a failure and is only flipped to
    /// success once the step body has returned normally.
    pub fn for_step(step_name: impl Into<String>) -> Self {
        Self {
            base: BaseData {
                step_name: step_name.into(),
                ..Default::default()
            },
            custom: CustomData {
                error_code: ERROR_CODE_FAILURE.to_string(),
                error_category: ErrorCategory::Undefined,
                ..Default::default()
            },
        }
    }

    pub fn is_success(&self) -> bool {
        self.custom.error_code == ERROR_CODE_SUCCESS
    }
}

/// Identity of the step and the pipeline it runs in
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BaseData {
    pub step_name: String,
    pub stage_name: String,
    pub pipeline_url_hash: String,
    pub build_url_hash: String,
}

/// Outcome of the step execution
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomData {
    /// Wall-clock duration in milliseconds
    pub duration: String,
    pub error_code: String,
    pub error_category: ErrorCategory,
}

/// Classification of a step failure
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    #[default]
    Undefined,
    Build,
    Compliance,
    Configuration,
    Custom,
    Infrastructure,
    Service,
    Test,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorCategory::Undefined => "undefined",
            ErrorCategory::Build => "build",
            ErrorCategory::Compliance => "compliance",
            ErrorCategory::Configuration => "configuration",
            ErrorCategory::Custom => "custom",
            ErrorCategory::Infrastructure => "infrastructure",
            ErrorCategory::Service => "service",
            ErrorCategory::Test => "test",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for ErrorCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "undefined" => Ok(ErrorCategory::Undefined),
            "build" => Ok(ErrorCategory::Build),
            "compliance" => Ok(ErrorCategory::Compliance),
            "configuration" => Ok(ErrorCategory::Configuration),
            "custom" => Ok(ErrorCategory::Custom),
            "infrastructure" => Ok(ErrorCategory::Infrastructure),
            "service" => Ok(ErrorCategory::Service),
            "test" => Ok(ErrorCategory::Test),
            other => Err(format!("unknown error category: {}", other)),
        }
    }
}

/// Flat telemetry record sent to the collector
///
/// Empty fields are left out of the JSON entirely.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TelemetrySummary {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub pipeline_url_hash: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub build_url_hash: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub stage_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub step_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub exit_code: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub duration: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error_code: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error_category: String,
    #[serde(
        rename = "CorrelationID",
        default,
        skip_serializing_if = "String::is_empty"
    )]
    pub correlation_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub commit_hash: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub branch: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub git_owner: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub git_repository: String,
}

/// Telemetry describing a whole pipeline run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineTelemetry {
    #[serde(
        rename = "PipelineUrlHash",
        default,
        skip_serializing_if = "String::is_empty"
    )]
    pub pipeline_url_hash: String,
    #[serde(
        rename = "BuildUrlHash",
        default,
        skip_serializing_if = "String::is_empty"
    )]
    pub build_url_hash: String,
    #[serde(
        rename = "Orchestrator",
        default,
        skip_serializing_if = "String::is_empty"
    )]
    pub orchestrator: String,
    #[serde(
        rename = "PipelineStartTime",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub start_time: Option<chrono::DateTime<chrono::Utc>>,
    /// Pipeline duration in milliseconds
    #[serde(
        rename = "PipelineDuration",
        default,
        skip_serializing_if = "is_zero"
    )]
    pub duration_ms: u64,
    #[serde(
        rename = "PipelineStatus",
        default,
        skip_serializing_if = "String::is_empty"
    )]
    pub status: String,
    #[serde(
        rename = "ErrorCategory",
        default,
        skip_serializing_if = "String::is_empty"
    )]
    pub error_category: String,
}

fn is_zero(value: &u64) -> bool {
    *value == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_step_defaults_to_failure() {
        let data = TelemetryData::for_step("cloudFoundryDeleteSpace");
        assert_eq!(data.base.step_name, "cloudFoundryDeleteSpace");
        assert_eq!(data.custom.error_code, ERROR_CODE_FAILURE);
        assert!(!data.is_success());
    }

    #[test]
    fn test_summary_uses_collector_keys() {
        let summary = TelemetrySummary {
            pipeline_url_hash: "abc".to_string(),
            step_name: "deploy".to_string(),
            correlation_id: "corr-1".to_string(),
            git_owner: "acme".to_string(),
            ..Default::default()
        };

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["PipelineUrlHash"], "abc");
        assert_eq!(json["StepName"], "deploy");
        assert_eq!(json["CorrelationID"], "corr-1");
        assert_eq!(json["GitOwner"], "acme");
    }

    #[test]
    fn test_summary_omits_empty_fields() {
        let summary = TelemetrySummary {
            error_code: "0".to_string(),
            ..Default::default()
        };

        let json = serde_json::to_value(&summary).unwrap();
        let object = json.as_object().unwrap();
        assert_eq!(object.len(), 1);
        assert_eq!(json["ErrorCode"], "0");
    }

    #[test]
    fn test_pipeline_telemetry_keys() {
        let telemetry = PipelineTelemetry {
            pipeline_url_hash: "p".to_string(),
            duration_ms: 1200,
            status: "SUCCESS".to_string(),
            ..Default::default()
        };

        let json = serde_json::to_value(&telemetry).unwrap();
        assert_eq!(json["PipelineUrlHash"], "p");
        assert_eq!(json["PipelineDuration"], 1200);
        assert_eq!(json["PipelineStatus"], "SUCCESS");
        assert!(json.get("PipelineStartTime").is_none());
        assert!(json.get("Orchestrator").is_none());
    }

    #[test]
    fn test_pipeline_telemetry_omits_zero_duration() {
        let telemetry = PipelineTelemetry {
            status: "ABORTED".to_string(),
            ..Default::default()
        };

        let json = serde_json::to_value(&telemetry).unwrap();
        assert!(json.get("PipelineDuration").is_none());
        assert_eq!(json.as_object().unwrap().len(), 1);
    }

    #[test]
    fn test_error_category_parse() {
        assert_eq!(
            "Infrastructure".parse::<ErrorCategory>(),
            Ok(ErrorCategory::Infrastructure)
        );
        assert!("nonsense".parse::<ErrorCategory>().is_err());
        assert_eq!(ErrorCategory::Configuration.to_string(), "configuration");
    }
}
