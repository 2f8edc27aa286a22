//! Log domain types

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A log line captured during step execution
///
/// Messages are kept in the order they were captured. That order is
/// preserved all the way to the collector, including across batches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogMessage {
    pub time: chrono::DateTime<chrono::Utc>,
    pub level: LogLevel,
    pub message: String,
    /// Structured fields recorded alongside the message
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub data: BTreeMap<String, serde_json::Value>,
}

impl LogMessage {
    /// Creates a message stamped with the current time and no extra fields
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            time: chrono::Utc::now(),
            level,
            message: message.into(),
            data: BTreeMap::new(),
        }
    }

    /// Attaches a structured field to the message
    pub fn with_field(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warning,
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
        };
        write!(f, "{}", s)
    }
}
