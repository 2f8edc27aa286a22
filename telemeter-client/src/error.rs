//! Error types for the collector client

use reqwest::StatusCode;
use thiserror::Error;

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors that can occur when talking to the collector
#[derive(Debug, Error)]
pub enum ClientError {
    /// The request never produced a response (connection, TLS, timeout)
    #[error("error sending the request to the collector: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// The collector answered with something other than 200
    #[error("{status}: collector logging failed - {body}")]
    Rejected {
        /// HTTP status returned by the collector
        status: StatusCode,
        /// First bytes of the response body
        body: String,
    },

    /// The collector rejected the request and its body could not be read
    #[error("{status}: collector logging failed, error reading response body: {source}")]
    DiagnosticRead {
        status: StatusCode,
        #[source]
        source: reqwest::Error,
    },

    /// The client could not be built from the given options
    #[error("invalid collector configuration: {0}")]
    Configuration(String),
}

impl ClientError {
    /// Create a rejection error from status code and diagnostic body
    pub fn rejected(status: StatusCode, body: impl Into<String>) -> Self {
        Self::Rejected {
            status,
            body: body.into(),
        }
    }

    /// Status code returned by the collector, if a response was received
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Rejected { status, .. } | Self::DiagnosticRead { status, .. } => Some(*status),
            Self::RequestFailed(e) => e.status(),
            Self::Configuration(_) => None,
        }
    }

    /// Check if this error is a client error (4xx status)
    pub fn is_client_error(&self) -> bool {
        self.status().is_some_and(|s| s.is_client_error())
    }

    /// Check if this error is a server error (5xx status)
    pub fn is_server_error(&self) -> bool {
        self.status().is_some_and(|s| s.is_server_error())
    }

    /// Whether sending the same request again may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RequestFailed(_) => true,
            Self::Rejected { .. } | Self::DiagnosticRead { .. } => self.is_server_error(),
            Self::Configuration(_) => false,
        }
    }
}
