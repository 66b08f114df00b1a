//! Error types for the Google Cloud provider.

use stratus_audit::RuleError;
use stratus_runtime::ProviderError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GcpError {
    /// `project_id` or `access_token` missing from the credential bag.
    #[error("invalid GCP credentials: {0}")]
    Credentials(String),

    #[error("GCP request failed: {0}")]
    Request(String),

    #[error("GCP API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("malformed GCP response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for GcpError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            Self::Request(e.to_string())
        }
    }
}

impl From<GcpError> for ProviderError {
    fn from(e: GcpError) -> Self {
        match e {
            GcpError::Credentials(m) => ProviderError::Credentials(m),
            GcpError::Request(m) => ProviderError::Request(m),
            GcpError::Api { status, message } => ProviderError::Api { status, message },
            GcpError::Decode(m) => ProviderError::Decode(m),
        }
    }
}

impl From<GcpError> for RuleError {
    fn from(e: GcpError) -> Self {
        match e {
            GcpError::Credentials(m) => RuleError::Credentials(m),
            GcpError::Request(m) => RuleError::Request(m),
            GcpError::Api { status, message } => RuleError::Api { status, message },
            GcpError::Decode(m) => RuleError::Decode(m),
        }
    }
}
