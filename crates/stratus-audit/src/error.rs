//! Error types for the audit crate.

use stratus_core::{CloudAccountId, ErrorKind};
use stratus_runtime::{CredentialError, StoreError};
use thiserror::Error;

/// Errors raised by a rule while evaluating an account.
#[derive(Debug, Error)]
pub enum RuleError {
    /// The request could not be sent or timed out.
    #[error("request failed: {0}")]
    Request(String),

    /// The upstream API answered with a non-success status.
    #[error("API returned {status}: {message}")]
    Api { status: u16, message: String },

    /// The credential bag lacks what the rule needs.
    #[error("invalid credentials: {0}")]
    Credentials(String),

    /// The upstream answered with a body we could not interpret.
    #[error("malformed response: {0}")]
    Decode(String),
}

/// Errors surfaced by the rule registry and the audit service.
#[derive(Debug, Error)]
pub enum AuditError {
    /// No rule is registered under this id.
    #[error("rule '{0}' not found")]
    RuleNotFound(String),

    /// No rule is registered under this category.
    #[error("category '{0}' not found")]
    CategoryNotFound(String),

    /// The rule never ran against the account.
    #[error("no result for rule '{rule_id}' on account {account_id}")]
    ResultNotFound {
        rule_id: String,
        account_id: CloudAccountId,
    },

    /// Two rules were registered under the same id.
    #[error("duplicate rule id '{0}'")]
    DuplicateRule(String),

    #[error("credential resolution failed for account {account_id}: {source}")]
    Credentials {
        account_id: CloudAccountId,
        #[source]
        source: CredentialError,
    },

    /// The rule itself failed; its pending row is left in place.
    #[error("rule '{rule_id}' failed: {source}")]
    Rule {
        rule_id: String,
        #[source]
        source: RuleError,
    },

    #[error("persistence failure: {0}")]
    Persistence(#[from] StoreError),
}

impl AuditError {
    /// Classify this error for callers mapping to status codes.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::RuleNotFound(_) | Self::CategoryNotFound(_) | Self::ResultNotFound { .. } => {
                ErrorKind::NotFound
            }
            Self::Credentials {
                source: CredentialError::NotFound(_),
                ..
            } => ErrorKind::NotFound,
            Self::Credentials { .. } | Self::Rule { .. } => ErrorKind::Upstream,
            Self::DuplicateRule(_) => ErrorKind::InvalidState,
            Self::Persistence(_) => ErrorKind::Persistence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            AuditError::RuleNotFound("x".into()).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            AuditError::Rule {
                rule_id: "x".into(),
                source: RuleError::Api {
                    status: 403,
                    message: "forbidden".into(),
                },
            }
            .kind(),
            ErrorKind::Upstream
        );
        assert_eq!(
            AuditError::from(StoreError::LockError).kind(),
            ErrorKind::Persistence
        );
    }
}
