//! Error types for the reconciliation runtime.

use stratus_core::{CloudAccountId, ErrorKind, GroupId, ResourceId, ResourceType};
use thiserror::Error;

/// Errors raised by resource, group and result stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The addressed row does not exist.
    #[error("record not found: {0}")]
    NotFound(String),

    /// A uniqueness constraint would be violated.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The store returned data violating its read contract.
    #[error("store contract violated: {0}")]
    Contract(String),

    /// Backend failure.
    #[error("database error: {0}")]
    Database(String),

    /// An in-memory lock was poisoned.
    #[error("lock error")]
    LockError,
}

/// Errors raised by provider capability implementations.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The request could not be sent or timed out.
    #[error("provider request failed: {0}")]
    Request(String),

    /// The provider API answered with a non-success status.
    #[error("provider API returned {status}: {message}")]
    Api { status: u16, message: String },

    /// The credential bag is missing required entries.
    #[error("invalid credentials: {0}")]
    Credentials(String),

    /// The operation has no implementation for this resource kind.
    #[error("{operation} is not supported for {resource_type} resources")]
    Unsupported {
        operation: &'static str,
        resource_type: ResourceType,
    },

    /// The provider answered with a body we could not interpret.
    #[error("malformed provider response: {0}")]
    Decode(String),
}

/// Errors raised while resolving cloud account credentials.
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("cloud account {0} not found")]
    NotFound(CloudAccountId),

    #[error("account registry request failed: {0}")]
    Request(String),

    #[error("malformed account registry response: {0}")]
    Decode(String),
}

/// Errors surfaced by the reconciliation and resource group services.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("resource {0} not found")]
    ResourceNotFound(ResourceId),

    #[error("resource group {0} not found")]
    GroupNotFound(GroupId),

    #[error("credential resolution failed for account {account_id}: {source}")]
    Credentials {
        account_id: CloudAccountId,
        #[source]
        source: CredentialError,
    },

    #[error("listing cloud accounts failed: {0}")]
    AccountListing(#[source] CredentialError),

    #[error("provider '{provider}' failed: {source}")]
    Provider {
        provider: String,
        #[source]
        source: ProviderError,
    },

    #[error("no provider registered for '{0}'")]
    UnknownProvider(String),

    #[error("invalid state change: {0}")]
    InvalidState(String),

    #[error("persistence failure: {0}")]
    Persistence(#[from] StoreError),

    #[error("background task failed: {0}")]
    Task(String),
}

impl ReconcileError {
    /// Classify this error for callers mapping to status codes.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ResourceNotFound(_) | Self::GroupNotFound(_) => ErrorKind::NotFound,
            Self::Credentials {
                source: CredentialError::NotFound(_),
                ..
            } => ErrorKind::NotFound,
            Self::Credentials { .. } | Self::AccountListing(_) | Self::Task(_) => {
                ErrorKind::Upstream
            }
            Self::Provider {
                source: ProviderError::Unsupported { .. },
                ..
            } => ErrorKind::InvalidState,
            Self::Provider { .. } => ErrorKind::Upstream,
            Self::UnknownProvider(_) | Self::InvalidState(_) => ErrorKind::InvalidState,
            Self::Persistence(_) => ErrorKind::Persistence,
        }
    }
}

pub type ReconcileResult<T> = Result<T, ReconcileError>;
