use serde::{Deserialize, Serialize};

// Configuration types shared across all Stratus crates
pub mod config;

pub mod account;
pub mod resource;

pub use account::{CloudAccountId, CloudCredentials};
pub use config::{
    DatabaseConfig, GcpProviderConfig, ObservabilityConfig, ProvidersConfig, RegistryConfig,
    StratusConfig, SyncConfig,
};
pub use resource::{
    CloudAccountRef, DesiredState, GroupId, PowerState, Resource, ResourceFilter, ResourceGroup,
    ResourceId, ResourceType,
};

/// Failure classes shared by every service error in the workspace.
///
/// Callers at the outer edge (HTTP, CLI) map these to their own status
/// codes: `NotFound` → 404, `InvalidState` → 400, anything else → 5xx.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Rule id, category, resource id or group id is unknown.
    NotFound,
    /// A provider API or the account registry failed.
    Upstream,
    /// A store read or write failed.
    Persistence,
    /// No transition is defined for the requested change.
    InvalidState,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound => write!(f, "not_found"),
            Self::Upstream => write!(f, "upstream_failure"),
            Self::Persistence => write!(f, "persistence_failure"),
            Self::InvalidState => write!(f, "invalid_state"),
        }
    }
}
