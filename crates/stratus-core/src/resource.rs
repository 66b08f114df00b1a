//! Resource registry types.
//!
//! A [`Resource`] is a cloud object (VM, managed database, ...) tracked by the
//! registry. Its provider-native `uid` is the reconciliation key, its registry
//! `id` is the public identity used everywhere else.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::account::CloudAccountId;

/// Registry-assigned resource identifier.
pub type ResourceId = i64;

/// Registry-assigned resource group identifier.
pub type GroupId = i64;

/// Normalized resource kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceType {
    /// Managed SQL database instance.
    #[serde(rename = "SQL")]
    Sql,
    /// Compute virtual machine.
    #[serde(rename = "VM")]
    Vm,
    /// Managed relational database (AWS RDS).
    #[serde(rename = "RDS")]
    Rds,
}

impl ResourceType {
    pub const ALL: [ResourceType; 3] = [ResourceType::Sql, ResourceType::Vm, ResourceType::Rds];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sql => "SQL",
            Self::Vm => "VM",
            Self::Rds => "RDS",
        }
    }
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "SQL" => Ok(Self::Sql),
            "VM" => Ok(Self::Vm),
            "RDS" => Ok(Self::Rds),
            _ => Err(format!("unknown resource type: {s}")),
        }
    }
}

/// Coarse power state derived from a provider status string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PowerState {
    Running,
    Stopped,
    /// Transitional or provider-specific state (PROVISIONING, MAINTENANCE, ...).
    Other,
}

impl PowerState {
    /// Normalize a free-form provider status.
    pub fn from_status(status: &str) -> Self {
        match status.trim().to_ascii_uppercase().as_str() {
            "RUNNING" | "RUNNABLE" | "AVAILABLE" => Self::Running,
            "STOPPED" | "TERMINATED" | "SUSPENDED" => Self::Stopped,
            _ => Self::Other,
        }
    }

    /// Canonical status string persisted after a state change.
    pub fn as_status(&self) -> &'static str {
        match self {
            Self::Running => "RUNNING",
            Self::Stopped => "STOPPED",
            Self::Other => "UNKNOWN",
        }
    }
}

/// Requested state change for a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DesiredState {
    Start,
    Stop,
}

impl DesiredState {
    /// The power state a resource is in once this change has been applied.
    pub fn target(&self) -> PowerState {
        match self {
            Self::Start => PowerState::Running,
            Self::Stop => PowerState::Stopped,
        }
    }
}

impl std::fmt::Display for DesiredState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Start => write!(f, "START"),
            Self::Stop => write!(f, "STOP"),
        }
    }
}

impl FromStr for DesiredState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "START" => Ok(Self::Start),
            "STOP" => Ok(Self::Stop),
            _ => Err(format!("unknown desired state: {s}")),
        }
    }
}

/// The cloud account a resource belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudAccountRef {
    pub id: CloudAccountId,
    /// Provider name, lowercase (e.g. "gcp").
    pub provider: String,
}

impl CloudAccountRef {
    pub fn new(id: CloudAccountId, provider: impl Into<String>) -> Self {
        Self {
            id,
            provider: provider.into().to_ascii_lowercase(),
        }
    }
}

/// A cloud resource tracked by the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    /// Registry id; `None` for records freshly fetched from a provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ResourceId>,
    /// Provider-native unique identifier, e.g. `"<project>/<instance>"`.
    pub uid: String,
    pub name: String,
    #[serde(rename = "type")]
    pub resource_type: ResourceType,
    /// Provider status string (RUNNING, STOPPED, PROVISIONING, ...).
    pub status: String,
    pub cloud_account: CloudAccountRef,
    #[serde(default)]
    pub region: String,
    /// Opaque provider-specific settings.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub settings: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Resource {
    /// Create an unpersisted resource as observed live.
    pub fn new(
        uid: impl Into<String>,
        name: impl Into<String>,
        resource_type: ResourceType,
        status: impl Into<String>,
        cloud_account: CloudAccountRef,
    ) -> Self {
        Self {
            id: None,
            uid: uid.into(),
            name: name.into(),
            resource_type,
            status: status.into(),
            cloud_account,
            region: String::new(),
            settings: serde_json::Value::Null,
            created_at: None,
            updated_at: None,
        }
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    pub fn with_settings(mut self, settings: serde_json::Value) -> Self {
        self.settings = settings;
        self
    }

    pub fn power_state(&self) -> PowerState {
        PowerState::from_status(&self.status)
    }

    /// Look up a string entry in the settings bag.
    pub fn setting(&self, key: &str) -> Option<&str> {
        self.settings.get(key).and_then(|v| v.as_str())
    }
}

/// Constrains which resource kinds a listing returns. Empty means all.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceFilter {
    #[serde(default)]
    pub types: Vec<ResourceType>,
}

impl ResourceFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn only(resource_type: ResourceType) -> Self {
        Self {
            types: vec![resource_type],
        }
    }

    pub fn matches(&self, resource_type: ResourceType) -> bool {
        self.types.is_empty() || self.types.contains(&resource_type)
    }
}

/// A named collection of resources scoped to one cloud account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceGroup {
    pub id: GroupId,
    pub cloud_account_id: CloudAccountId,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl ResourceGroup {
    /// STOPPED if any member is stopped, RUNNING otherwise.
    pub fn derive_status(members: &[Resource]) -> PowerState {
        if members
            .iter()
            .any(|r| r.power_state() == PowerState::Stopped)
        {
            PowerState::Stopped
        } else {
            PowerState::Running
        }
    }
}
