//! Cloud provider configuration.

use serde::{Deserialize, Serialize};

/// Per-provider configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub gcp: GcpProviderConfig,
}

/// Google Cloud endpoints and tuning.
///
/// Endpoints are overridable so that tests and private API gateways can
/// redirect traffic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GcpProviderConfig {
    /// Compute Engine API root.
    #[serde(default = "default_compute_endpoint")]
    pub compute_endpoint: String,

    /// Cloud SQL Admin API root.
    #[serde(default = "default_sqladmin_endpoint")]
    pub sqladmin_endpoint: String,

    /// Cloud Monitoring API root.
    #[serde(default = "default_monitoring_endpoint")]
    pub monitoring_endpoint: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Window over which utilization rules average CPU usage.
    #[serde(default = "default_lookback_hours")]
    pub utilization_lookback_hours: u32,
}

impl Default for GcpProviderConfig {
    fn default() -> Self {
        Self {
            compute_endpoint: default_compute_endpoint(),
            sqladmin_endpoint: default_sqladmin_endpoint(),
            monitoring_endpoint: default_monitoring_endpoint(),
            timeout_secs: default_timeout_secs(),
            utilization_lookback_hours: default_lookback_hours(),
        }
    }
}

impl GcpProviderConfig {
    /// Point every API at the same base URL.
    pub fn with_base_url(base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        Self {
            compute_endpoint: format!("{base}/compute/v1"),
            sqladmin_endpoint: format!("{base}/sql/v1beta4"),
            monitoring_endpoint: format!("{base}/v3"),
            ..Self::default()
        }
    }
}

fn default_compute_endpoint() -> String {
    "https://compute.googleapis.com/compute/v1".to_string()
}

fn default_sqladmin_endpoint() -> String {
    "https://sqladmin.googleapis.com/sql/v1beta4".to_string()
}

fn default_monitoring_endpoint() -> String {
    "https://monitoring.googleapis.com/v3".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_lookback_hours() -> u32 {
    24
}
