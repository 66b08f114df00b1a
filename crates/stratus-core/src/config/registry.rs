//! Account registry configuration.

use serde::{Deserialize, Serialize};

use crate::account::CloudCredentials;

/// Where cloud account credentials are resolved from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Base URL of the account registry service.
    #[serde(default)]
    pub url: Option<String>,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Inline accounts, used instead of the registry service when `url` is unset.
    #[serde(default)]
    pub accounts: Vec<CloudCredentials>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_secs: default_timeout_secs(),
            accounts: Vec::new(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    10
}
