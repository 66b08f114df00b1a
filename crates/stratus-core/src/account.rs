//! Cloud account credentials as resolved from the account registry.

use serde::{Deserialize, Serialize};

/// Registry identifier of a cloud account.
pub type CloudAccountId = i64;

/// Credentials and provider identity of one cloud account.
///
/// Resolved once per reconciliation or audit run and passed by value to every
/// provider call of that run. Never persisted.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct CloudCredentials {
    #[serde(alias = "id")]
    pub account_id: CloudAccountId,
    /// Provider name (e.g. "gcp", "aws").
    pub provider: String,
    /// Opaque provider-specific credential bag.
    #[serde(default)]
    pub credentials: serde_json::Value,
}

impl CloudCredentials {
    pub fn new(
        account_id: CloudAccountId,
        provider: impl Into<String>,
        credentials: serde_json::Value,
    ) -> Self {
        Self {
            account_id,
            provider: provider.into(),
            credentials,
        }
    }

    /// Lowercased provider name, used as the provider registry key.
    pub fn provider_key(&self) -> String {
        self.provider.to_ascii_lowercase()
    }

    /// Look up a string entry in the credential bag.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.credentials.get(key).and_then(|v| v.as_str())
    }
}

impl std::fmt::Debug for CloudCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudCredentials")
            .field("account_id", &self.account_id)
            .field("provider", &self.provider)
            .field("credentials", &"<redacted>")
            .finish()
    }
}
