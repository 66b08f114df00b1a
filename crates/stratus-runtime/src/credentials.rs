//! Credential resolution.
//!
//! Credentials live in an external account registry. The runtime resolves
//! them once per run and never persists them.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use stratus_core::{CloudAccountId, CloudCredentials, RegistryConfig};
use tracing::debug;

use crate::error::CredentialError;

#[async_trait]
pub trait CredentialResolver: Send + Sync {
    /// Fetch credentials and provider identity of one account.
    async fn get_credentials(
        &self,
        account_id: CloudAccountId,
    ) -> Result<CloudCredentials, CredentialError>;

    /// All known cloud account ids.
    async fn list_account_ids(&self) -> Result<Vec<CloudAccountId>, CredentialError>;
}

/// Resolver over a fixed set of accounts (inline configuration, tests).
#[derive(Debug, Default, Clone)]
pub struct StaticCredentialResolver {
    accounts: BTreeMap<CloudAccountId, CloudCredentials>,
}

impl StaticCredentialResolver {
    pub fn new(accounts: impl IntoIterator<Item = CloudCredentials>) -> Self {
        Self {
            accounts: accounts
                .into_iter()
                .map(|c| (c.account_id, c))
                .collect(),
        }
    }
}

#[async_trait]
impl CredentialResolver for StaticCredentialResolver {
    async fn get_credentials(
        &self,
        account_id: CloudAccountId,
    ) -> Result<CloudCredentials, CredentialError> {
        self.accounts
            .get(&account_id)
            .cloned()
            .ok_or(CredentialError::NotFound(account_id))
    }

    async fn list_account_ids(&self) -> Result<Vec<CloudAccountId>, CredentialError> {
        Ok(self.accounts.keys().copied().collect())
    }
}

#[derive(Debug, Deserialize)]
struct AccountSummary {
    id: CloudAccountId,
}

/// Resolver backed by the account registry HTTP service.
///
/// Endpoints:
/// - `GET {base}/cloud-accounts` → `[{"id": 1, ...}, ...]`
/// - `GET {base}/cloud-accounts/{id}/credentials` → `{"id", "provider", "credentials"}`
#[derive(Debug, Clone)]
pub struct HttpCredentialResolver {
    client: Client,
    base_url: String,
}

impl HttpCredentialResolver {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, CredentialError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CredentialError::Request(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Build a resolver from the `registry` configuration section.
    pub fn from_config(config: &RegistryConfig) -> Result<Self, CredentialError> {
        let url = config
            .url
            .as_deref()
            .ok_or_else(|| CredentialError::Request("registry.url is not set".to_string()))?;
        Self::new(url, Duration::from_secs(config.timeout_secs))
    }
}

#[async_trait]
impl CredentialResolver for HttpCredentialResolver {
    async fn get_credentials(
        &self,
        account_id: CloudAccountId,
    ) -> Result<CloudCredentials, CredentialError> {
        let url = format!("{}/cloud-accounts/{}/credentials", self.base_url, account_id);
        debug!(account_id, "Resolving cloud account credentials");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| CredentialError::Request(e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(CredentialError::NotFound(account_id)),
            status if !status.is_success() => Err(CredentialError::Request(format!(
                "account registry returned {status}"
            ))),
            _ => {
                let credentials: CloudCredentials = response
                    .json()
                    .await
                    .map_err(|e| CredentialError::Decode(e.to_string()))?;
                if credentials.account_id != account_id {
                    return Err(CredentialError::Decode(format!(
                        "requested account {account_id} but registry answered for {}",
                        credentials.account_id
                    )));
                }
                Ok(credentials)
            }
        }
    }

    async fn list_account_ids(&self) -> Result<Vec<CloudAccountId>, CredentialError> {
        let url = format!("{}/cloud-accounts", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| CredentialError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(CredentialError::Request(format!(
                "account registry returned {}",
                response.status()
            )));
        }

        let accounts: Vec<AccountSummary> = response
            .json()
            .await
            .map_err(|e| CredentialError::Decode(e.to_string()))?;
        Ok(accounts.into_iter().map(|a| a.id).collect())
    }
}
