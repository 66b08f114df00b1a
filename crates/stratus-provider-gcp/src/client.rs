//! Authenticated JSON client shared by the provider and the rules.

use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use stratus_core::{CloudCredentials, GcpProviderConfig};
use tracing::debug;

use crate::error::GcpError;

/// Project and bearer token extracted from an account's credential bag.
pub struct ProjectAuth<'a> {
    pub project_id: &'a str,
    access_token: &'a str,
}

impl<'a> ProjectAuth<'a> {
    pub fn from_credentials(credentials: &'a CloudCredentials) -> Result<Self, GcpError> {
        let project_id = credentials
            .get_str("project_id")
            .filter(|s| !s.is_empty())
            .ok_or_else(|| GcpError::Credentials("missing 'project_id'".to_string()))?;
        let access_token = credentials
            .get_str("access_token")
            .filter(|s| !s.is_empty())
            .ok_or_else(|| GcpError::Credentials("missing 'access_token'".to_string()))?;
        Ok(Self {
            project_id,
            access_token,
        })
    }
}

impl std::fmt::Debug for ProjectAuth<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProjectAuth")
            .field("project_id", &self.project_id)
            .field("access_token", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct GcpClient {
    http: Client,
    config: GcpProviderConfig,
}

impl GcpClient {
    pub fn new(config: GcpProviderConfig) -> Result<Self, GcpError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.timeout_secs.min(10)))
            .build()
            .map_err(|e| GcpError::Request(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &GcpProviderConfig {
        &self.config
    }

    pub(crate) fn compute_url(&self, path: &str) -> String {
        join(&self.config.compute_endpoint, path)
    }

    pub(crate) fn sqladmin_url(&self, path: &str) -> String {
        join(&self.config.sqladmin_endpoint, path)
    }

    pub(crate) fn monitoring_url(&self, path: &str) -> String {
        join(&self.config.monitoring_endpoint, path)
    }

    pub(crate) async fn get<T: DeserializeOwned>(
        &self,
        url: &str,
        auth: &ProjectAuth<'_>,
        query: &[(&str, String)],
    ) -> Result<T, GcpError> {
        let request = self.request(Method::GET, url, auth).query(query);
        read_json(request.send().await?).await
    }

    pub(crate) async fn send(
        &self,
        method: Method,
        url: &str,
        auth: &ProjectAuth<'_>,
        body: Option<&Value>,
    ) -> Result<Value, GcpError> {
        let mut request = self.request(method, url, auth);
        if let Some(body) = body {
            request = request.json(body);
        }
        read_json(request.send().await?).await
    }

    fn request(&self, method: Method, url: &str, auth: &ProjectAuth<'_>) -> RequestBuilder {
        debug!(%method, url, project = auth.project_id, "GCP API call");
        self.http
            .request(method, url)
            .bearer_auth(auth.access_token)
    }
}

fn join(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, GcpError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(GcpError::Api {
            status: status.as_u16(),
            message: error_message(&body),
        });
    }
    response
        .json()
        .await
        .map_err(|e| GcpError::Decode(e.to_string()))
}

/// Google APIs wrap failures as `{"error": {"code": .., "message": ..}}`.
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|json| {
            json.pointer("/error/message")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.to_string())
}
