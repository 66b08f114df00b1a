use async_trait::async_trait;
use stratus_core::{
    CloudAccountRef, CloudCredentials, GcpProviderConfig, Resource, ResourceFilter, ResourceType,
};
use stratus_runtime::{ProviderCapability, ProviderError};
use tracing::debug;

use crate::client::{GcpClient, ProjectAuth};
use crate::error::GcpError;
use crate::{compute, sql};

pub const PROVIDER_NAME: &str = "gcp";

/// Compute Engine VMs and Cloud SQL instances of one project per account.
#[derive(Debug, Clone)]
pub struct GcpProvider {
    client: GcpClient,
}

impl GcpProvider {
    pub fn new(config: GcpProviderConfig) -> Result<Self, GcpError> {
        Ok(Self {
            client: GcpClient::new(config)?,
        })
    }

    pub fn client(&self) -> &GcpClient {
        &self.client
    }

    async fn set_running(
        &self,
        credentials: &CloudCredentials,
        resource: &Resource,
        running: bool,
    ) -> Result<(), ProviderError> {
        let auth = ProjectAuth::from_credentials(credentials)?;
        // uid is "{project}/{name}"
        let project = resource
            .uid
            .split_once('/')
            .map_or(auth.project_id, |(project, _)| project);

        match resource.resource_type {
            ResourceType::Vm => {
                let zone = resource.setting("zone").ok_or_else(|| {
                    ProviderError::Decode(format!("resource {} has no zone setting", resource.uid))
                })?;
                compute::set_running(&self.client, &auth, project, zone, &resource.name, running)
                    .await?;
            }
            ResourceType::Sql => {
                sql::set_running(&self.client, &auth, project, &resource.name, running).await?;
            }
            other => {
                return Err(ProviderError::Unsupported {
                    operation: if running { "start" } else { "stop" },
                    resource_type: other,
                });
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ProviderCapability for GcpProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn supported_types(&self) -> Vec<ResourceType> {
        vec![ResourceType::Sql, ResourceType::Vm]
    }

    async fn list_resources(
        &self,
        credentials: &CloudCredentials,
        filter: &ResourceFilter,
    ) -> Result<Vec<Resource>, ProviderError> {
        let auth = ProjectAuth::from_credentials(credentials)?;
        let account = CloudAccountRef::new(credentials.account_id, PROVIDER_NAME);
        let mut resources = Vec::new();

        if filter.matches(ResourceType::Vm) {
            let instances = compute::list_instances(&self.client, &auth).await?;
            debug!(count = instances.len(), "Listed Compute Engine instances");
            resources.extend(
                instances
                    .into_iter()
                    .map(|i| compute::to_resource(auth.project_id, i, &account)),
            );
        }

        if filter.matches(ResourceType::Sql) {
            let instances = sql::list_instances(&self.client, &auth).await?;
            debug!(count = instances.len(), "Listed Cloud SQL instances");
            resources.extend(
                instances
                    .into_iter()
                    .map(|i| sql::to_resource(auth.project_id, i, &account)),
            );
        }

        Ok(resources)
    }

    async fn start_resource(
        &self,
        credentials: &CloudCredentials,
        resource: &Resource,
    ) -> Result<(), ProviderError> {
        self.set_running(credentials, resource, true).await
    }

    async fn stop_resource(
        &self,
        credentials: &CloudCredentials,
        resource: &Resource,
    ) -> Result<(), ProviderError> {
        self.set_running(credentials, resource, false).await
    }
}
