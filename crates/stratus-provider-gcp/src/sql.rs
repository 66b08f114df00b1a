//! Cloud SQL instances.

use reqwest::Method;
use serde::Deserialize;
use serde_json::json;
use stratus_core::{CloudAccountRef, Resource, ResourceType};

use crate::client::{GcpClient, ProjectAuth};
use crate::error::GcpError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InstancesListResponse {
    #[serde(default)]
    items: Vec<SqlInstance>,
    next_page_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SqlInstance {
    pub name: String,
    pub state: String,
    #[serde(default)]
    pub region: String,
    pub database_version: Option<String>,
    #[serde(default)]
    pub settings: SqlSettings,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SqlSettings {
    pub tier: Option<String>,
    pub activation_policy: Option<String>,
}

pub(crate) async fn list_instances(
    client: &GcpClient,
    auth: &ProjectAuth<'_>,
) -> Result<Vec<SqlInstance>, GcpError> {
    let url = client.sqladmin_url(&format!("projects/{}/instances", auth.project_id));
    let mut instances = Vec::new();
    let mut page_token: Option<String> = None;

    loop {
        let mut query = Vec::new();
        if let Some(token) = page_token.take() {
            query.push(("pageToken", token));
        }
        let page: InstancesListResponse = client.get(&url, auth, &query).await?;
        instances.extend(page.items);
        match page.next_page_token.filter(|t| !t.is_empty()) {
            Some(token) => page_token = Some(token),
            None => break,
        }
    }

    Ok(instances)
}

pub(crate) fn to_resource(project: &str, instance: SqlInstance, account: &CloudAccountRef) -> Resource {
    let status = normalize_status(&instance.state, instance.settings.activation_policy.as_deref());
    Resource::new(
        format!("{project}/{}", instance.name),
        instance.name.as_str(),
        ResourceType::Sql,
        status,
        account.clone(),
    )
    .with_region(instance.region.as_str())
    .with_settings(json!({
        "tier": instance.settings.tier,
        "databaseVersion": instance.database_version,
        "activationPolicy": instance.settings.activation_policy,
        "nativeStatus": instance.state,
    }))
}

/// PATCH `projects/{p}/instances/{n}` with the new activation policy.
///
/// Cloud SQL has no start/stop verbs: `ALWAYS` keeps the instance up,
/// `NEVER` shuts it down.
pub(crate) async fn set_running(
    client: &GcpClient,
    auth: &ProjectAuth<'_>,
    project: &str,
    name: &str,
    running: bool,
) -> Result<(), GcpError> {
    let policy = if running { "ALWAYS" } else { "NEVER" };
    let url = client.sqladmin_url(&format!("projects/{project}/instances/{name}"));
    let body = json!({"settings": {"activationPolicy": policy}});
    client.send(Method::PATCH, &url, auth, Some(&body)).await?;
    Ok(())
}

/// A stopped Cloud SQL instance still reports RUNNABLE; its activation
/// policy says whether it actually serves.
pub(crate) fn normalize_status(state: &str, activation_policy: Option<&str>) -> String {
    match (state, activation_policy) {
        (_, Some("NEVER")) => "STOPPED".to_string(),
        ("RUNNABLE", _) => "RUNNING".to_string(),
        ("STOPPED" | "SUSPENDED", _) => "STOPPED".to_string(),
        (other, _) => other.to_string(),
    }
}
