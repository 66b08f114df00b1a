//! Compute Engine instances.

use reqwest::Method;
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;
use stratus_core::{CloudAccountRef, Resource, ResourceType};

use crate::client::{GcpClient, ProjectAuth};
use crate::error::GcpError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AggregatedInstanceList {
    #[serde(default)]
    items: BTreeMap<String, InstancesScopedList>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InstancesScopedList {
    #[serde(default)]
    instances: Vec<Instance>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Instance {
    pub name: String,
    pub status: String,
    /// Zone URL, e.g. `.../projects/p/zones/us-central1-a`.
    pub zone: String,
    #[serde(default)]
    pub machine_type: String,
}

/// Every instance of the project across all zones.
pub(crate) async fn list_instances(
    client: &GcpClient,
    auth: &ProjectAuth<'_>,
) -> Result<Vec<Instance>, GcpError> {
    let url = client.compute_url(&format!("projects/{}/aggregated/instances", auth.project_id));
    let mut instances = Vec::new();
    let mut page_token: Option<String> = None;

    loop {
        let mut query = Vec::new();
        if let Some(token) = page_token.take() {
            query.push(("pageToken", token));
        }
        let page: AggregatedInstanceList = client.get(&url, auth, &query).await?;
        for scoped in page.items.into_values() {
            instances.extend(scoped.instances);
        }
        match page.next_page_token.filter(|t| !t.is_empty()) {
            Some(token) => page_token = Some(token),
            None => break,
        }
    }

    Ok(instances)
}

pub(crate) fn to_resource(project: &str, instance: Instance, account: &CloudAccountRef) -> Resource {
    let zone = last_segment(&instance.zone).to_string();
    let machine_type = last_segment(&instance.machine_type).to_string();
    Resource::new(
        format!("{project}/{}", instance.name),
        instance.name.as_str(),
        ResourceType::Vm,
        normalize_status(&instance.status),
        account.clone(),
    )
    .with_region(region_of(&zone))
    .with_settings(json!({
        "zone": zone,
        "machineType": machine_type,
        "nativeStatus": instance.status,
    }))
}

/// POST `projects/{p}/zones/{z}/instances/{n}/start|stop`.
pub(crate) async fn set_running(
    client: &GcpClient,
    auth: &ProjectAuth<'_>,
    project: &str,
    zone: &str,
    name: &str,
    running: bool,
) -> Result<(), GcpError> {
    let verb = if running { "start" } else { "stop" };
    let url = client.compute_url(&format!(
        "projects/{project}/zones/{zone}/instances/{name}/{verb}"
    ));
    client.send(Method::POST, &url, auth, None).await?;
    Ok(())
}

/// Stopped-like Compute states collapse to STOPPED; the rest pass through.
pub(crate) fn normalize_status(status: &str) -> String {
    match status {
        "TERMINATED" | "STOPPED" | "SUSPENDED" => "STOPPED".to_string(),
        other => other.to_string(),
    }
}

fn last_segment(url: &str) -> &str {
    url.rsplit('/').next().unwrap_or(url)
}

/// `us-central1-a` → `us-central1`.
fn region_of(zone: &str) -> String {
    match zone.rsplit_once('-') {
        Some((region, suffix)) if suffix.len() == 1 => region.to_string(),
        _ => zone.to_string(),
    }
}
