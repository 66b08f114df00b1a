//! Overprovisioning rules backed by Cloud Monitoring CPU utilization.

use async_trait::async_trait;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use stratus_audit::{AuditItem, Rule, RuleError, classify_utilization};
use stratus_core::CloudCredentials;

use crate::client::{GcpClient, ProjectAuth};
use crate::monitoring::{self, SQL_CPU_METRIC, TimeSeries, Utilization, VM_CPU_METRIC};

pub const OVERPROVISION: &str = "overprovision";

/// Mean CPU of each Cloud SQL instance over the lookback window.
pub struct SqlCpuUtilizationRule {
    client: GcpClient,
}

impl SqlCpuUtilizationRule {
    pub const ID: &'static str = "gcp-sql-cpu-utilization";

    pub fn new(client: GcpClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Rule for SqlCpuUtilizationRule {
    fn id(&self) -> &str {
        Self::ID
    }

    fn name(&self) -> &str {
        "Cloud SQL CPU utilization"
    }

    fn category(&self) -> &str {
        OVERPROVISION
    }

    async fn execute(&self, credentials: &CloudCredentials) -> Result<Vec<AuditItem>, RuleError> {
        evaluate(&self.client, credentials, SQL_CPU_METRIC, monitoring::sql_instance).await
    }
}

/// Mean CPU of each Compute Engine instance over the lookback window.
pub struct VmCpuUtilizationRule {
    client: GcpClient,
}

impl VmCpuUtilizationRule {
    pub const ID: &'static str = "gcp-vm-cpu-utilization";

    pub fn new(client: GcpClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Rule for VmCpuUtilizationRule {
    fn id(&self) -> &str {
        Self::ID
    }

    fn name(&self) -> &str {
        "Compute Engine CPU utilization"
    }

    fn category(&self) -> &str {
        OVERPROVISION
    }

    async fn execute(&self, credentials: &CloudCredentials) -> Result<Vec<AuditItem>, RuleError> {
        evaluate(&self.client, credentials, VM_CPU_METRIC, monitoring::vm_instance).await
    }
}

/// Every GCP rule, in registration order.
pub fn rules(client: &GcpClient) -> Vec<Arc<dyn Rule>> {
    vec![
        Arc::new(SqlCpuUtilizationRule::new(client.clone())),
        Arc::new(VmCpuUtilizationRule::new(client.clone())),
    ]
}

async fn evaluate(
    client: &GcpClient,
    credentials: &CloudCredentials,
    metric_type: &str,
    instance_of: fn(&TimeSeries) -> Option<String>,
) -> Result<Vec<AuditItem>, RuleError> {
    let auth = ProjectAuth::from_credentials(credentials)?;
    let usage = monitoring::mean_utilization(client, &auth, metric_type, instance_of).await?;
    Ok(to_items(usage))
}

fn to_items(usage: BTreeMap<String, Utilization>) -> Vec<AuditItem> {
    usage
        .into_iter()
        .map(|(instance, u)| {
            let rounded = (u.mean_percent * 100.0).round() / 100.0;
            AuditItem::new(instance, classify_utilization(u.mean_percent)).with_metadata(json!({
                "mean_cpu_percent": rounded,
                "samples": u.samples,
            }))
        })
        .collect()
}
