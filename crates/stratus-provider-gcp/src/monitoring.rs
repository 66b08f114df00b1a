//! Cloud Monitoring time series reads.

use chrono::{Duration, SecondsFormat, Utc};
use serde::Deserialize;
use std::collections::BTreeMap;

use crate::client::{GcpClient, ProjectAuth};
use crate::error::GcpError;

pub(crate) const SQL_CPU_METRIC: &str = "cloudsql.googleapis.com/database/cpu/utilization";
pub(crate) const VM_CPU_METRIC: &str = "compute.googleapis.com/instance/cpu/utilization";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListTimeSeriesResponse {
    #[serde(default)]
    time_series: Vec<TimeSeries>,
    next_page_token: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct TimeSeries {
    #[serde(default)]
    pub metric: Labeled,
    #[serde(default)]
    pub resource: Labeled,
    #[serde(default)]
    pub points: Vec<Point>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct Labeled {
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Point {
    pub value: TypedValue,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TypedValue {
    pub double_value: Option<f64>,
}

/// Mean of a utilization metric per instance over the lookback window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Utilization {
    /// Mean utilization, 0-100.
    pub mean_percent: f64,
    pub samples: usize,
}

/// Read `metric_type` over the configured lookback and average it per
/// instance. `instance_of` names the instance a series belongs to; series it
/// cannot name are skipped.
pub(crate) async fn mean_utilization(
    client: &GcpClient,
    auth: &ProjectAuth<'_>,
    metric_type: &str,
    instance_of: fn(&TimeSeries) -> Option<String>,
) -> Result<BTreeMap<String, Utilization>, GcpError> {
    let url = client.monitoring_url(&format!("projects/{}/timeSeries", auth.project_id));
    let end = Utc::now();
    let start = end - Duration::hours(i64::from(client.config().utilization_lookback_hours));

    let base_query = vec![
        ("filter", format!("metric.type = \"{metric_type}\"")),
        ("interval.startTime", start.to_rfc3339_opts(SecondsFormat::Secs, true)),
        ("interval.endTime", end.to_rfc3339_opts(SecondsFormat::Secs, true)),
        ("aggregation.alignmentPeriod", "3600s".to_string()),
        ("aggregation.perSeriesAligner", "ALIGN_MEAN".to_string()),
    ];

    let mut sums: BTreeMap<String, (f64, usize)> = BTreeMap::new();
    let mut page_token: Option<String> = None;

    loop {
        let mut query = base_query.clone();
        if let Some(token) = page_token.take() {
            query.push(("pageToken", token));
        }
        let page: ListTimeSeriesResponse = client.get(&url, auth, &query).await?;

        for series in &page.time_series {
            let Some(instance) = instance_of(series) else {
                continue;
            };
            let entry = sums.entry(instance).or_insert((0.0, 0));
            for value in series.points.iter().filter_map(|p| p.value.double_value) {
                entry.0 += value;
                entry.1 += 1;
            }
        }

        match page.next_page_token.filter(|t| !t.is_empty()) {
            Some(token) => page_token = Some(token),
            None => break,
        }
    }

    Ok(sums
        .into_iter()
        .filter(|(_, (_, count))| *count > 0)
        .map(|(instance, (sum, count))| {
            (
                instance,
                Utilization {
                    mean_percent: sum / count as f64 * 100.0,
                    samples: count,
                },
            )
        })
        .collect())
}

/// `database_id` is `project:instance`.
pub(crate) fn sql_instance(series: &TimeSeries) -> Option<String> {
    let id = series.resource.labels.get("database_id")?;
    Some(id.rsplit(':').next().unwrap_or(id).to_string())
}

pub(crate) fn vm_instance(series: &TimeSeries) -> Option<String> {
    series
        .metric
        .labels
        .get("instance_name")
        .or_else(|| series.resource.labels.get("instance_id"))
        .cloned()
}
