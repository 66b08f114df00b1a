//! Audit result types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stratus_core::CloudAccountId;

/// Registry id of a persisted audit result.
pub type ResultId = i64;

/// Lifecycle of a result row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultState {
    /// Row written before the rule ran; no findings yet.
    Pending,
    /// Rule finished and its findings were stored.
    Evaluated,
}

impl std::fmt::Display for ResultState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Evaluated => write!(f, "evaluated"),
        }
    }
}

impl std::str::FromStr for ResultState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "evaluated" => Ok(Self::Evaluated),
            _ => Err(format!("unknown result state: {s}")),
        }
    }
}

/// Severity of a single finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Compliant,
    Warning,
    Danger,
}

/// One finding of a rule: an instance and how it scored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditItem {
    pub instance: String,
    pub status: Classification,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl AuditItem {
    pub fn new(instance: impl Into<String>, status: Classification) -> Self {
        Self {
            instance: instance.into(),
            status,
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// One evaluation of one rule against one cloud account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ResultId>,
    pub cloud_account_id: CloudAccountId,
    pub rule_id: String,
    pub evaluated_at: DateTime<Utc>,
    pub state: ResultState,
    #[serde(default)]
    pub data: Vec<AuditItem>,
}

impl AuditResult {
    /// A not-yet-persisted pending result stamped with the current time.
    pub fn pending(cloud_account_id: CloudAccountId, rule_id: impl Into<String>) -> Self {
        Self {
            id: None,
            cloud_account_id,
            rule_id: rule_id.into(),
            evaluated_at: Utc::now(),
            state: ResultState::Pending,
            data: Vec::new(),
        }
    }

    /// Transition to `Evaluated` carrying `items`.
    pub fn evaluated(mut self, items: Vec<AuditItem>) -> Self {
        self.state = ResultState::Evaluated;
        self.data = items;
        self
    }

    pub fn is_pending(&self) -> bool {
        self.state == ResultState::Pending
    }

    /// Count of findings per classification: (compliant, warning, danger).
    pub fn tally(&self) -> (usize, usize, usize) {
        self.data
            .iter()
            .fold((0, 0, 0), |(c, w, d), item| match item.status {
                Classification::Compliant => (c + 1, w, d),
                Classification::Warning => (c, w + 1, d),
                Classification::Danger => (c, w, d + 1),
            })
    }
}

/// Classify a mean CPU utilization percentage.
///
/// Both ends of the range are a problem: under 20% the instance is
/// oversized, above 90% it is saturated.
pub fn classify_utilization(percent: f64) -> Classification {
    if percent <= 20.0 {
        Classification::Danger
    } else if percent <= 70.0 {
        Classification::Compliant
    } else if percent <= 90.0 {
        Classification::Warning
    } else {
        Classification::Danger
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utilization_bands() {
        assert_eq!(classify_utilization(0.0), Classification::Danger);
        assert_eq!(classify_utilization(20.0), Classification::Danger);
        assert_eq!(classify_utilization(20.5), Classification::Compliant);
        assert_eq!(classify_utilization(70.0), Classification::Compliant);
        assert_eq!(classify_utilization(85.0), Classification::Warning);
        assert_eq!(classify_utilization(90.0), Classification::Warning);
        assert_eq!(classify_utilization(97.3), Classification::Danger);
    }

    #[test]
    fn test_pending_to_evaluated() {
        let pending = AuditResult::pending(3, "gcp-sql-cpu");
        assert!(pending.is_pending());
        assert!(pending.data.is_empty());

        let done = pending.clone().evaluated(vec![
            AuditItem::new("db-1", Classification::Compliant),
            AuditItem::new("db-2", Classification::Danger),
            AuditItem::new("db-3", Classification::Danger),
        ]);
        assert_eq!(done.state, ResultState::Evaluated);
        assert_eq!(done.evaluated_at, pending.evaluated_at);
        assert_eq!(done.tally(), (1, 0, 2));
    }

    #[test]
    fn test_serialized_shape() {
        let item = AuditItem::new("vm-1", Classification::Warning)
            .with_metadata(serde_json::json!({"mean_cpu_percent": 81.2}));
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["status"], "warning");
        assert_eq!(json["metadata"]["mean_cpu_percent"], 81.2);

        let state: ResultState = "evaluated".parse().unwrap();
        assert_eq!(state.to_string(), "evaluated");
    }
}
