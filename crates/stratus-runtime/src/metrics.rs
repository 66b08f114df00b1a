//! Sync outcome counters.

use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::registry::Registry;

/// Label set shared by the sync counters.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct OutcomeLabels {
    pub outcome: String,
}

impl OutcomeLabels {
    fn of(success: bool) -> Self {
        Self {
            outcome: if success { "success" } else { "failure" }.to_string(),
        }
    }
}

/// Counters reported by the reconciliation service.
///
/// Cloning shares the underlying counters.
#[derive(Clone, Debug, Default)]
pub struct SyncMetrics {
    /// One increment per account sync, labeled by outcome.
    pub account_syncs: Family<OutcomeLabels, Counter>,
    /// One increment per `sync_all` run; `success` only if no account failed.
    pub sync_runs: Family<OutcomeLabels, Counter>,
}

impl SyncMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expose the counters in a Prometheus registry.
    pub fn register(&self, registry: &mut Registry) {
        registry.register(
            "stratus_account_syncs",
            "Per-account resource syncs by outcome",
            self.account_syncs.clone(),
        );
        registry.register(
            "stratus_sync_runs",
            "Full sync runs across all accounts by outcome",
            self.sync_runs.clone(),
        );
    }

    pub fn record_account(&self, success: bool) {
        self.account_syncs
            .get_or_create(&OutcomeLabels::of(success))
            .inc();
    }

    pub fn record_run(&self, success: bool) {
        self.sync_runs.get_or_create(&OutcomeLabels::of(success)).inc();
    }

    pub fn account_syncs(&self, success: bool) -> u64 {
        self.account_syncs
            .get_or_create(&OutcomeLabels::of(success))
            .get()
    }

    pub fn sync_runs(&self, success: bool) -> u64 {
        self.sync_runs.get_or_create(&OutcomeLabels::of(success)).get()
    }
}
