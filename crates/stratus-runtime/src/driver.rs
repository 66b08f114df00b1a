//! Periodic sync driver.

use std::sync::Arc;
use std::time::Duration;
use stratus_core::SyncConfig;
use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{error, info, warn};

use crate::reconcile::{ReconciliationService, SyncSummary};

/// Runs [`ReconciliationService::sync_all`] on a fixed period until cancelled.
///
/// Runs never overlap: a tick that fires while a run is in progress is
/// delayed until the run finishes.
pub struct SyncDriver {
    service: Arc<ReconciliationService>,
    period: Duration,
    run_on_start: bool,
}

impl SyncDriver {
    pub fn new(service: Arc<ReconciliationService>, period: Duration) -> Self {
        Self {
            service,
            period,
            run_on_start: true,
        }
    }

    pub fn from_config(service: Arc<ReconciliationService>, config: &SyncConfig) -> Self {
        Self::new(service, Duration::from_secs(config.interval_secs))
            .with_run_on_start(config.run_on_start)
    }

    /// Whether the first run happens immediately or after one period.
    #[must_use]
    pub fn with_run_on_start(mut self, run_on_start: bool) -> Self {
        self.run_on_start = run_on_start;
        self
    }

    /// Loop until `cancel` flips to `true` or its sender is dropped.
    pub async fn run(self, mut cancel: watch::Receiver<bool>) {
        info!(
            interval_secs = self.period.as_secs(),
            run_on_start = self.run_on_start,
            "Sync driver started"
        );

        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        if !self.run_on_start {
            // The first tick completes immediately
            ticker.tick().await;
        }

        loop {
            if *cancel.borrow() {
                break;
            }

            tokio::select! {
                _ = ticker.tick() => {
                    self.run_once().await;
                }
                changed = cancel.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!("Sync driver stopped");
    }

    /// One full sync run. Failures are logged, never propagated.
    pub async fn run_once(&self) -> Option<SyncSummary> {
        match self.service.sync_all().await {
            Ok(summary) => {
                for failure in &summary.failures {
                    warn!(
                        account_id = failure.account_id,
                        error = %failure.error,
                        "Account left unsynced this run"
                    );
                }
                Some(summary)
            }
            Err(e) => {
                error!(error = %e, "Sync run failed");
                None
            }
        }
    }
}
