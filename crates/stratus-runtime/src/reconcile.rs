//! Reconciliation service.
//!
//! Converges the persisted resource registry of a cloud account to the live
//! inventory reported by its provider:
//!
//! 1. resolve credentials,
//! 2. list every supported resource kind concurrently while reading the
//!    stored resources (sorted by uid),
//! 3. merge-diff the two ([`plan_diff`]) and apply the plan,
//! 4. return a fresh read of the registry.
//!
//! A failed live listing aborts the account before any write. Individual
//! write failures are logged and skipped.

use std::collections::HashMap;
use std::sync::Arc;
use stratus_core::{
    CloudAccountId, CloudAccountRef, CloudCredentials, DesiredState, Resource, ResourceFilter,
    ResourceId,
};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::credentials::CredentialResolver;
use crate::diff::{DiffPlan, plan_diff};
use crate::error::{ProviderError, ReconcileError, ReconcileResult, StoreError};
use crate::metrics::SyncMetrics;
use crate::provider::{ProviderCapability, ProviderRegistry};
use crate::store::ResourceStore;

/// A single account that failed during [`ReconciliationService::sync_all`].
#[derive(Debug)]
pub struct SyncFailure {
    pub account_id: CloudAccountId,
    pub error: ReconcileError,
}

/// Outcome of a full sync run.
#[derive(Debug, Default)]
pub struct SyncSummary {
    /// Accounts that converged, in completion order.
    pub succeeded: Vec<CloudAccountId>,
    pub failures: Vec<SyncFailure>,
}

impl SyncSummary {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct ReconciliationService {
    resolver: Arc<dyn CredentialResolver>,
    providers: ProviderRegistry,
    store: Arc<dyn ResourceStore>,
    metrics: SyncMetrics,
}

impl ReconciliationService {
    pub fn new(
        resolver: Arc<dyn CredentialResolver>,
        providers: ProviderRegistry,
        store: Arc<dyn ResourceStore>,
    ) -> Self {
        Self {
            resolver,
            providers,
            store,
            metrics: SyncMetrics::new(),
        }
    }

    /// Report sync outcomes into `metrics` instead of a private set of counters.
    pub fn with_metrics(mut self, metrics: SyncMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> &SyncMetrics {
        &self.metrics
    }

    pub fn store(&self) -> &Arc<dyn ResourceStore> {
        &self.store
    }

    /// Converge the registry of one account and return its committed view.
    pub async fn sync_one(&self, account_id: CloudAccountId) -> ReconcileResult<Vec<Resource>> {
        let run_id = Uuid::new_v4();
        let span = info_span!("sync_one", account_id, %run_id);
        self.sync_account(account_id).instrument(span).await
    }

    /// Sync every known account concurrently.
    ///
    /// Only a failure to enumerate accounts is returned as an error; per-account
    /// failures are collected in the summary without aborting siblings.
    pub async fn sync_all(self: &Arc<Self>) -> ReconcileResult<SyncSummary> {
        let account_ids = match self.resolver.list_account_ids().await {
            Ok(ids) => ids,
            Err(e) => {
                error!(error = %e, "Failed to enumerate cloud accounts");
                self.metrics.record_run(false);
                return Err(ReconcileError::AccountListing(e));
            }
        };

        info!(accounts = account_ids.len(), "Starting sync of all cloud accounts");

        let mut tasks = JoinSet::new();
        let mut task_accounts = HashMap::with_capacity(account_ids.len());
        for account_id in account_ids {
            let service = Arc::clone(self);
            let handle = tasks.spawn(async move {
                let result = service.sync_one(account_id).await;
                (account_id, result)
            });
            task_accounts.insert(handle.id(), account_id);
        }

        let mut summary = SyncSummary::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((account_id, Ok(_))) => {
                    self.metrics.record_account(true);
                    summary.succeeded.push(account_id);
                }
                Ok((account_id, Err(error))) => {
                    warn!(account_id, error = %error, "Account sync failed");
                    self.metrics.record_account(false);
                    summary.failures.push(SyncFailure { account_id, error });
                }
                Err(join_error) => {
                    let Some(&account_id) = task_accounts.get(&join_error.id()) else {
                        error!(error = %join_error, "Sync task failed for an untracked account");
                        continue;
                    };
                    error!(account_id, error = %join_error, "Account sync task panicked");
                    self.metrics.record_account(false);
                    summary.failures.push(SyncFailure {
                        account_id,
                        error: ReconcileError::Task(join_error.to_string()),
                    });
                }
            }
        }

        self.metrics.record_run(summary.is_success());
        info!(
            succeeded = summary.succeeded.len(),
            failed = summary.failures.len(),
            "Sync of all cloud accounts finished"
        );
        Ok(summary)
    }

    /// Stored resources of an account, sorted by uid. No provider call.
    pub async fn list_resources(
        &self,
        account_id: CloudAccountId,
        filter: &ResourceFilter,
    ) -> ReconcileResult<Vec<Resource>> {
        Ok(self.store.get_resources(account_id, filter).await?)
    }

    /// Start or stop a resource through its provider.
    ///
    /// A resource already in the requested state is left alone: no credential
    /// lookup, no provider call, no write.
    pub async fn change_state(
        &self,
        resource_id: ResourceId,
        desired: DesiredState,
    ) -> ReconcileResult<()> {
        let resource = self
            .store
            .get_resource_by_id(resource_id)
            .await?
            .ok_or(ReconcileError::ResourceNotFound(resource_id))?;

        let target = desired.target();
        if resource.power_state() == target {
            debug!(resource_id, status = %resource.status, "Resource already in requested state");
            return Ok(());
        }

        let credentials = self.resolve(resource.cloud_account.id).await?;
        let provider = self.provider_for(&credentials)?;

        info!(
            resource_id,
            uid = %resource.uid,
            action = %desired,
            provider = provider.name(),
            "Changing resource state"
        );

        let outcome = match desired {
            DesiredState::Start => provider.start_resource(&credentials, &resource).await,
            DesiredState::Stop => provider.stop_resource(&credentials, &resource).await,
        };
        outcome.map_err(|source| ReconcileError::Provider {
            provider: provider.name().to_string(),
            source,
        })?;

        self.store
            .update_status(resource_id, target.as_status())
            .await?;
        Ok(())
    }

    async fn sync_account(&self, account_id: CloudAccountId) -> ReconcileResult<Vec<Resource>> {
        let credentials = self.resolve(account_id).await?;
        let provider = self.provider_for(&credentials)?;
        let kinds = ResourceFilter {
            types: provider.supported_types(),
        };

        let (live, stored) = tokio::join!(
            fetch_live(Arc::clone(&provider), &credentials),
            self.store.get_resources(account_id, &kinds)
        );

        let live = live.inspect_err(|e| {
            error!(error = %e, "Live inventory fetch failed, aborting account sync");
        })?;
        let stored = stored?;

        if !stored.is_sorted_by(|a, b| a.uid <= b.uid) {
            error!("Stored resources are not sorted by uid, refusing to diff");
            return Err(StoreError::Contract(format!(
                "get_resources for account {account_id} returned resources out of uid order"
            ))
            .into());
        }

        let plan = plan_diff(live, &stored);
        debug!(
            inserts = plan.inserts.len(),
            updates = plan.updates.len(),
            removals = plan.removals.len(),
            matched = plan.matched.len(),
            "Computed reconciliation plan"
        );
        if !plan.is_noop() {
            self.apply_plan(plan).await;
        }

        Ok(self.store.get_resources(account_id, &kinds).await?)
    }

    async fn apply_plan(&self, plan: DiffPlan) {
        let mut failed = 0usize;

        for resource in &plan.inserts {
            match self.store.insert_resource(resource).await {
                Ok(stored) => debug!(uid = %stored.uid, resource_id = ?stored.id, "Inserted resource"),
                Err(e) => {
                    failed += 1;
                    warn!(uid = %resource.uid, error = %e, "Failed to insert resource");
                }
            }
        }

        for update in &plan.updates {
            if let Err(e) = self.store.update_status(update.id, &update.status).await {
                failed += 1;
                warn!(resource_id = update.id, uid = %update.uid, error = %e, "Failed to update resource status");
            }
        }

        for stale in &plan.removals {
            let Some(id) = stale.id else { continue };
            if let Err(e) = self.store.remove_resource(id).await {
                failed += 1;
                warn!(resource_id = id, uid = %stale.uid, error = %e, "Failed to remove stale resource");
            }
        }

        info!(
            inserted = plan.inserts.len(),
            updated = plan.updates.len(),
            removed = plan.removals.len(),
            failed,
            "Applied reconciliation plan"
        );
    }

    pub(crate) async fn resolve(
        &self,
        account_id: CloudAccountId,
    ) -> ReconcileResult<CloudCredentials> {
        self.resolver
            .get_credentials(account_id)
            .await
            .map_err(|source| ReconcileError::Credentials { account_id, source })
    }

    fn provider_for(
        &self,
        credentials: &CloudCredentials,
    ) -> ReconcileResult<Arc<dyn ProviderCapability>> {
        self.providers
            .get(&credentials.provider)
            .ok_or_else(|| ReconcileError::UnknownProvider(credentials.provider_key()))
    }
}

/// List every kind the provider supports, one task per kind.
///
/// Results come back over a channel sized to the number of kinds and are
/// drained exactly that many times. The first error is returned after all
/// tasks have reported. The tasks belong to a local `JoinSet`, so dropping
/// this future aborts listings still in flight.
async fn fetch_live(
    provider: Arc<dyn ProviderCapability>,
    credentials: &CloudCredentials,
) -> ReconcileResult<Vec<Resource>> {
    let kinds = provider.supported_types();
    if kinds.is_empty() {
        return Ok(Vec::new());
    }

    let (tx, mut rx) = mpsc::channel(kinds.len());
    let mut tasks = JoinSet::new();
    for kind in kinds.iter().copied() {
        let tx = tx.clone();
        let provider = Arc::clone(&provider);
        let credentials = credentials.clone();
        tasks.spawn(
            async move {
                let result = provider
                    .list_resources(&credentials, &ResourceFilter::only(kind))
                    .await;
                // Receiver gone means the sync was cancelled
                let _ = tx.send((kind, result)).await;
            }
            .in_current_span(),
        );
    }
    drop(tx);

    let account = CloudAccountRef::new(credentials.account_id, credentials.provider_key());
    let mut live = Vec::new();
    let mut first_error: Option<ReconcileError> = None;

    for _ in 0..kinds.len() {
        match rx.recv().await {
            Some((kind, Ok(resources))) => {
                debug!(kind = %kind, count = resources.len(), "Listed live resources");
                live.extend(
                    resources
                        .into_iter()
                        .filter(|r| r.resource_type == kind)
                        .map(|mut r| {
                            r.id = None;
                            r.cloud_account = account.clone();
                            r
                        }),
                );
            }
            Some((kind, Err(source))) => {
                warn!(kind = %kind, error = %source, "Live listing failed");
                first_error.get_or_insert(provider_error(provider.as_ref(), source));
            }
            None => {
                first_error.get_or_insert(ReconcileError::Task(
                    "a live listing task ended without reporting".to_string(),
                ));
                break;
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(live),
    }
}

fn provider_error(provider: &dyn ProviderCapability, source: ProviderError) -> ReconcileError {
    ReconcileError::Provider {
        provider: provider.name().to_string(),
        source,
    }
}
