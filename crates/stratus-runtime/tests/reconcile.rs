//! Integration tests for the reconciliation service, the group service and
//! the periodic driver, over in-memory stores and a scripted provider.
//!
//! Run with: cargo test --package stratus-runtime --test reconcile

use async_trait::async_trait;
use serde_json::json;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use stratus_core::{
    CloudAccountId, CloudAccountRef, CloudCredentials, DesiredState, ErrorKind, PowerState,
    Resource, ResourceFilter, ResourceId, ResourceType,
};
use stratus_runtime::{
    GroupStore, MemoryGroupStore, MemoryResourceStore, ProviderCapability, ProviderError,
    ProviderRegistry, ReconcileError, ReconciliationService, ResourceGroupService, ResourceStore,
    StaticCredentialResolver, StoreError, SyncDriver,
};

/// Provider whose live inventory is set by the test.
#[derive(Default)]
struct ScriptedProvider {
    live: Mutex<Vec<Resource>>,
    failing_kind: Mutex<Option<ResourceType>>,
    listing_delay: Mutex<Option<Duration>>,
    listings_done: AtomicUsize,
    state_calls: AtomicUsize,
}

impl ScriptedProvider {
    fn set_live(&self, resources: Vec<Resource>) {
        *self.live.lock().unwrap() = resources;
    }

    fn fail_listing(&self, kind: ResourceType) {
        *self.failing_kind.lock().unwrap() = Some(kind);
    }

    fn delay_listings(&self, delay: Duration) {
        *self.listing_delay.lock().unwrap() = Some(delay);
    }

    fn listings_done(&self) -> usize {
        self.listings_done.load(Ordering::SeqCst)
    }

    fn state_calls(&self) -> usize {
        self.state_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderCapability for ScriptedProvider {
    fn name(&self) -> &str {
        "gcp"
    }

    fn supported_types(&self) -> Vec<ResourceType> {
        vec![ResourceType::Sql, ResourceType::Vm]
    }

    async fn list_resources(
        &self,
        _credentials: &CloudCredentials,
        filter: &ResourceFilter,
    ) -> Result<Vec<Resource>, ProviderError> {
        let delay = *self.listing_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.listings_done.fetch_add(1, Ordering::SeqCst);
        if let Some(kind) = *self.failing_kind.lock().unwrap() {
            if filter.matches(kind) {
                return Err(ProviderError::Api {
                    status: 503,
                    message: "backend unavailable".to_string(),
                });
            }
        }
        Ok(self
            .live
            .lock()
            .unwrap()
            .iter()
            .filter(|r| filter.matches(r.resource_type))
            .cloned()
            .collect())
    }

    async fn start_resource(
        &self,
        _credentials: &CloudCredentials,
        _resource: &Resource,
    ) -> Result<(), ProviderError> {
        self.state_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn stop_resource(
        &self,
        _credentials: &CloudCredentials,
        _resource: &Resource,
    ) -> Result<(), ProviderError> {
        self.state_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Memory store that rejects inserts of selected uids.
struct FlakyStore {
    inner: MemoryResourceStore,
    reject: HashSet<String>,
}

#[async_trait]
impl ResourceStore for FlakyStore {
    async fn insert_resource(&self, resource: &Resource) -> Result<Resource, StoreError> {
        if self.reject.contains(&resource.uid) {
            return Err(StoreError::Database("connection reset".to_string()));
        }
        self.inner.insert_resource(resource).await
    }

    async fn get_resources(
        &self,
        account_id: CloudAccountId,
        filter: &ResourceFilter,
    ) -> Result<Vec<Resource>, StoreError> {
        self.inner.get_resources(account_id, filter).await
    }

    async fn update_status(&self, id: ResourceId, status: &str) -> Result<(), StoreError> {
        self.inner.update_status(id, status).await
    }

    async fn remove_resource(&self, id: ResourceId) -> Result<(), StoreError> {
        self.inner.remove_resource(id).await
    }

    async fn get_resource_by_id(&self, id: ResourceId) -> Result<Option<Resource>, StoreError> {
        self.inner.get_resource_by_id(id).await
    }
}

/// Memory store whose read path breaks the uid ordering contract.
struct ReversedStore(Arc<MemoryResourceStore>);

#[async_trait]
impl ResourceStore for ReversedStore {
    async fn insert_resource(&self, resource: &Resource) -> Result<Resource, StoreError> {
        self.0.insert_resource(resource).await
    }

    async fn get_resources(
        &self,
        account_id: CloudAccountId,
        filter: &ResourceFilter,
    ) -> Result<Vec<Resource>, StoreError> {
        let mut resources = self.0.get_resources(account_id, filter).await?;
        resources.reverse();
        Ok(resources)
    }

    async fn update_status(&self, id: ResourceId, status: &str) -> Result<(), StoreError> {
        self.0.update_status(id, status).await
    }

    async fn remove_resource(&self, id: ResourceId) -> Result<(), StoreError> {
        self.0.remove_resource(id).await
    }

    async fn get_resource_by_id(&self, id: ResourceId) -> Result<Option<Resource>, StoreError> {
        self.0.get_resource_by_id(id).await
    }
}

const ACCOUNT: CloudAccountId = 1;

fn vm(uid: &str, status: &str) -> Resource {
    // Account tag is deliberately wrong: the engine retags live records
    Resource::new(uid, uid, ResourceType::Vm, status, CloudAccountRef::new(99, "other"))
}

fn sql(uid: &str, status: &str) -> Resource {
    Resource::new(uid, uid, ResourceType::Sql, status, CloudAccountRef::new(99, "other"))
}

fn gcp_account(id: CloudAccountId) -> CloudCredentials {
    CloudCredentials::new(id, "GCP", json!({"project_id": "p", "access_token": "t"}))
}

struct Harness {
    provider: Arc<ScriptedProvider>,
    store: Arc<MemoryResourceStore>,
    service: Arc<ReconciliationService>,
}

fn harness() -> Harness {
    let provider = Arc::new(ScriptedProvider::default());
    let store = Arc::new(MemoryResourceStore::new());
    let service = service_over(provider.clone(), store.clone(), vec![gcp_account(ACCOUNT)]);
    Harness {
        provider,
        store,
        service,
    }
}

fn service_over(
    provider: Arc<ScriptedProvider>,
    store: Arc<dyn ResourceStore>,
    accounts: Vec<CloudCredentials>,
) -> Arc<ReconciliationService> {
    Arc::new(ReconciliationService::new(
        Arc::new(StaticCredentialResolver::new(accounts)),
        ProviderRegistry::new().with_provider(provider),
        store,
    ))
}

async fn seed(store: &MemoryResourceStore, uid: &str, status: &str) -> ResourceId {
    let resource = Resource::new(
        uid,
        uid,
        ResourceType::Vm,
        status,
        CloudAccountRef::new(ACCOUNT, "gcp"),
    );
    store.insert_resource(&resource).await.unwrap().id.unwrap()
}

fn uids(resources: &[Resource]) -> Vec<&str> {
    resources.iter().map(|r| r.uid.as_str()).collect()
}

#[tokio::test]
async fn test_sync_inserts_live_inventory_tagged_with_account() {
    let h = harness();
    h.provider
        .set_live(vec![vm("p/web", "RUNNING"), sql("p/db", "RUNNABLE")]);

    let synced = h.service.sync_one(ACCOUNT).await.unwrap();

    assert_eq!(uids(&synced), vec!["p/db", "p/web"]);
    assert!(synced.iter().all(|r| r.id.is_some()));
    assert!(synced
        .iter()
        .all(|r| r.cloud_account == CloudAccountRef::new(ACCOUNT, "gcp")));
}

#[tokio::test]
async fn test_second_sync_without_cloud_change_is_a_noop() {
    let h = harness();
    h.provider.set_live(vec![
        vm("p/c", "RUNNING"),
        vm("p/a", "STOPPED"),
        sql("p/b", "RUNNABLE"),
    ]);

    let first = h.service.sync_one(ACCOUNT).await.unwrap();
    let writes_after_first = h.store.writes();
    assert_eq!(writes_after_first, 3);

    let second = h.service.sync_one(ACCOUNT).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(h.store.writes(), writes_after_first);
    assert_eq!(h.store.len(), 3);
}

#[tokio::test]
async fn test_update_remove_insert_scenario() {
    let h = harness();
    let a = seed(&h.store, "a", "STOPPED").await;
    seed(&h.store, "c", "RUNNING").await;
    h.provider.set_live(vec![vm("a", "RUNNING"), vm("b", "RUNNING")]);

    let synced = h.service.sync_one(ACCOUNT).await.unwrap();

    assert_eq!(uids(&synced), vec!["a", "b"]);
    assert_eq!(synced[0].id, Some(a));
    assert_eq!(synced[0].status, "RUNNING");
}

#[tokio::test]
async fn test_empty_live_inventory_removes_stale_entries() {
    let h = harness();
    seed(&h.store, "p/old-1", "RUNNING").await;
    seed(&h.store, "p/old-2", "STOPPED").await;

    let synced = h.service.sync_one(ACCOUNT).await.unwrap();
    assert!(synced.is_empty());
    assert!(h.store.is_empty());
}

#[tokio::test]
async fn test_live_fetch_failure_aborts_without_writes() {
    let h = harness();
    seed(&h.store, "p/keep", "RUNNING").await;
    let baseline = h.store.writes();
    h.provider.set_live(vec![vm("p/new", "RUNNING")]);
    h.provider.fail_listing(ResourceType::Sql);

    let err = h.service.sync_one(ACCOUNT).await.unwrap_err();

    assert!(matches!(err, ReconcileError::Provider { .. }));
    assert_eq!(err.kind(), ErrorKind::Upstream);
    assert_eq!(h.store.writes(), baseline);
    let stored = h
        .service
        .list_resources(ACCOUNT, &ResourceFilter::all())
        .await
        .unwrap();
    assert_eq!(uids(&stored), vec!["p/keep"]);
}

#[tokio::test]
async fn test_individual_write_failure_does_not_stop_the_batch() {
    let provider = Arc::new(ScriptedProvider::default());
    provider.set_live(vec![vm("p/a", "RUNNING"), vm("p/b", "RUNNING"), vm("p/c", "RUNNING")]);
    let store = Arc::new(FlakyStore {
        inner: MemoryResourceStore::new(),
        reject: HashSet::from(["p/b".to_string()]),
    });
    let service = service_over(provider, store, vec![gcp_account(ACCOUNT)]);

    let synced = service.sync_one(ACCOUNT).await.unwrap();
    assert_eq!(uids(&synced), vec!["p/a", "p/c"]);
}

#[tokio::test]
async fn test_unsorted_store_read_is_rejected_before_diff() {
    let provider = Arc::new(ScriptedProvider::default());
    provider.set_live(vec![vm("a", "RUNNING")]);
    let memory = Arc::new(MemoryResourceStore::new());
    seed(&memory, "a", "RUNNING").await;
    seed(&memory, "b", "RUNNING").await;
    let baseline = memory.writes();

    let service = service_over(
        provider,
        Arc::new(ReversedStore(memory.clone())),
        vec![gcp_account(ACCOUNT)],
    );

    let err = service.sync_one(ACCOUNT).await.unwrap_err();
    assert!(matches!(
        err,
        ReconcileError::Persistence(StoreError::Contract(_))
    ));
    assert_eq!(memory.writes(), baseline);
    assert_eq!(memory.len(), 2);
}

#[tokio::test]
async fn test_unknown_account_and_provider() {
    let h = harness();
    let err = h.service.sync_one(42).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let service = service_over(
        Arc::new(ScriptedProvider::default()),
        Arc::new(MemoryResourceStore::new()),
        vec![CloudCredentials::new(5, "azure", json!({}))],
    );
    let err = service.sync_one(5).await.unwrap_err();
    assert!(matches!(err, ReconcileError::UnknownProvider(ref p) if p == "azure"));
    assert_eq!(err.kind(), ErrorKind::InvalidState);
}

#[tokio::test]
async fn test_change_state_to_current_state_is_a_noop() {
    let h = harness();
    let id = seed(&h.store, "p/web", "RUNNING").await;
    let baseline = h.store.writes();

    h.service.change_state(id, DesiredState::Start).await.unwrap();

    assert_eq!(h.provider.state_calls(), 0);
    assert_eq!(h.store.writes(), baseline);
}

#[tokio::test]
async fn test_change_state_dispatches_and_persists_status() {
    let h = harness();
    let id = seed(&h.store, "p/web", "RUNNING").await;

    h.service.change_state(id, DesiredState::Stop).await.unwrap();
    assert_eq!(h.provider.state_calls(), 1);
    let stored = h.store.get_resource_by_id(id).await.unwrap().unwrap();
    assert_eq!(stored.status, "STOPPED");

    h.service.change_state(id, DesiredState::Start).await.unwrap();
    assert_eq!(h.provider.state_calls(), 2);
    let stored = h.store.get_resource_by_id(id).await.unwrap().unwrap();
    assert_eq!(stored.power_state(), PowerState::Running);
}

#[tokio::test]
async fn test_change_state_unknown_resource() {
    let h = harness();
    let err = h
        .service
        .change_state(404, DesiredState::Start)
        .await
        .unwrap_err();
    assert!(matches!(err, ReconcileError::ResourceNotFound(404)));
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_sync_all_collects_failures_and_counts_outcomes() {
    let provider = Arc::new(ScriptedProvider::default());
    provider.set_live(vec![vm("p/a", "RUNNING")]);
    let store = Arc::new(MemoryResourceStore::new());
    let service = service_over(
        provider,
        store.clone(),
        vec![
            gcp_account(1),
            CloudCredentials::new(2, "azure", json!({})),
            gcp_account(3),
        ],
    );

    let summary = service.sync_all().await.unwrap();

    let mut succeeded = summary.succeeded.clone();
    succeeded.sort();
    assert_eq!(succeeded, vec![1, 3]);
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].account_id, 2);
    assert!(!summary.is_success());

    // Both healthy accounts converged
    assert_eq!(store.len(), 2);

    let metrics = service.metrics();
    assert_eq!(metrics.account_syncs(true), 2);
    assert_eq!(metrics.account_syncs(false), 1);
    assert_eq!(metrics.sync_runs(false), 1);
    assert_eq!(metrics.sync_runs(true), 0);
}

#[tokio::test]
async fn test_groups_derive_status_and_skip_removed_members() {
    let h = harness();
    h.provider
        .set_live(vec![vm("p/a", "RUNNING"), vm("p/b", "RUNNING")]);
    let synced = h.service.sync_one(ACCOUNT).await.unwrap();
    let ids: Vec<ResourceId> = synced.iter().filter_map(|r| r.id).collect();

    let groups = Arc::new(MemoryGroupStore::new());
    let service = ResourceGroupService::new(groups.clone(), h.service.clone());
    let web = service.create_group(ACCOUNT, "web").await.unwrap();
    service.create_group(ACCOUNT, "empty").await.unwrap();
    service.add_resources(web.id, &ids).await.unwrap();

    let view = service.get_group(web.id).await.unwrap();
    assert_eq!(view.members.len(), 2);
    assert_eq!(view.status, PowerState::Running);

    // p/b goes away, p/a stops
    h.provider.set_live(vec![vm("p/a", "TERMINATED")]);
    h.service.sync_one(ACCOUNT).await.unwrap();

    let views = service.list_groups(ACCOUNT).await.unwrap();
    assert_eq!(views.len(), 2);
    assert_eq!(views[0].group.name, "web");
    assert_eq!(uids(&views[0].members), vec!["p/a"]);
    assert_eq!(views[0].status, PowerState::Stopped);
    assert!(views[1].members.is_empty());
    assert_eq!(views[1].status, PowerState::Running);
}

#[tokio::test]
async fn test_group_membership_rules() {
    let h = harness();
    let own = seed(&h.store, "p/a", "RUNNING").await;
    let foreign = h
        .store
        .insert_resource(&Resource::new(
            "q/x",
            "x",
            ResourceType::Vm,
            "RUNNING",
            CloudAccountRef::new(2, "gcp"),
        ))
        .await
        .unwrap()
        .id
        .unwrap();

    let groups = Arc::new(MemoryGroupStore::new());
    let service = ResourceGroupService::new(groups.clone(), h.service.clone());
    let group = service.create_group(ACCOUNT, "batch").await.unwrap();

    let err = service
        .add_resources(group.id, &[own, foreign])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
    assert!(groups.member_ids(group.id).await.unwrap().is_empty());

    let err = service.add_resources(group.id, &[777]).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    service.add_resources(group.id, &[own]).await.unwrap();
    service.remove_resource(group.id, own).await.unwrap();
    assert!(groups.member_ids(group.id).await.unwrap().is_empty());

    service.delete_group(group.id).await.unwrap();
    assert!(h.store.get_resource_by_id(own).await.unwrap().is_some());
    assert!(matches!(
        service.get_group(group.id).await,
        Err(ReconcileError::GroupNotFound(_))
    ));
}

#[tokio::test]
async fn test_change_group_state_applies_to_every_member() {
    let h = harness();
    let a = seed(&h.store, "p/a", "RUNNING").await;
    let b = seed(&h.store, "p/b", "STOPPED").await;

    let service = ResourceGroupService::new(Arc::new(MemoryGroupStore::new()), h.service.clone());
    let group = service.create_group(ACCOUNT, "all").await.unwrap();
    service.add_resources(group.id, &[a, b]).await.unwrap();

    let failures = service
        .change_group_state(group.id, DesiredState::Stop)
        .await
        .unwrap();
    assert!(failures.is_empty());
    // Only p/a needed a provider call
    assert_eq!(h.provider.state_calls(), 1);
    assert_eq!(
        service.get_group(group.id).await.unwrap().status,
        PowerState::Stopped
    );
}

#[tokio::test]
async fn test_group_stop_after_sync_removed_a_member() {
    let h = harness();
    h.provider
        .set_live(vec![vm("p/a", "RUNNING"), vm("p/b", "RUNNING")]);
    let synced = h.service.sync_one(ACCOUNT).await.unwrap();
    let ids: Vec<ResourceId> = synced.iter().filter_map(|r| r.id).collect();

    let service = ResourceGroupService::new(Arc::new(MemoryGroupStore::new()), h.service.clone());
    let group = service.create_group(ACCOUNT, "web").await.unwrap();
    service.add_resources(group.id, &ids).await.unwrap();

    h.provider.set_live(vec![vm("p/a", "RUNNING")]);
    h.service.sync_one(ACCOUNT).await.unwrap();

    let failures = service
        .change_group_state(group.id, DesiredState::Stop)
        .await
        .unwrap();
    assert!(failures.is_empty());
    assert_eq!(h.provider.state_calls(), 1);
    assert_eq!(
        service.get_group(group.id).await.unwrap().status,
        PowerState::Stopped
    );
}

#[tokio::test]
async fn test_dropped_sync_aborts_inflight_listings() {
    let h = harness();
    h.provider.set_live(vec![vm("p/a", "RUNNING")]);
    h.provider.delay_listings(Duration::from_millis(200));

    let outcome = tokio::time::timeout(Duration::from_millis(50), h.service.sync_one(ACCOUNT)).await;
    assert!(outcome.is_err());

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(h.provider.listings_done(), 0);
    assert!(h.store.is_empty());
}

#[tokio::test]
async fn test_driver_runs_until_cancelled() {
    let h = harness();
    h.provider.set_live(vec![vm("p/a", "RUNNING")]);

    let (cancel_tx, cancel_rx) = tokio::sync::watch::channel(false);
    let driver = SyncDriver::new(h.service.clone(), Duration::from_secs(3600));
    let handle = tokio::spawn(driver.run(cancel_rx));

    tokio::time::timeout(Duration::from_secs(5), async {
        while h.store.is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    cancel_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(h.service.metrics().sync_runs(true), 1);
}
