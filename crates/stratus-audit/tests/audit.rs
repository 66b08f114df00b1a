//! Integration tests for the audit service over the in-memory results store.
//!
//! Run with: cargo test --package stratus-audit --test audit

use async_trait::async_trait;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use stratus_audit::{
    AuditError, AuditItem, AuditResult, AuditService, Classification, MemoryResultsStore,
    ResultState, ResultsStore, Rule, RuleError, RuleRegistry,
};
use stratus_core::{CloudAccountId, CloudCredentials, ErrorKind};
use stratus_runtime::{StaticCredentialResolver, StoreError};

/// Rule returning fixed findings, or failing.
struct FixedRule {
    id: &'static str,
    category: &'static str,
    outcome: Result<Vec<AuditItem>, u16>,
    calls: AtomicUsize,
}

impl FixedRule {
    fn ok(id: &'static str, category: &'static str, items: Vec<AuditItem>) -> Arc<Self> {
        Arc::new(Self {
            id,
            category,
            outcome: Ok(items),
            calls: AtomicUsize::new(0),
        })
    }

    fn failing(id: &'static str, category: &'static str, status: u16) -> Arc<Self> {
        Arc::new(Self {
            id,
            category,
            outcome: Err(status),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Rule for FixedRule {
    fn id(&self) -> &str {
        self.id
    }

    fn name(&self) -> &str {
        self.id
    }

    fn category(&self) -> &str {
        self.category
    }

    async fn execute(&self, _credentials: &CloudCredentials) -> Result<Vec<AuditItem>, RuleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.outcome {
            Ok(items) => Ok(items.clone()),
            Err(status) => Err(RuleError::Api {
                status: *status,
                message: "monitoring backend unavailable".to_string(),
            }),
        }
    }
}

/// Results store rejecting pending writes for selected rules.
struct RejectingStore {
    inner: MemoryResultsStore,
    reject: HashSet<&'static str>,
}

#[async_trait]
impl ResultsStore for RejectingStore {
    async fn create_pending(&self, result: &AuditResult) -> Result<AuditResult, StoreError> {
        if self.reject.contains(result.rule_id.as_str()) {
            return Err(StoreError::Database("disk full".to_string()));
        }
        self.inner.create_pending(result).await
    }

    async fn update_result(&self, result: &AuditResult) -> Result<(), StoreError> {
        self.inner.update_result(result).await
    }

    async fn get_last_run(
        &self,
        account_id: CloudAccountId,
        rule_id: &str,
    ) -> Result<Option<AuditResult>, StoreError> {
        self.inner.get_last_run(account_id, rule_id).await
    }
}

const ACCOUNT: CloudAccountId = 7;

fn resolver() -> Arc<StaticCredentialResolver> {
    Arc::new(StaticCredentialResolver::new(vec![CloudCredentials::new(
        ACCOUNT,
        "gcp",
        json!({"project_id": "p", "access_token": "t"}),
    )]))
}

fn findings() -> Vec<AuditItem> {
    vec![
        AuditItem::new("db-1", Classification::Danger),
        AuditItem::new("db-2", Classification::Compliant),
    ]
}

fn service_with(rules: Vec<Arc<dyn Rule>>, store: Arc<dyn ResultsStore>) -> AuditService {
    AuditService::new(Arc::new(RuleRegistry::new(rules).unwrap()), resolver(), store)
}

#[tokio::test]
async fn test_run_by_id_persists_evaluated_result() {
    let store = Arc::new(MemoryResultsStore::new());
    let service = service_with(
        vec![FixedRule::ok("sql-cpu", "overprovision", findings())],
        store.clone(),
    );

    let result = service.run_by_id("sql-cpu", ACCOUNT).await.unwrap();
    assert_eq!(result.state, ResultState::Evaluated);
    assert_eq!(result.data, findings());

    let fetched = service.get_result_by_id("sql-cpu", ACCOUNT).await.unwrap();
    assert_eq!(fetched, result);
    assert_eq!(store.all().len(), 1);
}

#[tokio::test]
async fn test_failed_rule_leaves_pending_row() {
    let store = Arc::new(MemoryResultsStore::new());
    let service = service_with(
        vec![FixedRule::failing("vm-cpu", "overprovision", 503)],
        store.clone(),
    );

    let err = service.run_by_id("vm-cpu", ACCOUNT).await.unwrap_err();
    assert!(matches!(err, AuditError::Rule { .. }));
    assert_eq!(err.kind(), ErrorKind::Upstream);

    let last = service.get_result_by_id("vm-cpu", ACCOUNT).await.unwrap();
    assert_eq!(last.state, ResultState::Pending);
    assert!(last.data.is_empty());
}

#[tokio::test]
async fn test_category_run_continues_past_failing_rule() {
    let store = Arc::new(MemoryResultsStore::new());
    let service = service_with(
        vec![
            FixedRule::ok("sql-cpu", "overprovision", findings()),
            FixedRule::failing("vm-cpu", "overprovision", 500),
        ],
        store.clone(),
    );

    let run = service
        .run_by_category("overprovision", ACCOUNT)
        .await
        .unwrap();

    assert_eq!(run.results.len(), 1);
    assert_eq!(run.results[0].rule_id, "sql-cpu");
    assert_eq!(run.failures.len(), 1);
    assert_eq!(run.failures[0].rule_id, "vm-cpu");
    assert!(!run.is_success());

    // First result is durable; the second left its pending row
    let sql = service.get_result_by_id("sql-cpu", ACCOUNT).await.unwrap();
    assert_eq!(sql.state, ResultState::Evaluated);
    let vm = service.get_result_by_id("vm-cpu", ACCOUNT).await.unwrap();
    assert_eq!(vm.state, ResultState::Pending);
}

#[tokio::test]
async fn test_pending_write_failure_skips_only_that_rule() {
    let first = FixedRule::ok("first", "overprovision", findings());
    let second = FixedRule::ok("second", "overprovision", vec![]);
    let store = Arc::new(RejectingStore {
        inner: MemoryResultsStore::new(),
        reject: HashSet::from(["first"]),
    });
    let service = service_with(vec![first.clone(), second.clone()], store);

    let run = service
        .run_by_category("overprovision", ACCOUNT)
        .await
        .unwrap();

    assert_eq!(run.failures.len(), 1);
    assert_eq!(run.failures[0].error.kind(), ErrorKind::Persistence);
    assert_eq!(run.results.len(), 1);
    assert_eq!(run.results[0].rule_id, "second");
    // The rule whose pending write failed never executed
    assert_eq!(first.calls.load(Ordering::SeqCst), 0);
    assert_eq!(second.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_run_all_groups_by_category() {
    let service = service_with(
        vec![
            FixedRule::ok("sql-cpu", "overprovision", findings()),
            FixedRule::ok("public-ip", "security", vec![]),
            FixedRule::failing("vm-cpu", "overprovision", 500),
        ],
        Arc::new(MemoryResultsStore::new()),
    );

    let runs = service.run_all(ACCOUNT).await.unwrap();
    assert_eq!(
        runs.keys().map(String::as_str).collect::<Vec<_>>(),
        vec!["overprovision", "security"]
    );
    assert_eq!(runs["overprovision"].results.len(), 1);
    assert_eq!(runs["overprovision"].failures.len(), 1);
    assert!(runs["security"].is_success());

    let all = service.get_all_results(ACCOUNT).await.unwrap();
    assert_eq!(all["overprovision"].results.len(), 2);
    assert_eq!(all["security"].results.len(), 1);
}

#[tokio::test]
async fn test_lookups_of_unknown_or_never_run_rules() {
    let service = service_with(
        vec![
            FixedRule::ok("sql-cpu", "overprovision", findings()),
            FixedRule::ok("vm-cpu", "overprovision", vec![]),
        ],
        Arc::new(MemoryResultsStore::new()),
    );

    assert!(matches!(
        service.run_by_id("nope", ACCOUNT).await,
        Err(AuditError::RuleNotFound(_))
    ));
    assert!(matches!(
        service.run_by_category("cost", ACCOUNT).await,
        Err(AuditError::CategoryNotFound(_))
    ));
    assert!(matches!(
        service.get_result_by_id("sql-cpu", ACCOUNT).await,
        Err(AuditError::ResultNotFound { .. })
    ));

    // Unknown account surfaces as not found
    let err = service.run_by_id("sql-cpu", 404).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    service.run_by_id("vm-cpu", ACCOUNT).await.unwrap();
    let latest = service
        .get_results_by_category("overprovision", ACCOUNT)
        .await
        .unwrap();
    assert_eq!(latest.results.len(), 1);
    assert_eq!(latest.results[0].rule_id, "vm-cpu");
}
