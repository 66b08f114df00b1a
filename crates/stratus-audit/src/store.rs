//! Audit result persistence.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::RwLock;
use stratus_core::CloudAccountId;
use stratus_runtime::StoreError;

use crate::result::{AuditResult, ResultId};

/// Trait for audit result storage backends.
#[async_trait]
pub trait ResultsStore: Send + Sync {
    /// Persist a pending result and return it with its id.
    async fn create_pending(&self, result: &AuditResult) -> Result<AuditResult, StoreError>;

    /// Overwrite state and findings of a previously created result.
    async fn update_result(&self, result: &AuditResult) -> Result<(), StoreError>;

    /// Most recent result of a rule on an account, pending or evaluated.
    async fn get_last_run(
        &self,
        account_id: CloudAccountId,
        rule_id: &str,
    ) -> Result<Option<AuditResult>, StoreError>;
}

/// In-memory results store.
#[derive(Default)]
pub struct MemoryResultsStore {
    rows: RwLock<BTreeMap<ResultId, AuditResult>>,
}

impl MemoryResultsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored result, ordered by id.
    pub fn all(&self) -> Vec<AuditResult> {
        self.rows
            .read()
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ResultsStore for MemoryResultsStore {
    async fn create_pending(&self, result: &AuditResult) -> Result<AuditResult, StoreError> {
        let mut rows = self.rows.write().map_err(|_| StoreError::LockError)?;
        let id = rows.keys().next_back().copied().unwrap_or(0) + 1;
        let mut stored = result.clone();
        stored.id = Some(id);
        rows.insert(id, stored.clone());
        Ok(stored)
    }

    async fn update_result(&self, result: &AuditResult) -> Result<(), StoreError> {
        let id = result
            .id
            .ok_or_else(|| StoreError::NotFound("audit result without id".to_string()))?;
        let mut rows = self.rows.write().map_err(|_| StoreError::LockError)?;
        let row = rows
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("audit result {id}")))?;
        row.state = result.state;
        row.data = result.data.clone();
        Ok(())
    }

    async fn get_last_run(
        &self,
        account_id: CloudAccountId,
        rule_id: &str,
    ) -> Result<Option<AuditResult>, StoreError> {
        let rows = self.rows.read().map_err(|_| StoreError::LockError)?;
        Ok(rows
            .values()
            .filter(|r| r.cloud_account_id == account_id && r.rule_id == rule_id)
            .max_by_key(|r| (r.evaluated_at, r.id))
            .cloned())
    }
}
