//! In-memory store implementations.
//!
//! Used for local runs without a database and throughout the test suites.
//! Stale memberships (pointing at removed resources) are tolerated here; the
//! group service skips members that no longer resolve.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use stratus_core::{CloudAccountId, GroupId, Resource, ResourceFilter, ResourceGroup, ResourceId};

use crate::error::StoreError;
use crate::store::{GroupStore, ResourceStore};

#[derive(Default)]
struct ResourceTable {
    next_id: ResourceId,
    rows: BTreeMap<ResourceId, Resource>,
}

/// Resource registry held in memory.
#[derive(Default)]
pub struct MemoryResourceStore {
    table: RwLock<ResourceTable>,
    writes: AtomicU64,
}

impl MemoryResourceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of mutating calls served so far (inserts, updates, removals).
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Number of stored resources across all accounts.
    pub fn len(&self) -> usize {
        self.table.read().map(|t| t.rows.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ResourceStore for MemoryResourceStore {
    async fn insert_resource(&self, resource: &Resource) -> Result<Resource, StoreError> {
        let mut table = self.table.write().map_err(|_| StoreError::LockError)?;
        self.writes.fetch_add(1, Ordering::SeqCst);

        let duplicate = table.rows.values().any(|r| {
            r.cloud_account.id == resource.cloud_account.id && r.uid == resource.uid
        });
        if duplicate {
            return Err(StoreError::Conflict(format!(
                "resource uid '{}' already registered for account {}",
                resource.uid, resource.cloud_account.id
            )));
        }

        table.next_id += 1;
        let id = table.next_id;
        let now = Utc::now();
        let mut stored = resource.clone();
        stored.id = Some(id);
        stored.created_at = Some(now);
        stored.updated_at = Some(now);
        table.rows.insert(id, stored.clone());
        Ok(stored)
    }

    async fn get_resources(
        &self,
        account_id: CloudAccountId,
        filter: &ResourceFilter,
    ) -> Result<Vec<Resource>, StoreError> {
        let table = self.table.read().map_err(|_| StoreError::LockError)?;
        let mut resources: Vec<Resource> = table
            .rows
            .values()
            .filter(|r| r.cloud_account.id == account_id && filter.matches(r.resource_type))
            .cloned()
            .collect();
        resources.sort_by(|a, b| a.uid.cmp(&b.uid));
        Ok(resources)
    }

    async fn update_status(&self, id: ResourceId, status: &str) -> Result<(), StoreError> {
        let mut table = self.table.write().map_err(|_| StoreError::LockError)?;
        self.writes.fetch_add(1, Ordering::SeqCst);

        let row = table
            .rows
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("resource {id}")))?;
        row.status = status.to_string();
        row.updated_at = Some(Utc::now());
        Ok(())
    }

    async fn remove_resource(&self, id: ResourceId) -> Result<(), StoreError> {
        let mut table = self.table.write().map_err(|_| StoreError::LockError)?;
        self.writes.fetch_add(1, Ordering::SeqCst);

        table
            .rows
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("resource {id}")))
    }

    async fn get_resource_by_id(&self, id: ResourceId) -> Result<Option<Resource>, StoreError> {
        let table = self.table.read().map_err(|_| StoreError::LockError)?;
        Ok(table.rows.get(&id).cloned())
    }
}

#[derive(Default)]
struct GroupTable {
    next_id: GroupId,
    groups: BTreeMap<GroupId, ResourceGroup>,
    members: BTreeMap<GroupId, Vec<ResourceId>>,
}

/// Resource group membership held in memory.
#[derive(Default)]
pub struct MemoryGroupStore {
    table: RwLock<GroupTable>,
}

impl MemoryGroupStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GroupStore for MemoryGroupStore {
    async fn create_group(
        &self,
        account_id: CloudAccountId,
        name: &str,
    ) -> Result<ResourceGroup, StoreError> {
        let mut table = self.table.write().map_err(|_| StoreError::LockError)?;
        if table
            .groups
            .values()
            .any(|g| g.cloud_account_id == account_id && g.name == name)
        {
            return Err(StoreError::Conflict(format!(
                "group '{name}' already exists for account {account_id}"
            )));
        }

        table.next_id += 1;
        let group = ResourceGroup {
            id: table.next_id,
            cloud_account_id: account_id,
            name: name.to_string(),
            created_at: Utc::now(),
        };
        table.groups.insert(group.id, group.clone());
        table.members.insert(group.id, Vec::new());
        Ok(group)
    }

    async fn get_group(&self, id: GroupId) -> Result<Option<ResourceGroup>, StoreError> {
        let table = self.table.read().map_err(|_| StoreError::LockError)?;
        Ok(table.groups.get(&id).cloned())
    }

    async fn list_groups(
        &self,
        account_id: CloudAccountId,
    ) -> Result<Vec<ResourceGroup>, StoreError> {
        let table = self.table.read().map_err(|_| StoreError::LockError)?;
        Ok(table
            .groups
            .values()
            .filter(|g| g.cloud_account_id == account_id)
            .cloned()
            .collect())
    }

    async fn delete_group(&self, id: GroupId) -> Result<(), StoreError> {
        let mut table = self.table.write().map_err(|_| StoreError::LockError)?;
        table.members.remove(&id);
        table
            .groups
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("group {id}")))
    }

    async fn add_member(
        &self,
        group_id: GroupId,
        resource_id: ResourceId,
    ) -> Result<(), StoreError> {
        let mut table = self.table.write().map_err(|_| StoreError::LockError)?;
        let members = table
            .members
            .get_mut(&group_id)
            .ok_or_else(|| StoreError::NotFound(format!("group {group_id}")))?;
        if !members.contains(&resource_id) {
            members.push(resource_id);
        }
        Ok(())
    }

    async fn remove_member(
        &self,
        group_id: GroupId,
        resource_id: ResourceId,
    ) -> Result<(), StoreError> {
        let mut table = self.table.write().map_err(|_| StoreError::LockError)?;
        let members = table
            .members
            .get_mut(&group_id)
            .ok_or_else(|| StoreError::NotFound(format!("group {group_id}")))?;
        members.retain(|id| *id != resource_id);
        Ok(())
    }

    async fn member_ids(&self, group_id: GroupId) -> Result<Vec<ResourceId>, StoreError> {
        let table = self.table.read().map_err(|_| StoreError::LockError)?;
        table
            .members
            .get(&group_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("group {group_id}")))
    }
}
