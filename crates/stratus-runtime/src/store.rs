//! Storage contracts consumed by the reconciliation runtime.

use async_trait::async_trait;
use stratus_core::{CloudAccountId, GroupId, Resource, ResourceFilter, ResourceGroup, ResourceId};

use crate::error::StoreError;

/// Persisted registry of known resources.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Persist a newly observed resource and return it with its registry id.
    ///
    /// Fails with [`StoreError::Conflict`] if the `(account, uid)` pair exists.
    async fn insert_resource(&self, resource: &Resource) -> Result<Resource, StoreError>;

    /// Resources of an account matching `filter`, **sorted by `uid`**.
    ///
    /// The ordering is load-bearing: the merge-diff binary-searches this list.
    async fn get_resources(
        &self,
        account_id: CloudAccountId,
        filter: &ResourceFilter,
    ) -> Result<Vec<Resource>, StoreError>;

    async fn update_status(&self, id: ResourceId, status: &str) -> Result<(), StoreError>;

    /// Delete a resource.
    ///
    /// Backends may keep group memberships that point at it; the group
    /// service skips members that no longer resolve.
    async fn remove_resource(&self, id: ResourceId) -> Result<(), StoreError>;

    async fn get_resource_by_id(&self, id: ResourceId) -> Result<Option<Resource>, StoreError>;
}

/// Resource group membership table.
///
/// Members are weak references: deleting a group never deletes resources.
#[async_trait]
pub trait GroupStore: Send + Sync {
    async fn create_group(
        &self,
        account_id: CloudAccountId,
        name: &str,
    ) -> Result<ResourceGroup, StoreError>;

    async fn get_group(&self, id: GroupId) -> Result<Option<ResourceGroup>, StoreError>;

    /// Groups of an account ordered by id.
    async fn list_groups(&self, account_id: CloudAccountId)
    -> Result<Vec<ResourceGroup>, StoreError>;

    async fn delete_group(&self, id: GroupId) -> Result<(), StoreError>;

    /// Add a member. Adding an existing member is a no-op.
    async fn add_member(&self, group_id: GroupId, resource_id: ResourceId)
    -> Result<(), StoreError>;

    async fn remove_member(
        &self,
        group_id: GroupId,
        resource_id: ResourceId,
    ) -> Result<(), StoreError>;

    /// Member resource ids in insertion order.
    async fn member_ids(&self, group_id: GroupId) -> Result<Vec<ResourceId>, StoreError>;
}
