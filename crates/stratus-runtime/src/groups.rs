//! Resource groups: named, account-scoped collections of resources with a
//! status derived from their members.

use serde::Serialize;
use std::sync::Arc;
use stratus_core::{
    CloudAccountId, DesiredState, GroupId, PowerState, Resource, ResourceGroup, ResourceId,
};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::error::{ReconcileError, ReconcileResult};
use crate::reconcile::ReconciliationService;
use crate::store::{GroupStore, ResourceStore};

/// A group with its resolved members.
#[derive(Debug, Clone, Serialize)]
pub struct GroupView {
    #[serde(flatten)]
    pub group: ResourceGroup,
    pub members: Vec<Resource>,
    pub status: PowerState,
}

pub struct ResourceGroupService {
    groups: Arc<dyn GroupStore>,
    resources: Arc<dyn ResourceStore>,
    reconciler: Arc<ReconciliationService>,
}

impl ResourceGroupService {
    pub fn new(groups: Arc<dyn GroupStore>, reconciler: Arc<ReconciliationService>) -> Self {
        Self {
            groups,
            resources: Arc::clone(reconciler.store()),
            reconciler,
        }
    }

    pub async fn create_group(
        &self,
        account_id: CloudAccountId,
        name: &str,
    ) -> ReconcileResult<ResourceGroup> {
        let group = self.groups.create_group(account_id, name).await?;
        info!(group_id = group.id, account_id, name, "Created resource group");
        Ok(group)
    }

    /// Add resources to a group.
    ///
    /// Every resource must exist and belong to the group's account; nothing
    /// is added unless all of them qualify.
    pub async fn add_resources(
        &self,
        group_id: GroupId,
        resource_ids: &[ResourceId],
    ) -> ReconcileResult<()> {
        let group = self.require_group(group_id).await?;

        for &resource_id in resource_ids {
            let resource = self
                .resources
                .get_resource_by_id(resource_id)
                .await?
                .ok_or(ReconcileError::ResourceNotFound(resource_id))?;
            if resource.cloud_account.id != group.cloud_account_id {
                return Err(ReconcileError::InvalidState(format!(
                    "resource {resource_id} belongs to account {} but group {group_id} to account {}",
                    resource.cloud_account.id, group.cloud_account_id
                )));
            }
        }

        for &resource_id in resource_ids {
            self.groups.add_member(group_id, resource_id).await?;
        }
        Ok(())
    }

    pub async fn remove_resource(
        &self,
        group_id: GroupId,
        resource_id: ResourceId,
    ) -> ReconcileResult<()> {
        self.require_group(group_id).await?;
        self.groups.remove_member(group_id, resource_id).await?;
        Ok(())
    }

    /// Delete a group. Member resources are kept.
    pub async fn delete_group(&self, group_id: GroupId) -> ReconcileResult<()> {
        self.require_group(group_id).await?;
        self.groups.delete_group(group_id).await?;
        info!(group_id, "Deleted resource group");
        Ok(())
    }

    pub async fn get_group(&self, group_id: GroupId) -> ReconcileResult<GroupView> {
        let group = self.require_group(group_id).await?;
        load_view(self.groups.as_ref(), self.resources.as_ref(), group).await
    }

    /// Every group of an account, each resolved by its own task.
    pub async fn list_groups(&self, account_id: CloudAccountId) -> ReconcileResult<Vec<GroupView>> {
        let groups = self.groups.list_groups(account_id).await?;

        let mut tasks = JoinSet::new();
        for group in groups {
            let group_store = Arc::clone(&self.groups);
            let resource_store = Arc::clone(&self.resources);
            tasks.spawn(async move {
                load_view(group_store.as_ref(), resource_store.as_ref(), group).await
            });
        }

        let mut views = Vec::new();
        let mut first_error = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(view)) => views.push(view),
                Ok(Err(e)) => {
                    first_error.get_or_insert(e);
                }
                Err(e) => {
                    first_error.get_or_insert(ReconcileError::Task(e.to_string()));
                }
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }
        views.sort_by_key(|v| v.group.id);
        Ok(views)
    }

    /// Apply a state change to every member, one after another.
    ///
    /// Returns the members that failed; members already in the requested
    /// state count as successes. Members whose resource no longer exists are
    /// skipped.
    pub async fn change_group_state(
        &self,
        group_id: GroupId,
        desired: DesiredState,
    ) -> ReconcileResult<Vec<(ResourceId, ReconcileError)>> {
        self.require_group(group_id).await?;
        let member_ids = self.groups.member_ids(group_id).await?;

        let mut failures = Vec::new();
        for resource_id in member_ids {
            if self.resources.get_resource_by_id(resource_id).await?.is_none() {
                debug!(group_id, resource_id, "Skipping member whose resource was removed");
                continue;
            }
            if let Err(e) = self.reconciler.change_state(resource_id, desired).await {
                warn!(group_id, resource_id, error = %e, "Group member state change failed");
                failures.push((resource_id, e));
            }
        }
        Ok(failures)
    }

    async fn require_group(&self, group_id: GroupId) -> ReconcileResult<ResourceGroup> {
        self.groups
            .get_group(group_id)
            .await?
            .ok_or(ReconcileError::GroupNotFound(group_id))
    }
}

async fn load_view(
    groups: &dyn GroupStore,
    resources: &dyn ResourceStore,
    group: ResourceGroup,
) -> ReconcileResult<GroupView> {
    let mut members = Vec::new();
    for resource_id in groups.member_ids(group.id).await? {
        // Members removed by a sync since they were added no longer resolve
        if let Some(resource) = resources.get_resource_by_id(resource_id).await? {
            members.push(resource);
        }
    }
    let status = ResourceGroup::derive_status(&members);
    Ok(GroupView {
        group,
        members,
        status,
    })
}
