//! `stratus groups` - named collections of resources.

use clap::Subcommand;
use serde_json::json;
use stratus_core::{CloudAccountId, DesiredState, GroupId, ResourceId};

use super::{error_json, failed, print_json};
use crate::app::App;

#[derive(Subcommand, Debug)]
pub enum GroupsCommand {
    /// Create an empty group in an account.
    Create {
        #[arg(long)]
        account: CloudAccountId,
        #[arg(long)]
        name: String,
    },

    /// List the groups of an account with their derived status.
    List {
        #[arg(long)]
        account: CloudAccountId,
    },

    Show { group: GroupId },

    /// Add resources of the group's account to a group.
    Add {
        group: GroupId,
        #[arg(required = true)]
        resources: Vec<ResourceId>,
    },

    Remove { group: GroupId, resource: ResourceId },

    /// Delete a group. Its resources are kept.
    Delete { group: GroupId },

    /// Start every member of a group.
    Start { group: GroupId },

    /// Stop every member of a group.
    Stop { group: GroupId },
}

pub async fn run(app: &App, cmd: GroupsCommand) -> anyhow::Result<()> {
    let groups = &app.groups;
    match cmd {
        GroupsCommand::Create { account, name } => {
            let group = groups
                .create_group(account, &name)
                .await
                .map_err(|e| failed(e.kind(), e))?;
            print_json(&group)
        }
        GroupsCommand::List { account } => {
            let views = groups
                .list_groups(account)
                .await
                .map_err(|e| failed(e.kind(), e))?;
            print_json(&views)
        }
        GroupsCommand::Show { group } => {
            let view = groups.get_group(group).await.map_err(|e| failed(e.kind(), e))?;
            print_json(&view)
        }
        GroupsCommand::Add { group, resources } => {
            groups
                .add_resources(group, &resources)
                .await
                .map_err(|e| failed(e.kind(), e))?;
            let view = groups.get_group(group).await.map_err(|e| failed(e.kind(), e))?;
            print_json(&view)
        }
        GroupsCommand::Remove { group, resource } => {
            groups
                .remove_resource(group, resource)
                .await
                .map_err(|e| failed(e.kind(), e))?;
            let view = groups.get_group(group).await.map_err(|e| failed(e.kind(), e))?;
            print_json(&view)
        }
        GroupsCommand::Delete { group } => {
            groups.delete_group(group).await.map_err(|e| failed(e.kind(), e))?;
            print_json(&json!({ "group_id": group, "deleted": true }))
        }
        GroupsCommand::Start { group } => change_state(app, group, DesiredState::Start).await,
        GroupsCommand::Stop { group } => change_state(app, group, DesiredState::Stop).await,
    }
}

async fn change_state(app: &App, group: GroupId, desired: DesiredState) -> anyhow::Result<()> {
    let failures = app
        .groups
        .change_group_state(group, desired)
        .await
        .map_err(|e| failed(e.kind(), e))?;

    let report: Vec<_> = failures
        .iter()
        .map(|(resource_id, e)| {
            json!({ "resource_id": resource_id, "error": error_json(e.kind(), e) })
        })
        .collect();
    print_json(&json!({
        "group_id": group,
        "action": desired,
        "failures": report,
    }))?;

    if !failures.is_empty() {
        anyhow::bail!("{} group member(s) failed to {desired}", failures.len());
    }
    Ok(())
}
