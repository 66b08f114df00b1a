//! `stratus resources` - stored resources and start/stop.

use clap::Subcommand;
use serde_json::json;
use stratus_core::{CloudAccountId, DesiredState, ResourceFilter, ResourceId, ResourceType};

use super::{failed, print_json};
use crate::app::App;

#[derive(Subcommand, Debug)]
pub enum ResourcesCommand {
    /// List the stored resources of an account, sorted by uid.
    List {
        #[arg(long)]
        account: CloudAccountId,

        /// Restrict to some resource types (SQL, VM, RDS). Repeatable.
        #[arg(long = "type")]
        types: Vec<ResourceType>,
    },

    /// Start a stopped resource.
    Start { id: ResourceId },

    /// Stop a running resource.
    Stop { id: ResourceId },
}

pub async fn run(app: &App, cmd: ResourcesCommand) -> anyhow::Result<()> {
    match cmd {
        ResourcesCommand::List { account, types } => {
            let filter = ResourceFilter { types };
            let resources = app
                .reconciler
                .list_resources(account, &filter)
                .await
                .map_err(|e| failed(e.kind(), e))?;
            print_json(&resources)
        }
        ResourcesCommand::Start { id } => change_state(app, id, DesiredState::Start).await,
        ResourcesCommand::Stop { id } => change_state(app, id, DesiredState::Stop).await,
    }
}

async fn change_state(app: &App, id: ResourceId, desired: DesiredState) -> anyhow::Result<()> {
    app.reconciler
        .change_state(id, desired)
        .await
        .map_err(|e| failed(e.kind(), e))?;
    print_json(&json!({
        "resource_id": id,
        "action": desired,
        "status": desired.target().as_status(),
    }))
}
