//! `stratus sync` - converge the resource registry with live cloud state.

use serde_json::json;
use stratus_core::CloudAccountId;

use super::{error_json, failed, print_json};
use crate::app::App;

pub async fn run(app: &App, account: Option<CloudAccountId>) -> anyhow::Result<()> {
    match account {
        Some(account_id) => {
            let resources = app
                .reconciler
                .sync_one(account_id)
                .await
                .map_err(|e| failed(e.kind(), e))?;
            print_json(&json!({
                "account_id": account_id,
                "resources": resources,
            }))
        }
        None => {
            let summary = app
                .reconciler
                .sync_all()
                .await
                .map_err(|e| failed(e.kind(), e))?;

            let failures: Vec<_> = summary
                .failures
                .iter()
                .map(|f| {
                    json!({
                        "account_id": f.account_id,
                        "error": error_json(f.error.kind(), &f.error),
                    })
                })
                .collect();
            print_json(&json!({
                "succeeded": summary.succeeded,
                "failures": failures,
            }))?;

            if !summary.is_success() {
                anyhow::bail!("{} account(s) failed to sync", summary.failures.len());
            }
            Ok(())
        }
    }
}
