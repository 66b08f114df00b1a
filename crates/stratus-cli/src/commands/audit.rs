//! `stratus audit` - run compliance rules and read back their results.

use std::collections::BTreeMap;

use clap::{ArgGroup, Subcommand};
use serde_json::json;
use stratus_audit::CategoryRun;
use stratus_core::CloudAccountId;

use super::{error_json, failed, print_json};
use crate::app::App;

#[derive(Subcommand, Debug)]
pub enum AuditCommand {
    /// List registered rules.
    Rules,

    /// Evaluate one rule, one category or every rule against an account.
    #[command(group(
        ArgGroup::new("target")
            .required(true)
            .args(["rule", "category", "all"]),
    ))]
    Run {
        #[arg(long)]
        account: CloudAccountId,
        #[arg(long)]
        rule: Option<String>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long, default_value_t = false)]
        all: bool,
    },

    /// Latest stored results of an account.
    Results {
        #[arg(long)]
        account: CloudAccountId,
        #[arg(long, conflicts_with = "category")]
        rule: Option<String>,
        #[arg(long)]
        category: Option<String>,
    },
}

pub async fn run(app: &App, cmd: AuditCommand) -> anyhow::Result<()> {
    let audit = &app.audit;
    match cmd {
        AuditCommand::Rules => print_json(&audit.registry().describe()),

        AuditCommand::Run {
            account,
            rule: Some(rule),
            ..
        } => {
            let result = audit
                .run_by_id(&rule, account)
                .await
                .map_err(|e| failed(e.kind(), e))?;
            print_json(&result)
        }
        AuditCommand::Run {
            account,
            category: Some(category),
            ..
        } => {
            let run = audit
                .run_by_category(&category, account)
                .await
                .map_err(|e| failed(e.kind(), e))?;
            print_json(&run_json(&run))?;
            check_failures(run.failures.len())
        }
        AuditCommand::Run { account, .. } => {
            let runs = audit
                .run_all(account)
                .await
                .map_err(|e| failed(e.kind(), e))?;
            let report: BTreeMap<_, _> = runs
                .iter()
                .map(|(category, run)| (category.clone(), run_json(run)))
                .collect();
            print_json(&report)?;
            check_failures(runs.values().map(|r| r.failures.len()).sum())
        }

        AuditCommand::Results {
            account,
            rule: Some(rule),
            ..
        } => {
            let result = audit
                .get_result_by_id(&rule, account)
                .await
                .map_err(|e| failed(e.kind(), e))?;
            print_json(&result)
        }
        AuditCommand::Results {
            account,
            category: Some(category),
            ..
        } => {
            let results = audit
                .get_results_by_category(&category, account)
                .await
                .map_err(|e| failed(e.kind(), e))?;
            print_json(&results)
        }
        AuditCommand::Results { account, .. } => {
            let results = audit
                .get_all_results(account)
                .await
                .map_err(|e| failed(e.kind(), e))?;
            print_json(&results)
        }
    }
}

fn run_json(run: &CategoryRun) -> serde_json::Value {
    let failures: Vec<_> = run
        .failures
        .iter()
        .map(|f| json!({ "rule_id": f.rule_id, "error": error_json(f.error.kind(), &f.error) }))
        .collect();
    json!({
        "category": run.category,
        "results": run.results,
        "failures": failures,
    })
}

fn check_failures(count: usize) -> anyhow::Result<()> {
    if count > 0 {
        anyhow::bail!("{count} rule(s) failed");
    }
    Ok(())
}
