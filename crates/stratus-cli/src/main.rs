use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use stratus::App;
use stratus::commands::{self, audit::AuditCommand, groups::GroupsCommand, resources::ResourcesCommand};
use stratus_core::{CloudAccountId, StratusConfig};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "stratus", version, about = "Stratus resource reconciliation and audit CLI")]
struct Cli {
    /// Path to the configuration file.
    #[arg(long, short, global = true, env = "STRATUS_CONFIG", default_value = "stratus.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Converge stored resources with live cloud state.
    Sync {
        /// Sync a single account instead of every known one.
        #[arg(long)]
        account: Option<CloudAccountId>,
    },

    /// Stored resources and start/stop.
    Resources {
        #[command(subcommand)]
        cmd: ResourcesCommand,
    },

    /// Resource groups.
    Groups {
        #[command(subcommand)]
        cmd: GroupsCommand,
    },

    /// Compliance rules and their results.
    Audit {
        #[command(subcommand)]
        cmd: AuditCommand,
    },

    /// Run the periodic sync driver with /healthz and /metrics endpoints.
    Daemon,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = StratusConfig::load(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;

    // RUST_LOG wins over the configured filter
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.observability.log_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Some(project) = &config.project {
        tracing::info!(project = %project, "Loaded configuration");
    }

    let app = App::init(config).await?;

    match cli.cmd {
        Command::Sync { account } => commands::sync::run(&app, account).await,
        Command::Resources { cmd } => commands::resources::run(&app, cmd).await,
        Command::Groups { cmd } => commands::groups::run(&app, cmd).await,
        Command::Audit { cmd } => commands::audit::run(&app, cmd).await,
        Command::Daemon => commands::daemon::run(app).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audit_run_needs_exactly_one_target() {
        assert!(Cli::try_parse_from(["stratus", "audit", "run", "--account", "1"]).is_err());
        assert!(
            Cli::try_parse_from([
                "stratus", "audit", "run", "--account", "1", "--all", "--rule", "x",
            ])
            .is_err()
        );
        let cli = Cli::try_parse_from([
            "stratus", "audit", "run", "--account", "1", "--category", "overprovision",
        ])
        .unwrap();
        assert!(matches!(
            cli.cmd,
            Command::Audit {
                cmd: AuditCommand::Run { category: Some(_), all: false, .. }
            }
        ));
    }

    #[test]
    fn test_resource_types_parse_case_insensitively() {
        let cli = Cli::try_parse_from([
            "stratus", "-c", "x.yaml", "resources", "list", "--account", "3", "--type", "sql",
            "--type", "VM",
        ])
        .unwrap();
        assert_eq!(cli.config, PathBuf::from("x.yaml"));
        let Command::Resources {
            cmd: ResourcesCommand::List { account, types },
        } = cli.cmd
        else {
            panic!("expected resources list");
        };
        assert_eq!(account, 3);
        assert_eq!(
            types,
            vec![stratus_core::ResourceType::Sql, stratus_core::ResourceType::Vm]
        );
    }
}
