//! Service wiring shared by every command.

use std::sync::Arc;

use anyhow::Context;
use stratus_adapter_pg::PgStore;
use stratus_audit::{AuditService, MemoryResultsStore, ResultsStore, RuleRegistry};
use stratus_core::StratusConfig;
use stratus_provider_gcp::GcpProvider;
use stratus_runtime::{
    CredentialResolver, GroupStore, HttpCredentialResolver, MemoryGroupStore,
    MemoryResourceStore, ProviderRegistry, ReconciliationService, ResourceGroupService,
    ResourceStore, StaticCredentialResolver, SyncMetrics,
};
use tracing::{info, warn};

/// Services built from one configuration.
pub struct App {
    pub config: StratusConfig,
    pub reconciler: Arc<ReconciliationService>,
    pub groups: ResourceGroupService,
    pub audit: AuditService,
    pub metrics: SyncMetrics,
}

impl App {
    pub async fn init(config: StratusConfig) -> anyhow::Result<Self> {
        let resolver = resolver(&config)?;

        let gcp = GcpProvider::new(config.providers.gcp.clone())
            .context("failed to build the GCP client")?;
        let rules = RuleRegistry::new(stratus_provider_gcp::rules::rules(gcp.client()))?;
        let providers = ProviderRegistry::new().with_provider(Arc::new(gcp));

        let (resources, group_store, results) = stores(&config).await?;

        let metrics = SyncMetrics::new();
        let reconciler = Arc::new(
            ReconciliationService::new(Arc::clone(&resolver), providers, resources)
                .with_metrics(metrics.clone()),
        );
        let groups = ResourceGroupService::new(group_store, Arc::clone(&reconciler));
        let audit = AuditService::new(Arc::new(rules), resolver, results);

        Ok(Self {
            config,
            reconciler,
            groups,
            audit,
            metrics,
        })
    }
}

fn resolver(config: &StratusConfig) -> anyhow::Result<Arc<dyn CredentialResolver>> {
    match &config.registry.url {
        Some(url) => {
            info!(url = %url, "Resolving credentials from the account registry");
            let resolver = HttpCredentialResolver::from_config(&config.registry)
                .context("failed to build the account registry client")?;
            Ok(Arc::new(resolver))
        }
        None => {
            info!(
                accounts = config.registry.accounts.len(),
                "Resolving credentials from inline accounts"
            );
            Ok(Arc::new(StaticCredentialResolver::new(
                config.registry.accounts.iter().cloned(),
            )))
        }
    }
}

type Stores = (
    Arc<dyn ResourceStore>,
    Arc<dyn GroupStore>,
    Arc<dyn ResultsStore>,
);

async fn stores(config: &StratusConfig) -> anyhow::Result<Stores> {
    if config.database.url.is_none() {
        warn!("database.url is not set; state lives in memory and is lost on exit");
        return Ok((
            Arc::new(MemoryResourceStore::new()),
            Arc::new(MemoryGroupStore::new()),
            Arc::new(MemoryResultsStore::new()),
        ));
    }

    let store = PgStore::connect(&config.database)
        .await
        .context("failed to connect to Postgres")?;
    store.bootstrap().await.context("failed to create schema")?;
    let store = Arc::new(store);
    Ok((store.clone(), store.clone(), store))
}
