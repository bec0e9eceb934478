use std::sync::Arc;

use replenish_infra::{
    EngineConfig, HistoryReader, InMemoryProductStore, LedgerBackend, PostgresLedger,
    ProductStore, ProviderRegistry, ReplenishmentEngine, providers::DryRunProvider,
};
use replenish_workflow::CapabilityAction;

/// Everything the handlers need.
pub struct AppServices {
    pub engine: ReplenishmentEngine,
    /// Product data fed by `POST /observations`; also the history source.
    pub store: Arc<InMemoryProductStore>,
}

impl AppServices {
    /// In-memory ledger and product store (dev/test).
    pub fn in_memory(config: EngineConfig, providers: ProviderRegistry) -> Self {
        let (engine, store) = ReplenishmentEngine::in_memory(config, providers);
        Self { engine, store }
    }
}

/// Wire services from configuration.
///
/// With `USE_PERSISTENT_STORES=true` the ledger lives in Postgres and its
/// schema is applied on startup; products are always kept in memory.
pub async fn build_services(config: EngineConfig) -> anyhow::Result<AppServices> {
    let providers = build_providers(&config)?;

    if !config.use_persistent_stores {
        return Ok(AppServices::in_memory(config, providers));
    }

    let url = config
        .database_url
        .clone()
        .ok_or_else(|| anyhow::anyhow!("USE_PERSISTENT_STORES=true requires DATABASE_URL"))?;
    let ledger = PostgresLedger::connect(&url).await?;
    ledger.ensure_schema().await?;
    tracing::info!("using postgres ledger");

    let store = Arc::new(
        InMemoryProductStore::new().with_default_thresholds(config.default_thresholds.clone()),
    );
    let engine = ReplenishmentEngine::new(
        config,
        Arc::new(ledger) as Arc<dyn LedgerBackend>,
        Arc::clone(&store) as Arc<dyn ProductStore>,
        Arc::clone(&store) as Arc<dyn HistoryReader>,
        providers,
    );
    Ok(AppServices { engine, store })
}

fn build_providers(config: &EngineConfig) -> anyhow::Result<ProviderRegistry> {
    if config.providers.is_empty() {
        tracing::warn!("REPLENISH_PROVIDERS not set; actions are logged only");
        return Ok(ProviderRegistry::new().with(Arc::new(DryRunProvider::new(
            "dry-run",
            CapabilityAction::LogRow,
        ))));
    }
    Ok(ProviderRegistry::from_endpoints(
        &config.providers,
        config.provider_timeout,
    )?)
}
