//! Background worker: keeps a tenant's cash-flow snapshots fresh.
//!
//! Reads settings from the environment, wires the ledger and the store, then
//! runs the auto-refresher until Ctrl-C.

use std::sync::Arc;

use anyhow::Context;
use sqlx::PgPool;

use cashflow_infra::{
    AutoRefresher, CashflowService, CashflowStore, InMemoryCashflowStore, PostgresCashflowStore,
    ServiceSettings,
};
use cashflow_ledger::InMemoryLedger;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cashflow_observability::init();

    let settings = ServiceSettings::from_env();
    let ledger = Arc::new(load_ledger(&settings));

    match settings.database_url.as_deref() {
        Some(url) => {
            let pool = PgPool::connect(url).await.context("connect to Postgres")?;
            let store = PostgresCashflowStore::new(pool);
            store.ensure_schema().await.context("apply cash-flow schema")?;
            run(settings, ledger, Arc::new(store)).await
        }
        None => {
            tracing::warn!("CASHFLOW_DATABASE_URL not set; snapshots are kept in memory only");
            run(settings, ledger, Arc::new(InMemoryCashflowStore::new())).await
        }
    }
}

fn load_ledger(settings: &ServiceSettings) -> InMemoryLedger {
    let Some(path) = settings.ledger_export.as_ref() else {
        tracing::warn!("CASHFLOW_LEDGER_EXPORT not set; starting with an empty ledger");
        return InMemoryLedger::new();
    };
    match InMemoryLedger::from_json_file(path) {
        Ok(ledger) => {
            tracing::info!(path = %path.display(), "ledger export loaded");
            ledger
        }
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "ledger export unreadable; starting with an empty ledger"
            );
            InMemoryLedger::new()
        }
    }
}

async fn run<S>(
    settings: ServiceSettings,
    ledger: Arc<InMemoryLedger>,
    store: Arc<S>,
) -> anyhow::Result<()>
where
    S: CashflowStore + 'static,
{
    let service = Arc::new(CashflowService::new(
        settings.tenant_id,
        ledger,
        store,
        settings.service_options(),
    ));

    let config = service
        .get_or_create_config()
        .await
        .context("load cash-flow config")?;
    tracing::info!(
        tenant_id = %settings.tenant_id,
        timezone = %settings.timezone,
        auto_refresh = config.auto_refresh.enabled,
        channels = settings.settlement_channels.len(),
        "cash-flow worker starting"
    );

    let refresher = AutoRefresher::with_poll_interval(settings.refresh_poll);
    let handle = refresher.spawn("cashflow.auto_refresh", service);

    tokio::signal::ctrl_c().await.context("wait for shutdown signal")?;
    tracing::info!("shutdown requested");
    handle.shutdown().await;
    Ok(())
}
