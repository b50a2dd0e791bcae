//! Background snapshot refresh.
//!
//! Every poll interval the runner asks the service whether the tenant's
//! auto-refresh policy is due and, if so, generates a snapshot. A manual
//! trigger forces a run regardless of the policy. Failures are logged and
//! never propagate.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use cashflow_ledger::LedgerConnector;

use crate::config::DEFAULT_REFRESH_POLL_SECS;
use crate::service::CashflowService;
use crate::store::CashflowStore;

/// Config for the auto-refresh runner.
#[derive(Debug, Clone)]
pub struct AutoRefresher {
    pub poll_interval: Duration,
    pub max_retries: u32,
    pub base_backoff: Duration,
}

impl Default for AutoRefresher {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(DEFAULT_REFRESH_POLL_SECS),
            max_retries: 3,
            base_backoff: Duration::from_millis(500),
        }
    }
}

/// Handle for a running refresher (shutdown + manual trigger).
#[derive(Debug)]
pub struct AutoRefresherHandle {
    shutdown: Option<oneshot::Sender<()>>,
    trigger: mpsc::Sender<()>,
    join: Option<JoinHandle<()>>,
}

impl AutoRefresherHandle {
    /// Request a refresh now. Coalesced: a no-op while one is already pending.
    pub fn trigger(&self) {
        let _ = self.trigger.try_send(());
    }

    /// Stop the runner and wait for it to finish its current run.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(join) = self.join.take() {
            let _ = join.await;
        }
    }
}

impl AutoRefresher {
    pub fn with_poll_interval(poll_interval: Duration) -> Self {
        Self {
            poll_interval,
            ..Self::default()
        }
    }

    /// Spawn the runner on the current tokio runtime.
    pub fn spawn<L, S>(
        &self,
        name: &'static str,
        service: Arc<CashflowService<L, S>>,
    ) -> AutoRefresherHandle
    where
        L: LedgerConnector + 'static,
        S: CashflowStore + 'static,
    {
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let (trigger_tx, trigger_rx) = mpsc::channel::<()>(1);

        let cfg = self.clone();
        let join = tokio::spawn(runner_loop(name, cfg, service, shutdown_rx, trigger_rx));

        AutoRefresherHandle {
            shutdown: Some(shutdown_tx),
            trigger: trigger_tx,
            join: Some(join),
        }
    }
}

async fn runner_loop<L, S>(
    name: &'static str,
    cfg: AutoRefresher,
    service: Arc<CashflowService<L, S>>,
    mut shutdown_rx: oneshot::Receiver<()>,
    mut trigger_rx: mpsc::Receiver<()>,
) where
    L: LedgerConnector + 'static,
    S: CashflowStore + 'static,
{
    let tenant_id = service.tenant_id();
    info!(runner = name, tenant = %tenant_id, "auto-refresh runner started");

    let mut ticker = tokio::time::interval(cfg.poll_interval.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let forced = tokio::select! {
            _ = &mut shutdown_rx => break,
            Some(()) = trigger_rx.recv() => true,
            _ = ticker.tick() => false,
        };

        if !forced {
            match service.auto_refresh_due(Utc::now()).await {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) => {
                    warn!(
                        runner = name,
                        tenant = %tenant_id,
                        error = %e,
                        "auto-refresh policy check failed"
                    );
                    continue;
                }
            }
        }

        refresh_with_retries(name, &cfg, &service).await;
    }

    info!(runner = name, tenant = %tenant_id, "auto-refresh runner stopped");
}

async fn refresh_with_retries<L, S>(
    name: &'static str,
    cfg: &AutoRefresher,
    service: &CashflowService<L, S>,
)
where
    L: LedgerConnector,
    S: CashflowStore,
{
    let tenant_id = service.tenant_id();
    let mut attempt: u32 = 0;

    loop {
        match service.generate_snapshot().await {
            Ok(record) => {
                info!(
                    runner = name,
                    tenant = %tenant_id,
                    snapshot_id = %record.id,
                    "auto-refresh snapshot generated"
                );
                return;
            }
            Err(e) if e.status() == 401 => {
                // Reconnecting is a user action; retrying cannot help.
                warn!(
                    runner = name,
                    tenant = %tenant_id,
                    error = %e,
                    "ledger not connected; auto-refresh skipped"
                );
                return;
            }
            Err(e) => {
                attempt += 1;
                warn!(
                    runner = name,
                    tenant = %tenant_id,
                    attempt,
                    error = %e,
                    "auto-refresh snapshot failed"
                );
                if attempt > cfg.max_retries {
                    return;
                }
                tokio::time::sleep(backoff(cfg.base_backoff, attempt)).await;
            }
        }
    }
}

fn backoff(base: Duration, attempt: u32) -> Duration {
    // base * 2^(attempt-1), capped at 30s.
    let pow = 1u32 << attempt.saturating_sub(1).min(10);
    let ms = base.as_millis().saturating_mul(pow as u128);
    Duration::from_millis(ms.min(30_000) as u64)
}
