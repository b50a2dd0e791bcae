//! Snapshot orchestration: config resolution, guarded fetches, forecast run,
//! persistence and retention.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use futures::future::join_all;
use tracing::{debug, info, instrument};

use cashflow_core::{AdjustmentId, SnapshotId, TenantId};
use cashflow_forecast::{
    CashflowAdjustment, ChannelHistory, ConfigPatch, EffectiveConfig, NewAdjustment, RunContext,
    RunSources, SnapshotInputs, SnapshotPayload, SnapshotRecord, SnapshotSummary, WarningCode,
    Warnings, forecast_window, resolve_cash_accounts, run_forecast,
};
use cashflow_ledger::{DateRange, LedgerConnector};

use crate::config::CashflowServiceOptions;
use crate::store::CashflowStore;

pub mod error;
pub mod sources;

pub use error::{CashflowResult, CashflowSnapshotError};

/// Cash-flow operations for one tenant.
pub struct CashflowService<L, S> {
    tenant_id: TenantId,
    ledger: L,
    store: S,
    options: CashflowServiceOptions,
}

impl<L, S> CashflowService<L, S>
where
    L: LedgerConnector,
    S: CashflowStore,
{
    pub fn new(tenant_id: TenantId, ledger: L, store: S, options: CashflowServiceOptions) -> Self {
        Self {
            tenant_id,
            ledger,
            store,
            options,
        }
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn options(&self) -> &CashflowServiceOptions {
        &self.options
    }

    /// Today's date in the installation timezone.
    pub fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.options.timezone).date_naive()
    }

    /// The tenant's config, created with defaults on first access.
    pub async fn get_or_create_config(&self) -> CashflowResult<EffectiveConfig> {
        if let Some(config) = self.store.load_config(self.tenant_id).await? {
            return Ok(config);
        }
        let config = EffectiveConfig::defaults(Utc::now());
        self.store.save_config(self.tenant_id, &config).await?;
        info!(tenant_id = %self.tenant_id, "created default cash-flow config");
        Ok(config)
    }

    pub async fn update_config(&self, patch: ConfigPatch) -> CashflowResult<EffectiveConfig> {
        let current = self.get_or_create_config().await?;
        let next = patch.apply(&current, Utc::now())?;
        self.store.save_config(self.tenant_id, &next).await?;
        info!(tenant_id = %self.tenant_id, "cash-flow config updated");
        Ok(next)
    }

    pub async fn generate_snapshot(&self) -> CashflowResult<SnapshotRecord> {
        self.generate_snapshot_as_of(self.today()).await
    }

    /// Run a forecast as of `as_of`, persist it and enforce retention.
    ///
    /// Fails only when the config cannot be resolved, the accounts cannot be
    /// fetched (401 when the ledger is not connected) or the store fails.
    #[instrument(skip(self), fields(tenant_id = %self.tenant_id))]
    pub async fn generate_snapshot_as_of(
        &self,
        as_of: NaiveDate,
    ) -> CashflowResult<SnapshotRecord> {
        info!("cash-flow snapshot run started");
        let config = self.get_or_create_config().await?;
        let accounts = self.ledger.fetch_accounts(None).await?;

        let mut warnings = Warnings::new();
        let selection =
            resolve_cash_accounts(&accounts.accounts, &config.cash_account_ids, &mut warnings);

        let window = forecast_window(as_of, config.week_starts_on, self.options.horizon_weeks);
        let lookback_start = as_of
            .checked_sub_signed(Duration::days(i64::from(config.settlement_lookback_days)))
            .unwrap_or(NaiveDate::MIN);
        let lookback = DateRange::new(lookback_start, as_of);
        let page_size = self.options.ledger_page_size;

        let bills = async {
            if !config.include.open_bills {
                return sources::disabled("open bills");
            }
            sources::guarded_pages(
                WarningCode::OpenBillsFetchFailed,
                "open bills",
                sources::fetch_open_bills(&self.ledger, page_size),
            )
            .await
        };
        let invoices = async {
            if !config.include.open_invoices {
                return sources::disabled("open invoices");
            }
            sources::guarded_pages(
                WarningCode::OpenInvoicesFetchFailed,
                "open invoices",
                sources::fetch_open_invoices(&self.ledger, page_size),
            )
            .await
        };
        let recurring = async {
            if !config.include.recurring {
                return sources::disabled("recurring transactions");
            }
            sources::guarded_pages(
                WarningCode::RecurringFetchFailed,
                "recurring transactions",
                sources::fetch_recurring(&self.ledger, page_size),
            )
            .await
        };
        let settlements = async {
            if !config.include.projected_settlements {
                let (_, w): ((), Warnings) = sources::disabled("projected settlements");
                return (Vec::new(), vec![w]);
            }
            let cash = &selection.cash;
            let scans = self.options.settlement_channels.iter().map(|channel| {
                sources::settlement_history(&self.ledger, channel, lookback, page_size, cash)
            });
            let (histories, channel_warnings): (Vec<ChannelHistory>, Vec<Warnings>) =
                join_all(scans).await.into_iter().unzip();
            (histories, channel_warnings)
        };
        let adjustments = sources::guarded(
            WarningCode::AdjustmentsFetchFailed,
            "adjustments",
            self.store.list_adjustments(self.tenant_id, Some(window)),
        );

        let (
            (open_bills, bill_warnings),
            (open_invoices, invoice_warnings),
            (recurring_templates, recurring_warnings),
            (settlements, settlement_warnings),
            (adjustments, adjustment_warnings),
        ) = tokio::join!(bills, invoices, recurring, settlements, adjustments);

        warnings.extend(bill_warnings);
        warnings.extend(invoice_warnings);
        warnings.extend(recurring_warnings);
        for w in settlement_warnings {
            warnings.extend(w);
        }
        warnings.extend(adjustment_warnings);

        let run_sources = RunSources {
            open_bills,
            open_invoices,
            recurring_templates,
            settlements,
            adjustments,
        };
        let ctx = RunContext {
            as_of,
            horizon_weeks: self.options.horizon_weeks,
            config: &config,
            cash: &selection.cash,
            base_currency: selection.base_currency.as_deref(),
            starting_cash_cents: selection.starting_cash_cents,
        };
        let output = run_forecast(ctx, &run_sources, &mut warnings);
        debug!(events = ?output.events_by_source, "forecast events by source");

        let now = Utc::now();
        let RunSources {
            open_bills,
            open_invoices,
            settlements,
            adjustments,
            ..
        } = run_sources;
        let record = SnapshotRecord {
            id: SnapshotId::new(),
            tenant_id: self.tenant_id,
            created_at: now,
            payload: SnapshotPayload {
                as_of_date: as_of,
                generated_at: now,
                currency_code: selection.base_currency,
                starting_cash_cents: selection.starting_cash_cents,
                config,
                inputs: SnapshotInputs {
                    accounts: selection.rows,
                    open_bills,
                    open_invoices,
                    recurring: output.recurring_rows,
                    settlement_history: settlements.into_iter().flat_map(|h| h.rows).collect(),
                    adjustments,
                },
                forecast: output.forecast,
                warnings: warnings.into_vec(),
            },
        };

        self.store.insert_snapshot(&record).await?;
        let trimmed = self
            .store
            .trim_snapshots(self.tenant_id, self.options.snapshot_retention)
            .await?;
        if trimmed > 0 {
            debug!(trimmed, "old snapshots removed by retention");
        }

        info!(
            snapshot_id = %record.id,
            warnings = record.payload.warnings.len(),
            ending_cash_cents = record.payload.forecast.summary.ending_cash_cents,
            "cash-flow snapshot persisted"
        );
        Ok(record)
    }

    pub async fn latest_snapshot(&self) -> CashflowResult<Option<SnapshotRecord>> {
        Ok(self.store.latest_snapshot(self.tenant_id).await?)
    }

    /// `None` when the id is unknown or belongs to another tenant.
    pub async fn snapshot_by_id(&self, id: SnapshotId) -> CashflowResult<Option<SnapshotRecord>> {
        Ok(self.store.get_snapshot(self.tenant_id, id).await?)
    }

    /// Newest first, at most the retention count.
    pub async fn list_snapshots(&self) -> CashflowResult<Vec<SnapshotSummary>> {
        Ok(self
            .store
            .list_snapshots(self.tenant_id, self.options.snapshot_retention)
            .await?)
    }

    pub async fn list_adjustments(&self) -> CashflowResult<Vec<CashflowAdjustment>> {
        Ok(self.store.list_adjustments(self.tenant_id, None).await?)
    }

    pub async fn create_adjustment(
        &self,
        input: NewAdjustment,
    ) -> CashflowResult<CashflowAdjustment> {
        let adjustment = input.into_adjustment(Utc::now())?;
        self.store.insert_adjustment(self.tenant_id, &adjustment).await?;
        info!(tenant_id = %self.tenant_id, adjustment_id = %adjustment.id, "adjustment created");
        Ok(adjustment)
    }

    pub async fn delete_adjustment(&self, id: AdjustmentId) -> CashflowResult<()> {
        if self.store.delete_adjustment(self.tenant_id, id).await? {
            info!(tenant_id = %self.tenant_id, adjustment_id = %id, "adjustment deleted");
            Ok(())
        } else {
            Err(CashflowSnapshotError::NotFound(format!("adjustment {id}")))
        }
    }

    /// Whether the auto-refresh policy asks for a new snapshot at `now`.
    pub async fn auto_refresh_due(&self, now: DateTime<Utc>) -> CashflowResult<bool> {
        let config = self.get_or_create_config().await?;
        let last = self.store.latest_created_at(self.tenant_id).await?;
        let tz = self.options.timezone;

        let now_local = now.with_timezone(&tz).naive_local();
        let last_local = last.map(|t| t.with_timezone(&tz).naive_local());
        Ok(config.auto_refresh.is_due(now_local, last_local))
    }
}
