//! Cash-flow forecasting engine.
//!
//! Pure domain logic only: no IO, no persistence, no async. Raw ledger records
//! go in, normalized [`CashflowEvent`]s and a weekly [`CashflowForecast`] come
//! out, with every anomaly recorded in a [`Warnings`] collector instead of
//! aborting the run.

pub mod aggregator;
pub mod config;
pub mod dates;
pub mod engine;
pub mod event;
pub mod mappers;
pub mod recurring;
pub mod settlements;
pub mod snapshot;
pub mod warning;

pub use aggregator::{
    CashflowForecast, CashflowWeek, DEFAULT_HORIZON_WEEKS, ForecastInput, ForecastSummary,
    build_forecast, forecast_window,
};
pub use config::{AutoRefreshPolicy, ConfigPatch, EffectiveConfig, SourceToggles, TimeOfDay};
pub use engine::{
    CashSelection, ChannelHistory, RunContext, RunOutput, RunSources, resolve_cash_accounts,
    run_forecast,
};
pub use event::{CashflowEvent, EventMeta, EventSource};
pub use mappers::{
    CashAccounts, RecurringRow, classify_recurring, map_open_bills, map_open_invoices,
};
pub use recurring::{IntervalType, expand_recurring};
pub use settlements::{
    PrefixDateMatcher, SettlementChannel, SettlementDocMatcher, SettlementHistoryRow,
    SettlementProjectionParams, journal_cash_impact, parse_settlement_entries,
    project_settlements,
};
pub use snapshot::{
    AccountBalanceRow, CashflowAdjustment, NewAdjustment, SnapshotInputs, SnapshotPayload,
    SnapshotRecord, SnapshotSummary,
};
pub use warning::{CashflowWarning, WarningCode, Warnings};
