//! Persisted artefacts: manual adjustments and forecast snapshots.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use cashflow_core::{AdjustmentId, Cents, DomainError, DomainResult, SnapshotId, TenantId};
use cashflow_ledger::OpenItem;

use crate::aggregator::CashflowForecast;
use crate::config::EffectiveConfig;
use crate::event::{CashflowEvent, EventSource};
use crate::mappers::RecurringRow;
use crate::settlements::SettlementHistoryRow;
use crate::warning::CashflowWarning;

/// Account as seen by a run, with its balance in cents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountBalanceRow {
    pub id: String,
    pub name: String,
    pub account_type: String,
    pub currency_code: Option<String>,
    pub balance_cents: Cents,
    pub selected: bool,
}

/// User-entered one-off cash movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CashflowAdjustment {
    pub id: AdjustmentId,
    pub date: NaiveDate,
    pub amount_cents: Cents,
    pub description: String,
    #[serde(default)]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl CashflowAdjustment {
    pub fn to_event(&self) -> CashflowEvent {
        CashflowEvent::new(
            self.date,
            self.amount_cents,
            self.description.clone(),
            EventSource::ManualAdjustment,
        )
        .with_meta("adjustmentId", self.id.to_string())
        .with_meta_opt("notes", self.notes.clone())
    }
}

/// Adjustment creation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAdjustment {
    pub date: NaiveDate,
    pub amount_cents: Cents,
    pub description: String,
    #[serde(default)]
    pub notes: Option<String>,
}

impl NewAdjustment {
    pub fn validate(&self) -> DomainResult<()> {
        if self.description.trim().is_empty() {
            return Err(DomainError::validation("adjustment description must not be empty"));
        }
        if self.amount_cents == 0 {
            return Err(DomainError::validation("adjustment amount must not be zero"));
        }
        Ok(())
    }

    pub fn into_adjustment(self, now: DateTime<Utc>) -> DomainResult<CashflowAdjustment> {
        self.validate()?;
        let notes = self
            .notes
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());

        Ok(CashflowAdjustment {
            id: AdjustmentId::new(),
            date: self.date,
            amount_cents: self.amount_cents,
            description: self.description.trim().to_string(),
            notes,
            created_at: now,
        })
    }
}

/// Raw inputs of a run, kept for audit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotInputs {
    pub accounts: Vec<AccountBalanceRow>,
    pub open_bills: Vec<OpenItem>,
    pub open_invoices: Vec<OpenItem>,
    pub recurring: Vec<RecurringRow>,
    pub settlement_history: Vec<SettlementHistoryRow>,
    pub adjustments: Vec<CashflowAdjustment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotPayload {
    pub as_of_date: NaiveDate,
    pub generated_at: DateTime<Utc>,
    /// Base currency of the selected cash accounts, if known.
    pub currency_code: Option<String>,
    pub starting_cash_cents: Cents,
    pub config: EffectiveConfig,
    pub inputs: SnapshotInputs,
    pub forecast: CashflowForecast,
    pub warnings: Vec<CashflowWarning>,
}

/// Immutable, persisted forecast run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotRecord {
    pub id: SnapshotId,
    pub tenant_id: TenantId,
    pub created_at: DateTime<Utc>,
    pub payload: SnapshotPayload,
}

impl SnapshotRecord {
    pub fn summary(&self) -> SnapshotSummary {
        let summary = &self.payload.forecast.summary;
        SnapshotSummary {
            id: self.id,
            created_at: self.created_at,
            as_of_date: self.payload.as_of_date,
            currency_code: self.payload.currency_code.clone(),
            starting_cash_cents: summary.starting_cash_cents,
            ending_cash_cents: summary.ending_cash_cents,
            min_ending_cash_cents: summary.min_ending_cash_cents,
            warning_count: self.payload.warnings.len(),
        }
    }
}

/// Listing view of a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotSummary {
    pub id: SnapshotId,
    pub created_at: DateTime<Utc>,
    pub as_of_date: NaiveDate,
    pub currency_code: Option<String>,
    pub starting_cash_cents: Cents,
    pub ending_cash_cents: Cents,
    pub min_ending_cash_cents: Cents,
    pub warning_count: usize,
}
