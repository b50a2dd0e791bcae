//! Structured diagnostics collected during a forecast run.
//!
//! Warnings never abort a run. Every mapping function receives a `&mut
//! Warnings`; concurrent fetches each own a collector and the orchestrator
//! merges them afterwards.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WarningCode {
    // Open items
    OpenBillMissingDuedate,
    OpenInvoiceMissingDuedate,
    OpenBillForeignCurrency,
    OpenInvoiceForeignCurrency,

    // Recurring templates
    RecurringPurchaseMissingAccount,
    RecurringTransferMissingAccounts,
    RecurringTemplateUnsupported,
    RecurringForeignCurrency,
    RecurringIntervalMissing,
    RecurringUnsupportedInterval,
    RecurringInvalidNumInterval,
    RecurringNextDateMissing,
    RecurringStuckSchedule,

    // Settlements
    SettlementDocnumberUnparseable,
    SettlementHistoryTruncated,
    SettlementHistoryInsufficient,

    // Cash accounts
    NoCashAccountsSelected,
    CashAccountNotFound,
    MultiCurrencySelectedAccounts,

    // Source fetches
    OpenBillsFetchFailed,
    OpenInvoicesFetchFailed,
    RecurringFetchFailed,
    SettlementHistoryFetchFailed,
    AdjustmentsFetchFailed,
    SourceTruncated,
    SourceDisabled,
}

impl WarningCode {
    pub fn as_str(self) -> &'static str {
        match self {
            WarningCode::OpenBillMissingDuedate => "OPEN_BILL_MISSING_DUEDATE",
            WarningCode::OpenInvoiceMissingDuedate => "OPEN_INVOICE_MISSING_DUEDATE",
            WarningCode::OpenBillForeignCurrency => "OPEN_BILL_FOREIGN_CURRENCY",
            WarningCode::OpenInvoiceForeignCurrency => "OPEN_INVOICE_FOREIGN_CURRENCY",
            WarningCode::RecurringPurchaseMissingAccount => "RECURRING_PURCHASE_MISSING_ACCOUNT",
            WarningCode::RecurringTransferMissingAccounts => "RECURRING_TRANSFER_MISSING_ACCOUNTS",
            WarningCode::RecurringTemplateUnsupported => "RECURRING_TEMPLATE_UNSUPPORTED",
            WarningCode::RecurringForeignCurrency => "RECURRING_FOREIGN_CURRENCY",
            WarningCode::RecurringIntervalMissing => "RECURRING_INTERVAL_MISSING",
            WarningCode::RecurringUnsupportedInterval => "RECURRING_UNSUPPORTED_INTERVAL",
            WarningCode::RecurringInvalidNumInterval => "RECURRING_INVALID_NUM_INTERVAL",
            WarningCode::RecurringNextDateMissing => "RECURRING_NEXT_DATE_MISSING",
            WarningCode::RecurringStuckSchedule => "RECURRING_STUCK_SCHEDULE",
            WarningCode::SettlementDocnumberUnparseable => "SETTLEMENT_DOCNUMBER_UNPARSEABLE",
            WarningCode::SettlementHistoryTruncated => "SETTLEMENT_HISTORY_TRUNCATED",
            WarningCode::SettlementHistoryInsufficient => "SETTLEMENT_HISTORY_INSUFFICIENT",
            WarningCode::NoCashAccountsSelected => "NO_CASH_ACCOUNTS_SELECTED",
            WarningCode::CashAccountNotFound => "CASH_ACCOUNT_NOT_FOUND",
            WarningCode::MultiCurrencySelectedAccounts => "MULTI_CURRENCY_SELECTED_ACCOUNTS",
            WarningCode::OpenBillsFetchFailed => "OPEN_BILLS_FETCH_FAILED",
            WarningCode::OpenInvoicesFetchFailed => "OPEN_INVOICES_FETCH_FAILED",
            WarningCode::RecurringFetchFailed => "RECURRING_FETCH_FAILED",
            WarningCode::SettlementHistoryFetchFailed => "SETTLEMENT_HISTORY_FETCH_FAILED",
            WarningCode::AdjustmentsFetchFailed => "ADJUSTMENTS_FETCH_FAILED",
            WarningCode::SourceTruncated => "SOURCE_TRUNCATED",
            WarningCode::SourceDisabled => "SOURCE_DISABLED",
        }
    }
}

impl core::fmt::Display for WarningCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CashflowWarning {
    pub code: WarningCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<JsonValue>,
}

/// Append-only warning collector.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Warnings {
    items: Vec<CashflowWarning>,
}

impl Warnings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, code: WarningCode, message: impl Into<String>) {
        self.items.push(CashflowWarning {
            code,
            message: message.into(),
            detail: None,
        });
    }

    pub fn push_with_detail(
        &mut self,
        code: WarningCode,
        message: impl Into<String>,
        detail: JsonValue,
    ) {
        self.items.push(CashflowWarning {
            code,
            message: message.into(),
            detail: Some(detail),
        });
    }

    /// Merge another collector, preserving order.
    pub fn extend(&mut self, other: Warnings) {
        self.items.extend(other.items);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn count(&self, code: WarningCode) -> usize {
        self.items.iter().filter(|w| w.code == code).count()
    }

    pub fn contains(&self, code: WarningCode) -> bool {
        self.items.iter().any(|w| w.code == code)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CashflowWarning> {
        self.items.iter()
    }

    pub fn into_vec(self) -> Vec<CashflowWarning> {
        self.items
    }
}
