//! Typed records returned by the ledger connector.
//!
//! Amounts are major-unit decimals exactly as the ledger reports them; the
//! forecast mappers convert them to integer cents.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Ledger account with its current balance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: String,
    pub name: String,
    /// Ledger account type, e.g. `"Bank"`, `"Credit Card"`, `"Expense"`.
    #[serde(rename = "type")]
    pub account_type: String,
    #[serde(default)]
    pub sub_type: Option<String>,
    pub active: bool,
    #[serde(default)]
    pub currency_code: Option<String>,
    pub current_balance: f64,
}

impl Account {
    /// Bank-type accounts are the default cash selection.
    pub fn is_bank(&self) -> bool {
        self.account_type.eq_ignore_ascii_case("bank")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountList {
    pub accounts: Vec<Account>,
}

/// Inclusive date window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}

/// Offset-based paging parameters for connector queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    /// Maximum number of records to return.
    pub limit: u32,
    /// Offset of the first record (0-based).
    pub offset: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: 100,
            offset: 0,
        }
    }
}

impl Pagination {
    pub fn new(limit: u32) -> Self {
        Self {
            limit: limit.clamp(1, 1000),
            offset: 0,
        }
    }

    /// Pagination for the page following one that returned `received` rows.
    pub fn advance(self, received: u32) -> Self {
        Self {
            limit: self.limit,
            offset: self.offset.saturating_add(received),
        }
    }
}

/// Open bill (payable) or open invoice (receivable).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenItem {
    pub id: String,
    #[serde(default)]
    pub counterparty_name: Option<String>,
    #[serde(default)]
    pub doc_number: Option<String>,
    pub txn_date: NaiveDate,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    /// Outstanding balance; absent means the full total is outstanding.
    #[serde(default)]
    pub balance: Option<f64>,
    pub total: f64,
    #[serde(default)]
    pub currency_code: Option<String>,
    #[serde(default)]
    pub exchange_rate: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenItemPage {
    pub items: Vec<OpenItem>,
    pub total_count: u32,
}

/// Schedule block of a recurring template, as the ledger stores it.
///
/// Fields stay loosely typed: malformed schedules are reported as warnings by
/// the expander instead of failing deserialization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecurringSchedule {
    #[serde(default)]
    pub interval_type: Option<String>,
    #[serde(default)]
    pub num_interval: Option<i64>,
    #[serde(default)]
    pub next_date: Option<NaiveDate>,
    #[serde(default)]
    pub day_of_month: Option<u32>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
}

/// Transaction shape carried by a recurring template.
///
/// Deserialization never rejects a template for its `type`: anything other
/// than `purchase` or `transfer` becomes [`RecurringTransaction::Unsupported`]
/// so one exotic template cannot invalidate a whole export.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RecurringTransaction {
    Purchase {
        #[serde(default, rename = "accountId")]
        account_id: Option<String>,
        amount: f64,
    },
    Transfer {
        #[serde(default, rename = "fromAccountId")]
        from_account_id: Option<String>,
        #[serde(default, rename = "toAccountId")]
        to_account_id: Option<String>,
        amount: f64,
    },
    /// Any template type the engine does not model (invoices, bills, ...).
    Unsupported {
        #[serde(rename = "txnType")]
        txn_type: String,
    },
}

/// The modelled shapes, as tagged on the wire.
#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum KnownTransaction {
    Purchase {
        #[serde(default, rename = "accountId")]
        account_id: Option<String>,
        amount: f64,
    },
    Transfer {
        #[serde(default, rename = "fromAccountId")]
        from_account_id: Option<String>,
        #[serde(default, rename = "toAccountId")]
        to_account_id: Option<String>,
        amount: f64,
    },
}

impl<'de> Deserialize<'de> for RecurringTransaction {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::Error;

        let raw = serde_json::Value::deserialize(deserializer)?;
        let txn_type = raw
            .get("type")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| D::Error::missing_field("type"))?
            .to_string();

        match txn_type.as_str() {
            "purchase" | "transfer" => {
                let known = KnownTransaction::deserialize(raw).map_err(D::Error::custom)?;
                Ok(match known {
                    KnownTransaction::Purchase { account_id, amount } => {
                        RecurringTransaction::Purchase { account_id, amount }
                    }
                    KnownTransaction::Transfer {
                        from_account_id,
                        to_account_id,
                        amount,
                    } => RecurringTransaction::Transfer {
                        from_account_id,
                        to_account_id,
                        amount,
                    },
                })
            }
            // Round-trip of our own serialized form.
            "unsupported" => Ok(RecurringTransaction::Unsupported {
                txn_type: raw
                    .get("txnType")
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or("unsupported")
                    .to_string(),
            }),
            _ => Ok(RecurringTransaction::Unsupported { txn_type }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecurringTemplate {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub active: bool,
    #[serde(default)]
    pub schedule: RecurringSchedule,
    #[serde(default)]
    pub currency_code: Option<String>,
    pub transaction: RecurringTransaction,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecurringPage {
    pub templates: Vec<RecurringTemplate>,
    pub total_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostingType {
    Debit,
    Credit,
}

/// One side of a journal entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JournalLine {
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub amount: Option<f64>,
    pub posting_type: PostingType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JournalEntry {
    pub id: String,
    #[serde(default)]
    pub doc_number: Option<String>,
    pub txn_date: NaiveDate,
    pub lines: Vec<JournalLine>,
}

/// Journal entry query: date window, optional doc-number prefix, paging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntryQuery {
    pub range: DateRange,
    pub doc_number_prefix: Option<String>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JournalEntryPage {
    pub entries: Vec<JournalEntry>,
}
