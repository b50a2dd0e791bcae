//! In-memory ledger for tests/dev and for replaying a ledger export file.

use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};

use crate::connector::{LedgerConnector, LedgerError, LedgerResult};
use crate::records::{
    Account, AccountList, DateRange, JournalEntry, JournalEntryPage, JournalEntryQuery, OpenItem,
    OpenItemPage, Pagination, RecurringPage, RecurringTemplate,
};

/// Connector operation, used to inject failures per source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LedgerSource {
    Accounts,
    OpenBills,
    OpenInvoices,
    Recurring,
    JournalEntries,
}

/// Full ledger content, loadable from a JSON export.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LedgerFixture {
    pub accounts: Vec<Account>,
    pub open_bills: Vec<OpenItem>,
    pub open_invoices: Vec<OpenItem>,
    pub recurring: Vec<RecurringTemplate>,
    pub journal_entries: Vec<JournalEntry>,
}

/// In-memory [`LedgerConnector`].
///
/// Paging, doc-number prefix filtering and date filtering behave like the real
/// connector so callers exercise their pagination loops.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    data: RwLock<LedgerFixture>,
    failures: RwLock<HashMap<LedgerSource, LedgerError>>,
    journal_requests: AtomicUsize,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fixture(fixture: LedgerFixture) -> Self {
        Self {
            data: RwLock::new(fixture),
            ..Self::default()
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        Ok(Self::with_fixture(serde_json::from_str(json)?))
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            LedgerError::request(format!("read {}: {e}", path.as_ref().display()))
        })?;
        Self::from_json_str(&raw)
            .map_err(|e| LedgerError::request(format!("parse ledger export: {e}")))
    }

    /// Replace the ledger content.
    pub fn replace(&self, fixture: LedgerFixture) {
        if let Ok(mut data) = self.data.write() {
            *data = fixture;
        }
    }

    /// Make every call to `source` fail with `error` until cleared.
    pub fn fail(&self, source: LedgerSource, error: LedgerError) {
        if let Ok(mut failures) = self.failures.write() {
            failures.insert(source, error);
        }
    }

    pub fn clear_failures(&self) {
        if let Ok(mut failures) = self.failures.write() {
            failures.clear();
        }
    }

    /// Number of journal-entry pages requested so far.
    pub fn journal_requests(&self) -> usize {
        self.journal_requests.load(Ordering::SeqCst)
    }

    fn check(&self, source: LedgerSource) -> LedgerResult<()> {
        let failures = self
            .failures
            .read()
            .map_err(|_| LedgerError::request("failure table poisoned"))?;
        match failures.get(&source) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn snapshot(&self) -> LedgerResult<LedgerFixture> {
        self.data
            .read()
            .map(|d| d.clone())
            .map_err(|_| LedgerError::request("ledger data poisoned"))
    }
}

fn page<T: Clone>(rows: &[T], pagination: Pagination) -> Vec<T> {
    rows.iter()
        .skip(pagination.offset as usize)
        .take(pagination.limit as usize)
        .cloned()
        .collect()
}

#[async_trait::async_trait]
impl LedgerConnector for InMemoryLedger {
    async fn fetch_accounts(&self, _range: Option<DateRange>) -> LedgerResult<AccountList> {
        self.check(LedgerSource::Accounts)?;
        Ok(AccountList {
            accounts: self.snapshot()?.accounts,
        })
    }

    async fn fetch_open_bills(&self, pagination: Pagination) -> LedgerResult<OpenItemPage> {
        self.check(LedgerSource::OpenBills)?;
        let data = self.snapshot()?;
        Ok(OpenItemPage {
            items: page(&data.open_bills, pagination),
            total_count: data.open_bills.len() as u32,
        })
    }

    async fn fetch_open_invoices(&self, pagination: Pagination) -> LedgerResult<OpenItemPage> {
        self.check(LedgerSource::OpenInvoices)?;
        let data = self.snapshot()?;
        Ok(OpenItemPage {
            items: page(&data.open_invoices, pagination),
            total_count: data.open_invoices.len() as u32,
        })
    }

    async fn fetch_recurring_transactions(
        &self,
        pagination: Pagination,
    ) -> LedgerResult<RecurringPage> {
        self.check(LedgerSource::Recurring)?;
        let data = self.snapshot()?;
        Ok(RecurringPage {
            templates: page(&data.recurring, pagination),
            total_count: data.recurring.len() as u32,
        })
    }

    async fn fetch_journal_entries(
        &self,
        query: JournalEntryQuery,
    ) -> LedgerResult<JournalEntryPage> {
        self.journal_requests.fetch_add(1, Ordering::SeqCst);
        self.check(LedgerSource::JournalEntries)?;

        let data = self.snapshot()?;
        let matching: Vec<JournalEntry> = data
            .journal_entries
            .into_iter()
            .filter(|e| query.range.contains(e.txn_date))
            .filter(|e| match (&query.doc_number_prefix, &e.doc_number) {
                (None, _) => true,
                (Some(prefix), Some(doc)) => doc.starts_with(prefix.as_str()),
                (Some(_), None) => false,
            })
            .collect();

        Ok(JournalEntryPage {
            entries: page(&matching, query.pagination),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{JournalLine, PostingType};
    use chrono::NaiveDate;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn entry(id: &str, doc: &str, date: &str) -> JournalEntry {
        JournalEntry {
            id: id.to_string(),
            doc_number: Some(doc.to_string()),
            txn_date: d(date),
            lines: vec![JournalLine {
                account_id: Some("1".to_string()),
                amount: Some(10.0),
                posting_type: PostingType::Debit,
            }],
        }
    }

    #[tokio::test]
    async fn journal_query_filters_prefix_and_range_then_pages() {
        let ledger = InMemoryLedger::with_fixture(LedgerFixture {
            journal_entries: vec![
                entry("1", "AMZ-20240101", "2024-01-02"),
                entry("2", "AMZ-20240115", "2024-01-16"),
                entry("3", "SHOP-20240115", "2024-01-16"),
                entry("4", "AMZ-20230101", "2023-01-02"),
            ],
            ..LedgerFixture::default()
        });

        let query = JournalEntryQuery {
            range: DateRange::new(d("2024-01-01"), d("2024-12-31")),
            doc_number_prefix: Some("AMZ-".to_string()),
            pagination: Pagination::new(1),
        };

        let first = ledger.fetch_journal_entries(query.clone()).await.unwrap();
        assert_eq!(first.entries.len(), 1);
        assert_eq!(first.entries[0].id, "1");

        let second = ledger
            .fetch_journal_entries(JournalEntryQuery {
                pagination: query.pagination.advance(1),
                ..query
            })
            .await
            .unwrap();
        assert_eq!(second.entries[0].id, "2");
        assert_eq!(ledger.journal_requests(), 2);
    }

    #[tokio::test]
    async fn injected_failures_surface_until_cleared() {
        let ledger = InMemoryLedger::new();
        ledger.fail(LedgerSource::Accounts, LedgerError::unauthorized("token expired"));

        let err = ledger.fetch_accounts(None).await.unwrap_err();
        assert!(err.is_auth_failure());

        ledger.clear_failures();
        assert!(ledger.fetch_accounts(None).await.is_ok());
    }

    fn checking_json(balance: f64) -> serde_json::Value {
        serde_json::json!({
            "id": "1",
            "name": "Checking",
            "type": "Bank",
            "active": true,
            "currentBalance": balance
        })
    }

    #[test]
    fn fixture_loads_from_json() {
        let export = serde_json::json!({ "accounts": [checking_json(1500.25)] });
        let ledger = InMemoryLedger::from_json_str(&export.to_string()).unwrap();

        let data = ledger.snapshot().unwrap();
        assert_eq!(data.accounts.len(), 1);
        assert!(data.open_bills.is_empty());
    }

    #[test]
    fn export_with_unmodelled_recurring_type_still_loads() {
        let export = serde_json::json!({
            "accounts": [checking_json(10.0)],
            "recurring": [
                {
                    "id": "r1",
                    "active": true,
                    "transaction": { "type": "invoice", "amount": 5.0 }
                },
                {
                    "id": "r2",
                    "active": true,
                    "transaction": { "type": "purchase", "accountId": "1", "amount": 20.0 }
                }
            ]
        });
        let ledger = InMemoryLedger::from_json_str(&export.to_string()).unwrap();

        let data = ledger.snapshot().unwrap();
        assert_eq!(data.accounts.len(), 1);
        assert_eq!(data.recurring.len(), 2);
        assert_eq!(
            data.recurring[0].transaction,
            crate::records::RecurringTransaction::Unsupported {
                txn_type: "invoice".to_string()
            }
        );
    }
}
