//! Guarded upstream fetches.
//!
//! Each fetch owns its own [`Warnings`] collector; a failure turns into a
//! warning plus an empty source instead of failing the run.

use std::fmt::Display;
use std::future::Future;

use serde_json::json;

use cashflow_forecast::{
    CashAccounts, ChannelHistory, SettlementChannel, WarningCode, Warnings,
    parse_settlement_entries,
};
use cashflow_ledger::{
    DateRange, JournalEntry, JournalEntryQuery, LedgerConnector, LedgerResult, OpenItem, Pagination,
    RecurringTemplate,
};

/// Journal-entry pages scanned per settlement channel before giving up.
pub const MAX_SETTLEMENT_PAGES: usize = 50;

/// Pages read from any other paginated source before giving up.
pub const MAX_SOURCE_PAGES: usize = 500;

/// Await `fetch`; on error record `code` and fall back to `T::default()`.
pub async fn guarded<T, E, F>(code: WarningCode, source: &str, fetch: F) -> (T, Warnings)
where
    T: Default,
    E: Display,
    F: Future<Output = Result<T, E>>,
{
    let mut warnings = Warnings::new();
    match fetch.await {
        Ok(value) => (value, warnings),
        Err(e) => {
            tracing::warn!(source, error = %e, "source fetch failed; continuing without it");
            warnings.push_with_detail(
                code,
                format!("failed to fetch {source}: {e}"),
                json!({ "source": source, "error": e.to_string() }),
            );
            (T::default(), warnings)
        }
    }
}

/// Placeholder result for a source switched off in the config.
pub fn disabled<T: Default>(source: &str) -> (T, Warnings) {
    let mut warnings = Warnings::new();
    warnings.push_with_detail(
        WarningCode::SourceDisabled,
        format!("{source} excluded by configuration"),
        json!({ "source": source }),
    );
    (T::default(), warnings)
}

/// Rows of a paginated source and whether the page cap cut the read short.
pub type Paged<T> = (Vec<T>, bool);

/// Read pages until a short page or `total_count`, at most [`MAX_SOURCE_PAGES`].
async fn read_pages<T, F, Fut>(page_size: u32, mut fetch_page: F) -> LedgerResult<Paged<T>>
where
    F: FnMut(Pagination) -> Fut,
    Fut: Future<Output = LedgerResult<(Vec<T>, u32)>>,
{
    let mut rows = Vec::new();
    let mut pagination = Pagination::new(page_size);
    for _ in 0..MAX_SOURCE_PAGES {
        let (page, total_count) = fetch_page(pagination).await?;
        let received = page.len() as u32;
        rows.extend(page);
        if received < pagination.limit || rows.len() as u32 >= total_count {
            return Ok((rows, false));
        }
        pagination = pagination.advance(received);
    }
    Ok((rows, true))
}

pub async fn fetch_open_bills<L: LedgerConnector>(
    ledger: &L,
    page_size: u32,
) -> LedgerResult<Paged<OpenItem>> {
    read_pages(page_size, move |p| async move {
        let page = ledger.fetch_open_bills(p).await?;
        Ok((page.items, page.total_count))
    })
    .await
}

pub async fn fetch_open_invoices<L: LedgerConnector>(
    ledger: &L,
    page_size: u32,
) -> LedgerResult<Paged<OpenItem>> {
    read_pages(page_size, move |p| async move {
        let page = ledger.fetch_open_invoices(p).await?;
        Ok((page.items, page.total_count))
    })
    .await
}

pub async fn fetch_recurring<L: LedgerConnector>(
    ledger: &L,
    page_size: u32,
) -> LedgerResult<Paged<RecurringTemplate>> {
    read_pages(page_size, move |p| async move {
        let page = ledger.fetch_recurring_transactions(p).await?;
        Ok((page.templates, page.total_count))
    })
    .await
}

/// [`guarded`] for a paged source; a truncated read adds `SOURCE_TRUNCATED`.
pub async fn guarded_pages<T, F>(code: WarningCode, source: &str, fetch: F) -> (Vec<T>, Warnings)
where
    F: Future<Output = LedgerResult<Paged<T>>>,
{
    let ((rows, truncated), mut warnings) = guarded(code, source, fetch).await;
    if truncated {
        tracing::warn!(source, rows = rows.len(), "source exceeded the page cap");
        warnings.push_with_detail(
            WarningCode::SourceTruncated,
            format!("{source} exceeded {MAX_SOURCE_PAGES} pages; remaining pages were not read"),
            json!({ "source": source, "rows": rows.len() }),
        );
    }
    (rows, warnings)
}

/// Sequential page scan of one channel's journal entries.
///
/// Returns the entries and whether the scan hit [`MAX_SETTLEMENT_PAGES`].
pub async fn fetch_settlement_entries<L: LedgerConnector>(
    ledger: &L,
    channel: &SettlementChannel,
    range: DateRange,
    page_size: u32,
) -> LedgerResult<(Vec<JournalEntry>, bool)> {
    let mut entries = Vec::new();
    let mut pagination = Pagination::new(page_size);
    let prefix = channel.matcher.doc_number_prefix().map(str::to_string);

    for _ in 0..MAX_SETTLEMENT_PAGES {
        let page = ledger
            .fetch_journal_entries(JournalEntryQuery {
                range,
                doc_number_prefix: prefix.clone(),
                pagination,
            })
            .await?;
        let received = page.entries.len() as u32;
        entries.extend(page.entries);
        if received < pagination.limit {
            return Ok((entries, false));
        }
        pagination = pagination.advance(received);
    }

    Ok((entries, true))
}

/// Fetch and parse one channel's history. Never fails.
pub async fn settlement_history<L: LedgerConnector>(
    ledger: &L,
    channel: &SettlementChannel,
    range: DateRange,
    page_size: u32,
    cash: &CashAccounts,
) -> (ChannelHistory, Warnings) {
    let mut warnings = Warnings::new();

    let entries = match fetch_settlement_entries(ledger, channel, range, page_size).await {
        Ok((entries, truncated)) => {
            if truncated {
                warnings.push_with_detail(
                    WarningCode::SettlementHistoryTruncated,
                    format!(
                        "{} settlement history exceeded {MAX_SETTLEMENT_PAGES} pages; \
                         remaining pages were not scanned",
                        channel.label
                    ),
                    json!({ "channel": channel.key, "entries": entries.len() }),
                );
            }
            entries
        }
        Err(e) => {
            tracing::warn!(channel = %channel.key, error = %e, "settlement history fetch failed");
            warnings.push_with_detail(
                WarningCode::SettlementHistoryFetchFailed,
                format!("failed to fetch {} settlement history: {e}", channel.label),
                json!({ "channel": channel.key, "error": e.to_string() }),
            );
            Vec::new()
        }
    };

    let rows = parse_settlement_entries(channel, &entries, cash, &mut warnings);
    (
        ChannelHistory {
            channel: channel.clone(),
            rows,
        },
        warnings,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use cashflow_ledger::{
        InMemoryLedger, JournalLine, LedgerError, LedgerFixture, LedgerSource, PostingType,
    };
    use chrono::NaiveDate;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn entry(i: usize) -> JournalEntry {
        JournalEntry {
            id: format!("je-{i}"),
            doc_number: Some(format!("AMZ-2024010{}", i % 9 + 1)),
            txn_date: d("2024-01-10"),
            lines: vec![JournalLine {
                account_id: Some("35".into()),
                amount: Some(1.0),
                posting_type: PostingType::Debit,
            }],
        }
    }

    fn ledger_with_entries(count: usize) -> InMemoryLedger {
        InMemoryLedger::with_fixture(LedgerFixture {
            journal_entries: (0..count).map(entry).collect(),
            ..LedgerFixture::default()
        })
    }

    #[tokio::test]
    async fn settlement_scan_stops_on_short_page() {
        let ledger = ledger_with_entries(25);
        let channel = SettlementChannel::with_prefix("amazon", "Amazon", "AMZ-");
        let range = DateRange::new(d("2023-07-01"), d("2024-01-31"));

        let (entries, truncated) =
            fetch_settlement_entries(&ledger, &channel, range, 10).await.unwrap();
        assert_eq!(entries.len(), 25);
        assert!(!truncated);
        assert_eq!(ledger.journal_requests(), 3);
    }

    #[tokio::test]
    async fn settlement_scan_is_capped() {
        let ledger = ledger_with_entries(60);
        let channel = SettlementChannel::with_prefix("amazon", "Amazon", "AMZ-");
        let range = DateRange::new(d("2023-07-01"), d("2024-01-31"));
        let cash = CashAccounts::new(["35"]);

        let (history, warnings) = settlement_history(&ledger, &channel, range, 1, &cash).await;
        assert_eq!(history.rows.len(), MAX_SETTLEMENT_PAGES);
        assert!(warnings.contains(WarningCode::SettlementHistoryTruncated));
    }

    #[tokio::test]
    async fn failed_fetch_becomes_warning() {
        let ledger = InMemoryLedger::new();
        ledger.fail(LedgerSource::OpenBills, LedgerError::unauthorized("expired"));

        let (bills, warnings) = guarded_pages(
            WarningCode::OpenBillsFetchFailed,
            "open bills",
            fetch_open_bills(&ledger, 100),
        )
        .await;
        assert!(bills.is_empty());
        assert_eq!(warnings.count(WarningCode::OpenBillsFetchFailed), 1);
    }

    fn bill(i: usize) -> OpenItem {
        OpenItem {
            id: format!("b{i}"),
            counterparty_name: None,
            doc_number: None,
            txn_date: d("2024-01-01"),
            due_date: Some(d("2024-02-01")),
            balance: Some(1.0),
            total: 1.0,
            currency_code: None,
            exchange_rate: None,
        }
    }

    fn ledger_with_bills(count: usize) -> InMemoryLedger {
        InMemoryLedger::with_fixture(LedgerFixture {
            open_bills: (0..count).map(bill).collect(),
            ..LedgerFixture::default()
        })
    }

    #[tokio::test]
    async fn paged_source_reads_every_page() {
        let ledger = ledger_with_bills(250);

        let (bills, truncated) = fetch_open_bills(&ledger, 100).await.unwrap();
        assert_eq!(bills.len(), 250);
        assert!(!truncated);
        assert_eq!(bills[249].id, "b249");
    }

    #[tokio::test]
    async fn paged_source_over_the_cap_is_flagged() {
        let ledger = ledger_with_bills(MAX_SOURCE_PAGES + 5);

        let (bills, warnings) = guarded_pages(
            WarningCode::OpenBillsFetchFailed,
            "open bills",
            fetch_open_bills(&ledger, 1),
        )
        .await;
        assert_eq!(bills.len(), MAX_SOURCE_PAGES);
        assert_eq!(warnings.count(WarningCode::SourceTruncated), 1);
        assert!(!warnings.contains(WarningCode::OpenBillsFetchFailed));
    }
}
