//! Settlement history parsing and forward projection.
//!
//! A settlement channel is a periodic payout stream (e.g. a marketplace paying
//! out sales every two weeks). Its batches are recognised in the ledger by a
//! document-number convention, which is pluggable through
//! [`SettlementDocMatcher`].

use std::fmt;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;

use cashflow_core::{Cents, money::mean_cents, to_cents};
use cashflow_ledger::{JournalEntry, PostingType};

use crate::dates::{add_days, days_between};
use crate::event::{CashflowEvent, EventSource};
use crate::mappers::CashAccounts;
use crate::warning::{WarningCode, Warnings};

/// Safety cap on projected steps per channel.
const MAX_PROJECTED_STEPS: usize = 1_000;

/// Recognises one channel's settlement document numbers.
pub trait SettlementDocMatcher: Send + Sync + fmt::Debug {
    /// Prefix handed to the connector to narrow journal-entry queries.
    fn doc_number_prefix(&self) -> Option<&str>;

    /// Whether `doc_number` belongs to this channel.
    fn matches(&self, doc_number: &str) -> bool;

    /// Settlement period end encoded in `doc_number`, if parseable.
    fn parse_period_end(&self, doc_number: &str) -> Option<NaiveDate>;
}

/// `<PREFIX><date>` convention.
///
/// The suffix may be `YYYYMMDD`, `YYYY-MM-DD`, or a `<start>-<end>` /
/// `<start>_<end>` range of either form, in which case the end date wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixDateMatcher {
    prefix: String,
}

impl PrefixDateMatcher {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    fn parse_date(raw: &str) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(raw, "%Y%m%d")
            .or_else(|_| NaiveDate::parse_from_str(raw, "%Y-%m-%d"))
            .ok()
    }
}

impl SettlementDocMatcher for PrefixDateMatcher {
    fn doc_number_prefix(&self) -> Option<&str> {
        Some(self.prefix.as_str())
    }

    fn matches(&self, doc_number: &str) -> bool {
        doc_number.starts_with(self.prefix.as_str())
    }

    fn parse_period_end(&self, doc_number: &str) -> Option<NaiveDate> {
        let suffix = doc_number.strip_prefix(self.prefix.as_str())?.trim();
        if let Some(date) = Self::parse_date(suffix) {
            return Some(date);
        }

        // Compact range: YYYYMMDD-YYYYMMDD or YYYYMMDD_YYYYMMDD.
        if let Some((start, end)) = suffix.split_once(['_', '-']) {
            if Self::parse_date(start).is_some() {
                if let Some(date) = Self::parse_date(end) {
                    return Some(date);
                }
            }
        }

        // Dashed range: YYYY-MM-DD_YYYY-MM-DD or YYYY-MM-DD-YYYY-MM-DD.
        if suffix.len() == 21 {
            let (start, rest) = suffix.split_at_checked(10)?;
            let end = rest.get(1..)?;
            if Self::parse_date(start).is_some() {
                return Self::parse_date(end);
            }
        }

        None
    }
}

/// A named settlement stream.
#[derive(Debug, Clone)]
pub struct SettlementChannel {
    pub key: String,
    pub label: String,
    pub matcher: Arc<dyn SettlementDocMatcher>,
}

impl SettlementChannel {
    pub fn new(
        key: impl Into<String>,
        label: impl Into<String>,
        matcher: Arc<dyn SettlementDocMatcher>,
    ) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
            matcher,
        }
    }

    /// Channel using the [`PrefixDateMatcher`] convention.
    pub fn with_prefix(
        key: impl Into<String>,
        label: impl Into<String>,
        prefix: impl Into<String>,
    ) -> Self {
        Self::new(key, label, Arc::new(PrefixDateMatcher::new(prefix)))
    }
}

/// One historical settlement batch as recorded in the snapshot inputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementHistoryRow {
    pub channel: String,
    pub journal_entry_id: String,
    pub doc_number: Option<String>,
    pub txn_date: NaiveDate,
    pub period_end: Option<NaiveDate>,
    /// Net effect on cash accounts; `None` when no line touches one.
    pub cash_impact_cents: Option<Cents>,
}

/// Net cash effect of a journal entry (debits +, credits −), restricted to
/// cash-account lines. `None` if no line touches a cash account.
pub fn journal_cash_impact(entry: &JournalEntry, cash: &CashAccounts) -> Option<Cents> {
    let mut found = false;
    let mut total: Cents = 0;

    for line in &entry.lines {
        let Some(account_id) = line.account_id.as_deref() else {
            continue;
        };
        if !cash.contains(account_id) {
            continue;
        }
        found = true;
        let cents = to_cents(line.amount.unwrap_or(0.0).abs());
        total += match line.posting_type {
            PostingType::Debit => cents,
            PostingType::Credit => -cents,
        };
    }

    found.then_some(total)
}

/// Turn one channel's journal entries into history rows.
///
/// Entries outside the channel's convention are ignored. Entries matching the
/// channel but with an unparseable period end are kept with `period_end =
/// None` and a warning.
pub fn parse_settlement_entries(
    channel: &SettlementChannel,
    entries: &[JournalEntry],
    cash: &CashAccounts,
    warnings: &mut Warnings,
) -> Vec<SettlementHistoryRow> {
    let mut rows = Vec::new();

    for entry in entries {
        let Some(doc_number) = entry.doc_number.as_deref() else {
            continue;
        };
        if !channel.matcher.matches(doc_number) {
            continue;
        }

        let period_end = channel.matcher.parse_period_end(doc_number);
        if period_end.is_none() {
            warnings.push_with_detail(
                WarningCode::SettlementDocnumberUnparseable,
                format!(
                    "{} settlement {doc_number} has no recognisable period end",
                    channel.label
                ),
                json!({
                    "channel": channel.key,
                    "journalEntryId": entry.id,
                    "docNumber": doc_number,
                }),
            );
        }

        rows.push(SettlementHistoryRow {
            channel: channel.key.clone(),
            journal_entry_id: entry.id.clone(),
            doc_number: Some(doc_number.to_string()),
            txn_date: entry.txn_date,
            period_end,
            cash_impact_cents: journal_cash_impact(entry, cash),
        });
    }

    rows
}

/// Projection knobs, resolved from the effective config and the horizon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettlementProjectionParams {
    pub as_of: NaiveDate,
    pub forecast_end: NaiveDate,
    pub average_count: u32,
    pub default_interval_days: u32,
    pub lag_days: u32,
}

/// Project future settlements of one channel from its history.
///
/// Uses the latest `average_count` rows that have both a period end and a
/// cash impact. The amount is their mean; the interval is the mean gap
/// between consecutive period ends, or `default_interval_days` with fewer than
/// two rows.
pub fn project_settlements(
    channel: &SettlementChannel,
    history: &[SettlementHistoryRow],
    params: SettlementProjectionParams,
    warnings: &mut Warnings,
) -> Vec<CashflowEvent> {
    let mut usable: Vec<(NaiveDate, Cents)> = history
        .iter()
        .filter(|r| r.channel == channel.key)
        .filter_map(|r| Some((r.period_end?, r.cash_impact_cents?)))
        .collect();

    usable.sort_by(|a, b| b.0.cmp(&a.0));
    usable.truncate(params.average_count.max(1) as usize);
    usable.reverse();

    if usable.is_empty() {
        warnings.push_with_detail(
            WarningCode::SettlementHistoryInsufficient,
            format!("{} has no usable settlement history; nothing projected", channel.label),
            json!({ "channel": channel.key, "historyRows": history.len() }),
        );
        return Vec::new();
    }

    let amounts: Vec<Cents> = usable.iter().map(|(_, c)| *c).collect();
    let amount = mean_cents(&amounts).unwrap_or(0);
    let interval_days =
        average_interval_days(&usable).unwrap_or(params.default_interval_days as i64);
    let based_on = usable.len();
    let mut period_end = usable.last().map(|(d, _)| *d).unwrap_or(params.as_of);

    tracing::debug!(
        channel = %channel.key,
        based_on,
        interval_days,
        amount_cents = amount,
        "projecting settlements"
    );

    let mut events = Vec::new();
    for _ in 0..MAX_PROJECTED_STEPS {
        let Some(next_period) = add_days(period_end, interval_days) else {
            break;
        };
        let Some(cash_date) = add_days(next_period, params.lag_days as i64) else {
            break;
        };
        if cash_date > params.forecast_end {
            break;
        }
        period_end = next_period;

        if cash_date < params.as_of || amount == 0 {
            continue;
        }

        events.push(
            CashflowEvent::new(
                cash_date,
                amount,
                format!("{} settlement (projected)", channel.label),
                EventSource::ProjectedSettlement,
            )
            .with_meta("channel", channel.key.clone())
            .with_meta("periodEnd", next_period.to_string())
            .with_meta("basedOnCount", based_on)
            .with_meta("intervalDays", interval_days)
            .with_meta("lagDays", params.lag_days),
        );
    }

    events
}

/// Rounded mean gap in days between consecutive period ends (ascending input).
/// `None` with fewer than two rows or a non-positive mean.
fn average_interval_days(rows: &[(NaiveDate, Cents)]) -> Option<i64> {
    if rows.len() < 2 {
        return None;
    }
    let gaps: Vec<i64> = rows
        .windows(2)
        .map(|w| days_between(w[0].0, w[1].0))
        .collect();
    let mean = mean_cents(&gaps)?;
    (mean >= 1).then_some(mean)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cashflow_ledger::JournalLine;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn channel() -> SettlementChannel {
        SettlementChannel::with_prefix("amazon", "Amazon", "AMZ-")
    }

    fn params(as_of: &str, end: &str) -> SettlementProjectionParams {
        SettlementProjectionParams {
            as_of: d(as_of),
            forecast_end: d(end),
            average_count: 4,
            default_interval_days: 7,
            lag_days: 0,
        }
    }

    fn hist(period_end: Option<&str>, cents: Option<Cents>) -> SettlementHistoryRow {
        SettlementHistoryRow {
            channel: "amazon".to_string(),
            journal_entry_id: "je".to_string(),
            doc_number: None,
            txn_date: d("2024-01-01"),
            period_end: period_end.map(d),
            cash_impact_cents: cents,
        }
    }

    fn jline(account_id: &str, amount: f64, posting_type: PostingType) -> JournalLine {
        JournalLine { account_id: Some(account_id.into()), amount: Some(amount), posting_type }
    }

    fn entry(id: &str, doc_number: &str, txn_date: &str, line: JournalLine) -> JournalEntry {
        JournalEntry {
            id: id.into(),
            doc_number: Some(doc_number.into()),
            txn_date: d(txn_date),
            lines: vec![line],
        }
    }

    #[test]
    fn matcher_parses_supported_doc_number_shapes() {
        let m = PrefixDateMatcher::new("AMZ-");
        assert_eq!(m.parse_period_end("AMZ-20240114"), Some(d("2024-01-14")));
        assert_eq!(m.parse_period_end("AMZ-2024-01-14"), Some(d("2024-01-14")));
        assert_eq!(m.parse_period_end("AMZ-20240101-20240114"), Some(d("2024-01-14")));
        assert_eq!(m.parse_period_end("AMZ-2024-01-01_2024-01-14"), Some(d("2024-01-14")));
        assert_eq!(m.parse_period_end("AMZ-JANUARY"), None);
        assert_eq!(m.parse_period_end("SHOP-20240114"), None);
        assert!(!m.matches("SHOP-20240114"));
    }

    #[test]
    fn cash_impact_sums_only_cash_lines() {
        let cash = CashAccounts::new(["35"]);
        let entry = JournalEntry {
            id: "1".into(),
            doc_number: Some("AMZ-20240114".into()),
            txn_date: d("2024-01-16"),
            lines: vec![
                jline("35", 1000.0, PostingType::Debit),
                jline("35", 25.5, PostingType::Credit),
                jline("400", 974.5, PostingType::Credit),
            ],
        };
        assert_eq!(journal_cash_impact(&entry, &cash), Some(97450));
        assert_eq!(journal_cash_impact(&entry, &CashAccounts::new(["99"])), None);
    }

    #[test]
    fn unparseable_doc_numbers_are_kept_with_warning() {
        let cash = CashAccounts::new(["35"]);
        let line = jline("35", 10.0, PostingType::Debit);
        let entries = vec![
            entry("1", "AMZ-20240114", "2024-01-16", line.clone()),
            entry("2", "AMZ-???", "2024-01-30", line.clone()),
            entry("3", "OTHER-1", "2024-01-30", line),
        ];

        let mut warnings = Warnings::new();
        let rows = parse_settlement_entries(&channel(), &entries, &cash, &mut warnings);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].period_end, None);
        assert_eq!(rows[1].cash_impact_cents, Some(1000));
        assert_eq!(warnings.count(WarningCode::SettlementDocnumberUnparseable), 1);
    }

    #[test]
    fn non_ascii_doc_number_is_unparseable_not_fatal() {
        let m = PrefixDateMatcher::new("AMZ-");
        assert_eq!(m.parse_period_end("AMZ-2024-01-0é2024-01-14"), None);
        assert_eq!(m.parse_period_end("AMZ-2024-01-01é024-01-14"), None);

        let cash = CashAccounts::new(["35"]);
        let line = jline("35", 10.0, PostingType::Debit);
        let entries = vec![entry("1", "AMZ-2024-01-0é2024-01-14", "2024-01-16", line)];
        let mut warnings = Warnings::new();
        let rows = parse_settlement_entries(&channel(), &entries, &cash, &mut warnings);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].period_end, None);
        assert_eq!(warnings.count(WarningCode::SettlementDocnumberUnparseable), 1);
    }

    #[test]
    fn four_rows_fourteen_days_apart_project_at_fourteen_days() {
        let history = vec![
            hist(Some("2024-01-07"), Some(100_000)),
            hist(Some("2024-01-21"), Some(110_000)),
            hist(Some("2024-02-04"), Some(90_000)),
            hist(Some("2024-02-18"), Some(100_000)),
        ];
        let mut warnings = Warnings::new();
        let p = params("2024-02-19", "2024-04-01");
        let events = project_settlements(&channel(), &history, p, &mut warnings);

        let dates: Vec<String> = events.iter().map(|e| e.date.to_string()).collect();
        assert_eq!(dates, vec!["2024-03-03", "2024-03-17", "2024-03-31"]);
        assert!(events.iter().all(|e| e.amount_cents == 100_000));
        assert_eq!(events[0].meta["intervalDays"], 14);
        assert_eq!(events[0].meta["basedOnCount"], 4);
        assert!(warnings.is_empty());
    }

    #[test]
    fn only_latest_samples_are_averaged() {
        let history = vec![
            hist(Some("2023-12-01"), Some(1)),
            hist(Some("2024-01-07"), Some(100_000)),
            hist(Some("2024-01-21"), Some(100_000)),
            hist(Some("2024-02-04"), Some(100_000)),
            hist(Some("2024-02-18"), Some(100_000)),
            hist(None, Some(5)),
            hist(Some("2024-02-25"), None),
        ];
        let mut warnings = Warnings::new();
        let p = params("2024-02-19", "2024-03-04");
        let events = project_settlements(&channel(), &history, p, &mut warnings);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].amount_cents, 100_000);
        assert_eq!(events[0].date, d("2024-03-03"));
    }

    #[test]
    fn single_row_falls_back_to_default_interval_and_applies_lag() {
        let history = vec![hist(Some("2024-02-18"), Some(50_000))];
        let mut p = params("2024-02-19", "2024-03-10");
        p.lag_days = 2;

        let mut warnings = Warnings::new();
        let events = project_settlements(&channel(), &history, p, &mut warnings);
        let dates: Vec<String> = events.iter().map(|e| e.date.to_string()).collect();
        assert_eq!(dates, vec!["2024-02-27", "2024-03-05"]);
        assert_eq!(events[0].meta["intervalDays"], 7);
        assert_eq!(events[0].meta["periodEnd"], "2024-02-25");
    }

    #[test]
    fn stale_history_skips_past_projections() {
        let history = vec![
            hist(Some("2024-01-01"), Some(100)),
            hist(Some("2024-01-15"), Some(100)),
        ];
        let mut warnings = Warnings::new();
        let p = params("2024-03-01", "2024-03-31");
        let events = project_settlements(&channel(), &history, p, &mut warnings);
        let dates: Vec<String> = events.iter().map(|e| e.date.to_string()).collect();
        assert_eq!(dates, vec!["2024-03-11", "2024-03-25"]);
    }

    #[test]
    fn empty_history_warns_and_projects_nothing() {
        let mut warnings = Warnings::new();
        let p = params("2024-03-01", "2024-03-31");
        let events = project_settlements(&channel(), &[hist(None, Some(1))], p, &mut warnings);
        assert!(events.is_empty());
        assert!(warnings.contains(WarningCode::SettlementHistoryInsufficient));
    }
}
