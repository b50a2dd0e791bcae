//! One forecast run over already-fetched sources.
//!
//! Fetching is the caller's job; this module only resolves the cash account
//! selection, maps every source to events and aggregates them.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde_json::json;

use cashflow_core::{Cents, to_cents};
use cashflow_ledger::{Account, OpenItem, RecurringTemplate};

use crate::aggregator::{CashflowForecast, ForecastInput, build_forecast, forecast_window};
use crate::config::EffectiveConfig;
use crate::event::{CashflowEvent, EventSource};
use crate::mappers::{
    CashAccounts, RecurringRow, classify_recurring, map_open_bills, map_open_invoices,
};
use crate::recurring::expand_recurring;
use crate::settlements::{
    SettlementChannel, SettlementHistoryRow, SettlementProjectionParams, project_settlements,
};
use crate::snapshot::{AccountBalanceRow, CashflowAdjustment};
use crate::warning::{WarningCode, Warnings};

/// Outcome of resolving the configured cash accounts against the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CashSelection {
    pub cash: CashAccounts,
    /// Currency of the first selected account that reports one.
    pub base_currency: Option<String>,
    pub starting_cash_cents: Cents,
    pub rows: Vec<AccountBalanceRow>,
}

/// Pick the cash accounts for a run.
///
/// An empty `configured` list selects every active bank account.
pub fn resolve_cash_accounts(
    accounts: &[Account],
    configured: &[String],
    warnings: &mut Warnings,
) -> CashSelection {
    let selected: Vec<&Account> = if configured.is_empty() {
        accounts.iter().filter(|a| a.active && a.is_bank()).collect()
    } else {
        let mut found = Vec::with_capacity(configured.len());
        for id in configured {
            match accounts.iter().find(|a| &a.id == id) {
                Some(account) => found.push(account),
                None => warnings.push_with_detail(
                    WarningCode::CashAccountNotFound,
                    format!("configured cash account {id} was not found in the ledger"),
                    json!({ "accountId": id }),
                ),
            }
        }
        found
    };

    if selected.is_empty() {
        warnings.push(
            WarningCode::NoCashAccountsSelected,
            "no cash accounts selected; starting cash is zero",
        );
    }

    let base_currency = selected
        .iter()
        .find_map(|a| a.currency_code.clone());
    if let Some(base) = base_currency.as_deref() {
        let mixed: Vec<&str> = selected
            .iter()
            .filter_map(|a| a.currency_code.as_deref())
            .filter(|c| !c.eq_ignore_ascii_case(base))
            .collect();
        if !mixed.is_empty() {
            warnings.push_with_detail(
                WarningCode::MultiCurrencySelectedAccounts,
                format!("selected cash accounts mix currencies; treating all as {base}"),
                json!({ "baseCurrency": base, "otherCurrencies": mixed }),
            );
        }
    }

    let cash = CashAccounts::new(selected.iter().map(|a| a.id.clone()));
    let starting_cash_cents = selected.iter().map(|a| to_cents(a.current_balance)).sum();
    let rows = accounts
        .iter()
        .map(|a| AccountBalanceRow {
            id: a.id.clone(),
            name: a.name.clone(),
            account_type: a.account_type.clone(),
            currency_code: a.currency_code.clone(),
            balance_cents: to_cents(a.current_balance),
            selected: cash.contains(&a.id),
        })
        .collect();

    CashSelection {
        cash,
        base_currency,
        starting_cash_cents,
        rows,
    }
}

/// Settlement history of one channel.
#[derive(Debug, Clone)]
pub struct ChannelHistory {
    pub channel: SettlementChannel,
    pub rows: Vec<SettlementHistoryRow>,
}

#[derive(Debug, Clone, Copy)]
pub struct RunContext<'a> {
    pub as_of: NaiveDate,
    pub horizon_weeks: u32,
    pub config: &'a EffectiveConfig,
    pub cash: &'a CashAccounts,
    pub base_currency: Option<&'a str>,
    pub starting_cash_cents: Cents,
}

#[derive(Debug, Clone, Default)]
pub struct RunSources {
    pub open_bills: Vec<OpenItem>,
    pub open_invoices: Vec<OpenItem>,
    pub recurring_templates: Vec<RecurringTemplate>,
    pub settlements: Vec<ChannelHistory>,
    pub adjustments: Vec<CashflowAdjustment>,
}

#[derive(Debug, Clone)]
pub struct RunOutput {
    pub forecast: CashflowForecast,
    pub recurring_rows: Vec<RecurringRow>,
    pub events_by_source: BTreeMap<EventSource, usize>,
}

pub fn run_forecast(
    ctx: RunContext<'_>,
    sources: &RunSources,
    warnings: &mut Warnings,
) -> RunOutput {
    let window = forecast_window(ctx.as_of, ctx.config.week_starts_on, ctx.horizon_weeks);
    let mut events: Vec<CashflowEvent> = Vec::new();

    events.extend(map_open_bills(&sources.open_bills, ctx.as_of, ctx.base_currency, warnings));
    events.extend(map_open_invoices(
        &sources.open_invoices,
        ctx.as_of,
        ctx.base_currency,
        warnings,
    ));

    let recurring_rows =
        classify_recurring(&sources.recurring_templates, ctx.cash, ctx.base_currency, warnings);
    for row in &recurring_rows {
        events.extend(expand_recurring(row, window.start, window.end, warnings));
    }

    let params = SettlementProjectionParams {
        as_of: ctx.as_of,
        forecast_end: window.end,
        average_count: ctx.config.settlement_average_count,
        default_interval_days: ctx.config.settlement_default_interval_days,
        lag_days: ctx.config.settlement_lag_days,
    };
    for history in &sources.settlements {
        events.extend(project_settlements(&history.channel, &history.rows, params, warnings));
    }

    events.extend(
        sources
            .adjustments
            .iter()
            .filter(|a| window.contains(a.date))
            .map(CashflowAdjustment::to_event),
    );

    let mut events_by_source = BTreeMap::new();
    for event in &events {
        *events_by_source.entry(event.source).or_insert(0usize) += 1;
    }

    let forecast = build_forecast(ForecastInput {
        as_of: ctx.as_of,
        week_starts_on: ctx.config.week_starts_on,
        horizon_weeks: ctx.horizon_weeks,
        starting_cash_cents: ctx.starting_cash_cents,
        events,
    });

    RunOutput {
        forecast,
        recurring_rows,
        events_by_source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cashflow_ledger::{RecurringSchedule, RecurringTransaction};
    use chrono::{TimeZone, Utc};

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn account(id: &str, kind: &str, currency: Option<&str>, balance: f64) -> Account {
        Account {
            id: id.to_string(),
            name: format!("Account {id}"),
            account_type: kind.to_string(),
            sub_type: None,
            active: true,
            currency_code: currency.map(String::from),
            current_balance: balance,
        }
    }

    fn config() -> EffectiveConfig {
        EffectiveConfig::defaults(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
    }

    #[test]
    fn default_selection_is_active_bank_accounts() {
        let mut inactive = account("3", "Bank", Some("USD"), 99.0);
        inactive.active = false;
        let accounts = vec![
            account("1", "Bank", Some("USD"), 100.25),
            account("2", "Expense", Some("USD"), 5.0),
            inactive,
        ];

        let mut warnings = Warnings::new();
        let selection = resolve_cash_accounts(&accounts, &[], &mut warnings);
        assert_eq!(selection.cash, CashAccounts::new(["1"]));
        assert_eq!(selection.starting_cash_cents, 10_025);
        assert_eq!(selection.base_currency.as_deref(), Some("USD"));
        assert_eq!(selection.rows.iter().filter(|r| r.selected).count(), 1);
        assert!(warnings.is_empty());
    }

    #[test]
    fn explicit_selection_reports_missing_and_mixed_currency() {
        let accounts = vec![
            account("1", "Bank", Some("USD"), 10.0),
            account("2", "Bank", Some("EUR"), 20.0),
        ];
        let configured = vec!["1".to_string(), "2".to_string(), "9".to_string()];

        let mut warnings = Warnings::new();
        let selection = resolve_cash_accounts(&accounts, &configured, &mut warnings);
        assert_eq!(selection.starting_cash_cents, 3_000);
        assert_eq!(selection.base_currency.as_deref(), Some("USD"));
        assert_eq!(warnings.count(WarningCode::CashAccountNotFound), 1);
        assert_eq!(warnings.count(WarningCode::MultiCurrencySelectedAccounts), 1);
    }

    #[test]
    fn no_accounts_warns() {
        let mut warnings = Warnings::new();
        let selection =
            resolve_cash_accounts(&[account("2", "Expense", None, 1.0)], &[], &mut warnings);
        assert!(selection.cash.is_empty());
        assert_eq!(selection.starting_cash_cents, 0);
        assert!(warnings.contains(WarningCode::NoCashAccountsSelected));
    }

    #[test]
    fn run_merges_every_source() {
        let config = config();
        let cash = CashAccounts::new(["35"]);
        let bill = OpenItem {
            id: "b1".into(),
            counterparty_name: Some("Acme".into()),
            doc_number: None,
            txn_date: d("2023-12-01"),
            due_date: Some(d("2023-12-31")),
            balance: Some(120.0),
            total: 120.0,
            currency_code: None,
            exchange_rate: None,
        };
        let transfer_between_cash = RecurringTemplate {
            id: "t1".into(),
            name: Some("Sweep".into()),
            active: true,
            schedule: RecurringSchedule {
                interval_type: Some("Weekly".into()),
                num_interval: Some(1),
                next_date: Some(d("2024-01-08")),
                ..RecurringSchedule::default()
            },
            currency_code: None,
            transaction: RecurringTransaction::Transfer {
                from_account_id: Some("35".into()),
                to_account_id: Some("35".into()),
                amount: 50.0,
            },
        };
        let adjustment = CashflowAdjustment {
            id: cashflow_core::AdjustmentId::new(),
            date: d("2024-01-20"),
            amount_cents: 5_000,
            description: "Tax refund".into(),
            notes: None,
            created_at: Utc::now(),
        };
        let sources = RunSources {
            open_bills: vec![bill],
            recurring_templates: vec![transfer_between_cash],
            adjustments: vec![adjustment],
            ..RunSources::default()
        };

        let ctx = RunContext {
            as_of: d("2024-01-10"),
            horizon_weeks: 13,
            config: &config,
            cash: &cash,
            base_currency: Some("USD"),
            starting_cash_cents: 100_000,
        };
        let mut warnings = Warnings::new();
        let out = run_forecast(ctx, &sources, &mut warnings);

        assert_eq!(out.forecast.weeks.len(), 13);
        let first = &out.forecast.weeks[0];
        assert_eq!(first.events.len(), 1);
        assert_eq!(first.events[0].date, d("2024-01-10"));
        assert_eq!(first.outflows_cents, 12_000);

        assert_eq!(out.recurring_rows[0].cash_impact_cents, Some(0));
        assert_eq!(out.events_by_source.get(&EventSource::Recurring), None);
        assert_eq!(out.events_by_source.get(&EventSource::ManualAdjustment), Some(&1));
        assert_eq!(out.forecast.summary.ending_cash_cents, 100_000 - 12_000 + 5_000);
    }
}
