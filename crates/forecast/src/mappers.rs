//! Raw ledger records → normalized cash events.
//!
//! Side-effect free: every anomaly goes into the caller's [`Warnings`].

use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;

use cashflow_core::{Cents, to_cents};
use cashflow_ledger::{OpenItem, RecurringTemplate, RecurringTransaction};

use crate::event::{CashflowEvent, EventSource};
use crate::warning::{WarningCode, Warnings};

/// Resolved set of cash account ids for a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CashAccounts(BTreeSet<String>);

impl CashAccounts {
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(ids.into_iter().map(Into::into).collect())
    }

    pub fn contains(&self, account_id: &str) -> bool {
        self.0.contains(account_id)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn ids(&self) -> impl Iterator<Item = &String> {
        self.0.iter()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpenItemKind {
    Bill,
    Invoice,
}

impl OpenItemKind {
    fn noun(self) -> &'static str {
        match self {
            OpenItemKind::Bill => "Bill",
            OpenItemKind::Invoice => "Invoice",
        }
    }

    fn source(self) -> EventSource {
        match self {
            OpenItemKind::Bill => EventSource::OpenBill,
            OpenItemKind::Invoice => EventSource::OpenInvoice,
        }
    }

    fn missing_due_date(self) -> WarningCode {
        match self {
            OpenItemKind::Bill => WarningCode::OpenBillMissingDuedate,
            OpenItemKind::Invoice => WarningCode::OpenInvoiceMissingDuedate,
        }
    }

    fn foreign_currency(self) -> WarningCode {
        match self {
            OpenItemKind::Bill => WarningCode::OpenBillForeignCurrency,
            OpenItemKind::Invoice => WarningCode::OpenInvoiceForeignCurrency,
        }
    }

    fn id_key(self) -> &'static str {
        match self {
            OpenItemKind::Bill => "billId",
            OpenItemKind::Invoice => "invoiceId",
        }
    }

    fn sign(self) -> Cents {
        match self {
            OpenItemKind::Bill => -1,
            OpenItemKind::Invoice => 1,
        }
    }
}

/// Outstanding amount of an open item in cents (absolute value).
pub fn open_item_cents(item: &OpenItem) -> Cents {
    to_cents(item.balance.unwrap_or(item.total).abs())
}

/// Open bills → outflow events (overdue bills land on `as_of`).
pub fn map_open_bills(
    bills: &[OpenItem],
    as_of: NaiveDate,
    base_currency: Option<&str>,
    warnings: &mut Warnings,
) -> Vec<CashflowEvent> {
    map_open_items(OpenItemKind::Bill, bills, as_of, base_currency, warnings)
}

/// Open invoices → inflow events (overdue invoices land on `as_of`).
pub fn map_open_invoices(
    invoices: &[OpenItem],
    as_of: NaiveDate,
    base_currency: Option<&str>,
    warnings: &mut Warnings,
) -> Vec<CashflowEvent> {
    map_open_items(OpenItemKind::Invoice, invoices, as_of, base_currency, warnings)
}

fn map_open_items(
    kind: OpenItemKind,
    items: &[OpenItem],
    as_of: NaiveDate,
    base_currency: Option<&str>,
    warnings: &mut Warnings,
) -> Vec<CashflowEvent> {
    let mut events = Vec::with_capacity(items.len());

    for item in items {
        let scheduled = match item.due_date {
            Some(due) => due,
            None => {
                warnings.push_with_detail(
                    kind.missing_due_date(),
                    format!(
                        "{} {} has no due date; using transaction date {}",
                        kind.noun(),
                        display_ref(item),
                        item.txn_date
                    ),
                    json!({ "id": item.id, "kind": kind.noun() }),
                );
                item.txn_date
            }
        };

        if let (Some(base), Some(currency)) = (base_currency, item.currency_code.as_deref()) {
            if !currency.eq_ignore_ascii_case(base) {
                warnings.push_with_detail(
                    kind.foreign_currency(),
                    format!(
                        "{} {} is in {currency}; treated as {base} without conversion",
                        kind.noun(),
                        display_ref(item)
                    ),
                    json!({
                        "id": item.id,
                        "kind": kind.noun(),
                        "currencyCode": currency,
                        "exchangeRate": item.exchange_rate,
                    }),
                );
            }
        }

        let cents = open_item_cents(item);
        if cents == 0 {
            continue;
        }

        let date = scheduled.max(as_of);
        let label = label_for(kind, item);
        let event = CashflowEvent::new(date, kind.sign() * cents, label, kind.source())
            .with_meta(kind.id_key(), item.id.clone())
            .with_meta("txnDate", item.txn_date.to_string())
            .with_meta_opt("dueDate", item.due_date.map(|d| d.to_string()))
            .with_meta_opt("docNumber", item.doc_number.clone())
            .with_meta_opt("counterparty", item.counterparty_name.clone())
            .with_meta_opt("currencyCode", item.currency_code.clone())
            .with_meta_opt(
                "scheduledDate",
                (date != scheduled).then(|| scheduled.to_string()),
            );
        events.push(event);
    }

    events
}

fn display_ref(item: &OpenItem) -> &str {
    item.doc_number.as_deref().unwrap_or(item.id.as_str())
}

fn label_for(kind: OpenItemKind, item: &OpenItem) -> String {
    match &item.counterparty_name {
        Some(name) => format!("{} {} ({name})", kind.noun(), display_ref(item)),
        None => format!("{} {}", kind.noun(), display_ref(item)),
    }
}

/// Audit record of one recurring template and its resolved cash impact.
///
/// `cash_impact_cents` is `None` when the template never touches a cash account
/// (or cannot be classified); such rows are kept for audit but never expanded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecurringRow {
    pub template_id: String,
    pub name: Option<String>,
    pub active: bool,
    pub template_type: String,
    pub interval_type: Option<String>,
    pub num_interval: Option<i64>,
    pub next_date: Option<NaiveDate>,
    pub day_of_month: Option<u32>,
    pub end_date: Option<NaiveDate>,
    pub account_id: Option<String>,
    pub from_account_id: Option<String>,
    pub to_account_id: Option<String>,
    pub amount_cents: Cents,
    pub cash_impact_cents: Option<Cents>,
}

impl RecurringRow {
    pub fn label(&self) -> String {
        match &self.name {
            Some(name) if !name.trim().is_empty() => name.clone(),
            _ => format!("Recurring {} {}", self.template_type, self.template_id),
        }
    }
}

/// Classify recurring templates into audit rows with their cash impact.
pub fn classify_recurring(
    templates: &[RecurringTemplate],
    cash: &CashAccounts,
    base_currency: Option<&str>,
    warnings: &mut Warnings,
) -> Vec<RecurringRow> {
    templates
        .iter()
        .map(|t| classify_template(t, cash, base_currency, warnings))
        .collect()
}

fn classify_template(
    template: &RecurringTemplate,
    cash: &CashAccounts,
    base_currency: Option<&str>,
    warnings: &mut Warnings,
) -> RecurringRow {
    let schedule = &template.schedule;
    let mut row = RecurringRow {
        template_id: template.id.clone(),
        name: template.name.clone(),
        active: template.active,
        template_type: String::new(),
        interval_type: schedule.interval_type.clone(),
        num_interval: schedule.num_interval,
        next_date: schedule.next_date,
        day_of_month: schedule.day_of_month,
        end_date: schedule.end_date,
        account_id: None,
        from_account_id: None,
        to_account_id: None,
        amount_cents: 0,
        cash_impact_cents: None,
    };

    match &template.transaction {
        RecurringTransaction::Purchase { account_id, amount } => {
            row.template_type = "purchase".to_string();
            row.account_id = account_id.clone();
            row.amount_cents = to_cents(amount.abs());

            match account_id {
                None => warnings.push_with_detail(
                    WarningCode::RecurringPurchaseMissingAccount,
                    format!("recurring purchase {} has no account reference", template.id),
                    json!({ "templateId": template.id }),
                ),
                Some(id) if cash.contains(id) => row.cash_impact_cents = Some(-row.amount_cents),
                Some(_) => {}
            }
        }
        RecurringTransaction::Transfer {
            from_account_id,
            to_account_id,
            amount,
        } => {
            row.template_type = "transfer".to_string();
            row.from_account_id = from_account_id.clone();
            row.to_account_id = to_account_id.clone();
            row.amount_cents = to_cents(amount.abs());

            match (from_account_id, to_account_id) {
                (Some(from), Some(to)) => {
                    row.cash_impact_cents = match (cash.contains(from), cash.contains(to)) {
                        (true, true) => Some(0),
                        (true, false) => Some(-row.amount_cents),
                        (false, true) => Some(row.amount_cents),
                        (false, false) => None,
                    };
                }
                _ => warnings.push_with_detail(
                    WarningCode::RecurringTransferMissingAccounts,
                    format!("recurring transfer {} is missing a from or to account", template.id),
                    json!({
                        "templateId": template.id,
                        "fromAccountId": from_account_id,
                        "toAccountId": to_account_id,
                    }),
                ),
            }
        }
        RecurringTransaction::Unsupported { txn_type } => {
            row.template_type = txn_type.clone();
            warnings.push_with_detail(
                WarningCode::RecurringTemplateUnsupported,
                format!("recurring template {} has unsupported type {txn_type}", template.id),
                json!({ "templateId": template.id, "txnType": txn_type }),
            );
        }
    }

    if row.cash_impact_cents.is_some() {
        if let (Some(base), Some(currency)) = (base_currency, template.currency_code.as_deref()) {
            if !currency.eq_ignore_ascii_case(base) {
                warnings.push_with_detail(
                    WarningCode::RecurringForeignCurrency,
                    format!(
                        "recurring template {} is in {currency}; \
                         treated as {base} without conversion",
                        template.id
                    ),
                    json!({ "templateId": template.id, "currencyCode": currency }),
                );
            }
        }
    }

    row
}

#[cfg(test)]
mod tests {
    use super::*;
    use cashflow_ledger::RecurringSchedule;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn item(id: &str, txn: &str, due: Option<&str>, balance: Option<f64>, total: f64) -> OpenItem {
        OpenItem {
            id: id.to_string(),
            counterparty_name: Some("Acme".to_string()),
            doc_number: Some(format!("D-{id}")),
            txn_date: d(txn),
            due_date: due.map(d),
            balance,
            total,
            currency_code: None,
            exchange_rate: None,
        }
    }

    fn template(id: &str, active: bool, transaction: RecurringTransaction) -> RecurringTemplate {
        RecurringTemplate {
            id: id.to_string(),
            name: None,
            active,
            schedule: RecurringSchedule::default(),
            currency_code: None,
            transaction,
        }
    }

    fn purchase(account_id: Option<&str>, amount: f64) -> RecurringTransaction {
        RecurringTransaction::Purchase { account_id: account_id.map(String::from), amount }
    }

    #[test]
    fn overdue_bill_is_clamped_to_as_of() {
        let as_of = d("2024-03-04");
        let mut warnings = Warnings::new();
        let events = map_open_bills(
            &[item("1", "2024-01-10", Some("2024-02-01"), Some(120.5), 300.0)],
            as_of,
            None,
            &mut warnings,
        );

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].date, as_of);
        assert_eq!(events[0].amount_cents, -12050);
        assert_eq!(events[0].source, EventSource::OpenBill);
        assert_eq!(events[0].meta["scheduledDate"], "2024-02-01");
        assert!(warnings.is_empty());
    }

    #[test]
    fn missing_due_date_falls_back_to_txn_date_with_warning() {
        let as_of = d("2024-03-04");
        let mut warnings = Warnings::new();
        let events = map_open_invoices(
            &[item("9", "2024-03-20", None, None, -75.0)],
            as_of,
            None,
            &mut warnings,
        );

        assert_eq!(events[0].date, d("2024-03-20"));
        assert_eq!(events[0].amount_cents, 7500);
        assert_eq!(warnings.count(WarningCode::OpenInvoiceMissingDuedate), 1);
    }

    #[test]
    fn foreign_currency_items_are_flagged_not_converted() {
        let mut bill = item("1", "2024-03-01", Some("2024-03-10"), Some(10.0), 10.0);
        bill.currency_code = Some("EUR".to_string());
        bill.exchange_rate = Some(1.1);

        let mut warnings = Warnings::new();
        let events = map_open_bills(&[bill], d("2024-03-04"), Some("USD"), &mut warnings);
        assert_eq!(events[0].amount_cents, -1000);
        assert!(warnings.contains(WarningCode::OpenBillForeignCurrency));
    }

    #[test]
    fn zero_balance_items_produce_no_event() {
        let mut warnings = Warnings::new();
        let events = map_open_bills(
            &[item("1", "2024-03-01", Some("2024-03-10"), Some(0.0), 10.0)],
            d("2024-03-04"),
            None,
            &mut warnings,
        );
        assert!(events.is_empty());
    }

    #[test]
    fn purchase_impact_depends_on_cash_account() {
        let cash = CashAccounts::new(["35"]);
        let mut warnings = Warnings::new();
        let rows = classify_recurring(
            &[
                template("a", true, purchase(Some("35"), 99.99)),
                template("b", true, purchase(Some("80"), 10.0)),
                template("c", true, purchase(None, 10.0)),
            ],
            &cash,
            None,
            &mut warnings,
        );

        assert_eq!(rows[0].cash_impact_cents, Some(-9999));
        assert_eq!(rows[1].cash_impact_cents, None);
        assert_eq!(rows[2].cash_impact_cents, None);
        assert_eq!(warnings.count(WarningCode::RecurringPurchaseMissingAccount), 1);
    }

    #[test]
    fn transfer_impact_matrix() {
        let cash = CashAccounts::new(["35", "36"]);
        let transfer = |from: Option<&str>, to: Option<&str>| {
            template(
                "t",
                true,
                RecurringTransaction::Transfer {
                    from_account_id: from.map(String::from),
                    to_account_id: to.map(String::from),
                    amount: 50.0,
                },
            )
        };

        let mut warnings = Warnings::new();
        let rows = classify_recurring(
            &[
                transfer(Some("35"), Some("36")),
                transfer(Some("35"), Some("90")),
                transfer(Some("90"), Some("36")),
                transfer(Some("90"), Some("91")),
                transfer(None, Some("36")),
            ],
            &cash,
            None,
            &mut warnings,
        );

        let impacts: Vec<_> = rows.iter().map(|r| r.cash_impact_cents).collect();
        assert_eq!(impacts, vec![Some(0), Some(-5000), Some(5000), None, None]);
        assert_eq!(warnings.count(WarningCode::RecurringTransferMissingAccounts), 1);
    }

    #[test]
    fn unsupported_templates_are_recorded_with_warning() {
        let mut warnings = Warnings::new();
        let rows = classify_recurring(
            &[template(
                "x",
                false,
                RecurringTransaction::Unsupported { txn_type: "Invoice".into() },
            )],
            &CashAccounts::default(),
            None,
            &mut warnings,
        );

        assert_eq!(rows[0].template_type, "Invoice");
        assert!(!rows[0].active);
        assert_eq!(rows[0].cash_impact_cents, None);
        assert!(warnings.contains(WarningCode::RecurringTemplateUnsupported));
    }
}
