use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use cashflow_core::Cents;

/// Origin of a cash event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    OpenBill,
    OpenInvoice,
    Recurring,
    ProjectedSettlement,
    ManualAdjustment,
}

impl EventSource {
    pub fn as_str(self) -> &'static str {
        match self {
            EventSource::OpenBill => "open_bill",
            EventSource::OpenInvoice => "open_invoice",
            EventSource::Recurring => "recurring",
            EventSource::ProjectedSettlement => "projected_settlement",
            EventSource::ManualAdjustment => "manual_adjustment",
        }
    }
}

/// Traceability annotations pointing back at the originating record.
pub type EventMeta = BTreeMap<String, JsonValue>;

/// Atomic, dated cash impact (positive = inflow, negative = outflow).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CashflowEvent {
    pub date: NaiveDate,
    pub amount_cents: Cents,
    pub label: String,
    pub source: EventSource,
    #[serde(default)]
    pub meta: EventMeta,
}

impl CashflowEvent {
    pub fn new(
        date: NaiveDate,
        amount_cents: Cents,
        label: impl Into<String>,
        source: EventSource,
    ) -> Self {
        Self {
            date,
            amount_cents,
            label: label.into(),
            source,
            meta: EventMeta::new(),
        }
    }

    /// Attach a meta annotation (builder style).
    pub fn with_meta(mut self, key: &str, value: impl Into<JsonValue>) -> Self {
        self.meta.insert(key.to_string(), value.into());
        self
    }

    /// Attach an annotation only when a value is present.
    pub fn with_meta_opt<V: Into<JsonValue>>(self, key: &str, value: Option<V>) -> Self {
        match value {
            Some(v) => self.with_meta(key, v),
            None => self,
        }
    }

    pub fn inflow_cents(&self) -> Cents {
        self.amount_cents.max(0)
    }

    pub fn outflow_cents(&self) -> Cents {
        (-self.amount_cents).max(0)
    }
}
