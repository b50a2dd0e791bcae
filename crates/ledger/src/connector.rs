use std::sync::Arc;

use thiserror::Error;

use crate::records::{
    AccountList, DateRange, JournalEntryPage, JournalEntryQuery, OpenItemPage, Pagination,
    RecurringPage,
};

pub type LedgerResult<T> = Result<T, LedgerError>;

/// Ledger connector failure.
///
/// Retries and timeouts are the connector's business. Callers only need to
/// tell an authentication failure (not connected) apart from everything else.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("ledger authentication failed: {0}")]
    Unauthorized(String),

    #[error("ledger request failed: {0}")]
    Request(String),
}

impl LedgerError {
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn request(msg: impl Into<String>) -> Self {
        Self::Request(msg.into())
    }

    pub fn is_auth_failure(&self) -> bool {
        matches!(self, LedgerError::Unauthorized(_))
    }
}

/// Read-only port onto the general-ledger system.
#[async_trait::async_trait]
pub trait LedgerConnector: Send + Sync {
    /// Accounts with current balances (optionally as of a date range).
    async fn fetch_accounts(&self, range: Option<DateRange>) -> LedgerResult<AccountList>;

    /// One page of open (unpaid) bills.
    async fn fetch_open_bills(&self, pagination: Pagination) -> LedgerResult<OpenItemPage>;

    /// One page of open (unpaid) invoices.
    async fn fetch_open_invoices(&self, pagination: Pagination) -> LedgerResult<OpenItemPage>;

    /// One page of recurring transaction templates.
    async fn fetch_recurring_transactions(
        &self,
        pagination: Pagination,
    ) -> LedgerResult<RecurringPage>;

    /// One page of journal entries matching the query.
    async fn fetch_journal_entries(&self, query: JournalEntryQuery)
    -> LedgerResult<JournalEntryPage>;
}

#[async_trait::async_trait]
impl<S> LedgerConnector for Arc<S>
where
    S: LedgerConnector + ?Sized,
{
    async fn fetch_accounts(&self, range: Option<DateRange>) -> LedgerResult<AccountList> {
        (**self).fetch_accounts(range).await
    }

    async fn fetch_open_bills(&self, pagination: Pagination) -> LedgerResult<OpenItemPage> {
        (**self).fetch_open_bills(pagination).await
    }

    async fn fetch_open_invoices(&self, pagination: Pagination) -> LedgerResult<OpenItemPage> {
        (**self).fetch_open_invoices(pagination).await
    }

    async fn fetch_recurring_transactions(
        &self,
        pagination: Pagination,
    ) -> LedgerResult<RecurringPage> {
        (**self).fetch_recurring_transactions(pagination).await
    }

    async fn fetch_journal_entries(
        &self,
        query: JournalEntryQuery,
    ) -> LedgerResult<JournalEntryPage> {
        (**self).fetch_journal_entries(query).await
    }
}
