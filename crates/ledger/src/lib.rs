//! General-ledger connector contract.
//!
//! The engine never talks to an accounting system directly: it consumes the
//! typed records defined here through the [`LedgerConnector`] port. The real
//! connector lives outside this workspace; [`InMemoryLedger`] backs tests and
//! the file-driven worker.

pub mod connector;
pub mod in_memory;
pub mod records;

pub use connector::{LedgerConnector, LedgerError, LedgerResult};
pub use in_memory::{InMemoryLedger, LedgerFixture, LedgerSource};
pub use records::{
    Account, AccountList, DateRange, JournalEntry, JournalEntryPage, JournalEntryQuery,
    JournalLine, OpenItem, OpenItemPage, Pagination, PostingType, RecurringPage,
    RecurringSchedule, RecurringTemplate, RecurringTransaction,
};
