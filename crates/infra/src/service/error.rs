use cashflow_core::DomainError;
use cashflow_ledger::LedgerError;

use crate::store::StoreError;

/// Fatal failure of a cash-flow service operation.
///
/// Degraded inputs never end up here; they become warnings in the snapshot.
#[derive(Debug, thiserror::Error)]
pub enum CashflowSnapshotError {
    /// The ledger rejected our credentials; the installation must reconnect.
    #[error("ledger not connected: {0}")]
    NotConnected(String),
    #[error("ledger request failed: {0}")]
    Ledger(String),
    #[error("storage failure: {0}")]
    Store(#[from] StoreError),
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
}

impl CashflowSnapshotError {
    /// HTTP-style status code for the routing layer.
    pub fn status(&self) -> u16 {
        match self {
            CashflowSnapshotError::NotConnected(_) => 401,
            CashflowSnapshotError::Ledger(_) => 502,
            CashflowSnapshotError::Store(_) => 500,
            CashflowSnapshotError::Validation(_) => 400,
            CashflowSnapshotError::NotFound(_) => 404,
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            CashflowSnapshotError::NotConnected(_) => "not_connected",
            CashflowSnapshotError::Ledger(_) => "ledger_error",
            CashflowSnapshotError::Store(_) => "store_error",
            CashflowSnapshotError::Validation(_) => "validation_error",
            CashflowSnapshotError::NotFound(_) => "not_found",
        }
    }
}

impl From<LedgerError> for CashflowSnapshotError {
    fn from(value: LedgerError) -> Self {
        match value {
            LedgerError::Unauthorized(msg) => CashflowSnapshotError::NotConnected(msg),
            LedgerError::Request(msg) => CashflowSnapshotError::Ledger(msg),
        }
    }
}

impl From<DomainError> for CashflowSnapshotError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => CashflowSnapshotError::Validation(msg),
            DomainError::InvalidId(msg) => CashflowSnapshotError::Validation(msg),
        }
    }
}

pub type CashflowResult<T> = Result<T, CashflowSnapshotError>;
