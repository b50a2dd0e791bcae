//! Process-wide tracing setup shared by the cash-flow binaries.

pub mod tracing;

pub use crate::tracing::LogFormat;

/// Initialize tracing with the format from `CASHFLOW_LOG_FORMAT`.
///
/// Safe to call multiple times; later calls are no-ops.
pub fn init() {
    let format = std::env::var("CASHFLOW_LOG_FORMAT")
        .ok()
        .and_then(|v| LogFormat::parse(&v))
        .unwrap_or_default();
    tracing::init(format);
}
