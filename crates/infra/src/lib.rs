//! Infrastructure layer: snapshot orchestration, persistence, settings and the
//! background refresher.

pub mod auto_refresh;
pub mod config;
pub mod service;
pub mod store;


pub use auto_refresh::{AutoRefresher, AutoRefresherHandle};
pub use config::{CashflowServiceOptions, ServiceSettings};
pub use service::{CashflowResult, CashflowService, CashflowSnapshotError};
pub use store::{
    AdjustmentStore, CashflowStore, ConfigStore, InMemoryCashflowStore, PostgresCashflowStore,
    SnapshotStore, StoreError, StoreResult,
};
