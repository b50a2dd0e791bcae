//! Tenant-scoped persistence ports for configs, snapshots and adjustments.
//!
//! Every method takes the tenant explicitly; implementations must never let
//! one tenant observe another's rows.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use cashflow_core::{AdjustmentId, SnapshotId, TenantId};
use cashflow_forecast::{CashflowAdjustment, EffectiveConfig, SnapshotRecord, SnapshotSummary};
use cashflow_ledger::DateRange;

pub mod in_memory;
pub mod postgres;

pub use in_memory::InMemoryCashflowStore;
pub use postgres::PostgresCashflowStore;

#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("storage error: {0}")]
    Storage(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait::async_trait]
pub trait ConfigStore: Send + Sync {
    async fn load_config(&self, tenant_id: TenantId) -> StoreResult<Option<EffectiveConfig>>;

    /// Insert or replace the tenant's single config row.
    async fn save_config(&self, tenant_id: TenantId, config: &EffectiveConfig) -> StoreResult<()>;
}

#[async_trait::async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn insert_snapshot(&self, record: &SnapshotRecord) -> StoreResult<()>;

    async fn latest_snapshot(&self, tenant_id: TenantId) -> StoreResult<Option<SnapshotRecord>>;

    async fn get_snapshot(
        &self,
        tenant_id: TenantId,
        id: SnapshotId,
    ) -> StoreResult<Option<SnapshotRecord>>;

    /// Newest first.
    async fn list_snapshots(
        &self,
        tenant_id: TenantId,
        limit: usize,
    ) -> StoreResult<Vec<SnapshotSummary>>;

    async fn latest_created_at(&self, tenant_id: TenantId) -> StoreResult<Option<DateTime<Utc>>>;

    /// Delete everything but the newest `keep` snapshots, ordered by
    /// `(created_at, id)`. Returns the number of deleted rows.
    async fn trim_snapshots(&self, tenant_id: TenantId, keep: usize) -> StoreResult<u64>;
}

#[async_trait::async_trait]
pub trait AdjustmentStore: Send + Sync {
    /// Adjustments ordered by date, optionally restricted to `range`.
    async fn list_adjustments(
        &self,
        tenant_id: TenantId,
        range: Option<DateRange>,
    ) -> StoreResult<Vec<CashflowAdjustment>>;

    async fn insert_adjustment(
        &self,
        tenant_id: TenantId,
        adjustment: &CashflowAdjustment,
    ) -> StoreResult<()>;

    /// Returns `false` if no such adjustment exists for the tenant.
    async fn delete_adjustment(&self, tenant_id: TenantId, id: AdjustmentId) -> StoreResult<bool>;
}

/// Everything the cash-flow service persists.
pub trait CashflowStore: ConfigStore + SnapshotStore + AdjustmentStore {}

impl<T> CashflowStore for T where T: ConfigStore + SnapshotStore + AdjustmentStore {}

#[async_trait::async_trait]
impl<S> ConfigStore for Arc<S>
where
    S: ConfigStore + ?Sized,
{
    async fn load_config(&self, tenant_id: TenantId) -> StoreResult<Option<EffectiveConfig>> {
        (**self).load_config(tenant_id).await
    }

    async fn save_config(&self, tenant_id: TenantId, config: &EffectiveConfig) -> StoreResult<()> {
        (**self).save_config(tenant_id, config).await
    }
}

#[async_trait::async_trait]
impl<S> SnapshotStore for Arc<S>
where
    S: SnapshotStore + ?Sized,
{
    async fn insert_snapshot(&self, record: &SnapshotRecord) -> StoreResult<()> {
        (**self).insert_snapshot(record).await
    }

    async fn latest_snapshot(&self, tenant_id: TenantId) -> StoreResult<Option<SnapshotRecord>> {
        (**self).latest_snapshot(tenant_id).await
    }

    async fn get_snapshot(
        &self,
        tenant_id: TenantId,
        id: SnapshotId,
    ) -> StoreResult<Option<SnapshotRecord>> {
        (**self).get_snapshot(tenant_id, id).await
    }

    async fn list_snapshots(
        &self,
        tenant_id: TenantId,
        limit: usize,
    ) -> StoreResult<Vec<SnapshotSummary>> {
        (**self).list_snapshots(tenant_id, limit).await
    }

    async fn latest_created_at(&self, tenant_id: TenantId) -> StoreResult<Option<DateTime<Utc>>> {
        (**self).latest_created_at(tenant_id).await
    }

    async fn trim_snapshots(&self, tenant_id: TenantId, keep: usize) -> StoreResult<u64> {
        (**self).trim_snapshots(tenant_id, keep).await
    }
}

#[async_trait::async_trait]
impl<S> AdjustmentStore for Arc<S>
where
    S: AdjustmentStore + ?Sized,
{
    async fn list_adjustments(
        &self,
        tenant_id: TenantId,
        range: Option<DateRange>,
    ) -> StoreResult<Vec<CashflowAdjustment>> {
        (**self).list_adjustments(tenant_id, range).await
    }

    async fn insert_adjustment(
        &self,
        tenant_id: TenantId,
        adjustment: &CashflowAdjustment,
    ) -> StoreResult<()> {
        (**self).insert_adjustment(tenant_id, adjustment).await
    }

    async fn delete_adjustment(&self, tenant_id: TenantId, id: AdjustmentId) -> StoreResult<bool> {
        (**self).delete_adjustment(tenant_id, id).await
    }
}
