use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};

use cashflow_core::{AdjustmentId, SnapshotId, TenantId};
use cashflow_forecast::{CashflowAdjustment, EffectiveConfig, SnapshotRecord, SnapshotSummary};
use cashflow_ledger::DateRange;

use super::{AdjustmentStore, ConfigStore, SnapshotStore, StoreError, StoreResult};

fn poisoned() -> StoreError {
    StoreError::Storage("in-memory store lock poisoned".to_string())
}

/// In-memory cash-flow store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryCashflowStore {
    configs: RwLock<HashMap<TenantId, EffectiveConfig>>,
    snapshots: RwLock<HashMap<TenantId, Vec<SnapshotRecord>>>,
    adjustments: RwLock<HashMap<TenantId, Vec<CashflowAdjustment>>>,
}

impl InMemoryCashflowStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored snapshots for a tenant.
    pub fn snapshot_count(&self, tenant_id: TenantId) -> usize {
        self.snapshots
            .read()
            .map(|m| m.get(&tenant_id).map_or(0, Vec::len))
            .unwrap_or(0)
    }
}

/// Oldest first by `(created_at, id)`.
fn sort_snapshots(records: &mut [SnapshotRecord]) {
    records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
}

#[async_trait::async_trait]
impl ConfigStore for InMemoryCashflowStore {
    async fn load_config(&self, tenant_id: TenantId) -> StoreResult<Option<EffectiveConfig>> {
        let map = self.configs.read().map_err(|_| poisoned())?;
        Ok(map.get(&tenant_id).cloned())
    }

    async fn save_config(&self, tenant_id: TenantId, config: &EffectiveConfig) -> StoreResult<()> {
        let mut map = self.configs.write().map_err(|_| poisoned())?;
        map.insert(tenant_id, config.clone());
        Ok(())
    }
}

#[async_trait::async_trait]
impl SnapshotStore for InMemoryCashflowStore {
    async fn insert_snapshot(&self, record: &SnapshotRecord) -> StoreResult<()> {
        let mut map = self.snapshots.write().map_err(|_| poisoned())?;
        let records = map.entry(record.tenant_id).or_default();
        records.push(record.clone());
        sort_snapshots(records);
        Ok(())
    }

    async fn latest_snapshot(&self, tenant_id: TenantId) -> StoreResult<Option<SnapshotRecord>> {
        let map = self.snapshots.read().map_err(|_| poisoned())?;
        Ok(map.get(&tenant_id).and_then(|r| r.last().cloned()))
    }

    async fn get_snapshot(
        &self,
        tenant_id: TenantId,
        id: SnapshotId,
    ) -> StoreResult<Option<SnapshotRecord>> {
        let map = self.snapshots.read().map_err(|_| poisoned())?;
        Ok(map
            .get(&tenant_id)
            .and_then(|r| r.iter().find(|s| s.id == id).cloned()))
    }

    async fn list_snapshots(
        &self,
        tenant_id: TenantId,
        limit: usize,
    ) -> StoreResult<Vec<SnapshotSummary>> {
        let map = self.snapshots.read().map_err(|_| poisoned())?;
        Ok(map
            .get(&tenant_id)
            .map(|r| r.iter().rev().take(limit).map(SnapshotRecord::summary).collect())
            .unwrap_or_default())
    }

    async fn latest_created_at(&self, tenant_id: TenantId) -> StoreResult<Option<DateTime<Utc>>> {
        let map = self.snapshots.read().map_err(|_| poisoned())?;
        Ok(map.get(&tenant_id).and_then(|r| r.last()).map(|s| s.created_at))
    }

    async fn trim_snapshots(&self, tenant_id: TenantId, keep: usize) -> StoreResult<u64> {
        let mut map = self.snapshots.write().map_err(|_| poisoned())?;
        let Some(records) = map.get_mut(&tenant_id) else {
            return Ok(0);
        };
        let excess = records.len().saturating_sub(keep);
        records.drain(..excess);
        Ok(excess as u64)
    }
}

#[async_trait::async_trait]
impl AdjustmentStore for InMemoryCashflowStore {
    async fn list_adjustments(
        &self,
        tenant_id: TenantId,
        range: Option<DateRange>,
    ) -> StoreResult<Vec<CashflowAdjustment>> {
        let map = self.adjustments.read().map_err(|_| poisoned())?;
        let mut out: Vec<CashflowAdjustment> = map
            .get(&tenant_id)
            .map(|all| {
                all.iter()
                    .filter(|a| range.is_none_or(|r| r.contains(a.date)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        out.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.id.cmp(&b.id)));
        Ok(out)
    }

    async fn insert_adjustment(
        &self,
        tenant_id: TenantId,
        adjustment: &CashflowAdjustment,
    ) -> StoreResult<()> {
        let mut map = self.adjustments.write().map_err(|_| poisoned())?;
        map.entry(tenant_id).or_default().push(adjustment.clone());
        Ok(())
    }

    async fn delete_adjustment(&self, tenant_id: TenantId, id: AdjustmentId) -> StoreResult<bool> {
        let mut map = self.adjustments.write().map_err(|_| poisoned())?;
        let Some(all) = map.get_mut(&tenant_id) else {
            return Ok(false);
        };
        let before = all.len();
        all.retain(|a| a.id != id);
        Ok(all.len() != before)
    }
}
