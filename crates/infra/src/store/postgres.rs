//! Postgres-backed cash-flow store.
//!
//! Tables are created by `migrations/0001_cashflow.sql`, applied with
//! [`PostgresCashflowStore::ensure_schema`]. Snapshot payloads are
//! stored as JSONB next to a few denormalised summary columns so listings do
//! not have to decode payloads.
//!
//! ## Error Mapping
//!
//! | SQLx Error | StoreError |
//! |------------|------------|
//! | Database / PoolClosed / other | `Storage` |
//! | Row decode (`ColumnDecode`, `Decode`) | `Serialization` |

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::instrument;

use cashflow_core::{AdjustmentId, SnapshotId, TenantId};
use cashflow_forecast::{CashflowAdjustment, EffectiveConfig, SnapshotRecord, SnapshotSummary};
use cashflow_ledger::DateRange;

use super::{AdjustmentStore, ConfigStore, SnapshotStore, StoreError, StoreResult};

#[derive(Debug, Clone)]
pub struct PostgresCashflowStore {
    pool: Arc<PgPool>,
}

impl PostgresCashflowStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Apply the bundled schema. Idempotent.
    pub async fn ensure_schema(&self) -> StoreResult<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(())
    }
}

const SCHEMA: &str = include_str!("../../migrations/0001_cashflow.sql");

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            StoreError::Storage(format!("database error in {operation}: {}", db_err.message()))
        }
        sqlx::Error::PoolClosed => {
            StoreError::Storage(format!("connection pool closed in {operation}"))
        }
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
            StoreError::Serialization(format!("failed to decode row in {operation}: {err}"))
        }
        _ => StoreError::Storage(format!("sqlx error in {operation}: {err}")),
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> StoreResult<serde_json::Value> {
    serde_json::to_value(value).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn from_json<T: serde::de::DeserializeOwned>(value: serde_json::Value) -> StoreResult<T> {
    serde_json::from_value(value).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn snapshot_from_row(row: &PgRow) -> Result<SnapshotRecord, StoreError> {
    let decode = |e: sqlx::Error| map_sqlx_error("decode_snapshot", e);
    let id: uuid::Uuid = row.try_get("id").map_err(decode)?;
    let tenant_id: uuid::Uuid = row.try_get("tenant_id").map_err(decode)?;
    let created_at: DateTime<Utc> = row.try_get("created_at").map_err(decode)?;
    let payload: serde_json::Value = row.try_get("payload").map_err(decode)?;

    Ok(SnapshotRecord {
        id: SnapshotId::from_uuid(id),
        tenant_id: TenantId::from_uuid(tenant_id),
        created_at,
        payload: from_json(payload)?,
    })
}

fn summary_from_row(row: &PgRow) -> Result<SnapshotSummary, StoreError> {
    let decode = |e: sqlx::Error| map_sqlx_error("decode_snapshot_summary", e);
    let id: uuid::Uuid = row.try_get("id").map_err(decode)?;
    let warning_count: i32 = row.try_get("warning_count").map_err(decode)?;

    Ok(SnapshotSummary {
        id: SnapshotId::from_uuid(id),
        created_at: row.try_get("created_at").map_err(decode)?,
        as_of_date: row.try_get("as_of_date").map_err(decode)?,
        currency_code: row.try_get("currency_code").map_err(decode)?,
        starting_cash_cents: row.try_get("starting_cash_cents").map_err(decode)?,
        ending_cash_cents: row.try_get("ending_cash_cents").map_err(decode)?,
        min_ending_cash_cents: row.try_get("min_ending_cash_cents").map_err(decode)?,
        warning_count: warning_count.max(0) as usize,
    })
}

fn adjustment_from_row(row: &PgRow) -> Result<CashflowAdjustment, StoreError> {
    let decode = |e: sqlx::Error| map_sqlx_error("decode_adjustment", e);
    let id: uuid::Uuid = row.try_get("id").map_err(decode)?;
    let date: NaiveDate = row.try_get("adj_date").map_err(decode)?;

    Ok(CashflowAdjustment {
        id: AdjustmentId::from_uuid(id),
        date,
        amount_cents: row.try_get("amount_cents").map_err(decode)?,
        description: row.try_get("description").map_err(decode)?,
        notes: row.try_get("notes").map_err(decode)?,
        created_at: row.try_get("created_at").map_err(decode)?,
    })
}

#[async_trait::async_trait]
impl ConfigStore for PostgresCashflowStore {
    #[instrument(skip(self))]
    async fn load_config(&self, tenant_id: TenantId) -> StoreResult<Option<EffectiveConfig>> {
        let row = sqlx::query("SELECT config FROM cashflow_config WHERE tenant_id = $1")
            .bind(tenant_id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("load_config", e))?;

        match row {
            Some(row) => {
                let config: serde_json::Value = row
                    .try_get("config")
                    .map_err(|e| map_sqlx_error("load_config", e))?;
                Ok(Some(from_json(config)?))
            }
            None => Ok(None),
        }
    }

    #[instrument(skip(self, config))]
    async fn save_config(&self, tenant_id: TenantId, config: &EffectiveConfig) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO cashflow_config (tenant_id, config, created_at, updated_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (tenant_id)
            DO UPDATE SET
                config = EXCLUDED.config,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(to_json(config)?)
        .bind(config.created_at)
        .bind(config.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("save_config", e))?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl SnapshotStore for PostgresCashflowStore {
    #[instrument(
        skip(self, record),
        fields(tenant_id = %record.tenant_id, snapshot_id = %record.id)
    )]
    async fn insert_snapshot(&self, record: &SnapshotRecord) -> StoreResult<()> {
        let summary = record.summary();
        sqlx::query(
            r#"
            INSERT INTO cashflow_snapshots (
                id,
                tenant_id,
                created_at,
                as_of_date,
                currency_code,
                starting_cash_cents,
                ending_cash_cents,
                min_ending_cash_cents,
                warning_count,
                payload
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(record.id.as_uuid())
        .bind(record.tenant_id.as_uuid())
        .bind(record.created_at)
        .bind(summary.as_of_date)
        .bind(summary.currency_code.as_deref())
        .bind(summary.starting_cash_cents)
        .bind(summary.ending_cash_cents)
        .bind(summary.min_ending_cash_cents)
        .bind(i32::try_from(summary.warning_count).unwrap_or(i32::MAX))
        .bind(to_json(&record.payload)?)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_snapshot", e))?;
        Ok(())
    }

    async fn latest_snapshot(&self, tenant_id: TenantId) -> StoreResult<Option<SnapshotRecord>> {
        let row = sqlx::query(
            r#"
            SELECT id, tenant_id, created_at, payload
            FROM cashflow_snapshots
            WHERE tenant_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(tenant_id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("latest_snapshot", e))?;

        row.as_ref().map(snapshot_from_row).transpose()
    }

    async fn get_snapshot(
        &self,
        tenant_id: TenantId,
        id: SnapshotId,
    ) -> StoreResult<Option<SnapshotRecord>> {
        let row = sqlx::query(
            r#"
            SELECT id, tenant_id, created_at, payload
            FROM cashflow_snapshots
            WHERE tenant_id = $1 AND id = $2
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_snapshot", e))?;

        row.as_ref().map(snapshot_from_row).transpose()
    }

    async fn list_snapshots(
        &self,
        tenant_id: TenantId,
        limit: usize,
    ) -> StoreResult<Vec<SnapshotSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT
                id,
                created_at,
                as_of_date,
                currency_code,
                starting_cash_cents,
                ending_cash_cents,
                min_ending_cash_cents,
                warning_count
            FROM cashflow_snapshots
            WHERE tenant_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_snapshots", e))?;

        rows.iter().map(summary_from_row).collect()
    }

    async fn latest_created_at(&self, tenant_id: TenantId) -> StoreResult<Option<DateTime<Utc>>> {
        let row = sqlx::query(
            "SELECT MAX(created_at) AS latest FROM cashflow_snapshots WHERE tenant_id = $1",
        )
            .bind(tenant_id.as_uuid())
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("latest_created_at", e))?;

        row.try_get("latest")
            .map_err(|e| map_sqlx_error("latest_created_at", e))
    }

    #[instrument(skip(self))]
    async fn trim_snapshots(&self, tenant_id: TenantId, keep: usize) -> StoreResult<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM cashflow_snapshots
            WHERE tenant_id = $1
              AND id IN (
                SELECT id
                FROM cashflow_snapshots
                WHERE tenant_id = $1
                ORDER BY created_at DESC, id DESC
                OFFSET $2
              )
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(i64::try_from(keep).unwrap_or(i64::MAX))
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("trim_snapshots", e))?;

        Ok(result.rows_affected())
    }
}

#[async_trait::async_trait]
impl AdjustmentStore for PostgresCashflowStore {
    async fn list_adjustments(
        &self,
        tenant_id: TenantId,
        range: Option<DateRange>,
    ) -> StoreResult<Vec<CashflowAdjustment>> {
        let rows = sqlx::query(
            r#"
            SELECT id, adj_date, amount_cents, description, notes, created_at
            FROM cashflow_adjustments
            WHERE tenant_id = $1
                AND ($2::date IS NULL OR adj_date >= $2)
                AND ($3::date IS NULL OR adj_date <= $3)
            ORDER BY adj_date ASC, id ASC
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(range.map(|r| r.start))
        .bind(range.map(|r| r.end))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_adjustments", e))?;

        rows.iter().map(adjustment_from_row).collect()
    }

    async fn insert_adjustment(
        &self,
        tenant_id: TenantId,
        adjustment: &CashflowAdjustment,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO cashflow_adjustments (
                id,
                tenant_id,
                adj_date,
                amount_cents,
                description,
                notes,
                created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(adjustment.id.as_uuid())
        .bind(tenant_id.as_uuid())
        .bind(adjustment.date)
        .bind(adjustment.amount_cents)
        .bind(&adjustment.description)
        .bind(adjustment.notes.as_deref())
        .bind(adjustment.created_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_adjustment", e))?;
        Ok(())
    }

    async fn delete_adjustment(&self, tenant_id: TenantId, id: AdjustmentId) -> StoreResult<bool> {
        let result =
            sqlx::query("DELETE FROM cashflow_adjustments WHERE tenant_id = $1 AND id = $2")
            .bind(tenant_id.as_uuid())
            .bind(id.as_uuid())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_adjustment", e))?;

        Ok(result.rows_affected() > 0)
    }
}
