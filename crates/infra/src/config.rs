//! Process-level settings, read from the environment.
//!
//! Every variable is optional. Malformed values are logged and replaced by
//! their default so a typo never keeps the worker from starting.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono_tz::Tz;
use uuid::Uuid;

use cashflow_core::TenantId;
use cashflow_forecast::{DEFAULT_HORIZON_WEEKS, SettlementChannel};

pub const DEFAULT_SNAPSHOT_RETENTION: usize = 30;
pub const DEFAULT_LEDGER_PAGE_SIZE: u32 = 100;
pub const DEFAULT_REFRESH_POLL_SECS: u64 = 60;

/// Knobs of [`crate::service::CashflowService`] that are not per-tenant.
#[derive(Debug, Clone)]
pub struct CashflowServiceOptions {
    pub horizon_weeks: u32,
    pub snapshot_retention: usize,
    pub ledger_page_size: u32,
    pub settlement_channels: Vec<SettlementChannel>,
    /// Installation timezone; "today" and auto-refresh times are local to it.
    pub timezone: Tz,
}

impl Default for CashflowServiceOptions {
    fn default() -> Self {
        Self {
            horizon_weeks: DEFAULT_HORIZON_WEEKS,
            snapshot_retention: DEFAULT_SNAPSHOT_RETENTION,
            ledger_page_size: DEFAULT_LEDGER_PAGE_SIZE,
            settlement_channels: Vec::new(),
            timezone: Tz::UTC,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub database_url: Option<String>,
    pub tenant_id: TenantId,
    pub timezone: Tz,
    pub snapshot_retention: usize,
    pub horizon_weeks: u32,
    pub ledger_page_size: u32,
    pub settlement_channels: Vec<SettlementChannel>,
    pub refresh_poll: Duration,
    pub ledger_export: Option<PathBuf>,
}

impl ServiceSettings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let tenant_id = match get("CASHFLOW_TENANT_ID") {
            Some(raw) => raw.parse::<TenantId>().unwrap_or_else(|e| {
                tracing::warn!(
                    value = %raw,
                    error = %e,
                    "CASHFLOW_TENANT_ID is not a UUID; using the default tenant"
                );
                TenantId::from_uuid(Uuid::nil())
            }),
            None => {
                tracing::warn!("CASHFLOW_TENANT_ID not set; using the default tenant");
                TenantId::from_uuid(Uuid::nil())
            }
        };

        let timezone = match get("CASHFLOW_TIMEZONE") {
            Some(raw) => raw.parse::<Tz>().unwrap_or_else(|_| {
                tracing::warn!(
                    value = %raw,
                    "CASHFLOW_TIMEZONE is not an IANA timezone; using UTC"
                );
                Tz::UTC
            }),
            None => Tz::UTC,
        };

        let settlement_channels = match get("CASHFLOW_SETTLEMENT_CHANNELS") {
            Some(raw) => parse_channels(&raw),
            None => Vec::new(),
        };

        Self {
            database_url: get("CASHFLOW_DATABASE_URL"),
            tenant_id,
            timezone,
            snapshot_retention: parse_or(
                &get,
                "CASHFLOW_SNAPSHOT_RETENTION",
                DEFAULT_SNAPSHOT_RETENTION,
                |v| *v >= 1,
            ),
            horizon_weeks: parse_or(&get, "CASHFLOW_HORIZON_WEEKS", DEFAULT_HORIZON_WEEKS, |v| {
                (1..=52).contains(v)
            }),
            ledger_page_size: parse_or(
                &get,
                "CASHFLOW_LEDGER_PAGE_SIZE",
                DEFAULT_LEDGER_PAGE_SIZE,
                |v| (1..=1000).contains(v),
            ),
            settlement_channels,
            refresh_poll: Duration::from_secs(parse_or(
                &get,
                "CASHFLOW_REFRESH_POLL_SECS",
                DEFAULT_REFRESH_POLL_SECS,
                |v| *v >= 1,
            )),
            ledger_export: get("CASHFLOW_LEDGER_EXPORT").map(PathBuf::from),
        }
    }

    pub fn service_options(&self) -> CashflowServiceOptions {
        CashflowServiceOptions {
            horizon_weeks: self.horizon_weeks,
            snapshot_retention: self.snapshot_retention,
            ledger_page_size: self.ledger_page_size,
            settlement_channels: self.settlement_channels.clone(),
            timezone: self.timezone,
        }
    }
}

fn parse_or<T>(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
    valid: impl Fn(&T) -> bool,
) -> T
where
    T: FromStr + Copy + std::fmt::Display,
{
    let Some(raw) = get(key) else {
        return default;
    };
    match raw.parse::<T>() {
        Ok(v) if valid(&v) => v,
        _ => {
            tracing::warn!(key, value = %raw, default = %default, "invalid setting; using default");
            default
        }
    }
}

/// `key:PREFIX,key:PREFIX`. Malformed entries are skipped with a warning.
fn parse_channels(raw: &str) -> Vec<SettlementChannel> {
    let mut channels: Vec<SettlementChannel> = Vec::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        match entry.split_once(':') {
            Some((key, prefix)) if !key.trim().is_empty() && !prefix.trim().is_empty() => {
                let key = key.trim();
                if channels.iter().any(|c| c.key == key) {
                    tracing::warn!(channel = key, "duplicate settlement channel ignored");
                    continue;
                }
                channels.push(SettlementChannel::with_prefix(key, key, prefix.trim()));
            }
            _ => tracing::warn!(entry, "malformed settlement channel entry ignored"),
        }
    }
    channels
}
