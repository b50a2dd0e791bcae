//! Effective forecast configuration (one live row per tenant).

use core::str::FromStr;

use chrono::{DateTime, Duration, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use cashflow_core::{DomainError, DomainResult};

pub const DEFAULT_WEEK_STARTS_ON: u8 = 1;
pub const DEFAULT_SETTLEMENT_LOOKBACK_DAYS: u32 = 180;
pub const DEFAULT_SETTLEMENT_AVERAGE_COUNT: u32 = 4;
pub const DEFAULT_SETTLEMENT_INTERVAL_DAYS: u32 = 14;
pub const DEFAULT_SETTLEMENT_LAG_DAYS: u32 = 2;
pub const DEFAULT_AUTO_REFRESH_MIN_AGE_HOURS: u32 = 12;

/// Local wall-clock time, serialized as `HH:MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeOfDay {
    hour: u8,
    minute: u8,
}

impl TimeOfDay {
    pub fn new(hour: u8, minute: u8) -> DomainResult<Self> {
        if hour > 23 || minute > 59 {
            return Err(DomainError::validation(format!(
                "time of day out of range: {hour:02}:{minute:02}"
            )));
        }
        Ok(Self { hour, minute })
    }

    pub fn hour(&self) -> u8 {
        self.hour
    }

    pub fn minute(&self) -> u8 {
        self.minute
    }

    pub fn as_naive_time(&self) -> NaiveTime {
        NaiveTime::from_hms_opt(self.hour as u32, self.minute as u32, 0).unwrap_or(NaiveTime::MIN)
    }
}

impl FromStr for TimeOfDay {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed =
            || DomainError::validation(format!("malformed time of day {s:?} (expected HH:MM)"));

        let (h, m) = s.trim().split_once(':').ok_or_else(malformed)?;
        if h.is_empty() || h.len() > 2 || m.len() != 2 {
            return Err(malformed());
        }
        let hour: u8 = h.parse().map_err(|_| malformed())?;
        let minute: u8 = m.parse().map_err(|_| malformed())?;
        Self::new(hour, minute)
    }
}

impl TryFrom<String> for TimeOfDay {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TimeOfDay> for String {
    fn from(value: TimeOfDay) -> Self {
        value.to_string()
    }
}

impl core::fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

/// When the background refresher may generate a new snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoRefreshPolicy {
    pub enabled: bool,
    pub time_of_day: TimeOfDay,
    pub min_age_hours: u32,
}

impl Default for AutoRefreshPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            time_of_day: TimeOfDay { hour: 6, minute: 0 },
            min_age_hours: DEFAULT_AUTO_REFRESH_MIN_AGE_HOURS,
        }
    }
}

impl AutoRefreshPolicy {
    /// Whether a refresh is due at `now_local`.
    ///
    /// Due once per local day: after today's scheduled time, provided no
    /// snapshot was generated since that time and the latest one is at least
    /// `min_age_hours` old. Both instants are in the installation's timezone.
    pub fn is_due(
        &self,
        now_local: NaiveDateTime,
        last_generated_local: Option<NaiveDateTime>,
    ) -> bool {
        if !self.enabled {
            return false;
        }

        let scheduled = now_local.date().and_time(self.time_of_day.as_naive_time());
        if now_local < scheduled {
            return false;
        }

        match last_generated_local {
            None => true,
            Some(last) => {
                last < scheduled && now_local - last >= Duration::hours(self.min_age_hours as i64)
            }
        }
    }
}

/// Per-source inclusion toggles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceToggles {
    pub open_bills: bool,
    pub open_invoices: bool,
    pub recurring: bool,
    pub projected_settlements: bool,
}

impl Default for SourceToggles {
    fn default() -> Self {
        Self {
            open_bills: true,
            open_invoices: true,
            recurring: true,
            projected_settlements: true,
        }
    }
}

/// Resolved settings for one forecast run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectiveConfig {
    /// Selected cash account ids; empty means "all active bank accounts".
    pub cash_account_ids: Vec<String>,
    /// 0 = Sunday ... 6 = Saturday.
    pub week_starts_on: u8,
    pub settlement_lookback_days: u32,
    pub settlement_average_count: u32,
    pub settlement_default_interval_days: u32,
    /// Days between a settlement period end and the cash landing.
    pub settlement_lag_days: u32,
    pub include: SourceToggles,
    pub auto_refresh: AutoRefreshPolicy,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EffectiveConfig {
    pub fn defaults(now: DateTime<Utc>) -> Self {
        Self {
            cash_account_ids: Vec::new(),
            week_starts_on: DEFAULT_WEEK_STARTS_ON,
            settlement_lookback_days: DEFAULT_SETTLEMENT_LOOKBACK_DAYS,
            settlement_average_count: DEFAULT_SETTLEMENT_AVERAGE_COUNT,
            settlement_default_interval_days: DEFAULT_SETTLEMENT_INTERVAL_DAYS,
            settlement_lag_days: DEFAULT_SETTLEMENT_LAG_DAYS,
            include: SourceToggles::default(),
            auto_refresh: AutoRefreshPolicy::default(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update; absent fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConfigPatch {
    pub cash_account_ids: Option<Vec<String>>,
    pub week_starts_on: Option<u8>,
    pub settlement_lookback_days: Option<u32>,
    pub settlement_average_count: Option<u32>,
    pub settlement_default_interval_days: Option<u32>,
    pub settlement_lag_days: Option<u32>,
    pub include_open_bills: Option<bool>,
    pub include_open_invoices: Option<bool>,
    pub include_recurring: Option<bool>,
    pub include_projected_settlements: Option<bool>,
    pub auto_refresh_enabled: Option<bool>,
    pub auto_refresh_time_of_day: Option<String>,
    pub auto_refresh_min_age_hours: Option<u32>,
}

fn check_range(name: &str, value: u32, min: u32, max: u32) -> DomainResult<u32> {
    if value < min || value > max {
        return Err(DomainError::validation(format!(
            "{name} must be between {min} and {max} (got {value})"
        )));
    }
    Ok(value)
}

impl ConfigPatch {
    /// Validate and apply on top of `current`. Nothing is applied if any field
    /// is invalid.
    pub fn apply(
        &self,
        current: &EffectiveConfig,
        now: DateTime<Utc>,
    ) -> DomainResult<EffectiveConfig> {
        let mut next = current.clone();

        if let Some(ids) = &self.cash_account_ids {
            let mut cleaned: Vec<String> = Vec::with_capacity(ids.len());
            for id in ids {
                let id = id.trim();
                if id.is_empty() {
                    return Err(DomainError::validation("cash account ids must not be blank"));
                }
                if !cleaned.iter().any(|c| c == id) {
                    cleaned.push(id.to_string());
                }
            }
            next.cash_account_ids = cleaned;
        }
        if let Some(day) = self.week_starts_on {
            next.week_starts_on = check_range("weekStartsOn", day as u32, 0, 6)? as u8;
        }
        if let Some(days) = self.settlement_lookback_days {
            next.settlement_lookback_days = check_range("settlementLookbackDays", days, 1, 730)?;
        }
        if let Some(count) = self.settlement_average_count {
            next.settlement_average_count = check_range("settlementAverageCount", count, 1, 52)?;
        }
        if let Some(days) = self.settlement_default_interval_days {
            next.settlement_default_interval_days =
                check_range("settlementDefaultIntervalDays", days, 1, 366)?;
        }
        if let Some(days) = self.settlement_lag_days {
            next.settlement_lag_days = check_range("settlementLagDays", days, 0, 60)?;
        }
        if let Some(v) = self.include_open_bills {
            next.include.open_bills = v;
        }
        if let Some(v) = self.include_open_invoices {
            next.include.open_invoices = v;
        }
        if let Some(v) = self.include_recurring {
            next.include.recurring = v;
        }
        if let Some(v) = self.include_projected_settlements {
            next.include.projected_settlements = v;
        }
        if let Some(v) = self.auto_refresh_enabled {
            next.auto_refresh.enabled = v;
        }
        if let Some(raw) = &self.auto_refresh_time_of_day {
            next.auto_refresh.time_of_day = raw.parse()?;
        }
        if let Some(hours) = self.auto_refresh_min_age_hours {
            next.auto_refresh.min_age_hours = check_range("autoRefreshMinAgeHours", hours, 0, 168)?;
        }

        next.updated_at = now;
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(date: &str, hh: u32, mm: u32) -> NaiveDateTime {
        NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .unwrap()
            .and_hms_opt(hh, mm, 0)
            .unwrap()
    }

    #[test]
    fn defaults_match_documented_values() {
        let cfg = EffectiveConfig::defaults(Utc::now());
        assert!(cfg.cash_account_ids.is_empty());
        assert_eq!(cfg.week_starts_on, 1);
        assert_eq!(cfg.settlement_lookback_days, 180);
        assert_eq!(cfg.settlement_average_count, 4);
        assert_eq!(cfg.settlement_default_interval_days, 14);
        assert!(cfg.include.open_bills && cfg.include.projected_settlements);
        assert!(cfg.auto_refresh.enabled);
        assert_eq!(cfg.auto_refresh.time_of_day.to_string(), "06:00");
        assert_eq!(cfg.auto_refresh.min_age_hours, 12);
    }

    #[test]
    fn time_of_day_parsing() {
        assert_eq!("6:30".parse::<TimeOfDay>().unwrap().to_string(), "06:30");
        assert!("24:00".parse::<TimeOfDay>().is_err());
        assert!("12:5".parse::<TimeOfDay>().is_err());
        assert!("noon".parse::<TimeOfDay>().is_err());
    }

    #[test]
    fn patch_applies_and_bumps_updated_at() {
        let created = Utc::now();
        let cfg = EffectiveConfig::defaults(created);
        let later = created + Duration::minutes(5);

        let patch = ConfigPatch {
            cash_account_ids: Some(vec![" 35 ".into(), "35".into(), "36".into()]),
            week_starts_on: Some(0),
            include_recurring: Some(false),
            auto_refresh_time_of_day: Some("07:15".into()),
            ..ConfigPatch::default()
        };

        let next = patch.apply(&cfg, later).unwrap();
        assert_eq!(next.cash_account_ids, vec!["35".to_string(), "36".to_string()]);
        assert_eq!(next.week_starts_on, 0);
        assert!(!next.include.recurring);
        assert_eq!(next.auto_refresh.time_of_day.to_string(), "07:15");
        assert_eq!(next.created_at, created);
        assert_eq!(next.updated_at, later);
    }

    #[test]
    fn patch_rejects_out_of_range_values() {
        let cfg = EffectiveConfig::defaults(Utc::now());
        for patch in [
            ConfigPatch { week_starts_on: Some(7), ..Default::default() },
            ConfigPatch { settlement_average_count: Some(0), ..Default::default() },
            ConfigPatch { settlement_lookback_days: Some(0), ..Default::default() },
            ConfigPatch { auto_refresh_time_of_day: Some("25:00".into()), ..Default::default() },
            ConfigPatch { cash_account_ids: Some(vec!["".into()]), ..Default::default() },
        ] {
            let err = patch.apply(&cfg, Utc::now()).unwrap_err();
            assert!(matches!(err, DomainError::Validation(_)), "{patch:?}");
        }
    }

    #[test]
    fn auto_refresh_due_once_per_day_after_schedule() {
        let policy = AutoRefreshPolicy::default();

        assert!(!policy.is_due(at("2024-03-04", 5, 59), None));
        assert!(policy.is_due(at("2024-03-04", 6, 0), None));

        // Generated yesterday evening: too recent at 06:00, fine later.
        let last = at("2024-03-03", 20, 0);
        assert!(!policy.is_due(at("2024-03-04", 6, 30), Some(last)));
        assert!(policy.is_due(at("2024-03-04", 8, 0), Some(last)));

        // Already generated after today's scheduled time.
        assert!(!policy.is_due(at("2024-03-04", 23, 0), Some(at("2024-03-04", 6, 5))));

        let disabled = AutoRefreshPolicy { enabled: false, ..AutoRefreshPolicy::default() };
        assert!(!disabled.is_due(at("2024-03-04", 12, 0), None));
    }

    #[test]
    fn config_serializes_time_of_day_as_string() {
        let cfg = EffectiveConfig::defaults(Utc::now());
        let json = serde_json::to_value(&cfg).unwrap();
        assert_eq!(json["autoRefresh"]["timeOfDay"], "06:00");
        let back: EffectiveConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back, cfg);
    }
}
