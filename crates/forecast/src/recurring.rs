//! Recurring schedule expansion over the forecast horizon.

use core::str::FromStr;

use chrono::{Datelike, NaiveDate};
use serde_json::json;

use cashflow_core::Cents;

use crate::dates::{add_days, add_months, add_weeks};
use crate::event::{CashflowEvent, EventSource};
use crate::mappers::RecurringRow;
use crate::warning::{WarningCode, Warnings};

/// Hard cap on enumerated occurrences per template.
const MAX_OCCURRENCES: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntervalType {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl FromStr for IntervalType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "daily" => Ok(IntervalType::Daily),
            "weekly" => Ok(IntervalType::Weekly),
            "monthly" => Ok(IntervalType::Monthly),
            "yearly" => Ok(IntervalType::Yearly),
            _ => Err(()),
        }
    }
}

impl IntervalType {
    /// Next occurrence after `date`; `anchor_day` keeps monthly/yearly schedules
    /// on their day of month across short months.
    fn advance(self, date: NaiveDate, n: i64, anchor_day: u32) -> Option<NaiveDate> {
        match self {
            IntervalType::Daily => add_days(date, n),
            IntervalType::Weekly => add_weeks(date, n),
            IntervalType::Monthly => add_months(date, i32::try_from(n).ok()?, Some(anchor_day)),
            IntervalType::Yearly => {
                add_months(date, i32::try_from(n.checked_mul(12)?).ok()?, Some(anchor_day))
            }
        }
    }
}

/// Validated schedule of a row, or `None` after recording why it was skipped.
fn schedule_of(
    row: &RecurringRow,
    warnings: &mut Warnings,
) -> Option<(IntervalType, i64, NaiveDate)> {
    let detail = json!({ "templateId": row.template_id });

    let Some(raw_interval) = row.interval_type.as_deref() else {
        warnings.push_with_detail(
            WarningCode::RecurringIntervalMissing,
            format!("recurring template {} has no interval type", row.template_id),
            detail,
        );
        return None;
    };

    let Ok(interval) = raw_interval.parse::<IntervalType>() else {
        warnings.push_with_detail(
            WarningCode::RecurringUnsupportedInterval,
            format!(
                "recurring template {} uses unsupported interval {raw_interval:?}",
                row.template_id
            ),
            json!({ "templateId": row.template_id, "intervalType": raw_interval }),
        );
        return None;
    };

    let n = match row.num_interval {
        Some(n) if n >= 1 => n,
        other => {
            warnings.push_with_detail(
                WarningCode::RecurringInvalidNumInterval,
                format!(
                    "recurring template {} has invalid interval count {other:?}",
                    row.template_id
                ),
                json!({ "templateId": row.template_id, "numInterval": other }),
            );
            return None;
        }
    };

    let Some(next_date) = row.next_date else {
        warnings.push_with_detail(
            WarningCode::RecurringNextDateMissing,
            format!("recurring template {} has no next date", row.template_id),
            detail,
        );
        return None;
    };

    Some((interval, n, next_date))
}

/// Enumerate the occurrences of one recurring row inside
/// `[horizon_start, horizon_end]`.
///
/// Inactive rows, rows without a cash impact and net-zero rows produce no
/// events. Malformed schedules are skipped with a warning.
pub fn expand_recurring(
    row: &RecurringRow,
    horizon_start: NaiveDate,
    horizon_end: NaiveDate,
    warnings: &mut Warnings,
) -> Vec<CashflowEvent> {
    if !row.active {
        return Vec::new();
    }
    let impact: Cents = match row.cash_impact_cents {
        Some(0) | None => return Vec::new(),
        Some(v) => v,
    };
    let Some((interval, n, next_date)) = schedule_of(row, warnings) else {
        return Vec::new();
    };

    let anchor_day = row.day_of_month.unwrap_or(next_date.day());
    let last = match row.end_date {
        Some(end) => end.min(horizon_end),
        None => horizon_end,
    };

    let mut events = Vec::new();
    let mut date = next_date;
    let mut steps = 0usize;

    while date <= last {
        if date >= horizon_start {
            events.push(
                CashflowEvent::new(date, impact, row.label(), EventSource::Recurring)
                    .with_meta("templateId", row.template_id.clone())
                    .with_meta("templateType", row.template_type.clone())
                    .with_meta("intervalType", interval_name(interval))
                    .with_meta("numInterval", n),
            );
        }

        steps += 1;
        let advanced = interval.advance(date, n, anchor_day);
        match advanced {
            Some(next) if next > date && steps < MAX_OCCURRENCES => date = next,
            _ => {
                warnings.push_with_detail(
                    WarningCode::RecurringStuckSchedule,
                    format!(
                        "recurring template {} stopped advancing at {date}; expansion aborted",
                        row.template_id
                    ),
                    json!({ "templateId": row.template_id, "stuckAt": date.to_string() }),
                );
                break;
            }
        }
    }

    events
}

fn interval_name(interval: IntervalType) -> &'static str {
    match interval {
        IntervalType::Daily => "Daily",
        IntervalType::Weekly => "Weekly",
        IntervalType::Monthly => "Monthly",
        IntervalType::Yearly => "Yearly",
    }
}
