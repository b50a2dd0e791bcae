//! Calendar arithmetic on ISO dates.
//!
//! All helpers are checked: `None` means the result would leave chrono's
//! supported date range, which callers treat as a malformed schedule.

use std::cmp::Ordering;

use chrono::{Datelike, Duration, Months, NaiveDate, Utc};

pub fn add_days(date: NaiveDate, days: i64) -> Option<NaiveDate> {
    date.checked_add_signed(Duration::try_days(days)?)
}

pub fn add_weeks(date: NaiveDate, weeks: i64) -> Option<NaiveDate> {
    add_days(date, weeks.checked_mul(7)?)
}

/// Add `months` calendar months.
///
/// Without `day_of_month`, chrono's end-of-month clamping applies (Jan 31 + 1
/// month = Feb 28/29). With it, the result is moved to that day, clamped to the
/// last day of the target month.
pub fn add_months(date: NaiveDate, months: i32, day_of_month: Option<u32>) -> Option<NaiveDate> {
    let shifted = if months >= 0 {
        date.checked_add_months(Months::new(months.unsigned_abs()))?
    } else {
        date.checked_sub_months(Months::new(months.unsigned_abs()))?
    };

    match day_of_month {
        None => Some(shifted),
        Some(day) => {
            let last = last_day_of_month(shifted)?;
            shifted.with_day(day.clamp(1, last))
        }
    }
}

/// Number of the last day of `date`'s month (28..=31).
pub fn last_day_of_month(date: NaiveDate) -> Option<u32> {
    let first = date.with_day(1)?;
    let next_first = first.checked_add_months(Months::new(1))?;
    next_first.pred_opt().map(|d| d.day())
}

pub fn parse_iso_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok()
}

/// Compare two ISO date strings; `None` if either fails to parse.
pub fn compare_iso_dates(a: &str, b: &str) -> Option<Ordering> {
    Some(parse_iso_date(a)?.cmp(&parse_iso_date(b)?))
}

/// First day of the week containing `date`.
///
/// `week_starts_on` follows the 0 = Sunday ... 6 = Saturday convention; values
/// above 6 wrap.
pub fn start_of_week(date: NaiveDate, week_starts_on: u8) -> NaiveDate {
    let weekday = date.weekday().num_days_from_sunday() as i64;
    let start = (week_starts_on % 7) as i64;
    let back = (weekday - start).rem_euclid(7);
    date - Duration::days(back)
}

/// Signed number of days from `from` to `to`.
pub fn days_between(from: NaiveDate, to: NaiveDate) -> i64 {
    (to - from).num_days()
}

/// Current date in UTC.
pub fn today_utc() -> NaiveDate {
    Utc::now().date_naive()
}
