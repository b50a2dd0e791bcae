//! Weekly roll-up of cash events into a running cash position.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use cashflow_core::Cents;
use cashflow_ledger::DateRange;

use crate::dates::{add_days, days_between, start_of_week};
use crate::event::CashflowEvent;

pub const DEFAULT_HORIZON_WEEKS: u32 = 13;

/// `[start_of_week(as_of), start + 7 * weeks - 1]`. At least one week.
pub fn forecast_window(as_of: NaiveDate, week_starts_on: u8, horizon_weeks: u32) -> DateRange {
    let start = start_of_week(as_of, week_starts_on);
    let days = i64::from(horizon_weeks.max(1)) * 7 - 1;
    let end = add_days(start, days).unwrap_or(NaiveDate::MAX);
    DateRange::new(start, end)
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForecastInput {
    pub as_of: NaiveDate,
    pub week_starts_on: u8,
    pub horizon_weeks: u32,
    pub starting_cash_cents: Cents,
    pub events: Vec<CashflowEvent>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CashflowWeek {
    pub week_start: NaiveDate,
    pub week_end: NaiveDate,
    pub starting_cash_cents: Cents,
    pub ending_cash_cents: Cents,
    pub inflows_cents: Cents,
    pub outflows_cents: Cents,
    pub events: Vec<CashflowEvent>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastSummary {
    pub starting_cash_cents: Cents,
    pub ending_cash_cents: Cents,
    pub min_ending_cash_cents: Cents,
    pub min_ending_week_start: NaiveDate,
    pub total_inflows_cents: Cents,
    pub total_outflows_cents: Cents,
    /// Events dated outside the horizon.
    pub dropped_event_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CashflowForecast {
    pub horizon_start: NaiveDate,
    pub horizon_end: NaiveDate,
    pub weeks: Vec<CashflowWeek>,
    pub summary: ForecastSummary,
}

/// Bucket events into contiguous weeks and carry the balance forward.
pub fn build_forecast(input: ForecastInput) -> CashflowForecast {
    let window = forecast_window(input.as_of, input.week_starts_on, input.horizon_weeks);
    let week_count = input.horizon_weeks.max(1) as usize;

    let mut buckets: Vec<Vec<CashflowEvent>> = vec![Vec::new(); week_count];
    let mut dropped = 0usize;

    for event in input.events {
        let offset = days_between(window.start, event.date);
        if offset < 0 || event.date > window.end {
            dropped += 1;
            continue;
        }
        let index = (offset / 7) as usize;
        match buckets.get_mut(index) {
            Some(bucket) => bucket.push(event),
            None => dropped += 1,
        }
    }

    let mut weeks = Vec::with_capacity(week_count);
    let mut running = input.starting_cash_cents;
    let mut week_start = window.start;

    for mut events in buckets {
        events.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.label.cmp(&b.label)));

        let inflows: Cents = events.iter().map(CashflowEvent::inflow_cents).sum();
        let outflows: Cents = events.iter().map(CashflowEvent::outflow_cents).sum();
        let starting = running;
        running = starting + inflows - outflows;

        let week_end = add_days(week_start, 6).unwrap_or(NaiveDate::MAX);
        weeks.push(CashflowWeek {
            week_start,
            week_end,
            starting_cash_cents: starting,
            ending_cash_cents: running,
            inflows_cents: inflows,
            outflows_cents: outflows,
            events,
        });
        week_start = add_days(week_start, 7).unwrap_or(NaiveDate::MAX);
    }

    let summary = summarize(input.starting_cash_cents, &weeks, window.start, dropped);
    if dropped > 0 {
        tracing::debug!(dropped, "events outside the forecast horizon were dropped");
    }

    CashflowForecast {
        horizon_start: window.start,
        horizon_end: window.end,
        weeks,
        summary,
    }
}

fn summarize(
    starting: Cents,
    weeks: &[CashflowWeek],
    horizon_start: NaiveDate,
    dropped: usize,
) -> ForecastSummary {
    let mut min_cash = starting;
    let mut min_week = horizon_start;
    if let Some(first) = weeks.first() {
        min_cash = first.ending_cash_cents;
        min_week = first.week_start;
    }
    for week in weeks {
        if week.ending_cash_cents < min_cash {
            min_cash = week.ending_cash_cents;
            min_week = week.week_start;
        }
    }

    ForecastSummary {
        starting_cash_cents: starting,
        ending_cash_cents: weeks.last().map_or(starting, |w| w.ending_cash_cents),
        min_ending_cash_cents: min_cash,
        min_ending_week_start: min_week,
        total_inflows_cents: weeks.iter().map(|w| w.inflows_cents).sum(),
        total_outflows_cents: weeks.iter().map(|w| w.outflows_cents).sum(),
        dropped_event_count: dropped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventSource;
    use chrono::Datelike;
    use proptest::prelude::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn ev(date: &str, cents: Cents, label: &str) -> CashflowEvent {
        CashflowEvent::new(d(date), cents, label, EventSource::ManualAdjustment)
    }

    #[test]
    fn window_starts_on_configured_weekday() {
        // 2024-01-10 is a Wednesday.
        let monday = forecast_window(d("2024-01-10"), 1, 13);
        assert_eq!(monday.start, d("2024-01-08"));
        assert_eq!(monday.end, d("2024-04-07"));

        let sunday = forecast_window(d("2024-01-10"), 0, 1);
        assert_eq!(sunday.start, d("2024-01-07"));
        assert_eq!(sunday.end, d("2024-01-13"));

        let zero = forecast_window(d("2024-01-10"), 1, 0);
        assert_eq!(zero.end, d("2024-01-14"));
    }

    #[test]
    fn rolls_balance_forward_and_drops_out_of_range_events() {
        let forecast = build_forecast(ForecastInput {
            as_of: d("2024-01-10"),
            week_starts_on: 1,
            horizon_weeks: 3,
            starting_cash_cents: 10_000,
            events: vec![
                ev("2024-01-12", -3_000, "rent"),
                ev("2024-01-08", 500, "refund"),
                ev("2024-01-16", 7_000, "invoice"),
                ev("2024-01-28", -20_000, "payroll"),
                ev("2024-01-29", 1, "too late"),
                ev("2024-01-07", 1, "too early"),
            ],
        });

        assert_eq!(forecast.weeks.len(), 3);
        let w0 = &forecast.weeks[0];
        assert_eq!(w0.week_start, d("2024-01-08"));
        assert_eq!(w0.week_end, d("2024-01-14"));
        assert_eq!((w0.inflows_cents, w0.outflows_cents), (500, 3_000));
        assert_eq!(w0.ending_cash_cents, 7_500);
        assert_eq!(w0.events[0].label, "refund");

        assert_eq!(forecast.weeks[1].ending_cash_cents, 14_500);
        assert_eq!(forecast.weeks[2].ending_cash_cents, -5_500);

        let s = &forecast.summary;
        assert_eq!(s.ending_cash_cents, -5_500);
        assert_eq!(s.min_ending_cash_cents, -5_500);
        assert_eq!(s.min_ending_week_start, d("2024-01-22"));
        assert_eq!(s.total_inflows_cents, 7_500);
        assert_eq!(s.total_outflows_cents, 23_000);
        assert_eq!(s.dropped_event_count, 2);
    }

    #[test]
    fn same_day_events_are_ordered_by_label() {
        let forecast = build_forecast(ForecastInput {
            as_of: d("2024-01-08"),
            week_starts_on: 1,
            horizon_weeks: 1,
            starting_cash_cents: 0,
            events: vec![
                ev("2024-01-09", 1, "b"),
                ev("2024-01-09", 1, "a"),
                ev("2024-01-08", 1, "z"),
            ],
        });
        let labels: Vec<&str> = forecast.weeks[0].events.iter().map(|e| e.label.as_str()).collect();
        assert_eq!(labels, vec!["z", "a", "b"]);
    }

    fn arb_events() -> impl Strategy<Value = Vec<(i64, Cents)>> {
        prop::collection::vec((-20i64..120, -1_000_000i64..1_000_000), 0..60)
    }

    proptest! {
        #[test]
        fn weekly_rollup_invariants(
            start_offset in 0i64..3650,
            week_starts_on in 0u8..7,
            horizon_weeks in 1u32..20,
            starting in -10_000_000i64..10_000_000,
            raw in arb_events(),
        ) {
            let as_of = d("2020-01-01") + chrono::Duration::days(start_offset);
            let events = raw
                .iter()
                .map(|(offset, cents)| CashflowEvent::new(
                    as_of + chrono::Duration::days(*offset),
                    *cents,
                    "e",
                    EventSource::ManualAdjustment,
                ))
                .collect();

            let forecast = build_forecast(ForecastInput {
                as_of,
                week_starts_on,
                horizon_weeks,
                starting_cash_cents: starting,
                events,
            });

            prop_assert_eq!(forecast.weeks.len(), horizon_weeks as usize);
            prop_assert_eq!(forecast.horizon_start, start_of_week(as_of, week_starts_on));
            prop_assert_eq!(
                forecast.horizon_start.weekday().num_days_from_sunday(),
                week_starts_on as u32
            );
            prop_assert_eq!(forecast.weeks[0].starting_cash_cents, starting);

            let mut kept = 0usize;
            for (i, week) in forecast.weeks.iter().enumerate() {
                prop_assert_eq!(days_between(week.week_start, week.week_end), 6);
                prop_assert!(week.inflows_cents >= 0 && week.outflows_cents >= 0);
                prop_assert_eq!(
                    week.ending_cash_cents,
                    week.starting_cash_cents + week.inflows_cents - week.outflows_cents
                );
                if let Some(next) = forecast.weeks.get(i + 1) {
                    prop_assert_eq!(next.starting_cash_cents, week.ending_cash_cents);
                    prop_assert_eq!(days_between(week.week_end, next.week_start), 1);
                }
                kept += week.events.len();
            }
            prop_assert_eq!(kept + forecast.summary.dropped_event_count, raw.len());
            let summary = &forecast.summary;
            prop_assert_eq!(
                summary.ending_cash_cents,
                starting + summary.total_inflows_cents - summary.total_outflows_cents
            );
        }
    }
}
