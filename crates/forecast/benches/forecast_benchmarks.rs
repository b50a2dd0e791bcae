use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use cashflow_forecast::{
    CashflowEvent, EventSource, ForecastInput, RecurringRow, Warnings, build_forecast,
    expand_recurring, forecast_window,
};
use chrono::{Duration, NaiveDate};

fn as_of() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 10).unwrap()
}

fn synthetic_events(count: usize) -> Vec<CashflowEvent> {
    (0..count)
        .map(|i| {
            let sign = if i % 3 == 0 { 1 } else { -1 };
            CashflowEvent::new(
                as_of() + Duration::days((i % 100) as i64),
                sign * (1_000 + i as i64),
                format!("event {i}"),
                EventSource::OpenBill,
            )
        })
        .collect()
}

fn bench_weekly_rollup(c: &mut Criterion) {
    let mut group = c.benchmark_group("weekly_rollup");

    for event_count in [100usize, 1_000, 10_000].iter() {
        group.throughput(Throughput::Elements(*event_count as u64));
        group.bench_with_input(
            BenchmarkId::new("build_forecast", event_count),
            event_count,
            |b, &count| {
                let events = synthetic_events(count);
                b.iter(|| {
                    black_box(build_forecast(ForecastInput {
                        as_of: as_of(),
                        week_starts_on: 1,
                        horizon_weeks: 13,
                        starting_cash_cents: 1_000_000,
                        events: events.clone(),
                    }))
                });
            },
        );
    }

    group.finish();
}

fn bench_recurring_expansion(c: &mut Criterion) {
    let mut group = c.benchmark_group("recurring_expansion");
    let window = forecast_window(as_of(), 1, 13);

    for interval in ["Daily", "Weekly", "Monthly"] {
        let row = RecurringRow {
            template_id: "bench".to_string(),
            name: Some("Bench".to_string()),
            active: true,
            template_type: "purchase".to_string(),
            interval_type: Some(interval.to_string()),
            num_interval: Some(1),
            next_date: Some(NaiveDate::from_ymd_opt(2020, 1, 1).unwrap()),
            day_of_month: None,
            end_date: None,
            account_id: Some("35".to_string()),
            from_account_id: None,
            to_account_id: None,
            amount_cents: 10_000,
            cash_impact_cents: Some(-10_000),
        };

        group.bench_function(interval, |b| {
            b.iter(|| {
                let mut warnings = Warnings::new();
                black_box(expand_recurring(&row, window.start, window.end, &mut warnings))
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_weekly_rollup, bench_recurring_expansion);
criterion_main!(benches);
