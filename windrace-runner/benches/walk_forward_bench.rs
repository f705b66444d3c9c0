//! Criterion benchmarks for the walk-forward and evaluation hot loops.
//!
//! Run with: `cargo bench -p windrace-runner`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use windrace_core::models::{LinearAr, Persistence};
use windrace_core::SiteData;
use windrace_runner::data_loader::generate_site_series;
use windrace_runner::{backtest, evaluate, WalkForwardConfig};

fn config(train_size: usize) -> WalkForwardConfig {
    WalkForwardConfig {
        horizons: vec![1, 2, 4],
        train_size,
        refit_each_origin: true,
    }
}

/// Persistence: loop overhead with a trivial model.
fn bench_persistence_backtest(c: &mut Criterion) {
    let mut group = c.benchmark_group("backtest_persistence");

    for len in [240, 1000, 5000].iter() {
        let site = SiteData::from_series(generate_site_series(*len, 1000));
        let cfg = config(len / 2);
        group.bench_with_input(BenchmarkId::from_parameter(len), len, |b, _| {
            b.iter(|| {
                let _ = backtest("s1", black_box(&site), &mut Persistence, "persistence", &cfg);
            });
        });
    }

    group.finish();
}

/// Linear AR: one least-squares refit per origin.
fn bench_linear_ar_backtest(c: &mut Criterion) {
    let mut group = c.benchmark_group("backtest_linear_ar");

    for lags in [3usize, 12].iter() {
        let site = SiteData::from_series(generate_site_series(240, 1000));
        let cfg = config(120);
        group.bench_with_input(BenchmarkId::from_parameter(lags), lags, |b, &lags| {
            b.iter(|| {
                let mut model = LinearAr::new(lags);
                let _ = backtest("s1", black_box(&site), &mut model, "linear_ar", &cfg);
            });
        });
    }

    group.finish();
}

fn bench_evaluate(c: &mut Criterion) {
    let site = SiteData::from_series(generate_site_series(5000, 1017));
    let rows = backtest("s1", &site, &mut Persistence, "persistence", &config(100)).unwrap_or_default();

    c.bench_function("evaluate_segments", |b| {
        b.iter(|| {
            let _ = evaluate(black_box(&rows));
        });
    });
}

criterion_group!(
    benches,
    bench_persistence_backtest,
    bench_linear_ar_backtest,
    bench_evaluate
);
criterion_main!(benches);
