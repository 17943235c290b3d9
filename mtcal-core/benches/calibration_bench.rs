//! Criterion benchmarks for the calibration hot paths.
//!
//! Benchmarks:
//! 1. Per-series statistics (naive and prewhitened)
//! 2. Block-cluster resampling
//! 3. Single-threshold and step-down bootstrap calibration

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::rngs::StdRng;
use rand::SeedableRng;

use mtcal_core::bootstrap::calibrate_single;
use mtcal_core::config::CalibrationConfig;
use mtcal_core::resample::{BlockClusterResampler, ResampleScheme};
use mtcal_core::source::{ClusteredAr1Source, PanelSource};
use mtcal_core::statistics::{compute_statistics, StatisticMode};
use mtcal_core::stepdown::calibrate_stepdown;
use mtcal_core::LabeledPanel;

// ── Helpers ──────────────────────────────────────────────────────────

fn make_panel(periods: usize, clusters: usize, per_cluster: usize) -> LabeledPanel {
    let source = ClusteredAr1Source {
        periods,
        n_clusters: clusters,
        series_per_cluster: per_cluster,
        ..Default::default()
    };
    source.draw(&mut StdRng::seed_from_u64(73)).unwrap()
}

fn bench_statistics(c: &mut Criterion) {
    let mut group = c.benchmark_group("statistics");
    for periods in [200, 1000] {
        let labeled = make_panel(periods, 4, 5);
        for mode in [StatisticMode::Naive, StatisticMode::Prewhitened] {
            group.bench_with_input(
                BenchmarkId::new(mode.to_string(), periods),
                &labeled,
                |b, labeled| b.iter(|| compute_statistics(black_box(&labeled.panel), mode)),
            );
        }
    }
    group.finish();
}

fn bench_resample(c: &mut Criterion) {
    let mut group = c.benchmark_group("resample");
    let labeled = make_panel(200, 2, 3);
    for block_length in [1, 12, 50] {
        let resampler = BlockClusterResampler::new(block_length, ResampleScheme::BlockCluster);
        let mut rng = StdRng::seed_from_u64(1);
        group.bench_with_input(BenchmarkId::new("block_cluster", block_length), &labeled, |b, l| {
            b.iter(|| resampler.resample(black_box(&l.panel), &l.clusters, &mut rng).unwrap())
        });
    }
    group.finish();
}

fn bench_calibration(c: &mut Criterion) {
    let mut group = c.benchmark_group("calibration");
    group.sample_size(20);
    let labeled = make_panel(200, 2, 3);
    let config = CalibrationConfig::default();
    let stats = compute_statistics(&labeled.panel, config.mode);

    group.bench_function("single_threshold", |b| {
        let mut rng = StdRng::seed_from_u64(2);
        b.iter(|| {
            calibrate_single(&labeled.panel, &labeled.clusters, &stats, &config, &mut rng).unwrap()
        })
    });
    group.bench_function("stepdown", |b| {
        let mut rng = StdRng::seed_from_u64(3);
        b.iter(|| {
            calibrate_stepdown(&labeled.panel, &labeled.clusters, &stats, &config, &mut rng)
                .unwrap()
        })
    });
    group.finish();
}

criterion_group!(benches, bench_statistics, bench_resample, bench_calibration);
criterion_main!(benches);
