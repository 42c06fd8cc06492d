//! Criterion benchmarks for the Gaussian Sum fitter.
//!
//! Run with: cargo bench
//! Run specific group: cargo bench -- gsf/bremsstrahlung

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::time::Duration;

use gsf::toy::{
    BremsstrahlungModel, StraightLineExtrapolator, TelescopeGeometry, ToyTrackGenerator,
};
use gsf::{FitRequest, GaussianSumFitter, GsfConfig, TrackFitter};

const PLANES: usize = 8;

fn requests(geometry: &TelescopeGeometry, count: u64) -> Vec<FitRequest> {
    (0..count)
        .map(|seed| {
            let track = ToyTrackGenerator::new(geometry.clone(), seed).generate();
            FitRequest::measurements(track.seed, track.measurements)
        })
        .collect()
}

// =============================================================================
// Single-component fits
// =============================================================================

fn bench_clean_tracks(c: &mut Criterion) {
    let mut group = c.benchmark_group("gsf/clean");
    group.measurement_time(Duration::from_secs(5));

    let geometry = TelescopeGeometry::uniform(PLANES, 50.0, 50.0);
    let requests = requests(&geometry, 16);

    for combine in [false, true] {
        let config = GsfConfig::default().with_forward_combination(combine);
        let fitter =
            GaussianSumFitter::new(StraightLineExtrapolator::new(geometry.clone()), config)
                .unwrap();
        let label = if combine { "combined" } else { "backward" };

        group.bench_function(BenchmarkId::new("fit", label), |b| {
            b.iter(|| {
                for request in &requests {
                    let _ = black_box(fitter.fit(request));
                }
            })
        });
    }

    group.finish();
}

// =============================================================================
// Bremsstrahlung mixtures
// =============================================================================

fn bench_bremsstrahlung(c: &mut Criterion) {
    let mut group = c.benchmark_group("gsf/bremsstrahlung");
    group.measurement_time(Duration::from_secs(10));
    group.sample_size(20);

    let geometry = TelescopeGeometry::uniform(PLANES, 50.0, 50.0).with_material(0.02);
    let requests = requests(&geometry, 8);

    for max_components in [4, 8, 12] {
        let extrapolator = StraightLineExtrapolator::new(geometry.clone())
            .with_bremsstrahlung(BremsstrahlungModel::three_branch());
        let config = GsfConfig::default().with_max_components(max_components);
        let fitter = GaussianSumFitter::new(extrapolator, config).unwrap();

        group.bench_function(BenchmarkId::new("max_components", max_components), |b| {
            b.iter(|| {
                for request in &requests {
                    let _ = black_box(fitter.fit(request));
                }
            })
        });
    }

    group.finish();
}

// =============================================================================
// Batches
// =============================================================================

fn bench_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("gsf/batch");
    group.measurement_time(Duration::from_secs(10));
    group.sample_size(10);

    let geometry = TelescopeGeometry::uniform(PLANES, 50.0, 50.0);
    let requests = requests(&geometry, 256);
    let fitter = GaussianSumFitter::new(
        StraightLineExtrapolator::new(geometry),
        GsfConfig::default(),
    )
    .unwrap();

    group.bench_function(BenchmarkId::new("fit_batch", requests.len()), |b| {
        b.iter(|| black_box(fitter.fit_batch(&requests)))
    });

    group.finish();
}

criterion_group!(benches, bench_clean_tracks, bench_bremsstrahlung, bench_batch);
criterion_main!(benches);
