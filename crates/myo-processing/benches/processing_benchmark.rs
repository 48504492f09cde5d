//! Performance benchmarks for the analysis pipeline
//!
//! Covers the per-timepoint magnet fit, both peak detectors and a whole
//! 24-well analysis pass.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use myo_core::WELL_COUNT;
use myo_processing::calibration::units::memsic_to_millitesla;
use myo_processing::{
    analyze_plate, find_magnet_positions, AnalysisConfig, Detector, MagnetFinderConfig, NoiseBasedDetector,
    ProminenceDetector,
};
use myo_simulation::{
    synthesize_memsic_plate, MemsicSimConfig, NoiseConfig, PlateSimConfig, PlateSimulator, TwitchPattern,
};

fn paced_well(duration_s: f64) -> myo_core::Waveform {
    let mut sim = PlateSimulator::new(PlateSimConfig {
        duration_s,
        pattern: TwitchPattern::GaussianTrain {
            frequency_hz: 1.0,
            width_s: 0.08,
            amplitude: 150.0,
            baseline: 10.0,
        },
        noise: NoiseConfig {
            gaussian_std: 1.0,
            ..NoiseConfig::none()
        },
        ..PlateSimConfig::default()
    })
    .unwrap();
    sim.generate_well().unwrap()
}

/// Benchmark magnet position estimation
fn bench_magnet_estimation(c: &mut Criterion) {
    let mut group = c.benchmark_group("magnet_estimation");
    group.sample_size(10);

    for &timepoints in &[10usize, 50, 200] {
        let xs: Vec<f64> = (0..timepoints).map(|t| 0.1 * (t as f64 * 0.06).sin()).collect();
        let raw = synthesize_memsic_plate(&vec![xs; WELL_COUNT], &MemsicSimConfig::default()).unwrap();
        let tissue = raw.tissue.mapv(memsic_to_millitesla);
        let baseline = raw.baseline.mapv(memsic_to_millitesla);
        let config = MagnetFinderConfig::default();

        group.bench_with_input(
            BenchmarkId::new("plate", format!("{}timepoints", timepoints)),
            &(tissue, baseline),
            |b, (tissue, baseline)| {
                b.iter(|| {
                    let estimate = find_magnet_positions(black_box(tissue), black_box(baseline), 10_000.0, &config);
                    black_box(estimate)
                });
            },
        );
    }

    group.finish();
}

/// Benchmark both peak/valley detectors
fn bench_detectors(c: &mut Criterion) {
    let mut group = c.benchmark_group("detectors");

    let detectors: Vec<Box<dyn Detector>> = vec![
        Box::new(ProminenceDetector::default()),
        Box::new(NoiseBasedDetector::default()),
    ];
    for &duration_s in &[10.0, 60.0, 300.0] {
        let waveform = paced_well(duration_s);
        for detector in &detectors {
            group.bench_with_input(
                BenchmarkId::new(detector.name(), format!("{}s", duration_s)),
                &waveform,
                |b, waveform| {
                    b.iter(|| black_box(detector.detect(black_box(waveform))));
                },
            );
        }
    }

    group.finish();
}

/// Benchmark a full plate from force to metrics
fn bench_plate_analysis(c: &mut Criterion) {
    let mut group = c.benchmark_group("plate_analysis");
    group.sample_size(10);

    let plate = PlateSimulator::new(PlateSimConfig {
        duration_s: 60.0,
        noise: NoiseConfig::default(),
        ..PlateSimConfig::default()
    })
    .unwrap()
    .generate_plate()
    .unwrap();
    let config = AnalysisConfig::default();

    group.bench_function("24_wells_60s", |b| {
        b.iter(|| black_box(analyze_plate(black_box(&plate), &config)));
    });

    group.finish();
}

criterion_group!(benches, bench_magnet_estimation, bench_detectors, bench_plate_analysis);

criterion_main!(benches);
