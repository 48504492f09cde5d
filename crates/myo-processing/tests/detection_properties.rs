//! Behavioural properties of detection, twitch indexing, metrics and units

use myo_core::{ExtremumKind, MyoError, Waveform};
use myo_processing::calibration::units::{
    displacement_from_force, displacement_from_voltage, force_from_displacement, gmr_from_voltage,
    memsic_to_millitesla, millitesla_to_memsic, voltage_from_displacement, voltage_from_gmr,
};
use myo_processing::{
    find_twitch_indices, AggregateStats, Detector, MetricKind, NoiseBasedConfig, NoiseBasedDetector,
    PeakDetectorConfig, PeakValleyIndices, ProminenceDetector, WindowBounds,
};
use myo_processing::{analyze_well, AnalysisConfig};
use myo_simulation::{NoiseConfig, PlateSimConfig, PlateSimulator, TwitchPattern};
use std::f64::consts::PI;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn noisy_twitch_train(duration_s: f64) -> anyhow::Result<Waveform> {
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
    })?;
    Ok(sim.generate_well()?)
}

fn detectors(point_up: bool, window: WindowBounds) -> anyhow::Result<Vec<Box<dyn Detector>>> {
    let detectors: Vec<Box<dyn Detector>> = vec![
        Box::new(ProminenceDetector::new(PeakDetectorConfig {
            twitches_point_up: point_up,
            window,
            ..PeakDetectorConfig::default()
        })?),
        Box::new(NoiseBasedDetector::new(NoiseBasedConfig {
            twitches_point_up: point_up,
            window,
            ..NoiseBasedConfig::default()
        })?),
    ];
    Ok(detectors)
}

/// Merged index sequence alternates, except possibly at either end
fn assert_alternates(indices: &PeakValleyIndices) {
    let mut merged: Vec<(usize, bool)> = indices
        .peaks
        .iter()
        .map(|&i| (i, true))
        .chain(indices.valleys.iter().map(|&i| (i, false)))
        .collect();
    merged.sort();
    let last = merged.len() - 1;
    for (k, pair) in merged.windows(2).enumerate() {
        if k == 0 || k + 1 == last {
            continue;
        }
        assert_ne!(pair[0].1, pair[1].1, "same kind at {} and {}", pair[0].0, pair[1].0);
    }
}

#[test]
fn test_detection_is_symmetric_under_negation() -> anyhow::Result<()> {
    init_tracing();
    let wf = noisy_twitch_train(10.0)?;
    let up = detectors(true, WindowBounds::default())?;
    let down = detectors(false, WindowBounds::default())?;
    for (u, d) in up.iter().zip(&down) {
        assert_eq!(u.detect(&wf)?, d.detect(&wf.negated())?, "{}", u.name());
    }
    Ok(())
}

#[test]
fn test_detected_twitches_alternate() -> anyhow::Result<()> {
    init_tracing();
    let wf = noisy_twitch_train(10.0)?;
    for detector in detectors(true, WindowBounds::default())? {
        let indices = detector.detect(&wf)?;
        let twitches = find_twitch_indices(&indices)?;
        assert!(twitches.len() >= 3, "{}", detector.name());
        assert_alternates(&indices);
        for twitch in twitches.values() {
            assert!(twitch.prior_valley < twitch.peak);
            assert!(twitch.peak < twitch.subsequent_valley);
            assert!(twitch.subsequent_valley < twitch.subsequent_peak);
        }
    }
    Ok(())
}

#[test]
fn test_minimum_count_reports_exact_counts() -> anyhow::Result<()> {
    init_tracing();
    let sine = TwitchPattern::Sinusoidal {
        frequency_hz: 1.0,
        amplitude: 50.0,
        baseline: 0.0,
    }
    .waveform(100.0, 2.0)?;
    assert_eq!(
        ProminenceDetector::default().detect(&sine).unwrap_err(),
        MyoError::too_few(ExtremumKind::Peak, 2, 3)
    );

    let train = noisy_twitch_train(2.0)?;
    assert_eq!(
        NoiseBasedDetector::default().detect(&train).unwrap_err(),
        MyoError::too_few(ExtremumKind::Peak, 2, 3)
    );

    let err = find_twitch_indices(&PeakValleyIndices::new(vec![10, 30, 50], vec![0, 20])).unwrap_err();
    assert_eq!(err.to_string(), MyoError::too_few(ExtremumKind::Valley, 2, 3).to_string());
    assert!(err.to_string().contains("only 2 valley"));
    Ok(())
}

#[test]
fn test_window_contains_every_index() -> anyhow::Result<()> {
    init_tracing();
    let wf = noisy_twitch_train(10.0)?;
    for (start, end) in [(2.0, 8.0), (0.0, 6.5), (3.3, 9.9)] {
        for detector in detectors(true, WindowBounds::new(start, Some(end)))? {
            let indices = detector.detect(&wf)?;
            for &i in indices.peaks.iter().chain(&indices.valleys) {
                let t = wf.time_seconds(i);
                assert!(start <= t && t <= end, "{} put {} outside [{}, {}]", detector.name(), t, start, end);
            }
        }
    }
    Ok(())
}

#[test]
fn test_unit_conversions_invert() {
    for &counts in &[-8_000_000.0, -1234.5, 0.0, 1.0, 4_194_304.0] {
        let wf = Waveform::new(vec![0.0], vec![counts]).unwrap();
        for in_mm in [true, false] {
            let force = force_from_displacement(&displacement_from_voltage(&voltage_from_gmr(&wf)), in_mm);
            let back = gmr_from_voltage(&voltage_from_displacement(&displacement_from_force(&force, in_mm)));
            let err = (back.values()[0] - counts).abs();
            assert!(err <= 1e-9 * counts.abs().max(1.0), "{} -> {}", counts, back.values()[0]);
        }
    }
    for &raw in &[1.0, 32_768.0, 40_000.5, 65_535.0] {
        assert!((millitesla_to_memsic(memsic_to_millitesla(raw)) - raw).abs() < 1e-9);
    }
}

#[test]
fn test_width_times_are_monotonic() -> anyhow::Result<()> {
    init_tracing();
    // sin(πt): peaks at 0.5 + 2k s, valleys at 1.5 + 2k s
    let values = (0..1000).map(|i| (PI * i as f64 / 100.0).sin()).collect();
    let wf = Waveform::from_uniform(10_000.0, values)?;
    let analysis = analyze_well(myo_core::WellIndex::new(0)?, &wf, &AnalysisConfig::default())?;

    assert_eq!(analysis.indices.peaks, vec![50, 250, 450, 650, 850]);
    assert_eq!(analysis.indices.valleys, vec![150, 350, 550, 750, 950]);
    assert_eq!(analysis.metrics.twitch_count(), 3);

    let percents = AnalysisConfig::default().twitch_width_percents;
    for twitch in &analysis.metrics.per_twitch {
        let contraction: Vec<f64> = percents
            .iter()
            .map(|&p| twitch.width_value(MetricKind::ContractionTime, p).unwrap())
            .collect();
        let relaxation: Vec<f64> = percents
            .iter()
            .map(|&p| twitch.width_value(MetricKind::RelaxationTime, p).unwrap())
            .collect();
        assert!(contraction.windows(2).all(|w| w[1] < w[0]), "{:?}", contraction);
        assert!(relaxation.windows(2).all(|w| w[1] > w[0]), "{:?}", relaxation);
    }
    Ok(())
}

#[test]
fn test_two_peaks_in_a_row() {
    let err = find_twitch_indices(&PeakValleyIndices::new(vec![0, 1, 4, 8, 12], vec![2, 6, 10])).unwrap_err();
    assert_eq!(err, MyoError::TwoPeaksInARow { first: 0, second: 1 });
    assert!(err.is_well_scoped());
}

#[test]
fn test_aggregate_of_nothing_is_undefined() {
    let empty = AggregateStats::from_values(Vec::new());
    let all_missing = AggregateStats::from_values(vec![None, None, Some(f64::NAN)]);
    for stats in [empty, all_missing] {
        assert_eq!(stats.n, 0);
        assert!(stats.mean.is_none());
        assert!(stats.stdev.is_none());
        assert!(stats.cov.is_none());
        assert!(stats.sem.is_none());
        assert!(stats.min.is_none());
        assert!(stats.max.is_none());
    }
}
