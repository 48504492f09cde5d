//! Per-well and per-plate analysis
//!
//! Each well runs detection, twitch indexing and metrics on its own data and
//! yields an immutable [`WellAnalysis`] or a well-scoped error. The plate
//! result is assembled once every well has finished.

use crate::calibration::PlateRecording;
use crate::config::AnalysisConfig;
use crate::metrics::{compute_metrics, MetricsTable};
use crate::peaks::{Detector, PeakValleyIndices};
use crate::twitch::{find_twitch_indices, TwitchMap};
use myo_core::{config_error, MyoError, MyoResult, Waveform, WellIndex};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info, warn};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Analysis result of one well
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WellAnalysis {
    pub well: WellIndex,
    pub force: Waveform,
    pub indices: PeakValleyIndices,
    pub twitches: TwitchMap,
    pub metrics: MetricsTable,
}

/// Analyse one well's force waveform
pub fn analyze_well(well: WellIndex, force: &Waveform, config: &AnalysisConfig) -> MyoResult<WellAnalysis> {
    config.validate()?;
    let detector = config.build_detector()?;
    analyze_with(well, force, config, detector.as_ref())
}

fn analyze_with(
    well: WellIndex,
    force: &Waveform,
    config: &AnalysisConfig,
    detector: &dyn Detector,
) -> MyoResult<WellAnalysis> {
    let indices = match &config.override_indices {
        Some(indices) => {
            if let Some(&i) = indices.peaks.iter().chain(&indices.valleys).find(|&&i| i >= force.len()) {
                return Err(config_error!(
                    "override index {} outside well {} with {} samples",
                    i,
                    well,
                    force.len()
                ));
            }
            indices.ensure_minimum_count()?;
            indices.clone()
        }
        None => detector.detect(force)?,
    };
    debug!(
        well = %well,
        detector = detector.name(),
        peaks = indices.peaks.len(),
        valleys = indices.valleys.len(),
        "peaks and valleys located"
    );

    let twitches = find_twitch_indices(&indices)?;
    let oriented = if config.twitches_point_up {
        force.clone()
    } else {
        force.negated()
    };
    let metrics = compute_metrics(&oriented, &twitches, &config.metrics_settings())?;

    Ok(WellAnalysis {
        well,
        force: force.clone(),
        indices,
        twitches,
        metrics,
    })
}

/// Per-well outcomes of a plate, in the order the wells were given
#[derive(Debug, Clone)]
pub struct PlateAnalysis {
    pub wells: Vec<(WellIndex, MyoResult<WellAnalysis>)>,
    pub processing_time_us: u64,
}

impl PlateAnalysis {
    pub fn succeeded(&self) -> impl Iterator<Item = &WellAnalysis> {
        self.wells.iter().filter_map(|(_, r)| r.as_ref().ok())
    }

    pub fn failed(&self) -> impl Iterator<Item = (WellIndex, &MyoError)> {
        self.wells
            .iter()
            .filter_map(|(well, r)| r.as_ref().err().map(|e| (*well, e)))
    }

    pub fn get(&self, well: WellIndex) -> Option<&MyoResult<WellAnalysis>> {
        self.wells.iter().find(|(w, _)| *w == well).map(|(_, r)| r)
    }

    pub fn success_count(&self) -> usize {
        self.succeeded().count()
    }
}

/// Analyse every well independently.
///
/// An invalid configuration fails the whole call before any well runs.
/// After that, a well's failure is recorded against that well only.
pub fn analyze_plate(wells: &[(WellIndex, Waveform)], config: &AnalysisConfig) -> MyoResult<PlateAnalysis> {
    config.validate()?;
    let detector = config.build_detector()?;
    let start = Instant::now();
    info!(wells = wells.len(), detector = detector.name(), "Analysing plate");

    let run = |(well, force): &(WellIndex, Waveform)| {
        let result = analyze_with(*well, force, config, detector.as_ref());
        if let Err(e) = &result {
            warn!(well = %well, well_scoped = e.is_well_scoped(), error = %e, "Well analysis failed");
        }
        (*well, result)
    };

    #[cfg(feature = "parallel")]
    let results: Vec<(WellIndex, MyoResult<WellAnalysis>)> = wells.par_iter().map(run).collect();
    #[cfg(not(feature = "parallel"))]
    let results: Vec<(WellIndex, MyoResult<WellAnalysis>)> = wells.iter().map(run).collect();

    let analysis = PlateAnalysis {
        wells: results,
        processing_time_us: start.elapsed().as_micros() as u64,
    };
    info!(
        succeeded = analysis.success_count(),
        failed = analysis.wells.len() - analysis.success_count(),
        elapsed_us = analysis.processing_time_us,
        "Plate analysis finished"
    );
    Ok(analysis)
}

/// Calibrate a plate recording, then analyse every well
pub fn analyze_recording(recording: &PlateRecording, config: &AnalysisConfig) -> MyoResult<PlateAnalysis> {
    let calibration = recording.calibrate()?;
    analyze_plate(&calibration.forces(), config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::MetricKind;
    use myo_core::ExtremumKind;
    use std::f64::consts::PI;

    fn sine_force() -> Waveform {
        let values = (0..1000).map(|i| 100.0 * (2.0 * PI * i as f64 / 100.0).sin()).collect();
        Waveform::from_uniform(10_000.0, values).unwrap()
    }

    fn well(i: usize) -> WellIndex {
        WellIndex::new(i).unwrap()
    }

    #[test]
    fn test_sine_well() {
        let analysis = analyze_well(well(0), &sine_force(), &AnalysisConfig::default()).unwrap();
        assert_eq!(analysis.indices.peaks.len(), 10);
        // starts with a peak, so the first and last peaks form no twitch
        assert_eq!(analysis.metrics.twitch_count(), 8);
        let period = analysis.metrics.aggregate.scalars[&MetricKind::TwitchPeriod];
        assert!((period.mean.unwrap() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_override_indices_bypass_detection() {
        let config = AnalysisConfig {
            override_indices: Some(PeakValleyIndices::new(vec![25, 125, 225, 325], vec![75, 175, 275])),
            ..AnalysisConfig::default()
        };
        let analysis = analyze_well(well(1), &sine_force(), &config).unwrap();
        assert_eq!(analysis.twitches.keys().copied().collect::<Vec<_>>(), vec![125, 225]);

        let short = AnalysisConfig {
            override_indices: Some(PeakValleyIndices::new(vec![25, 125], vec![75, 175, 275])),
            ..AnalysisConfig::default()
        };
        assert_eq!(
            analyze_well(well(1), &sine_force(), &short).unwrap_err(),
            MyoError::too_few(ExtremumKind::Peak, 2, 3)
        );

        let outside = AnalysisConfig {
            override_indices: Some(PeakValleyIndices::new(vec![25, 125, 5000], vec![75, 175, 275])),
            ..AnalysisConfig::default()
        };
        assert!(matches!(
            analyze_well(well(1), &sine_force(), &outside),
            Err(MyoError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn test_downward_twitches_match_upward() {
        let up = analyze_well(well(0), &sine_force(), &AnalysisConfig::default()).unwrap();
        let config = AnalysisConfig {
            twitches_point_up: false,
            ..AnalysisConfig::default()
        };
        let down = analyze_well(well(0), &sine_force().negated(), &config).unwrap();
        assert_eq!(up.indices, down.indices);
        let amp = |a: &WellAnalysis| a.metrics.aggregate.scalars[&MetricKind::Amplitude].mean.unwrap();
        assert!((amp(&up) - amp(&down)).abs() < 1e-9);
        assert!(amp(&down) > 0.0);
    }

    #[test]
    fn test_plate_isolates_failures() {
        let flat = Waveform::from_uniform(10_000.0, vec![1.0; 1000]).unwrap();
        let wells = vec![(well(0), sine_force()), (well(1), flat), (well(2), sine_force())];
        let analysis = analyze_plate(&wells, &AnalysisConfig::default()).unwrap();
        assert_eq!(analysis.success_count(), 2);
        let failed: Vec<_> = analysis.failed().collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].0, well(1));
        assert!(failed[0].1.is_well_scoped());
        assert!(analysis.get(well(2)).unwrap().is_ok());
    }

    #[test]
    fn test_invalid_config_fails_before_wells() {
        let config = AnalysisConfig::default().with_window(4.0, Some(1.0));
        let wells = vec![(well(0), sine_force())];
        assert!(matches!(
            analyze_plate(&wells, &config),
            Err(MyoError::InvalidConfiguration { .. })
        ));
    }
}
