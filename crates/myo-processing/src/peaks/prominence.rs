//! Prominence/width/distance-constrained peak and valley search

use super::find_peaks::{find_peaks, FoundPeaks, PeakCriteria};
use super::{Detector, PeakValleyIndices, WindowBounds};
use myo_core::constants::MICROSECONDS_PER_SECOND;
use myo_core::{config_error, MyoResult, Waveform};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Highest twitch rate the detector expects, in Hz
pub const MAX_POSSIBLE_TWITCH_FREQUENCY_HZ: f64 = 7.0;

/// Detector thresholds. Tuples are (peak, valley).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeakDetectorConfig {
    /// Larger factors lower the required prominence
    pub prominence_factors: (f64, f64),
    /// Larger factors lower the required width
    pub width_factors: (f64, f64),
    pub max_twitch_frequency_hz: f64,
    pub twitches_point_up: bool,
    pub window: WindowBounds,
}

impl Default for PeakDetectorConfig {
    fn default() -> Self {
        PeakDetectorConfig {
            prominence_factors: (6.0, 6.0),
            width_factors: (7.0, 7.0),
            max_twitch_frequency_hz: MAX_POSSIBLE_TWITCH_FREQUENCY_HZ,
            twitches_point_up: true,
            window: WindowBounds::default(),
        }
    }
}

impl PeakDetectorConfig {
    pub fn validate(&self) -> MyoResult<()> {
        let factors = [
            ("peak prominence factor", self.prominence_factors.0),
            ("valley prominence factor", self.prominence_factors.1),
            ("peak width factor", self.width_factors.0),
            ("valley width factor", self.width_factors.1),
            ("max twitch frequency", self.max_twitch_frequency_hz),
        ];
        for (name, value) in factors {
            if !(value.is_finite() && value > 0.0) {
                return Err(config_error!("{} must be positive, got {}", name, value));
            }
        }
        self.window.validate()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProminenceDetector {
    config: PeakDetectorConfig,
}

impl ProminenceDetector {
    pub fn new(config: PeakDetectorConfig) -> MyoResult<Self> {
        config.validate()?;
        Ok(ProminenceDetector { config })
    }

    pub fn config(&self) -> &PeakDetectorConfig {
        &self.config
    }

    /// Minimum sample spacing between two twitches
    fn min_samples_between_twitches(&self, sampling_period_us: f64) -> f64 {
        (MICROSECONDS_PER_SECOND / self.config.max_twitch_frequency_hz / sampling_period_us)
            .round()
            .max(1.0)
    }
}

impl Detector for ProminenceDetector {
    fn name(&self) -> &'static str {
        "prominence"
    }

    fn detect(&self, waveform: &Waveform) -> MyoResult<PeakValleyIndices> {
        waveform.ensure_finite()?;
        let sampling_period_us = waveform.sampling_period_us()?;
        let signal = waveform.values();

        let (peak_invertor, valley_invertor) = if self.config.twitches_point_up {
            (1.0, -1.0)
        } else {
            (-1.0, 1.0)
        };

        let min_dist = self.min_samples_between_twitches(sampling_period_us);
        let max_prominence = waveform.stats().range().abs();
        debug!(
            min_dist,
            max_prominence,
            prominence_factors = ?self.config.prominence_factors,
            width_factors = ?self.config.width_factors,
            "running prominence detector"
        );

        let search = |invertor: f64, width_factor: f64, prominence_factor: f64| {
            let oriented: Vec<f64> = signal.iter().map(|v| v * invertor).collect();
            find_peaks(
                &oriented,
                &PeakCriteria {
                    height: None,
                    distance: Some(min_dist),
                    prominence: Some(max_prominence / prominence_factor),
                    width: Some((min_dist / width_factor, f64::INFINITY)),
                },
            )
        };

        let peaks = search(peak_invertor, self.config.width_factors.0, self.config.prominence_factors.0);
        let mut valleys = search(valley_invertor, self.config.width_factors.1, self.config.prominence_factors.1);
        let collapsed = repair_degenerate_valleys(&mut valleys, signal);
        if collapsed > 0 {
            debug!(collapsed, "merged valleys sharing intersection points");
        }

        let indices = self
            .config
            .window
            .apply(PeakValleyIndices::new(peaks.indices, valleys.indices), waveform);
        indices.ensure_minimum_count()?;
        Ok(indices)
    }
}

/// Collapse adjacent valleys whose half-height intersection points coincide.
///
/// Scans left to right. Of a matching pair the later valley is dropped when
/// the earlier one's amplitude is at least as large, otherwise the earlier
/// one is dropped. Returns the number of valleys removed.
pub fn repair_degenerate_valleys(valleys: &mut FoundPeaks, signal: &[f64]) -> usize {
    let mut removed = 0;
    let mut i = 1;
    while i < valleys.len() {
        let same_left = valleys.left_ips[i] == valleys.left_ips[i - 1];
        let same_right = valleys.right_ips[i] == valleys.right_ips[i - 1];
        if same_left && same_right {
            let current = valleys.indices[i];
            let last = valleys.indices[i - 1];
            if signal[last] >= signal[current] {
                valleys.remove(i);
            } else {
                valleys.remove(i - 1);
            }
            removed += 1;
        } else {
            i += 1;
        }
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use myo_core::{ExtremumKind, MyoError};
    use std::f64::consts::PI;

    fn sine(freq_hz: f64, seconds: f64, fs: f64) -> Waveform {
        let n = (seconds * fs) as usize;
        let values = (0..n).map(|i| (2.0 * PI * freq_hz * i as f64 / fs).sin()).collect();
        Waveform::from_uniform(1e6 / fs, values).unwrap()
    }

    fn degenerate(indices: Vec<usize>, left: Vec<f64>, right: Vec<f64>) -> FoundPeaks {
        FoundPeaks {
            indices,
            left_ips: left,
            right_ips: right,
            ..FoundPeaks::default()
        }
    }

    #[test]
    fn test_sine_peaks_and_valleys() {
        // 1 Hz at 100 Hz: peaks at 25 + 100k, valleys at 75 + 100k
        let wf = sine(1.0, 10.0, 100.0);
        let found = ProminenceDetector::default().detect(&wf).unwrap();
        assert_eq!(found.peaks.len(), 10);
        assert_eq!(found.valleys.len(), 10);
        for (k, p) in found.peaks.iter().enumerate() {
            assert!((*p as i64 - (25 + 100 * k as i64)).abs() <= 1);
        }
        for (k, v) in found.valleys.iter().enumerate() {
            assert!((*v as i64 - (75 + 100 * k as i64)).abs() <= 1);
        }
    }

    #[test]
    fn test_pointing_down_matches_negated_signal() {
        let wf = sine(1.5, 8.0, 100.0);
        let up = ProminenceDetector::default().detect(&wf).unwrap();
        let down = ProminenceDetector::new(PeakDetectorConfig {
            twitches_point_up: false,
            ..PeakDetectorConfig::default()
        })
        .unwrap()
        .detect(&wf.negated())
        .unwrap();
        assert_eq!(up, down);
    }

    #[test]
    fn test_flat_signal_reports_too_few_peaks() {
        let wf = Waveform::from_uniform(10_000.0, vec![0.5; 300]).unwrap();
        let err = ProminenceDetector::default().detect(&wf).unwrap_err();
        assert_eq!(err, MyoError::too_few(ExtremumKind::Peak, 0, 3));
    }

    #[test]
    fn test_non_finite_input_rejected() {
        let mut values: Vec<f64> = sine(1.0, 5.0, 100.0).values().to_vec();
        values[42] = f64::NAN;
        let wf = Waveform::from_uniform(10_000.0, values).unwrap();
        assert!(matches!(
            ProminenceDetector::default().detect(&wf),
            Err(MyoError::NonFiniteSamples { first_index: 42, .. })
        ));
    }

    #[test]
    fn test_window_filters_after_detection() {
        let wf = sine(1.0, 10.0, 100.0);
        let detector = ProminenceDetector::new(PeakDetectorConfig {
            window: WindowBounds::new(2.0, Some(7.0)),
            ..PeakDetectorConfig::default()
        })
        .unwrap();
        let found = detector.detect(&wf).unwrap();
        assert_eq!(found.peaks, vec![225, 325, 425, 525, 625]);
        assert!(found.valleys.iter().all(|&v| (200..=700).contains(&v)));
    }

    #[test]
    fn test_repair_drops_later_valley_when_earlier_is_higher() {
        let signal = [0.0, -1.0, -1.0, -2.0, 0.0];
        let mut valleys = degenerate(vec![1, 2, 3], vec![0.5, 0.5, 2.5], vec![2.5, 2.5, 3.5]);
        assert_eq!(repair_degenerate_valleys(&mut valleys, &signal), 1);
        assert_eq!(valleys.indices, vec![1, 3]);
    }

    #[test]
    fn test_repair_drops_earlier_valley_when_later_is_higher() {
        let signal = [0.0, -2.0, -1.0, 0.0];
        let mut valleys = degenerate(vec![1, 2], vec![0.5, 0.5], vec![2.5, 2.5]);
        assert_eq!(repair_degenerate_valleys(&mut valleys, &signal), 1);
        assert_eq!(valleys.indices, vec![2]);
        assert_eq!(valleys.left_ips.len(), 1);
    }

    #[test]
    fn test_repair_collapses_runs() {
        let signal = [0.0, -1.0, -1.0, -1.0, 0.0];
        let mut valleys = degenerate(vec![1, 2, 3], vec![0.5; 3], vec![3.5; 3]);
        assert_eq!(repair_degenerate_valleys(&mut valleys, &signal), 2);
        assert_eq!(valleys.indices, vec![1]);
    }

    #[test]
    fn test_invalid_factors_rejected() {
        let config = PeakDetectorConfig {
            prominence_factors: (0.0, 6.0),
            ..PeakDetectorConfig::default()
        };
        assert!(ProminenceDetector::new(config).is_err());
    }
}
