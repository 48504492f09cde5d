//! Noise-adaptive peak search with upslope-based valley placement
//!
//! Peaks are found against a prominence threshold scaled by the measured
//! peak-to-peak noise of the trace. Each valley is then placed by walking
//! back from its peak and looking for the start of a sustained rise.

use super::find_peaks::{find_peaks, PeakCriteria};
use super::{Detector, PeakValleyIndices, WindowBounds};
use myo_core::constants::MIN_NUMBER_PEAKS;
use myo_core::{config_error, ExtremumKind, MyoError, MyoResult, Waveform};
use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// First prominence multiplier tried when looking for tentative peaks
const INITIAL_PEAK_STARTING_PROM: u32 = 5;
/// Expected peak-to-peak noise of an average recording, in µN
const INITIAL_PEAK_NOISE_ESTIMATE: f64 = 10.0;
/// Length of the segment after each tentative peak used to measure noise
const NOISE_SEGMENT_DURATION_S: f64 = 0.1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoiseBasedConfig {
    /// Minimum signal-to-noise ratio of a peak
    pub noise_prominence_factor: f64,
    /// Fraction of the tallest peak's SNR to require, when larger than the
    /// noise factor
    pub relative_prominence_factor: Option<f64>,
    /// Inclusive (min, max) peak width in seconds
    pub width_bounds_s: (f64, f64),
    /// Minimum peak height in signal units
    pub height: f64,
    /// Highest twitch rate; defaults to the sampling rate
    pub max_frequency_hz: Option<f64>,
    /// How far before a peak to search for its valley, in seconds
    pub valley_search_s: f64,
    /// Minimum length of a qualifying upslope, in seconds
    pub upslope_s: f64,
    /// Longest dip tolerated inside a single upslope, in seconds
    pub upslope_noise_allowance_s: f64,
    pub twitches_point_up: bool,
    pub window: WindowBounds,
}

impl Default for NoiseBasedConfig {
    fn default() -> Self {
        NoiseBasedConfig {
            noise_prominence_factor: 2.5,
            relative_prominence_factor: Some(0.2),
            width_bounds_s: (0.0, 5.0),
            height: 0.0,
            max_frequency_hz: None,
            valley_search_s: 1.0,
            upslope_s: 0.07,
            upslope_noise_allowance_s: 0.0,
            twitches_point_up: true,
            window: WindowBounds::default(),
        }
    }
}

impl NoiseBasedConfig {
    pub fn validate(&self) -> MyoResult<()> {
        if !(self.noise_prominence_factor.is_finite() && self.noise_prominence_factor > 0.0) {
            return Err(config_error!(
                "Noise prominence factor must be positive, got {}",
                self.noise_prominence_factor
            ));
        }
        if let Some(rel) = self.relative_prominence_factor {
            if !(rel.is_finite() && rel >= 0.0) {
                return Err(config_error!("Relative prominence factor must be non-negative, got {}", rel));
            }
        }
        let (wmin, wmax) = self.width_bounds_s;
        if !(wmin >= 0.0 && wmax > wmin) {
            return Err(config_error!("Width bounds must satisfy 0 <= min < max, got ({}, {})", wmin, wmax));
        }
        if let Some(freq) = self.max_frequency_hz {
            if !(freq.is_finite() && freq > 0.0) {
                return Err(config_error!("Max frequency must be positive, got {}", freq));
            }
        }
        if !(self.valley_search_s > 0.0) {
            return Err(config_error!("Valley search duration must be positive, got {}", self.valley_search_s));
        }
        if !(self.upslope_s >= 0.0 && self.upslope_noise_allowance_s >= 0.0) {
            return Err(config_error!("Upslope durations must be non-negative"));
        }
        self.window.validate()
    }

    /// Checks that need the recording's sampling rate
    pub fn validate_for_sampling_rate(&self, fs: f64) -> MyoResult<()> {
        if self.valley_search_s * fs < 1.0 {
            return Err(config_error!(
                "Valley search duration {} s is shorter than one sample at {} Hz",
                self.valley_search_s,
                fs
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct NoiseBasedDetector {
    config: NoiseBasedConfig,
}

impl NoiseBasedDetector {
    pub fn new(config: NoiseBasedConfig) -> MyoResult<Self> {
        config.validate()?;
        Ok(NoiseBasedDetector { config })
    }

    pub fn config(&self) -> &NoiseBasedConfig {
        &self.config
    }

    fn find_peak_indices(&self, signal: &[f64], fs: f64) -> MyoResult<Vec<usize>> {
        let mut tentative = Vec::new();
        for prom in (1..=INITIAL_PEAK_STARTING_PROM).rev() {
            let criteria = PeakCriteria {
                prominence: Some(prom as f64 * INITIAL_PEAK_NOISE_ESTIMATE),
                ..PeakCriteria::default()
            };
            tentative = find_peaks(signal, &criteria).indices;
            if !tentative.is_empty() {
                break;
            }
        }
        ensure_enough_peaks(&tentative)?;

        let segment_len = ((NOISE_SEGMENT_DURATION_S * fs) as usize).max(1);
        while tentative.last().is_some_and(|&p| p + segment_len > signal.len()) {
            tentative.pop();
        }
        if tentative.is_empty() {
            return Err(MyoError::too_few(ExtremumKind::Peak, 0, MIN_NUMBER_PEAKS));
        }

        let noise = tentative
            .iter()
            .map(|&p| detrended_peak_to_peak(&signal[p..p + segment_len]))
            .sum::<f64>()
            / tentative.len() as f64;

        // factor · noise with factor = max(noise factor, SNR of the tallest peak · rel),
        // written so a noiseless trace does not divide by zero
        let mut prominence = self.config.noise_prominence_factor * noise;
        if let Some(rel) = self.config.relative_prominence_factor.filter(|&r| r > 0.0) {
            let (min, max) = signal
                .iter()
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
            prominence = prominence.max((max - min) * rel);
        }

        let max_frequency = self.config.max_frequency_hz.map_or(fs, |f| f.min(fs));
        let (wmin, wmax) = self.config.width_bounds_s;
        let criteria = PeakCriteria {
            height: Some(self.config.height),
            distance: Some((fs / max_frequency).floor()),
            prominence: Some(prominence),
            width: Some((wmin * fs, wmax * fs)),
        };
        debug!(noise, prominence, ?criteria, "running noise-based detector");

        let peaks = find_peaks(signal, &criteria).indices;
        ensure_enough_peaks(&peaks)?;
        Ok(peaks)
    }

    fn find_valley_indices(&self, signal: &[f64], peaks: &[usize], fs: f64) -> Vec<usize> {
        let window = (self.config.valley_search_s * fs) as usize;
        let min_len = self.config.upslope_s * fs;
        let max_gap = 1.0 + self.config.upslope_noise_allowance_s * fs;

        let mut previous = 0;
        peaks
            .iter()
            .map(|&peak| {
                let search = (peak - previous).min(window);
                previous = peak;
                let segment = &signal[peak - search..peak];
                let offset = valley_offset(segment, min_len, max_gap);
                peak - search + offset
            })
            .collect()
    }
}

impl Detector for NoiseBasedDetector {
    fn name(&self) -> &'static str {
        "noise-based"
    }

    fn detect(&self, waveform: &Waveform) -> MyoResult<PeakValleyIndices> {
        waveform.ensure_finite()?;
        let fs = waveform.sampling_frequency_hz()?;
        self.config.validate_for_sampling_rate(fs)?;
        let oriented = if self.config.twitches_point_up {
            waveform.values().to_vec()
        } else {
            waveform.values().iter().map(|v| -v).collect()
        };

        let mut peaks = self.find_peak_indices(&oriented, fs)?;

        let window = (self.config.valley_search_s * fs) as usize;
        let leading = peaks.iter().take_while(|&&p| p < window).count();
        peaks.drain(..leading);
        if peaks.is_empty() {
            return Err(MyoError::InvalidValleySearchDuration);
        }

        let valleys = self.find_valley_indices(&oriented, &peaks, fs);
        let indices = self.config.window.apply(PeakValleyIndices::new(peaks, valleys), waveform);
        indices.ensure_minimum_count()?;
        Ok(indices)
    }
}

fn ensure_enough_peaks(peaks: &[usize]) -> MyoResult<()> {
    if peaks.len() < MIN_NUMBER_PEAKS {
        return Err(MyoError::too_few(ExtremumKind::Peak, peaks.len(), MIN_NUMBER_PEAKS));
    }
    Ok(())
}

/// Peak-to-peak amplitude of `segment` after removing a least-squares quadratic
fn detrended_peak_to_peak(segment: &[f64]) -> f64 {
    let residual: Vec<f64> = match fit_quadratic(segment) {
        Some(coeffs) => segment
            .iter()
            .enumerate()
            .map(|(k, v)| {
                let x = k as f64;
                v - (coeffs[0] * x * x + coeffs[1] * x + coeffs[2])
            })
            .collect(),
        None => segment.to_vec(),
    };
    let (min, max) = residual
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    max - min
}

/// Coefficients (a, b, c) of a·x² + b·x + c over sample positions 0..n
fn fit_quadratic(segment: &[f64]) -> Option<Vector3<f64>> {
    if segment.len() < 3 {
        return None;
    }
    let mut normal = Matrix3::zeros();
    let mut rhs = Vector3::zeros();
    for (k, &y) in segment.iter().enumerate() {
        let x = k as f64;
        let basis = Vector3::new(x * x, x, 1.0);
        normal += basis * basis.transpose();
        rhs += basis * y;
    }
    normal.lu().solve(&rhs)
}

/// Position of the valley within a search segment ending at its peak.
///
/// Picks the start of the longest sustained rise, preferring the later one
/// on ties, or the segment minimum when no rise is long enough.
fn valley_offset(segment: &[f64], min_len: f64, max_gap: f64) -> usize {
    let rising: Vec<usize> = segment
        .windows(2)
        .enumerate()
        .filter(|(_, w)| w[1] - w[0] > 0.0)
        .map(|(i, _)| i)
        .collect();

    let mut best: Option<(usize, usize)> = None;
    let mut group_start = 0;
    for end in 1..=rising.len() {
        let split = end == rising.len() || (rising[end] - rising[end - 1]) as f64 > max_gap;
        if !split {
            continue;
        }
        let len = end - group_start;
        if len > 0 && len as f64 >= min_len && best.map_or(true, |(_, best_len)| len >= best_len) {
            best = Some((rising[group_start], len));
        }
        group_start = end;
    }

    match best {
        Some((start, _)) => start,
        None => argmin(segment),
    }
}

fn argmin(values: &[f64]) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, f64::INFINITY), |(bi, bv), (i, &v)| if v < bv { (i, v) } else { (bi, bv) })
        .0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    /// Twitch train: flat baseline, linear rise, exponential decay
    fn twitch_train(n_twitches: usize, fs: f64, amplitude: f64) -> Waveform {
        let period = (fs * 1.5) as usize;
        let rise = (fs * 0.15) as usize;
        let lead = (fs * 1.2) as usize;
        let n = lead + n_twitches * period;
        let values = (0..n)
            .map(|i| {
                if i < lead {
                    return 0.0;
                }
                let k = (i - lead) % period;
                if k < rise {
                    amplitude * k as f64 / rise as f64
                } else {
                    amplitude * (-((k - rise) as f64) / (fs * 0.08)).exp()
                }
            })
            .collect();
        Waveform::from_uniform(1e6 / fs, values).unwrap()
    }

    #[test]
    fn test_quadratic_detrend_removes_parabola() {
        let segment: Vec<f64> = (0..20).map(|k| 0.5 * (k * k) as f64 - 3.0 * k as f64 + 7.0).collect();
        assert!(detrended_peak_to_peak(&segment) < 1e-9);
    }

    #[test]
    fn test_upslope_prefers_longest() {
        // short rise from 1, longer rise from 5
        let segment = [5.0, 1.0, 2.0, 3.0, 0.0, -1.0, 0.0, 1.0, 2.0, 3.0, 4.0];
        assert_eq!(valley_offset(&segment, 2.0, 1.0), 5);
    }

    #[test]
    fn test_upslope_ties_go_to_latest() {
        let segment = [1.0, 0.0, 1.0, 2.0, 1.0, 0.0, 1.0, 2.0];
        assert_eq!(valley_offset(&segment, 2.0, 1.0), 5);
    }

    #[test]
    fn test_no_upslope_falls_back_to_minimum() {
        let segment = [3.0, 2.0, 1.0, 0.5, 2.0];
        assert_eq!(valley_offset(&segment, 3.0, 1.0), 3);
    }

    #[test]
    fn test_noise_allowance_joins_rises() {
        // one-sample dip inside a rise
        let segment = [3.0, 0.0, 1.0, 2.0, 1.5, 2.5, 3.5];
        assert_eq!(valley_offset(&segment, 2.0, 1.0), 4);
        assert_eq!(valley_offset(&segment, 2.0, 2.0), 1);
    }

    #[test]
    fn test_twitch_train_detection() {
        let fs = 100.0;
        let wf = twitch_train(6, fs, 200.0);
        let found = NoiseBasedDetector::default().detect(&wf).unwrap();
        assert_eq!(found.peaks.len(), 6);
        assert_eq!(found.valleys.len(), 6);
        for (p, v) in found.peaks.iter().zip(&found.valleys) {
            assert!(v < p);
            // valley at the start of the 15-sample rise
            assert_eq!(p - v, 15);
        }
    }

    #[test]
    fn test_valley_window_excluding_every_peak() {
        let fs = 100.0;
        let values: Vec<f64> = (0..300).map(|i| 100.0 * (2.0 * PI * i as f64 / 100.0).sin()).collect();
        let wf = Waveform::from_uniform(1e6 / fs, values).unwrap();
        let detector = NoiseBasedDetector::new(NoiseBasedConfig {
            valley_search_s: 2.9,
            ..NoiseBasedConfig::default()
        })
        .unwrap();
        assert_eq!(detector.detect(&wf), Err(MyoError::InvalidValleySearchDuration));
    }

    #[test]
    fn test_valley_search_shorter_than_a_sample_rejected() {
        let wf = twitch_train(4, 100.0, 50.0);
        let config = NoiseBasedConfig {
            valley_search_s: 0.005,
            ..NoiseBasedConfig::default()
        };
        assert!(config.validate_for_sampling_rate(100.0).is_err());
        assert!(config.validate_for_sampling_rate(1000.0).is_ok());
        let detector = NoiseBasedDetector::new(config).unwrap();
        assert!(matches!(detector.detect(&wf), Err(MyoError::InvalidConfiguration { .. })));
    }

    #[test]
    fn test_small_signal_reports_too_few_peaks() {
        let values: Vec<f64> = (0..500).map(|i| (i as f64 * 0.3).sin()).collect();
        let wf = Waveform::from_uniform(10_000.0, values).unwrap();
        assert!(matches!(
            NoiseBasedDetector::default().detect(&wf),
            Err(MyoError::TooFewPeaksOrValleys { kind: ExtremumKind::Peak, .. })
        ));
    }

    #[test]
    fn test_invalid_width_bounds_rejected() {
        let config = NoiseBasedConfig {
            width_bounds_s: (2.0, 1.0),
            ..NoiseBasedConfig::default()
        };
        assert!(NoiseBasedDetector::new(config).is_err());
    }
}
