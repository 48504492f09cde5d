//! Pre-defined twitch force patterns for synthetic recordings

use myo_core::constants::MICROSECONDS_PER_SECOND;
use myo_core::{config_error, MyoResult, Waveform};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Noise-free force patterns, in µN against seconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum TwitchPattern {
    /// No contraction at all
    Flat { level: f64 },
    /// Sine wave beating at a fixed rate
    Sinusoidal {
        frequency_hz: f64,
        amplitude: f64,
        baseline: f64,
    },
    /// Linear rise to the peak, then a linear fall
    Triangle {
        period_s: f64,
        rise_s: f64,
        amplitude: f64,
        baseline: f64,
    },
    /// Gaussian contraction centred in each beat
    GaussianTrain {
        frequency_hz: f64,
        width_s: f64,
        amplitude: f64,
        baseline: f64,
    },
    /// Gaussian train whose amplitude decays over the recording
    Fatigue {
        frequency_hz: f64,
        width_s: f64,
        initial_amplitude: f64,
        decay_rate: f64,
        baseline: f64,
    },
}

impl TwitchPattern {
    /// Force at time `t` in seconds
    pub fn value_at(&self, t: f64) -> f64 {
        match *self {
            TwitchPattern::Flat { level } => level,

            TwitchPattern::Sinusoidal {
                frequency_hz,
                amplitude,
                baseline,
            } => baseline + amplitude * (2.0 * PI * frequency_hz * t).sin(),

            TwitchPattern::Triangle {
                period_s,
                rise_s,
                amplitude,
                baseline,
            } => {
                let phase = t.rem_euclid(period_s);
                if phase < rise_s {
                    baseline + amplitude * phase / rise_s
                } else {
                    baseline + amplitude * (period_s - phase) / (period_s - rise_s)
                }
            }

            TwitchPattern::GaussianTrain {
                frequency_hz,
                width_s,
                amplitude,
                baseline,
            } => baseline + amplitude * gaussian_beat(t, frequency_hz, width_s),

            TwitchPattern::Fatigue {
                frequency_hz,
                width_s,
                initial_amplitude,
                decay_rate,
                baseline,
            } => baseline + initial_amplitude * (-decay_rate * t).exp() * gaussian_beat(t, frequency_hz, width_s),
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            TwitchPattern::Flat { .. } => "Quiescent tissue",
            TwitchPattern::Sinusoidal { .. } => "Sinusoidal beating",
            TwitchPattern::Triangle { .. } => "Linear rise and fall",
            TwitchPattern::GaussianTrain { .. } => "Gaussian twitch train",
            TwitchPattern::Fatigue { .. } => "Fatiguing twitch train",
        }
    }

    /// Common preset patterns
    pub fn presets() -> Vec<(&'static str, TwitchPattern)> {
        vec![
            ("Quiescent", TwitchPattern::Flat { level: 0.0 }),
            (
                "1 Hz Sine",
                TwitchPattern::Sinusoidal {
                    frequency_hz: 1.0,
                    amplitude: 100.0,
                    baseline: 0.0,
                },
            ),
            (
                "Paced 1 Hz",
                TwitchPattern::GaussianTrain {
                    frequency_hz: 1.0,
                    width_s: 0.08,
                    amplitude: 150.0,
                    baseline: 10.0,
                },
            ),
            (
                "Fast Beating",
                TwitchPattern::GaussianTrain {
                    frequency_hz: 3.0,
                    width_s: 0.04,
                    amplitude: 80.0,
                    baseline: 10.0,
                },
            ),
            (
                "Sawtooth",
                TwitchPattern::Triangle {
                    period_s: 0.6,
                    rise_s: 0.2,
                    amplitude: 100.0,
                    baseline: 0.0,
                },
            ),
            (
                "Fatigue",
                TwitchPattern::Fatigue {
                    frequency_hz: 1.0,
                    width_s: 0.08,
                    initial_amplitude: 150.0,
                    decay_rate: 0.05,
                    baseline: 10.0,
                },
            ),
        ]
    }

    /// Sample the pattern uniformly from t = 0
    pub fn waveform(&self, sampling_rate_hz: f64, duration_s: f64) -> MyoResult<Waveform> {
        if !(sampling_rate_hz > 0.0 && duration_s > 0.0) {
            return Err(config_error!(
                "sampling rate ({} Hz) and duration ({} s) must be positive",
                sampling_rate_hz,
                duration_s
            ));
        }
        let n = (duration_s * sampling_rate_hz).round() as usize;
        let values = (0..n).map(|i| self.value_at(i as f64 / sampling_rate_hz)).collect();
        Waveform::from_uniform(MICROSECONDS_PER_SECOND / sampling_rate_hz, values)
    }
}

/// Unit-height Gaussian centred half a period into each beat
fn gaussian_beat(t: f64, frequency_hz: f64, width_s: f64) -> f64 {
    let period = 1.0 / frequency_hz;
    let offset = t.rem_euclid(period) - period / 2.0;
    (-offset * offset / (2.0 * width_s * width_s)).exp()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sine_peaks_at_quarter_period() {
        let pattern = TwitchPattern::Sinusoidal {
            frequency_hz: 1.0,
            amplitude: 2.0,
            baseline: 1.0,
        };
        assert!((pattern.value_at(0.25) - 3.0).abs() < 1e-12);
        assert!((pattern.value_at(0.75) + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_triangle_shape() {
        let pattern = TwitchPattern::Triangle {
            period_s: 0.6,
            rise_s: 0.2,
            amplitude: 100.0,
            baseline: 0.0,
        };
        assert_eq!(pattern.value_at(0.0), 0.0);
        assert!((pattern.value_at(0.1) - 50.0).abs() < 1e-9);
        assert!((pattern.value_at(0.4) - 50.0).abs() < 1e-9);
        assert!((pattern.value_at(0.7) - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_gaussian_train_peaks_mid_beat() {
        let pattern = TwitchPattern::GaussianTrain {
            frequency_hz: 2.0,
            width_s: 0.05,
            amplitude: 10.0,
            baseline: 1.0,
        };
        assert!((pattern.value_at(0.25) - 11.0).abs() < 1e-12);
        assert!((pattern.value_at(0.75) - 11.0).abs() < 1e-12);
        assert!(pattern.value_at(0.0) < 1.01);
    }

    #[test]
    fn test_waveform_sampling() {
        let wf = TwitchPattern::Flat { level: 2.0 }.waveform(100.0, 10.0).unwrap();
        assert_eq!(wf.len(), 1000);
        assert_eq!(wf.sampling_period_us().unwrap(), 10_000.0);
        assert!(TwitchPattern::Flat { level: 0.0 }.waveform(0.0, 1.0).is_err());
    }

    #[test]
    fn test_presets_are_finite() {
        for (name, pattern) in TwitchPattern::presets() {
            let wf = pattern.waveform(100.0, 2.0).unwrap();
            assert!(wf.ensure_finite().is_ok(), "{}", name);
        }
    }
}
