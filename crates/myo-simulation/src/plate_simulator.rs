//! Synthetic 24-well force recordings

use crate::twitch_patterns::TwitchPattern;
use myo_core::{config_error, MyoResult, Waveform, WellIndex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Noise added on top of the pattern
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoiseConfig {
    /// Gaussian noise standard deviation (0.0 = no noise)
    pub gaussian_std: f64,
    /// Amplitude of a slow 0.05 Hz drift
    pub baseline_wander: f64,
    /// Probability of a single-sample spike
    pub spike_prob: f64,
    pub spike_amplitude: f64,
}

impl NoiseConfig {
    pub fn none() -> Self {
        NoiseConfig {
            gaussian_std: 0.0,
            baseline_wander: 0.0,
            spike_prob: 0.0,
            spike_amplitude: 0.0,
        }
    }
}

impl Default for NoiseConfig {
    fn default() -> Self {
        NoiseConfig {
            gaussian_std: 1.0,
            baseline_wander: 2.0,
            spike_prob: 0.0,
            spike_amplitude: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlateSimConfig {
    pub sampling_rate_hz: f64,
    pub duration_s: f64,
    pub pattern: TwitchPattern,
    pub noise: NoiseConfig,
    /// Negate every well so twitches point down
    pub twitches_point_up: bool,
    /// Relative per-well amplitude jitter, uniform in ±spread
    pub well_amplitude_spread: f64,
    /// Random seed for reproducibility
    pub seed: Option<u64>,
}

impl Default for PlateSimConfig {
    fn default() -> Self {
        PlateSimConfig {
            sampling_rate_hz: 100.0,
            duration_s: 10.0,
            pattern: TwitchPattern::Sinusoidal {
                frequency_hz: 1.0,
                amplitude: 100.0,
                baseline: 0.0,
            },
            noise: NoiseConfig::none(),
            twitches_point_up: true,
            well_amplitude_spread: 0.0,
            seed: Some(42),
        }
    }
}

/// Force recordings for every well of a plate
pub struct PlateSimulator {
    config: PlateSimConfig,
    rng: StdRng,
    normal_dist: Normal<f64>,
}

impl PlateSimulator {
    pub fn new(config: PlateSimConfig) -> MyoResult<Self> {
        if !(config.sampling_rate_hz > 0.0 && config.duration_s > 0.0) {
            return Err(config_error!(
                "sampling rate ({} Hz) and duration ({} s) must be positive",
                config.sampling_rate_hz,
                config.duration_s
            ));
        }
        if !(0.0..1.0).contains(&config.well_amplitude_spread) {
            return Err(config_error!(
                "well amplitude spread {} outside [0, 1)",
                config.well_amplitude_spread
            ));
        }
        let normal_dist = Normal::new(0.0, config.noise.gaussian_std)
            .map_err(|e| config_error!("Failed to create normal distribution: {}", e))?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(PlateSimulator {
            config,
            rng,
            normal_dist,
        })
    }

    pub fn config(&self) -> &PlateSimConfig {
        &self.config
    }

    /// One well's force waveform
    pub fn generate_well(&mut self) -> MyoResult<Waveform> {
        let clean = self
            .config
            .pattern
            .waveform(self.config.sampling_rate_hz, self.config.duration_s)?;
        let spread = self.config.well_amplitude_spread;
        let gain = if spread > 0.0 {
            1.0 + self.rng.gen_range(-spread..spread)
        } else {
            1.0
        };
        let sign = if self.config.twitches_point_up { 1.0 } else { -1.0 };

        let mut times = clean.times().iter();
        let values: Vec<f64> = clean
            .values()
            .iter()
            .map(|&v| {
                let t = times.next().copied().unwrap_or_default() / 1e6;
                sign * (gain * v + self.add_noise(t))
            })
            .collect();
        clean.with_values(values)
    }

    /// Every well in index order
    pub fn generate_plate(&mut self) -> MyoResult<Vec<(WellIndex, Waveform)>> {
        WellIndex::all()
            .map(|well| Ok((well, self.generate_well()?)))
            .collect()
    }

    fn add_noise(&mut self, t: f64) -> f64 {
        let noise = &self.config.noise;
        let mut value = 0.0;
        if noise.gaussian_std > 0.0 {
            value += self.normal_dist.sample(&mut self.rng);
        }
        value += noise.baseline_wander * (2.0 * PI * 0.05 * t).sin();
        if noise.spike_prob > 0.0 && self.rng.gen::<f64>() < noise.spike_prob {
            value += noise.spike_amplitude * self.rng.gen_range(-1.0..1.0);
        }
        value
    }
}
