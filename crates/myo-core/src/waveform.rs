//! Waveform: paired time/amplitude series
//!
//! Every stage of the calibration chain consumes a `Waveform` and produces a
//! new one. Time is in microseconds, strictly increasing. Peak detection
//! additionally relies on a uniform sampling period.

use crate::constants::MICROSECONDS_PER_SECOND;
use crate::error::{MyoError, MyoResult};
use serde::{Deserialize, Serialize};

/// Time/amplitude series with validated time axis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawWaveform")]
pub struct Waveform {
    times: Vec<f64>,
    values: Vec<f64>,
}

#[derive(Deserialize)]
struct RawWaveform {
    times: Vec<f64>,
    values: Vec<f64>,
}

impl TryFrom<RawWaveform> for Waveform {
    type Error = MyoError;

    fn try_from(raw: RawWaveform) -> MyoResult<Self> {
        Waveform::new(raw.times, raw.values)
    }
}

/// Summary statistics of a waveform's amplitude
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WaveformStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

impl WaveformStats {
    /// Full amplitude range used to scale detector prominence
    pub fn range(&self) -> f64 {
        self.max - self.min
    }
}

impl Waveform {
    /// Create a waveform, validating length and time ordering
    pub fn new(times: Vec<f64>, values: Vec<f64>) -> MyoResult<Self> {
        if times.is_empty() {
            return Err(MyoError::InvalidWaveform {
                reason: "waveform must contain at least one sample".to_string(),
            });
        }
        if times.len() != values.len() {
            return Err(MyoError::InvalidWaveform {
                reason: format!(
                    "time axis has {} samples but amplitude has {}",
                    times.len(),
                    values.len()
                ),
            });
        }
        if let Some(i) = times.windows(2).position(|w| !(w[1] > w[0])) {
            return Err(MyoError::InvalidWaveform {
                reason: format!(
                    "time axis not strictly increasing at index {} ({} -> {})",
                    i + 1,
                    times[i],
                    times[i + 1]
                ),
            });
        }

        Ok(Waveform { times, values })
    }

    /// Uniformly sampled waveform starting at t = 0
    pub fn from_uniform(sampling_period_us: f64, values: Vec<f64>) -> MyoResult<Self> {
        if !(sampling_period_us > 0.0) {
            return Err(MyoError::InvalidWaveform {
                reason: format!("sampling period must be positive, got {}", sampling_period_us),
            });
        }
        let times = (0..values.len()).map(|i| i as f64 * sampling_period_us).collect();
        Waveform::new(times, values)
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    /// A validated waveform always holds at least one sample
    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn into_parts(self) -> (Vec<f64>, Vec<f64>) {
        (self.times, self.values)
    }

    /// Sampling period in microseconds, taken from the first interval
    pub fn sampling_period_us(&self) -> MyoResult<f64> {
        if self.times.len() < 2 {
            return Err(MyoError::InvalidWaveform {
                reason: "sampling period requires at least two samples".to_string(),
            });
        }
        Ok(self.times[1] - self.times[0])
    }

    /// Sampling frequency in Hz
    pub fn sampling_frequency_hz(&self) -> MyoResult<f64> {
        Ok(MICROSECONDS_PER_SECOND / self.sampling_period_us()?)
    }

    /// Time of sample `index` in seconds
    pub fn time_seconds(&self, index: usize) -> f64 {
        self.times[index] / MICROSECONDS_PER_SECOND
    }

    /// Time of the final sample in seconds
    pub fn end_time_seconds(&self) -> f64 {
        self.time_seconds(self.len() - 1)
    }

    /// New waveform on the same time axis with transformed amplitudes
    pub fn map_values<F>(&self, f: F) -> Waveform
    where
        F: FnMut(f64) -> f64,
    {
        Waveform {
            times: self.times.clone(),
            values: self.values.iter().copied().map(f).collect(),
        }
    }

    /// Replace the amplitudes, keeping the time axis
    pub fn with_values(&self, values: Vec<f64>) -> MyoResult<Waveform> {
        if values.len() != self.times.len() {
            return Err(MyoError::ShapeMismatch {
                expected: format!("{} samples", self.times.len()),
                actual: format!("{} samples", values.len()),
            });
        }
        Ok(Waveform {
            times: self.times.clone(),
            values,
        })
    }

    /// Amplitude-negated copy
    pub fn negated(&self) -> Waveform {
        self.map_values(|v| -v)
    }

    /// Fail with `NonFiniteSamples` if any amplitude is NaN or infinite
    pub fn ensure_finite(&self) -> MyoResult<()> {
        let mut count = 0;
        let mut first_index = None;
        for (i, v) in self.values.iter().enumerate() {
            if !v.is_finite() {
                count += 1;
                first_index.get_or_insert(i);
            }
        }
        match first_index {
            Some(first_index) => Err(MyoError::NonFiniteSamples { count, first_index }),
            None => Ok(()),
        }
    }

    /// Amplitude statistics, ignoring non-finite samples
    pub fn stats(&self) -> WaveformStats {
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        let mut sum = 0.0;
        let mut n = 0usize;
        for &v in self.values.iter().filter(|v| v.is_finite()) {
            min = min.min(v);
            max = max.max(v);
            sum += v;
            n += 1;
        }
        let mean = if n == 0 { f64::NAN } else { sum / n as f64 };
        WaveformStats { min, max, mean }
    }

    /// Linearly interpolate the amplitude at `t_us`, clamped to the end values
    pub fn interpolate_at(&self, t_us: f64) -> f64 {
        let n = self.times.len();
        if t_us <= self.times[0] {
            return self.values[0];
        }
        if t_us >= self.times[n - 1] {
            return self.values[n - 1];
        }
        let hi = self.times.partition_point(|&t| t < t_us);
        let lo = hi - 1;
        let (t0, t1) = (self.times[lo], self.times[hi]);
        let frac = (t_us - t0) / (t1 - t0);
        self.values[lo] + frac * (self.values[hi] - self.values[lo])
    }
}
