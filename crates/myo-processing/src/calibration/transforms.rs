//! Per-sample calibration transforms
//!
//! Pure functions: each takes waveforms by reference and returns a new one.

use super::filters::SosFilter;
use myo_core::{MyoResult, Waveform};
use serde::{Deserialize, Serialize};

/// Linear sensitivity calibration of one channel
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensitivityCalibration {
    pub gain: f64,
    pub offset: f64,
}

impl Default for SensitivityCalibration {
    fn default() -> Self {
        SensitivityCalibration { gain: 1.0, offset: 0.0 }
    }
}

/// Scale raw counts into field units
pub fn apply_sensitivity_calibration(raw: &Waveform, calibration: SensitivityCalibration) -> Waveform {
    raw.map_values(|v| v * calibration.gain + calibration.offset)
}

/// Subtract the scaled reference channel from the tissue channel.
///
/// The reference is interpolated onto the tissue time axis, so the two
/// channels may be sampled at different instants.
pub fn noise_cancellation(tissue: &Waveform, reference: &Waveform, scale: f64) -> Waveform {
    if scale == 0.0 || reference.values().iter().all(|&v| v == 0.0) {
        return tissue.clone();
    }
    let mut times = tissue.times().iter();
    tissue.map_values(|v| {
        let t = times.next().copied().unwrap_or_default();
        v - scale * reference.interpolate_at(t)
    })
}

/// Systematic bias measured on an empty plate
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum BaselineCorrection {
    #[default]
    None,
    Offset(f64),
    Curve(Waveform),
}

/// Remove the empty-plate baseline from a calibrated signal
pub fn apply_empty_plate_calibration(signal: &Waveform, baseline: &BaselineCorrection) -> Waveform {
    match baseline {
        BaselineCorrection::None => signal.clone(),
        BaselineCorrection::Offset(offset) => signal.map_values(|v| v - offset),
        BaselineCorrection::Curve(curve) => {
            let mut times = signal.times().iter();
            signal.map_values(|v| {
                let t = times.next().copied().unwrap_or_default();
                v - curve.interpolate_at(t)
            })
        }
    }
}

/// Zero-phase noise filtering
pub fn apply_noise_filtering(signal: &Waveform, filter: &SosFilter) -> MyoResult<Waveform> {
    filter.apply(signal)
}

/// Replace dropped Memsic samples (raw value 0) in place.
///
/// Each run of zeros takes the mean of the nearest valid samples on either
/// side, or the single valid neighbour at an edge. A series with no valid
/// sample is left untouched.
pub fn fix_dropped_samples(raw: &mut [f64]) -> usize {
    let n = raw.len();
    let mut fixed = 0;
    let mut i = 0;
    while i < n {
        if raw[i] != 0.0 {
            i += 1;
            continue;
        }
        let start = i;
        while i < n && raw[i] == 0.0 {
            i += 1;
        }
        let before = start.checked_sub(1).map(|j| raw[j]);
        let after = (i < n).then(|| raw[i]);
        let fill = match (before, after) {
            (Some(b), Some(a)) => (a + b) / 2.0,
            (Some(b), None) => b,
            (None, Some(a)) => a,
            (None, None) => continue,
        };
        raw[start..i].fill(fill);
        fixed += i - start;
    }
    fixed
}
