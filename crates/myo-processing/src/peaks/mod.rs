//! Peak and valley detection
//!
//! Two interchangeable strategies sit behind the [`Detector`] trait: a
//! prominence/width search that treats peaks and valleys symmetrically, and
//! a noise-adaptive search that finds peaks first and then walks back from
//! each one to its valley.

pub mod find_peaks;
mod noise_based;
mod prominence;

pub use noise_based::{NoiseBasedConfig, NoiseBasedDetector};
pub use prominence::{PeakDetectorConfig, ProminenceDetector};

use myo_core::constants::{MIN_NUMBER_PEAKS, MIN_NUMBER_VALLEYS};
use myo_core::{config_error, ExtremumKind, MyoError, MyoResult, Waveform};
use serde::{Deserialize, Serialize};

/// Sample indices of detected peaks and valleys, each strictly increasing
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PeakValleyIndices {
    pub peaks: Vec<usize>,
    pub valleys: Vec<usize>,
}

impl PeakValleyIndices {
    pub fn new(peaks: Vec<usize>, valleys: Vec<usize>) -> Self {
        PeakValleyIndices { peaks, valleys }
    }

    /// Fail unless both lists reach the minimum count
    pub fn ensure_minimum_count(&self) -> MyoResult<()> {
        too_few_peaks_or_valleys(&self.peaks, &self.valleys)
    }
}

/// Peak/valley detection strategy
pub trait Detector: Send + Sync + std::fmt::Debug {
    /// Short identifier for logs
    fn name(&self) -> &'static str;

    /// Locate peaks and valleys in `waveform`
    fn detect(&self, waveform: &Waveform) -> MyoResult<PeakValleyIndices>;
}

/// Analysis window in seconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindowBounds {
    pub start_time: f64,
    /// Open-ended when `None`
    pub end_time: Option<f64>,
}

impl Default for WindowBounds {
    fn default() -> Self {
        WindowBounds {
            start_time: 0.0,
            end_time: None,
        }
    }
}

impl WindowBounds {
    pub fn new(start_time: f64, end_time: Option<f64>) -> Self {
        WindowBounds { start_time, end_time }
    }

    pub fn validate(&self) -> MyoResult<()> {
        if !self.start_time.is_finite() || self.start_time < 0.0 {
            return Err(config_error!("Window start must be a non-negative time, got {}", self.start_time));
        }
        if let Some(end) = self.end_time {
            if end.is_nan() || end <= self.start_time {
                return Err(config_error!(
                    "Window end ({}) must be greater than window start ({})",
                    end,
                    self.start_time
                ));
            }
        }
        Ok(())
    }

    /// Clamp the window to the trace, returning (start, end) in seconds.
    ///
    /// A window that collapses after clamping becomes open-ended.
    pub fn resolve(&self, waveform: &Waveform) -> (f64, f64) {
        let trace_end = waveform.end_time_seconds();
        let start = self.start_time.max(0.0);
        let mut end = self.end_time.unwrap_or(f64::INFINITY).min(trace_end);
        if end <= start {
            end = f64::INFINITY;
        }
        (start, end)
    }

    /// Keep only the indices whose sample time lies inside the window
    pub fn filter(&self, indices: &[usize], waveform: &Waveform) -> Vec<usize> {
        let (start, end) = self.resolve(waveform);
        indices
            .iter()
            .copied()
            .filter(|&i| {
                let t = waveform.time_seconds(i);
                start <= t && t <= end
            })
            .collect()
    }

    pub fn apply(&self, indices: PeakValleyIndices, waveform: &Waveform) -> PeakValleyIndices {
        PeakValleyIndices {
            peaks: self.filter(&indices.peaks, waveform),
            valleys: self.filter(&indices.valleys, waveform),
        }
    }
}

/// Fail with `TooFewPeaksOrValleys` when either list is below the minimum.
///
/// Peaks are checked first.
pub fn too_few_peaks_or_valleys(peaks: &[usize], valleys: &[usize]) -> MyoResult<()> {
    if peaks.len() < MIN_NUMBER_PEAKS {
        return Err(MyoError::too_few(ExtremumKind::Peak, peaks.len(), MIN_NUMBER_PEAKS));
    }
    if valleys.len() < MIN_NUMBER_VALLEYS {
        return Err(MyoError::too_few(ExtremumKind::Valley, valleys.len(), MIN_NUMBER_VALLEYS));
    }
    Ok(())
}
