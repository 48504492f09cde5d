//! Lossless compression of filtered waveforms for storage
//!
//! The time axis is stored as arithmetic segments and the amplitude as runs
//! of repeated values. Decompression reproduces every sample bit for bit.

use myo_core::{MyoError, MyoResult, Waveform};
use serde::{Deserialize, Serialize};

/// Evenly spaced stretch of the time axis
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeSegment {
    pub start: f64,
    pub step: f64,
    pub count: usize,
}

/// Run of identical amplitude values
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueRun {
    pub value: f64,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressedWaveform {
    pub time_segments: Vec<TimeSegment>,
    pub value_runs: Vec<ValueRun>,
}

impl CompressedWaveform {
    /// Number of samples the compressed form expands to
    pub fn len(&self) -> usize {
        self.value_runs.iter().map(|r| r.count).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stored entries relative to the sample count of the original
    pub fn compression_ratio(&self) -> f64 {
        let stored = 3 * self.time_segments.len() + 2 * self.value_runs.len();
        stored as f64 / (2 * self.len()).max(1) as f64
    }
}

pub fn compress(waveform: &Waveform) -> CompressedWaveform {
    CompressedWaveform {
        time_segments: segment_times(waveform.times()),
        value_runs: run_length_encode(waveform.values()),
    }
}

pub fn decompress(compressed: &CompressedWaveform) -> MyoResult<Waveform> {
    let times: Vec<f64> = compressed
        .time_segments
        .iter()
        .flat_map(|s| (0..s.count).map(move |k| s.start + k as f64 * s.step))
        .collect();
    let values: Vec<f64> = compressed
        .value_runs
        .iter()
        .flat_map(|r| std::iter::repeat(r.value).take(r.count))
        .collect();
    if times.len() != values.len() {
        return Err(MyoError::ShapeMismatch {
            expected: format!("{} values", times.len()),
            actual: format!("{} values", values.len()),
        });
    }
    Waveform::new(times, values)
}

fn segment_times(times: &[f64]) -> Vec<TimeSegment> {
    let mut segments = Vec::new();
    let mut i = 0;
    while i < times.len() {
        let start = times[i];
        if i + 1 == times.len() {
            segments.push(TimeSegment { start, step: 0.0, count: 1 });
            break;
        }
        let step = times[i + 1] - start;
        let mut count = 2;
        while i + count < times.len()
            && (start + count as f64 * step).to_bits() == times[i + count].to_bits()
        {
            count += 1;
        }
        // the second sample must also be reproducible from start + step
        if (start + step).to_bits() != times[i + 1].to_bits() {
            count = 1;
        }
        segments.push(TimeSegment { start, step, count });
        i += count;
    }
    segments
}

fn run_length_encode(values: &[f64]) -> Vec<ValueRun> {
    let mut runs: Vec<ValueRun> = Vec::new();
    for &value in values {
        match runs.last_mut() {
            Some(run) if run.value.to_bits() == value.to_bits() => run.count += 1,
            _ => runs.push(ValueRun { value, count: 1 }),
        }
    }
    runs
}
