//! Myo-Core: Foundation types for engineered-tissue contractility analysis
//!
//! Waveforms, plate layout, recording format versions and the calibration
//! constants shared by the processing crates.

pub mod constants;
pub mod error;
pub mod format;
pub mod plate;
pub mod waveform;

pub use error::{MyoError, MyoResult, ExtremumKind};
pub use format::{FileFormatVersion, RecordingFormat};
pub use plate::{WellIndex, PLATE_ROWS, PLATE_COLUMNS, WELL_COUNT};
pub use waveform::{Waveform, WaveformStats};
