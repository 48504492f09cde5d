//! Error handling for the Myo framework
//!
//! A single error type covers calibration, magnet estimation, peak detection,
//! twitch indexing and metric computation. Peak/valley/twitch errors are
//! scoped to one well; a plate batch absorbs them and keeps going.

use core::fmt;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for Myo framework operations
pub type MyoResult<T> = Result<T, MyoError>;

/// Which kind of extremum an error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExtremumKind {
    Peak,
    Valley,
}

impl fmt::Display for ExtremumKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtremumKind::Peak => write!(f, "peak"),
            ExtremumKind::Valley => write!(f, "valley"),
        }
    }
}

/// Error type for all Myo framework operations
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum MyoError {
    /// Caller supplied an unusable configuration
    #[error("Invalid configuration: {message}")]
    InvalidConfiguration {
        /// Description of the configuration error
        message: String,
    },

    /// A calibration constant could not be resolved for a recording format
    #[error("Format error: {reason}")]
    FormatError {
        /// Description of format issue
        reason: String,
    },

    /// Waveform violates its structural invariants
    #[error("Invalid waveform: {reason}")]
    InvalidWaveform {
        /// Description of the violated invariant
        reason: String,
    },

    /// Not enough peaks or valleys to extract twitch metrics
    #[error(
        "A minimum of {required} {kind}s is required to extract twitch metrics, \
         however only {found} {kind}(s) were detected."
    )]
    TooFewPeaksOrValleys {
        /// Which extremum was short
        kind: ExtremumKind,
        /// Number detected
        found: usize,
        /// Minimum required
        required: usize,
    },

    /// Two peaks appear without a valley in between
    #[error("Two peaks in a row were detected at indices {first} and {second}")]
    TwoPeaksInARow { first: usize, second: usize },

    /// Two valleys appear without a peak in between
    #[error("Two valleys in a row were detected at indices {first} and {second}")]
    TwoValleysInARow { first: usize, second: usize },

    /// Every peak was too close to the trace start for its valley search window
    #[error("Valley search duration excludes every detected peak")]
    InvalidValleySearchDuration,

    /// Array shapes do not line up
    #[error("Shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch { expected: String, actual: String },

    /// Waveform holds NaN or infinite samples where finite data is required
    #[error("Waveform contains {count} non-finite sample(s), first at index {first_index}")]
    NonFiniteSamples { count: usize, first_index: usize },

    /// Numerical solver could not produce any estimate
    #[error("Solver failure: {reason}")]
    SolverFailure { reason: String },
}

impl MyoError {
    /// Errors that belong to a single well's data rather than to the caller or the file.
    pub fn is_well_scoped(&self) -> bool {
        matches!(
            self,
            MyoError::TooFewPeaksOrValleys { .. }
                | MyoError::TwoPeaksInARow { .. }
                | MyoError::TwoValleysInARow { .. }
                | MyoError::InvalidValleySearchDuration
                | MyoError::NonFiniteSamples { .. }
        )
    }

    pub fn too_few(kind: ExtremumKind, found: usize, required: usize) -> Self {
        MyoError::TooFewPeaksOrValleys { kind, found, required }
    }
}

/// Convenience macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::error::MyoError::InvalidConfiguration {
            message: format!($($arg)*),
        }
    };
}

/// Convenience macro for creating format errors
#[macro_export]
macro_rules! format_error {
    ($($arg:tt)*) => {
        $crate::error::MyoError::FormatError {
            reason: format!($($arg)*),
        }
    };
}
