//! Myo-Processing: calibration and twitch analysis for engineered tissue
//!
//! Turns raw magnetic or optical well recordings into calibrated force,
//! locates peaks and valleys, pairs them into twitches and computes the
//! twitch metric catalogue.

pub mod calibration;
pub mod config;
pub mod magnet;
pub mod metrics;
pub mod peaks;
pub mod pipeline;
pub mod twitch;

pub use calibration::{CalibratedWell, MagneticPlateRecording, PlateCalibration, PlateRecording, WellRecording};
pub use config::{AnalysisConfig, DetectorStrategy};
pub use magnet::{find_magnet_positions, BaselineMode, MagnetEstimate, MagnetFinderConfig, NonConvergencePolicy};
pub use metrics::{
    compute_metrics, AggregateStats, AggregateTable, MetricKind, MetricsSettings, MetricsTable, TwitchMetrics,
    WidthValue,
};
pub use peaks::{
    Detector, NoiseBasedConfig, NoiseBasedDetector, PeakDetectorConfig, PeakValleyIndices, ProminenceDetector,
    WindowBounds,
};
pub use pipeline::{analyze_plate, analyze_recording, analyze_well, PlateAnalysis, WellAnalysis};
pub use twitch::{find_twitch_indices, Twitch, TwitchMap};
