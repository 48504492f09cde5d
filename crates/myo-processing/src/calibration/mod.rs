//! Calibration transform chain
//!
//! Raw sensor readings become force in fixed stages: sensitivity
//! calibration, reference-noise cancellation, empty-plate calibration,
//! noise filtering and unit conversion. Beta 2 plates replace filtering and
//! the GMR unit chain with the magnet position estimator.

pub mod compression;
pub mod filters;
pub mod recording;
pub mod transforms;
pub mod units;

pub use compression::{compress, decompress, CompressedWaveform};
pub use filters::{default_filter_for_sampling_period, NoiseFilter, SosFilter};
pub use recording::{CalibratedWell, GmrStages, MagneticPlateRecording, PlateCalibration, PlateRecording, WellRecording};
pub use transforms::{
    apply_empty_plate_calibration, apply_noise_filtering, apply_sensitivity_calibration, fix_dropped_samples,
    noise_cancellation, BaselineCorrection, SensitivityCalibration,
};
pub use units::{
    displacement_from_force, displacement_from_voltage, force_from_displacement, gmr_from_voltage,
    memsic_to_millitesla, millitesla_to_memsic, voltage_from_displacement, voltage_from_gmr,
};
