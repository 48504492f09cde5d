//! Physical and calibration constants
//!
//! Fixed values of the instrument. None of these are derived at runtime.

/// Magnet displacement per unit of measured flux
pub const MILLIMETERS_PER_MILLITESLA: f64 = 23.25;
/// Post stiffness
pub const NEWTONS_PER_MILLIMETER: f64 = 0.000159;
/// GMR sensor sensitivity
pub const MILLIVOLTS_PER_MILLITESLA: f64 = 1073.6;

/// Full-scale value of the 24-bit signed GMR ADC
pub const RAW_TO_SIGNED_CONVERSION_VALUE: f64 = 8_388_608.0; // 2^23
pub const REFERENCE_VOLTAGE: f64 = 2.5;
pub const ADC_GAIN: f64 = 2.0;

/// Memsic readings are unsigned and centred on this value
pub const MEMSIC_CENTER_OFFSET: f64 = 32_768.0; // 2^15
pub const MEMSIC_MSB: f64 = 65_536.0; // 2^16
/// Memsic full scale, in gauss
pub const MEMSIC_FULL_SCALE: f64 = 16.0;
pub const GAUSS_PER_MILLITESLA: f64 = 10.0;

pub const MICRO_TO_BASE_CONVERSION: f64 = 1e6;
pub const MICROSECONDS_PER_CENTIMILLISECOND: f64 = 10.0;
pub const MICROSECONDS_PER_SECOND: f64 = 1e6;

pub const MIN_NUMBER_PEAKS: usize = 3;
pub const MIN_NUMBER_VALLEYS: usize = 3;

/// Sampling period assumed for Beta 2 files that do not record one
pub const DEFAULT_BETA2_SAMPLING_PERIOD_US: u64 = 10_000;

/// Magnetometer geometry
pub const SENSORS_PER_WELL: usize = 3;
pub const AXES_PER_SENSOR: usize = 3;
