//! Unit conversion chain
//!
//! GMR counts → millivolts → millimetres of magnet displacement → µN of
//! force, plus the Memsic counts → millitesla conversion used by Beta 2
//! hardware. Each forward conversion has an algebraic inverse.

use myo_core::constants::{
    ADC_GAIN, GAUSS_PER_MILLITESLA, MEMSIC_CENTER_OFFSET, MEMSIC_FULL_SCALE, MEMSIC_MSB,
    MICRO_TO_BASE_CONVERSION, MILLIMETERS_PER_MILLITESLA, MILLIVOLTS_PER_MILLITESLA,
    NEWTONS_PER_MILLIMETER, RAW_TO_SIGNED_CONVERSION_VALUE, REFERENCE_VOLTAGE,
};
use myo_core::Waveform;

const MILLI_TO_BASE_CONVERSION: f64 = 1000.0;

#[inline]
fn millivolts_per_count() -> f64 {
    MILLI_TO_BASE_CONVERSION * REFERENCE_VOLTAGE / RAW_TO_SIGNED_CONVERSION_VALUE / ADC_GAIN
}

/// GMR counts to millivolts
pub fn voltage_from_gmr(gmr: &Waveform) -> Waveform {
    let scale = millivolts_per_count();
    gmr.map_values(|v| v * scale)
}

pub fn gmr_from_voltage(voltage: &Waveform) -> Waveform {
    let scale = millivolts_per_count();
    voltage.map_values(|v| v / scale)
}

/// Millivolts to millimetres of displacement
pub fn displacement_from_voltage(voltage: &Waveform) -> Waveform {
    voltage.map_values(|mv| mv / MILLIVOLTS_PER_MILLITESLA * MILLIMETERS_PER_MILLITESLA)
}

pub fn voltage_from_displacement(displacement: &Waveform) -> Waveform {
    displacement.map_values(|mm| mm / MILLIMETERS_PER_MILLITESLA * MILLIVOLTS_PER_MILLITESLA)
}

/// Displacement to force in µN.
///
/// With `in_mm = false` the displacement is read as metres and scaled to
/// millimetres first. NaN displacements stay NaN.
pub fn force_from_displacement(displacement: &Waveform, in_mm: bool) -> Waveform {
    let to_mm = if in_mm { 1.0 } else { MILLI_TO_BASE_CONVERSION };
    displacement.map_values(|d| d * to_mm * NEWTONS_PER_MILLIMETER * MICRO_TO_BASE_CONVERSION)
}

pub fn displacement_from_force(force: &Waveform, in_mm: bool) -> Waveform {
    let to_mm = if in_mm { 1.0 } else { MILLI_TO_BASE_CONVERSION };
    force.map_values(|f| f / MICRO_TO_BASE_CONVERSION / NEWTONS_PER_MILLIMETER / to_mm)
}

/// Raw Memsic reading to flux density in mT
#[inline]
pub fn memsic_to_millitesla(raw: f64) -> f64 {
    (raw - MEMSIC_CENTER_OFFSET) * MEMSIC_FULL_SCALE / MEMSIC_MSB / GAUSS_PER_MILLITESLA
}

#[inline]
pub fn millitesla_to_memsic(mt: f64) -> f64 {
    mt * GAUSS_PER_MILLITESLA * MEMSIC_MSB / MEMSIC_FULL_SCALE + MEMSIC_CENTER_OFFSET
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wf(values: Vec<f64>) -> Waveform {
        Waveform::from_uniform(1000.0, values).unwrap()
    }

    #[test]
    fn test_gmr_voltage_scale() {
        let v = voltage_from_gmr(&wf(vec![RAW_TO_SIGNED_CONVERSION_VALUE]));
        // full scale count maps to Vref / gain
        assert!((v.values()[0] - 1250.0).abs() < 1e-9);
    }

    #[test]
    fn test_force_units() {
        let f = force_from_displacement(&wf(vec![1.0]), true);
        assert!((f.values()[0] - 159.0).abs() < 1e-9);
        let f_m = force_from_displacement(&wf(vec![0.001]), false);
        assert!((f_m.values()[0] - 159.0).abs() < 1e-9);
    }

    #[test]
    fn test_nan_displacement_stays_nan() {
        let f = force_from_displacement(&wf(vec![f64::NAN, 1.0]), true);
        assert!(f.values()[0].is_nan());
    }

    #[test]
    fn test_memsic_center_is_zero_field() {
        assert_eq!(memsic_to_millitesla(MEMSIC_CENTER_OFFSET), 0.0);
        assert!((memsic_to_millitesla(MEMSIC_CENTER_OFFSET + 4096.0) - 0.1).abs() < 1e-12);
        assert!((millitesla_to_memsic(0.1) - (MEMSIC_CENTER_OFFSET + 4096.0)).abs() < 1e-9);
    }
}
