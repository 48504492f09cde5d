//! Magnetic dipole model of a well's post magnet
//!
//! Positions are in millimetres relative to the well centre in the sensor
//! plane, angles in degrees, remnant magnetisation in kA/m. Fields are
//! returned in millitesla.

use myo_core::constants::{AXES_PER_SENSOR, SENSORS_PER_WELL};
use nalgebra::{SVector, Vector3};
use serde::{Deserialize, Serialize};

/// Number of flux measurements per well (3 sensors × 3 axes)
pub const MEASUREMENTS_PER_WELL: usize = SENSORS_PER_WELL * AXES_PER_SENSOR;
/// Number of fitted magnet parameters
pub const PARAMETER_COUNT: usize = 6;

pub type ParamVector = SVector<f64, PARAMETER_COUNT>;
pub type FluxVector = SVector<f64, MEASUREMENTS_PER_WELL>;

/// µ0 / 4π with lengths in mm, magnetisation in kA/m and field in mT
const DIPOLE_FIELD_SCALE: f64 = 0.1;

/// Fitted pose and strength of one magnet
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MagnetParams {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub theta: f64,
    pub phi: f64,
    pub remn: f64,
}

impl Default for MagnetParams {
    fn default() -> Self {
        MagnetParams {
            x: 0.0,
            y: 1.0,
            z: -5.0,
            theta: 95.0,
            phi: 0.0,
            remn: -575.0,
        }
    }
}

impl MagnetParams {
    pub fn to_vector(&self) -> ParamVector {
        ParamVector::from([self.x, self.y, self.z, self.theta, self.phi, self.remn])
    }

    pub fn from_vector(v: &ParamVector) -> Self {
        MagnetParams {
            x: v[0],
            y: v[1],
            z: v[2],
            theta: v[3],
            phi: v[4],
            remn: v[5],
        }
    }

    pub fn undefined() -> Self {
        MagnetParams {
            x: f64::NAN,
            y: f64::NAN,
            z: f64::NAN,
            theta: f64::NAN,
            phi: f64::NAN,
            remn: f64::NAN,
        }
    }

    /// Unit vector of the magnetic moment
    pub fn orientation(&self) -> Vector3<f64> {
        let (theta, phi) = (self.theta.to_radians(), self.phi.to_radians());
        Vector3::new(theta.sin() * phi.cos(), theta.sin() * phi.sin(), theta.cos())
    }
}

/// Magnet and sensor layout of a single well
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WellGeometry {
    /// Sensor positions relative to the well centre
    pub sensor_offsets: [[f64; 3]; SENSORS_PER_WELL],
    /// Cylindrical magnet radius
    pub magnet_radius_mm: f64,
    pub magnet_height_mm: f64,
}

impl Default for WellGeometry {
    fn default() -> Self {
        WellGeometry {
            sensor_offsets: [[-2.25, 2.0, 0.0], [2.25, 2.0, 0.0], [0.0, -2.0, 0.0]],
            magnet_radius_mm: 0.75,
            magnet_height_mm: 1.0,
        }
    }
}

impl WellGeometry {
    pub fn magnet_volume_mm3(&self) -> f64 {
        std::f64::consts::PI * self.magnet_radius_mm.powi(2) * self.magnet_height_mm
    }

    /// Predicted flux at every sensor axis, ordered sensor-major
    pub fn predicted_flux(&self, params: &MagnetParams) -> FluxVector {
        let moment = params.orientation() * (params.remn * self.magnet_volume_mm3());
        let magnet = Vector3::new(params.x, params.y, params.z);
        let mut flux = FluxVector::zeros();
        for (s, offset) in self.sensor_offsets.iter().enumerate() {
            let b = dipole_field(&moment, &(Vector3::from(*offset) - magnet));
            for axis in 0..AXES_PER_SENSOR {
                flux[s * AXES_PER_SENSOR + axis] = b[axis];
            }
        }
        flux
    }
}

/// Field of a point dipole `moment` at displacement `r` from it
fn dipole_field(moment: &Vector3<f64>, r: &Vector3<f64>) -> Vector3<f64> {
    let dist = r.norm();
    if dist == 0.0 {
        return Vector3::zeros();
    }
    let r_hat = r / dist;
    (r_hat * (3.0 * moment.dot(&r_hat)) - moment) * (DIPOLE_FIELD_SCALE / dist.powi(3))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_param_vector_round_trip() {
        let p = MagnetParams::default();
        assert_eq!(MagnetParams::from_vector(&p.to_vector()), p);
    }

    #[test]
    fn test_on_axis_dipole_field() {
        // field on the moment axis is 2m/r³
        let m = Vector3::new(0.0, 0.0, 1.0);
        let b = dipole_field(&m, &Vector3::new(0.0, 0.0, 2.0));
        assert!((b.z - 2.0 * DIPOLE_FIELD_SCALE / 8.0).abs() < 1e-15);
        assert!(b.x.abs() < 1e-15);
    }

    #[test]
    fn test_default_pose_gives_measurable_field() {
        let flux = WellGeometry::default().predicted_flux(&MagnetParams::default());
        let max = flux.iter().fold(0.0f64, |m, v| m.max(v.abs()));
        assert!(max > 1e-3 && max < 5.0, "max flux {}", max);
    }

    #[test]
    fn test_displacement_changes_flux() {
        let geometry = WellGeometry::default();
        let rest = geometry.predicted_flux(&MagnetParams::default());
        let moved = geometry.predicted_flux(&MagnetParams { x: 0.1, ..MagnetParams::default() });
        assert!((rest - moved).norm() > 1e-4);
    }
}
