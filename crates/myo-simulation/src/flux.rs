//! Synthetic Beta 2 magnetometer recordings
//!
//! A point dipole stands in for each well's post magnet. Its flux at the
//! three tri-axial sensors is converted to raw Memsic counts, giving the
//! (well, sensor, axis, timepoint) arrays a Beta 2 file would hold.

use myo_core::constants::{
    AXES_PER_SENSOR, GAUSS_PER_MILLITESLA, MEMSIC_CENTER_OFFSET, MEMSIC_FULL_SCALE, MEMSIC_MSB, SENSORS_PER_WELL,
};
use myo_core::{config_error, MyoError, MyoResult, WELL_COUNT};
use ndarray::Array4;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

pub const READINGS_PER_WELL: usize = SENSORS_PER_WELL * AXES_PER_SENSOR;

/// µ0 / 4π with lengths in mm, magnetisation in kA/m and field in mT
const DIPOLE_FIELD_SCALE: f64 = 0.1;

/// Magnet pose and sensor layout of one well; angles in degrees
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointDipole {
    pub rest_position_mm: [f64; 3],
    pub theta: f64,
    pub phi: f64,
    /// Remnant magnetisation in kA/m
    pub remn: f64,
    pub volume_mm3: f64,
    pub sensor_offsets: [[f64; 3]; SENSORS_PER_WELL],
}

impl Default for PointDipole {
    fn default() -> Self {
        PointDipole {
            rest_position_mm: [0.0, 1.0, -5.0],
            theta: 95.0,
            phi: 0.0,
            remn: -575.0,
            volume_mm3: std::f64::consts::PI * 0.75 * 0.75,
            sensor_offsets: [[-2.25, 2.0, 0.0], [2.25, 2.0, 0.0], [0.0, -2.0, 0.0]],
        }
    }
}

impl PointDipole {
    fn moment(&self) -> [f64; 3] {
        let (theta, phi) = (self.theta.to_radians(), self.phi.to_radians());
        let strength = self.remn * self.volume_mm3;
        [
            strength * theta.sin() * phi.cos(),
            strength * theta.sin() * phi.sin(),
            strength * theta.cos(),
        ]
    }

    /// Flux in mT at each sensor axis with the magnet moved `x_mm` along X
    pub fn flux_at(&self, x_mm: f64) -> [f64; READINGS_PER_WELL] {
        let m = self.moment();
        let magnet = [
            self.rest_position_mm[0] + x_mm,
            self.rest_position_mm[1],
            self.rest_position_mm[2],
        ];
        let mut flux = [0.0; READINGS_PER_WELL];
        for (s, offset) in self.sensor_offsets.iter().enumerate() {
            let r = [offset[0] - magnet[0], offset[1] - magnet[1], offset[2] - magnet[2]];
            let dist = (r[0] * r[0] + r[1] * r[1] + r[2] * r[2]).sqrt();
            if dist == 0.0 {
                continue;
            }
            let r_hat = [r[0] / dist, r[1] / dist, r[2] / dist];
            let m_dot_r = m[0] * r_hat[0] + m[1] * r_hat[1] + m[2] * r_hat[2];
            let scale = DIPOLE_FIELD_SCALE / dist.powi(3);
            for axis in 0..AXES_PER_SENSOR {
                flux[s * AXES_PER_SENSOR + axis] = (3.0 * m_dot_r * r_hat[axis] - m[axis]) * scale;
            }
        }
        flux
    }
}

/// Flux density in mT to a raw Memsic reading
pub fn millitesla_to_memsic_counts(mt: f64) -> f64 {
    mt * GAUSS_PER_MILLITESLA * MEMSIC_MSB / MEMSIC_FULL_SCALE + MEMSIC_CENTER_OFFSET
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemsicSimConfig {
    pub magnet: PointDipole,
    /// Ambient field seen by every sensor axis, in mT
    pub ambient_mt: f64,
    pub baseline_timepoints: usize,
    /// Gaussian noise on each reading, in counts
    pub noise_counts_std: f64,
    /// Round readings to whole counts as the ADC does
    pub quantize: bool,
    /// Fraction of tissue readings replaced by 0 (dropped samples)
    pub dropped_sample_rate: f64,
    pub seed: Option<u64>,
}

impl Default for MemsicSimConfig {
    fn default() -> Self {
        MemsicSimConfig {
            magnet: PointDipole::default(),
            ambient_mt: 0.05,
            baseline_timepoints: 100,
            noise_counts_std: 0.0,
            quantize: false,
            dropped_sample_rate: 0.0,
            seed: Some(7),
        }
    }
}

/// Raw tissue and no-magnet baseline counts of a full plate
#[derive(Debug, Clone, PartialEq)]
pub struct MemsicPlate {
    pub tissue: Array4<f64>,
    pub baseline: Array4<f64>,
}

/// Synthesise raw readings from per-well magnet displacement series (mm).
///
/// The baseline holds the ambient field only.
pub fn synthesize_memsic_plate(displacements: &[Vec<f64>], config: &MemsicSimConfig) -> MyoResult<MemsicPlate> {
    if displacements.len() != WELL_COUNT {
        return Err(MyoError::ShapeMismatch {
            expected: format!("{} displacement series", WELL_COUNT),
            actual: format!("{} series", displacements.len()),
        });
    }
    let num_timepoints = displacements[0].len();
    if num_timepoints == 0 || displacements.iter().any(|d| d.len() != num_timepoints) {
        return Err(MyoError::ShapeMismatch {
            expected: "equal-length, non-empty displacement series".to_string(),
            actual: format!("{:?}", displacements.iter().map(Vec::len).collect::<Vec<_>>()),
        });
    }
    if config.baseline_timepoints == 0 {
        return Err(config_error!("baseline recording needs at least one timepoint"));
    }
    let noise = Normal::new(0.0, config.noise_counts_std)
        .map_err(|e| config_error!("Failed to create normal distribution: {}", e))?;
    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let reading = |mt: f64, rng: &mut StdRng| {
        let mut counts = millitesla_to_memsic_counts(mt);
        if config.noise_counts_std > 0.0 {
            counts += noise.sample(rng);
        }
        if config.quantize {
            counts = counts.round();
        }
        counts.max(1.0)
    };

    let shape = (WELL_COUNT, SENSORS_PER_WELL, AXES_PER_SENSOR, num_timepoints);
    let mut tissue = Array4::zeros(shape);
    for (well, series) in displacements.iter().enumerate() {
        for (t, &x) in series.iter().enumerate() {
            let flux = config.magnet.flux_at(x);
            for k in 0..READINGS_PER_WELL {
                let dropped = config.dropped_sample_rate > 0.0 && rng.gen::<f64>() < config.dropped_sample_rate;
                tissue[(well, k / AXES_PER_SENSOR, k % AXES_PER_SENSOR, t)] = if dropped {
                    0.0
                } else {
                    reading(flux[k] + config.ambient_mt, &mut rng)
                };
            }
        }
    }

    let baseline_shape = (WELL_COUNT, SENSORS_PER_WELL, AXES_PER_SENSOR, config.baseline_timepoints);
    let mut baseline = Array4::zeros(baseline_shape);
    for value in baseline.iter_mut() {
        *value = reading(config.ambient_mt, &mut rng);
    }

    Ok(MemsicPlate { tissue, baseline })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_field_is_center_count() {
        assert_eq!(millitesla_to_memsic_counts(0.0), MEMSIC_CENTER_OFFSET);
        // 1 mT = 10 G, full scale 16 G over 2^16 counts
        assert_eq!(millitesla_to_memsic_counts(1.0) - MEMSIC_CENTER_OFFSET, 40_960.0);
    }

    #[test]
    fn test_displacement_moves_flux() {
        let magnet = PointDipole::default();
        let rest = magnet.flux_at(0.0);
        let moved = magnet.flux_at(0.2);
        let diff: f64 = rest.iter().zip(&moved).map(|(a, b)| (a - b).powi(2)).sum::<f64>().sqrt();
        assert!(diff > 1e-3);
        assert!(rest.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_plate_shapes_and_baseline() {
        let displacements = vec![vec![0.0, 0.1, 0.2]; WELL_COUNT];
        let plate = synthesize_memsic_plate(&displacements, &MemsicSimConfig::default()).unwrap();
        assert_eq!(plate.tissue.shape(), &[WELL_COUNT, 3, 3, 3]);
        assert_eq!(plate.baseline.shape(), &[WELL_COUNT, 3, 3, 100]);
        let expected = millitesla_to_memsic_counts(0.05);
        assert!(plate.baseline.iter().all(|&v| v == expected));
    }

    #[test]
    fn test_dropped_samples_are_zero() {
        let displacements = vec![vec![0.0; 50]; WELL_COUNT];
        let config = MemsicSimConfig {
            dropped_sample_rate: 0.1,
            ..MemsicSimConfig::default()
        };
        let plate = synthesize_memsic_plate(&displacements, &config).unwrap();
        let zeros = plate.tissue.iter().filter(|&&v| v == 0.0).count();
        assert!(zeros > 0);
        assert!(plate.baseline.iter().all(|&v| v != 0.0));
    }

    #[test]
    fn test_mismatched_series_rejected() {
        let mut displacements = vec![vec![0.0; 5]; WELL_COUNT];
        displacements[3].pop();
        assert!(synthesize_memsic_plate(&displacements, &MemsicSimConfig::default()).is_err());
        assert!(synthesize_memsic_plate(&displacements[..4], &MemsicSimConfig::default()).is_err());
    }
}
