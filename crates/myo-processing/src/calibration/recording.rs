//! Recording-level calibration
//!
//! A recording's format is resolved once into [`RecordingFormat`]; the
//! calibration path is chosen from that variant and nowhere else. Beta 1 and
//! optical wells calibrate independently. Beta 2 wells share one magnet
//! estimation over the whole plate.

use super::compression::{compress, CompressedWaveform};
use super::filters::{default_filter_for_sampling_period, NoiseFilter};
use super::transforms::{
    apply_empty_plate_calibration, apply_noise_filtering, apply_sensitivity_calibration, fix_dropped_samples,
    noise_cancellation, BaselineCorrection, SensitivityCalibration,
};
use super::units::{displacement_from_voltage, force_from_displacement, memsic_to_millitesla, voltage_from_gmr};
use crate::magnet::{find_magnet_positions, MagnetEstimate, MagnetFinderConfig};
use myo_core::constants::{
    DEFAULT_BETA2_SAMPLING_PERIOD_US, MICROSECONDS_PER_CENTIMILLISECOND, MICROSECONDS_PER_SECOND,
};
use myo_core::{format_error, FileFormatVersion, MyoError, MyoResult, RecordingFormat, Waveform, WellIndex, WELL_COUNT};
use ndarray::{Array4, Axis};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Raw readings and calibration constants of one Beta 1 or optical well.
///
/// Times are in the recording's native unit: centimilliseconds for Beta 1,
/// seconds for optical.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WellRecording {
    pub well: WellIndex,
    pub format: RecordingFormat,
    pub tissue: Waveform,
    pub reference: Option<Waveform>,
    pub tissue_calibration: SensitivityCalibration,
    pub reference_calibration: SensitivityCalibration,
    /// Weight of the reference channel in noise cancellation
    pub noise_scale: f64,
    pub empty_plate: BaselineCorrection,
    /// Recorded tissue sampling period; derived from the time axis when absent
    pub sampling_period_us: Option<u64>,
    /// Explicit filter; Beta 1 otherwise looks one up from the sampling period
    pub noise_filter: Option<NoiseFilter>,
}

impl WellRecording {
    pub fn beta1(well: WellIndex, version: FileFormatVersion, tissue: Waveform, reference: Option<Waveform>) -> Self {
        WellRecording {
            well,
            format: RecordingFormat::Beta1 { version },
            tissue,
            reference,
            tissue_calibration: SensitivityCalibration::default(),
            reference_calibration: SensitivityCalibration::default(),
            noise_scale: 1.0,
            empty_plate: BaselineCorrection::None,
            sampling_period_us: None,
            noise_filter: None,
        }
    }

    /// Optical well whose values are already force
    pub fn optical(well: WellIndex, force: Waveform) -> Self {
        WellRecording {
            format: RecordingFormat::Optical,
            ..WellRecording::beta1(well, FileFormatVersion::new(0, 0, 0), force, None)
        }
    }

    /// Calibrate this well to force
    pub fn calibrate(&self) -> MyoResult<CalibratedWell> {
        match self.format {
            RecordingFormat::Beta1 { .. } => self.calibrate_gmr(),
            RecordingFormat::Optical => self.calibrate_optical(),
            RecordingFormat::Beta2 { version } => Err(format_error!(
                "well {} is a Beta 2 ({}) well; it is calibrated with its plate",
                self.well,
                version
            )),
        }
    }

    fn calibrate_gmr(&self) -> MyoResult<CalibratedWell> {
        let tissue = rescale_time(&self.tissue, MICROSECONDS_PER_CENTIMILLISECOND)?.negated();
        let sampling_period_us = match self.sampling_period_us {
            Some(period) => period,
            None => tissue.sampling_period_us()?.round() as u64,
        };
        let filter = match self.noise_filter {
            Some(filter) => filter,
            None => default_filter_for_sampling_period(sampling_period_us)?,
        };
        debug!(well = %self.well, sampling_period_us, filter = ?filter, "calibrating GMR well");

        let sensitivity_tissue = apply_sensitivity_calibration(&tissue, self.tissue_calibration);
        let sensitivity_reference = match &self.reference {
            Some(reference) => Some(apply_sensitivity_calibration(
                &rescale_time(reference, MICROSECONDS_PER_CENTIMILLISECOND)?,
                self.reference_calibration,
            )),
            None => None,
        };
        let noise_cancelled = match &sensitivity_reference {
            Some(reference) => noise_cancellation(&sensitivity_tissue, reference, self.noise_scale),
            None => sensitivity_tissue.clone(),
        };
        let fully_calibrated = apply_empty_plate_calibration(&noise_cancelled, &self.empty_plate);
        let filtered = apply_noise_filtering(&fully_calibrated, &filter.design(sampling_period_us as f64)?)?;

        let compressed = compress(&filtered);
        let voltage = voltage_from_gmr(&filtered);
        let displacement = displacement_from_voltage(&voltage);
        let force = force_from_displacement(&displacement, false);

        Ok(CalibratedWell {
            well: self.well,
            force,
            displacement: Some(displacement.clone()),
            stages: Some(GmrStages {
                sensitivity_tissue,
                sensitivity_reference,
                noise_cancelled,
                fully_calibrated,
                filtered,
                compressed,
                voltage,
                displacement,
            }),
        })
    }

    fn calibrate_optical(&self) -> MyoResult<CalibratedWell> {
        Ok(CalibratedWell {
            well: self.well,
            force: rescale_time(&self.tissue, MICROSECONDS_PER_SECOND)?,
            displacement: None,
            stages: None,
        })
    }
}

/// Intermediate waveforms of the Beta 1 chain, each a new value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GmrStages {
    pub sensitivity_tissue: Waveform,
    pub sensitivity_reference: Option<Waveform>,
    pub noise_cancelled: Waveform,
    pub fully_calibrated: Waveform,
    pub filtered: Waveform,
    pub compressed: CompressedWaveform,
    pub voltage: Waveform,
    pub displacement: Waveform,
}

/// Force of one well, with whatever intermediates its path produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibratedWell {
    pub well: WellIndex,
    /// µN against time in µs
    pub force: Waveform,
    pub displacement: Option<Waveform>,
    pub stages: Option<GmrStages>,
}

/// Raw Memsic readings of a whole Beta 2 plate
#[derive(Debug, Clone, PartialEq)]
pub struct MagneticPlateRecording {
    pub version: FileFormatVersion,
    /// Raw counts shaped (well, sensor, axis, timepoint)
    pub tissue: Array4<f64>,
    /// Raw counts of the no-magnet recording, same well/sensor/axis shape
    pub baseline: Array4<f64>,
    /// Tissue timestamps in µs; a uniform axis is built when absent
    pub time_indices_us: Option<Vec<f64>>,
    pub sampling_period_us: Option<u64>,
    pub magnet: MagnetFinderConfig,
}

impl MagneticPlateRecording {
    pub fn new(version: FileFormatVersion, tissue: Array4<f64>, baseline: Array4<f64>) -> Self {
        MagneticPlateRecording {
            version,
            tissue,
            baseline,
            time_indices_us: None,
            sampling_period_us: None,
            magnet: MagnetFinderConfig::default(),
        }
    }

    fn resolve_sampling_period_us(&self) -> u64 {
        if let Some(period) = self.sampling_period_us {
            return period;
        }
        if let Some(times) = self.time_indices_us.as_deref().filter(|t| t.len() >= 2) {
            return (times[1] - times[0]).round() as u64;
        }
        warn!(
            default_us = DEFAULT_BETA2_SAMPLING_PERIOD_US,
            "Beta 2 recording has no sampling period, using default"
        );
        DEFAULT_BETA2_SAMPLING_PERIOD_US
    }

    /// Time axis starting at zero
    fn time_axis_us(&self, num_timepoints: usize, sampling_period_us: u64) -> MyoResult<Vec<f64>> {
        match &self.time_indices_us {
            Some(times) if times.len() != num_timepoints => Err(MyoError::ShapeMismatch {
                expected: format!("{} time indices", num_timepoints),
                actual: format!("{} time indices", times.len()),
            }),
            Some(times) => {
                let first = times.first().copied().unwrap_or_default();
                Ok(times.iter().map(|t| t - first).collect())
            }
            None => Ok((0..num_timepoints)
                .map(|i| (i as u64 * sampling_period_us) as f64)
                .collect()),
        }
    }

    /// Estimate magnet displacement for every well and convert it to force
    pub fn calibrate(&self) -> MyoResult<PlateCalibration> {
        let num_wells = self.tissue.shape()[0];
        if num_wells != WELL_COUNT || self.baseline.shape()[0] != WELL_COUNT {
            return Err(MyoError::ShapeMismatch {
                expected: format!("{} wells of tissue and baseline data", WELL_COUNT),
                actual: format!("{} tissue, {} baseline", num_wells, self.baseline.shape()[0]),
            });
        }
        let sampling_period_us = self.resolve_sampling_period_us();
        let num_timepoints = self.tissue.shape()[3];
        let times = self.time_axis_us(num_timepoints, sampling_period_us)?;

        info!(
            version = %self.version,
            timepoints = num_timepoints,
            sampling_period_us,
            "Calibrating Beta 2 plate"
        );

        let mut tissue = self.tissue.clone();
        let mut dropped_samples = 0;
        for mut lane in tissue.lanes_mut(Axis(3)) {
            let mut series = lane.to_vec();
            let fixed = fix_dropped_samples(&mut series);
            if fixed > 0 {
                lane.iter_mut().zip(series).for_each(|(slot, v)| *slot = v);
                dropped_samples += fixed;
            }
        }
        if dropped_samples > 0 {
            warn!(count = dropped_samples, "Replaced dropped Memsic samples");
        }

        let tissue = tissue.mapv(memsic_to_millitesla);
        let baseline = self.baseline.mapv(memsic_to_millitesla);
        let estimate = find_magnet_positions(&tissue, &baseline, sampling_period_us as f64, &self.magnet)?;

        let flip = RecordingFormat::Beta2 { version: self.version }.flips_displacement();
        let wells = WellIndex::all()
            .map(|well| {
                let x = estimate.displacement(well.index());
                let values: Vec<f64> = if flip { x.iter().map(|v| -v).collect() } else { x.to_vec() };
                let displacement = Waveform::new(times.clone(), values)?;
                Ok(CalibratedWell {
                    well,
                    force: force_from_displacement(&displacement, true),
                    displacement: Some(displacement),
                    stages: None,
                })
            })
            .collect::<MyoResult<Vec<_>>>()?;

        Ok(PlateCalibration {
            wells,
            magnet: Some(estimate),
            dropped_samples,
        })
    }
}

/// A plate's raw data, already resolved to its calibration path
#[derive(Debug, Clone, PartialEq)]
pub enum PlateRecording {
    /// Beta 1 or optical wells, calibrated one by one
    PerWell(Vec<WellRecording>),
    /// Beta 2 plate, calibrated through the magnet estimator
    Magnetic(MagneticPlateRecording),
}

impl PlateRecording {
    pub fn calibrate(&self) -> MyoResult<PlateCalibration> {
        match self {
            PlateRecording::PerWell(wells) => {
                info!(wells = wells.len(), "Calibrating plate wells");
                Ok(PlateCalibration {
                    wells: wells.iter().map(WellRecording::calibrate).collect::<MyoResult<Vec<_>>>()?,
                    magnet: None,
                    dropped_samples: 0,
                })
            }
            PlateRecording::Magnetic(recording) => recording.calibrate(),
        }
    }

    /// Beta 2 calibration; fails for any other recording
    pub fn calibrate_beta2(&self) -> MyoResult<PlateCalibration> {
        match self {
            PlateRecording::Magnetic(recording) => recording.calibrate(),
            PlateRecording::PerWell(_) => Err(format_error!("recording holds no Beta 2 magnetometer data")),
        }
    }
}

/// Calibrated wells of one plate
#[derive(Debug, Clone, PartialEq)]
pub struct PlateCalibration {
    pub wells: Vec<CalibratedWell>,
    /// Full magnet fit, present for Beta 2 plates
    pub magnet: Option<MagnetEstimate>,
    pub dropped_samples: usize,
}

impl PlateCalibration {
    pub fn well(&self, well: WellIndex) -> Option<&CalibratedWell> {
        self.wells.iter().find(|w| w.well == well)
    }

    /// (well, force) pairs ready for analysis
    pub fn forces(&self) -> Vec<(WellIndex, Waveform)> {
        self.wells.iter().map(|w| (w.well, w.force.clone())).collect()
    }
}

fn rescale_time(waveform: &Waveform, factor: f64) -> MyoResult<Waveform> {
    let times = waveform.times().iter().map(|t| t * factor).collect();
    Waveform::new(times, waveform.values().to_vec())
}
